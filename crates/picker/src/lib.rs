#![deny(unsafe_code)]

/// Contact-picker state holder: query state, fetch orchestration and publishing.
pub mod controller;
/// Fetch tickets, lifecycle phase and failure reporting.
pub mod fetch;
pub mod presenter;
pub mod selection;
/// Picker settings persistence.
pub mod settings;

pub use controller::{ContactSelectionController, ControllerError, ControllerResult, QueryState};
pub use fetch::{
    FetchErrorReporter, FetchFailure, FetchPhase, FetchTicket, FetchTransition,
    FetchTransitionRejection, FetchTransitionResult, TracingErrorReporter,
};
pub use selection::SelectionSet;
pub use settings::{
    PickerSettings, SettingsError, SettingsResult, SettingsStore, SourcePriorities,
};
