use std::fmt;

use roster_directory::{ErrorModel, LookupError};

/// Identifier for one contacts fetch.
///
/// Issued in strictly increasing order so late results from superseded fetches can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FetchTicket(pub u64);

impl FetchTicket {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for FetchTicket {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "#{}", self.0)
    }
}

/// Recorded outcome of a fetch the directory rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub ticket: FetchTicket,
    pub stage: &'static str,
    pub message: String,
    pub error_model: Option<ErrorModel>,
}

impl FetchFailure {
    pub fn from_lookup_error(ticket: FetchTicket, error: &LookupError) -> Self {
        Self {
            ticket,
            stage: error.stage(),
            message: error.to_string(),
            error_model: error.error_model().cloned(),
        }
    }
}

/// Receives failures that never reach the contacts list.
pub trait FetchErrorReporter: Send + Sync {
    fn report(&self, failure: &FetchFailure);
}

/// Default reporter: one warning per failed fetch.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorReporter;

impl FetchErrorReporter for TracingErrorReporter {
    fn report(&self, failure: &FetchFailure) {
        tracing::warn!(
            ticket = %failure.ticket,
            stage = failure.stage,
            error_model = ?failure.error_model,
            "contacts fetch failed: {}",
            failure.message
        );
    }
}

/// Fetch lifecycle published next to the contacts list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FetchPhase {
    #[default]
    Idle,
    Fetching(FetchTicket),
    Failed(FetchFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchTransition {
    Start(FetchTicket),
    Complete(FetchTicket),
    Fail(FetchFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchTransitionRejection {
    /// A start ticket must be newer than the one in flight.
    NotNewer {
        active: FetchTicket,
        attempted: FetchTicket,
    },
    /// A newer fetch was issued after this one.
    Superseded {
        active: FetchTicket,
        attempted: FetchTicket,
    },
    NoActiveFetch {
        attempted: FetchTicket,
    },
}

pub type FetchTransitionResult = Result<FetchPhase, FetchTransitionRejection>;

impl FetchPhase {
    pub fn active_ticket(&self) -> Option<FetchTicket> {
        match self {
            Self::Fetching(ticket) => Some(*ticket),
            Self::Idle | Self::Failed(_) => None,
        }
    }

    pub fn is_fetching(&self) -> bool {
        matches!(self, Self::Fetching(_))
    }

    pub fn failure(&self) -> Option<&FetchFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            Self::Idle | Self::Fetching(_) => None,
        }
    }

    /// Applies one transition deterministically.
    ///
    /// Terminal transitions are accepted only for the ticket currently in flight.
    pub fn apply(&self, transition: FetchTransition) -> FetchTransitionResult {
        match transition {
            FetchTransition::Start(ticket) => self.apply_start(ticket),
            FetchTransition::Complete(ticket) => self.check_active(ticket).map(|()| Self::Idle),
            FetchTransition::Fail(failure) => self
                .check_active(failure.ticket)
                .map(|()| Self::Failed(failure)),
        }
    }

    fn apply_start(&self, ticket: FetchTicket) -> FetchTransitionResult {
        match self {
            Self::Fetching(active) if *active >= ticket => {
                Err(FetchTransitionRejection::NotNewer {
                    active: *active,
                    attempted: ticket,
                })
            }
            Self::Fetching(_) | Self::Idle | Self::Failed(_) => Ok(Self::Fetching(ticket)),
        }
    }

    fn check_active(&self, ticket: FetchTicket) -> Result<(), FetchTransitionRejection> {
        match self {
            Self::Fetching(active) if *active == ticket => Ok(()),
            Self::Fetching(active) => Err(FetchTransitionRejection::Superseded {
                active: *active,
                attempted: ticket,
            }),
            Self::Idle | Self::Failed(_) => {
                Err(FetchTransitionRejection::NoActiveFetch { attempted: ticket })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(ticket: u64) -> FetchFailure {
        FetchFailure::from_lookup_error(
            FetchTicket::new(ticket),
            &LookupError::remote("test", ErrorModel::new(Some(503), None)),
        )
    }

    #[test]
    fn newer_start_supersedes_active_fetch() {
        let phase = FetchPhase::Fetching(FetchTicket::new(1));
        let next = phase.apply(FetchTransition::Start(FetchTicket::new(2))).unwrap();
        assert_eq!(next.active_ticket(), Some(FetchTicket::new(2)));

        let rejected = next.apply(FetchTransition::Start(FetchTicket::new(2)));
        assert!(matches!(
            rejected,
            Err(FetchTransitionRejection::NotNewer { .. })
        ));
    }

    #[test]
    fn stale_completion_is_rejected() {
        let phase = FetchPhase::Fetching(FetchTicket::new(3));

        assert_eq!(
            phase.apply(FetchTransition::Complete(FetchTicket::new(2))),
            Err(FetchTransitionRejection::Superseded {
                active: FetchTicket::new(3),
                attempted: FetchTicket::new(2),
            })
        );
        assert_eq!(
            FetchPhase::Idle.apply(FetchTransition::Fail(failure(3))),
            Err(FetchTransitionRejection::NoActiveFetch {
                attempted: FetchTicket::new(3),
            })
        );
    }

    #[test]
    fn failure_keeps_error_model_and_allows_restart() {
        let phase = FetchPhase::Fetching(FetchTicket::new(1))
            .apply(FetchTransition::Fail(failure(1)))
            .unwrap();

        let recorded = phase.failure().unwrap();
        assert_eq!(recorded.error_model, Some(ErrorModel::new(Some(503), None)));
        assert!(!phase.is_fetching());

        let restarted = phase.apply(FetchTransition::Start(FetchTicket::new(2))).unwrap();
        assert!(restarted.is_fetching());
    }
}
