use std::sync::Arc;

use roster_directory::{
    ContactsLookup, ContactsQuery, ConversationToken, Participant, SessionUser, UserId,
};
use snafu::{ResultExt, Snafu};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::fetch::{
    FetchErrorReporter, FetchFailure, FetchPhase, FetchTicket, FetchTransition,
    TracingErrorReporter,
};
use crate::presenter;
use crate::selection::SelectionSet;
use crate::settings::{PickerSettings, SettingsStore};

/// What the picker is currently searching for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryState {
    pub search_query: Option<String>,
    pub conversation_token: Option<ConversationToken>,
    pub group_conversation: bool,
    pub initialized: bool,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ControllerError {
    #[snafu(display("contact picker must be created inside a tokio runtime on `{stage}`"))]
    NoRuntime {
        stage: &'static str,
        source: tokio::runtime::TryCurrentError,
    },
}

pub type ControllerResult<T> = Result<T, ControllerError>;

/// Observable slots shared between the controller and its fetch tasks.
struct PublishedState {
    selected: watch::Sender<Vec<Participant>>,
    contacts: watch::Sender<Vec<Participant>>,
    phase: watch::Sender<FetchPhase>,
}

impl PublishedState {
    fn new() -> Self {
        Self {
            selected: watch::Sender::new(Vec::new()),
            contacts: watch::Sender::new(Vec::new()),
            phase: watch::Sender::new(FetchPhase::Idle),
        }
    }

    fn start(&self, ticket: FetchTicket) {
        self.phase
            .send_if_modified(|phase| match phase.apply(FetchTransition::Start(ticket)) {
                Ok(next) => {
                    *phase = next;
                    true
                }
                Err(rejection) => {
                    tracing::warn!(ticket = %ticket, ?rejection, "fetch phase refused new ticket");
                    false
                }
            });
    }

    /// Publishes `results` if `ticket` is still the latest fetch.
    ///
    /// Contacts are replaced before the phase leaves `Fetching`, so a subscriber that sees
    /// the fetch settle always reads the matching list.
    fn complete(
        &self,
        ticket: FetchTicket,
        results: Vec<Participant>,
        settings: &PickerSettings,
    ) -> bool {
        self.phase
            .send_if_modified(|phase| match phase.apply(FetchTransition::Complete(ticket)) {
                Ok(next) => {
                    let contacts = {
                        let selected = self.selected.borrow();
                        presenter::present(results, selected.as_slice(), settings)
                    };
                    tracing::debug!(
                        ticket = %ticket,
                        result_count = contacts.len(),
                        "publishing contacts"
                    );
                    self.contacts.send_replace(contacts);
                    *phase = next;
                    true
                }
                Err(rejection) => {
                    tracing::debug!(ticket = %ticket, ?rejection, "discarding stale contacts");
                    false
                }
            })
    }

    fn fail(&self, failure: FetchFailure) -> bool {
        let ticket = failure.ticket;
        self.phase
            .send_if_modified(|phase| match phase.apply(FetchTransition::Fail(failure)) {
                Ok(next) => {
                    *phase = next;
                    true
                }
                Err(rejection) => {
                    tracing::debug!(ticket = %ticket, ?rejection, "ignoring stale fetch failure");
                    false
                }
            })
    }
}

/// One issued lookup, owned by its tokio task.
struct FetchJob {
    ticket: FetchTicket,
    query: ContactsQuery,
    lookup: Arc<dyn ContactsLookup>,
    settings: Arc<SettingsStore>,
    reporter: Arc<dyn FetchErrorReporter>,
    published: Arc<PublishedState>,
}

impl FetchJob {
    async fn run(self) {
        match self.lookup.lookup(&self.query).await {
            Ok(results) => {
                let settings = self.settings.settings();
                self.published.complete(self.ticket, results, &settings);
            }
            Err(error) => {
                let failure = FetchFailure::from_lookup_error(self.ticket, &error);
                // Failures never touch the contacts list; only the latest one is reported.
                if self.published.fail(failure.clone()) {
                    self.reporter.report(&failure);
                }
            }
        }
    }
}

/// State holder behind the contact-picker screen.
///
/// Meant to be driven from a single owner. Query changes start a fetch on the tokio runtime
/// the controller was created in; results are sorted, flagged against the current selection
/// and published through `watch` channels.
pub struct ContactSelectionController {
    lookup: Arc<dyn ContactsLookup>,
    current_user: watch::Receiver<Option<SessionUser>>,
    settings: Arc<SettingsStore>,
    reporter: Arc<dyn FetchErrorReporter>,
    runtime: Handle,
    query: QueryState,
    selection: SelectionSet,
    published: Arc<PublishedState>,
    next_ticket: u64,
    /// Fetch tasks that may still be running, newest last.
    fetch_tasks: Vec<JoinHandle<()>>,
}

impl ContactSelectionController {
    pub fn new(
        lookup: Arc<dyn ContactsLookup>,
        current_user: watch::Receiver<Option<SessionUser>>,
        settings: Arc<SettingsStore>,
    ) -> ControllerResult<Self> {
        let runtime = Handle::try_current().context(NoRuntimeSnafu {
            stage: "controller-new",
        })?;

        Ok(Self {
            lookup,
            current_user,
            settings,
            reporter: Arc::new(TracingErrorReporter),
            runtime,
            query: QueryState::default(),
            selection: SelectionSet::new(),
            published: Arc::new(PublishedState::new()),
            next_ticket: 0,
            fetch_tasks: Vec::new(),
        })
    }

    pub fn with_error_reporter(mut self, reporter: Arc<dyn FetchErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Binds the picker to a conversation. Repeating the current arguments is a no-op.
    pub fn initialize(
        &mut self,
        conversation_token: Option<ConversationToken>,
        group_conversation: bool,
    ) {
        if self.query.initialized
            && self.query.conversation_token == conversation_token
            && self.query.group_conversation == group_conversation
        {
            tracing::debug!("picker already initialized for this conversation");
            return;
        }

        self.query.initialized = true;
        self.query.conversation_token = conversation_token;
        self.query.group_conversation = group_conversation;
        self.load_contacts();
    }

    pub fn set_search_query(&mut self, query: Option<String>) {
        let query = self.settings.settings().normalize_query(query);
        if query == self.query.search_query {
            return;
        }

        self.query.search_query = query;
        self.load_contacts();
    }

    /// Adds a participant to the selection. Returns false if the user id was already chosen.
    pub fn select_participant(&mut self, participant: Participant) -> bool {
        let user_id = participant.user_id.clone();
        if !self.selection.insert(participant) {
            tracing::debug!(user_id = %user_id, "participant already selected");
            return false;
        }

        self.publish_selection();
        true
    }

    pub fn unselect_participant(&mut self, participant: &Participant) -> bool {
        if self.selection.remove(&participant.user_id).is_none() {
            return false;
        }

        self.publish_selection();
        true
    }

    pub fn clear_selection(&mut self) {
        if self.selection.is_empty() {
            return;
        }

        self.selection.clear();
        self.publish_selection();
    }

    pub fn is_selected(&self, user_id: &UserId) -> bool {
        self.selection.contains(user_id)
    }

    pub fn selected_len(&self) -> usize {
        self.selection.len()
    }

    pub fn query(&self) -> &QueryState {
        &self.query
    }

    pub fn search_query(&self) -> Option<&str> {
        self.query.search_query.as_deref()
    }

    pub fn conversation_token(&self) -> Option<&ConversationToken> {
        self.query.conversation_token.as_ref()
    }

    pub fn is_group_conversation(&self) -> bool {
        self.query.group_conversation
    }

    pub fn is_initialized(&self) -> bool {
        self.query.initialized
    }

    /// Number of fetches issued so far; also the value of the latest ticket.
    pub fn fetches_issued(&self) -> u64 {
        self.next_ticket
    }

    pub fn phase(&self) -> FetchPhase {
        self.published.phase.borrow().clone()
    }

    pub fn contacts(&self) -> Vec<Participant> {
        self.published.contacts.borrow().clone()
    }

    pub fn selected_participants(&self) -> Vec<Participant> {
        self.published.selected.borrow().clone()
    }

    pub fn subscribe_contacts(&self) -> watch::Receiver<Vec<Participant>> {
        self.published.contacts.subscribe()
    }

    pub fn subscribe_selected(&self) -> watch::Receiver<Vec<Participant>> {
        self.published.selected.subscribe()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<FetchPhase> {
        self.published.phase.subscribe()
    }

    fn publish_selection(&self) {
        self.published.selected.send_replace(self.selection.snapshot());
    }

    fn load_contacts(&mut self) {
        self.next_ticket = self.next_ticket.saturating_add(1);
        let ticket = FetchTicket::new(self.next_ticket);

        self.fetch_tasks.retain(|task| !task.is_finished());
        if self.settings.settings().abort_superseded_fetches {
            for previous in self.fetch_tasks.drain(..) {
                tracing::debug!(ticket = %ticket, "aborting superseded contacts fetch");
                previous.abort();
            }
        }

        self.published.start(ticket);

        let query = ContactsQuery {
            current_user: self.current_user.borrow().clone(),
            group_conversation: self.query.group_conversation,
            search_query: self.query.search_query.clone(),
            conversation_token: self.query.conversation_token.clone(),
        };
        tracing::debug!(
            ticket = %ticket,
            group_conversation = query.group_conversation,
            search_query = ?query.search_query,
            "issuing contacts fetch"
        );

        let job = FetchJob {
            ticket,
            query,
            lookup: Arc::clone(&self.lookup),
            settings: Arc::clone(&self.settings),
            reporter: Arc::clone(&self.reporter),
            published: Arc::clone(&self.published),
        };
        self.fetch_tasks.push(self.runtime.spawn(job.run()));
    }
}

impl Drop for ContactSelectionController {
    fn drop(&mut self) {
        for task in self.fetch_tasks.drain(..) {
            task.abort();
        }
    }
}
