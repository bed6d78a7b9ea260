use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use roster_directory::{
    BoxFuture, ContactsLookup, ContactsQuery, ConversationToken, ErrorModel, FixtureDirectory,
    LookupError, LookupResult, Participant, ParticipantSource, SessionUser,
};
use roster_picker::{ContactSelectionController, ControllerError, PickerSettings, SettingsStore};
use snafu::{OptionExt, ResultExt, Snafu};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

const SCENARIO_FIXTURE: &str = r#"{
    "participants": [
        {"user_id": "u2", "display_name": "Bob", "source": "users"},
        {"user_id": "g1", "display_name": "Admins", "source": "groups"},
        {"user_id": "u1", "display_name": "alice", "source": "users"}
    ]
}"#;

#[derive(Debug, Clone)]
struct RunnerArgs {
    scenario: Scenario,
    fixture_path: Option<PathBuf>,
    settings_path: Option<PathBuf>,
    search_query: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Scenario {
    SortContacts,
    SelectedFlags,
    QueryIdempotent,
    InitializeIdempotent,
    FetchFailure,
    SupersededFetch,
    FixtureSearch,
    All,
}

impl Scenario {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "sort_contacts" => Some(Self::SortContacts),
            "selected_flags" => Some(Self::SelectedFlags),
            "query_idempotent" => Some(Self::QueryIdempotent),
            "initialize_idempotent" => Some(Self::InitializeIdempotent),
            "fetch_failure" => Some(Self::FetchFailure),
            "superseded_fetch" => Some(Self::SupersededFetch),
            "fixture_search" => Some(Self::FixtureSearch),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::SortContacts => "sort_contacts",
            Self::SelectedFlags => "selected_flags",
            Self::QueryIdempotent => "query_idempotent",
            Self::InitializeIdempotent => "initialize_idempotent",
            Self::FetchFailure => "fetch_failure",
            Self::SupersededFetch => "superseded_fetch",
            Self::FixtureSearch => "fixture_search",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Snafu)]
enum RunnerError {
    #[snafu(display("missing required --scenario argument"))]
    MissingScenario { stage: &'static str },
    #[snafu(display("missing value for argument '{arg}'"))]
    MissingArgumentValue {
        stage: &'static str,
        arg: &'static str,
    },
    #[snafu(display("unknown scenario '{raw}'"))]
    UnknownScenario { stage: &'static str, raw: String },
    #[snafu(display("unknown argument '{raw}'"))]
    UnknownArgument { stage: &'static str, raw: String },
    #[snafu(display("missing required --fixture argument for scenario '{scenario}'"))]
    MissingFixturePath {
        stage: &'static str,
        scenario: &'static str,
    },
    #[snafu(display("directory fixture could not be loaded: {source}"))]
    Fixture {
        stage: &'static str,
        source: LookupError,
    },
    #[snafu(display("controller could not be created: {source}"))]
    Controller {
        stage: &'static str,
        source: ControllerError,
    },
    #[snafu(display("fetch phase channel closed on `{stage}`"))]
    PhaseClosed {
        stage: &'static str,
        source: watch::error::RecvError,
    },
    #[snafu(display("scenario '{scenario}' failed: {reason}"))]
    ScenarioFailed {
        stage: &'static str,
        scenario: &'static str,
        reason: String,
    },
}

type RunnerResult<T> = Result<T, RunnerError>;

/// Rejects every lookup with a fixed server error.
struct RejectingLookup;

impl ContactsLookup for RejectingLookup {
    fn lookup<'a>(
        &'a self,
        _query: &'a ContactsQuery,
    ) -> BoxFuture<'a, LookupResult<Vec<Participant>>> {
        async move {
            Err(LookupError::remote(
                "rejecting-lookup",
                ErrorModel::new(Some(503), Some("directory unavailable".to_string())),
            ))
        }
        .boxed()
    }
}

/// Answers each query with one participant named after it, slow queries after a delay.
struct DelayedLookup;

impl ContactsLookup for DelayedLookup {
    fn lookup<'a>(
        &'a self,
        query: &'a ContactsQuery,
    ) -> BoxFuture<'a, LookupResult<Vec<Participant>>> {
        async move {
            let name = query.search_query.clone().unwrap_or_default();
            if name.starts_with("slow") {
                tokio::time::sleep(Duration::from_millis(150)).await;
            }
            Ok(vec![Participant::new(
                name.as_str(),
                name.as_str(),
                ParticipantSource::Users,
            )])
        }
        .boxed()
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run().await {
        println!("runner_ok=false");
        eprintln!("runner_error={error}");
        std::process::exit(1);
    }
}

async fn run() -> RunnerResult<()> {
    let args = parse_args(env::args().skip(1))?;
    println!("scenario={}", args.scenario.name());

    let store = match &args.settings_path {
        Some(path) => SettingsStore::new(path.clone()),
        None => SettingsStore::default(),
    };
    println!("settings_path={}", store.config_path().display());

    match args.scenario {
        Scenario::SortContacts => run_sort_contacts(&store).await,
        Scenario::SelectedFlags => run_selected_flags(&store).await,
        Scenario::QueryIdempotent => run_query_idempotent(&store).await,
        Scenario::InitializeIdempotent => run_initialize_idempotent(&store).await,
        Scenario::FetchFailure => run_fetch_failure(&store).await,
        Scenario::SupersededFetch => run_superseded_fetch(&store).await,
        Scenario::FixtureSearch => run_fixture_search(&args, &store).await,
        Scenario::All => run_all(&args, &store).await,
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> RunnerResult<RunnerArgs> {
    let mut scenario = None;
    let mut fixture_path = None;
    let mut settings_path = None;
    let mut search_query = None;
    let mut pending = args.into_iter();

    while let Some(argument) = pending.next() {
        match argument.as_str() {
            "--scenario" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-scenario-value",
                    arg: "--scenario",
                })?;

                let parsed = Scenario::parse(&value).context(UnknownScenarioSnafu {
                    stage: "parse-args-scenario",
                    raw: value,
                })?;
                scenario = Some(parsed);
            }
            "--fixture" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-fixture-value",
                    arg: "--fixture",
                })?;
                fixture_path = Some(PathBuf::from(value));
            }
            "--settings" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-settings-value",
                    arg: "--settings",
                })?;
                settings_path = Some(PathBuf::from(value));
            }
            "--query" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-query-value",
                    arg: "--query",
                })?;
                search_query = Some(value);
            }
            _ => {
                return UnknownArgumentSnafu {
                    stage: "parse-args",
                    raw: argument,
                }
                .fail();
            }
        }
    }

    Ok(RunnerArgs {
        scenario: scenario.context(MissingScenarioSnafu {
            stage: "parse-args-scenario-required",
        })?,
        fixture_path,
        settings_path,
        search_query,
    })
}

fn session_user() -> Option<SessionUser> {
    Some(SessionUser::new(
        "admin",
        "Administrator",
        "https://cloud.example.com",
    ))
}

/// Builds a controller over the loaded settings with scenario-specific overrides applied.
///
/// Overrides live only in memory; the settings file is never rewritten.
fn build_controller(
    lookup: Arc<dyn ContactsLookup>,
    base: &SettingsStore,
    adjust: impl FnOnce(&mut PickerSettings),
    stage: &'static str,
) -> RunnerResult<(
    ContactSelectionController,
    watch::Sender<Option<SessionUser>>,
)> {
    let (user_tx, user_rx) = watch::channel(session_user());
    let mut settings = PickerSettings::clone(&base.settings());
    adjust(&mut settings);
    let store = Arc::new(SettingsStore::with_settings(
        base.config_path().to_path_buf(),
        settings,
    ));
    let controller =
        ContactSelectionController::new(lookup, user_rx, store).context(ControllerSnafu { stage })?;
    Ok((controller, user_tx))
}

fn scenario_directory() -> RunnerResult<Arc<dyn ContactsLookup>> {
    let directory = FixtureDirectory::from_json_str(SCENARIO_FIXTURE, "scenario-fixture")
        .context(FixtureSnafu {
            stage: "scenario-fixture-parse",
        })?;
    Ok(Arc::new(directory))
}

async fn settle(
    controller: &ContactSelectionController,
    stage: &'static str,
) -> RunnerResult<()> {
    let mut phase = controller.subscribe_phase();
    phase
        .wait_for(|phase| !phase.is_fetching())
        .await
        .map(|_| ())
        .context(PhaseClosedSnafu { stage })
}

fn describe(participants: &[Participant]) -> String {
    participants
        .iter()
        .map(|participant| {
            format!(
                "{}({}{})",
                participant.display_name,
                participant.source.as_str(),
                if participant.selected { ",selected" } else { "" }
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn check(
    scenario: &'static str,
    stage: &'static str,
    ok: bool,
    reason: String,
) -> RunnerResult<()> {
    if ok {
        return Ok(());
    }

    ScenarioFailedSnafu {
        stage,
        scenario,
        reason,
    }
    .fail()
}

async fn run_sort_contacts(store: &SettingsStore) -> RunnerResult<()> {
    let (mut controller, _user_tx) = build_controller(
        scenario_directory()?,
        store,
        |_| {},
        "scenario-sort-contacts-controller",
    )?;

    controller.initialize(None, true);
    settle(&controller, "scenario-sort-contacts-settle").await?;

    let contacts = describe(&controller.contacts());
    println!("contacts={contacts}");
    check(
        "sort_contacts",
        "scenario-sort-contacts-order",
        contacts == "alice(users) Bob(users) Admins(groups)",
        format!("unexpected order: {contacts}"),
    )?;
    println!("runner_ok=true");
    Ok(())
}

async fn run_selected_flags(store: &SettingsStore) -> RunnerResult<()> {
    let (mut controller, _user_tx) = build_controller(
        scenario_directory()?,
        store,
        |_| {},
        "scenario-selected-flags-controller",
    )?;

    controller.select_participant(Participant::new("u1", "alice", ParticipantSource::Users));
    controller.initialize(None, true);
    settle(&controller, "scenario-selected-flags-settle").await?;

    let contacts = describe(&controller.contacts());
    println!("contacts={contacts}");
    check(
        "selected_flags",
        "scenario-selected-flags-annotation",
        contacts == "alice(users,selected) Bob(users) Admins(groups)",
        format!("unexpected annotation: {contacts}"),
    )?;
    println!("runner_ok=true");
    Ok(())
}

async fn run_query_idempotent(store: &SettingsStore) -> RunnerResult<()> {
    let (mut controller, _user_tx) = build_controller(
        scenario_directory()?,
        store,
        |_| {},
        "scenario-query-idempotent-controller",
    )?;

    controller.set_search_query(Some("x".to_string()));
    controller.set_search_query(Some("x".to_string()));
    settle(&controller, "scenario-query-idempotent-settle").await?;

    let fetches = controller.fetches_issued();
    println!("fetches_issued={fetches}");
    check(
        "query_idempotent",
        "scenario-query-idempotent-count",
        fetches == 1,
        format!("expected exactly one fetch, saw {fetches}"),
    )?;
    println!("runner_ok=true");
    Ok(())
}

async fn run_initialize_idempotent(store: &SettingsStore) -> RunnerResult<()> {
    let (mut controller, _user_tx) = build_controller(
        scenario_directory()?,
        store,
        |_| {},
        "scenario-initialize-idempotent-controller",
    )?;

    let token = Some(ConversationToken::new("room-1"));
    controller.initialize(token.clone(), true);
    controller.initialize(token, true);
    settle(&controller, "scenario-initialize-idempotent-settle").await?;

    let fetches = controller.fetches_issued();
    println!("fetches_issued={fetches}");
    check(
        "initialize_idempotent",
        "scenario-initialize-idempotent-count",
        fetches == 1,
        format!("expected exactly one fetch, saw {fetches}"),
    )?;
    println!("runner_ok=true");
    Ok(())
}

async fn run_fetch_failure(store: &SettingsStore) -> RunnerResult<()> {
    let (mut controller, _user_tx) = build_controller(
        Arc::new(RejectingLookup),
        store,
        |_| {},
        "scenario-fetch-failure-controller",
    )?;

    let before = controller.contacts();
    controller.set_search_query(Some("anyone".to_string()));
    settle(&controller, "scenario-fetch-failure-settle").await?;

    let phase = controller.phase();
    let failure = phase.failure();
    println!("failure={:?}", failure.map(|failure| failure.message.as_str()));
    check(
        "fetch_failure",
        "scenario-fetch-failure-contacts",
        controller.contacts() == before,
        "contacts changed after a failed fetch".to_string(),
    )?;
    check(
        "fetch_failure",
        "scenario-fetch-failure-phase",
        failure.is_some(),
        format!("expected failed phase, saw {phase:?}"),
    )?;
    println!("runner_ok=true");
    Ok(())
}

async fn run_superseded_fetch(store: &SettingsStore) -> RunnerResult<()> {
    let (mut controller, _user_tx) = build_controller(
        Arc::new(DelayedLookup),
        store,
        |settings| settings.abort_superseded_fetches = false,
        "scenario-superseded-fetch-controller",
    )?;

    controller.set_search_query(Some("slow".to_string()));
    controller.set_search_query(Some("fast".to_string()));
    settle(&controller, "scenario-superseded-fetch-settle").await?;
    // Give the slow fetch time to land so a stale overwrite would be visible.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let contacts = describe(&controller.contacts());
    println!("contacts={contacts}");
    check(
        "superseded_fetch",
        "scenario-superseded-fetch-latest",
        contacts == "fast(users)",
        format!("stale result overwrote latest query: {contacts}"),
    )?;
    println!("runner_ok=true");
    Ok(())
}

async fn run_fixture_search(args: &RunnerArgs, store: &SettingsStore) -> RunnerResult<()> {
    let path = args.fixture_path.as_ref().context(MissingFixturePathSnafu {
        stage: "scenario-fixture-search-path",
        scenario: "fixture_search",
    })?;
    let directory = FixtureDirectory::load(path).context(FixtureSnafu {
        stage: "scenario-fixture-search-load",
    })?;

    let (mut controller, _user_tx) = build_controller(
        Arc::new(directory),
        store,
        |_| {},
        "scenario-fixture-search-controller",
    )?;

    controller.initialize(None, true);
    controller.set_search_query(args.search_query.clone());
    settle(&controller, "scenario-fixture-search-settle").await?;

    println!("contacts={}", describe(&controller.contacts()));
    println!("runner_ok=true");
    Ok(())
}

async fn run_all(args: &RunnerArgs, store: &SettingsStore) -> RunnerResult<()> {
    run_sort_contacts(store).await?;
    run_selected_flags(store).await?;
    run_query_idempotent(store).await?;
    run_initialize_idempotent(store).await?;
    run_fetch_failure(store).await?;
    run_superseded_fetch(store).await?;

    if args.fixture_path.is_some() {
        run_fixture_search(args, store).await?;
    }

    println!("all_passed=true");
    Ok(())
}
