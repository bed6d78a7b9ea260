use std::collections::{HashMap, HashSet};
use std::path::Path;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};

use super::error::{LookupResult, MissingSessionSnafu, ParseFixtureSnafu, ReadFixtureSnafu};
use super::ids::{ConversationToken, UserId};
use super::types::{ContactsQuery, Participant, ParticipantSource};
use super::{BoxFuture, ContactsLookup};

/// Serialized directory contents: every known participant plus current conversation members.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirectoryFixture {
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub memberships: HashMap<ConversationToken, Vec<UserId>>,
}

/// In-process directory that answers lookups from a fixed participant list.
#[derive(Debug, Clone, Default)]
pub struct FixtureDirectory {
    fixture: DirectoryFixture,
}

impl FixtureDirectory {
    pub fn new(fixture: DirectoryFixture) -> Self {
        Self { fixture }
    }

    pub fn from_participants(participants: Vec<Participant>) -> Self {
        Self::new(DirectoryFixture {
            participants,
            memberships: HashMap::new(),
        })
    }

    pub fn from_json_str(raw: &str, origin: &str) -> LookupResult<Self> {
        let fixture = serde_json::from_str(raw).context(ParseFixtureSnafu {
            stage: "parse-directory-fixture",
            origin: origin.to_string(),
        })?;
        Ok(Self::new(fixture))
    }

    pub fn load(path: &Path) -> LookupResult<Self> {
        let origin = path.display().to_string();
        let raw = std::fs::read_to_string(path).context(ReadFixtureSnafu {
            stage: "read-directory-fixture",
            path: origin.clone(),
        })?;
        Self::from_json_str(&raw, &origin)
    }

    pub fn fixture(&self) -> &DirectoryFixture {
        &self.fixture
    }

    /// Filters the fixture the way the server-side autocomplete does.
    ///
    /// One-to-one conversations only offer `users`; members of the edited conversation and
    /// the searching account itself are never offered. Results keep fixture order.
    pub fn search(&self, query: &ContactsQuery) -> LookupResult<Vec<Participant>> {
        let current_user = query.current_user.as_ref().context(MissingSessionSnafu {
            stage: "fixture-search-session",
        })?;

        let needle = query
            .search_query
            .as_deref()
            .map(|raw| raw.trim().to_lowercase())
            .filter(|needle| !needle.is_empty());

        let members = query
            .conversation_token
            .as_ref()
            .and_then(|token| self.fixture.memberships.get(token))
            .map(|members| members.iter().collect::<HashSet<_>>())
            .unwrap_or_default();

        let results = self
            .fixture
            .participants
            .iter()
            .filter(|participant| {
                query.group_conversation || participant.source == ParticipantSource::Users
            })
            .filter(|participant| participant.user_id != current_user.user_id)
            .filter(|participant| !members.contains(&participant.user_id))
            .filter(|participant| match &needle {
                Some(needle) => {
                    participant.display_name.to_lowercase().contains(needle)
                        || participant.user_id.as_str().to_lowercase().contains(needle)
                }
                None => true,
            })
            .cloned()
            .collect::<Vec<_>>();

        tracing::debug!(
            user_id = %current_user.user_id,
            group_conversation = query.group_conversation,
            result_count = results.len(),
            "fixture directory answered lookup"
        );

        Ok(results)
    }
}

impl ContactsLookup for FixtureDirectory {
    fn lookup<'a>(
        &'a self,
        query: &'a ContactsQuery,
    ) -> BoxFuture<'a, LookupResult<Vec<Participant>>> {
        async move { self.search(query) }.boxed()
    }
}
