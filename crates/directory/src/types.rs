use serde::{Deserialize, Serialize};

use super::ids::{ConversationToken, UserId};

/// Directory category a participant was found in.
///
/// Unrecognized categories are kept verbatim so callers can still rank and render them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ParticipantSource {
    Users,
    Groups,
    Emails,
    Circles,
    Other(String),
}

impl ParticipantSource {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "users" => Self::Users,
            "groups" => Self::Groups,
            "emails" => Self::Emails,
            "circles" => Self::Circles,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Users => "users",
            Self::Groups => "groups",
            Self::Emails => "emails",
            Self::Circles => "circles",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for ParticipantSource {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<ParticipantSource> for String {
    fn from(value: ParticipantSource) -> Self {
        match value {
            ParticipantSource::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

/// Candidate conversation participant as returned by a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: UserId,
    pub display_name: String,
    pub source: ParticipantSource,
    // View annotation only; identity is `user_id`.
    #[serde(default)]
    pub selected: bool,
}

impl Participant {
    pub fn new(
        user_id: impl Into<UserId>,
        display_name: impl Into<String>,
        source: ParticipantSource,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            source,
            selected: false,
        }
    }

    pub fn with_selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }
}

/// Authenticated account the picker is acting for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub user_id: UserId,
    pub display_name: String,
    pub base_url: String,
}

impl SessionUser {
    pub fn new(
        user_id: impl Into<UserId>,
        display_name: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            base_url: base_url.into().trim().to_string(),
        }
    }
}

/// Parameters of one contacts lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContactsQuery {
    pub current_user: Option<SessionUser>,
    pub group_conversation: bool,
    pub search_query: Option<String>,
    pub conversation_token: Option<ConversationToken>,
}

impl ContactsQuery {
    pub fn new(current_user: Option<SessionUser>, group_conversation: bool) -> Self {
        Self {
            current_user,
            group_conversation,
            search_query: None,
            conversation_token: None,
        }
    }

    pub fn with_search_query(mut self, search_query: impl Into<String>) -> Self {
        self.search_query = Some(search_query.into());
        self
    }

    pub fn with_conversation_token(mut self, conversation_token: ConversationToken) -> Self {
        self.conversation_token = Some(conversation_token);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_sources_survive_json_roundtrip() {
        let raw = r#"{"user_id":"team","display_name":"Team","source":"federated"}"#;
        let participant: Participant = serde_json::from_str(raw).unwrap();

        assert_eq!(
            participant.source,
            ParticipantSource::Other("federated".to_string())
        );
        assert!(!participant.selected);

        let encoded = serde_json::to_string(&participant).unwrap();
        assert!(encoded.contains(r#""source":"federated""#));
    }

    #[test]
    fn known_sources_parse_from_wire_names() {
        for (raw, expected) in [
            ("users", ParticipantSource::Users),
            ("groups", ParticipantSource::Groups),
            ("emails", ParticipantSource::Emails),
            ("circles", ParticipantSource::Circles),
        ] {
            assert_eq!(ParticipantSource::parse(raw), expected);
            assert_eq!(expected.as_str(), raw);
        }
    }
}
