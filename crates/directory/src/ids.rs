use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::ensure;

use super::error::{InvalidIdSnafu, LookupError, LookupResult};

// Directory identifiers are opaque server strings; the macro keeps every wrapper identical.
macro_rules! define_directory_id {
    ($name:ident, $id_type:literal) => {
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Parses a trimmed, non-empty identifier.
            pub fn parse(raw: &str) -> LookupResult<Self> {
                let trimmed = raw.trim();
                ensure!(
                    !trimmed.is_empty(),
                    InvalidIdSnafu {
                        stage: "parse-directory-id",
                        id_type: $id_type,
                        raw: raw.to_string(),
                    }
                );
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = LookupError;

            fn from_str(raw: &str) -> LookupResult<Self> {
                Self::parse(raw)
            }
        }
    };
}

define_directory_id!(UserId, "user-id");
define_directory_id!(ConversationToken, "conversation-token");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_and_rejects_blank_ids() {
        let parsed = UserId::parse("  alice ").unwrap();
        assert_eq!(parsed.as_str(), "alice");

        let error = ConversationToken::parse("   ").unwrap_err();
        assert!(matches!(
            error,
            LookupError::InvalidId {
                id_type: "conversation-token",
                ..
            }
        ));
    }
}
