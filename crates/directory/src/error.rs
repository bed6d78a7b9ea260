use std::fmt;

use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Optional payload a remote directory attaches to a rejected lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorModel {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorModel {
    pub fn new(code: Option<u16>, message: Option<String>) -> Self {
        Self { code, message }
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.message.is_none()
    }
}

impl fmt::Display for ErrorModel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.message.as_deref()) {
            (Some(code), Some(message)) => write!(formatter, "{code} {message}"),
            (Some(code), None) => write!(formatter, "{code}"),
            (None, Some(message)) => write!(formatter, "{message}"),
            (None, None) => write!(formatter, "no error details"),
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LookupError {
    #[snafu(display("contacts lookup rejected on `{stage}`: {error_model}"))]
    Remote {
        stage: &'static str,
        error_model: ErrorModel,
    },
    #[snafu(display("contacts lookup on `{stage}` requires an authenticated session"))]
    MissingSession { stage: &'static str },
    #[snafu(display("identifier '{raw}' is invalid for {id_type}"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
    },
    #[snafu(display("failed to read directory fixture from {path}"))]
    ReadFixture {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to parse directory fixture from {origin}: {source}"))]
    ParseFixture {
        stage: &'static str,
        origin: String,
        source: serde_json::Error,
    },
}

impl LookupError {
    /// Builds a remote rejection; used by lookups living outside this crate.
    pub fn remote(stage: &'static str, error_model: ErrorModel) -> Self {
        Self::Remote { stage, error_model }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::Remote { stage, .. }
            | Self::MissingSession { stage }
            | Self::InvalidId { stage, .. }
            | Self::ReadFixture { stage, .. }
            | Self::ParseFixture { stage, .. } => *stage,
        }
    }

    /// Returns the remote payload when the directory supplied one.
    pub fn error_model(&self) -> Option<&ErrorModel> {
        match self {
            Self::Remote { error_model, .. } if !error_model.is_empty() => Some(error_model),
            _ => None,
        }
    }
}

pub type LookupResult<T> = Result<T, LookupError>;
