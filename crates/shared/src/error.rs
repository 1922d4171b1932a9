use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{AthleteId, FopState, GroupId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Advisory message for displays. `key` is a translation key; `args` are the
/// values interpolated by the display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl Notification {
    pub fn new(level: NotificationLevel, key: impl Into<String>) -> Self {
        Self {
            level,
            key: key.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: impl ToString) -> Self {
        self.args.push(arg.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Validation,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FopError {
    #[error("unexpected event {event} in state {state:?}")]
    UnexpectedEvent { state: FopState, event: &'static str },
    #[error("no group loaded")]
    NoGroup,
    #[error("unknown group {0:?}")]
    UnknownGroup(GroupId),
    #[error("athlete {0:?} is not in the current group")]
    UnknownAthlete(AthleteId),
    #[error("no current athlete")]
    NoCurrentAthlete,
    #[error("no lift to review")]
    NoLiftToReview,
    #[error("invalid referee index {0}")]
    InvalidRefereeIndex(usize),
    #[error("invalid jury member index {0}")]
    InvalidJuryIndex(usize),
    #[error("repository failure: {0}")]
    Repository(#[from] anyhow::Error),
}

impl FopError {
    /// Translation key published with the ERROR notification.
    pub fn key(&self) -> &'static str {
        match self {
            FopError::UnexpectedEvent { .. } => "Fop.UnexpectedEvent",
            FopError::NoGroup => "Fop.NoGroup",
            FopError::UnknownGroup(_) => "Fop.UnknownGroup",
            FopError::UnknownAthlete(_) => "Fop.UnknownAthlete",
            FopError::NoCurrentAthlete => "Fop.NoCurrentAthlete",
            FopError::NoLiftToReview => "Fop.NoLiftToReview",
            FopError::InvalidRefereeIndex(_) => "Fop.InvalidRefereeIndex",
            FopError::InvalidJuryIndex(_) => "Fop.InvalidJuryIndex",
            FopError::Repository(_) => "Fop.RepositoryFailure",
        }
    }

    pub fn to_notification(&self) -> Notification {
        Notification::new(NotificationLevel::Error, self.key()).with_arg(self)
    }
}
