use thiserror::Error;

use crate::model::NoteId;

/// Rejected before any network call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Cannot save empty note")]
    EmptyNote,
    #[error("Please select a user")]
    NoUserSelected,
}

/// Failure of the persistence layer.
///
/// Authorization failures arrive here too, as `Api` with the server's status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Request failed with status {status}")]
    Api {
        status: u16,
        /// `message` field of the error body, when the server sent one.
        message: Option<String>,
    },
    #[error("Not found")]
    NotFound,
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Malformed response: {0}")]
    Decode(String),
}

impl StoreError {
    /// Server-provided message, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            StoreError::Api { message: Some(m), .. } if !m.trim().is_empty() => Some(m.as_str()),
            _ => None,
        }
    }

    /// One-shot error notice: the server's message or `fallback`.
    pub fn notice(&self, fallback: &str) -> Notice {
        Notice::error(self.server_message().unwrap_or(fallback))
    }
}

/// Errors of note-level operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NoteError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Note {0} not found")]
    NotFound(NoteId),
}

impl NoteError {
    /// Validation errors carry their own text, the rest fall back to `fallback`.
    pub fn notice(&self, fallback: &str) -> Notice {
        match self {
            NoteError::Validation(v) => Notice::error(v.to_string()),
            NoteError::Store(s) => s.notice(fallback),
            NoteError::NotFound(_) => Notice::error(fallback),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

/// A transient user notification ("toast").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, text: text.into() }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, text: text.into() }
    }

    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}
