//! Error types and stable error codes for wire parsing.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("empty chunk")]
    Empty,

    #[error("missing field separator")]
    MissingSeparator,

    #[error("wrong field count: expected {expected}, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("offset is not an integer: {0}")]
    InvalidOffset(String),

    #[error("unknown offset: {0}")]
    UnknownOffset(i64),

    #[error("unknown control verb: {0}")]
    UnknownVerb(String),
}

impl ChunkError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::Empty => "empty",
            Self::MissingSeparator => "missing_separator",
            Self::FieldCount { .. } => "field_count",
            Self::InvalidOffset(_) => "invalid_offset",
            Self::UnknownOffset(_) => "unknown_offset",
            Self::UnknownVerb(_) => "unknown_verb",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentIdError {
    #[error("content id must be 36 characters, got {0}")]
    Length(usize),

    #[error("content id contains invalid character {0:?}")]
    InvalidChar(char),
}

/// Serializable diagnostic for a discarded chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedChunk {
    pub error: String,
    pub message: String,
    pub chunk: String,
}

impl RejectedChunk {
    pub fn new(err: &ChunkError, chunk: &str) -> Self {
        Self {
            error: err.error_code().to_string(),
            message: err.to_string(),
            chunk: chunk.to_string(),
        }
    }
}
