//! Typed error kinds shared across the store, escalation, compaction, retrieval,
//! and map-executor layers.
//!
//! The CLI layer wraps these in [`eyre::Report`] for operator-facing context; the
//! library layer matches on [`LcmError`] directly, since several call sites branch
//! on *which* kind occurred (e.g. `InvalidQuery` triggers a regex fallback in
//! [`crate::retrieval::grep`]).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LcmError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("transcript not found: {0}")]
    TranscriptMissing(String),

    #[error("input file not found: {0}")]
    InputMissing(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("llm error: {0}")]
    LLMError(String),

    #[error("store error: {0}")]
    StoreError(String),

    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, LcmError>;

impl From<rusqlite::Error> for LcmError {
    fn from(e: rusqlite::Error) -> Self {
        LcmError::StoreError(e.to_string())
    }
}

impl From<serde_json::Error> for LcmError {
    fn from(e: serde_json::Error) -> Self {
        LcmError::ParseError(e.to_string())
    }
}
