//! Errors raised at the boundary between untrusted client input and the pipeline.

use thiserror::Error;

/// Why an inbound frame was refused.
///
/// Every variant ends with the single frame being dropped; the connection
/// stays open.
#[derive(Debug, Error)]
pub enum InboundError {
    /// The frame was not valid JSON.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The payload carried a server-reserved key somewhere inside it.
    #[error("reserved key in payload: {0}")]
    ReservedKey(String),
    /// The payload nested deeper than the inspection limit.
    #[error("payload nesting exceeds {0} levels")]
    TooDeep(usize),
}

impl InboundError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::ReservedKey(_) => "reserved_key",
            Self::TooDeep(_) => "too_deep",
        }
    }
}
