//! Trust boundary for client frames.

use parley_core::{InboundError, Payload};

/// Parse a text frame and admit it as a [`Payload`].
///
/// Malformed JSON, reserved keys at any depth, and nesting beyond
/// `max_depth` are all rejected.
pub fn decode_frame(text: &str, max_depth: usize) -> Result<Payload, InboundError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    Payload::from_untrusted(value, max_depth)
}
