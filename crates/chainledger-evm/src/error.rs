//! Errors raised while decoding logs against event ABIs.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Invalid event signature '{signature}': {reason}")]
    InvalidSignature { signature: String, reason: String },

    #[error("Invalid hex in {field}: {reason}")]
    InvalidHex { field: String, reason: String },

    #[error("Expected {expected} topics, found {found}")]
    TopicCount { expected: usize, found: usize },

    #[error("ABI decode failed: {reason}")]
    AbiDecodeFailed { reason: String },

    #[error("Missing argument '{name}' in {event}")]
    MissingArg { event: String, name: String },

    #[error("Argument '{name}' in {event} is not a {expected}")]
    ArgType {
        event: String,
        name: String,
        expected: &'static str,
    },
}
