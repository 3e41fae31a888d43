//! Error types for SancharLink

use crate::store::ConfigField;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// SancharLink error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Process configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Actuator driver failure
    #[error("Actuator error on channel {channel}: {reason}")]
    Actuator {
        /// Channel number (1-based motor id)
        channel: u8,
        /// Driver-supplied reason
        reason: String,
    },

    /// Outbound serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}

/// Why an inbound datagram was dropped before dispatch.
///
/// Every variant means "no reply"; the decoder never hands out a partially
/// populated envelope.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// Bytes are not a JSON object
    #[error("malformed message: {0}")]
    Malformed(String),

    /// No `protocol` field
    #[error("missing protocol tag")]
    MissingProtocol,

    /// `protocol` present but not ours
    #[error("protocol mismatch: expected {expected:?}, got {actual:?}")]
    ProtocolMismatch {
        /// Configured protocol tag
        expected: String,
        /// Tag carried by the datagram
        actual: String,
    },

    /// `message_type` absent or not one we know
    #[error("unknown message kind: {0}")]
    UnknownMessageKind(String),

    /// Kind requires a payload object and none was given
    #[error("missing payload object")]
    MissingPayload,

    /// Required envelope or payload field absent
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// Field present with the wrong shape or out of range
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Field name as it appears on the wire
        field: &'static str,
        /// Human readable reason
        reason: String,
    },

    /// Payload carries a key the kind does not define
    #[error("unknown field `{0}`")]
    UnknownField(String),
}

impl DecodeError {
    /// True once the protocol tag has been validated.
    ///
    /// The sender of such a datagram becomes the backend endpoint even though
    /// the datagram itself is dropped.
    pub fn protocol_accepted(&self) -> bool {
        !matches!(
            self,
            DecodeError::Malformed(_)
                | DecodeError::MissingProtocol
                | DecodeError::ProtocolMismatch { .. }
        )
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        DecodeError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Configuration store write rejections
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Value shape does not match the field's declared type
    #[error("{field} expects {expected}, got {actual}")]
    TypeMismatch {
        /// Target field
        field: ConfigField,
        /// Declared type of the field
        expected: &'static str,
        /// Shape of the rejected value
        actual: &'static str,
    },

    /// Right shape, but outside the accepted range or name set
    #[error("{field} does not accept {value}")]
    OutOfRange {
        /// Target field
        field: ConfigField,
        /// Rejected value rendered for logs and feedback
        value: String,
    },
}
