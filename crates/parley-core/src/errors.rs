//! Protocol validation errors.
//!
//! These never escape a connection: the router logs them and drops the
//! offending frame.

use thiserror::Error;

/// Why an inbound frame could not be turned into an envelope.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The frame parsed, but was not a JSON object.
    #[error("envelope must be a JSON object")]
    NotAnObject,

    /// The `type` field was absent or not a string.
    #[error("envelope is missing a string `type` field")]
    MissingType,

    /// The `data` field did not match the shape required by `kind`.
    #[error("invalid `{kind}` payload: {source}")]
    InvalidPayload {
        /// Envelope kind whose payload was rejected.
        kind: String,
        /// Underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    /// Short machine-readable label, used as a metrics label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "invalid_json",
            Self::NotAnObject => "not_an_object",
            Self::MissingType => "missing_type",
            Self::InvalidPayload { .. } => "invalid_payload",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_json_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("nope").unwrap_err();
        let err = ProtocolError::InvalidJson(json_err);
        assert!(err.to_string().starts_with("invalid JSON"));
        assert_eq!(err.label(), "invalid_json");
    }

    #[test]
    fn invalid_payload_names_kind() {
        let json_err = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        let err = ProtocolError::InvalidPayload {
            kind: "CHAT_MESSAGE".into(),
            source: json_err,
        };
        assert!(err.to_string().contains("`CHAT_MESSAGE`"));
        assert_eq!(err.label(), "invalid_payload");
    }

    #[test]
    fn labels_are_snake_case() {
        for err in [ProtocolError::NotAnObject, ProtocolError::MissingType] {
            assert!(err.label().chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
