//! Decode failures for inbound wire events.

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("event is not a JSON object with a string `type` field")]
    MissingType,

    #[error("invalid `{event_type}` event: {source}")]
    Invalid {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::MissingType => "missing_type",
            Self::Invalid { .. } => "invalid_event",
        }
    }
}
