use thiserror::Error;

/// Errors raised while decoding an inbound real-time frame.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Invalid payload for {event}: {source}")]
    InvalidPayload {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Empty identity")]
    EmptyIdentity,
}

impl ProtocolError {
    /// Stable machine-readable code sent back in `error` acknowledgements.
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::Malformed(_) => "malformed_frame",
            ProtocolError::UnknownEvent(_) => "unknown_event",
            ProtocolError::InvalidPayload { .. } => "invalid_payload",
            ProtocolError::EmptyIdentity => "invalid_identity",
        }
    }
}
