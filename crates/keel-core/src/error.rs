//! Error taxonomy shared by one-shot calls and the event stream.

/// Errors produced while talking to the engine.
///
/// One-shot calls return these directly. The event stream never returns
/// them; it forwards them as [`EventNotification::Error`](crate::events::EventNotification)
/// and reconnects, which is why every variant is `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The transport could not be established (socket refused, DNS, TLS, aborted).
    #[error("failed to connect to {target}: {reason}")]
    Connection { target: String, reason: String },

    /// The engine answered with a status outside the success/empty set.
    #[error("engine returned status {status}: {body}")]
    Protocol { status: u16, body: String },

    /// The engine answered successfully but the body was not valid JSON.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The connection failed while a streaming body was being read.
    #[error("stream interrupted: {0}")]
    Stream(String),

    /// The request could not be built (bad method, header, or URI).
    #[error("invalid request: {0}")]
    Request(String),
}

impl ClientError {
    /// Status code for protocol failures, `None` otherwise.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }
}
