use thiserror::Error;

use crate::client::ClientId;

/// Errors raised by the broadcast hub.
///
/// `Decode`, `TransformMismatch` and `Delivery` concern a single message and
/// are logged where they occur; none of them stops the hub.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("malformed market event: {0}")]
    Decode(String),

    #[error("failed to encode message for {feed}: {reason}")]
    Encode { feed: &'static str, reason: String },

    #[error("{feed} feed cannot transform {event} events")]
    TransformMismatch {
        feed: &'static str,
        event: &'static str,
    },

    #[error("unknown product: {0}")]
    UnknownProduct(String),

    #[error("unknown feed: {0}")]
    UnknownFeed(String),

    #[error("{feed} feed requires an authenticated session")]
    Unauthenticated { feed: &'static str },

    #[error("delivery to client {client_id} failed: {reason}")]
    Delivery { client_id: ClientId, reason: String },
}
