//! Hub errors.

use courier_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised while handling an inbound event.
///
/// These are logged at the dispatch boundary and never sent to the peer.
#[derive(Debug, Error)]
pub enum HubError {
    /// The frame could not be turned into a typed event.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The event needs a user but the connection never ran `setup`.
    #[error("Connection {0} is not bound to a user")]
    NotBound(String),

    /// `setup` named a different user than the one already bound.
    #[error("Connection {connection} is already bound to user {bound}")]
    AlreadyBound { connection: String, bound: String },

    /// The connection is not registered (already closed or terminated).
    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    /// A required identifier was missing or could not be normalized.
    #[error("Missing identifier: {0}")]
    MissingIdentifier(&'static str),
}
