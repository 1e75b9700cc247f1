//! Server error types.
//!
//! Command failures are mapped to one error reply line via
//! [`CommandError::client_reason`]. Internal details (hashing failures, task
//! join errors) are logged server-side but never put on the wire.

use thiserror::Error;

/// Errors raised by an [`crate::store::EntityStore`] implementation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The referenced row does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A unique constraint was violated (e.g. login already taken).
    #[error("login already exists")]
    DuplicateLogin,

    /// Deleting the last remaining admin account is rejected.
    #[error("cannot delete the last admin account")]
    LastAdmin,

    /// A relational constraint was violated.
    #[error("{0}")]
    Constraint(&'static str),
}

/// Errors raised while executing one client command.
///
/// Variants follow the taxonomy: protocol, authorization, domain, and
/// collaborator (store) errors. Transport errors never reach this type; they
/// terminate the connection's read loop directly.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Malformed command: wrong argument count or unparsable field.
    #[error("invalid command: {0}")]
    Protocol(String),

    /// The command requires an authenticated user.
    #[error("not authenticated")]
    Unauthenticated,

    /// The authenticated user lacks the required role or ownership.
    #[error("{0}")]
    Forbidden(String),

    /// A business rule rejected the command.
    #[error("{0}")]
    Domain(String),

    /// The entity store reported a failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Internal failure (hashing, task join). Details stay server-side.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CommandError {
    /// The reason string put on the wire in the error reply.
    ///
    /// Store errors are surfaced verbatim; internal errors are not.
    #[must_use]
    pub fn client_reason(&self) -> String {
        match self {
            CommandError::Protocol(msg) => msg.clone(),
            CommandError::Unauthenticated => "not authenticated".to_string(),
            CommandError::Forbidden(msg) | CommandError::Domain(msg) => msg.clone(),
            CommandError::Store(err) => err.to_string(),
            CommandError::Internal(_) => "internal error".to_string(),
        }
    }
}

/// Errors raised while starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to hash bootstrap credentials: {0}")]
    Bootstrap(String),
}
