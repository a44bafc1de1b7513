//! Error types for the message hub.
//!
//! [`CommandError`] stays inside a session: it is rendered back to the client
//! that issued the command. [`HubError`] is the only error that crosses from
//! the hub to its caller.

use std::fmt;
use std::io;

use crate::session::SessionId;

/// Why a client command could not be carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// `s` without both a destination list and a message.
    InvalidParameters,
    /// A destination token is not a non-negative integer.
    InvalidDestination {
        /// Offending token as typed.
        token: String,
        /// Parser failure text.
        reason: String,
    },
    /// The destination list names the sender.
    SelfMessage,
    /// A destination was not connected when the list was validated.
    NotConnected(SessionId),
    /// The destination list contained no ids.
    NoClients,
    /// A destination went away (or shut down) before the message was queued.
    ClientNotConnected(SessionId),
    /// First token is not a known command.
    Unhandled,
    /// Input line exceeded the configured limit.
    LineTooLong(usize),
}

impl CommandError {
    pub(crate) fn invalid_destination(token: &str, reason: impl fmt::Display) -> Self {
        Self::InvalidDestination {
            token: token.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameters => write!(f, "Invalid parameters"),
            Self::InvalidDestination { token, reason } => {
                write!(f, "Invalid destination {token}: {reason}")
            }
            Self::SelfMessage => write!(f, "Can't send messages to yourself!"),
            Self::NotConnected(id) => write!(f, "Invalid destination {id}: Not connected"),
            Self::NoClients => write!(f, "No clients specified"),
            Self::ClientNotConnected(id) => write!(f, "Client {id} not connected"),
            Self::Unhandled => write!(f, "Unhandled command"),
            Self::LineTooLong(max) => write!(f, "Line too long (max {max} bytes)"),
        }
    }
}

impl std::error::Error for CommandError {}

/// Failures reported to whoever runs the hub.
#[derive(Debug)]
pub enum HubError {
    /// The listen address could not be bound; no session was created.
    Bind {
        /// Address as given by the caller.
        addr: String,
        /// Underlying socket error.
        source: io::Error,
    },
    /// Accepting stopped for a reason other than shutdown.
    Accept(io::Error),
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind { addr, source } => write!(f, "Failed to bind {addr}: {source}"),
            Self::Accept(e) => write!(f, "Accept failed: {e}"),
        }
    }
}

impl std::error::Error for HubError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bind { source, .. } => Some(source),
            Self::Accept(e) => Some(e),
        }
    }
}
