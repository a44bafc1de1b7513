//! Messages queued for delivery to a session.
//!
//! Every value that reaches a client's transport is a [`Message`]. The variant
//! decides how the line is rendered; rendering happens once, in the session's
//! writer task.

use std::fmt;

use crate::session::SessionId;

/// A single outbound line, tagged by origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Client-to-client message.
    Direct {
        /// Session that issued the `s` command.
        from: SessionId,
        /// Free text after the destination list.
        body: String,
    },
    /// Announcement originated by the hub itself.
    System {
        /// Announcement text.
        body: String,
    },
    /// Final announcement; the receiving session terminates once it is written.
    Shutdown {
        /// Announcement text.
        body: String,
    },
    /// Reply to a command (acks, listings, help, errors), sent verbatim.
    CommandResponse {
        /// Reply text.
        body: String,
    },
}

impl Message {
    /// Build a direct message from `from`.
    pub fn direct(from: SessionId, body: impl Into<String>) -> Self {
        Self::Direct {
            from,
            body: body.into(),
        }
    }

    /// Build a system announcement.
    pub fn system(body: impl Into<String>) -> Self {
        Self::System { body: body.into() }
    }

    /// Build a shutdown notice.
    pub fn shutdown(body: impl Into<String>) -> Self {
        Self::Shutdown { body: body.into() }
    }

    /// Build a command reply.
    pub fn response(body: impl Into<String>) -> Self {
        Self::CommandResponse { body: body.into() }
    }

    /// Whether the receiving session should end after this message is written.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown { .. })
    }

    /// Text of the line as the client sees it, without the trailing newline.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct { from, body } => write!(f, "Message from {from}: {body}"),
            Self::System { body } | Self::Shutdown { body } => {
                write!(f, "System message: {body}")
            }
            Self::CommandResponse { body } => f.write_str(body),
        }
    }
}
