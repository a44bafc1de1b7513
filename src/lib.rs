//! msghub - in-memory message hub for line-oriented TCP clients.
//!
//! Clients connect over TCP, are assigned a numeric id, and exchange
//! newline-terminated text messages with each other through a single hub
//! process. Nothing is persisted; the hub only knows the clients attached to
//! it right now.
//!
//! # Architecture
//!
//! - **Hub** - Owns the listener, the session registry and the shutdown signal
//! - **Session** - One connection: id, outbound queue, lifetime, reader/writer tasks
//! - **Dispatcher** - Turns an input line into registry queries and queued messages
//! - **Message** - Closed set of outbound line kinds
//!
//! # Modules
//!
//! - [`hub`] - Accept loop, admission, broadcast and shutdown
//! - [`session`] - Session handle and the per-connection I/O loops
//! - [`message`] - Outbound message variants and rendering
//! - [`config`] - Configuration loading
//! - [`error`] - Command and hub errors

pub mod config;
pub mod constants;
pub mod error;
pub mod hub;
pub mod message;
pub mod session;

// Re-export commonly used types
pub use config::HubConfig;
pub use error::{CommandError, HubError};
pub use hub::{Hub, SessionRegistry};
pub use message::Message;
pub use session::{SessionHandle, SessionId};
