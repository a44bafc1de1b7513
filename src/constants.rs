//! Application-wide constants for msghub.
//!
//! Defaults for everything [`HubConfig`](crate::config::HubConfig) can
//! override, plus the fixed texts the hub sends to clients.
//!
//! # Categories
//!
//! - **Network**: Listen address and line limits
//! - **Timeouts**: Read idle window, write bound, shutdown grace
//! - **Queues**: Outbound queue sizing
//! - **Texts**: Help and shutdown notices

use std::time::Duration;

// ============================================================================
// Network
// ============================================================================

/// Default TCP port the hub listens on.
pub const DEFAULT_PORT: u16 = 7000;

/// Longest accepted input line in bytes, excluding the newline.
///
/// Longer lines are discarded up to their terminator and answered with an
/// error, so one client cannot grow the server's read buffer without bound.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

// ============================================================================
// Timeouts
// ============================================================================

/// Idle window for a single line read.
///
/// The reader wakes at least this often on a silent connection so it can
/// notice cancellation.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound for writing and flushing one outbound line.
///
/// A peer that stops reading fills its socket buffer; after this long the
/// transport is treated as unusable and the session is torn down.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long shutdown waits for sessions to leave on their own before
/// cancelling the stragglers.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Consecutive non-fatal read errors tolerated before a transport is
/// considered unusable.
pub const MAX_CONSECUTIVE_READ_ERRORS: u32 = 8;

// ============================================================================
// Queues
// ============================================================================

/// Capacity of each session's outbound message queue.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 10;

// ============================================================================
// Texts
// ============================================================================

/// Welcome text sent on connect and in reply to `?`.
pub const HELP_TEXT: &str = "Welcome! Commands:
w  ask for clients
s  broadcast message (example: s 1,2 message)
a  ask for id
d  disconnect
?  this message
----";

/// Body of the notice every session receives when the hub shuts down.
pub const SHUTDOWN_NOTICE: &str = "Server shutting down...";
