//! Per-connection state and I/O loops.
//!
//! Each admitted connection is split into two tasks that share nothing but
//! the session's outbound queue and its lifetime token:
//!
//! - **Read loop**: reads newline-terminated lines with an idle timeout and
//!   hands each one to the [`Dispatcher`].
//! - **Write loop**: drains the outbound queue, writing one rendered line per
//!   message.
//!
//! Everything else talks to a session through a cloneable [`SessionHandle`].

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::constants::MAX_CONSECUTIVE_READ_ERRORS;
use crate::error::CommandError;
use crate::hub::commands::Dispatcher;
use crate::message::Message;

/// Numeric identity of a session, unique for the lifetime of a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared handle to a live session.
///
/// Cloning is cheap. Holding a clone keeps the outbound queue open, so
/// handles copied out of the registry should be short-lived.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    outbound: mpsc::Sender<Message>,
    lifetime: CancellationToken,
}

impl SessionHandle {
    /// Create a handle around an outbound queue sender with a fresh lifetime.
    pub fn new(id: SessionId, outbound: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            outbound,
            lifetime: CancellationToken::new(),
        }
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queue a message, waiting for room if the queue is full.
    ///
    /// Gives up as soon as either this session's lifetime or `shutdown` is
    /// cancelled, so a stalled destination never blocks the caller past
    /// either of those.
    pub async fn send(
        &self,
        message: Message,
        shutdown: &CancellationToken,
    ) -> Result<(), CommandError> {
        let not_connected = CommandError::ClientNotConnected(self.id);
        tokio::select! {
            biased;
            () = self.lifetime.cancelled() => Err(not_connected),
            () = shutdown.cancelled() => Err(not_connected),
            sent = self.outbound.send(message) => sent.map_err(|_closed| not_connected),
        }
    }

    /// Queue a message only if there is room right now.
    ///
    /// Returns `false` if the session is cancelled or its queue is full.
    pub fn try_send(&self, message: Message) -> bool {
        if self.lifetime.is_cancelled() {
            return false;
        }
        self.outbound.try_send(message).is_ok()
    }

    /// End this session. Idempotent.
    pub fn cancel(&self) {
        self.lifetime.cancel();
    }

    /// Whether the session has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.lifetime.is_cancelled()
    }

    /// Resolves once the session is cancelled.
    pub async fn cancelled(&self) {
        self.lifetime.cancelled().await;
    }

    pub(crate) fn lifetime(&self) -> CancellationToken {
        self.lifetime.clone()
    }
}

/// Returns `true` for I/O errors that mean the peer is gone.
pub(crate) fn is_connection_closed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

/// Outcome of reading one line.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ReadLine {
    /// A complete line, without its terminator.
    Line(String),
    /// A line longer than the limit was read and thrown away.
    TooLong,
}

/// Newline-delimited reader with a length cap.
///
/// Partial input stays in `buf` between calls, so a read that is abandoned
/// by a timeout or `select!` resumes where it stopped.
pub(crate) struct LineReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
    max_len: usize,
    discarding: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub(crate) fn new(reader: R, max_len: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            buf: Vec::new(),
            max_len,
            discarding: false,
        }
    }

    /// Read the next line. `Ok(None)` means the peer closed the stream; an
    /// unterminated trailing fragment is dropped.
    pub(crate) async fn next_line(&mut self) -> io::Result<Option<ReadLine>> {
        loop {
            // Room for max_len bytes plus the terminator.
            let limit = (self.max_len + 1).saturating_sub(self.buf.len()) as u64;
            let n = (&mut self.inner)
                .take(limit)
                .read_until(b'\n', &mut self.buf)
                .await?;
            if n == 0 {
                return Ok(None);
            }

            if self.buf.last() == Some(&b'\n') {
                let raw = std::mem::take(&mut self.buf);
                if std::mem::take(&mut self.discarding) {
                    return Ok(Some(ReadLine::TooLong));
                }
                let line = String::from_utf8_lossy(&raw[..raw.len() - 1]).into_owned();
                return Ok(Some(ReadLine::Line(line)));
            }

            if self.buf.len() > self.max_len {
                self.buf.clear();
                self.discarding = true;
            }
        }
    }
}

/// Read lines from the client until the session ends.
///
/// Returns once the peer closes, the transport becomes unusable, or the
/// session is cancelled (e.g. by `d` or after a shutdown notice). The caller
/// owns retirement.
pub(crate) async fn read_loop<R: AsyncRead + Unpin>(
    session: &SessionHandle,
    reader: R,
    dispatcher: &Dispatcher<'_>,
    read_timeout: Duration,
    max_line_length: usize,
) {
    let id = session.id();
    let mut lines = LineReader::new(reader, max_line_length);
    let mut consecutive_errors = 0u32;

    loop {
        let next = tokio::select! {
            () = session.cancelled() => return,
            next = tokio::time::timeout(read_timeout, lines.next_line()) => next,
        };

        let line = match next {
            // Idle; go round again to re-check cancellation
            Err(_elapsed) => continue,
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => {
                session.cancel();
                return;
            }
            Ok(Err(e)) if is_connection_closed(&e) => {
                log::debug!("[{id}] Connection closed: {e}");
                session.cancel();
                return;
            }
            Ok(Err(e)) => {
                consecutive_errors += 1;
                log::warn!("[{id}] Error reading: {e}");
                if consecutive_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                    log::warn!("[{id}] Too many read errors, closing");
                    session.cancel();
                    return;
                }
                continue;
            }
        };
        consecutive_errors = 0;

        let result = match line {
            ReadLine::Line(text) => {
                log::debug!("[{id}] Received: {text:?}");
                dispatcher.handle_line(session, text.trim()).await
            }
            ReadLine::TooLong => Err(CommandError::LineTooLong(max_line_length)),
        };

        if let Err(e) = result {
            log::warn!("[{id}] Error handling: {e}");
            let reply = Message::response(format!("Error in command: {e}"));
            if dispatcher.reply(session, reply).await.is_err() {
                log::debug!("[{id}] Could not deliver error reply");
            }
        }
    }
}

/// Write queued messages to the client until the queue closes or the session
/// is cancelled.
///
/// Messages already queued when cancellation arrives are still written. After
/// a [`Message::Shutdown`] has been flushed the session cancels itself; the
/// read side then retires it. The write half is handed back rather than
/// closed, so the transport is only shut once the session is unregistered.
pub(crate) async fn write_loop<W: AsyncWrite + Unpin>(
    id: SessionId,
    lifetime: CancellationToken,
    writer: W,
    mut outbound: mpsc::Receiver<Message>,
    write_timeout: Duration,
) -> W {
    let mut writer = BufWriter::new(writer);

    loop {
        let message = tokio::select! {
            biased;
            message = outbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
            () = lifetime.cancelled() => break,
        };

        let line = message.render();
        match tokio::time::timeout(write_timeout, write_line(&mut writer, &line)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if !is_connection_closed(&e) {
                    log::warn!("[{id}] Write error: {e}");
                }
                lifetime.cancel();
                break;
            }
            Err(_elapsed) => {
                log::warn!("[{id}] Write timed out after {:?}", write_timeout);
                lifetime.cancel();
                break;
            }
        }

        if message.is_shutdown() {
            lifetime.cancel();
        }
    }

    writer.into_inner()
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
