//! Hub - accepts connections and owns every live session.
//!
//! The Hub binds the listen address, admits each connection as a session and
//! coordinates shutdown. Sessions never talk to each other directly: the
//! command dispatcher looks destinations up in the shared registry and queues
//! messages on their outbound queues.
//!
//! # Architecture
//!
//! ```text
//!   TcpListener ──accept──▶ Hub::attach ──▶ SessionRegistry
//!                               │
//!              ┌────────────────┴────────────────┐
//!              ▼                                 ▼
//!        read loop (task)                  write loop (task)
//!   line → Dispatcher → queues     ◀──────  outbound queue → socket
//! ```
//!
//! # Shutdown
//!
//! The hub holds a child of the caller's cancellation token. Cancelling
//! either one stops the accept loop; [`Hub::shutdown`] then sends every
//! session a shutdown notice and waits on a [`TaskTracker`] until all session
//! tasks have exited.

// Rust guideline compliant 2026-02

pub mod commands;
pub mod registry;

pub use commands::{Command, Dispatcher};
pub use registry::SessionRegistry;

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::HubConfig;
use crate::constants::{HELP_TEXT, SHUTDOWN_NOTICE};
use crate::error::HubError;
use crate::message::Message;
use crate::session::{self, SessionHandle, SessionId};

/// Central owner of sessions for one listening endpoint.
///
/// Cloning is cheap; clones share the same registry and shutdown state.
#[derive(Debug, Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

#[derive(Debug)]
struct HubInner {
    config: HubConfig,
    registry: SessionRegistry,
    /// Next id to hand out; ids start at 1 and are never reused.
    next_id: AtomicU64,
    /// Child of the caller's token.
    shutdown: CancellationToken,
    /// Every session task, for the shutdown barrier.
    tracker: TaskTracker,
    shutdown_started: AtomicBool,
}

impl Hub {
    /// Create a hub that stops when `shutdown` (or [`Hub::shutdown`]) fires.
    pub fn new(config: HubConfig, shutdown: &CancellationToken) -> Self {
        Self {
            inner: Arc::new(HubInner {
                config,
                registry: SessionRegistry::new(),
                next_id: AtomicU64::new(1),
                shutdown: shutdown.child_token(),
                tracker: TaskTracker::new(),
                shutdown_started: AtomicBool::new(false),
            }),
        }
    }

    /// Bind `addr` and accept connections until shutdown.
    ///
    /// # Errors
    ///
    /// [`HubError::Bind`] if the address cannot be bound (no session is ever
    /// created), [`HubError::Accept`] if accepting fails unexpectedly.
    pub async fn start(&self, addr: &str) -> Result<(), HubError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| HubError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener until shutdown.
    ///
    /// Returns `Ok(())` once shutdown has completed. An unexpected accept
    /// error also shuts the hub down before it is returned, so no session task
    /// outlives this call.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), HubError> {
        match listener.local_addr() {
            Ok(local) => log::info!("Listening on {}", local),
            Err(e) => log::warn!("Listening on unknown address: {e}"),
        }

        let outcome = loop {
            let accepted = tokio::select! {
                biased;
                () = self.inner.shutdown.cancelled() => break Ok(()),
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        log::debug!("Could not set TCP_NODELAY for {peer}: {e}");
                    }
                    self.attach(stream, peer);
                }
                Err(e) if is_transient_accept_error(&e) => {
                    log::warn!("Accept error (continuing): {e}");
                }
                Err(e) => {
                    log::error!("Accept error: {e}");
                    break Err(HubError::Accept(e));
                }
            }
        };

        drop(listener);
        self.shutdown().await;
        outcome
    }

    /// Admit a connected byte stream as a new session.
    ///
    /// The session is registered before its tasks start, so it can receive
    /// messages from the moment its id exists. Returns `None` if the hub is
    /// already shutting down, in which case the stream is dropped.
    pub fn attach<S>(&self, stream: S, peer: impl fmt::Display) -> Option<SessionId>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        if self.inner.shutdown.is_cancelled() {
            log::info!("Refusing connection from {peer}: shutting down");
            return None;
        }

        // Keeps `shutdown` from seeing an empty tracker until our tasks are
        // spawned.
        let _admitting = self.inner.tracker.token();

        let id = SessionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (outbound_tx, outbound_rx) = mpsc::channel(self.inner.config.queue_capacity.max(1));
        let session = SessionHandle::new(id, outbound_tx);
        self.inner.registry.insert(session.clone());

        // Shutdown may have taken its broadcast snapshot between the check
        // above and the insert.
        if self.inner.shutdown_started.load(Ordering::SeqCst) {
            self.inner.registry.remove(id);
            log::info!("Refusing connection from {peer}: shutting down");
            return None;
        }

        log::info!("[{id}] connected ({peer})");

        let (read_half, write_half) = tokio::io::split(stream);
        let writer = self.inner.tracker.spawn(session::write_loop(
            id,
            session.lifetime(),
            write_half,
            outbound_rx,
            self.inner.config.write_timeout(),
        ));
        self.inner
            .tracker
            .spawn(self.clone().run_session(session, read_half, writer));

        Some(id)
    }

    /// Connection task: greet, read until the session ends, then retire it.
    async fn run_session<R, W>(self, session: SessionHandle, reader: R, writer: JoinHandle<W>)
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let id = session.id();
        let inner = &self.inner;
        let dispatcher = Dispatcher::new(&inner.registry, &inner.shutdown);

        if dispatcher
            .reply(&session, Message::response(HELP_TEXT))
            .await
            .is_err()
        {
            log::debug!("[{id}] Could not queue welcome text");
        }

        session::read_loop(
            &session,
            reader,
            &dispatcher,
            inner.config.read_timeout(),
            inner.config.max_line_length,
        )
        .await;

        // Retirement: cancel, unregister, release our queue sender, and only
        // then close the transport the writer hands back.
        session.cancel();
        inner.registry.remove(id);
        drop(session);
        match writer.await {
            Ok(mut transport) => {
                let close = transport.shutdown();
                match tokio::time::timeout(inner.config.write_timeout(), close).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => log::debug!("[{id}] Could not close transport: {e}"),
                    Err(_elapsed) => log::debug!("[{id}] Closing transport timed out"),
                }
            }
            Err(e) => log::error!("[{id}] Writer task failed: {e}"),
        }

        if inner.shutdown.is_cancelled() {
            log::info!("[{id}] disconnected (shutting down)");
        } else {
            log::info!("[{id}] disconnected");
        }
    }

    /// Queue `message` on every live session without waiting.
    ///
    /// Sessions whose queue is full or that are already ending are skipped.
    /// Returns the number of sessions that accepted the message.
    pub fn broadcast(&self, message: &Message) -> usize {
        let mut delivered = 0;
        for session in self.inner.registry.snapshot() {
            if session.try_send(message.clone()) {
                delivered += 1;
            } else {
                log::debug!("[{}] Skipped broadcast: queue full or closing", session.id());
            }
        }
        delivered
    }

    /// Stop accepting, notify every session and wait until all have exited.
    ///
    /// Safe to call more than once and from any task; only the first call
    /// notifies and cancels, every call waits for the sessions to drain.
    /// Sessions that have not left after the configured grace period are
    /// cancelled.
    pub async fn shutdown(&self) {
        let inner = &self.inner;

        if !inner.shutdown_started.swap(true, Ordering::SeqCst) {
            let notified = self.broadcast(&Message::shutdown(SHUTDOWN_NOTICE));
            log::info!(
                "Shutting down, notified {}/{} session(s)",
                notified,
                inner.registry.len()
            );
            inner.shutdown.cancel();
            inner.tracker.close();
        }

        let grace = inner.config.shutdown_grace();
        if tokio::time::timeout(grace, inner.tracker.wait()).await.is_err() {
            let stragglers = inner.registry.snapshot();
            log::warn!(
                "{} session(s) still open after {:?}, cancelling",
                stragglers.len(),
                grace
            );
            for session in stragglers {
                session.cancel();
            }
            inner.tracker.wait().await;
        }

        log::info!("All sessions closed");
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Ids of connected sessions, ascending.
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.inner.registry.ids().into_iter().collect()
    }

    /// Number of connected sessions.
    pub fn session_count(&self) -> usize {
        self.inner.registry.len()
    }
}

/// Accept errors that concern a single pending connection, not the listener.
fn is_transient_accept_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}
