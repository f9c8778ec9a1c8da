//! Conversation sessions with live message streaming
//!
//! A [`DmSession`] owns the ordered message history for one peer plus a
//! background task consuming the conversation's live stream. The
//! [`Conversations`] registry caches sessions per peer for the lifetime of
//! the owning client, so reopening a conversation never duplicates the
//! subscription.
//!
//! ## Message flow
//!
//! **Opening:** sync the client's directory, resolve-or-create the DM,
//! load full history in sequence order, then subscribe.
//!
//! **Receiving:** each stream item passes through the [`SpamGate`] and a
//! dedup check before being appended in arrival order. The stream is
//! unbounded; consumers must read appended messages promptly.
//!
//! **Sending:** forwarded to the backend without a local echo. The sent
//! message's canonical position arrives back through the live stream.
//!
//! Closing a session cancels the stream task cooperatively: the task
//! observes the cancellation signal within one iteration of its receive
//! loop, and late in-flight items are never appended afterwards.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::backend::{DmHandle, MessagingClient};
use crate::error::{DmError, DmResult};
use crate::message::DmMessage;
use crate::spamgate::SpamGate;

/// Buffered messages plus the dedup index, shared with the stream task
struct Buffer {
    messages: Vec<DmMessage>,
    seen: HashSet<String>,
}

impl Buffer {
    /// Append unless the `(sender, sequence)` id was already buffered
    fn append(&mut self, message: DmMessage) -> bool {
        if !self.seen.insert(message.id()) {
            return false;
        }
        self.messages.push(message);
        true
    }
}

/// An open conversation with one peer.
///
/// The peer address is immutable for the lifetime of the session; talking
/// to a different peer means opening a different session.
pub struct DmSession<D: DmHandle> {
    peer: Address,
    dm: D,
    buffer: Arc<Mutex<Buffer>>,
    gated: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl<D: DmHandle> DmSession<D> {
    fn start(
        me: Address,
        peer: Address,
        dm: D,
        history: Vec<DmMessage>,
        rx: mpsc::UnboundedReceiver<DmMessage>,
        gate: Arc<SpamGate>,
    ) -> Self {
        let mut buffer = Buffer {
            messages: Vec::with_capacity(history.len()),
            seen: HashSet::new(),
        };
        for message in history {
            buffer.append(message);
        }
        let buffer = Arc::new(Mutex::new(buffer));
        let gated = Arc::new(AtomicU64::new(0));
        let cancel = CancellationToken::new();

        tokio::spawn(stream_task(
            me,
            peer.clone(),
            rx,
            buffer.clone(),
            gate,
            gated.clone(),
            cancel.clone(),
        ));

        Self {
            peer,
            dm,
            buffer,
            gated,
            cancel,
        }
    }

    /// Peer this session talks to
    pub fn peer(&self) -> &Address {
        &self.peer
    }

    /// Snapshot of the buffered message sequence, oldest first
    pub fn messages(&self) -> Vec<DmMessage> {
        self.buffer.lock().messages.clone()
    }

    pub fn message_count(&self) -> usize {
        self.buffer.lock().messages.len()
    }

    /// Number of inbound stream messages dropped by the spam gate
    pub fn gated_count(&self) -> u64 {
        self.gated.load(Ordering::Relaxed)
    }

    /// Deliver a message to the peer.
    ///
    /// Fire-and-forget from the consumer's perspective: there is no local
    /// echo, the stream round-trip is the source of truth.
    ///
    /// # Errors
    ///
    /// Returns `DmError::NotInitialized` once the session has been closed.
    pub async fn send(&self, content: &str) -> DmResult<()> {
        if self.cancel.is_cancelled() {
            return Err(DmError::NotInitialized);
        }
        self.dm.send(content).await
    }

    /// Cancel the live subscription and stop appending. Idempotent.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            debug!(peer = %self.peer, "closing conversation session");
            self.cancel.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<D: DmHandle> Drop for DmSession<D> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn stream_task(
    me: Address,
    peer: Address,
    mut rx: mpsc::UnboundedReceiver<DmMessage>,
    buffer: Arc<Mutex<Buffer>>,
    gate: Arc<SpamGate>,
    gated: Arc<AtomicU64>,
    cancel: CancellationToken,
) {
    debug!(%peer, "live subscription started");

    loop {
        tokio::select! {
            // Cancellation checked first so a close stops appends even
            // when the channel still holds undelivered items.
            biased;

            _ = cancel.cancelled() => break,

            item = rx.recv() => {
                match item {
                    Some(message) => {
                        // Self-originated echoes bypass the gate; only
                        // foreign senders count against it.
                        if !message.is_from(&me) && gate.should_block(message.sender.as_str()) {
                            gated.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                %peer,
                                sender = %message.sender,
                                "dropping gated inbound message"
                            );
                            continue;
                        }
                        if !buffer.lock().append(message) {
                            debug!(%peer, "skipping duplicate stream message");
                        }
                    }
                    None => {
                        debug!(%peer, "message stream closed by backend");
                        break;
                    }
                }
            }
        }
    }

    debug!(%peer, "live subscription ended");
}

/// Per-client registry of open conversation sessions, keyed by peer.
///
/// Sessions are created lazily on first [`open`](Conversations::open) and
/// cached until [`close_all`](Conversations::close_all) runs, which
/// happens when the owning client is replaced.
pub struct Conversations<C: MessagingClient> {
    sessions: Mutex<HashMap<Address, Arc<DmSession<C::Dm>>>>,
    gate: Arc<SpamGate>,
}

impl<C: MessagingClient> Conversations<C> {
    pub fn new(gate: Arc<SpamGate>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            gate,
        }
    }

    /// Resolve or create the session for a peer.
    ///
    /// A second `open` for an already-open peer returns the cached session
    /// without touching the backend, so the live subscription is never
    /// duplicated. The peer address arrives normalized by construction of
    /// [`Address`].
    ///
    /// Reachability is the caller's concern: pre-screen with
    /// [`ensure_can_message`](crate::backend::ensure_can_message) before
    /// opening a conversation with an unknown peer.
    pub async fn open(&self, client: &C, peer: &Address) -> DmResult<Arc<DmSession<C::Dm>>> {
        if let Some(session) = self.sessions.lock().get(peer) {
            return Ok(session.clone());
        }

        info!(%peer, "opening conversation");

        client.sync_conversations().await?;
        let dm = client.find_or_create_dm(peer).await?;
        dm.sync().await?;

        let mut history = dm.messages().await?;
        history.sort_by_key(|m| m.sequence);

        let rx = dm.subscribe().await?;
        let session = Arc::new(DmSession::start(
            client.inbox_address(),
            peer.clone(),
            dm,
            history,
            rx,
            self.gate.clone(),
        ));

        let mut sessions = self.sessions.lock();
        // A concurrent open for the same peer may have won while we were
        // syncing; keep the first session and discard ours.
        if let Some(existing) = sessions.get(peer) {
            session.close();
            return Ok(existing.clone());
        }
        sessions.insert(peer.clone(), session.clone());
        Ok(session)
    }

    /// Currently open session for a peer, if any
    pub fn get(&self, peer: &Address) -> Option<Arc<DmSession<C::Dm>>> {
        self.sessions.lock().get(peer).cloned()
    }

    /// Close and forget the session for a peer.
    ///
    /// Returns `true` if a session was open.
    pub fn close(&self, peer: &Address) -> bool {
        match self.sessions.lock().remove(peer) {
            Some(session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    /// Close every open session. Runs when the owning client is replaced.
    pub fn close_all(&self) {
        let sessions = std::mem::take(&mut *self.sessions.lock());
        if !sessions.is_empty() {
            info!(count = sessions.len(), "closing all conversation sessions");
        }
        for session in sessions.values() {
            session.close();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

// Session behavior is exercised end-to-end against the in-memory backend
// in tests/session_integration.rs.
