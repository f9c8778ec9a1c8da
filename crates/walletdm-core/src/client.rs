//! Client lifecycle management
//!
//! [`ClientManager`] owns the one active protocol client for the current
//! identity. Identity changes drive a small state machine:
//!
//! ```text
//! Idle ──identity set──> Initializing ──connect ok──> Ready
//!                            │
//!                            └─connect err──> Failed
//! ```
//!
//! Any identity change (including clearing) invalidates whatever was in
//! flight: each initialization carries a generation number, and a
//! completion whose generation no longer matches the current one is
//! discarded instead of applied. Two overlapping initializations can
//! therefore resolve in either order without the stale one clobbering the
//! newer state.
//!
//! Failures are captured as [`ClientPhase::Failed`], never thrown across
//! the lifecycle boundary; consumers observe state and subscribe to
//! [`ClientEvent`] broadcasts.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::backend::{ClientConfig, MessagingBackend, MessagingClient, ProtocolSigner};
use crate::error::DmResult;
use crate::session::Conversations;
use crate::spamgate::SpamGate;

/// Default capacity for the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle state of the active protocol client
pub enum ClientPhase<C> {
    /// No identity; no client
    Idle,
    /// A client for the current identity is being created
    Initializing,
    /// Client is ready for use
    Ready(Arc<C>),
    /// Client creation failed; retried on the next identity change
    Failed(String),
}

impl<C> ClientPhase<C> {
    pub fn kind(&self) -> PhaseKind {
        match self {
            ClientPhase::Idle => PhaseKind::Idle,
            ClientPhase::Initializing => PhaseKind::Initializing,
            ClientPhase::Ready(_) => PhaseKind::Ready,
            ClientPhase::Failed(_) => PhaseKind::Failed,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ClientPhase::Ready(_))
    }

    /// Failure message, if the phase is `Failed`
    pub fn failure(&self) -> Option<&str> {
        match self {
            ClientPhase::Failed(message) => Some(message),
            _ => None,
        }
    }
}

impl<C> Clone for ClientPhase<C> {
    fn clone(&self) -> Self {
        match self {
            ClientPhase::Idle => ClientPhase::Idle,
            ClientPhase::Initializing => ClientPhase::Initializing,
            ClientPhase::Ready(client) => ClientPhase::Ready(client.clone()),
            ClientPhase::Failed(message) => ClientPhase::Failed(message.clone()),
        }
    }
}

impl<C> fmt::Debug for ClientPhase<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientPhase::Idle => write!(f, "Idle"),
            ClientPhase::Initializing => write!(f, "Initializing"),
            ClientPhase::Ready(_) => write!(f, "Ready(..)"),
            ClientPhase::Failed(message) => f.debug_tuple("Failed").field(message).finish(),
        }
    }
}

/// Phase discriminant, used in events and assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Idle,
    Initializing,
    Ready,
    Failed,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseKind::Idle => write!(f, "idle"),
            PhaseKind::Initializing => write!(f, "initializing"),
            PhaseKind::Ready => write!(f, "ready"),
            PhaseKind::Failed => write!(f, "failed"),
        }
    }
}

/// Lifecycle events broadcast to observers
#[derive(Debug, Clone)]
pub enum ClientEvent {
    PhaseChanged {
        phase: PhaseKind,
        identity: Option<Address>,
    },
}

struct ManagerInner<C: MessagingClient> {
    phase: RwLock<ClientPhase<C>>,
    identity: RwLock<Option<Address>>,
    /// Bumped on every identity change; stale completions compare against it
    generation: AtomicU64,
    event_tx: broadcast::Sender<ClientEvent>,
    sessions: Conversations<C>,
}

impl<C: MessagingClient> ManagerInner<C> {
    fn emit_phase(&self) {
        let phase = self.phase.read().kind();
        let identity = self.identity.read().clone();
        let _ = self.event_tx.send(ClientEvent::PhaseChanged { phase, identity });
    }

    /// Apply an initialization result, unless a newer identity change
    /// already superseded it.
    fn complete(&self, generation: u64, identity: &Address, result: DmResult<C>) {
        let mut phase = self.phase.write();
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(%identity, generation, "discarding stale client initialization");
            return;
        }
        match result {
            Ok(client) => {
                info!(%identity, "messaging client ready");
                *phase = ClientPhase::Ready(Arc::new(client));
            }
            Err(error) => {
                warn!(%identity, %error, "client initialization failed");
                *phase = ClientPhase::Failed(error.to_string());
            }
        }
        drop(phase);
        self.emit_phase();
    }
}

/// Owner of the one active protocol client for the current identity.
///
/// Cheap to clone; clones share the same lifecycle state.
pub struct ClientManager<B: MessagingBackend> {
    backend: B,
    config: ClientConfig,
    inner: Arc<ManagerInner<B::Client>>,
}

impl<B: MessagingBackend> Clone for ClientManager<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            config: self.config.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<B: MessagingBackend> ClientManager<B> {
    pub fn new(backend: B, config: ClientConfig, gate: Arc<SpamGate>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            backend,
            config,
            inner: Arc::new(ManagerInner {
                phase: RwLock::new(ClientPhase::Idle),
                identity: RwLock::new(None),
                generation: AtomicU64::new(0),
                event_tx,
                sessions: Conversations::new(gate),
            }),
        }
    }

    /// Snapshot of the current lifecycle phase
    pub fn phase(&self) -> ClientPhase<B::Client> {
        self.inner.phase.read().clone()
    }

    /// The active client, if the phase is `Ready`
    pub fn client(&self) -> Option<Arc<B::Client>> {
        match &*self.inner.phase.read() {
            ClientPhase::Ready(client) => Some(client.clone()),
            _ => None,
        }
    }

    /// Identity the current phase belongs to
    pub fn identity(&self) -> Option<Address> {
        self.inner.identity.read().clone()
    }

    /// Conversation sessions owned by the active client.
    ///
    /// All sessions are closed whenever the identity changes.
    pub fn sessions(&self) -> &Conversations<B::Client> {
        &self.inner.sessions
    }

    /// Subscribe to lifecycle events
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.event_tx.subscribe()
    }

    /// React to an identity change.
    ///
    /// `None` discards the client and returns to `Idle`. `Some(signer)`
    /// starts an asynchronous initialization bound to that identity,
    /// unless one is already in flight (or complete) for the same identity
    /// with no intervening change, in which case this is a no-op.
    ///
    /// Never blocks: the transition to `Initializing` is immediate and the
    /// outcome lands in the phase later.
    pub fn set_identity<S: ProtocolSigner>(&self, signer: Option<S>) {
        let Some(signer) = signer else {
            self.clear_identity();
            return;
        };

        let identity = match signer.identifier() {
            Ok(identity) => identity,
            Err(error) => {
                warn!(%error, "signer has no usable identity");
                let mut phase = self.inner.phase.write();
                self.inner.generation.fetch_add(1, Ordering::SeqCst);
                self.inner.sessions.close_all();
                *phase = ClientPhase::Failed(error.to_string());
                *self.inner.identity.write() = None;
                drop(phase);
                self.inner.emit_phase();
                return;
            }
        };

        let generation = {
            let mut phase = self.inner.phase.write();

            let unchanged = self.inner.identity.read().as_ref() == Some(&identity);
            if unchanged && matches!(*phase, ClientPhase::Ready(_) | ClientPhase::Initializing) {
                debug!(%identity, "identity unchanged, keeping existing client");
                return;
            }

            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.inner.sessions.close_all();
            *phase = ClientPhase::Initializing;
            *self.inner.identity.write() = Some(identity.clone());
            generation
        };
        self.inner.emit_phase();
        info!(%identity, generation, "initializing messaging client");

        let inner = self.inner.clone();
        let backend = self.backend.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            let result = backend.connect(signer, config).await;
            inner.complete(generation, &identity, result);
        });
    }

    /// Discard the client and all its conversations, returning to `Idle`.
    pub fn clear_identity(&self) {
        let mut phase = self.inner.phase.write();
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.sessions.close_all();
        *phase = ClientPhase::Idle;
        *self.inner.identity.write() = None;
        drop(phase);
        info!("identity cleared, client discarded");
        self.inner.emit_phase();
    }
}
