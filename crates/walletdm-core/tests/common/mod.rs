//! In-memory fake wallet and messaging backend for integration tests
//!
//! `FakeBackend` simulates the external protocol SDK: connects are
//! delayed or failed per identity, conversations hold seeded histories,
//! and tests push stream events with [`FakeBackend::emit`]. No network,
//! no timing flakiness.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use walletdm_core::{
    Address, ClientConfig, ConversationSummary, DmError, DmHandle, DmMessage, DmResult,
    MessagingBackend, MessagingClient, ProtocolSigner, Wallet,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("walletdm_core=debug")
        .with_test_writer()
        .try_init();
}

/// Shorthand for a parsed address in tests
pub fn addr(raw: &str) -> Address {
    Address::parse(raw).expect("test address should parse")
}

/// A valid 40-hex address made of one repeated byte, e.g. `aa(0xab)`
pub fn addr_of(byte: &str) -> Address {
    addr(&format!("0x{}", byte.repeat(20)))
}

pub fn msg(sender: &Address, content: &str, sequence: u64) -> DmMessage {
    DmMessage::new(sender.clone(), content, sequence as i64 * 1000, sequence)
}

/// Yield enough times for spawned stream tasks to drain pending items
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Poll until the condition holds, failing the test after ~1s
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

// ============================================================================
// Fake wallet
// ============================================================================

pub struct FakeWallet {
    address: Mutex<Option<String>>,
    reject_signing: AtomicBool,
}

impl FakeWallet {
    pub fn connected(address: &str) -> Self {
        Self {
            address: Mutex::new(Some(address.to_string())),
            reject_signing: AtomicBool::new(false),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            address: Mutex::new(None),
            reject_signing: AtomicBool::new(false),
        }
    }

    pub fn set_reject_signing(&self, reject: bool) {
        self.reject_signing.store(reject, Ordering::SeqCst);
    }
}

impl Wallet for FakeWallet {
    fn address(&self) -> Option<String> {
        self.address.lock().clone()
    }

    async fn sign_message(&self, message: &[u8]) -> anyhow::Result<Vec<u8>> {
        if self.reject_signing.load(Ordering::SeqCst) {
            anyhow::bail!("user rejected the request");
        }
        let mut sig = b"signed:".to_vec();
        sig.extend_from_slice(message);
        Ok(sig)
    }
}

// ============================================================================
// Fake messaging backend
// ============================================================================

#[derive(Default)]
struct DmRecord {
    history: Vec<DmMessage>,
    created_at_ms: i64,
    subscribe_count: usize,
    streams: Vec<mpsc::UnboundedSender<DmMessage>>,
}

#[derive(Default)]
struct FakeWorld {
    connect_delays: Mutex<HashMap<Address, Duration>>,
    failing_connects: Mutex<HashSet<Address>>,
    connect_counts: Mutex<HashMap<Address, usize>>,
    fail_sync: AtomicBool,
    unreachable: Mutex<HashSet<Address>>,
    dms: Mutex<HashMap<Address, DmRecord>>,
    sent: Mutex<Vec<(Address, String)>>,
}

#[derive(Clone, Default)]
pub struct FakeBackend {
    world: Arc<FakeWorld>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay applied to `connect` calls for this identity
    pub fn set_connect_delay(&self, identity: &Address, delay: Duration) {
        self.world
            .connect_delays
            .lock()
            .insert(identity.clone(), delay);
    }

    /// Make `connect` fail for this identity until allowed again
    pub fn fail_connects_for(&self, identity: &Address) {
        self.world.failing_connects.lock().insert(identity.clone());
    }

    pub fn allow_connects_for(&self, identity: &Address) {
        self.world.failing_connects.lock().remove(identity);
    }

    pub fn connect_count(&self, identity: &Address) -> usize {
        self.world
            .connect_counts
            .lock()
            .get(identity)
            .copied()
            .unwrap_or(0)
    }

    pub fn set_fail_sync(&self, fail: bool) {
        self.world.fail_sync.store(fail, Ordering::SeqCst);
    }

    pub fn set_unreachable(&self, peer: &Address) {
        self.world.unreachable.lock().insert(peer.clone());
    }

    /// Create a conversation record with a preloaded history
    pub fn seed_dm(&self, peer: &Address, created_at_ms: i64, history: Vec<DmMessage>) {
        let mut dms = self.world.dms.lock();
        let record = dms.entry(peer.clone()).or_default();
        record.created_at_ms = created_at_ms;
        record.history = history;
    }

    /// Push a message onto every live stream for this peer's conversation
    pub fn emit(&self, peer: &Address, message: DmMessage) {
        let dms = self.world.dms.lock();
        if let Some(record) = dms.get(peer) {
            for stream in &record.streams {
                let _ = stream.send(message.clone());
            }
        }
    }

    pub fn subscribe_count(&self, peer: &Address) -> usize {
        self.world
            .dms
            .lock()
            .get(peer)
            .map(|r| r.subscribe_count)
            .unwrap_or(0)
    }

    /// Messages handed to the backend via `send`, in order
    pub fn sent_messages(&self) -> Vec<(Address, String)> {
        self.world.sent.lock().clone()
    }
}

impl MessagingBackend for FakeBackend {
    type Client = FakeClient;

    async fn connect<S: ProtocolSigner>(
        &self,
        signer: S,
        _config: ClientConfig,
    ) -> DmResult<FakeClient> {
        let identity = signer.identifier()?;
        *self
            .world
            .connect_counts
            .lock()
            .entry(identity.clone())
            .or_insert(0) += 1;

        let delay = self.world.connect_delays.lock().get(&identity).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.world.failing_connects.lock().contains(&identity) {
            return Err(DmError::ClientInit(format!("backend refused {identity}")));
        }

        Ok(FakeClient {
            identity,
            world: self.world.clone(),
        })
    }
}

#[derive(Clone)]
pub struct FakeClient {
    identity: Address,
    world: Arc<FakeWorld>,
}

impl MessagingClient for FakeClient {
    type Dm = FakeDm;

    fn inbox_address(&self) -> Address {
        self.identity.clone()
    }

    async fn can_message(&self, peers: &[Address]) -> DmResult<HashMap<Address, bool>> {
        let unreachable = self.world.unreachable.lock();
        Ok(peers
            .iter()
            .map(|peer| (peer.clone(), !unreachable.contains(peer)))
            .collect())
    }

    async fn sync_conversations(&self) -> DmResult<()> {
        if self.world.fail_sync.load(Ordering::SeqCst) {
            return Err(DmError::Sync("backend unreachable".to_string()));
        }
        Ok(())
    }

    async fn list_dms(&self) -> DmResult<Vec<ConversationSummary>> {
        Ok(self
            .world
            .dms
            .lock()
            .iter()
            .map(|(peer, record)| ConversationSummary {
                peer: peer.clone(),
                created_at_ms: record.created_at_ms,
            })
            .collect())
    }

    async fn find_or_create_dm(&self, peer: &Address) -> DmResult<FakeDm> {
        self.world.dms.lock().entry(peer.clone()).or_default();
        Ok(FakeDm {
            peer: peer.clone(),
            world: self.world.clone(),
        })
    }
}

pub struct FakeDm {
    peer: Address,
    world: Arc<FakeWorld>,
}

impl DmHandle for FakeDm {
    async fn sync(&self) -> DmResult<()> {
        Ok(())
    }

    async fn messages(&self) -> DmResult<Vec<DmMessage>> {
        Ok(self
            .world
            .dms
            .lock()
            .get(&self.peer)
            .map(|record| record.history.clone())
            .unwrap_or_default())
    }

    async fn send(&self, content: &str) -> DmResult<()> {
        self.world
            .sent
            .lock()
            .push((self.peer.clone(), content.to_string()));
        Ok(())
    }

    async fn subscribe(&self) -> DmResult<mpsc::UnboundedReceiver<DmMessage>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut dms = self.world.dms.lock();
        let record = dms.entry(self.peer.clone()).or_default();
        record.subscribe_count += 1;
        record.streams.push(tx);
        Ok(rx)
    }
}
