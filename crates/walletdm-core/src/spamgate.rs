//! Sender spam gate: allow-list, block-list, sliding-window rate limits
//!
//! The gate is a pure in-memory decision engine consulted before an
//! inbound message is surfaced. It performs no network I/O and never
//! fails; malformed sender strings are normalized defensively and used as
//! keys as-is.
//!
//! Decision order for [`SpamGate::should_block`]:
//!
//! 1. allow-listed senders are never blocked (overrides everything)
//! 2. block-listed senders are always blocked
//! 3. otherwise a per-sender counter applies: the first message in a
//!    window starts a fresh count, and the count may reach `limit` before
//!    further messages in the same window are blocked
//!
//! The gate is constructed explicitly and passed by reference to its
//! consumers, so tests get isolated instances. Its state is process-wide
//! and outlives any single client or conversation.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Rate-limit configuration, fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Length of the per-sender counting window
    pub window: Duration,
    /// Messages accepted per sender within one window
    pub limit: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60 * 60),
            limit: 50,
        }
    }
}

/// Messages a sender may still deliver in the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    /// Sender is allow-listed; no limit applies
    Unlimited,
    Count(u32),
}

struct WindowCounter {
    count: u32,
    reset_at: Instant,
}

#[derive(Default)]
struct GateState {
    counters: HashMap<String, WindowCounter>,
    blocked: HashSet<String>,
    allowed: HashSet<String>,
}

/// Allow/block/rate-limit decision engine gating inbound senders.
///
/// A single mutex serializes the read-increment-compare sequence, so
/// concurrent decisions for the same sender never lose updates.
pub struct SpamGate {
    config: RateLimitConfig,
    state: Mutex<GateState>,
}

impl SpamGate {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(GateState::default()),
        }
    }

    /// Decide whether a message from this sender should be blocked.
    ///
    /// Counts against the sender's window unless the sender is
    /// allow-listed or block-listed.
    pub fn should_block(&self, sender: &str) -> bool {
        let sender = normalize(sender);
        let mut state = self.state.lock();

        if state.allowed.contains(&sender) {
            return false;
        }
        if state.blocked.contains(&sender) {
            return true;
        }

        let now = Instant::now();
        let window = self.config.window;
        let counter = state
            .counters
            .entry(sender.clone())
            .or_insert(WindowCounter {
                count: 0,
                reset_at: now + window,
            });

        if now > counter.reset_at {
            counter.count = 1;
            counter.reset_at = now + window;
            return false;
        }

        counter.count += 1;
        if counter.count > self.config.limit {
            warn!(%sender, count = counter.count, "rate limit exceeded");
            true
        } else {
            false
        }
    }

    /// Messages the sender may still deliver in the current window.
    ///
    /// Pure query: does not count against the window or create a counter.
    /// Returns the full limit when no window is active.
    pub fn remaining(&self, sender: &str) -> Remaining {
        let sender = normalize(sender);
        let state = self.state.lock();

        if state.allowed.contains(&sender) {
            return Remaining::Unlimited;
        }
        if state.blocked.contains(&sender) {
            return Remaining::Count(0);
        }

        match state.counters.get(&sender) {
            Some(counter) if Instant::now() <= counter.reset_at => {
                Remaining::Count(self.config.limit.saturating_sub(counter.count))
            }
            _ => Remaining::Count(self.config.limit),
        }
    }

    /// Add a sender to the block-list. Idempotent.
    pub fn block(&self, address: &str) {
        let address = normalize(address);
        info!(%address, "sender blocked");
        self.state.lock().blocked.insert(address);
    }

    /// Remove a sender from the block-list. No-op for unknown senders.
    pub fn unblock(&self, address: &str) {
        let address = normalize(address);
        info!(%address, "sender unblocked");
        self.state.lock().blocked.remove(&address);
    }

    /// Add a sender to the allow-list. Idempotent, and does not clear an
    /// existing block-list entry; the allow-list wins while both exist.
    pub fn allow(&self, address: &str) {
        let address = normalize(address);
        info!(%address, "sender allow-listed");
        self.state.lock().allowed.insert(address);
    }

    /// Remove a sender from the allow-list. No-op for unknown senders.
    pub fn disallow(&self, address: &str) {
        let address = normalize(address);
        info!(%address, "sender removed from allow-list");
        self.state.lock().allowed.remove(&address);
    }

    pub fn is_blocked(&self, address: &str) -> bool {
        self.state.lock().blocked.contains(&normalize(address))
    }

    pub fn is_allowed(&self, address: &str) -> bool {
        self.state.lock().allowed.contains(&normalize(address))
    }

    /// Wipe all rate-limit counters, leaving the allow/block sets intact.
    ///
    /// Administrative reset and test isolation; not a normal user action.
    pub fn clear_rate_limits(&self) {
        self.state.lock().counters.clear();
        debug!("rate limit counters cleared");
    }
}

impl Default for SpamGate {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

fn normalize(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}
