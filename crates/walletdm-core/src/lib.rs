//! Wallet DM Core Library
//!
//! Session and spam-gate layer for wallet-to-wallet direct messaging.
//!
//! ## Overview
//!
//! `walletdm-core` binds a wallet's signing capability to an end-to-end
//! encrypted messaging backend and keeps per-peer conversations consistent
//! under concurrent sync, stream, and send operations:
//!
//! - **Identity adapter** ([`signer`]) wraps a wallet into the signer
//!   shape the protocol expects.
//! - **Client lifecycle** ([`client`]) creates exactly one protocol client
//!   per identity change, discarding stale initializations.
//! - **Conversation sessions** ([`session`]) resolve a peer address into a
//!   durable conversation with ordered history and a live stream.
//! - **Conversation directory** ([`directory`]) lists conversations,
//!   degrading to cached data when the backend is unreachable.
//! - **Spam gate** ([`spamgate`]) gates inbound senders through
//!   allow/block lists and a sliding-window rate limit.
//!
//! The wire protocol itself is an external collaborator, consumed through
//! the trait contracts in [`backend`]. Nothing here persists beyond the
//! process lifetime.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use walletdm_core::{ClientConfig, ClientManager, SpamGate, WalletSigner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gate = Arc::new(SpamGate::default());
//!     let manager = ClientManager::new(backend, ClientConfig::default(), gate.clone());
//!
//!     // Wallet connected: derive a signer and bring up the client
//!     manager.set_identity(Some(WalletSigner::new(wallet)));
//!
//!     // ... once Ready, open a conversation and talk
//!     let client = manager.client().expect("client ready");
//!     let peer = "0x52908400098527886E0F7030069857D2E4169EE7".parse()?;
//!     let session = manager.sessions().open(client.as_ref(), &peer).await?;
//!     session.send("gm").await?;
//!
//!     for msg in session.messages() {
//!         println!("{}: {}", msg.sender.short(), msg.content);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod address;
pub mod backend;
pub mod client;
pub mod directory;
pub mod error;
pub mod message;
pub mod session;
pub mod signer;
pub mod spamgate;

// Re-exports
pub use address::Address;
pub use backend::{
    ensure_can_message, ClientConfig, ConversationSummary, DmHandle, MessagingBackend,
    MessagingClient, NetworkEnv, ProtocolSigner,
};
pub use client::{ClientEvent, ClientManager, ClientPhase, PhaseKind};
pub use directory::{ConversationDirectory, DirectoryListing};
pub use error::{DmError, DmResult};
pub use message::DmMessage;
pub use session::{Conversations, DmSession};
pub use signer::{Wallet, WalletSigner};
pub use spamgate::{RateLimitConfig, Remaining, SpamGate};
