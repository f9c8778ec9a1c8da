//! Contracts for the external messaging backend
//!
//! The wire protocol (key derivation, encryption, transport) is supplied by
//! an external provider. This module pins down the exact surface the
//! session layer consumes from it, as traits, so tests can substitute an
//! in-memory fake:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  Session layer (this crate)                                │
//! │  ClientManager / Conversations / ConversationDirectory     │
//! ├────────────────────────────────────────────────────────────┤
//! │  Backend contracts (this module)                           │
//! │  MessagingBackend -> MessagingClient -> DmHandle           │
//! ├────────────────────────────────────────────────────────────┤
//! │  External protocol SDK (out of tree)                       │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Methods that perform I/O return `impl Future + Send` so lifecycle code
//! can drive them from spawned tasks.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::address::Address;
use crate::error::{DmError, DmResult};
use crate::message::DmMessage;

/// Backend network selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkEnv {
    /// Development network
    Dev,
    /// Production network
    #[default]
    Production,
}

impl fmt::Display for NetworkEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkEnv::Dev => write!(f, "dev"),
            NetworkEnv::Production => write!(f, "production"),
        }
    }
}

impl FromStr for NetworkEnv {
    type Err = DmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(NetworkEnv::Dev),
            "production" => Ok(NetworkEnv::Production),
            other => Err(DmError::ClientInit(format!(
                "unknown network environment: {other}"
            ))),
        }
    }
}

/// Configuration handed to the backend when creating a client
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub env: NetworkEnv,
}

/// One entry in a conversation directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Peer's wallet address
    pub peer: Address,
    /// Unix timestamp in milliseconds when the conversation was created
    pub created_at_ms: i64,
}

/// The signer shape the messaging backend expects.
///
/// Produced from a wallet by [`WalletSigner`](crate::signer::WalletSigner);
/// the backend calls it during client creation to prove control of the
/// wallet address.
pub trait ProtocolSigner: Send + 'static {
    /// Stable wallet address identifying this signer
    fn identifier(&self) -> DmResult<Address>;

    /// Sign an opaque byte payload. May suspend on wallet user interaction.
    fn sign(&self, message: &[u8]) -> impl Future<Output = DmResult<Vec<u8>>> + Send;
}

/// Factory for protocol clients, one per identity.
pub trait MessagingBackend: Clone + Send + Sync + 'static {
    type Client: MessagingClient;

    /// Create a client bound to the given signer's identity.
    fn connect<S: ProtocolSigner>(
        &self,
        signer: S,
        config: ClientConfig,
    ) -> impl Future<Output = DmResult<Self::Client>> + Send;
}

/// A live protocol client bound to one identity.
pub trait MessagingClient: Send + Sync + 'static {
    type Dm: DmHandle;

    /// Address of the identity this client is bound to
    fn inbox_address(&self) -> Address;

    /// Whether each peer can receive messages on the network
    fn can_message(
        &self,
        peers: &[Address],
    ) -> impl Future<Output = DmResult<HashMap<Address, bool>>> + Send;

    /// Force a synchronization of conversation state with the backend
    fn sync_conversations(&self) -> impl Future<Output = DmResult<()>> + Send;

    /// List existing direct-message conversations
    fn list_dms(&self) -> impl Future<Output = DmResult<Vec<ConversationSummary>>> + Send;

    /// Resolve or create the direct-message conversation with a peer
    fn find_or_create_dm(
        &self,
        peer: &Address,
    ) -> impl Future<Output = DmResult<Self::Dm>> + Send;
}

/// Handle to a single direct-message conversation on the backend.
pub trait DmHandle: Send + Sync + 'static {
    /// Pull the latest conversation state from the network
    fn sync(&self) -> impl Future<Output = DmResult<()>> + Send;

    /// Full message history
    fn messages(&self) -> impl Future<Output = DmResult<Vec<DmMessage>>> + Send;

    /// Deliver a message to the peer. No local echo: the sent message's
    /// canonical position arrives back through the live stream.
    fn send(&self, content: &str) -> impl Future<Output = DmResult<()>> + Send;

    /// Open the live message stream for this conversation. The channel is
    /// unbounded; consumers must drain it promptly.
    fn subscribe(
        &self,
    ) -> impl Future<Output = DmResult<mpsc::UnboundedReceiver<DmMessage>>> + Send;
}

/// Pre-screen a peer before opening a conversation.
///
/// # Errors
///
/// Returns `DmError::PeerUnreachable` when the backend reports the peer
/// cannot receive messages.
pub async fn ensure_can_message<C: MessagingClient>(
    client: &C,
    peer: &Address,
) -> DmResult<()> {
    let reachable = client.can_message(std::slice::from_ref(peer)).await?;
    match reachable.get(peer) {
        Some(true) => Ok(()),
        _ => Err(DmError::PeerUnreachable(peer.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_env_from_str() {
        assert_eq!("dev".parse::<NetworkEnv>().unwrap(), NetworkEnv::Dev);
        assert_eq!(
            "Production".parse::<NetworkEnv>().unwrap(),
            NetworkEnv::Production
        );
        assert!("mainnet".parse::<NetworkEnv>().is_err());
    }

    #[test]
    fn test_network_env_display_roundtrip() {
        for env in [NetworkEnv::Dev, NetworkEnv::Production] {
            let parsed: NetworkEnv = env.to_string().parse().unwrap();
            assert_eq!(parsed, env);
        }
    }

    #[test]
    fn test_client_config_defaults_to_production() {
        assert_eq!(ClientConfig::default().env, NetworkEnv::Production);
    }
}
