//! Error types for the wallet DM layer

use thiserror::Error;

/// Main error type for wallet DM operations
#[derive(Error, Debug)]
pub enum DmError {
    /// Wallet exposes no connected account
    #[error("wallet exposes no account")]
    IdentityUnavailable,

    /// Wallet denied or failed a signing request
    #[error("signing rejected by wallet: {0}")]
    SigningRejected(anyhow::Error),

    /// Messaging client could not be created for the current identity
    #[error("client initialization failed: {0}")]
    ClientInit(String),

    /// Synchronization with the messaging backend failed
    #[error("sync failed: {0}")]
    Sync(String),

    /// Peer address is not reachable on the messaging network
    #[error("peer cannot receive messages: {0}")]
    PeerUnreachable(String),

    /// Operation requires an open conversation session
    #[error("conversation session is not initialized")]
    NotInitialized,

    /// Message could not be handed to the backend
    #[error("send failed: {0}")]
    Send(String),

    /// Address is not a `0x`-prefixed 40-character hex string
    #[error("invalid wallet address: {0}")]
    InvalidAddress(String),
}

/// Result type alias using DmError
pub type DmResult<T> = Result<T, DmError>;
