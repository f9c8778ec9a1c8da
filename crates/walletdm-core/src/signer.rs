//! Identity adapter: wallet capability -> protocol signer
//!
//! A connected wallet exposes an optional account address and a
//! `signMessage` capability. [`WalletSigner`] wraps that into the
//! [`ProtocolSigner`] shape the messaging backend expects, normalizing the
//! address and translating wallet failures into the crate's error
//! taxonomy. No state is retained beyond the wrapped wallet handle.

use std::future::Future;
use std::sync::Arc;

use crate::address::Address;
use crate::backend::ProtocolSigner;
use crate::error::{DmError, DmResult};

/// External wallet capability, supplied by the embedding application.
///
/// `sign_message` may prompt the wallet's own UI and therefore suspend for
/// an arbitrary time, or fail when the user rejects the request.
pub trait Wallet: Send + Sync + 'static {
    /// Address of the currently connected account, if any
    fn address(&self) -> Option<String>;

    /// Sign a message with the wallet key
    fn sign_message(&self, message: &[u8]) -> impl Future<Output = anyhow::Result<Vec<u8>>> + Send;
}

/// Protocol signer backed by a wallet.
pub struct WalletSigner<W> {
    wallet: Arc<W>,
}

impl<W> Clone for WalletSigner<W> {
    fn clone(&self) -> Self {
        Self {
            wallet: self.wallet.clone(),
        }
    }
}

impl<W: Wallet> WalletSigner<W> {
    pub fn new(wallet: W) -> Self {
        Self {
            wallet: Arc::new(wallet),
        }
    }

    /// Sign a text message; the string is passed to the wallet as its
    /// UTF-8 bytes.
    pub async fn sign_text(&self, text: &str) -> DmResult<Vec<u8>> {
        self.sign(text.as_bytes()).await
    }
}

impl<W: Wallet> ProtocolSigner for WalletSigner<W> {
    fn identifier(&self) -> DmResult<Address> {
        let raw = self.wallet.address().ok_or(DmError::IdentityUnavailable)?;
        Address::parse(&raw)
    }

    async fn sign(&self, message: &[u8]) -> DmResult<Vec<u8>> {
        self.wallet
            .sign_message(message)
            .await
            .map_err(DmError::SigningRejected)
    }
}
