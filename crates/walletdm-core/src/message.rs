//! Direct message record
//!
//! [`DmMessage`] is the immutable, display-ready message produced at the
//! backend boundary. Validation and conversion from the backend's wire
//! representation happen once, when the backend constructs the record, not
//! at every consumption site.

use serde::{Deserialize, Serialize};

use crate::address::Address;

/// An immutable direct message within a conversation.
///
/// `sequence` is the message's position in the conversation and is
/// monotonically non-decreasing within one peer's history. The pair
/// `(sender, sequence)` identifies a message uniquely and serves as the
/// dedup key when the live stream races the history load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmMessage {
    /// Sender's wallet address
    pub sender: Address,
    /// Decrypted message content
    pub content: String,
    /// Unix timestamp in milliseconds when the message was sent
    pub sent_at_ms: i64,
    /// Position in the conversation's message sequence
    pub sequence: u64,
}

impl DmMessage {
    pub fn new(sender: Address, content: impl Into<String>, sent_at_ms: i64, sequence: u64) -> Self {
        Self {
            sender,
            content: content.into(),
            sent_at_ms,
            sequence,
        }
    }

    /// Stable identifier: `{sender}:{sequence}`
    pub fn id(&self) -> String {
        format!("{}:{}", self.sender, self.sequence)
    }

    /// Whether this message was sent by the given address
    pub fn is_from(&self, address: &Address) -> bool {
        &self.sender == address
    }
}
