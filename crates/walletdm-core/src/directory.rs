//! Conversation directory listings
//!
//! Every read is a fresh sync-then-list cycle against the backend. When
//! the sync fails the directory degrades to the previously cached listing
//! marked stale, instead of failing the read.

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::backend::{ConversationSummary, MessagingClient};

/// Result of a directory read
#[derive(Debug, Clone)]
pub struct DirectoryListing {
    /// Conversations, newest first
    pub conversations: Vec<ConversationSummary>,
    /// True when the backend could not be reached and this is the
    /// previously cached list
    pub is_stale: bool,
    /// When this listing was produced (unix ms)
    pub refreshed_at_ms: i64,
}

/// Directory of existing conversations for the active client.
pub struct ConversationDirectory {
    cache: Mutex<Vec<ConversationSummary>>,
}

impl ConversationDirectory {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(Vec::new()),
        }
    }

    /// List conversations after forcing a backend synchronization.
    ///
    /// Calling this again always performs a fresh sync-then-read cycle; a
    /// prior partial read is never resumed. Sync or listing failures fall
    /// back to the cached result with `is_stale` set — an empty cache
    /// yields an empty stale listing.
    pub async fn list<C: MessagingClient>(&self, client: &C) -> DirectoryListing {
        if let Err(error) = client.sync_conversations().await {
            warn!(%error, "conversation sync failed, serving cached listing");
            return self.stale_listing();
        }

        match client.list_dms().await {
            Ok(mut conversations) => {
                conversations.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
                debug!(count = conversations.len(), "conversation directory refreshed");
                *self.cache.lock() = conversations.clone();
                DirectoryListing {
                    conversations,
                    is_stale: false,
                    refreshed_at_ms: chrono::Utc::now().timestamp_millis(),
                }
            }
            Err(error) => {
                warn!(%error, "conversation listing failed, serving cached listing");
                self.stale_listing()
            }
        }
    }

    fn stale_listing(&self) -> DirectoryListing {
        DirectoryListing {
            conversations: self.cache.lock().clone(),
            is_stale: true,
            refreshed_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

impl Default for ConversationDirectory {
    fn default() -> Self {
        Self::new()
    }
}

// Listing and stale-fallback behavior is exercised against the in-memory
// backend in tests/session_integration.rs.
