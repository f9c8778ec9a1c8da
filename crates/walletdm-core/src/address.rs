//! Wallet address newtype
//!
//! Format: `0x` + 40 hex characters, case-insensitive on input and
//! normalized to lowercase internally. Every map and set in this crate is
//! keyed by [`Address`], so normalization holds by construction at every
//! boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DmError;

/// A lowercase-normalized wallet address.
///
/// Construction goes through [`Address::parse`], which validates the
/// `0x{40 hex}` shape and lowercases the hex digits. Two inputs differing
/// only in case compare equal and hash identically.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Parse and normalize a wallet address.
    ///
    /// # Errors
    ///
    /// Returns `DmError::InvalidAddress` if the input is not a
    /// `0x`-prefixed 40-character hex string.
    pub fn parse(raw: &str) -> Result<Self, DmError> {
        let trimmed = raw.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| DmError::InvalidAddress(raw.to_string()))?;

        if hex_part.len() != 40 {
            return Err(DmError::InvalidAddress(raw.to_string()));
        }

        hex::decode(hex_part).map_err(|_| DmError::InvalidAddress(raw.to_string()))?;

        Ok(Address(format!("0x{}", hex_part.to_ascii_lowercase())))
    }

    /// Get the address as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for display: `0xabc123...def456`
    pub fn short(&self) -> String {
        format!("{}...{}", &self.0[..8], &self.0[self.0.len() - 6..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = DmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
