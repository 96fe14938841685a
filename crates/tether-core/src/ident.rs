//! Session identifiers

use std::fmt;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::MAX_IDENT_BYTES;

/// Opaque identifier naming one signaling session.
///
/// Identifiers compare and hash by value and are never mutated after
/// creation; [`SessionId::to_string`] (via `Display`) is the lossless
/// canonical wire representation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an externally supplied token.
    ///
    /// Rejects an empty seed and anything longer than [`MAX_IDENT_BYTES`].
    pub fn new(seed: impl Into<String>) -> Result<Self> {
        let seed = seed.into();
        if seed.is_empty() || seed.len() > MAX_IDENT_BYTES {
            return Err(Error::InvalidIdentifier(seed.len()));
        }
        Ok(Self(seed))
    }

    /// Generate a fresh identifier from 128 random bits.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
