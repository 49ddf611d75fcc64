//! # Principal Identities
//!
//! An [`Identity`] is the 32-byte public key of whoever is calling. Vault
//! admins, payees, and depositors are all just identities; roles are never
//! stored on the identity itself, they are derived from vault state at the
//! moment a call is made.
//!
//! ## Encoding
//!
//! - Human-readable formats (JSON, logs, CLI) use base58, the same alphabet
//!   users already paste into wallets.
//! - Binary formats (bincode on disk) use the raw 32 bytes. No length
//!   prefix, no string overhead.
//!
//! Signature verification is not done here. Whoever hands an identity to the
//! vault program has already authenticated it.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of an identity in bytes.
pub const IDENTITY_LENGTH: usize = 32;

/// Errors produced when parsing an identity from text or bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("invalid base58 identity: {0}")]
    InvalidBase58(String),

    #[error("invalid identity length: expected {IDENTITY_LENGTH} bytes, got {0}")]
    InvalidLength(usize),
}

/// A 32-byte principal identity.
///
/// Ordered and hashable so it can key both `HashMap`s and the `BTreeMap`s
/// used for deterministic on-disk layouts.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Identity {
    bytes: [u8; IDENTITY_LENGTH],
}

impl Identity {
    /// Wrap raw public key bytes.
    pub const fn new(bytes: [u8; IDENTITY_LENGTH]) -> Self {
        Self { bytes }
    }

    /// Derive a deterministic identity from an arbitrary label.
    ///
    /// `BLAKE3(label)`. Handy for fixtures and devnet tooling where a
    /// stable, readable name ("alice", "payroll-admin") beats a random key.
    /// There is no private key behind a derived identity.
    pub fn from_seed(label: &str) -> Self {
        Self {
            bytes: *blake3::hash(label.as_bytes()).as_bytes(),
        }
    }

    /// Try to build an identity from a byte slice of exactly 32 bytes.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, IdentityError> {
        let bytes: [u8; IDENTITY_LENGTH] = slice
            .try_into()
            .map_err(|_| IdentityError::InvalidLength(slice.len()))?;
        Ok(Self { bytes })
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; IDENTITY_LENGTH] {
        &self.bytes
    }

    /// Base58 representation.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.bytes).into_string()
    }
}

impl AsRef<[u8]> for Identity {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = bs58::decode(s)
            .into_vec()
            .map_err(|e| IdentityError::InvalidBase58(e.to_string()))?;
        Self::try_from_slice(&decoded)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = self.to_base58();
        write!(f, "Identity({}..)", &encoded[..encoded.len().min(8)])
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_base58())
        } else {
            self.bytes.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            let bytes = <[u8; IDENTITY_LENGTH]>::deserialize(deserializer)?;
            Ok(Self { bytes })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_identities_are_deterministic_and_distinct() {
        assert_eq!(Identity::from_seed("alice"), Identity::from_seed("alice"));
        assert_ne!(Identity::from_seed("alice"), Identity::from_seed("bob"));
    }

    #[test]
    fn base58_round_trip_through_display() {
        let id = Identity::from_seed("payroll-admin");
        let parsed: Identity = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn wrong_length_rejected() {
        let short = bs58::encode([7u8; 16]).into_string();
        assert_eq!(
            short.parse::<Identity>(),
            Err(IdentityError::InvalidLength(16))
        );
    }

    #[test]
    fn garbage_rejected() {
        // '0' is not in the base58 alphabet.
        assert!(matches!(
            "0OIl".parse::<Identity>(),
            Err(IdentityError::InvalidBase58(_))
        ));
    }

    #[test]
    fn json_uses_base58_string() {
        let id = Identity::new([1u8; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_base58()));
        let back: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn bincode_uses_raw_bytes() {
        let id = Identity::from_seed("carol");
        let bytes = bincode::serialize(&id).unwrap();
        assert_eq!(bytes.len(), IDENTITY_LENGTH);
        let back: Identity = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, id);
    }
}
