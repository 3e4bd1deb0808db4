//! Core value types for Spore transactions.

use std::fmt;
use std::str::FromStr;

use crate::config::HASH_LENGTH;
use crate::crypto::hex_serde::impl_hex_serde;

// ---------------------------------------------------------------------------
// TxId
// ---------------------------------------------------------------------------

/// A transaction identifier: the SHA-256 hash of the signed, unstamped
/// transaction encoding. Also the ledger node id and the storage key.
///
/// The all-zero value means "not stamped yet". Ordering is lexicographic
/// over the raw bytes, which is the tie-break rule the ledger ordering
/// pass relies on.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId(pub [u8; HASH_LENGTH]);

impl_hex_serde!(TxId, HASH_LENGTH, "transaction id");

impl TxId {
    /// The unset identifier carried by transactions before stamping.
    pub const UNSET: TxId = TxId([0u8; HASH_LENGTH]);

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_unset(&self) -> bool {
        *self == Self::UNSET
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First eight hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self.short())
    }
}

/// Error returned when parsing a [`TxId`] from hex.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transaction id: {0}")]
pub struct ParseTxIdError(pub String);

impl FromStr for TxId {
    type Err = ParseTxIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|e| ParseTxIdError(e.to_string()))?;
        Self::from_slice(&bytes).ok_or_else(|| {
            ParseTxIdError(format!("expected {} bytes, got {}", HASH_LENGTH, bytes.len()))
        })
    }
}

impl From<[u8; HASH_LENGTH]> for TxId {
    fn from(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unset() {
        assert!(TxId::default().is_unset());
        assert!(!TxId([1u8; 32]).is_unset());
    }

    #[test]
    fn parses_with_and_without_prefix() {
        let id = TxId([0xAB; 32]);
        assert_eq!(id.to_hex().parse::<TxId>().unwrap(), id);
        assert_eq!(format!("0x{}", id).parse::<TxId>().unwrap(), id);
        assert!("abcd".parse::<TxId>().is_err());
        assert!("zz".parse::<TxId>().is_err());
    }

    #[test]
    fn json_uses_hex_and_bincode_uses_bytes() {
        let id = TxId([0x5A; 32]);

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "5a".repeat(32)));
        assert_eq!(serde_json::from_str::<TxId>(&json).unwrap(), id);

        let bin = bincode::serialize(&id).unwrap();
        assert_eq!(bin.len(), 8 + 32);
        assert_eq!(bincode::deserialize::<TxId>(&bin).unwrap(), id);

        assert!(serde_json::from_str::<TxId>("\"abcd\"").is_err());
    }

    #[test]
    fn ordering_is_bytewise() {
        let mut low = [0u8; 32];
        low[31] = 1;
        let mut high = [0u8; 32];
        high[0] = 1;
        assert!(TxId(low) < TxId(high));
    }
}
