//! # Key Management
//!
//! secp256k1 keypairs, recoverable signatures, and address derivation.
//!
//! Spore never ships public keys alongside transactions. A signature is
//! 65 bytes (`r || s || v`) and the verifier *recovers* the signer's public
//! key from it, derives the address, and compares that with the claimed
//! sender. This is the same scheme Ethereum wallets use, which means keys
//! from those wallets sign valid Spore transactions.
//!
//! Key bytes are never logged. Keep it that way.

use std::fmt;
use std::str::FromStr;

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

use super::hash::keccak256;
use super::hex_serde::impl_hex_serde;
use crate::config::{ADDRESS_LENGTH, SECRET_KEY_LENGTH, SIGNATURE_LENGTH};

/// Errors that can occur during key and signature operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: wrong length or not a valid scalar")]
    InvalidSecretKey,

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("public key recovery failed")]
    RecoveryFailed,

    #[error("signing failed")]
    SigningFailed,

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 20-byte account address: `keccak256(uncompressed_pubkey[1..])[12..]`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; ADDRESS_LENGTH]);

impl_hex_serde!(Address, ADDRESS_LENGTH, "address");

impl Address {
    /// Derive the address of a secp256k1 public key.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        // Skip the 0x04 SEC1 tag; hash only the 64 coordinate bytes.
        let hash = keccak256(&point.as_bytes()[1..]);
        let mut out = [0u8; ADDRESS_LENGTH];
        out.copy_from_slice(&hash[32 - ADDRESS_LENGTH..]);
        Self(out)
    }

    /// Parse an address from raw bytes. Fails unless exactly 20 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let arr: [u8; ADDRESS_LENGTH] = bytes.try_into().map_err(|_| {
            KeyError::InvalidAddress(format!(
                "expected {} bytes, got {}",
                ADDRESS_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|e| KeyError::InvalidAddress(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

// ---------------------------------------------------------------------------
// Recoverable Signature
// ---------------------------------------------------------------------------

/// A 65-byte recoverable ECDSA signature laid out as `r || s || v`.
///
/// `v` must be 0 or 1. The legacy 27/28 encoding is refused: the
/// transaction id covers the signature bytes, so a second spelling of the
/// same signature would admit the same transfer under a second id.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature([u8; SIGNATURE_LENGTH]);

impl RecoverableSignature {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let arr: [u8; SIGNATURE_LENGTH] = bytes.try_into().map_err(|_| {
            KeyError::MalformedSignature(format!(
                "expected {} bytes, got {}",
                SIGNATURE_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    fn parts(&self) -> Result<(Signature, RecoveryId), KeyError> {
        let signature = Signature::from_slice(&self.0[..64])
            .map_err(|e| KeyError::MalformedSignature(e.to_string()))?;
        let v = self.0[64];
        let recovery_id = Some(v)
            .filter(|v| *v <= 1)
            .and_then(RecoveryId::from_byte)
            .ok_or_else(|| KeyError::MalformedSignature(format!("invalid recovery byte {v}")))?;
        Ok((signature, recovery_id))
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecoverableSignature({})", hex::encode(self.0))
    }
}

/// Recover the signer's address from a 32-byte prehashed digest and a
/// 65-byte recoverable signature.
///
/// Fails on any malformed input or if no public key can be recovered.
/// Success says nothing about *who* signed; the caller compares the
/// returned address with the one it expects.
pub fn recover_address(digest: &[u8; 32], signature: &[u8]) -> Result<Address, KeyError> {
    let signature = RecoverableSignature::from_slice(signature)?;
    let (sig, recovery_id) = signature.parts()?;
    let key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|_| KeyError::RecoveryFailed)?;
    Ok(Address::from_verifying_key(&key))
}

// ---------------------------------------------------------------------------
// Keypair
// ---------------------------------------------------------------------------

/// A secp256k1 signing keypair.
///
/// Intentionally not `Serialize`. Exporting a secret key should be an
/// explicit call to [`SporeKeypair::secret_key_bytes`].
#[derive(Clone)]
pub struct SporeKeypair {
    signing_key: SigningKey,
}

impl SporeKeypair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Restore a keypair from its 32-byte secret scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != SECRET_KEY_LENGTH {
            return Err(KeyError::InvalidSecretKey);
        }
        let signing_key = SigningKey::from_slice(bytes).map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self { signing_key })
    }

    /// Restore a keypair from hex (with or without `0x`).
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let raw = s.trim().strip_prefix("0x").unwrap_or(s.trim());
        let bytes = hex::decode(raw).map_err(|_| KeyError::InvalidSecretKey)?;
        Self::from_bytes(&bytes)
    }

    pub fn secret_key_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        let mut out = [0u8; SECRET_KEY_LENGTH];
        out.copy_from_slice(&self.signing_key.to_bytes());
        out
    }

    /// The address controlled by this keypair.
    pub fn address(&self) -> Address {
        Address::from_verifying_key(self.signing_key.verifying_key())
    }

    /// Sign a 32-byte digest, producing a recoverable signature.
    pub fn sign_prehash(&self, digest: &[u8; 32]) -> Result<RecoverableSignature, KeyError> {
        let (sig, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest)
            .map_err(|_| KeyError::SigningFailed)?;
        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = recovery_id.to_byte();
        Ok(RecoverableSignature(out))
    }
}

impl fmt::Debug for SporeKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SporeKeypair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::sha256;

    #[test]
    fn signature_recovers_signer_address() {
        let kp = SporeKeypair::generate();
        let digest = sha256(b"transfer 10 to bob");
        let sig = kp.sign_prehash(&digest).unwrap();

        let recovered = recover_address(&digest, sig.as_bytes()).unwrap();
        assert_eq!(recovered, kp.address());
    }

    #[test]
    fn legacy_recovery_byte_is_refused() {
        let kp = SporeKeypair::generate();
        let digest = sha256(b"legacy v");
        let mut raw = kp.sign_prehash(&digest).unwrap().to_vec();
        raw[64] += 27;

        assert!(matches!(
            recover_address(&digest, &raw),
            Err(KeyError::MalformedSignature(_))
        ));
    }

    #[test]
    fn produced_recovery_byte_is_canonical() {
        let kp = SporeKeypair::generate();
        for msg in [&b"a"[..], b"b", b"c", b"d"] {
            let sig = kp.sign_prehash(&sha256(msg)).unwrap();
            assert!(sig.as_bytes()[64] <= 1);
        }
    }

    #[test]
    fn different_digest_recovers_different_address() {
        let kp = SporeKeypair::generate();
        let sig = kp.sign_prehash(&sha256(b"one")).unwrap();

        match recover_address(&sha256(b"two"), sig.as_bytes()) {
            Ok(addr) => assert_ne!(addr, kp.address()),
            Err(_) => {}
        }
    }

    #[test]
    fn short_signature_is_malformed() {
        let err = recover_address(&[0u8; 32], &[1u8; 64]).unwrap_err();
        assert!(matches!(err, KeyError::MalformedSignature(_)));
    }

    #[test]
    fn bad_recovery_byte_is_malformed() {
        let kp = SporeKeypair::generate();
        let digest = sha256(b"v");
        let mut raw = kp.sign_prehash(&digest).unwrap().to_vec();
        raw[64] = 9;
        assert!(matches!(
            recover_address(&digest, &raw),
            Err(KeyError::MalformedSignature(_))
        ));
    }

    #[test]
    fn keypair_round_trips_through_secret_bytes() {
        let kp = SporeKeypair::generate();
        let restored = SporeKeypair::from_bytes(&kp.secret_key_bytes()).unwrap();
        assert_eq!(restored.address(), kp.address());

        let from_hex = SporeKeypair::from_hex(&hex::encode(kp.secret_key_bytes())).unwrap();
        assert_eq!(from_hex.address(), kp.address());
    }

    #[test]
    fn zero_secret_key_is_rejected() {
        assert!(SporeKeypair::from_bytes(&[0u8; 32]).is_err());
        assert!(SporeKeypair::from_bytes(&[1u8; 31]).is_err());
    }

    #[test]
    fn known_key_derives_known_address() {
        // Secret key 1 is the generator point; its Ethereum address is fixed.
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let kp = SporeKeypair::from_bytes(&secret).unwrap();
        assert_eq!(
            kp.address().to_hex(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn address_parses_from_hex() {
        let kp = SporeKeypair::generate();
        let addr = kp.address();
        let parsed: Address = addr.to_hex().parse().unwrap();
        assert_eq!(parsed, addr);
        assert!("0x1234".parse::<Address>().is_err());
    }
}
