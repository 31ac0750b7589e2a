//! Deterministic secp256k1 ECDSA over 32-byte digests.
//!
//! The curve arithmetic comes from the `k256` crate; this module owns the
//! Ethereum-specific flow: RFC 6979 signing of a prehashed digest, low-s
//! normalization with the recovery id flipped to match, `v = 27 + recid`,
//! the uncompressed `0x04 || X || Y` public key, and the
//! `keccak256(pubkey[1..65])[12..32]` address derivation.

use alloy::primitives::Address;
use k256::ecdsa::{RecoveryId, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;

use crate::crypto::keccak::{decode_hex, keccak256};
use crate::error::{Error, Result};

/// `v` carries `27 + recid`; EIP-1559 wants the bare parity bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u8,
}

impl RecoverableSignature {
    #[inline]
    pub fn y_parity(&self) -> u8 {
        self.v - 27
    }
}

/// Parse a 32-byte private key from hex (the `0x` prefix is optional).
pub fn parse_private_key(hex: &str) -> Result<SigningKey> {
    let bytes = decode_hex(hex)?;
    if bytes.len() != 32 {
        return Err(Error::Signing(format!(
            "private key must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    SigningKey::from_slice(&bytes).map_err(|e| Error::Signing(format!("invalid private key: {e}")))
}

/// `0x04 || X || Y`.
pub fn uncompressed_public_key(key: &SigningKey) -> [u8; 65] {
    let point = VerifyingKey::from(key).to_encoded_point(false);
    let mut out = [0u8; 65];
    out.copy_from_slice(point.as_bytes());
    out
}

/// `keccak256(pubkey[1..65])[12..32]`.
pub fn derive_address(key: &SigningKey) -> Address {
    let public = uncompressed_public_key(key);
    let digest = keccak256(&public[1..]);
    Address::from_slice(&digest[12..])
}

/// Deterministic sign over a prehashed digest. The signature is low-s
/// normalized; flipping s flips the recovery parity with it.
pub fn sign_digest(key: &SigningKey, digest: &[u8; 32]) -> Result<RecoverableSignature> {
    let (mut signature, mut recovery) = key
        .sign_prehash_recoverable(digest)
        .map_err(|e| Error::Signing(format!("ecdsa sign: {e}")))?;
    if let Some(normalized) = signature.normalize_s() {
        signature = normalized;
        recovery = RecoveryId::from_byte(recovery.to_byte() ^ 1)
            .ok_or_else(|| Error::Signing("recovery id out of range".into()))?;
    }
    let (r, s) = signature.split_bytes();
    Ok(RecoverableSignature {
        r: r.into(),
        s: s.into(),
        v: 27 + (recovery.to_byte() & 1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // The well-known first dev-node account key.
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn derives_the_known_dev_address() {
        let key = parse_private_key(TEST_KEY).unwrap();
        assert_eq!(
            format!("{:#x}", derive_address(&key)),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn public_key_is_uncompressed() {
        let key = parse_private_key(TEST_KEY).unwrap();
        let public = uncompressed_public_key(&key);
        assert_eq!(public[0], 0x04);
        assert_eq!(public.len(), 65);
    }

    #[test]
    fn signing_is_deterministic_with_sane_parity() {
        let key = parse_private_key(TEST_KEY).unwrap();
        let digest = keccak256(b"deterministic");

        let first = sign_digest(&key, &digest).unwrap();
        let second = sign_digest(&key, &digest).unwrap();

        assert_eq!(first, second);
        assert!(first.v == 27 || first.v == 28);
        assert!(first.y_parity() <= 1);
        assert_ne!(first.r, [0u8; 32]);
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(parse_private_key("0x1234").is_err());
        assert!(parse_private_key("nonsense").is_err());
        // The zero scalar is not a valid key.
        assert!(parse_private_key(&format!("0x{}", "00".repeat(32))).is_err());
    }
}
