//! Confidential amount codec.
//!
//! Amounts travel on-chain as `ciphertext || nonce`: AES-256-GCM output
//! (ciphertext with its 16-byte tag) followed by the 12-byte nonce. The nonce
//! trails the ciphertext; producers already encode payloads this way, so the
//! layout is fixed.
//!
//! Listeners filter on a key commitment, `keccak256(key)`, so a node only
//! delivers logs encrypted under the caller's key.

use crate::error::{DecryptionError, KeyError};
use crate::hash::keccak256;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use alloy_primitives::B256;
use num_bigint::BigUint;
use std::fmt;
use std::str::FromStr;

/// Trailing nonce length in bytes.
pub const NONCE_LENGTH: usize = 12;

/// AES-256 key length in bytes.
pub const KEY_LENGTH: usize = 32;

/// A raw AES-256 key.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey([u8; KEY_LENGTH]);

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Parse from hex, with or without a `0x`/`0X` prefix.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let s = s.trim();
        let hex = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(hex).map_err(|e| KeyError::InvalidHex(e.to_string()))?;
        let arr: [u8; KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidLength { len: bytes.len() })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    /// The topic-filter commitment for this key.
    pub fn commitment(&self) -> B256 {
        derive_commitment(&self.0)
    }
}

impl FromStr for SymmetricKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

/// keccak256 over the raw key bytes.
pub fn derive_commitment(key: &[u8]) -> B256 {
    keccak256(key)
}

/// Split a payload into `(ciphertext, nonce)` along the trailing-nonce layout.
pub fn split_payload(payload: &[u8]) -> Result<(&[u8], &[u8]), DecryptionError> {
    if payload.len() < NONCE_LENGTH {
        return Err(DecryptionError::PayloadTooShort {
            len: payload.len(),
            min: NONCE_LENGTH,
        });
    }
    Ok(payload.split_at(payload.len() - NONCE_LENGTH))
}

/// Decrypt an encrypted amount with a raw key.
///
/// The plaintext is read as a big-endian unsigned integer of whatever width
/// it has; an empty or all-zero plaintext is zero.
///
/// # Errors
/// `PayloadTooShort` if the payload cannot hold a nonce (checked before any
/// cipher work), `InvalidKeyLength` if `key` is not 32 bytes,
/// `AuthenticationFailed` if the GCM tag does not verify.
pub fn decrypt_amount(payload: &[u8], key: &[u8]) -> Result<BigUint, DecryptionError> {
    let (ciphertext, nonce) = split_payload(payload)?;
    if key.len() != KEY_LENGTH {
        return Err(DecryptionError::InvalidKeyLength { len: key.len() });
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| DecryptionError::InvalidKeyLength { len: key.len() })?;
    open(&cipher, ciphertext, nonce)
}

/// Producer side: encrypt `amount`'s minimal big-endian bytes and append the nonce.
pub fn encrypt_amount(
    amount: &BigUint,
    key: &[u8],
    nonce: [u8; NONCE_LENGTH],
) -> Result<Vec<u8>, DecryptionError> {
    encrypt_bytes(&amount_bytes(amount), key, nonce)
}

/// Producer side: encrypt arbitrary plaintext bytes and append the nonce.
///
/// Lets callers choose the plaintext width, e.g. a 32-byte zero-padded
/// `uint256` encoding instead of the minimal one.
pub fn encrypt_bytes(
    plaintext: &[u8],
    key: &[u8],
    nonce: [u8; NONCE_LENGTH],
) -> Result<Vec<u8>, DecryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| DecryptionError::InvalidKeyLength { len: key.len() })?;
    let mut out = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| DecryptionError::EncryptionFailed)?;
    out.extend_from_slice(&nonce);
    Ok(out)
}

fn amount_bytes(amount: &BigUint) -> Vec<u8> {
    // BigUint encodes zero as [0]; the wire form of zero is empty
    if amount.bits() == 0 {
        Vec::new()
    } else {
        amount.to_bytes_be()
    }
}

fn open(cipher: &Aes256Gcm, ciphertext: &[u8], nonce: &[u8]) -> Result<BigUint, DecryptionError> {
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| DecryptionError::AuthenticationFailed)?;
    Ok(BigUint::from_bytes_be(&plaintext))
}

/// A ready-to-use cipher plus the commitment for one key.
///
/// Built once at startup and shared read-only (behind `Arc`) by every
/// listener task.
#[derive(Clone)]
pub struct AmountCipher {
    cipher: Aes256Gcm,
    commitment: B256,
}

impl AmountCipher {
    pub fn new(key: &SymmetricKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.as_bytes().into()),
            commitment: key.commitment(),
        }
    }

    pub fn commitment(&self) -> B256 {
        self.commitment
    }

    /// Same contract as [`decrypt_amount`], with the key already bound.
    pub fn decrypt(&self, payload: &[u8]) -> Result<BigUint, DecryptionError> {
        let (ciphertext, nonce) = split_payload(payload)?;
        open(&self.cipher, ciphertext, nonce)
    }
}

impl fmt::Debug for AmountCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmountCipher")
            .field("commitment", &self.commitment)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    const KEY_HEX: &str = "0x0aa14dad19b11c95fd366db53bf02b8aceaf3c699b64751bf2ca401eeefd722c";

    fn random_key() -> [u8; KEY_LENGTH] {
        let mut k = [0u8; KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut k);
        k
    }

    fn random_nonce() -> [u8; NONCE_LENGTH] {
        let mut n = [0u8; NONCE_LENGTH];
        rand::thread_rng().fill_bytes(&mut n);
        n
    }

    #[test]
    fn key_parses_with_and_without_prefix() {
        let a = SymmetricKey::from_hex(KEY_HEX).unwrap();
        let b = SymmetricKey::from_hex(KEY_HEX.trim_start_matches("0x")).unwrap();
        let c = SymmetricKey::from_hex(&KEY_HEX.replacen("0x", "0X", 1)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.as_bytes()[0], 0x0a);
    }

    #[test]
    fn key_rejects_bad_input() {
        assert!(matches!(SymmetricKey::from_hex("0xzz"), Err(KeyError::InvalidHex(_))));
        assert_eq!(
            SymmetricKey::from_hex("0x0102").unwrap_err(),
            KeyError::InvalidLength { len: 2 }
        );
    }

    #[test]
    fn key_debug_is_redacted() {
        let key = SymmetricKey::from_hex(KEY_HEX).unwrap();
        assert!(!format!("{key:?}").contains("0aa14dad"));
    }

    #[test]
    fn commitment_is_deterministic_and_key_bound() {
        let k1 = random_key();
        let mut k2 = k1;
        k2[31] ^= 1;
        assert_eq!(derive_commitment(&k1), derive_commitment(&k1));
        assert_ne!(derive_commitment(&k1), derive_commitment(&k2));
        assert_eq!(SymmetricKey::from_bytes(k1).commitment(), derive_commitment(&k1));
    }

    #[test]
    fn roundtrip_various_widths() {
        let key = random_key();
        let amounts = [
            BigUint::from(0u8),
            BigUint::from(1u8),
            BigUint::from(1000u32),
            BigUint::from(u128::MAX),
            // wider than uint256
            BigUint::from_bytes_be(&[0xff; 40]),
        ];
        for amount in amounts {
            let payload = encrypt_amount(&amount, &key, random_nonce()).unwrap();
            assert_eq!(decrypt_amount(&payload, &key).unwrap(), amount);
        }
    }

    #[test]
    fn zero_padded_uint256_plaintext() {
        let key = random_key();
        let mut word = [0u8; 32];
        word[30..].copy_from_slice(&1000u16.to_be_bytes());
        let payload = encrypt_bytes(&word, &key, random_nonce()).unwrap();
        assert_eq!(decrypt_amount(&payload, &key).unwrap(), BigUint::from(1000u32));
    }

    #[test]
    fn tampering_any_bit_fails_authentication() {
        let key = random_key();
        let payload = encrypt_amount(&BigUint::from(42u8), &key, random_nonce()).unwrap();
        for byte in 0..payload.len() {
            for bit in 0..8 {
                let mut tampered = payload.clone();
                tampered[byte] ^= 1 << bit;
                assert_eq!(
                    decrypt_amount(&tampered, &key),
                    Err(DecryptionError::AuthenticationFailed),
                    "byte {byte} bit {bit}"
                );
            }
        }
    }

    #[test]
    fn short_payload_is_invalid_input() {
        let key = random_key();
        for len in 0..NONCE_LENGTH {
            assert_eq!(
                decrypt_amount(&vec![0u8; len], &key),
                Err(DecryptionError::PayloadTooShort { len, min: NONCE_LENGTH })
            );
        }
        // the length check runs before the key is even looked at
        assert!(matches!(
            decrypt_amount(&[0u8; 4], &[0u8; 3]),
            Err(DecryptionError::PayloadTooShort { .. })
        ));
    }

    #[test]
    fn bare_nonce_fails_authentication() {
        let key = random_key();
        assert_eq!(
            decrypt_amount(&[0u8; NONCE_LENGTH], &key),
            Err(DecryptionError::AuthenticationFailed)
        );
    }

    #[test]
    fn wrong_key_length() {
        assert_eq!(
            decrypt_amount(&[0u8; 40], &[0u8; 16]),
            Err(DecryptionError::InvalidKeyLength { len: 16 })
        );
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let payload = encrypt_amount(&BigUint::from(7u8), &random_key(), random_nonce()).unwrap();
        assert_eq!(
            decrypt_amount(&payload, &random_key()),
            Err(DecryptionError::AuthenticationFailed)
        );
    }

    #[test]
    fn amount_cipher_matches_free_function() {
        let key = SymmetricKey::from_bytes(random_key());
        let cipher = AmountCipher::new(&key);
        let payload =
            encrypt_amount(&BigUint::from(123_456u32), key.as_bytes(), random_nonce()).unwrap();
        assert_eq!(cipher.decrypt(&payload).unwrap(), BigUint::from(123_456u32));
        assert_eq!(cipher.commitment(), key.commitment());
        assert!(matches!(
            cipher.decrypt(&[1, 2, 3]),
            Err(DecryptionError::PayloadTooShort { len: 3, .. })
        ));
    }
}
