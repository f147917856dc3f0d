//! Error types for the shieldlog pipeline.

use thiserror::Error;

/// Errors from the static event schema registry.
///
/// The schema table is fixed at build time, so any of these is a programming
/// error rather than something to recover from at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Schema '{name}' not found")]
    NotFound { name: String },
}

/// Errors that can occur while decoding a single raw log.
///
/// Always scoped to one entry: the owning listener logs it, drops the entry
/// and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Log has {got} topics, expected at least {expected}")]
    MissingTopics { expected: usize, got: usize },

    #[error("Fingerprint mismatch: expected {expected}, got {got}")]
    FingerprintMismatch { expected: String, got: String },

    #[error("ABI decode failed: {reason}")]
    AbiDecodeFailed { reason: String },

    #[error("Invalid raw log: {reason}")]
    InvalidRawLog { reason: String },
}

/// Errors from authenticated decryption of an encrypted amount.
///
/// None of these ever carries a plaintext: a failed open is never reported as
/// a zero amount.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecryptionError {
    #[error("Encrypted payload is {len} bytes, shorter than the {min}-byte nonce")]
    PayloadTooShort { len: usize, min: usize },

    #[error("AES-256 key must be 32 bytes, got {len}")]
    InvalidKeyLength { len: usize },

    #[error("AES-GCM authentication failed")]
    AuthenticationFailed,

    #[error("AES-GCM encryption failed")]
    EncryptionFailed,
}

/// Errors parsing a symmetric key from its textual form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("Invalid key hex: {0}")]
    InvalidHex(String),

    #[error("Key must be 32 bytes, got {len}")]
    InvalidLength { len: usize },
}

/// Errors from a live log subscription.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// The subscription could not be established at all.
    #[error("Subscription setup failed for {url}: {reason}")]
    Setup { url: String, reason: String },

    /// The subscription was live and then died.
    #[error("Subscription failed: {reason}")]
    Runtime { reason: String },

    /// The transport went away without reporting an error.
    #[error("Subscription closed unexpectedly")]
    Closed,

    /// Releasing the subscription did not complete cleanly.
    #[error("Failed to close subscription: {reason}")]
    Close { reason: String },
}

impl SubscriptionError {
    /// Returns `true` for errors raised before the stream ever became active.
    pub fn is_setup(&self) -> bool {
        matches!(self, Self::Setup { .. })
    }
}
