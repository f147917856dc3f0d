//! # shieldlog-core
//!
//! Core types and primitives shared across the shieldlog crates: the static
//! event schema registry, the confidential amount codec (key commitment and
//! AES-256-GCM amount decryption), raw/decoded/decrypted record types, chain
//! endpoints, and the record output sink.

pub mod chain;
pub mod codec;
pub mod error;
pub mod event;
pub mod hash;
pub mod output;
pub mod schema;

pub use chain::{chains, ChainEndpoint};
pub use codec::{decrypt_amount, derive_commitment, AmountCipher, SymmetricKey, NONCE_LENGTH};
pub use error::{DecodeError, DecryptionError, KeyError, SchemaError, SubscriptionError};
pub use event::{DecodedEventRecord, DecryptedRecord, RawLog};
pub use output::{render, ChannelSink, RecordSink, StdoutSink};
pub use schema::{EventKind, EventSchema, SchemaRegistry};

pub use alloy_primitives::{Address, Bytes, B256};
pub use num_bigint::BigUint;
