//! `LogDecoder`: typed decode of confidential token logs.
//!
//! Layout of every matching log:
//! - topics[0] → event content hash (keccak256 of the signature)
//! - topics[1], topics[2] → indexed addresses, left-padded to 32 bytes
//! - topics[3] → key commitment (consumed by the filter, not surfaced)
//! - `data` → ABI-encoded `(bytes encryptedAmount)`

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{Address, Bytes, B256};
use shieldlog_core::{
    error::DecodeError,
    event::{DecodedEventRecord, RawLog},
    schema::{EventKind, EventSchema},
};

/// Decoded `Transfer(address indexed from, address indexed to, bytes32 indexed, bytes)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub encrypted_amount: Bytes,
}

/// Decoded `Approval(address indexed owner, address indexed spender, bytes32 indexed, bytes)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalEvent {
    pub owner: Address,
    pub spender: Address,
    pub encrypted_amount: Bytes,
}

/// One decoded event, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfidentialEvent {
    Transfer(TransferEvent),
    Approval(ApprovalEvent),
}

impl ConfidentialEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ConfidentialEvent::Transfer(_) => EventKind::Transfer,
            ConfidentialEvent::Approval(_) => EventKind::Approval,
        }
    }
}

impl From<ConfidentialEvent> for DecodedEventRecord {
    fn from(ev: ConfidentialEvent) -> Self {
        let kind = ev.kind();
        let (indexed, encrypted_payload) = match ev {
            ConfidentialEvent::Transfer(t) => ([t.from, t.to], t.encrypted_amount),
            ConfidentialEvent::Approval(a) => ([a.owner, a.spender], a.encrypted_amount),
        };
        DecodedEventRecord {
            kind,
            indexed,
            encrypted_payload,
        }
    }
}

/// The log decoder. Stateless and cheap to copy.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDecoder;

impl LogDecoder {
    /// Event hash plus both indexed addresses.
    pub const MIN_TOPICS: usize = 3;

    pub fn new() -> Self {
        Self
    }

    /// Decode `raw` against `schema` into the transient pre-decryption record.
    pub fn decode(
        &self,
        raw: &RawLog,
        schema: &EventSchema,
    ) -> Result<DecodedEventRecord, DecodeError> {
        self.decode_typed(raw, schema).map(Into::into)
    }

    /// Decode `raw` into its typed event.
    pub fn decode_typed(
        &self,
        raw: &RawLog,
        schema: &EventSchema,
    ) -> Result<ConfidentialEvent, DecodeError> {
        if raw.topics.len() < Self::MIN_TOPICS {
            return Err(DecodeError::MissingTopics {
                expected: Self::MIN_TOPICS,
                got: raw.topics.len(),
            });
        }
        // The subscription filter already guarantees this; check anyway
        if raw.event_signature() != Some(&schema.content_hash) {
            return Err(DecodeError::FingerprintMismatch {
                expected: format!("{:#x}", schema.content_hash),
                got: format!("{:#x}", raw.topics[0]),
            });
        }

        let first = topic_address(&raw.topics[1]);
        let second = topic_address(&raw.topics[2]);
        let encrypted_amount = decode_payload(&raw.data)?;

        Ok(match schema.kind {
            EventKind::Transfer => ConfidentialEvent::Transfer(TransferEvent {
                from: first,
                to: second,
                encrypted_amount,
            }),
            EventKind::Approval => ConfidentialEvent::Approval(ApprovalEvent {
                owner: first,
                spender: second,
                encrypted_amount,
            }),
        })
    }
}

/// Indexed address params occupy the low-order 20 bytes of the topic.
pub fn topic_address(topic: &B256) -> Address {
    Address::from_word(*topic)
}

/// Decode the data section as the single dynamic `bytes` parameter.
fn decode_payload(data: &[u8]) -> Result<Bytes, DecodeError> {
    let ty = DynSolType::Tuple(vec![DynSolType::Bytes]);
    let decoded = ty
        .abi_decode_sequence(data)
        .map_err(|e| DecodeError::AbiDecodeFailed {
            reason: e.to_string(),
        })?;

    match decoded {
        DynSolValue::Tuple(mut values) if values.len() == 1 => match values.pop() {
            Some(DynSolValue::Bytes(b)) => Ok(Bytes::from(b)),
            other => Err(DecodeError::AbiDecodeFailed {
                reason: format!("expected bytes, got {other:?}"),
            }),
        },
        other => Err(DecodeError::AbiDecodeFailed {
            reason: format!("expected 1-tuple, got {other:?}"),
        }),
    }
}
