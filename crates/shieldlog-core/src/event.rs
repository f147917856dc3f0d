//! Raw, decoded and decrypted event types.

use crate::schema::{EventKind, SchemaRegistry};
use alloy_primitives::{Address, Bytes, B256};
use num_bigint::BigUint;

/// An undecoded log entry as delivered by a live subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    /// Contract that emitted the log
    pub address: Address,
    /// topics[0] is the event content hash; topics[1..] are indexed params
    pub topics: Vec<B256>,
    /// ABI-encoded non-indexed params
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<u64>,
}

impl RawLog {
    pub fn new(address: Address, topics: Vec<B256>, data: impl Into<Bytes>) -> Self {
        Self {
            address,
            topics,
            data: data.into(),
            block_number: None,
            transaction_hash: None,
            log_index: None,
        }
    }

    /// topics[0], if present.
    pub fn event_signature(&self) -> Option<&B256> {
        self.topics.first()
    }
}

/// A log after schema decode, before decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEventRecord {
    pub kind: EventKind,
    /// The two indexed addresses, in schema order (from/to or owner/spender)
    pub indexed: [Address; 2],
    pub encrypted_payload: Bytes,
}

/// The terminal, human-facing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedRecord {
    pub kind: EventKind,
    pub indexed: [Address; 2],
    pub amount: BigUint,
}

impl DecryptedRecord {
    /// Named address fields, e.g. `[("from", ..), ("to", ..)]`.
    pub fn fields(&self) -> [(&'static str, Address); 2] {
        let [a, b] = SchemaRegistry::global().get(self.kind).address_fields();
        [(a, self.indexed[0]), (b, self.indexed[1])]
    }

    /// Field value by name.
    pub fn field(&self, name: &str) -> Option<Address> {
        self.fields()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }
}

impl DecodedEventRecord {
    /// Attach a decrypted amount.
    pub fn with_amount(self, amount: BigUint) -> DecryptedRecord {
        DecryptedRecord {
            kind: self.kind,
            indexed: self.indexed,
            amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn fields_follow_schema_names() {
        let rec = DecryptedRecord {
            kind: EventKind::Approval,
            indexed: [
                address!("00000000000000000000000000000000000000aa"),
                address!("00000000000000000000000000000000000000bb"),
            ],
            amount: BigUint::from(5u8),
        };
        assert_eq!(rec.field("owner"), Some(rec.indexed[0]));
        assert_eq!(rec.field("spender"), Some(rec.indexed[1]));
        assert_eq!(rec.field("from"), None);
    }

    #[test]
    fn raw_log_signature() {
        let log = RawLog::new(Address::ZERO, vec![B256::repeat_byte(1)], Vec::<u8>::new());
        assert_eq!(log.event_signature(), Some(&B256::repeat_byte(1)));
    }
}
