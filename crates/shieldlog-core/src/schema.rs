//! Static schemas for the confidential token events.
//!
//! Both events share one wire shape: two indexed addresses, an indexed
//! `bytes32` key commitment, and a non-indexed `bytes` payload holding the
//! AES-GCM encrypted amount.
//!
//! ```text
//! event Transfer(address indexed from,  address indexed to,      bytes32 indexed encryptKeyHash, bytes encryptedAmount)
//! event Approval(address indexed owner, address indexed spender, bytes32 indexed encryptKeyHash, bytes encryptedAmount)
//! ```
//!
//! The table is built once per process and never mutated.

use crate::error::SchemaError;
use crate::hash::keccak256_signature;
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// The closed set of events this crate knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    Transfer,
    Approval,
}

impl EventKind {
    pub const ALL: [EventKind; 2] = [EventKind::Transfer, EventKind::Approval];

    pub fn name(self) -> &'static str {
        match self {
            EventKind::Transfer => "Transfer",
            EventKind::Approval => "Approval",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SchemaError::NotFound { name: s.to_string() })
    }
}

/// Semantic type of an indexed (topic) field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexedType {
    /// 20-byte address, left-padded into the 32-byte topic slot
    Address,
    /// Raw 32-byte value
    Hash32,
}

impl IndexedType {
    pub fn solidity_name(self) -> &'static str {
        match self {
            IndexedType::Address => "address",
            IndexedType::Hash32 => "bytes32",
        }
    }
}

/// One indexed field, in topic order (topics[1..]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedField {
    pub name: &'static str,
    pub ty: IndexedType,
}

/// A parsed event schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSchema {
    pub kind: EventKind,
    /// Canonical ABI signature, e.g. "Transfer(address,address,bytes32,bytes)"
    pub signature: String,
    /// Indexed fields in topic order: two addresses then the key commitment
    pub indexed: [IndexedField; 3],
    /// Name of the single non-indexed `bytes` field
    pub payload_field: &'static str,
    /// keccak256 of `signature`; topics[0] of every matching log
    pub content_hash: B256,
}

impl EventSchema {
    fn new(kind: EventKind, indexed: [IndexedField; 3], payload_field: &'static str) -> Self {
        let params: Vec<&str> = indexed
            .iter()
            .map(|f| f.ty.solidity_name())
            .chain(std::iter::once("bytes"))
            .collect();
        let signature = format!("{}({})", kind.name(), params.join(","));
        let content_hash = keccak256_signature(&signature);
        Self {
            kind,
            signature,
            indexed,
            payload_field,
            content_hash,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// The two indexed address fields surfaced in decoded output.
    pub fn address_fields(&self) -> [&'static str; 2] {
        [self.indexed[0].name, self.indexed[1].name]
    }

    /// Full Solidity declaration with parameter names, e.g.
    /// `Transfer(address indexed from, address indexed to, bytes32 indexed encryptKeyHash, bytes encryptedAmount)`.
    pub fn declaration(&self) -> String {
        let params: Vec<String> = self
            .indexed
            .iter()
            .map(|f| format!("{} indexed {}", f.ty.solidity_name(), f.name))
            .chain(std::iter::once(format!("bytes {}", self.payload_field)))
            .collect();
        format!("{}({})", self.name(), params.join(", "))
    }

    /// Header line used when rendering a decrypted record,
    /// e.g. `Transfer(address from, address to, uint256 amount)`.
    pub fn display_header(&self) -> String {
        let [a, b] = self.address_fields();
        format!("{}(address {a}, address {b}, uint256 amount)", self.name())
    }
}

/// Read-only lookup over the static schema table.
#[derive(Debug)]
pub struct SchemaRegistry {
    schemas: Vec<EventSchema>,
}

static REGISTRY: OnceLock<SchemaRegistry> = OnceLock::new();

impl SchemaRegistry {
    /// The process-wide registry.
    pub fn global() -> &'static SchemaRegistry {
        REGISTRY.get_or_init(Self::build)
    }

    fn build() -> Self {
        let addr = |name| IndexedField { name, ty: IndexedType::Address };
        let commitment = IndexedField {
            name: "encryptKeyHash",
            ty: IndexedType::Hash32,
        };
        Self {
            schemas: vec![
                EventSchema::new(
                    EventKind::Transfer,
                    [addr("from"), addr("to"), commitment],
                    "encryptedAmount",
                ),
                EventSchema::new(
                    EventKind::Approval,
                    [addr("owner"), addr("spender"), commitment],
                    "encryptedAmount",
                ),
            ],
        }
    }

    /// Schema for a known kind. Infallible: the kind set is closed.
    pub fn get(&self, kind: EventKind) -> &EventSchema {
        match kind {
            EventKind::Transfer => &self.schemas[0],
            EventKind::Approval => &self.schemas[1],
        }
    }

    /// Look up a schema by event name, with the same matching rules as
    /// parsing an [`EventKind`].
    pub fn schema(&self, name: &str) -> Result<&EventSchema, SchemaError> {
        name.parse().map(|kind| self.get(kind))
    }

    /// Content-hash identifier (topics[0]) for an event name.
    pub fn content_hash(&self, name: &str) -> Result<B256, SchemaError> {
        self.schema(name).map(|s| s.content_hash)
    }

    pub fn by_content_hash(&self, hash: &B256) -> Option<&EventSchema> {
        self.schemas.iter().find(|s| &s.content_hash == hash)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventSchema> {
        self.schemas.iter()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
