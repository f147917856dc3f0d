//! Topic filters for `eth_subscribe("logs", …)`.
//!
//! Each position in `topics` is either a wildcard (`null`) or a set of
//! accepted values. For confidential events:
//!
//! | position | constraint |
//! |---|---|
//! | 0 | event content hash (required) |
//! | 1 | any |
//! | 2 | any, or one counterparty (`to` / `spender`) in recipient mode |
//! | 3 | key commitment (required) |

use alloy_primitives::{Address, B256};
use serde_json::{json, Value};
use shieldlog_core::schema::EventSchema;

/// Number of topic positions a confidential event uses.
pub const TOPIC_POSITIONS: usize = 4;

/// Immutable log filter for one event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    pub address: Address,
    pub topics: [Option<Vec<B256>>; TOPIC_POSITIONS],
}

impl TopicFilter {
    /// Filter for `schema` logs from `contract` encrypted under `commitment`.
    pub fn for_event(schema: &EventSchema, contract: Address, commitment: B256) -> Self {
        Self {
            address: contract,
            topics: [
                Some(vec![schema.content_hash]),
                None,
                None,
                Some(vec![commitment]),
            ],
        }
    }

    /// Additionally require the second indexed address (recipient / spender).
    pub fn with_counterparty(mut self, counterparty: Address) -> Self {
        self.topics[2] = Some(vec![counterparty.into_word()]);
        self
    }

    /// topics[0] constraint.
    pub fn event_hash(&self) -> Option<B256> {
        self.topics[0].as_ref().and_then(|v| v.first().copied())
    }

    /// topics[3] constraint.
    pub fn commitment(&self) -> Option<B256> {
        self.topics[3].as_ref().and_then(|v| v.first().copied())
    }

    /// Whether a log with these topics would be delivered by the node.
    pub fn matches(&self, address: &Address, topics: &[B256]) -> bool {
        if address != &self.address {
            return false;
        }
        self.topics.iter().enumerate().all(|(i, want)| match want {
            None => true,
            Some(set) => topics.get(i).map(|t| set.contains(t)).unwrap_or(false),
        })
    }

    /// JSON-RPC filter object for `eth_subscribe`.
    pub fn to_rpc_params(&self) -> Value {
        // Trailing wildcards can be omitted, but nodes accept them either way
        let topics: Vec<Value> = self
            .topics
            .iter()
            .map(|pos| match pos {
                None => Value::Null,
                Some(set) if set.len() == 1 => json!(format!("{:#x}", set[0])),
                Some(set) => Value::Array(set.iter().map(|t| json!(format!("{t:#x}"))).collect()),
            })
            .collect();
        json!({
            "address": self.address.to_checksum(None),
            "topics": topics,
        })
    }
}
