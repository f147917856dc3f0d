//! # shieldlog-evm
//!
//! EVM-side handling of confidential token events.
//!
//! ## Implementation notes
//! - Uses `alloy-core` dyn-abi for the data section (a single dynamic `bytes`)
//! - topics[0] → event content hash, re-validated against the schema
//! - topics[1..=2] → indexed addresses (low-order 20 bytes of each topic)
//! - topics[3] → key commitment, matched by the subscription filter only

pub mod decoder;
pub mod encoder;
pub mod filter;

pub use decoder::{ApprovalEvent, ConfidentialEvent, LogDecoder, TransferEvent};
pub use encoder::{encode_event_data, encode_log};
pub use filter::TopicFilter;
