//! Producer-side encoding of confidential token logs.
//!
//! The listener never needs this; it exists for the sender tooling, demos and
//! tests that synthesize logs exactly as a contract would emit them.

use alloy_core::dyn_abi::DynSolValue;
use alloy_primitives::{Address, B256};
use shieldlog_core::{
    event::RawLog,
    schema::{EventKind, SchemaRegistry},
};

/// ABI-encode the data section: the single dynamic `bytes encryptedAmount` param.
pub fn encode_event_data(encrypted_payload: &[u8]) -> Vec<u8> {
    DynSolValue::Tuple(vec![DynSolValue::Bytes(encrypted_payload.to_vec())]).abi_encode_params()
}

/// Build the full log a contract would emit for `kind`.
pub fn encode_log(
    kind: EventKind,
    contract: Address,
    indexed: [Address; 2],
    commitment: B256,
    encrypted_payload: &[u8],
) -> RawLog {
    let schema = SchemaRegistry::global().get(kind);
    RawLog::new(
        contract,
        vec![
            schema.content_hash,
            indexed[0].into_word(),
            indexed[1].into_word(),
            commitment,
        ],
        encode_event_data(encrypted_payload),
    )
}
