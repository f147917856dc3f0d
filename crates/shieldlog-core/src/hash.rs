//! keccak256, the chain's canonical content hash.
//!
//! Used for event fingerprints (`keccak256("Transfer(address,address,bytes32,bytes)")`)
//! and for the key commitment topic.

use alloy_primitives::B256;
use tiny_keccak::{Hasher, Keccak};

/// keccak256 over arbitrary bytes.
pub fn keccak256(input: impl AsRef<[u8]>) -> B256 {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(input.as_ref());
    hasher.finalize(&mut output);
    B256::from(output)
}

/// keccak256 of a canonical ABI signature string, e.g. `"Transfer(address,address,uint256)"`.
pub fn keccak256_signature(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}
