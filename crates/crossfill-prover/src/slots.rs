// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Storage slot derivations for the proven contracts.

use crossfill_chain::client::ConfirmedAssertion;
use ethers::abi::{self, Token};
use ethers::types::{H256, U256};
use ethers::utils::keccak256;

use crate::proof::assertion_state_token;

/// `confirmData` sits two slots into the registry's node struct.
pub const CONFIRM_DATA_OFFSET: u64 = 2;

fn slot_as_uint(slot: H256) -> Token {
    Token::Uint(U256::from_big_endian(slot.as_bytes()))
}

/// The inbox slot holding a request's fulfillment record:
/// `keccak256(abi.encode(requestHash, baseSlot))`.
pub fn fulfillment_info_slot(request_hash: H256, base_slot: H256) -> H256 {
    let encoded = abi::encode(&[
        Token::FixedBytes(request_hash.as_bytes().to_vec()),
        slot_as_uint(base_slot),
    ]);
    H256(keccak256(encoded))
}

/// The registry slot holding a confirmed node's `confirmData`, for
/// registries keyed by node index:
/// `keccak256(abi.encode(nodeIndex, nodeStructSlot)) + 2`.
pub fn node_confirm_data_slot(node_index: u64, node_struct_slot: H256) -> H256 {
    let encoded = abi::encode(&[
        Token::Uint(U256::from(node_index)),
        slot_as_uint(node_struct_slot),
    ]);
    let base = U256::from_big_endian(&keccak256(encoded));
    let mut slot = H256::zero();
    (base + CONFIRM_DATA_OFFSET).to_big_endian(slot.as_bytes_mut());
    slot
}

/// The registry slot for registries keyed by assertion hash. The hash
/// is recomputed from the assertion itself: hash the after-state,
/// chain it with the parent assertion hash and the batch accumulator,
/// then map into the assertion mapping.
pub fn assertion_confirm_slot(
    assertion: &ConfirmedAssertion,
    assertion_map_slot: H256,
) -> H256 {
    let after_state_hash =
        keccak256(abi::encode(&[assertion_state_token(&assertion.state)]));
    let new_assertion_hash = keccak256(abi::encode(&[
        Token::FixedBytes(assertion.parent_node_hash.as_bytes().to_vec()),
        Token::FixedBytes(after_state_hash.to_vec()),
        Token::FixedBytes(assertion.after_inbox_batch_acc.as_bytes().to_vec()),
    ]));
    let encoded = abi::encode(&[
        Token::FixedBytes(new_assertion_hash.to_vec()),
        slot_as_uint(assertion_map_slot),
    ]);
    H256(keccak256(encoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fulfillment_slot_is_deterministic() {
        let request_hash = H256::repeat_byte(0xab);
        let base = H256::from_low_u64_be(7);
        let slot = fulfillment_info_slot(request_hash, base);
        assert_eq!(slot, fulfillment_info_slot(request_hash, base));
        assert_ne!(slot, fulfillment_info_slot(H256::repeat_byte(0xac), base));
    }

    #[test]
    fn confirm_data_slot_applies_the_struct_offset() {
        let node_struct_slot = H256::from_low_u64_be(118);
        let encoded = abi::encode(&[
            Token::Uint(U256::from(42u64)),
            Token::Uint(U256::from(118u64)),
        ]);
        let base = U256::from_big_endian(&keccak256(encoded));
        let slot = node_confirm_data_slot(42, node_struct_slot);
        assert_eq!(U256::from_big_endian(slot.as_bytes()), base + 2);
    }
}
