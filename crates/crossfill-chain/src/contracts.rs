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

//! Bindings for the protocol contracts.
//!
//! The outbox claim call is overloaded on-chain (call batch vs user
//! operation), so the user operation variant gets its own binding to
//! keep the generated method names unambiguous.

use crossfill_codec::{Attributes, CrossChainRequest};
use crossfill_utils::{Error, Result};
use ethers::contract::{abigen, EthLogDecode};
use ethers::core::abi::RawLog;
use ethers::types::{H256, U256};

abigen!(
    Outbox,
    r#"[
        event MessagePosted(bytes32 indexed outboxId, bytes32 sourceChain, bytes32 sender, bytes32 destinationChain, bytes32 receiver, bytes payload, uint256 value, bytes[] attributes)
        function claimReward(bytes32 destinationChain, bytes32 receiver, bytes payload, bytes[] attributes, bytes proof, address payTo) external
    ]"#;

    UserOpOutbox,
    r#"[
        struct ClaimUserOperation { address sender; uint256 nonce; bytes initCode; bytes callData; bytes32 accountGasLimits; uint256 preVerificationGas; bytes32 gasFees; bytes paymasterAndData; bytes signature; }
        function claimReward(ClaimUserOperation userOp, bytes proof, address payTo) external
    ]"#;

    Inbox,
    r#"[
        function fulfill(bytes32 sourceChain, bytes32 sender, bytes payload, bytes[] attributes, address fulfiller) external payable
        function getFulfillmentInfo(bytes32 requestHash) external view returns (uint96 timestamp, address fulfiller)
        function entryPointDeposit(uint256 amount) external payable
        function getMagicSpendBalance(address account, address token) external view returns (uint256)
    ]"#;

    EntryPoint,
    r#"[
        struct BundleUserOperation { address sender; uint256 nonce; bytes initCode; bytes callData; bytes32 accountGasLimits; uint256 preVerificationGas; bytes32 gasFees; bytes paymasterAndData; bytes signature; }
        function handleOps(BundleUserOperation[] ops, address beneficiary) external
        function getUserOpHash(BundleUserOperation userOp) external view returns (bytes32)
        function balanceOf(address account) external view returns (uint256)
    ]"#;

    RollupRegistry,
    r#"[
        struct GlobalState { bytes32[2] bytes32Vals; uint64[2] u64Vals; }
        struct ExecutionState { GlobalState globalState; uint8 machineStatus; }
        struct Assertion { ExecutionState beforeState; ExecutionState afterState; uint64 numBlocks; }
        event NodeCreated(uint64 indexed nodeNum, bytes32 indexed parentNodeHash, bytes32 indexed nodeHash, bytes32 executionHash, Assertion assertion, bytes32 afterInboxBatchAcc, bytes32 wasmModuleRoot, uint256 inboxMaxCount)
        function latestConfirmed() external view returns (uint64)
    ]"#;

    AnchorStateRegistry,
    r#"[
        function anchors(uint256 index) external view returns (bytes32 root, uint256 l2BlockNumber)
    ]"#;

    HashOracle,
    r#"[
        function setHash(uint256 domain, uint256 id, bytes32 hash) external
        function hashes(uint256 domain, uint256 id) external view returns (bytes32 hash)
    ]"#;
);

/// Decodes a raw `MessagePosted` log into a [`CrossChainRequest`].
pub fn decode_message_posted(raw: &RawLog) -> Result<CrossChainRequest> {
    let event = MessagePostedFilter::decode_log(raw)?;
    Ok(CrossChainRequest {
        outbox_id: H256(event.outbox_id),
        source_chain: H256(event.source_chain),
        sender: H256(event.sender),
        destination_chain: H256(event.destination_chain),
        receiver: H256(event.receiver),
        payload: event.payload,
        value: event.value,
        attributes: Attributes::new(event.attributes)?,
    })
}

/// Converts a codec user operation into the generated entry point
/// struct.
pub fn to_entry_point_user_op(
    op: &crossfill_codec::PackedUserOperation,
) -> BundleUserOperation {
    BundleUserOperation {
        sender: op.sender,
        nonce: op.nonce,
        init_code: op.init_code.clone(),
        call_data: op.call_data.clone(),
        account_gas_limits: op.account_gas_limits.0,
        pre_verification_gas: op.pre_verification_gas,
        gas_fees: op.gas_fees.0,
        paymaster_and_data: op.paymaster_and_data.clone(),
        signature: op.signature.clone(),
    }
}

/// Converts a codec user operation into the generated outbox claim
/// struct.
pub fn to_outbox_user_op(
    op: &crossfill_codec::PackedUserOperation,
) -> ClaimUserOperation {
    ClaimUserOperation {
        sender: op.sender,
        nonce: op.nonce,
        init_code: op.init_code.clone(),
        call_data: op.call_data.clone(),
        account_gas_limits: op.account_gas_limits.0,
        pre_verification_gas: op.pre_verification_gas,
        gas_fees: op.gas_fees.0,
        paymaster_and_data: op.paymaster_and_data.clone(),
        signature: op.signature.clone(),
    }
}

/// The confirmed rollup assertion state, flattened out of the
/// `NodeCreated` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionState {
    /// `[blockHash, sendRoot]`.
    pub bytes32_vals: [H256; 2],
    /// `[inboxPosition, positionInMessage]`.
    pub u64_vals: [u64; 2],
    /// Machine status of the assertion.
    pub machine_status: u8,
    /// End history root; zero on legacy registries that do not carry
    /// one.
    pub end_history_root: H256,
}

impl AssertionState {
    /// The destination block hash the assertion commits to.
    pub fn block_hash(&self) -> H256 {
        self.bytes32_vals[0]
    }

    /// The send root the assertion commits to.
    pub fn send_root(&self) -> H256 {
        self.bytes32_vals[1]
    }
}

/// Flattens a decoded `NodeCreated` event into the after-state the
/// proofs need.
pub fn assertion_after_state(event: &NodeCreatedFilter) -> AssertionState {
    // The binding decodes the assertion struct as nested tuples:
    // (beforeState, afterState, numBlocks), each state being
    // ((bytes32Vals, u64Vals), machineStatus).
    let (_before, after, _num_blocks) = &event.assertion;
    let ((bytes32_vals, u64_vals), machine_status) = after;
    AssertionState {
        bytes32_vals: [H256(bytes32_vals[0]), H256(bytes32_vals[1])],
        u64_vals: *u64_vals,
        machine_status: *machine_status,
        end_history_root: H256::zero(),
    }
}

/// Parses an explorer hex or decimal quantity string.
pub fn parse_quantity(value: &str) -> Result<u64> {
    let parsed = match value.strip_prefix("0x") {
        Some(hex_digits) => u64::from_str_radix(hex_digits, 16),
        None => value.parse(),
    };
    parsed.map_err(|_| Error::ExplorerApi {
        message: format!("bad quantity: {value}"),
    })
}

/// Parses an explorer quantity string into a U256.
pub fn parse_quantity_u256(value: &str) -> Result<U256> {
    let parsed = match value.strip_prefix("0x") {
        Some(hex_digits) => U256::from_str_radix(hex_digits, 16).ok(),
        None => U256::from_dec_str(value).ok(),
    };
    parsed.ok_or_else(|| Error::ExplorerApi {
        message: format!("bad quantity: {value}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossfill_codec::attributes::{
        encode_delay_attribute, encode_reward_attribute,
    };
    use ethers::abi::{self, Token};
    use ethers::contract::EthEvent;
    use ethers::types::Bytes;

    #[test]
    fn message_posted_round_trips_through_raw_log() {
        let attributes = vec![
            encode_reward_attribute(H256::repeat_byte(0x0a), U256::from(9u64)),
            encode_delay_attribute(U256::from(1u64), U256::from(2u64)),
        ];
        let payload: Bytes = vec![0xca, 0xfe].into();
        let data = abi::encode(&[
            Token::FixedBytes(H256::from_low_u64_be(1).as_bytes().to_vec()),
            Token::FixedBytes(H256::from_low_u64_be(2).as_bytes().to_vec()),
            Token::FixedBytes(H256::from_low_u64_be(3).as_bytes().to_vec()),
            Token::FixedBytes(H256::from_low_u64_be(4).as_bytes().to_vec()),
            Token::Bytes(payload.to_vec()),
            Token::Uint(U256::from(5u64)),
            Token::Array(
                attributes
                    .iter()
                    .map(|a| Token::Bytes(a.to_vec()))
                    .collect(),
            ),
        ]);
        let raw = RawLog {
            topics: vec![
                MessagePostedFilter::signature(),
                H256::repeat_byte(0x77),
            ],
            data,
        };
        let request = decode_message_posted(&raw).unwrap();
        assert_eq!(request.outbox_id, H256::repeat_byte(0x77));
        assert_eq!(request.source_chain, H256::from_low_u64_be(1));
        assert_eq!(request.receiver, H256::from_low_u64_be(4));
        assert_eq!(request.payload, payload);
        assert_eq!(request.value, U256::from(5u64));
        assert_eq!(request.attributes.count(), 2);
    }

    #[test]
    fn assertion_after_state_reads_the_after_leg() {
        let before = (([[0u8; 32]; 2], [0u64; 2]), 0u8);
        let after = (
            (
                [H256::repeat_byte(0x11).0, H256::repeat_byte(0x22).0],
                [7u64, 3u64],
            ),
            1u8,
        );
        let event = NodeCreatedFilter {
            node_num: 42,
            parent_node_hash: H256::repeat_byte(0x01).0,
            node_hash: H256::repeat_byte(0x02).0,
            execution_hash: H256::repeat_byte(0x03).0,
            assertion: (before, after, 5u64),
            after_inbox_batch_acc: H256::repeat_byte(0x04).0,
            wasm_module_root: H256::repeat_byte(0x05).0,
            inbox_max_count: U256::one(),
        };
        let state = assertion_after_state(&event);
        assert_eq!(state.block_hash(), H256::repeat_byte(0x11));
        assert_eq!(state.send_root(), H256::repeat_byte(0x22));
        assert_eq!(state.u64_vals, [7, 3]);
        assert_eq!(state.machine_status, 1);
        assert_eq!(state.end_history_root, H256::zero());
    }

    #[test]
    fn quantity_parsing_accepts_hex_and_decimal() {
        assert_eq!(parse_quantity("0x10").unwrap(), 16);
        assert_eq!(parse_quantity("16").unwrap(), 16);
        assert!(parse_quantity("0xzz").is_err());
    }
}
