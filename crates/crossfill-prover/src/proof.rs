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

//! The proof shapes the on-chain verifiers accept, and their ABI
//! encoding.
//!
//! Field order inside each tuple is fixed by the verifier contracts.
//! [`Proof::encode`] is the only place a proof is turned into
//! calldata; each variant encodes exhaustively, no shape is inferred
//! from optional fields.

use crossfill_chain::contracts::AssertionState;
use ethers::abi::{self, Token};
use ethers::types::{Bytes, H256, U256};

/// Witness binding an execution state root to a beacon root exposed on
/// the source chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateProofParams {
    /// The beacon root the source chain exposes.
    pub beacon_root: H256,
    /// Timestamp under which the source chain exposes that root.
    pub beacon_oracle_timestamp: U256,
    /// The execution state root proven under the beacon root.
    pub execution_state_root: H256,
    /// Merkle witnesses from the state root up to the beacon root.
    pub state_root_proof: Vec<H256>,
}

/// An EIP-1186 account and storage witness for one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountProofParams {
    /// The proven storage slot.
    pub storage_key: Bytes,
    /// The slot's value, minimal big-endian bytes.
    pub storage_value: Bytes,
    /// Merkle-Patricia account witness.
    pub account_proof: Vec<Bytes>,
    /// Merkle-Patricia storage witness.
    pub storage_proof: Vec<Bytes>,
}

/// Proof for destinations settling through a rollup assertion
/// registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupAssertionProof {
    /// RLP-encoded destination block header.
    pub encoded_block_header: Bytes,
    /// The confirmed assertion's after-state.
    pub after_state: AssertionState,
    /// Hash of the parent assertion.
    pub prev_assertion_hash: H256,
    /// Inbox batch accumulator after the assertion.
    pub sequencer_batch_acc: H256,
    /// Beacon-root inclusion witness for the L1 state root.
    pub state_proof: StateProofParams,
    /// L1 witness of the registry's confirm-data slot.
    pub registry_proof: AccountProofParams,
    /// Destination witness of the inbox's fulfillment slot.
    pub inbox_proof: AccountProofParams,
}

/// Proof for destinations settling through an anchored output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRootProof {
    /// The destination block's state root.
    pub l2_state_root: H256,
    /// Storage root of the message passer predeploy at that block.
    pub l2_message_passer_storage_root: H256,
    /// The destination block hash.
    pub l2_block_hash: H256,
    /// Beacon-root inclusion witness for the L1 state root.
    pub state_proof: StateProofParams,
    /// L1 witness of the anchor registry's output-root slot.
    pub anchor_proof: AccountProofParams,
    /// Destination witness of the inbox's fulfillment slot.
    pub inbox_proof: AccountProofParams,
}

/// Proof for chain pairs bridged by a pushed block hash oracle. No L1
/// leg at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashOracleProof {
    /// RLP-encoded destination block header.
    pub encoded_block_header: Bytes,
    /// Destination witness of the inbox's fulfillment slot.
    pub inbox_proof: AccountProofParams,
}

/// A settlement proof, one variant per prover family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proof {
    /// Rollup assertion registry scheme.
    RollupAssertion(RollupAssertionProof),
    /// Anchored output root scheme.
    OutputRoot(OutputRootProof),
    /// Pushed block hash oracle scheme.
    HashOracle(HashOracleProof),
}

impl StateProofParams {
    fn as_token(&self) -> Token {
        Token::Tuple(vec![
            Token::FixedBytes(self.beacon_root.as_bytes().to_vec()),
            Token::Uint(self.beacon_oracle_timestamp),
            Token::FixedBytes(self.execution_state_root.as_bytes().to_vec()),
            Token::Array(
                self.state_root_proof
                    .iter()
                    .map(|w| Token::FixedBytes(w.as_bytes().to_vec()))
                    .collect(),
            ),
        ])
    }
}

impl AccountProofParams {
    fn as_token(&self) -> Token {
        Token::Tuple(vec![
            Token::Bytes(self.storage_key.to_vec()),
            Token::Bytes(self.storage_value.to_vec()),
            Token::Array(
                self.account_proof
                    .iter()
                    .map(|p| Token::Bytes(p.to_vec()))
                    .collect(),
            ),
            Token::Array(
                self.storage_proof
                    .iter()
                    .map(|p| Token::Bytes(p.to_vec()))
                    .collect(),
            ),
        ])
    }
}

/// ABI token of an assertion state, as the registry hashes and the
/// verifier decodes it.
pub fn assertion_state_token(state: &AssertionState) -> Token {
    Token::Tuple(vec![
        Token::Tuple(vec![
            Token::FixedArray(
                state
                    .bytes32_vals
                    .iter()
                    .map(|v| Token::FixedBytes(v.as_bytes().to_vec()))
                    .collect(),
            ),
            Token::FixedArray(
                state
                    .u64_vals
                    .iter()
                    .map(|v| Token::Uint(U256::from(*v)))
                    .collect(),
            ),
        ]),
        Token::Uint(U256::from(state.machine_status)),
        Token::FixedBytes(state.end_history_root.as_bytes().to_vec()),
    ])
}

impl Proof {
    /// Encodes the proof as the single `bytes` claim argument.
    pub fn encode(&self) -> Bytes {
        let token = match self {
            Self::RollupAssertion(proof) => Token::Tuple(vec![
                Token::Bytes(proof.encoded_block_header.to_vec()),
                assertion_state_token(&proof.after_state),
                Token::FixedBytes(
                    proof.prev_assertion_hash.as_bytes().to_vec(),
                ),
                Token::FixedBytes(
                    proof.sequencer_batch_acc.as_bytes().to_vec(),
                ),
                proof.state_proof.as_token(),
                proof.registry_proof.as_token(),
                proof.inbox_proof.as_token(),
            ]),
            Self::OutputRoot(proof) => Token::Tuple(vec![
                Token::FixedBytes(proof.l2_state_root.as_bytes().to_vec()),
                Token::FixedBytes(
                    proof.l2_message_passer_storage_root.as_bytes().to_vec(),
                ),
                Token::FixedBytes(proof.l2_block_hash.as_bytes().to_vec()),
                proof.state_proof.as_token(),
                proof.anchor_proof.as_token(),
                proof.inbox_proof.as_token(),
            ]),
            Self::HashOracle(proof) => Token::Tuple(vec![
                Token::Bytes(proof.encoded_block_header.to_vec()),
                proof.inbox_proof.as_token(),
            ]),
        };
        abi::encode(&[token]).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::ParamType;

    fn account_proof_params() -> AccountProofParams {
        AccountProofParams {
            storage_key: H256::repeat_byte(0x11).as_bytes().to_vec().into(),
            storage_value: vec![0x01].into(),
            account_proof: vec![vec![0xaa].into()],
            storage_proof: vec![vec![0xbb].into()],
        }
    }

    fn account_proof_param_type() -> ParamType {
        ParamType::Tuple(vec![
            ParamType::Bytes,
            ParamType::Bytes,
            ParamType::Array(Box::new(ParamType::Bytes)),
            ParamType::Array(Box::new(ParamType::Bytes)),
        ])
    }

    #[test]
    fn hash_oracle_proof_decodes_with_the_verifier_layout() {
        let proof = Proof::HashOracle(HashOracleProof {
            encoded_block_header: vec![0xf8, 0x01].into(),
            inbox_proof: account_proof_params(),
        });
        let encoded = proof.encode();
        let layout = ParamType::Tuple(vec![
            ParamType::Bytes,
            account_proof_param_type(),
        ]);
        let decoded = abi::decode(&[layout], &encoded).unwrap();
        let Token::Tuple(fields) = &decoded[0] else {
            panic!("expected a tuple");
        };
        assert_eq!(fields[0], Token::Bytes(vec![0xf8, 0x01]));
    }

    #[test]
    fn output_root_proof_field_order_is_stable() {
        let proof = Proof::OutputRoot(OutputRootProof {
            l2_state_root: H256::repeat_byte(0x01),
            l2_message_passer_storage_root: H256::repeat_byte(0x02),
            l2_block_hash: H256::repeat_byte(0x03),
            state_proof: StateProofParams {
                beacon_root: H256::repeat_byte(0x04),
                beacon_oracle_timestamp: U256::from(99u64),
                execution_state_root: H256::repeat_byte(0x05),
                state_root_proof: vec![H256::repeat_byte(0x06)],
            },
            anchor_proof: account_proof_params(),
            inbox_proof: account_proof_params(),
        });
        let encoded = proof.encode();
        // The three leading roots are static heads of the outer tuple.
        assert_eq!(&encoded[32..64], H256::repeat_byte(0x01).as_bytes());
        assert_eq!(&encoded[64..96], H256::repeat_byte(0x02).as_bytes());
        assert_eq!(&encoded[96..128], H256::repeat_byte(0x03).as_bytes());
    }

    #[test]
    fn assertion_state_token_encodes_statically() {
        let state = AssertionState {
            bytes32_vals: [H256::repeat_byte(0x0a), H256::repeat_byte(0x0b)],
            u64_vals: [3, 4],
            machine_status: 1,
            end_history_root: H256::repeat_byte(0x0c),
        };
        let encoded = abi::encode(&[assertion_state_token(&state)]);
        // Static struct: 6 words, head-encoded inline.
        assert_eq!(encoded.len(), 6 * 32);
        assert_eq!(&encoded[0..32], H256::repeat_byte(0x0a).as_bytes());
        assert_eq!(
            &encoded[5 * 32..],
            H256::repeat_byte(0x0c).as_bytes()
        );
    }
}
