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

//! The posted cross-chain request model.

use crossfill_utils::{Error, Result};
use ethers::abi::{self, ParamType, Token};
use ethers::types::{Bytes, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

use crate::attributes::Attributes;
use crate::bytes32_to_address;
use crate::user_op::PackedUserOperation;

/// A single low-level call the receiver should execute on the
/// destination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    /// Call target, as a left-padded `bytes32`.
    pub to: H256,
    /// Calldata.
    pub data: Bytes,
    /// Native value to attach.
    pub value: U256,
}

/// A cross-chain call request as posted on the source chain outbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainRequest {
    /// The request hash the outbox emitted (topic 1 of the event).
    pub outbox_id: H256,
    /// Source chain id, left-padded to `bytes32`.
    pub source_chain: H256,
    /// The outbox contract the request was posted through.
    pub sender: H256,
    /// Destination chain id, left-padded to `bytes32`.
    pub destination_chain: H256,
    /// The inbox contract that should execute the calls.
    pub receiver: H256,
    /// ABI-encoded calls, or a packed user operation when the
    /// attribute bag is empty.
    pub payload: Bytes,
    /// Native value attached to the post.
    pub value: U256,
    /// The posted attribute bag.
    pub attributes: Attributes,
}

impl CrossChainRequest {
    /// Computes the canonical request hash over the posted fields.
    pub fn request_hash(&self) -> H256 {
        let encoded = abi::encode(&[
            Token::FixedBytes(self.source_chain.as_bytes().to_vec()),
            Token::FixedBytes(self.sender.as_bytes().to_vec()),
            Token::FixedBytes(self.destination_chain.as_bytes().to_vec()),
            Token::FixedBytes(self.receiver.as_bytes().to_vec()),
            Token::Bytes(self.payload.to_vec()),
            Token::Array(
                self.attributes
                    .as_raw()
                    .iter()
                    .map(|blob| Token::Bytes(blob.to_vec()))
                    .collect(),
            ),
        ]);
        H256(keccak256(encoded))
    }

    /// Verifies the recomputed request hash against the outbox id from
    /// the event topics.
    pub fn verify_hash(&self) -> Result<()> {
        let computed = self.request_hash();
        if computed != self.outbox_id {
            return Err(Error::RequestHashMismatch {
                expected: self.outbox_id,
                computed,
            });
        }
        Ok(())
    }

    /// Source chain id as a plain integer.
    pub fn source_chain_id(&self) -> u64 {
        U256::from_big_endian(self.source_chain.as_bytes()).low_u64()
    }

    /// Destination chain id as a plain integer.
    pub fn destination_chain_id(&self) -> u64 {
        U256::from_big_endian(self.destination_chain.as_bytes()).low_u64()
    }

    /// The receiver (inbox) as an EVM address.
    pub fn receiver_address(&self) -> ethers::types::Address {
        bytes32_to_address(&self.receiver)
    }

    /// An empty attribute bag marks the payload as a packed user
    /// operation rather than an encoded call batch.
    pub fn is_user_op(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Decodes the payload as a call batch.
    pub fn calls(&self) -> Result<Vec<Call>> {
        let tokens = abi::decode(
            &[ParamType::Array(Box::new(ParamType::Tuple(vec![
                ParamType::FixedBytes(32),
                ParamType::Bytes,
                ParamType::Uint(256),
            ])))],
            &self.payload,
        )?;
        let Some(Token::Array(items)) = tokens.into_iter().next() else {
            return Err(Error::Generic("malformed call batch payload"));
        };
        let mut calls = Vec::with_capacity(items.len());
        for item in items {
            let Token::Tuple(fields) = item else {
                return Err(Error::Generic("malformed call batch payload"));
            };
            match &fields[..] {
                [Token::FixedBytes(to), Token::Bytes(data), Token::Uint(value)] => {
                    calls.push(Call {
                        to: H256::from_slice(to),
                        data: data.clone().into(),
                        value: *value,
                    });
                }
                _ => {
                    return Err(Error::Generic("malformed call batch payload"))
                }
            }
        }
        Ok(calls)
    }

    /// Decodes the payload as a packed user operation.
    pub fn user_op(&self) -> Result<PackedUserOperation> {
        PackedUserOperation::decode(&self.payload)
    }

    /// The attribute bag that governs this request: the posted bag for
    /// call batches, or the paymaster-data bag for user operations.
    pub fn effective_attributes(&self) -> Result<Attributes> {
        if self.is_user_op() {
            Ok(self.user_op()?.paymaster_data()?.attributes)
        } else {
            Ok(self.attributes.clone())
        }
    }

    /// Sum of native value the destination calls will need. A wrapped
    /// user operation needs none up front; its funding goes through
    /// the entry point's sponsorship, not the fulfillment call.
    pub fn value_needed(&self) -> Result<U256> {
        if self.is_user_op() {
            Ok(U256::zero())
        } else {
            let mut total = U256::zero();
            for call in self.calls()? {
                total = total.saturating_add(call.value);
            }
            Ok(total)
        }
    }
}
