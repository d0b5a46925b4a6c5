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

//! Packed user operation payloads.
//!
//! A request whose attribute bag is empty carries a packed user
//! operation (ERC-4337 v0.7 layout) as its payload. The attribute bag
//! for such a request travels inside `paymasterAndData`: the first 52
//! bytes are the paymaster address and gas fields, the rest is the
//! ABI encoding of the paymaster data tuple.

use crossfill_utils::{Error, Result};
use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

use crate::attributes::Attributes;

/// Offset of the ABI-encoded paymaster data tuple inside
/// `paymasterAndData`: 20 bytes paymaster address followed by two
/// 16-byte gas limits.
const PAYMASTER_DATA_OFFSET: usize = 52;

/// A packed user operation (v0.7 entry point layout).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedUserOperation {
    /// The smart account the operation runs on.
    pub sender: Address,
    /// Account nonce.
    pub nonce: U256,
    /// Factory address + calldata, for counterfactual deployment.
    pub init_code: Bytes,
    /// The calldata the account executes.
    pub call_data: Bytes,
    /// Packed verification gas limit (high 16 bytes) and call gas
    /// limit (low 16 bytes).
    pub account_gas_limits: H256,
    /// Gas to compensate the bundler for pre-verification work.
    pub pre_verification_gas: U256,
    /// Packed max priority fee (high 16 bytes) and max fee
    /// (low 16 bytes).
    pub gas_fees: H256,
    /// Paymaster address, gas fields and the encoded paymaster data.
    pub paymaster_and_data: Bytes,
    /// Account signature.
    pub signature: Bytes,
}

/// The decoded paymaster data tuple carried by a user operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymasterData {
    /// Address the fulfiller's advance is credited to.
    pub eth_address: Address,
    /// Amount of native value the operation needs advanced.
    pub eth_amount: U256,
    /// Optional precheck contract, zero when unused.
    pub precheck: Address,
    /// The attribute bag governing the request.
    pub attributes: Attributes,
}

impl PackedUserOperation {
    fn param_type() -> ParamType {
        ParamType::Tuple(vec![
            ParamType::Address,
            ParamType::Uint(256),
            ParamType::Bytes,
            ParamType::Bytes,
            ParamType::FixedBytes(32),
            ParamType::Uint(256),
            ParamType::FixedBytes(32),
            ParamType::Bytes,
            ParamType::Bytes,
        ])
    }

    /// Decodes a payload as a single packed user operation.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let tokens = abi::decode(&[Self::param_type()], payload)?;
        let Some(Token::Tuple(fields)) = tokens.into_iter().next() else {
            return Err(Error::InvalidUserOperation(
                "payload is not a tuple".into(),
            ));
        };
        match &fields[..] {
            [Token::Address(sender), Token::Uint(nonce), Token::Bytes(init_code), Token::Bytes(call_data), Token::FixedBytes(account_gas_limits), Token::Uint(pre_verification_gas), Token::FixedBytes(gas_fees), Token::Bytes(paymaster_and_data), Token::Bytes(signature)] => {
                Ok(Self {
                    sender: *sender,
                    nonce: *nonce,
                    init_code: init_code.clone().into(),
                    call_data: call_data.clone().into(),
                    account_gas_limits: H256::from_slice(account_gas_limits),
                    pre_verification_gas: *pre_verification_gas,
                    gas_fees: H256::from_slice(gas_fees),
                    paymaster_and_data: paymaster_and_data.clone().into(),
                    signature: signature.clone().into(),
                })
            }
            _ => Err(Error::InvalidUserOperation(
                "unexpected tuple arity or field types".into(),
            )),
        }
    }

    /// Re-encodes the operation exactly as it was posted.
    pub fn encode(&self) -> Bytes {
        abi::encode(&[self.as_token()]).into()
    }

    /// The operation as an ABI token, for nesting in outer encodings.
    pub fn as_token(&self) -> Token {
        Token::Tuple(vec![
            Token::Address(self.sender),
            Token::Uint(self.nonce),
            Token::Bytes(self.init_code.to_vec()),
            Token::Bytes(self.call_data.to_vec()),
            Token::FixedBytes(self.account_gas_limits.as_bytes().to_vec()),
            Token::Uint(self.pre_verification_gas),
            Token::FixedBytes(self.gas_fees.as_bytes().to_vec()),
            Token::Bytes(self.paymaster_and_data.to_vec()),
            Token::Bytes(self.signature.to_vec()),
        ])
    }

    /// Max fee per gas, from the low half of `gas_fees`.
    pub fn max_fee_per_gas(&self) -> U256 {
        U256::from_big_endian(&self.gas_fees.as_bytes()[16..])
    }

    /// Max priority fee per gas, from the high half of `gas_fees`.
    pub fn max_priority_fee_per_gas(&self) -> U256 {
        U256::from_big_endian(&self.gas_fees.as_bytes()[..16])
    }

    /// Verification gas limit, from the high half of
    /// `account_gas_limits`.
    pub fn verification_gas_limit(&self) -> U256 {
        U256::from_big_endian(&self.account_gas_limits.as_bytes()[..16])
    }

    /// Call gas limit, from the low half of `account_gas_limits`.
    pub fn call_gas_limit(&self) -> U256 {
        U256::from_big_endian(&self.account_gas_limits.as_bytes()[16..])
    }

    /// Decodes the paymaster data tuple out of `paymasterAndData`.
    pub fn paymaster_data(&self) -> Result<PaymasterData> {
        if self.paymaster_and_data.len() <= PAYMASTER_DATA_OFFSET {
            return Err(Error::InvalidUserOperation(format!(
                "paymasterAndData too short: {} bytes",
                self.paymaster_and_data.len()
            )));
        }
        let tokens = abi::decode(
            &[
                ParamType::Address,
                ParamType::Uint(256),
                ParamType::Address,
                ParamType::Array(Box::new(ParamType::Bytes)),
            ],
            &self.paymaster_and_data[PAYMASTER_DATA_OFFSET..],
        )?;
        match &tokens[..] {
            [Token::Address(eth_address), Token::Uint(eth_amount), Token::Address(precheck), Token::Array(attrs)] => {
                let raw = attrs
                    .iter()
                    .map(|token| match token {
                        Token::Bytes(blob) => Ok(blob.clone().into()),
                        _ => Err(Error::InvalidUserOperation(
                            "non-bytes attribute in paymaster data".into(),
                        )),
                    })
                    .collect::<Result<Vec<Bytes>>>()?;
                Ok(PaymasterData {
                    eth_address: *eth_address,
                    eth_amount: *eth_amount,
                    precheck: *precheck,
                    attributes: Attributes::new(raw)?,
                })
            }
            _ => Err(Error::InvalidUserOperation(
                "malformed paymaster data tuple".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{
        encode_delay_attribute, encode_reward_attribute,
    };
    use crate::address_to_bytes32;

    fn sample_paymaster_and_data() -> Bytes {
        let attrs = vec![
            encode_reward_attribute(
                address_to_bytes32(&Address::from_low_u64_be(0xaa)),
                U256::from(500u64),
            ),
            encode_delay_attribute(U256::from(60u64), U256::from(999u64)),
        ];
        let encoded = abi::encode(&[
            Token::Address(Address::from_low_u64_be(0xbb)),
            Token::Uint(U256::from(42u64)),
            Token::Address(Address::zero()),
            Token::Array(
                attrs.iter().map(|b| Token::Bytes(b.to_vec())).collect(),
            ),
        ]);
        // 20-byte paymaster address + two 16-byte gas limits, then the
        // encoded tuple.
        let mut out = vec![0u8; PAYMASTER_DATA_OFFSET];
        out.extend(encoded);
        out.into()
    }

    fn sample_user_op() -> PackedUserOperation {
        let mut gas_fees = [0u8; 32];
        gas_fees[15] = 0x02; // priority fee = 2
        gas_fees[31] = 0x0a; // max fee = 10
        let mut gas_limits = [0u8; 32];
        gas_limits[15] = 0x64; // verification = 100
        gas_limits[31] = 0xc8; // call = 200
        PackedUserOperation {
            sender: Address::from_low_u64_be(0x11),
            nonce: U256::from(7u64),
            init_code: Bytes::default(),
            call_data: vec![0x01, 0x02].into(),
            account_gas_limits: H256(gas_limits),
            pre_verification_gas: U256::from(21_000u64),
            gas_fees: H256(gas_fees),
            paymaster_and_data: sample_paymaster_and_data(),
            signature: vec![0xff; 65].into(),
        }
    }

    #[test]
    fn user_op_round_trips() {
        let op = sample_user_op();
        let decoded = PackedUserOperation::decode(&op.encode()).unwrap();
        assert_eq!(decoded, op);
    }

    #[test]
    fn unpacks_gas_fields() {
        let op = sample_user_op();
        assert_eq!(op.max_priority_fee_per_gas(), U256::from(2u64));
        assert_eq!(op.max_fee_per_gas(), U256::from(10u64));
        assert_eq!(op.verification_gas_limit(), U256::from(100u64));
        assert_eq!(op.call_gas_limit(), U256::from(200u64));
    }

    #[test]
    fn extracts_paymaster_attributes() {
        let op = sample_user_op();
        let data = op.paymaster_data().unwrap();
        assert_eq!(data.eth_address, Address::from_low_u64_be(0xbb));
        assert_eq!(data.eth_amount, U256::from(42u64));
        assert_eq!(data.precheck, Address::zero());
        let (_, amount) = data.attributes.reward().unwrap();
        assert_eq!(amount, U256::from(500u64));
    }

    #[test]
    fn short_paymaster_data_is_rejected() {
        let mut op = sample_user_op();
        op.paymaster_and_data = vec![0u8; 52].into();
        assert!(op.paymaster_data().is_err());
    }
}
