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

//! Selector-tagged attribute bags.
//!
//! Every attribute is an opaque byte blob whose first four bytes are a
//! selector, followed by the ABI encoding of the attribute's payload.
//! Building an attribute and parsing it back must be byte-identical,
//! since the attribute bag is part of the request's canonical hash.

use crossfill_utils::{Error, Result};
use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

use crate::{address_to_bytes32, bytes32_to_address};

/// Selector of the reward attribute: `(bytes32 asset, uint256 amount)`.
pub const REWARD_SELECTOR: [u8; 4] = [0xa3, 0x62, 0xe5, 0xdb];
/// Selector of the delay attribute:
/// `(uint256 finalityDelaySeconds, uint256 expiry)`.
pub const DELAY_SELECTOR: [u8; 4] = [0x84, 0xf5, 0x50, 0xe0];
/// Selector of the fulfiller attribute: `(bytes32 fulfiller)`.
pub const FULFILLER_SELECTOR: [u8; 4] = [0x13, 0x8a, 0x03, 0xfc];
/// Selector of the state oracle attribute: `(bytes32 l2Oracle)`.
pub const L2_ORACLE_SELECTOR: [u8; 4] = [0x7f, 0xf7, 0x24, 0x5a];
/// Selector of the hash oracle pointer attribute: `(bytes32 shoyuBashi)`.
pub const HASH_ORACLE_SELECTOR: [u8; 4] = [0xda, 0x07, 0xe1, 0x5d];

/// An ordered bag of selector-tagged attributes.
///
/// Order is preserved exactly as posted, since the bag participates in
/// the request hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes(Vec<Bytes>);

impl Attributes {
    /// Wraps raw attribute blobs, rejecting any blob too short to carry
    /// a selector.
    pub fn new(raw: Vec<Bytes>) -> Result<Self> {
        for blob in &raw {
            if blob.len() < 4 {
                return Err(Error::AttributeTooShort { len: blob.len() });
            }
        }
        Ok(Self(raw))
    }

    /// The raw attribute blobs, in posted order.
    pub fn as_raw(&self) -> &[Bytes] {
        &self.0
    }

    /// Number of attributes in the bag.
    pub fn count(&self) -> usize {
        self.0.len()
    }

    /// Whether the bag carries no attributes at all. An empty bag means
    /// the request payload is a packed user operation carrying its own
    /// attributes in the paymaster data.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Finds the first attribute with the given selector.
    pub fn find(&self, selector: [u8; 4]) -> Option<&Bytes> {
        self.0.iter().find(|blob| blob[..4] == selector)
    }

    /// Like [`Self::find`] but errors when the attribute is absent.
    pub fn expect(&self, selector: [u8; 4]) -> Result<&Bytes> {
        self.find(selector).ok_or(Error::MissingAttribute { selector })
    }

    /// Errors if any selector appears more than once.
    pub fn check_no_duplicates(&self) -> Result<()> {
        for (i, blob) in self.0.iter().enumerate() {
            let selector: [u8; 4] = blob[..4].try_into().expect("len checked");
            if self.0[i + 1..].iter().any(|other| other[..4] == selector) {
                return Err(Error::DuplicateAttribute { selector });
            }
        }
        Ok(())
    }

    /// Decodes the reward attribute into `(asset, amount)`.
    pub fn reward(&self) -> Result<(H256, U256)> {
        let blob = self.expect(REWARD_SELECTOR)?;
        let tokens = abi::decode(
            &[ParamType::FixedBytes(32), ParamType::Uint(256)],
            &blob[4..],
        )?;
        match &tokens[..] {
            [Token::FixedBytes(asset), Token::Uint(amount)] => {
                Ok((H256::from_slice(asset), *amount))
            }
            _ => Err(Error::Generic("malformed reward attribute")),
        }
    }

    /// Decodes the delay attribute into
    /// `(finality_delay_seconds, expiry)`.
    pub fn delay(&self) -> Result<(U256, U256)> {
        let blob = self.expect(DELAY_SELECTOR)?;
        let tokens = abi::decode(
            &[ParamType::Uint(256), ParamType::Uint(256)],
            &blob[4..],
        )?;
        match &tokens[..] {
            [Token::Uint(finality_delay), Token::Uint(expiry)] => {
                Ok((*finality_delay, *expiry))
            }
            _ => Err(Error::Generic("malformed delay attribute")),
        }
    }

    /// Decodes the fulfiller attribute, if present.
    pub fn fulfiller(&self) -> Result<Option<Address>> {
        match self.find(FULFILLER_SELECTOR) {
            Some(blob) => Ok(Some(decode_address_attribute(blob)?)),
            None => Ok(None),
        }
    }

    /// Decodes the state oracle attribute.
    pub fn l2_oracle(&self) -> Result<Address> {
        let blob = self.expect(L2_ORACLE_SELECTOR)?;
        decode_address_attribute(blob)
    }

    /// Decodes the hash oracle pointer attribute, if present.
    pub fn hash_oracle(&self) -> Result<Option<Address>> {
        match self.find(HASH_ORACLE_SELECTOR) {
            Some(blob) => Ok(Some(decode_address_attribute(blob)?)),
            None => Ok(None),
        }
    }

    /// Returns a copy of the bag with any fulfiller attribute removed.
    /// The reward claim call expects the expanded bag without it.
    pub fn without_fulfiller(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|blob| blob[..4] != FULFILLER_SELECTOR)
                .cloned()
                .collect(),
        )
    }
}

/// Encodes a `(bytes32)` attribute from an address.
pub fn encode_address_attribute(selector: [u8; 4], value: Address) -> Bytes {
    let mut out = selector.to_vec();
    out.extend(abi::encode(&[Token::FixedBytes(
        address_to_bytes32(&value).as_bytes().to_vec(),
    )]));
    out.into()
}

fn decode_address_attribute(blob: &Bytes) -> Result<Address> {
    let tokens = abi::decode(&[ParamType::FixedBytes(32)], &blob[4..])?;
    match &tokens[..] {
        [Token::FixedBytes(value)] => {
            Ok(bytes32_to_address(&H256::from_slice(value)))
        }
        _ => Err(Error::Generic("malformed address attribute")),
    }
}

/// Encodes a reward attribute from `(asset, amount)`.
pub fn encode_reward_attribute(asset: H256, amount: U256) -> Bytes {
    let mut out = REWARD_SELECTOR.to_vec();
    out.extend(abi::encode(&[
        Token::FixedBytes(asset.as_bytes().to_vec()),
        Token::Uint(amount),
    ]));
    out.into()
}

/// Encodes a delay attribute from
/// `(finality_delay_seconds, expiry)`.
pub fn encode_delay_attribute(finality_delay: U256, expiry: U256) -> Bytes {
    let mut out = DELAY_SELECTOR.to_vec();
    out.extend(abi::encode(&[
        Token::Uint(finality_delay),
        Token::Uint(expiry),
    ]));
    out.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_to_bytes32;

    fn sample_bag() -> Attributes {
        let reward = encode_reward_attribute(
            address_to_bytes32(&Address::from_low_u64_be(0xaa)),
            U256::from(1_000_000u64),
        );
        let delay = encode_delay_attribute(
            U256::from(3600u64),
            U256::from(1_700_000_000u64),
        );
        Attributes::new(vec![reward, delay]).unwrap()
    }

    #[test]
    fn reward_attribute_round_trips() {
        let bag = sample_bag();
        let (asset, amount) = bag.reward().unwrap();
        assert_eq!(
            bytes32_to_address(&asset),
            Address::from_low_u64_be(0xaa)
        );
        assert_eq!(amount, U256::from(1_000_000u64));
    }

    #[test]
    fn delay_attribute_round_trips() {
        let bag = sample_bag();
        let (finality_delay, expiry) = bag.delay().unwrap();
        assert_eq!(finality_delay, U256::from(3600u64));
        assert_eq!(expiry, U256::from(1_700_000_000u64));
    }

    #[test]
    fn missing_attribute_is_an_error() {
        let bag = Attributes::default();
        assert!(matches!(
            bag.reward(),
            Err(Error::MissingAttribute { selector: REWARD_SELECTOR })
        ));
    }

    #[test]
    fn too_short_blob_is_rejected() {
        let err = Attributes::new(vec![vec![0xa3u8, 0x62].into()]);
        assert!(matches!(err, Err(Error::AttributeTooShort { len: 2 })));
    }

    #[test]
    fn duplicate_selectors_are_rejected() {
        let delay = encode_delay_attribute(U256::one(), U256::one());
        let bag = Attributes::new(vec![delay.clone(), delay]).unwrap();
        assert!(matches!(
            bag.check_no_duplicates(),
            Err(Error::DuplicateAttribute { selector: DELAY_SELECTOR })
        ));
    }

    #[test]
    fn fulfiller_marker_strips_cleanly() {
        let bag = sample_bag();
        let fulfiller = Address::from_low_u64_be(0xf1);
        let mut raw = bag.as_raw().to_vec();
        raw.push(encode_address_attribute(FULFILLER_SELECTOR, fulfiller));
        let expanded = Attributes::new(raw).unwrap();
        assert_eq!(expanded.fulfiller().unwrap(), Some(fulfiller));
        // Stripping gives back the original bag byte-for-byte.
        assert_eq!(expanded.without_fulfiller(), bag);
    }
}
