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

#![warn(missing_docs)]

//! # Crossfill Codec 🕸️
//!
//! Wire codecs for the cross-chain call protocol: the selector-tagged
//! attribute bags, the posted request model, and the packed user
//! operation payloads (including the attribute bag smuggled inside the
//! paymaster data).

/// Selector-tagged attribute bag parsing and building.
pub mod attributes;
/// The cross-chain request model and its canonical hash.
pub mod request;
/// Packed user operation decoding and paymaster data extraction.
pub mod user_op;

pub use attributes::Attributes;
pub use request::{Call, CrossChainRequest};
pub use user_op::{PackedUserOperation, PaymasterData};

use ethers::types::{Address, H160, H256};

/// The sentinel address the protocol uses to denote the native asset.
pub const NATIVE_ASSET: Address = H160([
    0xEe, 0xee, 0xeE, 0xee, 0xeE, 0xeE, 0xee, 0xEe, 0xEe, 0xEe, 0xee, 0xEE,
    0xEe, 0xee, 0xee, 0xEe, 0xee, 0xee, 0xEE, 0xeE,
]);

/// Narrows a left-padded `bytes32` identity to an EVM address.
pub fn bytes32_to_address(value: &H256) -> Address {
    Address::from_slice(&value.as_bytes()[12..])
}

/// Widens an EVM address to the protocol's left-padded `bytes32` form.
pub fn address_to_bytes32(value: &Address) -> H256 {
    let mut out = [0u8; 32];
    out[12..].copy_from_slice(value.as_bytes());
    H256(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_asset_sentinel_matches_protocol_constant() {
        assert_eq!(
            format!("{NATIVE_ASSET:?}"),
            "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee"
        );
    }

    #[test]
    fn bytes32_address_round_trip() {
        let addr = Address::from_slice(&[0x11u8; 20]);
        let wide = address_to_bytes32(&addr);
        assert_eq!(wide.as_bytes()[..12], [0u8; 12]);
        assert_eq!(bytes32_to_address(&wide), addr);
    }
}
