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

//! # Crossfill Handler 🕸️
//!
//! Takes a decoded cross-chain request and decides whether to fulfill
//! it: structural validation against the chain registry, oracle and
//! receiver checks, reward-vs-cost economics, idempotency against both
//! the destination inbox and the local submission ledger, and finally
//! the fulfillment transaction itself. Every rejection here is
//! structural, so a rejected request is dropped, not retried.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crossfill_chain::contracts::{
    to_entry_point_user_op, EntryPoint, Inbox,
};
use crossfill_chain::{ActiveChains, ChainClient};
use crossfill_codec::{address_to_bytes32, Attributes, CrossChainRequest, NATIVE_ASSET};
use crossfill_config::{ChainConfig, CrossfillConfig};
use crossfill_prover::{required_finality_delay, uses_hash_oracle};
use crossfill_signer::EvmSigner;
use crossfill_store::{Submission, SubmissionStatus, SubmissionStore};
use crossfill_utils::{probe, Error, Result};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, H256, U256};

/// Validates and fulfills discovered requests.
#[derive(Debug, Clone)]
pub struct RequestHandler<S> {
    config: Arc<CrossfillConfig>,
    store: Arc<S>,
}

impl<S: SubmissionStore> RequestHandler<S> {
    /// Creates a handler over the chain registry and submission
    /// ledger.
    pub fn new(config: Arc<CrossfillConfig>, store: Arc<S>) -> Self {
        Self { config, store }
    }

    /// Resolves the chain triple a request touches. Every entry must
    /// exist in the registry before any chain I/O happens.
    pub fn active_chains(
        &self,
        request: &CrossChainRequest,
    ) -> Result<ActiveChains> {
        let src_config = self.config.chain(request.source_chain_id())?.clone();
        let dst_config =
            self.config.chain(request.destination_chain_id())?.clone();
        let l1 = match dst_config.l1_chain_id {
            Some(id) if id != src_config.chain_id => {
                Some(ChainClient::new(self.config.chain(id)?.clone())?)
            }
            _ => None,
        };
        Ok(ActiveChains {
            src: ChainClient::new(src_config)?,
            dst: ChainClient::new(dst_config)?,
            l1,
        })
    }

    /// Validates a request and, when everything checks out, submits
    /// the fulfillment transaction and records the submission.
    ///
    /// `emitting_outbox` is the contract the event actually came from;
    /// it must be the registered outbox of the source chain.
    pub async fn handle_request(
        &self,
        emitting_outbox: Address,
        request: &CrossChainRequest,
    ) -> Result<()> {
        request.verify_hash()?;
        let chains = self.active_chains(request)?;
        let src = &chains.src.config;
        let dst = &chains.dst.config;

        let expected_outbox = src
            .contracts
            .outbox
            .ok_or(Error::Generic("no outbox configured for the source chain"))?;
        if emitting_outbox != expected_outbox {
            return Err(Error::UnknownProverContract {
                expected: expected_outbox,
                found: emitting_outbox,
            });
        }

        let attributes = request.effective_attributes()?;
        attributes.check_no_duplicates()?;
        validate_receiver(request, dst)?;
        validate_oracle(&attributes, src, dst)?;
        // Both of these must resolve before a claim can ever be
        // scheduled, so fail before spending any gas.
        attributes.reward()?;
        attributes.delay()?;
        let value_needed = request.value_needed()?;

        let signer = EvmSigner::new(&chains.dst)?;
        let fulfiller = signer.address();
        let (request_hash, tx) =
            self.prepare_fulfillment(request, &signer, fulfiller, value_needed).await?;

        if self.store.contains_submission(&request_hash)? {
            return Err(Error::AlreadyFulfilled { request_hash });
        }
        let (fulfilled_timestamp, _) =
            chains.dst.fulfillment_info(request_hash).await?;
        if fulfilled_timestamp != 0 {
            return Err(Error::AlreadyFulfilled { request_hash });
        }

        let gas = signer.estimate_gas(&tx).await?;
        let gas_price = signer.gas_price().await?;
        validate_reward(&attributes, value_needed, gas.saturating_mul(gas_price))?;

        // Record the attempt before sending so a crash between send
        // and persist cannot double-fulfill on restart.
        let submission = Submission {
            request_hash,
            source_chain_id: request.source_chain_id(),
            destination_chain_id: request.destination_chain_id(),
            fulfiller,
            fulfillment_tx: None,
            claim_tx: None,
            fulfilled_at: 0,
            claim_available_at: 0,
            request: request.clone(),
            status: SubmissionStatus::Pending,
        };
        self.store.insert_submission(&submission)?;

        let receipt = signer.send(tx).await?;
        let fulfilled_at = unix_now()?;
        let delay = required_finality_delay(src, dst, &attributes)?;
        self.store.set_fulfilled(
            &request_hash,
            receipt.transaction_hash,
            fulfilled_at,
            fulfilled_at + delay,
        )?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Fulfillment,
            request_hash = ?request_hash,
            tx_hash = ?receipt.transaction_hash,
            claim_available_at = fulfilled_at + delay,
        );
        Ok(())
    }

    /// Prepares the fulfillment transaction and the hash the
    /// destination chain keys the fulfillment record by: the canonical
    /// request hash for call batches, the entry point's user operation
    /// hash for wrapped user operations.
    async fn prepare_fulfillment(
        &self,
        request: &CrossChainRequest,
        signer: &EvmSigner,
        fulfiller: Address,
        value_needed: U256,
    ) -> Result<(H256, TypedTransaction)> {
        if request.is_user_op() {
            let op = to_entry_point_user_op(&request.user_op()?);
            let entry_point =
                EntryPoint::new(request.receiver_address(), signer.client());
            let user_op_hash =
                entry_point.get_user_op_hash(op.clone()).call().await?;
            let call = entry_point
                .handle_ops(vec![op], fulfiller)
                .from(fulfiller);
            Ok((H256(user_op_hash), call.tx))
        } else {
            let inbox =
                Inbox::new(request.receiver_address(), signer.client());
            let call = inbox
                .fulfill(
                    request.source_chain.0,
                    request.sender.0,
                    request.payload.clone(),
                    request.attributes.as_raw().to_vec(),
                    fulfiller,
                )
                .from(fulfiller)
                .value(value_needed);
            Ok((request.request_hash(), call.tx))
        }
    }
}

/// The receiver must be the destination inbox, or the entry point for
/// wrapped user operations.
fn validate_receiver(
    request: &CrossChainRequest,
    dst: &ChainConfig,
) -> Result<()> {
    let expected = if request.is_user_op() {
        dst.contracts
            .entry_point
            .ok_or(Error::Generic("no entry point configured"))?
    } else {
        dst.contracts
            .inbox
            .ok_or(Error::Generic("no inbox configured"))?
    };
    if request.receiver_address() != expected {
        return Err(Error::Generic(
            "receiver is not the destination inbox or entry point",
        ));
    }
    Ok(())
}

/// The declared state oracle must match the registry: the destination's
/// registered oracle for directly proven pairs, the zero address for
/// hash-oracle pairs.
fn validate_oracle(
    attributes: &Attributes,
    src: &ChainConfig,
    dst: &ChainConfig,
) -> Result<()> {
    let expected = if uses_hash_oracle(src, dst) {
        Address::zero()
    } else {
        dst.contracts
            .l2_oracle
            .ok_or(Error::Generic("no l2 oracle configured"))?
    };
    let declared = attributes.l2_oracle()?;
    if declared != expected {
        return Err(Error::UnknownProverContract {
            expected,
            found: declared,
        });
    }
    Ok(())
}

/// The reward must be the native asset and must strictly exceed the
/// value the calls consume plus the estimated gas cost.
pub fn validate_reward(
    attributes: &Attributes,
    value_needed: U256,
    gas_cost: U256,
) -> Result<()> {
    let (asset, amount) = attributes.reward()?;
    if asset != address_to_bytes32(&NATIVE_ASSET) {
        return Err(Error::UndesirableReward(format!(
            "reward asset {asset:?} is not the native asset"
        )));
    }
    let needed = value_needed.saturating_add(gas_cost);
    if amount <= needed {
        return Err(Error::UndesirableReward(format!(
            "reward {amount} does not cover cost {needed}"
        )));
    }
    Ok(())
}

fn unix_now() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| Error::Generic("system clock is before the unix epoch"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossfill_codec::attributes::{
        encode_address_attribute, encode_delay_attribute,
        encode_reward_attribute, L2_ORACLE_SELECTOR,
    };
    use crossfill_store::InMemoryStore;
    use ethers::abi::{self, Token};
    use ethers::types::Bytes;

    const INBOX: u64 = 0x1b0c;
    const OUTBOX: u64 = 0x0b0c;
    const ORACLE: u64 = 0x02ac;

    fn registry() -> Arc<CrossfillConfig> {
        let json = serde_json::json!({
            "evm": {
                "31337": {
                    "name": "source",
                    "chain-id": 31337,
                    "http-endpoint": "http://localhost:8545",
                    "private-key": "0x000000000000000000000000000000000000000000000000000000000000002a",
                    "prover-family": { "family": "output-root" },
                    "contracts": {
                        "outbox": format!("{:?}", Address::from_low_u64_be(OUTBOX)),
                    },
                },
                "31338": {
                    "name": "destination",
                    "chain-id": 31338,
                    "http-endpoint": "http://localhost:8546",
                    "private-key": "0x000000000000000000000000000000000000000000000000000000000000002b",
                    "prover-family": { "family": "output-root" },
                    "contracts": {
                        "inbox": format!("{:?}", Address::from_low_u64_be(INBOX)),
                        "l2-oracle": format!("{:?}", Address::from_low_u64_be(ORACLE)),
                    },
                },
            },
        });
        Arc::new(serde_json::from_value(json).unwrap())
    }

    fn encode_calls(calls: &[(Address, U256)]) -> Bytes {
        abi::encode(&[Token::Array(
            calls
                .iter()
                .map(|(to, value)| {
                    Token::Tuple(vec![
                        Token::FixedBytes(
                            address_to_bytes32(to).as_bytes().to_vec(),
                        ),
                        Token::Bytes(Vec::new()),
                        Token::Uint(*value),
                    ])
                })
                .collect(),
        )])
        .into()
    }

    fn sample_request(oracle: Address) -> CrossChainRequest {
        let attributes = Attributes::new(vec![
            encode_reward_attribute(
                address_to_bytes32(&NATIVE_ASSET),
                U256::from(1_000_000u64),
            ),
            encode_delay_attribute(U256::from(60u64), U256::from(u32::MAX)),
            encode_address_attribute(L2_ORACLE_SELECTOR, oracle),
        ])
        .unwrap();
        let mut request = CrossChainRequest {
            outbox_id: H256::zero(),
            source_chain: H256::from_low_u64_be(31337),
            sender: address_to_bytes32(&Address::from_low_u64_be(OUTBOX)),
            destination_chain: H256::from_low_u64_be(31338),
            receiver: address_to_bytes32(&Address::from_low_u64_be(INBOX)),
            payload: encode_calls(&[(Address::from_low_u64_be(0xca), U256::from(5u64))]),
            value: U256::from(5u64),
            attributes,
        };
        request.outbox_id = request.request_hash();
        request
    }

    fn handler() -> RequestHandler<InMemoryStore> {
        RequestHandler::new(registry(), Arc::new(InMemoryStore::default()))
    }

    #[tokio::test]
    async fn rejects_a_tampered_hash() {
        let mut request = sample_request(Address::from_low_u64_be(ORACLE));
        request.outbox_id = H256::repeat_byte(0xde);
        let err = handler()
            .handle_request(Address::from_low_u64_be(OUTBOX), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RequestHashMismatch { .. }));
    }

    #[tokio::test]
    async fn rejects_an_unknown_outbox() {
        let request = sample_request(Address::from_low_u64_be(ORACLE));
        let err = handler()
            .handle_request(Address::from_low_u64_be(0xbad), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownProverContract { .. }));
    }

    #[tokio::test]
    async fn rejects_a_wrong_receiver() {
        let mut request = sample_request(Address::from_low_u64_be(ORACLE));
        request.receiver =
            address_to_bytes32(&Address::from_low_u64_be(0xbad));
        request.outbox_id = request.request_hash();
        let err = handler()
            .handle_request(Address::from_low_u64_be(OUTBOX), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Generic(_)));
    }

    #[tokio::test]
    async fn rejects_a_wrong_oracle() {
        let request = sample_request(Address::from_low_u64_be(0xbad));
        let err = handler()
            .handle_request(Address::from_low_u64_be(OUTBOX), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownProverContract { .. }));
    }

    #[tokio::test]
    async fn rejects_an_unknown_destination_chain() {
        let mut request = sample_request(Address::from_low_u64_be(ORACLE));
        request.destination_chain = H256::from_low_u64_be(99999);
        request.outbox_id = request.request_hash();
        let err = handler()
            .handle_request(Address::from_low_u64_be(OUTBOX), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChainNotFound { .. }));
    }

    #[test]
    fn reward_boundary_is_strict() {
        let needed = U256::from(100u64);
        let gas = U256::from(50u64);
        let bag = |amount: u64| {
            Attributes::new(vec![encode_reward_attribute(
                address_to_bytes32(&NATIVE_ASSET),
                U256::from(amount),
            )])
            .unwrap()
        };
        // amount == needed + gas rejects, one wei more accepts.
        assert!(matches!(
            validate_reward(&bag(150), needed, gas),
            Err(Error::UndesirableReward(_))
        ));
        assert!(validate_reward(&bag(151), needed, gas).is_ok());
    }

    #[test]
    fn reward_must_be_the_native_asset() {
        let bag = Attributes::new(vec![encode_reward_attribute(
            address_to_bytes32(&Address::from_low_u64_be(0xaaaa)),
            U256::from(1_000_000u64),
        )])
        .unwrap();
        assert!(matches!(
            validate_reward(&bag, U256::zero(), U256::zero()),
            Err(Error::UndesirableReward(_))
        ));
    }
}
