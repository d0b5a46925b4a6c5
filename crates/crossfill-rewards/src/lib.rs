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

//! # Crossfill Rewards 🕸️
//!
//! Periodically sweeps the submission ledger for fulfillments whose
//! finality delay has passed, builds the storage proof for each one,
//! and submits the reward claim on the source chain. A failed claim is
//! logged and left in the ledger, so the next sweep picks it up again;
//! a landed claim is marked exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossfill_chain::contracts::{
    to_outbox_user_op, HashOracle, Outbox, UserOpOutbox,
};
use crossfill_codec::attributes::HASH_ORACLE_SELECTOR;
use crossfill_codec::bytes32_to_address;
use crossfill_handler::RequestHandler;
use crossfill_prover::{uses_hash_oracle, BuiltProof, ProofBuilder};
use crossfill_signer::EvmSigner;
use crossfill_store::{Submission, SubmissionStore};
use crossfill_utils::{probe, Error, Result};
use ethers::types::{Bytes, U256};
use tokio::sync::broadcast;

/// Sweeps matured fulfillments and claims their rewards.
#[derive(Debug, Clone)]
pub struct RewardMonitor<S> {
    handler: RequestHandler<S>,
    store: Arc<S>,
    sweep_interval: Duration,
    sweeping: Arc<AtomicBool>,
}

impl<S: SubmissionStore + 'static> RewardMonitor<S> {
    /// Creates a monitor over the submission ledger.
    pub fn new(
        handler: RequestHandler<S>,
        store: Arc<S>,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            handler,
            store,
            sweep_interval,
            sweeping: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Drives the sweep loop until shutdown. Sweeps run off the timer
    /// so a slow batch of claims never delays the schedule; a tick
    /// that fires while the previous sweep is still running is
    /// skipped.
    pub async fn run(
        &self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        let mut ticker = tokio::time::interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(
            tokio::time::MissedTickBehavior::Delay,
        );
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            interval_ms = self.sweep_interval.as_millis() as u64,
            "reward monitor started",
        );
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!("reward monitor shutting down");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if self.sweeping.swap(true, Ordering::SeqCst) {
                        tracing::debug!("previous sweep still running");
                        continue;
                    }
                    let monitor = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = monitor.sweep().await {
                            tracing::warn!(error = %e, "sweep failed");
                        }
                        monitor.sweeping.store(false, Ordering::SeqCst);
                    });
                }
            }
        }
    }

    /// One sweep: claim every matured fulfillment concurrently.
    pub async fn sweep(&self) -> Result<()> {
        let due = self.store.claims_due(unix_now()?)?;
        if due.is_empty() {
            return Ok(());
        }
        tracing::debug!(count = due.len(), "claims are due");
        let outcomes = futures::future::join_all(
            due.iter().map(|submission| self.claim(submission)),
        )
        .await;
        for (submission, outcome) in due.iter().zip(outcomes) {
            if let Err(e) = outcome {
                // The record stays in the ledger and the next sweep
                // retries it.
                tracing::warn!(
                    request_hash = ?submission.request_hash,
                    error = %e,
                    "reward claim failed"
                );
            }
        }
        Ok(())
    }

    /// Claims the reward for one matured submission: prove the
    /// fulfillment record on the destination chain, push the block
    /// hash to the hash oracle first when the pair needs one, then
    /// submit the claim to the posting outbox.
    async fn claim(&self, submission: &Submission) -> Result<()> {
        let request = &submission.request;
        let request_hash = submission.request_hash;
        let chains = self.handler.active_chains(request)?;

        let built = ProofBuilder::new(&chains)
            .build(request_hash, Some(submission.claim_available_at))
            .await?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Proof,
            request_hash = ?request_hash,
            destination_block = built.destination_block_number,
        );

        let signer = EvmSigner::new(&chains.src)?;
        if uses_hash_oracle(&chains.src.config, &chains.dst.config) {
            self.push_block_hash(request, &built, &signer, &chains.dst.config)
                .await?;
        }

        let pay_to = signer.address();
        let proof_bytes = built.proof.encode();
        let outbox_address = bytes32_to_address(&request.sender);
        let tx = if request.is_user_op() {
            let outbox = UserOpOutbox::new(outbox_address, signer.client());
            outbox
                .claim_reward(
                    to_outbox_user_op(&request.user_op()?),
                    proof_bytes,
                    pay_to,
                )
                .from(pay_to)
                .tx
        } else {
            let outbox = Outbox::new(outbox_address, signer.client());
            outbox
                .claim_reward(
                    request.destination_chain.0,
                    request.receiver.0,
                    request.payload.clone(),
                    claim_attributes(request),
                    proof_bytes,
                    pay_to,
                )
                .from(pay_to)
                .tx
        };
        let receipt = signer.send(tx).await?;
        self.store
            .mark_claimed(&request_hash, receipt.transaction_hash)?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::RewardClaim,
            request_hash = ?request_hash,
            tx_hash = ?receipt.transaction_hash,
        );
        Ok(())
    }

    /// Makes the proven destination block hash available on the source
    /// chain through the oracle the request declared. The claim
    /// transaction reads it back, so this has to land first.
    async fn push_block_hash(
        &self,
        request: &crossfill_codec::CrossChainRequest,
        built: &BuiltProof,
        signer: &EvmSigner,
        dst: &crossfill_config::ChainConfig,
    ) -> Result<()> {
        let oracle_address = request
            .effective_attributes()?
            .hash_oracle()?
            .ok_or(Error::MissingAttribute {
                selector: HASH_ORACLE_SELECTOR,
            })?;
        let oracle = HashOracle::new(oracle_address, signer.client());
        let tx = oracle
            .set_hash(
                U256::from(dst.chain_id),
                U256::from(built.destination_block_number),
                built.destination_block_hash.0,
            )
            .from(signer.address())
            .tx;
        let receipt = signer.send(tx).await?;
        tracing::debug!(
            oracle = ?oracle_address,
            block = built.destination_block_number,
            tx_hash = ?receipt.transaction_hash,
            "destination block hash pushed to the oracle"
        );
        Ok(())
    }
}

/// The claim attribute bag: what was posted, minus any fulfiller
/// marker. The outbox re-derives the request hash from the claim
/// arguments, so the marker added on the destination side must not
/// leak in.
pub fn claim_attributes(
    request: &crossfill_codec::CrossChainRequest,
) -> Vec<Bytes> {
    request.attributes.without_fulfiller().as_raw().to_vec()
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
        encode_address_attribute, encode_reward_attribute,
        FULFILLER_SELECTOR,
    };
    use crossfill_codec::{
        address_to_bytes32, Attributes, CrossChainRequest, NATIVE_ASSET,
    };
    use ethers::types::{Address, H256};

    fn request_with(attributes: Attributes) -> CrossChainRequest {
        let mut request = CrossChainRequest {
            outbox_id: H256::zero(),
            source_chain: H256::from_low_u64_be(31337),
            sender: address_to_bytes32(&Address::from_low_u64_be(0x0b0c)),
            destination_chain: H256::from_low_u64_be(31338),
            receiver: address_to_bytes32(&Address::from_low_u64_be(0x1b0c)),
            payload: Default::default(),
            value: Default::default(),
            attributes,
        };
        request.outbox_id = request.request_hash();
        request
    }

    #[test]
    fn claim_attributes_strip_the_fulfiller_marker() {
        let reward = encode_reward_attribute(
            address_to_bytes32(&NATIVE_ASSET),
            1_000u64.into(),
        );
        let bag = Attributes::new(vec![
            reward.clone(),
            encode_address_attribute(
                FULFILLER_SELECTOR,
                Address::from_low_u64_be(0xf1),
            ),
        ])
        .unwrap();
        let request = request_with(bag);
        assert_eq!(claim_attributes(&request), vec![reward]);
    }

    #[test]
    fn claim_attributes_preserve_order_without_a_fulfiller() {
        let reward = encode_reward_attribute(
            address_to_bytes32(&NATIVE_ASSET),
            1_000u64.into(),
        );
        let oracle = encode_address_attribute(
            crossfill_codec::attributes::L2_ORACLE_SELECTOR,
            Address::from_low_u64_be(0x02ac),
        );
        let bag =
            Attributes::new(vec![reward.clone(), oracle.clone()]).unwrap();
        let request = request_with(bag);
        assert_eq!(claim_attributes(&request), vec![reward, oracle]);
    }
}
