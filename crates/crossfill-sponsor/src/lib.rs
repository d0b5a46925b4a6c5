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

//! # Crossfill Sponsor 🕸️
//!
//! Keeps the destination-side paymaster funded so user operation
//! fulfillments do not stall on an empty balance. Two balances matter:
//! the inbox's gas deposit on the 4337 entry point, and the
//! fulfiller's magic spend balance on the inbox. Whenever one drops
//! below its configured floor, the monitor tops it up by the floor
//! amount and lets the next tick re-check.

use std::time::Duration;

use crossfill_chain::contracts::{EntryPoint, Inbox};
use crossfill_chain::ChainClient;
use crossfill_codec::NATIVE_ASSET;
use crossfill_config::SponsorshipConfig;
use crossfill_signer::EvmSigner;
use crossfill_utils::{probe, Error, Result};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, TransactionRequest, U256};
use tokio::sync::broadcast;

/// Tops up the paymaster balances behind one destination chain's
/// inbox.
#[derive(Debug, Clone)]
pub struct SponsorMonitor {
    chain: ChainClient,
    inbox: Address,
    entry_point: Address,
    thresholds: SponsorshipConfig,
}

impl SponsorMonitor {
    /// Creates a monitor for a chain with an inbox, an entry point and
    /// sponsorship floors configured.
    pub fn new(chain: ChainClient) -> Result<Self> {
        let inbox = chain
            .config
            .contracts
            .inbox
            .ok_or(Error::Generic("no inbox configured"))?;
        let entry_point = chain
            .config
            .contracts
            .entry_point
            .ok_or(Error::Generic("no entry point configured"))?;
        let thresholds = chain
            .config
            .sponsorship
            .clone()
            .ok_or(Error::Generic("no sponsorship floors configured"))?;
        Ok(Self {
            chain,
            inbox,
            entry_point,
            thresholds,
        })
    }

    /// Drives the balance checks until shutdown. A failed check is
    /// logged and the next tick retries it.
    pub async fn run(
        &self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        let chain_id = self.chain.chain_id();
        let mut ticker = tokio::time::interval(Duration::from_millis(
            self.thresholds.poll_interval_ms,
        ));
        ticker.set_missed_tick_behavior(
            tokio::time::MissedTickBehavior::Delay,
        );
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            chain_id,
            "sponsor monitor started",
        );
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!(chain_id, "sponsor monitor shutting down");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.top_up().await {
                        tracing::warn!(
                            chain_id,
                            error = %e,
                            "paymaster top-up failed"
                        );
                    }
                }
            }
        }
    }

    /// One check: refill the entry point gas deposit and the magic
    /// spend balance wherever they sit below their floors.
    pub async fn top_up(&self) -> Result<()> {
        let signer = EvmSigner::new(&self.chain)?;
        self.top_up_gas(&signer).await?;
        self.top_up_magic_spend(&signer).await
    }

    /// The inbox pays entry point gas out of its deposit; the deposit
    /// call is payable and forwards the attached value.
    async fn top_up_gas(&self, signer: &EvmSigner) -> Result<()> {
        let floor = self.thresholds.entry_point_threshold;
        let entry_point =
            EntryPoint::new(self.entry_point, self.chain.provider());
        let balance = entry_point.balance_of(self.inbox).call().await?;
        if !needs_top_up(balance, floor) {
            return Ok(());
        }
        tracing::info!(
            chain_id = self.chain.chain_id(),
            %balance,
            %floor,
            "inbox gas deposit below its floor, topping up"
        );
        let inbox = Inbox::new(self.inbox, signer.client());
        let tx = inbox
            .entry_point_deposit(floor)
            .from(signer.address())
            .value(floor)
            .tx;
        let receipt = signer.send(tx).await?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Sponsorship,
            chain_id = self.chain.chain_id(),
            tx_hash = ?receipt.transaction_hash,
            "gas deposit topped up",
        );
        Ok(())
    }

    /// Magic spend balances are plain native transfers to the inbox,
    /// credited to the sender.
    async fn top_up_magic_spend(&self, signer: &EvmSigner) -> Result<()> {
        let floor = self.thresholds.magic_spend_threshold;
        let inbox = Inbox::new(self.inbox, self.chain.provider());
        let balance = inbox
            .get_magic_spend_balance(signer.address(), NATIVE_ASSET)
            .call()
            .await?;
        if !needs_top_up(balance, floor) {
            return Ok(());
        }
        tracing::info!(
            chain_id = self.chain.chain_id(),
            %balance,
            %floor,
            "magic spend balance below its floor, topping up"
        );
        let tx: TypedTransaction = TransactionRequest::new()
            .from(signer.address())
            .to(self.inbox)
            .value(floor)
            .into();
        let receipt = signer.send(tx).await?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Sponsorship,
            chain_id = self.chain.chain_id(),
            tx_hash = ?receipt.transaction_hash,
            "magic spend balance topped up",
        );
        Ok(())
    }
}

/// A zero floor disables the check entirely; otherwise any balance
/// strictly below the floor triggers a refill.
fn needs_top_up(balance: U256, floor: U256) -> bool {
    !floor.is_zero() && balance < floor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossfill_config::ChainConfig;

    fn chain_client(json: serde_json::Value) -> ChainClient {
        let config: ChainConfig = serde_json::from_value(json).unwrap();
        ChainClient::new(config).unwrap()
    }

    fn base_chain() -> serde_json::Value {
        serde_json::json!({
            "name": "destination",
            "chain-id": 31338,
            "http-endpoint": "http://localhost:8546",
            "prover-family": { "family": "output-root" },
            "contracts": {
                "inbox": format!("{:?}", Address::from_low_u64_be(0x1b0c)),
                "entry-point": format!("{:?}", Address::from_low_u64_be(0xe9)),
            },
            "sponsorship": {
                "entry-point-threshold": "0x0de0b6b3a7640000",
            },
        })
    }

    #[test]
    fn monitor_requires_the_full_sponsoring_setup() {
        assert!(SponsorMonitor::new(chain_client(base_chain())).is_ok());

        let mut no_entry_point = base_chain();
        no_entry_point["contracts"]
            .as_object_mut()
            .unwrap()
            .remove("entry-point");
        assert!(
            SponsorMonitor::new(chain_client(no_entry_point)).is_err()
        );

        let mut no_floors = base_chain();
        no_floors.as_object_mut().unwrap().remove("sponsorship");
        assert!(SponsorMonitor::new(chain_client(no_floors)).is_err());
    }

    #[test]
    fn zero_floors_disable_the_check() {
        assert!(!needs_top_up(U256::zero(), U256::zero()));
        assert!(!needs_top_up(U256::from(5u64), U256::zero()));
    }

    #[test]
    fn floor_boundary_is_strict() {
        let floor = U256::from(100u64);
        assert!(needs_top_up(U256::from(99u64), floor));
        assert!(!needs_top_up(floor, floor));
        assert!(!needs_top_up(U256::from(101u64), floor));
    }
}
