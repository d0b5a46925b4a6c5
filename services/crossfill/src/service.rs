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

//! # Filler Service Module 🕸️
//!
//! A module for starting the long-running tasks of the filler.
//!
//! ## Overview
//!
//! Three kinds of tasks run for the lifetime of the process: one
//! outbox poller per source chain that has an outbox deployed, one
//! sponsor monitor per destination chain with sponsorship floors
//! configured, and one reward monitor sweeping the shared submission
//! ledger. All of them stop on the shared shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use crossfill_config::CrossfillConfig;
use crossfill_handler::RequestHandler;
use crossfill_indexer::OutboxPoller;
use crossfill_rewards::RewardMonitor;
use crossfill_sponsor::SponsorMonitor;
use crossfill_store::SledStore;
use crossfill_utils::Result;
use tokio::sync::broadcast;

/// Type alias for [Sled](https://sled.rs)-based database store
pub type Store = SledStore;

/// Starts all the background services of the filler.
///
/// This does not block; every service is fired on a background task
/// wired to the shutdown sender.
pub fn ignite(
    config: Arc<CrossfillConfig>,
    store: Arc<Store>,
    shutdown: &broadcast::Sender<()>,
) -> Result<()> {
    config.verify()?;
    let handler = RequestHandler::new(config.clone(), store.clone());

    let mut sweep_interval_ms = u64::MAX;
    for chain_config in config.evm.values().filter(|c| c.enabled) {
        sweep_interval_ms =
            sweep_interval_ms.min(chain_config.indexer.claim_interval_ms);

        if chain_config.sponsorship.is_some() {
            let chain =
                crossfill_chain::ChainClient::new(chain_config.clone())?;
            let monitor = SponsorMonitor::new(chain)?;
            let chain_name = chain_config.name.clone();
            let rx = shutdown.subscribe();
            tracing::debug!(chain = %chain_name, "starting sponsor monitor");
            tokio::spawn(async move {
                if let Err(e) = monitor.run(rx).await {
                    tracing::error!(
                        chain = %chain_name,
                        error = %e,
                        "sponsor monitor stopped abnormally"
                    );
                }
            });
        }

        if chain_config.contracts.outbox.is_none() {
            tracing::debug!(
                chain = %chain_config.name,
                "no outbox on this chain, not polling it"
            );
            continue;
        }
        let chain =
            crossfill_chain::ChainClient::new(chain_config.clone())?;
        let poller =
            OutboxPoller::new(chain, handler.clone(), store.clone())?;
        let chain_name = chain_config.name.clone();
        let rx = shutdown.subscribe();
        tracing::debug!(chain = %chain_name, "starting outbox poller");
        tokio::spawn(async move {
            if let Err(e) = poller.run(rx).await {
                tracing::error!(
                    chain = %chain_name,
                    error = %e,
                    "outbox poller stopped abnormally"
                );
            }
        });
    }

    if sweep_interval_ms == u64::MAX {
        sweep_interval_ms = 60_000;
    }
    let monitor = RewardMonitor::new(
        handler,
        store,
        Duration::from_millis(sweep_interval_ms),
    );
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        if let Err(e) = monitor.run(rx).await {
            tracing::error!(error = %e, "reward monitor stopped abnormally");
        }
    });
    Ok(())
}
