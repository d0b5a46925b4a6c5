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

//! # Crossfill Indexer 🕸️
//!
//! One long-lived poll loop per source chain: scan the outbox's
//! `MessagePosted` logs through the explorer API, dispatch every
//! decoded request to the handler concurrently, and advance the
//! durable block cursor past the batch regardless of per-request
//! failures. A request whose handling fails is recorded in the
//! skipped ledger and dropped from automatic retry; only the poll
//! itself is retried.

use std::sync::Arc;
use std::time::Duration;

use crossfill_chain::contracts::MessagePostedFilter;
use crossfill_chain::{ChainClient, ExplorerClient, ExplorerLog};
use crossfill_codec::CrossChainRequest;
use crossfill_handler::RequestHandler;
use crossfill_store::SubmissionStore;
use crossfill_utils::retry::CappedExponentialBackoff;
use crossfill_utils::{probe, Error, Result};
use ethers::contract::EthEvent;
use ethers::types::Address;
use tokio::sync::broadcast;

/// Polls one source chain's outbox and dispatches discovered
/// requests.
#[derive(Debug, Clone)]
pub struct OutboxPoller<S> {
    chain: ChainClient,
    explorer: ExplorerClient,
    handler: RequestHandler<S>,
    store: Arc<S>,
    outbox: Address,
}

impl<S: SubmissionStore> OutboxPoller<S> {
    /// Creates a poller for a source chain with a configured outbox
    /// and explorer.
    pub fn new(
        chain: ChainClient,
        handler: RequestHandler<S>,
        store: Arc<S>,
    ) -> Result<Self> {
        let outbox = chain
            .config
            .contracts
            .outbox
            .ok_or(Error::Generic("no outbox configured for the source chain"))?;
        let explorer = chain.explorer()?;
        Ok(Self {
            chain,
            explorer,
            handler,
            store,
            outbox,
        })
    }

    /// Drives the poll loop until shutdown. The first poll failing is
    /// a bootstrap failure and tears the loop down; once warmed up,
    /// poll failures are logged and the next tick retries.
    pub async fn run(
        &self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        let chain_id = self.chain.chain_id();
        let start_block = self.chain.config.indexer.start_block;
        let poll_interval =
            Duration::from_millis(self.chain.config.indexer.poll_interval_ms);
        let mut cursor = self.store.get_last_block_number(
            chain_id,
            self.outbox,
            start_block,
        )?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            chain_id,
            cursor,
            "outbox poller started",
        );
        let mut warmed_up = false;
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!(chain_id, "outbox poller shutting down");
                    return Ok(());
                }
                result = self.poll(cursor) => match result {
                    Ok(next) => {
                        warmed_up = true;
                        if next != cursor {
                            self.store.set_last_block_number(
                                chain_id, self.outbox, next,
                            )?;
                            tracing::event!(
                                target: probe::TARGET,
                                tracing::Level::TRACE,
                                kind = %probe::Kind::Sync,
                                chain_id,
                                block = next,
                            );
                            cursor = next;
                        }
                    }
                    Err(e) if !warmed_up => return Err(e),
                    Err(e) => {
                        tracing::warn!(chain_id, error = %e, "poll failed");
                        tracing::event!(
                            target: probe::TARGET,
                            tracing::Level::TRACE,
                            kind = %probe::Kind::Retry,
                            chain_id,
                            cursor,
                        );
                    }
                },
            }
            tokio::select! {
                _ = shutdown.recv() => return Ok(()),
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    /// One poll tick: fetch logs from `from_block`, dispatch them all,
    /// and return the next cursor. With no logs the cursor is returned
    /// unchanged so the next tick re-scans the same range.
    pub async fn poll(&self, from_block: u64) -> Result<u64> {
        let logs = self.fetch_logs(from_block).await?;
        if logs.is_empty() {
            return Ok(from_block);
        }
        tracing::debug!(
            chain_id = self.chain.chain_id(),
            count = logs.len(),
            from_block,
            "found outbox logs to consider"
        );
        let mut max_block = from_block;
        let mut requests = Vec::with_capacity(logs.len());
        for log in &logs {
            max_block = max_block.max(log.block_number()?);
            match decode_request(log) {
                Ok(request) => requests.push(request),
                // An undecodable log is not ours to handle; the outbox
                // check would reject it anyway.
                Err(e) => tracing::warn!(error = %e, "undecodable outbox log"),
            }
        }
        let outcomes = futures::future::join_all(
            requests.iter().map(|request| self.dispatch(request)),
        )
        .await;
        let failed = outcomes.iter().filter(|ok| !**ok).count();
        if failed > 0 {
            tracing::warn!(
                failed,
                total = outcomes.len(),
                "some requests in this batch were skipped"
            );
        }
        Ok(max_block + 1)
    }

    /// Fetches outbox logs, retrying transient explorer failures with
    /// capped exponential backoff.
    async fn fetch_logs(&self, from_block: u64) -> Result<Vec<ExplorerLog>> {
        let topic0 = MessagePostedFilter::signature();
        backoff::future::retry(CappedExponentialBackoff::default(), || async {
            self.explorer
                .get_logs(self.outbox, topic0, from_block)
                .await
                .map_err(backoff::Error::transient)
        })
        .await
    }

    async fn dispatch(&self, request: &CrossChainRequest) -> bool {
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Request,
            request_hash = ?request.outbox_id,
            destination_chain_id = request.destination_chain_id(),
        );
        match self.handler.handle_request(self.outbox, request).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    request_hash = ?request.outbox_id,
                    error = %e,
                    "request skipped"
                );
                if let Err(store_err) = self
                    .store
                    .record_skipped(&request.outbox_id, &e.to_string())
                {
                    tracing::error!(
                        error = %store_err,
                        "failed to record the skipped request"
                    );
                }
                false
            }
        }
    }
}

fn decode_request(log: &ExplorerLog) -> Result<CrossChainRequest> {
    crossfill_chain::contracts::decode_message_posted(&log.raw_log())
}
