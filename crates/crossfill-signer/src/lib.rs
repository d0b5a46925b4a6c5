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

//! # Crossfill Signer 🕸️
//!
//! A thin signing layer over one chain's provider: gas estimation,
//! signing through the chain's configured private key, submission, and
//! waiting for the receipt. Everything above it hands over a prepared
//! [`TypedTransaction`], so a KMS-backed signer only has to replace
//! this crate.

use std::sync::Arc;

use crossfill_chain::ChainClient;
use crossfill_utils::{Error, Result};
use ethers::middleware::{Middleware, SignerMiddleware};
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, TransactionReceipt, U256};

/// The middleware stack a signer wraps.
pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Signs and submits transactions on one chain.
#[derive(Debug, Clone)]
pub struct EvmSigner {
    client: Arc<SignerClient>,
    chain_id: u64,
}

impl EvmSigner {
    /// Builds a signer from the chain's configured private key.
    pub fn new(chain: &ChainClient) -> Result<Self> {
        let wallet = chain.wallet()?;
        let provider = chain.provider().as_ref().clone();
        let client = SignerMiddleware::new(provider, wallet);
        Ok(Self {
            client: Arc::new(client),
            chain_id: chain.chain_id(),
        })
    }

    /// The middleware handle, for typed contract bindings.
    pub fn client(&self) -> Arc<SignerClient> {
        self.client.clone()
    }

    /// The signing (and payout) address.
    pub fn address(&self) -> Address {
        self.client.signer().address()
    }

    /// Estimates gas for a prepared transaction.
    pub async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256> {
        let gas = self.client.estimate_gas(tx, None).await?;
        Ok(gas)
    }

    /// The current gas price, for converting gas units into reward
    /// cost.
    pub async fn gas_price(&self) -> Result<U256> {
        let price = self.client.get_gas_price().await?;
        Ok(price)
    }

    /// Signs, submits, and waits for the transaction to land. A
    /// transaction dropped from the mempool surfaces as an error, not
    /// as a missing receipt.
    pub async fn send(
        &self,
        tx: TypedTransaction,
    ) -> Result<TransactionReceipt> {
        tracing::debug!(
            chain_id = self.chain_id,
            to = ?tx.to(),
            "submitting transaction"
        );
        let pending = self.client.send_transaction(tx, None).await?;
        let receipt = pending
            .await?
            .ok_or(Error::Generic("transaction dropped from the mempool"))?;
        tracing::debug!(
            chain_id = self.chain_id,
            tx_hash = ?receipt.transaction_hash,
            block = ?receipt.block_number,
            "transaction mined"
        );
        Ok(receipt)
    }
}
