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

//! # Crossfill Store 🕸️
//!
//! Durable storage for the filler: the per-chain poll cursor, the
//! submission records for every request we fulfilled, and the claim
//! schedule derived from them.
//!
//! Two backends are provided: [`SledStore`] for production use and
//! [`InMemoryStore`] for tests.

use crossfill_codec::CrossChainRequest;
use crossfill_utils::Result;
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};

/// A store backed by an in-memory map, for tests.
pub mod mem;
/// A store backed by [`sled`].
pub mod sled;

pub use self::mem::InMemoryStore;
pub use self::sled::SledStore;

/// Lifecycle of a submission record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionStatus {
    /// The fulfillment transaction was sent but not yet confirmed.
    Pending,
    /// The fulfillment transaction is confirmed; the reward claim is
    /// scheduled.
    Fulfilled,
    /// The reward was claimed.
    Claimed,
}

/// A durable record of a request we fulfilled (or are fulfilling).
///
/// The full request is carried along so that the reward claim can be
/// rebuilt later without re-reading the source chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// The canonical request hash.
    pub request_hash: H256,
    /// Chain the request was posted on.
    pub source_chain_id: u64,
    /// Chain the calls run on.
    pub destination_chain_id: u64,
    /// The account that fulfilled the request.
    pub fulfiller: Address,
    /// Hash of the fulfillment transaction, once sent.
    pub fulfillment_tx: Option<H256>,
    /// Hash of the reward claim transaction, once claimed.
    pub claim_tx: Option<H256>,
    /// Destination-chain timestamp of the fulfillment, seconds.
    pub fulfilled_at: u64,
    /// Unix seconds after which the reward claim can be submitted.
    pub claim_available_at: u64,
    /// The request as posted, for claim reconstruction.
    pub request: CrossChainRequest,
    /// Current lifecycle state.
    pub status: SubmissionStatus,
}

/// HistoryStore stores the last block number the poller processed for
/// a given contract on a given chain.
pub trait HistoryStore: Clone + Send + Sync {
    /// Sets the new block number for the target, returning the
    /// previously stored one.
    fn set_last_block_number(
        &self,
        chain_id: u64,
        contract: Address,
        block_number: u64,
    ) -> Result<u64>;
    /// Gets the last block number for the target, or `default_block`
    /// when nothing was stored yet.
    fn get_last_block_number(
        &self,
        chain_id: u64,
        contract: Address,
        default_block: u64,
    ) -> Result<u64>;
}

/// SubmissionStore is the durable ledger of fulfillments and the claim
/// schedule hanging off them.
pub trait SubmissionStore: HistoryStore {
    /// Inserts a fresh submission record. Fails if a record for the
    /// request hash already exists.
    fn insert_submission(&self, submission: &Submission) -> Result<()>;
    /// Fetches the record for a request hash.
    fn get_submission(&self, request_hash: &H256)
        -> Result<Option<Submission>>;
    /// Whether a record exists for the request hash.
    fn contains_submission(&self, request_hash: &H256) -> Result<bool> {
        Ok(self.get_submission(request_hash)?.is_some())
    }
    /// Marks the record fulfilled and schedules its claim.
    fn set_fulfilled(
        &self,
        request_hash: &H256,
        fulfillment_tx: H256,
        fulfilled_at: u64,
        claim_available_at: u64,
    ) -> Result<()>;
    /// All fulfilled-but-unclaimed records whose claim time has passed.
    fn claims_due(&self, now: u64) -> Result<Vec<Submission>>;
    /// Marks the record claimed and keeps the claim transaction hash
    /// for auditing. Fails with `AlreadyClaimed` when called twice, so
    /// a claim is only ever counted once.
    fn mark_claimed(&self, request_hash: &H256, claim_tx: H256) -> Result<()>;
    /// Records a request we saw but did not act on, with the reason.
    fn record_skipped(&self, request_hash: &H256, reason: &str)
        -> Result<()>;
}

/// Key for the claim schedule index: big-endian time so that the
/// natural byte order of the tree is chronological, with the request
/// hash as a tie breaker.
fn claim_index_key(claim_available_at: u64, request_hash: &H256) -> Vec<u8> {
    let mut key = claim_available_at.to_be_bytes().to_vec();
    key.extend_from_slice(request_hash.as_bytes());
    key
}

/// Key for the poll cursor of a contract on a chain.
fn history_key(chain_id: u64, contract: Address) -> String {
    format!("{chain_id}:{contract:?}:last-block-number")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_index_keys_sort_chronologically() {
        let a = claim_index_key(100, &H256::repeat_byte(0xff));
        let b = claim_index_key(200, &H256::repeat_byte(0x00));
        assert!(a < b);
    }
}
