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

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crossfill_utils::{Error, Result};
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};

use crate::{
    claim_index_key, history_key, HistoryStore, Submission, SubmissionStatus,
    SubmissionStore,
};

/// SledStore is a [`sled`]-backed store for the filler.
#[derive(Clone)]
pub struct SledStore {
    db: ::sled::Db,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish()
    }
}

/// What gets written into the skipped ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SkippedEntry {
    reason: String,
    at: u64,
}

impl SledStore {
    /// Opens a new SledStore in the given directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = ::sled::Config::new()
            .path(path)
            .mode(::sled::Mode::HighThroughput)
            .use_compression(true)
            .open()?;
        Ok(Self { db })
    }

    /// Creates a temporary SledStore, backed by a directory that gets
    /// cleaned up when the store is dropped. For tests.
    pub fn temporary() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let db = ::sled::Config::new()
            .path(dir.into_path())
            .temporary(true)
            .open()?;
        Ok(Self { db })
    }

    fn submissions(&self) -> Result<::sled::Tree> {
        Ok(self.db.open_tree("submissions")?)
    }

    fn claims(&self) -> Result<::sled::Tree> {
        Ok(self.db.open_tree("claims-by-time")?)
    }

    fn skipped(&self) -> Result<::sled::Tree> {
        Ok(self.db.open_tree("skipped")?)
    }

    fn history(&self) -> Result<::sled::Tree> {
        Ok(self.db.open_tree("history")?)
    }

    fn read_submission(
        tree: &::sled::Tree,
        request_hash: &H256,
    ) -> Result<Option<Submission>> {
        match tree.get(request_hash.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_submission(
        tree: &::sled::Tree,
        submission: &Submission,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(submission)?;
        tree.insert(submission.request_hash.as_bytes(), bytes)?;
        Ok(())
    }
}

impl HistoryStore for SledStore {
    #[tracing::instrument(skip(self))]
    fn set_last_block_number(
        &self,
        chain_id: u64,
        contract: Address,
        block_number: u64,
    ) -> Result<u64> {
        let tree = self.history()?;
        let key = history_key(chain_id, contract);
        let old = tree.insert(
            key.as_bytes(),
            block_number.to_le_bytes().to_vec(),
        )?;
        match old {
            Some(bytes) => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes);
                Ok(u64::from_le_bytes(buf))
            }
            None => Ok(block_number),
        }
    }

    #[tracing::instrument(skip(self))]
    fn get_last_block_number(
        &self,
        chain_id: u64,
        contract: Address,
        default_block: u64,
    ) -> Result<u64> {
        let tree = self.history()?;
        let key = history_key(chain_id, contract);
        match tree.get(key.as_bytes())? {
            Some(bytes) => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes);
                Ok(u64::from_le_bytes(buf))
            }
            None => Ok(default_block),
        }
    }
}

impl SubmissionStore for SledStore {
    fn insert_submission(&self, submission: &Submission) -> Result<()> {
        let tree = self.submissions()?;
        if tree.contains_key(submission.request_hash.as_bytes())? {
            return Err(Error::AlreadyFulfilled {
                request_hash: submission.request_hash,
            });
        }
        Self::write_submission(&tree, submission)
    }

    fn get_submission(
        &self,
        request_hash: &H256,
    ) -> Result<Option<Submission>> {
        Self::read_submission(&self.submissions()?, request_hash)
    }

    fn set_fulfilled(
        &self,
        request_hash: &H256,
        fulfillment_tx: H256,
        fulfilled_at: u64,
        claim_available_at: u64,
    ) -> Result<()> {
        let tree = self.submissions()?;
        let mut submission = Self::read_submission(&tree, request_hash)?
            .ok_or(Error::SubmissionNotFound {
                request_hash: *request_hash,
            })?;
        submission.fulfillment_tx = Some(fulfillment_tx);
        submission.fulfilled_at = fulfilled_at;
        submission.claim_available_at = claim_available_at;
        submission.status = SubmissionStatus::Fulfilled;
        Self::write_submission(&tree, &submission)?;
        self.claims()?.insert(
            claim_index_key(claim_available_at, request_hash),
            request_hash.as_bytes(),
        )?;
        Ok(())
    }

    fn claims_due(&self, now: u64) -> Result<Vec<Submission>> {
        let upper = claim_index_key(now, &H256::repeat_byte(0xff));
        let submissions = self.submissions()?;
        let mut due = Vec::new();
        for entry in self.claims()?.range(..=upper) {
            let (_, hash_bytes) = entry?;
            let request_hash = H256::from_slice(&hash_bytes);
            let Some(submission) =
                Self::read_submission(&submissions, &request_hash)?
            else {
                continue;
            };
            if submission.status == SubmissionStatus::Fulfilled {
                due.push(submission);
            }
        }
        Ok(due)
    }

    fn mark_claimed(&self, request_hash: &H256, claim_tx: H256) -> Result<()> {
        let tree = self.submissions()?;
        let mut submission = Self::read_submission(&tree, request_hash)?
            .ok_or(Error::SubmissionNotFound {
                request_hash: *request_hash,
            })?;
        if submission.status == SubmissionStatus::Claimed {
            return Err(Error::AlreadyClaimed {
                request_hash: *request_hash,
            });
        }
        submission.claim_tx = Some(claim_tx);
        submission.status = SubmissionStatus::Claimed;
        Self::write_submission(&tree, &submission)?;
        self.claims()?.remove(claim_index_key(
            submission.claim_available_at,
            request_hash,
        ))?;
        Ok(())
    }

    fn record_skipped(
        &self,
        request_hash: &H256,
        reason: &str,
    ) -> Result<()> {
        let at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let entry = SkippedEntry { reason: reason.into(), at };
        self.skipped()?.insert(
            request_hash.as_bytes(),
            serde_json::to_vec(&entry)?,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossfill_codec::{Attributes, CrossChainRequest};
    use ethers::types::{Bytes, U256};

    fn sample_submission(request_hash: H256) -> Submission {
        Submission {
            request_hash,
            source_chain_id: 31337,
            destination_chain_id: 31338,
            fulfiller: Address::from_low_u64_be(0xf1),
            fulfillment_tx: None,
            claim_tx: None,
            fulfilled_at: 0,
            claim_available_at: 0,
            request: CrossChainRequest {
                outbox_id: request_hash,
                source_chain: H256::from_low_u64_be(31337),
                sender: H256::from_low_u64_be(1),
                destination_chain: H256::from_low_u64_be(31338),
                receiver: H256::from_low_u64_be(2),
                payload: Bytes::default(),
                value: U256::zero(),
                attributes: Attributes::default(),
            },
            status: SubmissionStatus::Pending,
        }
    }

    #[test]
    fn history_cursor_defaults_and_persists() {
        let store = SledStore::temporary().unwrap();
        let contract = Address::from_low_u64_be(0x0b);
        assert_eq!(
            store.get_last_block_number(1, contract, 42).unwrap(),
            42
        );
        store.set_last_block_number(1, contract, 100).unwrap();
        assert_eq!(
            store.get_last_block_number(1, contract, 42).unwrap(),
            100
        );
    }

    #[test]
    fn duplicate_submission_is_rejected() {
        let store = SledStore::temporary().unwrap();
        let submission = sample_submission(H256::repeat_byte(0x01));
        store.insert_submission(&submission).unwrap();
        assert!(matches!(
            store.insert_submission(&submission),
            Err(Error::AlreadyFulfilled { .. })
        ));
    }

    #[test]
    fn claim_lifecycle() {
        let store = SledStore::temporary().unwrap();
        let hash = H256::repeat_byte(0x02);
        store.insert_submission(&sample_submission(hash)).unwrap();

        // Nothing is due while the submission is still pending.
        assert!(store.claims_due(u64::MAX).unwrap().is_empty());

        store
            .set_fulfilled(&hash, H256::repeat_byte(0xaa), 1_000, 2_000)
            .unwrap();
        assert!(store.claims_due(1_999).unwrap().is_empty());
        let due = store.claims_due(2_000).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].request_hash, hash);
        assert_eq!(due[0].fulfillment_tx, Some(H256::repeat_byte(0xaa)));

        store.mark_claimed(&hash, H256::repeat_byte(0xbb)).unwrap();
        assert!(store.claims_due(u64::MAX).unwrap().is_empty());
        let claimed = store.get_submission(&hash).unwrap().unwrap();
        assert_eq!(claimed.claim_tx, Some(H256::repeat_byte(0xbb)));
        // Claiming twice is an error, never a double count.
        assert!(matches!(
            store.mark_claimed(&hash, H256::repeat_byte(0xcc)),
            Err(Error::AlreadyClaimed { .. })
        ));
    }

    #[test]
    fn skipped_requests_are_recorded() {
        let store = SledStore::temporary().unwrap();
        let hash = H256::repeat_byte(0x03);
        store.record_skipped(&hash, "reward below cost").unwrap();
        // The ledger is write-only from the filler's point of view; it
        // only needs to exist for operators to inspect.
        assert!(store
            .skipped()
            .unwrap()
            .contains_key(hash.as_bytes())
            .unwrap());
    }
}
