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

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crossfill_utils::{Error, Result};
use ethers::types::{Address, H256};

use crate::{
    history_key, HistoryStore, Submission, SubmissionStatus, SubmissionStore,
};

#[derive(Debug, Default)]
struct Inner {
    history: HashMap<String, u64>,
    submissions: HashMap<H256, Submission>,
    skipped: HashMap<H256, String>,
}

/// InMemoryStore is a store backed by plain maps, for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl HistoryStore for InMemoryStore {
    fn set_last_block_number(
        &self,
        chain_id: u64,
        contract: Address,
        block_number: u64,
    ) -> Result<u64> {
        let mut inner = self.inner.write().expect("poisoned lock");
        let old = inner
            .history
            .insert(history_key(chain_id, contract), block_number);
        Ok(old.unwrap_or(block_number))
    }

    fn get_last_block_number(
        &self,
        chain_id: u64,
        contract: Address,
        default_block: u64,
    ) -> Result<u64> {
        let inner = self.inner.read().expect("poisoned lock");
        Ok(inner
            .history
            .get(&history_key(chain_id, contract))
            .copied()
            .unwrap_or(default_block))
    }
}

impl SubmissionStore for InMemoryStore {
    fn insert_submission(&self, submission: &Submission) -> Result<()> {
        let mut inner = self.inner.write().expect("poisoned lock");
        if inner.submissions.contains_key(&submission.request_hash) {
            return Err(Error::AlreadyFulfilled {
                request_hash: submission.request_hash,
            });
        }
        inner
            .submissions
            .insert(submission.request_hash, submission.clone());
        Ok(())
    }

    fn get_submission(
        &self,
        request_hash: &H256,
    ) -> Result<Option<Submission>> {
        let inner = self.inner.read().expect("poisoned lock");
        Ok(inner.submissions.get(request_hash).cloned())
    }

    fn set_fulfilled(
        &self,
        request_hash: &H256,
        fulfillment_tx: H256,
        fulfilled_at: u64,
        claim_available_at: u64,
    ) -> Result<()> {
        let mut inner = self.inner.write().expect("poisoned lock");
        let submission = inner.submissions.get_mut(request_hash).ok_or(
            Error::SubmissionNotFound {
                request_hash: *request_hash,
            },
        )?;
        submission.fulfillment_tx = Some(fulfillment_tx);
        submission.fulfilled_at = fulfilled_at;
        submission.claim_available_at = claim_available_at;
        submission.status = SubmissionStatus::Fulfilled;
        Ok(())
    }

    fn claims_due(&self, now: u64) -> Result<Vec<Submission>> {
        let inner = self.inner.read().expect("poisoned lock");
        let mut due: Vec<Submission> = inner
            .submissions
            .values()
            .filter(|s| {
                s.status == SubmissionStatus::Fulfilled
                    && s.claim_available_at <= now
            })
            .cloned()
            .collect();
        due.sort_by_key(|s| s.claim_available_at);
        Ok(due)
    }

    fn mark_claimed(&self, request_hash: &H256, claim_tx: H256) -> Result<()> {
        let mut inner = self.inner.write().expect("poisoned lock");
        let submission = inner.submissions.get_mut(request_hash).ok_or(
            Error::SubmissionNotFound {
                request_hash: *request_hash,
            },
        )?;
        if submission.status == SubmissionStatus::Claimed {
            return Err(Error::AlreadyClaimed {
                request_hash: *request_hash,
            });
        }
        submission.claim_tx = Some(claim_tx);
        submission.status = SubmissionStatus::Claimed;
        Ok(())
    }

    fn record_skipped(
        &self,
        request_hash: &H256,
        reason: &str,
    ) -> Result<()> {
        let mut inner = self.inner.write().expect("poisoned lock");
        inner.skipped.insert(*request_hash, reason.into());
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
            source_chain_id: 1,
            destination_chain_id: 2,
            fulfiller: Address::zero(),
            fulfillment_tx: None,
            claim_tx: None,
            fulfilled_at: 0,
            claim_available_at: 0,
            request: CrossChainRequest {
                outbox_id: request_hash,
                source_chain: H256::from_low_u64_be(1),
                sender: H256::zero(),
                destination_chain: H256::from_low_u64_be(2),
                receiver: H256::zero(),
                payload: Bytes::default(),
                value: U256::zero(),
                attributes: Attributes::default(),
            },
            status: SubmissionStatus::Pending,
        }
    }

    #[test]
    fn behaves_like_the_sled_store() {
        let store = InMemoryStore::default();
        let hash = H256::repeat_byte(0x07);
        store.insert_submission(&sample_submission(hash)).unwrap();
        assert!(store.contains_submission(&hash).unwrap());
        store
            .set_fulfilled(&hash, H256::repeat_byte(0x0a), 10, 20)
            .unwrap();
        assert_eq!(store.claims_due(20).unwrap().len(), 1);
        store.mark_claimed(&hash, H256::repeat_byte(0x0b)).unwrap();
        let claimed = store.get_submission(&hash).unwrap().unwrap();
        assert_eq!(claimed.claim_tx, Some(H256::repeat_byte(0x0b)));
        assert!(matches!(
            store.mark_claimed(&hash, H256::repeat_byte(0x0c)),
            Err(Error::AlreadyClaimed { .. })
        ));
    }
}
