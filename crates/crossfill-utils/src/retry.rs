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

//! Retry logic for async calls

use std::time::Duration;

use backoff::backoff::Backoff;
use rand::Rng;

/// Capped Exponential Backoff is a backoff policy which doubles the delay
/// on every retry, capping the delay at `max_delay` and the number of
/// retries at `max_retry_count`. A small random jitter is added to each
/// delay so that many waiters do not wake up in lockstep.
#[derive(Debug)]
pub struct CappedExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    max_retry_count: usize,
    count: usize,
}

impl CappedExponentialBackoff {
    /// Creates a new capped exponential backoff starting at `base_delay`
    /// and never exceeding `max_delay`, with at most `max_retry_count`
    /// retries.
    pub fn new(
        base_delay: Duration,
        max_delay: Duration,
        max_retry_count: usize,
    ) -> Self {
        Self {
            base_delay,
            max_delay,
            max_retry_count,
            count: 0,
        }
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        let exp = attempt.min(32) as u32;
        let unjittered = self
            .base_delay
            .checked_mul(2u32.saturating_pow(exp))
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0..1_000);
        unjittered + Duration::from_millis(jitter)
    }
}

impl Default for CappedExponentialBackoff {
    fn default() -> Self {
        // 1s, 2s, 4s, .. capped at 64s, for at most 60 retries.
        Self::new(Duration::from_secs(1), Duration::from_secs(64), 60)
    }
}

impl Backoff for CappedExponentialBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        (self.count < self.max_retry_count).then(|| {
            let delay = self.delay_for(self.count);
            self.count += 1;
            delay
        })
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let mut policy = CappedExponentialBackoff::new(
            Duration::from_secs(1),
            Duration::from_secs(64),
            60,
        );
        // jitter is below one second, so the integral part is exact.
        for expected_secs in [1u64, 2, 4, 8, 16, 32, 64, 64] {
            let delay = policy.next_backoff().unwrap();
            assert_eq!(delay.as_secs(), expected_secs);
        }
    }

    #[test]
    fn exponential_backoff_exhausts() {
        let mut policy = CappedExponentialBackoff::new(
            Duration::from_millis(1),
            Duration::from_millis(2),
            2,
        );
        assert!(policy.next_backoff().is_some());
        assert!(policy.next_backoff().is_some());
        assert!(policy.next_backoff().is_none());
    }
}
