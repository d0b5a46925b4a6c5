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

use derive_more::Display;
/// Target for logger
pub const TARGET: &str = "crossfill_probe";

/// The Kind of the Probe.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// When the Lifecycle of the filler changes, like starting or shutting down.
    #[display(fmt = "lifecycle")]
    Lifecycle,
    /// Filler sync state (poll cursor) on a specific source chain.
    #[display(fmt = "sync")]
    Sync,
    /// A request was seen, validated or rejected.
    #[display(fmt = "request")]
    Request,
    /// Fulfillment transaction state on a destination chain.
    #[display(fmt = "fulfillment")]
    Fulfillment,
    /// Proof generation for a fulfilled request.
    #[display(fmt = "proof")]
    Proof,
    /// Reward claim state on a source chain.
    #[display(fmt = "reward_claim")]
    RewardClaim,
    /// Paymaster balance top-ups on a destination chain.
    #[display(fmt = "sponsorship")]
    Sponsorship,
    /// When the filler will retry to do something.
    #[display(fmt = "retry")]
    Retry,
}
