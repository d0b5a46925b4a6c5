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

#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Crossfill Filler Crate 🕸️
//!
//! The daemon that fills cross-chain call requests for a reward. It
//! watches the outbox of every configured source chain, fulfills the
//! requests that pay for themselves on the destination chain, and
//! claims the rewards back on the source chain once the fulfillment is
//! provable.

/// Long-running background services of the filler.
pub mod service;
