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

//! # Crossfill Chain 🕸️
//!
//! Everything that talks to a chain: execution-layer clients and
//! contract bindings, the consensus-layer (beacon) REST client with
//! the SSZ block containers, and the explorer log API client the
//! indexer polls through.

/// Per-request chain triple and the reads the prover needs.
pub mod client;
/// Deneb consensus containers and the execution state root witness.
pub mod consensus;
/// Protocol contract bindings.
pub mod contracts;
/// Etherscan-compatible log API client.
pub mod explorer;

pub use client::{ActiveChains, ChainClient, ConfirmedAssertion, SettledBlock};
pub use explorer::{ExplorerClient, ExplorerLog};
