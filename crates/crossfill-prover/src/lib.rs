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

//! # Crossfill Prover 🕸️
//!
//! Builds the settlement proof a source-chain outbox demands before it
//! pays out a reward: an inclusion witness tying the destination
//! chain's fulfillment record to state the source chain can verify.
//! Three schemes are supported, selected by the destination's
//! configured prover family — rollup assertion registries, anchored
//! output roots, and pushed block hash oracles — with a mocked beacon
//! witness for devnets.

/// Proof construction against live chain state.
pub mod builder;
/// Canonical RLP block header re-encoding.
pub mod header;
/// Verifier proof shapes and their ABI encoding.
pub mod proof;
/// Storage slot derivations.
pub mod slots;

pub use builder::{
    required_finality_delay, uses_hash_oracle, BuiltProof, ProofBuilder,
};
pub use proof::{
    AccountProofParams, HashOracleProof, OutputRootProof, Proof,
    RollupAssertionProof, StateProofParams,
};
