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

//! # Crossfill Types 🕸️
//!
//! Newtypes used in the filler configuration. All of them support the
//! `$ENV_VAR` indirection in their `serde` deserialization, so secrets
//! never have to live in the config files themselves.

/// A wrapper type around the explorer API key to allow reading it from the env.
pub mod explorer_api;
/// A Private Key newtype that is read from hex or an env var.
pub mod private_key;
/// An RPC URL newtype that is read from a string or an env var.
pub mod rpc_url;
