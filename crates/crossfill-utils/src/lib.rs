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

//! # Crossfill Utils 🕸️
//!
//! Shared error types, retry policies and the probe logging target used
//! across the crossfill filler crates.

use ethers::types::{Address, H256};

/// A module used for debugging filler lifecycle, sync state, or other filler state.
pub mod probe;
/// Retry functionality
pub mod retry;

/// An enum of all possible errors that could be encountered during the
/// execution of the crossfill filler.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Error in Http Provider (ethers client).
    #[error(transparent)]
    EthersProvider(#[from] ethers::providers::ProviderError),
    /// Smart contract error.
    #[error(transparent)]
    EthersContractCall(
        #[from]
        ethers::contract::ContractError<
            ethers::providers::Provider<ethers::providers::Http>,
        >,
    ),
    /// Smart contract error.
    #[error(transparent)]
    EthersContractCallWithSigner(
        #[from]
        ethers::contract::ContractError<
            ethers::middleware::SignerMiddleware<
                ethers::providers::Provider<ethers::providers::Http>,
                ethers::prelude::Wallet<ethers::core::k256::ecdsa::SigningKey>,
            >,
        >,
    ),
    /// Signer middleware error while sending a transaction.
    #[error(transparent)]
    EthersSignerMiddleware(
        #[from]
        ethers::middleware::signer::SignerMiddlewareError<
            ethers::providers::Provider<ethers::providers::Http>,
            ethers::prelude::Wallet<ethers::core::k256::ecdsa::SigningKey>,
        >,
    ),
    /// Ether wallet errors.
    #[error(transparent)]
    EtherWalletError(#[from] ethers::signers::WalletError),
    /// ABI en/decoding error.
    #[error(transparent)]
    Abi(#[from] ethers::core::abi::Error),
    /// Contract ABI error.
    #[error(transparent)]
    ContractAbi(#[from] ethers::contract::AbiError),
    /// Sled database error.
    #[error(transparent)]
    Sled(#[from] sled::Error),
    /// Reqwest error
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// SSZ decoding error.
    #[error("SSZ decode error: {:?}", _0)]
    SszDecode(ssz::DecodeError),
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
    /// EVM Chain not found.
    #[error("Chain Not Found: {}", chain_id)]
    ChainNotFound {
        /// The chain id of the chain.
        chain_id: String,
    },
    /// Missing Secrets in the config, either private key, API key, ...etc.
    #[error("Missing required private-key in the config")]
    MissingSecrets,
    /// Explorer api configuration not found.
    #[error("Explorer api configuration not found for chain: {}", chain_id)]
    ExplorerConfigNotFound {
        /// The chain id of the node.
        chain_id: String,
    },
    /// The explorer log API returned a failure response.
    #[error("Explorer api error: {}", message)]
    ExplorerApi {
        /// Error message returned by the explorer.
        message: String,
    },
    /// The consensus layer API returned a failure response.
    #[error("Consensus api error ({}): {}", status, message)]
    ConsensusApi {
        /// HTTP status code of the response.
        status: u16,
        /// Error message returned by the consensus node.
        message: String,
    },
    /// The consensus layer has no block for the requested root.
    #[error("No consensus block found for parent root {:?}", root)]
    MissingConsensusBlock {
        /// The parent beacon block root we asked for.
        root: H256,
    },
    /// An attribute blob is too short to carry its selector.
    #[error("Attribute blob too short: {} bytes", len)]
    AttributeTooShort {
        /// Actual length of the blob.
        len: usize,
    },
    /// A required attribute is missing from the request.
    #[error("Missing required attribute with selector 0x{}", hex::encode(selector))]
    MissingAttribute {
        /// The 4-byte selector of the missing attribute.
        selector: [u8; 4],
    },
    /// An attribute appears more than once in the request.
    #[error("Duplicate attribute with selector 0x{}", hex::encode(selector))]
    DuplicateAttribute {
        /// The 4-byte selector of the duplicated attribute.
        selector: [u8; 4],
    },
    /// The request reward does not cover the cost of fulfilling it.
    #[error("Undesirable reward: {}", _0)]
    UndesirableReward(String),
    /// The request names a different prover/oracle contract than the one
    /// configured for the destination chain.
    #[error("Unknown prover contract: expected {:?}, found {:?}", expected, found)]
    UnknownProverContract {
        /// Configured prover contract.
        expected: Address,
        /// Contract named by the request attributes.
        found: Address,
    },
    /// The assembled RLP header does not hash back to the block hash.
    #[error("Block hash mismatch: expected {:?}, computed {:?}", expected, computed)]
    BlockHashMismatch {
        /// The block hash reported by the node.
        expected: H256,
        /// keccak256 of the RLP header we assembled.
        computed: H256,
    },
    /// A storage proof came back empty for a slot we expected to be set.
    #[error("Empty storage proof for slot {:?}", slot)]
    EmptyStorageProof {
        /// The storage slot we asked for.
        slot: H256,
    },
    /// A request was already fulfilled on the destination chain.
    #[error("Request {:?} already fulfilled", request_hash)]
    AlreadyFulfilled {
        /// The request hash.
        request_hash: H256,
    },
    /// The reward for a request was already claimed.
    #[error("Reward for request {:?} already claimed", request_hash)]
    AlreadyClaimed {
        /// The request hash.
        request_hash: H256,
    },
    /// No submission record exists for the request hash.
    #[error("No submission found for request {:?}", request_hash)]
    SubmissionNotFound {
        /// The request hash.
        request_hash: H256,
    },
    /// The request hash derived from the event payload does not match the
    /// outbox id carried in the event topics.
    #[error("Request hash mismatch: event says {:?}, computed {:?}", expected, computed)]
    RequestHashMismatch {
        /// The outbox id from the event topics.
        expected: H256,
        /// keccak256 of the re-encoded request.
        computed: H256,
    },
    /// The payload could not be decoded as a packed user operation.
    #[error("Invalid packed user operation: {}", _0)]
    InvalidUserOperation(String),
    /// a background task failed and force restarted.
    #[error("Task Force Restarted from an error")]
    ForceRestart,
    /// a background task failed and stopped Abnormally.
    #[error("Task Stopped Abnormally")]
    TaskStoppedAbnormally,
}

impl From<ssz::DecodeError> for Error {
    fn from(error: ssz::DecodeError) -> Self {
        Error::SszDecode(error)
    }
}

/// A type alias for the result for the crossfill filler, that uses the
/// `Error` enum.
pub type Result<T> = std::result::Result<T, Error>;
