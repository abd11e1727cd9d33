#![deny(missing_docs)]
/*!
# stacks-miner: a leader block-commit miner for the Stacks blockchain.

Each mining cycle asks a Stacks node for its consensus state and a candidate
block template, encodes a `LeaderBlockCommit` payload for it, funds and signs a
Bitcoin transaction carrying that payload, and broadcasts it to bitcoind.
*/

// Copyright (C) 2013-2020 Blockstack PBC, a public benefit corporation
// Copyright (C) 2020-2024 Stacks Open Internet Foundation
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

#[allow(unused_imports)]
#[macro_use(o, slog_log, slog_debug, slog_info, slog_warn, slog_error)]
extern crate slog;

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate serde_derive;

/// Logging, hex newtypes and other shared helpers
#[macro_use]
pub mod util;

/// Key material of the Bitcoin account that funds block commits
pub mod account;
/// Broadcasting of finalized block-commit transactions
pub mod broadcast;
/// The cli module for the miner binary
pub mod cli;
/// Clients for the Stacks node and bitcoind
pub mod client;
/// Construction and signing of the block-commit transaction
pub mod commit_tx;
/// The `LeaderBlockCommit` wire format
pub mod commitment;
/// The configuration module for the miner
pub mod config;
/// Error types shared by the pipeline stages
pub mod errors;
/// UTXO discovery and selection
pub mod funding;
/// VRF key registration records and the registration flow
pub mod key_registration;
/// The mining cycle orchestrator
pub mod miner;
/// Chain state types exchanged with the Stacks node
pub mod types;

pub use crate::errors::{MinerError, ValidationError};
pub use crate::miner::{CommitSubmission, Miner};

#[cfg(test)]
pub(crate) mod tests;
