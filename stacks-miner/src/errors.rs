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

use bitcoin::Txid;

use crate::client::ClientError;
use crate::config::ConfigError;
use crate::key_registration::KeyRegistrationError;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// A locally detected problem with data flowing through the pipeline
pub enum ValidationError {
    /// A value does not fit the fixed-width slot it is encoded into
    #[error("{field} value {value} does not fit in its {bits}-bit field")]
    FieldOutOfRange {
        /// The field name
        field: &'static str,
        /// The rejected value
        value: i128,
        /// Width of the slot
        bits: u32,
    },
    /// The block template did not carry exactly two reward recipients
    #[error("Block template has {0} recipients, expected 2")]
    MissingRecipients(usize),
    /// A reward recipient could not be turned into a Bitcoin address
    #[error("Failed to decode recipient address: {0}")]
    AddressDecode(String),
    /// A hex-encoded field could not be decoded
    #[error("Malformed {field}: {reason}")]
    MalformedField {
        /// The field name
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
    /// The funding UTXO's previous transaction is not available
    #[error("Missing raw transaction for UTXO {0}")]
    MissingRawTransaction(String),
    /// The previous transaction does not match the UTXO it should fund
    #[error("Previous output mismatch for UTXO {outpoint}: {reason}")]
    PrevoutMismatch {
        /// The funding outpoint
        outpoint: String,
        /// What differed
        reason: String,
    },
    /// The input cannot cover both payments and the fee
    #[error("Input of {input} sats cannot cover spend of {spend} sats")]
    NegativeChange {
        /// The input amount
        input: u64,
        /// Payments plus fee
        spend: u64,
    },
    /// Fee or threshold arithmetic overflowed
    #[error("Arithmetic overflow computing {0}")]
    ArithmeticOverflow(&'static str),
    /// The transaction could not be assembled
    #[error("Failed to assemble transaction: {0}")]
    TransactionAssembly(String),
    /// Signing produced signatures that do not validate
    #[error("Invalid signature on input {0}")]
    InvalidSignature(usize),
}

#[derive(thiserror::Error, Debug)]
/// Everything that can abort a mining cycle
pub enum MinerError {
    /// A request to the Stacks node or bitcoind failed
    #[error("RPC failure: {0}")]
    Rpc(#[from] ClientError),
    /// Data failed a local validation check
    #[error("Validation failure: {0}")]
    Validation(#[from] ValidationError),
    /// No UTXO is large enough to fund the commit
    #[error("No UTXO for {address} exceeds {threshold} sats (spendable: {spendable} sats)")]
    FundingExhausted {
        /// The funding address
        address: String,
        /// The amount a UTXO must exceed
        threshold: u64,
        /// Total of all scanned UTXOs
        spendable: u64,
    },
    /// bitcoind reported a different txid than the one computed locally
    #[error("Broadcast txid mismatch: computed {local}, bitcoind returned {remote}")]
    BroadcastMismatch {
        /// The locally computed txid
        local: Txid,
        /// The txid bitcoind returned
        remote: String,
    },
    /// The VRF key registration record could not be loaded or stored
    #[error("Key registration failure: {0}")]
    KeyRegistration(#[from] KeyRegistrationError),
    /// The configuration is invalid
    #[error("Configuration failure: {0}")]
    Config(#[from] ConfigError),
}
