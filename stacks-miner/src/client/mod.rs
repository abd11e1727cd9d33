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

/// The bitcoind client used for UTXO discovery and broadcast
pub mod bitcoin_rpc_client;
/// JSON-RPC over HTTP with basic auth
pub mod rpc_transport;
/// The stacks node client module for communicating with the stacks node
pub mod stacks_client;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use bitcoin_rpc_client::*;
use bitcoin::Txid;
pub use rpc_transport::{RpcError, RpcResult, RpcTransport};
pub use stacks_client::*;

use crate::types::ConsensusHash;

#[derive(thiserror::Error, Debug)]
/// Client error type
pub enum ClientError {
    /// Error for when a response's format does not match the expected structure
    #[error("Unexpected response format: {0}")]
    UnexpectedResponseFormat(String),
    /// Reqwest specific error occurred
    #[error("{0}")]
    ReqwestError(#[from] reqwest::Error),
    /// Stacks node client request failed
    #[error("Stacks node client request failed: {0}")]
    RequestFailure(reqwest::StatusCode),
    /// bitcoind JSON-RPC call failed
    #[error("bitcoind RPC failure: {0}")]
    Rpc(#[from] RpcError),
    /// The polled operation has not finished yet
    #[error("Not ready: {0}")]
    NotReady(String),
    /// Backoff retry timeout
    #[error("Backoff retry timeout occurred. Polled operation never completed.")]
    RetryTimeout,
    /// Polling was cancelled
    #[error("Polling was cancelled")]
    Cancelled,
}

/// Bounds for an exponential backoff polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before the first retry
    pub initial_interval: Duration,
    /// Largest delay between two attempts
    pub max_interval: Duration,
    /// Give up once this much time has passed
    pub max_elapsed: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            initial_interval: Duration::from_millis(128),
            max_interval: Duration::from_millis(16384),
            max_elapsed: Duration::from_secs(600),
        }
    }
}

/// A shared flag that stops any polling loop it is handed
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled
    pub fn new() -> Self {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    /// Stop every loop holding a clone of this token
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Has `cancel` been called?
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Retry `request_fn` with an exponential backoff until it succeeds, fails
/// permanently, runs out of time, or `cancel` is set.
pub fn poll_with_backoff<F, T>(
    policy: &PollPolicy,
    cancel: &CancelToken,
    mut request_fn: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Result<T, backoff::Error<ClientError>>,
{
    let notify = |err: ClientError, dur: Duration| {
        debug!("Polled operation not done ({}). Next attempt in {:?}", err, dur);
    };

    let backoff_timer = backoff::ExponentialBackoffBuilder::new()
        .with_initial_interval(policy.initial_interval)
        .with_max_interval(policy.max_interval)
        .with_max_elapsed_time(Some(policy.max_elapsed))
        .build();

    let op = || {
        if cancel.is_cancelled() {
            return Err(backoff::Error::permanent(ClientError::Cancelled));
        }
        request_fn()
    };

    backoff::retry_notify(backoff_timer, op, notify).map_err(|e| match e {
        backoff::Error::Permanent(err) => err,
        backoff::Error::Transient { .. } => ClientError::RetryTimeout,
    })
}

/// The Stacks node endpoints the miner depends on
pub trait AnchorNode {
    /// GET /v2/info
    fn get_consensus_info(&self) -> Result<PeerInfo, ClientError>;
    /// Ask the node to register a new VRF key anchored at `consensus_hash`
    fn register_key(&self, consensus_hash: &ConsensusHash) -> Result<RegisterKeyResponse, ClientError>;
    /// Ask the node to assemble a candidate block
    fn build_block(&self, request: &BuildBlockRequest) -> Result<BuildBlockResponse, ClientError>;
}

/// The bitcoind RPCs the miner depends on
pub trait CoinNode {
    /// `getrawtransaction <txid> true`
    fn get_raw_transaction(&self, txid: &Txid) -> Result<RawTransactionInfo, ClientError>;
    /// `getblock <hash> 1`
    fn get_block(&self, block_hash: &str) -> Result<BlockInfo, ClientError>;
    /// `scantxoutset start [descriptors]`. Blocks until the scan completes,
    /// or fails if another scan is already running.
    fn scan_tx_out_set_start(&self, descriptors: &[String]) -> Result<ScanTxOutSetResult, ClientError>;
    /// `scantxoutset status`. `None` when no scan is running.
    fn scan_tx_out_set_status(&self) -> Result<Option<ScanProgress>, ClientError>;
    /// `sendrawtransaction <hex>`, returning the txid bitcoind reports
    fn send_raw_transaction(&self, tx_hex: &str) -> Result<String, ClientError>;
}
