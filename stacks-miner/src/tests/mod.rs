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

//! In-memory node fakes and fixtures shared by the unit tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::time::Duration;

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use serde_json::value::RawValue;

use crate::account::MinerAccount;
use crate::client::{
    AnchorNode, BlockInfo, BuildBlockRequest, BuildBlockResponse, ClientError, CoinNode,
    ParsedUTXO, PeerInfo, PollPolicy, RawRecipient, RawTransactionInfo, RegisterKeyResponse,
    RpcError, ScanProgress, ScanTxOutSetResult,
};
use crate::commitment::{BlockCommitFields, LeaderBlockCommitPayload};
use crate::config::Network;
use crate::types::{
    BlockHeaderHash, ConsensusHash, Hash160, Recipient, VRFPublicKey, VRFSeed,
    C32_ADDRESS_VERSION_TESTNET_MULTISIG, C32_ADDRESS_VERSION_TESTNET_SINGLESIG,
};

pub const TEST_PRIVATE_KEY: &str =
    "2de4e77aab89c0c2570bb8bb90824f5cf2a5204a975905fee450ff9dad0fcf28";

pub fn test_account() -> MinerAccount {
    MinerAccount::from_hex(TEST_PRIVATE_KEY, bitcoin::Network::Regtest).unwrap()
}

pub fn fast_poll_policy() -> PollPolicy {
    PollPolicy {
        initial_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(4),
        max_elapsed: Duration::from_millis(200),
    }
}

/// A transaction whose only output pays `amount` to `account`
pub fn funding_transaction(account: &MinerAccount, amount: u64) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_raw_hash(bitcoin::hashes::Hash::all_zeros()), 0),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::default(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(amount),
            script_pubkey: account.script_pubkey(),
        }],
    }
}

pub fn parsed_utxo(txid: &str, vout: u32, amount: &str, account: &MinerAccount) -> ParsedUTXO {
    ParsedUTXO {
        txid: txid.to_string(),
        vout,
        script_pub_key: account.script_pubkey().to_hex_string(),
        amount: RawValue::from_string(amount.to_string()).unwrap(),
    }
}

pub fn sample_recipients() -> [Recipient; 2] {
    [
        Recipient {
            version: C32_ADDRESS_VERSION_TESTNET_SINGLESIG,
            bytes: Hash160([0x01; 20]),
        },
        Recipient {
            version: C32_ADDRESS_VERSION_TESTNET_MULTISIG,
            bytes: Hash160([0x02; 20]),
        },
    ]
}

pub fn sample_payload() -> LeaderBlockCommitPayload {
    LeaderBlockCommitPayload::encode(
        Network::Mocknet,
        &BlockCommitFields {
            block_header_hash: BlockHeaderHash([0x0a; 32]),
            new_seed: VRFSeed([0x0b; 32]),
            parent_block_ptr: 100,
            parent_vtxindex: 2,
            key_block_ptr: 90,
            key_vtxindex: 1,
            burn_parent_modulus: 3,
        },
    )
}

/// A Stacks node that answers from memory and records template requests
pub struct FakeAnchorNode {
    info: RefCell<PeerInfo>,
    recipient_count: Cell<usize>,
    fail_build_block: Cell<bool>,
    build_requests: RefCell<Vec<BuildBlockRequest>>,
}

impl FakeAnchorNode {
    pub fn new() -> Self {
        FakeAnchorNode {
            info: RefCell::new(PeerInfo {
                pox_consensus: ConsensusHash([0x17; 20]),
                stacks_tip: BlockHeaderHash([0x22; 32]),
                burn_block_height: 666_050,
            }),
            recipient_count: Cell::new(2),
            fail_build_block: Cell::new(false),
            build_requests: RefCell::new(vec![]),
        }
    }

    pub fn set_tip(&self, stacks_tip: BlockHeaderHash, pox_consensus: ConsensusHash, height: u64) {
        *self.info.borrow_mut() = PeerInfo {
            pox_consensus,
            stacks_tip,
            burn_block_height: height,
        };
    }

    pub fn set_recipient_count(&self, count: usize) {
        self.recipient_count.set(count);
    }

    pub fn fail_build_block(&self) {
        self.fail_build_block.set(true);
    }

    pub fn build_requests(&self) -> Vec<BuildBlockRequest> {
        self.build_requests.borrow().clone()
    }

    pub fn registration_txid(&self) -> String {
        "5e".repeat(32)
    }

    pub fn registered_key(&self) -> VRFPublicKey {
        VRFPublicKey([0x66; 32])
    }
}

impl AnchorNode for FakeAnchorNode {
    fn get_consensus_info(&self) -> Result<PeerInfo, ClientError> {
        Ok(self.info.borrow().clone())
    }

    fn register_key(&self, _consensus_hash: &ConsensusHash) -> Result<RegisterKeyResponse, ClientError> {
        Ok(RegisterKeyResponse {
            vrf_public_key: self.registered_key(),
            txid: self.registration_txid(),
        })
    }

    fn build_block(&self, request: &BuildBlockRequest) -> Result<BuildBlockResponse, ClientError> {
        self.build_requests.borrow_mut().push(request.clone());
        if self.fail_build_block.get() {
            return Err(ClientError::RequestFailure(
                reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            ));
        }
        let recipients = sample_recipients()
            .iter()
            .cycle()
            .take(self.recipient_count.get())
            .map(|r| RawRecipient {
                version: r.version.into(),
                bytes: r.bytes.to_hex(),
            })
            .collect();
        Ok(BuildBlockResponse {
            block_hash: BlockHeaderHash([0x0c; 32]),
            new_seed: VRFSeed([0x0d; 32]),
            parent_block_burn_height: 666_000,
            parent_block_burn_txoff: 4,
            recipients: Some(recipients),
        })
    }
}

/// A bitcoind that answers from memory and records broadcasts
pub struct FakeCoinNode {
    raw_transactions: RefCell<HashMap<Txid, RawTransactionInfo>>,
    blocks: RefCell<HashMap<String, BlockInfo>>,
    unspents: RefCell<Vec<ParsedUTXO>>,
    busy_scans: Cell<u32>,
    incomplete_starts: Cell<u32>,
    contended_starts: Cell<u32>,
    scan_attempts: Cell<u32>,
    scan_starts: Cell<u32>,
    misreport_txid: Cell<bool>,
    broadcast_reply: RefCell<Option<String>>,
    reject_broadcasts: Cell<bool>,
    drop_broadcast_replies: Cell<bool>,
    broadcasts: RefCell<Vec<String>>,
}

impl FakeCoinNode {
    pub fn new() -> Self {
        FakeCoinNode {
            raw_transactions: RefCell::new(HashMap::new()),
            blocks: RefCell::new(HashMap::new()),
            unspents: RefCell::new(vec![]),
            busy_scans: Cell::new(0),
            incomplete_starts: Cell::new(0),
            contended_starts: Cell::new(0),
            scan_attempts: Cell::new(0),
            scan_starts: Cell::new(0),
            misreport_txid: Cell::new(false),
            broadcast_reply: RefCell::new(None),
            reject_broadcasts: Cell::new(false),
            drop_broadcast_replies: Cell::new(false),
            broadcasts: RefCell::new(vec![]),
        }
    }

    pub fn add_raw_transaction(&self, txid: &Txid, hex: &str, blockhash: Option<&str>) {
        self.raw_transactions.borrow_mut().insert(
            *txid,
            RawTransactionInfo {
                txid: txid.to_string(),
                hex: hex.to_string(),
                blockhash: blockhash.map(String::from),
                size: Some(hex.len() as u64 / 2),
            },
        );
    }

    pub fn add_block(&self, hash: &str, height: u64, tx: Vec<String>) {
        self.blocks.borrow_mut().insert(
            hash.to_string(),
            BlockInfo {
                hash: hash.to_string(),
                height,
                tx,
            },
        );
    }

    /// Record a transaction paying `amount` to `account`; returns its txid and hex
    pub fn add_funding_transaction(&self, account: &MinerAccount, amount: u64) -> (String, String) {
        let tx = funding_transaction(account, amount);
        let txid = tx.compute_txid();
        let hex = serialize_hex(&tx);
        self.add_raw_transaction(&txid, &hex, None);
        (txid.to_string(), hex)
    }

    pub fn set_unspents(&self, unspents: Vec<ParsedUTXO>) {
        *self.unspents.borrow_mut() = unspents;
    }

    /// Report a scan in progress for the next `polls` status calls
    pub fn set_busy_scans(&self, polls: u32) {
        self.busy_scans.set(polls);
    }

    /// Answer the next `starts` scan starts with `success: false`
    pub fn set_incomplete_scans(&self, starts: u32) {
        self.incomplete_starts.set(starts);
    }

    /// Fail the next `starts` scan starts with "Scan already in progress"
    pub fn set_contended_scans(&self, starts: u32) {
        self.contended_starts.set(starts);
    }

    pub fn scan_attempts(&self) -> u32 {
        self.scan_attempts.get()
    }

    pub fn scan_starts(&self) -> u32 {
        self.scan_starts.get()
    }

    pub fn misreport_raw_transaction_txid(&self) {
        self.misreport_txid.set(true);
    }

    pub fn set_broadcast_reply(&self, reply: String) {
        *self.broadcast_reply.borrow_mut() = Some(reply);
    }

    pub fn reject_broadcasts(&self) {
        self.reject_broadcasts.set(true);
    }

    /// Accept broadcasts but lose the reply on the wire
    pub fn drop_broadcast_replies(&self) {
        self.drop_broadcast_replies.set(true);
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.broadcasts.borrow().clone()
    }
}

impl CoinNode for FakeCoinNode {
    fn get_raw_transaction(&self, txid: &Txid) -> Result<RawTransactionInfo, ClientError> {
        let mut info = self
            .raw_transactions
            .borrow()
            .get(txid)
            .cloned()
            .ok_or_else(|| {
                RpcError::Service("No such mempool or blockchain transaction".into())
            })?;
        if self.misreport_txid.get() {
            info.txid = "00".repeat(32);
        }
        Ok(info)
    }

    fn get_block(&self, block_hash: &str) -> Result<BlockInfo, ClientError> {
        Ok(self
            .blocks
            .borrow()
            .get(block_hash)
            .cloned()
            .ok_or_else(|| RpcError::Service("Block not found".into()))?)
    }

    fn scan_tx_out_set_start(&self, _descriptors: &[String]) -> Result<ScanTxOutSetResult, ClientError> {
        self.scan_attempts.set(self.scan_attempts.get() + 1);
        self.scan_starts.set(self.scan_starts.get() + 1);
        let contended = self.contended_starts.get();
        if contended > 0 {
            self.contended_starts.set(contended - 1);
            return Err(RpcError::Service(
                "Scan already in progress, use action \"abort\" or \"status\"".into(),
            )
            .into());
        }
        let incomplete = self.incomplete_starts.get();
        if incomplete > 0 {
            self.incomplete_starts.set(incomplete - 1);
            return Ok(ScanTxOutSetResult {
                success: false,
                unspents: vec![],
            });
        }
        Ok(ScanTxOutSetResult {
            success: true,
            unspents: self.unspents.borrow().clone(),
        })
    }

    fn scan_tx_out_set_status(&self) -> Result<Option<ScanProgress>, ClientError> {
        self.scan_attempts.set(self.scan_attempts.get() + 1);
        let busy = self.busy_scans.get();
        if busy == 0 {
            return Ok(None);
        }
        self.busy_scans.set(busy - 1);
        Ok(Some(ScanProgress { progress: 50.0 }))
    }

    fn send_raw_transaction(&self, tx_hex: &str) -> Result<String, ClientError> {
        if self.reject_broadcasts.get() {
            return Err(RpcError::Service("bad-txns-inputs-missingorspent".into()).into());
        }
        self.broadcasts.borrow_mut().push(tx_hex.to_string());
        if self.drop_broadcast_replies.get() {
            return Err(RpcError::Network("operation timed out".into()).into());
        }
        if let Some(reply) = self.broadcast_reply.borrow().clone() {
            return Ok(reply);
        }
        let bytes = hex::decode(tx_hex).map_err(|_| RpcError::Service("TX decode failed".into()))?;
        let tx: Transaction = bitcoin::consensus::deserialize(&bytes)
            .map_err(|_| RpcError::Service("TX decode failed".into()))?;
        Ok(tx.compute_txid().to_string())
    }
}
