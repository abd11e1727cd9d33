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

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use bitcoin::Txid;

use crate::client::{
    poll_with_backoff, AnchorNode, CancelToken, ClientError, CoinNode, PollPolicy, RpcError,
};
use crate::funding::classify;
use crate::types::VRFPublicKey;

#[derive(thiserror::Error, Debug)]
/// Failure reading or writing the key registration record
pub enum KeyRegistrationError {
    /// The record file could not be read or written
    #[error("Key registration file {0}: {1}")]
    Io(PathBuf, std::io::Error),
    /// The record file is not valid JSON for a registration
    #[error("Malformed key registration file {0}: {1}")]
    Parse(PathBuf, serde_json::Error),
    /// The node returned a txid that is not valid hex
    #[error("Invalid registration txid: {0}")]
    InvalidTxid(String),
}

/// A confirmed VRF key registration, as stored on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRegistration {
    /// The registered key
    pub vrf_public_key: VRFPublicKey,
    /// Height of the burnchain block containing the registration
    pub block_height: u64,
    /// Position of the registration transaction within that block
    pub op_vtxindex: u64,
    /// The registration transaction id
    pub txid: String,
}

/// Where a transaction landed on the burnchain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxLocation {
    /// Containing block hash
    pub blockhash: String,
    /// Containing block height
    pub height: u64,
    /// Index within the block's transaction list
    pub index: u64,
    /// Serialized transaction size
    pub size: Option<u64>,
}

/// A JSON file holding one `KeyRegistration`
#[derive(Debug, Clone)]
pub struct KeyRegistrationStore {
    path: PathBuf,
}

impl KeyRegistrationStore {
    /// A store backed by `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        KeyRegistrationStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the record
    pub fn load(&self) -> Result<KeyRegistration, KeyRegistrationError> {
        let data = fs::read_to_string(&self.path)
            .map_err(|e| KeyRegistrationError::Io(self.path.clone(), e))?;
        serde_json::from_str(&data).map_err(|e| KeyRegistrationError::Parse(self.path.clone(), e))
    }

    /// Replace the record
    pub fn store(&self, registration: &KeyRegistration) -> Result<(), KeyRegistrationError> {
        let data = serde_json::to_string(registration)
            .map_err(|e| KeyRegistrationError::Parse(self.path.clone(), e))?;
        fs::write(&self.path, data).map_err(|e| KeyRegistrationError::Io(self.path.clone(), e))
    }
}

/// Find the block and position of `txid`. `None` while it is unconfirmed or
/// not yet relayed to bitcoind, or if the block it claims does not list it.
pub fn get_tx_location<C: CoinNode>(
    coin: &C,
    txid: &Txid,
) -> Result<Option<TxLocation>, ClientError> {
    let tx = match coin.get_raw_transaction(txid) {
        Ok(tx) => tx,
        Err(ClientError::Rpc(RpcError::Service(msg)))
            if msg.contains("No such mempool or blockchain transaction") =>
        {
            debug!("Transaction {} not yet visible to bitcoind", txid);
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    let Some(blockhash) = tx.blockhash else {
        return Ok(None);
    };
    let block = coin.get_block(&blockhash)?;
    let txid_str = txid.to_string();
    let Some(index) = block.tx.iter().position(|id| *id == txid_str) else {
        warn!("Block {} does not list transaction {}", blockhash, txid_str);
        return Ok(None);
    };
    Ok(Some(TxLocation {
        blockhash,
        height: block.height,
        index: index as u64,
        size: tx.size,
    }))
}

/// Registers a fresh VRF key through the Stacks node and waits for it to confirm
pub struct KeyRegistrar<'a, A: AnchorNode, C: CoinNode> {
    anchor: &'a A,
    coin: &'a C,
    policy: PollPolicy,
    cancel: CancelToken,
}

impl<'a, A: AnchorNode, C: CoinNode> KeyRegistrar<'a, A, C> {
    /// Create a registrar
    pub fn new(anchor: &'a A, coin: &'a C, policy: PollPolicy, cancel: CancelToken) -> Self {
        KeyRegistrar {
            anchor,
            coin,
            policy,
            cancel,
        }
    }

    /// Request a registration anchored at the node's current PoX consensus
    /// hash and block until its transaction is mined.
    pub fn register(&self) -> Result<KeyRegistration, crate::MinerError> {
        let info = self.anchor.get_consensus_info()?;
        info!("Registering VRF key"; "pox_consensus" => %info.pox_consensus);
        let response = self.anchor.register_key(&info.pox_consensus)?;
        let txid = Txid::from_str(&response.txid)
            .map_err(|_| KeyRegistrationError::InvalidTxid(response.txid.clone()))?;
        info!("Key registration submitted"; "txid" => %txid, "vrf_public_key" => %response.vrf_public_key);

        let location = poll_with_backoff(&self.policy, &self.cancel, || {
            match get_tx_location(self.coin, &txid) {
                Ok(Some(location)) => Ok(location),
                Ok(None) => Err(backoff::Error::transient(ClientError::NotReady(format!(
                    "{txid} is unconfirmed"
                )))),
                Err(e) => Err(classify(e)),
            }
        })?;

        let registration = KeyRegistration {
            vrf_public_key: response.vrf_public_key,
            block_height: location.height,
            op_vtxindex: location.index,
            txid: response.txid,
        };
        info!("VRF key registration confirmed";
            "block_height" => registration.block_height,
            "op_vtxindex" => registration.op_vtxindex,
            "txid" => %registration.txid
        );
        Ok(registration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{FakeAnchorNode, FakeCoinNode};

    fn sample() -> KeyRegistration {
        KeyRegistration {
            vrf_public_key: VRFPublicKey([0x44; 32]),
            block_height: 669770,
            op_vtxindex: 3,
            txid: "ab".repeat(32),
        }
    }

    #[test]
    fn store_round_trips_on_disk_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyRegistrationStore::new(dir.path().join("vrf_key.json"));
        store.store(&sample()).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["vrf_public_key"], "44".repeat(32));
        assert_eq!(raw["block_height"], 669770);
        assert_eq!(store.load().unwrap(), sample());
    }

    #[test]
    fn missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyRegistrationStore::new(dir.path().join("absent.json"));
        assert!(matches!(store.load(), Err(KeyRegistrationError::Io(..))));

        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"vrf_public_key": "00"}"#).unwrap();
        let store = KeyRegistrationStore::new(path);
        assert!(matches!(store.load(), Err(KeyRegistrationError::Parse(..))));
    }

    #[test]
    fn tx_location_requires_confirmation() {
        let coin = FakeCoinNode::new();
        let txid = Txid::from_str(&"ab".repeat(32)).unwrap();
        coin.add_raw_transaction(&txid, "00", None);
        assert_eq!(get_tx_location(&coin, &txid).unwrap(), None);

        coin.add_raw_transaction(&txid, "00", Some("blk"));
        coin.add_block("blk", 669770, vec!["cd".repeat(32), txid.to_string()]);
        let location = get_tx_location(&coin, &txid).unwrap().unwrap();
        assert_eq!(location.height, 669770);
        assert_eq!(location.index, 1);
    }

    #[test]
    fn register_waits_for_confirmation() {
        let anchor = FakeAnchorNode::new();
        let coin = FakeCoinNode::new();
        let txid = Txid::from_str(&anchor.registration_txid()).unwrap();
        coin.add_raw_transaction(&txid, "00", Some("blk"));
        coin.add_block("blk", 700, vec![txid.to_string()]);

        let registrar = KeyRegistrar::new(
            &anchor,
            &coin,
            crate::tests::fast_poll_policy(),
            CancelToken::new(),
        );
        let registration = registrar.register().unwrap();
        assert_eq!(registration.block_height, 700);
        assert_eq!(registration.op_vtxindex, 0);
        assert_eq!(registration.vrf_public_key, anchor.registered_key());
    }

    #[test]
    fn tx_location_waits_for_unrelayed_transaction() {
        let coin = FakeCoinNode::new();
        let txid = Txid::from_str(&"ab".repeat(32)).unwrap();
        assert_eq!(get_tx_location(&coin, &txid).unwrap(), None);
    }

    #[test]
    fn register_stops_on_service_error() {
        let anchor = FakeAnchorNode::new();
        let coin = FakeCoinNode::new();
        let txid = Txid::from_str(&anchor.registration_txid()).unwrap();
        coin.add_raw_transaction(&txid, "00", Some("unknown-block"));

        let registrar = KeyRegistrar::new(
            &anchor,
            &coin,
            crate::tests::fast_poll_policy(),
            CancelToken::new(),
        );
        let err = registrar.register().unwrap_err();
        assert!(matches!(
            err,
            crate::MinerError::Rpc(ClientError::Rpc(RpcError::Service(_)))
        ));
    }

    #[test]
    fn register_times_out_when_never_mined() {
        let anchor = FakeAnchorNode::new();
        let coin = FakeCoinNode::new();
        let txid = Txid::from_str(&anchor.registration_txid()).unwrap();
        coin.add_raw_transaction(&txid, "00", None);

        let registrar = KeyRegistrar::new(
            &anchor,
            &coin,
            crate::tests::fast_poll_policy(),
            CancelToken::new(),
        );
        let err = registrar.register().unwrap_err();
        assert!(matches!(err, crate::MinerError::Rpc(ClientError::RetryTimeout)));
    }
}
