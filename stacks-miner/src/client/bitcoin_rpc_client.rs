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

use std::time::Duration;

use bitcoin::Txid;
use serde_json::value::RawValue;
use serde_json::Value;

use super::{ClientError, CoinNode, RpcTransport};
use crate::config::MinerConfig;

/// An unspent output as reported by `scantxoutset`
#[derive(Debug, Clone, Deserialize)]
pub struct ParsedUTXO {
    /// Funding transaction id, hex in RPC byte order
    pub txid: String,
    /// Output index
    pub vout: u32,
    /// Hex-encoded locking script
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: String,
    /// BTC amount exactly as bitcoind printed it
    pub amount: Box<RawValue>,
}

impl ParsedUTXO {
    /// The amount in satoshis, or `None` if it is not a well-formed BTC amount
    pub fn get_sat_amount(&self) -> Option<u64> {
        ParsedUTXO::serialized_btc_to_sat(self.amount.get())
    }

    /// Convert a decimal BTC string like `0.10000000` into satoshis
    pub fn serialized_btc_to_sat(amount: &str) -> Option<u64> {
        let comps: Vec<&str> = amount.split('.').collect();
        let (lhs, rhs) = match comps[..] {
            [lhs] => (lhs, ""),
            [lhs, rhs] => (lhs, rhs),
            _ => return None,
        };
        if rhs.len() > 8 {
            warn!("Unexpected amount of decimals in {}", amount);
            return None;
        }
        let btc = lhs.parse::<u64>().ok()?;
        let frac_part = if rhs.is_empty() {
            0
        } else {
            rhs.parse::<u64>().ok()?
        };
        let base: u64 = 10;
        let sat = frac_part.checked_mul(base.pow(8 - rhs.len() as u32))?;
        btc.checked_mul(base.pow(8))?.checked_add(sat)
    }

    /// Render satoshis as a decimal BTC string
    pub fn sat_to_serialized_btc(amount: u64) -> String {
        let base: u64 = 10;
        let int_part = amount / base.pow(8);
        let frac_part = amount % base.pow(8);
        format!("{}.{:08}", int_part, frac_part)
    }
}

/// The `scantxoutset start` result
#[derive(Debug, Clone, Deserialize)]
pub struct ScanTxOutSetResult {
    /// Whether the scan completed
    #[serde(default)]
    pub success: bool,
    /// Every unspent output matching the descriptors
    #[serde(default)]
    pub unspents: Vec<ParsedUTXO>,
}

/// The `scantxoutset status` result while a scan is running
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct ScanProgress {
    /// Percentage complete
    pub progress: f64,
}

/// The subset of `getrawtransaction <txid> true` the miner reads
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RawTransactionInfo {
    /// The transaction id
    pub txid: String,
    /// The consensus-serialized transaction
    pub hex: String,
    /// The block that confirmed it, absent while unconfirmed
    #[serde(default)]
    pub blockhash: Option<String>,
    /// Serialized size in bytes
    #[serde(default)]
    pub size: Option<u64>,
}

/// The subset of `getblock <hash> 1` the miner reads
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BlockInfo {
    /// The block hash
    pub hash: String,
    /// The block height
    pub height: u64,
    /// Transaction ids in block order
    pub tx: Vec<String>,
}

/// bitcoind JSON-RPC client
#[derive(Debug)]
pub struct BitcoinRpcClient {
    transport: RpcTransport,
}

impl BitcoinRpcClient {
    /// Connect to `url` with basic auth
    pub fn new(
        url: String,
        username: String,
        password: String,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        Ok(BitcoinRpcClient {
            transport: RpcTransport::new(url, username, password, timeout)?,
        })
    }
}

impl TryFrom<&MinerConfig> for BitcoinRpcClient {
    type Error = ClientError;

    fn try_from(config: &MinerConfig) -> Result<Self, Self::Error> {
        BitcoinRpcClient::new(
            config.bitcoind_rpc_url.clone(),
            config.bitcoind_username.clone(),
            config.bitcoind_password.clone(),
            config.rpc_timeout,
        )
    }
}

impl CoinNode for BitcoinRpcClient {
    fn get_raw_transaction(&self, txid: &Txid) -> Result<RawTransactionInfo, ClientError> {
        debug!("bitcoind: getrawtransaction {}", txid);
        Ok(self.transport.send(
            "getrawtransaction",
            vec![Value::String(txid.to_string()), Value::Bool(true)],
        )?)
    }

    fn get_block(&self, block_hash: &str) -> Result<BlockInfo, ClientError> {
        debug!("bitcoind: getblock {}", block_hash);
        Ok(self
            .transport
            .send("getblock", vec![block_hash.into(), 1.into()])?)
    }

    fn scan_tx_out_set_start(&self, descriptors: &[String]) -> Result<ScanTxOutSetResult, ClientError> {
        debug!("bitcoind: scantxoutset start {:?}", descriptors);
        let scan_objects = descriptors.iter().map(|d| Value::String(d.clone())).collect();
        Ok(self.transport.send(
            "scantxoutset",
            vec!["start".into(), Value::Array(scan_objects)],
        )?)
    }

    fn scan_tx_out_set_status(&self) -> Result<Option<ScanProgress>, ClientError> {
        Ok(self
            .transport
            .send_optional("scantxoutset", vec!["status".into()])?)
    }

    fn send_raw_transaction(&self, tx_hex: &str) -> Result<String, ClientError> {
        debug!("bitcoind: sendrawtransaction ({} bytes)", tx_hex.len() / 2);
        Ok(self
            .transport
            .send("sendrawtransaction", vec![tx_hex.into()])?)
    }
}
