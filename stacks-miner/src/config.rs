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

use std::fmt::{Debug, Display};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use bitcoin::secp256k1::SecretKey;
use bitcoin::PrivateKey;
use serde::Deserialize;

use crate::client::PollPolicy;
use crate::commit_tx::COMMIT_TX_ESTIMATED_SIZE;

const DEFAULT_KEY_REGISTRATION_PATH: &str = "vrf_key.json";
const RPC_TIMEOUT_MS: u64 = 120_000;
const POLL_INITIAL_INTERVAL_MS: u64 = 500;
const POLL_MAX_INTERVAL_MS: u64 = 16_384;
const POLL_TIMEOUT_SECS: u64 = 600;

#[derive(thiserror::Error, Debug)]
/// An error occurred parsing the provided configuration
pub enum ConfigError {
    /// Error occurred reading config file
    #[error("{0}")]
    InvalidConfig(String),
    /// An error occurred parsing the TOML data
    #[error("{0}")]
    ParseError(String),
    /// A field was malformed
    #[error("identifier={0}, value={1}")]
    BadField(String, String),
}

#[derive(serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
/// The Stacks network whose consensus rules the commitment targets.
pub enum Network {
    /// The mainnet network
    Mainnet,
    /// The xenon testnet
    Xenon,
    /// The mocknet network
    Mocknet,
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mainnet => write!(f, "mainnet"),
            Self::Xenon => write!(f, "xenon"),
            Self::Mocknet => write!(f, "mocknet"),
        }
    }
}

impl Network {
    /// The two magic bytes that prefix every burnchain operation on this network
    pub const fn magic_bytes(&self) -> [u8; 2] {
        match self {
            Self::Mainnet => [0x58, 0x32], // X2
            Self::Xenon => [0x58, 0x35],   // X5
            Self::Mocknet => [0x69, 0x64], // id
        }
    }

    /// Check if the network is Mainnet or not
    pub const fn is_mainnet(&self) -> bool {
        match self {
            Self::Mainnet => true,
            Self::Xenon | Self::Mocknet => false,
        }
    }
}

#[derive(serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
/// The Bitcoin network used to encode addresses and keys
pub enum BurnchainNetwork {
    /// Bitcoin mainnet
    Mainnet,
    /// Bitcoin testnet
    Testnet,
    /// A local regtest chain
    Regtest,
}

impl BurnchainNetwork {
    /// The corresponding rust-bitcoin network
    pub const fn to_bitcoin_network(&self) -> bitcoin::Network {
        match self {
            Self::Mainnet => bitcoin::Network::Bitcoin,
            Self::Testnet => bitcoin::Network::Testnet,
            Self::Regtest => bitcoin::Network::Regtest,
        }
    }
}

impl std::fmt::Display for BurnchainNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mainnet => write!(f, "mainnet"),
            Self::Testnet => write!(f, "testnet"),
            Self::Regtest => write!(f, "regtest"),
        }
    }
}

/// The parsed configuration for the miner
#[derive(Clone)]
pub struct MinerConfig {
    /// The Stacks network the commitments are encoded for
    pub network: Network,
    /// The Bitcoin network the miner's funds live on
    pub burnchain_network: BurnchainNetwork,
    /// endpoint to the stacks node
    pub node_host: String,
    /// URL of the bitcoind JSON-RPC endpoint
    pub bitcoind_rpc_url: String,
    /// bitcoind RPC user
    pub bitcoind_username: String,
    /// bitcoind RPC password
    pub bitcoind_password: String,
    /// The key that controls the miner's Bitcoin funds
    pub btc_private_key: PrivateKey,
    /// Amount paid to each reward recipient, in sats
    pub commit_amount: u64,
    /// Fee rate in sats per byte
    pub fee_rate: u64,
    /// Assumed serialized size of a block-commit transaction, in bytes
    pub commit_tx_size_estimate: u64,
    /// Where the VRF key registration record is kept
    pub key_registration_path: PathBuf,
    /// Timeout for a single request to either node
    pub rpc_timeout: Duration,
    /// Backoff policy for UTXO-scan and registration polling
    pub poll_policy: PollPolicy,
}

/// Internal struct for loading up the config file
#[derive(Deserialize, Debug)]
struct RawConfigFile {
    /// The Stacks network. One of "mainnet", "xenon" or "mocknet".
    pub network: Network,
    /// The Bitcoin network. Defaults to "mainnet" on Stacks mainnet, else "testnet".
    pub burnchain_network: Option<BurnchainNetwork>,
    /// endpoint to stacks node
    pub node_host: String,
    /// URL of the bitcoind JSON-RPC endpoint
    pub bitcoind_rpc_url: String,
    /// bitcoind RPC user
    pub bitcoind_username: String,
    /// bitcoind RPC password
    pub bitcoind_password: String,
    /// Hex-encoded Bitcoin private key, optionally with a trailing 01 compression flag
    pub btc_private_key: String,
    /// Amount paid to each reward recipient, in sats
    pub commit_amount_sats: u64,
    /// Fee rate in sats per byte
    pub fee_rate_sats_per_byte: u64,
    /// Assumed serialized size of the block-commit transaction
    pub commit_tx_size_estimate: Option<u64>,
    /// Path of the VRF key registration record
    pub key_registration_path: Option<String>,
    /// Per-request timeout in millisecs
    pub rpc_timeout_ms: Option<u64>,
    /// First poll interval in millisecs
    pub poll_initial_interval_ms: Option<u64>,
    /// Largest poll interval in millisecs
    pub poll_max_interval_ms: Option<u64>,
    /// How long (in secs) to keep polling before giving up
    pub poll_timeout_secs: Option<u64>,
}

impl RawConfigFile {
    /// load the config from a string
    pub fn load_from_str(data: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(data).map_err(|e| ConfigError::ParseError(format!("{e:?}")))?;
        Ok(config)
    }
}

impl TryFrom<&PathBuf> for RawConfigFile {
    type Error = ConfigError;

    fn try_from(path: &PathBuf) -> Result<Self, Self::Error> {
        Self::load_from_str(&fs::read_to_string(path).map_err(|e| {
            ConfigError::InvalidConfig(format!("failed to read config file: {e:?}"))
        })?)
    }
}

/// Decode a hex private key, accepting either 32 bytes or 33 bytes ending in
/// the 0x01 compression flag. The key is always used compressed.
pub fn parse_private_key(
    hex_str: &str,
    network: bitcoin::Network,
) -> Result<PrivateKey, ConfigError> {
    let bad_field = || ConfigError::BadField("btc_private_key".to_string(), "<redacted>".into());
    let bytes = hex::decode(hex_str).map_err(|_| bad_field())?;
    let secret = match bytes.len() {
        32 => &bytes[..],
        33 if bytes[32] == 0x01 => &bytes[..32],
        _ => return Err(bad_field()),
    };
    let secret_key = SecretKey::from_slice(secret).map_err(|_| bad_field())?;
    Ok(PrivateKey::new(secret_key, network))
}

impl TryFrom<RawConfigFile> for MinerConfig {
    type Error = ConfigError;

    /// Attempt to decode the raw config file's primitive types into our types.
    fn try_from(raw_data: RawConfigFile) -> Result<Self, Self::Error> {
        url::Url::parse(&format!("http://{}", raw_data.node_host)).map_err(|_| {
            ConfigError::BadField("node_host".to_string(), raw_data.node_host.clone())
        })?;
        url::Url::parse(&raw_data.bitcoind_rpc_url).map_err(|_| {
            ConfigError::BadField(
                "bitcoind_rpc_url".to_string(),
                raw_data.bitcoind_rpc_url.clone(),
            )
        })?;

        let burnchain_network = raw_data
            .burnchain_network
            .unwrap_or(if raw_data.network.is_mainnet() {
                BurnchainNetwork::Mainnet
            } else {
                BurnchainNetwork::Testnet
            });
        let btc_private_key = parse_private_key(
            &raw_data.btc_private_key,
            burnchain_network.to_bitcoin_network(),
        )?;

        if raw_data.commit_amount_sats == 0 {
            return Err(ConfigError::BadField(
                "commit_amount_sats".to_string(),
                "0".to_string(),
            ));
        }

        let commit_tx_size_estimate = raw_data
            .commit_tx_size_estimate
            .unwrap_or(COMMIT_TX_ESTIMATED_SIZE);
        let key_registration_path = raw_data
            .key_registration_path
            .unwrap_or_else(|| DEFAULT_KEY_REGISTRATION_PATH.to_string())
            .into();
        let rpc_timeout = Duration::from_millis(raw_data.rpc_timeout_ms.unwrap_or(RPC_TIMEOUT_MS));

        let poll_policy = PollPolicy {
            initial_interval: Duration::from_millis(
                raw_data
                    .poll_initial_interval_ms
                    .unwrap_or(POLL_INITIAL_INTERVAL_MS),
            ),
            max_interval: Duration::from_millis(
                raw_data.poll_max_interval_ms.unwrap_or(POLL_MAX_INTERVAL_MS),
            ),
            max_elapsed: Duration::from_secs(raw_data.poll_timeout_secs.unwrap_or(POLL_TIMEOUT_SECS)),
        };
        if poll_policy.initial_interval > poll_policy.max_interval {
            return Err(ConfigError::BadField(
                "poll_initial_interval_ms".to_string(),
                format!("{:?}", poll_policy.initial_interval),
            ));
        }

        Ok(Self {
            network: raw_data.network,
            burnchain_network,
            node_host: raw_data.node_host,
            bitcoind_rpc_url: raw_data.bitcoind_rpc_url,
            bitcoind_username: raw_data.bitcoind_username,
            bitcoind_password: raw_data.bitcoind_password,
            btc_private_key,
            commit_amount: raw_data.commit_amount_sats,
            fee_rate: raw_data.fee_rate_sats_per_byte,
            commit_tx_size_estimate,
            key_registration_path,
            rpc_timeout,
            poll_policy,
        })
    }
}

impl TryFrom<&PathBuf> for MinerConfig {
    type Error = ConfigError;
    fn try_from(path: &PathBuf) -> Result<Self, ConfigError> {
        let config_file = RawConfigFile::try_from(path)?;
        Self::try_from(config_file)
    }
}

impl MinerConfig {
    /// load the config from a string and parse it
    pub fn load_from_str(data: &str) -> Result<Self, ConfigError> {
        RawConfigFile::load_from_str(data)?.try_into()
    }

    /// load the config from a file and parse it
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        Self::try_from(&PathBuf::from(path))
    }

    /// The Bitcoin network keys and addresses are encoded for
    pub fn bitcoin_network(&self) -> bitcoin::Network {
        self.burnchain_network.to_bitcoin_network()
    }

    /// Return a string with non-sensitive configuration
    /// information for logging purposes
    pub fn config_to_log_string(&self) -> String {
        format!(
            r#"
Stacks node host: {node_host}
Stacks network: {network}
Bitcoin network: {burnchain_network}
Bitcoind RPC URL: {bitcoind_rpc_url}
Commit amount: {commit_amount} sats
Fee rate: {fee_rate} sats/byte
Key registration path: {key_registration_path}
"#,
            node_host = self.node_host,
            network = self.network,
            burnchain_network = self.burnchain_network,
            bitcoind_rpc_url = self.bitcoind_rpc_url,
            commit_amount = self.commit_amount,
            fee_rate = self.fee_rate,
            key_registration_path = self.key_registration_path.to_str().unwrap_or_default(),
        )
    }
}

impl Display for MinerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.config_to_log_string())
    }
}

impl Debug for MinerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.config_to_log_string())
    }
}
