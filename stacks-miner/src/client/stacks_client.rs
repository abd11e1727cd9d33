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

use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;

use super::{AnchorNode, ClientError};
use crate::config::MinerConfig;
use crate::errors::ValidationError;
use crate::types::{
    BlockHeaderHash, CandidateBlockTemplate, ConsensusHash, Hash160, Recipient, VRFPublicKey,
    VRFSeed,
};

/// The fields of `/v2/info` the miner reads
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PeerInfo {
    /// Consensus hash of the PoX-anchored burnchain tip
    pub pox_consensus: ConsensusHash,
    /// Hash of the current Stacks chain tip
    pub stacks_tip: BlockHeaderHash,
    /// Current burnchain height
    pub burn_block_height: u64,
}

/// Body of `/v2/miner/register-key`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct RegisterKeyRequest {
    /// Consensus hash the registration is anchored to
    pub parent_consensus_hash: ConsensusHash,
}

/// Reply of `/v2/miner/register-key`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct RegisterKeyResponse {
    /// The key the node registered
    pub vrf_public_key: VRFPublicKey,
    /// The Bitcoin transaction carrying the registration
    pub txid: String,
}

/// Body of `/v2/miner/build-block`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct BuildBlockRequest {
    /// The miner's registered VRF key
    pub vrf_pk: VRFPublicKey,
    /// The Stacks tip to build on
    pub anchored_block_hash: BlockHeaderHash,
    /// Consensus hash of the parent
    pub parent_consensus_hash: ConsensusHash,
    /// Burnchain height the commit targets
    pub target_burn_block_height: u64,
    /// Transactions to include. Omitted to let the node choose.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txids: Option<Vec<String>>,
}

/// A recipient as it appears on the wire
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RawRecipient {
    /// Stacks address version
    pub version: u64,
    /// Hex hash160
    pub bytes: String,
}

/// Reply of `/v2/miner/build-block`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct BuildBlockResponse {
    /// Hash of the candidate block
    pub block_hash: BlockHeaderHash,
    /// The new VRF seed
    pub new_seed: VRFSeed,
    /// Burnchain height of the parent's commit
    #[serde(default)]
    pub parent_block_burn_height: i64,
    /// Vtxindex of the parent's commit
    #[serde(default)]
    pub parent_block_burn_txoff: i64,
    /// The PoX reward recipients
    #[serde(default)]
    pub recipients: Option<Vec<RawRecipient>>,
}

impl TryFrom<BuildBlockResponse> for CandidateBlockTemplate {
    type Error = ValidationError;

    fn try_from(response: BuildBlockResponse) -> Result<Self, Self::Error> {
        let recipients = response
            .recipients
            .unwrap_or_default()
            .into_iter()
            .map(|raw| -> Result<Recipient, ValidationError> {
                let version = u8::try_from(raw.version).map_err(|_| {
                    ValidationError::FieldOutOfRange {
                        field: "recipient version",
                        value: i128::from(raw.version),
                        bits: 8,
                    }
                })?;
                let bytes = Hash160::from_hex(&raw.bytes).map_err(|e| {
                    ValidationError::MalformedField {
                        field: "recipient bytes",
                        reason: e.to_string(),
                    }
                })?;
                Ok(Recipient { version, bytes })
            })
            .collect::<Result<Vec<_>, _>>()?;
        CandidateBlockTemplate::new(
            response.block_hash,
            response.new_seed,
            response.parent_block_burn_height,
            response.parent_block_burn_txoff,
            recipients,
        )
    }
}

/// The Stacks node's miner RPC client
#[derive(Clone, Debug)]
pub struct StacksClient {
    /// The stacks node HTTP base endpoint
    http_origin: String,
    /// The Client used to make HTTP connects
    stacks_node_client: reqwest::blocking::Client,
}

impl StacksClient {
    /// Create a client for the node at `node_host` (host:port)
    pub fn new(node_host: &str, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            http_origin: format!("http://{}", node_host),
            stacks_node_client: reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()?,
        })
    }

    fn core_info_path(&self) -> String {
        format!("{}/v2/info", self.http_origin)
    }

    fn register_key_path(&self) -> String {
        format!("{}/v2/miner/register-key", self.http_origin)
    }

    fn build_block_path(&self) -> String {
        format!("{}/v2/miner/build-block", self.http_origin)
    }

    fn parse_response<T: DeserializeOwned>(
        response: reqwest::blocking::Response,
    ) -> Result<T, ClientError> {
        if !response.status().is_success() {
            return Err(ClientError::RequestFailure(response.status()));
        }
        let body = response.text()?;
        serde_json::from_str(&body)
            .map_err(|e| ClientError::UnexpectedResponseFormat(format!("{e}: {body}")))
    }
}

impl TryFrom<&MinerConfig> for StacksClient {
    type Error = ClientError;

    fn try_from(config: &MinerConfig) -> Result<Self, Self::Error> {
        StacksClient::new(&config.node_host, config.rpc_timeout)
    }
}

impl AnchorNode for StacksClient {
    fn get_consensus_info(&self) -> Result<PeerInfo, ClientError> {
        debug!("Getting stacks node info...");
        let response = self
            .stacks_node_client
            .get(self.core_info_path())
            .header(CONTENT_TYPE, "application/json")
            .send()?;
        Self::parse_response(response)
    }

    fn register_key(&self, consensus_hash: &ConsensusHash) -> Result<RegisterKeyResponse, ClientError> {
        debug!("Requesting VRF key registration at {}", consensus_hash);
        let response = self
            .stacks_node_client
            .post(self.register_key_path())
            .json(&RegisterKeyRequest {
                parent_consensus_hash: *consensus_hash,
            })
            .send()?;
        Self::parse_response(response)
    }

    fn build_block(&self, request: &BuildBlockRequest) -> Result<BuildBlockResponse, ClientError> {
        debug!(
            "Requesting block template on {} at target burn height {}",
            request.anchored_block_hash, request.target_burn_block_height
        );
        let response = self
            .stacks_node_client
            .post(self.build_block_path())
            .json(request)
            .send()?;
        Self::parse_response(response)
    }
}
