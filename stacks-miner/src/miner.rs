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

use std::collections::HashSet;

use bitcoin::{OutPoint, Txid};

use crate::account::MinerAccount;
use crate::broadcast::Broadcaster;
use crate::client::{
    AnchorNode, BitcoinRpcClient, BuildBlockRequest, CancelToken, ClientError, CoinNode, RpcError,
    StacksClient,
};
use crate::commit_tx::CommitTransactionBuilder;
use crate::commitment::{BlockCommitFields, LeaderBlockCommitPayload};
use crate::config::MinerConfig;
use crate::errors::MinerError;
use crate::funding::{commit_fee, UtxoFunder};
use crate::key_registration::{KeyRegistrar, KeyRegistration, KeyRegistrationStore};
use crate::types::{CandidateBlockTemplate, ConsensusSnapshot};

/// What a successful mining cycle put on the burnchain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSubmission {
    /// The broadcast block-commit transaction
    pub txid: Txid,
    /// The chain state the commit builds on
    pub snapshot: ConsensusSnapshot,
    /// Burn height the commit targets
    pub target_burn_block_height: u64,
    /// The committed block template
    pub template: CandidateBlockTemplate,
    /// The outpoint that funded the commit
    pub funding_outpoint: OutPoint,
    /// Change returned to the miner
    pub change: u64,
    /// Fee paid
    pub fee: u64,
}

/// Drives one leader-block-commit per `run_cycle`
pub struct Miner<A: AnchorNode, C: CoinNode> {
    config: MinerConfig,
    account: MinerAccount,
    anchor: A,
    coin: C,
    store: KeyRegistrationStore,
    cancel: CancelToken,
    spent: HashSet<OutPoint>,
}

impl Miner<StacksClient, BitcoinRpcClient> {
    /// A miner talking to the nodes named in `config`
    pub fn from_config(config: MinerConfig) -> Result<Self, MinerError> {
        let anchor = StacksClient::try_from(&config)?;
        let coin = BitcoinRpcClient::try_from(&config)?;
        Ok(Self::new(config, anchor, coin))
    }
}

impl<A: AnchorNode, C: CoinNode> Miner<A, C> {
    /// A miner using the given node clients
    pub fn new(config: MinerConfig, anchor: A, coin: C) -> Self {
        let account = MinerAccount::new(config.btc_private_key, config.bitcoin_network());
        let store = KeyRegistrationStore::new(&config.key_registration_path);
        Miner {
            config,
            account,
            anchor,
            coin,
            store,
            cancel: CancelToken::new(),
            spent: HashSet::new(),
        }
    }

    /// A token that aborts this miner's polling loops when cancelled
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// The account funding commits
    pub fn account(&self) -> &MinerAccount {
        &self.account
    }

    /// The Stacks node client
    pub fn anchor(&self) -> &A {
        &self.anchor
    }

    /// The bitcoind client
    pub fn coin(&self) -> &C {
        &self.coin
    }

    /// Outpoints this miner has already spent
    pub fn spent_outpoints(&self) -> &HashSet<OutPoint> {
        &self.spent
    }

    /// Fetch the node's tip, substituting the genesis sentinels if no Stacks
    /// block exists yet
    pub fn consensus_snapshot(&self) -> Result<ConsensusSnapshot, MinerError> {
        let info = self.anchor.get_consensus_info()?;
        let snapshot =
            ConsensusSnapshot::new(info.stacks_tip, info.pox_consensus, info.burn_block_height);
        info!("Consensus snapshot";
            "stacks_tip" => %snapshot.stacks_tip,
            "consensus_hash" => %snapshot.consensus_hash,
            "burn_block_height" => snapshot.burn_block_height,
            "genesis" => snapshot.is_genesis
        );
        Ok(snapshot)
    }

    /// Ask the node for a block template on top of `snapshot`
    pub fn request_template(
        &self,
        key: &KeyRegistration,
        snapshot: &ConsensusSnapshot,
    ) -> Result<CandidateBlockTemplate, MinerError> {
        let request = BuildBlockRequest {
            vrf_pk: key.vrf_public_key,
            anchored_block_hash: snapshot.stacks_tip,
            parent_consensus_hash: snapshot.consensus_hash,
            target_burn_block_height: snapshot.target_burn_block_height(),
            txids: None,
        };
        let response = self.anchor.build_block(&request)?;
        let template = CandidateBlockTemplate::try_from(response)?;
        debug!("Received block template";
            "block_hash" => %template.block_hash,
            "new_seed" => %template.new_seed,
            "recipient_1" => %template.recipients[0],
            "recipient_2" => %template.recipients[1]
        );
        Ok(template)
    }

    /// Run one full mining cycle: read chain state, request a template, fund,
    /// encode, sign and broadcast a block commit. Any failure aborts the cycle
    /// before broadcast.
    pub fn run_cycle(&mut self) -> Result<CommitSubmission, MinerError> {
        self.mine_commit().map_err(|e| {
            error!("Mining cycle aborted: {}", e);
            e
        })
    }

    fn mine_commit(&mut self) -> Result<CommitSubmission, MinerError> {
        let key = self.store.load()?;
        let snapshot = self.consensus_snapshot()?;
        let target_burn_block_height = snapshot.target_burn_block_height();
        let template = self.request_template(&key, &snapshot)?;

        let fee = commit_fee(self.config.fee_rate, self.config.commit_tx_size_estimate)?;
        let funder = UtxoFunder::new(&self.coin, self.config.poll_policy, self.cancel.clone());
        let utxo = funder.fund(&self.account, self.config.commit_amount, fee, &self.spent)?;

        let fields = BlockCommitFields::new(&template, &key, target_burn_block_height)?;
        let payload = LeaderBlockCommitPayload::encode(self.config.network, &fields);
        debug!("Encoded block commit"; "payload" => payload.to_hex());

        let builder = CommitTransactionBuilder::new(&self.account, self.config.commit_amount, fee);
        let signed = builder.build(&utxo, &payload, &template.recipients)?;

        let result = Broadcaster::new(&self.coin).broadcast(&signed);
        let maybe_accepted = matches!(
            result,
            Ok(_)
                | Err(MinerError::BroadcastMismatch { .. })
                | Err(MinerError::Rpc(
                    ClientError::Rpc(RpcError::Network(_)) | ClientError::ReqwestError(_)
                ))
        );
        if maybe_accepted {
            // bitcoind may hold the transaction
            self.spent.insert(utxo.outpoint());
        }
        let txid = result?;

        info!("Mining cycle complete";
            "txid" => %txid,
            "target_burn_block_height" => target_burn_block_height,
            "block_hash" => %template.block_hash
        );
        Ok(CommitSubmission {
            txid,
            snapshot,
            target_burn_block_height,
            template,
            funding_outpoint: utxo.outpoint(),
            change: signed.change,
            fee: signed.fee,
        })
    }

    /// Register a new VRF key, wait for it to confirm, and save it for later cycles
    pub fn register_key(&self) -> Result<KeyRegistration, MinerError> {
        let registrar = KeyRegistrar::new(
            &self.anchor,
            &self.coin,
            self.config.poll_policy,
            self.cancel.clone(),
        );
        let registration = registrar.register()?;
        self.store.store(&registration)?;
        info!("Saved VRF key registration to {}", self.store.path().display());
        Ok(registration)
    }
}
