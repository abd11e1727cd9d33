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

use std::fmt;

use crate::errors::ValidationError;

/// A Stacks consensus hash: the fingerprint of a point in the burnchain history
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsensusHash(pub [u8; 20]);
impl_byte_array_newtype!(ConsensusHash, 20);

/// The hash of a Stacks block header
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHeaderHash(pub [u8; 32]);
impl_byte_array_newtype!(BlockHeaderHash, 32);

/// The VRF seed a block commits to for the next leader election
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct VRFSeed(pub [u8; 32]);
impl_byte_array_newtype!(VRFSeed, 32);

/// A registered VRF (election) public key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct VRFPublicKey(pub [u8; 32]);
impl_byte_array_newtype!(VRFPublicKey, 32);

/// A RIPEMD160(SHA256(..)) digest
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash160(pub [u8; 20]);
impl_byte_array_newtype!(Hash160, 20);

/// Chain tip the Stacks node reports before any Stacks block exists
pub const FIRST_STACKS_BLOCK_HASH: BlockHeaderHash = BlockHeaderHash::zero();
/// Consensus hash used as the parent of the first Stacks block
pub const FIRST_BURNCHAIN_CONSENSUS_HASH: ConsensusHash = ConsensusHash::zero();

/// Stacks address versions, which determine how a reward recipient is paid on Bitcoin
pub const C32_ADDRESS_VERSION_MAINNET_SINGLESIG: u8 = 22; // P
/// Mainnet multisig (P2SH) address version
pub const C32_ADDRESS_VERSION_MAINNET_MULTISIG: u8 = 20; // M
/// Testnet single-sig (P2PKH) address version
pub const C32_ADDRESS_VERSION_TESTNET_SINGLESIG: u8 = 26; // T
/// Testnet multisig (P2SH) address version
pub const C32_ADDRESS_VERSION_TESTNET_MULTISIG: u8 = 21; // N

/// The Stacks node's view of the chain, taken once per mining cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusSnapshot {
    /// The Stacks chain tip to build on
    pub stacks_tip: BlockHeaderHash,
    /// The consensus hash to anchor the template to
    pub consensus_hash: ConsensusHash,
    /// The current burnchain height
    pub burn_block_height: u64,
    /// Whether no Stacks block has been mined yet
    pub is_genesis: bool,
}

impl ConsensusSnapshot {
    /// Build a snapshot from the node's reported tip. At genesis the node's
    /// consensus hash is not a valid parent, so both values are replaced by
    /// their all-zero sentinels.
    pub fn new(
        stacks_tip: BlockHeaderHash,
        consensus_hash: ConsensusHash,
        burn_block_height: u64,
    ) -> Self {
        let is_genesis = stacks_tip == FIRST_STACKS_BLOCK_HASH;
        if is_genesis {
            ConsensusSnapshot {
                stacks_tip: FIRST_STACKS_BLOCK_HASH,
                consensus_hash: FIRST_BURNCHAIN_CONSENSUS_HASH,
                burn_block_height,
                is_genesis,
            }
        } else {
            ConsensusSnapshot {
                stacks_tip,
                consensus_hash,
                burn_block_height,
                is_genesis,
            }
        }
    }

    /// The burnchain height the next block commit targets
    pub fn target_burn_block_height(&self) -> u64 {
        self.burn_block_height.saturating_add(1)
    }
}

/// A PoX reward recipient: a Stacks address version and its hash160
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recipient {
    /// The Stacks address version byte
    pub version: u8,
    /// The address hash
    pub bytes: Hash160,
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.version, self.bytes)
    }
}

/// An unsigned candidate block assembled by the Stacks node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateBlockTemplate {
    /// Hash of the candidate block
    pub block_hash: BlockHeaderHash,
    /// The new VRF seed
    pub new_seed: VRFSeed,
    /// Burnchain height of the parent block's commit
    pub parent_block_burn_height: i64,
    /// Position of the parent block's commit within its burnchain block
    pub parent_block_burn_txoff: i64,
    /// The two PoX reward recipients the commit must pay
    pub recipients: [Recipient; 2],
}

impl CandidateBlockTemplate {
    /// Assemble a template, requiring exactly two recipients
    pub fn new(
        block_hash: BlockHeaderHash,
        new_seed: VRFSeed,
        parent_block_burn_height: i64,
        parent_block_burn_txoff: i64,
        recipients: Vec<Recipient>,
    ) -> Result<Self, ValidationError> {
        let found = recipients.len();
        let recipients: [Recipient; 2] = recipients
            .try_into()
            .map_err(|_| ValidationError::MissingRecipients(found))?;
        Ok(CandidateBlockTemplate {
            block_hash,
            new_seed,
            parent_block_burn_height,
            parent_block_burn_txoff,
            recipients,
        })
    }
}
