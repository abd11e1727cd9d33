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

//! The `LeaderBlockCommit` burnchain operation, as carried in an OP_RETURN
//! output:
//!
//! ```text
//!  0      2  3            35           67     71     73    77   79       80
//!  |------|--|-------------|-----------|------|------|-----|-----|--------|
//!   magic  op  block hash    new seed   parent parent key   key   burn parent
//!                                       block  txoff  block txoff modulus
//! ```
//!
//! All integers are big-endian. The 80-byte body is prefixed with
//! `OP_RETURN OP_PUSHDATA1 0x50`.

use bitcoin::opcodes::all::{OP_PUSHDATA1, OP_RETURN};
use bitcoin::ScriptBuf;

use crate::config::Network;
use crate::errors::ValidationError;
use crate::key_registration::KeyRegistration;
use crate::types::{BlockHeaderHash, CandidateBlockTemplate, VRFSeed};

/// Opcode of a leader block commit (`[`)
pub const LEADER_BLOCK_COMMIT_OPCODE: u8 = b'[';
/// Length of the operation body
pub const BLOCK_COMMIT_BODY_LEN: usize = 80;
/// Length of the full output script
pub const BLOCK_COMMIT_PAYLOAD_LEN: usize = 3 + BLOCK_COMMIT_BODY_LEN;
/// Number of burn blocks in a commitment window
pub const BURN_BLOCK_MINED_AT_MODULUS: i128 = 5;

/// The fields of a block commit, range-checked for their wire widths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockCommitFields {
    /// Hash of the committed block
    pub block_header_hash: BlockHeaderHash,
    /// VRF seed for the next election
    pub new_seed: VRFSeed,
    /// Burn height of the parent commit
    pub parent_block_ptr: i32,
    /// Vtxindex of the parent commit
    pub parent_vtxindex: i16,
    /// Burn height of the miner's key registration
    pub key_block_ptr: u32,
    /// Vtxindex of the miner's key registration
    pub key_vtxindex: u16,
    /// `(target_burn_height - 1) mod 5`
    pub burn_parent_modulus: u8,
}

impl BlockCommitFields {
    /// Collect the commit fields for `template`, failing if any of them does
    /// not fit its slot.
    pub fn new(
        template: &CandidateBlockTemplate,
        key: &KeyRegistration,
        target_burn_block_height: u64,
    ) -> Result<Self, ValidationError> {
        let parent_block_ptr = i32::try_from(template.parent_block_burn_height).map_err(|_| {
            ValidationError::FieldOutOfRange {
                field: "parent_block_burn_height",
                value: template.parent_block_burn_height.into(),
                bits: 32,
            }
        })?;
        let parent_vtxindex = i16::try_from(template.parent_block_burn_txoff).map_err(|_| {
            ValidationError::FieldOutOfRange {
                field: "parent_block_burn_txoff",
                value: template.parent_block_burn_txoff.into(),
                bits: 16,
            }
        })?;
        let key_block_ptr =
            u32::try_from(key.block_height).map_err(|_| ValidationError::FieldOutOfRange {
                field: "key block_height",
                value: key.block_height.into(),
                bits: 32,
            })?;
        let key_vtxindex =
            u16::try_from(key.op_vtxindex).map_err(|_| ValidationError::FieldOutOfRange {
                field: "key op_vtxindex",
                value: key.op_vtxindex.into(),
                bits: 16,
            })?;

        Ok(BlockCommitFields {
            block_header_hash: template.block_hash,
            new_seed: template.new_seed,
            parent_block_ptr,
            parent_vtxindex,
            key_block_ptr,
            key_vtxindex,
            burn_parent_modulus: burn_parent_modulus(target_burn_block_height),
        })
    }
}

/// `(target - 1) mod 5`, never negative
pub fn burn_parent_modulus(target_burn_block_height: u64) -> u8 {
    let modulus = (i128::from(target_burn_block_height) - 1).rem_euclid(BURN_BLOCK_MINED_AT_MODULUS);
    // always in 0..5
    modulus as u8
}

/// An encoded leader block commit output script
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct LeaderBlockCommitPayload([u8; BLOCK_COMMIT_PAYLOAD_LEN]);

impl LeaderBlockCommitPayload {
    /// Serialize `fields` for `network`
    pub fn encode(network: Network, fields: &BlockCommitFields) -> Self {
        let mut buf = [0u8; BLOCK_COMMIT_PAYLOAD_LEN];
        let magic = network.magic_bytes();
        buf[0] = OP_RETURN.to_u8();
        buf[1] = OP_PUSHDATA1.to_u8();
        buf[2] = BLOCK_COMMIT_BODY_LEN as u8;
        buf[3..5].copy_from_slice(&magic);
        buf[5] = LEADER_BLOCK_COMMIT_OPCODE;
        buf[6..38].copy_from_slice(fields.block_header_hash.as_bytes());
        buf[38..70].copy_from_slice(fields.new_seed.as_bytes());
        buf[70..74].copy_from_slice(&fields.parent_block_ptr.to_be_bytes());
        buf[74..76].copy_from_slice(&fields.parent_vtxindex.to_be_bytes());
        buf[76..80].copy_from_slice(&fields.key_block_ptr.to_be_bytes());
        buf[80..82].copy_from_slice(&fields.key_vtxindex.to_be_bytes());
        buf[82] = fields.burn_parent_modulus;
        LeaderBlockCommitPayload(buf)
    }

    /// The raw script bytes
    pub fn as_bytes(&self) -> &[u8; BLOCK_COMMIT_PAYLOAD_LEN] {
        &self.0
    }

    /// Hex encoding of the script
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The payload as an output script
    pub fn to_script(&self) -> ScriptBuf {
        ScriptBuf::from_bytes(self.0.to_vec())
    }
}

impl std::fmt::Debug for LeaderBlockCommitPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "LeaderBlockCommitPayload({})", self.to_hex())
    }
}
