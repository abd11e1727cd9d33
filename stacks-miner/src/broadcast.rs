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

use std::str::FromStr;

use bitcoin::Txid;

use crate::client::CoinNode;
use crate::commit_tx::SignedCommitTx;
use crate::errors::MinerError;

/// Submits finalized commits to bitcoind
pub struct Broadcaster<'a, C: CoinNode> {
    coin: &'a C,
}

impl<'a, C: CoinNode> Broadcaster<'a, C> {
    /// A broadcaster sending through `coin`
    pub fn new(coin: &'a C) -> Self {
        Broadcaster { coin }
    }

    /// Send `signed` and confirm bitcoind accepted the exact transaction we
    /// built. A reply that differs from the local txid is an error even
    /// though the transaction may have been relayed.
    pub fn broadcast(&self, signed: &SignedCommitTx) -> Result<Txid, MinerError> {
        let remote = self.coin.send_raw_transaction(&signed.tx_hex)?;
        match Txid::from_str(remote.trim()) {
            Ok(txid) if txid == signed.txid => {
                info!("Block commit broadcast"; "txid" => %txid);
                Ok(txid)
            }
            _ => {
                error!("Broadcast txid mismatch";
                    "local" => %signed.txid,
                    "remote" => %remote
                );
                Err(MinerError::BroadcastMismatch {
                    local: signed.txid,
                    remote,
                })
            }
        }
    }
}
