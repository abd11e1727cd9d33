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
use std::str::FromStr;

use bitcoin::{OutPoint, ScriptBuf, Txid};

use crate::account::MinerAccount;
use crate::client::{
    poll_with_backoff, CancelToken, ClientError, CoinNode, ParsedUTXO, PollPolicy, RpcError,
};
use crate::errors::{MinerError, ValidationError};

/// A funding UTXO must hold this many times the commit's total spend
pub const FUNDING_SAFETY_MULTIPLIER: u64 = 100;

/// A spendable output owned by the miner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    /// Funding transaction id
    pub txid: Txid,
    /// Output index
    pub vout: u32,
    /// Value in sats
    pub amount: u64,
    /// Locking script
    pub script_pub_key: ScriptBuf,
    /// The full previous transaction, once fetched
    pub raw_hex: Option<String>,
}

impl Utxo {
    /// The outpoint this UTXO spends from
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }
}

impl TryFrom<&ParsedUTXO> for Utxo {
    type Error = ValidationError;

    fn try_from(parsed: &ParsedUTXO) -> Result<Self, Self::Error> {
        let txid = Txid::from_str(&parsed.txid).map_err(|e| ValidationError::MalformedField {
            field: "utxo txid",
            reason: e.to_string(),
        })?;
        let amount = parsed
            .get_sat_amount()
            .ok_or_else(|| ValidationError::MalformedField {
                field: "utxo amount",
                reason: parsed.amount.get().to_string(),
            })?;
        let script_pub_key = ScriptBuf::from_hex(&parsed.script_pub_key).map_err(|e| {
            ValidationError::MalformedField {
                field: "utxo scriptPubKey",
                reason: e.to_string(),
            }
        })?;
        Ok(Utxo {
            txid,
            vout: parsed.vout,
            amount,
            script_pub_key,
            raw_hex: None,
        })
    }
}

/// `size_estimate * fee_rate`
pub fn commit_fee(fee_rate: u64, size_estimate: u64) -> Result<u64, ValidationError> {
    fee_rate
        .checked_mul(size_estimate)
        .ok_or(ValidationError::ArithmeticOverflow("commit fee"))
}

/// `(2 * commit_amount + fee) * 100`. A UTXO must be strictly larger to fund a commit.
pub fn funding_threshold(commit_amount: u64, fee: u64) -> Result<u64, ValidationError> {
    commit_amount
        .checked_mul(2)
        .and_then(|spend| spend.checked_add(fee))
        .and_then(|spend| spend.checked_mul(FUNDING_SAFETY_MULTIPLIER))
        .ok_or(ValidationError::ArithmeticOverflow("funding threshold"))
}

/// The first UTXO, in scan order, worth more than `threshold` whose outpoint
/// is not in `spent`
pub fn select_utxo<'a>(
    utxos: &'a [Utxo],
    threshold: u64,
    spent: &HashSet<OutPoint>,
) -> Option<&'a Utxo> {
    utxos
        .iter()
        .find(|utxo| utxo.amount > threshold && !spent.contains(&utxo.outpoint()))
}

/// Outcome of one `scantxoutset start` attempt
#[derive(Debug, Clone)]
pub enum ScanState {
    /// Another scan holds bitcoind's scan slot, or this one did not finish
    Scanning,
    /// The scan finished
    Complete(Vec<ParsedUTXO>),
}

/// Network failures are worth retrying, anything else ends the poll
pub(crate) fn classify(err: ClientError) -> backoff::Error<ClientError> {
    match err {
        ClientError::Rpc(RpcError::Network(_)) | ClientError::ReqwestError(_) => {
            backoff::Error::transient(err)
        }
        _ => backoff::Error::permanent(err),
    }
}

/// Discovers the miner's UTXOs and picks one to fund a block commit
pub struct UtxoFunder<'a, C: CoinNode> {
    coin: &'a C,
    policy: PollPolicy,
    cancel: CancelToken,
}

impl<'a, C: CoinNode> UtxoFunder<'a, C> {
    /// Create a funder polling `coin` under `policy`
    pub fn new(coin: &'a C, policy: PollPolicy, cancel: CancelToken) -> Self {
        UtxoFunder {
            coin,
            policy,
            cancel,
        }
    }

    /// Run one `scantxoutset start`
    pub fn start_scan(&self, descriptor: &str) -> Result<ScanState, ClientError> {
        match self.coin.scan_tx_out_set_start(&[descriptor.to_string()]) {
            Ok(result) if result.success => Ok(ScanState::Complete(result.unspents)),
            Ok(_) => Ok(ScanState::Scanning),
            Err(ClientError::Rpc(RpcError::Service(msg))) if msg.contains("in progress") => {
                Ok(ScanState::Scanning)
            }
            Err(e) => Err(e),
        }
    }

    /// Scan the UTXO set for `account`, waiting out any scan already running
    pub fn scan(&self, account: &MinerAccount) -> Result<Vec<ParsedUTXO>, ClientError> {
        let descriptor = account.scan_descriptor();
        poll_with_backoff(&self.policy, &self.cancel, || {
            if let Some(status) = self.coin.scan_tx_out_set_status().map_err(classify)? {
                return Err(backoff::Error::transient(ClientError::NotReady(format!(
                    "UTXO scan {:.1}% complete",
                    status.progress
                ))));
            }
            match self.start_scan(&descriptor).map_err(classify)? {
                ScanState::Complete(unspents) => Ok(unspents),
                ScanState::Scanning => {
                    warn!("scantxoutset did not complete, polling for progress");
                    Err(backoff::Error::transient(ClientError::NotReady(
                        "UTXO scan did not complete".into(),
                    )))
                }
            }
        })
    }

    /// Find a UTXO able to fund a commit paying `commit_amount` to each of two
    /// recipients plus `fee`, skipping outpoints in `spent`. The returned UTXO
    /// carries its previous transaction.
    pub fn fund(
        &self,
        account: &MinerAccount,
        commit_amount: u64,
        fee: u64,
        spent: &HashSet<OutPoint>,
    ) -> Result<Utxo, MinerError> {
        let threshold = funding_threshold(commit_amount, fee)?;
        let parsed = self.scan(account)?;

        let utxos: Vec<Utxo> = parsed
            .iter()
            .filter_map(|p| match Utxo::try_from(p) {
                Ok(utxo) => Some(utxo),
                Err(e) => {
                    warn!("Skipping unreadable UTXO {}:{}: {}", p.txid, p.vout, e);
                    None
                }
            })
            .collect();
        let spendable = utxos
            .iter()
            .fold(0u64, |total, utxo| total.saturating_add(utxo.amount));
        info!("Scanned UTXOs";
            "address" => %account.address(),
            "count" => utxos.len(),
            "spendable_sats" => spendable,
            "threshold_sats" => threshold
        );

        let Some(utxo) = select_utxo(&utxos, threshold, spent) else {
            return Err(MinerError::FundingExhausted {
                address: account.address().to_string(),
                threshold,
                spendable,
            });
        };
        let mut utxo = utxo.clone();
        self.resolve_raw_transaction(&mut utxo)?;
        debug!("Selected funding UTXO {} ({} sats)", utxo.outpoint(), utxo.amount);
        Ok(utxo)
    }

    /// Fetch the previous transaction of `utxo` if it is not already attached
    pub fn resolve_raw_transaction(&self, utxo: &mut Utxo) -> Result<(), MinerError> {
        if utxo.raw_hex.is_some() {
            return Ok(());
        }
        let info = self.coin.get_raw_transaction(&utxo.txid)?;
        if info.txid != utxo.txid.to_string() {
            return Err(ValidationError::PrevoutMismatch {
                outpoint: utxo.outpoint().to_string(),
                reason: format!("bitcoind returned transaction {}", info.txid),
            }
            .into());
        }
        utxo.raw_hex = Some(info.hex);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{fast_poll_policy, parsed_utxo, test_account, FakeCoinNode};

    fn utxo(txid_byte: u8, amount: u64) -> Utxo {
        Utxo {
            txid: Txid::from_str(&format!("{:02x}", txid_byte).repeat(32)).unwrap(),
            vout: 0,
            amount,
            script_pub_key: ScriptBuf::new(),
            raw_hex: None,
        }
    }

    #[test]
    fn threshold_and_fee() {
        assert_eq!(commit_fee(10, 352).unwrap(), 3520);
        assert_eq!(funding_threshold(20_000, 3520).unwrap(), 4_352_000);
        assert_eq!(
            funding_threshold(u64::MAX / 2, 2).unwrap_err(),
            ValidationError::ArithmeticOverflow("funding threshold")
        );
        assert!(commit_fee(u64::MAX, 352).is_err());
    }

    #[test]
    fn select_is_first_fit_and_strict() {
        let utxos = vec![utxo(1, 100), utxo(2, 5_000), utxo(3, 9_000)];
        let none = HashSet::new();
        assert_eq!(select_utxo(&utxos, 100, &none).unwrap().amount, 5_000);
        assert_eq!(select_utxo(&utxos, 4_999, &none).unwrap().amount, 5_000);
        assert_eq!(select_utxo(&utxos, 5_000, &none).unwrap().amount, 9_000);
        assert!(select_utxo(&utxos, 9_000, &none).is_none());
        assert!(select_utxo(&[], 0, &none).is_none());
    }

    #[test]
    fn select_skips_spent_outpoints() {
        let utxos = vec![utxo(1, 5_000), utxo(2, 6_000)];
        let spent: HashSet<OutPoint> = [utxos[0].outpoint()].into_iter().collect();
        assert_eq!(select_utxo(&utxos, 100, &spent).unwrap().amount, 6_000);
    }

    #[test]
    fn fund_waits_for_running_scan() {
        let account = test_account();
        let coin = FakeCoinNode::new();
        let (prev_txid, prev_hex) = coin.add_funding_transaction(&account, 10_000_000);
        coin.set_unspents(vec![parsed_utxo(&prev_txid, 0, "0.10000000", &account)]);
        coin.set_busy_scans(2);

        let funder = UtxoFunder::new(&coin, fast_poll_policy(), CancelToken::new());
        let funded = funder
            .fund(&account, 20_000, 3_520, &HashSet::new())
            .unwrap();
        assert_eq!(funded.amount, 10_000_000);
        assert_eq!(funded.raw_hex.as_deref(), Some(prev_hex.as_str()));
        assert!(coin.scan_attempts() >= 3);
    }

    #[test]
    fn fund_restarts_unfinished_scans() {
        let account = test_account();
        for contended in [false, true] {
            let coin = FakeCoinNode::new();
            let (prev_txid, _) = coin.add_funding_transaction(&account, 10_000_000);
            coin.set_unspents(vec![parsed_utxo(&prev_txid, 0, "0.10000000", &account)]);
            if contended {
                coin.set_contended_scans(2);
            } else {
                coin.set_incomplete_scans(2);
            }

            let funder = UtxoFunder::new(&coin, fast_poll_policy(), CancelToken::new());
            let funded = funder
                .fund(&account, 20_000, 3_520, &HashSet::new())
                .unwrap();
            assert_eq!(funded.amount, 10_000_000);
            assert_eq!(coin.scan_starts(), 3);
        }
    }

    #[test]
    fn start_scan_reports_scanning_until_complete() {
        let account = test_account();
        let coin = FakeCoinNode::new();
        coin.set_incomplete_scans(1);
        coin.set_contended_scans(1);
        let funder = UtxoFunder::new(&coin, fast_poll_policy(), CancelToken::new());
        let descriptor = account.scan_descriptor();

        assert!(matches!(funder.start_scan(&descriptor), Ok(ScanState::Scanning)));
        assert!(matches!(funder.start_scan(&descriptor), Ok(ScanState::Scanning)));
        assert!(matches!(
            funder.start_scan(&descriptor),
            Ok(ScanState::Complete(unspents)) if unspents.is_empty()
        ));
    }

    #[test]
    fn fund_reports_exhaustion_with_spendable_total() {
        let account = test_account();
        let coin = FakeCoinNode::new();
        let txid = "11".repeat(32);
        coin.set_unspents(vec![
            parsed_utxo(&txid, 0, "0.01000000", &account),
            parsed_utxo(&txid, 1, "0.02000000", &account),
        ]);
        let funder = UtxoFunder::new(&coin, fast_poll_policy(), CancelToken::new());
        let err = funder
            .fund(&account, 20_000, 3_520, &HashSet::new())
            .unwrap_err();
        match err {
            MinerError::FundingExhausted {
                threshold,
                spendable,
                address,
            } => {
                assert_eq!(threshold, 4_352_000);
                assert_eq!(spendable, 3_000_000);
                assert_eq!(address, account.address().to_string());
            }
            e => panic!("Expected funding exhaustion, got {e:?}"),
        }
    }

    #[test]
    fn fund_rejects_mismatched_raw_transaction() {
        let account = test_account();
        let coin = FakeCoinNode::new();
        let (prev_txid, _) = coin.add_funding_transaction(&account, 10_000_000);
        coin.set_unspents(vec![parsed_utxo(&prev_txid, 0, "0.10000000", &account)]);
        coin.misreport_raw_transaction_txid();

        let funder = UtxoFunder::new(&coin, fast_poll_policy(), CancelToken::new());
        let err = funder
            .fund(&account, 20_000, 3_520, &HashSet::new())
            .unwrap_err();
        assert!(matches!(
            err,
            MinerError::Validation(ValidationError::PrevoutMismatch { .. })
        ));
    }
}
