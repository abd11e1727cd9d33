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

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::ecdsa::Signature as EcdsaSignature;
use bitcoin::hashes::Hash;
use bitcoin::psbt::Psbt;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::Message;
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, PubkeyHash, ScriptBuf, ScriptHash, Sequence, Transaction, TxIn, TxOut, Txid,
    Witness,
};

use crate::account::MinerAccount;
use crate::commitment::LeaderBlockCommitPayload;
use crate::errors::ValidationError;
use crate::funding::Utxo;
use crate::types::{
    Recipient, C32_ADDRESS_VERSION_MAINNET_MULTISIG, C32_ADDRESS_VERSION_MAINNET_SINGLESIG,
    C32_ADDRESS_VERSION_TESTNET_MULTISIG, C32_ADDRESS_VERSION_TESTNET_SINGLESIG,
};

/// Assumed serialized size, in bytes, of a block-commit transaction
pub const COMMIT_TX_ESTIMATED_SIZE: u64 = 352;

/// Turn a PoX recipient into the Bitcoin address that receives its payment
pub fn recipient_address(
    recipient: &Recipient,
    network: bitcoin::Network,
) -> Result<Address, ValidationError> {
    let hash = *recipient.bytes.as_bytes();
    match recipient.version {
        C32_ADDRESS_VERSION_MAINNET_SINGLESIG | C32_ADDRESS_VERSION_TESTNET_SINGLESIG => {
            Ok(Address::p2pkh(PubkeyHash::from_byte_array(hash), network))
        }
        C32_ADDRESS_VERSION_MAINNET_MULTISIG | C32_ADDRESS_VERSION_TESTNET_MULTISIG => Ok(
            Address::p2sh_from_hash(ScriptHash::from_byte_array(hash), network),
        ),
        _ => Err(ValidationError::AddressDecode(format!(
            "unsupported address version {} for {}",
            recipient.version, recipient
        ))),
    }
}

/// A finalized, signed block-commit transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCommitTx {
    /// The transaction
    pub tx: Transaction,
    /// Its txid, computed locally
    pub txid: Txid,
    /// Consensus serialization, hex encoded
    pub tx_hex: String,
    /// Value of the funding input
    pub input_amount: u64,
    /// Value returned to the miner
    pub change: u64,
    /// Fee paid
    pub fee: u64,
}

/// Builds the 1-input, 4-output block-commit transaction:
/// the commitment, two recipient payments, and change back to the miner.
pub struct CommitTransactionBuilder<'a> {
    account: &'a MinerAccount,
    commit_amount: u64,
    fee: u64,
}

impl<'a> CommitTransactionBuilder<'a> {
    /// A builder paying `commit_amount` to each recipient and `fee` to miners
    pub fn new(account: &'a MinerAccount, commit_amount: u64, fee: u64) -> Self {
        CommitTransactionBuilder {
            account,
            commit_amount,
            fee,
        }
    }

    /// Check that `utxo`'s previous transaction really holds the output we
    /// intend to spend, and return it
    fn previous_transaction(&self, utxo: &Utxo) -> Result<Transaction, ValidationError> {
        let outpoint = utxo.outpoint().to_string();
        let raw_hex = utxo
            .raw_hex
            .as_ref()
            .ok_or_else(|| ValidationError::MissingRawTransaction(outpoint.clone()))?;
        let bytes = hex::decode(raw_hex).map_err(|e| ValidationError::MalformedField {
            field: "previous transaction hex",
            reason: e.to_string(),
        })?;
        let prev_tx: Transaction = bitcoin::consensus::deserialize(&bytes).map_err(|e| {
            ValidationError::MalformedField {
                field: "previous transaction",
                reason: e.to_string(),
            }
        })?;

        let mismatch = |reason: String| ValidationError::PrevoutMismatch {
            outpoint: outpoint.clone(),
            reason,
        };
        let prev_txid = prev_tx.compute_txid();
        if prev_txid != utxo.txid {
            return Err(mismatch(format!("previous transaction hashes to {prev_txid}")));
        }
        let prev_out = prev_tx
            .output
            .get(utxo.vout as usize)
            .ok_or_else(|| mismatch(format!("no output {}", utxo.vout)))?;
        if prev_out.value.to_sat() != utxo.amount {
            return Err(mismatch(format!(
                "output holds {} sats, scan reported {}",
                prev_out.value.to_sat(),
                utxo.amount
            )));
        }
        if prev_out.script_pubkey != self.account.script_pubkey() {
            return Err(mismatch("output is not locked to the miner's address".into()));
        }
        Ok(prev_tx)
    }

    /// Assemble, sign, validate and finalize the commit transaction
    pub fn build(
        &self,
        utxo: &Utxo,
        payload: &LeaderBlockCommitPayload,
        recipients: &[Recipient; 2],
    ) -> Result<SignedCommitTx, ValidationError> {
        let prev_tx = self.previous_transaction(utxo)?;

        let spend = self
            .commit_amount
            .checked_mul(2)
            .and_then(|s| s.checked_add(self.fee))
            .ok_or(ValidationError::ArithmeticOverflow("commit spend"))?;
        let change = utxo
            .amount
            .checked_sub(spend)
            .ok_or(ValidationError::NegativeChange {
                input: utxo.amount,
                spend,
            })?;

        let network = self.account.network();
        let mut output = vec![TxOut {
            value: Amount::ZERO,
            script_pubkey: payload.to_script(),
        }];
        for recipient in recipients.iter() {
            output.push(TxOut {
                value: Amount::from_sat(self.commit_amount),
                script_pubkey: recipient_address(recipient, network)?.script_pubkey(),
            });
        }
        output.push(TxOut {
            value: Amount::from_sat(change),
            script_pubkey: self.account.script_pubkey(),
        });

        let unsigned_tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: utxo.outpoint(),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::default(),
            }],
            output,
        };

        let mut psbt = Psbt::from_unsigned_tx(unsigned_tx)
            .map_err(|e| ValidationError::TransactionAssembly(e.to_string()))?;
        psbt.inputs[0].non_witness_utxo = Some(prev_tx);

        self.sign_all_inputs(&mut psbt)?;
        self.validate_signatures_of_all_inputs(&psbt)?;
        self.finalize_all_inputs(&mut psbt)?;

        let tx = psbt
            .extract_tx()
            .map_err(|e| ValidationError::TransactionAssembly(e.to_string()))?;
        let txid = tx.compute_txid();
        let tx_hex = serialize_hex(&tx);
        debug!("Built block-commit transaction";
            "txid" => %txid,
            "input_sats" => utxo.amount,
            "change_sats" => change,
            "fee_sats" => self.fee
        );

        Ok(SignedCommitTx {
            tx,
            txid,
            tx_hex,
            input_amount: utxo.amount,
            change,
            fee: self.fee,
        })
    }

    /// The locking script spent by input `index`
    fn spent_script(psbt: &Psbt, index: usize) -> Result<ScriptBuf, ValidationError> {
        let prevout = psbt.unsigned_tx.input[index].previous_output;
        psbt.inputs[index]
            .non_witness_utxo
            .as_ref()
            .and_then(|prev_tx| prev_tx.output.get(prevout.vout as usize))
            .map(|out| out.script_pubkey.clone())
            .ok_or_else(|| ValidationError::MissingRawTransaction(prevout.to_string()))
    }

    fn sighash_message(
        psbt: &Psbt,
        index: usize,
        script_pubkey: &ScriptBuf,
        sighash_type: EcdsaSighashType,
    ) -> Result<Message, ValidationError> {
        let sighash = SighashCache::new(&psbt.unsigned_tx)
            .legacy_signature_hash(index, script_pubkey, sighash_type.to_u32())
            .map_err(|e| ValidationError::TransactionAssembly(e.to_string()))?;
        Ok(Message::from_digest(sighash.to_byte_array()))
    }

    /// Add a SIGHASH_ALL signature from the miner's key to every input
    pub fn sign_all_inputs(&self, psbt: &mut Psbt) -> Result<(), ValidationError> {
        for index in 0..psbt.inputs.len() {
            let script_pubkey = Self::spent_script(psbt, index)?;
            let msg = Self::sighash_message(psbt, index, &script_pubkey, EcdsaSighashType::All)?;
            let signature = self
                .account
                .secp()
                .sign_ecdsa(&msg, &self.account.private_key().inner);
            psbt.inputs[index].partial_sigs.insert(
                *self.account.public_key(),
                EcdsaSignature {
                    signature,
                    sighash_type: EcdsaSighashType::All,
                },
            );
        }
        Ok(())
    }

    /// Check that every input carries at least one signature and that each
    /// signature verifies against the input's P2PKH script
    pub fn validate_signatures_of_all_inputs(&self, psbt: &Psbt) -> Result<(), ValidationError> {
        for (index, input) in psbt.inputs.iter().enumerate() {
            if input.partial_sigs.is_empty() {
                return Err(ValidationError::InvalidSignature(index));
            }
            let script_pubkey = Self::spent_script(psbt, index)?;
            for (public_key, sig) in input.partial_sigs.iter() {
                if script_pubkey != ScriptBuf::new_p2pkh(&public_key.pubkey_hash()) {
                    return Err(ValidationError::InvalidSignature(index));
                }
                let msg = Self::sighash_message(psbt, index, &script_pubkey, sig.sighash_type)?;
                self.account
                    .secp()
                    .verify_ecdsa(&msg, &sig.signature, &public_key.inner)
                    .map_err(|_| ValidationError::InvalidSignature(index))?;
            }
        }
        Ok(())
    }

    /// Move each input's signature into a P2PKH scriptSig
    pub fn finalize_all_inputs(&self, psbt: &mut Psbt) -> Result<(), ValidationError> {
        for (index, input) in psbt.inputs.iter_mut().enumerate() {
            let (public_key, sig) = input
                .partial_sigs
                .iter()
                .next()
                .map(|(pk, sig)| (*pk, *sig))
                .ok_or(ValidationError::InvalidSignature(index))?;
            let sig_push = PushBytesBuf::try_from(sig.to_vec())
                .map_err(|e| ValidationError::TransactionAssembly(e.to_string()))?;
            let script_sig = Builder::new()
                .push_slice(sig_push)
                .push_key(&public_key)
                .into_script();
            input.final_script_sig = Some(script_sig);
            input.partial_sigs.clear();
        }
        Ok(())
    }
}
