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

use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::{Address, PrivateKey, PublicKey, ScriptBuf};

use crate::config::{parse_private_key, ConfigError};

/// The Bitcoin key that funds block commits and receives their change
#[derive(Clone)]
pub struct MinerAccount {
    private_key: PrivateKey,
    public_key: PublicKey,
    address: Address,
    network: bitcoin::Network,
    secp: Secp256k1<All>,
}

impl MinerAccount {
    /// Derive the compressed public key and P2PKH address of `private_key` on `network`
    pub fn new(private_key: PrivateKey, network: bitcoin::Network) -> Self {
        let secp = Secp256k1::new();
        let public_key = private_key.public_key(&secp);
        let address = Address::p2pkh(public_key.pubkey_hash(), network);
        MinerAccount {
            private_key,
            public_key,
            address,
            network,
            secp,
        }
    }

    /// Decode a hex private key for `network`
    pub fn from_hex(hex_str: &str, network: bitcoin::Network) -> Result<Self, ConfigError> {
        Ok(Self::new(parse_private_key(hex_str, network)?, network))
    }

    /// The Bitcoin network the account's addresses are encoded for
    pub fn network(&self) -> bitcoin::Network {
        self.network
    }

    /// The signing key
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// The compressed public key
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// The P2PKH address funds are scanned for and change is paid to
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The locking script of the account's outputs
    pub fn script_pubkey(&self) -> ScriptBuf {
        self.address.script_pubkey()
    }

    /// The `scantxoutset` descriptor for this account
    pub fn scan_descriptor(&self) -> String {
        format!("addr({})", self.address)
    }

    /// A secp256k1 context for signing and verification
    pub fn secp(&self) -> &Secp256k1<All> {
        &self.secp
    }
}

impl std::fmt::Debug for MinerAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MinerAccount")
            .field("address", &self.address.to_string())
            .field("public_key", &self.public_key.to_string())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SK_HEX: &str = "2de4e77aab89c0c2570bb8bb90824f5cf2a5204a975905fee450ff9dad0fcf28";

    #[test]
    fn address_follows_network() {
        let testnet = MinerAccount::from_hex(SK_HEX, bitcoin::Network::Testnet).unwrap();
        let mainnet = MinerAccount::from_hex(SK_HEX, bitcoin::Network::Bitcoin).unwrap();
        assert_eq!(testnet.public_key(), mainnet.public_key());
        assert!(testnet.public_key().compressed);
        let testnet_addr = testnet.address().to_string();
        let mainnet_addr = mainnet.address().to_string();
        assert!(testnet_addr.starts_with('m') || testnet_addr.starts_with('n'));
        assert!(mainnet_addr.starts_with('1'));
        assert_eq!(testnet.script_pubkey(), mainnet.script_pubkey());
        assert!(testnet.script_pubkey().is_p2pkh());
    }

    #[test]
    fn scan_descriptor_wraps_address() {
        let account = MinerAccount::from_hex(SK_HEX, bitcoin::Network::Regtest).unwrap();
        assert_eq!(
            account.scan_descriptor(),
            format!("addr({})", account.address())
        );
    }

    #[test]
    fn debug_hides_private_key() {
        let account = MinerAccount::from_hex(SK_HEX, bitcoin::Network::Regtest).unwrap();
        assert!(!format!("{account:?}").contains(SK_HEX));
    }
}
