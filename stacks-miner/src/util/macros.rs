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

/// Implement hex and byte-slice constructors, `Display`, `Debug` and hex-string
/// serde for a newtype wrapping a `[u8; $len]`.
#[macro_export]
macro_rules! impl_byte_array_newtype {
    ($thing:ident, $len:expr) => {
        impl $thing {
            /// Instantiates from a hex string
            pub fn from_hex(hex_str: &str) -> Result<$thing, $crate::util::HexError> {
                let bytes = hex::decode(hex_str)?;
                $thing::from_bytes(&bytes)
                    .ok_or_else(|| $crate::util::HexError::BadLength(hex_str.len()))
            }

            /// Instantiates from a slice of bytes
            pub fn from_bytes(inp: &[u8]) -> Option<$thing> {
                let bytes: [u8; $len] = inp.try_into().ok()?;
                Some($thing(bytes))
            }

            /// The all-zero value
            pub const fn zero() -> $thing {
                $thing([0u8; $len])
            }

            /// Is every byte zero?
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            /// The raw bytes
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Convert to a hex string
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl std::fmt::Display for $thing {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl std::fmt::Debug for $thing {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl serde::Serialize for $thing {
            fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_str(&self.to_hex())
            }
        }

        impl<'de> serde::Deserialize<'de> for $thing {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<$thing, D::Error> {
                let hex_str = String::deserialize(d)?;
                $thing::from_hex(&hex_str).map_err(serde::de::Error::custom)
            }
        }
    };
}
