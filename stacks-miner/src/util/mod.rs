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

/// The global slog logger and the crate's logging macros
#[macro_use]
pub mod log;
/// Fixed-size byte array newtypes with hex encodings
#[macro_use]
pub mod macros;

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
/// An error decoding a hex string into a fixed-size value
pub enum HexError {
    /// The decoded value had the wrong number of bytes
    #[error("bad length {0} for hex string")]
    BadLength(usize),
    /// The string was not valid hex
    #[error("bad hex string: {0}")]
    BadCharacter(String),
}

impl From<hex::FromHexError> for HexError {
    fn from(e: hex::FromHexError) -> Self {
        HexError::BadCharacter(e.to_string())
    }
}
