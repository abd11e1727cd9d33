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

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about)]
/// The CLI arguments for the stacks miner
pub struct Cli {
    /// Subcommand action to take
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands for the stacks miner binary
#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Run one mining cycle: build, sign and broadcast a single block commit
    Commit(ConfigArgs),
    /// Register a VRF key through the Stacks node and save it once it is mined
    RegisterKey(ConfigArgs),
    /// Check a configuration file and output config information
    CheckConfig(ConfigArgs),
}

/// Arguments shared by every subcommand
#[derive(Parser, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to config file
    #[arg(long, short, value_name = "FILE", env = "STACKS_MINER_CONFIG")]
    pub config: PathBuf,
}
