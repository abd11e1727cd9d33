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

//! # stacks-miner: submits Stacks leader block commits to Bitcoin
//!
//! Register a VRF key once with `register-key`, then run `commit` once per
//! burnchain block to mine.

extern crate slog;

use std::process;

use clap::Parser;
use slog::{slog_debug, slog_error, slog_info};
use stacks_miner::cli::{Cli, Command, ConfigArgs};
use stacks_miner::client::{BitcoinRpcClient, StacksClient};
use stacks_miner::config::MinerConfig;
use stacks_miner::{debug, error, info, Miner, MinerError};

fn load_miner(args: &ConfigArgs) -> Result<Miner<StacksClient, BitcoinRpcClient>, MinerError> {
    let config = MinerConfig::try_from(&args.config)?;
    debug!("Loaded config: {}", config);
    Miner::from_config(config)
}

fn handle_commit(args: ConfigArgs) -> Result<(), MinerError> {
    let mut miner = load_miner(&args)?;
    info!("Mining with account {}", miner.account().address());
    let submission = miner.run_cycle()?;
    println!("{}", submission.txid);
    Ok(())
}

fn handle_register_key(args: ConfigArgs) -> Result<(), MinerError> {
    let miner = load_miner(&args)?;
    let registration = miner.register_key()?;
    println!(
        "Registered VRF key {} at block {} (vtxindex {}), txid {}",
        registration.vrf_public_key,
        registration.block_height,
        registration.op_vtxindex,
        registration.txid
    );
    Ok(())
}

fn handle_check_config(args: ConfigArgs) -> Result<(), MinerError> {
    let config = MinerConfig::try_from(&args.config)?;
    println!("Config: {}", config);
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Commit(args) => handle_commit(args),
        Command::RegisterKey(args) => handle_register_key(args),
        Command::CheckConfig(args) => handle_check_config(args),
    };

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
