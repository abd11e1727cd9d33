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

use std::env;
use std::io;
use std::str::FromStr;

use slog::{Drain, Level, Logger};

/// Selects the output format, `term` or `json`
pub const LOG_FORMAT_VAR: &str = "STACKS_MINER_LOG_FORMAT";
/// Selects the minimum level by slog name (`trace`, `debug`, `info`, ...)
pub const LOG_LEVEL_VAR: &str = "STACKS_MINER_LOG_LEVEL";

lazy_static! {
    /// The process-wide logger, configured once from the environment
    pub static ref LOGGER: Logger = build_logger(
        log_format(env::var(LOG_FORMAT_VAR).ok().as_deref()),
        log_level(env::var(LOG_LEVEL_VAR).ok().as_deref()),
    );
}

/// How log records are rendered on stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact human-readable lines
    Term,
    /// One JSON object per record
    Json,
}

/// Unknown or missing values fall back to `Term`
pub fn log_format(value: Option<&str>) -> LogFormat {
    match value.map(str::trim) {
        Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
        _ => LogFormat::Term,
    }
}

/// Unknown or missing values fall back to `Info`
pub fn log_level(value: Option<&str>) -> Level {
    value
        .and_then(|v| Level::from_str(v.trim()).ok())
        .unwrap_or(Level::Info)
}

fn build_logger(format: LogFormat, level: Level) -> Logger {
    let drain = match format {
        LogFormat::Json => slog_async::Async::new(slog_json::Json::default(io::stderr()).fuse())
            .build()
            .fuse(),
        LogFormat::Term => {
            let decorator = slog_term::TermDecorator::new().stderr().build();
            slog_async::Async::new(slog_term::CompactFormat::new(decorator).build().fuse())
                .build()
                .fuse()
        }
    };
    Logger::root(
        drain.filter_level(level).fuse(),
        o!("bin" => "stacks-miner"),
    )
}

/// Log at error level to the global logger
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => ({
        slog_error!($crate::util::log::LOGGER, $($arg)*)
    })
}

/// Log at warn level to the global logger
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => ({
        slog_warn!($crate::util::log::LOGGER, $($arg)*)
    })
}

/// Log at info level to the global logger
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => ({
        slog_info!($crate::util::log::LOGGER, $($arg)*)
    })
}

/// Log at debug level to the global logger
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => ({
        slog_debug!($crate::util::log::LOGGER, $($arg)*)
    })
}
