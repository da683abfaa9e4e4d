// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the client. Configuration is loaded from the environment once
//! at startup; blank or unparsable values fall back to the default.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `RPC_BASE_URL` | Ledger node base URL | `http://localhost:8080` |
//! | `WALLET_FILE` | JSON file holding the wallet record | `./wallet.json` |
//! | `REQUEST_TIMEOUT_MS` | Per-request HTTP timeout | `10000` |
//! | `POLL_BLOCKS_MS` | Interval between block fetches | `20000` |
//! | `POLL_MEMPOOL_MS` | Interval between mempool fetches | `2000` |
//! | `POLL_BALANCE_MS` | Interval between balance fetches | `5000` |
//! | `BALANCE_CACHE_CAPACITY` | Addresses kept in the balance cache | `64` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::blockchain::client::{DEFAULT_REQUEST_TIMEOUT, DEFAULT_RPC_URL};
use crate::chain_view::DEFAULT_BALANCE_CAPACITY;
use crate::poller::{
    PollIntervals, DEFAULT_BALANCE_INTERVAL, DEFAULT_BLOCKS_INTERVAL, DEFAULT_MEMPOOL_INTERVAL,
};

/// Environment variable name for the ledger node base URL.
pub const RPC_BASE_URL_ENV: &str = "RPC_BASE_URL";

/// Environment variable name for the wallet record path.
pub const WALLET_FILE_ENV: &str = "WALLET_FILE";

/// Default wallet record path, relative to the working directory.
pub const DEFAULT_WALLET_FILE: &str = "./wallet.json";

pub const REQUEST_TIMEOUT_MS_ENV: &str = "REQUEST_TIMEOUT_MS";
pub const POLL_BLOCKS_MS_ENV: &str = "POLL_BLOCKS_MS";
pub const POLL_MEMPOOL_MS_ENV: &str = "POLL_MEMPOOL_MS";
pub const POLL_BALANCE_MS_ENV: &str = "POLL_BALANCE_MS";
pub const BALANCE_CACHE_CAPACITY_ENV: &str = "BALANCE_CACHE_CAPACITY";

/// Environment variable name for the log output format.
///
/// `json` emits one JSON object per event; anything else is human-readable.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default `RUST_LOG` filter.
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}

/// Settings for one client session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub rpc_base_url: String,
    pub wallet_file: PathBuf,
    pub request_timeout: Duration,
    pub poll_intervals: PollIntervals,
    pub balance_cache_capacity: usize,
    pub log_format: LogFormat,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rpc_base_url: DEFAULT_RPC_URL.to_string(),
            wallet_file: PathBuf::from(DEFAULT_WALLET_FILE),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_intervals: PollIntervals::default(),
            balance_cache_capacity: DEFAULT_BALANCE_CAPACITY,
            log_format: LogFormat::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = Env(&lookup);
        Self {
            rpc_base_url: env.string_or(RPC_BASE_URL_ENV, DEFAULT_RPC_URL),
            wallet_file: PathBuf::from(env.string_or(WALLET_FILE_ENV, DEFAULT_WALLET_FILE)),
            request_timeout: env.millis_or(REQUEST_TIMEOUT_MS_ENV, DEFAULT_REQUEST_TIMEOUT),
            poll_intervals: PollIntervals {
                blocks: env.millis_or(POLL_BLOCKS_MS_ENV, DEFAULT_BLOCKS_INTERVAL),
                mempool: env.millis_or(POLL_MEMPOOL_MS_ENV, DEFAULT_MEMPOOL_INTERVAL),
                balance: env.millis_or(POLL_BALANCE_MS_ENV, DEFAULT_BALANCE_INTERVAL),
            },
            balance_cache_capacity: env
                .nonzero_or::<usize>(BALANCE_CACHE_CAPACITY_ENV, DEFAULT_BALANCE_CAPACITY),
            log_format: env.parsed_or(LOG_FORMAT_ENV, LogFormat::default()),
        }
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn non_blank(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string_or(&self, name: &str, default: &str) -> String {
        self.non_blank(name).unwrap_or_else(|| default.to_string())
    }

    fn parsed_or<T: FromStr>(&self, name: &str, default: T) -> T {
        self.parsed_where(name, default, |_| true)
    }

    /// Like `parsed_or`, rejecting zero.
    fn nonzero_or<T>(&self, name: &str, default: T) -> T
    where
        T: FromStr + PartialEq + Default,
    {
        self.parsed_where(name, default, |value| *value != T::default())
    }

    fn parsed_where<T: FromStr>(&self, name: &str, default: T, valid: impl Fn(&T) -> bool) -> T {
        let Some(raw) = self.non_blank(name) else {
            return default;
        };
        match raw.parse::<T>() {
            Ok(value) if valid(&value) => value,
            _ => {
                warn!(variable = name, value = %raw, "Ignoring invalid value, using default");
                default
            }
        }
    }

    fn millis_or(&self, name: &str, default: Duration) -> Duration {
        let millis = self.nonzero_or::<u64>(name, default.as_millis() as u64);
        Duration::from_millis(millis)
    }
}
