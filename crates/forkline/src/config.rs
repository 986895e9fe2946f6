// SPDX-License-Identifier: GPL-3.0

//! Node configuration.
//!
//! A node is configured from a TOML file shaped after the Hardhat network settings:
//!
//! ```toml
//! chain-id = 11155111
//!
//! [forking]
//! url = "https://eth-sepolia.g.alchemy.com/v2/<token>"
//! enabled = true
//! block-number = 1000000
//!
//! [server]
//! port = 8545
//! ```
//!
//! Without a `[forking]` table, or with `enabled = false`, the node runs a purely local
//! chain.

use crate::{error::ConfigError, retry::Backoff, rpc::ClientOptions};
use serde::{Deserialize, Serialize};
use std::{
	net::{IpAddr, Ipv4Addr},
	num::NonZeroUsize,
	path::Path,
	time::Duration,
};
use url::Url;

/// Chain id of a local chain when none is configured.
pub const DEFAULT_CHAIN_ID: u64 = 31337;

/// Default port of the JSON-RPC server.
pub const DEFAULT_PORT: u16 = 8545;

/// Default maximum number of concurrent RPC connections.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 100;

/// Default timeout of one upstream request, in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

fn enabled_by_default() -> bool {
	true
}

fn default_request_timeout_ms() -> u64 {
	DEFAULT_REQUEST_TIMEOUT_MS
}

/// Complete node configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct NodeConfig {
	/// Chain id advertised to clients. Defaults to the remote's id when forking and to
	/// [`DEFAULT_CHAIN_ID`] otherwise.
	#[serde(default)]
	pub chain_id: Option<u64>,
	/// Upstream chain to fork.
	#[serde(default)]
	pub forking: Option<ForkingConfig>,
	/// JSON-RPC server settings.
	#[serde(default)]
	pub server: ServerConfig,
}

/// Upstream fork settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ForkingConfig {
	/// JSON-RPC endpoint of the remote chain. May embed an access token.
	#[serde(default)]
	pub url: Option<Url>,
	/// Whether to fork at all.
	#[serde(default = "enabled_by_default")]
	pub enabled: bool,
	/// Block to fork from. Defaults to the remote's latest block.
	#[serde(default)]
	pub block_number: Option<u64>,
	/// Upper bound on cached remote values. Unbounded when absent.
	#[serde(default)]
	pub max_cache_entries: Option<NonZeroUsize>,
	/// Timeout of one upstream request attempt, in milliseconds.
	#[serde(default = "default_request_timeout_ms")]
	pub request_timeout_ms: u64,
	/// Retry schedule for transient upstream failures.
	#[serde(default)]
	pub retry: Backoff,
}

impl ForkingConfig {
	/// Fork `url` at its latest block with default settings.
	pub fn new(url: Url) -> Self {
		Self {
			url: Some(url),
			enabled: true,
			block_number: None,
			max_cache_entries: None,
			request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
			retry: Backoff::default(),
		}
	}

	/// Options for the upstream RPC client.
	pub fn client_options(&self) -> ClientOptions {
		ClientOptions {
			request_timeout: Duration::from_millis(self.request_timeout_ms),
			backoff: self.retry,
		}
	}
}

/// JSON-RPC server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ServerConfig {
	/// Interface to listen on.
	pub host: IpAddr,
	/// Port to listen on. `0` picks a free port.
	pub port: u16,
	/// Maximum number of concurrent connections.
	pub max_connections: u32,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			host: IpAddr::V4(Ipv4Addr::LOCALHOST),
			port: DEFAULT_PORT,
			max_connections: DEFAULT_MAX_CONNECTIONS,
		}
	}
}

impl NodeConfig {
	/// Load and validate a configuration file.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let contents = std::fs::read_to_string(path)
			.map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
		contents.parse()
	}

	/// The fork settings, if forking is enabled.
	pub fn active_fork(&self) -> Option<&ForkingConfig> {
		self.forking.as_ref().filter(|forking| forking.enabled)
	}

	/// Check settings that TOML alone cannot express.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if let Some(forking) = self.active_fork() {
			if forking.url.is_none() {
				return Err(ConfigError::MissingForkUrl);
			}
			if forking.retry.max_attempts == 0 {
				return Err(ConfigError::InvalidRetryPolicy);
			}
		}
		Ok(())
	}
}

impl std::str::FromStr for NodeConfig {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let config: NodeConfig = toml::from_str(s)?;
		config.validate()?;
		Ok(config)
	}
}
