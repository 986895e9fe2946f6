// SPDX-License-Identifier: GPL-3.0

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading node configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// The configuration file could not be read.
	#[error("Failed to read config file {path}: {source}")]
	Read {
		/// The path that was read.
		path: PathBuf,
		/// The underlying I/O error.
		source: std::io::Error,
	},

	/// The configuration file is not valid TOML or has unexpected fields.
	#[error("Invalid config: {0}")]
	Parse(#[from] toml::de::Error),

	/// Forking is enabled but no upstream URL was configured.
	#[error("Forking is enabled but no fork URL is configured")]
	MissingForkUrl,

	/// The retry policy would never issue a request.
	#[error("Retry max-attempts must be at least 1")]
	InvalidRetryPolicy,
}
