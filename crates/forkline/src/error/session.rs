// SPDX-License-Identifier: GPL-3.0

use crate::{
	BlockPin,
	error::{BlockPinError, ConfigError, ForkError, RpcClientError},
};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when starting a session or moving its state around.
#[derive(Debug, Error)]
pub enum SessionError {
	/// Invalid configuration.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// The upstream client could not be created.
	#[error(transparent)]
	Rpc(#[from] RpcClientError),

	/// The fork point could not be resolved.
	#[error("Failed to resolve fork point: {0}")]
	Pin(#[from] BlockPinError),

	/// Fork provider error.
	#[error(transparent)]
	Fork(#[from] ForkError),

	/// Exported state belongs to a different fork point.
	#[error("State was exported from {exported} but this session is pinned to {current}")]
	PinMismatch {
		/// The pin recorded in the exported state.
		exported: BlockPin,
		/// The pin of the running session.
		current: BlockPin,
	},

	/// State could not be encoded or decoded.
	#[error("Invalid state document: {0}")]
	Serde(#[from] serde_json::Error),

	/// State file could not be read or written.
	#[error("Failed to access state file {path}: {source}")]
	Io {
		/// The state file path.
		path: PathBuf,
		/// The underlying I/O error.
		source: std::io::Error,
	},
}
