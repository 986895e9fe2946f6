// SPDX-License-Identifier: GPL-3.0

use crate::error::{OverlayError, RpcClientError};
use alloy_primitives::B256;
use thiserror::Error;

/// Errors that can occur when reading or writing fork state.
#[derive(Debug, Clone, Error)]
pub enum ForkError {
	/// RPC error while fetching remote state.
	#[error("RPC error: {0}")]
	Rpc(#[from] RpcClientError),

	/// Overlay error, e.g. a stale snapshot.
	#[error(transparent)]
	Overlay(#[from] OverlayError),

	/// The requested block lies beyond the local head.
	#[error("Block {requested} is not yet mined (head is {head})")]
	NotYetMined {
		/// The requested block number.
		requested: u64,
		/// The current local head.
		head: u64,
	},

	/// Intermediate state of locally mined blocks is not retained.
	#[error("State at local block {0} is not available")]
	UnavailableLocalState(u64),

	/// The value shape does not match the key kind.
	#[error("Cannot store a {value} value under a {key} key")]
	KindMismatch {
		/// The key kind.
		key: &'static str,
		/// The value kind.
		value: &'static str,
	},

	/// A locally inserted block does not extend the current head.
	#[error("Block {number} does not extend the local head {head}")]
	NonSequentialBlock {
		/// The number of the rejected block.
		number: u64,
		/// The current local head.
		head: u64,
	},

	/// A locally inserted block names a parent other than the current head.
	#[error("Block {number} has parent {parent}, but the local head is {head}")]
	ParentHashMismatch {
		/// The number of the rejected block.
		number: u64,
		/// The parent hash the block names.
		parent: B256,
		/// The hash of the current head.
		head: B256,
	},

	/// The head block could not be found.
	#[error("Head block {0} is missing")]
	MissingHead(u64),
}
