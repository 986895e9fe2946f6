// SPDX-License-Identifier: GPL-3.0

use crate::error::RpcClientError;
use thiserror::Error;

/// Errors that can occur while resolving the block a session is forked from.
#[derive(Debug, Error)]
pub enum BlockPinError {
	/// The upstream could not be reached or refused to answer.
	#[error("RPC error: {0}")]
	Rpc(#[from] RpcClientError),

	/// The upstream does not know the requested block.
	#[error("Block {0} not found on the remote chain")]
	BlockNotFound(u64),
}
