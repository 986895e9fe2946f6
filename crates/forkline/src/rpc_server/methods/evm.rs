// SPDX-License-Identifier: GPL-3.0

//! Snapshot and mining methods for test frameworks.

use crate::{ForkProvider, SnapshotId, rpc_server::RpcServerError};
use alloy_primitives::U64;
use jsonrpsee::{core::RpcResult, proc_macros::rpc};

/// Snapshot and mining methods.
#[rpc(server, namespace = "evm")]
pub trait EvmApi {
	/// Snapshot all local state, including mined blocks.
	#[method(name = "snapshot")]
	async fn snapshot(&self) -> RpcResult<SnapshotId>;

	/// Revert to snapshot `id`.
	///
	/// The snapshot and every snapshot taken after it are consumed.
	#[method(name = "revert")]
	async fn revert(&self, id: SnapshotId) -> RpcResult<bool>;

	/// Mine an empty block, optionally with the given timestamp.
	///
	/// Returns the number of the new block.
	#[method(name = "mine")]
	async fn mine(&self, timestamp: Option<U64>) -> RpcResult<U64>;
}

/// Implementation of `evm_*` methods.
pub struct EvmApi {
	provider: ForkProvider,
}

impl EvmApi {
	/// Create a new EvmApi instance.
	pub fn new(provider: ForkProvider) -> Self {
		Self { provider }
	}
}

#[async_trait::async_trait]
impl EvmApiServer for EvmApi {
	async fn snapshot(&self) -> RpcResult<SnapshotId> {
		let id = self.provider.checkpoint();
		log::debug!("Took {id}");
		Ok(id)
	}

	async fn revert(&self, id: SnapshotId) -> RpcResult<bool> {
		self.provider.rollback(id).map_err(RpcServerError::from)?;
		log::debug!("Reverted to {id}");
		Ok(true)
	}

	async fn mine(&self, timestamp: Option<U64>) -> RpcResult<U64> {
		let block = self
			.provider
			.mine_block(timestamp.map(|t| t.to::<u64>()))
			.await
			.map_err(RpcServerError::from)?;
		Ok(block.number)
	}
}
