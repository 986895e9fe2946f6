// SPDX-License-Identifier: GPL-3.0

//! The upstream chain, seen as a source of state.
//!
//! [`RemoteSource`] is the seam between the fork and its upstream. The fork only ever asks
//! three things of a remote: its chain id, its latest block, and the value of one
//! [`StateKey`] at one height. [`ForkRpcClient`] answers them over JSON-RPC; tests answer
//! them with [`MockRemote`](crate::testing::MockRemote).
//!
//! A remote source is read-only by construction: the trait has no way to write.

use crate::{
	ForkRpcClient,
	error::RpcClientError,
	types::{BlockId, BlockRecord, StateKey, StateValue},
};
use async_trait::async_trait;

/// Read access to the chain being forked.
#[async_trait]
pub trait RemoteSource: Send + Sync {
	/// Chain id reported by the remote.
	async fn chain_id(&self) -> Result<u64, RpcClientError>;

	/// The remote's current tip.
	async fn latest_block(&self) -> Result<BlockRecord, RpcClientError>;

	/// Fetch the value of `key` at block `at`.
	///
	/// `Ok(None)` means the remote does not know the key. History keys ignore `at`.
	async fn fetch(&self, key: &StateKey, at: u64) -> Result<Option<StateValue>, RpcClientError>;
}

#[async_trait]
impl RemoteSource for ForkRpcClient {
	async fn chain_id(&self) -> Result<u64, RpcClientError> {
		ForkRpcClient::chain_id(self).await
	}

	async fn latest_block(&self) -> Result<BlockRecord, RpcClientError> {
		ForkRpcClient::latest_block(self).await
	}

	async fn fetch(&self, key: &StateKey, at: u64) -> Result<Option<StateValue>, RpcClientError> {
		let value = match *key {
			StateKey::AccountBalance(address) =>
				Some(StateValue::Balance(self.balance(address, at).await?)),
			StateKey::AccountCode(address) => Some(StateValue::Code(self.code(address, at).await?)),
			StateKey::AccountNonce(address) =>
				Some(StateValue::Nonce(self.nonce(address, at).await?)),
			StateKey::StorageSlot(address, slot) =>
				Some(StateValue::Storage(self.storage_at(address, slot, at).await?)),
			StateKey::BlockHeader(BlockId::Number(number)) =>
				self.block_by_number(number, false).await?.map(StateValue::Block),
			StateKey::BlockHeader(BlockId::Hash(hash)) =>
				self.block_by_hash(hash, false).await?.map(StateValue::Block),
			StateKey::BlockByNumber(number) =>
				self.block_by_number(number, true).await?.map(StateValue::Block),
			StateKey::TransactionByHash(hash) =>
				self.transaction(hash).await?.map(StateValue::Transaction),
			StateKey::TransactionReceipt(hash) =>
				self.receipt(hash).await?.map(StateValue::Receipt),
		};
		Ok(value)
	}
}
