// SPDX-License-Identifier: GPL-3.0

//! Standard `eth_*` queries.
//!
//! Account queries accept an optional block tag that defaults to `latest`. Unknown blocks,
//! transactions and receipts are answered with `null`.

use crate::{
	ForkProvider,
	rpc_server::RpcServerError,
	types::{BlockId, BlockRecord, BlockTag, ReceiptRecord, TransactionRecord},
};
use alloy_primitives::{Address, B256, Bytes, U64, U256};
use jsonrpsee::{core::RpcResult, proc_macros::rpc};

/// Standard chain and state queries.
#[rpc(server, namespace = "eth")]
pub trait EthApi {
	/// Chain id advertised by the node.
	#[method(name = "chainId")]
	async fn chain_id(&self) -> RpcResult<U64>;

	/// Height of the newest block.
	#[method(name = "blockNumber")]
	async fn block_number(&self) -> RpcResult<U64>;

	/// Balance of `address`, in wei.
	#[method(name = "getBalance")]
	async fn get_balance(&self, address: Address, block: Option<BlockTag>) -> RpcResult<U256>;

	/// Deployed code of `address`.
	#[method(name = "getCode")]
	async fn get_code(&self, address: Address, block: Option<BlockTag>) -> RpcResult<Bytes>;

	/// Nonce of `address`.
	#[method(name = "getTransactionCount")]
	async fn get_transaction_count(
		&self,
		address: Address,
		block: Option<BlockTag>,
	) -> RpcResult<U64>;

	/// Value of storage `slot` of `address`, as a 32-byte word.
	#[method(name = "getStorageAt")]
	async fn get_storage_at(
		&self,
		address: Address,
		slot: U256,
		block: Option<BlockTag>,
	) -> RpcResult<B256>;

	/// Get a block by height or tag.
	#[method(name = "getBlockByNumber")]
	async fn get_block_by_number(
		&self,
		block: BlockTag,
		full: Option<bool>,
	) -> RpcResult<Option<BlockRecord>>;

	/// Get a block by hash.
	#[method(name = "getBlockByHash")]
	async fn get_block_by_hash(
		&self,
		hash: B256,
		full: Option<bool>,
	) -> RpcResult<Option<BlockRecord>>;

	/// Get a transaction by hash.
	#[method(name = "getTransactionByHash")]
	async fn get_transaction_by_hash(&self, hash: B256) -> RpcResult<Option<TransactionRecord>>;

	/// Get the receipt of a mined transaction.
	#[method(name = "getTransactionReceipt")]
	async fn get_transaction_receipt(&self, hash: B256) -> RpcResult<Option<ReceiptRecord>>;
}

/// Implementation of `eth_*` queries.
pub struct EthApi {
	provider: ForkProvider,
}

impl EthApi {
	/// Create a new EthApi instance.
	pub fn new(provider: ForkProvider) -> Self {
		Self { provider }
	}
}

#[async_trait::async_trait]
impl EthApiServer for EthApi {
	async fn chain_id(&self) -> RpcResult<U64> {
		Ok(U64::from(self.provider.chain_id()))
	}

	async fn block_number(&self) -> RpcResult<U64> {
		Ok(U64::from(self.provider.head_number()))
	}

	async fn get_balance(&self, address: Address, block: Option<BlockTag>) -> RpcResult<U256> {
		let balance = self
			.provider
			.balance(address, block.unwrap_or_default())
			.await
			.map_err(RpcServerError::from)?;
		Ok(balance)
	}

	async fn get_code(&self, address: Address, block: Option<BlockTag>) -> RpcResult<Bytes> {
		let code = self
			.provider
			.code(address, block.unwrap_or_default())
			.await
			.map_err(RpcServerError::from)?;
		Ok(code)
	}

	async fn get_transaction_count(
		&self,
		address: Address,
		block: Option<BlockTag>,
	) -> RpcResult<U64> {
		let nonce = self
			.provider
			.nonce(address, block.unwrap_or_default())
			.await
			.map_err(RpcServerError::from)?;
		Ok(U64::from(nonce))
	}

	async fn get_storage_at(
		&self,
		address: Address,
		slot: U256,
		block: Option<BlockTag>,
	) -> RpcResult<B256> {
		let value = self
			.provider
			.storage(address, slot, block.unwrap_or_default())
			.await
			.map_err(RpcServerError::from)?;
		Ok(B256::from(value.to_be_bytes::<32>()))
	}

	async fn get_block_by_number(
		&self,
		block: BlockTag,
		full: Option<bool>,
	) -> RpcResult<Option<BlockRecord>> {
		// Tags past the head (pending) resolve to the head itself.
		let number = block.number_at(self.provider.head_number());
		let block = self
			.provider
			.get_block(BlockId::Number(number), full.unwrap_or(false))
			.await
			.map_err(RpcServerError::from)?;
		Ok(block)
	}

	async fn get_block_by_hash(
		&self,
		hash: B256,
		full: Option<bool>,
	) -> RpcResult<Option<BlockRecord>> {
		let block = self
			.provider
			.get_block(BlockId::Hash(hash), full.unwrap_or(false))
			.await
			.map_err(RpcServerError::from)?;
		Ok(block)
	}

	async fn get_transaction_by_hash(&self, hash: B256) -> RpcResult<Option<TransactionRecord>> {
		Ok(self.provider.get_transaction(hash).await.map_err(RpcServerError::from)?)
	}

	async fn get_transaction_receipt(&self, hash: B256) -> RpcResult<Option<ReceiptRecord>> {
		Ok(self.provider.get_receipt(hash).await.map_err(RpcServerError::from)?)
	}
}
