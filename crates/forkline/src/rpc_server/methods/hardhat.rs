// SPDX-License-Identifier: GPL-3.0

//! Account overrides and node metadata, as exposed by Hardhat Network.
//!
//! Overrides are local writes: they shadow the forked value until reverted and are never
//! sent upstream.

use crate::{
	ForkProvider,
	rpc_server::RpcServerError,
	types::{StateKey, StateValue},
};
use alloy_primitives::{Address, B256, Bytes, U64, U256};
use jsonrpsee::{core::RpcResult, proc_macros::rpc};
use serde::{Deserialize, Serialize};

/// Account overrides and node metadata.
#[rpc(server, namespace = "hardhat")]
pub trait HardhatApi {
	/// Set the balance of `address`.
	#[method(name = "setBalance")]
	async fn set_balance(&self, address: Address, balance: U256) -> RpcResult<bool>;

	/// Replace the code of `address`.
	#[method(name = "setCode")]
	async fn set_code(&self, address: Address, code: Bytes) -> RpcResult<bool>;

	/// Set the nonce of `address`.
	#[method(name = "setNonce")]
	async fn set_nonce(&self, address: Address, nonce: U64) -> RpcResult<bool>;

	/// Write a 32-byte word to storage `slot` of `address`.
	#[method(name = "setStorageAt")]
	async fn set_storage_at(&self, address: Address, slot: U256, value: B256) -> RpcResult<bool>;

	/// Describe the node and the chain it forks.
	#[method(name = "metadata")]
	async fn metadata(&self) -> RpcResult<HardhatMetadata>;
}

/// Result of `hardhat_metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardhatMetadata {
	/// Chain id advertised by the node.
	pub chain_id: u64,
	/// Height of the newest block.
	pub latest_block_number: u64,
	/// Hash of the newest block.
	pub latest_block_hash: B256,
	/// The forked chain, absent for a local chain.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub forked_network: Option<ForkedNetwork>,
}

/// The chain a node forks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkedNetwork {
	/// Chain id of the forked chain.
	pub chain_id: u64,
	/// Height the fork is pinned to.
	pub fork_block_number: u64,
	/// Hash of the pinned block.
	pub fork_block_hash: B256,
}

/// Implementation of `hardhat_*` methods.
pub struct HardhatApi {
	provider: ForkProvider,
}

impl HardhatApi {
	/// Create a new HardhatApi instance.
	pub fn new(provider: ForkProvider) -> Self {
		Self { provider }
	}

	fn set(&self, key: StateKey, value: StateValue) -> RpcResult<bool> {
		log::debug!("Overriding {key}");
		self.provider.write(key, value).map_err(RpcServerError::from)?;
		Ok(true)
	}
}

#[async_trait::async_trait]
impl HardhatApiServer for HardhatApi {
	async fn set_balance(&self, address: Address, balance: U256) -> RpcResult<bool> {
		self.set(StateKey::AccountBalance(address), StateValue::Balance(balance))
	}

	async fn set_code(&self, address: Address, code: Bytes) -> RpcResult<bool> {
		self.set(StateKey::AccountCode(address), StateValue::Code(code))
	}

	async fn set_nonce(&self, address: Address, nonce: U64) -> RpcResult<bool> {
		self.set(StateKey::AccountNonce(address), StateValue::Nonce(nonce.to::<u64>()))
	}

	async fn set_storage_at(&self, address: Address, slot: U256, value: B256) -> RpcResult<bool> {
		self.set(
			StateKey::StorageSlot(address, slot),
			StateValue::Storage(U256::from_be_bytes(value.0)),
		)
	}

	async fn metadata(&self) -> RpcResult<HardhatMetadata> {
		let head = self.provider.head_block().await.map_err(RpcServerError::from)?;
		let pin = self.provider.pin();
		let forked_network = self.provider.is_forked().then(|| ForkedNetwork {
			chain_id: pin.chain_id,
			fork_block_number: pin.number,
			fork_block_hash: pin.hash,
		});
		Ok(HardhatMetadata {
			chain_id: self.provider.chain_id(),
			latest_block_number: head.number(),
			latest_block_hash: head.hash,
			forked_network,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		ForkSession, SessionOptions,
		testing::{MockRemote, SEPOLIA_CHAIN_ID},
		types::BlockTag,
	};
	use std::sync::Arc;

	const PIN: u64 = 1_000_000;

	#[tokio::test]
	async fn overrides_shadow_remote_state() {
		let remote = Arc::new(MockRemote::sepolia(PIN));
		let address = Address::repeat_byte(0xaa);
		remote.set(StateKey::AccountBalance(address), StateValue::Balance(U256::from(500)));
		let session = ForkSession::fork(remote.clone(), SessionOptions::at(PIN)).await.unwrap();
		let api = HardhatApi::new(session.provider().clone());
		let before = remote.fetch_count();

		assert!(api.set_balance(address, U256::from(7)).await.unwrap());
		assert!(api.set_nonce(address, U64::from(3)).await.unwrap());
		assert!(api.set_storage_at(address, U256::ZERO, B256::with_last_byte(9)).await.unwrap());

		let provider = session.provider();
		assert_eq!(provider.balance(address, BlockTag::Latest).await.unwrap(), U256::from(7));
		assert_eq!(provider.nonce(address, BlockTag::Latest).await.unwrap(), 3);
		assert_eq!(
			provider.storage(address, U256::ZERO, BlockTag::Latest).await.unwrap(),
			U256::from(9)
		);
		assert_eq!(remote.fetch_count(), before);
	}

	#[tokio::test]
	async fn metadata_describes_fork() {
		let remote = Arc::new(MockRemote::sepolia(PIN + 10));
		let session = ForkSession::fork(remote, SessionOptions::at(PIN)).await.unwrap();
		let api = HardhatApi::new(session.provider().clone());

		let metadata = api.metadata().await.unwrap();

		assert_eq!(metadata.chain_id, SEPOLIA_CHAIN_ID);
		assert_eq!(metadata.latest_block_number, PIN);
		assert_eq!(
			metadata.forked_network,
			Some(ForkedNetwork {
				chain_id: SEPOLIA_CHAIN_ID,
				fork_block_number: PIN,
				fork_block_hash: MockRemote::block_hash(PIN),
			})
		);
	}

	#[tokio::test]
	async fn local_metadata_has_no_fork() {
		let session = ForkSession::local(31337);
		let api = HardhatApi::new(session.provider().clone());

		let metadata = api.metadata().await.unwrap();

		assert_eq!(metadata.chain_id, 31337);
		assert_eq!(metadata.latest_block_number, 0);
		assert!(metadata.forked_network.is_none());
	}
}
