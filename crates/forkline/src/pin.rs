// SPDX-License-Identifier: GPL-3.0

//! The block a fork is anchored to.
//!
//! A [`BlockPin`] is resolved once when a session starts and never changes afterwards.
//! Every remote read of current state happens at exactly the pinned height, so the
//! forked view stays consistent while the real chain keeps moving.

use crate::{
	error::{BlockPinError, RpcClientError},
	remote::RemoteSource,
	types::{BlockId, BlockRecord, StateKey, StateValue},
};
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which remote block to fork from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ForkBlock {
	/// The remote's current tip.
	#[default]
	Latest,
	/// A specific height.
	Number(u64),
}

impl From<u64> for ForkBlock {
	fn from(number: u64) -> Self {
		ForkBlock::Number(number)
	}
}

impl From<Option<u64>> for ForkBlock {
	fn from(number: Option<u64>) -> Self {
		number.map_or(ForkBlock::Latest, ForkBlock::Number)
	}
}

/// Immutable record of the remote block a session is forked from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPin {
	/// Chain id advertised by the fork.
	pub chain_id: u64,
	/// Height of the pinned block.
	pub number: u64,
	/// Hash of the pinned block.
	pub hash: B256,
}

impl fmt::Display for BlockPin {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "block #{} ({}) of chain {}", self.number, self.hash, self.chain_id)
	}
}

impl BlockPin {
	/// Create a pin from known values.
	pub fn new(chain_id: u64, number: u64, hash: B256) -> Self {
		Self { chain_id, number, hash }
	}

	/// Resolve the fork point against `remote`.
	///
	/// When `chain_id` is given and differs from the remote's, the configured id is kept
	/// and a warning is logged. Returns the pin together with the pinned block.
	pub async fn resolve(
		requested: ForkBlock,
		chain_id: Option<u64>,
		remote: &dyn RemoteSource,
	) -> Result<(Self, BlockRecord), BlockPinError> {
		let remote_chain_id = remote.chain_id().await?;
		let chain_id = match chain_id {
			Some(configured) if configured != remote_chain_id => {
				log::warn!(
					"Configured chain id {configured} differs from the remote chain id {remote_chain_id}; advertising {configured}"
				);
				configured
			},
			_ => remote_chain_id,
		};

		let block = match requested {
			ForkBlock::Latest => remote.latest_block().await?,
			ForkBlock::Number(number) => {
				let key = StateKey::BlockHeader(BlockId::Number(number));
				match remote.fetch(&key, number).await? {
					Some(StateValue::Block(block)) => block,
					Some(other) =>
						return Err(RpcClientError::InvalidResponse(format!(
							"expected a block, got a {} value",
							other.kind()
						))
						.into()),
					None => return Err(BlockPinError::BlockNotFound(number)),
				}
			},
		};

		let pin = Self { chain_id, number: block.number(), hash: block.hash };
		log::info!("Forking from {pin}");
		Ok((pin, block))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{MockRemote, SEPOLIA_CHAIN_ID};

	#[tokio::test]
	async fn resolve_latest_uses_remote_tip() {
		let remote = MockRemote::sepolia(1_000_000);

		let (pin, block) = BlockPin::resolve(ForkBlock::Latest, None, &remote).await.unwrap();

		assert_eq!(pin.chain_id, SEPOLIA_CHAIN_ID);
		assert_eq!(pin.number, 1_000_000);
		assert_eq!(pin.hash, MockRemote::block_hash(1_000_000));
		assert_eq!(block.hash, pin.hash);
	}

	#[tokio::test]
	async fn resolve_specific_block() {
		let remote = MockRemote::sepolia(1_000_100);

		let (pin, _) = BlockPin::resolve(1_000_000.into(), None, &remote).await.unwrap();

		assert_eq!(pin.number, 1_000_000);
		assert_eq!(pin.hash, MockRemote::block_hash(1_000_000));
	}

	#[tokio::test]
	async fn resolve_unknown_block_fails() {
		let remote = MockRemote::sepolia(10);

		let err = BlockPin::resolve(11.into(), None, &remote).await.unwrap_err();

		assert!(matches!(err, BlockPinError::BlockNotFound(11)));
	}

	#[tokio::test]
	async fn configured_chain_id_wins() {
		let remote = MockRemote::sepolia(5);

		let (pin, _) = BlockPin::resolve(ForkBlock::Latest, Some(31337), &remote).await.unwrap();

		assert_eq!(pin.chain_id, 31337);
	}

	#[tokio::test]
	async fn upstream_failure_is_fatal() {
		let remote = MockRemote::sepolia(5);
		remote.fail_next(RpcClientError::UpstreamUnavailable {
			method: "eth_chainId",
			attempts: 3,
			message: "connection refused".into(),
		});

		let err = BlockPin::resolve(ForkBlock::Latest, None, &remote).await.unwrap_err();

		assert!(matches!(err, BlockPinError::Rpc(RpcClientError::UpstreamUnavailable { .. })));
	}

	#[test]
	fn fork_block_from_option() {
		assert_eq!(ForkBlock::from(None), ForkBlock::Latest);
		assert_eq!(ForkBlock::from(Some(7)), ForkBlock::Number(7));
	}
}
