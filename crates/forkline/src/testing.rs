// SPDX-License-Identifier: GPL-3.0

//! Shared testing utilities.
//!
//! [`MockRemote`] is a programmable [`RemoteSource`] that records every fetch, so tests can
//! assert exactly when the fork goes upstream. Blocks are synthesized on demand: block `n`
//! has hash `keccak256(n)` and exists for every `n` up to the configured tip.

use crate::{
	error::RpcClientError,
	remote::RemoteSource,
	types::{BlockId, BlockRecord, ReceiptRecord, StateKey, StateValue, TransactionRecord},
};
use alloy_primitives::{B256, U64, keccak256};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Map;
use std::{
	collections::{HashMap, VecDeque},
	time::Duration,
};

/// Chain id of the Sepolia testnet.
pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;

/// Timestamp of block zero on the mock chain.
const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

/// Seconds between mock blocks.
const BLOCK_TIME: u64 = 12;

#[derive(Default)]
struct MockState {
	values: HashMap<StateKey, StateValue>,
	historical: HashMap<(StateKey, u64), StateValue>,
	transactions: HashMap<B256, TransactionRecord>,
	receipts: HashMap<B256, ReceiptRecord>,
	blocks_by_hash: HashMap<B256, u64>,
	failures: VecDeque<RpcClientError>,
	latency: Option<Duration>,
	fetches: Vec<(StateKey, u64)>,
}

/// In-memory remote chain for tests.
pub struct MockRemote {
	chain_id: u64,
	tip: u64,
	state: Mutex<MockState>,
}

impl MockRemote {
	/// Create a mock chain with blocks `0..=tip`.
	pub fn new(chain_id: u64, tip: u64) -> Self {
		let remote = Self { chain_id, tip, state: Mutex::new(MockState::default()) };
		remote.register_block(tip);
		remote
	}

	/// Create a mock Sepolia chain with blocks `0..=tip`.
	pub fn sepolia(tip: u64) -> Self {
		Self::new(SEPOLIA_CHAIN_ID, tip)
	}

	/// Hash of mock block `number`.
	pub fn block_hash(number: u64) -> B256 {
		keccak256(number.to_be_bytes())
	}

	/// Mock block `number`.
	pub fn block(number: u64) -> BlockRecord {
		let parent = number.checked_sub(1).map(Self::block_hash).unwrap_or(B256::ZERO);
		BlockRecord::new(
			number,
			Self::block_hash(number),
			parent,
			GENESIS_TIMESTAMP + number * BLOCK_TIME,
		)
	}

	/// The mock chain's tip.
	pub fn tip(&self) -> u64 {
		self.tip
	}

	/// Make block `number` resolvable by hash.
	pub fn register_block(&self, number: u64) -> B256 {
		let hash = Self::block_hash(number);
		self.state.lock().blocks_by_hash.insert(hash, number);
		hash
	}

	/// Set the value of `key` at every height.
	pub fn set(&self, key: StateKey, value: StateValue) {
		self.state.lock().values.insert(key, value);
	}

	/// Set the value of `key` at height `at` only.
	pub fn set_at(&self, key: StateKey, at: u64, value: StateValue) {
		self.state.lock().historical.insert((key, at), value);
	}

	/// Add a transaction mined in `block_number`, or pending for `None`.
	///
	/// Mined transactions also get a receipt.
	pub fn add_transaction(&self, hash: B256, block_number: Option<u64>) -> TransactionRecord {
		let tx = TransactionRecord {
			hash,
			block_hash: block_number.map(Self::block_hash),
			block_number: block_number.map(U64::from),
			extra: Map::new(),
		};
		let mut state = self.state.lock();
		state.transactions.insert(hash, tx.clone());
		if block_number.is_some() {
			state.receipts.insert(
				hash,
				ReceiptRecord {
					transaction_hash: hash,
					block_hash: tx.block_hash,
					block_number: tx.block_number,
					extra: Map::new(),
				},
			);
		}
		tx
	}

	/// Fail the next request with `error`. Queued failures are used in order.
	pub fn fail_next(&self, error: RpcClientError) {
		self.state.lock().failures.push_back(error);
	}

	/// Delay every answer by `latency`.
	pub fn set_latency(&self, latency: Duration) {
		self.state.lock().latency = Some(latency);
	}

	/// Every `fetch` call so far, in order.
	pub fn fetches(&self) -> Vec<(StateKey, u64)> {
		self.state.lock().fetches.clone()
	}

	/// Number of `fetch` calls so far.
	pub fn fetch_count(&self) -> usize {
		self.state.lock().fetches.len()
	}

	/// Number of `fetch` calls for `key`, at any height.
	pub fn fetches_of(&self, key: &StateKey) -> usize {
		self.state.lock().fetches.iter().filter(|(fetched, _)| fetched == key).count()
	}

	async fn answer(&self) -> Result<(), RpcClientError> {
		let (latency, failure) = {
			let mut state = self.state.lock();
			(state.latency, state.failures.pop_front())
		};
		if let Some(latency) = latency {
			tokio::time::sleep(latency).await;
		}
		failure.map_or(Ok(()), Err)
	}

	fn block_at(&self, number: u64) -> Option<BlockRecord> {
		(number <= self.tip).then(|| {
			self.register_block(number);
			Self::block(number)
		})
	}

	fn lookup(&self, key: &StateKey, at: u64) -> Option<StateValue> {
		match *key {
			StateKey::BlockHeader(BlockId::Number(number)) | StateKey::BlockByNumber(number) =>
				self.block_at(number).map(StateValue::Block),
			StateKey::BlockHeader(BlockId::Hash(hash)) => {
				let number = self.state.lock().blocks_by_hash.get(&hash).copied()?;
				self.block_at(number).map(StateValue::Block)
			},
			StateKey::TransactionByHash(hash) =>
				self.state.lock().transactions.get(&hash).cloned().map(StateValue::Transaction),
			StateKey::TransactionReceipt(hash) =>
				self.state.lock().receipts.get(&hash).cloned().map(StateValue::Receipt),
			_ => {
				let state = self.state.lock();
				state.historical.get(&(*key, at)).or_else(|| state.values.get(key)).cloned()
			},
		}
	}
}

#[async_trait]
impl RemoteSource for MockRemote {
	async fn chain_id(&self) -> Result<u64, RpcClientError> {
		self.answer().await?;
		Ok(self.chain_id)
	}

	async fn latest_block(&self) -> Result<BlockRecord, RpcClientError> {
		self.answer().await?;
		Ok(Self::block(self.tip))
	}

	async fn fetch(&self, key: &StateKey, at: u64) -> Result<Option<StateValue>, RpcClientError> {
		self.state.lock().fetches.push((*key, at));
		self.answer().await?;
		Ok(self.lookup(key, at))
	}
}
