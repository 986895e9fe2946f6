// SPDX-License-Identifier: GPL-3.0

//! The forked state, as seen by the node.
//!
//! [`ForkProvider`] composes the [`BlockPin`], the [`SnapshotCache`], the [`LocalOverlay`]
//! and the [`RemoteSource`] into one state interface:
//!
//! ```text
//!  read(key) ──► LocalOverlay ── value / tombstone ──────────────────────► answer
//!                     │ absent
//!                     ▼
//!               SnapshotCache ── hit ───────────────────────────────────► answer
//!                     │ miss
//!                     ▼
//!               RemoteSource.fetch(key, pin) ──► store in cache ──────► answer
//! ```
//!
//! Writes only ever reach the overlay. Blocks numbered above the pin are never requested
//! from the remote: they exist only if they were produced locally. Remote records that lie
//! beyond the pin (later blocks, transactions mined after the pin, pending transactions)
//! are treated as absent.

use crate::{
	BlockPin, LocalOverlay, SnapshotCache, SnapshotId,
	error::{ForkError, RpcClientError},
	overlay::OverlayLookup,
	remote::RemoteSource,
	types::{
		BlockId, BlockRecord, BlockTag, BlockTransactions, ReceiptRecord, StateKey, StateValue,
		TransactionRecord,
	},
};
use alloy_primitives::{Address, B256, Bytes, U256};
use std::{
	num::NonZeroUsize,
	sync::Arc,
	time::{SystemTime, UNIX_EPOCH},
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// State access for a forked (or purely local) chain.
///
/// Cloning is cheap; clones share cache, overlay and cancellation.
#[derive(Clone)]
pub struct ForkProvider {
	pin: BlockPin,
	cache: SnapshotCache,
	overlay: LocalOverlay,
	remote: Option<Arc<dyn RemoteSource>>,
	shutdown: CancellationToken,
	// Serializes block production so two blocks cannot claim the same height.
	block_production: Arc<Mutex<()>>,
}

impl ForkProvider {
	/// Create a provider over `remote`, pinned to `pin`.
	///
	/// Without a remote the provider serves local state only.
	pub fn new(
		pin: BlockPin,
		remote: Option<Arc<dyn RemoteSource>>,
		max_cache_entries: Option<NonZeroUsize>,
		shutdown: CancellationToken,
	) -> Self {
		Self {
			pin,
			cache: SnapshotCache::with_capacity(pin, max_cache_entries),
			overlay: LocalOverlay::new(),
			remote,
			shutdown,
			block_production: Arc::new(Mutex::new(())),
		}
	}

	/// The fork point.
	pub fn pin(&self) -> BlockPin {
		self.pin
	}

	/// Chain id advertised to clients.
	pub fn chain_id(&self) -> u64 {
		self.pin.chain_id
	}

	/// Whether reads can fall through to a remote chain.
	pub fn is_forked(&self) -> bool {
		self.remote.is_some()
	}

	/// The remote read cache.
	pub fn cache(&self) -> &SnapshotCache {
		&self.cache
	}

	/// The local write layer.
	pub fn overlay(&self) -> &LocalOverlay {
		&self.overlay
	}

	/// Height of the newest block, local or pinned.
	pub fn head_number(&self) -> u64 {
		self.overlay.head().unwrap_or(self.pin.number)
	}

	/// Read the current value of `key`.
	///
	/// Looks at the overlay first, then the cache, then the remote at the pin.
	pub async fn read(&self, key: &StateKey) -> Result<Option<StateValue>, ForkError> {
		self.lookup(key, self.pin.number, true).await
	}

	/// Read account state as of `block`.
	///
	/// History keys do not depend on height and are read as with [`Self::read`].
	pub async fn read_at(
		&self,
		key: &StateKey,
		block: BlockTag,
	) -> Result<Option<StateValue>, ForkError> {
		if !key.is_account_state() || block.is_head() {
			return self.read(key).await;
		}

		let head = self.head_number();
		let number = block.number_at(head);
		if number > head {
			return Err(ForkError::NotYetMined { requested: number, head });
		}
		if number == head {
			return self.read(key).await;
		}
		if number > self.pin.number {
			return Err(ForkError::UnavailableLocalState(number));
		}
		// At or below the pin, local writes are not part of the state.
		self.lookup(key, number, false).await
	}

	/// Write `value` under `key`.
	pub fn write(&self, key: StateKey, value: StateValue) -> Result<(), ForkError> {
		if !key.accepts(&value) {
			return Err(ForkError::KindMismatch { key: key.kind(), value: value.kind() });
		}
		self.overlay.put(key, value);
		Ok(())
	}

	/// Delete `key`, hiding any remote value.
	pub fn delete(&self, key: StateKey) {
		self.overlay.delete(key);
	}

	/// Snapshot local state.
	pub fn checkpoint(&self) -> SnapshotId {
		self.overlay.snapshot()
	}

	/// Roll local state back to snapshot `id`.
	pub fn rollback(&self, id: SnapshotId) -> Result<(), ForkError> {
		Ok(self.overlay.revert_to(id)?)
	}

	/// Balance of `address` as of `block`. Unknown accounts have a zero balance.
	pub async fn balance(&self, address: Address, block: BlockTag) -> Result<U256, ForkError> {
		match self.read_at(&StateKey::AccountBalance(address), block).await? {
			Some(StateValue::Balance(balance)) => Ok(balance),
			_ => Ok(U256::ZERO),
		}
	}

	/// Code of `address` as of `block`. Unknown accounts have no code.
	pub async fn code(&self, address: Address, block: BlockTag) -> Result<Bytes, ForkError> {
		match self.read_at(&StateKey::AccountCode(address), block).await? {
			Some(StateValue::Code(code)) => Ok(code),
			_ => Ok(Bytes::new()),
		}
	}

	/// Nonce of `address` as of `block`. Unknown accounts have nonce zero.
	pub async fn nonce(&self, address: Address, block: BlockTag) -> Result<u64, ForkError> {
		match self.read_at(&StateKey::AccountNonce(address), block).await? {
			Some(StateValue::Nonce(nonce)) => Ok(nonce),
			_ => Ok(0),
		}
	}

	/// Storage `slot` of `address` as of `block`. Unset slots read as zero.
	pub async fn storage(
		&self,
		address: Address,
		slot: U256,
		block: BlockTag,
	) -> Result<U256, ForkError> {
		match self.read_at(&StateKey::StorageSlot(address, slot), block).await? {
			Some(StateValue::Storage(value)) => Ok(value),
			_ => Ok(U256::ZERO),
		}
	}

	/// Get a block by height or hash.
	///
	/// With `full` set, transactions are returned as objects.
	pub async fn get_block(
		&self,
		id: BlockId,
		full: bool,
	) -> Result<Option<BlockRecord>, ForkError> {
		let key = match (id, full) {
			(id, false) => StateKey::BlockHeader(id),
			(BlockId::Number(number), true) => StateKey::BlockByNumber(number),
			(BlockId::Hash(hash), true) => {
				let header_key = StateKey::BlockHeader(BlockId::Hash(hash));
				let Some(header) = self.block_record(header_key).await? else {
					return Ok(None);
				};
				StateKey::BlockByNumber(header.number())
			},
		};
		self.block_record(key).await
	}

	/// Get a transaction by hash.
	pub async fn get_transaction(
		&self,
		hash: B256,
	) -> Result<Option<TransactionRecord>, ForkError> {
		match self.read(&StateKey::TransactionByHash(hash)).await? {
			Some(StateValue::Transaction(tx)) => Ok(Some(tx)),
			_ => Ok(None),
		}
	}

	/// Get the receipt of a transaction.
	pub async fn get_receipt(&self, hash: B256) -> Result<Option<ReceiptRecord>, ForkError> {
		match self.read(&StateKey::TransactionReceipt(hash)).await? {
			Some(StateValue::Receipt(receipt)) => Ok(Some(receipt)),
			_ => Ok(None),
		}
	}

	/// The newest block.
	pub async fn head_block(&self) -> Result<BlockRecord, ForkError> {
		let head = self.head_number();
		self.get_block(BlockId::Number(head), false).await?.ok_or(ForkError::MissingHead(head))
	}

	/// Append a locally produced block.
	///
	/// `block.transactions` should hold full transaction objects; they and `receipts` become
	/// readable by hash. The block must extend the current head, by number and by parent
	/// hash.
	pub async fn insert_block(
		&self,
		block: BlockRecord,
		receipts: Vec<ReceiptRecord>,
	) -> Result<(), ForkError> {
		let _guard = self.block_production.lock().await;
		let head = self.head_number();
		if block.number() != head + 1 {
			return Err(ForkError::NonSequentialBlock { number: block.number(), head });
		}
		let parent = self.head_block().await?;
		if block.parent_hash != parent.hash {
			return Err(ForkError::ParentHashMismatch {
				number: block.number(),
				parent: block.parent_hash,
				head: parent.hash,
			});
		}
		self.record_block(block, receipts);
		Ok(())
	}

	/// Produce an empty block on top of the head.
	///
	/// Without a timestamp, the block is stamped with the current time, or one second after
	/// its parent if the clock is behind.
	pub async fn mine_block(&self, timestamp: Option<u64>) -> Result<BlockRecord, ForkError> {
		let _guard = self.block_production.lock().await;
		let parent = self.head_block().await?;
		let timestamp = timestamp.unwrap_or_else(|| unix_now().max(parent.timestamp() + 1));
		let mut block = BlockRecord::child_of(&parent, timestamp);
		block.transactions = BlockTransactions::Full(Vec::new());
		self.record_block(block.clone(), Vec::new());
		log::debug!("Mined block #{} ({})", block.number(), block.hash);
		Ok(block.header())
	}

	/// Record `block` and its transactions in the overlay and make it the new head.
	pub(crate) fn record_block(&self, block: BlockRecord, receipts: Vec<ReceiptRecord>) {
		let number = block.number();
		if let BlockTransactions::Full(txs) = &block.transactions {
			for tx in txs {
				self.overlay
					.put(StateKey::TransactionByHash(tx.hash), StateValue::Transaction(tx.clone()));
			}
		}
		for receipt in receipts {
			let key = StateKey::TransactionReceipt(receipt.transaction_hash);
			self.overlay.put(key, StateValue::Receipt(receipt));
		}
		let header = block.header();
		self.overlay
			.put(StateKey::BlockHeader(BlockId::Number(number)), StateValue::Block(header.clone()));
		self.overlay
			.put(StateKey::BlockHeader(BlockId::Hash(block.hash)), StateValue::Block(header));
		self.overlay.put(StateKey::BlockByNumber(number), StateValue::Block(block));
		self.overlay.set_head(number);
	}

	async fn block_record(&self, key: StateKey) -> Result<Option<BlockRecord>, ForkError> {
		match self.read(&key).await? {
			Some(StateValue::Block(block)) => Ok(Some(block)),
			_ => Ok(None),
		}
	}

	async fn lookup(
		&self,
		key: &StateKey,
		at: u64,
		include_overlay: bool,
	) -> Result<Option<StateValue>, ForkError> {
		if include_overlay {
			match self.overlay.get(key) {
				OverlayLookup::Value(value) => return Ok(Some(value)),
				OverlayLookup::Tombstone => return Ok(None),
				OverlayLookup::Absent => {},
			}
		}

		if let Some(number) = key.block_number() &&
			number > self.pin.number
		{
			log::trace!("{key} is above the fork point, not forwarding");
			return Ok(None);
		}

		let Some(remote) = &self.remote else {
			return Ok(None);
		};

		let remote = Arc::clone(remote);
		let shutdown = self.shutdown.clone();
		let pin = self.pin.number;
		let key = *key;
		let value = self
			.cache
			.get_or_fetch(key, at, move || async move {
				log::debug!("Fetching {key} at block {at}");
				tokio::select! {
					biased;
					_ = shutdown.cancelled() => Err(RpcClientError::Cancelled),
					result = remote.fetch(&key, at) =>
						result.map(|value| value.and_then(|value| value.visible_at(pin))),
				}
			})
			.await?;
		Ok(value)
	}
}

fn unix_now() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| elapsed.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		error::OverlayError,
		testing::{MockRemote, SEPOLIA_CHAIN_ID},
	};
	use alloy_primitives::U64;
	use serde_json::Map;

	const PIN: u64 = 1_000_000;

	fn forked(remote: &Arc<MockRemote>) -> ForkProvider {
		let pin = BlockPin::new(SEPOLIA_CHAIN_ID, PIN, MockRemote::block_hash(PIN));
		let remote = Arc::clone(remote) as Arc<dyn RemoteSource>;
		ForkProvider::new(pin, Some(remote), None, CancellationToken::new())
	}

	fn account(byte: u8) -> Address {
		Address::repeat_byte(byte)
	}

	#[tokio::test]
	async fn read_falls_through_to_remote_once() {
		let remote = Arc::new(MockRemote::sepolia(PIN + 10));
		let key = StateKey::AccountBalance(account(1));
		remote.set(key, StateValue::Balance(U256::from(500)));
		let provider = forked(&remote);

		assert_eq!(provider.balance(account(1), BlockTag::Latest).await.unwrap(), U256::from(500));
		assert_eq!(provider.balance(account(1), BlockTag::Latest).await.unwrap(), U256::from(500));

		assert_eq!(remote.fetches(), vec![(key, PIN)]);
	}

	#[tokio::test]
	async fn unknown_accounts_read_as_empty() {
		let remote = Arc::new(MockRemote::sepolia(PIN));
		let provider = forked(&remote);

		assert_eq!(provider.balance(account(9), BlockTag::Latest).await.unwrap(), U256::ZERO);
		assert_eq!(provider.nonce(account(9), BlockTag::Latest).await.unwrap(), 0);
		assert!(provider.code(account(9), BlockTag::Latest).await.unwrap().is_empty());
		assert_eq!(
			provider.storage(account(9), U256::from(1), BlockTag::Latest).await.unwrap(),
			U256::ZERO
		);
	}

	#[tokio::test]
	async fn write_rejects_mismatched_values() {
		let remote = Arc::new(MockRemote::sepolia(PIN));
		let provider = forked(&remote);

		let err = provider
			.write(StateKey::AccountBalance(account(1)), StateValue::Nonce(1))
			.unwrap_err();

		assert!(matches!(err, ForkError::KindMismatch { key: "balance", value: "nonce" }));
	}

	#[tokio::test]
	async fn read_at_serves_history_below_pin_without_overlay() {
		let remote = Arc::new(MockRemote::sepolia(PIN));
		let key = StateKey::AccountBalance(account(1));
		remote.set(key, StateValue::Balance(U256::from(500)));
		remote.set_at(key, PIN - 100, StateValue::Balance(U256::from(100)));
		let provider = forked(&remote);
		provider.write(key, StateValue::Balance(U256::from(1))).unwrap();

		let old = provider.read_at(&key, BlockTag::Number(PIN - 100)).await.unwrap();
		let pinned = provider.read_at(&key, BlockTag::Number(PIN)).await.unwrap();
		let latest = provider.read_at(&key, BlockTag::Latest).await.unwrap();

		assert_eq!(old, Some(StateValue::Balance(U256::from(100))));
		// With no local blocks the pin is the head, so local writes apply
		assert_eq!(pinned, Some(StateValue::Balance(U256::from(1))));
		assert_eq!(latest, Some(StateValue::Balance(U256::from(1))));
	}

	#[tokio::test]
	async fn read_at_distinguishes_pin_from_local_blocks() {
		let remote = Arc::new(MockRemote::sepolia(PIN));
		let key = StateKey::AccountBalance(account(1));
		remote.set(key, StateValue::Balance(U256::from(500)));
		let provider = forked(&remote);
		provider.write(key, StateValue::Balance(U256::from(1))).unwrap();
		provider.mine_block(None).await.unwrap();
		provider.mine_block(None).await.unwrap();

		let pinned = provider.read_at(&key, BlockTag::Number(PIN)).await.unwrap();
		assert_eq!(pinned, Some(StateValue::Balance(U256::from(500))));

		let err = provider.read_at(&key, BlockTag::Number(PIN + 1)).await.unwrap_err();
		assert!(matches!(err, ForkError::UnavailableLocalState(n) if n == PIN + 1));

		let head = provider.read_at(&key, BlockTag::Number(PIN + 2)).await.unwrap();
		assert_eq!(head, Some(StateValue::Balance(U256::from(1))));

		let err = provider.read_at(&key, BlockTag::Number(PIN + 3)).await.unwrap_err();
		assert!(matches!(
			err,
			ForkError::NotYetMined { requested, head } if requested == PIN + 3 && head == PIN + 2
		));
	}

	#[tokio::test]
	async fn blocks_above_pin_are_never_fetched() {
		let remote = Arc::new(MockRemote::sepolia(PIN + 10));
		let provider = forked(&remote);

		assert!(provider.get_block(BlockId::Number(PIN + 5), false).await.unwrap().is_none());
		assert!(provider.get_block(BlockId::Number(PIN + 5), true).await.unwrap().is_none());
		assert_eq!(remote.fetch_count(), 0);

		// The pinned block itself comes from the remote
		let pinned = provider.get_block(BlockId::Number(PIN), false).await.unwrap().unwrap();
		assert_eq!(pinned.hash, MockRemote::block_hash(PIN));
	}

	#[tokio::test]
	async fn remote_blocks_beyond_pin_are_hidden_by_hash() {
		let remote = Arc::new(MockRemote::sepolia(PIN + 10));
		let later = remote.register_block(PIN + 5);
		let provider = forked(&remote);

		assert!(provider.get_block(BlockId::Hash(later), false).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn transactions_after_pin_are_hidden() {
		let remote = Arc::new(MockRemote::sepolia(PIN + 10));
		let old = remote.add_transaction(B256::repeat_byte(1), Some(PIN - 1));
		let new = remote.add_transaction(B256::repeat_byte(2), Some(PIN + 1));
		let pending = remote.add_transaction(B256::repeat_byte(3), None);
		let provider = forked(&remote);

		assert_eq!(provider.get_transaction(old.hash).await.unwrap(), Some(old.clone()));
		assert!(provider.get_receipt(old.hash).await.unwrap().is_some());
		assert!(provider.get_transaction(new.hash).await.unwrap().is_none());
		assert!(provider.get_receipt(new.hash).await.unwrap().is_none());
		assert!(provider.get_transaction(pending.hash).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn mined_blocks_extend_head() {
		let remote = Arc::new(MockRemote::sepolia(PIN + 10));
		let provider = forked(&remote);

		let block = provider.mine_block(Some(1_800_000_000)).await.unwrap();

		assert_eq!(block.number(), PIN + 1);
		assert_eq!(block.parent_hash, MockRemote::block_hash(PIN));
		assert_eq!(provider.head_number(), PIN + 1);
		// Served from the overlay, not from the remote's own block PIN + 1
		let by_number = provider.get_block(BlockId::Number(PIN + 1), false).await.unwrap().unwrap();
		assert_eq!(by_number.hash, block.hash);
		let by_hash = provider.get_block(BlockId::Hash(block.hash), true).await.unwrap().unwrap();
		assert_eq!(by_hash.number(), PIN + 1);
		assert!(!remote.fetches().iter().any(|(key, _)| key.block_number() == Some(PIN + 1)));
	}

	#[tokio::test]
	async fn inserted_block_exposes_transactions() {
		let remote = Arc::new(MockRemote::sepolia(PIN));
		let provider = forked(&remote);
		let parent = provider.head_block().await.unwrap();
		let tx = TransactionRecord {
			hash: B256::repeat_byte(7),
			block_hash: None,
			block_number: Some(U64::from(PIN + 1)),
			extra: Map::new(),
		};
		let mut block = BlockRecord::child_of(&parent, parent.timestamp() + 12);
		block.transactions = BlockTransactions::Full(vec![tx.clone()]);
		let receipt = ReceiptRecord {
			transaction_hash: tx.hash,
			block_hash: Some(block.hash),
			block_number: Some(U64::from(PIN + 1)),
			extra: Map::new(),
		};

		provider.insert_block(block.clone(), vec![receipt.clone()]).await.unwrap();

		assert_eq!(provider.get_transaction(tx.hash).await.unwrap(), Some(tx.clone()));
		assert_eq!(provider.get_receipt(tx.hash).await.unwrap(), Some(receipt));
		let header = provider.get_block(BlockId::Number(PIN + 1), false).await.unwrap().unwrap();
		assert_eq!(header.transactions, BlockTransactions::Hashes(vec![tx.hash]));
	}

	#[tokio::test]
	async fn insert_block_requires_next_height() {
		let remote = Arc::new(MockRemote::sepolia(PIN));
		let provider = forked(&remote);

		let block = BlockRecord::new(PIN + 2, B256::repeat_byte(1), B256::ZERO, 0);

		let err = provider.insert_block(block, Vec::new()).await.unwrap_err();

		assert!(matches!(
			err,
			ForkError::NonSequentialBlock { number, head } if number == PIN + 2 && head == PIN
		));
	}

	#[tokio::test]
	async fn insert_block_requires_head_as_parent() {
		let remote = Arc::new(MockRemote::sepolia(PIN));
		let provider = forked(&remote);

		let block = BlockRecord::new(PIN + 1, B256::repeat_byte(1), B256::repeat_byte(9), 0);

		let err = provider.insert_block(block, Vec::new()).await.unwrap_err();

		assert!(matches!(
			err,
			ForkError::ParentHashMismatch { number, parent, head }
				if number == PIN + 1
					&& parent == B256::repeat_byte(9)
					&& head == MockRemote::block_hash(PIN)
		));
		assert_eq!(provider.head_number(), PIN);
	}

	#[tokio::test]
	async fn rollback_undoes_mined_blocks() {
		let remote = Arc::new(MockRemote::sepolia(PIN));
		let provider = forked(&remote);

		let id = provider.checkpoint();
		let block = provider.mine_block(None).await.unwrap();
		provider.rollback(id).unwrap();

		assert_eq!(provider.head_number(), PIN);
		assert!(provider.get_block(BlockId::Hash(block.hash), false).await.unwrap().is_none());
		assert!(matches!(
			provider.rollback(id),
			Err(ForkError::Overlay(OverlayError::StaleSnapshot(_)))
		));
	}

	#[tokio::test]
	async fn local_provider_never_goes_remote() {
		let pin = BlockPin::new(31337, 0, B256::ZERO);
		let provider = ForkProvider::new(pin, None, None, CancellationToken::new());

		assert!(!provider.is_forked());
		assert_eq!(provider.balance(account(1), BlockTag::Latest).await.unwrap(), U256::ZERO);
		assert!(provider.get_block(BlockId::Number(0), false).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn shutdown_cancels_remote_reads() {
		let remote = Arc::new(MockRemote::sepolia(PIN));
		let shutdown = CancellationToken::new();
		let pin = BlockPin::new(SEPOLIA_CHAIN_ID, PIN, MockRemote::block_hash(PIN));
		let remote = remote as Arc<dyn RemoteSource>;
		let provider = ForkProvider::new(pin, Some(remote), None, shutdown.clone());
		shutdown.cancel();

		let err = provider.read(&StateKey::AccountNonce(account(1))).await.unwrap_err();

		assert!(matches!(err, ForkError::Rpc(RpcClientError::Cancelled)));
		assert!(provider.cache().is_empty());
	}
}
