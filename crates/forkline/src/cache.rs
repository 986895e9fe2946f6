// SPDX-License-Identifier: GPL-3.0

//! Read-through cache of remote state.
//!
//! [`SnapshotCache`] remembers every value fetched from the remote, keyed by
//! ([`StateKey`], block height). Entries are never updated once stored: the remote is
//! read at a fixed pin, so a stored value is final for the session.
//!
//! Concurrent misses for the same key are coalesced. The first caller registers a shared
//! fetch; every caller that misses while it is outstanding awaits the same fetch and gets
//! the same result:
//!
//! ```text
//!  caller A ── miss ──► register fetch ──► remote ──┐
//!  caller B ── miss ──► join fetch ─────────────────┼──► store ──► A, B, C get value
//!  caller C ── miss ──► join fetch ─────────────────┘
//! ```
//!
//! A failed fetch stores nothing, so the next caller simply tries again.
//!
//! The cache is unbounded unless a capacity is given. With a capacity, the least recently
//! used entries are dropped. Outstanding fetches live outside the entry map and cannot be
//! evicted.

use crate::{BlockPin, error::RpcClientError, types::{StateKey, StateValue}};
use futures::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use parking_lot::Mutex;
use std::{
	collections::HashMap,
	future::Future,
	num::NonZeroUsize,
	sync::{
		Arc,
		atomic::{AtomicU64, Ordering},
	},
};

/// Result of one remote fetch, shared between every caller waiting for it.
pub type FetchResult = Result<Option<StateValue>, RpcClientError>;

type CacheKey = (StateKey, u64);
type InFlight = Shared<BoxFuture<'static, FetchResult>>;

/// A value fetched from the remote.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
	/// The key that was fetched.
	pub key: StateKey,
	/// The height it was fetched at.
	pub at: u64,
	/// The fetched value. `None` is a cached "not found".
	pub value: Option<StateValue>,
	/// The pin the cache belonged to when the value was fetched.
	pub fetched_at: BlockPin,
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
	/// Lookups answered from the cache.
	pub hits: u64,
	/// Lookups that started a remote fetch.
	pub misses: u64,
	/// Lookups that joined a fetch already in flight.
	pub coalesced: u64,
	/// Entries dropped to stay within capacity.
	pub evictions: u64,
	/// Entries currently stored.
	pub entries: usize,
}

struct Inner {
	pin: BlockPin,
	entries: Mutex<LruCache<CacheKey, Option<StateValue>>>,
	in_flight: Mutex<HashMap<CacheKey, InFlight>>,
	hits: AtomicU64,
	misses: AtomicU64,
	coalesced: AtomicU64,
	evictions: AtomicU64,
}

impl Inner {
	fn lookup(&self, key: &CacheKey) -> Option<Option<StateValue>> {
		self.entries.lock().get(key).cloned()
	}

	fn insert(&self, key: CacheKey, value: Option<StateValue>) -> bool {
		let mut entries = self.entries.lock();
		if entries.contains(&key) {
			return false;
		}
		if let Some((evicted, _)) = entries.push(key, value) {
			self.evictions.fetch_add(1, Ordering::Relaxed);
			log::trace!("Evicted {} at block {}", evicted.0, evicted.1);
		}
		true
	}
}

/// Read-through cache pinned to one fork point.
///
/// Cloning is cheap; clones share the same entries.
#[derive(Clone)]
pub struct SnapshotCache {
	inner: Arc<Inner>,
}

impl SnapshotCache {
	/// Create an unbounded cache for `pin`.
	pub fn new(pin: BlockPin) -> Self {
		Self::with_capacity(pin, None)
	}

	/// Create a cache for `pin` holding at most `capacity` entries, or unbounded for `None`.
	pub fn with_capacity(pin: BlockPin, capacity: Option<NonZeroUsize>) -> Self {
		let entries = match capacity {
			Some(capacity) => LruCache::new(capacity),
			None => LruCache::unbounded(),
		};
		Self {
			inner: Arc::new(Inner {
				pin,
				entries: Mutex::new(entries),
				in_flight: Mutex::new(HashMap::new()),
				hits: AtomicU64::new(0),
				misses: AtomicU64::new(0),
				coalesced: AtomicU64::new(0),
				evictions: AtomicU64::new(0),
			}),
		}
	}

	/// The pin this cache belongs to.
	pub fn pin(&self) -> BlockPin {
		self.inner.pin
	}

	/// Get a cached value.
	///
	/// Returns:
	/// - `Some(Some(value))` - the remote had a value
	/// - `Some(None)` - the remote had no value (cached as empty)
	/// - `None` - not cached
	pub fn get(&self, key: &StateKey, at: u64) -> Option<Option<StateValue>> {
		self.inner.lookup(&(*key, at))
	}

	/// Store a value.
	///
	/// Returns `false` and leaves the cache untouched if the key is already cached.
	pub fn put(&self, key: StateKey, at: u64, value: Option<StateValue>) -> bool {
		self.inner.insert((key, at), value)
	}

	/// Get a cached value, or fetch it with `fetch` on a miss.
	///
	/// At most one fetch per key is outstanding at any time. `fetch` is only called when
	/// no other caller is already fetching the key; otherwise this call waits for that
	/// fetch and returns its result.
	pub async fn get_or_fetch<F, Fut>(&self, key: StateKey, at: u64, fetch: F) -> FetchResult
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = FetchResult> + Send + 'static,
	{
		let cache_key = (key, at);
		if let Some(value) = self.inner.lookup(&cache_key) {
			self.inner.hits.fetch_add(1, Ordering::Relaxed);
			return Ok(value);
		}

		let pending = {
			let mut in_flight = self.inner.in_flight.lock();
			// A fetch stores its value before leaving the in-flight map, so a lookup under
			// the in-flight lock cannot miss a value that just landed.
			if let Some(value) = self.inner.lookup(&cache_key) {
				self.inner.hits.fetch_add(1, Ordering::Relaxed);
				return Ok(value);
			}
			match in_flight.get(&cache_key) {
				Some(pending) => {
					self.inner.coalesced.fetch_add(1, Ordering::Relaxed);
					pending.clone()
				},
				None => {
					self.inner.misses.fetch_add(1, Ordering::Relaxed);
					let inner = Arc::clone(&self.inner);
					let request = fetch();
					let pending = async move {
						let result = request.await;
						if let Ok(value) = &result {
							inner.insert(cache_key, value.clone());
						}
						inner.in_flight.lock().remove(&cache_key);
						result
					}
					.boxed()
					.shared();
					in_flight.insert(cache_key, pending.clone());
					pending
				},
			}
		};

		pending.await
	}

	/// Number of cached entries.
	pub fn len(&self) -> usize {
		self.inner.entries.lock().len()
	}

	/// Whether the cache holds no entries.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Number of fetches currently outstanding.
	pub fn in_flight(&self) -> usize {
		self.inner.in_flight.lock().len()
	}

	/// All cached entries, in no particular order.
	pub fn entries(&self) -> Vec<CacheEntry> {
		let pin = self.inner.pin;
		self.inner
			.entries
			.lock()
			.iter()
			.map(|((key, at), value)| CacheEntry {
				key: *key,
				at: *at,
				value: value.clone(),
				fetched_at: pin,
			})
			.collect()
	}

	/// Snapshot of the cache counters.
	pub fn stats(&self) -> CacheStats {
		CacheStats {
			hits: self.inner.hits.load(Ordering::Relaxed),
			misses: self.inner.misses.load(Ordering::Relaxed),
			coalesced: self.inner.coalesced.load(Ordering::Relaxed),
			evictions: self.inner.evictions.load(Ordering::Relaxed),
			entries: self.len(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{Address, B256, U256};
	use std::sync::atomic::AtomicUsize;
	use tokio::sync::Notify;

	fn pin() -> BlockPin {
		BlockPin::new(11_155_111, 1_000_000, B256::from([1u8; 32]))
	}

	fn balance_key(byte: u8) -> StateKey {
		StateKey::AccountBalance(Address::repeat_byte(byte))
	}

	fn balance(value: u64) -> Option<StateValue> {
		Some(StateValue::Balance(U256::from(value)))
	}

	#[test]
	fn get_and_put() {
		let cache = SnapshotCache::new(pin());
		let key = balance_key(1);

		// Initially not cached
		assert_eq!(cache.get(&key, 1_000_000), None);

		assert!(cache.put(key, 1_000_000, balance(500)));
		assert_eq!(cache.get(&key, 1_000_000), Some(balance(500)));

		// Different height is a different entry
		assert_eq!(cache.get(&key, 999_999), None);
	}

	#[test]
	fn empty_values_are_cached() {
		let cache = SnapshotCache::new(pin());
		let key = StateKey::TransactionByHash(B256::repeat_byte(3));

		cache.put(key, 1_000_000, None);

		assert_eq!(cache.get(&key, 1_000_000), Some(None));
	}

	#[test]
	fn entries_are_never_overwritten() {
		let cache = SnapshotCache::new(pin());
		let key = balance_key(1);

		assert!(cache.put(key, 1_000_000, balance(500)));
		assert!(!cache.put(key, 1_000_000, balance(999)));

		assert_eq!(cache.get(&key, 1_000_000), Some(balance(500)));
		assert_eq!(cache.len(), 1);
		assert_eq!(cache.entries()[0].fetched_at, pin());
	}

	#[tokio::test]
	async fn get_or_fetch_caches_result() {
		let cache = SnapshotCache::new(pin());
		let key = balance_key(1);
		let calls = Arc::new(AtomicUsize::new(0));

		for _ in 0..3 {
			let calls = calls.clone();
			let value = cache
				.get_or_fetch(key, 1_000_000, move || async move {
					calls.fetch_add(1, Ordering::SeqCst);
					Ok(balance(500))
				})
				.await
				.unwrap();
			assert_eq!(value, balance(500));
		}

		assert_eq!(calls.load(Ordering::SeqCst), 1);
		let stats = cache.stats();
		assert_eq!(stats.misses, 1);
		assert_eq!(stats.hits, 2);
	}

	#[tokio::test]
	async fn failed_fetch_is_not_cached() {
		let cache = SnapshotCache::new(pin());
		let key = balance_key(1);

		let err = cache
			.get_or_fetch(key, 1_000_000, || async {
				Err(RpcClientError::UpstreamUnavailable {
					method: "eth_getBalance",
					attempts: 3,
					message: "timeout".into(),
				})
			})
			.await;
		assert!(err.is_err());
		assert_eq!(cache.get(&key, 1_000_000), None);
		assert_eq!(cache.in_flight(), 0);

		// The next caller fetches again
		let value = cache.get_or_fetch(key, 1_000_000, || async { Ok(balance(7)) }).await;
		assert_eq!(value, Ok(balance(7)));
	}

	#[tokio::test]
	async fn concurrent_misses_share_one_fetch() {
		let cache = SnapshotCache::new(pin());
		let key = balance_key(1);
		let calls = Arc::new(AtomicUsize::new(0));
		let release = Arc::new(Notify::new());

		let mut handles = Vec::new();
		for _ in 0..8 {
			let cache = cache.clone();
			let calls = calls.clone();
			let release = release.clone();
			handles.push(tokio::spawn(async move {
				cache
					.get_or_fetch(key, 1_000_000, move || async move {
						calls.fetch_add(1, Ordering::SeqCst);
						release.notified().await;
						Ok(balance(500))
					})
					.await
			}));
		}

		// Let every task reach the cache before the fetch completes
		for _ in 0..50 {
			tokio::task::yield_now().await;
		}
		assert_eq!(cache.in_flight(), 1);
		release.notify_one();

		for handle in handles {
			assert_eq!(handle.await.unwrap(), Ok(balance(500)));
		}
		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert_eq!(cache.stats().coalesced, 7);
		assert_eq!(cache.in_flight(), 0);
	}

	#[test]
	fn bounded_cache_evicts_least_recently_used() {
		let cache = SnapshotCache::with_capacity(pin(), NonZeroUsize::new(2));
		let (a, b, c) = (balance_key(1), balance_key(2), balance_key(3));

		cache.put(a, 1, balance(1));
		cache.put(b, 1, balance(2));
		// Touch `a` so `b` becomes the eviction candidate
		assert!(cache.get(&a, 1).is_some());
		cache.put(c, 1, balance(3));

		assert_eq!(cache.len(), 2);
		assert_eq!(cache.get(&b, 1), None);
		assert_eq!(cache.get(&a, 1), Some(balance(1)));
		assert_eq!(cache.get(&c, 1), Some(balance(3)));
		assert_eq!(cache.stats().evictions, 1);
	}

	#[test]
	fn unbounded_cache_never_evicts() {
		let cache = SnapshotCache::new(pin());

		for byte in 0..=255u8 {
			assert!(cache.put(balance_key(byte), 1, balance(byte as u64)));
		}

		assert_eq!(cache.len(), 256);
		assert_eq!(cache.stats().evictions, 0);
		assert_eq!(cache.get(&balance_key(0), 1), Some(balance(0)));
	}

	#[test]
	fn rejected_put_does_not_refresh_recency() {
		let cache = SnapshotCache::with_capacity(pin(), NonZeroUsize::new(2));
		let (a, b, c) = (balance_key(1), balance_key(2), balance_key(3));

		cache.put(a, 1, balance(1));
		cache.put(b, 1, balance(2));
		assert!(!cache.put(a, 1, balance(10)));
		cache.put(c, 1, balance(3));

		// `a` is still the oldest entry
		assert_eq!(cache.get(&a, 1), None);
		assert_eq!(cache.get(&b, 1), Some(balance(2)));
	}

	#[tokio::test]
	async fn eviction_leaves_in_flight_fetches_alone() {
		let cache = SnapshotCache::with_capacity(pin(), NonZeroUsize::new(1));
		let key = balance_key(1);
		let release = Arc::new(Notify::new());

		let waiter = {
			let cache = cache.clone();
			let release = release.clone();
			tokio::spawn(async move {
				cache
					.get_or_fetch(key, 1, move || async move {
						release.notified().await;
						Ok(balance(42))
					})
					.await
			})
		};
		for _ in 0..10 {
			tokio::task::yield_now().await;
		}

		// Churn the bounded cache while the fetch is outstanding
		for byte in 2..10 {
			cache.put(balance_key(byte), 1, balance(byte as u64));
		}
		assert_eq!(cache.in_flight(), 1);

		release.notify_one();
		assert_eq!(waiter.await.unwrap(), Ok(balance(42)));
	}
}
