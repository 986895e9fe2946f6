// SPDX-License-Identifier: GPL-3.0

//! Fork sessions.
//!
//! A [`ForkSession`] is the root object of a running node. It resolves the fork point,
//! owns the [`ForkProvider`] and holds the cancellation token every remote fetch races
//! against. Dropping or shutting down the session cancels outstanding fetches.
//!
//! Cache and overlay live only as long as the session. Local state can be carried across
//! restarts with [`ForkSession::dump_to`] and [`ForkSession::load_from`], as long as the
//! new session is pinned to the same block.

use crate::{
	BlockPin, ForkBlock, ForkProvider, ForkRpcClient,
	config::{DEFAULT_CHAIN_ID, NodeConfig},
	error::{ConfigError, RpcClientError, SessionError},
	overlay::OverlayEntry,
	remote::RemoteSource,
	rpc::redact_endpoint,
	types::{BlockId, BlockRecord, BlockTransactions, StateKey, StateValue},
};
use alloy_primitives::{B256, keccak256};
use serde::{Deserialize, Serialize};
use std::{
	num::NonZeroUsize,
	path::Path,
	sync::Arc,
	time::{SystemTime, UNIX_EPOCH},
};
use tokio_util::sync::CancellationToken;

/// How to start a forked session.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
	/// Block to fork from.
	pub block: ForkBlock,
	/// Chain id to advertise instead of the remote's.
	pub chain_id: Option<u64>,
	/// Upper bound on cached remote values.
	pub max_cache_entries: Option<NonZeroUsize>,
	/// Token cancelling the session. A fresh token is used when absent.
	pub shutdown: Option<CancellationToken>,
}

impl SessionOptions {
	/// Fork at a specific block.
	pub fn at(number: u64) -> Self {
		Self { block: ForkBlock::Number(number), ..Default::default() }
	}
}

/// One locally written entry in an exported state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
	/// The key that was written.
	pub key: StateKey,
	/// The local value or tombstone.
	pub entry: OverlayEntry,
}

/// Portable copy of a session's local state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
	/// The fork point the state was produced on.
	pub pin: BlockPin,
	/// The local head, if blocks were produced.
	pub head: Option<u64>,
	/// Every local write.
	pub entries: Vec<StateEntry>,
}

/// A running fork.
pub struct ForkSession {
	provider: ForkProvider,
	shutdown: CancellationToken,
}

impl ForkSession {
	/// Start a session as described by `config`.
	///
	/// Forks the configured remote when forking is enabled, otherwise starts a local chain.
	pub async fn start(config: &NodeConfig) -> Result<Self, SessionError> {
		config.validate()?;
		let Some(forking) = config.active_fork() else {
			return Ok(Self::local(config.chain_id.unwrap_or(DEFAULT_CHAIN_ID)));
		};
		let Some(url) = forking.url.as_ref() else {
			return Err(ConfigError::MissingForkUrl.into());
		};

		let shutdown = CancellationToken::new();
		let client = ForkRpcClient::with_options(url, forking.client_options())?
			.with_shutdown(shutdown.child_token());
		log::info!("Forking {}", redact_endpoint(url));

		let options = SessionOptions {
			block: forking.block_number.into(),
			chain_id: config.chain_id,
			max_cache_entries: forking.max_cache_entries,
			shutdown: Some(shutdown),
		};
		Self::fork(Arc::new(client), options).await
	}

	/// Fork `remote`.
	///
	/// Fails if the fork point cannot be resolved; a session is never started without a
	/// pin.
	pub async fn fork(
		remote: Arc<dyn RemoteSource>,
		options: SessionOptions,
	) -> Result<Self, SessionError> {
		let shutdown = options.shutdown.unwrap_or_default();
		let resolved = tokio::select! {
			biased;
			_ = shutdown.cancelled() => return Err(SessionError::Rpc(RpcClientError::Cancelled)),
			resolved = BlockPin::resolve(options.block, options.chain_id, remote.as_ref()) =>
				resolved,
		};
		let (pin, block) = resolved?;

		let provider =
			ForkProvider::new(pin, Some(remote), options.max_cache_entries, shutdown.clone());
		// The pin block was just fetched; keep it so the first head query stays local.
		let header = block.header();
		provider.cache().put(
			StateKey::BlockHeader(BlockId::Number(pin.number)),
			pin.number,
			Some(StateValue::Block(header.clone())),
		);
		provider.cache().put(
			StateKey::BlockHeader(BlockId::Hash(pin.hash)),
			pin.number,
			Some(StateValue::Block(header)),
		);

		Ok(Self { provider, shutdown })
	}

	/// Start a chain with no remote.
	///
	/// The genesis block hash depends only on `chain_id`, so state dumped from a local
	/// session can be loaded into any later local session with the same chain id.
	pub fn local(chain_id: u64) -> Self {
		let hash = keccak256(chain_id.to_be_bytes());
		let pin = BlockPin::new(chain_id, 0, hash);
		let shutdown = CancellationToken::new();
		let provider = ForkProvider::new(pin, None, None, shutdown.clone());

		let timestamp = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map(|elapsed| elapsed.as_secs())
			.unwrap_or(0);
		let mut genesis = BlockRecord::new(0, hash, B256::ZERO, timestamp);
		genesis.transactions = BlockTransactions::Full(Vec::new());
		provider.record_block(genesis, Vec::new());

		log::info!("Started local chain {chain_id}");
		Self { provider, shutdown }
	}

	/// The session's state provider.
	pub fn provider(&self) -> &ForkProvider {
		&self.provider
	}

	/// The fork point.
	pub fn pin(&self) -> BlockPin {
		self.provider.pin()
	}

	/// Token cancelled when the session shuts down.
	pub fn shutdown_token(&self) -> CancellationToken {
		self.shutdown.clone()
	}

	/// Cancel outstanding remote fetches and refuse new ones.
	pub fn shutdown(&self) {
		if self.shutdown.is_cancelled() {
			return;
		}
		self.shutdown.cancel();
		let stats = self.provider.cache().stats();
		log::info!(
			"Fork session closed: {} cached value(s), {} remote fetch(es), {} hit(s), {} coalesced",
			stats.entries,
			stats.misses,
			stats.hits,
			stats.coalesced
		);
	}

	/// Copy the session's local state.
	pub fn export_state(&self) -> SessionState {
		let overlay = self.provider.overlay();
		SessionState {
			pin: self.pin(),
			head: overlay.head(),
			entries: overlay
				.diff()
				.into_iter()
				.map(|(key, entry)| StateEntry { key, entry })
				.collect(),
		}
	}

	/// Replace the session's local state with `state`.
	///
	/// Open snapshots are discarded.
	pub fn import_state(&self, state: SessionState) -> Result<(), SessionError> {
		let current = self.pin();
		if state.pin != current {
			return Err(SessionError::PinMismatch { exported: state.pin, current });
		}
		let entries = state.entries.into_iter().map(|entry| (entry.key, entry.entry)).collect();
		self.provider.overlay().replace(entries, state.head);
		Ok(())
	}

	/// Write the local state to `path` as JSON.
	pub fn dump_to(&self, path: &Path) -> Result<(), SessionError> {
		let state = self.export_state();
		let json = serde_json::to_vec_pretty(&state)?;
		std::fs::write(path, json)
			.map_err(|source| SessionError::Io { path: path.to_path_buf(), source })?;
		log::info!("Saved {} local entries to {}", state.entries.len(), path.display());
		Ok(())
	}

	/// Load local state previously written by [`Self::dump_to`].
	pub fn load_from(&self, path: &Path) -> Result<(), SessionError> {
		let json = std::fs::read(path)
			.map_err(|source| SessionError::Io { path: path.to_path_buf(), source })?;
		let state: SessionState = serde_json::from_slice(&json)?;
		let count = state.entries.len();
		self.import_state(state)?;
		log::info!("Loaded {count} local entries from {}", path.display());
		Ok(())
	}
}

impl Drop for ForkSession {
	fn drop(&mut self) {
		self.shutdown.cancel();
	}
}
