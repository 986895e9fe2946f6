// SPDX-License-Identifier: GPL-3.0

//! Lazy forking of live EVM chains for local development nodes.
//!
//! This crate provides the state layer of a development node that forks a remote chain
//! (for example Sepolia) at a pinned block. State is fetched on demand, cached for the
//! lifetime of the session, and every local write lands in an overlay so the remote chain
//! is never touched.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          forkline CLI                           │
//! └─────────────────────────────────────────────────────────────────┘
//!                                 │
//!                                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          RPC Server                              │
//! │             (eth_*, evm_* and hardhat_* JSON-RPC)                │
//! └─────────────────────────────────────────────────────────────────┘
//!                                 │
//!                                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                ForkSession ──► ForkProvider                      │
//! │  ┌──────────────┐  ┌───────────────┐  ┌──────────────────────┐  │
//! │  │ LocalOverlay │─▶│ SnapshotCache │─▶│ RemoteSource at pin  │  │
//! │  │   (writes)   │  │  (in memory)  │  │  (lazy, retrying)    │  │
//! │  └──────────────┘  └───────────────┘  └──────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod cache;
pub mod config;
pub mod error;
mod overlay;
mod pin;
mod provider;
pub mod remote;
pub mod retry;
mod rpc;
pub mod rpc_server;
mod session;
mod strings;
pub mod testing;
pub mod types;

pub use cache::{CacheEntry, CacheStats, FetchResult, SnapshotCache};
pub use config::{ForkingConfig, NodeConfig, ServerConfig};
pub use error::{
	BlockPinError, ConfigError, ForkError, OverlayError, RpcClientError, SessionError,
};
pub use overlay::{LocalOverlay, OverlayEntry, OverlayLookup, SnapshotId};
pub use pin::{BlockPin, ForkBlock};
pub use provider::ForkProvider;
pub use remote::RemoteSource;
pub use retry::{Backoff, RateLimitRetryPolicy, RetryPolicy};
pub use rpc::{ClientOptions, ForkRpcClient, redact_endpoint};
pub use rpc_server::{ForkRpcServer, RpcServerConfig};
pub use session::{ForkSession, SessionOptions, SessionState, StateEntry};
pub use types::{
	BlockId, BlockRecord, BlockTag, BlockTransactions, ReceiptRecord, StateKey, StateValue,
	TransactionRecord,
};
