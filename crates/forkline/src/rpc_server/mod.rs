// SPDX-License-Identifier: GPL-3.0

//! JSON-RPC server for a forked chain.
//!
//! This module exposes a [`ForkProvider`] to wallets, scripts and test frameworks over
//! HTTP and WebSocket.
//!
//! # Supported RPC Methods
//!
//! - `eth_*` - Chain id, block number, account state, blocks, transactions and receipts
//! - `evm_*` - Snapshots, reverts and manual mining
//! - `hardhat_*` - Account state overrides and fork metadata

mod error;
pub mod methods;

pub use error::{RpcServerError, error_codes};

use crate::{ForkProvider, config::ServerConfig};
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use std::net::SocketAddr;

/// Configuration for the RPC server.
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
	/// Address to bind the server to.
	pub addr: SocketAddr,
	/// Maximum number of connections.
	pub max_connections: u32,
}

impl Default for RpcServerConfig {
	fn default() -> Self {
		Self::from(&ServerConfig::default())
	}
}

impl From<&ServerConfig> for RpcServerConfig {
	fn from(config: &ServerConfig) -> Self {
		Self {
			addr: SocketAddr::new(config.host, config.port),
			max_connections: config.max_connections,
		}
	}
}

/// The RPC server for a forked chain.
pub struct ForkRpcServer {
	/// Server handle for managing lifecycle.
	handle: ServerHandle,
	/// Address the server is bound to.
	addr: SocketAddr,
}

impl ForkRpcServer {
	/// Start a new RPC server serving `provider`.
	pub async fn start(
		provider: ForkProvider,
		config: RpcServerConfig,
	) -> Result<Self, RpcServerError> {
		let server = ServerBuilder::default()
			.max_connections(config.max_connections)
			.build(config.addr)
			.await
			.map_err(|e| RpcServerError::ServerStart(e.to_string()))?;

		let addr = server.local_addr().map_err(|e| RpcServerError::ServerStart(e.to_string()))?;

		// Merge all RPC methods into a single module
		let rpc_module = methods::create_rpc_module(provider)?;

		let handle = server.start(rpc_module);
		log::info!("JSON-RPC server listening on {addr}");

		Ok(Self { handle, addr })
	}

	/// Get the address the server is bound to.
	pub fn addr(&self) -> SocketAddr {
		self.addr
	}

	/// Get the WebSocket URL for connecting to this server.
	pub fn ws_url(&self) -> String {
		format!("ws://{}", self.addr)
	}

	/// Get the HTTP URL for connecting to this server.
	pub fn http_url(&self) -> String {
		format!("http://{}", self.addr)
	}

	/// Stop the server gracefully.
	pub async fn stop(self) {
		if self.handle.stop().is_err() {
			log::debug!("JSON-RPC server was already stopped");
		}
		self.handle.stopped().await;
	}
}
