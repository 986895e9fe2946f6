// SPDX-License-Identifier: GPL-3.0

//! RPC method implementations.
//!
//! This module contains all RPC method implementations organized by namespace:
//! - `eth` - Standard chain and state queries
//! - `evm` - Snapshots and manual mining
//! - `hardhat` - State overrides and fork metadata

mod eth;
mod evm;
mod hardhat;

use crate::{ForkProvider, rpc_server::RpcServerError};
use jsonrpsee::RpcModule;

pub use eth::{EthApi, EthApiServer};
pub use evm::{EvmApi, EvmApiServer};
pub use hardhat::{ForkedNetwork, HardhatApi, HardhatApiServer, HardhatMetadata};

/// Create the merged RPC module with all methods.
pub fn create_rpc_module(provider: ForkProvider) -> Result<RpcModule<()>, RpcServerError> {
	let mut module = RpcModule::new(());

	let eth_impl = EthApi::new(provider.clone());
	let evm_impl = EvmApi::new(provider.clone());
	let hardhat_impl = HardhatApi::new(provider);

	module
		.merge(EthApiServer::into_rpc(eth_impl))
		.map_err(|e| RpcServerError::Internal(e.to_string()))?;

	module
		.merge(EvmApiServer::into_rpc(evm_impl))
		.map_err(|e| RpcServerError::Internal(e.to_string()))?;

	module
		.merge(HardhatApiServer::into_rpc(hardhat_impl))
		.map_err(|e| RpcServerError::Internal(e.to_string()))?;

	Ok(module)
}
