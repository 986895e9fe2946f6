// SPDX-License-Identifier: GPL-3.0

//! String constants for the RPC client module.

/// JSON-RPC method names used for requests and error reporting.
///
/// These match the Ethereum execution API method names.
pub mod methods {
	pub const ETH_CHAIN_ID: &str = "eth_chainId";
	pub const ETH_GET_BALANCE: &str = "eth_getBalance";
	pub const ETH_GET_CODE: &str = "eth_getCode";
	pub const ETH_GET_TRANSACTION_COUNT: &str = "eth_getTransactionCount";
	pub const ETH_GET_STORAGE_AT: &str = "eth_getStorageAt";
	pub const ETH_GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";
	pub const ETH_GET_BLOCK_BY_HASH: &str = "eth_getBlockByHash";
	pub const ETH_GET_TRANSACTION_BY_HASH: &str = "eth_getTransactionByHash";
	pub const ETH_GET_TRANSACTION_RECEIPT: &str = "eth_getTransactionReceipt";
}

/// Block tags understood by the remote chain.
pub mod tags {
	pub const LATEST: &str = "latest";
	pub const EARLIEST: &str = "earliest";
	pub const PENDING: &str = "pending";
	pub const SAFE: &str = "safe";
	pub const FINALIZED: &str = "finalized";
}

/// Fragments of upstream error messages that indicate a transient condition.
pub mod transient_messages {
	pub const RATE_LIMIT: &str = "rate limit";
	pub const HEADER_NOT_FOUND: &str = "header not found";
	pub const TOO_MANY_REQUESTS: &str = "too many requests";
}
