// SPDX-License-Identifier: GPL-3.0

//! RPC client for reading state from live EVM chains.
//!
//! [`ForkRpcClient`] speaks the Ethereum JSON-RPC read API over HTTP(S). Every request goes
//! through the client's [`Backoff`] so transient provider failures are retried, and
//! every request races against the session's cancellation token.
//!
//! The client only exposes read methods. It keeps no state between calls: caching is the
//! job of [`SnapshotCache`](crate::SnapshotCache).
//!
//! Endpoints usually embed an API token in their path, so the client never logs the full
//! URL. Use [`redact_endpoint`] when an endpoint has to appear in a message.

use crate::{
	error::rpc::RpcClientError,
	retry::{Backoff, RateLimitRetryPolicy, RetryPolicy},
	strings::rpc::{methods, tags},
	types::{BlockRecord, ReceiptRecord, TransactionRecord},
};
use alloy_primitives::{Address, B256, Bytes, U64, U256};
use jsonrpsee::{
	core::{client::ClientT, params::ArrayParams},
	http_client::{HttpClient, HttpClientBuilder},
	rpc_params,
};
use serde::de::DeserializeOwned;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Default timeout for a single upstream request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Returns the scheme and host of `endpoint`, dropping any credentials in the path,
/// query or user info.
pub fn redact_endpoint(endpoint: &Url) -> String {
	match endpoint.host_str() {
		Some(host) => format!("{}://{host}", endpoint.scheme()),
		None => format!("{}://<unknown>", endpoint.scheme()),
	}
}

/// Options for [`ForkRpcClient::with_options`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
	/// Timeout for a single request attempt.
	pub request_timeout: Duration,
	/// Retry schedule for transient failures.
	pub backoff: Backoff,
}

impl Default for ClientOptions {
	fn default() -> Self {
		Self { request_timeout: DEFAULT_REQUEST_TIMEOUT, backoff: Backoff::default() }
	}
}

/// RPC client wrapper for fork operations.
///
/// # Example
///
/// ```ignore
/// use forkline::ForkRpcClient;
///
/// let client = ForkRpcClient::connect(&"https://rpc.sepolia.org".parse()?)?;
/// let head = client.latest_block().await?;
/// let balance = client.balance(address, head.number()).await?;
/// ```
#[derive(Clone, Debug)]
pub struct ForkRpcClient {
	client: HttpClient,
	endpoint: Url,
	backoff: Backoff,
	policy: Arc<dyn RetryPolicy>,
	shutdown: CancellationToken,
}

impl ForkRpcClient {
	/// Create a client for `endpoint` with default timeout and retry settings.
	pub fn connect(endpoint: &Url) -> Result<Self, RpcClientError> {
		Self::with_options(endpoint, ClientOptions::default())
	}

	/// Create a client for `endpoint`.
	pub fn with_options(endpoint: &Url, options: ClientOptions) -> Result<Self, RpcClientError> {
		let client = HttpClientBuilder::default()
			.request_timeout(options.request_timeout)
			.build(endpoint.as_str())
			.map_err(|e| RpcClientError::ConnectionFailed {
				endpoint: redact_endpoint(endpoint),
				message: e.to_string(),
			})?;

		Ok(Self {
			client,
			endpoint: endpoint.clone(),
			backoff: options.backoff,
			policy: Arc::new(RateLimitRetryPolicy),
			shutdown: CancellationToken::new(),
		})
	}

	/// Abort in-flight requests and retry pauses once `shutdown` is cancelled.
	pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
		self.shutdown = shutdown;
		self
	}

	/// Replace the policy deciding which failures are retried.
	pub fn with_retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
		self.policy = policy;
		self
	}

	/// Get the endpoint URL this client talks to.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Get the chain id of the remote chain.
	pub async fn chain_id(&self) -> Result<u64, RpcClientError> {
		let chain_id: U64 = self.request(methods::ETH_CHAIN_ID, rpc_params![]).await?;
		Ok(chain_id.to::<u64>())
	}

	/// Get the latest block, with transaction hashes only.
	pub async fn latest_block(&self) -> Result<BlockRecord, RpcClientError> {
		self.request::<Option<BlockRecord>>(
			methods::ETH_GET_BLOCK_BY_NUMBER,
			rpc_params![tags::LATEST, false],
		)
		.await?
		.ok_or_else(|| RpcClientError::InvalidResponse("No latest block returned".into()))
	}

	/// Get a block by height.
	///
	/// With `full` set, transactions are returned as objects instead of hashes.
	pub async fn block_by_number(
		&self,
		number: u64,
		full: bool,
	) -> Result<Option<BlockRecord>, RpcClientError> {
		self.request(methods::ETH_GET_BLOCK_BY_NUMBER, rpc_params![U64::from(number), full])
			.await
	}

	/// Get a block by hash.
	pub async fn block_by_hash(
		&self,
		hash: B256,
		full: bool,
	) -> Result<Option<BlockRecord>, RpcClientError> {
		self.request(methods::ETH_GET_BLOCK_BY_HASH, rpc_params![hash, full]).await
	}

	/// Get the balance of `address` at block `at`.
	pub async fn balance(&self, address: Address, at: u64) -> Result<U256, RpcClientError> {
		self.request(methods::ETH_GET_BALANCE, rpc_params![address, U64::from(at)]).await
	}

	/// Get the code of `address` at block `at`.
	pub async fn code(&self, address: Address, at: u64) -> Result<Bytes, RpcClientError> {
		self.request(methods::ETH_GET_CODE, rpc_params![address, U64::from(at)]).await
	}

	/// Get the transaction count of `address` at block `at`.
	pub async fn nonce(&self, address: Address, at: u64) -> Result<u64, RpcClientError> {
		let nonce: U64 = self
			.request(methods::ETH_GET_TRANSACTION_COUNT, rpc_params![address, U64::from(at)])
			.await?;
		Ok(nonce.to::<u64>())
	}

	/// Get the value of storage `slot` of `address` at block `at`.
	pub async fn storage_at(
		&self,
		address: Address,
		slot: U256,
		at: u64,
	) -> Result<U256, RpcClientError> {
		let slot = B256::from(slot.to_be_bytes::<32>());
		self.request(methods::ETH_GET_STORAGE_AT, rpc_params![address, slot, U64::from(at)])
			.await
	}

	/// Get a transaction by hash. Pending transactions have no block number.
	pub async fn transaction(
		&self,
		hash: B256,
	) -> Result<Option<TransactionRecord>, RpcClientError> {
		self.request(methods::ETH_GET_TRANSACTION_BY_HASH, rpc_params![hash]).await
	}

	/// Get the receipt of a mined transaction.
	pub async fn receipt(&self, hash: B256) -> Result<Option<ReceiptRecord>, RpcClientError> {
		self.request(methods::ETH_GET_TRANSACTION_RECEIPT, rpc_params![hash]).await
	}

	async fn request<R>(
		&self,
		method: &'static str,
		params: ArrayParams,
	) -> Result<R, RpcClientError>
	where
		R: DeserializeOwned,
	{
		self.backoff
			.run(method, self.policy.as_ref(), &self.shutdown, || {
				self.client.request::<R, _>(method, params.clone())
			})
			.await
	}
}
