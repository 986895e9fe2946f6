// SPDX-License-Identifier: GPL-3.0

//! Retrying upstream requests.
//!
//! Public RPC providers rate limit aggressively and occasionally fail behind their load
//! balancers. [`RetryPolicy`] decides which errors are worth another attempt, and
//! [`Backoff`] drives the attempts with exponentially growing pauses:
//!
//! ```text
//! attempt 1 ──fail──► wait base ──► attempt 2 ──fail──► wait base*factor ──► attempt 3
//! ```
//!
//! Anything the policy does not consider transient is surfaced immediately as
//! [`RpcClientError::UpstreamRejected`].

use crate::{error::RpcClientError, strings::rpc::transient_messages};
use jsonrpsee::{
	core::client::Error as ClientError, http_client::transport::Error as HttpTransportError,
	types::ErrorObjectOwned,
};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, future::Future, time::Duration};
use tokio_util::sync::CancellationToken;

/// Decides whether a failed request should be retried.
pub trait RetryPolicy: Send + Sync + Debug {
	/// Whether to retry the request based on the given `error`.
	fn should_retry(&self, error: &ClientError) -> bool;
}

/// Retries transport failures, timeouts and provider rate limiting.
///
/// Authentication failures (HTTP 401/403), malformed responses and JSON-RPC errors that
/// are not rate limits are final.
#[derive(Clone, Debug, Default)]
pub struct RateLimitRetryPolicy;

impl RetryPolicy for RateLimitRetryPolicy {
	fn should_retry(&self, error: &ClientError) -> bool {
		match error {
			ClientError::Transport(err) => !is_auth_failure(err.downcast_ref()),
			ClientError::RequestTimeout => true,
			ClientError::RestartNeeded(_) => true,
			ClientError::Call(err) => should_retry_json_rpc_error(err),
			_ => false,
		}
	}
}

/// Whether the endpoint answered with HTTP 401 or 403.
fn is_auth_failure(error: Option<&HttpTransportError>) -> bool {
	matches!(error, Some(HttpTransportError::Rejected { status_code: 401 | 403 }))
}

/// Analyzes a JSON-RPC error object and decides if the request should be retried based on
/// the error code or the message.
fn should_retry_json_rpc_error(error: &ErrorObjectOwned) -> bool {
	let message = error.message().to_lowercase();
	match error.code() {
		// Alchemy and most HTTP gateways.
		429 => true,
		// Infura `exceeded project rate limit`.
		-32005 => true,
		-32016 if message.contains(transient_messages::RATE_LIMIT) => true,
		_ =>
			message.contains(transient_messages::HEADER_NOT_FOUND) ||
				message.contains(transient_messages::TOO_MANY_REQUESTS),
	}
}

/// Exponential backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Backoff {
	/// Total number of attempts, including the first one.
	pub max_attempts: u32,
	/// Pause after the first failed attempt, in milliseconds.
	pub base_delay_ms: u64,
	/// Multiplier applied to the pause after each further failure.
	pub factor: u32,
}

impl Default for Backoff {
	fn default() -> Self {
		Self { max_attempts: 3, base_delay_ms: 200, factor: 2 }
	}
}

impl Backoff {
	/// Pause before the attempt following failed attempt number `failed` (1-based).
	pub fn delay_for(&self, failed: u32) -> Duration {
		let multiplier = self.factor.saturating_pow(failed.saturating_sub(1));
		Duration::from_millis(self.base_delay_ms).saturating_mul(multiplier)
	}

	/// Runs `request` until it succeeds, fails with a non-retryable error, or the attempt
	/// budget is spent.
	///
	/// Both the request and the pauses between attempts race against `cancel`.
	pub async fn run<T, F, Fut>(
		&self,
		method: &'static str,
		policy: &dyn RetryPolicy,
		cancel: &CancellationToken,
		mut request: F,
	) -> Result<T, RpcClientError>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, ClientError>>,
	{
		let max_attempts = self.max_attempts.max(1);
		let mut attempt = 1;
		loop {
			let result = tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(RpcClientError::Cancelled),
				result = request() => result,
			};
			let error = match result {
				Ok(value) => return Ok(value),
				Err(error) => error,
			};

			if !policy.should_retry(&error) {
				return Err(RpcClientError::UpstreamRejected { method, message: error.to_string() });
			}
			if attempt >= max_attempts {
				log::warn!("{method} failed after {attempt} attempt(s): {error}");
				return Err(RpcClientError::UpstreamUnavailable {
					method,
					attempts: attempt,
					message: error.to_string(),
				});
			}

			let delay = self.delay_for(attempt);
			log::debug!(
				"{method} attempt {attempt}/{max_attempts} failed ({error}), retrying in {delay:?}"
			);
			tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(RpcClientError::Cancelled),
				_ = tokio::time::sleep(delay) => {},
			}
			attempt += 1;
		}
	}
}
