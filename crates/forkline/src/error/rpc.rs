// SPDX-License-Identifier: GPL-3.0

//! RPC client error types.

use thiserror::Error;

/// Errors that can occur when talking to the upstream chain.
///
/// The type is `Clone` so that one failed fetch can be handed to every caller
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcClientError {
	/// Failed to create a client for the RPC endpoint.
	#[error("Failed to connect to {endpoint}: {message}")]
	ConnectionFailed {
		/// The endpoint (scheme and host only) that failed to connect.
		endpoint: String,
		/// The underlying error message.
		message: String,
	},
	/// The upstream kept failing with transient errors until the retry budget ran out.
	#[error("Upstream unavailable: {method} failed after {attempts} attempt(s): {message}")]
	UpstreamUnavailable {
		/// The RPC method that failed.
		method: &'static str,
		/// How many attempts were made.
		attempts: u32,
		/// The last error message.
		message: String,
	},
	/// The upstream rejected the request. Retrying would not help.
	#[error("Upstream rejected {method}: {message}")]
	UpstreamRejected {
		/// The RPC method that was rejected.
		method: &'static str,
		/// The rejection reason.
		message: String,
	},
	/// The upstream answered with data that could not be interpreted.
	#[error("Invalid RPC response: {0}")]
	InvalidResponse(String),
	/// The fetch was abandoned because the session is shutting down.
	#[error("Request cancelled")]
	Cancelled,
}
