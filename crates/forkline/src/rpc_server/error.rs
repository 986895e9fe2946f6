// SPDX-License-Identifier: GPL-3.0

//! RPC server error types.
//!
//! This module defines error types for the RPC server, including the standard JSON-RPC
//! error codes and the server-error codes Ethereum development nodes use.

use crate::error::{ForkError, OverlayError, RpcClientError};
use jsonrpsee::types::ErrorObjectOwned;

/// JSON-RPC error codes.
pub mod error_codes {
	/// Method not found.
	pub const METHOD_NOT_FOUND: i32 = -32601;

	/// Invalid params.
	pub const INVALID_PARAMS: i32 = -32602;

	/// Internal error.
	pub const INTERNAL_ERROR: i32 = -32603;

	/// Generic server error, used for invalid block ranges and unknown snapshots.
	pub const SERVER_ERROR: i32 = -32000;

	/// The upstream chain could not answer.
	pub const UPSTREAM_ERROR: i32 = -32001;
}

/// Errors that can occur in the RPC server.
#[derive(Debug, thiserror::Error)]
pub enum RpcServerError {
	/// Failed to start the server.
	#[error("Failed to start RPC server: {0}")]
	ServerStart(String),

	/// The upstream chain failed to answer.
	#[error("Upstream error: {0}")]
	Upstream(String),

	/// The request targets state that does not exist.
	#[error("{0}")]
	InvalidState(String),

	/// Invalid parameter.
	#[error("Invalid parameter: {0}")]
	InvalidParam(String),

	/// Internal error.
	#[error("Internal error: {0}")]
	Internal(String),
}

impl From<ForkError> for RpcServerError {
	fn from(err: ForkError) -> Self {
		match err {
			ForkError::Rpc(RpcClientError::Cancelled) => RpcServerError::Internal(err.to_string()),
			ForkError::Rpc(_) => RpcServerError::Upstream(err.to_string()),
			ForkError::Overlay(OverlayError::StaleSnapshot(_)) |
			ForkError::NotYetMined { .. } |
			ForkError::UnavailableLocalState(_) => RpcServerError::InvalidState(err.to_string()),
			ForkError::KindMismatch { .. } => RpcServerError::InvalidParam(err.to_string()),
			ForkError::NonSequentialBlock { .. } |
			ForkError::ParentHashMismatch { .. } |
			ForkError::MissingHead(_) => RpcServerError::Internal(err.to_string()),
		}
	}
}

impl From<RpcServerError> for ErrorObjectOwned {
	fn from(err: RpcServerError) -> Self {
		match err {
			RpcServerError::ServerStart(msg) => {
				ErrorObjectOwned::owned(error_codes::INTERNAL_ERROR, msg, None::<()>)
			},
			RpcServerError::Upstream(msg) => {
				ErrorObjectOwned::owned(error_codes::UPSTREAM_ERROR, msg, None::<()>)
			},
			RpcServerError::InvalidState(msg) => {
				ErrorObjectOwned::owned(error_codes::SERVER_ERROR, msg, None::<()>)
			},
			RpcServerError::InvalidParam(msg) => {
				ErrorObjectOwned::owned(error_codes::INVALID_PARAMS, msg, None::<()>)
			},
			RpcServerError::Internal(msg) => {
				ErrorObjectOwned::owned(error_codes::INTERNAL_ERROR, msg, None::<()>)
			},
		}
	}
}
