// SPDX-License-Identifier: GPL-3.0

//! Error types for fork operations.
//!
//! This module contains all error types used throughout the `forkline` crate,
//! organized by context:
//!
//! - [`rpc::RpcClientError`] - Errors from the upstream RPC client.
//! - [`pin::BlockPinError`] - Errors while resolving the fork point.
//! - [`overlay::OverlayError`] - Errors from local overlay snapshots.
//! - [`provider::ForkError`] - Errors from the fork provider facade.
//! - [`config::ConfigError`] - Errors while loading node configuration.
//! - [`session::SessionError`] - Errors from session startup and state export.

pub mod config;
pub mod overlay;
pub mod pin;
pub mod provider;
pub mod rpc;
pub mod session;

pub use config::ConfigError;
pub use overlay::OverlayError;
pub use pin::BlockPinError;
pub use provider::ForkError;
pub use rpc::RpcClientError;
pub use session::SessionError;
