// SPDX-License-Identifier: GPL-3.0

//! Wire-level names forkline exchanges with upstream nodes: JSON-RPC method names, block
//! tags, and the error fragments that mark a provider as temporarily overloaded.

pub mod rpc;
