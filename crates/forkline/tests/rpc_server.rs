// SPDX-License-Identifier: GPL-3.0

//! Forkline integration tests for the JSON-RPC server.
//!
//! Each test serves a session forked from [`MockRemote`] on a free local port and talks to
//! it over HTTP.

use alloy_primitives::{Address, B256, U64, U256, address};
use forkline::{
	BlockRecord, ForkRpcServer, ForkSession, RpcServerConfig, SessionOptions, SnapshotId,
	StateKey, StateValue,
	rpc_server::{error_codes, methods::HardhatMetadata},
	testing::{MockRemote, SEPOLIA_CHAIN_ID},
};
use jsonrpsee::{
	core::client::{ClientT, Error as ClientError},
	http_client::{HttpClient, HttpClientBuilder},
	rpc_params,
};
use std::{net::SocketAddr, sync::Arc};

const PIN: u64 = 1_000_000;
const ZOE: Address = address!("0x00000000000000000000000000000000000000aa");

struct TestNode {
	_session: ForkSession,
	server: ForkRpcServer,
	client: HttpClient,
}

async fn serve(remote: &Arc<MockRemote>) -> TestNode {
	let session = ForkSession::fork(remote.clone(), SessionOptions::at(PIN)).await.unwrap();
	let config =
		RpcServerConfig { addr: SocketAddr::from(([127, 0, 0, 1], 0)), max_connections: 8 };
	let server = ForkRpcServer::start(session.provider().clone(), config).await.unwrap();
	let client = HttpClientBuilder::default().build(server.http_url()).unwrap();
	TestNode { _session: session, server, client }
}

#[tokio::test]
async fn serves_forked_state() {
	let remote = Arc::new(MockRemote::sepolia(PIN + 100));
	remote.set(StateKey::AccountBalance(ZOE), StateValue::Balance(U256::from(500)));
	let node = serve(&remote).await;

	let chain_id: U64 = node.client.request("eth_chainId", rpc_params![]).await.unwrap();
	let number: U64 = node.client.request("eth_blockNumber", rpc_params![]).await.unwrap();
	let balance: U256 =
		node.client.request("eth_getBalance", rpc_params![ZOE, "latest"]).await.unwrap();
	let block: Option<BlockRecord> = node
		.client
		.request("eth_getBlockByNumber", rpc_params!["latest", false])
		.await
		.unwrap();

	assert_eq!(chain_id, U64::from(SEPOLIA_CHAIN_ID));
	assert_eq!(number, U64::from(PIN));
	assert_eq!(balance, U256::from(500));
	assert_eq!(block.map(|block| block.hash), Some(MockRemote::block_hash(PIN)));

	node.server.stop().await;
}

#[tokio::test]
async fn overrides_are_reverted_with_snapshots() {
	let remote = Arc::new(MockRemote::sepolia(PIN));
	remote.set(StateKey::AccountBalance(ZOE), StateValue::Balance(U256::from(500)));
	let node = serve(&remote).await;

	let snapshot: SnapshotId = node.client.request("evm_snapshot", rpc_params![]).await.unwrap();
	let set: bool = node
		.client
		.request("hardhat_setBalance", rpc_params![ZOE, U256::from(7)])
		.await
		.unwrap();
	let mined: U64 = node.client.request("evm_mine", rpc_params![]).await.unwrap();
	let overridden: U256 =
		node.client.request("eth_getBalance", rpc_params![ZOE]).await.unwrap();

	assert!(set);
	assert_eq!(mined, U64::from(PIN + 1));
	assert_eq!(overridden, U256::from(7));

	let reverted: bool = node.client.request("evm_revert", rpc_params![snapshot]).await.unwrap();
	let restored: U256 = node.client.request("eth_getBalance", rpc_params![ZOE]).await.unwrap();
	let number: U64 = node.client.request("eth_blockNumber", rpc_params![]).await.unwrap();

	assert!(reverted);
	assert_eq!(restored, U256::from(500));
	assert_eq!(number, U64::from(PIN));

	node.server.stop().await;
}

#[tokio::test]
async fn storage_words_round_trip() {
	let remote = Arc::new(MockRemote::sepolia(PIN));
	let node = serve(&remote).await;
	let word = B256::with_last_byte(0x2a);

	let _: bool = node
		.client
		.request("hardhat_setStorageAt", rpc_params![ZOE, U256::from(1), word])
		.await
		.unwrap();
	let read: B256 = node
		.client
		.request("eth_getStorageAt", rpc_params![ZOE, U256::from(1), "latest"])
		.await
		.unwrap();

	assert_eq!(read, word);
	node.server.stop().await;
}

#[tokio::test]
async fn future_blocks_are_rejected() {
	let remote = Arc::new(MockRemote::sepolia(PIN + 100));
	let node = serve(&remote).await;
	let before = remote.fetch_count();

	let result: Result<U256, _> = node
		.client
		.request("eth_getBalance", rpc_params![ZOE, format!("{:#x}", PIN + 10)])
		.await;

	match result {
		Err(ClientError::Call(err)) => assert_eq!(err.code(), error_codes::SERVER_ERROR),
		other => panic!("expected a call error, got {other:?}"),
	}
	assert_eq!(remote.fetch_count(), before);
	node.server.stop().await;
}

#[tokio::test]
async fn metadata_reports_fork_point() {
	let remote = Arc::new(MockRemote::sepolia(PIN + 100));
	let node = serve(&remote).await;

	let metadata: HardhatMetadata =
		node.client.request("hardhat_metadata", rpc_params![]).await.unwrap();

	let forked = metadata.forked_network.unwrap();
	assert_eq!(forked.fork_block_number, PIN);
	assert_eq!(forked.chain_id, SEPOLIA_CHAIN_ID);
	assert_eq!(metadata.latest_block_hash, MockRemote::block_hash(PIN));
	node.server.stop().await;
}

#[tokio::test]
async fn unknown_methods_are_reported() {
	let remote = Arc::new(MockRemote::sepolia(PIN));
	let node = serve(&remote).await;

	let result: Result<B256, _> =
		node.client.request("eth_sendRawTransaction", rpc_params!["0x00"]).await;

	match result {
		Err(ClientError::Call(err)) => assert_eq!(err.code(), error_codes::METHOD_NOT_FOUND),
		other => panic!("expected a call error, got {other:?}"),
	}
	node.server.stop().await;
}
