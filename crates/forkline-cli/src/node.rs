// SPDX-License-Identifier: GPL-3.0

use anyhow::Result;
use clap::Args;
use forkline::{
	ForkRpcServer, ForkSession, ForkingConfig, NodeConfig, RpcServerConfig, redact_endpoint,
};
use std::{net::IpAddr, num::NonZeroUsize, path::PathBuf};
use url::Url;

/// Log messages of the node lifecycle.
mod messages {
	/// Prompt to stop the server.
	pub const PRESS_CTRL_C: &str = "Press Ctrl+C to stop.";
	/// Shutdown message.
	pub const SHUTTING_DOWN: &str = "Shutting down...";
	/// Final message.
	pub const SHUTDOWN_COMPLETE: &str = "Shutdown complete.";

	/// Format "Forked chain N at block #M -> url" message.
	pub fn forked(chain_id: u64, block_number: u64, http_url: &str) -> String {
		format!("Forked chain {chain_id} at block #{block_number} -> {http_url}")
	}

	/// Format "Local chain N -> url" message.
	pub fn local(chain_id: u64, http_url: &str) -> String {
		format!("Local chain {chain_id} -> {http_url}")
	}

	/// Format the WebSocket endpoint message.
	pub fn websocket(ws_url: &str) -> String {
		format!("WebSocket clients connect to {ws_url}")
	}
}

/// Arguments for running a node.
#[derive(Args, Clone, Debug, Default)]
pub(crate) struct NodeArgs {
	/// Path to a TOML configuration file. Flags override its values.
	#[arg(short, long)]
	pub config: Option<PathBuf>,

	/// RPC endpoint of the chain to fork.
	#[arg(short = 'f', long = "fork-url", conflicts_with = "no_fork")]
	pub fork_url: Option<Url>,

	/// Fork at a specific block number. If not specified, forks at the latest block.
	#[arg(long = "fork-block-number", conflicts_with = "no_fork")]
	pub fork_block_number: Option<u64>,

	/// Chain id to advertise instead of the forked chain's.
	#[arg(long = "chain-id")]
	pub chain_id: Option<u64>,

	/// Run a local chain even if the configuration file enables forking.
	#[arg(long = "no-fork")]
	pub no_fork: bool,

	/// Interface for the RPC server.
	#[arg(long)]
	pub host: Option<IpAddr>,

	/// Port for the RPC server (default: 8545).
	#[arg(short, long)]
	pub port: Option<u16>,

	/// Maximum number of remote values kept in memory. Unbounded if not specified.
	#[arg(long = "max-cache-entries")]
	pub max_cache_entries: Option<NonZeroUsize>,

	/// File holding local state. Loaded on start if it exists and written on shutdown.
	#[arg(short, long)]
	pub state: Option<PathBuf>,
}

impl NodeArgs {
	/// Merge the configuration file, if any, with the command line flags.
	pub(crate) fn resolve(&self) -> Result<NodeConfig> {
		let mut config = match &self.config {
			Some(path) => NodeConfig::load(path)?,
			None => NodeConfig::default(),
		};

		if let Some(chain_id) = self.chain_id {
			config.chain_id = Some(chain_id);
		}
		if let Some(url) = &self.fork_url {
			match config.forking.as_mut() {
				Some(forking) => {
					forking.url = Some(url.clone());
					forking.enabled = true;
				},
				None => config.forking = Some(ForkingConfig::new(url.clone())),
			}
		}
		if self.no_fork &&
			let Some(forking) = config.forking.as_mut()
		{
			forking.enabled = false;
		}

		if self.fork_block_number.is_some() || self.max_cache_entries.is_some() {
			let Some(forking) = config.forking.as_mut().filter(|forking| forking.enabled) else {
				anyhow::bail!("--fork-block-number and --max-cache-entries require a fork url");
			};
			if let Some(number) = self.fork_block_number {
				forking.block_number = Some(number);
			}
			if let Some(max) = self.max_cache_entries {
				forking.max_cache_entries = Some(max);
			}
		}

		if let Some(host) = self.host {
			config.server.host = host;
		}
		if let Some(port) = self.port {
			config.server.port = port;
		}

		config.validate()?;
		Ok(config)
	}
}

pub(crate) struct Command;

impl Command {
	pub(crate) async fn execute(args: &NodeArgs) -> Result<()> {
		let config = args.resolve()?;
		if let Some(url) = config.active_fork().and_then(|forking| forking.url.as_ref()) {
			log::debug!("Upstream endpoint: {}", redact_endpoint(url));
		}

		let session = ForkSession::start(&config).await?;
		if let Some(path) = &args.state &&
			path.exists()
		{
			session.load_from(path)?;
		}

		let server = ForkRpcServer::start(
			session.provider().clone(),
			RpcServerConfig::from(&config.server),
		)
		.await?;

		let pin = session.pin();
		let ready = if session.provider().is_forked() {
			messages::forked(pin.chain_id, pin.number, &server.http_url())
		} else {
			messages::local(pin.chain_id, &server.http_url())
		};
		log::info!("{ready}");
		log::info!("{}", messages::websocket(&server.ws_url()));
		log::info!("{}", messages::PRESS_CTRL_C);

		// Wait for termination signal
		tokio::signal::ctrl_c().await?;

		log::info!("{}", messages::SHUTTING_DOWN);
		session.shutdown();
		server.stop().await;
		if let Some(path) = &args.state {
			session.dump_to(path)?;
		}

		log::info!("{}", messages::SHUTDOWN_COMPLETE);
		Ok(())
	}
}
