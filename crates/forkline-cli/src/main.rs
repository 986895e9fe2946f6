// SPDX-License-Identifier: GPL-3.0

mod node;

use anyhow::Result;
use clap::Parser;
use env_logger::Env;

#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
	#[command(flatten)]
	node: node::NodeArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
	env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
	let cli = Cli::parse();
	node::Command::execute(&cli.node).await
}
