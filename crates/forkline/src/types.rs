// SPDX-License-Identifier: GPL-3.0

//! Keys and values of forked chain state.
//!
//! Every piece of data the fork can serve is addressed by a [`StateKey`]. Each key kind
//! carries exactly the fields it needs, and accepts exactly one [`StateValue`] shape.
//! Blocks, transactions and receipts are kept as [`BlockRecord`], [`TransactionRecord`]
//! and [`ReceiptRecord`]: the fields the fork reasons about are typed, everything else the
//! remote returns is carried through untouched.

use crate::strings::rpc::tags;
use alloy_primitives::{Address, B256, Bytes, U64, U256, keccak256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Gas limit advertised by locally produced blocks.
const LOCAL_BLOCK_GAS_LIMIT: u64 = 30_000_000;

/// Identifies a block either by height or by hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockId {
	/// Block height.
	Number(u64),
	/// Block hash.
	Hash(B256),
}

impl From<u64> for BlockId {
	fn from(number: u64) -> Self {
		BlockId::Number(number)
	}
}

impl From<B256> for BlockId {
	fn from(hash: B256) -> Self {
		BlockId::Hash(hash)
	}
}

impl fmt::Display for BlockId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			BlockId::Number(number) => write!(f, "#{number}"),
			BlockId::Hash(hash) => write!(f, "{hash}"),
		}
	}
}

/// Address of a single piece of chain state or history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "camelCase")]
pub enum StateKey {
	/// Balance of an account, in wei.
	AccountBalance(Address),
	/// Deployed bytecode of an account.
	AccountCode(Address),
	/// Transaction count of an account.
	AccountNonce(Address),
	/// A contract storage slot.
	StorageSlot(Address, U256),
	/// A block with transaction hashes only.
	BlockHeader(BlockId),
	/// A block with full transaction objects.
	BlockByNumber(u64),
	/// A transaction looked up by hash.
	TransactionByHash(B256),
	/// The receipt of a transaction.
	TransactionReceipt(B256),
}

impl StateKey {
	/// Short name of the key kind.
	pub fn kind(&self) -> &'static str {
		match self {
			StateKey::AccountBalance(_) => "balance",
			StateKey::AccountCode(_) => "code",
			StateKey::AccountNonce(_) => "nonce",
			StateKey::StorageSlot(..) => "storage",
			StateKey::BlockHeader(_) | StateKey::BlockByNumber(_) => "block",
			StateKey::TransactionByHash(_) => "transaction",
			StateKey::TransactionReceipt(_) => "receipt",
		}
	}

	/// Whether `value` has the shape this key kind stores.
	pub fn accepts(&self, value: &StateValue) -> bool {
		self.kind() == value.kind()
	}

	/// Whether the key addresses account state, which varies with block height.
	///
	/// History keys (blocks, transactions, receipts) resolve to the same value at every
	/// height.
	pub fn is_account_state(&self) -> bool {
		matches!(
			self,
			StateKey::AccountBalance(_) |
				StateKey::AccountCode(_) |
				StateKey::AccountNonce(_) |
				StateKey::StorageSlot(..)
		)
	}

	/// The block height the key names explicitly, if any.
	pub fn block_number(&self) -> Option<u64> {
		match self {
			StateKey::BlockHeader(BlockId::Number(number)) | StateKey::BlockByNumber(number) =>
				Some(*number),
			_ => None,
		}
	}
}

impl fmt::Display for StateKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StateKey::AccountBalance(address) => write!(f, "balance of {address}"),
			StateKey::AccountCode(address) => write!(f, "code of {address}"),
			StateKey::AccountNonce(address) => write!(f, "nonce of {address}"),
			StateKey::StorageSlot(address, slot) => write!(f, "storage {slot:#x} of {address}"),
			StateKey::BlockHeader(id) => write!(f, "block {id}"),
			StateKey::BlockByNumber(number) => write!(f, "full block #{number}"),
			StateKey::TransactionByHash(hash) => write!(f, "transaction {hash}"),
			StateKey::TransactionReceipt(hash) => write!(f, "receipt {hash}"),
		}
	}
}

/// A value stored under a [`StateKey`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum StateValue {
	/// Account balance, in wei.
	Balance(U256),
	/// Account bytecode.
	Code(Bytes),
	/// Account transaction count.
	Nonce(u64),
	/// Storage slot value.
	Storage(U256),
	/// A block.
	Block(BlockRecord),
	/// A transaction.
	Transaction(TransactionRecord),
	/// A transaction receipt.
	Receipt(ReceiptRecord),
}

impl StateValue {
	/// Short name of the value kind, matching [`StateKey::kind`].
	pub fn kind(&self) -> &'static str {
		match self {
			StateValue::Balance(_) => "balance",
			StateValue::Code(_) => "code",
			StateValue::Nonce(_) => "nonce",
			StateValue::Storage(_) => "storage",
			StateValue::Block(_) => "block",
			StateValue::Transaction(_) => "transaction",
			StateValue::Receipt(_) => "receipt",
		}
	}

	/// Drops history records that lie beyond block `pin`.
	///
	/// Pending transactions have no block yet and are dropped as well.
	pub(crate) fn visible_at(self, pin: u64) -> Option<Self> {
		let mined_in = match &self {
			StateValue::Block(block) => Some(block.number()),
			StateValue::Transaction(tx) => tx.mined_in(),
			StateValue::Receipt(receipt) => receipt.mined_in(),
			_ => return Some(self),
		};
		mined_in.filter(|number| *number <= pin).map(|_| self)
	}
}

/// Transactions included in a block, either as hashes or as full objects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockTransactions {
	/// Transaction hashes.
	Hashes(Vec<B256>),
	/// Full transaction objects.
	Full(Vec<TransactionRecord>),
}

impl Default for BlockTransactions {
	fn default() -> Self {
		BlockTransactions::Hashes(Vec::new())
	}
}

impl BlockTransactions {
	/// Hashes of the included transactions.
	pub fn hashes(&self) -> Vec<B256> {
		match self {
			BlockTransactions::Hashes(hashes) => hashes.clone(),
			BlockTransactions::Full(txs) => txs.iter().map(|tx| tx.hash).collect(),
		}
	}
}

/// A block as returned by `eth_getBlockByNumber` / `eth_getBlockByHash`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRecord {
	/// Block height.
	pub number: U64,
	/// Block hash.
	pub hash: B256,
	/// Hash of the parent block.
	pub parent_hash: B256,
	/// Block timestamp, in seconds.
	pub timestamp: U64,
	/// Included transactions.
	#[serde(default)]
	pub transactions: BlockTransactions,
	/// Remaining fields, passed through verbatim.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl BlockRecord {
	/// Creates a block with no transactions and the header fields clients expect.
	pub fn new(number: u64, hash: B256, parent_hash: B256, timestamp: u64) -> Self {
		let mut extra = Map::new();
		extra.insert("nonce".into(), Value::String(format!("0x{:016x}", 0)));
		extra.insert("difficulty".into(), Value::String("0x0".into()));
		extra.insert("gasLimit".into(), Value::String(format!("0x{LOCAL_BLOCK_GAS_LIMIT:x}")));
		extra.insert("gasUsed".into(), Value::String("0x0".into()));
		extra.insert("miner".into(), Value::String(Address::ZERO.to_string()));
		extra.insert("extraData".into(), Value::String("0x".into()));
		extra.insert("baseFeePerGas".into(), Value::String("0x0".into()));
		Self {
			number: U64::from(number),
			hash,
			parent_hash,
			timestamp: U64::from(timestamp),
			transactions: BlockTransactions::default(),
			extra,
		}
	}

	/// Creates an empty block on top of `parent`.
	///
	/// The hash is derived from the parent hash, height and timestamp, so mining the same
	/// block twice yields the same hash.
	pub fn child_of(parent: &BlockRecord, timestamp: u64) -> Self {
		let number = parent.number() + 1;
		let mut preimage = Vec::with_capacity(48);
		preimage.extend_from_slice(parent.hash.as_slice());
		preimage.extend_from_slice(&number.to_be_bytes());
		preimage.extend_from_slice(&timestamp.to_be_bytes());
		Self::new(number, keccak256(&preimage), parent.hash, timestamp)
	}

	/// Block height as a plain integer.
	pub fn number(&self) -> u64 {
		self.number.to::<u64>()
	}

	/// Block timestamp as a plain integer.
	pub fn timestamp(&self) -> u64 {
		self.timestamp.to::<u64>()
	}

	/// The same block with transactions reduced to their hashes.
	pub fn header(&self) -> Self {
		Self { transactions: BlockTransactions::Hashes(self.transactions.hashes()), ..self.clone() }
	}
}

/// A transaction as returned by `eth_getTransactionByHash`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
	/// Transaction hash.
	pub hash: B256,
	/// Hash of the including block, `None` while pending.
	#[serde(default)]
	pub block_hash: Option<B256>,
	/// Height of the including block, `None` while pending.
	#[serde(default)]
	pub block_number: Option<U64>,
	/// Remaining fields, passed through verbatim.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl TransactionRecord {
	/// Height of the including block, if mined.
	pub fn mined_in(&self) -> Option<u64> {
		self.block_number.map(|number| number.to::<u64>())
	}
}

/// A receipt as returned by `eth_getTransactionReceipt`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptRecord {
	/// Hash of the transaction this receipt belongs to.
	pub transaction_hash: B256,
	/// Hash of the including block.
	#[serde(default)]
	pub block_hash: Option<B256>,
	/// Height of the including block.
	#[serde(default)]
	pub block_number: Option<U64>,
	/// Remaining fields, passed through verbatim.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl ReceiptRecord {
	/// Height of the including block, if known.
	pub fn mined_in(&self) -> Option<u64> {
		self.block_number.map(|number| number.to::<u64>())
	}
}

/// Error returned when a block tag cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid block tag: {0}")]
pub struct ParseBlockTagError(String);

/// Block selector accepted by state queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BlockTag {
	/// The local head.
	#[default]
	Latest,
	/// Block zero.
	Earliest,
	/// The block being built, which is the local head for a development node.
	Pending,
	/// The latest safe block, which is the local head for a development node.
	Safe,
	/// The latest finalized block, which is the local head for a development node.
	Finalized,
	/// A specific height.
	Number(u64),
}

impl BlockTag {
	/// The height this tag selects when the local head is `head`.
	pub fn number_at(&self, head: u64) -> u64 {
		match self {
			BlockTag::Earliest => 0,
			BlockTag::Number(number) => *number,
			BlockTag::Latest | BlockTag::Pending | BlockTag::Safe | BlockTag::Finalized => head,
		}
	}

	/// Whether the tag always follows the local head.
	pub fn is_head(&self) -> bool {
		matches!(self, BlockTag::Latest | BlockTag::Pending | BlockTag::Safe | BlockTag::Finalized)
	}
}

impl FromStr for BlockTag {
	type Err = ParseBlockTagError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			tags::LATEST => Ok(BlockTag::Latest),
			tags::EARLIEST => Ok(BlockTag::Earliest),
			tags::PENDING => Ok(BlockTag::Pending),
			tags::SAFE => Ok(BlockTag::Safe),
			tags::FINALIZED => Ok(BlockTag::Finalized),
			_ => {
				let parsed = match s.strip_prefix("0x") {
					Some(hex) => u64::from_str_radix(hex, 16),
					None => s.parse::<u64>(),
				};
				parsed.map(BlockTag::Number).map_err(|_| ParseBlockTagError(s.to_string()))
			},
		}
	}
}

impl TryFrom<String> for BlockTag {
	type Error = ParseBlockTagError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl fmt::Display for BlockTag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			BlockTag::Latest => f.write_str(tags::LATEST),
			BlockTag::Earliest => f.write_str(tags::EARLIEST),
			BlockTag::Pending => f.write_str(tags::PENDING),
			BlockTag::Safe => f.write_str(tags::SAFE),
			BlockTag::Finalized => f.write_str(tags::FINALIZED),
			BlockTag::Number(number) => write!(f, "0x{number:x}"),
		}
	}
}

impl From<BlockTag> for String {
	fn from(tag: BlockTag) -> Self {
		tag.to_string()
	}
}
