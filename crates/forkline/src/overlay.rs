// SPDX-License-Identifier: GPL-3.0

//! Local write layer on top of the forked state.
//!
//! [`LocalOverlay`] absorbs every write made by local execution. It is indexed by the same
//! [`StateKey`]s as the remote cache and takes precedence over it: a key present in the
//! overlay hides whatever the remote says, and a deleted key is recorded as a
//! [`OverlayEntry::Tombstone`] so the remote value stays hidden.
//!
//! # Snapshots
//!
//! Every mutation gets a sequence number. [`LocalOverlay::snapshot`] records the current
//! number; [`LocalOverlay::revert_to`] undoes every mutation made after it. Snapshots
//! follow stack discipline: reverting to a snapshot also discards every snapshot taken
//! after it, and a discarded snapshot cannot be used again.
//!
//! Mutations are only journaled while at least one snapshot is open.

use crate::{
	error::OverlayError,
	types::{StateKey, StateValue},
};
use alloy_primitives::U64;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, sync::Arc};

/// Identifier of an overlay snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "U64", into = "U64")]
pub struct SnapshotId(pub u64);

impl From<U64> for SnapshotId {
	fn from(id: U64) -> Self {
		SnapshotId(id.to::<u64>())
	}
}

impl From<SnapshotId> for U64 {
	fn from(id: SnapshotId) -> Self {
		U64::from(id.0)
	}
}

impl fmt::Display for SnapshotId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "snapshot 0x{:x}", self.0)
	}
}

/// A locally written entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum OverlayEntry {
	/// A locally written value.
	Value(StateValue),
	/// A locally deleted key.
	Tombstone,
}

/// Result of an overlay lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum OverlayLookup {
	/// The key was written locally.
	Value(StateValue),
	/// The key was deleted locally.
	Tombstone,
	/// The overlay knows nothing about the key.
	Absent,
}

enum Change {
	Entry { key: StateKey, previous: Option<OverlayEntry> },
	Head { previous: Option<u64> },
}

struct JournalRecord {
	seq: u64,
	change: Change,
}

struct Checkpoint {
	id: SnapshotId,
	seq: u64,
}

#[derive(Default)]
struct OverlayState {
	entries: HashMap<StateKey, OverlayEntry>,
	head: Option<u64>,
	seq: u64,
	journal: Vec<JournalRecord>,
	snapshots: Vec<Checkpoint>,
	next_snapshot: u64,
}

impl OverlayState {
	fn record(&mut self, change: Change) {
		self.seq += 1;
		if !self.snapshots.is_empty() {
			self.journal.push(JournalRecord { seq: self.seq, change });
		}
	}

	fn set_entry(&mut self, key: StateKey, entry: OverlayEntry) {
		let previous = self.entries.insert(key, entry);
		self.record(Change::Entry { key, previous });
	}
}

/// Copy-on-write layer holding every local modification.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone, Default)]
pub struct LocalOverlay {
	state: Arc<RwLock<OverlayState>>,
}

impl LocalOverlay {
	/// Create an empty overlay.
	pub fn new() -> Self {
		Self::default()
	}

	/// Look up a key.
	pub fn get(&self, key: &StateKey) -> OverlayLookup {
		match self.state.read().entries.get(key) {
			Some(OverlayEntry::Value(value)) => OverlayLookup::Value(value.clone()),
			Some(OverlayEntry::Tombstone) => OverlayLookup::Tombstone,
			None => OverlayLookup::Absent,
		}
	}

	/// Write a value.
	pub fn put(&self, key: StateKey, value: StateValue) {
		self.state.write().set_entry(key, OverlayEntry::Value(value));
	}

	/// Delete a key, hiding any remote value behind a tombstone.
	pub fn delete(&self, key: StateKey) {
		self.state.write().set_entry(key, OverlayEntry::Tombstone);
	}

	/// Height of the newest locally produced block, if any.
	pub fn head(&self) -> Option<u64> {
		self.state.read().head
	}

	/// Record a new local head.
	pub fn set_head(&self, number: u64) {
		let mut state = self.state.write();
		let previous = state.head.replace(number);
		state.record(Change::Head { previous });
	}

	/// Take a snapshot of the current overlay.
	pub fn snapshot(&self) -> SnapshotId {
		let mut state = self.state.write();
		state.next_snapshot += 1;
		let id = SnapshotId(state.next_snapshot);
		let seq = state.seq;
		state.snapshots.push(Checkpoint { id, seq });
		log::debug!("Took {id} at sequence {seq}");
		id
	}

	/// Undo every mutation made after snapshot `id` was taken.
	///
	/// Consumes `id` and every snapshot taken after it.
	pub fn revert_to(&self, id: SnapshotId) -> Result<(), OverlayError> {
		let mut state = self.state.write();
		let position = state
			.snapshots
			.iter()
			.position(|checkpoint| checkpoint.id == id)
			.ok_or(OverlayError::StaleSnapshot(id))?;
		let target = state.snapshots[position].seq;
		state.snapshots.truncate(position);

		let mut undone = 0usize;
		while state.journal.last().is_some_and(|record| record.seq > target) {
			let Some(record) = state.journal.pop() else { break };
			match record.change {
				Change::Entry { key, previous: Some(entry) } => {
					state.entries.insert(key, entry);
				},
				Change::Entry { key, previous: None } => {
					state.entries.remove(&key);
				},
				Change::Head { previous } => state.head = previous,
			}
			undone += 1;
		}
		if state.snapshots.is_empty() {
			state.journal.clear();
		}
		log::debug!("Reverted to {id}, undoing {undone} change(s)");
		Ok(())
	}

	/// Current mutation sequence number.
	pub fn sequence(&self) -> u64 {
		self.state.read().seq
	}

	/// Number of open snapshots.
	pub fn open_snapshots(&self) -> usize {
		self.state.read().snapshots.len()
	}

	/// Number of local entries, tombstones included.
	pub fn len(&self) -> usize {
		self.state.read().entries.len()
	}

	/// Whether nothing was written locally.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// All local entries, in no particular order.
	pub fn diff(&self) -> Vec<(StateKey, OverlayEntry)> {
		self.state.read().entries.iter().map(|(key, entry)| (*key, entry.clone())).collect()
	}

	/// Replace the whole overlay, discarding all snapshots.
	pub fn replace(&self, entries: Vec<(StateKey, OverlayEntry)>, head: Option<u64>) {
		let mut state = self.state.write();
		state.entries = entries.into_iter().collect();
		state.head = head;
		state.seq += 1;
		state.journal.clear();
		state.snapshots.clear();
	}
}
