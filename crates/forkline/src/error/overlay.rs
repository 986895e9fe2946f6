// SPDX-License-Identifier: GPL-3.0

use crate::SnapshotId;
use thiserror::Error;

/// Errors that can occur when working with the local overlay.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverlayError {
	/// The snapshot was already reverted past, or never existed.
	#[error("Stale snapshot request: {0} is unknown or already consumed")]
	StaleSnapshot(SnapshotId),
}
