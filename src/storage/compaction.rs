//! Log compaction for the file backend.
//!
//! The file table appends every mutation to a write-ahead log. Once the
//! number of entries logged since the last snapshot reaches the policy
//! threshold, the table writes a snapshot of its full index and deletes the
//! segments the snapshot covers.

use crate::core::config::CompactionConfig;
use serde::{Deserialize, Serialize};

/// When to snapshot and truncate the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionPolicy {
    /// Whether automatic compaction runs.
    pub enabled: bool,

    /// Logged entries between snapshots.
    pub max_log_entries: u64,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_log_entries: 10_000,
        }
    }
}

impl From<&CompactionConfig> for CompactionPolicy {
    fn from(config: &CompactionConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_log_entries: config.max_log_entries,
        }
    }
}

impl CompactionPolicy {
    /// A policy that never compacts automatically.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Compact after every `entries` logged mutations.
    pub fn every(entries: u64) -> Self {
        Self {
            enabled: true,
            max_log_entries: entries.max(1),
        }
    }

    /// Check whether the log should be compacted now.
    pub fn should_compact(&self, entries_since_snapshot: u64) -> bool {
        self.enabled && entries_since_snapshot >= self.max_log_entries
    }
}

/// Point-in-time view of a file table, for inspection tooling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    /// Live rows.
    pub item_count: usize,
    /// Sequence number of the last logged entry.
    pub last_seq: u64,
    /// Entries logged since the last snapshot.
    pub entries_since_snapshot: u64,
    /// Log segment files on disk.
    pub segment_count: usize,
    /// Sequence number covered by the newest snapshot, if any.
    pub snapshot_seq: Option<u64>,
}
