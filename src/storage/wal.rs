//! Durable file-backed table.
//!
//! Every mutation is appended to a write-ahead log before it is applied to
//! the in-memory index, so a row acknowledged to the caller survives a
//! restart. On open the newest snapshot is loaded and any newer log entries
//! are replayed on top of it.
//!
//! # Layout
//!
//! ```text
//! <data_dir>/<table>/wal/segment_<id>.wal          length-prefixed bincode entries
//! <data_dir>/<table>/snapshots/snapshot_<seq>.snap full index as of <seq>
//! ```
//!
//! A partial entry at the tail of the last segment (a torn write) is
//! ignored on replay.

use super::compaction::{CompactionPolicy, TableStats};
use super::item::{Filter, Item, ItemKey};
use super::memory::{apply_increment, scan_partition};
use super::table::KeyValueTable;
use crate::core::context::RequestContext;
use crate::core::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// Default maximum segment size (16 MB).
const DEFAULT_SEGMENT_MAX_SIZE: u64 = 16 * 1024 * 1024;

/// Largest encoded entry accepted on append or replay (64 MB).
const MAX_ENTRY_SIZE: usize = 64 * 1024 * 1024;

/// A logged mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalOp {
    /// Full row upsert.
    Put(Item),
    /// Row removal.
    Delete(ItemKey),
}

/// A single WAL entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    /// Monotonic sequence number.
    pub seq: u64,
    /// The mutation.
    pub op: WalOp,
    /// Wall-clock time the entry was written (diagnostics only).
    pub timestamp_ms: u64,
}

impl WalEntry {
    /// Create a new WAL entry.
    pub fn new(seq: u64, op: WalOp) -> Self {
        let timestamp_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            seq,
            op,
            timestamp_ms,
        }
    }

    /// Serialize this entry to bytes.
    pub fn serialize(&self) -> StoreResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| StoreError::backend(format!("encode WAL entry: {e}")))
    }

    /// Deserialize an entry from bytes.
    pub fn deserialize(bytes: &[u8]) -> StoreResult<Self> {
        bincode::deserialize(bytes).map_err(|e| StoreError::decode("WAL entry", e))
    }
}

/// WAL segment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Segment is open for writing.
    Open,
    /// Segment is sealed and immutable.
    Sealed,
}

/// A WAL segment file.
#[derive(Debug)]
pub struct WalSegment {
    /// Segment ID (sequential).
    pub id: u64,
    /// Segment file path.
    pub path: PathBuf,
    /// Current size in bytes.
    pub size_bytes: u64,
    /// Maximum size before rotation.
    pub max_size_bytes: u64,
    /// Segment state.
    pub state: SegmentState,
}

impl WalSegment {
    /// Create a new segment.
    pub fn new(id: u64, path: PathBuf, max_size_bytes: u64) -> Self {
        Self {
            id,
            path,
            size_bytes: 0,
            max_size_bytes,
            state: SegmentState::Open,
        }
    }

    /// Check if this segment is full.
    pub fn is_full(&self) -> bool {
        self.size_bytes >= self.max_size_bytes
    }

    /// Seal this segment (make it immutable).
    pub fn seal(&mut self) {
        self.state = SegmentState::Sealed;
    }
}

/// Snapshot metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Last WAL sequence number reflected in the snapshot.
    pub last_seq: u64,
    /// Creation timestamp.
    pub created_at_ms: u64,
    /// Rows in the snapshot.
    pub item_count: usize,
}

/// Full table image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot metadata.
    pub meta: SnapshotMeta,
    /// Every live row.
    pub items: Vec<Item>,
}

impl Snapshot {
    /// Write the snapshot atomically (temp file, then rename).
    pub fn write_to_file(&self, path: &Path) -> StoreResult<()> {
        let tmp = path.with_extension("snap.tmp");
        let bytes = bincode::serialize(self)
            .map_err(|e| StoreError::backend(format!("encode snapshot: {e}")))?;
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            writer.write_all(&bytes)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Read a snapshot from a file.
    pub fn read_from_file(path: &Path) -> StoreResult<Self> {
        let mut bytes = Vec::new();
        BufReader::new(File::open(path)?).read_to_end(&mut bytes)?;
        bincode::deserialize(&bytes).map_err(|e| StoreError::decode("snapshot", e))
    }
}

/// Options for opening a file table.
#[derive(Debug, Clone)]
pub struct FileTableOptions {
    /// Compaction policy.
    pub compaction: CompactionPolicy,
    /// Maximum segment size before rotation.
    pub max_segment_size: u64,
    /// fsync after every append.
    pub sync_writes: bool,
}

impl Default for FileTableOptions {
    fn default() -> Self {
        Self {
            compaction: CompactionPolicy::default(),
            max_segment_size: DEFAULT_SEGMENT_MAX_SIZE,
            sync_writes: true,
        }
    }
}

struct FileState {
    index: BTreeMap<ItemKey, Item>,
    segment: WalSegment,
    /// `None` after a failed append until the segment is restored.
    writer: Option<BufWriter<File>>,
    next_seq: u64,
    next_segment_id: u64,
    entries_since_snapshot: u64,
    snapshot_seq: Option<u64>,
}

/// Durable table backed by a write-ahead log and snapshots.
pub struct FileTable {
    name: String,
    wal_dir: PathBuf,
    snapshot_dir: PathBuf,
    options: FileTableOptions,
    state: Mutex<FileState>,
}

impl std::fmt::Debug for FileTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTable")
            .field("name", &self.name)
            .field("wal_dir", &self.wal_dir)
            .finish()
    }
}

impl FileTable {
    /// Open (or create) the table `name` under `data_dir`.
    pub fn open(
        data_dir: impl AsRef<Path>,
        name: impl Into<String>,
        options: FileTableOptions,
    ) -> StoreResult<Self> {
        let name = name.into();
        let table_dir = data_dir.as_ref().join(&name);
        let wal_dir = table_dir.join("wal");
        let snapshot_dir = table_dir.join("snapshots");
        std::fs::create_dir_all(&wal_dir)?;
        std::fs::create_dir_all(&snapshot_dir)?;

        let mut index = BTreeMap::new();
        let mut last_seq = 0u64;
        let mut snapshot_seq = None;

        if let Some(path) = newest_snapshot(&snapshot_dir)? {
            let snapshot = Snapshot::read_from_file(&path)?;
            last_seq = snapshot.meta.last_seq;
            snapshot_seq = Some(snapshot.meta.last_seq);
            for item in snapshot.items {
                index.insert(item.key(), item);
            }
        }

        let segments = list_segments(&wal_dir)?;
        let mut replayed = 0u64;
        for (_, path) in &segments {
            for entry in read_segment_entries(path)? {
                if entry.seq <= last_seq {
                    continue;
                }
                last_seq = entry.seq;
                replayed += 1;
                apply(&mut index, entry.op);
            }
        }

        let next_segment_id = segments.last().map_or(0, |(id, _)| id + 1);
        let segment_path = segment_path(&wal_dir, next_segment_id);
        let segment = WalSegment::new(next_segment_id, segment_path, options.max_segment_size);
        let writer = open_segment_writer(&segment.path)?;

        tracing::info!(
            table = %name,
            items = index.len(),
            replayed,
            last_seq,
            "file table opened"
        );

        Ok(Self {
            name,
            wal_dir,
            snapshot_dir,
            options,
            state: Mutex::new(FileState {
                index,
                segment,
                writer: Some(writer),
                next_seq: last_seq + 1,
                next_segment_id: next_segment_id + 1,
                entries_since_snapshot: replayed,
                snapshot_seq,
            }),
        })
    }

    /// Write a snapshot now and drop the segments it covers.
    pub fn compact(&self) -> StoreResult<SnapshotMeta> {
        let mut state = self.state.lock();
        self.compact_locked(&mut state)
    }

    /// Current table statistics.
    pub fn stats(&self) -> StoreResult<TableStats> {
        let state = self.state.lock();
        Ok(TableStats {
            item_count: state.index.len(),
            last_seq: state.next_seq - 1,
            entries_since_snapshot: state.entries_since_snapshot,
            segment_count: list_segments(&self.wal_dir)?.len(),
            snapshot_seq: state.snapshot_seq,
        })
    }

    fn append(&self, state: &mut FileState, op: WalOp) -> StoreResult<()> {
        if state.writer.is_none() {
            self.restore_segment(state)?;
        }
        if state.segment.is_full() {
            self.rotate(state)?;
        }

        let entry = WalEntry::new(state.next_seq, op);
        let bytes = entry.serialize()?;
        if bytes.len() > MAX_ENTRY_SIZE {
            return Err(StoreError::invalid_input(format!(
                "row encodes to {} bytes, limit is {MAX_ENTRY_SIZE}",
                bytes.len()
            )));
        }
        let len = bytes.len() as u32;

        // A failed write may still have reached the disk, so its sequence
        // number is never handed out again.
        state.next_seq += 1;
        if let Err(e) = self.write_frame(state, len, &bytes) {
            tracing::warn!(table = %self.name, seq = entry.seq, error = %e, "WAL append failed");
            if let Some(writer) = state.writer.take() {
                // Discard buffered bytes instead of flushing them on drop.
                let _ = writer.into_parts();
            }
            if let Err(restore) = self.restore_segment(state) {
                tracing::warn!(table = %self.name, error = %restore, "WAL segment restore failed");
            }
            return Err(e);
        }

        state.segment.size_bytes += 4 + bytes.len() as u64;
        state.entries_since_snapshot += 1;

        apply(&mut state.index, entry.op);
        Ok(())
    }

    fn write_frame(&self, state: &mut FileState, len: u32, bytes: &[u8]) -> StoreResult<()> {
        let writer = state
            .writer
            .as_mut()
            .ok_or_else(|| StoreError::backend("WAL segment is not open"))?;
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(bytes)?;
        writer.flush()?;
        if self.options.sync_writes {
            writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Cut the open segment back to its last acknowledged entry and reopen
    /// the writer.
    fn restore_segment(&self, state: &mut FileState) -> StoreResult<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&state.segment.path)?;
        file.set_len(state.segment.size_bytes)?;
        if self.options.sync_writes {
            file.sync_data()?;
        }
        state.writer = Some(BufWriter::new(file));
        tracing::debug!(
            table = %self.name,
            segment = state.segment.id,
            size_bytes = state.segment.size_bytes,
            "WAL segment restored"
        );
        Ok(())
    }

    fn rotate(&self, state: &mut FileState) -> StoreResult<()> {
        state.segment.seal();
        let id = state.next_segment_id;
        state.next_segment_id += 1;
        let segment = WalSegment::new(
            id,
            segment_path(&self.wal_dir, id),
            self.options.max_segment_size,
        );
        state.writer = Some(open_segment_writer(&segment.path)?);
        state.segment = segment;
        Ok(())
    }

    fn compact_locked(&self, state: &mut FileState) -> StoreResult<SnapshotMeta> {
        let last_seq = state.next_seq - 1;
        let meta = SnapshotMeta {
            last_seq,
            created_at_ms: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            item_count: state.index.len(),
        };
        let snapshot = Snapshot {
            meta: meta.clone(),
            items: state.index.values().cloned().collect(),
        };
        let path = self
            .snapshot_dir
            .join(format!("snapshot_{:016}.snap", last_seq));
        snapshot.write_to_file(&path)?;

        // Every segment up to and including the open one is covered now.
        let covered = list_segments(&self.wal_dir)?;
        self.rotate(state)?;
        for (_, segment) in covered {
            std::fs::remove_file(&segment)?;
        }
        for (seq, old) in list_snapshots(&self.snapshot_dir)? {
            if seq < last_seq {
                std::fs::remove_file(&old)?;
            }
        }

        state.entries_since_snapshot = 0;
        state.snapshot_seq = Some(last_seq);
        tracing::debug!(table = %self.name, last_seq, items = meta.item_count, "table compacted");
        Ok(meta)
    }

    fn maybe_compact(&self, state: &mut FileState) {
        if self
            .options
            .compaction
            .should_compact(state.entries_since_snapshot)
        {
            // The mutation is already durable in the log; a failed
            // snapshot only delays truncation.
            if let Err(e) = self.compact_locked(state) {
                tracing::warn!(table = %self.name, error = %e, "compaction failed");
            }
        }
    }
}

impl KeyValueTable for FileTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn put_item(&self, ctx: &RequestContext, item: Item) -> StoreResult<()> {
        ctx.check()?;
        let mut state = self.state.lock();
        self.append(&mut state, WalOp::Put(item))?;
        self.maybe_compact(&mut state);
        Ok(())
    }

    fn get_item(&self, ctx: &RequestContext, key: &ItemKey) -> StoreResult<Option<Item>> {
        ctx.check()?;
        Ok(self.state.lock().index.get(key).cloned())
    }

    fn delete_item(&self, ctx: &RequestContext, key: &ItemKey) -> StoreResult<()> {
        ctx.check()?;
        let mut state = self.state.lock();
        if !state.index.contains_key(key) {
            return Ok(());
        }
        self.append(&mut state, WalOp::Delete(key.clone()))?;
        self.maybe_compact(&mut state);
        Ok(())
    }

    fn query(
        &self,
        ctx: &RequestContext,
        pk: &str,
        filter: Option<&Filter>,
    ) -> StoreResult<Vec<Item>> {
        ctx.check()?;
        let state = self.state.lock();
        Ok(scan_partition(&state.index, pk, filter).cloned().collect())
    }

    fn increment(
        &self,
        ctx: &RequestContext,
        key: &ItemKey,
        attribute: &str,
        delta: i64,
    ) -> StoreResult<Option<i64>> {
        ctx.check()?;
        let mut state = self.state.lock();
        // Compute on a copy so a failed append leaves the index untouched.
        let mut scratch = BTreeMap::new();
        if let Some(existing) = state.index.get(key) {
            scratch.insert(key.clone(), existing.clone());
        }
        let next = apply_increment(&mut scratch, key, attribute, delta)?;
        let updated = scratch
            .remove(key)
            .ok_or_else(|| StoreError::backend("increment produced no row"))?;
        self.append(&mut state, WalOp::Put(updated))?;
        self.maybe_compact(&mut state);
        Ok(Some(next))
    }
}

fn apply(index: &mut BTreeMap<ItemKey, Item>, op: WalOp) {
    match op {
        WalOp::Put(item) => {
            index.insert(item.key(), item);
        }
        WalOp::Delete(key) => {
            index.remove(&key);
        }
    }
}

fn segment_path(wal_dir: &Path, id: u64) -> PathBuf {
    wal_dir.join(format!("segment_{:016}.wal", id))
}

fn open_segment_writer(path: &Path) -> StoreResult<BufWriter<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BufWriter::new(file))
}

/// Files in `dir` named `<prefix><number>.<ext>`, sorted by number.
fn numbered_files(dir: &Path, prefix: &str, ext: &str) -> StoreResult<Vec<(u64, PathBuf)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(ext) {
            continue;
        }
        let number = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_prefix(prefix))
            .and_then(|s| s.parse::<u64>().ok());
        if let Some(number) = number {
            files.push((number, path));
        }
    }
    files.sort_by_key(|(number, _)| *number);
    Ok(files)
}

fn list_segments(wal_dir: &Path) -> StoreResult<Vec<(u64, PathBuf)>> {
    numbered_files(wal_dir, "segment_", "wal")
}

fn list_snapshots(snapshot_dir: &Path) -> StoreResult<Vec<(u64, PathBuf)>> {
    numbered_files(snapshot_dir, "snapshot_", "snap")
}

fn newest_snapshot(snapshot_dir: &Path) -> StoreResult<Option<PathBuf>> {
    Ok(list_snapshots(snapshot_dir)?.pop().map(|(_, path)| path))
}

/// Read every complete entry in a segment, stopping at a torn tail.
fn read_segment_entries(path: &Path) -> StoreResult<Vec<WalEntry>> {
    let mut entries = Vec::new();
    let mut reader = BufReader::new(File::open(path)?);
    let mut len_buf = [0u8; 4];

    loop {
        match reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_ENTRY_SIZE {
            return Err(StoreError::decode(
                "WAL entry",
                format!("length prefix {len} in {} exceeds {MAX_ENTRY_SIZE}", path.display()),
            ));
        }
        let mut entry_buf = vec![0u8; len];
        match reader.read_exact(&mut entry_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                tracing::warn!(segment = %path.display(), "ignoring torn WAL tail");
                break;
            }
            Err(e) => return Err(e.into()),
        }

        entries.push(WalEntry::deserialize(&entry_buf)?);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> FileTableOptions {
        FileTableOptions {
            compaction: CompactionPolicy::disabled(),
            sync_writes: false,
            ..Default::default()
        }
    }

    #[test]
    fn torn_tail_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RequestContext::background();
        {
            let table = FileTable::open(dir.path(), "t", options()).unwrap();
            table.put_item(&ctx, Item::new("p", "a")).unwrap();
        }

        // Simulate a crash halfway through the next append.
        let wal_dir = dir.path().join("t").join("wal");
        let (_, path) = list_segments(&wal_dir).unwrap().pop().unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&100u32.to_le_bytes()).unwrap();
        file.write_all(b"partial").unwrap();
        drop(file);

        let table = FileTable::open(dir.path(), "t", options()).unwrap();
        assert!(table
            .get_item(&ctx, &ItemKey::new("p", "a"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn failed_append_is_not_replayed() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RequestContext::background();
        {
            let table = FileTable::open(dir.path(), "t", options()).unwrap();
            table.put_item(&ctx, Item::new("p", "a")).unwrap();

            // A read-only handle buffers the next entry, then fails the flush.
            {
                let mut state = table.state.lock();
                let path = state.segment.path.clone();
                state.writer = Some(BufWriter::new(File::open(&path).unwrap()));
            }
            assert!(table.put_item(&ctx, Item::new("p", "lost")).is_err());
            assert!(table
                .get_item(&ctx, &ItemKey::new("p", "lost"))
                .unwrap()
                .is_none());

            table.put_item(&ctx, Item::new("p", "after")).unwrap();
            assert_eq!(table.stats().unwrap().last_seq, 3);
        }

        let table = FileTable::open(dir.path(), "t", options()).unwrap();
        let rows = table.query(&ctx, "p", None).unwrap();
        let sks: Vec<_> = rows.iter().map(|r| r.sk.as_str()).collect();
        assert_eq!(sks, vec!["a", "after"]);
    }

    #[test]
    fn oversized_length_prefix_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RequestContext::background();
        {
            let table = FileTable::open(dir.path(), "t", options()).unwrap();
            table.put_item(&ctx, Item::new("p", "a")).unwrap();
        }

        let wal_dir = dir.path().join("t").join("wal");
        let (_, path) = list_segments(&wal_dir).unwrap().pop().unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&u32::MAX.to_le_bytes()).unwrap();
        file.write_all(b"garbage").unwrap();
        drop(file);

        let err = FileTable::open(dir.path(), "t", options()).unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
    }

    #[test]
    fn small_segments_rotate() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RequestContext::background();
        let table = FileTable::open(
            dir.path(),
            "t",
            FileTableOptions {
                max_segment_size: 1,
                ..options()
            },
        )
        .unwrap();
        for i in 0..3 {
            table
                .put_item(&ctx, Item::new("p", i.to_string()))
                .unwrap();
        }
        assert!(table.stats().unwrap().segment_count >= 3);
    }
}
