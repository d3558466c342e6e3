use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use crate::now_micros;
use crate::pipeline::AggregateMetrics;

pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 100;
pub const DEFAULT_CHECKPOINT_KEEP: usize = 5;

const FILE_PREFIX: &str = "checkpoint_";
const FILE_SUFFIX: &str = ".json";

/// Durable progress record for a run.
///
/// `frame_number` is the count of frames the loop had moved past when the
/// checkpoint was taken; it never runs ahead of real progress.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub video_path: String,
    pub frame_number: u64,
    pub total_frames: u64,
    pub detections_count: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub performance_metrics: AggregateMetrics,
}

pub trait CheckpointStore {
    /// Persists `checkpoint` and prunes old entries. Pruning problems are
    /// logged, never returned.
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()>;

    /// Most recent checkpoint recorded for `source_id`, if any.
    fn find_resumable(&self, source_id: &str) -> Result<Option<Checkpoint>>;

    /// All readable checkpoints, oldest first.
    fn list(&self) -> Result<Vec<Checkpoint>>;
}

// ----------------------------------------------------------------------------
// Filesystem store
// ----------------------------------------------------------------------------

/// One JSON document per checkpoint in a flat directory.
///
/// File names embed a strictly increasing microsecond stamp, so lexical
/// order is creation order. Files are written once and never mutated.
pub struct FsCheckpointStore {
    dir: PathBuf,
    keep: usize,
    last_stamp: u128,
}

impl FsCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>, keep: usize) -> Self {
        Self {
            dir: dir.into(),
            keep: keep.max(1),
            last_stamp: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_stamp(&mut self) -> Result<u128> {
        let stamp = now_micros()?.max(self.last_stamp + 1);
        self.last_stamp = stamp;
        Ok(stamp)
    }

    /// Checkpoint files with their stamps, oldest first.
    fn entries(&self) -> Result<Vec<(u128, PathBuf)>> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("listing checkpoints in {}", self.dir.display()))
            }
        };
        let mut entries = Vec::new();
        for entry in read_dir {
            let path = entry?.path();
            if let Some(stamp) = parse_stamp(&path) {
                entries.push((stamp, path));
            }
        }
        entries.sort_by_key(|(stamp, _)| *stamp);
        Ok(entries)
    }

    fn prune(&self) -> Result<usize> {
        let entries = self.entries()?;
        let excess = entries.len().saturating_sub(self.keep);
        let mut removed = 0;
        for (_, path) in entries.into_iter().take(excess) {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) => log::warn!("failed to prune checkpoint {}: {}", path.display(), err),
            }
        }
        Ok(removed)
    }

    fn read(path: &Path) -> Result<Checkpoint> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| anyhow!("invalid checkpoint {}: {}", path.display(), e))
    }
}

impl CheckpointStore for FsCheckpointStore {
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating checkpoint dir {}", self.dir.display()))?;

        let mut stamp = self.next_stamp()?;
        let mut path = self.dir.join(file_name(stamp));
        while path.exists() {
            stamp = self.next_stamp()?;
            path = self.dir.join(file_name(stamp));
        }

        let tmp = self.dir.join(format!(".{}.tmp", file_name(stamp)));
        let json = serde_json::to_vec_pretty(checkpoint)?;
        fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("publishing {}", path.display()))?;
        log::debug!(
            "checkpoint saved: {} frame {} -> {}",
            checkpoint.video_path,
            checkpoint.frame_number,
            path.display()
        );

        match self.prune() {
            Ok(0) => {}
            Ok(removed) => log::debug!("pruned {} old checkpoints", removed),
            Err(err) => log::warn!("checkpoint pruning failed: {:#}", err),
        }
        Ok(())
    }

    fn find_resumable(&self, source_id: &str) -> Result<Option<Checkpoint>> {
        for (_, path) in self.entries()?.into_iter().rev() {
            match Self::read(&path) {
                Ok(checkpoint) if checkpoint.video_path == source_id => return Ok(Some(checkpoint)),
                Ok(_) => {}
                Err(err) => log::warn!("skipping checkpoint: {:#}", err),
            }
        }
        Ok(None)
    }

    fn list(&self) -> Result<Vec<Checkpoint>> {
        let mut out = Vec::new();
        for (_, path) in self.entries()? {
            match Self::read(&path) {
                Ok(checkpoint) => out.push(checkpoint),
                Err(err) => log::warn!("skipping checkpoint: {:#}", err),
            }
        }
        Ok(out)
    }
}

fn file_name(stamp: u128) -> String {
    format!("{FILE_PREFIX}{stamp:020}{FILE_SUFFIX}")
}

fn parse_stamp(path: &Path) -> Option<u128> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?
        .parse()
        .ok()
}

// ----------------------------------------------------------------------------
// In-memory store
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct InMemoryCheckpointStore {
    entries: VecDeque<Checkpoint>,
    keep: usize,
}

impl InMemoryCheckpointStore {
    pub fn new(keep: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            keep: keep.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InMemoryCheckpointStore {
    fn default() -> Self {
        Self::new(DEFAULT_CHECKPOINT_KEEP)
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        self.entries.push_back(checkpoint.clone());
        while self.entries.len() > self.keep {
            self.entries.pop_front();
        }
        Ok(())
    }

    fn find_resumable(&self, source_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self
            .entries
            .iter()
            .rev()
            .find(|c| c.video_path == source_id)
            .cloned())
    }

    fn list(&self) -> Result<Vec<Checkpoint>> {
        Ok(self.entries.iter().cloned().collect())
    }
}

impl<S: CheckpointStore + ?Sized> CheckpointStore for Box<S> {
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        (**self).save(checkpoint)
    }

    fn find_resumable(&self, source_id: &str) -> Result<Option<Checkpoint>> {
        (**self).find_resumable(source_id)
    }

    fn list(&self) -> Result<Vec<Checkpoint>> {
        (**self).list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint(source: &str, frame_number: u64) -> Checkpoint {
        Checkpoint {
            video_path: source.to_string(),
            frame_number,
            total_frames: 1000,
            detections_count: frame_number * 2,
            timestamp: 1_700_000_000.0,
            performance_metrics: AggregateMetrics::default(),
        }
    }

    #[test]
    fn stamps_are_strictly_increasing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsCheckpointStore::new(dir.path(), 5);
        let a = store.next_stamp().unwrap();
        let b = store.next_stamp().unwrap();
        let c = store.next_stamp().unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn file_names_sort_by_stamp() {
        assert!(file_name(9) < file_name(10));
        assert_eq!(parse_stamp(Path::new(&file_name(42))), Some(42));
        assert_eq!(parse_stamp(Path::new("notes.json")), None);
        assert_eq!(parse_stamp(Path::new("checkpoint_abc.json")), None);
    }

    #[test]
    fn missing_dir_has_no_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsCheckpointStore::new(dir.path().join("absent"), 5);
        assert!(store.find_resumable("a").unwrap().is_none());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn corrupt_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsCheckpointStore::new(dir.path(), 5);
        store.save(&checkpoint("a", 100)).unwrap();
        fs::write(dir.path().join(file_name(u128::MAX / 2)), b"{not json").unwrap();
        let found = store.find_resumable("a").unwrap().unwrap();
        assert_eq!(found.frame_number, 100);
    }

    #[test]
    fn in_memory_store_keeps_latest() {
        let mut store = InMemoryCheckpointStore::new(2);
        for frame in [100, 200, 300] {
            store.save(&checkpoint("a", frame)).unwrap();
        }
        assert_eq!(store.len(), 2);
        assert_eq!(store.find_resumable("a").unwrap().unwrap().frame_number, 300);
        assert!(store.find_resumable("b").unwrap().is_none());
    }
}
