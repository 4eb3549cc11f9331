//! On-disk layout for one storage server's files (specification §4.5/§6):
//! the body at `<dir>/<file>`, a single-level undo snapshot at
//! `<dir>/<file>.undo`, named checkpoints at `<dir>/<file>.checkpoint.<tag>`,
//! and word/char counters at `<dir>/<file>.stats`.
//!
//! Every mutating write goes through `tempfile::NamedTempFile` (promoted
//! from the teacher's dev-dependency — see `DESIGN.md`) written in the same
//! directory as the target and then persisted (renamed) over it, so a crash
//! mid-write never leaves a half-written body on disk.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use tracing::error;

use crate::error::{Result, ScriptoriumError};

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn body_path(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    fn undo_path(&self, filename: &str) -> PathBuf {
        self.root.join(format!("{filename}.undo"))
    }

    fn checkpoint_path(&self, filename: &str, tag: &str) -> PathBuf {
        self.root.join(format!("{filename}.checkpoint.{tag}"))
    }

    fn write_atomic(&self, path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|_| ScriptoriumError::FileOperationFailed)?;
        }
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|_| ScriptoriumError::FileOperationFailed)?;
        tmp.write_all(contents.as_bytes()).map_err(|_| ScriptoriumError::FileOperationFailed)?;
        tmp.flush().map_err(|_| ScriptoriumError::FileOperationFailed)?;
        tmp.persist(path).map_err(|_| ScriptoriumError::FileOperationFailed)?;
        Ok(())
    }

    pub fn create_file(&self, filename: &str) -> Result<()> {
        let path = self.body_path(filename);
        if path.exists() {
            return Err(ScriptoriumError::FileExists);
        }
        self.write_atomic(&path, "")
    }

    pub fn delete_file(&self, filename: &str) -> Result<()> {
        let path = self.body_path(filename);
        std::fs::remove_file(&path).map_err(|_| ScriptoriumError::FileNotFound)?;
        let _ = std::fs::remove_file(self.undo_path(filename));
        Ok(())
    }

    pub fn read_body(&self, filename: &str) -> Result<String> {
        std::fs::read_to_string(self.body_path(filename)).map_err(|_| ScriptoriumError::FileNotFound)
    }

    /// Writes a new body, first snapshotting the old body to the undo slot
    /// so a single `UNDO` can reverse this write.
    pub fn write_body(&self, filename: &str, contents: &str) -> Result<()> {
        let current = self.read_body(filename)?;
        self.write_atomic(&self.undo_path(filename), &current)?;
        self.write_atomic(&self.body_path(filename), contents)
    }

    /// Writes `contents` straight into the undo slot without touching the
    /// live body — the caller already has the pre-edit body in hand (the
    /// lazy per-session snapshot of specification §4.5).
    pub fn write_undo_snapshot(&self, filename: &str, contents: &str) -> Result<()> {
        self.write_atomic(&self.undo_path(filename), contents)
    }

    /// Writes a new body without touching the undo slot — used for every
    /// write after a session's first, once its lazy undo snapshot is saved.
    pub fn write_body_preserving_undo(&self, filename: &str, contents: &str) -> Result<()> {
        self.write_atomic(&self.body_path(filename), contents)
    }

    /// Restores the body from the undo slot. Only one level of undo is kept,
    /// matching the specification's single-snapshot design — undoing twice
    /// in a row restores the same snapshot both times rather than walking
    /// further back.
    pub fn undo(&self, filename: &str) -> Result<String> {
        let undo_path = self.undo_path(filename);
        let snapshot = std::fs::read_to_string(&undo_path).map_err(|_| ScriptoriumError::UndoNotAvailable)?;
        self.write_atomic(&self.body_path(filename), &snapshot)?;
        Ok(snapshot)
    }

    pub fn create_checkpoint(&self, filename: &str, tag: &str) -> Result<()> {
        let checkpoint_path = self.checkpoint_path(filename, tag);
        if checkpoint_path.exists() {
            return Err(ScriptoriumError::CheckpointExists);
        }
        let body = self.read_body(filename)?;
        self.write_atomic(&checkpoint_path, &body)
    }

    pub fn view_checkpoint(&self, filename: &str, tag: &str) -> Result<String> {
        std::fs::read_to_string(self.checkpoint_path(filename, tag)).map_err(|_| ScriptoriumError::CheckpointNotFound)
    }

    /// Reverts the live body to a checkpoint's contents, snapshotting the
    /// pre-revert body to the undo slot first so a revert can itself be
    /// undone.
    pub fn revert(&self, filename: &str, tag: &str) -> Result<()> {
        let checkpoint = self.view_checkpoint(filename, tag)?;
        let current = self.read_body(filename)?;
        self.write_atomic(&self.undo_path(filename), &current)?;
        self.write_atomic(&self.body_path(filename), &checkpoint)
    }

    pub fn list_checkpoints(&self, filename: &str) -> Result<Vec<String>> {
        let prefix = format!("{filename}.checkpoint.");
        let mut tags = Vec::new();
        let entries = std::fs::read_dir(&self.root).map_err(|_| ScriptoriumError::FileOperationFailed)?;
        for entry in entries.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(tag) = name.strip_prefix(&prefix) {
                    tags.push(tag.to_string());
                }
            }
        }
        tags.sort();
        Ok(tags)
    }

    pub fn move_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        let old_path = self.body_path(old_name);
        let new_path = self.body_path(new_name);
        if let Some(parent) = new_path.parent() {
            std::fs::create_dir_all(parent).map_err(|_| ScriptoriumError::FileOperationFailed)?;
        }
        std::fs::rename(&old_path, &new_path).map_err(|_| ScriptoriumError::FileNotFound)?;
        let (old_undo, new_undo) = (self.undo_path(old_name), self.undo_path(new_name));
        if old_undo.exists() {
            if let Err(e) = std::fs::rename(&old_undo, &new_undo) {
                error!(error = %e, "failed to relocate undo snapshot during move");
            }
        }
        Ok(())
    }

    pub fn exists(&self, filename: &str) -> bool {
        self.body_path(filename).exists()
    }

    /// Writes `contents` as `filename`'s body regardless of whether it
    /// already exists — used by SYNC recovery, which overwrites rather than
    /// rejecting on `FileExists`.
    pub fn restore_body(&self, filename: &str, contents: &str) -> Result<()> {
        self.write_atomic(&self.body_path(filename), contents)
    }

    /// Every live file this server holds (sidecars excluded), for SYNC
    /// digests and directory recovery.
    pub fn list_all(&self) -> Result<Vec<(String, u64, u64)>> {
        let mut out = Vec::new();
        let entries = std::fs::read_dir(&self.root).map_err(|_| ScriptoriumError::FileOperationFailed)?;
        for entry in entries.flatten() {
            let name = match entry.file_name().into_string() {
                Ok(n) => n,
                Err(_) => continue,
            };
            if name.contains(".undo") || name.contains(".checkpoint.") || name.contains(".stats") {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                let mtime = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                out.push((name, mtime, meta.len()));
            }
        }
        Ok(out)
    }
}

pub fn word_char_counts(body: &str) -> (u64, u64) {
    (body.split_whitespace().count() as u64, body.chars().count() as u64)
}
