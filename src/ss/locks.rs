//! The active `LockedFile` registry (specification §4.5): tracks which
//! (file, sentence) pairs are currently held open for a write session.
//!
//! Backed by `whirlwind::ShardMap` (an async sharded concurrent map, already
//! in the teacher's manifest) for the actual key/value storage, since lock
//! sessions are independent across distinct keys and a sharded map avoids
//! funneling every user's lock/unlock through one global mutex for the hot
//! path (`is_locked_by_other`). A single `tokio::sync::Mutex` over a small
//! per-(file,user) session index serializes the check-then-insert sequence
//! that enforces "at most one active `LockedFile` per distinct sentence
//! node" (specification §5) and lets `cleanup_user_locks` find a dropped
//! session's locks without scanning the whole map.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use whirlwind::ShardMap;

use crate::error::{Result, ScriptoriumError};
use crate::util::now_secs;

/// Identifies a sentence by the node's position *at lock-acquisition time*.
/// A session keeps writing to this identity even if other sessions insert or
/// delete sentences elsewhere in the same file while this lock is held — the
/// snapshot-by-identity rule of specification §4.5.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub filename: String,
    pub sentence_idx: usize,
}

#[derive(Debug, Clone)]
pub struct LockedFile {
    pub user: String,
    pub locked_at: u64,
    /// Text of every sentence in the file at the moment this lock was
    /// acquired — the snapshot-by-identity view this session edits against.
    pub sentence_list_snapshot: Vec<String>,
    /// Whole-file body this session's first lock saw, kept so the lazily
    /// captured undo snapshot always reflects pre-session state.
    pub original_text: String,
    /// Whether this session has already captured its undo snapshot. Every
    /// lock a session holds on the same file carries the same value — set
    /// at acquisition time for locks joining an already-active session, and
    /// flipped for all of them together on the session's first write.
    pub undo_saved: bool,
}

pub struct LockRegistry {
    entries: ShardMap<LockKey, LockedFile>,
    /// `(filename, user) -> keys that user currently holds in that file`.
    sessions: Mutex<HashMap<(String, String), Vec<LockKey>>>,
}

impl LockRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { entries: ShardMap::new(), sessions: Mutex::new(HashMap::new()) })
    }

    /// Acquires the lock for `key` on behalf of `user`, failing with
    /// `SentenceLocked` if another user already holds it. `sentence_list_snapshot`
    /// and `original_text` seed this lock's record of the file as it stood at
    /// acquisition time.
    pub async fn lock(
        &self,
        key: LockKey,
        user: &str,
        sentence_list_snapshot: Vec<String>,
        original_text: String,
    ) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = self.entries.get(&key).await {
            if existing.user != user {
                return Err(ScriptoriumError::SentenceLocked);
            }
            return Ok(());
        }
        let session_key = (key.filename.clone(), user.to_string());
        // A lock joining a session that already holds other sentences in
        // this file inherits "already saved" — the session's undo snapshot
        // was captured (or will be) against the file as it stood before any
        // of its writes, not this lock's.
        let already_active = sessions.get(&session_key).map(|keys| !keys.is_empty()).unwrap_or(false);
        self.entries
            .insert(
                key.clone(),
                LockedFile {
                    user: user.to_string(),
                    locked_at: now_secs(),
                    sentence_list_snapshot,
                    original_text,
                    undo_saved: already_active,
                },
            )
            .await;
        sessions.entry(session_key).or_default().push(key);
        Ok(())
    }

    /// Returns `true` exactly once per (filename, user) session — when the
    /// caller should capture the lazy undo snapshot (specification §4.5) —
    /// flipping every lock this session currently holds on `filename` to
    /// "already saved" in the same step, so a later write against a
    /// different sentence in the same session never re-snapshots.
    pub async fn take_undo_responsibility(&self, filename: &str, user: &str) -> bool {
        let sessions = self.sessions.lock().await;
        let Some(keys) = sessions.get(&(filename.to_string(), user.to_string())) else {
            return false;
        };
        let mut first = false;
        for key in keys {
            if let Some(mut locked) = self.entries.get(key).await {
                if !locked.undo_saved {
                    first = true;
                    locked.undo_saved = true;
                    self.entries.insert(key.clone(), locked).await;
                }
            }
        }
        first
    }

    /// Releases `key`, only if `user` is the one holding it.
    pub async fn unlock(&self, key: &LockKey, user: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        match self.entries.get(key).await {
            Some(existing) if existing.user == user => {
                self.entries.remove(key).await;
                if let Some(keys) = sessions.get_mut(&(key.filename.clone(), user.to_string())) {
                    keys.retain(|k| k != key);
                }
                Ok(())
            }
            Some(_) => Err(ScriptoriumError::PermissionDenied),
            None => Err(ScriptoriumError::SentenceLocked),
        }
    }

    pub async fn is_locked_by_other(&self, key: &LockKey, user: &str) -> bool {
        match self.entries.get(key).await {
            Some(existing) => existing.user != user,
            None => false,
        }
    }

    pub async fn holder(&self, key: &LockKey) -> Option<String> {
        self.entries.get(key).await.map(|locked| locked.user)
    }

    /// Releases every lock `user` holds on `filename` — called when a
    /// session drops its connection without a clean `WRITE_UNLOCK`.
    pub async fn cleanup_user_locks(&self, filename: &str, user: &str) {
        let mut sessions = self.sessions.lock().await;
        if let Some(keys) = sessions.remove(&(filename.to_string(), user.to_string())) {
            for key in keys {
                self.entries.remove(&key).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_user_cannot_lock_same_sentence() {
        let registry = LockRegistry::new();
        let key = LockKey { filename: "a.txt".into(), sentence_idx: 0 };
        registry.lock(key.clone(), "alice", Vec::new(), String::new()).await.unwrap();
        assert_eq!(
            registry.lock(key.clone(), "bob", Vec::new(), String::new()).await,
            Err(ScriptoriumError::SentenceLocked)
        );
    }

    #[tokio::test]
    async fn relocking_by_same_user_is_idempotent() {
        let registry = LockRegistry::new();
        let key = LockKey { filename: "a.txt".into(), sentence_idx: 0 };
        registry.lock(key.clone(), "alice", Vec::new(), String::new()).await.unwrap();
        registry.lock(key.clone(), "alice", Vec::new(), String::new()).await.unwrap();
    }

    #[tokio::test]
    async fn unlock_by_non_holder_is_denied() {
        let registry = LockRegistry::new();
        let key = LockKey { filename: "a.txt".into(), sentence_idx: 0 };
        registry.lock(key.clone(), "alice", Vec::new(), String::new()).await.unwrap();
        assert_eq!(registry.unlock(&key, "bob").await, Err(ScriptoriumError::PermissionDenied));
        registry.unlock(&key, "alice").await.unwrap();
        assert!(!registry.is_locked_by_other(&key, "anyone").await);
    }

    #[tokio::test]
    async fn cleanup_releases_only_that_users_locks() {
        let registry = LockRegistry::new();
        let k0 = LockKey { filename: "a.txt".into(), sentence_idx: 0 };
        let k1 = LockKey { filename: "a.txt".into(), sentence_idx: 1 };
        registry.lock(k0.clone(), "alice", Vec::new(), String::new()).await.unwrap();
        registry.lock(k1.clone(), "bob", Vec::new(), String::new()).await.unwrap();
        registry.cleanup_user_locks("a.txt", "alice").await;
        assert!(!registry.is_locked_by_other(&k0, "anyone").await);
        assert!(registry.is_locked_by_other(&k1, "anyone").await);
    }

    #[tokio::test]
    async fn second_lock_in_same_session_inherits_undo_saved() {
        let registry = LockRegistry::new();
        let k0 = LockKey { filename: "a.txt".into(), sentence_idx: 0 };
        let k1 = LockKey { filename: "a.txt".into(), sentence_idx: 1 };
        registry.lock(k0.clone(), "alice", Vec::new(), String::new()).await.unwrap();
        assert!(registry.take_undo_responsibility("a.txt", "alice").await);
        registry.lock(k1.clone(), "alice", Vec::new(), String::new()).await.unwrap();
        assert!(!registry.take_undo_responsibility("a.txt", "alice").await);
    }
}
