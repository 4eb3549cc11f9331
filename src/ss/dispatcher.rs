//! The storage server's request dispatcher (specification §4.5): one sum
//! type for the SS-internal op vocabulary, matched exhaustively, mirroring
//! the name server's dispatcher pattern (specification §4.3 EXPANSION).
//!
//! WRITE_LOCK / WRITE_WORD* / WRITE_UNLOCK is a session: the lock registry
//! enforces that only the session's own user can issue WRITE_WORD against a
//! sentence it holds. ETIRW (edit-then-immediately-release-write) runs the
//! same lock→modify→write→unlock sequence as one request for callers that
//! don't need a multi-message editing session.

use std::sync::Arc;

use tracing::warn;

use crate::error::ScriptoriumError;
use crate::ss::locks::{LockKey, LockRegistry};
use crate::ss::sentence::{parse_sentences, reconstruct};
use crate::ss::storage::{word_char_counts, FileStore};
use crate::wire::{Frame, Header, OpCode};

enum SsRequest {
    Create { filename: String },
    Delete { filename: String },
    Read { filename: String },
    WriteLock { filename: String, sentence_idx: i32 },
    WriteWord { filename: String, sentence_idx: i32, word_idx: i32, word: String },
    WriteUnlock { filename: String, sentence_idx: i32 },
    Etirw { filename: String, sentence_idx: i32, word_idx: i32, word: String },
    Undo { filename: String },
    Info { filename: String },
    Move { filename: String, new_name: String },
    Checkpoint { filename: String, tag: String },
    ViewCheckpoint { filename: String, tag: String },
    Revert { filename: String, tag: String },
    ListCheckpoints { filename: String },
    Stream { filename: String },
    SyncDigest,
    SyncFetch { filename: String },
    Unrecognized,
}

fn payload_string(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).trim_end_matches('\0').to_string()
}

fn decode(header: &Header, payload: &[u8]) -> SsRequest {
    use SsRequest as R;
    match header.op_code {
        OpCode::SsCreate => R::Create { filename: header.filename.clone() },
        OpCode::SsDelete => R::Delete { filename: header.filename.clone() },
        OpCode::SsRead => R::Read { filename: header.filename.clone() },
        OpCode::SsWriteLock => R::WriteLock { filename: header.filename.clone(), sentence_idx: header.sentence_index },
        OpCode::SsWriteWord => R::WriteWord {
            filename: header.filename.clone(),
            sentence_idx: header.sentence_index,
            word_idx: header.word_index,
            word: payload_string(payload),
        },
        OpCode::SsWriteUnlock => {
            R::WriteUnlock { filename: header.filename.clone(), sentence_idx: header.sentence_index }
        }
        OpCode::SsEtirw => R::Etirw {
            filename: header.filename.clone(),
            sentence_idx: header.sentence_index,
            word_idx: header.word_index,
            word: payload_string(payload),
        },
        OpCode::SsUndo => R::Undo { filename: header.filename.clone() },
        OpCode::SsInfo => R::Info { filename: header.filename.clone() },
        OpCode::SsMove => R::Move { filename: header.filename.clone(), new_name: payload_string(payload) },
        OpCode::SsCheckpoint => R::Checkpoint { filename: header.filename.clone(), tag: header.checkpoint_tag.clone() },
        OpCode::SsViewCheckpoint => {
            R::ViewCheckpoint { filename: header.filename.clone(), tag: header.checkpoint_tag.clone() }
        }
        OpCode::SsRevert => R::Revert { filename: header.filename.clone(), tag: header.checkpoint_tag.clone() },
        OpCode::SsListCheckpoints => R::ListCheckpoints { filename: header.filename.clone() },
        OpCode::SsStream => R::Stream { filename: header.filename.clone() },
        OpCode::SsSyncDigest => R::SyncDigest,
        OpCode::SsSyncFetch => R::SyncFetch { filename: header.filename.clone() },
        _ => R::Unrecognized,
    }
}

fn ack(op_code: OpCode) -> Frame {
    Frame::new(Header::response(op_code), Vec::new())
}

fn ack_with_payload(op_code: OpCode, payload: Vec<u8>) -> Frame {
    Frame::new(Header::response(op_code), payload)
}

fn err(op_code: OpCode, e: ScriptoriumError) -> Frame {
    Frame::new(Header::error(op_code, e.code()), Vec::new())
}

fn sentence_at(body: &str, idx: i32) -> Result<(Vec<crate::ss::sentence::SentenceNode>, usize), ScriptoriumError> {
    if idx < 0 {
        return Err(ScriptoriumError::InvalidSentence);
    }
    let nodes = parse_sentences(body);
    let idx = idx as usize;
    if idx >= nodes.len() {
        return Err(ScriptoriumError::InvalidSentence);
    }
    Ok((nodes, idx))
}

/// Performs one lock→modify→write step shared by `WRITE_WORD` and `ETIRW`.
/// Only the session's first write snapshots the undo slot — the lazy
/// per-session capture of specification §4.5 — so a second `WRITE_WORD`
/// against another locked sentence in the same session never clobbers it
/// with already-edited state.
async fn apply_word(
    store: &FileStore,
    locks: &LockRegistry,
    filename: &str,
    sentence_idx: i32,
    word_idx: i32,
    word: &str,
    user: &str,
) -> Result<(), ScriptoriumError> {
    let body = store.read_body(filename)?;
    let (mut nodes, idx) = sentence_at(&body, sentence_idx)?;
    if word_idx < 0 {
        return Err(ScriptoriumError::InvalidWord);
    }
    nodes[idx].set_word(word_idx as usize, word)?;
    if locks.take_undo_responsibility(filename, user).await {
        store.write_undo_snapshot(filename, &body)?;
    }
    store.write_body_preserving_undo(filename, &reconstruct(&nodes))
}

pub async fn dispatch(
    store: &FileStore,
    locks: &Arc<LockRegistry>,
    header: Header,
    payload: Vec<u8>,
) -> Frame {
    let op_code = header.op_code;
    let user = header.username.clone();
    let request = decode(&header, &payload);

    match request {
        SsRequest::Unrecognized => {
            warn!(?op_code, "unrecognized or malformed storage-server request");
            err(op_code, ScriptoriumError::InvalidCommand)
        }

        SsRequest::Create { filename } => match store.create_file(&filename) {
            Ok(()) => ack(op_code),
            Err(e) => err(op_code, e),
        },

        SsRequest::Delete { filename } => match store.delete_file(&filename) {
            Ok(()) => ack(op_code),
            Err(e) => err(op_code, e),
        },

        SsRequest::Read { filename } | SsRequest::Stream { filename } | SsRequest::SyncFetch { filename } => {
            match store.read_body(&filename) {
                Ok(body) => ack_with_payload(op_code, body.into_bytes()),
                Err(e) => err(op_code, e),
            }
        }

        SsRequest::WriteLock { filename, sentence_idx } => {
            let body = match store.read_body(&filename) {
                Ok(b) => b,
                Err(e) => return err(op_code, e),
            };
            let (nodes, idx) = match sentence_at(&body, sentence_idx) {
                Ok(pair) => pair,
                Err(e) => return err(op_code, e),
            };
            let key = LockKey { filename: filename.clone(), sentence_idx: idx };
            let text = nodes[idx].text.clone();
            let snapshot: Vec<String> = nodes.iter().map(|n| n.text.clone()).collect();
            match locks.lock(key, &user, snapshot, body).await {
                Ok(()) => ack_with_payload(op_code, text.into_bytes()),
                Err(e) => err(op_code, e),
            }
        }

        SsRequest::WriteWord { filename, sentence_idx, word_idx, word } => {
            let key = LockKey { filename: filename.clone(), sentence_idx: sentence_idx.max(0) as usize };
            match locks.holder(&key).await {
                Some(holder) if holder == user => {
                    match apply_word(store, locks, &filename, sentence_idx, word_idx, &word, &user).await {
                        Ok(()) => ack(op_code),
                        Err(e) => err(op_code, e),
                    }
                }
                Some(_) => err(op_code, ScriptoriumError::SentenceLocked),
                None => err(op_code, ScriptoriumError::SentenceLocked),
            }
        }

        SsRequest::WriteUnlock { filename, sentence_idx } => {
            let key = LockKey { filename: filename.clone(), sentence_idx: sentence_idx.max(0) as usize };
            match locks.unlock(&key, &user).await {
                Ok(()) => ack(op_code),
                Err(e) => err(op_code, e),
            }
        }

        SsRequest::Etirw { filename, sentence_idx, word_idx, word } => {
            let key = LockKey { filename: filename.clone(), sentence_idx: sentence_idx.max(0) as usize };
            if locks.is_locked_by_other(&key, &user).await {
                return err(op_code, ScriptoriumError::SentenceLocked);
            }
            let body = match store.read_body(&filename) {
                Ok(b) => b,
                Err(e) => return err(op_code, e),
            };
            let snapshot: Vec<String> = parse_sentences(&body).into_iter().map(|n| n.text).collect();
            if let Err(e) = locks.lock(key.clone(), &user, snapshot, body).await {
                return err(op_code, e);
            }
            let result = apply_word(store, locks, &filename, sentence_idx, word_idx, &word, &user).await;
            let _ = locks.unlock(&key, &user).await;
            match result {
                Ok(()) => ack(op_code),
                Err(e) => err(op_code, e),
            }
        }

        SsRequest::Undo { filename } => match store.undo(&filename) {
            Ok(restored) => ack_with_payload(op_code, restored.into_bytes()),
            Err(e) => err(op_code, e),
        },

        SsRequest::Info { filename } => match store.read_body(&filename) {
            Ok(body) => {
                let (words, chars) = word_char_counts(&body);
                let line = format!("size={} words={} chars={}", body.len(), words, chars);
                ack_with_payload(op_code, line.into_bytes())
            }
            Err(e) => err(op_code, e),
        },

        SsRequest::Move { filename, new_name } => match store.move_file(&filename, &new_name) {
            Ok(()) => ack(op_code),
            Err(e) => err(op_code, e),
        },

        SsRequest::Checkpoint { filename, tag } => match store.create_checkpoint(&filename, &tag) {
            Ok(()) => ack(op_code),
            Err(e) => err(op_code, e),
        },

        SsRequest::ViewCheckpoint { filename, tag } => match store.view_checkpoint(&filename, &tag) {
            Ok(body) => ack_with_payload(op_code, body.into_bytes()),
            Err(e) => err(op_code, e),
        },

        SsRequest::Revert { filename, tag } => match store.revert(&filename, &tag) {
            Ok(()) => ack(op_code),
            Err(e) => err(op_code, e),
        },

        SsRequest::ListCheckpoints { filename } => match store.list_checkpoints(&filename) {
            Ok(tags) => ack_with_payload(op_code, tags.join(",").into_bytes()),
            Err(e) => err(op_code, e),
        },

        SsRequest::SyncDigest => match store.list_all() {
            Ok(entries) => {
                let lines: Vec<String> =
                    entries.iter().map(|(name, mtime, size)| format!("{name}|{mtime}|{size}")).collect();
                ack_with_payload(op_code, lines.join("\n").into_bytes())
            }
            Err(e) => err(op_code, e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(op_code: OpCode, user: &str, filename: &str) -> Header {
        Header::request(op_code, user).with_filename(filename)
    }

    #[tokio::test]
    async fn create_read_write_lock_word_unlock_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let locks = LockRegistry::new();

        let reply = dispatch(&store, &locks, header(OpCode::SsCreate, "alice", "a.txt"), Vec::new()).await;
        assert_eq!(reply.header.msg_type as u8, crate::wire::MsgType::Response as u8);

        store.write_body("a.txt", "Hello world. Second one.").unwrap();

        let lock_header = header(OpCode::SsWriteLock, "alice", "a.txt").with_sentence_index(0);
        let reply = dispatch(&store, &locks, lock_header, Vec::new()).await;
        assert_eq!(reply.payload_str(), "Hello world.");

        let other_lock = header(OpCode::SsWriteLock, "bob", "a.txt").with_sentence_index(0);
        let reply = dispatch(&store, &locks, other_lock, Vec::new()).await;
        assert_eq!(reply.header.error_code, ScriptoriumError::SentenceLocked.code());

        let write_header = header(OpCode::SsWriteWord, "alice", "a.txt").with_sentence_index(0).with_word_index(0);
        let reply = dispatch(&store, &locks, write_header, b"Goodbye".to_vec()).await;
        assert_eq!(reply.header.msg_type as u8, crate::wire::MsgType::Response as u8);

        let unlock_header = header(OpCode::SsWriteUnlock, "alice", "a.txt").with_sentence_index(0);
        dispatch(&store, &locks, unlock_header, Vec::new()).await;

        assert_eq!(store.read_body("a.txt").unwrap(), "Goodbye world. Second one.");
    }

    #[tokio::test]
    async fn etirw_is_a_single_round_trip_edit() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let locks = LockRegistry::new();
        store.create_file("a.txt").unwrap();
        store.write_body("a.txt", "One. Two.").unwrap();

        let etirw = header(OpCode::SsEtirw, "alice", "a.txt").with_sentence_index(1).with_word_index(0);
        let reply = dispatch(&store, &locks, etirw, b"Three".to_vec()).await;
        assert_eq!(reply.header.msg_type as u8, crate::wire::MsgType::Response as u8);
        assert_eq!(store.read_body("a.txt").unwrap(), "One. Three.");

        assert!(!locks.is_locked_by_other(&LockKey { filename: "a.txt".into(), sentence_idx: 1 }, "anyone").await);
    }

    #[tokio::test]
    async fn undo_restores_pre_session_state_after_two_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let locks = LockRegistry::new();
        store.create_file("a.txt").unwrap();
        store.write_body("a.txt", "Hello world. Second one.").unwrap();

        let lock_header = header(OpCode::SsWriteLock, "alice", "a.txt").with_sentence_index(0);
        dispatch(&store, &locks, lock_header, Vec::new()).await;

        let write1 = header(OpCode::SsWriteWord, "alice", "a.txt").with_sentence_index(0).with_word_index(0);
        dispatch(&store, &locks, write1, b"Goodbye".to_vec()).await;

        let write2 = header(OpCode::SsWriteWord, "alice", "a.txt").with_sentence_index(0).with_word_index(1);
        dispatch(&store, &locks, write2, b"planet".to_vec()).await;

        let unlock_header = header(OpCode::SsWriteUnlock, "alice", "a.txt").with_sentence_index(0);
        dispatch(&store, &locks, unlock_header, Vec::new()).await;
        assert_eq!(store.read_body("a.txt").unwrap(), "Goodbye planet. Second one.");

        let undo_header = header(OpCode::SsUndo, "alice", "a.txt");
        let reply = dispatch(&store, &locks, undo_header, Vec::new()).await;
        assert_eq!(reply.payload_str(), "Hello world. Second one.");
    }

    #[tokio::test]
    async fn checkpoint_and_revert_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let locks = LockRegistry::new();
        store.create_file("a.txt").unwrap();
        store.write_body("a.txt", "v1").unwrap();

        let checkpoint = header(OpCode::SsCheckpoint, "alice", "a.txt");
        let mut checkpoint = checkpoint;
        checkpoint.checkpoint_tag = "tag1".to_string();
        dispatch(&store, &locks, checkpoint, Vec::new()).await;

        store.write_body("a.txt", "v2").unwrap();

        let mut revert = header(OpCode::SsRevert, "alice", "a.txt");
        revert.checkpoint_tag = "tag1".to_string();
        let reply = dispatch(&store, &locks, revert, Vec::new()).await;
        assert_eq!(reply.header.msg_type as u8, crate::wire::MsgType::Response as u8);
        assert_eq!(store.read_body("a.txt").unwrap(), "v1");
    }
}
