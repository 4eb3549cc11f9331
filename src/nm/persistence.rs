//! Line-oriented, pipe-delimited persistence for the registry (specification
//! §4.2/§6), written atomically via `tempfile::NamedTempFile` + rename the
//! same way the storage server persists file bodies (`ss::storage`).

use std::io::Write;
use std::path::Path;

use tracing::{error, info, warn};

use crate::nm::model::{now_secs, AccessRequest, FileEntry, StorageServerEntry};
use crate::nm::registry::Registry;

const FILES_HEADER: &str = "#FILES";
const FOLDERS_HEADER: &str = "#FOLDERS";
const REQUESTS_HEADER: &str = "#REQUESTS";
const SERVERS_HEADER: &str = "#SERVERS";

fn escape(field: &str) -> String {
    field.replace('\\', "\\\\").replace('|', "\\|")
}

fn unescape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn serialize_acl(entry: &FileEntry) -> String {
    entry
        .acl
        .iter()
        .map(|a| format!("{}:{}:{}", escape(&a.user), a.read as u8, a.write as u8))
        .collect::<Vec<_>>()
        .join(",")
}

fn deserialize_acl(raw: &str) -> Vec<crate::nm::model::AclEntry> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(',')
        .filter_map(|chunk| {
            let mut parts = chunk.splitn(3, ':');
            let user = unescape(parts.next()?);
            let read = parts.next()? == "1";
            let write = parts.next()? == "1";
            Some(crate::nm::model::AclEntry { user, read, write })
        })
        .collect()
}

/// Serializes the registry's durable state to `path`, replacing any existing
/// file in one atomic rename. Write failures are logged and swallowed
/// (specification §7: persistence is best-effort, in-memory state stays
/// authoritative).
pub fn save(registry: &Registry, path: impl AsRef<Path>) {
    if let Err(err) = try_save(registry, path.as_ref()) {
        error!(error = %err, "failed to persist name server state");
    }
}

fn try_save(registry: &Registry, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = tempfile::NamedTempFile::new_in(path.parent().unwrap_or_else(|| Path::new(".")))?;

    writeln!(tmp, "{FILES_HEADER}")?;
    for file in registry.all_files() {
        writeln!(
            tmp,
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
            escape(&file.filename),
            escape(&file.folder_path),
            escape(&file.owner),
            file.ss_id,
            file.created,
            file.modified,
            file.accessed,
            file.size,
            file.word_count,
            file.char_count,
            serialize_acl(file),
        )?;
    }

    writeln!(tmp, "{FOLDERS_HEADER}")?;
    for (path, owner) in registry.all_folders_with_owner() {
        writeln!(tmp, "{}|{}", escape(path), escape(owner))?;
    }

    writeln!(tmp, "{REQUESTS_HEADER}")?;
    for req in registry.all_requests() {
        writeln!(
            tmp,
            "{}|{}|{}|{}|{}",
            escape(&req.filename),
            escape(&req.requester),
            req.request_time,
            req.read_requested as u8,
            req.write_requested as u8,
        )?;
    }

    writeln!(tmp, "{SERVERS_HEADER}")?;

    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Loads a registry from `path`, or returns a fresh empty one if the file is
/// missing or malformed (a corrupt state file is treated as "start clean",
/// not a fatal error — this is a cache of directory metadata, not the
/// system of record for file bodies).
pub fn load(path: impl AsRef<Path>, lru_cache_size: u64) -> Registry {
    let mut registry = Registry::new(lru_cache_size);
    let path = path.as_ref();
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => {
            info!(path = %path.display(), "no existing name server state, starting fresh");
            return registry;
        }
    };

    #[derive(PartialEq)]
    enum Section {
        None,
        Files,
        Folders,
        Requests,
        Servers,
    }
    let mut section = Section::None;

    for line in contents.lines() {
        match line {
            FILES_HEADER => {
                section = Section::Files;
                continue;
            }
            FOLDERS_HEADER => {
                section = Section::Folders;
                continue;
            }
            REQUESTS_HEADER => {
                section = Section::Requests;
                continue;
            }
            SERVERS_HEADER => {
                section = Section::Servers;
                continue;
            }
            _ => {}
        }
        if line.is_empty() {
            continue;
        }
        match section {
            Section::Files => {
                if let Some(entry) = parse_file_line(line) {
                    registry.restore_file(entry);
                } else {
                    warn!(%line, "skipping malformed file record");
                }
            }
            Section::Folders => {
                let fields: Vec<&str> = line.splitn(2, '|').collect();
                if fields.len() == 2 {
                    registry.restore_folder(&unescape(fields[0]), &unescape(fields[1]));
                } else {
                    warn!(%line, "skipping malformed folder record");
                }
            }
            Section::Requests => {
                if let Some(req) = parse_request_line(line) {
                    registry.restore_request(req);
                } else {
                    warn!(%line, "skipping malformed access request record");
                }
            }
            Section::Servers => {
                if let Some(entry) = parse_server_line(line) {
                    let _ = registry.register_storage_server(entry);
                } else {
                    warn!(%line, "skipping malformed storage server record");
                }
            }
            Section::None => {}
        }
    }
    registry
}

fn parse_file_line(line: &str) -> Option<FileEntry> {
    let fields: Vec<&str> = line.splitn(11, '|').collect();
    if fields.len() != 11 {
        return None;
    }
    Some(FileEntry {
        filename: unescape(fields[0]),
        folder_path: unescape(fields[1]),
        owner: unescape(fields[2]),
        ss_id: fields[3].parse().ok()?,
        created: fields[4].parse().ok()?,
        modified: fields[5].parse().ok()?,
        accessed: fields[6].parse().ok()?,
        size: fields[7].parse().ok()?,
        word_count: fields[8].parse().ok()?,
        char_count: fields[9].parse().ok()?,
        acl: deserialize_acl(fields[10]),
    })
}

fn parse_request_line(line: &str) -> Option<AccessRequest> {
    let fields: Vec<&str> = line.splitn(5, '|').collect();
    if fields.len() != 5 {
        return None;
    }
    Some(AccessRequest {
        filename: unescape(fields[0]),
        requester: unescape(fields[1]),
        request_time: fields[2].parse().ok()?,
        read_requested: fields[3] == "1",
        write_requested: fields[4] == "1",
    })
}

fn parse_server_line(line: &str) -> Option<StorageServerEntry> {
    let fields: Vec<&str> = line.splitn(5, '|').collect();
    if fields.len() != 5 {
        return None;
    }
    Some(StorageServerEntry {
        server_id: fields[0].parse().ok()?,
        ip: unescape(fields[1]),
        nm_port: fields[2].parse().ok()?,
        client_port: fields[3].parse().ok()?,
        is_active: false,
        last_heartbeat: now_secs(),
        replica_id: fields[4].parse().ok(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips_files_and_requests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nm_state.dat");

        let mut registry = Registry::new(64);
        registry.register_file("a.txt", "", "alice", 1).unwrap();
        registry.create_folder("drafts", "", "alice").unwrap();
        registry.request_access("a.txt", "bob", true, false).unwrap();

        save(&registry, &path);
        let reloaded = load(&path, 64);

        let (_, entry) = reloaded.find_file("a.txt").unwrap();
        assert_eq!(entry.owner, "alice");
        assert!(reloaded.view_requests("alice", "a.txt").unwrap().iter().any(|r| r.requester == "bob"));
    }

    #[test]
    fn missing_file_loads_as_empty_registry() {
        let reloaded = load("/nonexistent/path/nm_state.dat", 64);
        assert!(reloaded.all_files().next().is_none());
    }
}
