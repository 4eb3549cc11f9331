//! The name server's single owned registry (specification §4.2): files,
//! folders, ACLs, access requests, and the storage-server roster, all behind
//! one handle so the invariant "the whole directory state is one atomic
//! unit" (specification §5) holds without a constellation of sub-locks.

use std::collections::HashMap;

use crate::error::{Result, ScriptoriumError};
use crate::nm::cache::PathCache;
use crate::nm::model::{
    now_secs, AccessRequest, ClientSlot, FileEntry, FolderEntry, StorageServerEntry,
};
use crate::nm::trie::PathTrie;

/// Root folder path, used as the empty-string sentinel for "no parent".
const ROOT: &str = "";

/// Sidecar suffixes the storage layer reserves for its own bookkeeping
/// (specification §4.5) — never creatable as a user filename, since they'd
/// collide with another file's undo slot, checkpoint, or stats sidecar.
const RESERVED_SUFFIXES: [&str; 3] = [".meta", ".undo", ".stats"];

fn has_reserved_suffix(filename: &str) -> bool {
    RESERVED_SUFFIXES.iter().any(|suffix| filename.ends_with(suffix)) || filename.contains(".checkpoint.")
}

pub struct Registry {
    files: Vec<Option<FileEntry>>,
    free_file_slots: Vec<usize>,
    file_trie: PathTrie,
    file_cache: PathCache,

    folders: Vec<Option<FolderEntry>>,
    free_folder_slots: Vec<usize>,
    folder_index: HashMap<String, usize>,

    access_requests: Vec<AccessRequest>,

    storage_servers: HashMap<u32, StorageServerEntry>,
    ss_round_robin_cursor: usize,

    pub clients: HashMap<String, ClientSlot>,
}

impl Registry {
    pub fn new(lru_cache_size: u64) -> Self {
        Self {
            files: Vec::new(),
            free_file_slots: Vec::new(),
            file_trie: PathTrie::new(),
            file_cache: PathCache::new(lru_cache_size),
            folders: Vec::new(),
            free_folder_slots: Vec::new(),
            folder_index: HashMap::new(),
            access_requests: Vec::new(),
            storage_servers: HashMap::new(),
            ss_round_robin_cursor: 0,
            clients: HashMap::new(),
        }
    }

    fn full_folder_path(parent: &str, name: &str) -> String {
        if parent.is_empty() {
            name.to_string()
        } else {
            format!("{parent}/{name}")
        }
    }

    // --- Files ---

    pub fn register_file(
        &mut self,
        filename: &str,
        folder_path: &str,
        owner: &str,
        ss_id: u32,
    ) -> Result<usize> {
        if filename.is_empty() || filename.contains('/') || has_reserved_suffix(filename) {
            return Err(ScriptoriumError::InvalidFilename);
        }
        if !folder_path.is_empty() && !self.folder_index.contains_key(folder_path) {
            return Err(ScriptoriumError::FolderNotFound);
        }
        let entry = FileEntry::new(filename.to_string(), folder_path.to_string(), owner.to_string(), ss_id);
        let full_path = entry.full_path();
        if self.file_trie.get(&full_path).is_some() {
            return Err(ScriptoriumError::FileExists);
        }

        let idx = match self.free_file_slots.pop() {
            Some(idx) => {
                self.files[idx] = Some(entry);
                idx
            }
            None => {
                self.files.push(Some(entry));
                self.files.len() - 1
            }
        };
        self.file_trie.insert(&full_path, idx);
        self.file_cache.insert(full_path, idx);
        Ok(idx)
    }

    pub fn find_file(&self, full_path: &str) -> Option<(usize, &FileEntry)> {
        let idx = self
            .file_cache
            .get_validated(full_path, || self.file_trie.get(full_path))
            .or_else(|| self.file_trie.get(full_path))?;
        self.files.get(idx).and_then(|slot| slot.as_ref()).map(|entry| (idx, entry))
    }

    pub fn find_file_mut(&mut self, full_path: &str) -> Option<(usize, &mut FileEntry)> {
        let idx = self.file_trie.get(full_path)?;
        self.files.get_mut(idx).and_then(|slot| slot.as_mut()).map(|entry| (idx, entry))
    }

    pub fn file_by_idx(&self, idx: usize) -> Option<&FileEntry> {
        self.files.get(idx).and_then(|slot| slot.as_ref())
    }

    pub fn delete_file(&mut self, full_path: &str, user: &str) -> Result<FileEntry> {
        let (idx, entry) = self.find_file(full_path).ok_or(ScriptoriumError::FileNotFound)?;
        if !entry.check_permission(user, true) {
            return Err(ScriptoriumError::PermissionDenied);
        }
        self.file_trie.remove(full_path);
        self.file_cache.invalidate(full_path);
        self.access_requests.retain(|r| r.filename != full_path);
        let removed = self.files[idx].take().expect("validated present above");
        self.free_file_slots.push(idx);
        Ok(removed)
    }

    pub fn check_permission(&self, full_path: &str, user: &str, need_write: bool) -> Result<()> {
        let (_, entry) = self.find_file(full_path).ok_or(ScriptoriumError::FileNotFound)?;
        if entry.check_permission(user, need_write) {
            Ok(())
        } else {
            Err(ScriptoriumError::PermissionDenied)
        }
    }

    pub fn add_access(&mut self, full_path: &str, owner: &str, target: &str, read: bool, write: bool) -> Result<()> {
        let (_, entry) = self.find_file_mut(full_path).ok_or(ScriptoriumError::FileNotFound)?;
        if entry.owner != owner {
            return Err(ScriptoriumError::NotOwner);
        }
        if entry.owner == target {
            return Err(ScriptoriumError::AlreadyHasAccess);
        }
        entry.add_access(target, read, write);
        Ok(())
    }

    pub fn remove_access(&mut self, full_path: &str, owner: &str, target: &str) -> Result<()> {
        let (_, entry) = self.find_file_mut(full_path).ok_or(ScriptoriumError::FileNotFound)?;
        if entry.owner != owner {
            return Err(ScriptoriumError::NotOwner);
        }
        if entry.owner == target {
            return Err(ScriptoriumError::NotOwner);
        }
        entry.remove_access(target);
        Ok(())
    }

    pub fn move_file(&mut self, full_path: &str, new_folder_path: &str, user: &str) -> Result<String> {
        let (idx, _) = self.find_file(full_path).ok_or(ScriptoriumError::FileNotFound)?;
        {
            let entry = self.files[idx].as_ref().expect("validated above");
            if !entry.check_permission(user, true) {
                return Err(ScriptoriumError::PermissionDenied);
            }
        }
        if !new_folder_path.is_empty() && !self.folder_index.contains_key(new_folder_path) {
            return Err(ScriptoriumError::FolderNotFound);
        }
        let filename = self.files[idx].as_ref().unwrap().filename.clone();
        let new_full_path = if new_folder_path.is_empty() {
            filename.clone()
        } else {
            format!("{new_folder_path}/{filename}")
        };
        if self.file_trie.get(&new_full_path).is_some() {
            return Err(ScriptoriumError::FileExists);
        }

        self.file_trie.remove(full_path);
        self.file_cache.invalidate(full_path);
        let entry = self.files[idx].as_mut().unwrap();
        entry.folder_path = new_folder_path.to_string();
        entry.modified = now_secs();
        self.file_trie.insert(&new_full_path, idx);
        self.file_cache.insert(new_full_path.clone(), idx);
        Ok(new_full_path)
    }

    pub fn touch_modified(&mut self, full_path: &str, size: u64, word_count: u64, char_count: u64) {
        if let Some((_, entry)) = self.find_file_mut(full_path) {
            entry.modified = now_secs();
            entry.accessed = entry.modified;
            entry.size = size;
            entry.word_count = word_count;
            entry.char_count = char_count;
        }
    }

    pub fn touch_accessed(&mut self, full_path: &str) {
        if let Some((_, entry)) = self.find_file_mut(full_path) {
            entry.accessed = now_secs();
        }
    }

    // --- Folders ---

    pub fn create_folder(&mut self, foldername: &str, parent_path: &str, owner: &str) -> Result<usize> {
        if foldername.is_empty() || foldername.contains('/') {
            return Err(ScriptoriumError::InvalidPath);
        }
        if !parent_path.is_empty() && !self.folder_index.contains_key(parent_path) {
            return Err(ScriptoriumError::FolderNotFound);
        }
        let full_path = Self::full_folder_path(parent_path, foldername);
        if self.folder_index.contains_key(&full_path) {
            return Err(ScriptoriumError::FolderExists);
        }
        let parent_idx = if parent_path.is_empty() { None } else { self.folder_index.get(parent_path).copied() };
        let entry = FolderEntry::new(foldername.to_string(), owner.to_string(), parent_idx);

        let idx = match self.free_folder_slots.pop() {
            Some(idx) => {
                self.folders[idx] = Some(entry);
                idx
            }
            None => {
                self.folders.push(Some(entry));
                self.folders.len() - 1
            }
        };
        self.folder_index.insert(full_path, idx);
        Ok(idx)
    }

    pub fn folder_by_path(&self, path: &str) -> Option<(usize, &FolderEntry)> {
        if path.is_empty() {
            return None;
        }
        let idx = *self.folder_index.get(path)?;
        self.folders.get(idx).and_then(|slot| slot.as_ref()).map(|e| (idx, e))
    }

    /// Direct children of `folder_path` (empty string means the root).
    pub fn list_folder_contents(
        &self,
        folder_path: &str,
        user: &str,
        show_all: bool,
    ) -> Result<(Vec<&FileEntry>, Vec<(&str, &FolderEntry)>)> {
        if !folder_path.is_empty() {
            let (_, folder) = self.folder_by_path(folder_path).ok_or(ScriptoriumError::FolderNotFound)?;
            if !folder.check_permission(user, false) {
                return Err(ScriptoriumError::PermissionDenied);
            }
        }

        let mut files: Vec<&FileEntry> = self
            .files
            .iter()
            .filter_map(|slot| slot.as_ref())
            .filter(|f| f.folder_path == folder_path)
            .filter(|f| show_all || !f.is_hidden())
            .collect();
        files.sort_by(|a, b| a.filename.cmp(&b.filename));

        let mut folders: Vec<(&str, &FolderEntry)> = self
            .folder_index
            .iter()
            .filter_map(|(path, &idx)| {
                let entry = self.folders[idx].as_ref()?;
                let parent_matches = match path.rfind('/') {
                    Some(pos) => &path[..pos] == folder_path,
                    None => folder_path.is_empty(),
                };
                parent_matches.then(|| (path.as_str(), entry))
            })
            .filter(|(_, f)| show_all || !f.foldername.starts_with('.'))
            .collect();
        folders.sort_by(|a, b| a.0.cmp(b.0));

        Ok((files, folders))
    }

    // --- Access requests ---

    pub fn request_access(&mut self, full_path: &str, requester: &str, read: bool, write: bool) -> Result<()> {
        let (_, entry) = self.find_file(full_path).ok_or(ScriptoriumError::FileNotFound)?;
        if entry.owner == requester {
            return Err(ScriptoriumError::AlreadyHasAccess);
        }
        if let Some((r, w)) = entry.permission(requester) {
            if (!read || r) && (!write || w) {
                return Err(ScriptoriumError::AlreadyHasAccess);
            }
        }
        if self.access_requests.iter().any(|req| req.filename == full_path && req.requester == requester) {
            return Err(ScriptoriumError::RequestExists);
        }
        self.access_requests.push(AccessRequest {
            filename: full_path.to_string(),
            requester: requester.to_string(),
            request_time: now_secs(),
            read_requested: read,
            write_requested: write,
        });
        Ok(())
    }

    pub fn view_requests(&self, owner: &str, full_path: &str) -> Result<Vec<&AccessRequest>> {
        let (_, entry) = self.find_file(full_path).ok_or(ScriptoriumError::FileNotFound)?;
        if entry.owner != owner {
            return Err(ScriptoriumError::NotOwner);
        }
        Ok(self.access_requests.iter().filter(|r| r.filename == full_path).collect())
    }

    pub fn approve_request(&mut self, owner: &str, full_path: &str, requester: &str) -> Result<()> {
        let req = self
            .access_requests
            .iter()
            .find(|r| r.filename == full_path && r.requester == requester)
            .cloned()
            .ok_or(ScriptoriumError::RequestNotFound)?;
        self.add_access(full_path, owner, requester, req.read_requested, req.write_requested)?;
        self.access_requests.retain(|r| !(r.filename == full_path && r.requester == requester));
        Ok(())
    }

    pub fn deny_request(&mut self, owner: &str, full_path: &str, requester: &str) -> Result<()> {
        let (_, entry) = self.find_file(full_path).ok_or(ScriptoriumError::FileNotFound)?;
        if entry.owner != owner {
            return Err(ScriptoriumError::NotOwner);
        }
        let before = self.access_requests.len();
        self.access_requests.retain(|r| !(r.filename == full_path && r.requester == requester));
        if self.access_requests.len() == before {
            return Err(ScriptoriumError::RequestNotFound);
        }
        Ok(())
    }

    // --- Storage servers ---

    pub fn register_storage_server(&mut self, entry: StorageServerEntry) -> Result<()> {
        if self.storage_servers.contains_key(&entry.server_id) {
            return Err(ScriptoriumError::SSExists);
        }
        self.storage_servers.insert(entry.server_id, entry);
        Ok(())
    }

    /// Marks the server inactive rather than dropping its roster entry, so
    /// `resolve_active_endpoint` can still find its paired replica and
    /// `record_heartbeat`/SYNC can bring it back once it re-registers.
    pub fn deregister_storage_server(&mut self, server_id: u32) {
        if let Some(entry) = self.storage_servers.get_mut(&server_id) {
            entry.is_active = false;
        }
    }

    pub fn storage_server(&self, server_id: u32) -> Option<&StorageServerEntry> {
        self.storage_servers.get(&server_id)
    }

    pub fn storage_servers_len(&self) -> usize {
        self.storage_servers.len()
    }

    pub fn record_heartbeat(&mut self, server_id: u32) -> Result<()> {
        let entry = self.storage_servers.get_mut(&server_id).ok_or(ScriptoriumError::SSUnavailable)?;
        entry.last_heartbeat = now_secs();
        entry.is_active = true;
        Ok(())
    }

    /// Scans the roster and marks any server whose last heartbeat is older
    /// than `timeout_secs` inactive. Returns the ids just marked down.
    pub fn sweep_dead_servers(&mut self, timeout_secs: u64) -> Vec<u32> {
        let now = now_secs();
        let mut newly_dead = Vec::new();
        for (id, entry) in self.storage_servers.iter_mut() {
            if entry.is_active && now.saturating_sub(entry.last_heartbeat) > timeout_secs {
                entry.is_active = false;
                newly_dead.push(*id);
            }
        }
        newly_dead
    }

    /// The endpoint to dial for `server_id`: itself if active, else its
    /// paired replica if that one is active.
    pub fn resolve_active_endpoint(&self, server_id: u32) -> Result<&StorageServerEntry> {
        if let Some(entry) = self.storage_servers.get(&server_id) {
            if entry.is_active {
                return Ok(entry);
            }
        }
        let pair = StorageServerEntry::pair_id(server_id);
        match self.storage_servers.get(&pair) {
            Some(entry) if entry.is_active => Ok(entry),
            _ => Err(ScriptoriumError::SSUnavailable),
        }
    }

    /// Round-robin selection among active storage servers for placing a new
    /// file.
    pub fn pick_storage_server(&mut self) -> Option<u32> {
        let mut ids: Vec<u32> = self.storage_servers.values().filter(|e| e.is_active).map(|e| e.server_id).collect();
        if ids.is_empty() {
            return None;
        }
        ids.sort_unstable();
        let chosen = ids[self.ss_round_robin_cursor % ids.len()];
        self.ss_round_robin_cursor = self.ss_round_robin_cursor.wrapping_add(1);
        Some(chosen)
    }

    // --- Persistence support (see nm::persistence) ---

    pub fn all_files(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.iter().filter_map(|slot| slot.as_ref())
    }

    pub fn all_folders_with_owner(&self) -> impl Iterator<Item = (&str, &str)> {
        self.folder_index
            .iter()
            .filter_map(|(path, &idx)| self.folders[idx].as_ref().map(|f| (path.as_str(), f.owner.as_str())))
    }

    pub fn all_requests(&self) -> impl Iterator<Item = &AccessRequest> {
        self.access_requests.iter()
    }

    pub fn restore_file(&mut self, entry: FileEntry) {
        let full_path = entry.full_path();
        let idx = self.files.len();
        self.files.push(Some(entry));
        self.file_trie.insert(&full_path, idx);
    }

    pub fn restore_folder(&mut self, path: &str, owner: &str) {
        if self.folder_index.contains_key(path) {
            return;
        }
        let (parent, name) = match path.rfind('/') {
            Some(pos) => (&path[..pos], &path[pos + 1..]),
            None => (ROOT, path),
        };
        let parent_idx = if parent.is_empty() { None } else { self.folder_index.get(parent).copied() };
        let entry = FolderEntry::new(name.to_string(), owner.to_string(), parent_idx);
        let idx = self.folders.len();
        self.folders.push(Some(entry));
        self.folder_index.insert(path.to_string(), idx);
    }

    pub fn restore_request(&mut self, request: AccessRequest) {
        self.access_requests.push(request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_find_round_trips() {
        let mut reg = Registry::new(64);
        let idx = reg.register_file("a.txt", "", "alice", 1).unwrap();
        let (found_idx, entry) = reg.find_file("a.txt").unwrap();
        assert_eq!(found_idx, idx);
        assert_eq!(entry.owner, "alice");
    }

    #[test]
    fn reserved_suffix_is_rejected() {
        let mut reg = Registry::new(64);
        assert_eq!(reg.register_file("a.undo", "", "alice", 1), Err(ScriptoriumError::InvalidFilename));
        assert_eq!(reg.register_file("a.meta", "", "alice", 1), Err(ScriptoriumError::InvalidFilename));
        assert_eq!(reg.register_file("a.stats", "", "alice", 1), Err(ScriptoriumError::InvalidFilename));
        assert_eq!(reg.register_file("a.checkpoint.v1", "", "alice", 1), Err(ScriptoriumError::InvalidFilename));
    }

    #[test]
    fn duplicate_register_is_rejected() {
        let mut reg = Registry::new(64);
        reg.register_file("a.txt", "", "alice", 1).unwrap();
        let err = reg.register_file("a.txt", "", "bob", 1).unwrap_err();
        assert_eq!(err, ScriptoriumError::FileExists);
    }

    #[test]
    fn non_owner_without_acl_entry_is_denied() {
        let mut reg = Registry::new(64);
        reg.register_file("a.txt", "", "alice", 1).unwrap();
        assert_eq!(reg.check_permission("a.txt", "bob", false), Err(ScriptoriumError::PermissionDenied));
    }

    #[test]
    fn add_access_then_check_permission_succeeds() {
        let mut reg = Registry::new(64);
        reg.register_file("a.txt", "", "alice", 1).unwrap();
        reg.add_access("a.txt", "alice", "bob", true, false).unwrap();
        assert!(reg.check_permission("a.txt", "bob", false).is_ok());
        assert_eq!(reg.check_permission("a.txt", "bob", true), Err(ScriptoriumError::PermissionDenied));
    }

    #[test]
    fn non_owner_cannot_grant_access() {
        let mut reg = Registry::new(64);
        reg.register_file("a.txt", "", "alice", 1).unwrap();
        assert_eq!(reg.add_access("a.txt", "bob", "carol", true, true), Err(ScriptoriumError::NotOwner));
    }

    #[test]
    fn move_file_updates_path_and_keeps_acl() {
        let mut reg = Registry::new(64);
        reg.register_file("a.txt", "", "alice", 1).unwrap();
        reg.create_folder("drafts", "", "alice").unwrap();
        reg.add_access("a.txt", "alice", "bob", true, false).unwrap();
        let new_path = reg.move_file("a.txt", "drafts", "alice").unwrap();
        assert_eq!(new_path, "drafts/a.txt");
        assert!(reg.find_file("a.txt").is_none());
        let (_, entry) = reg.find_file("drafts/a.txt").unwrap();
        assert!(entry.check_permission("bob", false));
    }

    #[test]
    fn access_request_approve_grants_and_clears() {
        let mut reg = Registry::new(64);
        reg.register_file("a.txt", "", "alice", 1).unwrap();
        reg.request_access("a.txt", "bob", true, false).unwrap();
        assert_eq!(reg.request_access("a.txt", "bob", true, false), Err(ScriptoriumError::RequestExists));
        reg.approve_request("alice", "a.txt", "bob").unwrap();
        assert!(reg.check_permission("a.txt", "bob", false).is_ok());
        assert!(reg.view_requests("alice", "a.txt").unwrap().is_empty());
    }

    #[test]
    fn deregister_marks_inactive_without_dropping_the_roster_entry() {
        let mut reg = Registry::new(64);
        reg.register_storage_server(StorageServerEntry {
            server_id: 1,
            ip: "127.0.0.1".into(),
            nm_port: 9000,
            client_port: 9001,
            is_active: true,
            last_heartbeat: now_secs(),
            replica_id: Some(2),
        })
        .unwrap();
        reg.deregister_storage_server(1);
        assert!(!reg.storage_server(1).unwrap().is_active);
        assert_eq!(reg.storage_servers_len(), 1);
    }

    #[test]
    fn round_robin_picks_each_active_server_in_turn() {
        let mut reg = Registry::new(64);
        reg.register_storage_server(StorageServerEntry {
            server_id: 1,
            ip: "127.0.0.1".into(),
            nm_port: 9000,
            client_port: 9001,
            is_active: true,
            last_heartbeat: now_secs(),
            replica_id: Some(2),
        })
        .unwrap();
        reg.register_storage_server(StorageServerEntry {
            server_id: 2,
            ip: "127.0.0.1".into(),
            nm_port: 9010,
            client_port: 9011,
            is_active: true,
            last_heartbeat: now_secs(),
            replica_id: Some(1),
        })
        .unwrap();
        let first = reg.pick_storage_server().unwrap();
        let second = reg.pick_storage_server().unwrap();
        assert_ne!(first, second);
        let third = reg.pick_storage_server().unwrap();
        assert_eq!(first, third);
    }
}
