//! Data types for the name server's registry (specification §3): files,
//! folders, ACL entries, access requests, and the storage-server roster.

pub use crate::util::now_secs;

/// `(user, read, write)` — one row of an ordered ACL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclEntry {
    pub user: String,
    pub read: bool,
    pub write: bool,
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub filename: String,
    pub folder_path: String,
    pub owner: String,
    pub ss_id: u32,
    pub created: u64,
    pub modified: u64,
    pub accessed: u64,
    pub size: u64,
    pub word_count: u64,
    pub char_count: u64,
    pub acl: Vec<AclEntry>,
}

impl FileEntry {
    pub fn new(filename: String, folder_path: String, owner: String, ss_id: u32) -> Self {
        let now = now_secs();
        Self {
            filename,
            folder_path,
            owner: owner.clone(),
            ss_id,
            created: now,
            modified: now,
            accessed: now,
            size: 0,
            word_count: 0,
            char_count: 0,
            acl: vec![AclEntry { user: owner, read: true, write: true }],
        }
    }

    /// Full `/`-joined path used as the trie key.
    pub fn full_path(&self) -> String {
        if self.folder_path.is_empty() {
            self.filename.clone()
        } else {
            format!("{}/{}", self.folder_path, self.filename)
        }
    }

    pub fn permission(&self, user: &str) -> Option<(bool, bool)> {
        if user == self.owner {
            return Some((true, true));
        }
        self.acl.iter().find(|e| e.user == user).map(|e| (e.read, e.write))
    }

    /// Owner shortcut followed by ACL lookup; the caller decides whether
    /// write is required.
    pub fn check_permission(&self, user: &str, need_write: bool) -> bool {
        match self.permission(user) {
            Some((read, write)) => {
                if need_write {
                    write
                } else {
                    read || write
                }
            }
            None => false,
        }
    }

    pub fn add_access(&mut self, user: &str, read: bool, write: bool) {
        if let Some(entry) = self.acl.iter_mut().find(|e| e.user == user) {
            entry.read = read;
            entry.write = write;
        } else {
            self.acl.push(AclEntry { user: user.to_string(), read, write });
        }
    }

    /// Forbidden for the owner — caller must check that first.
    pub fn remove_access(&mut self, user: &str) {
        self.acl.retain(|e| e.user != user);
    }

    pub fn is_hidden(&self) -> bool {
        self.filename.starts_with('.')
    }
}

#[derive(Debug, Clone)]
pub struct FolderEntry {
    pub foldername: String,
    pub owner: String,
    pub created: u64,
    pub modified: u64,
    pub parent_idx: Option<usize>,
    pub acl: Vec<AclEntry>,
}

impl FolderEntry {
    pub fn new(foldername: String, owner: String, parent_idx: Option<usize>) -> Self {
        let now = now_secs();
        Self {
            foldername,
            owner: owner.clone(),
            created: now,
            modified: now,
            parent_idx,
            acl: vec![AclEntry { user: owner, read: true, write: true }],
        }
    }

    pub fn check_permission(&self, user: &str, need_write: bool) -> bool {
        if user == self.owner {
            return true;
        }
        match self.acl.iter().find(|e| e.user == user) {
            Some(e) => {
                if need_write {
                    e.write
                } else {
                    e.read || e.write
                }
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub filename: String,
    pub requester: String,
    pub request_time: u64,
    pub read_requested: bool,
    pub write_requested: bool,
}

#[derive(Debug, Clone)]
pub struct StorageServerEntry {
    pub server_id: u32,
    pub ip: String,
    pub nm_port: u16,
    pub client_port: u16,
    pub is_active: bool,
    pub last_heartbeat: u64,
    pub replica_id: Option<u32>,
}

impl StorageServerEntry {
    /// Pair rule: server `N` pairs with `N+1` if `N` is odd, else `N-1`.
    pub fn pair_id(server_id: u32) -> u32 {
        if server_id % 2 == 1 {
            server_id + 1
        } else {
            server_id - 1
        }
    }

    pub fn client_endpoint(&self) -> String {
        format!("{}:{}", self.ip, self.client_port)
    }
}

#[derive(Debug, Clone)]
pub struct ClientSlot {
    pub username: String,
    pub connected: bool,
    pub connected_at: u64,
}
