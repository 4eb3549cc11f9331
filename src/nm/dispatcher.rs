//! The name server's request dispatcher (specification §4.3): one sum type
//! per inbound op, matched exhaustively, with a single catch-all arm for
//! anything the wire decoder didn't recognize.
//!
//! The name server never proxies file content. `READ`/`WRITE`/`STREAM`/
//! `UNDO`/checkpoint operations resolve which storage server currently owns
//! the file (consulting the heartbeat-driven failover state) and hand the
//! client that server's endpoint; the client then speaks the same wire
//! protocol directly to the storage server.

use tokio::net::TcpStream;
#[cfg(test)]
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Limits;
use crate::error::{Result as SResult, ScriptoriumError};
use crate::nm::model::{ClientSlot, StorageServerEntry};
use crate::nm::registry::Registry;
use crate::wire::{read_frame, write_frame, Frame, Header, OpCode, FLAG_LONG, FLAG_READ, FLAG_SHOW_ALL, FLAG_WRITE};

/// A decoded inbound request, one variant per op-code the name server
/// understands (specification §4.3's table).
enum ClientRequest {
    ConnectClient,
    Disconnect,
    View { show_all: bool, refresh: bool },
    List,
    ViewFolder { path: String, show_all: bool },
    Info { path: String },
    Create { filename: String, folder: String },
    Delete { path: String },
    Read { path: String },
    Write { path: String },
    Stream { path: String },
    Undo { path: String },
    AddAccess { path: String, target: String, read: bool, write: bool },
    RemAccess { path: String, target: String },
    CreateFolder { foldername: String, parent: String },
    Move { path: String, new_folder: String },
    Checkpoint { path: String, tag: String },
    ViewCheckpoint { path: String, tag: String },
    Revert { path: String, tag: String },
    ListCheckpoints { path: String },
    RequestAccess { path: String, read: bool, write: bool },
    ViewRequests { path: String },
    Approve { path: String, requester: String },
    Deny { path: String, requester: String },
    Exec { command: String },
    RegisterSs { server_id: u32, ip: String, nm_port: u16, client_port: u16, replica_id: Option<u32> },
    Heartbeat { server_id: u32 },
    DeregisterSs { server_id: u32 },
    Unrecognized,
}

fn payload_string(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).trim_end_matches('\0').to_string()
}

fn decode(header: &Header, payload: &[u8]) -> ClientRequest {
    use ClientRequest as R;
    match header.op_code {
        OpCode::ConnectClient => R::ConnectClient,
        OpCode::Disconnect => R::Disconnect,
        OpCode::View => {
            R::View { show_all: header.flags & FLAG_SHOW_ALL != 0, refresh: header.flags & FLAG_LONG != 0 }
        }
        OpCode::List => R::List,
        OpCode::ViewFolder => {
            R::ViewFolder { path: header.foldername.clone(), show_all: header.flags & FLAG_SHOW_ALL != 0 }
        }
        OpCode::Info => R::Info { path: header.filename.clone() },
        OpCode::Create => R::Create { filename: header.filename.clone(), folder: header.foldername.clone() },
        OpCode::Delete => R::Delete { path: header.filename.clone() },
        OpCode::Read => R::Read { path: header.filename.clone() },
        OpCode::Write => R::Write { path: header.filename.clone() },
        OpCode::Stream => R::Stream { path: header.filename.clone() },
        OpCode::Undo => R::Undo { path: header.filename.clone() },
        OpCode::AddAccess => R::AddAccess {
            path: header.filename.clone(),
            target: payload_string(payload),
            read: header.flags & FLAG_READ != 0,
            write: header.flags & FLAG_WRITE != 0,
        },
        OpCode::RemAccess => R::RemAccess { path: header.filename.clone(), target: payload_string(payload) },
        OpCode::CreateFolder => {
            R::CreateFolder { foldername: header.filename.clone(), parent: header.foldername.clone() }
        }
        OpCode::Move => R::Move { path: header.filename.clone(), new_folder: header.foldername.clone() },
        OpCode::Checkpoint => R::Checkpoint { path: header.filename.clone(), tag: header.checkpoint_tag.clone() },
        OpCode::ViewCheckpoint => {
            R::ViewCheckpoint { path: header.filename.clone(), tag: header.checkpoint_tag.clone() }
        }
        OpCode::Revert => R::Revert { path: header.filename.clone(), tag: header.checkpoint_tag.clone() },
        OpCode::ListCheckpoints => R::ListCheckpoints { path: header.filename.clone() },
        OpCode::RequestAccess => R::RequestAccess {
            path: header.filename.clone(),
            read: header.flags & FLAG_READ != 0,
            write: header.flags & FLAG_WRITE != 0,
        },
        OpCode::ViewRequests => R::ViewRequests { path: header.filename.clone() },
        OpCode::Approve => R::Approve { path: header.filename.clone(), requester: payload_string(payload) },
        OpCode::Deny => R::Deny { path: header.filename.clone(), requester: payload_string(payload) },
        OpCode::Exec => R::Exec { command: payload_string(payload) },
        OpCode::RegisterSs => {
            let text = payload_string(payload);
            let mut parts = text.split('|');
            match (
                header.filename.parse::<u32>().ok(),
                parts.next(),
                parts.next().and_then(|p| p.parse().ok()),
                parts.next().and_then(|p| p.parse().ok()),
            ) {
                (Some(server_id), Some(ip), Some(nm_port), Some(client_port)) => R::RegisterSs {
                    server_id,
                    ip: ip.to_string(),
                    nm_port,
                    client_port,
                    replica_id: parts.next().and_then(|p| p.parse().ok()),
                },
                _ => R::Unrecognized,
            }
        }
        OpCode::Heartbeat => match header.filename.parse::<u32>() {
            Ok(server_id) => R::Heartbeat { server_id },
            Err(_) => R::Unrecognized,
        },
        OpCode::DeregisterSs => match header.filename.parse::<u32>() {
            Ok(server_id) => R::DeregisterSs { server_id },
            Err(_) => R::Unrecognized,
        },
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

fn endpoint_response(op_code: OpCode, entry: &StorageServerEntry) -> Frame {
    ack_with_payload(op_code, entry.client_endpoint().into_bytes())
}

/// Dials a storage server at `endpoint`, sends one request, and waits for
/// its reply — the same dial-and-frame pattern the client shell and the SS
/// control plane use to talk to a peer, just aimed here at the name server's
/// own outbound calls (specification §4.3: CREATE/DELETE/MOVE/INFO all
/// forward to the file's home SS before the registry commits).
async fn forward_to_ss(endpoint: &str, op_code: OpCode, username: &str, filename: &str, payload: Vec<u8>) -> SResult<Frame> {
    let mut stream = TcpStream::connect(endpoint).await.map_err(|_| ScriptoriumError::SSUnavailable)?;
    let header = Header::request(op_code, username).with_filename(filename);
    write_frame(&mut stream, &Frame::new(header, payload)).await?;
    let reply = read_frame(&mut stream).await?.ok_or(ScriptoriumError::NetworkError)?;
    if reply.header.msg_type as u8 == crate::wire::MsgType::Error as u8 {
        return Err(ScriptoriumError::from_code(reply.header.error_code).unwrap_or(ScriptoriumError::NetworkError));
    }
    Ok(reply)
}

/// Parses an SS `INFO` reply of the form `"size={n} words={n} chars={n}"`.
fn parse_info_line(line: &str) -> Option<(u64, u64, u64)> {
    let mut size = None;
    let mut words = None;
    let mut chars = None;
    for field in line.split_whitespace() {
        let (key, value) = field.split_once('=')?;
        let value: u64 = value.parse().ok()?;
        match key {
            "size" => size = Some(value),
            "words" => words = Some(value),
            "chars" => chars = Some(value),
            _ => {}
        }
    }
    Some((size?, words?, chars?))
}

/// `"SYNC <ip> <port>"` / `"REPLICA <ip> <port>"` payload for `server_id`'s
/// paired replica, if that peer is currently active (specification §4.3 /
/// §4.6). Returns `None` when there's no pairing configured or the peer is
/// down — the caller then ACKs with no payload.
fn peer_payload(reg: &Registry, server_id: u32, label: &str) -> Option<Vec<u8>> {
    let peer_id = StorageServerEntry::pair_id(server_id);
    let peer = reg.storage_server(peer_id)?;
    if !peer.is_active {
        return None;
    }
    Some(format!("{label} {} {}", peer.ip, peer.client_port).into_bytes())
}

/// Dispatches one decoded request against the shared registry, returning the
/// reply frame to write back to the caller. `username` is the identity
/// established at `CONNECT_CLIENT` time (or, for control ops, the storage
/// server id carried in the header).
pub async fn dispatch(registry: &Mutex<Registry>, limits: &Limits, header: Header, payload: Vec<u8>) -> Frame {
    let op_code = header.op_code;
    let username = header.username.clone();
    let request = decode(&header, &payload);
    let mut reg = registry.lock().await;

    match request {
        ClientRequest::Unrecognized => {
            warn!(?op_code, "unrecognized or malformed request");
            err(op_code, ScriptoriumError::InvalidCommand)
        }

        ClientRequest::ConnectClient => {
            if reg.clients.contains_key(&username) {
                return err(op_code, ScriptoriumError::UsernameTaken);
            }
            if reg.clients.len() >= limits.max_clients {
                return err(op_code, ScriptoriumError::SSUnavailable);
            }
            reg.clients.insert(
                username.clone(),
                ClientSlot { username: username.clone(), connected: true, connected_at: crate::nm::model::now_secs() },
            );
            info!(%username, "client connected");
            ack(op_code)
        }

        ClientRequest::Disconnect => {
            reg.clients.remove(&username);
            info!(%username, "client disconnected");
            ack(op_code)
        }

        ClientRequest::View { show_all, refresh } => {
            let (file_targets, mut lines) = match reg.list_folder_contents("", &username, show_all) {
                Ok((files, folders)) => {
                    let mut lines: Vec<String> = folders.iter().map(|(p, _)| format!("d {p}")).collect();
                    let file_targets: Vec<(String, u32)> = files.iter().map(|f| (f.full_path(), f.ss_id)).collect();
                    lines.extend(files.iter().map(|f| format!("f {}", f.full_path())));
                    (file_targets, lines)
                }
                Err(e) => return err(op_code, e),
            };

            if refresh {
                let endpoints: Vec<(String, String)> = file_targets
                    .iter()
                    .filter_map(|(path, ss_id)| {
                        reg.resolve_active_endpoint(*ss_id).ok().map(|entry| (path.clone(), entry.client_endpoint()))
                    })
                    .collect();
                drop(reg);
                let mut refreshed = Vec::new();
                for (path, endpoint) in endpoints {
                    if let Ok(reply) = forward_to_ss(&endpoint, OpCode::SsInfo, &username, &path, Vec::new()).await {
                        if let Some((size, words, chars)) = parse_info_line(&reply.payload_str()) {
                            refreshed.push((path, size, words, chars));
                        }
                    }
                }
                reg = registry.lock().await;
                for (path, size, words, chars) in refreshed {
                    reg.touch_modified(&path, size, words, chars);
                }
            }

            ack_with_payload(op_code, lines.join("\n").into_bytes())
        }

        ClientRequest::List => {
            let mut names: Vec<String> = reg.clients.keys().cloned().collect();
            names.sort();
            ack_with_payload(op_code, names.join("\n").into_bytes())
        }

        ClientRequest::ViewFolder { path, show_all } => match reg.list_folder_contents(&path, &username, show_all) {
            Ok((files, folders)) => {
                let mut lines: Vec<String> = folders.iter().map(|(p, _)| format!("d {p}")).collect();
                lines.extend(files.iter().map(|f| format!("f {}", f.full_path())));
                ack_with_payload(op_code, lines.join("\n").into_bytes())
            }
            Err(e) => err(op_code, e),
        },

        ClientRequest::Info { path } => {
            if let Err(e) = reg.check_permission(&path, &username, false) {
                return err(op_code, e);
            }
            let ss_id = reg.find_file(&path).unwrap().1.ss_id;
            if let Ok(entry) = reg.resolve_active_endpoint(ss_id) {
                let endpoint = entry.client_endpoint();
                drop(reg);
                let info_reply = forward_to_ss(&endpoint, OpCode::SsInfo, &username, &path, Vec::new()).await;
                reg = registry.lock().await;
                if let Ok(reply) = info_reply {
                    if let Some((size, words, chars)) = parse_info_line(&reply.payload_str()) {
                        reg.touch_modified(&path, size, words, chars);
                    }
                }
            }
            let (_, entry) = match reg.find_file(&path) {
                Some(v) => v,
                None => return err(op_code, ScriptoriumError::FileNotFound),
            };
            let acl_lines: Vec<String> =
                entry.acl.iter().map(|a| format!("  {} r={} w={}", a.user, a.read, a.write)).collect();
            let line = format!(
                "owner={} size={} words={} chars={} created={} modified={} accessed={}\nacl:\n{}",
                entry.owner,
                entry.size,
                entry.word_count,
                entry.char_count,
                entry.created,
                entry.modified,
                entry.accessed,
                acl_lines.join("\n")
            );
            ack_with_payload(op_code, line.into_bytes())
        }

        ClientRequest::Create { filename, folder } => {
            if reg.all_files().count() >= limits.max_files {
                return err(op_code, ScriptoriumError::SSUnavailable);
            }
            if !folder.is_empty() && reg.folder_by_path(&folder).is_none() {
                return err(op_code, ScriptoriumError::FolderNotFound);
            }
            let full_path = if folder.is_empty() { filename.clone() } else { format!("{folder}/{filename}") };
            if reg.find_file(&full_path).is_some() {
                return err(op_code, ScriptoriumError::FileExists);
            }
            let Some(ss_id) = reg.pick_storage_server() else {
                return err(op_code, ScriptoriumError::SSUnavailable);
            };
            let endpoint = match reg.resolve_active_endpoint(ss_id) {
                Ok(entry) => entry.client_endpoint(),
                Err(e) => return err(op_code, e),
            };
            drop(reg);
            if let Err(e) = forward_to_ss(&endpoint, OpCode::SsCreate, &username, &full_path, Vec::new()).await {
                return err(op_code, e);
            }
            reg = registry.lock().await;
            match reg.register_file(&filename, &folder, &username, ss_id) {
                Ok(_) => match reg.resolve_active_endpoint(ss_id) {
                    Ok(entry) => endpoint_response(op_code, entry),
                    Err(e) => err(op_code, e),
                },
                Err(e) => err(op_code, e),
            }
        }

        ClientRequest::Delete { path } => {
            let endpoint = {
                let (_, entry) = match reg.find_file(&path) {
                    Some(v) => v,
                    None => return err(op_code, ScriptoriumError::FileNotFound),
                };
                if !entry.check_permission(&username, true) {
                    return err(op_code, ScriptoriumError::PermissionDenied);
                }
                match reg.resolve_active_endpoint(entry.ss_id) {
                    Ok(e) => e.client_endpoint(),
                    Err(e) => return err(op_code, e),
                }
            };
            drop(reg);
            if let Err(e) = forward_to_ss(&endpoint, OpCode::SsDelete, &username, &path, Vec::new()).await {
                return err(op_code, e);
            }
            reg = registry.lock().await;
            match reg.delete_file(&path, &username) {
                Ok(_) => ack(op_code),
                Err(e) => err(op_code, e),
            }
        }

        ClientRequest::Write { path } => match reg.check_permission(&path, &username, true) {
            Ok(()) => {
                let ss_id = reg.find_file(&path).unwrap().1.ss_id;
                match reg.resolve_active_endpoint(ss_id) {
                    Ok(entry) => endpoint_response(op_code, entry),
                    Err(e) => err(op_code, e),
                }
            }
            Err(e) => err(op_code, e),
        },

        ClientRequest::Stream { path } | ClientRequest::Undo { path } => {
            match reg.check_permission(&path, &username, true) {
                Ok(()) => {
                    let ss_id = reg.find_file(&path).unwrap().1.ss_id;
                    match reg.resolve_active_endpoint(ss_id) {
                        Ok(entry) => endpoint_response(op_code, entry),
                        Err(e) => err(op_code, e),
                    }
                }
                Err(e) => err(op_code, e),
            }
        }

        ClientRequest::AddAccess { path, target, read, write } => {
            match reg.add_access(&path, &username, &target, read, write) {
                Ok(()) => ack(op_code),
                Err(e) => err(op_code, e),
            }
        }

        ClientRequest::RemAccess { path, target } => match reg.remove_access(&path, &username, &target) {
            Ok(()) => ack(op_code),
            Err(e) => err(op_code, e),
        },

        ClientRequest::CreateFolder { foldername, parent } => {
            if reg.all_folders_with_owner().count() >= limits.max_folders {
                return err(op_code, ScriptoriumError::SSUnavailable);
            }
            match reg.create_folder(&foldername, &parent, &username) {
                Ok(_) => ack(op_code),
                Err(e) => err(op_code, e),
            }
        }

        ClientRequest::Move { path, new_folder } => {
            let (endpoint, new_full_path) = {
                let (_, entry) = match reg.find_file(&path) {
                    Some(v) => v,
                    None => return err(op_code, ScriptoriumError::FileNotFound),
                };
                if !entry.check_permission(&username, true) {
                    return err(op_code, ScriptoriumError::PermissionDenied);
                }
                if !new_folder.is_empty() && reg.folder_by_path(&new_folder).is_none() {
                    return err(op_code, ScriptoriumError::FolderNotFound);
                }
                let new_full_path =
                    if new_folder.is_empty() { entry.filename.clone() } else { format!("{new_folder}/{}", entry.filename) };
                if reg.find_file(&new_full_path).is_some() {
                    return err(op_code, ScriptoriumError::FileExists);
                }
                let endpoint = match reg.resolve_active_endpoint(entry.ss_id) {
                    Ok(e) => e.client_endpoint(),
                    Err(e) => return err(op_code, e),
                };
                (endpoint, new_full_path)
            };
            drop(reg);
            if let Err(e) = forward_to_ss(&endpoint, OpCode::SsMove, &username, &path, new_full_path.into_bytes()).await {
                return err(op_code, e);
            }
            reg = registry.lock().await;
            match reg.move_file(&path, &new_folder, &username) {
                Ok(new_path) => ack_with_payload(op_code, new_path.into_bytes()),
                Err(e) => err(op_code, e),
            }
        }

        ClientRequest::Checkpoint { path, tag: _ } | ClientRequest::Revert { path, tag: _ } => {
            match reg.check_permission(&path, &username, true) {
                Ok(()) => {
                    let ss_id = reg.find_file(&path).unwrap().1.ss_id;
                    match reg.resolve_active_endpoint(ss_id) {
                        Ok(entry) => endpoint_response(op_code, entry),
                        Err(e) => err(op_code, e),
                    }
                }
                Err(e) => err(op_code, e),
            }
        }

        ClientRequest::ViewCheckpoint { path, tag: _ } | ClientRequest::ListCheckpoints { path } => {
            match reg.check_permission(&path, &username, false) {
                Ok(()) => {
                    let ss_id = reg.find_file(&path).unwrap().1.ss_id;
                    match reg.resolve_active_endpoint(ss_id) {
                        Ok(entry) => endpoint_response(op_code, entry),
                        Err(e) => err(op_code, e),
                    }
                }
                Err(e) => err(op_code, e),
            }
        }

        ClientRequest::RequestAccess { path, read, write } => {
            match reg.request_access(&path, &username, read, write) {
                Ok(()) => ack(op_code),
                Err(e) => err(op_code, e),
            }
        }

        ClientRequest::ViewRequests { path } => match reg.view_requests(&username, &path) {
            Ok(requests) => {
                let lines: Vec<String> = requests
                    .iter()
                    .map(|r| format!("{} r={} w={}", r.requester, r.read_requested, r.write_requested))
                    .collect();
                ack_with_payload(op_code, lines.join("\n").into_bytes())
            }
            Err(e) => err(op_code, e),
        },

        ClientRequest::Approve { path, requester } => match reg.approve_request(&username, &path, &requester) {
            Ok(()) => ack(op_code),
            Err(e) => err(op_code, e),
        },

        ClientRequest::Deny { path, requester } => match reg.deny_request(&username, &path, &requester) {
            Ok(()) => ack(op_code),
            Err(e) => err(op_code, e),
        },

        ClientRequest::Exec { command } => {
            if !limits.allow_exec {
                return err(op_code, ScriptoriumError::InvalidCommand);
            }
            let allowed = command
                .split_whitespace()
                .next()
                .map(|program| limits.exec_allow_list.iter().any(|allowed| allowed == program))
                .unwrap_or(false);
            if !allowed {
                return err(op_code, ScriptoriumError::PermissionDenied);
            }
            debug!(%command, "exec allow-listed command");
            ack(op_code)
        }

        ClientRequest::RegisterSs { server_id, ip, nm_port, client_port, replica_id } => {
            if reg.storage_servers_len() >= limits.max_storage_servers {
                return err(op_code, ScriptoriumError::SSUnavailable);
            }
            let entry = StorageServerEntry {
                server_id,
                ip,
                nm_port,
                client_port,
                is_active: true,
                last_heartbeat: crate::nm::model::now_secs(),
                replica_id,
            };
            match reg.register_storage_server(entry) {
                Ok(()) => {
                    info!(server_id, "storage server registered");
                    match peer_payload(&reg, server_id, "SYNC") {
                        Some(payload) => ack_with_payload(op_code, payload),
                        None => ack(op_code),
                    }
                }
                Err(e) => err(op_code, e),
            }
        }

        ClientRequest::Heartbeat { server_id } => match reg.record_heartbeat(server_id) {
            Ok(()) => match peer_payload(&reg, server_id, "REPLICA") {
                Some(payload) => ack_with_payload(op_code, payload),
                None => ack(op_code),
            },
            Err(e) => err(op_code, e),
        },

        ClientRequest::DeregisterSs { server_id } => {
            reg.deregister_storage_server(server_id);
            ack(op_code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_header(op_code: OpCode, username: &str) -> Header {
        Header::request(op_code, username)
    }

    #[tokio::test]
    async fn connect_then_duplicate_connect_is_rejected() {
        let registry = Mutex::new(Registry::new(64));
        let limits = Limits::default();
        let reply = dispatch(&registry, &limits, request_header(OpCode::ConnectClient, "alice"), Vec::new()).await;
        assert_eq!(reply.header.msg_type as u8, crate::wire::MsgType::Response as u8);

        let reply = dispatch(&registry, &limits, request_header(OpCode::ConnectClient, "alice"), Vec::new()).await;
        assert_eq!(reply.header.error_code, ScriptoriumError::UsernameTaken.code());
    }

    #[tokio::test]
    async fn create_without_storage_servers_fails() {
        let registry = Mutex::new(Registry::new(64));
        let limits = Limits::default();
        let header = request_header(OpCode::Create, "alice").with_filename("a.txt");
        let reply = dispatch(&registry, &limits, header, Vec::new()).await;
        assert_eq!(reply.header.error_code, ScriptoriumError::SSUnavailable.code());
    }

    /// Accepts a single connection and ACKs whatever request it carries —
    /// stands in for a storage server so CREATE's forward-then-register has
    /// something to dial.
    async fn spawn_stub_ss() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                if let Ok(Some(frame)) = read_frame(&mut stream).await {
                    let reply = Frame::new(Header::response(frame.header.op_code), Vec::new());
                    let _ = write_frame(&mut stream, &reply).await;
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn register_ss_then_create_resolves_endpoint() {
        let addr = spawn_stub_ss().await;
        let registry = Mutex::new(Registry::new(64));
        let limits = Limits::default();
        let register_header = request_header(OpCode::RegisterSs, "ignored").with_filename("1");
        let payload = format!("127.0.0.1|9000|{}", addr.port());
        let reply = dispatch(&registry, &limits, register_header, payload.into_bytes()).await;
        assert_eq!(reply.header.msg_type as u8, crate::wire::MsgType::Response as u8);

        let create_header = request_header(OpCode::Create, "alice").with_filename("a.txt");
        let reply = dispatch(&registry, &limits, create_header, Vec::new()).await;
        assert_eq!(reply.header.msg_type as u8, crate::wire::MsgType::Response as u8);
        assert_eq!(String::from_utf8(reply.payload).unwrap(), format!("127.0.0.1:{}", addr.port()));
    }

    #[tokio::test]
    async fn register_ss_reports_sync_payload_for_active_pair() {
        let registry = Mutex::new(Registry::new(64));
        let limits = Limits::default();
        let first = request_header(OpCode::RegisterSs, "ignored").with_filename("1");
        dispatch(&registry, &limits, first, b"127.0.0.1|9000|9001".to_vec()).await;

        let second = request_header(OpCode::RegisterSs, "ignored").with_filename("2");
        let reply = dispatch(&registry, &limits, second, b"127.0.0.1|9010|9011".to_vec()).await;
        assert_eq!(reply.payload_str(), "SYNC 127.0.0.1 9001");
    }
}
