//! Registration with the name server, the heartbeat sender, and SYNC
//! recovery (specification §4.6): on startup a storage server registers
//! itself, keeps its heartbeat alive on a long-lived control connection, and
//! — if it has a replica partner — pulls a digest from that partner and
//! fetches anything it's missing or holds an older copy of.
//!
//! Grounded on the teacher's `read_task`/`stream_writer` split for streaming
//! file bodies in chunks: SYNC reuses that same frame-at-a-time pattern, just
//! addressed at a peer storage server instead of a client.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::{Result, ScriptoriumError};
use crate::ss::storage::FileStore;
use crate::wire::{read_frame, write_frame, Header, OpCode};

pub struct SsIdentity {
    pub server_id: u32,
    pub ip: String,
    pub nm_port: u16,
    pub client_port: u16,
    pub replica_id: Option<u32>,
}

async fn send_request(stream: &mut TcpStream, header: Header, payload: Vec<u8>) -> Result<crate::wire::Frame> {
    let frame = crate::wire::Frame::new(header, payload);
    write_frame(stream, &frame).await?;
    read_frame(stream).await?.ok_or(ScriptoriumError::NetworkError)
}

pub async fn register(identity: &SsIdentity, nm_addr: &str) -> Result<TcpStream> {
    let mut stream = TcpStream::connect(nm_addr).await.map_err(|_| ScriptoriumError::NetworkError)?;
    let payload = match identity.replica_id {
        Some(replica) => format!("{}|{}|{}|{}", identity.ip, identity.nm_port, identity.client_port, replica),
        None => format!("{}|{}|{}", identity.ip, identity.nm_port, identity.client_port),
    };
    let header = Header::request(OpCode::RegisterSs, "").with_filename(&identity.server_id.to_string());
    let reply = send_request(&mut stream, header, payload.into_bytes()).await?;
    if reply.header.msg_type as u8 == crate::wire::MsgType::Error as u8 {
        return Err(ScriptoriumError::from_code(reply.header.error_code).unwrap_or(ScriptoriumError::NetworkError));
    }
    info!(server_id = identity.server_id, "registered with name server");
    Ok(stream)
}

/// Keeps sending a heartbeat over `stream` at `interval`, reconnecting to
/// `nm_addr` and re-registering if the connection drops.
pub async fn run_heartbeat_loop(identity: SsIdentity, nm_addr: String, interval: Duration) {
    let mut stream = match register(&identity, &nm_addr).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "initial registration with name server failed");
            return;
        }
    };

    loop {
        sleep(interval).await;
        let header = Header::request(OpCode::Heartbeat, "").with_filename(&identity.server_id.to_string());
        match send_request(&mut stream, header, Vec::new()).await {
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "heartbeat failed, reconnecting");
                match register(&identity, &nm_addr).await {
                    Ok(s) => stream = s,
                    Err(e) => {
                        error!(error = %e, "re-registration failed, will retry next tick");
                    }
                }
            }
        }
    }
}

/// Pulls a digest from `peer_addr` and fetches any file that's missing
/// locally or whose peer copy is newer, bringing this server's state in
/// line with its replica partner after a restart.
pub async fn sync_from_peer(store: &FileStore, peer_addr: &str) -> Result<usize> {
    let mut stream = TcpStream::connect(peer_addr).await.map_err(|_| ScriptoriumError::SSUnavailable)?;
    let digest_header = Header::request(OpCode::SsSyncDigest, "sync");
    let reply = send_request(&mut stream, digest_header, Vec::new()).await?;
    let digest_text = reply.payload_str();

    let local: std::collections::HashMap<String, (u64, u64)> =
        store.list_all()?.into_iter().map(|(name, mtime, size)| (name, (mtime, size))).collect();

    let mut fetched = 0;
    for line in digest_text.lines() {
        let mut parts = line.splitn(3, '|');
        let (Some(name), Some(mtime), Some(size)) =
            (parts.next(), parts.next().and_then(|p| p.parse::<u64>().ok()), parts.next().and_then(|p| p.parse::<u64>().ok()))
        else {
            continue;
        };
        let needs_fetch = match local.get(name) {
            Some((local_mtime, local_size)) => mtime > *local_mtime || size != *local_size,
            None => true,
        };
        if !needs_fetch {
            continue;
        }
        let fetch_header = Header::request(OpCode::SsSyncFetch, "sync").with_filename(name);
        let reply = send_request(&mut stream, fetch_header, Vec::new()).await?;
        store.restore_body(name, &reply.payload_str())?;
        fetched += 1;
    }
    info!(peer = peer_addr, fetched, "sync from replica peer complete");
    Ok(fetched)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_line_parses_three_fields() {
        let line = "notes.txt|1700000000|42";
        let mut parts = line.splitn(3, '|');
        assert_eq!(parts.next(), Some("notes.txt"));
        assert_eq!(parts.next().and_then(|p| p.parse::<u64>().ok()), Some(1700000000));
        assert_eq!(parts.next().and_then(|p| p.parse::<u64>().ok()), Some(42));
    }
}
