//! The storage server's accept loop: the same reader/dispatch/writer task
//! split as the name server (`nm::server`), plus the control-plane
//! background work (registration, heartbeats, SYNC recovery) started once at
//! boot.
//!
//! A connection that drops without a clean `WRITE_UNLOCK` leaves its locks
//! behind forever unless something cleans them up; this accept loop tracks
//! which `(filename, user)` pairs a connection has locked and releases them
//! when the connection closes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::ss::control::{self, SsIdentity};
use crate::ss::dispatcher;
use crate::ss::locks::LockRegistry;
use crate::ss::storage::FileStore;
use crate::wire::{read_frame, write_frame, Frame, OpCode};

const CHANNEL_CAPACITY: usize = 64;

pub struct SsConfig {
    pub server_id: u32,
    pub nm_ip: String,
    pub nm_port: u16,
    pub client_port: u16,
    pub storage_dir: std::path::PathBuf,
    pub replica_addr: Option<String>,
    pub advertise_ip: String,
    pub heartbeat_interval: Duration,
}

pub async fn run(config: SsConfig) -> std::io::Result<()> {
    let store = Arc::new(FileStore::new(&config.storage_dir));
    let locks = LockRegistry::new();

    if let Some(peer) = &config.replica_addr {
        match control::sync_from_peer(&store, peer).await {
            Ok(count) => info!(count, peer, "synced from replica peer at startup"),
            Err(e) => warn!(error = %e, peer, "sync from replica peer failed, starting with local state only"),
        }
    }

    let identity = SsIdentity {
        server_id: config.server_id,
        ip: config.advertise_ip.clone(),
        nm_port: config.nm_port,
        client_port: config.client_port,
        replica_id: None,
    };
    let nm_addr = format!("{}:{}", config.nm_ip, config.nm_port);
    let heartbeat_interval = config.heartbeat_interval;
    tokio::spawn(async move {
        control::run_heartbeat_loop(identity, nm_addr, heartbeat_interval).await;
    });

    let listener = TcpListener::bind(("0.0.0.0", config.client_port)).await?;
    info!(port = config.client_port, server_id = config.server_id, "storage server listening");

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        let store = store.clone();
        let locks = locks.clone();
        tokio::spawn(async move {
            info!(%peer, "connection accepted");
            handle_connection(socket, store, locks).await;
            info!(%peer, "connection closed");
        });
    }
}

async fn handle_connection(socket: TcpStream, store: Arc<FileStore>, locks: Arc<LockRegistry>) {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);

    let (request_tx, mut request_rx) = mpsc::channel::<Frame>(CHANNEL_CAPACITY);
    let (response_tx, mut response_rx) = mpsc::channel::<Frame>(CHANNEL_CAPACITY);

    let reader_task = tokio::spawn(async move {
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(frame)) => {
                    if request_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "frame read failed, closing connection");
                    break;
                }
            }
        }
    });

    let dispatch_locks = locks.clone();
    let dispatch_task = tokio::spawn(async move {
        let mut held: HashSet<(String, String)> = HashSet::new();
        while let Some(frame) = request_rx.recv().await {
            let (op_code, filename, user) =
                (frame.header.op_code, frame.header.filename.clone(), frame.header.username.clone());
            let reply = dispatcher::dispatch(&store, &dispatch_locks, frame.header, frame.payload).await;
            if op_code == OpCode::SsWriteLock && reply.header.error_code == 0 {
                held.insert((filename, user));
            }
            if response_tx.send(reply).await.is_err() {
                break;
            }
        }
        for (filename, user) in held {
            dispatch_locks.cleanup_user_locks(&filename, &user).await;
        }
    });

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = response_rx.recv().await {
            if let Err(e) = write_frame(&mut write_half, &frame).await {
                warn!(error = %e, "frame write failed, closing connection");
                break;
            }
        }
        use tokio::io::AsyncWriteExt;
        let _ = write_half.shutdown().await;
    });

    let _ = reader_task.await;
    let _ = dispatch_task.await;
    let _ = writer_task.await;
}
