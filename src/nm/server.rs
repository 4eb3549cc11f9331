//! The name server's accept loop: one reader task, one dispatch task, and
//! one writer task per connection (specification §2 EXPANSION), wired
//! together with `mpsc` channels the way the teacher's per-connection
//! `read_task` / `vfs_task` / `stream_writer` pipeline is wired.
//!
//! A connection's reader never blocks its writer: frames queue on the
//! request channel while a previous reply is still being written, and
//! replies queue on the response channel while the next request is still
//! being read. Per-connection ordering is preserved because each channel is
//! FIFO and there is exactly one dispatch task per connection.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::config::Limits;
use crate::nm::dispatcher;
use crate::nm::persistence;
use crate::nm::registry::Registry;
use crate::wire::{read_frame, write_frame, Frame};

const CHANNEL_CAPACITY: usize = 64;

pub async fn run(port: u16, limits: Limits, state_path: PathBuf) -> std::io::Result<()> {
    let registry = Arc::new(Mutex::new(persistence::load(&state_path, limits.lru_cache_size)));

    {
        let registry = registry.clone();
        let check = limits.heartbeat_check_interval();
        let timeout = limits.heartbeat_timeout();
        tokio::spawn(async move {
            crate::nm::heartbeat::run(registry, check, timeout).await;
        });
    }

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "name server listening");

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        let registry = registry.clone();
        let limits = limits.clone();
        let state_path = state_path.clone();
        tokio::spawn(async move {
            info!(%peer, "connection accepted");
            handle_connection(socket, registry, limits, state_path).await;
            info!(%peer, "connection closed");
        });
    }
}

async fn handle_connection(socket: TcpStream, registry: Arc<Mutex<Registry>>, limits: Limits, state_path: PathBuf) {
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

    let dispatch_task = tokio::spawn(async move {
        while let Some(frame) = request_rx.recv().await {
            let reply = dispatcher::dispatch(&registry, &limits, frame.header, frame.payload).await;
            persistence::save(&*registry.lock().await, &state_path);
            if response_tx.send(reply).await.is_err() {
                break;
            }
        }
    });

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = response_rx.recv().await {
            if let Err(e) = write_frame(&mut write_half, &frame).await {
                warn!(error = %e, "frame write failed, closing connection");
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let _ = reader_task.await;
    let _ = dispatch_task.await;
    let _ = writer_task.await;
}
