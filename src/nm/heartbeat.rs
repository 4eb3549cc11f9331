//! Background heartbeat monitor (specification §4.4): a periodic sweep over
//! the storage-server roster that flips `is_active` when a server misses its
//! heartbeat window, enabling transparent failover in the dispatcher.
//!
//! Grounded on the teacher's `nsm::monitor` host-liveness sweep: a
//! `tokio::time::interval`-driven task, independently schedulable, that never
//! touches the registry from inside the same lock span as any socket I/O.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::interval;
use tracing::warn;

use crate::nm::registry::Registry;

pub async fn run(registry: Arc<Mutex<Registry>>, check_interval: Duration, timeout: Duration) {
    let mut ticker = interval(check_interval);
    loop {
        ticker.tick().await;
        let dead = {
            let mut reg = registry.lock().await;
            reg.sweep_dead_servers(timeout.as_secs())
        };
        for server_id in dead {
            warn!(server_id, "storage server missed heartbeat window, marking inactive");
        }
    }
}
