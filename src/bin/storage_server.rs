//! `storage_server <id> <nm_ip> <nm_port> <client_port> <storage_dir>
//! [replica_ip replica_port]` (specification §6). Exits `1` on an argument or
//! socket error, `0` otherwise.

use clap::Parser;

/// A Scriptorium storage server.
#[derive(Parser, Debug)]
#[command(name = "storage_server")]
struct Args {
    /// This server's id (odd/even ids are paired for replication).
    id: u32,
    /// Name server host.
    nm_ip: String,
    /// Name server port.
    nm_port: u16,
    /// Port this server accepts client/peer connections on.
    client_port: u16,
    /// Directory holding this server's file bodies and sidecars.
    storage_dir: String,
    /// Replica partner's host, if recovering into an existing pair.
    replica_ip: Option<String>,
    /// Replica partner's client-facing port.
    replica_port: Option<u16>,

    #[arg(long, default_value = "storage_server.toml")]
    config: String,

    /// Address this server advertises to the name server and peers.
    #[arg(long, default_value = "127.0.0.1")]
    advertise_ip: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    scriptorium::logging::init(&format!("storage_server_{}", args.id));

    let limits = scriptorium::config::Limits::load(&args.config);
    let replica_addr = match (&args.replica_ip, args.replica_port) {
        (Some(ip), Some(port)) => Some(format!("{ip}:{port}")),
        _ => None,
    };

    let config = scriptorium::ss::SsConfig {
        server_id: args.id,
        nm_ip: args.nm_ip,
        nm_port: args.nm_port,
        client_port: args.client_port,
        storage_dir: args.storage_dir.into(),
        replica_addr,
        advertise_ip: args.advertise_ip,
        heartbeat_interval: limits.heartbeat_check_interval(),
    };

    if let Err(err) = scriptorium::ss::run(config).await {
        tracing::error!(error = %err, "storage server terminated");
        std::process::exit(1);
    }
}
