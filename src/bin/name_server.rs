//! `name_server <port>` — binds the name server's control/client-facing
//! listener on `port` (specification §6). Exits `1` on an argument or socket
//! error, `0` otherwise.

use clap::Parser;

/// The Scriptorium name server.
#[derive(Parser, Debug)]
#[command(name = "name_server")]
struct Args {
    /// TCP port to listen on.
    port: u16,

    /// Optional TOML file of bounded limits (specification §6).
    #[arg(long, default_value = "name_server.toml")]
    config: String,

    /// Path to the persisted registry state file.
    #[arg(long, default_value = "data/nm_state.dat")]
    state: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    scriptorium::logging::init("name_server");

    let limits = scriptorium::config::Limits::load(&args.config);

    if let Err(err) = scriptorium::nm::run(args.port, limits, args.state.into()).await {
        tracing::error!(error = %err, "name server terminated");
        std::process::exit(1);
    }
}
