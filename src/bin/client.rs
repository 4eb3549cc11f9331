//! `client <nm_ip> <nm_port> <username>` (specification §6). Exits `1` on an
//! argument or socket error, `0` otherwise.

use clap::Parser;

/// The Scriptorium interactive client.
#[derive(Parser, Debug)]
#[command(name = "client")]
struct Args {
    nm_ip: String,
    nm_port: u16,
    username: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    scriptorium::logging::init("client");

    let nm_addr = format!("{}:{}", args.nm_ip, args.nm_port);
    if let Err(err) = scriptorium::client::run_shell(&nm_addr, &args.username).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
