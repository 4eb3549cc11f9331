//! Structured logging setup, shared by all three binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes a `tracing` subscriber writing to stdout, filtered by
/// `RUST_LOG` (defaulting to `component=info`), and appends a rolling file
/// under `logs/<component>.log` as specified in the external interfaces
/// section.
pub fn init(component: &str) {
    if let Some(parent) = std::path::Path::new("logs").parent() {
        let _ = parent;
    }
    let _ = std::fs::create_dir_all("logs");

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(format!("logs/{component}.log"))
        .ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{component}=info,scriptorium=info").into());

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer());

    match file {
        Some(file) => {
            let file_layer = tracing_subscriber::fmt::layer().with_writer(file).with_ansi(false);
            registry.with(file_layer).init();
        }
        None => registry.init(),
    }
}
