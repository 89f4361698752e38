//! Print every envelope from a gateway's event stream, one JSON per line.
//!
//! Config path from argv[1] or `PUSHWIRE_CLIENT_CONFIG`; defaults when absent.

use std::path::PathBuf;

use tracing_subscriber::{fmt, EnvFilter};

use pushwire_client::config::{self, ClientConfig};
use pushwire_client::session::{Connector, HttpConnector};
use pushwire_client::StreamDecoder;
use pushwire_core::error::{PushwireError, Result};

#[tokio::main]
async fn main() {
    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "pushwire-tail failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cfg = match config_path() {
        Some(path) => config::load_from_file(path)?,
        None => ClientConfig::default(),
    };

    let connector = HttpConnector::new(&cfg)?;
    let mut decoder =
        StreamDecoder::new(connector.connect().await?).with_idle_timeout(cfg.idle_timeout());

    while decoder.advance().await? {
        if let Some(env) = decoder.current() {
            let line = serde_json::to_string(env)
                .map_err(|e| PushwireError::Internal(format!("encode envelope: {e}")))?;
            println!("{line}");
        }
    }
    tracing::info!("stream ended");
    Ok(())
}

fn config_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("PUSHWIRE_CLIENT_CONFIG"))
        .map(PathBuf::from)
}
