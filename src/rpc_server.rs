//! smartmarks RPC Server: JSON-RPC over stdin/stdout for a UI shell.
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//! Request:  {"id":1, "method":"bookmark.add", "params":{"url":"...","title":"..."}}
//! Response: {"id":1, "result":{...}} or {"id":1, "error":"..."}
//!
//! Logs go to stderr; stdout carries only protocol lines.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use smartmarks::app::App;
use smartmarks::platform;
use smartmarks::rpc_handler::serve;
use smartmarks::services::settings_engine::{SettingsEngine, SettingsEngineTrait};

/// Environment variable overriding where the database lives.
const ENV_DATA_DIR: &str = "SMARTMARKS_DATA_DIR";

/// Max RPC requests per second.
const MAX_REQUESTS_PER_SECOND: u32 = 200;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut settings_engine = SettingsEngine::new(None);
    settings_engine.load()?;
    settings_engine.apply_env_overrides()?;
    let log_filter = settings_engine.get_settings().logging.filter.clone();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .init();

    let data_dir = std::env::var(ENV_DATA_DIR)
        .ok()
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(platform::get_data_dir);
    info!(data_dir = %data_dir.display(), config = settings_engine.get_config_path(), "starting smartmarks-rpc");

    let app = Arc::new(App::new(settings_engine, &data_dir)?);
    if let Err(err) = app.startup().await {
        // Not fatal: the error is visible through state.get.
        warn!(error = %err, "session restore failed");
    }

    let mut stdout = tokio::io::stdout();
    let ready = json!({"event": "ready", "version": env!("CARGO_PKG_VERSION")});
    stdout.write_all(format!("{}\n", ready).as_bytes()).await?;
    stdout.flush().await?;

    let result = serve(
        app.clone(),
        BufReader::new(tokio::io::stdin()),
        stdout,
        MAX_REQUESTS_PER_SECOND,
    )
    .await;

    app.shutdown();
    info!("stdin closed; exiting");
    result.map_err(Into::into)
}
