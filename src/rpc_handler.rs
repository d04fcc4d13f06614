//! RPC method handler for the smartmarks JSON-RPC protocol.
//!
//! Extracted from `rpc_server.rs` so it can be unit-tested independently.
//! The `handle_method` function dispatches JSON-RPC method calls to the
//! sync controller and settings engine held by the `App` struct; `serve`
//! runs the newline-delimited request loop over any reader and writer.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::app::App;
use crate::managers::sync_controller::SyncControllerTrait;
use crate::services::settings_engine::SettingsEngineTrait;

/// Simple rate limiter: max requests per one-second window.
pub struct RateLimiter {
    window_start: Instant,
    request_count: u32,
    max_per_second: u32,
}

impl RateLimiter {
    pub fn new(max_per_second: u32) -> Self {
        Self { window_start: Instant::now(), request_count: 0, max_per_second }
    }

    /// Returns true if the request is allowed, false if rate-limited.
    pub fn check(&mut self) -> bool {
        if self.window_start.elapsed().as_secs() >= 1 {
            self.window_start = Instant::now();
            self.request_count = 0;
        }
        self.request_count += 1;
        self.request_count <= self.max_per_second
    }
}

fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing {}", key))
}

/// Dispatch a JSON-RPC method call to the appropriate handler.
///
/// Returns `Ok(Value)` on success or `Err(String)` with an error message.
/// Controller failures are also left in the `last_error` field of `state.get`.
pub async fn handle_method(app: &App, method: &str, params: &Value) -> Result<Value, String> {
    let controller = &app.controller;
    match method {
        "ping" => Ok(json!({"pong": true, "version": env!("CARGO_PKG_VERSION")})),

        // ─── State ───
        "state.get" => serde_json::to_value(controller.snapshot()).map_err(|e| e.to_string()),
        "error.clear" => {
            controller.clear_error();
            Ok(json!({"ok": true}))
        }
        "draft.update" => {
            let title = params.get("title").and_then(|v| v.as_str()).unwrap_or("");
            let url = params.get("url").and_then(|v| v.as_str()).unwrap_or("");
            controller.update_draft(title, url);
            Ok(json!({"ok": true}))
        }

        // ─── Session ───
        "session.sign_in" => {
            controller.sign_in().await.map_err(|e| e.to_string())?;
            Ok(json!({"ok": true, "session": controller.session()}))
        }
        "session.complete" => {
            let callback_url = str_param(params, "url")?;
            let session = app
                .complete_sign_in(callback_url)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({"ok": true, "session": session}))
        }
        "session.sign_out" => {
            controller.sign_out().await.map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }

        // ─── Bookmarks ───
        "bookmark.add" => {
            // Missing fields fall back to the draft the UI has been editing.
            let draft = controller.draft();
            let title = params
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or(draft.title.as_str());
            let url = params
                .get("url")
                .and_then(|v| v.as_str())
                .unwrap_or(draft.url.as_str());
            let record = controller
                .add_bookmark(title, url)
                .await
                .map_err(|e| e.to_string())?;
            serde_json::to_value(record).map_err(|e| e.to_string())
        }
        "bookmark.delete" => {
            let id = str_param(params, "id")?;
            controller.delete_bookmark(id).await.map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }
        "bookmark.list" => serde_json::to_value(controller.bookmarks()).map_err(|e| e.to_string()),
        "bookmark.refresh" => {
            controller.fetch_bookmarks().await.map_err(|e| e.to_string())?;
            serde_json::to_value(controller.bookmarks()).map_err(|e| e.to_string())
        }

        // ─── Settings ───
        // Saved changes apply from the next launch; the running backend stays as built.
        "settings.get" => {
            let engine = app.settings_engine();
            serde_json::to_value(engine.get_settings()).map_err(|e| e.to_string())
        }
        "settings.set" => {
            let key = str_param(params, "key")?;
            let value = params.get("value").cloned().ok_or("missing value")?;
            let mut engine = app.settings_engine();
            engine.set_value(key, value).map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }
        "settings.reset" => {
            let mut engine = app.settings_engine();
            engine.reset().map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }

        _ => Err(format!("unknown method: {}", method)),
    }
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, message: &Value) -> io::Result<()> {
    output.write_all(format!("{}\n", message).as_bytes()).await?;
    output.flush().await
}

/// Serves requests read from `input` until it closes, then waits for the
/// requests still running.
///
/// Each request runs on its own task, so a call waiting on the network does
/// not hold up the ones behind it. Responses are written by one task in the
/// order they complete; clients match them to requests by `id`.
pub async fn serve<R, W>(app: Arc<App>, input: R, output: W, max_per_second: u32) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (responses, mut outbox) = mpsc::unbounded_channel::<Value>();
    let writer = tokio::spawn(async move {
        let mut output = output;
        while let Some(message) = outbox.recv().await {
            write_line(&mut output, &message).await?;
        }
        Ok::<(), io::Error>(())
    });

    let mut rate_limiter = RateLimiter::new(max_per_second);
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let req: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                let _ = responses.send(json!({"id": null, "error": format!("parse error: {}", e)}));
                continue;
            }
        };

        let id = req.get("id").cloned().unwrap_or(Value::Null);

        if !rate_limiter.check() {
            warn!(%id, "request rate-limited");
            let _ = responses.send(json!({"id": id, "error": "rate limit exceeded"}));
            continue;
        }

        let method = req.get("method").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let params = req.get("params").cloned().unwrap_or(json!({}));
        debug!(%id, method = %method, "dispatching request");

        let app = app.clone();
        let responses = responses.clone();
        tokio::spawn(async move {
            let response = match handle_method(&app, &method, &params).await {
                Ok(val) => json!({"id": id, "result": val}),
                Err(err) => json!({"id": id, "error": err}),
            };
            let _ = responses.send(response);
        });
    }

    // The writer ends once every request task has dropped its sender.
    drop(responses);
    writer
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}
