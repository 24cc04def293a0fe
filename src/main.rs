mod attendance;
mod backup;
mod calendar;
mod config;
mod controller;
mod db;
mod ipc;
mod messages;
mod migrate;
mod model;
mod store;

use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn main() {
    let cfg = match config::Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("rosterd: invalid configuration: {e:#}");
            std::process::exit(2);
        }
    };

    // stdout carries the IPC stream; logs go to stderr.
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&cfg.log_filter).unwrap_or_else(|_| EnvFilter::new("rosterd=info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(false),
        )
        .init();

    let generator: Option<Arc<dyn messages::MessageGenerator>> =
        match messages::GeminiGenerator::from_config(&cfg.generation) {
            Ok(Some(g)) => Some(Arc::new(g)),
            Ok(None) => {
                tracing::info!("no API key configured; message drafting disabled");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to build generation client; drafting disabled");
                None
            }
        };

    let stdout: Box<dyn Write + Send> = Box::new(io::stdout());
    let out: ipc::SharedOut = Arc::new(Mutex::new(stdout));
    let mut state = ipc::AppState::new(messages::DraftDispatcher::new(generator), out.clone());

    if let Some(path) = cfg.workspace.as_deref() {
        if let Err(e) = state.open_workspace(path) {
            tracing::warn!(error = %e, workspace = %path.display(), "startup workspace did not open");
        }
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rosterd ready");

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to answer to.
                ipc::write_line(&out, &ipc::err("", "bad_json", e.to_string(), None));
                continue;
            }
        };

        tracing::debug!(id = %req.id, method = %req.method, "request");
        match ipc::handle_request(&mut state, req) {
            ipc::Reply::Now(resp) => ipc::write_line(&out, &resp),
            ipc::Reply::Deferred => {}
        }
    }

    // Let drafts that are already running answer before the process exits.
    let grace = cfg.generation.timeout + std::time::Duration::from_secs(1);
    if !state.drafts.wait_idle(grace) {
        tracing::warn!("exiting with drafts still running");
    }
}
