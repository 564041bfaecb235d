//! Nexus server: local document knowledge base with LLM chat.
//!
//! Usage:
//!   OPENROUTER_API_KEY=sk-... nexus-server
//!
//! Or with args:
//!   nexus-server --bind 127.0.0.1:8000 --static-root ./web --config ./settings.json

use axum::extract::Request;
use axum::ServiceExt;
use clap::Parser;
use nexus_lib::extraction::pdf_extractor;
use nexus_lib::server::{app, AppState};
use nexus_lib::settings::{self, Settings, SettingsError};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nexus-server", version, about = "Document knowledge base chat server")]
struct Args {
    /// Settings file (default: $NEXUS_CONFIG, then <config dir>/nexus/settings.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address as host:port (overrides NEXUS_BIND)
    #[arg(long)]
    bind: Option<String>,

    /// Directory holding templates/index.html and static/
    #[arg(long)]
    static_root: Option<PathBuf>,

    /// Model identifier sent to the chat-completions API (overrides NEXUS_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Write the effective settings to the settings file and exit
    #[arg(long)]
    write_config: bool,
}

/// defaults < settings file < environment < flags
fn load_settings(args: &Args) -> Result<(Settings, Option<PathBuf>), SettingsError> {
    let path = settings::resolve_config_path(args.config.as_deref());
    let mut settings = match &path {
        Some(p) => Settings::load(p)?,
        None => Settings::default(),
    };
    settings.apply_env()?;

    if let Some(bind) = &args.bind {
        settings.set_bind(bind)?;
    }
    if let Some(root) = &args.static_root {
        settings.static_root = root.clone();
    }
    if let Some(model) = &args.model {
        settings.model = model.clone();
    }
    settings.validate()?;
    Ok((settings, path))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("[Server] Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("[Server] Shutting down");
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let (settings, config_path) = match load_settings(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            log::error!("[Server] {}", e);
            std::process::exit(1);
        }
    };

    if args.write_config {
        let Some(path) = config_path else {
            log::error!("[Server] No settings location available; pass --config");
            std::process::exit(1);
        };
        // The key stays in the environment, not on disk
        let to_save = Settings { api_key: None, ..settings };
        if let Err(e) = to_save.save(&path) {
            log::error!("[Server] {}", e);
            std::process::exit(1);
        }
        log::info!("[Server] Wrote settings to {}", path.display());
        return;
    }

    let bind_addr = settings.bind_addr();
    log::info!("[Server] Model: {}", settings.model);
    log::info!(
        "[Server] PDF backend: {:?} (library extractor {})",
        settings.pdf_backend,
        if pdf_extractor::is_available() { "available" } else { "not compiled in" }
    );
    if settings.api_key().is_none() {
        log::info!("[Server] No OPENROUTER_API_KEY set; clients must send api_key with each chat");
    }

    let state = match AppState::new(settings) {
        Ok(state) => state,
        Err(e) => {
            log::error!("[Server] {}", e);
            std::process::exit(1);
        }
    };
    let service = app(state);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            log::error!("[Server] Failed to bind to {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    log::info!("[Server] Listening on http://{}", bind_addr);
    let serve = axum::serve(listener, ServiceExt::<Request>::into_make_service(service))
        .with_graceful_shutdown(shutdown_signal());
    if let Err(e) = serve.await {
        log::error!("[Server] Server error: {}", e);
        std::process::exit(1);
    }
}
