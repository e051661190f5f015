//! Gap-fill trainer backend
//!
//! - Axum HTTP + WebSocket API
//! - Chat pass-through with an exercise tool (OpenAI, via environment variables)
//! - Exercise match engine: word bank, placements, grading, reset
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   OPENAI_API_KEY      : enables OpenAI integration if present
//!   OPENAI_BASE_URL     : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL   : chat turns, default "gpt-4o-mini"
//!   OPENAI_STRONG_MODEL : exercise generation, default "gpt-4o"
//!   AGENT_CONFIG_PATH   : path to TOML config (prompts + optional exercise bank)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"
//!   SESSION_TTL_SECS    : idle HTTP session lifetime, default 1800
//!   MAX_SESSIONS        : cap on open HTTP sessions, default 10000

mod telemetry;
mod util;
mod domain;
mod error;
mod validate;
mod engine;
mod session;
mod config;
mod seeds;
mod state;
mod protocol;
mod logic;
mod openai;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::build_router;
use crate::state::{spawn_session_sweeper, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared application state (exercise store, sessions, OpenAI client, prompts).
  let state = Arc::new(AppState::new());
  let _sweeper = spawn_session_sweeper(state.clone());

  let app = build_router(state);

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "gapfill_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "gapfill_backend", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "gapfill_backend", "Shutdown signal received");
}
