//! `lectern-watch` -- follow a lecture-processing job from the terminal.
//!
//! Connects to the job-status WebSocket feed for one job, prints
//! progress as it arrives, reconciles through the REST API after any
//! reconnect, and exits when the job completes or fails.
//!
//! # Environment variables
//!
//! | Variable     | Required | Default | Description                                  |
//! |--------------|----------|---------|----------------------------------------------|
//! | `JOB_ID`     | yes*     | --      | Job to watch (*or pass it as the first arg)  |
//! | `AUTH_TOKEN` | no       | --      | Bearer credential for the feed and the API   |
//! | `LOG_FORMAT` | no       | `text`  | `json` for structured logs on stderr         |
//!
//! Connection settings (`STATUS_WS_URL`, `RECONNECT_*`, ...) are read by
//! [`ChannelConfig::from_env`].

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use lectern_status::api::StatusApi;
use lectern_status::{ChannelConfig, JobStatusChannel};
use lectern_watch::session;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    init_tracing();

    let job_id = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("JOB_ID").ok())
        .context("usage: lectern-watch <job-id> (or set JOB_ID)")?;
    let token = std::env::var("AUTH_TOKEN").ok().filter(|t| !t.is_empty());

    let config = ChannelConfig::from_env()?;
    tracing::info!(
        job_id = %job_id,
        ws_url = %config.ws_base_url,
        max_attempts = config.reconnect.max_attempts,
        "Starting lectern-watch",
    );

    let mut api = StatusApi::new(config.api_base_url.clone());
    if let Some(token) = &token {
        api = api.with_token(token.clone());
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let mut channel = JobStatusChannel::new(job_id, config, Arc::new(tx))
        .context("invalid STATUS_WS_URL")?;
    if let Some(token) = &token {
        channel = channel.with_token(token)?;
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let mut stdout = std::io::stdout();
    let outcome = session::run(channel, rx, &api, &mut stdout, shutdown).await;
    tracing::info!(?outcome, "Watch finished");

    Ok(ExitCode::from(outcome.exit_code()))
}

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lectern_watch=info,lectern_status=info".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}
