//! Best-effort status reporter for the workstate dashboard.
//!
//! Meant to be called from shell hooks. It sends at most one request, never
//! retries, and exits successfully no matter what happened, so a missing or
//! broken dashboard can never interrupt the caller.

use clap::{error::ErrorKind, Parser};
use std::{process::ExitCode, time::Duration};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use workstate_core::SessionReport;

const DEFAULT_URL: &str = "http://127.0.0.1:7777";
const INGEST_PATH: &str = "/api/session";

#[derive(Parser, Debug)]
#[command(name = "workstate-report", about = "Send one status update to the workstate dashboard")]
struct Args {
    /// Dashboard base URL.
    #[arg(long, default_value = "")]
    url: String,
    #[arg(long, default_value = "")]
    session_id: String,
    /// Owning session; together with --thread-id reports a thread.
    #[arg(long)]
    parent_id: Option<String>,
    #[arg(long)]
    thread_id: Option<String>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    task: Option<String>,
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    risk: Option<String>,
    #[arg(long, default_value_t = 1500)]
    timeout_ms: u64,
    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn main() -> ExitCode {
    let debug_env = env_true("WORKSTATE_REPORT_DEBUG");
    let args = match Args::try_parse() {
        Ok(value) => value,
        Err(err) => {
            if debug_env || matches!(err.kind(), ErrorKind::DisplayHelp) {
                let _ = err.print();
            }
            return ExitCode::SUCCESS;
        }
    };
    init_logging(args.debug || debug_env);

    let fallback_session = std::env::var("WORKSTATE_SESSION_ID").ok();
    let Some(report) = build_report(&args, fallback_session) else {
        debug!(event = "report_skipped", reason = "missing_session_id");
        return ExitCode::SUCCESS;
    };

    let endpoint = ingest_url(&resolve_url(&args.url));
    send_best_effort(&endpoint, &report, Duration::from_millis(args.timeout_ms));
    ExitCode::SUCCESS
}

fn init_logging(debug: bool) {
    let filter = if debug { "debug" } else { "off" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .try_init();
}

fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

fn build_report(args: &Args, fallback_session: Option<String>) -> Option<SessionReport> {
    let session_id = if args.session_id.trim().is_empty() {
        fallback_session.filter(|value| !value.trim().is_empty())?
    } else {
        args.session_id.clone()
    };
    Some(SessionReport {
        session_id: Some(session_id),
        parent_id: args.parent_id.clone(),
        thread_id: args.thread_id.clone(),
        name: args.name.clone(),
        task: args.task.clone(),
        status: args.status.clone(),
        risk: args.risk.clone(),
    })
}

fn resolve_url(url_flag: &str) -> String {
    if !url_flag.trim().is_empty() {
        return url_flag.to_string();
    }
    if let Ok(value) = std::env::var("WORKSTATE_URL") {
        if !value.trim().is_empty() {
            return value;
        }
    }
    DEFAULT_URL.to_string()
}

fn ingest_url(base: &str) -> String {
    let trimmed = base.trim().trim_end_matches('/');
    if trimmed.ends_with(INGEST_PATH) {
        trimmed.to_string()
    } else {
        format!("{trimmed}{INGEST_PATH}")
    }
}

/// Sends the report once. The outcome is logged at debug level and otherwise
/// discarded.
fn send_best_effort(endpoint: &str, report: &SessionReport, timeout: Duration) {
    let agent = ureq::AgentBuilder::new().timeout(timeout).build();
    match agent.post(endpoint).send_json(report) {
        Ok(response) => debug!(event = "report_sent", endpoint = endpoint, status = response.status()),
        Err(err) => debug!(event = "report_failed", endpoint = endpoint, error = %err),
    }
}
