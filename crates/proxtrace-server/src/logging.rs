//! Subscriber setup for the server binary.
//!
//! Production writes JSON to daily files under `storage.log_dir` and compact
//! lines to stdout for the journal. Development prints pretty output with
//! span events. `RUST_LOG` takes precedence over `server.log_level`.

use std::borrow::Cow;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::Context;
use proxtrace_core::TraceConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log files are named `proxtrace.<date>.log`.
const LOG_FILE_PREFIX: &str = "proxtrace";
const LOG_FILE_SUFFIX: &str = "log";

/// Non-blocking writer guards (file, stdout). Dropping them loses buffered lines.
static GUARDS: OnceLock<(WorkerGuard, WorkerGuard)> = OnceLock::new();

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Returns an error if the filter does not parse or, in production, if the
/// log directory cannot be created.
pub fn init(config: &TraceConfig) -> anyhow::Result<()> {
    let from_env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directives = filter_directives(from_env, &config.server.log_level);
    let filter = EnvFilter::try_new(directives.as_ref())
        .with_context(|| format!("Invalid log filter {directives:?}"))?;

    if config.server.production {
        let log_dir = config.storage.log_dir();
        init_production(filter, file_appender(&log_dir)?);
        tracing::info!(log_dir = %log_dir.display(), "Writing logs to disk");
    } else {
        init_development(filter);
    }

    Ok(())
}

/// Pick the filter directives: a non-blank `RUST_LOG` wins over the config.
fn filter_directives(from_env: Option<String>, configured: &str) -> Cow<'_, str> {
    match from_env {
        Some(env) if !env.trim().is_empty() => env.into(),
        _ => configured.into(),
    }
}

/// Daily rolling appender inside `dir`, creating the directory first.
fn file_appender(dir: &Path) -> anyhow::Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Cannot create log directory {}", dir.display()))?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .build(dir)
        .with_context(|| format!("Cannot open log file in {}", dir.display()))
}

fn init_production(filter: EnvFilter, appender: RollingFileAppender) {
    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // journald adds its own timestamps and does not render ANSI
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_ansi(false)
        .without_time();

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    let _ = GUARDS.set((file_guard, stdout_guard));
}

fn init_development(filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE),
        )
        .init();
}
