use std::path::Path;
use std::str::FromStr;

use tokio::task::JoinHandle;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use common::config::{LogConfig, RepoConfig};
use common::context::Context;
use common::repo::CONFIG_FILE_NAME;

const LOG_FILE_NAME: &str = "cairn.log";

/// Spawns a task that listens for SIGINT and SIGTERM and cancels the
/// returned context when either arrives.
pub fn graceful_shutdown_blocker() -> std::io::Result<(JoinHandle<()>, Context)> {
    let (ctx, canceller) = Context::with_cancel();

    #[cfg(unix)]
    let handle = {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => tracing::debug!("shutting down on SIGINT"),
                _ = sigterm.recv() => tracing::debug!("shutting down on SIGTERM"),
            }
            canceller.cancel();
        })
    };

    #[cfg(not(unix))]
    let handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("shutting down on ctrl-c");
        }
        canceller.cancel();
    });

    Ok((handle, ctx))
}

/// Logging settings for a daemon run, read from the repository config
/// without taking the repository lock.
pub fn log_config(repo_path: &Path) -> LogConfig {
    RepoConfig::load(&repo_path.join(CONFIG_FILE_NAME))
        .map(|config| config.log)
        .unwrap_or_default()
}

/// Initialize logging, panic handler, and build info reporting.
/// Returns guards that must be kept alive for the duration of the program.
pub fn init_logging(log: &LogConfig) -> Vec<WorkerGuard> {
    use tracing_subscriber::fmt::format::FmtSpan;

    let level = tracing::Level::from_str(&log.level).unwrap_or_else(|_| {
        eprintln!(
            "Warning: unknown log level {:?}, falling back to info",
            log.level
        );
        tracing::Level::INFO
    });

    let mut guards = Vec::new();

    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(stdout_guard);

    let stdout_env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_filter(stdout_env_filter);

    if let Some(log_dir) = &log.dir {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: Failed to create log directory {:?}: {}",
                log_dir, e
            );
        }

        let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
        let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        guards.push(file_guard);

        let file_env_filter = EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy();

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(file_env_filter);

        tracing_subscriber::registry()
            .with(stdout_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry().with(stdout_layer).init();
    }

    register_panic_logger();
    report_build_info();

    guards
}

/// Registers a panic hook that logs panics using the `tracing` crate
pub fn register_panic_logger() {
    std::panic::set_hook(Box::new(|panic| match panic.location() {
        Some(loc) => {
            tracing::error!(
                message = %panic,
                panic.file = loc.file(),
                panic.line = loc.line(),
                panic.column = loc.column(),
            );
        }
        None => tracing::error!(message = %panic),
    }));
}

pub fn report_build_info() {
    let build = common::prelude::build_info();

    tracing::info!(
        build_profile = ?build.build_profile,
        features = ?build.build_features,
        version = ?build.version,
        "daemon starting up"
    );
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use common::config::DEFAULT_LOG_LEVEL;
    use common::repo;

    use super::*;

    #[test]
    fn test_log_config_from_repo() {
        let temp = TempDir::new().unwrap();
        let mut config = repo::init(temp.path(), None).unwrap();
        config.log.level = "debug".to_string();
        config.save(&temp.path().join(CONFIG_FILE_NAME)).unwrap();

        assert_eq!(log_config(temp.path()).level, "debug");
    }

    #[test]
    fn test_log_config_defaults_without_repo() {
        let temp = TempDir::new().unwrap();
        let log = log_config(&temp.path().join("missing"));
        assert_eq!(log.level, DEFAULT_LOG_LEVEL);
        assert!(log.dir.is_none());
    }
}
