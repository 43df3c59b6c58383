use crate::config::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Keeps the file writer alive; see [`LogGuard::flush`].
#[must_use]
pub struct LogGuard {
    worker: Option<WorkerGuard>,
}

impl LogGuard {
    /// Flushes buffered file output and stops the writer thread.
    pub fn flush(self) {
        drop(self.worker);
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over the configured level. Console output goes to
/// stderr so stdout stays free for reports. Calling it again is a no-op.
pub fn init(config: &LogConfig) -> LogGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (file_writer, worker) = match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "dealflow.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        let stderr_layer = fmt::layer().json().with_target(true).with_writer(std::io::stderr);
        let file_layer = file_writer.map(|writer| {
            fmt::layer()
                .json()
                .with_target(true)
                .with_writer(writer)
                .with_ansi(false)
        });
        registry.with(stderr_layer).with(file_layer).try_init()
    } else {
        let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
        let file_layer = file_writer.map(|writer| {
            fmt::layer()
                .with_target(false)
                .with_writer(writer)
                .with_ansi(false)
        });
        registry.with(stderr_layer).with(file_layer).try_init()
    };
    if let Err(err) = result {
        tracing::debug!(error = %err, "Subscriber already installed");
    }

    LogGuard { worker }
}
