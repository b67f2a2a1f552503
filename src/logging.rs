use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_DIR: &str = "logs";
const DEFAULT_FILTER: &str = "curbside=info,tower_http=info";

/// Initializes the logging system with both console and file output.
///
/// `RUST_LOG` overrides the default filter. Keep the returned guard alive
/// for the life of the process so buffered file output is flushed.
pub fn init_logging() -> Option<WorkerGuard> {
    let file_layer = match fs::create_dir_all(LOG_DIR) {
        Ok(()) => {
            // Daily-rotated JSON file next to the human-readable console output
            let file_appender = tracing_appender::rolling::daily(LOG_DIR, "curbside.log");
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            Some((fmt::layer().json().with_writer(writer), guard))
        }
        Err(e) => {
            eprintln!("log directory {LOG_DIR} unavailable ({e}); logging to console only");
            None
        }
    };
    let (file_layer, guard) = match file_layer {
        Some((layer, guard)) => (Some(layer), Some(guard)),
        None => (None, None),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let console_layer = fmt::layer().with_writer(std::io::stdout);

    if tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .is_err()
    {
        eprintln!("global tracing subscriber already installed");
    }

    guard
}
