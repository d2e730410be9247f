// Logging for Foreman
//
// Built on the `tracing` ecosystem. Worker threads inherit the dispatcher that
// was current on the thread calling `start`, and every worker thread runs
// inside a `worker` span carrying the worker name and instance id.
//
// # Usage Examples
//
// ```rust
// use foreman::logging;
//
// // INFO level, human-readable console output
// logging::init_default();
//
// // Or pick a preset
// logging::init_development();
// logging::init_production();
//
// // Both console and file output
// logging::init_with_file(logging::LogConfig::default(), "/var/log/foreman.log").unwrap();
// ```
//
// ## Worker Macros
//
// ```rust
// use foreman::{log_lifecycle, worker_span};
//
// let span = worker_span!("ingest", "6a1f...");
// let _guard = span.enter();
// log_lifecycle!("ingest", "started");
// ```

use std::io;
use std::sync::Once;
use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Configuration for the logging system.
///
/// # Examples
///
/// ```rust
/// use foreman::logging::LogConfig;
/// use tracing::Level;
///
/// let config = LogConfig {
///     level: Level::DEBUG,
///     json_format: true,
///     show_file_line: false,
///     show_thread_info: true,
///     show_time: true,
///     target_filters: Some("foreman=debug,foreman::timed=trace".to_string()),
/// };
/// ```
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to use JSON format for logs
    pub json_format: bool,
    /// Whether to include file and line information
    pub show_file_line: bool,
    /// Whether to include thread name/id; worker threads are named after their worker
    pub show_thread_info: bool,
    /// Whether to include timestamps
    pub show_time: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

// Initialization guard to ensure we only initialize once
static INIT: Once = Once::new();

fn env_filter(config: &LogConfig) -> EnvFilter {
    let mut env_filter = EnvFilter::from_default_env().add_directive(config.level.into());

    if let Some(filters) = &config.target_filters {
        for filter in filters.split(',') {
            if let Ok(directive) = filter.trim().parse() {
                env_filter = env_filter.add_directive(directive);
            }
        }
    }
    env_filter
}

/// Initialize the logging system with the given configuration.
///
/// Safe to call multiple times; only the first call takes effect.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let registry = tracing_subscriber::registry().with(env_filter(&config));

        let subscriber: Box<dyn Subscriber + Send + Sync> = if config.json_format {
            Box::new(
                registry.with(
                    fmt::layer()
                        .json()
                        .flatten_event(true)
                        .with_thread_names(config.show_thread_info)
                        .with_thread_ids(config.show_thread_info),
                ),
            )
        } else {
            let fmt_layer = fmt::layer()
                .with_ansi(atty::is(atty::Stream::Stdout))
                .with_file(config.show_file_line)
                .with_line_number(config.show_file_line)
                .with_thread_names(config.show_thread_info)
                .with_thread_ids(config.show_thread_info);
            if config.show_time {
                Box::new(registry.with(fmt_layer))
            } else {
                Box::new(registry.with(fmt_layer.without_time()))
            }
        };

        set_global_subscriber(subscriber);
    });
}

fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Opens `path` in append mode for use as a log writer.
pub fn file_writer(path: &str) -> io::Result<Box<dyn io::Write + Send + Sync + 'static>> {
    use std::fs::OpenOptions;

    let file = OpenOptions::new().create(true).append(true).open(path)?;

    Ok(Box::new(file))
}

/// Initialize logging with both console and file output.
///
/// The log file is opened once up front so an unwritable path is reported to
/// the caller instead of silently falling back.
pub fn init_with_file(config: LogConfig, log_file: &str) -> Result<(), io::Error> {
    // Check the path before committing the global subscriber.
    drop(file_writer(log_file)?);

    INIT.call_once(|| {
        let console_layer = fmt::layer()
            .with_ansi(atty::is(atty::Stream::Stdout))
            .with_file(config.show_file_line)
            .with_line_number(config.show_file_line)
            .with_thread_names(config.show_thread_info)
            .with_thread_ids(config.show_thread_info);

        let log_file_path = log_file.to_string();
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(move || match file_writer(&log_file_path) {
                Ok(writer) => writer,
                Err(_) => Box::new(std::io::stderr()),
            })
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_thread_ids(true);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter(&config))
            .with(console_layer)
            .with(file_layer);

        set_global_subscriber(subscriber);
    });

    Ok(())
}

/// INFO level, human-readable console output.
pub fn init_default() {
    init(LogConfig::default());
}

/// DEBUG level with TRACE for the per-iteration worker loop, file/line info
/// and thread names.
pub fn init_development() {
    init(LogConfig {
        level: Level::DEBUG,
        json_format: false,
        show_file_line: true,
        show_thread_info: true,
        show_time: true,
        target_filters: Some("foreman=debug,foreman::worker=trace".to_string()),
    });
}

/// INFO level JSON output without file/line information.
pub fn init_production() {
    init(LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        show_thread_info: true,
        show_time: true,
        target_filters: None,
    });
}

/// WARN level, compact output for test runs.
///
/// ```rust
/// #[test]
/// fn my_test() {
///     foreman::logging::init_test();
/// }
/// ```
pub fn init_test() {
    init(LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    });
}

/// Create a span for everything a worker thread does.
///
/// ```rust
/// use foreman::worker_span;
///
/// let span = worker_span!("ingest", "0b9c");
/// let _guard = span.enter();
/// ```
#[macro_export]
macro_rules! worker_span {
    ($worker:expr, $id:expr) => {
        tracing::info_span!("worker", name = $worker, id = $id)
    };
    ($worker:expr, $id:expr, $($fields:tt)*) => {
        tracing::info_span!("worker", name = $worker, id = $id, $($fields)*)
    };
}

/// Log worker lifecycle transitions.
///
/// ```rust
/// use foreman::log_lifecycle;
///
/// log_lifecycle!("ingest", "started");
/// log_lifecycle!("ingest", "stopped", elapsed_ms = 12);
/// ```
#[macro_export]
macro_rules! log_lifecycle {
    ($worker:expr, $event:expr) => {
        tracing::info!(worker = $worker, event = $event)
    };
    ($worker:expr, $event:expr, $($fields:tt)*) => {
        tracing::info!(worker = $worker, event = $event, $($fields)*)
    };
}

/// Log a single loop iteration; trace level because it fires per unit.
#[macro_export]
macro_rules! log_work {
    ($worker:expr, $status:expr) => {
        tracing::trace!(worker = $worker, status = $status)
    };
    ($worker:expr, $status:expr, $($fields:tt)*) => {
        tracing::trace!(worker = $worker, status = $status, $($fields)*)
    };
}

/// Log error events.
///
/// ```rust
/// use foreman::log_error;
///
/// let error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
/// log_error!(error, worker = "ingest");
/// ```
#[macro_export]
macro_rules! log_error {
    ($error:expr) => {
        tracing::error!(error = %$error)
    };
    ($error:expr, $($fields:tt)*) => {
        tracing::error!(error = %$error, $($fields)*)
    };
}

/// Get the current tracing dispatcher.
///
/// Workers capture it on the thread calling `start` and install it on their
/// own thread, so scoped subscribers (as used in tests) follow the worker.
#[inline]
pub fn current_subscriber() -> tracing::Dispatch {
    tracing::dispatcher::get_default(|d| d.clone())
}

// Re-export the most commonly used tracing macros for convenience
pub use tracing::{debug, error, info, trace, warn};
