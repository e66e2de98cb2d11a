//! Logging configuration and initialization
//!
//! Every harvester stage logs through `tracing` with structured fields. The
//! convention is an `action` field naming the event (`fetch_page`,
//! `upload_item`, `job_finished`, `batch_finished`, ...) followed by the
//! payload identifiers, so a log pipeline can follow one batch end to end:
//!
//! ```rust,ignore
//! info!(action = "job_finished", batch_id = %batch_id, job_id = %job_id, "Job finished");
//! ```
//!
//! Lines go to the console and/or a daily rotated file, as text or JSON.
//!
//! # Example
//!
//! ```no_run
//! use geocore_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     let _guard = init_logging(&config)?;
//!     tracing::info!("Harvester started");
//!     Ok(())
//! }
//! ```

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    filter::Directive,
    EnvFilter, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Where log lines are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogSink {
    #[default]
    Console,
    File,
    Both,
}

impl std::str::FromStr for LogSink {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" | "stdout" => Ok(LogSink::Console),
            "file" => Ok(LogSink::File),
            "both" => Ok(LogSink::Both),
            other => Err(anyhow!("LOG_OUTPUT must be console, file or both, got '{}'", other)),
        }
    }
}

/// Logging configuration, read from `LOG_*` variables
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub sink: LogSink,
    /// One JSON object per line instead of text
    pub json: bool,
    /// Directory of the daily rotated files
    pub log_dir: PathBuf,
    pub log_file_prefix: String,
    /// Extra directives such as "sqlx=warn,aws_smithy_runtime=warn"
    pub filter: Option<String>,
    pub thread_ids: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            sink: LogSink::Console,
            json: false,
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: "geocore-harvester".to_string(),
            filter: None,
            thread_ids: false,
        }
    }
}

impl LogConfig {
    /// Variables: `LOG_LEVEL`, `LOG_OUTPUT` (console, file, both),
    /// `LOG_FORMAT` (text, json), `LOG_DIR`, `LOG_FILE_PREFIX`, `LOG_FILTER`
    /// and `LOG_THREAD_IDS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(level) = lookup("LOG_LEVEL") {
            config.level = level
                .parse()
                .map_err(|_| anyhow!("LOG_LEVEL must be trace, debug, info, warn or error, got '{}'", level))?;
        }
        if let Some(sink) = lookup("LOG_OUTPUT") {
            config.sink = sink.parse()?;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            config.json = match format.to_ascii_lowercase().as_str() {
                "json" => true,
                "text" => false,
                other => return Err(anyhow!("LOG_FORMAT must be text or json, got '{}'", other)),
            };
        }
        if let Some(dir) = lookup("LOG_DIR") {
            config.log_dir = dir.into();
        }
        if let Some(prefix) = lookup("LOG_FILE_PREFIX") {
            config.log_file_prefix = prefix;
        }
        config.filter = lookup("LOG_FILTER").filter(|f| !f.trim().is_empty());
        config.thread_ids = lookup("LOG_THREAD_IDS").is_some_and(|v| v == "true" || v == "1");

        Ok(config)
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        let directives = std::iter::once(self.level.to_string().to_ascii_lowercase()).chain(
            self.filter
                .iter()
                .flat_map(|f| f.split(','))
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
        );

        directives.fold(Ok(EnvFilter::from_default_env()), |filter, directive| {
            let parsed: Directive = directive
                .parse()
                .with_context(|| format!("Invalid log filter directive '{}'", directive))?;
            Ok(filter?.add_directive(parsed))
        })
    }

    fn layer<W>(&self, writer: W, ansi: bool) -> BoxedLayer
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_thread_ids(self.thread_ids)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(ansi);

        if self.json {
            layer.json().boxed()
        } else {
            layer.boxed()
        }
    }
}

/// Install the global subscriber. Hold the returned guard until shutdown
/// when the file sink is on, or buffered lines are lost.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = config.env_filter()?;
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if matches!(config.sink, LogSink::Console | LogSink::Both) {
        layers.push(config.layer(std::io::stdout, true));
    }
    if matches!(config.sink, LogSink::File | LogSink::Both) {
        std::fs::create_dir_all(&config.log_dir)
            .with_context(|| format!("Cannot create log directory {}", config.log_dir.display()))?;
        let (writer, file_guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(
            &config.log_dir,
            &config.log_file_prefix,
        ));
        layers.push(config.layer(writer, false));
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("A tracing subscriber is already installed")?;

    Ok(guard)
}
