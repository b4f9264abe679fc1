//! Logging initialization and configuration.
//!
//! Every record carries a `role` field naming the running program, so lines
//! from several processes can share one sink.

use std::path::Path;

use serde::Deserialize;
use tracing::{info, Event, Subscriber};
use tracing_subscriber::{
    fmt::{
        self,
        format::{FmtSpan, Writer},
        FmtContext, FormatEvent, FormatFields, MakeWriter,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Layer, Registry,
};

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `json`, `console` or `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}

/// Name of the running program, attached to every record.
pub fn process_role() -> String {
    let arg0 = std::env::args().next().unwrap_or_default();
    Path::new(&arg0)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Event formatter that prepends a `role` field to whatever `inner` writes.
///
/// JSON records get a top-level `"role"` key; text records a `role=<name>` prefix.
pub struct RoleFormat<F> {
    role: String,
    role_json: String,
    inner: F,
}

impl<F> RoleFormat<F> {
    pub fn new(role: impl Into<String>, inner: F) -> Self {
        let role = role.into();
        let role_json = serde_json::Value::from(role.as_str()).to_string();
        Self {
            role,
            role_json,
            inner,
        }
    }
}

impl<S, N, F> FormatEvent<S, N> for RoleFormat<F>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    F: FormatEvent<S, N>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let mut line = String::new();
        self.inner.format_event(ctx, Writer::new(&mut line), event)?;

        match line.strip_prefix('{') {
            Some(rest) => write!(writer, "{{\"role\":{},{}", self.role_json, rest),
            None => write!(writer, "role={} {}", self.role, line),
        }
    }
}

/// Builds the formatting layer for `format`, writing to `writer`.
fn fmt_layer<S, W>(format: &str, role: &str, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let role = role.to_string();
    match format {
        "console" => fmt::layer()
            .compact()
            .with_ansi(false)
            .with_target(true)
            .with_writer(writer)
            .map_event_format(|inner| RoleFormat::new(role, inner))
            .boxed(),
        "pretty" => fmt::layer()
            .pretty()
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_writer(writer)
            .map_event_format(|inner| RoleFormat::new(role, inner))
            .boxed(),
        _ => fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .with_writer(writer)
            .map_event_format(|inner| RoleFormat::new(role, inner))
            .boxed(),
    }
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over `config.level`.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let role = process_role();

    tracing_subscriber::registry()
        .with(fmt_layer::<Registry, _>(&config.format, &role, std::io::stdout))
        .with(env_filter)
        .try_init()?;

    info!(format = %config.format, "logging initialized");
    Ok(())
}
