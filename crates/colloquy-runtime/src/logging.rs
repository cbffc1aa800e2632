//! Logging setup for Colloquy applications.
//!
//! Everything in the workspace logs through `tracing`. This module installs a
//! `tracing-subscriber` registry configured from [`LoggingConfig`], or by hand
//! through [`LoggingBuilder`].
//!
//! ```rust,ignore
//! use colloquy_runtime::logging::{Component, LoggingBuilder};
//!
//! LoggingBuilder::new()
//!     .component(Component::Transport, tracing::Level::WARN)
//!     .trace_pipelines(true)
//!     .init();
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogFormat, LogOutput, LoggingConfig, SpanEventConfig};

/// Target of the span every Emit/On middleware chain runs in.
pub const PIPELINE_TARGET: &str = "colloquy_framework::pipeline";

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanEvents {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

impl SpanEvents {
    pub const NONE: Self = Self {
        new: false,
        enter: false,
        exit: false,
        close: false,
    };

    /// Span creation and close only.
    pub const LIFECYCLE: Self = Self {
        new: true,
        enter: false,
        exit: false,
        close: true,
    };

    pub const FULL: Self = Self {
        new: true,
        enter: true,
        exit: true,
        close: true,
    };

    /// Enter and exit only; noisy for async spans, which are re-entered at every poll.
    pub const ACTIVE: Self = Self {
        new: false,
        enter: true,
        exit: true,
        close: false,
    };

    /// Events enabled in either set.
    pub fn union(self, other: Self) -> Self {
        Self {
            new: self.new || other.new,
            enter: self.enter || other.enter,
            exit: self.exit || other.exit,
            close: self.close || other.close,
        }
    }

    fn to_fmt_span(self) -> FmtSpan {
        [
            (self.new, FmtSpan::NEW),
            (self.enter, FmtSpan::ENTER),
            (self.exit, FmtSpan::EXIT),
            (self.close, FmtSpan::CLOSE),
        ]
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .fold(FmtSpan::NONE, |acc, (_, span)| acc | span)
    }
}

impl From<&SpanEventConfig> for SpanEvents {
    fn from(config: &SpanEventConfig) -> Self {
        Self {
            new: config.new,
            enter: config.enter,
            exit: config.exit,
            close: config.close,
        }
    }
}

/// A part of the SDK whose verbosity can be tuned on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    /// Payloads, object types and the transport contract.
    Core,
    /// Event emitter, plugin manager and middleware pipeline.
    Framework,
    /// Middleware chains only; see [`PIPELINE_TARGET`].
    Pipeline,
    /// Engine facade and chat objects.
    Runtime,
    /// The in-memory transport.
    Transport,
}

impl Component {
    pub fn target(self) -> &'static str {
        match self {
            Self::Core => "colloquy_core",
            Self::Framework => "colloquy_framework",
            Self::Pipeline => PIPELINE_TARGET,
            Self::Runtime => "colloquy_runtime",
            Self::Transport => "colloquy_core::transport",
        }
    }

    fn directive(self, level: Level) -> String {
        format!("{}={}", self.target(), level.as_str().to_lowercase())
    }
}

/// Initializes logging from a [`LoggingConfig`].
///
/// Does nothing if a global subscriber is already installed.
pub fn init_from_config(config: &LoggingConfig) {
    let _ = LoggingBuilder::from_config(config).try_init();
}

/// A builder for configuring logging.
#[derive(Debug, Default)]
pub struct LoggingBuilder {
    directives: Vec<String>,
    level: Option<Level>,
    span_events: SpanEvents,
    format: LogFormat,
    output: LogOutput,
    file_path: Option<PathBuf>,
    with_target: bool,
    thread_ids: bool,
    file_location: bool,
    trace_pipelines: bool,
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self {
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            with_target: true,
            ..Default::default()
        }
    }

    /// Creates a builder from a [`LoggingConfig`].
    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut filters: Vec<_> = config.filters.iter().collect();
        filters.sort_by(|a, b| a.0.cmp(b.0));

        Self {
            directives: filters
                .into_iter()
                .map(|(module, level)| format!("{}={}", module, level.as_str()))
                .collect(),
            level: Some(config.level.to_tracing_level()),
            span_events: SpanEvents::from(&config.span_events),
            format: config.format,
            output: config.output,
            file_path: config.file_path.clone(),
            thread_ids: config.thread_ids,
            file_location: config.file_location,
            trace_pipelines: config.trace_pipelines,
            ..Self::new()
        }
    }

    /// Sets the global log level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    /// Adds a raw filter directive such as `colloquy_runtime=trace`.
    pub fn directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    /// Overrides the level of one SDK component.
    pub fn component(mut self, component: Component, level: Level) -> Self {
        self.directives.push(component.directive(level));
        self
    }

    /// Logs every middleware chain at debug level and its `pipeline` span's
    /// open and close, regardless of the global level.
    pub fn trace_pipelines(mut self, enabled: bool) -> Self {
        self.trace_pipelines = enabled;
        self
    }

    pub fn span_events(mut self, events: SpanEvents) -> Self {
        self.span_events = events;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    /// Directives in the order they are applied. Pipeline tracing goes last
    /// so it wins over a broader `colloquy_framework` override.
    fn effective_directives(&self) -> Vec<String> {
        let mut directives = self.directives.clone();
        if self.trace_pipelines {
            directives.push(Component::Pipeline.directive(Level::DEBUG));
        }
        directives
    }

    fn effective_span_events(&self) -> SpanEvents {
        if self.trace_pipelines {
            self.span_events.union(SpanEvents::LIFECYCLE)
        } else {
            self.span_events
        }
    }

    /// `RUST_LOG` takes precedence over the configured level.
    fn build_filter(&self) -> EnvFilter {
        let base_level = self.level.unwrap_or(Level::INFO);
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(base_level.as_str().to_lowercase()));

        for directive in self.effective_directives() {
            match directive.parse() {
                Ok(d) => filter = filter.add_directive(d),
                Err(e) => eprintln!("Ignoring invalid log directive '{directive}': {e}"),
            }
        }

        filter
    }

    fn writer(&self) -> BoxMakeWriter {
        match (self.output, &self.file_path) {
            (LogOutput::Stdout, _) => BoxMakeWriter::new(std::io::stdout),
            (LogOutput::Stderr, _) => BoxMakeWriter::new(std::io::stderr),
            (LogOutput::File, Some(path)) => BoxMakeWriter::new(tracing_appender::rolling::never(
                path.parent().unwrap_or_else(|| Path::new(".")),
                path.file_name().unwrap_or_else(|| OsStr::new("colloquy.log")),
            )),
            (LogOutput::File, None) => {
                eprintln!("File log output requested without a file path, using stdout");
                BoxMakeWriter::new(std::io::stdout)
            }
        }
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = fmt::layer()
            .with_span_events(self.effective_span_events().to_fmt_span())
            .with_target(self.with_target)
            .with_thread_ids(self.thread_ids)
            .with_file(self.file_location)
            .with_line_number(self.file_location)
            .with_writer(self.writer());

        match self.format {
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Full => layer.boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
            #[cfg(feature = "json-log")]
            LogFormat::Json => layer.json().boxed(),
        }
    }

    /// Installs the subscriber, ignoring a subscriber that is already set.
    pub fn init(self) {
        let _ = self.try_init();
    }

    /// Installs the subscriber.
    pub fn try_init(self) -> Result<(), TryInitError> {
        tracing_subscriber::registry()
            .with(self.fmt_layer())
            .with(self.build_filter())
            .try_init()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_span_events_from_config() {
        let config = SpanEventConfig {
            new: true,
            close: true,
            ..Default::default()
        };
        assert_eq!(SpanEvents::from(&config), SpanEvents::LIFECYCLE);
        assert_eq!(SpanEvents::LIFECYCLE.to_fmt_span(), FmtSpan::NEW | FmtSpan::CLOSE);
    }

    #[test]
    fn test_builder_from_config() {
        let config = LoggingConfig {
            level: LogLevel::Debug,
            thread_ids: true,
            file_location: true,
            filters: HashMap::from([
                ("colloquy_runtime".to_string(), LogLevel::Trace),
                ("colloquy_core".to_string(), LogLevel::Warn),
            ]),
            ..Default::default()
        };

        let builder = LoggingBuilder::from_config(&config);
        assert_eq!(builder.level, Some(Level::DEBUG));
        assert!(builder.thread_ids && builder.file_location);
        assert!(builder.with_target);
        assert_eq!(
            builder.effective_directives(),
            vec!["colloquy_core=warn", "colloquy_runtime=trace"]
        );
        assert_eq!(builder.effective_span_events(), SpanEvents::NONE);
    }

    #[test]
    fn test_trace_pipelines_overrides_framework_level() {
        let config = LoggingConfig {
            filters: HashMap::from([("colloquy_framework".to_string(), LogLevel::Error)]),
            trace_pipelines: true,
            ..Default::default()
        };

        let builder = LoggingBuilder::from_config(&config);
        assert_eq!(
            builder.effective_directives(),
            vec![
                "colloquy_framework=error".to_string(),
                format!("{PIPELINE_TARGET}=debug"),
            ]
        );
        assert_eq!(builder.effective_span_events(), SpanEvents::LIFECYCLE);
    }

    #[test]
    fn test_trace_pipelines_keeps_configured_span_events() {
        let builder = LoggingBuilder::new()
            .span_events(SpanEvents::ACTIVE)
            .trace_pipelines(true);
        assert_eq!(builder.effective_span_events(), SpanEvents::FULL);

        let builder = builder.trace_pipelines(false);
        assert_eq!(builder.effective_span_events(), SpanEvents::ACTIVE);
        assert!(builder.effective_directives().is_empty());
    }

    #[test]
    fn test_component_directives() {
        let builder = LoggingBuilder::new()
            .component(Component::Transport, Level::WARN)
            .component(Component::Runtime, Level::TRACE)
            .directive("chat_room=debug");
        assert_eq!(
            builder.effective_directives(),
            vec![
                "colloquy_core::transport=warn",
                "colloquy_runtime=trace",
                "chat_room=debug",
            ]
        );
        for directive in builder.effective_directives() {
            assert!(directive.parse::<tracing_subscriber::filter::Directive>().is_ok());
        }
    }
}
