use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::ValueEnum;
use console::style;
use miette::{IntoDiagnostic, WrapErr};
use tracing::level_filters::LevelFilter;
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::filter_fn,
    fmt::{
        FmtContext, FormatEvent, FormatFields,
        format::Writer,
        time::{FormatTime, SystemTime},
    },
    prelude::*,
    registry::LookupSpan,
};

#[derive(Default, Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, clap::ValueEnum)]
pub enum Level {
    Silent,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl Level {
    /// The tracing level, `None` for [`Level::Silent`]
    pub fn as_tracing(self) -> Option<tracing::Level> {
        match self {
            Level::Silent => None,
            Level::Error => Some(tracing::Level::ERROR),
            Level::Warn => Some(tracing::Level::WARN),
            Level::Info => Some(tracing::Level::INFO),
            Level::Debug => Some(tracing::Level::DEBUG),
            Level::Trace => Some(tracing::Level::TRACE),
        }
    }
}

impl From<Level> for LevelFilter {
    fn from(level: Level) -> LevelFilter {
        match level.as_tracing() {
            Some(level) => LevelFilter::from_level(level),
            None => LevelFilter::OFF,
        }
    }
}

/// Send every event of one level to its own file, `<level>=<path>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub level: tracing::Level,
    pub path: PathBuf,
}

impl FromStr for Redirect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (level, path) = s
            .split_once('=')
            .ok_or_else(|| format!("expected <level>=<path>, got '{}'", s))?;
        if path.is_empty() {
            return Err(format!("missing path for level '{}'", level));
        }
        let level = <Level as ValueEnum>::from_str(level, true)?
            .as_tracing()
            .ok_or_else(|| "silent cannot be redirected".to_string())?;
        Ok(Self {
            level,
            path: PathBuf::from(path),
        })
    }
}

/// Where log output goes
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub level: Level,
    /// Append to this file instead of stderr
    pub log_file: Option<PathBuf>,
    pub color: bool,
    pub redirects: Vec<Redirect>,
    /// Levels that are dropped everywhere, redirects included
    pub suppress: Vec<Level>,
}

/// Runtime switch for colored level tags, shared by every console layer
#[derive(Debug, Clone)]
pub struct ColorSwitch(Arc<AtomicBool>);

impl ColorSwitch {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Flip the switch and return the new state
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::Relaxed)
    }
}

/// Three letter tag shown in front of every log line
fn level_tag(level: &tracing::Level) -> &'static str {
    match *level {
        tracing::Level::ERROR => "ERR",
        tracing::Level::WARN => "WRN",
        tracing::Level::INFO => "INF",
        tracing::Level::DEBUG => "DBG",
        tracing::Level::TRACE => "TRC",
    }
}

/// `<timestamp> [INF] message key=value` lines, colored when the writer
/// supports it and the color switch is on
#[derive(Debug)]
pub struct ConsoleFormat {
    timer: SystemTime,
    color: ColorSwitch,
}

impl ConsoleFormat {
    pub fn new(color: ColorSwitch) -> Self {
        Self {
            timer: SystemTime,
            color,
        }
    }
}

impl<S, F> FormatEvent<S, F> for ConsoleFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    F: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, F>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        self.timer.format_time(&mut writer)?;

        let level = event.metadata().level();
        let tag = format!("[{}]", level_tag(level));
        if writer.has_ansi_escapes() && self.color.is_enabled() {
            let styled = match *level {
                tracing::Level::ERROR => style(tag).red(),
                tracing::Level::WARN => style(tag).yellow(),
                tracing::Level::INFO => style(tag).green(),
                tracing::Level::DEBUG | tracing::Level::TRACE => style(tag).blue(),
            };
            write!(writer, " {} ", styled.force_styling(true))?;
        } else {
            write!(writer, " {} ", tag)?;
        }

        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn open_append(path: &Path) -> miette::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to open log file {}", path.display()))
}

/// Build the output layers: the main one (stderr or `log_file`) plus one per
/// redirect, each filtered to the levels it owns.
fn build_layers<S>(
    options: &LogOptions,
    color: &ColorSwitch,
) -> miette::Result<Vec<Box<dyn Layer<S> + Send + Sync>>>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    let suppressed: Vec<tracing::Level> = options
        .suppress
        .iter()
        .filter_map(|level| level.as_tracing())
        .collect();
    let redirected: Vec<tracing::Level> = options
        .redirects
        .iter()
        .map(|redirect| redirect.level)
        .collect();

    let main_filter = {
        let suppressed = suppressed.clone();
        filter_fn(move |meta| {
            !suppressed.contains(meta.level()) && !redirected.contains(meta.level())
        })
    };

    let mut layers = Vec::new();
    match &options.log_file {
        Some(path) => {
            let file = open_append(path)?;
            layers.push(
                tracing_subscriber::fmt::layer()
                    .event_format(ConsoleFormat::new(color.clone()))
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_filter(main_filter)
                    .boxed(),
            );
        }
        None => {
            let ansi = options.color && io::stderr().is_terminal();
            layers.push(
                tracing_subscriber::fmt::layer()
                    .event_format(ConsoleFormat::new(color.clone()))
                    .with_writer(io::stderr)
                    .with_ansi(ansi)
                    .with_filter(main_filter)
                    .boxed(),
            );
        }
    }

    for redirect in &options.redirects {
        if suppressed.contains(&redirect.level) {
            continue;
        }
        let level = redirect.level;
        let file = open_append(&redirect.path)?;
        layers.push(
            tracing_subscriber::fmt::layer()
                .event_format(ConsoleFormat::new(color.clone()))
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_filter(filter_fn(move |meta| *meta.level() == level))
                .boxed(),
        );
    }

    Ok(layers)
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` directives take precedence over the level. Redirected and
/// suppressed levels are only affected if that filter lets them through.
/// The returned switch turns colored level tags on and off at runtime.
pub fn init_tracing(options: &LogOptions) -> miette::Result<ColorSwitch> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(options.level).into())
        .from_env_lossy();
    let color = ColorSwitch::new(options.color);
    let layers = build_layers(options, &color)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()
        .into_diagnostic()?;

    Ok(color)
}
