//! Log sink for host builds.
//!
//! Implements [`log::Log`] by writing one line per record to stderr, so
//! the console on stdout stays clean.  On target the platform logger is
//! installed instead and this module is unused.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

pub struct StderrSink {
    level: LevelFilter,
    start: Instant,
}

static SINK: OnceLock<StderrSink> = OnceLock::new();

impl StderrSink {
    /// Install as the global logger.  Fails if a logger is already set.
    pub fn init(level: LevelFilter) -> Result<(), log::SetLoggerError> {
        let sink = SINK.get_or_init(|| StderrSink {
            level,
            start: Instant::now(),
        });
        log::set_logger(sink)?;
        log::set_max_level(level);
        Ok(())
    }
}

/// Level from a `SIGNALBOX_LOG`-style string; unknown text means `Info`.
pub fn parse_level(text: Option<&str>) -> LevelFilter {
    text.and_then(|t| t.parse().ok()).unwrap_or(LevelFilter::Info)
}

fn tag(level: Level) -> &'static str {
    match level {
        Level::Error => "E",
        Level::Warn => "W",
        Level::Info => "I",
        Level::Debug => "D",
        Level::Trace => "T",
    }
}

impl Log for StderrSink {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let ms = self.start.elapsed().as_millis();
        let mut err = std::io::stderr().lock();
        let _ = writeln!(
            err,
            "{} ({:>6}) {}: {}",
            tag(record.level()),
            ms,
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}
