// diagnostics.rs
//
// Components never reach for a global logger directly; they receive a
// `&dyn Diagnostics` and report through it.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use log::{debug, info, warn};

use crate::error::{ProjectionError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warn,
}

/// Sink for progress and warning messages emitted by the projection engine.
pub trait Diagnostics: Send + Sync {
    fn emit(&self, severity: Severity, message: &str);

    fn debug(&self, message: &str) {
        self.emit(Severity::Debug, message);
    }

    fn info(&self, message: &str) {
        self.emit(Severity::Info, message);
    }

    fn warn(&self, message: &str) {
        self.emit(Severity::Warn, message);
    }
}

/// Forwards everything to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn emit(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Debug => debug!("{}", message),
            Severity::Info => info!("{}", message),
            Severity::Warn => warn!("{}", message),
        }
    }
}

/// Writes info and warning lines to a run log file and forwards every event to `log`.
pub struct FileDiagnostics {
    writer: Mutex<BufWriter<File>>,
}

impl FileDiagnostics {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| ProjectionError::io(path, e))?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl Diagnostics for FileDiagnostics {
    fn emit(&self, severity: Severity, message: &str) {
        LogDiagnostics.emit(severity, message);
        if severity == Severity::Debug {
            return;
        }
        if let Ok(mut writer) = self.writer.lock() {
            let prefix = if severity == Severity::Warn { "WARNING: " } else { "" };
            // Write failures on the run log are ignored.
            let _ = writeln!(writer, "{}{}", prefix, message);
            let _ = writer.flush();
        }
    }
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    events: Mutex<Vec<(Severity, String)>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(Severity, String)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|(severity, _)| *severity == Severity::Warn)
            .map(|(_, message)| message)
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.events().iter().any(|(_, message)| message.contains(needle))
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn emit(&self, severity: Severity, message: &str) {
        if let Ok(mut events) = self.events.lock() {
            events.push((severity, message.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_keeps_order_and_filters_warnings() {
        let diag = RecordingDiagnostics::new();
        diag.info("first");
        diag.warn("second");
        diag.debug("third");

        let events = diag.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], (Severity::Info, "first".to_string()));
        assert_eq!(diag.warnings(), vec!["second".to_string()]);
        assert!(diag.contains("thi"));
    }

    #[test]
    fn file_sink_skips_debug_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        {
            let diag = FileDiagnostics::create(&path).unwrap();
            diag.debug("hidden");
            diag.info("started");
            diag.warn("careful");
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "started\nWARNING: careful\n");
    }
}
