//! The diagnostic log every stage reports through.
//!
//! Each pipeline stage owns one [`Log`] while it runs and hands it to the
//! driver on completion. Entries keep insertion order; nothing is ever
//! removed, so a log doubles as a trace of what the stage did.

use crate::error::Position;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Debug,
    Warning,
    Error,
}

impl Severity {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    /// ANSI escape used by the colored rendering.
    pub const fn color(self) -> &'static str {
        match self {
            Self::Info => "\x1b[32m",
            Self::Debug => "\x1b[36m",
            Self::Warning => "\x1b[33m",
            Self::Error => "\x1b[31m",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub position: Option<Position>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        if let Some(position) = self.position {
            write!(f, " at {}", position)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Log {
    entries: Vec<Diagnostic>,
}

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, severity: Severity, message: impl Into<String>, position: Option<Position>) {
        self.entries.push(Diagnostic {
            severity,
            message: message.into(),
            position,
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Severity::Info, message, None);
    }
    pub fn debug(&mut self, message: impl Into<String>) {
        self.push(Severity::Debug, message, None);
    }
    pub fn debug_at(&mut self, message: impl Into<String>, position: Position) {
        self.push(Severity::Debug, message, Some(position));
    }
    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(Severity::Warning, message, None);
    }
    pub fn warning_at(&mut self, message: impl Into<String>, position: Position) {
        self.push(Severity::Warning, message, Some(position));
    }
    pub fn error_at(&mut self, message: impl Into<String>, position: Position) {
        self.push(Severity::Error, message, Some(position));
    }
    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Severity::Error, message, None);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    fn count(&self, severity: Severity) -> usize {
        self.entries
            .iter()
            .filter(|e| e.severity == severity)
            .count()
    }

    /// Plain-text rendering, one entry per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out
    }

    /// Same as [`render`](Self::render) with a per-severity color hint.
    pub fn render_ansi(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(entry.severity.color());
            out.push_str(&entry.to_string());
            out.push_str("\x1b[0m\n");
        }
        out
    }
}

impl fmt::Display for Log {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.render())
    }
}
