// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Diagnostics shared by the parser, resolver, encoder, decoder and simulator.
//!
//! Every stage past schema loading collects diagnostics instead of failing on
//! the first problem, so a single run reports everything it can. Schema
//! problems are the exception: they are fatal and carried by `SchemaError`
//! in the loader module.

use std::fmt;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// Categories of pipeline errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Schema,
    Parse,
    Resolution,
    Encoding,
    Decode,
    Simulation,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Schema => "isa101",
            ErrorKind::Parse => "isa201",
            ErrorKind::Resolution => "isa301",
            ErrorKind::Encoding => "isa401",
            ErrorKind::Decode => "isa501",
            ErrorKind::Simulation => "isa601",
        }
    }
}

/// A diagnostic message with source location and category.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    line: u32,
    column: Option<usize>,
    severity: Severity,
    kind: ErrorKind,
    message: String,
}

impl Diagnostic {
    pub fn new(line: u32, severity: Severity, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            line,
            column: None,
            severity,
            kind,
            message: message.into(),
        }
    }

    pub fn error(line: u32, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(line, Severity::Error, kind, message)
    }

    pub fn warning(line: u32, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(line, Severity::Warning, kind, message)
    }

    pub fn with_column(mut self, column: Option<usize>) -> Self {
        self.column = column;
        self
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> Option<usize> {
        self.column
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn format(&self) -> String {
        let sev = match self.severity {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        format!(
            "{}: {} [{}] - {}",
            self.line,
            sev,
            self.kind.code(),
            self.message
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

/// Split a diagnostic list into (errors, warnings), preserving order.
pub fn partition(diagnostics: Vec<Diagnostic>) -> (Vec<Diagnostic>, Vec<Diagnostic>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    for diag in diagnostics {
        match diag.severity() {
            Severity::Error => errors.push(diag),
            Severity::Warning => warnings.push(diag),
        }
    }
    (errors, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_format_includes_line_severity_and_code() {
        let diag = Diagnostic::error(12, ErrorKind::Parse, "unexpected token");
        assert_eq!(diag.format(), "12: ERROR [isa201] - unexpected token");
    }

    #[test]
    fn warning_format_uses_warning_label() {
        let diag = Diagnostic::warning(3, ErrorKind::Encoding, "immediate truncated");
        assert_eq!(diag.format(), "3: WARNING [isa401] - immediate truncated");
    }

    #[test]
    fn partition_preserves_order_within_severity() {
        let diags = vec![
            Diagnostic::error(1, ErrorKind::Parse, "a"),
            Diagnostic::warning(2, ErrorKind::Encoding, "b"),
            Diagnostic::error(3, ErrorKind::Resolution, "c"),
        ];
        let (errors, warnings) = partition(diags);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].line(), 1);
        assert_eq!(errors[1].line(), 3);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].line(), 2);
    }
}
