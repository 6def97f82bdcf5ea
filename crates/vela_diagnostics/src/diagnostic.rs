//! The diagnostic record.

use crate::code::DiagnosticCode;
use crate::label::Label;
use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use vela_source::Span;

/// One reported problem, located at the span of the offending node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity level of this diagnostic.
    pub severity: Severity,
    /// The code identifying the kind of problem.
    pub code: DiagnosticCode,
    /// The main message.
    pub message: String,
    /// Location of the offending node.
    pub primary_span: Span,
    /// Related locations.
    pub labels: Vec<Label>,
    /// Explanatory footnotes.
    pub notes: Vec<String>,
    /// Suggestions for fixing the design.
    pub help: Vec<String>,
}

impl Diagnostic {
    fn with_severity(severity: Severity, code: DiagnosticCode, message: String, span: Span) -> Self {
        Self {
            severity,
            code,
            message,
            primary_span: span,
            labels: Vec::new(),
            notes: Vec::new(),
            help: Vec::new(),
        }
    }

    /// Creates an error diagnostic.
    pub fn error(code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self::with_severity(Severity::Error, code, message.into(), span)
    }

    /// Creates a warning diagnostic.
    pub fn warning(code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self::with_severity(Severity::Warning, code, message.into(), span)
    }

    /// Adds a label to this diagnostic.
    pub fn with_label(mut self, label: Label) -> Self {
        self.labels.push(label);
        self
    }

    /// Adds a note to this diagnostic.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Adds a help message to this diagnostic.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help.push(help.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_severity() {
        let e = Diagnostic::error(DiagnosticCode::error(301), "unresolved", Span::DUMMY);
        assert_eq!(e.severity, Severity::Error);
        let w = Diagnostic::warning(DiagnosticCode::warning(301), "latch", Span::DUMMY);
        assert_eq!(w.severity, Severity::Warning);
        assert_eq!(w.message, "latch");
    }

    #[test]
    fn builder_methods() {
        let d = Diagnostic::error(DiagnosticCode::error(310), "redefinition", Span::DUMMY)
            .with_label(Label::secondary(Span::DUMMY, "first defined here"))
            .with_note("modules must have unique names")
            .with_help("enable `overwrite` to replace the existing module");
        assert_eq!(d.labels.len(), 1);
        assert_eq!(d.notes.len(), 1);
        assert_eq!(d.help.len(), 1);
    }
}
