//! Text rendering of diagnostics.

use crate::diagnostic::Diagnostic;
use crate::label::LabelStyle;
use vela_source::SourceDb;

/// Formats a diagnostic for display.
pub trait DiagnosticRenderer {
    /// Renders a single diagnostic into a formatted string.
    fn render(&self, diag: &Diagnostic, source_db: &SourceDb) -> String;
}

/// Renders diagnostics in the compact one-location-per-line form used by
/// HDL tools:
///
/// ```text
/// top.v:12.5-12.17: error[E301]: identifier `foo` is not declared
///    = note: ...
/// ```
pub struct TerminalRenderer {
    /// Whether to use ANSI color codes for the severity.
    pub color: bool,
}

impl TerminalRenderer {
    /// Creates a new terminal renderer.
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn severity_text(&self, diag: &Diagnostic) -> String {
        let text = format!("{}[{}]", diag.severity, diag.code);
        if !self.color {
            return text;
        }
        let color = if diag.severity.is_error() { "31" } else { "33" };
        format!("\x1b[1;{color}m{text}\x1b[0m")
    }
}

impl DiagnosticRenderer for TerminalRenderer {
    fn render(&self, diag: &Diagnostic, source_db: &SourceDb) -> String {
        let mut out = String::new();
        if !diag.primary_span.is_dummy() {
            out.push_str(&source_db.loc_string(diag.primary_span));
            out.push_str(": ");
        }
        out.push_str(&format!("{}: {}\n", self.severity_text(diag), diag.message));

        for label in &diag.labels {
            let kind = match label.style {
                LabelStyle::Primary => "here",
                LabelStyle::Secondary => "see",
            };
            out.push_str(&format!(
                "   --> {kind} {}: {}\n",
                source_db.loc_string(label.span),
                label.message
            ));
        }
        for note in &diag.notes {
            out.push_str(&format!("   = note: {note}\n"));
        }
        for help in &diag.help {
            out.push_str(&format!("   = help: {help}\n"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::DiagnosticCode;
    use crate::label::Label;
    use vela_source::Span;

    #[test]
    fn render_with_location() {
        let mut db = SourceDb::new();
        let f = db.add_file("top.v");
        let span = Span::new(f, 12, 5, 12, 17);
        let diag = Diagnostic::error(DiagnosticCode::error(301), "identifier `foo` is not declared", span)
            .with_label(Label::secondary(Span::line(f, 3), "scope starts here"));
        let out = TerminalRenderer::new(false).render(&diag, &db);
        assert!(out.starts_with("top.v:12.5-12.17: error[E301]: identifier `foo` is not declared\n"));
        assert!(out.contains("--> see top.v:3.0-3.0: scope starts here"));
    }

    #[test]
    fn render_without_location() {
        let db = SourceDb::new();
        let diag = Diagnostic::warning(DiagnosticCode::warning(304), "replacing memory", Span::DUMMY)
            .with_note("see top.v:4")
            .with_help("add (* nomem2reg *) to keep the memory");
        let out = TerminalRenderer::new(false).render(&diag, &db);
        assert!(out.starts_with("warning[W304]: replacing memory"));
        assert!(out.contains("= note: see top.v:4"));
        assert!(out.contains("= help: add (* nomem2reg *)"));
    }

    #[test]
    fn colored_severity() {
        let db = SourceDb::new();
        let diag = Diagnostic::error(DiagnosticCode::error(1), "x", Span::DUMMY);
        let out = TerminalRenderer::new(true).render(&diag, &db);
        assert!(out.contains("\x1b[1;31m"));
    }
}
