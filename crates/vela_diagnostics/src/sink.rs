//! Thread-safe diagnostic accumulator.

use crate::code::DiagnosticCode;
use crate::diagnostic::Diagnostic;
use crate::severity::Severity;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Collects diagnostics from one or more elaboration runs.
///
/// The error count is tracked atomically so [`has_errors`](Self::has_errors)
/// never takes the lock.
pub struct DiagnosticSink {
    diagnostics: Mutex<Vec<Diagnostic>>,
    error_count: AtomicUsize,
}

impl DiagnosticSink {
    /// Creates a new empty diagnostic sink.
    pub fn new() -> Self {
        Self {
            diagnostics: Mutex::new(Vec::new()),
            error_count: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Diagnostic>> {
        self.diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Emits a diagnostic into the sink.
    pub fn emit(&self, diag: Diagnostic) {
        if diag.severity == Severity::Error {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        self.lock().push(diag);
    }

    /// Returns `true` if any error-severity diagnostics have been emitted.
    pub fn has_errors(&self) -> bool {
        self.error_count.load(Ordering::Relaxed) > 0
    }

    /// Returns the number of error-severity diagnostics emitted so far.
    pub fn error_count(&self) -> usize {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Number of warnings currently held.
    pub fn warning_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    /// True if a diagnostic with `code` has been emitted and not yet taken.
    pub fn has_code(&self, code: DiagnosticCode) -> bool {
        self.lock().iter().any(|d| d.code == code)
    }

    /// Takes all accumulated diagnostics, leaving the sink empty.
    pub fn take_all(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.lock())
    }

    /// Returns a snapshot of all accumulated diagnostics without draining.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.lock().clone()
    }
}

impl Default for DiagnosticSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_source::Span;

    fn make_error() -> Diagnostic {
        Diagnostic::error(DiagnosticCode::error(301), "unresolved", Span::DUMMY)
    }

    fn make_warning() -> Diagnostic {
        Diagnostic::warning(DiagnosticCode::warning(301), "latch", Span::DUMMY)
    }

    #[test]
    fn counts_by_severity() {
        let sink = DiagnosticSink::new();
        assert!(!sink.has_errors());
        sink.emit(make_warning());
        assert!(!sink.has_errors());
        assert_eq!(sink.warning_count(), 1);
        sink.emit(make_error());
        assert_eq!(sink.error_count(), 1);
        assert!(sink.has_code(DiagnosticCode::error(301)));
        assert!(!sink.has_code(DiagnosticCode::error(302)));
    }

    #[test]
    fn take_all_drains() {
        let sink = DiagnosticSink::new();
        sink.emit(make_error());
        sink.emit(make_warning());
        assert_eq!(sink.take_all().len(), 2);
        assert!(sink.take_all().is_empty());
        assert_eq!(sink.error_count(), 1);
    }

    #[test]
    fn thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let sink = Arc::new(DiagnosticSink::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sink = Arc::clone(&sink);
                thread::spawn(move || {
                    for _ in 0..50 {
                        sink.emit(make_error());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(sink.error_count(), 200);
        assert_eq!(sink.diagnostics().len(), 200);
    }
}
