//! Diagnostic codes and the fatal error type of elaboration.
//!
//! Error codes `E300`--`E316` abort the elaboration of the current design.
//! Warning codes `W300`--`W305` report legal constructs that are probably not
//! what the designer meant.

use thiserror::Error;
use vela_common::InternalError;
use vela_diagnostics::{Diagnostic, DiagnosticCode, Label};
use vela_netlist::NetlistError;
use vela_source::Span;

/// Identifier that does not resolve to any declaration.
pub const E300: DiagnosticCode = DiagnosticCode::error(300);

/// Range or dimension that is malformed or not constant.
pub const E301: DiagnosticCode = DiagnosticCode::error(301);

/// Expression required to be constant is not.
pub const E302: DiagnosticCode = DiagnosticCode::error(302);

/// Loop whose bound cannot be evaluated, or that runs too long.
pub const E303: DiagnosticCode = DiagnosticCode::error(303);

/// Constant function recursion deeper than the configured limit.
pub const E304: DiagnosticCode = DiagnosticCode::error(304);

/// Constant function whose evaluation depends on itself.
pub const E305: DiagnosticCode = DiagnosticCode::error(305);

/// Name declared twice in the same scope.
pub const E306: DiagnosticCode = DiagnosticCode::error(306);

/// Instantiation of a module that does not exist.
pub const E307: DiagnosticCode = DiagnosticCode::error(307);

/// Parameter override naming a parameter the module does not declare.
pub const E308: DiagnosticCode = DiagnosticCode::error(308);

/// Module defined twice.
pub const E309: DiagnosticCode = DiagnosticCode::error(309);

/// Module that instantiates itself.
pub const E310: DiagnosticCode = DiagnosticCode::error(310);

/// Construct the elaborator does not support.
pub const E311: DiagnosticCode = DiagnosticCode::error(311);

/// Invalid memory declaration or access.
pub const E312: DiagnosticCode = DiagnosticCode::error(312);

/// Internal cell type instantiated without `icells`.
pub const E313: DiagnosticCode = DiagnosticCode::error(313);

/// Interface or modport that cannot be found.
pub const E314: DiagnosticCode = DiagnosticCode::error(314);

/// Requested top module does not exist.
pub const E315: DiagnosticCode = DiagnosticCode::error(315);

/// Wrong number or kind of arguments to a function, task or primitive.
pub const E316: DiagnosticCode = DiagnosticCode::error(316);

/// Combinational process that does not assign a signal on every path.
pub const W300: DiagnosticCode = DiagnosticCode::warning(300);

/// Memory replaced by a list of registers without being asked to.
pub const W301: DiagnosticCode = DiagnosticCode::warning(301);

/// Module redefinition ignored under `nooverwrite`.
pub const W302: DiagnosticCode = DiagnosticCode::warning(302);

/// Existing module replaced under `overwrite`.
pub const W303: DiagnosticCode = DiagnosticCode::warning(303);

/// Identifier declared implicitly under `autowire`.
pub const W304: DiagnosticCode = DiagnosticCode::warning(304);

/// Unknown system task ignored.
pub const W305: DiagnosticCode = DiagnosticCode::warning(305);

/// A failure that stops the elaboration of the current design.
#[derive(Debug, Error)]
pub enum ElabError {
    /// A problem in the design, reported with its location.
    #[error("{}", .0.message)]
    Fatal(Box<Diagnostic>),
    /// A broken invariant inside the elaborator.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl ElabError {
    /// The diagnostic of a fatal error.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            ElabError::Fatal(diag) => Some(diag),
            ElabError::Internal(_) => None,
        }
    }
}

impl From<Diagnostic> for ElabError {
    fn from(diag: Diagnostic) -> Self {
        ElabError::Fatal(Box::new(diag))
    }
}

/// Result of an elaboration step.
pub type ElabResult<T> = Result<T, ElabError>;

/// A fatal error with `code` at `span`.
pub fn fatal(code: DiagnosticCode, message: impl Into<String>, span: Span) -> ElabError {
    Diagnostic::error(code, message, span).into()
}

/// Converts a netlist insertion failure into a redefinition error.
pub fn from_netlist(err: NetlistError, span: Span) -> ElabError {
    fatal(E306, err.to_string(), span)
}

/// Unresolved identifier.
pub fn error_unresolved(name: &str, span: Span) -> ElabError {
    Diagnostic::error(E300, format!("identifier `{name}` is implicitly declared"), span)
        .with_help("declare the signal, or enable `autowire`")
        .into()
}

/// A range bound that did not fold to a constant.
pub fn error_range_not_const(what: &str, span: Span) -> ElabError {
    fatal(E301, format!("{what} range is not constant"), span)
}

/// An expression that had to fold to a constant.
pub fn error_not_const(what: &str, span: Span) -> ElabError {
    fatal(E302, format!("non-constant expression in {what}"), span)
}

/// A name declared twice.
pub fn error_redefinition(name: &str, span: Span, previous: Span) -> ElabError {
    Diagnostic::error(E306, format!("re-definition of `{name}`"), span)
        .with_label(Label::secondary(previous, "previously declared here"))
        .into()
}

/// A construct outside the supported subset.
pub fn error_unsupported(what: &str, span: Span) -> ElabError {
    fatal(E311, format!("unsupported construct: {what}"), span)
}

/// Latch inference on `signal`.
pub fn warning_latch(signal: &str, span: Span) -> Diagnostic {
    Diagnostic::warning(W300, format!("latch inferred for signal `{signal}`"), span)
        .with_help("assign the signal on every path, or enable `nolatches`")
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_diagnostics::Severity;

    #[test]
    fn codes_display_with_prefix() {
        assert_eq!(E300.to_string(), "E300");
        assert_eq!(W301.to_string(), "W301");
    }

    #[test]
    fn fatal_carries_diagnostic() {
        let err = error_unresolved("foo", Span::DUMMY);
        let diag = err.diagnostic().unwrap();
        assert_eq!(diag.code, E300);
        assert_eq!(diag.severity, Severity::Error);
        assert!(err.to_string().contains("`foo`"));
    }

    #[test]
    fn internal_errors_have_no_diagnostic() {
        let err: ElabError = InternalError::new("dangling").into();
        assert!(err.diagnostic().is_none());
    }

    #[test]
    fn latch_warning_is_warning() {
        let diag = warning_latch("q", Span::DUMMY);
        assert_eq!(diag.severity, Severity::Warning);
        assert_eq!(diag.code, W300);
    }
}
