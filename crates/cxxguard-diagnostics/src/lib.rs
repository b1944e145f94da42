//! CxxGuard diagnostics - shared diagnostic model.
//!
//! All analysis passes produce `Diagnostic` values; formatters and test
//! drivers consume them.

pub mod diagnostic;

pub use diagnostic::{
    AnalysisSummary, Diagnostic, DiagnosticBuilder, DiagnosticSource, Location, Severity,
};
