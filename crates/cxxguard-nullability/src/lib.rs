//! CxxGuard nullability — pointer-nullability inference and verification.
//!
//! Two cooperating passes over a function's CFG:
//! - a non-flow-sensitive transfer that attaches a static nullability
//!   vector (one entry per pointer position) to every expression, built on
//!   a resugaring type walker;
//! - a flow-sensitive transfer that tracks, per pointer value, the boolean
//!   pair `(is_known, is_null)` inside the environment's flow condition.
//!
//! The diagnosis pass walks the converged states and reports dereferences
//! that cannot be proven safe.

pub mod analysis;
pub mod count;
pub mod diagnosis;
pub mod flow;
pub mod lattice;
pub mod nullability;
pub mod rebuild;
pub mod rules;
pub mod transfer;
pub mod walker;

use cxxguard_ast::ast::ExprId;

pub use analysis::{AnalysisOptions, AnalysisOutput, PointerNullabilityAnalysis};
pub use count::{count_pointers_in_expr, count_pointers_in_type};
pub use diagnosis::diagnose;
pub use lattice::{NullabilityLattice, PointerTypeNullability};
pub use nullability::{nullability_to_string, TypeNullability};
pub use rebuild::{print_with_nullability, rebuild_with_nullability};
pub use walker::{get_nullability_annotations_from_type, SubstTypeParam};

/// Fatal analysis failures. Recoverable conditions (vector-length
/// mismatches, missing child nullability, unhandled template constructs)
/// are logged and degraded to Unspecified instead.
#[derive(Debug, thiserror::Error)]
pub enum NullabilityError {
    #[error("dependent cast outside a dependent context (expr {expr})")]
    DependentCast { expr: ExprId },
    #[error("nullability attribute survived past its modified type: {ty}")]
    BrokenTypeSugar { ty: String },
    #[error("nullability vector has {got} entries, type `{ty}` has {expected} pointer positions")]
    VectorLength {
        ty: String,
        expected: usize,
        got: usize,
    },
}
