//! The analysis lattice: per-expression nullability vectors and
//! per-declaration symbolic nullability variables.

use std::collections::HashMap;

use cxxguard_ast::ast::{DeclId, ExprId};
use cxxguard_dataflow::formula::{BoolEngine, BoolId};

use crate::nullability::TypeNullability;

/// Two boolean handles standing for a declaration's unknown top-level
/// nullability. `nonnull ∧ nullable` is never asserted; consumers only
/// combine them as `nonnull ∨ nullable` and `nonnull ⇒ ¬is_null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerTypeNullability {
    pub nonnull: BoolId,
    pub nullable: BoolId,
}

/// Grown monotonically during one function's analysis, then discarded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NullabilityLattice {
    expr_nullability: HashMap<ExprId, TypeNullability>,
    decl_nullability: HashMap<DeclId, PointerTypeNullability>,
}

impl NullabilityLattice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expr_nullability(&self, e: ExprId) -> Option<&TypeNullability> {
        self.expr_nullability.get(&e)
    }

    /// Insert-if-absent: the first computed vector for an expression
    /// sticks, so re-running the transfer is idempotent.
    pub fn insert_expr_nullability_if_absent(
        &mut self,
        e: ExprId,
        compute: impl FnOnce() -> TypeNullability,
    ) -> &TypeNullability {
        self.expr_nullability.entry(e).or_insert_with(compute)
    }

    pub fn decl_nullability(&self, d: DeclId) -> Option<PointerTypeNullability> {
        self.decl_nullability.get(&d).copied()
    }

    /// Allocates the declaration's symbolic nullability pair on first use;
    /// later calls return the same pair.
    pub fn assign_decl_nullability(
        &mut self,
        d: DeclId,
        bools: &mut BoolEngine,
    ) -> PointerTypeNullability {
        *self
            .decl_nullability
            .entry(d)
            .or_insert_with(|| PointerTypeNullability {
                nonnull: bools.mk_atomic(),
                nullable: bools.mk_atomic(),
            })
    }

    pub fn iter_expr_nullability(&self) -> impl Iterator<Item = (&ExprId, &TypeNullability)> {
        self.expr_nullability.iter()
    }
}
