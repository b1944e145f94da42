//! Flow-sensitive transfer: initializes and propagates the boolean pair
//! `(is_known, is_null)` on pointer values.
//!
//! Interpretation, always relative to the flow condition:
//! - `is_known ∧ is_null` — definitely null
//! - `is_known ∧ ¬is_null` — definitely non-null
//! - `¬is_known` — nullability not tracked at this point

use cxxguard_ast::ast::{AstContext, BinaryOp, CastKind, ExprId, ExprKind, NullabilityKind, UnaryOp};
use cxxguard_dataflow::env::{Arena, Environment, PointerNullState, ValueId};
use cxxguard_dataflow::formula::BoolId;

use crate::lattice::{NullabilityLattice, PointerTypeNullability};
use crate::transfer::TransferState;
use crate::NullabilityError;

/// Attaches a null state to a pointer value unless it already has one.
/// Omitted booleans are fresh atoms.
pub fn init_pointer_null_state(
    arena: &mut Arena,
    v: ValueId,
    is_known: Option<BoolId>,
    is_null: Option<BoolId>,
) {
    if arena.pointer_null_state(v).is_some() {
        return;
    }
    let is_known = is_known.unwrap_or_else(|| arena.bools.mk_atomic());
    let is_null = is_null.unwrap_or_else(|| arena.bools.mk_atomic());
    arena.set_pointer_null_state(v, PointerNullState { is_known, is_null });
}

pub fn init_null_pointer(arena: &mut Arena, v: ValueId) {
    let t = arena.bools.mk_true();
    init_pointer_null_state(arena, v, Some(t), Some(t));
}

pub fn init_not_null_pointer(arena: &mut Arena, v: ValueId) {
    let t = arena.bools.mk_true();
    let f = arena.bools.mk_false();
    init_pointer_null_state(arena, v, Some(t), Some(f));
}

pub fn init_nullable_pointer(arena: &mut Arena, v: ValueId) {
    let t = arena.bools.mk_true();
    init_pointer_null_state(arena, v, Some(t), None);
}

pub fn init_unknown_pointer(arena: &mut Arena, v: ValueId) {
    let f = arena.bools.mk_false();
    init_pointer_null_state(arena, v, Some(f), None);
}

/// The existing pointer value of an expression, through its storage
/// location for glvalues. Never creates one.
pub fn pointer_value_of_expr(ctx: &AstContext, e: ExprId, env: &Environment) -> Option<ValueId> {
    let expr = ctx.expr(e);
    if expr.is_glvalue {
        env.value_at(env.loc_of_expr(e)?)
    } else {
        env.value_of_expr(e)
    }
}

/// Top-level nullability of an expression: the sugar written on its type,
/// falling back to the first entry of the lattice's vector (the common
/// case for template instantiations, whose types lost their sugar).
pub fn get_pointer_nullability(
    ctx: &AstContext,
    e: ExprId,
    lattice: &NullabilityLattice,
) -> NullabilityKind {
    let mut kind = ctx.sugared_nullability(ctx.expr(e).ty);
    if kind.unwrap_or(NullabilityKind::Unspecified) == NullabilityKind::Unspecified {
        if let Some(vector) = lattice.expr_nullability(e) {
            if let Some(&first) = vector.first() {
                kind = Some(first);
            }
        }
    }
    kind.unwrap_or(NullabilityKind::Unspecified)
}

fn init_pointer_from_annotations(
    ctx: &AstContext,
    e: ExprId,
    v: ValueId,
    state: &mut TransferState<'_>,
) {
    match get_pointer_nullability(ctx, e, state.lattice) {
        NullabilityKind::NonNull => init_not_null_pointer(state.arena, v),
        NullabilityKind::Nullable => init_nullable_pointer(state.arena, v),
        NullabilityKind::Unspecified => init_unknown_pointer(state.arena, v),
    }
}

/// A declaration-level override, looked up through decl refs and member
/// accesses.
fn overridden_nullability(
    ctx: &AstContext,
    e: ExprId,
    lattice: &NullabilityLattice,
) -> Option<PointerTypeNullability> {
    match &ctx.expr(e).kind {
        ExprKind::DeclRef { decl, .. } => lattice.decl_nullability(*decl),
        ExprKind::Member { member, .. } => lattice.decl_nullability(*member),
        _ => None,
    }
}

fn transfer_pointer_expr(ctx: &AstContext, e: ExprId, state: &mut TransferState<'_>) {
    let Some(v) = pointer_value_of_expr(ctx, e, state.env) else {
        return;
    };
    if let Some(overridden) = overridden_nullability(ctx, e, state.lattice) {
        // is_known = nonnull ∨ nullable
        let known = state
            .arena
            .bools
            .mk_or(overridden.nonnull, overridden.nullable);
        init_pointer_null_state(state.arena, v, Some(known), None);
        // nonnull ⇒ ¬is_null
        if let Some(null_state) = state.arena.pointer_null_state(v) {
            let not_null = state.arena.bools.mk_not(null_state.is_null);
            let implication = state.arena.bools.mk_implies(overridden.nonnull, not_null);
            state
                .env
                .add_to_flow_condition(&mut state.arena.bools, implication);
        }
    } else {
        init_pointer_from_annotations(ctx, e, v, state);
    }
}

fn transfer_call_expr(ctx: &AstContext, e: ExprId, state: &mut TransferState<'_>) {
    // Value and storage-location plumbing is the driver's job; by the time
    // we run, a pointer-typed call has its value bound.
    if ctx.is_pointer(ctx.expr(e).ty) {
        if let Some(v) = pointer_value_of_expr(ctx, e, state.env) {
            init_pointer_from_annotations(ctx, e, v, state);
        }
    }
}

fn transfer_null_check_comparison(
    ctx: &AstContext,
    e: ExprId,
    op: BinaryOp,
    lhs: ExprId,
    rhs: ExprId,
    state: &mut TransferState<'_>,
) {
    // The boolean standing for the comparison; bound by the driver.
    let Some(comparison) = state
        .env
        .value_of_expr(e)
        .and_then(|v| state.arena.bool_of_value(v))
    else {
        return;
    };
    let (eq, ne) = {
        let bools = &mut state.arena.bools;
        let not = bools.mk_not(comparison);
        match op {
            BinaryOp::Eq => (comparison, not),
            _ => (not, comparison),
        }
    };

    let lhs_value = pointer_value_of_expr(ctx, lhs, state.env);
    let rhs_value = pointer_value_of_expr(ctx, rhs, state.env);
    let (Some(lhs_value), Some(rhs_value)) = (lhs_value, rhs_value) else {
        return;
    };
    let (Some(lhs_state), Some(rhs_state)) = (
        state.arena.pointer_null_state(lhs_value),
        state.arena.pointer_null_state(rhs_value),
    ) else {
        return;
    };

    let bools = &mut state.arena.bools;
    let lhs_null = lhs_state.is_null;
    let rhs_null = rhs_state.is_null;
    let lhs_not_null = bools.mk_not(lhs_null);
    let rhs_not_null = bools.mk_not(rhs_null);

    // nullptr == nullptr
    let both_null = bools.mk_and(lhs_null, rhs_null);
    let c1 = bools.mk_implies(both_null, eq);
    // nullptr != notnull, notnull != nullptr. Equality of two known
    // non-null pointers stays unconstrained; identity is not tracked.
    let left_null = bools.mk_and(lhs_null, rhs_not_null);
    let c2 = bools.mk_implies(left_null, ne);
    let right_null = bools.mk_and(lhs_not_null, rhs_null);
    let c3 = bools.mk_implies(right_null, ne);

    state.env.add_to_flow_condition(bools, c1);
    state.env.add_to_flow_condition(bools, c2);
    state.env.add_to_flow_condition(bools, c3);
}

fn transfer_pointer_to_bool(ctx: &AstContext, e: ExprId, sub: ExprId, state: &mut TransferState<'_>) {
    let Some(pointer) = pointer_value_of_expr(ctx, sub, state.env) else {
        return;
    };
    let Some(null_state) = state.arena.pointer_null_state(pointer) else {
        return;
    };
    let truthy = state.arena.bools.mk_not(null_state.is_null);
    match state.env.value_of_expr(e) {
        Some(v) => state.arena.update_bool_value(v, truthy),
        None => {
            let v = state.arena.create_bool_value(truthy);
            state.env.set_expr_value(e, v);
        }
    }
}

/// Runs the flow-sensitive rule for one statement expression.
pub fn transfer_flow_sensitive(
    ctx: &AstContext,
    e: ExprId,
    state: &mut TransferState<'_>,
) -> Result<(), NullabilityError> {
    match ctx.expr(e).kind.clone() {
        // A null pointer literal: `nullptr`, or integer zero arriving at
        // pointer type through a null-to-pointer cast.
        ExprKind::NullLiteral
        | ExprKind::Cast {
            cast: CastKind::NullToPointer,
            ..
        } => {
            if let Some(v) = pointer_value_of_expr(ctx, e, state.env) {
                init_null_pointer(state.arena, v);
            }
        }
        ExprKind::Unary {
            op: UnaryOp::AddrOf,
            ..
        } => {
            if let Some(v) = pointer_value_of_expr(ctx, e, state.env) {
                init_not_null_pointer(state.arena, v);
            }
        }
        ExprKind::Call { .. } | ExprKind::MemberCall { .. } => {
            transfer_call_expr(ctx, e, state);
        }
        ExprKind::Cast {
            cast: CastKind::PointerToBoolean,
            sub,
            ..
        } => {
            transfer_pointer_to_bool(ctx, e, sub, state);
        }
        ExprKind::Binary { op, lhs, rhs }
            if matches!(op, BinaryOp::Eq | BinaryOp::Ne)
                && ctx.is_pointer(ctx.expr(lhs).ty)
                && ctx.is_pointer(ctx.expr(rhs).ty) =>
        {
            transfer_null_check_comparison(ctx, e, op, lhs, rhs, state);
        }
        _ if ctx.is_pointer(ctx.expr(e).ty) => {
            transfer_pointer_expr(ctx, e, state);
        }
        _ => {}
    }
    Ok(())
}

/// True when a dereference of `v` cannot be proven safe: the flow
/// condition fails to imply `¬(is_known ∧ is_null)`.
pub fn is_nullable(arena: &mut Arena, env: &Environment, v: ValueId) -> bool {
    let Some(null_state) = arena.pointer_null_state(v) else {
        return false;
    };
    let known_null = arena.bools.mk_and(null_state.is_known, null_state.is_null);
    let not_known_null = arena.bools.mk_not(known_null);
    !env.flow_condition_implies(&arena.bools, not_known_null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cxxguard_ast::ast::BuiltinKind;

    #[test]
    fn test_init_is_idempotent() {
        let mut arena = Arena::new();
        let v = arena.create_pointer_value();
        init_null_pointer(&mut arena, v);
        let first = arena.pointer_null_state(v).unwrap();
        init_not_null_pointer(&mut arena, v);
        assert_eq!(arena.pointer_null_state(v).unwrap(), first);
    }

    #[test]
    fn test_null_state_interpretations() {
        let mut arena = Arena::new();
        let env = Environment::new(&mut arena.bools);

        let null = arena.create_pointer_value();
        init_null_pointer(&mut arena, null);
        assert!(is_nullable(&mut arena, &env, null));

        let not_null = arena.create_pointer_value();
        init_not_null_pointer(&mut arena, not_null);
        assert!(!is_nullable(&mut arena, &env, not_null));

        let nullable = arena.create_pointer_value();
        init_nullable_pointer(&mut arena, nullable);
        assert!(is_nullable(&mut arena, &env, nullable));

        // Untracked pointers are not flagged.
        let unknown = arena.create_pointer_value();
        init_unknown_pointer(&mut arena, unknown);
        assert!(!is_nullable(&mut arena, &env, unknown));
    }

    #[test]
    fn test_flow_condition_refines_nullable() {
        let mut arena = Arena::new();
        let mut env = Environment::new(&mut arena.bools);
        let v = arena.create_pointer_value();
        init_nullable_pointer(&mut arena, v);
        let null_state = arena.pointer_null_state(v).unwrap();
        let not_null = arena.bools.mk_not(null_state.is_null);
        env.add_to_flow_condition(&mut arena.bools, not_null);
        assert!(!is_nullable(&mut arena, &env, v));
    }

    #[test]
    fn test_get_pointer_nullability_prefers_sugar() {
        let mut ctx = AstContext::new();
        let int = ctx.builtin(BuiltinKind::Int);
        let p = ctx.pointer(int);
        let nonnull = ctx.attributed(NullabilityKind::NonNull, p);
        let d = ctx.var("p", nonnull);
        let e = ctx.add_expr(
            nonnull,
            ExprKind::DeclRef {
                decl: d,
                template_args: vec![],
            },
        );
        let mut lattice = NullabilityLattice::new();
        lattice.insert_expr_nullability_if_absent(e, || vec![NullabilityKind::Nullable]);
        assert_eq!(
            get_pointer_nullability(&ctx, e, &lattice),
            NullabilityKind::NonNull
        );
    }

    #[test]
    fn test_get_pointer_nullability_falls_back_to_lattice() {
        let mut ctx = AstContext::new();
        let int = ctx.builtin(BuiltinKind::Int);
        let p = ctx.pointer(int);
        let d = ctx.var("p", p);
        let e = ctx.add_expr(
            p,
            ExprKind::DeclRef {
                decl: d,
                template_args: vec![],
            },
        );
        let mut lattice = NullabilityLattice::new();
        assert_eq!(
            get_pointer_nullability(&ctx, e, &lattice),
            NullabilityKind::Unspecified
        );
        lattice.insert_expr_nullability_if_absent(e, || vec![NullabilityKind::Nullable]);
        assert_eq!(
            get_pointer_nullability(&ctx, e, &lattice),
            NullabilityKind::Nullable
        );
    }
}
