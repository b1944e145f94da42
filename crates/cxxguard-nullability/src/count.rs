//! Pointer-position counting.
//!
//! Counting is the annotation walk with the annotations ignored, so any
//! two canonically equivalent types produce the same count.

use cxxguard_ast::ast::{AstContext, DeclId, ExprId, ExprKind, TemplateArg, TypeId};

use crate::walker::get_nullability_annotations_from_type;

/// Number of pointer positions the structural walk reaches in `ty`.
pub fn count_pointers_in_type(ctx: &AstContext, ty: TypeId) -> usize {
    match get_nullability_annotations_from_type(ctx, ty, None) {
        Ok(v) => v.len(),
        Err(err) => {
            tracing::error!(%err, ty = %ctx.print_type(ty), "pointer count over malformed sugar");
            0
        }
    }
}

/// Pointer positions contributed by an enclosing declaration context.
/// Only enclosing record types are considered.
pub fn count_pointers_in_decl_context(ctx: &AstContext, dc: Option<DeclId>) -> usize {
    if let Some(d) = dc {
        if let Some(record_ty) = ctx.record_type_of(d) {
            return count_pointers_in_type(ctx, record_ty);
        }
    }
    0
}

/// Pointer positions in a template argument; packs recurse elementwise.
pub fn count_pointers_in_template_arg(ctx: &AstContext, arg: &TemplateArg) -> usize {
    match arg {
        TemplateArg::Type(t) => count_pointers_in_type(ctx, *t),
        TemplateArg::Pack(elems) => elems
            .iter()
            .map(|e| count_pointers_in_template_arg(ctx, e))
            .sum(),
        TemplateArg::Value(_) => 0,
    }
}

/// The type an expression contributes pointer positions through. A member
/// access that is part of a member call has the `BoundMember` placeholder
/// type; the member declaration's type is used instead.
pub fn expr_type(ctx: &AstContext, e: ExprId) -> TypeId {
    let expr = ctx.expr(e);
    if ctx.is_bound_member(expr.ty) {
        if let ExprKind::Member { member, .. } = &expr.kind {
            if let Some(ty) = ctx.decl_type(*member) {
                return ty;
            }
        }
    }
    expr.ty
}

pub fn count_pointers_in_expr(ctx: &AstContext, e: ExprId) -> usize {
    count_pointers_in_type(ctx, expr_type(ctx, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cxxguard_ast::ast::{BuiltinKind, NullabilityKind};

    #[test]
    fn test_count_nested_pointers() {
        let mut ctx = AstContext::new();
        let int = ctx.builtin(BuiltinKind::Int);
        assert_eq!(count_pointers_in_type(&ctx, int), 0);
        let p = ctx.pointer(int);
        let pp = ctx.pointer(p);
        assert_eq!(count_pointers_in_type(&ctx, p), 1);
        assert_eq!(count_pointers_in_type(&ctx, pp), 2);
    }

    #[test]
    fn test_count_through_sugar_matches_canonical() {
        let mut ctx = AstContext::new();
        let int = ctx.builtin(BuiltinKind::Int);
        let p = ctx.pointer(int);
        let attributed = ctx.attributed(NullabilityKind::NonNull, p);
        let alias = ctx.alias("IntPtr", attributed);
        let sugared = ctx.pointer(alias);
        assert_eq!(
            count_pointers_in_type(&ctx, sugared),
            count_pointers_in_type(&ctx, ctx.canonical(sugared))
        );
    }

    #[test]
    fn test_count_function_proto() {
        let mut ctx = AstContext::new();
        let int = ctx.builtin(BuiltinKind::Int);
        let p = ctx.pointer(int);
        // int * (int *, int) — return first, then params in order.
        let f = ctx.function_proto(p, vec![p, int]);
        assert_eq!(count_pointers_in_type(&ctx, f), 2);
    }

    #[test]
    fn test_count_record_specialization_args() {
        let mut ctx = AstContext::new();
        let int = ctx.builtin(BuiltinKind::Int);
        let p = ctx.pointer(int);
        let pair = ctx.class_template("pair");
        let spec = ctx.record_specialization(
            "pair",
            None,
            pair,
            vec![TemplateArg::Type(p), TemplateArg::Type(p)],
            false,
        );
        let ty = ctx.record_type_of(spec).unwrap();
        assert_eq!(count_pointers_in_type(&ctx, ty), 2);
    }

    #[test]
    fn test_count_template_arg_pack() {
        let mut ctx = AstContext::new();
        let int = ctx.builtin(BuiltinKind::Int);
        let p = ctx.pointer(int);
        let pack = TemplateArg::Pack(vec![
            TemplateArg::Type(p),
            TemplateArg::Type(int),
            TemplateArg::Type(p),
        ]);
        assert_eq!(count_pointers_in_template_arg(&ctx, &pack), 2);
        assert_eq!(
            count_pointers_in_template_arg(&ctx, &TemplateArg::Value("3".into())),
            0
        );
    }

    #[test]
    fn test_bound_member_uses_member_decl_type() {
        let mut ctx = AstContext::new();
        let int = ctx.builtin(BuiltinKind::Int);
        let p = ctx.pointer(int);
        let s = ctx.record("S", None);
        let s_ty = ctx.record_type_of(s).unwrap();
        let method_ty = ctx.function_proto(p, vec![]);
        let method = ctx.function("get", method_ty, None, Some(s));
        let base = ctx.add_expr(
            s_ty,
            ExprKind::DeclRef {
                decl: s,
                template_args: vec![],
            },
        );
        let bound = ctx.builtin(BuiltinKind::BoundMember);
        let member = ctx.add_expr(
            bound,
            ExprKind::Member {
                base,
                member: method,
                is_arrow: false,
            },
        );
        assert_eq!(expr_type(&ctx, member), method_ty);
        assert_eq!(count_pointers_in_expr(&ctx, member), 1);
    }
}
