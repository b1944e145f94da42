//! The nullability vector attached to expressions.

use cxxguard_ast::ast::{AstContext, ExprId, NullabilityKind};

use crate::count::count_pointers_in_expr;

/// One entry per pointer position in the associated type, outer to inner.
pub type TypeNullability = Vec<NullabilityKind>;

/// Pretty form, e.g. `[_Nonnull, _Nullable]`.
pub fn nullability_to_string(nullability: &[NullabilityKind]) -> String {
    let mut result = String::from("[");
    for (i, kind) in nullability.iter().enumerate() {
        if i > 0 {
            result.push_str(", ");
        }
        result.push_str(kind.spelling());
    }
    result.push(']');
    result
}

/// An all-Unspecified vector of the right length for `expr`.
pub fn unspecified_nullability(ctx: &AstContext, expr: ExprId) -> TypeNullability {
    vec![NullabilityKind::Unspecified; count_pointers_in_expr(ctx, expr)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use cxxguard_ast::ast::{BuiltinKind, ExprKind};

    #[test]
    fn test_nullability_to_string() {
        assert_eq!(nullability_to_string(&[]), "[]");
        insta::assert_snapshot!(
            nullability_to_string(&[
                NullabilityKind::NonNull,
                NullabilityKind::Nullable,
                NullabilityKind::Unspecified
            ]),
            @"[_Nonnull, _Nullable, _Null_unspecified]"
        );
    }

    #[test]
    fn test_unspecified_nullability_length() {
        let mut ctx = AstContext::new();
        let int = ctx.builtin(BuiltinKind::Int);
        let pp = ctx.pointer(int);
        let pp2 = ctx.pointer(pp);
        let v = ctx.var("p", pp2);
        let e = ctx.add_expr(
            pp2,
            ExprKind::DeclRef {
                decl: v,
                template_args: vec![],
            },
        );
        assert_eq!(
            unspecified_nullability(&ctx, e),
            vec![NullabilityKind::Unspecified; 2]
        );
    }
}
