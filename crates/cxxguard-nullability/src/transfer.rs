//! Non-flow-sensitive transfer: attaches a static nullability vector to
//! every expression the CFG visits, bottom-up.
//!
//! Child vectors are always available because the CFG visits
//! sub-expressions before their parents. Entries are insert-if-absent, so
//! earlier results stick and re-running the transfer is idempotent.

use cxxguard_ast::ast::{
    AstContext, CastKind, DeclKind, ExprId, ExprKind, NullabilityKind, TemplateArg, TypeId,
    TypeKind, UnaryOp,
};
use cxxguard_dataflow::env::{Arena, Environment};

use crate::count::{count_pointers_in_decl_context, count_pointers_in_expr,
    count_pointers_in_template_arg, expr_type};
use crate::lattice::NullabilityLattice;
use crate::nullability::{unspecified_nullability, TypeNullability};
use crate::walker::{get_nullability_annotations_from_type, SubstTypeParam};
use crate::NullabilityError;

/// Mutable state threaded through both transfer passes.
pub struct TransferState<'a> {
    pub lattice: &'a mut NullabilityLattice,
    pub env: &'a mut Environment,
    pub arena: &'a mut Arena,
}

fn prepend(head: NullabilityKind, tail: TypeNullability) -> TypeNullability {
    let mut result = vec![head];
    result.extend(tail);
    result
}

/// Inserts the computed vector for `e`, verifying the length invariant.
/// On mismatch the vector is unusable and is replaced with Unspecified.
fn compute_nullability(
    ctx: &AstContext,
    e: ExprId,
    state: &mut TransferState<'_>,
    compute: impl FnOnce(&mut TransferState<'_>) -> Result<TypeNullability, NullabilityError>,
) -> Result<(), NullabilityError> {
    if state.lattice.expr_nullability(e).is_some() {
        return Ok(());
    }
    let mut nullability = compute(state)?;
    let expected = count_pointers_in_expr(ctx, e);
    if nullability.len() != expected {
        // TODO: promote to a hard check once every AST shape is covered.
        tracing::warn!(
            expr = e,
            got = nullability.len(),
            expected,
            ty = %ctx.print_type(expr_type(ctx, e)),
            "nullability vector has wrong number of entries"
        );
        nullability = vec![NullabilityKind::Unspecified; expected];
    }
    state.lattice.insert_expr_nullability_if_absent(e, || nullability);
    Ok(())
}

/// The computed nullability of a subexpression. Children are visited
/// first, so a miss means an unhandled shape; assume Unspecified.
fn child_nullability(
    ctx: &AstContext,
    e: ExprId,
    state: &mut TransferState<'_>,
) -> TypeNullability {
    if let Some(v) = state.lattice.expr_nullability(e) {
        return v.clone();
    }
    tracing::warn!(expr = e, "missing child nullability; assuming unspecified");
    let fallback = unspecified_nullability(ctx, e);
    state
        .lattice
        .insert_expr_nullability_if_absent(e, || fallback)
        .clone()
}

/// Nullability of `ty` where substituted parameters are resolved against
/// the class-template specialization of `base_ty`, slicing the base
/// expression's nullability vector.
fn substitute_in_class_template(
    ctx: &AstContext,
    ty: TypeId,
    base_nullability: &[NullabilityKind],
    base_ty: TypeId,
) -> Result<TypeNullability, NullabilityError> {
    let mut hook = |subst: &SubstTypeParam| -> Option<TypeNullability> {
        let specialization = match ctx.type_kind(ctx.canonical(base_ty)) {
            TypeKind::Record { decl } => *decl,
            _ => return None,
        };
        // Nested templates (associated decl != base record) are resolved
        // through the walker's own context chain instead.
        if specialization != subst.associated_decl {
            return None;
        }
        let info = ctx.record_specialization_info(specialization)?;
        // Partial specializations and packs: unhandled, fall through.
        if info.from_partial || subst.pack_index.is_some() {
            return None;
        }
        let arg = info.args.get(subst.index as usize)?;
        let mut before = count_pointers_in_decl_context(ctx, ctx.decl_parent(specialization));
        for preceding in &info.args[..subst.index as usize] {
            before += count_pointers_in_template_arg(ctx, preceding);
        }
        let slice = count_pointers_in_template_arg(ctx, arg);
        base_nullability
            .get(before..before + slice)
            .map(|s| s.to_vec())
    };
    get_nullability_annotations_from_type(ctx, ty, Some(&mut hook))
}

/// Nullability of `ty` where substituted parameters are resolved against
/// the template arguments written on the callee of `call`.
fn substitute_in_function_template(
    ctx: &AstContext,
    ty: TypeId,
    callee: ExprId,
) -> Result<TypeNullability, NullabilityError> {
    let mut hook = |subst: &SubstTypeParam| -> Option<TypeNullability> {
        let stripped = ctx.strip_implicit_casts(callee);
        let ExprKind::DeclRef {
            decl,
            template_args,
        } = &ctx.expr(stripped).kind
        else {
            return None;
        };
        let DeclKind::Function(function) = &ctx.decl(*decl).kind else {
            return None;
        };
        if function.primary_template != Some(subst.associated_decl) {
            return None;
        }
        // TODO: resugar template arguments deduced from the call
        // arguments; only explicitly written arguments are visible here.
        let arg = template_args.get(subst.index as usize)?;
        let TemplateArg::Type(arg_ty) = arg else {
            return None;
        };
        get_nullability_annotations_from_type(ctx, *arg_ty, None).ok()
    };
    get_nullability_annotations_from_type(ctx, ty, Some(&mut hook))
}

fn transfer_cast(
    ctx: &AstContext,
    e: ExprId,
    cast: CastKind,
    sub: ExprId,
    state: &mut TransferState<'_>,
) -> Result<(), NullabilityError> {
    compute_nullability(ctx, e, state, |state| {
        // Casts between ~unrelated types drop nullability in general, but
        // outer pointer layers that survive the cast keep theirs:
        // `(void *)p` preserves the nullability of `p` itself.
        let preserve_top_level_pointers =
            |state: &mut TransferState<'_>, mut v: TypeNullability| -> TypeNullability {
                let arg = child_nullability(ctx, sub, state);
                let mut src = ctx.canonical(ctx.expr(sub).ty);
                let mut dst = ctx.canonical(ctx.expr(e).ty);
                let mut depth = 0;
                loop {
                    let (TypeKind::Pointer { pointee: sp }, TypeKind::Pointer { pointee: dp }) =
                        (ctx.type_kind(src), ctx.type_kind(dst))
                    else {
                        break;
                    };
                    if depth < v.len() && depth < arg.len() {
                        v[depth] = arg[depth];
                    }
                    src = ctx.canonical(*sp);
                    dst = ctx.canonical(*dp);
                    depth += 1;
                }
                v
            };

        match cast {
            // Casts between equivalent types.
            CastKind::LValueToRValue
            | CastKind::NoOp
            | CastKind::AtomicToNonAtomic
            | CastKind::NonAtomicToAtomic
            | CastKind::AddressSpaceConversion => Ok(child_nullability(ctx, sub, state)),

            // Bit-level reinterpretations and hierarchy conversions keep
            // the pointer layers the two types share.
            CastKind::LValueBitCast
            | CastKind::BitCast
            | CastKind::LValueToRValueBitCast
            | CastKind::BaseToDerived
            | CastKind::DerivedToBase
            | CastKind::UncheckedDerivedToBase => {
                Ok(preserve_top_level_pointers(state, unspecified_nullability(ctx, e)))
            }

            CastKind::UserDefinedConversion
            | CastKind::ConstructorConversion
            | CastKind::IntegralToPointer
            | CastKind::BaseToDerivedMemberPointer
            | CastKind::DerivedToBaseMemberPointer
            | CastKind::NullToMemberPointer
            | CastKind::ReinterpretMemberPointer
            | CastKind::ToUnion
            | CastKind::VectorSplat
            | CastKind::MatrixCast => Ok(unspecified_nullability(ctx, e)),

            // A dynamic_cast to pointer is null when the runtime check fails.
            CastKind::Dynamic => {
                let mut v = unspecified_nullability(ctx, e);
                if ctx.is_pointer(ctx.expr(e).ty) {
                    if let Some(first) = v.first_mut() {
                        *first = NullabilityKind::Nullable;
                    }
                }
                Ok(v)
            }

            // This can definitely be null.
            CastKind::NullToPointer => {
                let mut v = get_nullability_annotations_from_type(ctx, ctx.expr(e).ty, None)?;
                // The destination may be nullptr_t itself, which has no
                // pointer position to annotate.
                if !ctx.is_nullptr_type(ctx.expr(e).ty) {
                    if let Some(first) = v.first_mut() {
                        *first = NullabilityKind::Nullable;
                    }
                }
                Ok(v)
            }

            // Decayed objects are never null.
            CastKind::ArrayToPointerDecay | CastKind::FunctionToPointerDecay => Ok(prepend(
                NullabilityKind::NonNull,
                child_nullability(ctx, sub, state),
            )),

            // Despite the name, the result is a function, not a pointer.
            CastKind::BuiltinFnToFnPtr => Ok(child_nullability(ctx, sub, state)),

            // Scalar values carry no nullability.
            CastKind::ToVoid
            | CastKind::PointerToBoolean
            | CastKind::PointerToIntegral
            | CastKind::MemberPointerToBoolean
            | CastKind::IntegralCast
            | CastKind::IntegralToBoolean
            | CastKind::IntegralToFloating
            | CastKind::FloatingToIntegral
            | CastKind::FloatingToBoolean
            | CastKind::BooleanToSignedIntegral
            | CastKind::FloatingCast
            | CastKind::FloatingRealToComplex
            | CastKind::FloatingComplexToReal
            | CastKind::IntegralRealToComplex
            | CastKind::IntegralComplexToReal => Ok(Vec::new()),

            CastKind::Dependent => Err(NullabilityError::DependentCast { expr: e }),
        }
    })
}

/// Runs the non-flow-sensitive rule for one statement expression.
pub fn transfer_non_flow_sensitive(
    ctx: &AstContext,
    e: ExprId,
    state: &mut TransferState<'_>,
) -> Result<(), NullabilityError> {
    match ctx.expr(e).kind.clone() {
        ExprKind::DeclRef { .. } => compute_nullability(ctx, e, state, |_| {
            get_nullability_annotations_from_type(ctx, ctx.expr(e).ty, None)
        }),

        ExprKind::Member { base, .. } => compute_nullability(ctx, e, state, |state| {
            let base_nullability = child_nullability(ctx, base, state);
            // For a bound member, expr_type resolves to the member
            // declaration's type.
            let member_ty = expr_type(ctx, e);
            substitute_in_class_template(ctx, member_ty, &base_nullability, ctx.expr(base).ty)
        }),

        ExprKind::MemberCall { callee, .. } => compute_nullability(ctx, e, state, |state| {
            let callee_nullability = child_nullability(ctx, callee, state);
            let keep = count_pointers_in_expr(ctx, e);
            Ok(callee_nullability.into_iter().take(keep).collect())
        }),

        ExprKind::Call { callee, .. } => compute_nullability(ctx, e, state, |_| {
            substitute_in_function_template(ctx, ctx.expr(e).ty, callee)
        }),

        ExprKind::Cast { cast, sub, .. } => transfer_cast(ctx, e, cast, sub, state),

        ExprKind::MaterializeTemporary { sub } => {
            compute_nullability(ctx, e, state, |state| Ok(child_nullability(ctx, sub, state)))
        }

        ExprKind::Unary { op, sub } => compute_nullability(ctx, e, state, |state| match op {
            UnaryOp::AddrOf => Ok(prepend(
                NullabilityKind::NonNull,
                child_nullability(ctx, sub, state),
            )),
            UnaryOp::Deref => {
                let sub_nullability = child_nullability(ctx, sub, state);
                Ok(sub_nullability.get(1..).map(|s| s.to_vec()).unwrap_or_default())
            }
            UnaryOp::PostInc
            | UnaryOp::PostDec
            | UnaryOp::PreInc
            | UnaryOp::PreDec
            | UnaryOp::Plus
            | UnaryOp::Minus
            | UnaryOp::Not
            | UnaryOp::LNot
            | UnaryOp::Real
            | UnaryOp::Imag
            | UnaryOp::Extension => Ok(child_nullability(ctx, sub, state)),
            UnaryOp::CoAwait => Ok(unspecified_nullability(ctx, e)),
        }),

        ExprKind::New { null_check } => compute_nullability(ctx, e, state, |_| {
            let mut v = get_nullability_annotations_from_type(ctx, ctx.expr(e).ty, None)?;
            if let Some(first) = v.first_mut() {
                *first = if null_check {
                    NullabilityKind::Nullable
                } else {
                    NullabilityKind::NonNull
                };
            }
            Ok(v)
        }),

        ExprKind::ArraySubscript { base, .. } => compute_nullability(ctx, e, state, |state| {
            let base_nullability = child_nullability(ctx, base, state);
            debug_assert!(ctx.is_pointer(ctx.expr(base).ty));
            Ok(base_nullability.get(1..).map(|s| s.to_vec()).unwrap_or_default())
        }),

        ExprKind::This => compute_nullability(ctx, e, state, |_| {
            let mut v = get_nullability_annotations_from_type(ctx, ctx.expr(e).ty, None)?;
            if let Some(first) = v.first_mut() {
                *first = NullabilityKind::NonNull;
            }
            Ok(v)
        }),

        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cxxguard_ast::ast::BuiltinKind;
    use cxxguard_ast::ast::NullabilityKind::{NonNull, Nullable, Unspecified};

    struct Fixture {
        ctx: AstContext,
        lattice: NullabilityLattice,
        env: Environment,
        arena: Arena,
    }

    impl Fixture {
        fn new() -> Self {
            let mut arena = Arena::new();
            let env = Environment::new(&mut arena.bools);
            Self {
                ctx: AstContext::new(),
                lattice: NullabilityLattice::new(),
                env,
                arena,
            }
        }

        fn transfer(&mut self, e: ExprId) -> Result<(), NullabilityError> {
            let mut state = TransferState {
                lattice: &mut self.lattice,
                env: &mut self.env,
                arena: &mut self.arena,
            };
            transfer_non_flow_sensitive(&self.ctx, e, &mut state)
        }

        fn nullability(&self, e: ExprId) -> TypeNullability {
            self.lattice.expr_nullability(e).cloned().unwrap_or_default()
        }
    }

    fn decl_ref(f: &mut Fixture, ty: TypeId) -> ExprId {
        let d = f.ctx.var("v", ty);
        f.ctx.add_expr(
            ty,
            ExprKind::DeclRef {
                decl: d,
                template_args: vec![],
            },
        )
    }

    #[test]
    fn test_decl_ref_walks_type() {
        let mut f = Fixture::new();
        let int = f.ctx.builtin(BuiltinKind::Int);
        let p = f.ctx.pointer(int);
        let nullable = f.ctx.attributed(Nullable, p);
        let e = decl_ref(&mut f, nullable);
        f.transfer(e).unwrap();
        assert_eq!(f.nullability(e), vec![Nullable]);
    }

    #[test]
    fn test_identity_cast_propagates() {
        let mut f = Fixture::new();
        let int = f.ctx.builtin(BuiltinKind::Int);
        let p = f.ctx.pointer(int);
        let nonnull = f.ctx.attributed(NonNull, p);
        let dre = decl_ref(&mut f, nonnull);
        let load = f.ctx.add_expr(
            nonnull,
            ExprKind::Cast {
                cast: CastKind::LValueToRValue,
                sub: dre,
                is_implicit: true,
            },
        );
        f.transfer(dre).unwrap();
        f.transfer(load).unwrap();
        assert_eq!(f.nullability(load), vec![NonNull]);
    }

    #[test]
    fn test_bit_cast_preserves_outer_pointer_layers() {
        let mut f = Fixture::new();
        let int = f.ctx.builtin(BuiltinKind::Int);
        let void = f.ctx.builtin(BuiltinKind::Void);
        let p = f.ctx.pointer(int);
        let nonnull = f.ctx.attributed(NonNull, p);
        let dre = decl_ref(&mut f, nonnull);
        let void_ptr = f.ctx.pointer(void);
        let cast = f.ctx.add_expr(
            void_ptr,
            ExprKind::Cast {
                cast: CastKind::BitCast,
                sub: dre,
                is_implicit: false,
            },
        );
        f.transfer(dre).unwrap();
        f.transfer(cast).unwrap();
        assert_eq!(f.nullability(cast), vec![NonNull]);
    }

    #[test]
    fn test_null_to_pointer_forces_nullable() {
        let mut f = Fixture::new();
        let int = f.ctx.builtin(BuiltinKind::Int);
        let nullptr_t = f.ctx.builtin(BuiltinKind::NullPtr);
        let p = f.ctx.pointer(int);
        let lit = f.ctx.add_expr(nullptr_t, ExprKind::NullLiteral);
        let cast = f.ctx.add_expr(
            p,
            ExprKind::Cast {
                cast: CastKind::NullToPointer,
                sub: lit,
                is_implicit: true,
            },
        );
        f.transfer(lit).unwrap();
        f.transfer(cast).unwrap();
        assert_eq!(f.nullability(cast), vec![Nullable]);
    }

    #[test]
    fn test_null_to_nullptr_type_stays_empty() {
        let mut f = Fixture::new();
        let nullptr_t = f.ctx.builtin(BuiltinKind::NullPtr);
        let lit = f.ctx.add_expr(nullptr_t, ExprKind::NullLiteral);
        let cast = f.ctx.add_expr(
            nullptr_t,
            ExprKind::Cast {
                cast: CastKind::NullToPointer,
                sub: lit,
                is_implicit: true,
            },
        );
        f.transfer(cast).unwrap();
        assert_eq!(f.nullability(cast), vec![]);
    }

    #[test]
    fn test_decay_prepends_nonnull() {
        let mut f = Fixture::new();
        let int = f.ctx.builtin(BuiltinKind::Int);
        let arr = f.ctx.array(int);
        let dre = decl_ref(&mut f, arr);
        let p = f.ctx.pointer(int);
        let decay = f.ctx.add_expr(
            p,
            ExprKind::Cast {
                cast: CastKind::ArrayToPointerDecay,
                sub: dre,
                is_implicit: true,
            },
        );
        f.transfer(dre).unwrap();
        f.transfer(decay).unwrap();
        assert_eq!(f.nullability(decay), vec![NonNull]);
    }

    #[test]
    fn test_scalar_cast_empty_vector() {
        let mut f = Fixture::new();
        let int = f.ctx.builtin(BuiltinKind::Int);
        let boolean = f.ctx.builtin(BuiltinKind::Bool);
        let lit = f.ctx.add_expr(int, ExprKind::IntLiteral(1));
        let cast = f.ctx.add_expr(
            boolean,
            ExprKind::Cast {
                cast: CastKind::IntegralToBoolean,
                sub: lit,
                is_implicit: true,
            },
        );
        f.transfer(cast).unwrap();
        assert_eq!(f.nullability(cast), vec![]);
    }

    #[test]
    fn test_dynamic_cast_topmost_nullable() {
        let mut f = Fixture::new();
        let base = f.ctx.record("Base", None);
        let derived = f.ctx.record("Derived", None);
        let base_ty = f.ctx.record_type_of(base).unwrap();
        let derived_ty = f.ctx.record_type_of(derived).unwrap();
        let base_ptr = f.ctx.pointer(base_ty);
        let derived_ptr = f.ctx.pointer(derived_ty);
        let dre = decl_ref(&mut f, base_ptr);
        let cast = f.ctx.add_expr(
            derived_ptr,
            ExprKind::Cast {
                cast: CastKind::Dynamic,
                sub: dre,
                is_implicit: false,
            },
        );
        f.transfer(dre).unwrap();
        f.transfer(cast).unwrap();
        assert_eq!(f.nullability(cast), vec![Nullable]);
    }

    #[test]
    fn test_dependent_cast_is_fatal() {
        let mut f = Fixture::new();
        let int = f.ctx.builtin(BuiltinKind::Int);
        let p = f.ctx.pointer(int);
        let dre = decl_ref(&mut f, p);
        let cast = f.ctx.add_expr(
            p,
            ExprKind::Cast {
                cast: CastKind::Dependent,
                sub: dre,
                is_implicit: false,
            },
        );
        f.transfer(dre).unwrap();
        let err = f.transfer(cast).unwrap_err();
        assert!(matches!(err, NullabilityError::DependentCast { .. }));
    }

    #[test]
    fn test_addr_of_and_deref() {
        let mut f = Fixture::new();
        let int = f.ctx.builtin(BuiltinKind::Int);
        let p = f.ctx.pointer(int);
        let nullable = f.ctx.attributed(Nullable, p);
        let dre = decl_ref(&mut f, nullable);
        let pp = f.ctx.pointer(nullable);
        let addr = f.ctx.add_expr(
            pp,
            ExprKind::Unary {
                op: UnaryOp::AddrOf,
                sub: dre,
            },
        );
        let deref = f.ctx.add_expr(
            int,
            ExprKind::Unary {
                op: UnaryOp::Deref,
                sub: dre,
            },
        );
        f.transfer(dre).unwrap();
        f.transfer(addr).unwrap();
        f.transfer(deref).unwrap();
        assert_eq!(f.nullability(addr), vec![NonNull, Nullable]);
        assert_eq!(f.nullability(deref), vec![]);
    }

    #[test]
    fn test_new_expr_annotation() {
        let mut f = Fixture::new();
        let int = f.ctx.builtin(BuiltinKind::Int);
        let p = f.ctx.pointer(int);
        let plain = f.ctx.add_expr(p, ExprKind::New { null_check: false });
        let nothrow = f.ctx.add_expr(p, ExprKind::New { null_check: true });
        f.transfer(plain).unwrap();
        f.transfer(nothrow).unwrap();
        assert_eq!(f.nullability(plain), vec![NonNull]);
        assert_eq!(f.nullability(nothrow), vec![Nullable]);
    }

    #[test]
    fn test_this_is_nonnull() {
        let mut f = Fixture::new();
        let s = f.ctx.record("S", None);
        let s_ty = f.ctx.record_type_of(s).unwrap();
        let this_ty = f.ctx.pointer(s_ty);
        let this = f.ctx.add_expr(this_ty, ExprKind::This);
        f.transfer(this).unwrap();
        assert_eq!(f.nullability(this), vec![NonNull]);
    }

    #[test]
    fn test_member_call_truncates_callee_vector() {
        // P<int *, int * _Nonnull> x; x.second() => [Nullable, Nonnull]
        let mut f = Fixture::new();
        let int = f.ctx.builtin(BuiltinKind::Int);
        let p = f.ctx.pointer(int);
        let nonnull = f.ctx.attributed(NonNull, p);
        let pair = f.ctx.class_template("P");
        let spec = f.ctx.record_specialization(
            "P",
            None,
            pair,
            vec![TemplateArg::Type(p), TemplateArg::Type(nonnull)],
            false,
        );
        let spec_ty = f.ctx.record_type_of(spec).unwrap();

        // S *_Nullable second();  with S substituted from param #1
        let subst = f.ctx.subst_template_type_parm(spec, 1, None, p);
        let ret_ptr = f.ctx.pointer(subst);
        let ret = f.ctx.attributed(Nullable, ret_ptr);
        let method_ty = f.ctx.function_proto(ret, vec![]);
        let second = f.ctx.function("second", method_ty, None, Some(spec));

        let x = f.ctx.var("x", spec_ty);
        let base = f.ctx.add_expr(
            spec_ty,
            ExprKind::DeclRef {
                decl: x,
                template_args: vec![],
            },
        );
        let bound = f.ctx.builtin(BuiltinKind::BoundMember);
        let member = f.ctx.add_expr(
            bound,
            ExprKind::Member {
                base,
                member: second,
                is_arrow: false,
            },
        );
        let call = f.ctx.add_expr(
            ret,
            ExprKind::MemberCall {
                callee: member,
                args: vec![],
            },
        );

        f.transfer(base).unwrap();
        f.transfer(member).unwrap();
        f.transfer(call).unwrap();

        assert_eq!(f.nullability(base), vec![Unspecified, NonNull]);
        assert_eq!(f.nullability(member), vec![Nullable, NonNull]);
        assert_eq!(f.nullability(call), vec![Nullable, NonNull]);
    }

    #[test]
    fn test_function_template_call_resugars_written_args() {
        // template <class T> T id(T); id<int * _Nonnull>(p)
        let mut f = Fixture::new();
        let int = f.ctx.builtin(BuiltinKind::Int);
        let p = f.ctx.pointer(int);
        let nonnull = f.ctx.attributed(NonNull, p);
        let tmpl = f.ctx.function_template("id");
        let subst = f.ctx.subst_template_type_parm(tmpl, 0, None, p);
        let fn_ty = f.ctx.function_proto(subst, vec![subst]);
        let id_fn = f.ctx.function("id", fn_ty, Some(tmpl), None);
        let callee = f.ctx.add_expr(
            fn_ty,
            ExprKind::DeclRef {
                decl: id_fn,
                template_args: vec![TemplateArg::Type(nonnull)],
            },
        );
        let call = f.ctx.add_expr(
            subst,
            ExprKind::Call {
                callee,
                args: vec![],
            },
        );
        f.transfer(callee).unwrap();
        f.transfer(call).unwrap();
        assert_eq!(f.nullability(call), vec![NonNull]);
    }

    #[test]
    fn test_length_self_check_degrades() {
        // A member call whose callee vector is too short for the result
        // type: the rule's truncation produces a short vector, which the
        // self-check replaces with Unspecified of the right length.
        let mut f = Fixture::new();
        let int = f.ctx.builtin(BuiltinKind::Int);
        let p = f.ctx.pointer(int);
        let pp = f.ctx.pointer(p);
        let fn_ty = f.ctx.function_proto(int, vec![]);
        let g = f.ctx.function("g", fn_ty, None, None);
        let callee = f.ctx.add_expr(
            fn_ty,
            ExprKind::DeclRef {
                decl: g,
                template_args: vec![],
            },
        );
        let call = f.ctx.add_expr(
            pp,
            ExprKind::MemberCall {
                callee,
                args: vec![],
            },
        );
        f.transfer(callee).unwrap();
        f.transfer(call).unwrap();
        assert_eq!(f.nullability(call), vec![Unspecified, Unspecified]);
    }

    #[test]
    fn test_transfer_is_idempotent() {
        let mut f = Fixture::new();
        let int = f.ctx.builtin(BuiltinKind::Int);
        let p = f.ctx.pointer(int);
        let nullable = f.ctx.attributed(Nullable, p);
        let e = decl_ref(&mut f, nullable);
        f.transfer(e).unwrap();
        let first = f.lattice.clone();
        f.transfer(e).unwrap();
        assert_eq!(f.lattice, first);
    }
}
