//! Rebuild a canonical type decorated with a nullability vector.
//!
//! `Attributed` wrappers are added at each pointer position whose entry is
//! not Unspecified, and template-specialization sugar is recreated over
//! rebuilt arguments. This stays in sync with the walker and the
//! non-flow-sensitive transfer: a rebuilt type walks back to the vector it
//! was built from.

use cxxguard_ast::ast::{AstContext, NullabilityKind, TemplateArg, TypeId, TypeKind};

use crate::count::count_pointers_in_type;
use crate::NullabilityError;

struct Rebuilder<'v> {
    nullability: &'v [NullabilityKind],
    pos: usize,
}

impl Rebuilder<'_> {
    fn next(&mut self, ctx: &AstContext, at: TypeId) -> Result<NullabilityKind, NullabilityError> {
        let kind = self
            .nullability
            .get(self.pos)
            .copied()
            .ok_or_else(|| NullabilityError::VectorLength {
                ty: ctx.print_type(at),
                expected: count_pointers_in_type(ctx, at),
                got: self.nullability.len(),
            })?;
        self.pos += 1;
        Ok(kind)
    }

    fn visit(&mut self, ctx: &mut AstContext, ty: TypeId) -> Result<TypeId, NullabilityError> {
        match ctx.type_kind(ty).clone() {
            TypeKind::Pointer { pointee } => {
                let kind = self.next(ctx, ty)?;
                let rebuilt_pointee = self.visit(ctx, pointee)?;
                let rebuilt = ctx.pointer(rebuilt_pointee);
                if kind == NullabilityKind::Unspecified {
                    Ok(rebuilt)
                } else {
                    Ok(ctx.attributed(kind, rebuilt))
                }
            }
            TypeKind::Record { decl } => {
                let Some(spec) = ctx.record_specialization_info(decl).cloned() else {
                    return Ok(ty);
                };
                let mut rebuilt_args = Vec::with_capacity(spec.args.len());
                for arg in &spec.args {
                    rebuilt_args.push(self.visit_arg(ctx, arg)?);
                }
                Ok(ctx.template_specialization(spec.template, rebuilt_args, false, ty))
            }
            TypeKind::FunctionProto { result, params } => {
                let rebuilt_result = self.visit(ctx, result)?;
                let mut rebuilt_params = Vec::with_capacity(params.len());
                for param in params {
                    rebuilt_params.push(self.visit(ctx, param)?);
                }
                Ok(ctx.function_proto(rebuilt_result, rebuilt_params))
            }
            TypeKind::Reference { pointee } => {
                let rebuilt = self.visit(ctx, pointee)?;
                Ok(ctx.reference(rebuilt))
            }
            TypeKind::Array { element } => {
                let rebuilt = self.visit(ctx, element)?;
                Ok(ctx.array(rebuilt))
            }
            // Nothing else carries pointer positions on a canonical type.
            _ => Ok(ty),
        }
    }

    fn visit_arg(
        &mut self,
        ctx: &mut AstContext,
        arg: &TemplateArg,
    ) -> Result<TemplateArg, NullabilityError> {
        match arg {
            TemplateArg::Type(t) => Ok(TemplateArg::Type(self.visit(ctx, *t)?)),
            TemplateArg::Pack(elems) => {
                let mut rebuilt = Vec::with_capacity(elems.len());
                for elem in elems {
                    rebuilt.push(self.visit_arg(ctx, elem)?);
                }
                Ok(TemplateArg::Pack(rebuilt))
            }
            TemplateArg::Value(v) => Ok(TemplateArg::Value(v.clone())),
        }
    }
}

/// Rebuilds the canonical form of `ty` with `nullability` applied. The
/// vector must be consumed exactly.
pub fn rebuild_with_nullability(
    ctx: &mut AstContext,
    ty: TypeId,
    nullability: &[NullabilityKind],
) -> Result<TypeId, NullabilityError> {
    let canonical = ctx.canonical(ty);
    let mut rebuilder = Rebuilder {
        nullability,
        pos: 0,
    };
    let rebuilt = rebuilder.visit(ctx, canonical)?;
    if rebuilder.pos != nullability.len() {
        return Err(NullabilityError::VectorLength {
            ty: ctx.print_type(ty),
            expected: rebuilder.pos,
            got: nullability.len(),
        });
    }
    Ok(rebuilt)
}

/// The pretty-printed form of `ty` with `nullability` applied.
pub fn print_with_nullability(
    ctx: &mut AstContext,
    ty: TypeId,
    nullability: &[NullabilityKind],
) -> Result<String, NullabilityError> {
    let rebuilt = rebuild_with_nullability(ctx, ty, nullability)?;
    Ok(ctx.print_type(rebuilt))
}
