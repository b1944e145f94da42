//! Structural type walker that recovers nullability annotations.
//!
//! The walker traverses a type and emits one `NullabilityKind` per pointer
//! position. A seen annotation is buffered as *pending* until the next
//! pointer consumes it; non-pointer non-sugar types drop it. Canonically
//! equivalent types produce the same sequence of pointer positions — only
//! the kinds differ, since those derive from sugar.
//!
//! While walking types instantiated from templates, substituted type
//! parameters carry no sugar of their own; the sugared argument they were
//! bound to is recovered through the template context chain.

use cxxguard_ast::ast::{AstContext, DeclId, TemplateArg, TypeId, TypeKind};
use cxxguard_ast::ast::NullabilityKind;

use crate::count::count_pointers_in_type;
use crate::nullability::TypeNullability;
use crate::NullabilityError;

/// A substituted template type parameter, as handed to a substitution hook.
#[derive(Debug, Clone, Copy)]
pub struct SubstTypeParam {
    pub ty: TypeId,
    pub associated_decl: DeclId,
    pub index: u32,
    pub pack_index: Option<u32>,
    pub replacement: TypeId,
}

/// Optional callback invoked at each substituted type parameter. A
/// returned vector is appended verbatim and the substitution sub-walk is
/// skipped; its length must equal the parameter's canonical pointer count.
pub type SubstitutionHook<'h> = dyn FnMut(&SubstTypeParam) -> Option<TypeNullability> + 'h;

/// Associates template params with the sugared args written for them.
/// Links form a stack-scoped chain: `extends` reaches the lexically
/// enclosing template's context, `arg_context` is the context in which
/// the args themselves were written. Nothing escapes the walk.
struct TemplateContext<'a> {
    associated_decl: DeclId,
    /// Absent when the written args could not be reconstructed (partial
    /// specializations).
    args: Option<&'a [TemplateArg]>,
    extends: Option<&'a TemplateContext<'a>>,
    arg_context: Option<&'a TemplateContext<'a>>,
}

struct Walker<'ast, 'h> {
    ctx: &'ast AstContext,
    /// An annotation waiting to attach to the next pointer. There may be
    /// sugar in between: Attributed -> Alias -> Alias -> Pointer.
    pending: Option<NullabilityKind>,
    annotations: TypeNullability,
    substitute: Option<&'h mut SubstitutionHook<'h>>,
}

/// Computes the nullability vector of `ty`, resugaring template
/// substitutions through the context chain and the optional hook.
pub fn get_nullability_annotations_from_type<'h>(
    ctx: &AstContext,
    ty: TypeId,
    substitute: Option<&'h mut SubstitutionHook<'h>>,
) -> Result<TypeNullability, NullabilityError> {
    let mut walker = Walker {
        ctx,
        pending: None,
        annotations: Vec::new(),
        substitute,
    };
    walker.visit_type(ty, None)?;
    Ok(walker.annotations)
}

impl<'ast, 'h> Walker<'ast, 'h> {
    fn saw_nullability(&mut self, kind: NullabilityKind) {
        // If nullability is applied twice, the outer annotation wins.
        if self.pending.is_none() {
            self.pending = Some(kind);
        }
    }

    fn visit_type(
        &mut self,
        ty: TypeId,
        tcx: Option<&TemplateContext<'_>>,
    ) -> Result<(), NullabilityError> {
        let ctx = self.ctx;
        match ctx.type_kind(ty) {
            TypeKind::Attributed {
                nullability,
                modified,
            } => {
                self.saw_nullability(*nullability);
                self.visit_type(*modified, tcx)?;
                if self.pending.take().is_some() {
                    // The modified type must have consumed (or dropped) it.
                    return Err(NullabilityError::BrokenTypeSugar {
                        ty: ctx.print_type(*modified),
                    });
                }
                Ok(())
            }
            TypeKind::Pointer { pointee } => {
                let kind = self.pending.take().unwrap_or(NullabilityKind::Unspecified);
                self.annotations.push(kind);
                self.visit_type(*pointee, tcx)
            }
            TypeKind::Reference { pointee } => {
                self.pending = None;
                self.visit_type(*pointee, tcx)
            }
            TypeKind::Array { element } => {
                self.pending = None;
                self.visit_type(*element, tcx)
            }
            TypeKind::FunctionProto { result, params } => {
                self.pending = None;
                self.visit_type(*result, tcx)?;
                for &param in params {
                    self.visit_type(param, tcx)?;
                }
                Ok(())
            }
            TypeKind::Record { decl } => {
                self.pending = None;
                self.visit_decl_context(ctx.decl_parent(*decl), tcx)?;
                if let Some(spec) = ctx.record_specialization_info(*decl) {
                    for arg in &spec.args {
                        self.visit_template_arg(arg, tcx)?;
                    }
                }
                Ok(())
            }
            TypeKind::TemplateSpecialization {
                template,
                args,
                is_alias: true,
                desugared,
            } => {
                if let Some(kind) = ctx.alias_nullability(*template) {
                    self.saw_nullability(kind);
                }
                // Aliases are sugar; walk the underlying type with the
                // written args recorded so substituted params resugar.
                let inner = TemplateContext {
                    associated_decl: *template,
                    args: Some(args.as_slice()),
                    extends: tcx,
                    arg_context: tcx,
                };
                self.visit_type(*desugared, Some(&inner))
            }
            TypeKind::TemplateSpecialization {
                args,
                is_alias: false,
                desugared,
                ..
            } => {
                self.pending = None;
                let record = match ctx.type_kind(ctx.canonical(*desugared)) {
                    TypeKind::Record { decl } => *decl,
                    // Concrete code always resolves to a record.
                    _ => return Ok(()),
                };
                self.visit_decl_context(ctx.decl_parent(record), tcx)?;
                for arg in args {
                    self.visit_template_arg(arg, tcx)?;
                }
                // The written list omits defaulted arguments; walk those
                // from the specialization decl, in unsugared form.
                if let Some(spec) = ctx.record_specialization_info(record) {
                    for arg in spec.args.iter().skip(args.len()) {
                        self.visit_template_arg(arg, tcx)?;
                    }
                }
                Ok(())
            }
            TypeKind::SubstTemplateTypeParm {
                associated_decl,
                index,
                pack_index,
                replacement,
            } => {
                let subst = SubstTypeParam {
                    ty,
                    associated_decl: *associated_decl,
                    index: *index,
                    pack_index: *pack_index,
                    replacement: *replacement,
                };
                self.visit_subst_param(subst, tcx)
            }
            TypeKind::Elaborated { qualifiers, named } => {
                self.visit_elaborated(qualifiers, *named, tcx)
            }
            // Any other sugar: desugar one step and continue.
            TypeKind::Alias { desugared, .. } => self.visit_type(*desugared, tcx),
            TypeKind::Builtin(_) => {
                self.pending = None;
                Ok(())
            }
        }
    }

    fn visit_template_arg(
        &mut self,
        arg: &TemplateArg,
        tcx: Option<&TemplateContext<'_>>,
    ) -> Result<(), NullabilityError> {
        match arg {
            TemplateArg::Type(t) => self.visit_type(*t, tcx),
            TemplateArg::Pack(elems) => {
                for elem in elems {
                    self.visit_template_arg(elem, tcx)?;
                }
                Ok(())
            }
            TemplateArg::Value(_) => Ok(()),
        }
    }

    fn visit_decl_context(
        &mut self,
        dc: Option<DeclId>,
        tcx: Option<&TemplateContext<'_>>,
    ) -> Result<(), NullabilityError> {
        // Only enclosing record types carry pointer positions we can see.
        if let Some(d) = dc {
            if let Some(record_ty) = self.ctx.record_type_of(d) {
                return self.visit_type(record_ty, tcx);
            }
        }
        Ok(())
    }

    fn visit_subst_param(
        &mut self,
        subst: SubstTypeParam,
        tcx: Option<&TemplateContext<'_>>,
    ) -> Result<(), NullabilityError> {
        if let Some(hook) = self.substitute.as_mut() {
            if let Some(annotations) = hook(&subst) {
                let expected = count_pointers_in_type(self.ctx, self.ctx.canonical(subst.ty));
                if annotations.len() != expected {
                    tracing::warn!(
                        got = annotations.len(),
                        expected,
                        ty = %self.ctx.print_type(subst.ty),
                        "substituted nullability has the wrong structure"
                    );
                }
                self.annotations.extend(annotations);
                return Ok(());
            }
        }

        // The underlying type carries no sugar; find the sugared template
        // argument the parameter is bound to.
        let mut current = tcx;
        while let Some(link) = current {
            if link.associated_decl == subst.associated_decl {
                match link.args {
                    // Args not reconstructible: walk the underlying type.
                    None => break,
                    Some(args) => {
                        let index = match subst.pack_index {
                            // The pack is the last param in non-function
                            // templates, so index from the tail.
                            Some(pack_index) => {
                                match args.len().checked_sub(1 + pack_index as usize) {
                                    Some(i) => i,
                                    None => {
                                        current = link.extends;
                                        continue;
                                    }
                                }
                            }
                            None => subst.index as usize,
                        };
                        if index < args.len() {
                            // Walk the argument in the context where it
                            // was written.
                            let arg = args[index].clone();
                            return self.visit_template_arg(&arg, link.arg_context);
                        }
                        // Defaulted beyond the written list: keep looking
                        // at enclosing contexts.
                    }
                }
            }
            current = link.extends;
        }

        // Unbound or unreconstructible: walk the underlying type, which
        // yields Unspecified entries.
        self.visit_type(subst.replacement, tcx)
    }

    /// `foo<args>::ty` may need sugar from `args` to resugar `ty`.
    fn visit_elaborated(
        &mut self,
        qualifiers: &[TypeId],
        named: TypeId,
        tcx: Option<&TemplateContext<'_>>,
    ) -> Result<(), NullabilityError> {
        let ctx = self.ctx;
        // Scan qualifiers right to left for components that bind args.
        let mut links: Vec<(DeclId, Option<&'ast [TemplateArg]>)> = Vec::new();
        for &qualifier in qualifiers.iter().rev() {
            if let TypeKind::TemplateSpecialization {
                template,
                args,
                is_alias,
                desugared,
            } = ctx.type_kind(qualifier)
            {
                let associated = if *is_alias {
                    *template
                } else {
                    match ctx.type_kind(ctx.canonical(*desugared)) {
                        TypeKind::Record { decl } => *decl,
                        _ => continue,
                    }
                };
                let mut link_args = Some(args.as_slice());
                // A partial specialization's pattern params do not map
                // 1:1 onto the primary-template args; recovering the
                // mapping needs template argument deduction, so drop the
                // args and let bound params degrade to Unspecified.
                if ctx.instantiated_from_partial(associated) {
                    link_args = None;
                }
                links.push((associated, link_args));
            }
        }
        self.visit_named_with_links(&links, tcx, named, tcx)
    }

    /// Installs the collected qualifier contexts as a chain (inner extends
    /// outer, outermost extends the incoming context) and walks `named`
    /// under the innermost link.
    fn visit_named_with_links(
        &mut self,
        links: &[(DeclId, Option<&'ast [TemplateArg]>)],
        arg_context: Option<&TemplateContext<'_>>,
        named: TypeId,
        outer: Option<&TemplateContext<'_>>,
    ) -> Result<(), NullabilityError> {
        match links.split_last() {
            None => self.visit_type(named, outer),
            Some((&(associated_decl, args), rest)) => {
                let link = TemplateContext {
                    associated_decl,
                    args,
                    extends: outer,
                    arg_context,
                };
                self.visit_named_with_links(rest, arg_context, named, Some(&link))
            }
        }
    }
}
