//! Types, declarations and expressions.
//!
//! All nodes live in an [`AstContext`] and are referenced by plain `u32`
//! ids. Types are interned (hash-consed) and their canonical form is
//! computed eagerly at intern time, so canonical equivalence of two types
//! is id equality of their canonical ids.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub type TypeId = u32;
pub type DeclId = u32;
pub type ExprId = u32;

/// Pointer nullability as written at the AST surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NullabilityKind {
    NonNull,
    Nullable,
    Unspecified,
}

impl NullabilityKind {
    /// The attribute spelling, e.g. `_Nonnull`.
    pub fn spelling(self) -> &'static str {
        match self {
            Self::NonNull => "_Nonnull",
            Self::Nullable => "_Nullable",
            Self::Unspecified => "_Null_unspecified",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinKind {
    Void,
    Bool,
    Int,
    Float,
    /// The type of `nullptr` (`nullptr_t`). Not itself a pointer.
    NullPtr,
    /// Placeholder type of a member access that is part of a member call.
    BoundMember,
}

/// A template argument as written in source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemplateArg {
    Type(TypeId),
    Pack(Vec<TemplateArg>),
    /// Non-type argument; carries its printed form. No pointer positions.
    Value(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    Builtin(BuiltinKind),
    Pointer {
        pointee: TypeId,
    },
    Reference {
        pointee: TypeId,
    },
    Array {
        element: TypeId,
    },
    FunctionProto {
        result: TypeId,
        params: Vec<TypeId>,
    },
    Record {
        decl: DeclId,
    },
    /// A nullability attribute written directly on a type.
    Attributed {
        nullability: NullabilityKind,
        modified: TypeId,
    },
    /// Typedef / `using` sugar, one desugaring step away from `desugared`.
    Alias {
        name: String,
        desugared: TypeId,
    },
    /// The written form `F<args>`. The alias form desugars to the
    /// substituted underlying type, the class form to the specialization's
    /// record type.
    TemplateSpecialization {
        template: DeclId,
        args: Vec<TemplateArg>,
        is_alias: bool,
        desugared: TypeId,
    },
    /// A template type parameter after substitution. `associated_decl`
    /// owns the argument list the parameter was bound from.
    SubstTemplateTypeParm {
        associated_decl: DeclId,
        index: u32,
        pack_index: Option<u32>,
        replacement: TypeId,
    },
    /// A qualified name `A::B::C`; `qualifiers` are ordered left to right.
    Elaborated {
        qualifiers: Vec<TypeId>,
        named: TypeId,
    },
}

/// Instantiation info attached to a class/variable template specialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specialization {
    /// The primary template this specializes.
    pub template: DeclId,
    /// The full (canonical) argument list, defaults included.
    pub args: Vec<TemplateArg>,
    /// True when the instantiation pattern is a partial specialization.
    /// The primary-template arg list then does not map 1:1 onto the
    /// pattern's parameters.
    pub from_partial: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDecl {
    /// Lexically enclosing declaration, if any.
    pub parent: Option<DeclId>,
    /// The `Record` type node for this declaration.
    pub self_type: TypeId,
    pub specialization: Option<Specialization>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub ty: TypeId,
    /// For instantiated function templates: the primary template.
    pub primary_template: Option<DeclId>,
    pub parent: Option<DeclId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeclKind {
    Record(RecordDecl),
    ClassTemplate,
    /// A type-alias template; `annotation` is the `[[clang::annotate]]`
    /// marker string, if any ("Nullable", "Nonnull",
    /// "Nullability_Unspecified").
    AliasTemplate { annotation: Option<String> },
    FunctionTemplate,
    Function(FunctionDecl),
    Var {
        ty: TypeId,
        specialization: Option<Specialization>,
    },
    Field {
        ty: TypeId,
        parent: Option<DeclId>,
    },
    Param {
        ty: TypeId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decl {
    pub id: DeclId,
    pub name: String,
    pub kind: DeclKind,
}

/// Source location span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    AddrOf,
    Deref,
    PostInc,
    PostDec,
    PreInc,
    PreDec,
    Plus,
    Minus,
    Not,
    LNot,
    Real,
    Imag,
    Extension,
    CoAwait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Assign,
    Eq,
    Ne,
    Add,
    Sub,
}

/// The closed cast-kind table. The analyzer classifies every variant
/// explicitly; an unclassified kind is a bug, not a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastKind {
    LValueToRValue,
    NoOp,
    AtomicToNonAtomic,
    NonAtomicToAtomic,
    AddressSpaceConversion,
    LValueBitCast,
    BitCast,
    LValueToRValueBitCast,
    BaseToDerived,
    DerivedToBase,
    UncheckedDerivedToBase,
    UserDefinedConversion,
    ConstructorConversion,
    Dynamic,
    NullToPointer,
    IntegralToPointer,
    ArrayToPointerDecay,
    FunctionToPointerDecay,
    BuiltinFnToFnPtr,
    ToVoid,
    PointerToBoolean,
    PointerToIntegral,
    MemberPointerToBoolean,
    IntegralCast,
    IntegralToBoolean,
    IntegralToFloating,
    FloatingToIntegral,
    FloatingToBoolean,
    BooleanToSignedIntegral,
    FloatingCast,
    FloatingRealToComplex,
    FloatingComplexToReal,
    IntegralRealToComplex,
    IntegralComplexToReal,
    BaseToDerivedMemberPointer,
    DerivedToBaseMemberPointer,
    NullToMemberPointer,
    ReinterpretMemberPointer,
    ToUnion,
    VectorSplat,
    MatrixCast,
    /// Only legal in dependent contexts; seeing one during analysis is fatal.
    Dependent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    DeclRef {
        decl: DeclId,
        /// Template arguments written at the reference, e.g. `f<int *>`.
        template_args: Vec<TemplateArg>,
    },
    Member {
        base: ExprId,
        member: DeclId,
        is_arrow: bool,
    },
    Call {
        callee: ExprId,
        args: Vec<ExprId>,
    },
    MemberCall {
        callee: ExprId,
        args: Vec<ExprId>,
    },
    Cast {
        cast: CastKind,
        sub: ExprId,
        is_implicit: bool,
    },
    MaterializeTemporary {
        sub: ExprId,
    },
    Unary {
        op: UnaryOp,
        sub: ExprId,
    },
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    New {
        /// Whether the allocator form null-checks (`new (std::nothrow)`).
        null_check: bool,
    },
    ArraySubscript {
        base: ExprId,
        index: ExprId,
    },
    This,
    NullLiteral,
    IntLiteral(i64),
    BoolLiteral(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub id: ExprId,
    pub ty: TypeId,
    pub kind: ExprKind,
    pub is_glvalue: bool,
    pub span: Option<Span>,
}

/// Owning context for types, declarations and expressions.
#[derive(Debug, Default)]
pub struct AstContext {
    types: Vec<TypeKind>,
    canonical: Vec<TypeId>,
    interned: HashMap<TypeKind, TypeId>,
    decls: Vec<Decl>,
    exprs: Vec<Expr>,
}

impl AstContext {
    pub fn new() -> Self {
        Self::default()
    }

    // -- types ------------------------------------------------------------

    fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.interned.get(&kind) {
            return id;
        }
        let id = self.types.len() as TypeId;
        self.types.push(kind.clone());
        // Provisional; fixed up below once components are canonicalized.
        self.canonical.push(id);
        self.interned.insert(kind.clone(), id);
        let canon = self.compute_canonical(id, &kind);
        self.canonical[id as usize] = canon;
        id
    }

    fn compute_canonical(&mut self, id: TypeId, kind: &TypeKind) -> TypeId {
        match kind {
            TypeKind::Builtin(_) | TypeKind::Record { .. } => id,
            TypeKind::Pointer { pointee } => {
                let c = self.canonical(*pointee);
                if c == *pointee {
                    id
                } else {
                    self.pointer(c)
                }
            }
            TypeKind::Reference { pointee } => {
                let c = self.canonical(*pointee);
                if c == *pointee {
                    id
                } else {
                    self.reference(c)
                }
            }
            TypeKind::Array { element } => {
                let c = self.canonical(*element);
                if c == *element {
                    id
                } else {
                    self.array(c)
                }
            }
            TypeKind::FunctionProto { result, params } => {
                let cr = self.canonical(*result);
                let cp: Vec<TypeId> = params.iter().map(|&p| self.canonical(p)).collect();
                if cr == *result && cp == *params {
                    id
                } else {
                    self.function_proto(cr, cp)
                }
            }
            TypeKind::Attributed { modified, .. } => self.canonical(*modified),
            TypeKind::Alias { desugared, .. } => self.canonical(*desugared),
            TypeKind::TemplateSpecialization { desugared, .. } => self.canonical(*desugared),
            TypeKind::SubstTemplateTypeParm { replacement, .. } => self.canonical(*replacement),
            TypeKind::Elaborated { named, .. } => self.canonical(*named),
        }
    }

    pub fn builtin(&mut self, b: BuiltinKind) -> TypeId {
        self.intern(TypeKind::Builtin(b))
    }

    pub fn pointer(&mut self, pointee: TypeId) -> TypeId {
        self.intern(TypeKind::Pointer { pointee })
    }

    pub fn reference(&mut self, pointee: TypeId) -> TypeId {
        self.intern(TypeKind::Reference { pointee })
    }

    pub fn array(&mut self, element: TypeId) -> TypeId {
        self.intern(TypeKind::Array { element })
    }

    pub fn function_proto(&mut self, result: TypeId, params: Vec<TypeId>) -> TypeId {
        self.intern(TypeKind::FunctionProto { result, params })
    }

    pub fn attributed(&mut self, nullability: NullabilityKind, modified: TypeId) -> TypeId {
        self.intern(TypeKind::Attributed {
            nullability,
            modified,
        })
    }

    pub fn alias(&mut self, name: impl Into<String>, desugared: TypeId) -> TypeId {
        self.intern(TypeKind::Alias {
            name: name.into(),
            desugared,
        })
    }

    pub fn template_specialization(
        &mut self,
        template: DeclId,
        args: Vec<TemplateArg>,
        is_alias: bool,
        desugared: TypeId,
    ) -> TypeId {
        self.intern(TypeKind::TemplateSpecialization {
            template,
            args,
            is_alias,
            desugared,
        })
    }

    pub fn subst_template_type_parm(
        &mut self,
        associated_decl: DeclId,
        index: u32,
        pack_index: Option<u32>,
        replacement: TypeId,
    ) -> TypeId {
        self.intern(TypeKind::SubstTemplateTypeParm {
            associated_decl,
            index,
            pack_index,
            replacement,
        })
    }

    pub fn elaborated(&mut self, qualifiers: Vec<TypeId>, named: TypeId) -> TypeId {
        self.intern(TypeKind::Elaborated { qualifiers, named })
    }

    pub fn type_kind(&self, t: TypeId) -> &TypeKind {
        &self.types[t as usize]
    }

    pub fn canonical(&self, t: TypeId) -> TypeId {
        self.canonical[t as usize]
    }

    /// True if the canonical form of `t` is a raw pointer.
    pub fn is_pointer(&self, t: TypeId) -> bool {
        matches!(
            self.type_kind(self.canonical(t)),
            TypeKind::Pointer { .. }
        )
    }

    /// Canonical pointee of a pointer type.
    pub fn pointee(&self, t: TypeId) -> Option<TypeId> {
        match self.type_kind(self.canonical(t)) {
            TypeKind::Pointer { pointee } => Some(*pointee),
            _ => None,
        }
    }

    pub fn is_nullptr_type(&self, t: TypeId) -> bool {
        matches!(
            self.type_kind(self.canonical(t)),
            TypeKind::Builtin(BuiltinKind::NullPtr)
        )
    }

    pub fn is_bound_member(&self, t: TypeId) -> bool {
        matches!(
            self.type_kind(t),
            TypeKind::Builtin(BuiltinKind::BoundMember)
        )
    }

    /// Nullability written in the sugar of `t`, applying to its outermost
    /// pointer: a direct attribute, or an annotated alias template.
    pub fn sugared_nullability(&self, t: TypeId) -> Option<NullabilityKind> {
        match self.type_kind(t) {
            TypeKind::Attributed { nullability, .. } => Some(*nullability),
            TypeKind::Alias { desugared, .. } => self.sugared_nullability(*desugared),
            TypeKind::TemplateSpecialization {
                template,
                is_alias: true,
                desugared,
                ..
            } => self
                .alias_nullability(*template)
                .or_else(|| self.sugared_nullability(*desugared)),
            TypeKind::Elaborated { named, .. } => self.sugared_nullability(*named),
            TypeKind::SubstTemplateTypeParm { replacement, .. } => {
                self.sugared_nullability(*replacement)
            }
            _ => None,
        }
    }

    /// Maps an alias template's annotation marker to a nullability kind.
    pub fn alias_nullability(&self, template: DeclId) -> Option<NullabilityKind> {
        if let DeclKind::AliasTemplate {
            annotation: Some(a),
        } = &self.decl(template).kind
        {
            match a.as_str() {
                "Nullable" => return Some(NullabilityKind::Nullable),
                "Nonnull" => return Some(NullabilityKind::NonNull),
                "Nullability_Unspecified" => return Some(NullabilityKind::Unspecified),
                _ => return None,
            }
        }
        None
    }

    // -- declarations -----------------------------------------------------

    fn add_decl(&mut self, name: impl Into<String>, kind: DeclKind) -> DeclId {
        let id = self.decls.len() as DeclId;
        self.decls.push(Decl {
            id,
            name: name.into(),
            kind,
        });
        id
    }

    pub fn class_template(&mut self, name: impl Into<String>) -> DeclId {
        self.add_decl(name, DeclKind::ClassTemplate)
    }

    pub fn alias_template(
        &mut self,
        name: impl Into<String>,
        annotation: Option<&str>,
    ) -> DeclId {
        self.add_decl(
            name,
            DeclKind::AliasTemplate {
                annotation: annotation.map(str::to_owned),
            },
        )
    }

    pub fn function_template(&mut self, name: impl Into<String>) -> DeclId {
        self.add_decl(name, DeclKind::FunctionTemplate)
    }

    /// Declares a record and interns its `Record` type.
    pub fn record(&mut self, name: impl Into<String>, parent: Option<DeclId>) -> DeclId {
        let id = self.add_decl(
            name,
            DeclKind::Record(RecordDecl {
                parent,
                self_type: 0,
                specialization: None,
            }),
        );
        let ty = self.intern(TypeKind::Record { decl: id });
        if let DeclKind::Record(rd) = &mut self.decls[id as usize].kind {
            rd.self_type = ty;
        }
        id
    }

    /// Declares a class-template specialization record.
    pub fn record_specialization(
        &mut self,
        name: impl Into<String>,
        parent: Option<DeclId>,
        template: DeclId,
        args: Vec<TemplateArg>,
        from_partial: bool,
    ) -> DeclId {
        let id = self.record(name, parent);
        if let DeclKind::Record(rd) = &mut self.decls[id as usize].kind {
            rd.specialization = Some(Specialization {
                template,
                args,
                from_partial,
            });
        }
        id
    }

    pub fn function(
        &mut self,
        name: impl Into<String>,
        ty: TypeId,
        primary_template: Option<DeclId>,
        parent: Option<DeclId>,
    ) -> DeclId {
        self.add_decl(
            name,
            DeclKind::Function(FunctionDecl {
                ty,
                primary_template,
                parent,
            }),
        )
    }

    pub fn var(&mut self, name: impl Into<String>, ty: TypeId) -> DeclId {
        self.add_decl(
            name,
            DeclKind::Var {
                ty,
                specialization: None,
            },
        )
    }

    pub fn field(&mut self, name: impl Into<String>, ty: TypeId, parent: Option<DeclId>) -> DeclId {
        self.add_decl(name, DeclKind::Field { ty, parent })
    }

    pub fn param(&mut self, name: impl Into<String>, ty: TypeId) -> DeclId {
        self.add_decl(name, DeclKind::Param { ty })
    }

    pub fn decl(&self, d: DeclId) -> &Decl {
        &self.decls[d as usize]
    }

    /// The declared type of a value declaration, if it has one.
    pub fn decl_type(&self, d: DeclId) -> Option<TypeId> {
        match &self.decl(d).kind {
            DeclKind::Function(f) => Some(f.ty),
            DeclKind::Var { ty, .. } | DeclKind::Field { ty, .. } | DeclKind::Param { ty } => {
                Some(*ty)
            }
            _ => None,
        }
    }

    /// The lexically enclosing declaration.
    pub fn decl_parent(&self, d: DeclId) -> Option<DeclId> {
        match &self.decl(d).kind {
            DeclKind::Record(rd) => rd.parent,
            DeclKind::Function(f) => f.parent,
            DeclKind::Field { parent, .. } => *parent,
            _ => None,
        }
    }

    /// The `Record` type of a record declaration.
    pub fn record_type_of(&self, d: DeclId) -> Option<TypeId> {
        match &self.decl(d).kind {
            DeclKind::Record(rd) => Some(rd.self_type),
            _ => None,
        }
    }

    pub fn record_specialization_info(&self, d: DeclId) -> Option<&Specialization> {
        match &self.decl(d).kind {
            DeclKind::Record(rd) => rd.specialization.as_ref(),
            _ => None,
        }
    }

    /// True when `d`'s specialization was instantiated from a partial
    /// specialization pattern (records and variable templates).
    pub fn instantiated_from_partial(&self, d: DeclId) -> bool {
        match &self.decl(d).kind {
            DeclKind::Record(rd) => rd
                .specialization
                .as_ref()
                .is_some_and(|s| s.from_partial),
            DeclKind::Var {
                specialization: Some(s),
                ..
            } => s.from_partial,
            _ => false,
        }
    }

    // -- expressions ------------------------------------------------------

    pub fn add_expr(&mut self, ty: TypeId, kind: ExprKind) -> ExprId {
        let is_glvalue = matches!(
            &kind,
            ExprKind::DeclRef { .. }
                | ExprKind::Member { .. }
                | ExprKind::ArraySubscript { .. }
                | ExprKind::Unary {
                    op: UnaryOp::Deref,
                    ..
                }
        ) && !self.is_bound_member(ty);
        self.add_expr_with_category(ty, kind, is_glvalue)
    }

    pub fn add_expr_with_category(
        &mut self,
        ty: TypeId,
        kind: ExprKind,
        is_glvalue: bool,
    ) -> ExprId {
        let id = self.exprs.len() as ExprId;
        self.exprs.push(Expr {
            id,
            ty,
            kind,
            is_glvalue,
            span: None,
        });
        id
    }

    pub fn set_expr_span(&mut self, e: ExprId, span: Span) {
        self.exprs[e as usize].span = Some(span);
    }

    pub fn expr(&self, e: ExprId) -> &Expr {
        &self.exprs[e as usize]
    }

    /// Skips implicit casts, returning the underlying expression.
    pub fn strip_implicit_casts(&self, mut e: ExprId) -> ExprId {
        while let ExprKind::Cast {
            sub,
            is_implicit: true,
            ..
        } = &self.expr(e).kind
        {
            e = *sub;
        }
        e
    }

    /// Direct children in evaluation order.
    pub fn expr_children(&self, e: ExprId) -> Vec<ExprId> {
        match &self.expr(e).kind {
            ExprKind::Member { base, .. } => vec![*base],
            ExprKind::Call { callee, args } | ExprKind::MemberCall { callee, args } => {
                let mut out = vec![*callee];
                out.extend(args.iter().copied());
                out
            }
            ExprKind::Cast { sub, .. }
            | ExprKind::MaterializeTemporary { sub }
            | ExprKind::Unary { sub, .. } => vec![*sub],
            ExprKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            ExprKind::ArraySubscript { base, index } => vec![*base, *index],
            _ => Vec::new(),
        }
    }

    // -- printing ---------------------------------------------------------

    /// C++-ish spelling of a type, for diagnostics and tests.
    pub fn print_type(&self, t: TypeId) -> String {
        match self.type_kind(t) {
            TypeKind::Builtin(b) => match b {
                BuiltinKind::Void => "void".into(),
                BuiltinKind::Bool => "bool".into(),
                BuiltinKind::Int => "int".into(),
                BuiltinKind::Float => "float".into(),
                BuiltinKind::NullPtr => "nullptr_t".into(),
                BuiltinKind::BoundMember => "<bound member>".into(),
            },
            TypeKind::Pointer { pointee } => format!("{} *", self.print_type(*pointee)),
            TypeKind::Reference { pointee } => format!("{} &", self.print_type(*pointee)),
            TypeKind::Array { element } => format!("{}[]", self.print_type(*element)),
            TypeKind::FunctionProto { result, params } => {
                let params = params
                    .iter()
                    .map(|&p| self.print_type(p))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} ({})", self.print_type(*result), params)
            }
            TypeKind::Record { decl } => self.decl(*decl).name.clone(),
            TypeKind::Attributed {
                nullability,
                modified,
            } => format!("{} {}", self.print_type(*modified), nullability.spelling()),
            TypeKind::Alias { name, .. } => name.clone(),
            TypeKind::TemplateSpecialization { template, args, .. } => {
                let args = args
                    .iter()
                    .map(|a| self.print_template_arg(a))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}<{}>", self.decl(*template).name, args)
            }
            TypeKind::SubstTemplateTypeParm { replacement, .. } => self.print_type(*replacement),
            TypeKind::Elaborated { qualifiers, named } => {
                let mut out = String::new();
                for &q in qualifiers {
                    out.push_str(&self.print_type(q));
                    out.push_str("::");
                }
                out.push_str(&self.print_type(*named));
                out
            }
        }
    }

    fn print_template_arg(&self, a: &TemplateArg) -> String {
        match a {
            TemplateArg::Type(t) => self.print_type(*t),
            TemplateArg::Pack(elems) => elems
                .iter()
                .map(|e| self.print_template_arg(e))
                .collect::<Vec<_>>()
                .join(", "),
            TemplateArg::Value(v) => v.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_dedups() {
        let mut ctx = AstContext::new();
        let int = ctx.builtin(BuiltinKind::Int);
        let p1 = ctx.pointer(int);
        let p2 = ctx.pointer(int);
        assert_eq!(p1, p2);
    }

    #[test]
    fn test_canonical_strips_sugar() {
        let mut ctx = AstContext::new();
        let int = ctx.builtin(BuiltinKind::Int);
        let ptr = ctx.pointer(int);
        let attributed = ctx.attributed(NullabilityKind::NonNull, ptr);
        let alias = ctx.alias("IntPtr", attributed);
        assert_eq!(ctx.canonical(attributed), ptr);
        assert_eq!(ctx.canonical(alias), ptr);
    }

    #[test]
    fn test_canonical_rebuilds_structural_types() {
        let mut ctx = AstContext::new();
        let int = ctx.builtin(BuiltinKind::Int);
        let ptr = ctx.pointer(int);
        let attributed = ctx.attributed(NullabilityKind::Nullable, ptr);
        // int * _Nullable * — the outer pointer's canonical form is int **.
        let outer = ctx.pointer(attributed);
        let plain_outer = ctx.pointer(ptr);
        assert_eq!(ctx.canonical(outer), plain_outer);
        assert_ne!(outer, plain_outer);
    }

    #[test]
    fn test_canonical_equivalence_through_distinct_sugar() {
        let mut ctx = AstContext::new();
        let int = ctx.builtin(BuiltinKind::Int);
        let ptr = ctx.pointer(int);
        let a = ctx.alias("A", ptr);
        let nonnull = ctx.attributed(NullabilityKind::NonNull, ptr);
        let b = ctx.alias("B", nonnull);
        assert_eq!(ctx.canonical(a), ctx.canonical(b));
    }

    #[test]
    fn test_sugared_nullability() {
        let mut ctx = AstContext::new();
        let int = ctx.builtin(BuiltinKind::Int);
        let ptr = ctx.pointer(int);
        assert_eq!(ctx.sugared_nullability(ptr), None);
        let nullable = ctx.attributed(NullabilityKind::Nullable, ptr);
        assert_eq!(
            ctx.sugared_nullability(nullable),
            Some(NullabilityKind::Nullable)
        );
        let via_alias = ctx.alias("MaybeInt", nullable);
        assert_eq!(
            ctx.sugared_nullability(via_alias),
            Some(NullabilityKind::Nullable)
        );
    }

    #[test]
    fn test_alias_template_annotation() {
        let mut ctx = AstContext::new();
        let annotated = ctx.alias_template("Nullable", Some("Nullable"));
        let plain = ctx.alias_template("Wrap", None);
        let unknown = ctx.alias_template("Odd", Some("NotANullability"));
        assert_eq!(
            ctx.alias_nullability(annotated),
            Some(NullabilityKind::Nullable)
        );
        assert_eq!(ctx.alias_nullability(plain), None);
        assert_eq!(ctx.alias_nullability(unknown), None);
    }

    #[test]
    fn test_record_self_type() {
        let mut ctx = AstContext::new();
        let s = ctx.record("S", None);
        let ty = ctx.record_type_of(s).unwrap();
        assert_eq!(ctx.type_kind(ty), &TypeKind::Record { decl: s });
        assert_eq!(ctx.canonical(ty), ty);
    }

    #[test]
    fn test_expr_value_category_defaults() {
        let mut ctx = AstContext::new();
        let int = ctx.builtin(BuiltinKind::Int);
        let ptr = ctx.pointer(int);
        let p = ctx.var("p", ptr);
        let decl_ref = ctx.add_expr(
            ptr,
            ExprKind::DeclRef {
                decl: p,
                template_args: vec![],
            },
        );
        assert!(ctx.expr(decl_ref).is_glvalue);
        let lit = ctx.add_expr(int, ExprKind::IntLiteral(0));
        assert!(!ctx.expr(lit).is_glvalue);
    }

    #[test]
    fn test_strip_implicit_casts() {
        let mut ctx = AstContext::new();
        let int = ctx.builtin(BuiltinKind::Int);
        let ptr = ctx.pointer(int);
        let p = ctx.var("p", ptr);
        let decl_ref = ctx.add_expr(
            ptr,
            ExprKind::DeclRef {
                decl: p,
                template_args: vec![],
            },
        );
        let load = ctx.add_expr(
            ptr,
            ExprKind::Cast {
                cast: CastKind::LValueToRValue,
                sub: decl_ref,
                is_implicit: true,
            },
        );
        let explicit = ctx.add_expr(
            ptr,
            ExprKind::Cast {
                cast: CastKind::NoOp,
                sub: load,
                is_implicit: false,
            },
        );
        assert_eq!(ctx.strip_implicit_casts(load), decl_ref);
        assert_eq!(ctx.strip_implicit_casts(explicit), explicit);
    }

    #[test]
    fn test_print_type() {
        let mut ctx = AstContext::new();
        let int = ctx.builtin(BuiltinKind::Int);
        let ptr = ctx.pointer(int);
        let nonnull = ctx.attributed(NullabilityKind::NonNull, ptr);
        let outer = ctx.pointer(nonnull);
        assert_eq!(ctx.print_type(outer), "int * _Nonnull *");
        let f = ctx.function_proto(int, vec![ptr]);
        assert_eq!(ctx.print_type(f), "int (int *)");
    }

    #[test]
    fn test_expr_serde_roundtrip() {
        let mut ctx = AstContext::new();
        let int = ctx.builtin(BuiltinKind::Int);
        let ptr = ctx.pointer(int);
        let p = ctx.var("p", ptr);
        let e = ctx.add_expr(
            ptr,
            ExprKind::DeclRef {
                decl: p,
                template_args: vec![TemplateArg::Type(ptr)],
            },
        );
        let json = serde_json::to_string(ctx.expr(e)).unwrap();
        let parsed: Expr = serde_json::from_str(&json).unwrap();
        assert_eq!(&parsed, ctx.expr(e));
    }

    #[test]
    fn test_nullability_spelling() {
        assert_eq!(NullabilityKind::NonNull.spelling(), "_Nonnull");
        assert_eq!(NullabilityKind::Nullable.spelling(), "_Nullable");
        assert_eq!(
            NullabilityKind::Unspecified.spelling(),
            "_Null_unspecified"
        );
    }
}
