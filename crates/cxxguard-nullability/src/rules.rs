//! Nullability safety rules (NULL001, NULL002, NULL003).

use cxxguard_ast::ast::{AstContext, ExprId};
use cxxguard_diagnostics::diagnostic::{Diagnostic, DiagnosticBuilder, DiagnosticSource, Severity};

use crate::count::expr_type;

/// NULL001: dereference of a possibly-null pointer.
pub fn build_null001(ctx: &AstContext, deref: ExprId, operand: ExprId, func_name: &str) -> Diagnostic {
    let (file, line, col) = extract_span(ctx, deref);
    DiagnosticBuilder::new(
        "NULL001",
        Severity::Critical,
        "possibly-null pointer dereference",
        DiagnosticSource::Nullability,
    )
    .location(file, line, col)
    .explanation(format!(
        "In function `{func_name}`, a value of type `{}` may be null when dereferenced",
        ctx.print_type(expr_type(ctx, operand))
    ))
    .confidence(0.95)
    .build()
}

/// NULL002: member access through a possibly-null pointer.
pub fn build_null002(ctx: &AstContext, member: ExprId, base: ExprId, func_name: &str) -> Diagnostic {
    let (file, line, col) = extract_span(ctx, member);
    DiagnosticBuilder::new(
        "NULL002",
        Severity::Critical,
        "member access on possibly-null pointer",
        DiagnosticSource::Nullability,
    )
    .location(file, line, col)
    .explanation(format!(
        "In function `{func_name}`, the base of type `{}` may be null when accessed with `->`",
        ctx.print_type(expr_type(ctx, base))
    ))
    .confidence(0.95)
    .build()
}

/// NULL003: subscript on a possibly-null pointer.
pub fn build_null003(ctx: &AstContext, subscript: ExprId, base: ExprId, func_name: &str) -> Diagnostic {
    let (file, line, col) = extract_span(ctx, subscript);
    DiagnosticBuilder::new(
        "NULL003",
        Severity::Critical,
        "subscript on possibly-null pointer",
        DiagnosticSource::Nullability,
    )
    .location(file, line, col)
    .explanation(format!(
        "In function `{func_name}`, a pointer of type `{}` may be null when subscripted",
        ctx.print_type(expr_type(ctx, base))
    ))
    .confidence(0.95)
    .build()
}

fn extract_span(ctx: &AstContext, e: ExprId) -> (String, u32, u32) {
    match &ctx.expr(e).span {
        Some(span) => (span.file.clone(), span.line, span.column),
        None => ("unknown".into(), 0, 0),
    }
}
