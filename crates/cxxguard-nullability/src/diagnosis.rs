//! Check phase: walks each block's converged state and reports pointer
//! uses that cannot be proven safe.
//!
//! A dereference site is unsafe when the block's flow condition fails to
//! imply `¬(is_known ∧ is_null)` for the operand's pointer value: the
//! pointer is provably null, or nullable and unrefined on this path.
//! Untracked (unspecified) pointers are not flagged.

use cxxguard_ast::ast::{AstContext, ExprId, ExprKind, UnaryOp};
use cxxguard_ast::cfg::{CfgElement, FunctionCfg};
use cxxguard_dataflow::env::{Arena, Environment};
use cxxguard_diagnostics::diagnostic::Diagnostic;

use crate::analysis::AnalysisOutput;
use crate::flow::{is_nullable, pointer_value_of_expr};
use crate::rules;

/// Reports every unsafe dereference in the analyzed function.
pub fn diagnose(
    ctx: &AstContext,
    func: &FunctionCfg,
    output: &AnalysisOutput,
    arena: &mut Arena,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for block in &func.blocks {
        let Some(env) = output.exit_envs.get(&block.id) else {
            continue;
        };
        for element in &block.elements {
            let CfgElement::Statement(e) = element else {
                continue;
            };
            check_expr(ctx, *e, env, arena, &func.name, &mut diagnostics);
        }
    }
    diagnostics
}

fn check_expr(
    ctx: &AstContext,
    e: ExprId,
    env: &Environment,
    arena: &mut Arena,
    func_name: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match &ctx.expr(e).kind {
        ExprKind::Unary {
            op: UnaryOp::Deref,
            sub,
        } => {
            if operand_is_unsafe(ctx, *sub, env, arena) {
                diagnostics.push(rules::build_null001(ctx, e, *sub, func_name));
            }
        }
        ExprKind::Member {
            base,
            is_arrow: true,
            ..
        } => {
            if operand_is_unsafe(ctx, *base, env, arena) {
                diagnostics.push(rules::build_null002(ctx, e, *base, func_name));
            }
        }
        ExprKind::ArraySubscript { base, .. } => {
            if ctx.is_pointer(ctx.expr(*base).ty) && operand_is_unsafe(ctx, *base, env, arena) {
                diagnostics.push(rules::build_null003(ctx, e, *base, func_name));
            }
        }
        _ => {}
    }
}

fn operand_is_unsafe(ctx: &AstContext, operand: ExprId, env: &Environment, arena: &mut Arena) -> bool {
    match pointer_value_of_expr(ctx, operand, env) {
        Some(v) => is_nullable(arena, env, v),
        None => false,
    }
}
