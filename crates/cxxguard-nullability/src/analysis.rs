//! The analysis driver: binds the non-flow-sensitive and flow-sensitive
//! transfers into one function run over the CFG.
//!
//! Blocks are visited in reverse postorder until the per-block
//! environments stabilize, with an iteration cap as a safety net. The
//! driver also carries the value plumbing a dataflow framework would
//! normally provide: creating values and storage locations for
//! expressions and declarations, and propagating values through loads,
//! assignments and initializers. Created values are cached per expression
//! and declaration so revisits reuse them and the fixpoint can converge.

use std::collections::HashMap;

use cxxguard_ast::ast::{
    AstContext, BinaryOp, CastKind, DeclId, ExprId, ExprKind, UnaryOp,
};
use cxxguard_ast::cfg::{BasicBlock, Cfg, CfgElement, EdgeKind, FunctionCfg};
use cxxguard_dataflow::env::{Arena, Environment, LocId, ValueId};
use cxxguard_dataflow::formula::{BoolEngine, BoolId};

use crate::flow::{init_pointer_null_state, pointer_value_of_expr, transfer_flow_sensitive};
use crate::lattice::{NullabilityLattice, PointerTypeNullability};
use crate::transfer::{transfer_non_flow_sensitive, TransferState};
use crate::NullabilityError;

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Cap on fixpoint iterations over the CFG.
    pub max_iterations: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
        }
    }
}

/// Result of one function's analysis: the expression-keyed nullability
/// map plus the converged per-block environments.
pub struct AnalysisOutput {
    pub lattice: NullabilityLattice,
    /// Converged input environment per block.
    pub block_envs: HashMap<u32, Environment>,
    /// Converged exit environment per block.
    pub exit_envs: HashMap<u32, Environment>,
    /// Flow condition at function exit.
    pub flow_condition: BoolId,
}

/// Merges one boolean across a CFG join, per the three-branch rule:
/// identical handles merge to themselves; values both constrained the
/// same way constrain the fresh boolean directly, keeping the flow
/// condition small; otherwise the path taken selects which input the
/// fresh boolean mirrors.
pub fn merge_bool(
    b1: BoolId,
    env1: &Environment,
    b2: BoolId,
    env2: &Environment,
    merged_env: &mut Environment,
    bools: &mut BoolEngine,
) -> BoolId {
    merge_bool_into(None, b1, env1, b2, env2, merged_env, bools)
}

fn merge_bool_into(
    target: Option<BoolId>,
    b1: BoolId,
    env1: &Environment,
    b2: BoolId,
    env2: &Environment,
    merged_env: &mut Environment,
    bools: &mut BoolEngine,
) -> BoolId {
    if b1 == b2 {
        return b1;
    }

    let merged = target.unwrap_or_else(|| bools.mk_atomic());
    let not_b1 = bools.mk_not(b1);
    let not_b2 = bools.mk_not(b2);

    if env1.flow_condition_implies(bools, b1) && env2.flow_condition_implies(bools, b2) {
        merged_env.add_to_flow_condition(bools, merged);
    } else if env1.flow_condition_implies(bools, not_b1)
        && env2.flow_condition_implies(bools, not_b2)
    {
        let not_merged = bools.mk_not(merged);
        merged_env.add_to_flow_condition(bools, not_merged);
    } else {
        // The disjunction form relies on the two flow-condition tokens
        // being mutually exclusive; where they are not, it stays sound
        // but loses precision.
        let f1 = env1.flow_condition;
        let f2 = env2.flow_condition;
        let iff1 = bools.mk_iff(merged, b1);
        let iff2 = bools.mk_iff(merged, b2);
        let taken1 = bools.mk_and(f1, iff1);
        let taken2 = bools.mk_and(f2, iff2);
        let either = bools.mk_or(taken1, taken2);
        merged_env.add_to_flow_condition(bools, either);
    }
    merged
}

pub struct PointerNullabilityAnalysis<'ast> {
    ctx: &'ast AstContext,
    lattice: NullabilityLattice,
    options: AnalysisOptions,
    // Driver-created values and locations, stable across fixpoint
    // iterations.
    expr_values: HashMap<ExprId, ValueId>,
    expr_locs: HashMap<ExprId, LocId>,
    decl_values: HashMap<DeclId, ValueId>,
    comparison_atoms: HashMap<ExprId, BoolId>,
    merged_values: HashMap<(ValueId, ValueId), ValueId>,
}

impl<'ast> PointerNullabilityAnalysis<'ast> {
    pub fn new(ctx: &'ast AstContext) -> Self {
        Self::with_options(ctx, AnalysisOptions::default())
    }

    pub fn with_options(ctx: &'ast AstContext, options: AnalysisOptions) -> Self {
        Self {
            ctx,
            lattice: NullabilityLattice::new(),
            options,
            expr_values: HashMap::new(),
            expr_locs: HashMap::new(),
            decl_values: HashMap::new(),
            comparison_atoms: HashMap::new(),
            merged_values: HashMap::new(),
        }
    }

    /// Allocates (once) the symbolic nullability pair for a declaration.
    /// Querying the engine afterwards relates the pair to the null state
    /// of values derived from the declaration.
    pub fn assign_nullability_variable(
        &mut self,
        d: DeclId,
        arena: &mut Arena,
    ) -> PointerTypeNullability {
        self.lattice.assign_decl_nullability(d, &mut arena.bools)
    }

    /// Runs both transfers over the CFG to a fixpoint.
    pub fn analyze(
        mut self,
        func: &FunctionCfg,
        arena: &mut Arena,
    ) -> Result<AnalysisOutput, NullabilityError> {
        let cfg = Cfg::from_function(func);
        let rpo = cfg.reverse_postorder();
        let entry_env = Environment::new(&mut arena.bools);

        let mut block_envs: HashMap<u32, Environment> = HashMap::new();
        let mut exit_envs: HashMap<u32, Environment> = HashMap::new();

        let mut changed = true;
        let mut iterations = 0;
        while changed && iterations < self.options.max_iterations {
            changed = false;
            iterations += 1;
            for &block_id in &rpo {
                let Some(block) = cfg.block(block_id) else {
                    continue;
                };
                let mut env =
                    self.merge_predecessors(block_id, &cfg, &exit_envs, &entry_env, arena);
                let input_snapshot = env.clone();
                for element in &block.elements {
                    self.transfer_element(element, &mut env, arena)?;
                }
                block_envs.insert(block_id, input_snapshot);
                if exit_envs.get(&block_id) != Some(&env) {
                    exit_envs.insert(block_id, env);
                    changed = true;
                }
            }
        }

        if iterations >= self.options.max_iterations {
            tracing::warn!(
                func = %func.name,
                iterations,
                "nullability analysis did not converge"
            );
        }

        let flow_condition = exit_flow_condition(func, &rpo, &exit_envs, &entry_env);
        Ok(AnalysisOutput {
            lattice: self.lattice,
            block_envs,
            exit_envs,
            flow_condition,
        })
    }

    /// Joins predecessor exit states, refining each along its edge by the
    /// predecessor's branch condition.
    fn merge_predecessors(
        &mut self,
        block_id: u32,
        cfg: &Cfg<'_>,
        exit_envs: &HashMap<u32, Environment>,
        entry_env: &Environment,
        arena: &mut Arena,
    ) -> Environment {
        let mut merged: Option<Environment> = None;
        for &(pred_id, edge_kind) in cfg.predecessors(block_id) {
            let Some(pred_exit) = exit_envs.get(&pred_id) else {
                continue;
            };
            let mut refined = pred_exit.clone();
            if let Some(condition) = cfg.block(pred_id).and_then(|b: &BasicBlock| b.terminator) {
                if let Some(token) = refined
                    .value_of_expr(condition)
                    .and_then(|v| arena.bool_of_value(v))
                {
                    match edge_kind {
                        EdgeKind::CondTrue => {
                            refined.add_to_flow_condition(&mut arena.bools, token)
                        }
                        EdgeKind::CondFalse => {
                            let negated = arena.bools.mk_not(token);
                            refined.add_to_flow_condition(&mut arena.bools, negated);
                        }
                        EdgeKind::Unconditional => {}
                    }
                }
            }
            merged = Some(match merged {
                None => refined,
                Some(accumulated) => self.join_environments(accumulated, refined, arena),
            });
        }
        merged.unwrap_or_else(|| entry_env.clone())
    }

    fn join_environments(
        &mut self,
        env1: Environment,
        env2: Environment,
        arena: &mut Arena,
    ) -> Environment {
        let flow = arena
            .bools
            .mk_or(env1.flow_condition, env2.flow_condition);
        let mut merged = Environment::with_flow_condition(flow);

        for (&loc, &v1) in env1.loc_bindings() {
            let Some(&v2) = env2.loc_bindings().get(&loc) else {
                continue;
            };
            if v1 == v2 {
                merged.set_value_at(loc, v1);
            } else if let Some(mv) = self.merge_pointer_values(v1, &env1, v2, &env2, &mut merged, arena)
            {
                merged.set_value_at(loc, mv);
            }
        }
        for (&e, &v1) in env1.expr_bindings() {
            if env2.expr_bindings().get(&e) == Some(&v1) {
                merged.set_expr_value(e, v1);
            }
        }
        for (&e, &l1) in env1.expr_loc_bindings() {
            if env2.expr_loc_bindings().get(&e) == Some(&l1) {
                merged.set_expr_loc(e, l1);
            }
        }
        merged
    }

    /// Custom merge for two tracked pointer values; `None` (no custom
    /// merge) when either side is untracked.
    fn merge_pointer_values(
        &mut self,
        v1: ValueId,
        env1: &Environment,
        v2: ValueId,
        env2: &Environment,
        merged_env: &mut Environment,
        arena: &mut Arena,
    ) -> Option<ValueId> {
        let state1 = arena.pointer_null_state(v1)?;
        let state2 = arena.pointer_null_state(v2)?;

        let merged_value = *self
            .merged_values
            .entry((v1, v2))
            .or_insert_with(|| arena.create_pointer_value());
        let existing = arena.pointer_null_state(merged_value);

        let known = merge_bool_into(
            existing.map(|s| s.is_known),
            state1.is_known,
            env1,
            state2.is_known,
            env2,
            merged_env,
            &mut arena.bools,
        );
        let null = merge_bool_into(
            existing.map(|s| s.is_null),
            state1.is_null,
            env1,
            state2.is_null,
            env2,
            merged_env,
            &mut arena.bools,
        );
        init_pointer_null_state(arena, merged_value, Some(known), Some(null));
        Some(merged_value)
    }

    fn transfer_element(
        &mut self,
        element: &CfgElement,
        env: &mut Environment,
        arena: &mut Arena,
    ) -> Result<(), NullabilityError> {
        match element {
            CfgElement::Statement(e) => {
                {
                    let mut state = TransferState {
                        lattice: &mut self.lattice,
                        env: &mut *env,
                        arena: &mut *arena,
                    };
                    transfer_non_flow_sensitive(self.ctx, *e, &mut state)?;
                }
                self.prepare_values(*e, env, arena);
                let mut state = TransferState {
                    lattice: &mut self.lattice,
                    env: &mut *env,
                    arena: &mut *arena,
                };
                transfer_flow_sensitive(self.ctx, *e, &mut state)
            }
            CfgElement::Decl { decl, init } => {
                let loc = arena.decl_storage_location(*decl);
                if let Some(init) = init {
                    if let Some(v) = pointer_value_of_expr(self.ctx, *init, env) {
                        env.set_value_at(loc, v);
                    }
                }
                Ok(())
            }
            CfgElement::Return(_) => Ok(()),
        }
    }

    fn cached_pointer_value(&mut self, e: ExprId, arena: &mut Arena) -> ValueId {
        *self
            .expr_values
            .entry(e)
            .or_insert_with(|| arena.create_pointer_value())
    }

    fn cached_expr_loc(&mut self, e: ExprId, arena: &mut Arena) -> LocId {
        *self
            .expr_locs
            .entry(e)
            .or_insert_with(|| arena.create_storage_location())
    }

    fn cached_decl_value(&mut self, d: DeclId, is_pointer: bool, arena: &mut Arena) -> ValueId {
        *self.decl_values.entry(d).or_insert_with(|| {
            if is_pointer {
                arena.create_pointer_value()
            } else {
                arena.create_opaque_value()
            }
        })
    }

    /// The value/location plumbing a dataflow framework provides: ensures
    /// the expression has a value (and location, for glvalues) bound in
    /// the environment before the flow-sensitive rules run.
    fn prepare_values(&mut self, e: ExprId, env: &mut Environment, arena: &mut Arena) {
        let ctx = self.ctx;
        let expr = ctx.expr(e).clone();
        match expr.kind {
            ExprKind::DeclRef { decl, .. } => {
                if ctx.decl_type(decl).is_some() {
                    let loc = arena.decl_storage_location(decl);
                    env.set_expr_loc(e, loc);
                    if env.value_at(loc).is_none() {
                        let is_pointer = ctx.is_pointer(expr.ty);
                        let v = self.cached_decl_value(decl, is_pointer, arena);
                        env.set_value_at(loc, v);
                    }
                }
            }
            ExprKind::Member { member, .. } => {
                // Member storage is modeled per member declaration.
                if !ctx.is_bound_member(expr.ty) {
                    let loc = arena.decl_storage_location(member);
                    env.set_expr_loc(e, loc);
                    if env.value_at(loc).is_none() {
                        let is_pointer = ctx.is_pointer(expr.ty);
                        let v = self.cached_decl_value(member, is_pointer, arena);
                        env.set_value_at(loc, v);
                    }
                }
            }
            ExprKind::Cast { cast, sub, .. } => match cast {
                // Loads and value-preserving conversions carry the
                // operand's value through.
                CastKind::LValueToRValue
                | CastKind::NoOp
                | CastKind::AtomicToNonAtomic
                | CastKind::NonAtomicToAtomic
                | CastKind::AddressSpaceConversion
                | CastKind::BuiltinFnToFnPtr => {
                    if let Some(v) = pointer_value_of_expr(ctx, sub, env) {
                        env.set_expr_value(e, v);
                    }
                }
                // Carries the literal's value when there is one (nullptr);
                // integer zero gets a value of its own.
                CastKind::NullToPointer => {
                    match pointer_value_of_expr(ctx, sub, env) {
                        Some(v) => env.set_expr_value(e, v),
                        None => {
                            let v = self.cached_pointer_value(e, arena);
                            env.set_expr_value(e, v);
                        }
                    }
                }
                // The flow rule rebinds the formula on this value.
                CastKind::PointerToBoolean => {
                    if env.value_of_expr(e).is_none() {
                        let v = *self.expr_values.entry(e).or_insert_with(|| {
                            let placeholder = arena.bools.mk_false();
                            arena.create_bool_value(placeholder)
                        });
                        env.set_expr_value(e, v);
                    }
                }
                _ => {
                    if ctx.is_pointer(expr.ty) && !expr.is_glvalue {
                        let v = self.cached_pointer_value(e, arena);
                        env.set_expr_value(e, v);
                    }
                }
            },
            ExprKind::MaterializeTemporary { sub } => {
                if let Some(v) = pointer_value_of_expr(ctx, sub, env) {
                    env.set_expr_value(e, v);
                }
            }
            ExprKind::Unary {
                op: UnaryOp::AddrOf,
                ..
            } => {
                let v = self.cached_pointer_value(e, arena);
                env.set_expr_value(e, v);
            }
            ExprKind::Unary {
                op: UnaryOp::Deref, ..
            }
            | ExprKind::ArraySubscript { .. } => {
                // Pointee memory is not modeled; the glvalue gets its own
                // location so address-taking sees something stable.
                let loc = self.cached_expr_loc(e, arena);
                env.set_expr_loc(e, loc);
                if ctx.is_pointer(expr.ty) && env.value_at(loc).is_none() {
                    let v = self.cached_pointer_value(e, arena);
                    env.set_value_at(loc, v);
                }
            }
            ExprKind::Unary { sub, .. } => {
                if ctx.is_pointer(expr.ty) {
                    if let Some(v) = pointer_value_of_expr(ctx, sub, env) {
                        env.set_expr_value(e, v);
                    }
                }
            }
            ExprKind::New { .. } | ExprKind::This => {
                if ctx.is_pointer(expr.ty) {
                    let v = self.cached_pointer_value(e, arena);
                    env.set_expr_value(e, v);
                }
            }
            ExprKind::NullLiteral => {
                let v = self.cached_pointer_value(e, arena);
                env.set_expr_value(e, v);
            }
            ExprKind::Call { .. } | ExprKind::MemberCall { .. } => {
                if expr.is_glvalue {
                    // Return-by-reference: bind a storage location so a
                    // pointer created from the reference stays stable.
                    let loc = match env.loc_of_expr(e) {
                        Some(loc) => loc,
                        None => {
                            let loc = self.cached_expr_loc(e, arena);
                            env.set_expr_loc(e, loc);
                            loc
                        }
                    };
                    if ctx.is_pointer(expr.ty) && env.value_at(loc).is_none() {
                        let v = self.cached_pointer_value(e, arena);
                        env.set_value_at(loc, v);
                    }
                } else if ctx.is_pointer(expr.ty) && env.value_of_expr(e).is_none() {
                    let v = self.cached_pointer_value(e, arena);
                    env.set_expr_value(e, v);
                }
            }
            ExprKind::Binary {
                op: BinaryOp::Assign,
                lhs,
                rhs,
            } => {
                if let Some(loc) = env.loc_of_expr(lhs) {
                    if let Some(v) = pointer_value_of_expr(ctx, rhs, env) {
                        env.set_value_at(loc, v);
                        env.set_expr_value(e, v);
                    }
                }
            }
            ExprKind::Binary { op, lhs, rhs }
                if matches!(op, BinaryOp::Eq | BinaryOp::Ne)
                    && ctx.is_pointer(ctx.expr(lhs).ty)
                    && ctx.is_pointer(ctx.expr(rhs).ty) =>
            {
                let atom = *self
                    .comparison_atoms
                    .entry(e)
                    .or_insert_with(|| arena.bools.mk_atomic());
                let v = *self
                    .expr_values
                    .entry(e)
                    .or_insert_with(|| arena.create_bool_value(atom));
                env.set_expr_value(e, v);
            }
            _ => {}
        }
    }
}

fn exit_flow_condition(
    func: &FunctionCfg,
    rpo: &[u32],
    exit_envs: &HashMap<u32, Environment>,
    entry_env: &Environment,
) -> BoolId {
    let returning_block = func
        .blocks
        .iter()
        .find(|b| {
            b.elements
                .iter()
                .any(|el| matches!(el, CfgElement::Return(_)))
        })
        .map(|b| b.id);
    returning_block
        .or_else(|| rpo.last().copied())
        .and_then(|b| exit_envs.get(&b))
        .map(|env| env.flow_condition)
        .unwrap_or(entry_env.flow_condition)
}
