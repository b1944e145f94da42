//! Values, storage locations and environment snapshots.
//!
//! The [`Arena`] owns the boolean engine plus every value and storage
//! location created during one analysis run; [`Environment`] snapshots
//! are cheap clones holding only bindings and the flow condition. Ids are
//! plain `u32`s so the arena stays agnostic of the AST crate.

use std::collections::HashMap;

use crate::formula::{BoolEngine, BoolId};

pub type ValueId = u32;
pub type LocId = u32;

/// The two boolean handles attached to a pointer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerNullState {
    pub is_known: BoolId,
    pub is_null: BoolId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Pointer { null_state: Option<PointerNullState> },
    Bool(BoolId),
    Opaque,
}

/// Owns run-scoped state: the boolean engine, values, storage locations
/// and the declaration→location table. Declarations map to the same
/// location in every environment snapshot of a run.
pub struct Arena {
    pub bools: BoolEngine,
    values: Vec<Value>,
    loc_count: u32,
    decl_locs: HashMap<u32, LocId>,
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Arena {
    pub fn new() -> Self {
        Self {
            bools: BoolEngine::new(),
            values: Vec::new(),
            loc_count: 0,
            decl_locs: HashMap::new(),
        }
    }

    pub fn with_engine(bools: BoolEngine) -> Self {
        Self {
            bools,
            values: Vec::new(),
            loc_count: 0,
            decl_locs: HashMap::new(),
        }
    }

    pub fn create_pointer_value(&mut self) -> ValueId {
        self.push_value(Value::Pointer { null_state: None })
    }

    pub fn create_bool_value(&mut self, b: BoolId) -> ValueId {
        self.push_value(Value::Bool(b))
    }

    pub fn create_opaque_value(&mut self) -> ValueId {
        self.push_value(Value::Opaque)
    }

    fn push_value(&mut self, v: Value) -> ValueId {
        let id = self.values.len() as ValueId;
        self.values.push(v);
        id
    }

    pub fn value(&self, v: ValueId) -> &Value {
        &self.values[v as usize]
    }

    pub fn pointer_null_state(&self, v: ValueId) -> Option<PointerNullState> {
        match self.value(v) {
            Value::Pointer { null_state } => *null_state,
            _ => None,
        }
    }

    /// Attaches a null state to a pointer value. Returns false when the
    /// value is not a pointer or the state was already set.
    pub fn set_pointer_null_state(&mut self, v: ValueId, state: PointerNullState) -> bool {
        match &mut self.values[v as usize] {
            Value::Pointer { null_state } if null_state.is_none() => {
                *null_state = Some(state);
                true
            }
            _ => false,
        }
    }

    pub fn bool_of_value(&self, v: ValueId) -> Option<BoolId> {
        match self.value(v) {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Rebinds the formula of an existing boolean value.
    pub fn update_bool_value(&mut self, v: ValueId, b: BoolId) {
        if let Value::Bool(existing) = &mut self.values[v as usize] {
            *existing = b;
        }
    }

    pub fn create_storage_location(&mut self) -> LocId {
        let id = self.loc_count;
        self.loc_count += 1;
        id
    }

    /// The storage location of a declaration, created on first use.
    pub fn decl_storage_location(&mut self, decl: u32) -> LocId {
        if let Some(&loc) = self.decl_locs.get(&decl) {
            return loc;
        }
        let loc = self.create_storage_location();
        self.decl_locs.insert(decl, loc);
        loc
    }
}

/// One program point's knowledge: the flow condition plus value bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    pub flow_condition: BoolId,
    expr_values: HashMap<u32, ValueId>,
    expr_locs: HashMap<u32, LocId>,
    loc_values: HashMap<LocId, ValueId>,
}

impl Environment {
    pub fn new(bools: &mut BoolEngine) -> Self {
        Self::with_flow_condition(bools.mk_true())
    }

    pub fn with_flow_condition(flow_condition: BoolId) -> Self {
        Self {
            flow_condition,
            expr_values: HashMap::new(),
            expr_locs: HashMap::new(),
            loc_values: HashMap::new(),
        }
    }

    pub fn value_of_expr(&self, e: u32) -> Option<ValueId> {
        self.expr_values.get(&e).copied()
    }

    pub fn set_expr_value(&mut self, e: u32, v: ValueId) {
        self.expr_values.insert(e, v);
    }

    pub fn loc_of_expr(&self, e: u32) -> Option<LocId> {
        self.expr_locs.get(&e).copied()
    }

    pub fn set_expr_loc(&mut self, e: u32, loc: LocId) {
        self.expr_locs.insert(e, loc);
    }

    pub fn value_at(&self, loc: LocId) -> Option<ValueId> {
        self.loc_values.get(&loc).copied()
    }

    pub fn set_value_at(&mut self, loc: LocId, v: ValueId) {
        self.loc_values.insert(loc, v);
    }

    pub fn expr_bindings(&self) -> &HashMap<u32, ValueId> {
        &self.expr_values
    }

    pub fn expr_loc_bindings(&self) -> &HashMap<u32, LocId> {
        &self.expr_locs
    }

    pub fn loc_bindings(&self) -> &HashMap<LocId, ValueId> {
        &self.loc_values
    }

    pub fn add_to_flow_condition(&mut self, bools: &mut BoolEngine, b: BoolId) {
        self.flow_condition = bools.mk_and(self.flow_condition, b);
    }

    pub fn flow_condition_implies(&self, bools: &BoolEngine, b: BoolId) -> bool {
        bools.implies(self.flow_condition, b)
    }
}
