//! CFG navigation helpers over a function's basic blocks.
//!
//! The CFG itself is built by the embedding frontend; this module provides
//! the traversal indices (successors, predecessors, reverse postorder) the
//! dataflow driver needs.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::ast::{AstContext, DeclId, ExprId};

/// One CFG element. The analyzer only acts on statement elements; the
/// declaration and return forms carry the value plumbing the driver needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CfgElement {
    Statement(ExprId),
    Decl { decl: DeclId, init: Option<ExprId> },
    Return(Option<ExprId>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: u32,
    pub elements: Vec<CfgElement>,
    /// Branch condition ending the block, if any. The condition expression
    /// also appears in `elements` so it is transferred in program order.
    pub terminator: Option<ExprId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    Unconditional,
    CondTrue,
    CondFalse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfgEdge {
    pub from_block: u32,
    pub to_block: u32,
    pub kind: EdgeKind,
}

/// A function body: parameters plus its CFG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCfg {
    pub name: String,
    pub params: Vec<DeclId>,
    pub blocks: Vec<BasicBlock>,
    pub edges: Vec<CfgEdge>,
}

impl FunctionCfg {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            blocks: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn add_block(&mut self) -> u32 {
        let id = self.blocks.len() as u32;
        self.blocks.push(BasicBlock {
            id,
            elements: Vec::new(),
            terminator: None,
        });
        id
    }

    pub fn push_element(&mut self, block: u32, element: CfgElement) {
        self.blocks[block as usize].elements.push(element);
    }

    /// Appends `expr` and all of its subexpressions as statement elements,
    /// children before parents, matching the program-order guarantee the
    /// analyzer relies on.
    pub fn push_stmt(&mut self, ctx: &AstContext, block: u32, expr: ExprId) {
        for child in ctx.expr_children(expr) {
            self.push_stmt(ctx, block, child);
        }
        self.push_element(block, CfgElement::Statement(expr));
    }

    pub fn set_terminator(&mut self, block: u32, condition: ExprId) {
        self.blocks[block as usize].terminator = Some(condition);
    }

    pub fn add_edge(&mut self, from_block: u32, to_block: u32, kind: EdgeKind) {
        self.edges.push(CfgEdge {
            from_block,
            to_block,
            kind,
        });
    }
}

/// A traversable view of a function's CFG.
pub struct Cfg<'a> {
    func: &'a FunctionCfg,
    successors: HashMap<u32, Vec<(u32, EdgeKind)>>,
    predecessors: HashMap<u32, Vec<(u32, EdgeKind)>>,
    block_map: HashMap<u32, &'a BasicBlock>,
}

impl<'a> Cfg<'a> {
    /// Build traversal indices from a function.
    pub fn from_function(func: &'a FunctionCfg) -> Self {
        let mut successors: HashMap<u32, Vec<(u32, EdgeKind)>> = HashMap::new();
        let mut predecessors: HashMap<u32, Vec<(u32, EdgeKind)>> = HashMap::new();
        let mut block_map = HashMap::new();

        for block in &func.blocks {
            block_map.insert(block.id, block);
            successors.entry(block.id).or_default();
            predecessors.entry(block.id).or_default();
        }

        for edge in &func.edges {
            successors
                .entry(edge.from_block)
                .or_default()
                .push((edge.to_block, edge.kind));
            predecessors
                .entry(edge.to_block)
                .or_default()
                .push((edge.from_block, edge.kind));
        }

        Self {
            func,
            successors,
            predecessors,
            block_map,
        }
    }

    /// Entry block (always block 0).
    pub fn entry_block(&self) -> Option<&'a BasicBlock> {
        self.block_map.get(&0).copied()
    }

    pub fn block(&self, id: u32) -> Option<&'a BasicBlock> {
        self.block_map.get(&id).copied()
    }

    pub fn successors(&self, block_id: u32) -> &[(u32, EdgeKind)] {
        self.successors
            .get(&block_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn predecessors(&self, block_id: u32) -> &[(u32, EdgeKind)] {
        self.predecessors
            .get(&block_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn blocks(&self) -> impl Iterator<Item = &'a BasicBlock> {
        self.func.blocks.iter()
    }

    pub fn block_count(&self) -> usize {
        self.func.blocks.len()
    }

    /// Reverse post-order, the visitation order for forward dataflow.
    pub fn reverse_postorder(&self) -> Vec<u32> {
        let mut visited = HashSet::new();
        let mut postorder = Vec::new();

        if let Some(entry) = self.entry_block() {
            self.dfs_postorder(entry.id, &mut visited, &mut postorder);
        }

        postorder.reverse();
        postorder
    }

    fn dfs_postorder(&self, block_id: u32, visited: &mut HashSet<u32>, postorder: &mut Vec<u32>) {
        if !visited.insert(block_id) {
            return;
        }
        for &(succ_id, _) in self.successors(block_id) {
            self.dfs_postorder(succ_id, visited, postorder);
        }
        postorder.push(block_id);
    }

    /// Detect if the CFG has cycles (loops).
    pub fn has_cycle(&self) -> bool {
        let mut visited = HashSet::new();
        let mut in_stack = HashSet::new();

        if let Some(entry) = self.entry_block() {
            return self.has_cycle_dfs(entry.id, &mut visited, &mut in_stack);
        }
        false
    }

    fn has_cycle_dfs(
        &self,
        id: u32,
        visited: &mut HashSet<u32>,
        in_stack: &mut HashSet<u32>,
    ) -> bool {
        visited.insert(id);
        in_stack.insert(id);

        for &(succ_id, _) in self.successors(id) {
            if !visited.contains(&succ_id) {
                if self.has_cycle_dfs(succ_id, visited, in_stack) {
                    return true;
                }
            } else if in_stack.contains(&succ_id) {
                return true;
            }
        }

        in_stack.remove(&id);
        false
    }

    /// All blocks reachable from a given block.
    pub fn reachable_from(&self, start: u32) -> HashSet<u32> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);

        while let Some(id) = queue.pop_front() {
            if visited.insert(id) {
                for &(succ_id, _) in self.successors(id) {
                    queue.push_back(succ_id);
                }
            }
        }

        visited
    }
}
