//! Workspace: the block graph container shared by declarations and calls.
//!
//! [`Workspace`] is the single entry point for building and querying a block
//! program. It owns:
//! - the block graph (`StableGraph<Block, Link>`), links pointing parent ->
//!   child;
//! - the case-insensitive procedure name index (name -> declaration), the
//!   only shared structure that declarations write and call sites read;
//! - the [`ParamIdRegistry`] handing out parameter identities;
//! - the change-event log.
//!
//! Block IDs are allocated from a counter and mapped to petgraph indices, so
//! a disposed block's ID is never handed out again even though petgraph
//! recycles the vacant index.
//!
//! Procedure operations live in [`crate::procedure`], call-site
//! reconciliation in [`crate::call`], and the mutator workflow in
//! [`crate::mutator`]; they are all `impl Workspace` blocks.

use std::collections::HashMap;

use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};

use crate::block::{Block, BlockKind, GenericBlock, Link, Position, BUMP_DELTA};
use crate::call::CallSite;
use crate::error::CoreError;
use crate::id::{BlockId, ParamId};
use crate::names::{name_key, names_equal};
use crate::param::ParamIdRegistry;
use crate::procedure::ProcedureDecl;

/// A user-visible change, recorded unless events are suppressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeEvent {
    Create { block: BlockId },
    Delete { block: BlockId },
    /// The block was plugged in, unplugged, or moved between parents.
    Move {
        block: BlockId,
        old_parent: Option<BlockId>,
        new_parent: Option<BlockId>,
    },
    Field {
        block: BlockId,
        field: String,
        old: String,
        new: String,
    },
    /// The block's shape (parameters, slots, statement input) changed.
    Mutation { block: BlockId },
}

/// The block graph plus the procedure name index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    graph: StableGraph<Block, Link, Directed, u32>,
    /// Stable block ID -> current petgraph index.
    index: HashMap<BlockId, NodeIndex<u32>>,
    /// Lowercased procedure name -> declaration block.
    procedures: HashMap<String, BlockId>,
    pub(crate) param_ids: ParamIdRegistry,
    next_block_id: u32,
    events: Vec<ChangeEvent>,
    #[serde(skip)]
    silence_depth: u32,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    pub fn new() -> Self {
        Workspace {
            graph: StableGraph::new(),
            index: HashMap::new(),
            procedures: HashMap::new(),
            param_ids: ParamIdRegistry::new(),
            next_block_id: 0,
            events: Vec::new(),
            silence_depth: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    /// Issues a fresh parameter identity, for callers driving
    /// [`set_parameters`](Self::set_parameters) directly.
    pub fn issue_param_id(&mut self) -> ParamId {
        self.param_ids.issue()
    }

    /// Looks up a block by ID.
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.index.get(&id).and_then(|&idx| self.graph.node_weight(idx))
    }

    /// Returns `true` if the block exists (has not been disposed).
    pub fn contains(&self, id: BlockId) -> bool {
        self.index.contains_key(&id)
    }

    /// All block IDs, in creation order.
    pub fn block_ids(&self) -> Vec<BlockId> {
        let mut ids: Vec<BlockId> = self.index.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Blocks without a parent, in creation order.
    pub fn top_blocks(&self) -> Vec<BlockId> {
        self.block_ids()
            .into_iter()
            .filter(|&id| self.parent_of(id).is_none())
            .collect()
    }

    pub fn block_count(&self) -> usize {
        self.index.len()
    }

    /// The block plugged into `parent`'s input `name`, if any.
    pub fn input_target(&self, parent: BlockId, name: &str) -> Option<BlockId> {
        let idx = *self.index.get(&parent)?;
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .find(|edge| edge.weight().input_name() == Some(name))
            .and_then(|edge| self.graph.node_weight(edge.target()))
            .map(|block| block.id)
    }

    /// The block following `id` in its statement stack.
    pub fn next_block(&self, id: BlockId) -> Option<BlockId> {
        let idx = *self.index.get(&id)?;
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .find(|edge| *edge.weight() == Link::Next)
            .and_then(|edge| self.graph.node_weight(edge.target()))
            .map(|block| block.id)
    }

    /// The parent of `child` and the link that holds it.
    pub fn parent_of(&self, child: BlockId) -> Option<(BlockId, Link)> {
        let idx = *self.index.get(&child)?;
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .next()
            .and_then(|edge| {
                self.graph
                    .node_weight(edge.source())
                    .map(|parent| (parent.id, edge.weight().clone()))
            })
    }

    /// Direct children of `id` with the links holding them.
    pub fn children(&self, id: BlockId) -> Vec<(Link, BlockId)> {
        let Some(&idx) = self.index.get(&id) else {
            return Vec::new();
        };
        let mut children: Vec<(Link, BlockId)> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter_map(|edge| {
                self.graph
                    .node_weight(edge.target())
                    .map(|child| (edge.weight().clone(), child.id))
            })
            .collect();
        children.sort_by_key(|(_, child)| *child);
        children
    }

    /// Returns `true` if `ancestor` is `id` or encloses it.
    pub fn is_ancestor(&self, ancestor: BlockId, id: BlockId) -> bool {
        let mut current = Some(id);
        while let Some(block) = current {
            if block == ancestor {
                return true;
            }
            current = self.parent_of(block).map(|(parent, _)| parent);
        }
        false
    }

    /// The outermost block enclosing `id` (itself if it is top-level).
    pub fn root_of(&self, id: BlockId) -> BlockId {
        let mut current = id;
        while let Some((parent, _)) = self.parent_of(current) {
            current = parent;
        }
        current
    }

    /// `id` and everything attached below it (inputs and following blocks).
    pub fn descendants(&self, id: BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(block) = stack.pop() {
            if !self.contains(block) {
                continue;
            }
            out.push(block);
            stack.extend(self.children(block).into_iter().map(|(_, child)| child));
        }
        out
    }

    // -----------------------------------------------------------------------
    // Procedure index
    // -----------------------------------------------------------------------

    /// Resolves a procedure name (case-insensitively) to its declaration.
    pub fn definition(&self, name: &str) -> Option<BlockId> {
        self.procedures.get(&name_key(name)).copied()
    }

    /// All declaration blocks, in creation order.
    pub fn declarations(&self) -> Vec<BlockId> {
        let mut ids: Vec<BlockId> = self.procedures.values().copied().collect();
        ids.sort();
        ids
    }

    /// Every call block targeting `name`, in creation order.
    pub fn callers(&self, name: &str) -> Vec<BlockId> {
        self.block_ids()
            .into_iter()
            .filter(|&id| {
                self.block(id)
                    .and_then(Block::as_call)
                    .is_some_and(|call| names_equal(call.target(), name))
            })
            .collect()
    }

    pub(crate) fn register_procedure(&mut self, name: &str, decl: BlockId) {
        self.procedures.insert(name_key(name), decl);
    }

    pub(crate) fn unregister_procedure(&mut self, name: &str, decl: BlockId) {
        let key = name_key(name);
        if self.procedures.get(&key) == Some(&decl) {
            self.procedures.remove(&key);
        }
    }

    // -----------------------------------------------------------------------
    // Typed access
    // -----------------------------------------------------------------------

    pub(crate) fn block_mut(&mut self, id: BlockId) -> Result<&mut Block, CoreError> {
        let idx = *self.index.get(&id).ok_or(CoreError::BlockNotFound { id })?;
        self.graph
            .node_weight_mut(idx)
            .ok_or(CoreError::BlockNotFound { id })
    }

    /// Looks up a declaration block's payload.
    pub fn declaration(&self, id: BlockId) -> Result<&ProcedureDecl, CoreError> {
        self.block(id)
            .ok_or(CoreError::BlockNotFound { id })?
            .as_declaration()
            .ok_or(CoreError::NotADeclaration { id })
    }

    pub(crate) fn declaration_mut(&mut self, id: BlockId) -> Result<&mut ProcedureDecl, CoreError> {
        match &mut self.block_mut(id)?.kind {
            BlockKind::Declaration(decl) => Ok(decl),
            _ => Err(CoreError::NotADeclaration { id }),
        }
    }

    /// Looks up a call block's payload.
    pub fn call(&self, id: BlockId) -> Result<&CallSite, CoreError> {
        self.block(id)
            .ok_or(CoreError::BlockNotFound { id })?
            .as_call()
            .ok_or(CoreError::NotACall { id })
    }

    pub(crate) fn call_mut(&mut self, id: BlockId) -> Result<&mut CallSite, CoreError> {
        match &mut self.block_mut(id)?.kind {
            BlockKind::Call(call) => Ok(call),
            _ => Err(CoreError::NotACall { id }),
        }
    }

    // -----------------------------------------------------------------------
    // Block construction and connection primitives
    // -----------------------------------------------------------------------

    pub(crate) fn add_block(&mut self, kind: BlockKind) -> BlockId {
        let id = BlockId(self.next_block_id);
        self.next_block_id += 1;
        let idx = self.graph.add_node(Block::new(id, kind));
        self.index.insert(id, idx);
        self.record(ChangeEvent::Create { block: id });
        id
    }

    /// Adds a block of a kind the procedure machinery does not interpret.
    pub fn add_generic(&mut self, block: GenericBlock) -> BlockId {
        self.add_block(BlockKind::Generic(block))
    }

    /// Sets a field on a generic block, recording a change event.
    pub fn set_field(&mut self, id: BlockId, field: &str, value: &str) -> Result<(), CoreError> {
        let old = match &mut self.block_mut(id)?.kind {
            BlockKind::Generic(generic) => generic
                .fields
                .insert(field.to_string(), value.to_string())
                .unwrap_or_default(),
            _ => return Err(CoreError::NotConnectable { id }),
        };
        self.record(ChangeEvent::Field {
            block: id,
            field: field.to_string(),
            old,
            new: value.to_string(),
        });
        Ok(())
    }

    pub fn set_position(&mut self, id: BlockId, position: Position) -> Result<(), CoreError> {
        self.block_mut(id)?.position = position;
        Ok(())
    }

    pub fn set_collapsed(&mut self, id: BlockId, collapsed: bool) -> Result<(), CoreError> {
        self.block_mut(id)?.collapsed = collapsed;
        Ok(())
    }

    pub fn set_disabled(&mut self, id: BlockId, disabled: bool) -> Result<(), CoreError> {
        self.block_mut(id)?.disabled = disabled;
        Ok(())
    }

    /// Plugs `child` into `parent`'s input `name`.
    ///
    /// `child` is first unplugged from wherever it was. A block already
    /// occupying the input is unplugged, bumped, and returned.
    pub fn connect_input(
        &mut self,
        parent: BlockId,
        name: &str,
        child: BlockId,
    ) -> Result<Option<BlockId>, CoreError> {
        self.attach(parent, Link::input(name), child)
    }

    /// Makes `next` follow `prev` in a statement stack. A block already
    /// following `prev` is unplugged, bumped, and returned.
    pub fn connect_next(&mut self, prev: BlockId, next: BlockId) -> Result<Option<BlockId>, CoreError> {
        self.attach(prev, Link::Next, next)
    }

    fn attach(&mut self, parent: BlockId, link: Link, child: BlockId) -> Result<Option<BlockId>, CoreError> {
        let parent_idx = *self.index.get(&parent).ok_or(CoreError::BlockNotFound { id: parent })?;
        let child_block = self.block(child).ok_or(CoreError::BlockNotFound { id: child })?;
        if !child_block.is_connectable() {
            return Err(CoreError::NotConnectable { id: child });
        }
        if self.is_ancestor(child, parent) {
            return Err(CoreError::ConnectionCycle { parent, child });
        }

        let old_parent = self.unplug(child).map(|(p, _)| p);
        let displaced = match &link {
            Link::Input { name } => self.input_target(parent, name),
            Link::Next => self.next_block(parent),
        };
        if let Some(occupant) = displaced {
            self.unplug(occupant);
            self.bump_neighbours(occupant);
        }

        let child_idx = self.index[&child];
        self.graph.add_edge(parent_idx, child_idx, link);
        self.record(ChangeEvent::Move {
            block: child,
            old_parent,
            new_parent: Some(parent),
        });
        Ok(displaced)
    }

    /// Detaches `child` from its parent, returning the former parent and link.
    pub fn unplug(&mut self, child: BlockId) -> Option<(BlockId, Link)> {
        let idx = *self.index.get(&child)?;
        let edge = self.graph.edges_directed(idx, Direction::Incoming).next()?;
        let (edge_id, source) = (edge.id(), edge.source());
        let parent = self.graph.node_weight(source)?.id;
        let link = self.graph.remove_edge(edge_id)?;
        self.record(ChangeEvent::Move {
            block: child,
            old_parent: Some(parent),
            new_parent: None,
        });
        Some((parent, link))
    }

    /// Moves a freshly detached block away from its former neighbours. A
    /// pure layout side effect.
    pub fn bump_neighbours(&mut self, id: BlockId) {
        if let Ok(block) = self.block_mut(id) {
            block.position.x += BUMP_DELTA;
            block.position.y += BUMP_DELTA;
        }
    }

    /// Disposes `id` and everything attached below it.
    ///
    /// Disposing a declaration first disposes every call to it elsewhere in
    /// the workspace. Returns all removed block IDs.
    pub fn dispose(&mut self, id: BlockId) -> Result<Vec<BlockId>, CoreError> {
        if !self.contains(id) {
            return Err(CoreError::BlockNotFound { id });
        }
        let subtree = self.descendants(id);
        let mut removed = Vec::new();

        let declared: Vec<String> = subtree
            .iter()
            .filter_map(|&b| self.block(b).and_then(Block::as_declaration))
            .map(|decl| decl.name().to_string())
            .collect();
        for name in declared {
            for caller in self.callers(&name) {
                if !subtree.contains(&caller) && self.contains(caller) {
                    tracing::debug!(procedure = %name, caller = %caller, "disposing caller");
                    removed.extend(self.remove_healing_stack(caller));
                }
            }
        }
        removed.extend(self.remove_subtree(id));
        Ok(removed)
    }

    /// Removes `id` and its inputs but keeps the blocks following it: they
    /// take its place under its former parent.
    fn remove_healing_stack(&mut self, id: BlockId) -> Vec<BlockId> {
        let parent = self.parent_of(id);
        let next = self.next_block(id);
        if let Some(next) = next {
            self.unplug(next);
        }
        let removed = self.remove_subtree(id);
        if let (Some(next), Some((parent, link))) = (next, parent) {
            if let Err(err) = self.attach(parent, link, next) {
                tracing::warn!(block = %next, error = %err, "cannot heal stack");
            }
        }
        removed
    }

    fn remove_subtree(&mut self, id: BlockId) -> Vec<BlockId> {
        self.unplug(id);
        let subtree = self.descendants(id);
        for &block in &subtree {
            let Some(idx) = self.index.remove(&block) else {
                continue;
            };
            if let Some(removed) = self.graph.remove_node(idx) {
                if let BlockKind::Declaration(decl) = &removed.kind {
                    self.unregister_procedure(decl.name(), block);
                }
            }
            self.record(ChangeEvent::Delete { block });
        }
        subtree
    }

    // -----------------------------------------------------------------------
    // Change events
    // -----------------------------------------------------------------------

    /// All recorded change events, oldest first.
    pub fn events(&self) -> &[ChangeEvent] {
        &self.events
    }

    /// Drains the recorded change events.
    pub fn take_events(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn record(&mut self, event: ChangeEvent) {
        if self.silence_depth == 0 {
            self.events.push(event);
        }
    }

    /// Runs `f` with event recording suppressed. Used for derived updates
    /// that are not edits in their own right.
    pub(crate) fn silenced<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.silence_depth += 1;
        let out = f(self);
        self.silence_depth -= 1;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(ws: &mut Workspace, value: &str) -> BlockId {
        ws.add_generic(GenericBlock::new("math_number", true).with_field("NUM", value))
    }

    fn statement(ws: &mut Workspace) -> BlockId {
        ws.add_generic(GenericBlock::new("text_raw", false).with_field("TEXT", "x++;"))
    }

    #[test]
    fn connect_and_query_inputs() {
        let mut ws = Workspace::new();
        let parent = ws.add_generic(GenericBlock::new("math_arithmetic", true));
        let a = number(&mut ws, "1");
        let b = number(&mut ws, "2");

        assert_eq!(ws.connect_input(parent, "A", a).unwrap(), None);
        ws.connect_input(parent, "B", b).unwrap();

        assert_eq!(ws.input_target(parent, "A"), Some(a));
        assert_eq!(ws.input_target(parent, "B"), Some(b));
        assert_eq!(ws.parent_of(a), Some((parent, Link::input("A"))));
        assert_eq!(ws.top_blocks(), vec![parent]);
    }

    #[test]
    fn connecting_into_occupied_input_displaces_occupant() {
        let mut ws = Workspace::new();
        let parent = ws.add_generic(GenericBlock::new("math_arithmetic", true));
        let a = number(&mut ws, "1");
        let b = number(&mut ws, "2");
        ws.connect_input(parent, "A", a).unwrap();

        let displaced = ws.connect_input(parent, "A", b).unwrap();
        assert_eq!(displaced, Some(a));
        assert_eq!(ws.parent_of(a), None);
        assert_eq!(ws.block(a).unwrap().position, Position { x: BUMP_DELTA, y: BUMP_DELTA });
    }

    #[test]
    fn moving_a_child_unplugs_it_first() {
        let mut ws = Workspace::new();
        let p1 = ws.add_generic(GenericBlock::new("math_arithmetic", true));
        let p2 = ws.add_generic(GenericBlock::new("math_arithmetic", true));
        let a = number(&mut ws, "1");
        ws.connect_input(p1, "A", a).unwrap();
        ws.connect_input(p2, "B", a).unwrap();
        assert_eq!(ws.input_target(p1, "A"), None);
        assert_eq!(ws.input_target(p2, "B"), Some(a));
    }

    #[test]
    fn cycles_are_rejected() {
        let mut ws = Workspace::new();
        let outer = ws.add_generic(GenericBlock::new("math_arithmetic", true));
        let inner = ws.add_generic(GenericBlock::new("math_arithmetic", true));
        ws.connect_input(outer, "A", inner).unwrap();
        let err = ws.connect_input(inner, "A", outer).unwrap_err();
        assert!(matches!(err, CoreError::ConnectionCycle { .. }));
    }

    #[test]
    fn statement_stacks_and_dispose() {
        let mut ws = Workspace::new();
        let first = statement(&mut ws);
        let second = statement(&mut ws);
        let third = statement(&mut ws);
        ws.connect_next(first, second).unwrap();
        ws.connect_next(second, third).unwrap();
        assert_eq!(ws.next_block(first), Some(second));
        assert_eq!(ws.root_of(third), first);

        let removed = ws.dispose(second).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(ws.contains(first));
        assert!(!ws.contains(third));
        assert_eq!(ws.next_block(first), None);
    }

    #[test]
    fn block_ids_are_not_reused_after_dispose() {
        let mut ws = Workspace::new();
        let a = number(&mut ws, "1");
        ws.dispose(a).unwrap();
        let b = number(&mut ws, "2");
        assert_ne!(a, b);
        assert!(ws.block(a).is_none());
        assert!(matches!(ws.dispose(a), Err(CoreError::BlockNotFound { .. })));
    }

    #[test]
    fn silenced_updates_record_no_events() {
        let mut ws = Workspace::new();
        let a = number(&mut ws, "1");
        ws.take_events();
        ws.silenced(|ws| ws.set_field(a, "NUM", "5")).unwrap();
        assert!(ws.events().is_empty());
        ws.set_field(a, "NUM", "6").unwrap();
        assert_eq!(
            ws.events(),
            &[ChangeEvent::Field {
                block: a,
                field: "NUM".into(),
                old: "5".into(),
                new: "6".into(),
            }]
        );
    }

    #[test]
    fn deleting_a_declaration_heals_caller_stacks() {
        let mut ws = Workspace::new();
        let decl = ws.add_procedure("gone", false).unwrap();
        let head = statement(&mut ws);
        let call = ws.create_caller(decl).unwrap();
        let tail = statement(&mut ws);
        let after = statement(&mut ws);
        ws.connect_next(head, call).unwrap();
        ws.connect_next(call, tail).unwrap();
        ws.connect_next(tail, after).unwrap();

        let removed = ws.dispose(decl).unwrap();

        assert!(removed.contains(&call));
        assert!(!removed.contains(&tail));
        assert_eq!(ws.next_block(head), Some(tail));
        assert_eq!(ws.next_block(tail), Some(after));
    }

    #[test]
    fn top_level_caller_leaves_its_followers_top_level() {
        let mut ws = Workspace::new();
        let decl = ws.add_procedure("gone", false).unwrap();
        let call = ws.create_caller(decl).unwrap();
        let tail = statement(&mut ws);
        ws.connect_next(call, tail).unwrap();

        ws.dispose(decl).unwrap();

        assert!(ws.contains(tail));
        assert_eq!(ws.parent_of(tail), None);
    }

    #[test]
    fn workspace_survives_a_json_roundtrip() {
        let mut ws = Workspace::new();
        let decl = ws.add_procedure("foo", true).unwrap();
        ws.open_mutator(decl).unwrap().add_param("a").unwrap();
        ws.commit_mutator(decl).unwrap();
        let call = ws.create_caller(decl).unwrap();
        let arg = number(&mut ws, "5");
        ws.connect_input(call, "ARG0", arg).unwrap();

        let json = serde_json::to_string(&ws).unwrap();
        let mut back: Workspace = serde_json::from_str(&json).unwrap();

        assert_eq!(back.definition("foo"), Some(decl));
        assert_eq!(back.input_target(call, "ARG0"), Some(arg));
        assert_eq!(back.call(call).unwrap().slots(), ws.call(call).unwrap().slots());
        let old = back.declaration(decl).unwrap().param_ids()[0];
        assert!(back.issue_param_id() > old);
        assert!(back.add_generic(GenericBlock::new("text_raw", false)) > arg);
    }
}
