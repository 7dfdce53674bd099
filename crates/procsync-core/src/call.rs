//! Call sites and the reconciler that keeps them shaped like their
//! declaration.
//!
//! A call block refers to its procedure by name only. Each argument slot is
//! tagged with the [`ParamId`] of the parameter it currently represents, and
//! the call keeps a cache (`quark_connections`) from identity to the
//! sub-graph last plugged into that parameter's slot. Reconciliation is
//! driven by identities, not names or positions, so a parameter that is
//! renamed and moved in the same edit keeps its argument.
//!
//! Lifecycle: `Uninitialized -> Bound -> [Reconciling <-> Bound]`, or
//! `Orphaned` when no declaration with the target name exists.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::block::{arg_input, BlockKind};
use crate::error::CoreError;
use crate::id::{BlockId, ParamId};
use crate::names::{names_equal, normalize_procedure_name};
use crate::workspace::{ChangeEvent, Workspace};

/// Label placed before the first argument slot.
pub const BEFORE_ARGS: &str = "with:";

/// Where a call block is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    /// Created, not yet resolved against a declaration.
    Uninitialized,
    /// Resolved; slots match the declaration (or a mutator preview of it).
    Bound,
    /// Slots are being rebuilt.
    Reconciling,
    /// No declaration with the target name exists.
    Orphaned,
}

/// One argument socket of a call block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgSlot {
    /// Identity of the parameter this slot represents. `None` until the
    /// call is first bound (e.g. right after loading from XML).
    pub param: Option<ParamId>,
    /// Visible parameter name.
    pub label: String,
}

/// Payload of a call block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSite {
    pub(crate) target: String,
    pub(crate) has_return: bool,
    pub(crate) slots: Vec<ArgSlot>,
    pub(crate) quark_connections: HashMap<ParamId, BlockId>,
    pub(crate) with_label: bool,
    pub(crate) state: CallState,
}

impl CallSite {
    pub(crate) fn new(target: String, has_return: bool, labels: Vec<String>) -> Self {
        let with_label = !labels.is_empty();
        CallSite {
            target,
            has_return,
            slots: labels
                .into_iter()
                .map(|label| ArgSlot { param: None, label })
                .collect(),
            quark_connections: HashMap::new(),
            with_label,
            state: CallState::Uninitialized,
        }
    }

    /// Name of the procedure this block calls.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn has_return(&self) -> bool {
        self.has_return
    }

    pub fn slots(&self) -> &[ArgSlot] {
        &self.slots
    }

    pub fn arg_names(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.label.clone()).collect()
    }

    pub fn arg_count(&self) -> usize {
        self.slots.len()
    }

    /// Whether the `with:` label is shown before the first slot.
    pub fn has_with_label(&self) -> bool {
        self.with_label
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    /// The cached sub-graph for a parameter identity, if any.
    pub fn cached_connection(&self, param: ParamId) -> Option<BlockId> {
        self.quark_connections.get(&param).copied()
    }

    pub(crate) fn rename_labels(&mut self, old: &str, new: &str) -> bool {
        let mut hit = false;
        for slot in self.slots.iter_mut().filter(|s| names_equal(&s.label, old)) {
            slot.label = new.to_string();
            hit = true;
        }
        hit
    }
}

impl Workspace {
    /// Creates a call to `name` and binds it to the declaration if one
    /// exists; the declaration's return flavour wins over `has_return`.
    pub fn add_call(&mut self, name: &str, has_return: bool) -> Result<BlockId, CoreError> {
        let target = normalize_procedure_name(name).ok_or_else(|| CoreError::InvalidName {
            name: name.to_string(),
        })?;
        let id = self.add_block(BlockKind::Call(CallSite::new(target, has_return, Vec::new())));
        self.bind_call(id)?;
        Ok(id)
    }

    /// Creates an unbound call with untracked slots, as read from a
    /// persisted document. Binding happens once the whole document is in.
    pub(crate) fn add_unbound_call(&mut self, name: String, has_return: bool, labels: Vec<String>) -> BlockId {
        self.add_block(BlockKind::Call(CallSite::new(name, has_return, labels)))
    }

    /// Resolves a call against the procedure index and shapes it like the
    /// declaration, or marks it orphaned.
    pub fn bind_call(&mut self, call: BlockId) -> Result<CallState, CoreError> {
        let target = self.call(call)?.target.clone();
        let Some(decl) = self.definition(&target) else {
            self.call_mut(call)?.state = CallState::Orphaned;
            tracing::debug!(call = %call, target = %target, "call has no declaration");
            return Ok(CallState::Orphaned);
        };
        let d = self.declaration(decl)?;
        let (names, ids, has_return) = (d.param_names(), d.param_ids(), d.has_return());
        self.call_mut(call)?.has_return = has_return;
        self.reconcile_call(call, &names, &ids)?;
        let site = self.call_mut(call)?;
        site.state = CallState::Bound;
        Ok(site.state)
    }

    /// The declaration a call currently resolves to.
    pub fn definition_of(&self, call: BlockId) -> Result<Option<BlockId>, CoreError> {
        Ok(self.definition(self.call(call)?.target()))
    }

    /// Reshapes a call's argument slots to `names`/`ids`.
    ///
    /// Sub-graphs follow their parameter identity. A sub-graph whose
    /// parameter disappeared is unplugged and bumped; while the
    /// declaration's mutator is open it stays cached so it comes back if the
    /// parameter is restored. Slot labels are updated without change events.
    pub fn reconcile_call(&mut self, call: BlockId, names: &[String], ids: &[ParamId]) -> Result<(), CoreError> {
        if names.len() != ids.len() {
            tracing::error!(call = %call, names = names.len(), ids = ids.len(), "parameter arity mismatch");
            return Err(CoreError::ArityMismatch {
                names: names.len(),
                ids: ids.len(),
            });
        }
        let target = self.call(call)?.target.clone();
        let mutator_open = self
            .definition(&target)
            .and_then(|decl| self.declaration(decl).ok())
            .is_some_and(|decl| decl.is_mutator_open());

        let site = self.call_mut(call)?;
        if !mutator_open {
            site.quark_connections.clear();
        }
        let names_match = site.slots.len() == names.len()
            && site.slots.iter().zip(names).all(|(slot, name)| slot.label == *name);
        let untracked = site.slots.iter().any(|slot| slot.param.is_none());
        if names_match && (!mutator_open || untracked) {
            for (slot, id) in site.slots.iter_mut().zip(ids) {
                slot.param = Some(*id);
            }
            if site.state == CallState::Uninitialized {
                site.state = CallState::Bound;
            }
            return Ok(());
        }

        site.state = CallState::Reconciling;
        let old_slots = site.slots.clone();
        self.block_mut(call)?.collapsed = false;

        // Park every current argument, keyed by identity where one is known.
        let mut positional: Vec<Option<BlockId>> = Vec::with_capacity(old_slots.len());
        for (i, slot) in old_slots.iter().enumerate() {
            let child = self.input_target(call, &arg_input(i));
            if let Some(child) = child {
                self.unplug(child);
            }
            match (slot.param, child) {
                (Some(param), Some(child)) => {
                    self.call_mut(call)?.quark_connections.insert(param, child);
                    if !ids.contains(&param) {
                        tracing::debug!(call = %call, param = %param, child = %child, "parameter removed, detaching argument");
                        self.bump_neighbours(child);
                    }
                    positional.push(None);
                }
                (Some(param), None) => {
                    // An emptied slot forgets whatever was cached for it.
                    self.call_mut(call)?.quark_connections.remove(&param);
                    positional.push(None);
                }
                (None, child) => positional.push(child),
            }
        }

        let site = self.call_mut(call)?;
        site.slots = names
            .iter()
            .zip(ids)
            .map(|(name, id)| ArgSlot {
                param: Some(*id),
                label: name.clone(),
            })
            .collect();
        site.with_label = !site.slots.is_empty();

        // Reattach by identity, falling back to position for untracked slots.
        for (i, param) in ids.iter().enumerate() {
            let cached = self.call(call)?.quark_connections.get(param).copied();
            let candidate = cached.or_else(|| positional.get_mut(i).and_then(Option::take));
            let Some(child) = candidate else {
                continue;
            };
            let attached = self.contains(child)
                && self.parent_of(child).is_none()
                && match self.connect_input(call, &arg_input(i), child) {
                    Ok(_) => true,
                    Err(err) => {
                        tracing::warn!(call = %call, child = %child, error = %err, "cannot reattach argument");
                        false
                    }
                };
            if attached {
                continue;
            }
            if cached.is_some() {
                tracing::warn!(call = %call, param = %param, "dropping stale cached argument");
                self.call_mut(call)?.quark_connections.remove(param);
            } else if self.contains(child) && self.parent_of(child).is_none() {
                self.bump_neighbours(child);
            }
        }
        for leftover in positional.into_iter().flatten() {
            if self.contains(leftover) && self.parent_of(leftover).is_none() {
                self.bump_neighbours(leftover);
            }
        }

        let site = self.call_mut(call)?;
        if !mutator_open {
            site.quark_connections.clear();
        }
        site.state = CallState::Bound;
        self.record(ChangeEvent::Mutation { block: call });
        Ok(())
    }

    /// Fills a call's connection cache from its current slots. Called when
    /// the declaration's mutator opens.
    pub(crate) fn init_connection_cache(&mut self, call: BlockId) -> Result<(), CoreError> {
        let slots = self.call(call)?.slots.clone();
        let mut cache = HashMap::new();
        for (i, slot) in slots.iter().enumerate() {
            if let (Some(param), Some(child)) = (slot.param, self.input_target(call, &arg_input(i))) {
                cache.insert(param, child);
            }
        }
        self.call_mut(call)?.quark_connections = cache;
        Ok(())
    }

    /// Empties a call's connection cache. Called when the mutator closes.
    pub(crate) fn clear_connection_cache(&mut self, call: BlockId) -> Result<(), CoreError> {
        self.call_mut(call)?.quark_connections.clear();
        Ok(())
    }

    /// Points a call at `new` if it currently targets `old`
    /// (case-insensitively). Slots are left alone. Returns whether the call
    /// was updated.
    pub fn rename_procedure_reference(&mut self, call: BlockId, old: &str, new: &str) -> Result<bool, CoreError> {
        let site = self.call_mut(call)?;
        if !names_equal(old, &site.target) {
            return Ok(false);
        }
        let previous = std::mem::replace(&mut site.target, new.to_string());
        self.record(ChangeEvent::Field {
            block: call,
            field: crate::block::NAME_FIELD.to_string(),
            old: previous,
            new: new.to_string(),
        });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::GenericBlock;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn number(ws: &mut Workspace, value: &str) -> BlockId {
        ws.add_generic(GenericBlock::new("math_number", true).with_field("NUM", value))
    }

    #[test]
    fn call_without_declaration_is_orphaned() {
        let mut ws = Workspace::new();
        let call = ws.add_call("missing", false).unwrap();
        assert_eq!(ws.call(call).unwrap().state(), CallState::Orphaned);
        assert_eq!(ws.definition_of(call).unwrap(), None);
    }

    #[test]
    fn declaring_the_procedure_binds_orphans() {
        let mut ws = Workspace::new();
        let call = ws.add_call("later", false).unwrap();
        let decl = ws.add_procedure("later", true).unwrap();
        let site = ws.call(call).unwrap();
        assert_eq!(site.state(), CallState::Bound);
        assert!(site.has_return());
        assert_eq!(ws.definition_of(call).unwrap(), Some(decl));
    }

    #[test]
    fn new_call_adopts_declaration_shape() {
        let mut ws = Workspace::new();
        let decl = ws.add_procedure("foo", false).unwrap();
        let ids = ws.param_ids.issue_many(2);
        ws.set_parameters(decl, &names(&["a", "b"]), &ids).unwrap();

        let call = ws.create_caller(decl).unwrap();
        let site = ws.call(call).unwrap();
        assert_eq!(site.arg_names(), names(&["a", "b"]));
        assert_eq!(site.slots()[1].param, Some(ids[1]));
        assert!(site.has_with_label());
    }

    #[test]
    fn reconcile_rejects_mismatched_lengths() {
        let mut ws = Workspace::new();
        let decl = ws.add_procedure("foo", false).unwrap();
        let call = ws.create_caller(decl).unwrap();
        let err = ws.reconcile_call(call, &names(&["a"]), &[]).unwrap_err();
        assert!(matches!(err, CoreError::ArityMismatch { names: 1, ids: 0 }));
    }

    #[test]
    fn reorder_and_rename_keep_arguments_by_identity() {
        let mut ws = Workspace::new();
        let decl = ws.add_procedure("foo", false).unwrap();
        let ids = ws.param_ids.issue_many(2);
        ws.set_parameters(decl, &names(&["a", "b"]), &ids).unwrap();
        let call = ws.create_caller(decl).unwrap();
        let one = number(&mut ws, "1");
        let two = number(&mut ws, "2");
        ws.connect_input(call, "ARG0", one).unwrap();
        ws.connect_input(call, "ARG1", two).unwrap();

        ws.set_parameters(decl, &names(&["second", "a"]), &[ids[1], ids[0]]).unwrap();

        assert_eq!(ws.input_target(call, "ARG0"), Some(two));
        assert_eq!(ws.input_target(call, "ARG1"), Some(one));
        assert_eq!(ws.call(call).unwrap().arg_names(), names(&["second", "a"]));
    }

    #[test]
    fn removed_parameter_detaches_its_argument() {
        let mut ws = Workspace::new();
        let decl = ws.add_procedure("foo", false).unwrap();
        let ids = ws.param_ids.issue_many(2);
        ws.set_parameters(decl, &names(&["a", "b"]), &ids).unwrap();
        let call = ws.create_caller(decl).unwrap();
        let one = number(&mut ws, "1");
        ws.connect_input(call, "ARG0", one).unwrap();

        ws.set_parameters(decl, &names(&["b"]), &ids[1..]).unwrap();

        let site = ws.call(call).unwrap();
        assert_eq!(site.arg_count(), 1);
        assert!(ws.contains(one));
        assert_eq!(ws.parent_of(one), None);
        assert_eq!(site.cached_connection(ids[0]), None);
    }

    #[test]
    fn with_label_follows_parameter_count() {
        let mut ws = Workspace::new();
        let decl = ws.add_procedure("foo", false).unwrap();
        let call = ws.create_caller(decl).unwrap();
        assert!(!ws.call(call).unwrap().has_with_label());

        let ids = ws.param_ids.issue_many(1);
        ws.set_parameters(decl, &names(&["a"]), &ids).unwrap();
        assert!(ws.call(call).unwrap().has_with_label());

        ws.set_parameters(decl, &[], &[]).unwrap();
        assert!(!ws.call(call).unwrap().has_with_label());
    }

    #[test]
    fn reshaping_expands_and_does_not_record_label_edits() {
        let mut ws = Workspace::new();
        let decl = ws.add_procedure("foo", false).unwrap();
        let call = ws.create_caller(decl).unwrap();
        ws.set_collapsed(call, true).unwrap();
        ws.take_events();

        let ids = ws.param_ids.issue_many(1);
        ws.set_parameters(decl, &names(&["a"]), &ids).unwrap();

        assert!(!ws.block(call).unwrap().collapsed);
        assert!(ws
            .events()
            .iter()
            .all(|event| !matches!(event, ChangeEvent::Field { .. })));
    }

    #[test]
    fn untracked_slots_keep_arguments_by_position() {
        let mut ws = Workspace::new();
        let decl = ws.add_procedure("foo", false).unwrap();
        let ids = ws.param_ids.issue_many(2);
        ws.set_parameters(decl, &names(&["a", "b"]), &ids).unwrap();

        let call = ws.add_unbound_call("foo".into(), false, names(&["x", "y", "z"]));
        let one = number(&mut ws, "1");
        let three = number(&mut ws, "3");
        ws.connect_input(call, "ARG0", one).unwrap();
        ws.connect_input(call, "ARG2", three).unwrap();

        ws.bind_call(call).unwrap();
        assert_eq!(ws.call(call).unwrap().arg_names(), names(&["a", "b"]));
        assert_eq!(ws.input_target(call, "ARG0"), Some(one));
        assert_eq!(ws.parent_of(three), None);
    }

    #[test]
    fn rename_reference_is_case_insensitive() {
        let mut ws = Workspace::new();
        let call = ws.add_call("Foo", false).unwrap();
        assert!(!ws.rename_procedure_reference(call, "bar", "baz").unwrap());
        assert!(ws.rename_procedure_reference(call, "foo", "qux").unwrap());
        assert_eq!(ws.call(call).unwrap().target(), "qux");
    }

    #[test]
    fn renaming_declaration_follows_to_callers() {
        let mut ws = Workspace::new();
        let decl = ws.add_procedure("foo", false).unwrap();
        let call = ws.create_caller(decl).unwrap();
        let other = ws.add_call("other", false).unwrap();
        ws.rename_procedure(decl, "bar").unwrap();
        assert_eq!(ws.call(call).unwrap().target(), "bar");
        assert_eq!(ws.call(other).unwrap().target(), "other");
        assert_eq!(ws.callers("bar"), vec![call]);
    }
}
