//! Procedure declarations: the authoritative parameter list of a procedure.
//!
//! [`ProcedureDecl`] is the payload of a declaration block. It owns the
//! ordered [`ParamDescriptor`] list; every call site refers to it by name
//! only and is reshaped whenever the list changes (see [`crate::call`]).
//!
//! Duplicate parameter names are a soft error: the declaration carries a
//! warning, editing continues, and code generation refuses to emit it.

use serde::{Deserialize, Serialize};

use crate::block::{Block, BlockKind, GenericBlock, NAME_FIELD, STACK_INPUT, VAR_FIELD};
use crate::call::CallState;
use crate::error::CoreError;
use crate::id::{BlockId, ParamId};
use crate::mutator::OpenMutator;
use crate::names::{find_legal_name, name_key, names_equal, normalize_procedure_name};
use crate::param::{has_duplicate_names, ParamDescriptor};
use crate::workspace::{ChangeEvent, Workspace};

/// Label text placed before the parameter list of a declaration.
pub const BEFORE_PARAMS: &str = "with:";

/// Warning shown on a declaration whose parameters collide.
pub const DUPLICATE_WARNING: &str = "Warning: This function has duplicate parameters.";

/// Name given to procedures created without one.
pub const DEFAULT_PROCEDURE_NAME: &str = "do something";

/// Name, parameter names and return flavour of a procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub params: Vec<String>,
    pub has_return: bool,
}

/// Payload of a declaration block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureDecl {
    pub(crate) name: String,
    pub(crate) params: Vec<ParamDescriptor>,
    pub(crate) has_body: bool,
    pub(crate) has_return: bool,
    pub(crate) duplicate_params: bool,
    /// Rendered parameter list, e.g. `with: a, b`. Derived from `params`.
    pub(crate) params_label: String,
    /// Statement stack detached while the body was switched off.
    pub(crate) stashed_body: Option<BlockId>,
    pub(crate) mutator: Option<OpenMutator>,
}

impl ProcedureDecl {
    pub(crate) fn new(name: String, has_return: bool) -> Self {
        ProcedureDecl {
            name,
            params: Vec::new(),
            has_body: true,
            has_return,
            duplicate_params: false,
            params_label: String::new(),
            stashed_body: None,
            mutator: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ParamDescriptor] {
        &self.params
    }

    pub fn param_names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.name.clone()).collect()
    }

    pub fn param_ids(&self) -> Vec<ParamId> {
        self.params.iter().map(|p| p.id).collect()
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn has_body(&self) -> bool {
        self.has_body
    }

    pub fn has_return(&self) -> bool {
        self.has_return
    }

    pub fn has_duplicate_params(&self) -> bool {
        self.duplicate_params
    }

    /// The visible warning, if any.
    pub fn warning(&self) -> Option<&'static str> {
        self.duplicate_params.then_some(DUPLICATE_WARNING)
    }

    pub fn params_label(&self) -> &str {
        &self.params_label
    }

    pub fn is_mutator_open(&self) -> bool {
        self.mutator.is_some()
    }

    pub fn signature(&self) -> Signature {
        Signature {
            name: self.name.clone(),
            params: self.param_names(),
            has_return: self.has_return,
        }
    }

    /// Recomputes the duplicate warning and the parameter label.
    pub(crate) fn refresh_params(&mut self) {
        self.duplicate_params = has_duplicate_names(self.params.iter().map(|p| p.name.as_str()));
        self.params_label = if self.params.is_empty() {
            String::new()
        } else {
            format!("{BEFORE_PARAMS} {}", self.param_names().join(", "))
        };
    }
}

impl Workspace {
    /// Creates a declaration with a legal, unique name, a statement body
    /// and no parameters. Orphaned calls to that name are bound to it.
    pub fn add_procedure(&mut self, name: &str, has_return: bool) -> Result<BlockId, CoreError> {
        let name = normalize_procedure_name(name).unwrap_or_else(|| DEFAULT_PROCEDURE_NAME.to_string());
        let legal = self.legal_procedure_name(&name, None);
        let id = self.add_block(BlockKind::Declaration(ProcedureDecl::new(legal.clone(), has_return)));
        self.register_procedure(&legal, id);
        self.bind_orphans(&legal)?;
        Ok(id)
    }

    /// Renames a declaration and every call referring to it.
    ///
    /// Returns the name actually used: collisions with other procedures
    /// (compared case-insensitively) get a numeric suffix.
    pub fn rename_procedure(&mut self, decl: BlockId, new_name: &str) -> Result<String, CoreError> {
        let proposed = normalize_procedure_name(new_name).ok_or_else(|| CoreError::InvalidName {
            name: new_name.to_string(),
        })?;
        let old = self.declaration(decl)?.name.clone();
        let legal = self.legal_procedure_name(&proposed, Some(decl));
        if legal == old {
            return Ok(legal);
        }

        // The index must be current before any caller resolves its target.
        self.unregister_procedure(&old, decl);
        self.register_procedure(&legal, decl);
        self.declaration_mut(decl)?.name = legal.clone();
        self.record(ChangeEvent::Field {
            block: decl,
            field: NAME_FIELD.to_string(),
            old: old.clone(),
            new: legal.clone(),
        });

        for caller in self.callers(&old) {
            self.rename_procedure_reference(caller, &old, &legal)?;
        }
        self.bind_orphans(&legal)?;
        tracing::debug!(old = %old, new = %legal, "renamed procedure");
        Ok(legal)
    }

    pub(crate) fn legal_procedure_name(&self, name: &str, exclude: Option<BlockId>) -> String {
        find_legal_name(name, |candidate| {
            self.definition(candidate)
                .is_some_and(|existing| Some(existing) != exclude)
        })
    }

    /// Replaces a declaration's parameters and reshapes every caller.
    ///
    /// `names` and `ids` must have the same length. An unchanged name
    /// sequence only refreshes identities. All callers are reconciled before
    /// this returns.
    pub fn set_parameters(&mut self, decl: BlockId, names: &[String], ids: &[ParamId]) -> Result<(), CoreError> {
        if names.len() != ids.len() {
            tracing::error!(decl = %decl, names = names.len(), ids = ids.len(), "parameter arity mismatch");
            return Err(CoreError::ArityMismatch {
                names: names.len(),
                ids: ids.len(),
            });
        }

        let d = self.declaration_mut(decl)?;
        let unchanged = d.params.len() == names.len()
            && d.params.iter().zip(names).all(|(p, n)| p.name == *n);
        d.params = names
            .iter()
            .zip(ids)
            .map(|(name, id)| ParamDescriptor::new(*id, name.clone()))
            .collect();
        let target = d.name.clone();

        if !unchanged {
            // The label is derived from the parameters: not an edit of its own.
            self.silenced(|ws| ws.declaration_mut(decl).map(ProcedureDecl::refresh_params))?;
            let d = self.declaration(decl)?;
            if d.duplicate_params {
                tracing::warn!(procedure = %target, params = ?names, "duplicate parameter names");
            }
            self.record(ChangeEvent::Mutation { block: decl });
        }

        // Every caller is reshaped even if one of them fails.
        let mut first_err = None;
        for caller in self.callers(&target) {
            if let Err(err) = self.reconcile_call(caller, names, ids) {
                tracing::error!(procedure = %target, caller = %caller, error = %err, "caller reconciliation failed");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Shows or hides the statement body.
    ///
    /// Hiding detaches the body and keeps it aside; showing it again puts
    /// the same stack back if it still exists and is unattached.
    pub fn set_has_body(&mut self, decl: BlockId, has_body: bool) -> Result<(), CoreError> {
        if self.declaration(decl)?.has_body == has_body {
            return Ok(());
        }
        if has_body {
            let stash = {
                let d = self.declaration_mut(decl)?;
                d.has_body = true;
                d.stashed_body.take()
            };
            if let Some(stack) = stash {
                if self.contains(stack) && self.parent_of(stack).is_none() {
                    self.connect_input(decl, STACK_INPUT, stack)?;
                }
            }
        } else {
            let body = self.input_target(decl, STACK_INPUT);
            if let Some(stack) = body {
                self.unplug(stack);
                self.bump_neighbours(stack);
            }
            let d = self.declaration_mut(decl)?;
            d.stashed_body = body;
            d.has_body = false;
        }
        self.record(ChangeEvent::Mutation { block: decl });
        Ok(())
    }

    /// Name, parameter names and return flavour of a declaration.
    pub fn signature(&self, decl: BlockId) -> Result<Signature, CoreError> {
        Ok(self.declaration(decl)?.signature())
    }

    /// Deletes a declaration after deleting every call to it.
    pub fn delete_procedure(&mut self, decl: BlockId) -> Result<Vec<BlockId>, CoreError> {
        self.declaration(decl)?;
        self.dispose(decl)
    }

    /// Renames a variable everywhere it is referenced: declaration
    /// parameters (and open mutator rows), call slot labels, and the `VAR`
    /// field of generic blocks. Returns the blocks that changed.
    pub fn rename_variable(&mut self, old: &str, new: &str) -> Result<Vec<BlockId>, CoreError> {
        let mut changed = Vec::new();
        for id in self.block_ids() {
            let touched = match &mut self.block_mut(id)?.kind {
                BlockKind::Declaration(decl) => {
                    let mut hit = false;
                    for param in decl.params.iter_mut().filter(|p| names_equal(&p.name, old)) {
                        param.name = new.to_string();
                        hit = true;
                    }
                    if hit {
                        decl.refresh_params();
                        if let Some(open) = decl.mutator.as_mut() {
                            open.session.rename_matching(old, new);
                        }
                    }
                    hit
                }
                BlockKind::Call(call) => call.rename_labels(old, new),
                BlockKind::Generic(generic) => match generic.fields.get_mut(VAR_FIELD) {
                    Some(var) if names_equal(var, old) => {
                        *var = new.to_string();
                        true
                    }
                    _ => false,
                },
            };
            if touched {
                self.record(ChangeEvent::Mutation { block: id });
                changed.push(id);
            }
        }
        Ok(changed)
    }

    /// Creates a call block bound to `decl`.
    pub fn create_caller(&mut self, decl: BlockId) -> Result<BlockId, CoreError> {
        let d = self.declaration(decl)?;
        let (name, has_return) = (d.name.clone(), d.has_return);
        self.add_call(&name, has_return)
    }

    /// Creates a `variables_get` block reading parameter `index` of `decl`.
    pub fn create_param_getter(&mut self, decl: BlockId, index: usize) -> Result<BlockId, CoreError> {
        let d = self.declaration(decl)?;
        let param = d.params.get(index).ok_or(CoreError::RowOutOfRange {
            index,
            len: d.params.len(),
        })?;
        let getter = GenericBlock::new("variables_get", true).with_field(VAR_FIELD, param.name.clone());
        Ok(self.add_generic(getter))
    }

    /// Signatures of every declared procedure, split into procedures without
    /// and with a return value, each sorted case-insensitively by name.
    pub fn all_procedures(&self) -> (Vec<Signature>, Vec<Signature>) {
        let (mut with_return, mut without): (Vec<Signature>, Vec<Signature>) = self
            .declarations()
            .into_iter()
            .filter_map(|id| self.block(id).and_then(Block::as_declaration))
            .map(ProcedureDecl::signature)
            .partition(|sig| sig.has_return);
        without.sort_by_key(|sig| name_key(&sig.name));
        with_return.sort_by_key(|sig| name_key(&sig.name));
        (without, with_return)
    }

    /// Binds every orphaned call targeting `name` to its declaration.
    pub(crate) fn bind_orphans(&mut self, name: &str) -> Result<(), CoreError> {
        for caller in self.callers(name) {
            if self.call(caller)?.state() == CallState::Orphaned {
                self.bind_call(caller)?;
            }
        }
        Ok(())
    }
}
