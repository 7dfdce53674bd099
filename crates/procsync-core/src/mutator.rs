//! Mutator sessions: in-progress edits of a procedure's parameter list.
//!
//! A session is opened on a declaration, edited row by row, previewed on
//! the declaration and its callers with [`Workspace::apply_mutator`], and
//! finally committed or cancelled. Rows that existed when the session
//! opened keep their parameter identity; new rows receive a fresh identity
//! the first time they are applied and keep it for the rest of the session.
//! A row removed and attached again keeps its identity, a row removed and
//! re-added by name does not.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::{BlockId, ParamId};
use crate::names::{names_equal, normalize_param_name};
use crate::param::ParamDescriptor;
use crate::procedure::Signature;
use crate::workspace::Workspace;

/// Identity source of a session row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowKey {
    /// The parameter existed when the session opened.
    Existing(ParamId),
    /// Added during the session; numbered per session.
    New(u32),
}

/// One parameter row of an open mutator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRow {
    pub name: String,
    pub key: RowKey,
}

/// The editable state of an open mutator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutatorSession {
    rows: Vec<SessionRow>,
    has_body: bool,
    statements_editable: bool,
    next_new: u32,
}

impl MutatorSession {
    fn from_declaration(params: &[ParamDescriptor], has_body: bool, has_return: bool) -> Self {
        MutatorSession {
            rows: params
                .iter()
                .map(|p| SessionRow {
                    name: p.name.clone(),
                    key: RowKey::Existing(p.id),
                })
                .collect(),
            has_body,
            statements_editable: has_return,
            next_new: 0,
        }
    }

    pub fn rows(&self) -> &[SessionRow] {
        &self.rows
    }

    pub fn row_names(&self) -> Vec<String> {
        self.rows.iter().map(|row| row.name.clone()).collect()
    }

    pub fn has_body(&self) -> bool {
        self.has_body
    }

    /// The statement toggle is only offered on procedures with a return
    /// value; the others always have a body.
    pub fn statements_editable(&self) -> bool {
        self.statements_editable
    }

    /// Appends a new parameter row. Returns its index.
    pub fn add_param(&mut self, name: &str) -> Result<usize, CoreError> {
        let index = self.rows.len();
        self.insert_param(index, name)?;
        Ok(index)
    }

    /// Inserts a new parameter row at `index`.
    pub fn insert_param(&mut self, index: usize, name: &str) -> Result<(), CoreError> {
        if index > self.rows.len() {
            return Err(CoreError::RowOutOfRange {
                index,
                len: self.rows.len(),
            });
        }
        let name = normalize_param_name(name).ok_or_else(|| CoreError::InvalidName {
            name: name.to_string(),
        })?;
        let key = RowKey::New(self.next_new);
        self.next_new += 1;
        self.rows.insert(index, SessionRow { name, key });
        Ok(())
    }

    pub fn rename_param(&mut self, index: usize, name: &str) -> Result<(), CoreError> {
        let len = self.rows.len();
        let name = normalize_param_name(name).ok_or_else(|| CoreError::InvalidName {
            name: name.to_string(),
        })?;
        let row = self
            .rows
            .get_mut(index)
            .ok_or(CoreError::RowOutOfRange { index, len })?;
        row.name = name;
        Ok(())
    }

    /// Moves the row at `from` so that it ends up at index `to`.
    pub fn move_param(&mut self, from: usize, to: usize) -> Result<(), CoreError> {
        let len = self.rows.len();
        if from >= len || to >= len {
            return Err(CoreError::RowOutOfRange {
                index: from.max(to),
                len,
            });
        }
        let row = self.rows.remove(from);
        self.rows.insert(to, row);
        Ok(())
    }

    /// Takes a row out of the list. Attaching the returned row again with
    /// [`attach_param`](Self::attach_param) restores its identity.
    pub fn remove_param(&mut self, index: usize) -> Result<SessionRow, CoreError> {
        if index >= self.rows.len() {
            return Err(CoreError::RowOutOfRange {
                index,
                len: self.rows.len(),
            });
        }
        Ok(self.rows.remove(index))
    }

    pub fn attach_param(&mut self, index: usize, row: SessionRow) -> Result<(), CoreError> {
        if index > self.rows.len() {
            return Err(CoreError::RowOutOfRange {
                index,
                len: self.rows.len(),
            });
        }
        self.rows.insert(index, row);
        Ok(())
    }

    /// Returns `false` (and changes nothing) if the toggle is not offered.
    pub fn set_has_body(&mut self, has_body: bool) -> bool {
        if !self.statements_editable {
            return false;
        }
        self.has_body = has_body;
        true
    }

    pub(crate) fn rename_matching(&mut self, old: &str, new: &str) {
        for row in self.rows.iter_mut().filter(|row| names_equal(&row.name, old)) {
            row.name = new.to_string();
        }
    }
}

/// Mutator state kept on a declaration while a session is open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct OpenMutator {
    pub(crate) session: MutatorSession,
    /// Committed parameters at open time, restored on cancel.
    snapshot: Vec<ParamDescriptor>,
    snapshot_has_body: bool,
    /// Identities issued to rows added during this session.
    provisional: HashMap<u32, ParamId>,
}

impl Workspace {
    /// Opens a mutator on `decl` and primes every caller's connection cache
    /// so arguments survive previews.
    pub fn open_mutator(&mut self, decl: BlockId) -> Result<&mut MutatorSession, CoreError> {
        let d = self.declaration(decl)?;
        if d.is_mutator_open() {
            return Err(CoreError::MutatorAlreadyOpen { id: decl });
        }
        let open = OpenMutator {
            session: MutatorSession::from_declaration(&d.params, d.has_body, d.has_return),
            snapshot: d.params.clone(),
            snapshot_has_body: d.has_body,
            provisional: HashMap::new(),
        };
        let name = d.name.clone();
        self.declaration_mut(decl)?.mutator = Some(open);

        for caller in self.callers(&name) {
            self.init_connection_cache(caller)?;
        }
        tracing::debug!(procedure = %name, "mutator opened");
        self.mutator_mut(decl)
    }

    pub fn mutator(&self, decl: BlockId) -> Result<&MutatorSession, CoreError> {
        self.declaration(decl)?
            .mutator
            .as_ref()
            .map(|open| &open.session)
            .ok_or(CoreError::MutatorNotOpen { id: decl })
    }

    pub fn mutator_mut(&mut self, decl: BlockId) -> Result<&mut MutatorSession, CoreError> {
        self.declaration_mut(decl)?
            .mutator
            .as_mut()
            .map(|open| &mut open.session)
            .ok_or(CoreError::MutatorNotOpen { id: decl })
    }

    /// Pushes the session's current rows to the declaration and its callers
    /// while the mutator stays open.
    pub fn apply_mutator(&mut self, decl: BlockId) -> Result<(), CoreError> {
        let (rows, has_body, editable, mut provisional) = {
            let open = self
                .declaration(decl)?
                .mutator
                .as_ref()
                .ok_or(CoreError::MutatorNotOpen { id: decl })?;
            (
                open.session.rows.clone(),
                open.session.has_body,
                open.session.statements_editable,
                open.provisional.clone(),
            )
        };

        let mut names = Vec::with_capacity(rows.len());
        let mut ids = Vec::with_capacity(rows.len());
        for row in &rows {
            let id = match row.key {
                RowKey::Existing(id) => id,
                RowKey::New(n) => *provisional.entry(n).or_insert_with(|| self.param_ids.issue()),
            };
            names.push(row.name.clone());
            ids.push(id);
        }
        if let Some(open) = self.declaration_mut(decl)?.mutator.as_mut() {
            open.provisional = provisional;
        }

        self.set_parameters(decl, &names, &ids)?;
        if editable {
            self.set_has_body(decl, has_body)?;
        }
        Ok(())
    }

    /// Applies the session and closes the mutator. Callers drop their
    /// connection caches.
    pub fn commit_mutator(&mut self, decl: BlockId) -> Result<Signature, CoreError> {
        self.apply_mutator(decl)?;
        self.close_mutator(decl)?;
        self.signature(decl)
    }

    /// Discards the session, restoring the parameters and body the
    /// declaration had when the mutator opened.
    pub fn cancel_mutator(&mut self, decl: BlockId) -> Result<(), CoreError> {
        let (snapshot, snapshot_has_body) = {
            let open = self
                .declaration(decl)?
                .mutator
                .as_ref()
                .ok_or(CoreError::MutatorNotOpen { id: decl })?;
            (open.snapshot.clone(), open.snapshot_has_body)
        };
        let names: Vec<String> = snapshot.iter().map(|p| p.name.clone()).collect();
        let ids: Vec<ParamId> = snapshot.iter().map(|p| p.id).collect();

        // Restore while still open so cached arguments find their way back.
        self.set_parameters(decl, &names, &ids)?;
        self.set_has_body(decl, snapshot_has_body)?;
        self.close_mutator(decl)
    }

    fn close_mutator(&mut self, decl: BlockId) -> Result<(), CoreError> {
        let d = self.declaration_mut(decl)?;
        d.mutator = None;
        let name = d.name.clone();
        for caller in self.callers(&name) {
            self.clear_connection_cache(caller)?;
        }
        tracing::debug!(procedure = %name, "mutator closed");
        Ok(())
    }
}
