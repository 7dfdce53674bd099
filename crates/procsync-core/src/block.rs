//! Block wrappers and link kinds for the workspace graph.
//!
//! Every block in a workspace is a [`Block`]: a [`BlockKind`] payload plus
//! editor-level metadata (position, collapsed, disabled). Procedure
//! declarations and calls carry their own payloads; every other block kind
//! is an opaque [`GenericBlock`] that only the code templates interpret.
//!
//! Links ([`Link`]) always point from parent to child: a value or statement
//! input of the parent holds the child, or the child follows the parent in a
//! statement stack.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::call::CallSite;
use crate::id::BlockId;
use crate::procedure::ProcedureDecl;

/// Block type of a declaration without a return value.
pub const DEF_NO_RETURN: &str = "procedures_defnoreturn";
/// Block type of a declaration with a return value.
pub const DEF_RETURN: &str = "procedures_defreturn";
/// Block type of a statement call.
pub const CALL_NO_RETURN: &str = "procedures_callnoreturn";
/// Block type of an expression call.
pub const CALL_RETURN: &str = "procedures_callreturn";
/// Block type of the conditional early return.
pub const IF_RETURN: &str = "procedures_ifreturn";

/// Statement input of a declaration.
pub const STACK_INPUT: &str = "STACK";
/// Value input of a declaration with a return value.
pub const RETURN_INPUT: &str = "RETURN";
/// Field holding a procedure's name.
pub const NAME_FIELD: &str = "NAME";
/// Field holding a variable reference on generic blocks.
pub const VAR_FIELD: &str = "VAR";

/// Name of the value input carrying argument `index` on a call block.
pub fn arg_input(index: usize) -> String {
    format!("ARG{index}")
}

/// Distance a detached block is moved away from its former parent.
pub const BUMP_DELTA: i32 = 25;

/// Workspace coordinates of a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

/// Edge kinds in the workspace graph. Parent -> child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Link {
    /// The child is plugged into the parent's named input.
    Input { name: String },
    /// The child follows the parent in a statement stack.
    Next,
}

impl Link {
    pub fn input(name: impl Into<String>) -> Self {
        Link::Input { name: name.into() }
    }

    /// Returns the input name, or `None` for a `Next` link.
    pub fn input_name(&self) -> Option<&str> {
        match self {
            Link::Input { name } => Some(name),
            Link::Next => None,
        }
    }
}

/// Any block kind the procedure machinery does not own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericBlock {
    /// Block type, e.g. `math_number`.
    pub type_name: String,
    /// Field values by field name, in declaration order.
    pub fields: IndexMap<String, String>,
    /// `true` for value blocks, `false` for statement blocks.
    pub output: bool,
}

impl GenericBlock {
    pub fn new(type_name: impl Into<String>, output: bool) -> Self {
        GenericBlock {
            type_name: type_name.into(),
            fields: IndexMap::new(),
            output,
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// The payload of a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BlockKind {
    Declaration(ProcedureDecl),
    Call(CallSite),
    Generic(GenericBlock),
}

/// A block in the workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub kind: BlockKind,
    pub position: Position,
    pub collapsed: bool,
    /// Disabled blocks stay in the workspace but produce no code.
    pub disabled: bool,
}

impl Block {
    pub fn new(id: BlockId, kind: BlockKind) -> Self {
        Block {
            id,
            kind,
            position: Position::default(),
            collapsed: false,
            disabled: false,
        }
    }

    /// The block type as written to the persisted format.
    pub fn type_name(&self) -> &str {
        match &self.kind {
            BlockKind::Declaration(decl) if decl.has_return() => DEF_RETURN,
            BlockKind::Declaration(_) => DEF_NO_RETURN,
            BlockKind::Call(call) if call.has_return() => CALL_RETURN,
            BlockKind::Call(_) => CALL_NO_RETURN,
            BlockKind::Generic(generic) => &generic.type_name,
        }
    }

    /// Returns `true` if the block plugs into value inputs.
    pub fn has_output(&self) -> bool {
        match &self.kind {
            BlockKind::Declaration(_) => false,
            BlockKind::Call(call) => call.has_return(),
            BlockKind::Generic(generic) => generic.output,
        }
    }

    /// Declarations are always top-level blocks.
    pub fn is_connectable(&self) -> bool {
        !matches!(self.kind, BlockKind::Declaration(_))
    }

    pub fn as_declaration(&self) -> Option<&ProcedureDecl> {
        match &self.kind {
            BlockKind::Declaration(decl) => Some(decl),
            _ => None,
        }
    }

    pub fn as_call(&self) -> Option<&CallSite> {
        match &self.kind {
            BlockKind::Call(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_generic(&self) -> Option<&GenericBlock> {
        match &self.kind {
            BlockKind::Generic(generic) => Some(generic),
            _ => None,
        }
    }
}
