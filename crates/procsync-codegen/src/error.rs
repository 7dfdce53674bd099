//! Emission error types.
//!
//! Errors are per unit (one procedure, or one top-level stack): a failing
//! unit is reported and skipped, the rest of the program is still emitted.

use procsync_core::{BlockId, CoreError};
use serde::{Deserialize, Serialize};

/// Errors that can occur while emitting code from a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum EmitError {
    /// Two parameters of one procedure share a name.
    #[error("procedure '{procedure}' has duplicate parameter '{name}'")]
    DuplicateParameter {
        block: BlockId,
        procedure: String,
        name: String,
    },

    /// A call whose target procedure does not exist.
    #[error("call {call} refers to unknown procedure '{name}'")]
    UnresolvedProcedure { call: BlockId, name: String },

    #[error("block {0} is not a procedure declaration")]
    NotADeclaration(BlockId),

    #[error("block {0} is not a procedure call")]
    NotACall(BlockId),

    /// No template knows this block type, or it was used in the wrong
    /// position (a statement plugged into a value input).
    #[error("cannot emit block {block} of type '{type_name}'")]
    UnsupportedBlock { block: BlockId, type_name: String },

    /// The workspace itself was inconsistent.
    #[error("workspace error: {reason}")]
    Core { reason: String },
}

impl From<CoreError> for EmitError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotADeclaration { id } => EmitError::NotADeclaration(id),
            CoreError::NotACall { id } => EmitError::NotACall(id),
            other => EmitError::Core {
                reason: other.to_string(),
            },
        }
    }
}

impl EmitError {
    /// The block the error is attached to, if any.
    pub fn block(&self) -> Option<BlockId> {
        match self {
            EmitError::DuplicateParameter { block, .. } | EmitError::UnsupportedBlock { block, .. } => Some(*block),
            EmitError::UnresolvedProcedure { call, .. } => Some(*call),
            EmitError::NotADeclaration(id) | EmitError::NotACall(id) => Some(*id),
            EmitError::Core { .. } => None,
        }
    }
}
