//! Core error types for procsync-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! failure modes of the workspace model and the procedure machinery.

use crate::id::BlockId;
use thiserror::Error;

/// Core errors produced by the procsync-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Parameter names and identities were passed with different lengths.
    /// Always a caller bug, never a user error.
    #[error("arity mismatch: {names} parameter name(s) but {ids} identity(ies)")]
    ArityMismatch { names: usize, ids: usize },

    /// A block ID was not found in the workspace.
    #[error("block not found: {id}")]
    BlockNotFound { id: BlockId },

    /// The block exists but is not a procedure declaration.
    #[error("block {id} is not a procedure declaration")]
    NotADeclaration { id: BlockId },

    /// The block exists but is not a procedure call.
    #[error("block {id} is not a procedure call")]
    NotACall { id: BlockId },

    /// A procedure or parameter name is empty after normalization.
    #[error("invalid name: '{name}'")]
    InvalidName { name: String },

    /// A mutator operation was attempted with no open session.
    #[error("no mutator open on block {id}")]
    MutatorNotOpen { id: BlockId },

    /// `open_mutator` was called twice without closing.
    #[error("mutator already open on block {id}")]
    MutatorAlreadyOpen { id: BlockId },

    /// A mutator row index is out of range.
    #[error("mutator row {index} out of range (len {len})")]
    RowOutOfRange { index: usize, len: usize },

    /// The block can never be plugged into another block.
    #[error("block {id} cannot be connected to a parent")]
    NotConnectable { id: BlockId },

    /// Connecting would make a block its own ancestor.
    #[error("connecting block {child} under {parent} would create a cycle")]
    ConnectionCycle { parent: BlockId, child: BlockId },

    /// The persisted XML document could not be read or written.
    #[error("xml error: {reason}")]
    Xml { reason: String },
}
