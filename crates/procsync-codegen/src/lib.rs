//! C code generation for procsync workspaces.
//!
//! Turns procedure declarations into function definitions (with separate
//! forward prototypes) and call blocks into call expressions or statements.
//! Everything that is not a procedure block goes through a
//! [`BlockTemplates`](fragments::BlockTemplates) implementation.
//!
//! # Modules
//!
//! - [`error`] -- Error types for emission failures
//! - [`names`] -- Symbol table producing legal, de-duplicated C identifiers
//! - [`order`] -- Operator precedence used when composing expressions
//! - [`fragments`] -- The generator driver and the built-in block templates
//! - [`procedures`] -- Definition, call and conditional-return emission
//! - [`program`] -- Whole-workspace generation

pub mod error;
pub mod fragments;
pub mod names;
pub mod order;
pub mod procedures;
pub mod program;

pub use error::EmitError;
pub use fragments::{BlockTemplates, Code, CoreTemplates, Generator};
pub use names::{NameDb, SymbolKind, SymbolTable};
pub use order::Order;
pub use procedures::{EmittedCall, EmittedDefinition};
pub use program::{generate, GeneratedProgram};

use serde::{Deserialize, Serialize};

/// Options controlling emitted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitOptions {
    /// Type used for every parameter and every returned value.
    pub numeric_type: String,

    /// Emitted in place of an argument slot with nothing connected.
    pub null_placeholder: String,

    /// One level of indentation.
    pub indent: String,

    /// Statement prefixed to every procedure body. `%1` is replaced with
    /// the quoted block ID of the declaration.
    pub loop_trap: Option<String>,
}

impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions {
            numeric_type: "int".to_string(),
            null_placeholder: "null".to_string(),
            indent: "  ".to_string(),
            loop_trap: None,
        }
    }
}
