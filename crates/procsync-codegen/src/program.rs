//! Whole-workspace generation.

use procsync_core::{BlockKind, Workspace};
use serde::Serialize;

use crate::error::EmitError;
use crate::fragments::{prefix_lines, CoreTemplates, Generator};
use crate::names::NameDb;
use crate::EmitOptions;

/// Everything emitted for one workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GeneratedProgram {
    /// Forward declarations, one per emitted procedure.
    pub prototypes: Vec<String>,
    /// Function definitions, in declaration order.
    pub definitions: Vec<String>,
    /// Top-level statements, already indented for `main`.
    pub main_body: String,
    /// Units that failed and were left out.
    pub errors: Vec<EmitError>,
}

impl GeneratedProgram {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Prototypes, then definitions, then `int main()` holding the
    /// top-level code.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for prototype in &self.prototypes {
            out.push_str(prototype);
        }
        if !self.prototypes.is_empty() {
            out.push('\n');
        }
        for definition in &self.definitions {
            out.push_str(definition);
            out.push('\n');
        }
        out.push_str("int main() {\n");
        out.push_str(&self.main_body);
        out.push_str("}\n");
        out
    }
}

/// Emits every enabled declaration and every top-level stack of
/// `ws`. A unit that fails is recorded in
/// [`errors`](GeneratedProgram::errors) and skipped.
pub fn generate(ws: &Workspace, options: &EmitOptions) -> GeneratedProgram {
    let mut names = NameDb::new();
    let templates = CoreTemplates;
    let mut gen = Generator::new(ws, options, &mut names, &templates);
    let mut program = GeneratedProgram::default();

    for decl in ws.declarations() {
        if ws.block(decl).is_some_and(|b| b.disabled) {
            continue;
        }
        match gen.emit_definition(decl) {
            Ok(def) => {
                program.prototypes.push(def.prototype);
                program.definitions.push(def.body);
            }
            Err(err) => {
                tracing::warn!(block = %decl, error = %err, "skipping procedure");
                program.errors.push(err);
            }
        }
    }

    let mut main = String::new();
    for top in ws.top_blocks() {
        if matches!(ws.block(top).map(|b| &b.kind), Some(BlockKind::Declaration(_))) {
            continue;
        }
        match gen.block_to_code(top) {
            Ok(code) => main.push_str(&code.into_statement()),
            Err(err) => {
                tracing::warn!(block = %top, error = %err, "skipping top-level stack");
                program.errors.push(err);
            }
        }
    }
    program.main_body = prefix_lines(&main, &options.indent);

    tracing::info!(
        procedures = program.definitions.len(),
        errors = program.errors.len(),
        "generated program"
    );
    program
}
