//! Emission of procedure definitions, calls and conditional returns.

use std::collections::HashSet;

use procsync_core::block::{arg_input, RETURN_INPUT, STACK_INPUT};
use procsync_core::names::name_key;
use procsync_core::{Block, BlockId, CallState, ProcedureDecl};

use crate::error::EmitError;
use crate::fragments::{Code, Generator};
use crate::names::SymbolKind;
use crate::order::Order;

/// Condition input of a `procedures_ifreturn` block.
pub const CONDITION_INPUT: &str = "CONDITION";
/// Value input of a `procedures_ifreturn` block.
pub const VALUE_INPUT: &str = "VALUE";

/// A function definition, with its forward prototype kept apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedDefinition {
    pub symbol: String,
    pub prototype: String,
    pub body: String,
}

/// A call, either usable inline or as a complete statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmittedCall {
    Expression(String, Order),
    Statement(String),
}

impl From<EmittedCall> for Code {
    fn from(call: EmittedCall) -> Self {
        match call {
            EmittedCall::Expression(code, order) => Code::Expression(code, order),
            EmittedCall::Statement(code) => Code::Statement(code),
        }
    }
}

fn first_duplicate(decl: &ProcedureDecl) -> Option<&str> {
    let mut seen = HashSet::new();
    decl.params()
        .iter()
        .map(|p| p.name.as_str())
        .find(|name| !seen.insert(name_key(name)))
}

impl Generator<'_> {
    /// Emits `decl` as a function definition.
    ///
    /// The return type is the numeric type if a return expression is
    /// connected and `void` otherwise; every parameter has the numeric type.
    pub fn emit_definition(&mut self, decl: BlockId) -> Result<EmittedDefinition, EmitError> {
        let ws = self.workspace();
        let options = self.options();
        let d = ws
            .block(decl)
            .and_then(Block::as_declaration)
            .ok_or(EmitError::NotADeclaration(decl))?;
        if let Some(name) = first_duplicate(d) {
            tracing::warn!(procedure = %d.name(), param = %name, "refusing to emit duplicate parameters");
            return Err(EmitError::DuplicateParameter {
                block: decl,
                procedure: d.name().to_string(),
                name: name.to_string(),
            });
        }

        let symbol = self.resolve(d.name(), SymbolKind::Procedure);
        let args: Vec<String> = d
            .params()
            .iter()
            .map(|p| format!("{} {}", options.numeric_type, self.resolve(&p.name, SymbolKind::Variable)))
            .collect();
        let args = args.join(", ");

        let mut branch = if d.has_body() {
            self.statement_to_code(decl, STACK_INPUT)?
        } else {
            String::new()
        };
        if let Some(trap) = &options.loop_trap {
            branch = trap.replace("%1", &format!("'{decl}'")) + &branch;
        }

        let (return_type, return_stmt) = match self.value_to_code(decl, RETURN_INPUT, Order::None)? {
            Some(value) => (
                options.numeric_type.as_str(),
                format!("{}return {value};\n", options.indent),
            ),
            None => ("void", String::new()),
        };

        tracing::debug!(procedure = %d.name(), symbol = %symbol, "emitted definition");
        Ok(EmittedDefinition {
            prototype: format!("{return_type} {symbol}({args});\n"),
            body: format!("{return_type} {symbol}({args}) {{\n{branch}{return_stmt}}}\n"),
            symbol,
        })
    }

    /// Emits a call. Empty argument slots emit the null placeholder.
    pub fn emit_call(&mut self, call: BlockId) -> Result<EmittedCall, EmitError> {
        let ws = self.workspace();
        let site = ws
            .block(call)
            .and_then(Block::as_call)
            .ok_or(EmitError::NotACall(call))?;
        let decl = match ws.definition(site.target()) {
            Some(decl) if site.state() != CallState::Orphaned => decl,
            _ => {
                tracing::warn!(call = %call, target = %site.target(), "call to unknown procedure");
                return Err(EmitError::UnresolvedProcedure {
                    call,
                    name: site.target().to_string(),
                });
            }
        };

        let symbol = self.resolve(ws.declaration(decl)?.name(), SymbolKind::Procedure);
        let mut args = Vec::with_capacity(site.arg_count());
        for i in 0..site.arg_count() {
            let arg = self.value_to_code(call, &arg_input(i), Order::None)?;
            args.push(arg.unwrap_or_else(|| self.options().null_placeholder.clone()));
        }
        let code = format!("{symbol}({})", args.join(", "));
        Ok(if site.has_return() {
            EmittedCall::Expression(code, Order::UnaryPostfix)
        } else {
            EmittedCall::Statement(format!("{code};\n"))
        })
    }

    /// Emits `if (cond) { return ...; }`. The value is only returned when
    /// the enclosing procedure has a return value; outside a procedure the
    /// block is unsupported.
    pub fn emit_if_return(&mut self, id: BlockId) -> Result<String, EmitError> {
        let ws = self.workspace();
        let options = self.options();
        let Some(enclosing) = ws.block(ws.root_of(id)).and_then(Block::as_declaration) else {
            tracing::warn!(block = %id, "conditional return outside a procedure");
            return Err(self.unsupported(id));
        };
        let returns_value = enclosing.has_return();
        let condition = self
            .value_to_code(id, CONDITION_INPUT, Order::None)?
            .unwrap_or_else(|| "false".to_string());

        let mut code = format!("if ({condition}) {{\n");
        if returns_value {
            let value = self
                .value_to_code(id, VALUE_INPUT, Order::None)?
                .unwrap_or_else(|| options.null_placeholder.clone());
            code.push_str(&format!("{}return {value};\n", options.indent));
        } else {
            code.push_str(&format!("{}return;\n", options.indent));
        }
        code.push_str("}\n");
        Ok(code)
    }
}
