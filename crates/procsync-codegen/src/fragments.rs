//! The generator driver and the templates for non-procedure blocks.
//!
//! [`Generator`] walks the block graph: statement inputs are emitted as
//! indented chains following `next` links, value inputs as expressions
//! parenthesized according to [`Order`]. Procedure blocks are handled in
//! [`procedures`](crate::procedures); everything else is delegated to a
//! [`BlockTemplates`] implementation.

use procsync_core::block::IF_RETURN;
use procsync_core::{BlockId, BlockKind, CoreError, GenericBlock, Workspace};

use crate::error::EmitError;
use crate::names::{SymbolKind, SymbolTable};
use crate::order::Order;
use crate::EmitOptions;

/// Output of a single block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Code {
    /// Disabled block, or a block that emits nothing in place.
    Empty,
    /// One or more complete lines, newline-terminated.
    Statement(String),
    /// An expression and its binding strength.
    Expression(String, Order),
}

impl Code {
    /// Text for a statement position. A bare expression becomes an
    /// expression statement.
    pub fn into_statement(self) -> String {
        match self {
            Code::Empty => String::new(),
            Code::Statement(code) => code,
            Code::Expression(code, _) => format!("{code};\n"),
        }
    }
}

/// Emits code for generic block types.
pub trait BlockTemplates {
    fn emit(&self, gen: &mut Generator<'_>, id: BlockId, block: &GenericBlock) -> Result<Code, EmitError>;
}

/// Prefixes every line of `code` with `prefix`.
pub fn prefix_lines(code: &str, prefix: &str) -> String {
    code.split_inclusive('\n').map(|line| format!("{prefix}{line}")).collect()
}

pub struct Generator<'a> {
    ws: &'a Workspace,
    options: &'a EmitOptions,
    names: &'a mut dyn SymbolTable,
    templates: &'a dyn BlockTemplates,
}

impl<'a> Generator<'a> {
    pub fn new(
        ws: &'a Workspace,
        options: &'a EmitOptions,
        names: &'a mut dyn SymbolTable,
        templates: &'a dyn BlockTemplates,
    ) -> Self {
        Generator {
            ws,
            options,
            names,
            templates,
        }
    }

    pub fn workspace(&self) -> &'a Workspace {
        self.ws
    }

    pub fn options(&self) -> &'a EmitOptions {
        self.options
    }

    pub fn resolve(&mut self, raw: &str, kind: SymbolKind) -> String {
        self.names.resolve(raw, kind)
    }

    /// Emits `id` and, for statements, every block following it.
    /// Disabled blocks are skipped.
    pub fn block_to_code(&mut self, id: BlockId) -> Result<Code, EmitError> {
        let ws = self.ws;
        let block = ws.block(id).ok_or(CoreError::BlockNotFound { id })?;
        if block.disabled {
            return match ws.next_block(id) {
                Some(next) => self.block_to_code(next),
                None => Ok(Code::Empty),
            };
        }

        let code = match &block.kind {
            BlockKind::Declaration(_) => return Ok(Code::Empty),
            BlockKind::Call(_) => self.emit_call(id)?.into(),
            BlockKind::Generic(generic) if generic.type_name == IF_RETURN => Code::Statement(self.emit_if_return(id)?),
            BlockKind::Generic(generic) => {
                let templates = self.templates;
                templates.emit(self, id, generic)?
            }
        };

        match code {
            Code::Statement(mut text) => {
                if let Some(next) = ws.next_block(id) {
                    text.push_str(&self.block_to_code(next)?.into_statement());
                }
                Ok(Code::Statement(text))
            }
            other => Ok(other),
        }
    }

    /// Emits the expression plugged into `input` of `parent`, wrapped in
    /// parentheses if it binds looser than `outer`. `None` if the input is
    /// empty or holds only disabled blocks.
    pub fn value_to_code(&mut self, parent: BlockId, input: &str, outer: Order) -> Result<Option<String>, EmitError> {
        let Some(child) = self.ws.input_target(parent, input) else {
            return Ok(None);
        };
        match self.block_to_code(child)? {
            Code::Empty => Ok(None),
            Code::Expression(code, inner) => Ok(Some(outer.wrap(code, inner))),
            Code::Statement(_) => Err(self.unsupported(child)),
        }
    }

    /// Emits the statement chain plugged into `input` of `parent`, indented
    /// one level.
    pub fn statement_to_code(&mut self, parent: BlockId, input: &str) -> Result<String, EmitError> {
        let Some(child) = self.ws.input_target(parent, input) else {
            return Ok(String::new());
        };
        match self.block_to_code(child)? {
            Code::Expression(..) => Err(self.unsupported(child)),
            code => Ok(prefix_lines(&code.into_statement(), &self.options.indent)),
        }
    }

    pub(crate) fn unsupported(&self, id: BlockId) -> EmitError {
        EmitError::UnsupportedBlock {
            block: id,
            type_name: self
                .ws
                .block(id)
                .map(|b| b.type_name().to_string())
                .unwrap_or_default(),
        }
    }
}

/// Templates for the basic block set: numbers, variables, arithmetic,
/// comparisons and raw code lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreTemplates;

impl CoreTemplates {
    fn arithmetic(op: &str) -> Option<(&'static str, Order)> {
        Some(match op {
            "ADD" => ("+", Order::Additive),
            "MINUS" => ("-", Order::Additive),
            "MULTIPLY" => ("*", Order::Multiplicative),
            "DIVIDE" => ("/", Order::Multiplicative),
            "MODULUS" => ("%", Order::Multiplicative),
            _ => return None,
        })
    }

    fn comparison(op: &str) -> Option<(&'static str, Order)> {
        Some(match op {
            "EQ" => ("==", Order::Equality),
            "NEQ" => ("!=", Order::Equality),
            "LT" => ("<", Order::Relational),
            "LTE" => ("<=", Order::Relational),
            "GT" => (">", Order::Relational),
            "GTE" => (">=", Order::Relational),
            _ => return None,
        })
    }

    fn operands(gen: &mut Generator<'_>, id: BlockId, order: Order) -> Result<(String, String), EmitError> {
        let a = gen.value_to_code(id, "A", order)?.unwrap_or_else(|| "0".to_string());
        let b = gen.value_to_code(id, "B", order)?.unwrap_or_else(|| "0".to_string());
        Ok((a, b))
    }
}

impl BlockTemplates for CoreTemplates {
    fn emit(&self, gen: &mut Generator<'_>, id: BlockId, block: &GenericBlock) -> Result<Code, EmitError> {
        match block.type_name.as_str() {
            "math_number" => {
                let num = block.field("NUM").unwrap_or("0").trim().to_string();
                let order = if num.starts_with('-') {
                    Order::UnaryPrefix
                } else {
                    Order::Atomic
                };
                Ok(Code::Expression(num, order))
            }
            "variables_get" => {
                let var = gen.resolve(block.field("VAR").unwrap_or_default(), SymbolKind::Variable);
                Ok(Code::Expression(var, Order::Atomic))
            }
            "variables_set" => {
                let var = gen.resolve(block.field("VAR").unwrap_or_default(), SymbolKind::Variable);
                let value = gen
                    .value_to_code(id, "VALUE", Order::Assignment)?
                    .unwrap_or_else(|| "0".to_string());
                Ok(Code::Statement(format!("{var} = {value};\n")))
            }
            "math_arithmetic" => {
                let (op, order) = block
                    .field("OP")
                    .and_then(Self::arithmetic)
                    .ok_or_else(|| gen.unsupported(id))?;
                let (a, b) = Self::operands(gen, id, order)?;
                Ok(Code::Expression(format!("{a}{op}{b}"), order))
            }
            "logic_compare" => {
                let (op, order) = block
                    .field("OP")
                    .and_then(Self::comparison)
                    .ok_or_else(|| gen.unsupported(id))?;
                let (a, b) = Self::operands(gen, id, order)?;
                Ok(Code::Expression(format!("{a} {op} {b}"), order))
            }
            "text_raw" => {
                let text = block.field("TEXT").unwrap_or_default();
                Ok(Code::Statement(format!("{text}\n")))
            }
            _ => Err(gen.unsupported(id)),
        }
    }
}
