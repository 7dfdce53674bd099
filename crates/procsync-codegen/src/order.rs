//! Operator precedence for expression composition.

use serde::{Deserialize, Serialize};

/// Binding strength of an emitted expression, tightest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Order {
    Atomic,
    /// Calls, subscripts, `x++`.
    UnaryPostfix,
    UnaryPrefix,
    Multiplicative,
    Additive,
    Shift,
    Relational,
    Equality,
    BitwiseAnd,
    BitwiseXor,
    BitwiseOr,
    LogicalAnd,
    LogicalOr,
    Conditional,
    Assignment,
    /// The consumer imposes no constraint.
    None,
}

impl Order {
    /// Whether an expression of precedence `inner` must be parenthesized
    /// when placed in a context requiring `self`.
    pub fn needs_parens(self, inner: Order) -> bool {
        if self > inner {
            return false;
        }
        !(self == inner && matches!(self, Order::Atomic | Order::None))
    }

    /// Wraps `code` in parentheses if [`needs_parens`](Self::needs_parens).
    pub fn wrap(self, code: String, inner: Order) -> String {
        if self.needs_parens(inner) {
            format!("({code})")
        } else {
            code
        }
    }
}
