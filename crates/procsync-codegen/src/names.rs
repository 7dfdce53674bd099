//! Symbol table mapping block-level names to legal C identifiers.

use std::collections::{HashMap, HashSet};

use procsync_core::names::name_key;

/// What a name stands for. Procedures and variables live in one C
/// namespace but are tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Procedure,
    Variable,
}

/// Resolves raw names to emitted symbols.
///
/// The same `(raw, kind)` pair (compared case-insensitively) always
/// resolves to the same symbol; distinct pairs never share one.
pub trait SymbolTable {
    fn resolve(&mut self, raw: &str, kind: SymbolKind) -> String;
}

/// Words that may not be used as identifiers in emitted programs.
pub const RESERVED_WORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else", "enum", "extern",
    "float", "for", "goto", "if", "inline", "int", "long", "main", "null", "register", "restrict", "return",
    "short", "signed", "sizeof", "static", "struct", "switch", "typedef", "union", "unsigned", "void",
    "volatile", "while",
];

/// Default [`SymbolTable`]: sanitizes, avoids reserved words, and appends
/// numeric suffixes (`x`, `x2`, `x3`, ...) on collision.
#[derive(Debug, Default)]
pub struct NameDb {
    assigned: HashMap<(SymbolKind, String), String>,
    taken: HashSet<String>,
}

impl NameDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct symbols handed out so far.
    pub fn len(&self) -> usize {
        self.taken.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taken.is_empty()
    }
}

/// Replaces anything that is not `[A-Za-z0-9_]` with `_`. Names starting
/// with a digit get a `my_` prefix; empty names become `unnamed`.
pub fn safe_name(raw: &str) -> String {
    let mut safe: String = raw
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if safe.is_empty() {
        safe = "unnamed".to_string();
    } else if safe.starts_with(|c: char| c.is_ascii_digit()) {
        safe.insert_str(0, "my_");
    }
    safe
}

impl SymbolTable for NameDb {
    fn resolve(&mut self, raw: &str, kind: SymbolKind) -> String {
        let key = (kind, name_key(raw));
        if let Some(symbol) = self.assigned.get(&key) {
            return symbol.clone();
        }
        let base = safe_name(raw);
        let mut candidate = base.clone();
        let mut suffix = 2;
        while self.taken.contains(&candidate) || RESERVED_WORDS.contains(&candidate.as_str()) {
            candidate = format!("{base}{suffix}");
            suffix += 1;
        }
        self.taken.insert(candidate.clone());
        self.assigned.insert(key, candidate.clone());
        candidate
    }
}
