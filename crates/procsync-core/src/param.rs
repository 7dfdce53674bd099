//! Parameter identities and descriptors.
//!
//! [`ParamIdRegistry`] hands out [`ParamId`]s from a monotonically
//! increasing counter. Identities are never reused, so an identity that
//! lingers in a call site's connection cache after its parameter was
//! deleted simply never matches again.

use serde::{Deserialize, Serialize};

use crate::id::ParamId;
use crate::names::name_key;

/// Issues process-lifetime-unique parameter identities for one workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamIdRegistry {
    next: u64,
}

impl ParamIdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh identity.
    pub fn issue(&mut self) -> ParamId {
        let id = ParamId(self.next);
        self.next += 1;
        id
    }

    /// Issues `count` fresh identities in order.
    pub fn issue_many(&mut self, count: usize) -> Vec<ParamId> {
        (0..count).map(|_| self.issue()).collect()
    }

    /// Number of identities issued so far.
    pub fn issued(&self) -> u64 {
        self.next
    }
}

/// One parameter of a procedure: a stable identity plus a mutable name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    pub id: ParamId,
    pub name: String,
}

impl ParamDescriptor {
    pub fn new(id: ParamId, name: impl Into<String>) -> Self {
        ParamDescriptor {
            id,
            name: name.into(),
        }
    }
}

/// Returns `true` if two names in `names` collide case-insensitively.
pub fn has_duplicate_names<'a>(names: impl IntoIterator<Item = &'a str>) -> bool {
    let mut seen = std::collections::HashSet::new();
    names.into_iter().any(|name| !seen.insert(name_key(name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_ids_are_unique_and_increasing() {
        let mut registry = ParamIdRegistry::new();
        let a = registry.issue();
        let rest = registry.issue_many(3);
        assert!(rest.iter().all(|id| *id > a));
        assert_eq!(registry.issued(), 4);
        let mut all = rest.clone();
        all.dedup();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn duplicate_detection_is_case_insensitive() {
        assert!(has_duplicate_names(["x", "y", "X"]));
        assert!(!has_duplicate_names(["x", "y", "z"]));
        assert!(!has_duplicate_names(Vec::<&str>::new()));
    }
}
