//! Stable ID newtypes for workspace entities.
//!
//! Both IDs are distinct newtype wrappers, so a `BlockId` cannot be used
//! where a `ParamId` is expected. Neither is ever reused once issued.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable block identifier, unique for the lifetime of a workspace.
///
/// Unlike petgraph's `NodeIndex`, a `BlockId` is never recycled after the
/// block is disposed, so stale references can be detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

/// Opaque parameter identity (a "quark").
///
/// Survives renames and reorderings of the parameter it names. Call sites
/// use it to find the sub-graph that was plugged into the parameter's slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParamId(pub u64);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

impl std::str::FromStr for ParamId {
    type Err = std::num::ParseIntError;

    /// Accepts both the displayed form (`p12`) and a bare number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix('p').unwrap_or(s).parse().map(ParamId)
    }
}
