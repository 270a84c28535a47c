//! Node identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a simulated node. Ids start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Create a node id.
    pub const fn new(id: u32) -> Self {
        NodeId(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node:{}", self.0)
    }
}

/// Hands out node ids for one simulation session.
///
/// Every session owns its own allocator, so building a fresh session restarts
/// numbering at 1 without any process-wide state.
#[derive(Debug, Default)]
pub struct IdAllocator {
    last: u32,
}

impl IdAllocator {
    /// Create an allocator whose first id is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id.
    pub fn allocate(&mut self) -> NodeId {
        self.last += 1;
        NodeId(self.last)
    }

    /// Number of ids handed out so far.
    pub fn allocated(&self) -> u32 {
        self.last
    }
}
