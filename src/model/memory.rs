//! Translation memory identity.

use std::fmt;

use uuid::Uuid;

/// A translation memory: the per-customer container that translation units
/// belong to. Only identity travels through the binary log; the actual
/// content lives in the downstream stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    pub id: i64,
    pub owner: Option<Uuid>,
}

impl Memory {
    pub fn new(id: i64) -> Self {
        Memory { id, owner: None }
    }

    pub fn with_owner(id: i64, owner: Uuid) -> Self {
        Memory {
            id,
            owner: Some(owner),
        }
    }
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memory #{}", self.id)
    }
}
