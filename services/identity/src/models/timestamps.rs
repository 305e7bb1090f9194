//! Created/modified bookkeeping shared by every persisted entity

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Embedded in each entity; only the storage layer writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timestamps {
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Timestamps {
    /// Stamp for a row being inserted.
    pub fn inserted_at(now: DateTime<Utc>) -> Self {
        Self {
            created: now,
            modified: now,
        }
    }

    /// Stamp for a row being updated. `created` never moves.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.modified = now;
    }
}

impl Default for Timestamps {
    fn default() -> Self {
        Self::inserted_at(Utc::now())
    }
}
