use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use uuid::Uuid;

/// Identifier stamped on every staging row drained during one sync cycle.
/// An etl id recorded in the target's etl_events table is proof that the
/// rows carrying it were applied, and must be purged from source staging on
/// any later cycle.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EtlId(Arc<str>);

impl EtlId {
    pub fn generate() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(Arc::from(id.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for EtlId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for EtlId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for EtlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(EtlId::generate(), EtlId::generate());
    }
}
