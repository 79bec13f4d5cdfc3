//! Unique identifier types for orchestrator entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A unique identifier for orchestrator entities (tasks, workflows, checkpoints).
///
/// Uses UUIDv4 for globally unique, collision-resistant IDs. Step ids and
/// agent ids remain plain `String`s since they are caller-chosen, stable
/// names (e.g. `"research"`, `"echo_agent"`), not generated identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrchId(Uuid);

impl OrchId {
    /// Create a new random ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for OrchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for OrchId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<OrchId> for Uuid {
    fn from(id: OrchId) -> Self {
        id.0
    }
}

impl std::str::FromStr for OrchId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(OrchId::new(), OrchId::new());
    }

    #[test]
    fn roundtrips_through_string() {
        let id = OrchId::new();
        let parsed: OrchId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn roundtrips_through_json() {
        let id = OrchId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: OrchId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
