//! Common types for the Driftlab environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one experiment participant (controller or client).
///
/// A `NodeId` keys task-completion markers, so it must serialize stably and
/// order/hash consistently. Production nodes mint a random v4 UUID;
/// simulations derive the id from a seed so reruns see the same cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Mints a fresh random identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Derives a deterministic identity from `seed`.
    ///
    /// Distinct seeds give distinct ids; the multiplier spreads nearby
    /// seeds across the UUID space.
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }

    /// The underlying UUID, for storage keys and wire formats.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Log lines only need enough of the id to tell nodes apart.
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_ids_are_stable_and_distinct() {
        assert_eq!(NodeId::from_seed(42), NodeId::from_seed(42));
        let ids: Vec<NodeId> = (0..100u64).map(NodeId::from_seed).collect();
        let distinct: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(distinct.len(), ids.len());
    }

    #[test]
    fn test_random_ids_are_unique() {
        assert_ne!(NodeId::new(), NodeId::new());
    }

    #[test]
    fn test_serde_round_trip_preserves_identity() {
        // Completion markers persist NodeId as JSON; the id must survive.
        let id = NodeId::from_seed(7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(serde_json::from_str::<NodeId>(&json).unwrap(), id);
    }

    #[test]
    fn test_display_is_short_prefix() {
        assert_eq!(NodeId::from_seed(7).to_string().len(), 8);
    }
}
