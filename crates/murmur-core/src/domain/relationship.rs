use serde::{Deserialize, Serialize};

/// Kind of relationship between two users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Follow,
    Block,
    Mute,
}

/// Lifecycle status of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    Pending,
    Accepted,
}

/// Which side of the relationship the listed users are on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipDirection {
    /// Users pointing at the subject (e.g. its followers).
    Incoming,
    /// Users the subject points at (e.g. who it follows).
    Outgoing,
}

/// Filter for relationship listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipFilter {
    pub kind: RelationshipKind,
    pub status: RelationshipStatus,
    pub direction: RelationshipDirection,
}

impl RelationshipFilter {
    /// Accepted followers of the subject.
    #[must_use]
    pub const fn followers() -> Self {
        Self {
            kind: RelationshipKind::Follow,
            status: RelationshipStatus::Accepted,
            direction: RelationshipDirection::Incoming,
        }
    }

    /// Accepted accounts the subject follows.
    #[must_use]
    pub const fn following() -> Self {
        Self {
            kind: RelationshipKind::Follow,
            status: RelationshipStatus::Accepted,
            direction: RelationshipDirection::Outgoing,
        }
    }
}
