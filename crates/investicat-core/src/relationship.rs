use serde::{Deserialize, Serialize};

use crate::graph::NodeKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    /// Document -> Event
    Mentions,
    /// Event -> Date
    OccurredOn,
    /// Event -> Location
    OccurredAt,
    /// Entity -> Event
    ParticipatesIn,
}

impl RelationType {
    pub const ALL: [Self; 4] = [
        Self::Mentions,
        Self::OccurredOn,
        Self::OccurredAt,
        Self::ParticipatesIn,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mentions => "MENTIONS",
            Self::OccurredOn => "OCCURRED_ON",
            Self::OccurredAt => "OCCURRED_AT",
            Self::ParticipatesIn => "PARTICIPATES_IN",
        }
    }

    /// Node kinds the `from_node` and `to_node` endpoints must resolve to.
    #[must_use]
    pub fn endpoints(&self) -> (NodeKind, NodeKind) {
        match self {
            Self::Mentions => (NodeKind::Document, NodeKind::Event),
            Self::OccurredOn => (NodeKind::Event, NodeKind::Date),
            Self::OccurredAt => (NodeKind::Event, NodeKind::Location),
            Self::ParticipatesIn => (NodeKind::Entity, NodeKind::Event),
        }
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub from_node: String,
    pub to_node: String,
    #[serde(rename = "type")]
    pub relation_type: RelationType,
}

impl Relationship {
    #[must_use]
    pub fn new(from_node: String, to_node: String, relation_type: RelationType) -> Self {
        Self {
            from_node,
            to_node,
            relation_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_matches_display() {
        for rel in RelationType::ALL {
            let json = serde_json::to_value(rel).unwrap();
            assert_eq!(json, serde_json::Value::String(rel.to_string()));
        }
    }

    #[test]
    fn test_endpoints() {
        assert_eq!(
            RelationType::ParticipatesIn.endpoints(),
            (NodeKind::Entity, NodeKind::Event)
        );
        assert_eq!(
            RelationType::OccurredOn.endpoints(),
            (NodeKind::Event, NodeKind::Date)
        );
    }
}
