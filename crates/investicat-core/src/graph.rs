use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::relationship::{RelationType, Relationship};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Document,
    Event,
    Date,
    Location,
    Entity,
    User,
}

impl NodeKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Event => "event",
            Self::Date => "date",
            Self::Location => "location",
            Self::Entity => "entity",
            Self::User => "user",
        }
    }

    /// Prefix used for generated ids. Dates are keyed by value and have none.
    #[must_use]
    pub fn id_prefix(&self) -> Option<&'static str> {
        match self {
            Self::Document => Some("doc"),
            Self::Event => Some("event"),
            Self::Date => None,
            Self::Location => Some("loc"),
            Self::Entity => Some("entity"),
            Self::User => Some("user"),
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub title: String,
    pub summary: String,
}

/// A calendar date node. The rendered date string is its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRecord {
    pub date: String,
}

impl DateRecord {
    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            date: render_date(date),
        }
    }
}

/// Renders a calendar date as ISO-8601 midnight UTC, e.g. `2024-01-15T00:00:00Z`.
#[must_use]
pub fn render_date(date: NaiveDate) -> String {
    let midnight: DateTime<Utc> = date.and_time(chrono::NaiveTime::default()).and_utc();
    midnight.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub id: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password: String,
}

impl UserRecord {
    /// Placeholder account owning the processed document in the downstream app.
    /// The password field is a literal marker, never a credential.
    #[must_use]
    pub fn placeholder(id: String, email: String, name: String) -> Self {
        Self {
            id,
            email,
            name,
            password: "placeholder".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNodes {
    pub documents: Vec<DocumentRecord>,
    pub events: Vec<EventRecord>,
    pub dates: Vec<DateRecord>,
    pub locations: Vec<LocationRecord>,
    pub entities: Vec<EntityRecord>,
    #[serde(default)]
    pub users: Vec<UserRecord>,
}

/// Finalized node/relationship set handed to the graph loader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphOutput {
    pub nodes: GraphNodes,
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub documents: usize,
    pub events: usize,
    pub dates: usize,
    pub locations: usize,
    pub entities: usize,
    pub users: usize,
    pub relationships: BTreeMap<RelationType, usize>,
}

impl GraphStats {
    #[must_use]
    pub fn total_relationships(&self) -> usize {
        self.relationships.values().sum()
    }

    #[must_use]
    pub fn count(&self, relation_type: RelationType) -> usize {
        self.relationships.get(&relation_type).copied().unwrap_or(0)
    }
}

impl GraphOutput {
    #[must_use]
    pub fn stats(&self) -> GraphStats {
        let mut relationships = BTreeMap::new();
        for rel in &self.relationships {
            *relationships.entry(rel.relation_type).or_insert(0) += 1;
        }

        GraphStats {
            documents: self.nodes.documents.len(),
            events: self.nodes.events.len(),
            dates: self.nodes.dates.len(),
            locations: self.nodes.locations.len(),
            entities: self.nodes.entities.len(),
            users: self.nodes.users.len(),
            relationships,
        }
    }

    pub fn relationships_of(
        &self,
        relation_type: RelationType,
    ) -> impl Iterator<Item = &Relationship> {
        self.relationships
            .iter()
            .filter(move |r| r.relation_type == relation_type)
    }

    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_date_is_midnight_utc() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(render_date(date), "2024-01-15T00:00:00Z");
        assert_eq!(DateRecord::from_date(date).date, "2024-01-15T00:00:00Z");
    }

    #[test]
    fn test_node_kind_prefixes() {
        assert_eq!(NodeKind::Event.id_prefix(), Some("event"));
        assert_eq!(NodeKind::Location.id_prefix(), Some("loc"));
        assert_eq!(NodeKind::Date.id_prefix(), None);
    }

    #[test]
    fn test_date_record_serializes_without_id() {
        let json = serde_json::to_value(DateRecord {
            date: "2024-01-15T00:00:00Z".into(),
        })
        .unwrap();

        assert_eq!(json, serde_json::json!({"date": "2024-01-15T00:00:00Z"}));
    }

    #[test]
    fn test_output_field_names() {
        let output = GraphOutput {
            nodes: GraphNodes {
                documents: vec![DocumentRecord {
                    id: "doc_abc".into(),
                    filename: "report.pdf".into(),
                }],
                ..Default::default()
            },
            relationships: vec![Relationship::new(
                "doc_abc".into(),
                "event_1".into(),
                RelationType::Mentions,
            )],
        };

        let json = serde_json::to_value(&output).unwrap();

        assert_eq!(json["nodes"]["documents"][0]["filename"], "report.pdf");
        assert!(json["nodes"]["users"].as_array().unwrap().is_empty());
        assert_eq!(json["relationships"][0]["from_node"], "doc_abc");
        assert_eq!(json["relationships"][0]["to_node"], "event_1");
        assert_eq!(json["relationships"][0]["type"], "MENTIONS");
    }

    #[test]
    fn test_stats_counts_relationship_types() {
        let output = GraphOutput {
            nodes: GraphNodes::default(),
            relationships: vec![
                Relationship::new("doc".into(), "event_1".into(), RelationType::Mentions),
                Relationship::new("doc".into(), "event_2".into(), RelationType::Mentions),
                Relationship::new(
                    "entity_1".into(),
                    "event_1".into(),
                    RelationType::ParticipatesIn,
                ),
            ],
        };

        let stats = output.stats();

        assert_eq!(stats.count(RelationType::Mentions), 2);
        assert_eq!(stats.count(RelationType::ParticipatesIn), 1);
        assert_eq!(stats.count(RelationType::OccurredOn), 0);
        assert_eq!(stats.total_relationships(), 3);
    }

    #[test]
    fn test_json_reload() {
        let json = r#"{"nodes": {"documents": [], "events": [],
            "dates": [{"date": "2024-01-15T00:00:00Z"}],
            "locations": [], "entities": []}, "relationships": []}"#;

        let output = GraphOutput::from_json(json).unwrap();

        assert_eq!(output.nodes.dates.len(), 1);
        assert!(output.nodes.users.is_empty());
    }
}
