use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

use super::ids::IdAssigner;
use super::normalizer::NormalizationOutput;
use crate::graph::{
    render_date, DateRecord, DocumentRecord, EventRecord, GraphNodes, GraphOutput, NodeKind,
    UserRecord,
};
use crate::relationship::{RelationType, Relationship};

/// A finished graph broke a structural rule. Always an internal defect, never
/// caused by document content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    #[error("Graph invariant violated: {0}")]
    InvariantViolation(String),
}

pub type AssemblyResult<T> = Result<T, AssemblyError>;

fn violation(message: impl Into<String>) -> AssemblyError {
    AssemblyError::InvariantViolation(message.into())
}

#[derive(Debug, Default)]
pub struct GraphAssembler;

impl GraphAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Builds the output graph for one document. Events are ordered by date
    /// (undated last, otherwise stable) before they receive ids.
    pub fn assemble(
        &self,
        document: DocumentRecord,
        users: Vec<UserRecord>,
        normalization: NormalizationOutput,
        ids: &mut IdAssigner,
    ) -> AssemblyResult<GraphOutput> {
        let NormalizationOutput {
            mut events,
            locations,
            entities,
        } = normalization;
        events.sort_by_key(|event| (event.date.is_none(), event.date));

        let mut event_records = Vec::with_capacity(events.len());
        let mut dates = BTreeSet::new();
        let mut relationships = Vec::new();

        for event in events {
            let id = ids
                .next(NodeKind::Event)
                .ok_or_else(|| violation("event ids unavailable"))?;

            relationships.push(Relationship::new(
                document.id.clone(),
                id.clone(),
                RelationType::Mentions,
            ));
            if let Some(date) = event.date {
                dates.insert(date);
                relationships.push(Relationship::new(
                    id.clone(),
                    render_date(date),
                    RelationType::OccurredOn,
                ));
            }
            if let Some(location_id) = event.location_id {
                relationships.push(Relationship::new(
                    id.clone(),
                    location_id,
                    RelationType::OccurredAt,
                ));
            }
            for entity_id in event.participant_ids {
                relationships.push(Relationship::new(
                    entity_id,
                    id.clone(),
                    RelationType::ParticipatesIn,
                ));
            }

            event_records.push(EventRecord {
                id,
                title: event.title,
                summary: event.summary,
            });
        }

        let output = GraphOutput {
            nodes: GraphNodes {
                documents: vec![document],
                events: event_records,
                dates: dates.into_iter().map(DateRecord::from_date).collect(),
                locations,
                entities,
                users,
            },
            relationships,
        };

        output.verify()?;
        Ok(output)
    }
}

impl GraphOutput {
    /// Checks the structural rules every emitted graph satisfies: one
    /// document, unique ids per kind, unique dates, non-empty event text and
    /// relationship endpoints that resolve to nodes of the required kind.
    pub fn verify(&self) -> AssemblyResult<()> {
        let nodes = &self.nodes;

        if nodes.documents.len() != 1 {
            return Err(violation(format!(
                "expected exactly one document, found {}",
                nodes.documents.len()
            )));
        }

        let mut known: HashMap<NodeKind, HashSet<&str>> = HashMap::new();
        for doc in &nodes.documents {
            register_node(&mut known, NodeKind::Document, &doc.id)?;
        }
        for event in &nodes.events {
            if event.title.trim().is_empty() || event.summary.trim().is_empty() {
                return Err(violation(format!("event {} has empty text", event.id)));
            }
            register_node(&mut known, NodeKind::Event, &event.id)?;
        }
        for date in &nodes.dates {
            register_node(&mut known, NodeKind::Date, &date.date)?;
        }
        for location in &nodes.locations {
            register_node(&mut known, NodeKind::Location, &location.id)?;
        }
        for entity in &nodes.entities {
            register_node(&mut known, NodeKind::Entity, &entity.id)?;
        }
        for user in &nodes.users {
            register_node(&mut known, NodeKind::User, &user.id)?;
        }

        for rel in &self.relationships {
            let (from_kind, to_kind) = rel.relation_type.endpoints();
            for (kind, key) in [(from_kind, &rel.from_node), (to_kind, &rel.to_node)] {
                let resolves = known
                    .get(&kind)
                    .is_some_and(|keys| keys.contains(key.as_str()));
                if !resolves {
                    return Err(violation(format!(
                        "{} {} -> {} does not resolve {kind} {key}",
                        rel.relation_type, rel.from_node, rel.to_node
                    )));
                }
            }
        }

        Ok(())
    }
}

fn register_node<'a>(
    known: &mut HashMap<NodeKind, HashSet<&'a str>>,
    kind: NodeKind,
    key: &'a str,
) -> AssemblyResult<()> {
    if known.entry(kind).or_default().insert(key) {
        Ok(())
    } else {
        Err(violation(format!("duplicate {kind} {key}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EntityRecord, LocationRecord};
    use crate::ingest::extractor::{ExtractionStrategy, Provenance};
    use crate::ingest::normalizer::NormalizedEvent;
    use chrono::NaiveDate;

    fn document() -> DocumentRecord {
        DocumentRecord {
            id: "doc_0123456789ab".into(),
            filename: "report.txt".into(),
        }
    }

    fn event(title: &str, date: Option<(i32, u32, u32)>) -> NormalizedEvent {
        NormalizedEvent {
            title: title.into(),
            summary: format!("{title}."),
            date: date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            location_id: None,
            participant_ids: Vec::new(),
            provenance: Provenance {
                strategy: ExtractionStrategy::Fallback,
                passage: Some(0),
                offset: None,
            },
        }
    }

    fn assemble(normalization: NormalizationOutput) -> AssemblyResult<GraphOutput> {
        GraphAssembler::new().assemble(
            document(),
            Vec::new(),
            normalization,
            &mut IdAssigner::new(),
        )
    }

    #[test]
    fn test_empty_normalization_yields_document_only() {
        let graph = assemble(NormalizationOutput::default()).unwrap();

        assert_eq!(graph.nodes.documents.len(), 1);
        assert!(graph.nodes.events.is_empty());
        assert!(graph.relationships.is_empty());
    }

    #[test]
    fn test_events_ordered_by_date_with_undated_last() {
        let normalization = NormalizationOutput {
            events: vec![
                event("Undated", None),
                event("Later", Some((2024, 3, 1))),
                event("Earlier", Some((2023, 12, 31))),
                event("Same day", Some((2024, 3, 1))),
            ],
            ..Default::default()
        };

        let graph = assemble(normalization).unwrap();
        let titles: Vec<&str> = graph
            .nodes
            .events
            .iter()
            .map(|e| e.title.as_str())
            .collect();

        assert_eq!(titles, vec!["Earlier", "Later", "Same day", "Undated"]);
        assert_eq!(graph.nodes.events[0].id, "event_1");
        assert_eq!(
            graph.nodes.dates,
            vec![
                DateRecord {
                    date: "2023-12-31T00:00:00Z".into(),
                },
                DateRecord {
                    date: "2024-03-01T00:00:00Z".into(),
                },
            ]
        );
        assert_eq!(graph.stats().count(RelationType::OccurredOn), 3);
        assert_eq!(graph.stats().count(RelationType::Mentions), 4);
    }

    #[test]
    fn test_relationship_order_per_event() {
        let mut meeting = event("Meeting", Some((2024, 1, 15)));
        meeting.location_id = Some("loc_1".into());
        meeting.participant_ids = vec!["entity_1".into(), "entity_2".into()];

        let normalization = NormalizationOutput {
            events: vec![meeting],
            locations: vec![LocationRecord {
                id: "loc_1".into(),
                address: "New York City".into(),
            }],
            entities: vec![
                EntityRecord {
                    id: "entity_1".into(),
                    name: "John Doe".into(),
                },
                EntityRecord {
                    id: "entity_2".into(),
                    name: "Jane Smith".into(),
                },
            ],
        };

        let graph = assemble(normalization).unwrap();
        let types: Vec<RelationType> = graph
            .relationships
            .iter()
            .map(|r| r.relation_type)
            .collect();

        assert_eq!(
            types,
            vec![
                RelationType::Mentions,
                RelationType::OccurredOn,
                RelationType::OccurredAt,
                RelationType::ParticipatesIn,
                RelationType::ParticipatesIn,
            ]
        );
        assert_eq!(graph.relationships[1].to_node, "2024-01-15T00:00:00Z");
        assert_eq!(graph.relationships[3].from_node, "entity_1");
        assert_eq!(graph.relationships[3].to_node, "event_1");
    }

    #[test]
    fn test_dangling_location_is_invariant_violation() {
        let mut located = event("Signing", None);
        located.location_id = Some("loc_7".into());

        let err = assemble(NormalizationOutput {
            events: vec![located],
            ..Default::default()
        })
        .unwrap_err();

        let AssemblyError::InvariantViolation(msg) = err;
        assert!(msg.contains("loc_7"), "{msg}");
    }

    #[test]
    fn test_verify_rejects_duplicates_and_bad_kinds() {
        let graph = assemble(NormalizationOutput {
            events: vec![event("Meeting", Some((2024, 1, 15)))],
            ..Default::default()
        })
        .unwrap();
        assert!(graph.verify().is_ok());

        let mut duplicated = graph.clone();
        let first_date = duplicated.nodes.dates[0].clone();
        duplicated.nodes.dates.push(first_date);
        assert!(duplicated.verify().is_err());

        let mut reversed = graph.clone();
        reversed.relationships.push(Relationship::new(
            "event_1".into(),
            "doc_0123456789ab".into(),
            RelationType::Mentions,
        ));
        assert!(reversed.verify().is_err());

        let mut blank = graph.clone();
        blank.nodes.events[0].summary = " ".into();
        assert!(blank.verify().is_err());

        let mut orphaned = graph;
        orphaned.nodes.documents.clear();
        assert!(orphaned.verify().is_err());
    }
}
