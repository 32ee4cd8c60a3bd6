use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::graph::NodeKind;

const STABLE_SUFFIX_LEN: usize = 12;

/// Hex SHA-256 of `data`.
#[must_use]
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Per-run id allocator. Counters start at 1 for every kind and are never
/// shared between runs.
#[derive(Debug, Default)]
pub struct IdAssigner {
    counters: HashMap<NodeKind, u32>,
}

impl IdAssigner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sequential id, e.g. `event_3`. Dates have no ids; asking for one
    /// yields `None`.
    pub fn next(&mut self, kind: NodeKind) -> Option<String> {
        let prefix = kind.id_prefix()?;
        let counter = self.counters.entry(kind).or_insert(0);
        *counter += 1;
        Some(format!("{prefix}_{counter}"))
    }

    /// Id derived from `seed` alone, identical across runs. Used for the
    /// document (seeded by filename) and placeholder users (seeded by email).
    #[must_use]
    pub fn stable(kind: NodeKind, seed: &str) -> Option<String> {
        kind.id_prefix().map(|prefix| stable_id(prefix, seed))
    }

    #[must_use]
    pub fn document_id(filename: &str) -> String {
        stable_id("doc", filename)
    }

    #[must_use]
    pub fn user_id(email: &str) -> String {
        stable_id("user", &email.to_lowercase())
    }

    #[must_use]
    pub fn issued(&self, kind: NodeKind) -> u32 {
        self.counters.get(&kind).copied().unwrap_or(0)
    }
}

fn stable_id(prefix: &str, seed: &str) -> String {
    let digest = content_hash(seed.as_bytes());
    format!("{prefix}_{}", &digest[..STABLE_SUFFIX_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_per_kind() {
        let mut ids = IdAssigner::new();

        assert_eq!(ids.next(NodeKind::Event).as_deref(), Some("event_1"));
        assert_eq!(ids.next(NodeKind::Event).as_deref(), Some("event_2"));
        assert_eq!(ids.next(NodeKind::Location).as_deref(), Some("loc_1"));
        assert_eq!(ids.next(NodeKind::Entity).as_deref(), Some("entity_1"));
        assert_eq!(ids.issued(NodeKind::Event), 2);
        assert_eq!(ids.issued(NodeKind::User), 0);
    }

    #[test]
    fn test_dates_have_no_ids() {
        let mut ids = IdAssigner::new();
        assert!(ids.next(NodeKind::Date).is_none());
        assert!(IdAssigner::stable(NodeKind::Date, "2024-01-15").is_none());
    }

    #[test]
    fn test_separate_runs_restart_numbering() {
        let mut first = IdAssigner::new();
        let mut second = IdAssigner::new();
        first.next(NodeKind::Event);
        first.next(NodeKind::Event);

        assert_eq!(second.next(NodeKind::Event).as_deref(), Some("event_1"));
    }

    #[test]
    fn test_stable_ids() {
        let a = IdAssigner::stable(NodeKind::Document, "report.pdf").unwrap();
        let b = IdAssigner::stable(NodeKind::Document, "report.pdf").unwrap();
        let c = IdAssigner::stable(NodeKind::Document, "other.pdf").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("doc_"));
        assert_eq!(a.len(), "doc_".len() + 12);
        assert_eq!(IdAssigner::document_id("report.pdf"), a);
        assert_eq!(
            IdAssigner::user_id("Journalist@Example.com"),
            IdAssigner::user_id("journalist@example.com")
        );
    }

    #[test]
    fn test_content_hash() {
        assert_eq!(
            content_hash(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
