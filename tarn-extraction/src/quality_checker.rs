use std::collections::HashSet;

use crate::types::{AcceptedObject, AcceptedRelationship};

/// Orphan-rate threshold above which the orchestrator loops back to the
/// Relationship Builder.
const ORPHAN_RATE_THRESHOLD: f64 = 0.30;

#[derive(Debug, Clone)]
pub struct QualityReport {
    pub orphan_rate: f64,
    pub orphan_keys: Vec<String>,
}

/// Agent 3: pure function over the current object/relationship set,
/// no upstream call of its own.
pub struct QualityChecker;

impl QualityChecker {
    pub fn check(objects: &[AcceptedObject], relationships: &[AcceptedRelationship]) -> QualityReport {
        if objects.is_empty() {
            return QualityReport { orphan_rate: 0.0, orphan_keys: Vec::new() };
        }

        let connected: HashSet<&str> = relationships
            .iter()
            .flat_map(|r| [r.src_key.as_str(), r.dst_key.as_str()])
            .collect();

        let orphan_keys: Vec<String> = objects
            .iter()
            .filter_map(|o| o.key.as_deref())
            .filter(|key| !connected.contains(key))
            .map(str::to_string)
            .collect();

        let orphan_rate = orphan_keys.len() as f64 / objects.len() as f64;
        QualityReport { orphan_rate, orphan_keys }
    }

    pub fn needs_retry(report: &QualityReport) -> bool {
        report.orphan_rate > ORPHAN_RATE_THRESHOLD
    }
}
