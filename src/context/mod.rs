//! Shared run context: concurrent accumulation and consolidation of findings.
//!
//! The [`ConsolidationStore`] is the one piece of state mutated by
//! multiple workers at once. All mutation goes through [`add_finding`],
//! serialized by a mutex so appends are never lost and a report always
//! sees a consistent snapshot.
//!
//! [`add_finding`]: ConsolidationStore::add_finding

use crate::models::{ConsolidatedReport, Finding, TaggedFinding};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

/// Concurrency-safe accumulation of findings for one analysis run.
pub struct ConsolidationStore {
    code: String,
    findings: Mutex<Vec<TaggedFinding>>,
}

impl ConsolidationStore {
    /// Create a store scoped to one run over the given input code.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            findings: Mutex::new(Vec::new()),
        }
    }

    /// The shared input under analysis.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Append a tagged copy of `finding`.
    ///
    /// Safe to call concurrently from any number of workers; findings are
    /// never mutated or removed after the append.
    pub fn add_finding(&self, finding: Finding, worker_id: &str, worker_type: &str) {
        let tagged = TaggedFinding {
            finding,
            worker_id: worker_id.to_string(),
            worker_type: worker_type.to_string(),
        };
        let mut findings = self.findings.lock().unwrap_or_else(|e| e.into_inner());
        findings.push(tagged);
    }

    /// Number of raw findings accumulated so far (before deduplication).
    pub fn finding_count(&self) -> usize {
        let findings = self.findings.lock().unwrap_or_else(|e| e.into_inner());
        findings.len()
    }

    /// Snapshot of all raw findings in insertion order.
    pub fn all_findings(&self) -> Vec<TaggedFinding> {
        let findings = self.findings.lock().unwrap_or_else(|e| e.into_inner());
        findings.clone()
    }

    /// Produce the consolidated report over the current finding set.
    ///
    /// Deterministic: deduplicate (first occurrence wins), rank by
    /// severity weight descending (stable, so ties keep insertion order),
    /// then aggregate. An empty store yields the all-zero report.
    pub fn report(&self) -> ConsolidatedReport {
        let snapshot = self.all_findings();
        if snapshot.is_empty() {
            return ConsolidatedReport::empty();
        }

        let ranked = rank_by_severity(deduplicate(snapshot));

        let mut severity_breakdown = BTreeMap::new();
        let mut worker_breakdown = BTreeMap::new();
        let mut risk_score = 0u32;

        for tagged in &ranked {
            *severity_breakdown
                .entry(tagged.finding.severity)
                .or_insert(0) += 1;
            *worker_breakdown
                .entry(tagged.worker_type.clone())
                .or_insert(0) += 1;
            risk_score += tagged.finding.severity.weight();
        }

        ConsolidatedReport {
            total_findings: ranked.len(),
            risk_score,
            severity_breakdown,
            worker_breakdown,
            findings: ranked,
        }
    }
}

/// Drop duplicate findings, keeping the first occurrence of each
/// `(category, line, description)` key.
fn deduplicate(findings: Vec<TaggedFinding>) -> Vec<TaggedFinding> {
    let mut seen = HashSet::new();
    findings
        .into_iter()
        .filter(|tagged| seen.insert(tagged.finding.dedup_key()))
        .collect()
}

/// Sort by severity weight, highest first. Stable: ties keep their
/// relative insertion order.
fn rank_by_severity(mut findings: Vec<TaggedFinding>) -> Vec<TaggedFinding> {
    findings.sort_by_key(|tagged| std::cmp::Reverse(tagged.finding.severity.weight()));
    findings
}
