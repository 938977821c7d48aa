//! Data models for the multi-agent review run.
//!
//! This module contains the core data structures shared across the
//! coordinator, scheduler, workers, and consolidation store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Severity tier of a finding.
///
/// Ordering follows impact: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Low severity - minor quality concerns
    #[default]
    Low,
    /// Medium severity - potential bugs, degraded robustness
    Medium,
    /// High severity - bugs, exploitable weaknesses
    High,
    /// Critical severity - vulnerabilities, data loss, crashes
    Critical,
}

impl From<&str> for Severity {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            // Unknown severities degrade to low rather than erroring.
            _ => Severity::Low,
        }
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Severity::from(raw.as_str()))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}

impl Severity {
    /// Weight used for ranking findings and computing the risk score.
    pub fn weight(&self) -> u32 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }

    /// Returns an emoji representation of the severity.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Low => "🟢",
            Severity::Medium => "🟡",
            Severity::High => "🟠",
            Severity::Critical => "🔴",
        }
    }
}

/// A single result item produced by an analysis worker.
///
/// Workers fill whatever fields the model gave them; a missing or
/// unrecognized severity degrades to [`Severity::Low`] rather than
/// failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Category label (e.g. "sql injection", "null reference").
    pub category: String,
    /// Severity of the finding.
    #[serde(default)]
    pub severity: Severity,
    /// Short title.
    #[serde(default)]
    pub title: String,
    /// Detailed description of the finding.
    pub description: String,
    /// Line number in the analyzed code (1-indexed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Suggested fix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Finding {
    /// Key used for deduplication: first occurrence wins.
    pub fn dedup_key(&self) -> (String, Option<u32>, String) {
        (self.category.clone(), self.line, self.description.clone())
    }
}

/// A finding annotated with its origin at insertion time.
///
/// The consolidation store never stores a bare [`Finding`]; every append
/// tags a copy with the worker that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedFinding {
    #[serde(flatten)]
    pub finding: Finding,
    /// Identifier of the worker instance that reported the finding.
    pub worker_id: String,
    /// Worker type tag (e.g. "security", "bug").
    pub worker_type: String,
}

/// The deduplicated, severity-ranked, aggregated view over all findings
/// in a run. Derived on demand; never a source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedReport {
    /// Number of findings after deduplication.
    pub total_findings: usize,
    /// Sum of severity weights over the deduplicated set.
    pub risk_score: u32,
    /// Finding count per severity tier.
    pub severity_breakdown: BTreeMap<Severity, usize>,
    /// Finding count per worker type.
    pub worker_breakdown: BTreeMap<String, usize>,
    /// Findings sorted by severity, highest first.
    pub findings: Vec<TaggedFinding>,
}

impl ConsolidatedReport {
    /// Report over an empty finding set: all counts zero, no findings.
    pub fn empty() -> Self {
        Self {
            total_findings: 0,
            risk_score: 0,
            severity_breakdown: BTreeMap::new(),
            worker_breakdown: BTreeMap::new(),
            findings: Vec::new(),
        }
    }

    /// Highest severity present in the report, if any finding exists.
    pub fn max_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.finding.severity).max()
    }

    /// Rebuild the report keeping only findings at or above `min`.
    ///
    /// Counts and risk score are recomputed over the retained set so the
    /// filtered report stays internally consistent.
    pub fn filtered(&self, min: Severity) -> ConsolidatedReport {
        let findings: Vec<TaggedFinding> = self
            .findings
            .iter()
            .filter(|t| t.finding.severity >= min)
            .cloned()
            .collect();

        let mut severity_breakdown = BTreeMap::new();
        let mut worker_breakdown = BTreeMap::new();
        let mut risk_score = 0u32;
        for tagged in &findings {
            *severity_breakdown
                .entry(tagged.finding.severity)
                .or_insert(0) += 1;
            *worker_breakdown
                .entry(tagged.worker_type.clone())
                .or_insert(0) += 1;
            risk_score += tagged.finding.severity.weight();
        }

        ConsolidatedReport {
            total_findings: findings.len(),
            risk_score,
            severity_breakdown,
            worker_breakdown,
            findings,
        }
    }
}

/// Metadata about a completed audit run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Path of the analyzed input.
    pub input_path: String,
    /// Date and time of the analysis.
    pub analysis_date: DateTime<Utc>,
    /// Name of the LLM model used.
    pub model_used: String,
    /// Identifier of the executed plan.
    pub plan_id: String,
    /// Duration of the analysis in seconds.
    pub duration_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_severity_weights() {
        assert_eq!(Severity::Critical.weight(), 4);
        assert_eq!(Severity::High.weight(), 3);
        assert_eq!(Severity::Medium.weight(), 2);
        assert_eq!(Severity::Low.weight(), 1);
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!(Severity::from("critical"), Severity::Critical);
        assert_eq!(Severity::from("HIGH"), Severity::High);
        assert_eq!(Severity::from("Medium"), Severity::Medium);
        assert_eq!(Severity::from("low"), Severity::Low);
        assert_eq!(Severity::from("bogus"), Severity::Low);
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Severity::Critical).unwrap(), "critical");
        assert_eq!(serde_json::to_value(Severity::Low).unwrap(), "low");
    }

    #[test]
    fn test_unknown_severity_degrades_to_low() {
        let finding: Finding = serde_json::from_str(
            r#"{"category": "sqli", "severity": "catastrophic", "description": "x"}"#,
        )
        .unwrap();
        assert_eq!(finding.severity, Severity::Low);
    }

    #[test]
    fn test_missing_severity_degrades_to_low() {
        let finding: Finding =
            serde_json::from_str(r#"{"category": "sqli", "description": "x"}"#).unwrap();
        assert_eq!(finding.severity, Severity::Low);
    }

    #[test]
    fn test_dedup_key_ignores_severity() {
        let a = Finding {
            category: "sqli".to_string(),
            severity: Severity::High,
            title: "SQL Injection".to_string(),
            description: "x".to_string(),
            line: Some(10),
            suggestion: None,
        };
        let b = Finding {
            severity: Severity::Critical,
            title: String::new(),
            ..a.clone()
        };
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_tagged_finding_flattens_on_serialization() {
        let tagged = TaggedFinding {
            finding: Finding {
                category: "secrets".to_string(),
                severity: Severity::Critical,
                title: "Hardcoded key".to_string(),
                description: "API key in source".to_string(),
                line: Some(3),
                suggestion: Some("Load from environment".to_string()),
            },
            worker_id: "security_agent".to_string(),
            worker_type: "security".to_string(),
        };

        let value = serde_json::to_value(&tagged).unwrap();
        assert_eq!(value["category"], "secrets");
        assert_eq!(value["severity"], "critical");
        assert_eq!(value["worker_type"], "security");
    }

    #[test]
    fn test_filtered_report_recomputes_aggregates() {
        let tagged = |severity: Severity, category: &str| TaggedFinding {
            finding: Finding {
                category: category.to_string(),
                severity,
                title: String::new(),
                description: format!("{category} issue"),
                line: None,
                suggestion: None,
            },
            worker_id: "w".to_string(),
            worker_type: "bug".to_string(),
        };

        let mut severity_breakdown = BTreeMap::new();
        severity_breakdown.insert(Severity::Critical, 1);
        severity_breakdown.insert(Severity::Low, 1);
        let mut worker_breakdown = BTreeMap::new();
        worker_breakdown.insert("bug".to_string(), 2);

        let report = ConsolidatedReport {
            total_findings: 2,
            risk_score: 5,
            severity_breakdown,
            worker_breakdown,
            findings: vec![
                tagged(Severity::Critical, "crash"),
                tagged(Severity::Low, "style"),
            ],
        };

        let filtered = report.filtered(Severity::High);
        assert_eq!(filtered.total_findings, 1);
        assert_eq!(filtered.risk_score, 4);
        assert_eq!(filtered.severity_breakdown.get(&Severity::Low), None);
        assert_eq!(filtered.worker_breakdown.get("bug"), Some(&1));
    }

    #[test]
    fn test_empty_report() {
        let report = ConsolidatedReport::empty();
        assert_eq!(report.total_findings, 0);
        assert_eq!(report.risk_score, 0);
        assert!(report.severity_breakdown.is_empty());
        assert!(report.worker_breakdown.is_empty());
        assert!(report.findings.is_empty());
        assert_eq!(report.max_severity(), None);
    }
}
