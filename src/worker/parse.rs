//! Extraction of findings from model output.
//!
//! Workers ask the model for one JSON object per line. Real models wrap
//! that in prose, code fences, or half-valid JSON, so extraction is
//! line-by-line and tolerant: lines that do not parse as a finding are
//! skipped and counted, never fatal.

use crate::models::Finding;
use tracing::{debug, warn};

/// Parse findings from a JSON-lines response.
pub fn parse_findings(response: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut skipped = 0usize;

    for line in response.lines() {
        let line = line.trim().trim_end_matches(',');
        if line.is_empty() || !line.starts_with('{') {
            continue;
        }

        match serde_json::from_str::<Finding>(line) {
            Ok(finding) => findings.push(finding),
            Err(err) => {
                skipped += 1;
                debug!("Skipping unparseable finding line: {err}");
            }
        }
    }

    if skipped > 0 {
        warn!("Skipped {skipped} unparseable finding line(s) in model output");
    }

    findings
}
