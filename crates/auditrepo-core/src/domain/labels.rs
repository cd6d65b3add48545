//! Audit label set: severity and report-status labels.

use auditrepo_hosting::LabelSpec;
use serde::{Deserialize, Serialize};

/// Labels the hosting service seeds into a fresh repository.
pub const DEFAULT_HOSTING_LABELS: &[&str] = &[
    "bug",
    "duplicate",
    "enhancement",
    "invalid",
    "question",
    "wontfix",
    "good first issue",
    "help wanted",
    "documentation",
];

const SEVERITY: &[(&str, &str, &str)] = &[
    ("Severity: Critical Risk", "ff0000", "Direct loss of funds or protocol takeover"),
    ("Severity: High Risk", "B60205", "Likely loss of funds or broken core invariant"),
    ("Severity: Medium Risk", "D93F0B", "Conditional loss or degraded functionality"),
    ("Severity: Low Risk", "FBCA04", "Minor impact or unlikely preconditions"),
    ("Severity: Informational", "1D76DB", "Code quality or documentation"),
    ("Severity: Gas Optimization", "B4E197", "Gas savings"),
];

const STATUS: &[(&str, &str, &str)] = &[
    ("Report Status: Open", "5319E7", "Awaiting a response from the project"),
    ("Report Status: Acknowledged", "BFA8DC", "Accepted by the project, not fixed"),
    ("Report Status: Resolved", "0E8A16", "Fix verified"),
    ("Report Status: Disputed", "E99695", "Validity contested by the project"),
    ("Report Status: Closed", "bfdadc", "No further action"),
];

/// Fixed label name -> color/description mapping applied to every target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLabelSet {
    pub severity: Vec<LabelSpec>,
    pub status: Vec<LabelSpec>,
}

impl Default for AuditLabelSet {
    fn default() -> Self {
        let build = |rows: &[(&str, &str, &str)]| {
            rows.iter()
                .map(|(name, color, description)| LabelSpec::new(name, color, description))
                .collect()
        };
        Self {
            severity: build(SEVERITY),
            status: build(STATUS),
        }
    }
}

impl AuditLabelSet {
    /// Severity labels first, then status labels.
    pub fn all(&self) -> Vec<LabelSpec> {
        self.severity.iter().chain(self.status.iter()).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.severity.len() + self.status.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Default hosting labels that do not collide with an audit label.
    pub fn prunable_defaults(&self) -> Vec<&'static str> {
        let all = self.all();
        DEFAULT_HOSTING_LABELS
            .iter()
            .copied()
            .filter(|d| !all.iter().any(|l| l.name.eq_ignore_ascii_case(d)))
            .collect()
    }
}
