pub mod parser;
pub mod runner;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

pub use parser::{ParserRegistry, SlitherParser, ToolParser};
pub use runner::{AnalysisRunner, ContainerExec, ContainerState, DockerCli, ExecOutput, RunnerConfig};

/// Impact/confidence buckets shared by every supported tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    /// Map a tool's severity label onto the shared buckets. Advisory
    /// levels below `Low` (informational, optimization) collapse to Low.
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// One normalized static-analysis result. Immutable; produced only by a
/// registered tool parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub description: String,
    pub check_id: String,
    pub impact: Severity,
    pub confidence: Severity,
    /// Best location hint the tool offered (element name or source line).
    pub anchor: String,
}

/// Normalized tool output for one artifact, persisted as the `vul/`
/// side-car and reused across runs exactly like the artifact itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub artifact_id: String,
    pub compilable: bool,
    pub findings: Vec<Finding>,
    /// Compiled interface: contract name to externally visible function
    /// names. Empty when the artifact did not compile.
    #[serde(default)]
    pub interface: BTreeMap<String, Vec<String>>,
    pub raw_tool_output: String,
}

impl AnalysisReport {
    /// Vulnerability counts by impact as (high, medium, low).
    pub fn counts_by_impact(&self) -> (usize, usize, usize) {
        let mut counts = (0, 0, 0);
        for finding in &self.findings {
            match finding.impact {
                Severity::High => counts.0 += 1,
                Severity::Medium => counts.1 += 1,
                Severity::Low => counts.2 += 1,
            }
        }
        counts
    }

    pub fn load(path: &Path) -> Result<Self, ParseError> {
        let raw = fs::read_to_string(path).map_err(|source| ParseError::SideCar {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ParseError::InvalidJson {
            tool: "side-car",
            source,
        })
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let rendered = serde_json::to_string_pretty(self).expect("report serialization");
        fs::write(path, rendered)
    }
}

/// Raw output of one tool pipeline run, handed to the parser registry.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Final command's stdout (JSON on the happy path).
    pub stdout: String,
    /// Human-readable compiler error captured by the fallback run, when
    /// the primary run produced empty output.
    pub diagnostic: Option<String>,
    /// `solc --combined-json abi` output when the artifact compiled.
    pub interface_json: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_labels_collapse_to_buckets() {
        assert_eq!(Severity::from_label("High"), Severity::High);
        assert_eq!(Severity::from_label("medium"), Severity::Medium);
        assert_eq!(Severity::from_label("Informational"), Severity::Low);
        assert_eq!(Severity::from_label("Optimization"), Severity::Low);
    }

    #[test]
    fn counts_by_impact_orders_high_medium_low() {
        let report = AnalysisReport {
            artifact_id: "a".into(),
            compilable: true,
            findings: vec![
                Finding {
                    description: "x".into(),
                    check_id: "reentrancy-eth".into(),
                    impact: Severity::High,
                    confidence: Severity::Medium,
                    anchor: "withdraw".into(),
                },
                Finding {
                    description: "y".into(),
                    check_id: "pragma".into(),
                    impact: Severity::Low,
                    confidence: Severity::High,
                    anchor: "".into(),
                },
            ],
            interface: BTreeMap::new(),
            raw_tool_output: String::new(),
        };
        assert_eq!(report.counts_by_impact(), (1, 0, 1));
    }

    #[test]
    fn side_car_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.sol.json");
        let report = AnalysisReport {
            artifact_id: "a_t0.0".into(),
            compilable: false,
            findings: vec![],
            interface: BTreeMap::new(),
            raw_tool_output: "Error: ...".into(),
        };
        report.save(&path).unwrap();
        let loaded = AnalysisReport::load(&path).unwrap();
        assert_eq!(loaded.artifact_id, "a_t0.0");
        assert!(!loaded.compilable);
    }
}
