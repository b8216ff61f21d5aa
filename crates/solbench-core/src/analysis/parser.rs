use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use super::{AnalysisReport, Finding, Severity, ToolOutput};
use crate::error::{ConfigurationError, ParseError};

/// Marker preceding the useful part of the tool's plain compiler output.
/// Tool-version-dependent; when absent the whole diagnostic is kept.
const COMPILE_ERROR_MARKER: &str = "Error:";

/// Normalizes one tool's raw output into the tool-agnostic report shape.
pub trait ToolParser: Send + Sync {
    fn tool(&self) -> &'static str;
    fn parse(&self, artifact_id: &str, output: &ToolOutput) -> Result<AnalysisReport, ParseError>;
}

impl std::fmt::Debug for dyn ToolParser + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolParser").field("tool", &self.tool()).finish()
    }
}

/// Parsers keyed by tool name. Requesting an unregistered tool is a
/// configuration error surfaced before any analysis work begins.
pub struct ParserRegistry {
    parsers: Vec<Box<dyn ToolParser>>,
}

impl ParserRegistry {
    /// Registry with every built-in tool parser.
    pub fn with_defaults() -> Self {
        Self {
            parsers: vec![Box::new(SlitherParser)],
        }
    }

    pub fn register(&mut self, parser: Box<dyn ToolParser>) {
        self.parsers.push(parser);
    }

    pub fn get(&self, tool: &str) -> Result<&dyn ToolParser, ConfigurationError> {
        self.parsers
            .iter()
            .find(|parser| parser.tool() == tool)
            .map(|parser| parser.as_ref())
            .ok_or_else(|| ConfigurationError::UnknownTool(tool.to_string()))
    }
}

/// Parser for Slither's `--json -` output plus the solc ABI side
/// channel.
pub struct SlitherParser;

#[derive(Deserialize)]
struct SlitherJson {
    #[serde(default)]
    results: Option<SlitherResults>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct SlitherResults {
    #[serde(default)]
    detectors: Option<Vec<SlitherDetector>>,
}

#[derive(Deserialize)]
struct SlitherDetector {
    #[serde(default)]
    description: String,
    #[serde(default)]
    check: String,
    #[serde(default)]
    impact: String,
    #[serde(default)]
    confidence: String,
    #[serde(default)]
    elements: Vec<SlitherElement>,
}

#[derive(Deserialize)]
struct SlitherElement {
    #[serde(default)]
    name: Option<String>,
}

impl ToolParser for SlitherParser {
    fn tool(&self) -> &'static str {
        "slither"
    }

    fn parse(&self, artifact_id: &str, output: &ToolOutput) -> Result<AnalysisReport, ParseError> {
        let (detectors, json_error) = if output.stdout.trim().is_empty() {
            (None, None)
        } else {
            let parsed: SlitherJson =
                serde_json::from_str(&output.stdout).map_err(|source| ParseError::InvalidJson {
                    tool: self.tool(),
                    source,
                })?;
            (
                parsed.results.and_then(|results| results.detectors),
                parsed.error,
            )
        };

        match detectors {
            Some(detectors) => {
                let findings = detectors
                    .into_iter()
                    .map(|detector| Finding {
                        description: detector.description.trim().to_string(),
                        check_id: detector.check,
                        impact: Severity::from_label(&detector.impact),
                        confidence: Severity::from_label(&detector.confidence),
                        anchor: detector
                            .elements
                            .into_iter()
                            .find_map(|element| element.name)
                            .unwrap_or_default(),
                    })
                    .collect();
                Ok(AnalysisReport {
                    artifact_id: artifact_id.to_string(),
                    compilable: true,
                    findings,
                    interface: output
                        .interface_json
                        .as_deref()
                        .map(parse_interface)
                        .unwrap_or_default(),
                    raw_tool_output: output.stdout.clone(),
                })
            }
            None => {
                // The fallback run's diagnostic when the tool emitted
                // nothing; otherwise the `error` field of its JSON.
                let diagnostic = output
                    .diagnostic
                    .clone()
                    .or(json_error)
                    .unwrap_or_default();
                Ok(AnalysisReport {
                    artifact_id: artifact_id.to_string(),
                    compilable: false,
                    findings: vec![synthetic_compile_finding(&diagnostic)],
                    interface: BTreeMap::new(),
                    raw_tool_output: diagnostic,
                })
            }
        }
    }
}

/// The single high/high finding standing in for all results of a
/// non-compilable artifact.
fn synthetic_compile_finding(diagnostic: &str) -> Finding {
    let description = match diagnostic.find(COMPILE_ERROR_MARKER) {
        Some(idx) => diagnostic[idx + COMPILE_ERROR_MARKER.len()..].trim(),
        None => diagnostic.trim(),
    };
    let description = if description.is_empty() {
        "compilation failed (no diagnostic captured)"
    } else {
        description
    };
    Finding {
        description: description.to_string(),
        check_id: "compilation-error".to_string(),
        impact: Severity::High,
        confidence: Severity::High,
        anchor: String::new(),
    }
}

/// Extract contract -> function names from `solc --combined-json abi`
/// output. Older solc emits the ABI as a JSON-encoded string, newer
/// releases inline it; both shapes are accepted.
fn parse_interface(interface_json: &str) -> BTreeMap<String, Vec<String>> {
    let mut interface = BTreeMap::new();
    let Ok(root) = serde_json::from_str::<Value>(interface_json) else {
        return interface;
    };
    let Some(contracts) = root.get("contracts").and_then(Value::as_object) else {
        return interface;
    };
    for (qualified, entry) in contracts {
        let name = qualified
            .rsplit(':')
            .next()
            .unwrap_or(qualified)
            .to_string();
        let abi = match entry.get("abi") {
            Some(Value::String(encoded)) => serde_json::from_str::<Value>(encoded).ok(),
            Some(inline @ Value::Array(_)) => Some(inline.clone()),
            _ => None,
        };
        let functions = abi
            .as_ref()
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| item.get("type").and_then(Value::as_str) == Some("function"))
                    .filter_map(|item| item.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        interface.insert(name, functions);
    }
    interface
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETECTOR_OUTPUT: &str = r#"{
        "success": true,
        "error": null,
        "results": {
            "detectors": [
                {
                    "check": "reentrancy-eth",
                    "impact": "High",
                    "confidence": "Medium",
                    "description": "Reentrancy in Lease.withdraw()",
                    "elements": [{"name": "withdraw"}]
                },
                {
                    "check": "solc-version",
                    "impact": "Informational",
                    "confidence": "High",
                    "description": "Pragma allows old compilers",
                    "elements": []
                }
            ]
        }
    }"#;

    fn output(stdout: &str) -> ToolOutput {
        ToolOutput {
            stdout: stdout.to_string(),
            diagnostic: None,
            interface_json: None,
        }
    }

    #[test]
    fn unknown_tool_is_a_configuration_error() {
        let registry = ParserRegistry::with_defaults();
        assert!(registry.get("slither").is_ok());
        let err = registry.get("mythril").unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownTool(name) if name == "mythril"));
    }

    #[test]
    fn detector_results_mean_compilable() {
        let report = SlitherParser
            .parse("lease_t0.0", &output(DETECTOR_OUTPUT))
            .unwrap();
        assert!(report.compilable);
        assert_eq!(report.findings.len(), 2);
        assert_eq!(report.findings[0].check_id, "reentrancy-eth");
        assert_eq!(report.findings[0].impact, Severity::High);
        assert_eq!(report.findings[0].anchor, "withdraw");
        // Informational collapses to Low.
        assert_eq!(report.findings[1].impact, Severity::Low);
    }

    #[test]
    fn empty_output_yields_synthetic_high_high_finding() {
        let raw = ToolOutput {
            stdout: String::new(),
            diagnostic: Some(
                "Traceback ...\nError: Source file requires different compiler version".into(),
            ),
            interface_json: None,
        };
        let report = SlitherParser.parse("lease_t0.5", &raw).unwrap();
        assert!(!report.compilable);
        assert_eq!(report.findings.len(), 1);
        let finding = &report.findings[0];
        assert_eq!(finding.impact, Severity::High);
        assert_eq!(finding.confidence, Severity::High);
        assert_eq!(
            finding.description,
            "Source file requires different compiler version"
        );
    }

    #[test]
    fn json_error_field_feeds_synthetic_finding() {
        let raw = ToolOutput {
            stdout: r#"{"success": false, "error": "Error: Identifier not found or not unique.", "results": {}}"#
                .to_string(),
            diagnostic: None,
            interface_json: None,
        };
        let report = SlitherParser.parse("lease_t0.7", &raw).unwrap();
        assert!(!report.compilable);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(
            report.findings[0].description,
            "Identifier not found or not unique."
        );
    }

    #[test]
    fn missing_marker_keeps_whole_diagnostic() {
        let raw = ToolOutput {
            stdout: String::new(),
            diagnostic: Some("unparseable tool stderr".into()),
            interface_json: None,
        };
        let report = SlitherParser.parse("x", &raw).unwrap();
        assert_eq!(report.findings[0].description, "unparseable tool stderr");
    }

    #[test]
    fn garbage_json_is_a_parse_error() {
        let err = SlitherParser
            .parse("x", &output("{not json"))
            .unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson { tool: "slither", .. }));
    }

    #[test]
    fn interface_parses_both_abi_encodings() {
        let inline = r#"{"contracts":{"sc/x.sol:Lease":{"abi":[
            {"type":"function","name":"payRent"},
            {"type":"function","name":"terminate"},
            {"type":"constructor"}
        ]}}}"#;
        let interface = parse_interface(inline);
        assert_eq!(interface["Lease"], vec!["payRent", "terminate"]);

        let encoded = r#"{"contracts":{"sc/x.sol:Lease":{"abi":"[{\"type\":\"function\",\"name\":\"payRent\"}]"}}}"#;
        let interface = parse_interface(encoded);
        assert_eq!(interface["Lease"], vec!["payRent"]);
    }

    #[test]
    fn interface_is_attached_when_compilable() {
        let raw = ToolOutput {
            stdout: DETECTOR_OUTPUT.to_string(),
            diagnostic: None,
            interface_json: Some(
                r#"{"contracts":{"sc/x.sol:Lease":{"abi":[{"type":"function","name":"payRent"}]}}}"#
                    .into(),
            ),
        };
        let report = SlitherParser.parse("x", &raw).unwrap();
        assert_eq!(report.interface["Lease"].len(), 1);
    }
}
