use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::analysis::AnalysisReport;

static PRAGMA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"pragma\s+solidity\s*[^\d]*(\d+)\.(\d+)\.(\d+)").expect("static pragma pattern")
});
static CONTRACT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bcontract\s+([A-Za-z_$][A-Za-z0-9_$]*)").expect("static contract pattern")
});
static IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*import\b").expect("static import pattern"));
// Typed declaration with a literal initializer. Textual approximation:
// also matches initialized locals, which is acceptable for a comparative
// metric.
static INITIALIZED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^\s*(?:uint|int|bool|address|string|bytes)[0-9]*\s+(?:(?:public|private|internal|constant|immutable)\s+)*[A-Za-z_]\w*\s*=\s*[^=]",
    )
    .expect("static initializer pattern")
});

/// Remove `//` and `/* */` comments while preserving string literals, so
/// quoted text that merely resembles a comment survives verbatim.
pub fn strip_comments(source: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Code,
        LineComment,
        BlockComment,
        DoubleQuoted,
        SingleQuoted,
    }

    let mut out = String::with_capacity(source.len());
    let mut state = State::Code;
    let mut chars = source.chars().peekable();
    while let Some(ch) = chars.next() {
        match state {
            State::Code => match ch {
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = State::BlockComment;
                }
                '"' => {
                    out.push(ch);
                    state = State::DoubleQuoted;
                }
                '\'' => {
                    out.push(ch);
                    state = State::SingleQuoted;
                }
                _ => out.push(ch),
            },
            State::LineComment => {
                if ch == '\n' {
                    out.push(ch);
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if ch == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Code;
                }
            }
            State::DoubleQuoted => {
                out.push(ch);
                if ch == '\\' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if ch == '"' {
                    state = State::Code;
                }
            }
            State::SingleQuoted => {
                out.push(ch);
                if ch == '\\' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if ch == '\'' {
                    state = State::Code;
                }
            }
        }
    }
    out
}

/// Weight table for the per-artifact score. Non-positive vulnerability
/// sub-weights: findings only ever subtract.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreWeights {
    pub compilable: f64,
    pub contract: f64,
    pub function: f64,
    pub comments: f64,
    pub external_call: f64,
    pub initialized_param: f64,
    pub pragma: f64,
    pub vuln_high: f64,
    pub vuln_medium: f64,
    pub vuln_low: f64,
    /// Pragma contributes full weight iff the minor version equals this
    /// toolchain generation.
    pub target_pragma_minor: u32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            compilable: 10.0,
            contract: 1.0,
            function: 0.5,
            comments: 1.0,
            external_call: 0.5,
            initialized_param: 0.5,
            pragma: 2.0,
            vuln_high: -3.0,
            vuln_medium: -2.0,
            vuln_low: -1.0,
            target_pragma_minor: 8,
        }
    }
}

/// Per-artifact structural/security/style metrics and their weighted
/// contributions. A pure projection of artifact plus report; recomputed
/// on every aggregation pass, never authoritative.
#[derive(Debug, Clone, Serialize)]
pub struct MetricRecord {
    pub artifact_id: String,
    pub compilable: bool,
    pub no_contracts: usize,
    pub no_functions: usize,
    pub functions_per_contract: BTreeMap<String, usize>,
    pub has_comments: bool,
    pub external_calls: usize,
    pub initialized_params: usize,
    pub pragma_version: Option<String>,
    pub vuln_high: usize,
    pub vuln_medium: usize,
    pub vuln_low: usize,
    /// Per-weight contributions, keyed by metric name.
    pub contributions: BTreeMap<String, f64>,
    /// Unnormalized sum; comparable only within one run and weight table.
    pub total_score: f64,
}

/// Reduce one artifact's source and analysis report into a scored
/// metric record.
pub fn score(source: &str, report: &AnalysisReport, weights: &ScoreWeights) -> MetricRecord {
    let stripped = strip_comments(source);
    let has_comments = stripped.len() < source.len();
    let pragma = PRAGMA_RE.captures(&stripped).map(|caps| {
        (
            format!("{}.{}.{}", &caps[1], &caps[2], &caps[3]),
            caps[2].parse::<u32>().unwrap_or(0),
        )
    });
    let pragma_version = pragma.as_ref().map(|(version, _)| version.clone());

    let (no_contracts, functions_per_contract, external_calls, initialized_params) =
        if report.compilable {
            let no_contracts = CONTRACT_RE.captures_iter(&stripped).count();
            // Function names come from the compiled interface, not from
            // textual scanning; nested braces make the latter unreliable.
            let functions_per_contract: BTreeMap<String, usize> = report
                .interface
                .iter()
                .map(|(contract, functions)| (contract.clone(), functions.len()))
                .collect();
            (
                no_contracts,
                functions_per_contract,
                IMPORT_RE.find_iter(&stripped).count(),
                INITIALIZED_RE.find_iter(&stripped).count(),
            )
        } else {
            (0, BTreeMap::new(), 0, 0)
        };
    let no_functions = functions_per_contract.values().sum();

    // Non-compilable artifacts carry exactly one synthetic high/high
    // "compilation error" entry in place of the tool's summary.
    let (vuln_high, vuln_medium, vuln_low) = if report.compilable {
        report.counts_by_impact()
    } else {
        (1, 0, 0)
    };

    let mut contributions = BTreeMap::new();
    let gate = if report.compilable { 1.0 } else { 0.0 };
    contributions.insert(
        "compilable".to_string(),
        if report.compilable { weights.compilable } else { 0.0 },
    );
    contributions.insert(
        "no_contracts".to_string(),
        gate * no_contracts as f64 * weights.contract,
    );
    contributions.insert(
        "no_functions".to_string(),
        gate * no_functions as f64 * weights.function,
    );
    contributions.insert(
        "comments".to_string(),
        gate * if has_comments { weights.comments } else { 0.0 },
    );
    contributions.insert(
        "external_calls".to_string(),
        gate * external_calls as f64 * weights.external_call,
    );
    contributions.insert(
        "initialized_params".to_string(),
        gate * initialized_params as f64 * weights.initialized_param,
    );
    let pragma_hit = matches!(pragma, Some((_, minor)) if minor == weights.target_pragma_minor);
    contributions.insert(
        "pragma".to_string(),
        gate * if pragma_hit { weights.pragma } else { 0.0 },
    );
    contributions.insert(
        "vulnerabilities".to_string(),
        gate * (vuln_high as f64 * weights.vuln_high
            + vuln_medium as f64 * weights.vuln_medium
            + vuln_low as f64 * weights.vuln_low),
    );

    let total_score = contributions.values().sum();

    MetricRecord {
        artifact_id: report.artifact_id.clone(),
        compilable: report.compilable,
        no_contracts,
        no_functions,
        functions_per_contract,
        has_comments,
        external_calls,
        initialized_params,
        pragma_version,
        vuln_high,
        vuln_medium,
        vuln_low,
        contributions,
        total_score,
    }
}
