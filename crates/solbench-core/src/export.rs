use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::metrics::MetricRecord;

/// Contribution columns in export order, matching the metric keys
/// produced by the aggregator.
const CONTRIBUTION_KEYS: [&str; 8] = [
    "compilable",
    "no_contracts",
    "no_functions",
    "comments",
    "external_calls",
    "initialized_params",
    "pragma",
    "vulnerabilities",
];

/// One exported row: a scored artifact keyed by (prompt variant,
/// document).
#[derive(Debug, Clone)]
pub struct ReportRow {
    pub prompt_variant: String,
    pub document: String,
    pub model: String,
    pub temperature: f32,
    pub record: MetricRecord,
}

/// Tabular accumulator for one (model, iteration) export file.
#[derive(Debug, Default)]
pub struct ReportTable {
    rows: Vec<ReportRow>,
}

impl ReportTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: ReportRow) {
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Render the table as CSV, rows sorted by (prompt variant,
    /// document, temperature).
    pub fn to_csv(&self) -> String {
        let mut rows: Vec<&ReportRow> = self.rows.iter().collect();
        rows.sort_by(|a, b| {
            (&a.prompt_variant, &a.document)
                .cmp(&(&b.prompt_variant, &b.document))
                .then(a.temperature.total_cmp(&b.temperature))
        });

        let mut out = String::new();
        out.push_str(
            "prompt_variant,document,model,temperature,artifact_id,compilable,no_contracts,no_functions,functions_per_contract,has_comments,external_calls,initialized_params,pragma_version,vuln_high,vuln_medium,vuln_low",
        );
        for key in CONTRIBUTION_KEYS {
            let _ = write!(out, ",score_{key}");
        }
        out.push_str(",total_score\n");

        for row in rows {
            let record = &row.record;
            let functions = record
                .functions_per_contract
                .iter()
                .map(|(contract, count)| format!("{contract}:{count}"))
                .collect::<Vec<_>>()
                .join(";");
            let _ = write!(
                out,
                "{},{},{},{:.1},{},{},{},{},{},{},{},{},{},{},{},{}",
                escape(&row.prompt_variant),
                escape(&row.document),
                escape(&row.model),
                row.temperature,
                escape(&record.artifact_id),
                record.compilable,
                record.no_contracts,
                record.no_functions,
                escape(&functions),
                record.has_comments,
                record.external_calls,
                record.initialized_params,
                escape(record.pragma_version.as_deref().unwrap_or("")),
                record.vuln_high,
                record.vuln_medium,
                record.vuln_low,
            );
            for key in CONTRIBUTION_KEYS {
                let contribution = record.contributions.get(key).copied().unwrap_or(0.0);
                let _ = write!(out, ",{contribution}");
            }
            let _ = writeln!(out, ",{}", record.total_score);
        }
        out
    }

    pub fn write_csv(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_csv())
    }
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
