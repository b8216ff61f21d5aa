use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ExtractionError;

// Greedy: anchors on the version directive and runs to the last closing
// brace, so surrounding prose and markdown fences are discarded while
// multi-contract responses stay intact.
static CONTRACT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)pragma solidity.*\}").expect("static extraction pattern"));

/// Carve the contract source out of a free-form model response.
///
/// A missing `pragma solidity` marker (model declined, prose-only answer,
/// truncated response) is a typed failure rather than an empty artifact,
/// so it cannot later be mistaken for a non-compilable contract.
pub fn extract_contract(raw_text: &str, artifact: &str) -> Result<String, ExtractionError> {
    CONTRACT_RE
        .find(raw_text)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ExtractionError::NoContract {
            artifact: artifact.to_string(),
        })
}
