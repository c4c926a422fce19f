//! Failure signatures
//!
//! A signature is the sorted, deduplicated set of denoised lines of an output
//! that look like errors. Outputs with the same set of error lines share a
//! signature regardless of line order or repetition.

pub mod denoise;

pub use denoise::denoise;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Patterns deciding which lines contribute to a signature
///
/// Both lists are regular expressions matched case-insensitively against the
/// denoised line. Exclusions win over error matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureConfig {
    pub error_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        let error_patterns = [
            "error",
            "fail",
            "unable",
            "illegal",
            "violation",
            "forbidden",
            "cannot",
            "can't",
            "should not",
            "did not",
            "didn't",
            "isn't",
            "is not",
            "aren't",
            "are not",
            "timed?.?out",
            "unavailable",
        ];
        Self {
            error_patterns: error_patterns.iter().map(|s| s.to_string()).collect(),
            exclude_patterns: vec!["INFO: .* event for".to_string()],
        }
    }
}

/// Compiled signature rules
#[derive(Debug, Clone)]
pub struct SignatureGenerator {
    error_line: Option<Regex>,
    exclude_line: Option<Regex>,
}

impl SignatureGenerator {
    pub fn new(config: &SignatureConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            error_line: compile_any(&config.error_patterns)?,
            exclude_line: compile_any(&config.exclude_patterns)?,
        })
    }

    /// Whether a denoised line belongs in a signature
    pub fn is_error_line(&self, line: &str) -> bool {
        let is_error = self.error_line.as_ref().is_some_and(|re| re.is_match(line));
        let excluded = self.exclude_line.as_ref().is_some_and(|re| re.is_match(line));
        is_error && !excluded
    }

    /// Compute the signature of an output
    pub fn signature(&self, output: &str) -> String {
        let lines: BTreeSet<String> = output
            .split('\n')
            .map(denoise)
            .filter(|line| self.is_error_line(line))
            .collect();
        lines.into_iter().collect::<Vec<_>>().join("\n")
    }
}

impl Default for SignatureGenerator {
    fn default() -> Self {
        Self::new(&SignatureConfig::default()).expect("default signature patterns are valid")
    }
}

/// Join patterns into one case-insensitive alternation; `None` if empty
fn compile_any(patterns: &[String]) -> Result<Option<Regex>, regex::Error> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let alternation = patterns
        .iter()
        .map(|p| format!("(?:{})", p))
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&alternation)
        .case_insensitive(true)
        .build()
        .map(Some)
}

/// Hex SHA-256 of a signature, or an empty string for an empty signature
pub fn signature_hash(signature: &str) -> String {
    if signature.is_empty() {
        return String::new();
    }
    hex::encode(Sha256::digest(signature.as_bytes()))
}
