//! Gridsift Core Library
//!
//! Core functionality for the gridsift CI test-result indexer.
//! Provides object store access, build discovery, JUnit/log ingestion,
//! attempt reconciliation, failure signatures and graph database persistence.

pub mod artifacts;
pub mod config;
pub mod graph;
pub mod index;
pub mod reconcile;
pub mod signature;
pub mod store;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One execution of a CI job, located under a store prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Build {
    /// Job name
    pub job: String,
    /// Build identifier (the directory name under the job prefix)
    pub build_id: String,
    /// Bucket holding the build artifacts
    pub bucket: String,
    /// Object prefix of the build, always ending with `/`
    pub prefix: String,
}

impl Build {
    /// Full object name of a file that lives directly under the build prefix
    pub fn object(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }
}

impl std::fmt::Display for Build {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} @ {} (gs://{}/{})",
            self.job, self.build_id, self.bucket, self.prefix
        )
    }
}

/// A build together with the complete listing of its artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMeta {
    pub build: Build,
    /// Full object names of every file under the build prefix
    pub files: BTreeSet<String>,
}

impl BuildMeta {
    pub fn contains(&self, object: &str) -> bool {
        self.files.contains(object)
    }
}

/// Final outcome of a build as recorded in its `finished.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildResult {
    Success,
    Failure,
    Aborted,
    Error,
    /// Any value not known to the indexer, kept verbatim
    Other(String),
}

impl BuildResult {
    pub fn as_str(&self) -> &str {
        match self {
            BuildResult::Success => "SUCCESS",
            BuildResult::Failure => "FAILURE",
            BuildResult::Aborted => "ABORTED",
            BuildResult::Error => "ERROR",
            BuildResult::Other(s) => s,
        }
    }
}

impl From<&str> for BuildResult {
    fn from(s: &str) -> Self {
        match s {
            "SUCCESS" => BuildResult::Success,
            "FAILURE" => BuildResult::Failure,
            "ABORTED" => BuildResult::Aborted,
            "ERROR" => BuildResult::Error,
            other => BuildResult::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for BuildResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing and result of a finished build
///
/// Once persisted, a status marks the build as fully processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStatus {
    /// Unix timestamp from `started.json`
    pub started_at: i64,
    /// Unix timestamp from `finished.json`
    pub finished_at: i64,
    pub result: BuildResult,
}

/// Outcome of a single test attempt
///
/// The discriminants are persisted as-is and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TestStatus {
    Info = 0,
    Skipped = 1,
    Error = 2,
    Failure = 3,
    Flake = 4,
    Success = 5,
}

impl TestStatus {
    pub const ALL: [TestStatus; 6] = [
        TestStatus::Info,
        TestStatus::Skipped,
        TestStatus::Error,
        TestStatus::Failure,
        TestStatus::Flake,
        TestStatus::Success,
    ];

    /// Numeric code used in the persisted rows
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            TestStatus::Info => "Info",
            TestStatus::Skipped => "Skipped",
            TestStatus::Error => "Error",
            TestStatus::Failure => "Failure",
            TestStatus::Flake => "Flake",
            TestStatus::Success => "Success",
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single test outcome extracted from a report or a build log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub test: String,
    pub status: TestStatus,
    pub output: String,
}

impl TestResult {
    pub fn new(test: impl Into<String>, status: TestStatus, output: impl Into<String>) -> Self {
        Self {
            test: test.into(),
            status,
            output: output.into(),
        }
    }
}

/// A persisted row: one attempt of one test within one build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledAttempt {
    pub job: String,
    pub build_id: String,
    pub test: String,
    pub finished_at: i64,
    /// Zero for the last attempt, negative for earlier ones
    pub attempt: i64,
    /// Number of attempts of this test in the build
    pub attempts: i64,
    pub status: TestStatus,
    pub output: String,
    pub signature: String,
    /// SHA-256 of `signature`, empty when the signature is empty
    pub signature_hash: String,
}

/// Replace invalid UTF-8 and NUL bytes with `?`
///
/// A run of consecutive invalid bytes becomes a single `?`. The persistence
/// layer cannot store NULs in text fields, so every piece of ingested output
/// goes through here.
pub fn sanitize_text(bytes: &[u8]) -> String {
    sanitize_text_checked(bytes).0
}

/// Same as `sanitize_text`, also reporting whether any invalid UTF-8 was found
pub fn sanitize_text_checked(bytes: &[u8]) -> (String, bool) {
    let mut out = String::with_capacity(bytes.len());
    let mut repaired = false;
    let mut in_invalid_run = false;
    for chunk in bytes.utf8_chunks() {
        if !chunk.valid().is_empty() {
            out.push_str(chunk.valid());
            in_invalid_run = false;
        }
        if !chunk.invalid().is_empty() {
            if !in_invalid_run {
                out.push('?');
            }
            in_invalid_run = true;
            repaired = true;
        }
    }
    if out.contains('\0') {
        out = out.replace('\0', "?");
    }
    (out, repaired)
}
