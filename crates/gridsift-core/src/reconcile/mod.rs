//! Attempt reconciliation
//!
//! Groups the results of one build by test name. Arrival order is attempt
//! order, and a failure followed by a later success of the same test is a
//! flake.

use crate::signature::{SignatureGenerator, signature_hash};
use crate::{Build, BuildStatus, ReconciledAttempt, TestResult, TestStatus};
use std::collections::HashMap;

/// All attempts of one test, oldest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestAttempts {
    pub test: String,
    pub attempts: Vec<TestResult>,
}

/// Results of one build grouped by test, in first-seen order
#[derive(Debug, Clone, Default)]
pub struct Reconciled {
    tests: Vec<TestAttempts>,
    index: HashMap<String, usize>,
}

impl Reconciled {
    pub fn get(&self, test: &str) -> Option<&[TestResult]> {
        self.index
            .get(test)
            .map(|&i| self.tests[i].attempts.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestAttempts> {
        self.tests.iter()
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Total number of attempts across all tests
    pub fn attempt_count(&self) -> usize {
        self.tests.iter().map(|t| t.attempts.len()).sum()
    }

    fn push(&mut self, result: TestResult) {
        let slot = match self.index.get(&result.test) {
            Some(&i) => i,
            None => {
                self.index.insert(result.test.clone(), self.tests.len());
                self.tests.push(TestAttempts {
                    test: result.test.clone(),
                    attempts: Vec::new(),
                });
                self.tests.len() - 1
            }
        };

        let attempts = &mut self.tests[slot].attempts;
        if result.status == TestStatus::Success {
            for prev in attempts.iter_mut() {
                if prev.status == TestStatus::Failure {
                    prev.status = TestStatus::Flake;
                }
            }
        }
        attempts.push(result);
    }

    /// Build the persisted rows of a build
    ///
    /// The last attempt of a test gets index 0, earlier ones count down.
    pub fn into_rows(
        self,
        build: &Build,
        status: &BuildStatus,
        signatures: &SignatureGenerator,
    ) -> Vec<ReconciledAttempt> {
        let mut rows = Vec::with_capacity(self.attempt_count());
        for TestAttempts { test, attempts } in self.tests {
            let count = attempts.len() as i64;
            for (i, result) in attempts.into_iter().enumerate() {
                let signature = signatures.signature(&result.output);
                rows.push(ReconciledAttempt {
                    job: build.job.clone(),
                    build_id: build.build_id.clone(),
                    test: test.clone(),
                    finished_at: status.finished_at,
                    attempt: i as i64 - count + 1,
                    attempts: count,
                    status: result.status,
                    signature_hash: signature_hash(&signature),
                    signature,
                    output: result.output,
                });
            }
        }
        rows
    }
}

/// Group results by test name, promoting failures that later passed to flakes
pub fn reconcile(results: impl IntoIterator<Item = TestResult>) -> Reconciled {
    let mut reconciled = Reconciled::default();
    for result in results {
        reconciled.push(result);
    }
    reconciled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BuildResult;
    use TestStatus::*;

    fn statuses(reconciled: &Reconciled, test: &str) -> Vec<TestStatus> {
        reconciled
            .get(test)
            .unwrap()
            .iter()
            .map(|r| r.status)
            .collect()
    }

    fn results(seq: &[(&str, TestStatus)]) -> Vec<TestResult> {
        seq.iter()
            .map(|(name, status)| TestResult::new(*name, *status, ""))
            .collect()
    }

    #[test]
    fn test_failures_before_success_become_flakes() {
        let r = reconcile(results(&[("a", Failure), ("a", Failure), ("a", Success)]));
        assert_eq!(statuses(&r, "a"), vec![Flake, Flake, Success]);
    }

    #[test]
    fn test_failures_without_success_stay() {
        let r = reconcile(results(&[("a", Failure), ("a", Failure)]));
        assert_eq!(statuses(&r, "a"), vec![Failure, Failure]);

        let r = reconcile(results(&[("a", Failure)]));
        assert_eq!(statuses(&r, "a"), vec![Failure]);
    }

    #[test]
    fn test_failure_after_success_is_not_a_flake() {
        let r = reconcile(results(&[("a", Success), ("a", Failure)]));
        assert_eq!(statuses(&r, "a"), vec![Success, Failure]);
    }

    #[test]
    fn test_only_failures_are_promoted() {
        let r = reconcile(results(&[("a", Error), ("a", Skipped), ("a", Failure), ("a", Success)]));
        assert_eq!(statuses(&r, "a"), vec![Error, Skipped, Flake, Success]);
    }

    #[test]
    fn test_tests_are_independent() {
        let r = reconcile(results(&[("a", Failure), ("b", Success), ("b", Failure), ("a", Failure)]));
        assert_eq!(statuses(&r, "a"), vec![Failure, Failure]);
        assert_eq!(statuses(&r, "b"), vec![Success, Failure]);

        let order: Vec<_> = r.iter().map(|t| t.test.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
        assert_eq!(r.len(), 2);
        assert_eq!(r.attempt_count(), 4);
    }

    #[test]
    fn test_rows_count_attempts_backwards() {
        let build = Build {
            job: "job".to_string(),
            build_id: "42".to_string(),
            bucket: "bkt".to_string(),
            prefix: "logs/job/42/".to_string(),
        };
        let status = BuildStatus {
            started_at: 10,
            finished_at: 20,
            result: BuildResult::Success,
        };
        let mut input = results(&[("a", Failure), ("a", Failure), ("b", Success), ("a", Success)]);
        input[0].output = "error: first try".to_string();

        let rows = reconcile(input).into_rows(&build, &status, &SignatureGenerator::default());
        assert_eq!(rows.len(), 4);

        let a: Vec<_> = rows.iter().filter(|r| r.test == "a").collect();
        assert_eq!(
            a.iter().map(|r| (r.attempt, r.attempts, r.status)).collect::<Vec<_>>(),
            vec![(-2, 3, Flake), (-1, 3, Flake), (0, 3, Success)]
        );
        assert_eq!(a[0].signature, "error: first try");
        assert!(!a[0].signature_hash.is_empty());
        assert!(a[1].signature.is_empty());
        assert!(a[1].signature_hash.is_empty());

        let b: Vec<_> = rows.iter().filter(|r| r.test == "b").collect();
        assert_eq!((b[0].attempt, b[0].attempts), (0, 1));
        assert!(rows.iter().all(|r| r.finished_at == 20 && r.build_id == "42"));
    }

    #[test]
    fn test_empty_input() {
        let r = reconcile(Vec::new());
        assert!(r.is_empty());
        assert!(r.get("a").is_none());
    }
}
