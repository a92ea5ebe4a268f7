use crate::executor::ExecutionStatus;
use serde::Serialize;

/// Default severity level for crashes detected by `CrashOracle`.
const DEFAULT_CRASH_SEVERITY: u8 = 10;

/// A finding identified by an `Oracle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BugReport {
    /// The input that triggered this report.
    pub input: String,
    /// A human-readable description of the finding.
    pub description: String,
    /// MD5 of the input as lowercase hex, used to deduplicate findings.
    pub input_hash: String,
    pub severity: u8,
}

/// An `Oracle` examines the outcome of an execution to determine if a bug has occurred.
pub trait Oracle: Send + Sync {
    fn name(&self) -> &'static str;

    /// # Returns
    /// `Some(BugReport)` if `status` reveals a bug, otherwise `None`.
    fn examine(&self, input: &str, status: &ExecutionStatus) -> Option<BugReport>;
}

/// Reports a bug whenever the execution status is `Crash`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrashOracle;

impl CrashOracle {
    pub fn new() -> Self {
        CrashOracle
    }
}

pub fn input_hash(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

impl Oracle for CrashOracle {
    fn name(&self) -> &'static str {
        "CrashOracle"
    }

    fn examine(&self, input: &str, status: &ExecutionStatus) -> Option<BugReport> {
        match status {
            ExecutionStatus::Crash(description) => Some(BugReport {
                input: input.to_string(),
                description: description.clone(),
                input_hash: input_hash(input),
                severity: DEFAULT_CRASH_SEVERITY,
            }),
            _ => None,
        }
    }
}
