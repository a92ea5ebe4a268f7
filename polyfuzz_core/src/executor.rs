use crate::observer::{CoverageObserver, Observer};
use log::error;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Ok,
    Crash(String),
    ObserverError(String),
}

/// The outcome of running one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub status: ExecutionStatus,
    /// Distinct probes reached by this run alone.
    pub run_coverage: u64,
    /// Distinct probes reached by every run so far, this one included.
    pub total_coverage: u64,
    pub duration: Duration,
}

pub trait Executor {
    fn execute(&mut self, input: &str) -> ExecutionReport;
}

/// Runs a harness function in the fuzzer's own process.
///
/// The harness receives the input and the executor's [`CoverageObserver`] to
/// report probes into. A panic inside the harness is caught and reported as
/// `ExecutionStatus::Crash` carrying the panic message.
pub struct InProcessExecutor<F>
where
    F: FnMut(&str, &mut CoverageObserver),
{
    harness_fn: F,
    coverage: CoverageObserver,
}

impl<F> InProcessExecutor<F>
where
    F: FnMut(&str, &mut CoverageObserver),
{
    pub fn new(harness_fn: F) -> Self {
        Self {
            harness_fn,
            coverage: CoverageObserver::new(),
        }
    }

    pub fn coverage(&self) -> &CoverageObserver {
        &self.coverage
    }
}

impl<F> Executor for InProcessExecutor<F>
where
    F: FnMut(&str, &mut CoverageObserver),
{
    fn execute(&mut self, input: &str) -> ExecutionReport {
        let started = Instant::now();

        if let Err(e) = self.coverage.pre_exec() {
            let error_msg = format!("Observer '{}' pre_exec failed: {}", self.coverage.name(), e);
            error!("{error_msg}");
            return ExecutionReport {
                status: ExecutionStatus::ObserverError(error_msg),
                run_coverage: 0,
                total_coverage: self.coverage.total_coverage(),
                duration: started.elapsed(),
            };
        }

        let harness_fn = &mut self.harness_fn;
        let coverage = &mut self.coverage;
        let result = catch_unwind(AssertUnwindSafe(|| harness_fn(input, coverage)));
        let duration = started.elapsed();

        let mut status = match result {
            Ok(()) => ExecutionStatus::Ok,
            Err(panic_payload) => {
                let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic type".to_string()
                };
                ExecutionStatus::Crash(msg)
            }
        };

        if let Err(e) = self.coverage.post_exec(&status) {
            let error_msg = format!(
                "Observer '{}' post_exec failed: {}",
                self.coverage.name(),
                e
            );
            error!("{error_msg}");
            if status == ExecutionStatus::Ok {
                status = ExecutionStatus::ObserverError(error_msg);
            }
        }

        ExecutionReport {
            status,
            run_coverage: self.coverage.run_coverage(),
            total_coverage: self.coverage.total_coverage(),
            duration,
        }
    }
}
