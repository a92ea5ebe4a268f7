use crate::executor::Executor;
use crate::feedback::CoverageHistory;
use crate::fuzzer::{FuzzError, Fuzzer};
use crate::oracle::{BugReport, CrashOracle, Oracle};
use crate::seed::Seed;
use log::{debug, info};
use rand_core::RngCore;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Instant;

/// Everything a finished campaign observed, in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignReport {
    pub executions: u64,
    /// Cumulative coverage after each execution.
    pub coverage: CoverageHistory,
    /// Wall-clock duration of each execution, in microseconds.
    pub execution_times_us: Vec<u64>,
    /// One report per distinct crashing input.
    pub crashes: Vec<BugReport>,
    /// The corpus as it stood when the campaign ended.
    pub corpus: Vec<Seed>,
}

impl CampaignReport {
    pub fn final_coverage(&self) -> u64 {
        self.coverage.latest().unwrap_or_default()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Drives a [`Fuzzer`] against an [`Executor`] for a fixed number of executions.
pub struct Campaign {
    budget: u64,
    oracle: Box<dyn Oracle>,
}

impl Campaign {
    pub fn new(budget: u64) -> Self {
        Self {
            budget,
            oracle: Box::new(CrashOracle::new()),
        }
    }

    pub fn with_oracle(mut self, oracle: Box<dyn Oracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Runs `budget` generate / execute / update steps.
    ///
    /// Stops at the first error raised by the fuzzer; nothing observed up to
    /// that point is reported in that case.
    pub fn run<R, E>(
        &self,
        fuzzer: &mut Fuzzer<R>,
        executor: &mut E,
    ) -> Result<CampaignReport, FuzzError>
    where
        R: RngCore,
        E: Executor + ?Sized,
    {
        info!(
            "Starting campaign for {} executions with {} seeds, oracle {}",
            self.budget,
            fuzzer.seeds().len(),
            self.oracle.name()
        );
        let started = Instant::now();
        let progress_every = (self.budget / 10).max(1);

        let mut coverage = CoverageHistory::new();
        let mut execution_times_us = Vec::new();
        let mut crashes = Vec::new();
        let mut crash_hashes = HashSet::new();
        let mut promoted = 0usize;

        for i in 0..self.budget {
            let input = fuzzer.generate_input()?;
            let report = executor.execute(&input);

            coverage.push(report.total_coverage);
            let micros = u64::try_from(report.duration.as_micros()).unwrap_or(u64::MAX);
            execution_times_us.push(micros);

            if fuzzer.update(&input, &coverage, report.run_coverage) {
                promoted += 1;
            }

            if let Some(bug_report) = self.oracle.examine(&input, &report.status) {
                if crash_hashes.insert(bug_report.input_hash.clone()) {
                    debug!(
                        "Crash found at execution {}: {} (input {:?}, hash {})",
                        i + 1,
                        bug_report.description,
                        bug_report.input,
                        bug_report.input_hash
                    );
                    crashes.push(bug_report);
                }
            }

            if (i + 1) % progress_every == 0 {
                let elapsed = started.elapsed().as_secs_f32();
                let exec_per_sec = if elapsed > 0.0 {
                    (i + 1) as f32 / elapsed
                } else {
                    0.0
                };
                info!(
                    "Iter: {}/{}, Coverage: {}, Corpus: {}, Crashes: {}, Execs/sec: {:.2}",
                    i + 1,
                    self.budget,
                    report.total_coverage,
                    fuzzer.seeds().len(),
                    crashes.len(),
                    exec_per_sec
                );
            }
        }

        info!(
            "Campaign finished in {:.2?}: {} executions, coverage {}, {} seeds promoted, {} unique crashes",
            started.elapsed(),
            self.budget,
            coverage.latest().unwrap_or_default(),
            promoted,
            crashes.len()
        );

        Ok(CampaignReport {
            executions: self.budget,
            coverage,
            execution_times_us,
            crashes,
            corpus: fuzzer.seeds().to_vec(),
        })
    }
}
