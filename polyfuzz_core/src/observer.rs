use crate::executor::ExecutionStatus;
use std::collections::HashSet;

/// An `Observer` monitors the execution of a target with a given input.
///
/// Observers are invoked by an `Executor` before (`pre_exec`) and after
/// (`post_exec`) the target is run.
pub trait Observer: Send + Sync {
    /// Returns a static string name identifying the observer.
    fn name(&self) -> &'static str;

    /// Called by the `Executor` immediately before the target is executed.
    fn pre_exec(&mut self) -> Result<(), anyhow::Error>;

    /// Called by the `Executor` once the target has returned or panicked.
    fn post_exec(&mut self, status: &ExecutionStatus) -> Result<(), anyhow::Error>;

    /// Drops everything the observer has collected so far.
    fn reset(&mut self) -> Result<(), anyhow::Error>;
}

/// Records which coverage probes a harness reached.
///
/// A harness calls [`hit`](CoverageObserver::hit) with a stable identifier for
/// every branch or block it passes through. Probes are tracked per run and
/// across the whole campaign; the cumulative count is what the fuzzer uses as
/// its coverage signal.
#[derive(Debug, Default, Clone)]
pub struct CoverageObserver {
    run_probes: HashSet<u64>,
    total_probes: HashSet<u64>,
}

impl CoverageObserver {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn hit(&mut self, probe: impl Into<u64>) {
        self.run_probes.insert(probe.into());
    }

    /// Distinct probes reached by the current (or last finished) run.
    pub fn run_coverage(&self) -> u64 {
        self.run_probes.len() as u64
    }

    /// Distinct probes reached by any finished run since the last reset.
    pub fn total_coverage(&self) -> u64 {
        self.total_probes.len() as u64
    }
}

impl Observer for CoverageObserver {
    fn name(&self) -> &'static str {
        "CoverageObserver"
    }

    fn pre_exec(&mut self) -> Result<(), anyhow::Error> {
        self.run_probes.clear();
        Ok(())
    }

    /// Merges the run's probes into the cumulative set, including probes
    /// reached before a crash.
    fn post_exec(&mut self, _status: &ExecutionStatus) -> Result<(), anyhow::Error> {
        self.total_probes.extend(self.run_probes.iter().copied());
        Ok(())
    }

    fn reset(&mut self) -> Result<(), anyhow::Error> {
        self.run_probes.clear();
        self.total_probes.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coverage_observer_tracks_run_and_total_probes() {
        let mut observer = CoverageObserver::new();
        assert_eq!(observer.name(), "CoverageObserver");
        assert_eq!(observer.total_coverage(), 0);

        observer.pre_exec().unwrap();
        observer.hit(1u64);
        observer.hit(2u64);
        observer.hit(2u64);
        assert_eq!(observer.run_coverage(), 2);
        assert_eq!(
            observer.total_coverage(),
            0,
            "Probes only count towards the total once the run finishes"
        );
        observer.post_exec(&ExecutionStatus::Ok).unwrap();
        assert_eq!(observer.total_coverage(), 2);

        observer.pre_exec().unwrap();
        assert_eq!(observer.run_coverage(), 0, "pre_exec should clear the run set");
        observer.hit(2u64);
        observer.hit(3u32);
        observer
            .post_exec(&ExecutionStatus::Crash("boom".to_string()))
            .unwrap();
        assert_eq!(observer.run_coverage(), 2);
        assert_eq!(observer.total_coverage(), 3);
    }

    #[test]
    fn reset_clears_everything() {
        let mut observer = CoverageObserver::new();
        observer.pre_exec().unwrap();
        observer.hit(7u8);
        observer.post_exec(&ExecutionStatus::Ok).unwrap();

        observer.reset().unwrap();
        assert_eq!(observer.run_coverage(), 0);
        assert_eq!(observer.total_coverage(), 0);
    }
}
