use serde::Serialize;

/// Coverage observations in execution order, one per executed input.
///
/// The history only ever grows; bounding it is up to whoever drives the loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CoverageHistory {
    observations: Vec<u64>,
}

impl CoverageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, coverage: u64) {
        self.observations.push(coverage);
    }

    pub fn latest(&self) -> Option<u64> {
        self.observations.last().copied()
    }

    /// The two most recent observations as `(previous, latest)`.
    pub fn last_two(&self) -> Option<(u64, u64)> {
        match self.observations.as_slice() {
            [.., previous, latest] => Some((*previous, *latest)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.observations
    }
}

impl From<Vec<u64>> for CoverageHistory {
    fn from(observations: Vec<u64>) -> Self {
        Self { observations }
    }
}

/// Decides whether the most recently executed input earned a place in the corpus.
///
/// An input is interesting iff its coverage strictly exceeds the coverage of
/// the run immediately before it. This is a comparison against the previous
/// run only, not against the best coverage seen so far.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoverageIncreaseFeedback;

impl CoverageIncreaseFeedback {
    pub fn new() -> Self {
        CoverageIncreaseFeedback
    }

    pub fn name(&self) -> &'static str {
        "CoverageIncreaseFeedback"
    }

    pub fn is_interesting(&self, history: &CoverageHistory) -> bool {
        history
            .last_two()
            .is_some_and(|(previous, latest)| latest > previous)
    }
}
