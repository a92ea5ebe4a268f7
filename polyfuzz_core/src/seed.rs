use serde::Serialize;

/// An input retained in the corpus, together with the coverage it achieved
/// and the energy last assigned to it by a power schedule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Seed {
    data: String,
    /// Coverage observed when this seed was executed; 0 until measured.
    pub coverage: u64,
    /// Selection weight, rewritten by every `PowerSchedule::choose` call.
    pub energy: f64,
}

impl Seed {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            coverage: 0,
            energy: 0.0,
        }
    }

    pub fn with_coverage(mut self, coverage: u64) -> Self {
        self.coverage = coverage;
        self
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    /// Length of the input in characters, as used by the energy formulas.
    pub fn char_len(&self) -> usize {
        self.data.chars().count()
    }
}

impl From<&str> for Seed {
    fn from(data: &str) -> Self {
        Seed::new(data)
    }
}

impl From<String> for Seed {
    fn from(data: String) -> Self {
        Seed::new(data)
    }
}
