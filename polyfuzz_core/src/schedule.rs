use crate::seed::Seed;
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand_core::RngCore;
use serde::Deserialize;
use thiserror::Error;

/// Bonus multiplier applied by [`AboveMeanSchedule`] to above-average coverage.
pub const DEFAULT_ABOVE_MEAN_BONUS: f64 = 1000.0;

/// Errors that can occur during power schedule operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// Indicates that no seeds were supplied, and therefore none can be chosen.
    #[error("Corpus is empty, cannot choose a seed")]
    EmptyCorpus,
}

/// A `PowerSchedule` decides how much of the fuzzing effort each seed receives.
///
/// Implementations only provide the energy formula; selection itself is shared.
/// Energies are recomputed from the current seeds on every call, so a schedule
/// holds no state of its own.
pub trait PowerSchedule: Send + Sync + std::fmt::Debug {
    /// Returns a static string name identifying the schedule.
    fn name(&self) -> &'static str;

    /// Writes a fresh `energy` value into every seed.
    ///
    /// Must be a pure function of the seeds' data and coverage: calling it twice
    /// without touching the seeds yields identical energies.
    fn assign_energy(&self, seeds: &mut [Seed]);

    /// Assigns energies, then picks a seed with probability proportional to its energy.
    ///
    /// Seeds whose energy is zero, negative or not finite are never picked,
    /// unless no seed has a positive weight, in which case the pick falls back to
    /// a uniform choice.
    ///
    /// # Returns
    /// The index of the chosen seed within `seeds`, or
    /// `ScheduleError::EmptyCorpus` if `seeds` is empty.
    fn choose(&self, seeds: &mut [Seed], rng: &mut dyn RngCore) -> Result<usize, ScheduleError> {
        if seeds.is_empty() {
            return Err(ScheduleError::EmptyCorpus);
        }
        self.assign_energy(seeds);

        let weights: Vec<f64> = seeds
            .iter()
            .map(|seed| {
                if seed.energy.is_finite() && seed.energy > 0.0 {
                    seed.energy
                } else {
                    0.0
                }
            })
            .collect();

        match WeightedIndex::new(&weights) {
            Ok(distribution) => Ok(distribution.sample(rng)),
            Err(_) => Ok(rng.random_range(0..seeds.len())),
        }
    }
}

/// Favors short seeds with high coverage:
/// `energy = (coverage + 1) / (len + 1)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoverageDensitySchedule;

impl CoverageDensitySchedule {
    pub fn new() -> Self {
        CoverageDensitySchedule
    }
}

impl PowerSchedule for CoverageDensitySchedule {
    fn name(&self) -> &'static str {
        "CoverageDensitySchedule"
    }

    fn assign_energy(&self, seeds: &mut [Seed]) {
        for seed in seeds.iter_mut() {
            seed.energy = (seed.coverage as f64 + 1.0) / (seed.char_len() as f64 + 1.0);
        }
    }
}

/// Rewards seeds that beat the corpus average coverage:
/// `energy = (max(coverage - mean, 0) * bonus + 1) / (len + 1)`.
///
/// Seeds at or below the mean keep only the `1 / (len + 1)` floor, so the
/// weighted pick is dominated by the seeds that outperform the rest.
#[derive(Debug, Clone, Copy)]
pub struct AboveMeanSchedule {
    bonus: f64,
}

impl AboveMeanSchedule {
    pub fn new() -> Self {
        Self::with_bonus(DEFAULT_ABOVE_MEAN_BONUS)
    }

    pub fn with_bonus(bonus: f64) -> Self {
        Self { bonus }
    }
}

impl Default for AboveMeanSchedule {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerSchedule for AboveMeanSchedule {
    fn name(&self) -> &'static str {
        "AboveMeanSchedule"
    }

    fn assign_energy(&self, seeds: &mut [Seed]) {
        if seeds.is_empty() {
            return;
        }
        let mean_coverage =
            seeds.iter().map(|seed| seed.coverage as f64).sum::<f64>() / seeds.len() as f64;
        for seed in seeds.iter_mut() {
            let above_mean = (seed.coverage as f64 - mean_coverage).max(0.0);
            seed.energy = (above_mean * self.bonus + 1.0) / (seed.char_len() as f64 + 1.0);
        }
    }
}

/// Power schedule selection as it appears in configuration files.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleKind {
    CoverageDensity,
    AboveMean,
}

impl ScheduleKind {
    pub fn build(self) -> Box<dyn PowerSchedule> {
        match self {
            ScheduleKind::CoverageDensity => Box::new(CoverageDensitySchedule::new()),
            ScheduleKind::AboveMean => Box::new(AboveMeanSchedule::new()),
        }
    }
}
