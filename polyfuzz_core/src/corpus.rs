use crate::seed::Seed;
use log::warn;
use rand::Rng;
use rand_core::RngCore;
use thiserror::Error;

/// Default capacity of a [`SeedCorpus`].
pub const DEFAULT_MAX_SEEDS: usize = 10;

/// Defines errors that can arise during corpus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorpusError {
    /// A corpus must be able to hold at least one seed.
    #[error("Corpus capacity must be at least 1")]
    ZeroCapacity,
}

/// A bounded, append-only, ordered collection of seeds.
///
/// The corpus keeps the first `max_seeds` seeds it ever accepts. Once it is
/// full, further additions are refused; nothing is ever evicted or replaced.
/// Seeds keep their insertion index as their ID for their whole life.
#[derive(Debug, Clone)]
pub struct SeedCorpus {
    seeds: Vec<Seed>,
    max_seeds: usize,
}

impl SeedCorpus {
    /// Creates a new, empty corpus holding at most `max_seeds` seeds.
    pub fn new(max_seeds: usize) -> Result<Self, CorpusError> {
        if max_seeds == 0 {
            return Err(CorpusError::ZeroCapacity);
        }
        Ok(Self {
            seeds: Vec::with_capacity(max_seeds),
            max_seeds,
        })
    }

    /// Creates a corpus from initial seeds, keeping only the first `max_seeds`.
    ///
    /// Surplus seeds are dropped silently apart from a warning in the log.
    pub fn with_seeds<I>(seeds: I, max_seeds: usize) -> Result<Self, CorpusError>
    where
        I: IntoIterator,
        I::Item: Into<Seed>,
    {
        let mut corpus = Self::new(max_seeds)?;
        let mut dropped = 0usize;
        for seed in seeds {
            if corpus.try_push(seed.into()).is_none() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            warn!(
                "Seed list exceeds corpus capacity of {}; ignoring the last {} seeds",
                max_seeds, dropped
            );
        }
        Ok(corpus)
    }

    /// Appends `seed` if there is room left.
    ///
    /// # Returns
    /// The ID of the appended seed, or `None` if the corpus is full.
    pub fn try_push(&mut self, seed: Seed) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        self.seeds.push(seed);
        Some(self.seeds.len() - 1)
    }

    pub fn get(&self, id: usize) -> Option<&Seed> {
        self.seeds.get(id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Seed> {
        self.seeds.get_mut(id)
    }

    /// Selects a seed uniformly at random.
    ///
    /// Returns `None` if the corpus is empty.
    pub fn random_select(&self, rng: &mut dyn RngCore) -> Option<(usize, &Seed)> {
        if self.is_empty() {
            return None;
        }
        let index = rng.random_range(0..self.seeds.len());
        self.seeds.get(index).map(|seed| (index, seed))
    }

    pub fn as_slice(&self) -> &[Seed] {
        &self.seeds
    }

    /// Mutable view used by power schedules to rewrite energies.
    /// The slice cannot change the corpus length.
    pub fn as_mut_slice(&mut self) -> &mut [Seed] {
        &mut self.seeds
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Seed> {
        self.seeds.iter()
    }

    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    pub fn max_seeds(&self) -> usize {
        self.max_seeds
    }

    pub fn is_full(&self) -> bool {
        self.seeds.len() >= self.max_seeds
    }

    pub fn into_seeds(self) -> Vec<Seed> {
        self.seeds
    }
}
