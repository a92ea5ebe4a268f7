use crate::fuzzer::FuzzError;
use crate::grammar::{ExpansionLimits, Grammar};
use rand::Rng;
use rand_core::RngCore;

/// Lowest code point produced by the random-character mutators (space).
pub const PRINTABLE_MIN: u8 = 32;
/// Highest code point produced by the random-character mutators (`~`).
pub const PRINTABLE_MAX: u8 = 126;

/// A `Mutator` turns one candidate string into the next.
///
/// The fuzzing loop stacks mutators: each one receives the output of the
/// previous step, not the original seed.
pub trait Mutator: Send + Sync {
    /// Returns a static string name identifying the mutator.
    fn name(&self) -> &'static str;

    /// Produces a new candidate from `input`.
    ///
    /// # Arguments
    /// * `input`: The current candidate.
    /// * `rng`: Source of every random decision the mutator makes.
    fn mutate(&mut self, input: &str, rng: &mut dyn RngCore) -> Result<String, FuzzError>;
}

fn random_printable_char(rng: &mut dyn RngCore) -> char {
    char::from(rng.random_range(PRINTABLE_MIN..=PRINTABLE_MAX))
}

/// Removes the character at a uniformly random position. Empty input is returned unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeleteRandomCharMutator;

impl Mutator for DeleteRandomCharMutator {
    fn name(&self) -> &'static str {
        "DeleteRandomCharMutator"
    }

    fn mutate(&mut self, input: &str, rng: &mut dyn RngCore) -> Result<String, FuzzError> {
        let char_count = input.chars().count();
        if char_count == 0 {
            return Ok(String::new());
        }
        let target = rng.random_range(0..char_count);
        Ok(input
            .chars()
            .enumerate()
            .filter_map(|(index, c)| (index != target).then_some(c))
            .collect())
    }
}

/// Overwrites the character at a uniformly random position with a random
/// printable ASCII character. Empty input is returned unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplaceRandomCharMutator;

impl Mutator for ReplaceRandomCharMutator {
    fn name(&self) -> &'static str {
        "ReplaceRandomCharMutator"
    }

    fn mutate(&mut self, input: &str, rng: &mut dyn RngCore) -> Result<String, FuzzError> {
        let char_count = input.chars().count();
        if char_count == 0 {
            return Ok(String::new());
        }
        let target = rng.random_range(0..char_count);
        let replacement = random_printable_char(rng);
        Ok(input
            .chars()
            .enumerate()
            .map(|(index, c)| if index == target { replacement } else { c })
            .collect())
    }
}

/// Inserts a random printable ASCII character at a uniformly random position,
/// including past the last character.
#[derive(Debug, Default, Clone, Copy)]
pub struct InsertRandomCharMutator;

impl Mutator for InsertRandomCharMutator {
    fn name(&self) -> &'static str {
        "InsertRandomCharMutator"
    }

    fn mutate(&mut self, input: &str, rng: &mut dyn RngCore) -> Result<String, FuzzError> {
        let position = rng.random_range(0..=input.chars().count());
        let inserted = random_printable_char(rng);
        let byte_offset = input
            .char_indices()
            .nth(position)
            .map_or(input.len(), |(offset, _)| offset);

        let mut output = String::with_capacity(input.len() + 1);
        output.push_str(&input[..byte_offset]);
        output.push(inserted);
        output.push_str(&input[byte_offset..]);
        Ok(output)
    }
}

/// Discards the input and generates a fresh string from a grammar.
#[derive(Debug, Clone)]
pub struct GrammarMutator {
    grammar: Grammar,
    limits: ExpansionLimits,
}

impl GrammarMutator {
    pub fn new(grammar: Grammar, limits: ExpansionLimits) -> Self {
        Self { grammar, limits }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }
}

impl Mutator for GrammarMutator {
    fn name(&self) -> &'static str {
        "GrammarMutator"
    }

    fn mutate(&mut self, _input: &str, rng: &mut dyn RngCore) -> Result<String, FuzzError> {
        Ok(self.grammar.generate_with(None, self.limits, rng)?)
    }
}

/// The character-level mutators every fuzzer starts with, in their canonical order.
pub fn character_mutators() -> Vec<Box<dyn Mutator>> {
    vec![
        Box::new(DeleteRandomCharMutator),
        Box::new(ReplaceRandomCharMutator),
        Box::new(InsertRandomCharMutator),
    ]
}
