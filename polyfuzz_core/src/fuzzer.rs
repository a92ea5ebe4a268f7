use crate::config::FuzzerSettings;
use crate::corpus::{CorpusError, SeedCorpus};
use crate::feedback::{CoverageHistory, CoverageIncreaseFeedback};
use crate::grammar::{Grammar, GrammarError};
use crate::mutator::{GrammarMutator, Mutator, character_mutators};
use crate::schedule::{PowerSchedule, ScheduleError};
use crate::seed::Seed;
use log::debug;
use rand::Rng;
use rand_core::RngCore;
use thiserror::Error;

/// Errors surfaced by the fuzzing loop.
///
/// Each error is local to the call that raised it: the corpus and the seeding
/// cursor are left exactly as they were.
#[derive(Error, Debug)]
pub enum FuzzError {
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    /// No seed is available to mutate.
    #[error("Corpus is empty, cannot pick a base seed")]
    EmptyCorpus,
    #[error("Invalid fuzzer configuration: {0}")]
    InvalidConfig(String),
}

/// The seed-corpus / mutation loop.
///
/// A `Fuzzer` first hands out every seed verbatim, in order (the seeding
/// phase). From then on each input is a candidate built by stacking random
/// mutations on a base seed chosen by the power schedule, or uniformly when no
/// schedule is configured. Feedback from the executor grows the corpus up to
/// its fixed capacity.
pub struct Fuzzer<R: RngCore> {
    corpus: SeedCorpus,
    seed_index: usize,
    /// Corpus ID of the seed returned by the last seeding-phase call, until `update`.
    pending_seed: Option<usize>,
    power_schedule: Option<Box<dyn PowerSchedule>>,
    grammar: Option<Grammar>,
    min_mutations: usize,
    max_mutations: usize,
    mutators: Vec<Box<dyn Mutator>>,
    feedback: CoverageIncreaseFeedback,
    settings: FuzzerSettings,
    rng: R,
}

impl<R: RngCore> Fuzzer<R> {
    /// Creates a fuzzer over `seeds` with the three character-level mutators.
    ///
    /// Seeds beyond `settings.max_seeds` are dropped. Fails with
    /// `FuzzError::InvalidConfig` if the settings are out of range.
    pub fn new<I>(seeds: I, settings: &FuzzerSettings, rng: R) -> Result<Self, FuzzError>
    where
        I: IntoIterator,
        I::Item: Into<Seed>,
    {
        settings.validate()?;
        let corpus = SeedCorpus::with_seeds(seeds, settings.max_seeds)?;
        Ok(Self {
            corpus,
            seed_index: 0,
            pending_seed: None,
            power_schedule: None,
            grammar: None,
            min_mutations: settings.min_mutations,
            max_mutations: settings.max_mutations,
            mutators: character_mutators(),
            feedback: CoverageIncreaseFeedback::new(),
            settings: settings.clone(),
            rng,
        })
    }

    pub fn with_power_schedule(mut self, schedule: Box<dyn PowerSchedule>) -> Self {
        self.power_schedule = Some(schedule);
        self
    }

    /// Enables grammar-based generation through a [`GrammarMutator`].
    ///
    /// A grammar mutator installed by an earlier call is replaced, not stacked.
    pub fn with_grammar(mut self, grammar: Grammar) -> Self {
        let mutator = GrammarMutator::new(grammar.clone(), self.settings.expansion_limits());
        self.mutators.retain(|existing| existing.name() != mutator.name());
        self.mutators.push(Box::new(mutator));
        self.grammar = Some(grammar);
        self
    }

    /// Replaces the mutator set. An empty set is rejected.
    pub fn with_mutators(mut self, mutators: Vec<Box<dyn Mutator>>) -> Result<Self, FuzzError> {
        if mutators.is_empty() {
            return Err(FuzzError::InvalidConfig(
                "at least one mutator is required".to_string(),
            ));
        }
        self.mutators = mutators;
        Ok(self)
    }

    /// Returns the next input to execute.
    ///
    /// While unreturned seeds remain, the next seed is returned as-is and the
    /// cursor advances. Afterwards every call creates a mutated candidate; the
    /// cursor never rewinds.
    pub fn generate_input(&mut self) -> Result<String, FuzzError> {
        if let Some(seed) = self.corpus.get(self.seed_index) {
            let input = seed.data().to_string();
            self.pending_seed = Some(self.seed_index);
            self.seed_index += 1;
            return Ok(input);
        }
        self.pending_seed = None;
        self.create_candidate()
    }

    /// Builds a candidate by applying a random number of stacked mutations,
    /// between `min_mutations` and `max_mutations` inclusive, to a base seed.
    pub fn create_candidate(&mut self) -> Result<String, FuzzError> {
        let base_id = match &self.power_schedule {
            Some(schedule) => schedule.choose(self.corpus.as_mut_slice(), &mut self.rng)?,
            None => self
                .corpus
                .random_select(&mut self.rng)
                .map(|(id, _)| id)
                .ok_or(FuzzError::EmptyCorpus)?,
        };
        let mut candidate = self
            .corpus
            .get(base_id)
            .map(|seed| seed.data().to_string())
            .ok_or(FuzzError::EmptyCorpus)?;

        let rounds = self
            .rng
            .random_range(self.min_mutations..=self.max_mutations);
        for _ in 0..rounds {
            candidate = self.mutate(&candidate)?;
        }
        Ok(candidate)
    }

    /// Applies one uniformly chosen mutator to `input`.
    pub fn mutate(&mut self, input: &str) -> Result<String, FuzzError> {
        let index = self.rng.random_range(0..self.mutators.len());
        self.mutators[index].mutate(input, &mut self.rng)
    }

    /// Feeds back the outcome of executing `input`.
    ///
    /// `history` must already contain the cumulative coverage of this
    /// execution as its newest entry; `run_coverage` is what this execution
    /// reached on its own. When the newest history entry strictly exceeds the
    /// one before it and the corpus has room, `input` is appended as a new seed
    /// carrying `run_coverage`. A seed handed out by the seeding phase also has
    /// `run_coverage` recorded here.
    ///
    /// # Returns
    /// `true` if a seed was added to the corpus.
    pub fn update(&mut self, input: &str, history: &CoverageHistory, run_coverage: u64) -> bool {
        if let Some(id) = self.pending_seed.take() {
            if let Some(seed) = self.corpus.get_mut(id).filter(|seed| seed.data() == input) {
                seed.coverage = run_coverage;
            }
        }

        if !self.feedback.is_interesting(history) {
            return false;
        }
        let seed = Seed::new(input).with_coverage(run_coverage);
        match self.corpus.try_push(seed) {
            Some(id) => {
                debug!(
                    "Coverage rose to {}; promoted input as seed #{} ({} chars, {} probes)",
                    history.latest().unwrap_or_default(),
                    id,
                    input.chars().count(),
                    run_coverage
                );
                true
            }
            None => false,
        }
    }

    pub fn seeds(&self) -> &[Seed] {
        self.corpus.as_slice()
    }

    pub fn corpus(&self) -> &SeedCorpus {
        &self.corpus
    }

    pub fn seed_index(&self) -> usize {
        self.seed_index
    }

    /// `true` while `generate_input` still returns unmodified seeds.
    pub fn is_seeding(&self) -> bool {
        self.seed_index < self.corpus.len()
    }

    pub fn grammar(&self) -> Option<&Grammar> {
        self.grammar.as_ref()
    }

    pub fn power_schedule(&self) -> Option<&dyn PowerSchedule> {
        self.power_schedule.as_deref()
    }

    pub fn mutator_names(&self) -> Vec<&'static str> {
        self.mutators.iter().map(|mutator| mutator.name()).collect()
    }

    pub fn into_seeds(self) -> Vec<Seed> {
        self.corpus.into_seeds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarSettings;
    use crate::mutator::DeleteRandomCharMutator;
    use crate::schedule::{AboveMeanSchedule, CoverageDensitySchedule};
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    fn settings(min_mutations: usize, max_mutations: usize, max_seeds: usize) -> FuzzerSettings {
        FuzzerSettings {
            min_mutations,
            max_mutations,
            max_seeds,
            ..FuzzerSettings::default()
        }
    }

    fn rng(seed: u8) -> ChaCha8Rng {
        ChaCha8Rng::from_seed([seed; 32])
    }

    fn digit_grammar() -> Grammar {
        Grammar::new(GrammarSettings::default())
            .unwrap()
            .with_rule("<start>", ["<digit>", "<digit><start>"])
            .with_rule("<digit>", ["0", "1", "2"])
    }

    #[test]
    fn seeding_phase_returns_seeds_in_order_then_mutates() {
        let seeds = ["first", "second", "third"];
        let mut fuzzer = Fuzzer::new(seeds, &FuzzerSettings::default(), rng(0)).unwrap();

        for (i, expected) in seeds.iter().enumerate() {
            assert!(fuzzer.is_seeding());
            assert_eq!(fuzzer.seed_index(), i);
            assert_eq!(fuzzer.generate_input().unwrap(), *expected);
        }
        assert!(!fuzzer.is_seeding());

        for _ in 0..20 {
            fuzzer.generate_input().unwrap();
            assert_eq!(fuzzer.seed_index(), seeds.len(), "cursor never rewinds");
        }
    }

    #[test]
    fn constructor_truncates_seed_list() {
        let literals: Vec<String> = (0..12).map(|i| i.to_string()).collect();
        let fuzzer = Fuzzer::new(literals, &settings(1, 1, 4), rng(0)).unwrap();
        let data: Vec<&str> = fuzzer.seeds().iter().map(Seed::data).collect();
        assert_eq!(data, vec!["0", "1", "2", "3"]);
    }

    #[test]
    fn single_delete_mutation_shortens_seed_by_one() {
        let mut fuzzer = Fuzzer::new(["abc"], &settings(1, 1, 10), rng(1))
            .unwrap()
            .with_mutators(vec![Box::new(DeleteRandomCharMutator)])
            .unwrap();

        for _ in 0..30 {
            let candidate = fuzzer.create_candidate().unwrap();
            assert_eq!(candidate.len(), 2);
            assert!(
                ["bc", "ac", "ab"].contains(&candidate.as_str()),
                "Got {candidate:?}"
            );
        }
    }

    #[test]
    fn stacked_mutations_build_on_each_other() {
        // Three stacked deletions on a 5-char seed must leave 2 characters.
        let mut fuzzer = Fuzzer::new(["abcde"], &settings(3, 3, 10), rng(2))
            .unwrap()
            .with_mutators(vec![Box::new(DeleteRandomCharMutator)])
            .unwrap();
        for _ in 0..20 {
            assert_eq!(fuzzer.create_candidate().unwrap().chars().count(), 2);
        }
    }

    #[test]
    fn mutation_count_stays_within_bounds() {
        let mut fuzzer = Fuzzer::new(["0123456789abcdef"], &settings(2, 5, 10), rng(3))
            .unwrap()
            .with_mutators(vec![Box::new(DeleteRandomCharMutator)])
            .unwrap();
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..200 {
            let removed = 16 - fuzzer.create_candidate().unwrap().len();
            assert!((2..=5).contains(&removed), "{removed} mutations applied");
            seen.insert(removed);
        }
        assert_eq!(seen.len(), 4, "every count in range should occur: {seen:?}");
    }

    #[test]
    fn empty_seed_list_fails_candidate_creation_without_side_effects() {
        let empty: Vec<&str> = Vec::new();
        let mut fuzzer = Fuzzer::new(empty.clone(), &FuzzerSettings::default(), rng(0)).unwrap();
        assert!(matches!(
            fuzzer.generate_input(),
            Err(FuzzError::EmptyCorpus)
        ));
        assert_eq!(fuzzer.seed_index(), 0);

        let mut scheduled = Fuzzer::new(empty, &FuzzerSettings::default(), rng(0))
            .unwrap()
            .with_power_schedule(Box::new(CoverageDensitySchedule::new()));
        assert!(matches!(
            scheduled.create_candidate(),
            Err(FuzzError::Schedule(ScheduleError::EmptyCorpus))
        ));
    }

    #[test]
    fn grammar_adds_grammar_mutator() {
        let plain = Fuzzer::new(["x"], &FuzzerSettings::default(), rng(0)).unwrap();
        assert_eq!(plain.mutator_names().len(), 3);
        assert!(plain.grammar().is_none());

        let with_grammar = Fuzzer::new(["x"], &FuzzerSettings::default(), rng(0))
            .unwrap()
            .with_grammar(digit_grammar());
        assert_eq!(
            with_grammar.mutator_names(),
            vec![
                "DeleteRandomCharMutator",
                "ReplaceRandomCharMutator",
                "InsertRandomCharMutator",
                "GrammarMutator"
            ]
        );
        assert!(with_grammar.grammar().is_some());
    }

    #[test]
    fn second_grammar_replaces_the_first_grammar_mutator() {
        let letters = Grammar::new(GrammarSettings::default())
            .unwrap()
            .with_rule("<start>", ["a", "b"]);
        let fuzzer = Fuzzer::new(["x"], &FuzzerSettings::default(), rng(0))
            .unwrap()
            .with_grammar(digit_grammar())
            .with_grammar(letters);

        let names = fuzzer.mutator_names();
        assert_eq!(names.len(), 4);
        assert_eq!(names.iter().filter(|name| **name == "GrammarMutator").count(), 1);
        assert_eq!(
            fuzzer.grammar().and_then(|g| g.alternatives("<digit>")),
            None,
            "The latest grammar wins"
        );
    }

    #[test]
    fn grammar_only_candidates_come_from_the_grammar() {
        let grammar = digit_grammar();
        let mut fuzzer = Fuzzer::new(["not digits"], &settings(1, 3, 10), rng(4))
            .unwrap()
            .with_mutators(vec![Box::new(GrammarMutator::new(
                grammar.clone(),
                FuzzerSettings::default().expansion_limits(),
            ))])
            .unwrap();
        for _ in 0..20 {
            let candidate = fuzzer.create_candidate().unwrap();
            assert!(!candidate.is_empty());
            assert!(candidate.chars().all(|c| ('0'..='2').contains(&c)), "{candidate:?}");
        }
    }

    #[test]
    fn failed_grammar_expansion_leaves_corpus_and_cursor_untouched() {
        let runaway = Grammar::new(GrammarSettings::default())
            .unwrap()
            .with_rule("<start>", ["<start><start>"]);
        let limits = crate::grammar::ExpansionLimits {
            max_nonterminals: 1,
            max_expansion_trials: 3,
        };
        let mut fuzzer = Fuzzer::new(["seed"], &settings(1, 1, 10), rng(5))
            .unwrap()
            .with_mutators(vec![Box::new(GrammarMutator::new(runaway, limits))])
            .unwrap();

        assert_eq!(fuzzer.generate_input().unwrap(), "seed");
        assert!(matches!(
            fuzzer.generate_input(),
            Err(FuzzError::Grammar(GrammarError::ExpansionExhausted { .. }))
        ));
        assert_eq!(fuzzer.seed_index(), 1);
        assert_eq!(fuzzer.seeds().len(), 1);
        assert_eq!(fuzzer.seeds()[0].data(), "seed");
    }

    #[test]
    fn empty_mutator_set_is_rejected() {
        let result = Fuzzer::new(["x"], &FuzzerSettings::default(), rng(0))
            .unwrap()
            .with_mutators(Vec::new());
        assert!(matches!(result, Err(FuzzError::InvalidConfig(_))));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let result = Fuzzer::new(["x"], &settings(3, 2, 10), rng(0));
        assert!(matches!(result, Err(FuzzError::InvalidConfig(_))));
        let result = Fuzzer::new(["x"], &settings(0, 2, 10), rng(0));
        assert!(matches!(result, Err(FuzzError::InvalidConfig(_))));
        let result = Fuzzer::new(["x"], &settings(1, 2, 0), rng(0));
        assert!(matches!(result, Err(FuzzError::InvalidConfig(_))));
    }

    #[test]
    fn update_promotes_on_strict_increase_only() {
        let mut fuzzer = Fuzzer::new(["seed"], &FuzzerSettings::default(), rng(0)).unwrap();

        assert!(!fuzzer.update("first", &vec![5].into(), 5));
        assert!(!fuzzer.update("same", &vec![5, 5].into(), 2));
        assert!(!fuzzer.update("lower", &vec![5, 4].into(), 4));
        assert_eq!(fuzzer.seeds().len(), 1);

        assert!(fuzzer.update("better", &vec![5, 4, 6].into(), 3));
        assert_eq!(fuzzer.seeds().len(), 2);
        let promoted = &fuzzer.seeds()[1];
        assert_eq!(promoted.data(), "better");
        assert_eq!(promoted.coverage, 3, "Promoted seeds keep their own run coverage");
    }

    #[test]
    fn update_does_not_deduplicate() {
        let mut fuzzer = Fuzzer::new(["seed"], &FuzzerSettings::default(), rng(0)).unwrap();
        assert!(fuzzer.update("dup", &vec![1, 2].into(), 1));
        assert!(fuzzer.update("dup", &vec![1, 2, 3].into(), 1));
        let dups = fuzzer.seeds().iter().filter(|s| s.data() == "dup").count();
        assert_eq!(dups, 2);
    }

    #[test]
    fn corpus_never_exceeds_max_seeds() {
        let mut fuzzer = Fuzzer::new(["a", "b"], &settings(1, 2, 4), rng(6)).unwrap();
        let mut history = CoverageHistory::new();
        for coverage in 0..50u64 {
            let input = fuzzer.generate_input().unwrap();
            history.push(coverage);
            fuzzer.update(&input, &history, 1);
            assert!(fuzzer.seeds().len() <= 4);
        }
        assert_eq!(fuzzer.seeds().len(), 4);
        assert_eq!(fuzzer.seeds()[0].data(), "a");
        assert_eq!(fuzzer.seeds()[1].data(), "b");
    }

    #[test]
    fn update_records_coverage_of_seeding_phase_inputs() {
        let mut fuzzer = Fuzzer::new(["a", "b"], &FuzzerSettings::default(), rng(0)).unwrap();
        let mut history = CoverageHistory::new();

        let input = fuzzer.generate_input().unwrap();
        history.push(7);
        assert!(!fuzzer.update(&input, &history, 7));

        // The second seed adds nothing new to the cumulative total.
        let input = fuzzer.generate_input().unwrap();
        history.push(7);
        fuzzer.update(&input, &history, 2);

        assert_eq!(fuzzer.seeds()[0].coverage, 7);
        assert_eq!(fuzzer.seeds()[1].coverage, 2);
        assert_eq!(fuzzer.seeds().len(), 2);
    }

    #[test]
    fn power_schedule_steers_base_seed_choice() {
        // The long seed has the coverage lead; with delete-only mutations the
        // candidate length reveals which base seed was picked.
        let mut fuzzer = Fuzzer::new(["ab", "abcdefgh"], &settings(1, 1, 10), rng(7))
            .unwrap()
            .with_mutators(vec![Box::new(DeleteRandomCharMutator)])
            .unwrap()
            .with_power_schedule(Box::new(AboveMeanSchedule::new()));
        let mut history = CoverageHistory::new();
        for coverage in [1, 50] {
            let input = fuzzer.generate_input().unwrap();
            history.push(coverage);
            fuzzer.update(&input, &history, coverage);
        }
        // The coverage jump on the second seed also promoted a copy of it.
        let mut from_long_seed = 0;
        for _ in 0..300 {
            if fuzzer.create_candidate().unwrap().len() == 7 {
                from_long_seed += 1;
            }
        }
        assert!(from_long_seed > 250, "{from_long_seed}");
        assert!(fuzzer.seeds().iter().all(|seed| seed.energy > 0.0));
    }
}
