use log::trace;
use rand::Rng;
use rand::seq::IndexedRandom;
use rand_core::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Default upper bound on nonterminals left in the term after an expansion step.
pub const DEFAULT_MAX_NONTERMINALS: usize = 10;
/// Default number of non-shrinking fallback expansions tolerated before giving up.
pub const DEFAULT_MAX_EXPANSION_TRIALS: usize = 100;

pub const DEFAULT_START_SYMBOL: &str = "<start>";
pub const DEFAULT_NONTERMINAL_OPEN: &str = "<";
pub const DEFAULT_NONTERMINAL_CLOSE: &str = ">";

/// Errors raised while building a grammar or expanding it into a string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    /// Expansion kept failing to reduce the number of nonterminals.
    /// Carries the partially expanded term for diagnostics.
    #[error("Cannot expand grammar within {trials} expansion trials. Current term: {term:?}")]
    ExpansionExhausted { term: String, trials: usize },

    /// A nonterminal chosen for expansion is a grammar key with no alternatives.
    #[error("Nonterminal {symbol} is defined with an empty list of alternatives")]
    EmptyAlternatives { symbol: String },

    #[error("Nonterminal delimiters must be non-empty (open: {open:?}, close: {close:?})")]
    InvalidDelimiters { open: String, close: String },

    #[error("Failed to compile nonterminal pattern: {0}")]
    Pattern(String),
}

impl From<regex::Error> for GrammarError {
    fn from(err: regex::Error) -> Self {
        GrammarError::Pattern(err.to_string())
    }
}

/// One alternative on the right-hand side of a grammar rule.
///
/// Alternatives are either plain text, or text paired with an annotation
/// reserved for extensions (probabilities, constraints, ...). Expansion only
/// ever looks at the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expansion {
    Plain(String),
    Annotated(String, String),
}

impl Expansion {
    pub fn text(&self) -> &str {
        match self {
            Expansion::Plain(text) | Expansion::Annotated(text, _) => text,
        }
    }

    pub fn annotation(&self) -> Option<&str> {
        match self {
            Expansion::Plain(_) => None,
            Expansion::Annotated(_, annotation) => Some(annotation),
        }
    }
}

impl AsRef<str> for Expansion {
    fn as_ref(&self) -> &str {
        self.text()
    }
}

impl From<&str> for Expansion {
    fn from(text: &str) -> Self {
        Expansion::Plain(text.to_string())
    }
}

impl From<String> for Expansion {
    fn from(text: String) -> Self {
        Expansion::Plain(text)
    }
}

impl From<(&str, &str)> for Expansion {
    fn from((text, annotation): (&str, &str)) -> Self {
        Expansion::Annotated(text.to_string(), annotation.to_string())
    }
}

/// Start symbol and nonterminal delimiters of a grammar.
///
/// Every grammar compiles its own pattern from these, so grammars using
/// `<x>` and `{x}` conventions can live side by side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarSettings {
    pub start_symbol: String,
    pub nonterminal_open: String,
    pub nonterminal_close: String,
}

impl Default for GrammarSettings {
    fn default() -> Self {
        Self {
            start_symbol: DEFAULT_START_SYMBOL.to_string(),
            nonterminal_open: DEFAULT_NONTERMINAL_OPEN.to_string(),
            nonterminal_close: DEFAULT_NONTERMINAL_CLOSE.to_string(),
        }
    }
}

/// Budget for a single `generate` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionLimits {
    pub max_nonterminals: usize,
    pub max_expansion_trials: usize,
}

impl Default for ExpansionLimits {
    fn default() -> Self {
        Self {
            max_nonterminals: DEFAULT_MAX_NONTERMINALS,
            max_expansion_trials: DEFAULT_MAX_EXPANSION_TRIALS,
        }
    }
}

/// One expansion step, as reported to [`Grammar::generate_observed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionStep<'a> {
    pub symbol: &'a str,
    pub alternative: &'a str,
    /// The term after the replacement.
    pub term: &'a str,
    pub nonterminals_before: usize,
    pub nonterminals_after: usize,
    /// `true` when no alternative fit the budget and the smallest one was forced.
    pub fallback: bool,
}

/// A context-free grammar that produces strings by bounded random expansion.
///
/// A token is a nonterminal iff it matches `open`, then a run of characters
/// that are neither whitespace nor delimiter characters, then `close`, AND it
/// is a key of the grammar. Delimited text that is not a key is copied
/// through verbatim.
#[derive(Debug, Clone)]
pub struct Grammar {
    rules: BTreeMap<String, Vec<Expansion>>,
    start_symbol: String,
    nonterminal_re: Regex,
    leading_nonterminal_re: Regex,
}

impl Grammar {
    /// Creates an empty grammar with the given start symbol and delimiters.
    pub fn new(settings: GrammarSettings) -> Result<Self, GrammarError> {
        Self::from_rules(BTreeMap::new(), settings)
    }

    /// Creates a grammar from a complete rule table.
    pub fn from_rules(
        rules: BTreeMap<String, Vec<Expansion>>,
        settings: GrammarSettings,
    ) -> Result<Self, GrammarError> {
        let GrammarSettings {
            start_symbol,
            nonterminal_open: open,
            nonterminal_close: close,
        } = settings;
        if open.is_empty() || close.is_empty() {
            return Err(GrammarError::InvalidDelimiters { open, close });
        }

        let delimiter_chars = regex::escape(&format!("{open}{close}"));
        let pattern = format!(
            "{}[^\\s{}]*{}",
            regex::escape(&open),
            delimiter_chars,
            regex::escape(&close)
        );
        let nonterminal_re = Regex::new(&pattern)?;
        let leading_nonterminal_re = Regex::new(&format!("^(?:{pattern})"))?;

        Ok(Self {
            rules,
            start_symbol,
            nonterminal_re,
            leading_nonterminal_re,
        })
    }

    /// Adds (or replaces) the alternatives for `symbol`.
    pub fn with_rule<S, I, E>(mut self, symbol: S, alternatives: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = E>,
        E: Into<Expansion>,
    {
        self.rules.insert(
            symbol.into(),
            alternatives.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn start_symbol(&self) -> &str {
        &self.start_symbol
    }

    pub fn rules(&self) -> &BTreeMap<String, Vec<Expansion>> {
        &self.rules
    }

    pub fn alternatives(&self, symbol: &str) -> Option<&[Expansion]> {
        self.rules.get(symbol).map(Vec::as_slice)
    }

    /// Returns `true` if `text` starts with a token shaped like a nonterminal.
    ///
    /// This only checks the delimiter pattern, not grammar membership.
    pub fn is_nonterminal(&self, text: &str) -> bool {
        self.leading_nonterminal_re.is_match(text)
    }

    /// Lists the grammar-defined nonterminals occurring in `expansion`, in order
    /// of appearance and including repeats.
    ///
    /// Accepts plain strings as well as [`Expansion`] values of either shape.
    pub fn nonterminals<'a, T>(&self, expansion: &'a T) -> Vec<&'a str>
    where
        T: AsRef<str> + ?Sized,
    {
        self.nonterminal_re
            .find_iter(expansion.as_ref())
            .map(|m| m.as_str())
            .filter(|symbol| self.rules.contains_key(*symbol))
            .collect()
    }

    fn count_nonterminals(&self, term: &str) -> usize {
        self.nonterminal_re
            .find_iter(term)
            .filter(|m| self.rules.contains_key(m.as_str()))
            .count()
    }

    /// Expands the configured start symbol using the default limits.
    pub fn generate<R>(&self, rng: &mut R) -> Result<String, GrammarError>
    where
        R: RngCore + ?Sized,
    {
        self.generate_with(None, ExpansionLimits::default(), rng)
    }

    /// Expands `start_symbol` (or the grammar's own start symbol) until no
    /// nonterminal is left.
    ///
    /// Each step picks one nonterminal occurrence at random and replaces the
    /// first occurrence of that symbol with one of its alternatives. An
    /// alternative is only taken at random if the resulting term keeps at most
    /// `max_nonterminals` nonterminals; otherwise the alternative leaving the
    /// fewest is forced. Forced steps that do not shrink the term count as
    /// failed trials, and `max_expansion_trials` consecutive failures abort
    /// with [`GrammarError::ExpansionExhausted`].
    pub fn generate_with<R>(
        &self,
        start_symbol: Option<&str>,
        limits: ExpansionLimits,
        rng: &mut R,
    ) -> Result<String, GrammarError>
    where
        R: RngCore + ?Sized,
    {
        self.generate_observed(start_symbol, limits, rng, |_| {})
    }

    /// Same as [`Grammar::generate_with`], calling `on_step` after every
    /// expansion step.
    pub fn generate_observed<R, F>(
        &self,
        start_symbol: Option<&str>,
        limits: ExpansionLimits,
        rng: &mut R,
        mut on_step: F,
    ) -> Result<String, GrammarError>
    where
        R: RngCore + ?Sized,
        F: FnMut(&ExpansionStep<'_>),
    {
        let mut term = start_symbol.unwrap_or(&self.start_symbol).to_string();
        let mut expansion_trials = 0;

        loop {
            let current_nonterminals = self.nonterminals(&term);
            let current_count = current_nonterminals.len();
            let Some(&symbol) = current_nonterminals.choose(rng) else {
                break;
            };
            let symbol = symbol.to_string();

            let alternatives = self
                .alternatives(&symbol)
                .filter(|alternatives| !alternatives.is_empty())
                .ok_or_else(|| GrammarError::EmptyAlternatives {
                    symbol: symbol.clone(),
                })?;

            let mut candidates: Vec<(&Expansion, String, usize)> = alternatives
                .iter()
                .map(|alternative| {
                    let new_term = term.replacen(&symbol, alternative.text(), 1);
                    let count = self.count_nonterminals(&new_term);
                    (alternative, new_term, count)
                })
                .collect();

            let acceptable: Vec<usize> = candidates
                .iter()
                .enumerate()
                .filter(|(_, (_, _, count))| *count <= limits.max_nonterminals)
                .map(|(index, _)| index)
                .collect();

            if !acceptable.is_empty() {
                let picked = acceptable[rng.random_range(0..acceptable.len())];
                let (alternative, new_term, new_count) = candidates.swap_remove(picked);
                trace!("{:<40} {}", format!("{symbol} -> {}", alternative.text()), new_term);
                on_step(&ExpansionStep {
                    symbol: &symbol,
                    alternative: alternative.text(),
                    term: &new_term,
                    nonterminals_before: current_count,
                    nonterminals_after: new_count,
                    fallback: false,
                });
                term = new_term;
                expansion_trials = 0;
                continue;
            }

            // Runaway recursion: force the alternative leaving the fewest nonterminals.
            let (alternative, new_term, new_count) = candidates
                .into_iter()
                .min_by_key(|(_, _, count)| *count)
                .ok_or_else(|| GrammarError::EmptyAlternatives {
                    symbol: symbol.clone(),
                })?;
            trace!(
                "{:<40} {} (fallback, {} nonterminals left)",
                format!("{symbol} -> {}", alternative.text()),
                new_term,
                new_count
            );
            on_step(&ExpansionStep {
                symbol: &symbol,
                alternative: alternative.text(),
                term: &new_term,
                nonterminals_before: current_count,
                nonterminals_after: new_count,
                fallback: true,
            });
            term = new_term;

            if new_count >= current_count {
                expansion_trials += 1;
            } else {
                expansion_trials = 0;
            }

            if expansion_trials >= limits.max_expansion_trials {
                return Err(GrammarError::ExpansionExhausted {
                    term,
                    trials: expansion_trials,
                });
            }
        }

        Ok(term)
    }
}
