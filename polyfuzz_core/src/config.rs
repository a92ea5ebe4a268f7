use crate::corpus::DEFAULT_MAX_SEEDS;
use crate::fuzzer::{FuzzError, Fuzzer};
use crate::grammar::{
    DEFAULT_MAX_EXPANSION_TRIALS, DEFAULT_MAX_NONTERMINALS, DEFAULT_NONTERMINAL_CLOSE,
    DEFAULT_NONTERMINAL_OPEN, DEFAULT_START_SYMBOL, Expansion, ExpansionLimits, Grammar,
    GrammarError, GrammarSettings,
};
use crate::schedule::ScheduleKind;
use rand_core::RngCore;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct FuzzerSettings {
    #[serde(default = "default_min_mutations")]
    pub min_mutations: usize,
    #[serde(default = "default_max_mutations")]
    pub max_mutations: usize,
    #[serde(default = "default_max_seeds")]
    pub max_seeds: usize,
    #[serde(default = "default_max_nonterminals")]
    pub max_nonterminals: usize,
    #[serde(default = "default_max_expansion_trials")]
    pub max_expansion_trials: usize,
    /// Number of executions a campaign performs.
    #[serde(default = "default_iterations")]
    pub iterations: u64,
    #[serde(default)]
    pub rng_seed: u64,
}

pub fn default_min_mutations() -> usize {
    1
}
pub fn default_max_mutations() -> usize {
    10
}
pub fn default_max_seeds() -> usize {
    DEFAULT_MAX_SEEDS
}
pub fn default_max_nonterminals() -> usize {
    DEFAULT_MAX_NONTERMINALS
}
pub fn default_max_expansion_trials() -> usize {
    DEFAULT_MAX_EXPANSION_TRIALS
}
pub fn default_iterations() -> u64 {
    100
}

impl Default for FuzzerSettings {
    fn default() -> Self {
        Self {
            min_mutations: default_min_mutations(),
            max_mutations: default_max_mutations(),
            max_seeds: default_max_seeds(),
            max_nonterminals: default_max_nonterminals(),
            max_expansion_trials: default_max_expansion_trials(),
            iterations: default_iterations(),
            rng_seed: 0,
        }
    }
}

impl FuzzerSettings {
    pub fn validate(&self) -> Result<(), FuzzError> {
        if self.min_mutations < 1 {
            return Err(FuzzError::InvalidConfig(
                "min-mutations must be at least 1".to_string(),
            ));
        }
        if self.max_mutations < self.min_mutations {
            return Err(FuzzError::InvalidConfig(format!(
                "max-mutations ({}) must not be below min-mutations ({})",
                self.max_mutations, self.min_mutations
            )));
        }
        if self.max_seeds < 1 {
            return Err(FuzzError::InvalidConfig(
                "max-seeds must be at least 1".to_string(),
            ));
        }
        if self.max_expansion_trials < 1 {
            return Err(FuzzError::InvalidConfig(
                "max-expansion-trials must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn expansion_limits(&self) -> ExpansionLimits {
        ExpansionLimits {
            max_nonterminals: self.max_nonterminals,
            max_expansion_trials: self.max_expansion_trials,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    pub kind: ScheduleKind,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct GrammarConfig {
    #[serde(default = "default_start_symbol")]
    pub start_symbol: String,
    #[serde(default = "default_nonterminal_open")]
    pub nonterminal_open: String,
    #[serde(default = "default_nonterminal_close")]
    pub nonterminal_close: String,
    pub rules: BTreeMap<String, Vec<Expansion>>,
}

fn default_start_symbol() -> String {
    DEFAULT_START_SYMBOL.to_string()
}
fn default_nonterminal_open() -> String {
    DEFAULT_NONTERMINAL_OPEN.to_string()
}
fn default_nonterminal_close() -> String {
    DEFAULT_NONTERMINAL_CLOSE.to_string()
}

impl GrammarConfig {
    pub fn build(&self) -> Result<Grammar, GrammarError> {
        Grammar::from_rules(
            self.rules.clone(),
            GrammarSettings {
                start_symbol: self.start_symbol.clone(),
                nonterminal_open: self.nonterminal_open.clone(),
                nonterminal_close: self.nonterminal_close.clone(),
            },
        )
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct PolyfuzzConfig {
    /// Literal seed inputs, in the order they are replayed.
    #[serde(default)]
    pub seeds: Vec<String>,
    #[serde(default)]
    pub fuzzer: FuzzerSettings,
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
    #[serde(default)]
    pub grammar: Option<GrammarConfig>,
}

impl PolyfuzzConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        Self::from_toml_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid configuration in {:?}: {}", path, e))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, anyhow::Error> {
        let config: PolyfuzzConfig = toml::from_str(content)?;
        config.fuzzer.validate()?;
        Ok(config)
    }

    /// Builds a fuzzer from the seeds, schedule and grammar of this configuration.
    pub fn build_fuzzer<R: RngCore>(&self, rng: R) -> Result<Fuzzer<R>, FuzzError> {
        let mut fuzzer = Fuzzer::new(self.seeds.iter().map(String::as_str), &self.fuzzer, rng)?;
        if let Some(schedule) = &self.schedule {
            fuzzer = fuzzer.with_power_schedule(schedule.kind.build());
        }
        if let Some(grammar) = &self.grammar {
            fuzzer = fuzzer.with_grammar(grammar.build()?);
        }
        Ok(fuzzer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;
    use std::io::Write;

    const CGI_CONFIG: &str = r#"
seeds = ["+", "hello+world", "hello%20world", "%3F", "%", "%GG"]

[fuzzer]
min-mutations = 1
max-mutations = 4
iterations = 250
rng-seed = 7

[schedule]
kind = "coverage-density"

[grammar]
rules."<start>" = ["<cgi-input>"]
rules."<cgi-input>" = ["<param>=<value>", "<param>=<value>&<cgi-input>"]
rules."<param>" = ["name", "id", "search", "query"]
rules."<value>" = ["<chars>"]
rules."<chars>" = ["<char>", "<char><chars>"]
rules."<char>" = ["A", "B", "+", "%20", "%", ["%GG", "invalid"]]
"#;

    #[test]
    fn parses_full_config() {
        let config = PolyfuzzConfig::from_toml_str(CGI_CONFIG).unwrap();

        assert_eq!(config.seeds.len(), 6);
        assert_eq!(config.fuzzer.max_mutations, 4);
        assert_eq!(config.fuzzer.max_seeds, DEFAULT_MAX_SEEDS);
        assert_eq!(config.fuzzer.iterations, 250);
        assert_eq!(config.fuzzer.rng_seed, 7);
        assert_eq!(
            config.schedule.as_ref().map(|s| s.kind),
            Some(ScheduleKind::CoverageDensity)
        );

        let grammar_config = config.grammar.as_ref().unwrap();
        assert_eq!(grammar_config.start_symbol, "<start>");
        assert_eq!(
            grammar_config.rules["<char>"].last(),
            Some(&Expansion::Annotated("%GG".to_string(), "invalid".to_string()))
        );
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = PolyfuzzConfig::from_toml_str("").unwrap();
        assert_eq!(config, PolyfuzzConfig::default());
        assert_eq!(config.fuzzer.min_mutations, 1);
        assert_eq!(config.fuzzer.max_mutations, 10);
        assert_eq!(config.fuzzer.max_nonterminals, 10);
        assert_eq!(config.fuzzer.max_expansion_trials, 100);
    }

    #[test]
    fn rejects_unknown_fields_and_bad_bounds() {
        assert!(PolyfuzzConfig::from_toml_str("[fuzzer]\nmax-muts = 3").is_err());
        assert!(
            PolyfuzzConfig::from_toml_str("[fuzzer]\nmin-mutations = 5\nmax-mutations = 2")
                .is_err()
        );
        assert!(PolyfuzzConfig::from_toml_str("[fuzzer]\nmax-seeds = 0").is_err());
        assert!(PolyfuzzConfig::from_toml_str("[schedule]\nkind = \"fastest\"").is_err());
    }

    #[test]
    fn curly_delimiters_from_config() {
        let config = PolyfuzzConfig::from_toml_str(
            r#"
[grammar]
start-symbol = "{start}"
nonterminal-open = "{"
nonterminal-close = "}"
rules."{start}" = ["<p>{word}</p>"]
rules."{word}" = ["a", "b"]
"#,
        )
        .unwrap();
        let grammar = config.grammar.unwrap().build().unwrap();
        let mut rng = ChaCha8Rng::from_seed([0u8; 32]);
        let generated = grammar.generate(&mut rng).unwrap();
        assert!(generated == "<p>a</p>" || generated == "<p>b</p>", "{generated}");
    }

    #[test]
    fn build_fuzzer_wires_schedule_and_grammar() {
        let config = PolyfuzzConfig::from_toml_str(CGI_CONFIG).unwrap();
        let fuzzer = config
            .build_fuzzer(ChaCha8Rng::seed_from_u64(config.fuzzer.rng_seed))
            .unwrap();

        assert_eq!(fuzzer.seeds().len(), 6);
        assert_eq!(
            fuzzer.power_schedule().map(|s| s.name()),
            Some("CoverageDensitySchedule")
        );
        assert_eq!(fuzzer.mutator_names().last(), Some(&"GrammarMutator"));
    }

    #[test]
    fn load_from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CGI_CONFIG.as_bytes()).unwrap();

        let config = PolyfuzzConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.seeds[1], "hello+world");
    }

    #[test]
    fn load_from_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = PolyfuzzConfig::load_from_file(&missing).unwrap_err();
        assert!(err.to_string().contains("nope.toml"), "{err}");
    }
}
