pub mod campaign;
pub mod config;
pub mod corpus;
pub mod executor;
pub mod feedback;
pub mod fuzzer;
pub mod grammar;
pub mod mutator;
pub mod observer;
pub mod oracle;
pub mod schedule;
pub mod seed;

pub use campaign::{Campaign, CampaignReport};
pub use config::{FuzzerSettings, GrammarConfig, PolyfuzzConfig, ScheduleConfig};
pub use corpus::{CorpusError, SeedCorpus};
pub use executor::{ExecutionReport, ExecutionStatus, Executor, InProcessExecutor};
pub use feedback::{CoverageHistory, CoverageIncreaseFeedback};
pub use fuzzer::{FuzzError, Fuzzer};
pub use grammar::{
    Expansion, ExpansionLimits, ExpansionStep, Grammar, GrammarError, GrammarSettings,
};
pub use mutator::{
    DeleteRandomCharMutator, GrammarMutator, InsertRandomCharMutator, Mutator,
    ReplaceRandomCharMutator,
};
pub use observer::{CoverageObserver, Observer};
pub use oracle::{BugReport, CrashOracle, Oracle};
pub use schedule::{
    AboveMeanSchedule, CoverageDensitySchedule, PowerSchedule, ScheduleError, ScheduleKind,
};
pub use seed::Seed;
