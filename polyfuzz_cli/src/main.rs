mod harness;

use polyfuzz_core::{Campaign, CoverageObserver, InProcessExecutor, PolyfuzzConfig};

use clap::{Parser, ValueEnum};
use log::{debug, error, info};
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use std::cell::Cell;
use std::path::PathBuf;

const DEFAULT_CONFIG_FILE: &str = "polyfuzz.toml";

thread_local! {
    static IN_HARNESS: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as running target code until dropped.
struct HarnessGuard;

impl HarnessGuard {
    fn enter() -> Self {
        IN_HARNESS.with(|flag| flag.set(true));
        HarnessGuard
    }
}

impl Drop for HarnessGuard {
    fn drop(&mut self) {
        IN_HARNESS.with(|flag| flag.set(false));
    }
}

fn in_harness() -> bool {
    IN_HARNESS.with(Cell::get)
}

fn run_harness(harness: fn(&str, &mut CoverageObserver), data: &str, cov: &mut CoverageObserver) {
    let _guard = HarnessGuard::enter();
    harness(data, cov);
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    CgiDecode,
    UrlSplit,
    HtmlFeed,
}

impl Target {
    fn builtin_config(self) -> &'static str {
        match self {
            Target::CgiDecode => include_str!("../configs/cgi_decode.toml"),
            Target::UrlSplit => include_str!("../configs/url_split.toml"),
            Target::HtmlFeed => include_str!("../configs/html_feed.toml"),
        }
    }

    fn harness(self) -> fn(&str, &mut CoverageObserver) {
        match self {
            Target::CgiDecode => |data: &str, cov: &mut CoverageObserver| {
                harness::cgi_decode(data, cov);
            },
            Target::UrlSplit => |data: &str, cov: &mut CoverageObserver| {
                harness::url_split(data, cov);
            },
            Target::HtmlFeed => |data: &str, cov: &mut CoverageObserver| {
                harness::html_feed(data, cov);
            },
        }
    }
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    #[clap(short, long, value_enum, default_value_t = Target::CgiDecode)]
    target: Target,
    #[clap(short, long)]
    iterations: Option<u64>,
    #[clap(long)]
    rng_seed: Option<u64>,
    /// Where to write the JSON report; stdout when absent.
    #[clap(short, long, value_parser)]
    output: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> Result<PolyfuzzConfig, anyhow::Error> {
    match &cli.config_file {
        Some(config_path) => {
            info!("Loading configuration from specified path: {config_path:?}");
            PolyfuzzConfig::load_from_file(config_path)
        }
        None => {
            let default_config_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_config_path.exists() {
                info!("No config file specified, loading default: {default_config_path:?}");
                PolyfuzzConfig::load_from_file(&default_config_path)
            } else {
                info!(
                    "No config file specified and '{DEFAULT_CONFIG_FILE}' not found, using built-in {:?} configuration.",
                    cli.target
                );
                PolyfuzzConfig::from_toml_str(cli.target.builtin_config())
            }
        }
    }
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    // Target panics are expected findings; anything else is a fuzzer bug.
    std::panic::set_hook(Box::new(|panic_info| {
        if in_harness() {
            debug!("Target panicked: {panic_info}");
        } else {
            error!("Panic outside the target harness: {panic_info}");
        }
    }));

    let cli = Cli::parse();
    let mut config = load_config(&cli)?;

    if let Some(iterations) = cli.iterations {
        config.fuzzer.iterations = iterations;
    }
    if let Some(rng_seed) = cli.rng_seed {
        config.fuzzer.rng_seed = rng_seed;
    }
    debug!("Effective configuration: {config:#?}");

    let rng = ChaCha8Rng::seed_from_u64(config.fuzzer.rng_seed);
    let mut fuzzer = config.build_fuzzer(rng)?;
    let harness = cli.target.harness();
    let mut executor = InProcessExecutor::new(move |data: &str, cov: &mut CoverageObserver| {
        run_harness(harness, data, cov)
    });

    let report = Campaign::new(config.fuzzer.iterations).run(&mut fuzzer, &mut executor)?;
    let json = report.to_json()?;

    match &cli.output {
        Some(path) => {
            std::fs::write(path, json)
                .map_err(|e| anyhow::anyhow!("Failed to write report to {:?}: {}", path, e))?;
            info!("Report written to {path:?}");
        }
        None => println!("{json}"),
    }

    info!(
        "Final coverage: {}, corpus size: {}, unique crashes: {}",
        report.final_coverage(),
        report.corpus.len(),
        report.crashes.len()
    );
    Ok(())
}
