mod signals;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use prodder_core::config::{
    FuzzConfig, ReportFormat, default_random_mutations, default_rng_seed, default_timeout_ms,
};
use prodder_core::{
    CancellationToken, CommandExecutor, ConsoleObserver, Corpus, CrashOracle, JsonReport,
    TargetError, resolve_target, run_corpus,
};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};

/// Exit code for a bad command line, matching what clap uses.
const USAGE_EXIT_CODE: u8 = 2;
const FAILURE_EXIT_CODE: u8 = 1;

#[derive(ValueEnum, Debug, Clone, Copy)]
enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for ReportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => ReportFormat::Text,
            FormatArg::Json => ReportFormat::Json,
        }
    }
}

/// Feeds a seed input and mutated variants of it to a command's stdin and
/// reports every run that exits non-zero, crashes or hangs.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Command to fuzz, run through the platform shell from the current directory.
    command: String,

    /// Kill a target that runs longer than this.
    #[arg(long, value_name = "MS", default_value_t = default_timeout_ms())]
    timeout_ms: u64,

    /// Seed input text.
    #[arg(long, conflicts_with = "seed_file")]
    seed: Option<String>,

    /// Read the seed input from a file instead.
    #[arg(long, value_name = "FILE")]
    seed_file: Option<PathBuf>,

    /// Number of seeded random byte mutators to add after the built-in ones.
    #[arg(long, value_name = "N", default_value_t = default_random_mutations())]
    random_mutations: usize,

    /// Seed for the random byte mutators.
    #[arg(long, default_value_t = default_rng_seed())]
    rng_seed: u64,

    /// Report format written to stdout.
    #[arg(long, value_enum, default_value_t = FormatArg::Text)]
    format: FormatArg,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence.
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Cli {
    fn to_config(&self) -> Result<FuzzConfig, anyhow::Error> {
        let mut config = FuzzConfig {
            timeout_ms: self.timeout_ms,
            random_mutations: self.random_mutations,
            rng_seed: self.rng_seed,
            format: self.format.into(),
            ..FuzzConfig::default()
        };

        if let Some(path) = &self.seed_file {
            config.seed = std::fs::read(path)
                .with_context(|| format!("Failed to read seed file {path:?}"))?;
        } else if let Some(seed) = &self.seed {
            config.seed = seed.as_bytes().to_vec();
        }
        Ok(config)
    }
}

fn init_logging(level: &str) {
    let filter = format!("prodder_cli={level},prodder_core={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_writer(io::stderr)
        .with_target(true)
        .init();
}

fn run(cli: &Cli) -> Result<ExitCode, anyhow::Error> {
    let config = cli.to_config()?;
    debug!(?config, "Effective configuration");

    let working_dir =
        std::env::current_dir().context("Failed to determine the working directory")?;
    let spec = match resolve_target(&cli.command, &working_dir) {
        Ok(spec) => spec,
        Err(e @ TargetError::EmptyCommand) => {
            eprintln!("Error: {e}");
            eprintln!("Usage: prodder_cli [OPTIONS] <COMMAND>");
            return Ok(ExitCode::from(USAGE_EXIT_CODE));
        }
        Err(e @ TargetError::NotFound { .. }) => {
            eprintln!("Error: {e}");
            return Ok(ExitCode::from(FAILURE_EXIT_CODE));
        }
    };

    let cancel = CancellationToken::new();
    signals::install(cancel.clone()).context("Failed to install signal handlers")?;

    let corpus = Corpus::generate(&config.seed, &config.mutators());
    info!(
        command = %spec,
        test_cases = corpus.len(),
        timeout = ?config.timeout(),
        "Starting fuzz run"
    );

    let mut console = ConsoleObserver::new(io::stdout(), io::stderr());
    match config.format {
        ReportFormat::Text => println!("Command: {spec}"),
        ReportFormat::Json => console = console.crashes_only(),
    }

    let mut executor = CommandExecutor::new(spec, config.timeout()).with_cancellation(cancel);
    let verdict = run_corpus(&mut executor, &corpus, &mut [&mut console], &CrashOracle);

    if config.format == ReportFormat::Json {
        let report = JsonReport::from_verdict(&cli.command, &config, &verdict);
        println!("{}", report.to_json_pretty()?);
    }

    Ok(ExitCode::from(verdict.exit_code()))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(FAILURE_EXIT_CODE)
        }
    }
}
