pub mod cancel;
pub mod config;
pub mod corpus;
pub mod executor;
pub mod fuzzer;
pub mod input;
pub mod mutator;
pub mod observer;
pub mod oracle;
pub mod report;
pub mod target;

pub use cancel::CancellationToken;
pub use config::{FuzzConfig, ReportFormat};
pub use corpus::{Corpus, generate_corpus};
pub use executor::{
    CommandExecutor, ExecutionError, ExecutionResult, Executor, InProcessExecutor,
};
pub use fuzzer::{RunVerdict, run_corpus};
pub use input::TestCase;
pub use mutator::{Mutator, default_mutators};
pub use observer::{ConsoleObserver, Observer};
pub use oracle::{CrashKind, CrashOracle, CrashReport, Oracle};
pub use report::JsonReport;
pub use target::{LaunchSpec, TargetError, resolve_target};
