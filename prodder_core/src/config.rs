use crate::mutator::{Mutator, default_mutators, random_mutators};
use serde::Serialize;
use std::time::Duration;

/// Seed used when none is given on the command line.
pub const DEFAULT_SEED: &str = r#"<html a="value">...</html>"#;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Settings for one fuzzing run.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct FuzzConfig {
    pub timeout_ms: u64,
    /// Raw seed bytes; serialized as lossy text for logging.
    #[serde(serialize_with = "serialize_lossy")]
    pub seed: Vec<u8>,
    pub random_mutations: usize,
    pub rng_seed: u64,
    pub format: ReportFormat,
}

fn serialize_lossy<S: serde::Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&String::from_utf8_lossy(bytes))
}

pub fn default_timeout_ms() -> u64 {
    2000
}

pub fn default_random_mutations() -> usize {
    0
}

pub fn default_rng_seed() -> u64 {
    0
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            seed: DEFAULT_SEED.as_bytes().to_vec(),
            random_mutations: default_random_mutations(),
            rng_seed: default_rng_seed(),
            format: ReportFormat::default(),
        }
    }
}

impl FuzzConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The default mutator set followed by any seeded random mutators.
    pub fn mutators(&self) -> Vec<Box<dyn Mutator>> {
        let mut mutators = default_mutators();
        mutators.extend(random_mutators(self.random_mutations, self.rng_seed));
        mutators
    }
}
