use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;

/// Default number of bytes a `RandomByteMutator` perturbs.
const DEFAULT_RANDOM_FLIPS: usize = 4;
/// How many times `oversized-input` repeats its fragment.
const OVERSIZED_REPEAT: usize = 1000;

/// A `Mutator` turns the seed into one adversarial variant of it.
///
/// Mutators are applied to the original seed, never to each other's output,
/// and must be pure: the same seed always yields the same variant. They
/// cannot fail. When a transformation makes no sense for a given seed (say,
/// truncating an empty input) the mutator returns a well-defined fallback
/// instead.
pub trait Mutator: Send + Sync {
    /// Label used for the produced test case in reports.
    fn name(&self) -> &str;

    /// Produces the mutated input from `seed`.
    fn mutate(&self, seed: &[u8]) -> Vec<u8>;
}

/// Replaces every occurrence of a byte pattern with another.
///
/// Covers structural corruption (`<html` → `<htm`), encoding stress
/// (`value` → a multi-byte code point) and delimiter stripping (`>` → nothing).
/// Seeds that don't contain the pattern come back unchanged.
#[derive(Debug, Clone)]
pub struct ReplaceMutator {
    name: String,
    pattern: Vec<u8>,
    replacement: Vec<u8>,
}

impl ReplaceMutator {
    pub fn new(
        name: impl Into<String>,
        pattern: impl Into<Vec<u8>>,
        replacement: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }
}

impl Mutator for ReplaceMutator {
    fn name(&self) -> &str {
        &self.name
    }

    fn mutate(&self, seed: &[u8]) -> Vec<u8> {
        replace_all(seed, &self.pattern, &self.replacement)
    }
}

fn replace_all(haystack: &[u8], pattern: &[u8], replacement: &[u8]) -> Vec<u8> {
    if pattern.is_empty() {
        return haystack.to_vec();
    }

    let mut out = Vec::with_capacity(haystack.len());
    let mut rest = haystack;
    while let Some(pos) = rest.windows(pattern.len()).position(|w| w == pattern) {
        out.extend_from_slice(&rest[..pos]);
        out.extend_from_slice(replacement);
        rest = &rest[pos + pattern.len()..];
    }
    out.extend_from_slice(rest);
    out
}

/// Appends a fixed suffix, e.g. an unmatched closing tag.
#[derive(Debug, Clone)]
pub struct AppendMutator {
    name: String,
    suffix: Vec<u8>,
}

impl AppendMutator {
    pub fn new(name: impl Into<String>, suffix: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            suffix: suffix.into(),
        }
    }
}

impl Mutator for AppendMutator {
    fn name(&self) -> &str {
        &self.name
    }

    fn mutate(&self, seed: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(seed.len() + self.suffix.len());
        out.extend_from_slice(seed);
        out.extend_from_slice(&self.suffix);
        out
    }
}

/// Keeps the first half of the seed, counted in bytes.
///
/// Multi-byte UTF-8 sequences straddling the midpoint get split, which is
/// one more way to hand the target malformed text. An empty seed yields an
/// empty input.
#[derive(Debug, Clone, Copy, Default)]
pub struct TruncateMutator;

impl Mutator for TruncateMutator {
    fn name(&self) -> &str {
        "truncation"
    }

    fn mutate(&self, seed: &[u8]) -> Vec<u8> {
        seed[..seed.len() / 2].to_vec()
    }
}

/// Ignores the seed and always returns the same payload.
///
/// Used for payload substitution, nesting corruption, malformed attributes
/// and the empty input.
#[derive(Debug, Clone)]
pub struct ConstantMutator {
    name: String,
    payload: Vec<u8>,
}

impl ConstantMutator {
    pub fn new(name: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }
}

impl Mutator for ConstantMutator {
    fn name(&self) -> &str {
        &self.name
    }

    fn mutate(&self, _seed: &[u8]) -> Vec<u8> {
        self.payload.clone()
    }
}

/// Repeats a short fragment `count` times, independent of the seed.
///
/// Meant to probe resource exhaustion in the target rather than its parser.
#[derive(Debug, Clone)]
pub struct RepeatMutator {
    name: String,
    fragment: Vec<u8>,
    count: usize,
}

impl RepeatMutator {
    pub fn new(name: impl Into<String>, fragment: impl Into<Vec<u8>>, count: usize) -> Self {
        Self {
            name: name.into(),
            fragment: fragment.into(),
            count,
        }
    }
}

impl Mutator for RepeatMutator {
    fn name(&self) -> &str {
        &self.name
    }

    fn mutate(&self, _seed: &[u8]) -> Vec<u8> {
        self.fragment.repeat(self.count)
    }
}

/// Picks bytes of the seed at random and adds a small value (1-15) to each,
/// with wrapping.
///
/// The generator is re-seeded from `rng_seed` on every call, so the mutator
/// stays deterministic and the corpus reproducible. An empty seed is treated
/// as a single zero byte.
#[derive(Debug, Clone)]
pub struct RandomByteMutator {
    name: String,
    rng_seed: u64,
    flips: usize,
}

impl RandomByteMutator {
    pub fn new(name: impl Into<String>, rng_seed: u64, flips: usize) -> Self {
        Self {
            name: name.into(),
            rng_seed,
            flips: flips.max(1),
        }
    }
}

impl Mutator for RandomByteMutator {
    fn name(&self) -> &str {
        &self.name
    }

    fn mutate(&self, seed: &[u8]) -> Vec<u8> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.rng_seed);
        let mut bytes = seed.to_vec();
        if bytes.is_empty() {
            bytes.push(0);
        }

        for _ in 0..self.flips {
            let add = rng.random_range(1u8..=15u8);
            let idx = rng.random_range(0..bytes.len());
            bytes[idx] = bytes[idx].wrapping_add(add);
        }
        bytes
    }
}

/// The built-in mutator list, in the order their test cases are run.
pub fn default_mutators() -> Vec<Box<dyn Mutator>> {
    vec![
        Box::new(ReplaceMutator::new("structural-corruption", "<html", "<htm")),
        Box::new(AppendMutator::new("unclosed-tag", "</unclosed>")),
        Box::new(ReplaceMutator::new("encoding-stress", "value", "💣")),
        Box::new(TruncateMutator),
        Box::new(ReplaceMutator::new("delimiter-stripping", ">", "")),
        Box::new(ConstantMutator::new(
            "payload-substitution",
            "<script>alert('xss')</script>",
        )),
        Box::new(ConstantMutator::new("nesting-corruption", "<html><div></html>")),
        Box::new(ConstantMutator::new("malformed-attribute", "<html a=!!@##>")),
        Box::new(ConstantMutator::new("empty-input", "")),
        Box::new(RepeatMutator::new(
            "oversized-input",
            "<html>",
            OVERSIZED_REPEAT,
        )),
    ]
}

/// `count` random byte mutators, labelled `random-byte-<i>`, each seeded
/// from `rng_seed + i`.
pub fn random_mutators(count: usize, rng_seed: u64) -> Vec<Box<dyn Mutator>> {
    (0..count)
        .map(|i| {
            Box::new(RandomByteMutator::new(
                format!("random-byte-{i}"),
                rng_seed.wrapping_add(i as u64),
                DEFAULT_RANDOM_FLIPS,
            )) as Box<dyn Mutator>
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &[u8] = br#"<html a="value">...</html>"#;

    fn by_name<'a>(mutators: &'a [Box<dyn Mutator>], name: &str) -> &'a dyn Mutator {
        mutators
            .iter()
            .find(|m| m.name() == name)
            .map(|m| m.as_ref())
            .unwrap_or_else(|| panic!("no mutator named {name}"))
    }

    #[test]
    fn default_set_has_unique_names_in_order() {
        let names: Vec<String> = default_mutators()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(
            names,
            [
                "structural-corruption",
                "unclosed-tag",
                "encoding-stress",
                "truncation",
                "delimiter-stripping",
                "payload-substitution",
                "nesting-corruption",
                "malformed-attribute",
                "empty-input",
                "oversized-input",
            ]
        );
    }

    #[test]
    fn default_mutators_transform_html_seed() {
        let mutators = default_mutators();
        let apply = |name: &str| by_name(&mutators, name).mutate(SEED);

        assert_eq!(apply("structural-corruption"), br#"<htm a="value">...</html>"#);
        assert_eq!(
            apply("unclosed-tag"),
            br#"<html a="value">...</html></unclosed>"#
        );
        assert_eq!(
            apply("encoding-stress"),
            r#"<html a="💣">...</html>"#.as_bytes()
        );
        assert_eq!(apply("truncation"), br#"<html a="valu"#);
        assert_eq!(apply("delimiter-stripping"), br#"<html a="value"...</html"#);
        assert_eq!(apply("empty-input"), b"");
        assert_eq!(apply("oversized-input").len(), 6 * OVERSIZED_REPEAT);
    }

    #[test]
    fn truncation_of_empty_seed_is_empty() {
        assert!(TruncateMutator.mutate(b"").is_empty());
        assert_eq!(TruncateMutator.mutate(b"a"), b"");
        assert_eq!(TruncateMutator.mutate(b"abcd"), b"ab");
    }

    #[test]
    fn truncation_counts_bytes_not_code_points() {
        // Two 4-byte code points: the cut lands between them.
        let seed = "💣💣".as_bytes();
        assert_eq!(TruncateMutator.mutate(seed), "💣".as_bytes());
        // One 4-byte code point: the cut splits it.
        assert_eq!(TruncateMutator.mutate("💣".as_bytes()), &[0xF0u8, 0x9F]);
    }

    #[test]
    fn replace_without_match_returns_seed() {
        let m = ReplaceMutator::new("structural-corruption", "<html", "<htm");
        assert_eq!(m.mutate(b"plain text"), b"plain text");
        assert_eq!(m.mutate(b""), b"");
    }

    #[test]
    fn replace_handles_adjacent_and_empty_patterns() {
        assert_eq!(replace_all(b">>a>", b">", b""), b"a");
        assert_eq!(replace_all(b"aaaa", b"aa", b"b"), b"bb");
        assert_eq!(replace_all(b"abc", b"", b"x"), b"abc");
    }

    #[test]
    fn random_byte_mutator_is_deterministic() {
        let m = RandomByteMutator::new("random-byte-0", 42, 4);
        let first = m.mutate(SEED);
        let second = m.mutate(SEED);
        assert_eq!(first, second);
        assert_eq!(first.len(), SEED.len());
        assert_ne!(first, SEED);
    }

    #[test]
    fn random_byte_mutator_handles_empty_seed() {
        let m = RandomByteMutator::new("random-byte-0", 7, 1);
        let out = m.mutate(b"");
        assert_eq!(out.len(), 1);
        assert!((1..=15).contains(&out[0]));
    }

    #[test]
    fn random_mutators_get_distinct_labels() {
        let mutators = random_mutators(3, 9);
        let names: Vec<&str> = mutators.iter().map(|m| m.name()).collect();
        assert_eq!(names, ["random-byte-0", "random-byte-1", "random-byte-2"]);
        assert!(random_mutators(0, 9).is_empty());
    }
}
