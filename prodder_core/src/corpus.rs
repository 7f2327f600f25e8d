use crate::input::TestCase;
use crate::mutator::Mutator;

/// The ordered set of test cases for one fuzzing run.
///
/// The seed always comes first, followed by one entry per mutator in the
/// order the mutators were registered. A corpus is built once and never
/// changes afterwards: there is no feedback loop that adds entries during a
/// run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corpus {
    entries: Vec<TestCase>,
}

impl Corpus {
    /// Builds the corpus for `seed`.
    ///
    /// Every mutator is applied exactly once to the original seed; mutations
    /// are never composed. The result has `1 + mutators.len()` entries and
    /// depends only on its arguments, so two calls with the same seed and
    /// mutator list produce identical corpora.
    pub fn generate(seed: &[u8], mutators: &[Box<dyn Mutator>]) -> Self {
        let mut entries = Vec::with_capacity(1 + mutators.len());
        entries.push(TestCase::seed(seed));
        entries.extend(
            mutators
                .iter()
                .map(|m| TestCase::new(m.name(), m.mutate(seed))),
        );
        Self { entries }
    }

    pub fn get(&self, id: usize) -> Option<&TestCase> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TestCase> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Never true for a generated corpus, which always holds the seed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

}

impl<'a> IntoIterator for &'a Corpus {
    type Item = &'a TestCase;
    type IntoIter = std::slice::Iter<'a, TestCase>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Free-function form of [`Corpus::generate`].
pub fn generate_corpus(seed: &[u8], mutators: &[Box<dyn Mutator>]) -> Vec<TestCase> {
    Corpus::generate(seed, mutators).entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutator::{
        ConstantMutator, ReplaceMutator, TruncateMutator, default_mutators, random_mutators,
    };

    const SEED: &[u8] = br#"<html a="value">...</html>"#;

    fn labels(corpus: &Corpus) -> Vec<&str> {
        corpus.iter().map(|tc| tc.label.as_str()).collect()
    }

    #[test]
    fn corpus_starts_with_seed_and_has_one_entry_per_mutator() {
        let mutators = default_mutators();
        let corpus = Corpus::generate(SEED, &mutators);

        assert_eq!(corpus.len(), 1 + mutators.len());
        let first = corpus.get(0).expect("corpus always holds the seed");
        assert_eq!(first, &TestCase::seed(SEED));
        assert!(!corpus.is_empty());
    }

    #[test]
    fn corpus_with_no_mutators_is_just_the_seed() {
        let corpus = Corpus::generate(b"", &[]);
        assert_eq!(corpus.len(), 1);
        assert_eq!(labels(&corpus), ["seed"]);
        assert!(corpus.get(1).is_none());
    }

    #[test]
    fn labels_follow_registration_order() {
        let mutators: Vec<Box<dyn Mutator>> = vec![
            Box::new(TruncateMutator),
            Box::new(ReplaceMutator::new(
                "structural-corruption",
                "<html",
                "<htm",
            )),
            Box::new(ConstantMutator::new("empty-input", "")),
        ];
        let corpus = Corpus::generate(SEED, &mutators);
        assert_eq!(
            labels(&corpus),
            ["seed", "truncation", "structural-corruption", "empty-input"]
        );
    }

    #[test]
    fn mutators_are_applied_to_the_seed_not_chained() {
        let mutators: Vec<Box<dyn Mutator>> = vec![
            Box::new(ReplaceMutator::new(
                "structural-corruption",
                "<html",
                "<htm",
            )),
            Box::new(TruncateMutator),
        ];
        let corpus = Corpus::generate(SEED, &mutators);

        // Truncation sees the original `<html`, not the corrupted `<htm`.
        assert_eq!(corpus.get(2).map(|tc| tc.input.as_slice()), Some(&br#"<html a="valu"#[..]));
    }

    #[test]
    fn generation_is_deterministic() {
        let mut mutators = default_mutators();
        mutators.extend(random_mutators(5, 1234));

        let first = Corpus::generate(SEED, &mutators);
        let second = Corpus::generate(SEED, &mutators);
        assert_eq!(first, second);
        assert_eq!(generate_corpus(SEED, &mutators), first.iter().cloned().collect::<Vec<_>>());
    }

    #[test]
    fn iterates_in_corpus_order() {
        let corpus = Corpus::generate(SEED, &default_mutators());
        let labels: Vec<&str> = (&corpus).into_iter().map(|tc| tc.label.as_str()).collect();
        assert_eq!(labels.first(), Some(&"seed"));
        assert_eq!(labels.last(), Some(&"oversized-input"));
    }
}
