/// Label carried by the unmodified seed at the head of every corpus.
pub const SEED_LABEL: &str = "seed";

/// A single input to feed to the target, tagged with where it came from.
///
/// The label is only used for reporting; it never changes how the input is
/// delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub label: String,
    pub input: Vec<u8>,
}

impl TestCase {
    pub fn new(label: impl Into<String>, input: impl Into<Vec<u8>>) -> Self {
        Self {
            label: label.into(),
            input: input.into(),
        }
    }

    pub fn seed(input: &[u8]) -> Self {
        Self::new(SEED_LABEL, input)
    }

    pub fn len(&self) -> usize {
        self.input.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    /// Hex MD5 of the input, stable across runs.
    pub fn input_md5(&self) -> String {
        format!("{:x}", md5::compute(&self.input))
    }

    /// Lossy UTF-8 rendering of the input, cut after `max_bytes`.
    pub fn preview(&self, max_bytes: usize) -> String {
        if self.input.len() <= max_bytes {
            return String::from_utf8_lossy(&self.input).into_owned();
        }
        format!(
            "{}... ({} bytes)",
            String::from_utf8_lossy(&self.input[..max_bytes]),
            self.input.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_test_case_is_labelled_seed() {
        let case = TestCase::seed(b"abc");
        assert_eq!(case.label, "seed");
        assert_eq!(case.len(), 3);
        assert!(TestCase::new("empty-input", "").is_empty());
    }

    #[test]
    fn preview_cuts_long_inputs() {
        let case = TestCase::new("oversized-input", "<html>".repeat(10));
        assert_eq!(case.preview(6), "<html>... (60 bytes)");
        assert_eq!(TestCase::new("x", "short").preview(16), "short");
    }

    #[test]
    fn input_md5_matches_known_digest() {
        let case = TestCase::new("empty-input", "");
        assert_eq!(case.input_md5(), "d41d8cd98f00b204e9800998ecf8427e");
    }
}
