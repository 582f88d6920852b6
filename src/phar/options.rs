/// What to do when two manifest entries normalize to the same path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Keep the later entry, drop the earlier one.
    #[default]
    LastWins,
    /// Keep the first entry, drop later ones.
    FirstWins,
    /// Fail the parse with [`PharError::DuplicateEntry`](super::PharError::DuplicateEntry).
    Reject,
}

/// Knobs for [`Archive::parse_with`](super::Archive::parse_with).
///
/// The defaults accept anything PHP itself would load.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    pub duplicates: DuplicatePolicy,
    /// When set, the halt marker must end within this many leading bytes.
    pub max_stub_len: Option<usize>,
}

impl ParseOptions {
    pub fn duplicates(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }

    pub fn max_stub_len(mut self, max: usize) -> Self {
        self.max_stub_len = Some(max);
        self
    }
}
