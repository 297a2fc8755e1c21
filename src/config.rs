//! Session configuration.

/// Engine-wide settings applied to every statement a session executes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Reject compound SELECT operands whose columns carry different known
    /// affinities, not only different column counts.
    pub strict_compound_affinity: bool,
    /// Upper bound on the rows a cartesian product may hold.
    pub product_row_limit: Option<usize>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict_compound_affinity(mut self, strict: bool) -> Self {
        self.strict_compound_affinity = strict;
        self
    }

    pub fn product_row_limit(mut self, limit: usize) -> Self {
        self.product_row_limit = Some(limit);
        self
    }
}
