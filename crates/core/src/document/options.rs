//! Parser configuration.

/// Default bound on array/dictionary nesting.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Strict vs. lenient handling of recoverable malformations.
///
/// Strict mode fails on a stream whose `/Length` is missing or too short,
/// on objects missing from the cross-reference table, and on a broken
/// `startxref`. Lenient mode re-synchronizes, yields `null`, or rebuilds the
/// table by scanning for object headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    pub strict: bool,
    /// Maximum array/dictionary nesting depth.
    pub max_depth: usize,
}

impl ParseOptions {
    pub const fn strict() -> Self {
        Self {
            strict: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub const fn lenient() -> Self {
        Self {
            strict: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::lenient()
    }
}
