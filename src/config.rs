use crate::error::FilterError;

pub const MIN_NESTING_DEPTH: usize = 2;
pub const MAX_NESTING_DEPTH: usize = 5;
pub const DEFAULT_NESTING_DEPTH: usize = 3;

/// Nested group levels the query API accepts beneath the root group.
pub const DEFAULT_WIRE_DEPTH: usize = 2;
pub const MAX_WIRE_DEPTH: usize = 8;

pub const DEFAULT_MAX_CLAUSES: usize = 256;
pub const MAX_CLAUSES_CEILING: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Group levels the editor lets a draft grow to.
    pub max_nesting: usize,
    /// Group levels below the root allowed in the converted filter.
    pub wire_depth: usize,
    /// Leaves distributive expansion may generate for one group.
    pub max_clauses: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_nesting: DEFAULT_NESTING_DEPTH,
            wire_depth: DEFAULT_WIRE_DEPTH,
            max_clauses: DEFAULT_MAX_CLAUSES,
        }
    }
}

impl Limits {
    pub fn new(
        max_nesting: usize,
        wire_depth: usize,
        max_clauses: usize,
    ) -> Result<Self, FilterError> {
        check_range("max nesting depth", max_nesting, MIN_NESTING_DEPTH, MAX_NESTING_DEPTH)?;
        check_range("wire depth", wire_depth, 1, MAX_WIRE_DEPTH)?;
        check_range("max clauses", max_clauses, 1, MAX_CLAUSES_CEILING)?;
        Ok(Self {
            max_nesting,
            wire_depth,
            max_clauses,
        })
    }
}

pub fn check_range(
    name: &'static str,
    requested: usize,
    min: usize,
    max: usize,
) -> Result<(), FilterError> {
    if (min..=max).contains(&requested) {
        Ok(())
    } else {
        Err(FilterError::LimitOutOfRange {
            name,
            requested,
            min,
            max,
        })
    }
}
