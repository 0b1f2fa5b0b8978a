//! Draft and applied filters.
//!
//! Edits only ever touch the draft. [`FilterSession::apply`] validates,
//! normalizes and rewrites the draft in one step and copies it to the
//! applied slot only when all of that succeeded.

use log::{debug, info, warn};

use crate::config::{check_range, Limits, MAX_NESTING_DEPTH, MIN_NESTING_DEPTH};
use crate::error::FilterError;
use crate::filter::editor::{self, EditCommand};
use crate::filter::model::{CompoundFilter, FilterNode};
use crate::filter::negate::normalize;
use crate::filter::rewrite::Rewriter;
use crate::filter::validate::{validate_structure, validate_wire_output};
use crate::filter::wire::WireFilter;

#[derive(Debug, Clone, Default)]
pub struct FilterSession {
    draft: CompoundFilter,
    applied: CompoundFilter,
    limits: Limits,
}

impl FilterSession {
    pub fn new(limits: Limits) -> Self {
        Self {
            draft: None,
            applied: None,
            limits,
        }
    }

    /// Starts from an existing draft. The editing depth is raised to the
    /// draft's depth when the draft is already deeper.
    pub fn with_draft(draft: CompoundFilter, mut limits: Limits) -> Self {
        let depth = editor::nesting_depth(draft.as_ref());
        if depth > limits.max_nesting {
            warn!(
                "draft is {depth} levels deep, raising max nesting depth from {}",
                limits.max_nesting
            );
            limits.max_nesting = depth;
        }
        Self {
            draft,
            applied: None,
            limits,
        }
    }

    pub fn draft(&self) -> Option<&FilterNode> {
        self.draft.as_ref()
    }

    pub fn applied(&self) -> Option<&FilterNode> {
        self.applied.as_ref()
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Applies one edit to the draft. Returns whether the draft changed.
    pub fn edit(&mut self, command: &EditCommand) -> bool {
        let next = editor::apply_edit(self.draft.as_ref(), command, self.limits.max_nesting);
        if next == self.draft {
            debug!("edit {command:?} left the draft unchanged");
            return false;
        }
        self.draft = next;
        true
    }

    pub fn reset(&mut self) {
        self.draft = editor::reset();
    }

    /// Changes the editing depth. Raising is always allowed; lowering below
    /// the draft's current depth is refused.
    pub fn set_max_depth(&mut self, max_depth: usize) -> Result<(), FilterError> {
        check_range("max nesting depth", max_depth, MIN_NESTING_DEPTH, MAX_NESTING_DEPTH)?;
        let current = editor::nesting_depth(self.draft.as_ref());
        if max_depth < current {
            return Err(FilterError::DepthBelowTree {
                requested: max_depth,
                current,
            });
        }
        self.limits.max_nesting = max_depth;
        Ok(())
    }

    /// Commits the draft and returns the filter to send, `None` when no
    /// filter is defined.
    pub fn apply(&mut self) -> Result<Option<WireFilter>, FilterError> {
        let draft = self.draft.as_ref();
        validate_structure(draft)?;
        let normalized = normalize(draft)?;
        let wire = Rewriter::from_limits(&self.limits).convert(normalized.as_ref())?;
        if let Some(filter) = &wire {
            validate_wire_output(&filter.to_json(), self.limits.wire_depth)?;
        }

        self.applied = self.draft.clone();
        match &wire {
            Some(filter) => info!(
                "applied filter with {} conditions, draft depth {}",
                filter.leaf_count(),
                editor::nesting_depth(self.applied.as_ref())
            ),
            None => info!("applied empty filter"),
        }
        Ok(wire)
    }
}
