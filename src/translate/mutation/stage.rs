//! Per-entity write sequencing.

use tracing::trace;

/// Where an entity's write sequence currently stands.
///
/// Stages only move forward: a node is written before its relationships,
/// relationships before the cardinality and authorization checks, and the
/// checks before anything is projected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Stage {
    Pending,
    NodeMaterialized,
    RelationshipsConnected,
    Validated,
    Projected,
}

/// Tracks the stage of one entity's write sequence.
#[derive(Debug)]
pub(crate) struct StageTracker<'a> {
    entity: &'a str,
    stage: Stage,
}

impl<'a> StageTracker<'a> {
    pub(crate) fn new(entity: &'a str) -> Self {
        Self {
            entity,
            stage: Stage::Pending,
        }
    }

    /// Moves to `next`; skipping stages is fine, going back is not.
    pub(crate) fn advance(&mut self, next: Stage) {
        debug_assert!(
            next >= self.stage,
            "{} moved back from {:?} to {:?}",
            self.entity,
            self.stage,
            next
        );
        trace!(entity = self.entity, from = ?self.stage, to = ?next, "translate.mutation.stage");
        self.stage = next;
    }

    pub(crate) fn stage(&self) -> Stage {
        self.stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_advance_in_order() {
        let mut tracker = StageTracker::new("Movie");
        assert_eq!(tracker.stage(), Stage::Pending);
        tracker.advance(Stage::NodeMaterialized);
        tracker.advance(Stage::Validated);
        tracker.advance(Stage::Validated);
        assert_eq!(tracker.stage(), Stage::Validated);
    }

    #[test]
    #[should_panic(expected = "moved back")]
    #[cfg(debug_assertions)]
    fn stages_never_move_back() {
        let mut tracker = StageTracker::new("Movie");
        tracker.advance(Stage::Projected);
        tracker.advance(Stage::NodeMaterialized);
    }
}
