//! The worklist that drives constraint propagation.
//!
//! Constraints never run directly from inside `add_type`. New work is appended to a queue and
//! drained by a single pass, so the native stack does not grow with the length of a propagation
//! chain. The worklist is either idle or resolving. Work added while resolving is drained by the
//! pass that is already running, in the order it was added.

use std::collections::VecDeque;
use std::time::Instant;

use crate::infer_spew;

use super::{ConstraintId, InferError, InferResult, Type, TypeCompartment, TypeSetId};

/// A type that needs to be registered with a constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingWork {
    pub constraint: ConstraintId,
    pub source: TypeSetId,
    pub ty: Type,
}

#[derive(Debug, Default)]
pub(in crate::infer) struct Worklist {
    pending: VecDeque<PendingWork>,
    /// True while a pass is draining `pending`
    resolving: bool,
    /// The number of `resolve_pending` calls currently on the stack
    depth: usize,
    pub(in crate::infer) max_depth: usize,
}

impl Worklist {
    pub(in crate::infer) fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(capacity),
            ..Self::default()
        }
    }

    pub(in crate::infer) fn is_resolving(&self) -> bool {
        self.resolving
    }

    pub(in crate::infer) fn len(&self) -> usize {
        self.pending.len()
    }

    fn push(&mut self, work: PendingWork) -> InferResult<()> {
        self.pending.try_reserve(1).map_err(|_| InferError::OutOfMemory {what: "worklist"})?;
        self.pending.push_back(work);
        Ok(())
    }

    /// Drops all pending work after a failure
    fn abort(&mut self) {
        self.pending.clear();
        self.resolving = false;
    }
}

impl TypeCompartment {
    /// Queues `ty` to be delivered to `constraint` without running the solver
    pub(in crate::infer) fn enqueue(&mut self, constraint: ConstraintId, source: TypeSetId, ty: Type) -> InferResult<()> {
        self.worklist.push(PendingWork {constraint, source, ty})
    }

    /// Queues `ty` to be delivered to `constraint` and runs the solver unless it is already
    /// running further up the stack
    pub fn add_pending(&mut self, constraint: ConstraintId, source: TypeSetId, ty: Type) -> InferResult<()> {
        self.enqueue(constraint, source, ty)?;
        self.resolve_pending()
    }

    /// Drains the worklist. Does nothing if a pass is already in progress; that pass will pick
    /// up anything added since it started.
    pub(in crate::infer) fn resolve_pending(&mut self) -> InferResult<()> {
        self.worklist.depth += 1;
        self.worklist.max_depth = self.worklist.max_depth.max(self.worklist.depth);

        let result = if self.worklist.resolving {
            Ok(())
        } else {
            let start = if self.options.record_timing { Some(Instant::now()) } else { None };
            let result = self.drain_worklist();
            if let Some(start) = start {
                self.stats.analysis_time += start.elapsed();
            }
            result
        };

        self.worklist.depth -= 1;
        result
    }

    fn drain_worklist(&mut self) -> InferResult<()> {
        self.worklist.resolving = true;

        while let Some(work) = self.worklist.pending.pop_front() {
            if let Err(err) = self.fire(work) {
                infer_spew!(dynamic, "solver aborted: {}", err);
                self.worklist.abort();
                self.stats.failures += 1;
                return Err(err);
            }
        }

        self.worklist.resolving = false;
        Ok(())
    }
}
