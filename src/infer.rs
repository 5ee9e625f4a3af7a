//! Flow-insensitive, constraint based type inference.
//!
//! Every value-producing program location owns a `TypeSet`. Constraints registered on a set
//! propagate each type added to it into other sets, so the sets only ever grow. Queries made by a
//! compiler register freeze constraints that queue the compiled script for recompilation once the
//! answer it was given no longer holds.

mod ty;
mod type_set;
mod object;
mod constraint;
mod solver;
mod compartment;
mod callsite;
mod script;
mod stack;
mod print;

pub use ty::*;
pub use type_set::*;
pub use object::*;
pub use constraint::{ArithOp, FilterMode, TypeConstraint};
pub use solver::PendingWork;
pub use compartment::*;
pub use callsite::*;
pub use script::*;
pub use stack::*;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::debug_log::SpewChannels;

/// Failures that abandon the analysis of the current compilation unit
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferError {
    #[error("out of memory while growing the {what}")]
    OutOfMemory {what: &'static str},

    #[error("type object `{name}` is not a function")]
    NotAFunction {name: Arc<str>},

    #[error("type object `{name}` is a function")]
    UnexpectedFunction {name: Arc<str>},

    #[error("the prototype of `{name}` has already been set")]
    PrototypeAlreadySet {name: Arc<str>},

    #[error("making `{proto}` the prototype of `{name}` would create a prototype cycle")]
    PrototypeCycle {name: Arc<str>, proto: Arc<str>},
}

pub type InferResult<T> = Result<T, InferError>;

#[derive(Debug, Clone)]
pub struct InferOptions {
    /// The spew channels the host enabled. The result dump is only built if `result` is on.
    pub spew: SpewChannels,
    /// Whether time spent in the solver is added to `InferStats::analysis_time`
    pub record_timing: bool,
    /// The number of pending work items the worklist has room for up front
    pub worklist_capacity: usize,
}

impl Default for InferOptions {
    fn default() -> Self {
        Self {
            spew: SpewChannels::default(),
            record_timing: false,
            worklist_capacity: 64,
        }
    }
}

/// Pushed type sets are bucketed by their size up to this many types
pub const TYPE_COUNT_LIMIT: usize = 4;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InferStats {
    /// Time spent draining the worklist, only recorded with `InferOptions::record_timing`
    pub analysis_time: Duration,
    /// Number of scripts handed to the recompiler
    pub recompilations: usize,
    /// `type_counts[n]` is the number of pushed sets with exactly `n` types
    pub type_counts: [usize; TYPE_COUNT_LIMIT],
    /// Number of pushed sets with at least `TYPE_COUNT_LIMIT` types or unknown contents
    pub type_count_over: usize,
    /// The deepest nesting of solver passes seen so far
    pub max_solver_depth: usize,
    /// Number of solver passes abandoned because of an error
    pub failures: usize,
}

/// The collaborator that recompiles scripts whose compiled code made assumptions that no longer
/// hold
pub trait Recompiler {
    fn recompile(&mut self, script: ScriptId);
}

impl<F: FnMut(ScriptId)> Recompiler for F {
    fn recompile(&mut self, script: ScriptId) {
        self(script)
    }
}
