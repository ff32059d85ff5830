//! Reorders the statements of each pipeline region so that a statement reading
//! a stored value runs as soon as possible after the store, shrinking the
//! lifetime of intermediate buffers, and folds trivial store-load-store round
//! trips into direct stores of the original value.
//!
//! Every region is handled independently:
//!
//! 1. The produce, update and consume phases are flattened into one list of
//!    atomic statements. Loops, conditionals and lets are never split.
//! 2. The list is scheduled greedily. The first pending statement is always
//!    emitted next. Then, scanning the remaining statements in order, every
//!    statement which reads something it stores is pulled up right behind it,
//!    unless an earlier pending statement also stores something it reads.
//!    Pulled statements get the stored values forwarded into them.
//! 3. The schedule is chained back into a single sequence which replaces the
//!    whole region.
//!
//! Frees do not take part in any ordering decision unless
//! [`ReorderOptions::free_barriers`] is set, so a statement can be moved past
//! the free of a buffer it uses.

use std::collections::VecDeque;

use tracing::{debug, debug_span, trace};

use crate::{
    index::IndexVec,
    middle::ir::{
        Pipeline, Stmt, StmtKind,
        mutate::{Mutator, walk_pipeline_mut},
    },
};

pub mod alias;
pub mod forward;
pub mod statement_info;

use self::{
    alias::{MayAlias, StructuralAlias},
    forward::forward_stores,
    statement_info::{DependencyOracle, StatementInfo, StmtId},
};

/// Knobs for the pass. The defaults give the plain greedy schedule with direct
/// store-of-load forwarding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReorderOptions {
    /// Also forward into stores of a variable which a let statement bound to
    /// a load, not only into stores of a load.
    pub forward_through_lets: bool,
    /// Also keep a statement behind an earlier pending statement when it would
    /// overwrite something that statement reads or writes.
    pub strict_hazards: bool,
    /// Treat frees as ordering barriers for statements using the freed buffer.
    pub free_barriers: bool,
}

/// Runs the pass over every pipeline region in `stmt` with the structural
/// alias test.
pub fn reorder_stores(stmt: &Stmt, options: &ReorderOptions) -> Stmt {
    reorder_stores_with(stmt, options, &StructuralAlias)
}

pub fn reorder_stores_with(stmt: &Stmt, options: &ReorderOptions, alias: &dyn MayAlias) -> Stmt {
    ReorderStores { options, alias }.mutate_stmt(stmt)
}

struct ReorderStores<'a> {
    options: &'a ReorderOptions,
    alias: &'a dyn MayAlias,
}

impl Mutator for ReorderStores<'_> {
    fn mutate_pipeline(&mut self, stmt: &Stmt, pipeline: &Pipeline) -> Stmt {
        // Regions nested inside this one are rescheduled first, on their own
        let rebuilt = walk_pipeline_mut(self, stmt, pipeline);

        let StmtKind::Pipeline(pipeline) = rebuilt.kind() else {
            unreachable!("rebuilding a pipeline always yields a pipeline")
        };

        reorder_pipeline(pipeline, self.options, self.alias)
    }
}

/// Reschedules a single region and returns the statement replacing it
pub fn reorder_pipeline(pipeline: &Pipeline, options: &ReorderOptions, alias: &dyn MayAlias) -> Stmt {
    let _span = debug_span!("reorder_pipeline", name = %pipeline.name).entered();

    let statements = flatten(pipeline);
    debug!(statements = statements.len(), "flattened pipeline region");

    let scheduled = schedule(statements, options, alias);

    reassemble(scheduled)
}

/// Lists the atomic statements of the produce, update and consume phases in
/// execution order.
pub fn flatten(pipeline: &Pipeline) -> Vec<Stmt> {
    let mut statements = Vec::new();

    pipeline.produce.flatten_into(&mut statements);

    if let Some(update) = &pipeline.update {
        update.flatten_into(&mut statements);
    }

    pipeline.consume.flatten_into(&mut statements);

    statements
}

/// Greedy list scheduling of the flattened statements. Each outer iteration
/// fixes the first pending statement as the target and pulls every eligible
/// reader of it up behind it, so it runs at most once per statement.
pub fn schedule(statements: Vec<Stmt>, options: &ReorderOptions, alias: &dyn MayAlias) -> Vec<Stmt> {
    let table: IndexVec<StmtId, StatementInfo> =
        statements.into_iter().map(StatementInfo::new).collect();
    let oracle = DependencyOracle::new(&table, alias);

    let mut pending: VecDeque<StmtId> = table.indices().collect();
    let mut scheduled = Vec::with_capacity(table.len());

    while let Some(target) = pending.pop_front() {
        scheduled.push(table[target].stmt().clone());

        let mut kept = VecDeque::with_capacity(pending.len());
        let mut moved: Vec<&StatementInfo> = Vec::new();

        for candidate in pending.drain(..) {
            let eligible = oracle.loads_from(candidate, target)
                && !kept
                    .iter()
                    .any(|&predecessor| oracle.must_follow(candidate, predecessor, options));

            if !eligible {
                kept.push_back(candidate);
                continue;
            }

            trace!(?candidate, ?target, "moving statement next to the store it reads");

            let rewritten = forward_stores(&table[target], &table[candidate], &moved, alias, options);

            if !rewritten.same_node(table[candidate].stmt()) {
                debug!(?candidate, ?target, "forwarded stored value");
            }

            scheduled.push(rewritten);
            moved.push(&table[candidate]);
        }

        pending = kept;
    }

    scheduled
}

/// Chains the scheduled statements into one left nested sequence. There must
/// be at least one statement; a single statement is returned as is.
pub fn reassemble(scheduled: Vec<Stmt>) -> Stmt {
    let mut statements = scheduled.into_iter();

    let Some(first) = statements.next() else {
        panic!("cannot reassemble an empty pipeline region");
    };

    statements.fold(first, Stmt::sequence)
}
