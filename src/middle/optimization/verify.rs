//! Checks that a rescheduled region is a legal reordering of the original:
//! the same statements (up to rewritten store values) and no reader moved
//! ahead of a statement storing something it reads.

use hashbrown::HashMap;
use itertools::Itertools;
use thiserror::Error;

use super::reorder_stores::{
    ReorderOptions,
    alias::MayAlias,
    flatten, reorder_pipeline,
    statement_info::{DependencyOracle, StatementInfo, StmtId},
};
use crate::{
    frontend::intern::InternedSymbol,
    index::{Index, IndexVec},
    middle::ir::{
        Expr, MemoryRef, Pipeline, Stmt, StmtKind,
        mutate::{Mutator, walk_pipeline_mut, walk_stmt_mut},
        visit::{Visitor, walk_store},
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("`{location}` is stored to {before} time(s) before and {after} time(s) after")]
    StoreCountChanged {
        location: String,
        before: usize,
        after: usize,
    },
    #[error("`{buffer}` is freed {before} time(s) before and {after} time(s) after")]
    FreeCountChanged {
        buffer: String,
        before: usize,
        after: usize,
    },
    #[error("region has {before} statement(s) before and {after} after")]
    StatementCountChanged { before: usize, after: usize },
    #[error("statement #{index} of the original region has no counterpart after reordering")]
    StatementLost { index: usize },
    #[error("statement #{reader} reads a value stored by statement #{writer} but now runs before it")]
    DependencyViolated { writer: usize, reader: usize },
    #[error("output differs from the reordered input, which is:\n{expected}")]
    OutputDiffers { expected: String },
}

#[derive(Default)]
struct CountAccesses {
    stores: HashMap<MemoryRef, usize>,
    frees: HashMap<InternedSymbol, usize>,
}

impl Visitor for CountAccesses {
    fn visit_store(&mut self, destination: &MemoryRef, value: &Expr) {
        *self.stores.entry(destination.clone()).or_default() += 1;
        walk_store(self, destination, value);
    }

    fn visit_free(&mut self, buffer: InternedSymbol) {
        *self.frees.entry(buffer).or_default() += 1;
    }
}

fn count_accesses(stmt: &Stmt) -> CountAccesses {
    let mut counts = CountAccesses::default();
    counts.visit_stmt(stmt);
    counts
}

/// Every store destination and every freed buffer must occur as often in
/// `after` as in `before`.
pub fn check_permutation(before: &Stmt, after: &Stmt) -> Result<(), VerifyError> {
    let before = count_accesses(before);
    let after = count_accesses(after);

    let locations = before.stores.keys().chain(after.stores.keys()).unique();

    // Sorted so the first reported mismatch does not depend on hashing
    for location in locations.sorted_by_cached_key(|l| strip_ansi_escapes::strip_str(l.to_string())) {
        let b = before.stores.get(location).copied().unwrap_or_default();
        let a = after.stores.get(location).copied().unwrap_or_default();

        if a != b {
            return Err(VerifyError::StoreCountChanged {
                location: strip_ansi_escapes::strip_str(location.to_string()),
                before: b,
                after: a,
            });
        }
    }

    let buffers = before.frees.keys().chain(after.frees.keys()).unique();

    for buffer in buffers.sorted_by_key(|b| b.value()) {
        let b = before.frees.get(buffer).copied().unwrap_or_default();
        let a = after.frees.get(buffer).copied().unwrap_or_default();

        if a != b {
            return Err(VerifyError::FreeCountChanged {
                buffer: buffer.value().to_owned(),
                before: b,
                after: a,
            });
        }
    }

    Ok(())
}

/// Replaces every stored value with a placeholder, which leaves exactly the
/// parts of a statement the pass is not allowed to change.
struct EraseStoredValues;

impl Mutator for EraseStoredValues {
    fn mutate_stmt(&mut self, stmt: &Stmt) -> Stmt {
        match stmt.kind() {
            StmtKind::Store { destination, .. } => Stmt::store(destination.clone(), Expr::int(0)),
            _ => walk_stmt_mut(self, stmt),
        }
    }
}

/// Checks one region given its atomic statements before and after
/// scheduling: the output must be a permutation of the input (store values
/// aside), and whenever an earlier input statement stores something a later
/// one loads, their order must be kept.
pub fn check_region(before: &[Stmt], after: &[Stmt], alias: &dyn MayAlias) -> Result<(), VerifyError> {
    if before.len() != after.len() {
        return Err(VerifyError::StatementCountChanged {
            before: before.len(),
            after: after.len(),
        });
    }

    let erased_after = after
        .iter()
        .map(|s| EraseStoredValues.mutate_stmt(s))
        .collect::<Vec<_>>();

    // Position in `after` of each statement of `before`. Identical statements
    // are matched up in order.
    let mut taken = vec![false; after.len()];
    let mut position = Vec::with_capacity(before.len());

    for (index, stmt) in before.iter().enumerate() {
        let erased = EraseStoredValues.mutate_stmt(stmt);

        let Some(found) = (0..after.len()).find(|&i| !taken[i] && erased_after[i] == erased) else {
            return Err(VerifyError::StatementLost { index });
        };

        taken[found] = true;
        position.push(found);
    }

    let table: IndexVec<StmtId, StatementInfo> =
        before.iter().cloned().map(StatementInfo::new).collect();
    let oracle = DependencyOracle::new(&table, alias);

    for (writer, reader) in table.indices().tuple_combinations() {
        if oracle.loads_from(reader, writer) && position[reader.index()] < position[writer.index()]
        {
            return Err(VerifyError::DependencyViolated {
                writer: writer.index(),
                reader: reader.index(),
            });
        }
    }

    Ok(())
}

/// Reruns the pass region by region on `stmt`, checking every region as it
/// goes, and returns the rescheduled tree.
struct RegionChecker<'a> {
    options: &'a ReorderOptions,
    alias: &'a dyn MayAlias,
    result: Result<(), VerifyError>,
}

impl Mutator for RegionChecker<'_> {
    fn mutate_pipeline(&mut self, stmt: &Stmt, pipeline: &Pipeline) -> Stmt {
        let rebuilt = walk_pipeline_mut(self, stmt, pipeline);

        let StmtKind::Pipeline(pipeline) = rebuilt.kind() else {
            unreachable!("rebuilding a pipeline always yields a pipeline")
        };

        let replacement = reorder_pipeline(pipeline, self.options, self.alias);

        if self.result.is_ok() {
            let mut after = Vec::new();
            replacement.flatten_into(&mut after);

            self.result = check_region(&flatten(pipeline), &after, self.alias);
        }

        replacement
    }
}

/// Verifies that the whole tree keeps its stores and frees, that every region
/// of `input` is rescheduled legally, and that `output` is exactly the tree
/// those rescheduled regions make up.
pub fn verify_reorder_stores(
    input: &Stmt,
    output: &Stmt,
    options: &ReorderOptions,
    alias: &dyn MayAlias,
) -> Result<(), VerifyError> {
    check_permutation(input, output)?;

    let mut checker = RegionChecker {
        options,
        alias,
        result: Ok(()),
    };
    let expected = checker.mutate_stmt(input);
    checker.result?;

    if expected != *output {
        return Err(VerifyError::OutputDiffers {
            expected: strip_ansi_escapes::strip_str(expected.to_string()),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::optimization::reorder_stores::{alias::StructuralAlias, reorder_stores};

    fn store(buffer: &str, index: i64, value: Expr) -> Stmt {
        Stmt::store(MemoryRef::new(buffer, Expr::int(index)), value)
    }

    #[test]
    fn accepts_rewritten_values() {
        let before = vec![
            store("a", 0, Expr::load("b", Expr::int(0))),
            store("c", 0, Expr::load("a", Expr::int(0))),
        ];
        let after = vec![
            store("a", 0, Expr::load("b", Expr::int(0))),
            store("c", 0, Expr::load("b", Expr::int(0))),
        ];

        assert_eq!(check_region(&before, &after, &StructuralAlias), Ok(()));
    }

    #[test]
    fn rejects_readers_moved_ahead_of_writers() {
        let before = vec![
            store("a", 0, Expr::int(1)),
            store("c", 0, Expr::load("a", Expr::int(0))),
        ];
        let after = vec![before[1].clone(), before[0].clone()];

        assert_eq!(
            check_region(&before, &after, &StructuralAlias),
            Err(VerifyError::DependencyViolated {
                writer: 0,
                reader: 1
            })
        );
    }

    #[test]
    fn rejects_lost_statements() {
        let before = vec![store("a", 0, Expr::int(1)), Stmt::free("a")];
        let after = vec![store("a", 0, Expr::int(1)), Stmt::free("b")];

        assert_eq!(
            check_region(&before, &after, &StructuralAlias),
            Err(VerifyError::StatementLost { index: 1 })
        );
        assert_eq!(
            check_permutation(&Stmt::block(before), &Stmt::block(after)),
            Err(VerifyError::FreeCountChanged {
                buffer: "a".to_owned(),
                before: 1,
                after: 0
            })
        );
    }

    #[test]
    fn rejects_an_output_the_pass_would_not_produce() {
        let input = Stmt::pipeline(
            "f",
            store("a", 0, Expr::int(1)),
            None,
            store("c", 0, Expr::load("a", Expr::int(0))),
        );
        let options = ReorderOptions::default();

        let output = reorder_stores(&input, &options);
        assert_eq!(verify_reorder_stores(&input, &output, &options, &StructuralAlias), Ok(()));

        let swapped = Stmt::block(vec![
            store("c", 0, Expr::load("a", Expr::int(0))),
            store("a", 0, Expr::int(1)),
        ]);
        assert!(matches!(
            verify_reorder_stores(&input, &swapped, &options, &StructuralAlias),
            Err(VerifyError::OutputDiffers { .. })
        ));
    }

    #[test]
    fn reports_store_count_changes() {
        let before = Stmt::block(vec![store("a", 0, Expr::int(1)), store("a", 0, Expr::int(2))]);
        let after = store("a", 0, Expr::int(2));

        let err = check_permutation(&before, &after).unwrap_err();

        assert_eq!(err.to_string(), "`a[0]` is stored to 2 time(s) before and 1 time(s) after");
    }
}
