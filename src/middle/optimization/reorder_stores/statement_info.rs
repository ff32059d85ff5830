use once_cell::unsync::OnceCell;

use super::{ReorderOptions, alias::MayAlias};
use crate::{
    frontend::intern::InternedSymbol,
    index::{IndexVec, simple_index},
    middle::ir::{
        Expr, MemoryRef, Stmt, StmtKind,
        visit::{Visitor, walk_memory_ref, walk_stmt, walk_store},
    },
};

simple_index! {
    /// Position of an atomic statement in the flattened pipeline region. Stays
    /// valid for the whole scheduling run no matter how statements move.
    pub struct StmtId;
}

#[derive(Debug, Clone)]
pub struct StoreAccess {
    pub destination: MemoryRef,
    pub value: Expr,
    /// Whether the store runs exactly once whenever its statement runs, as
    /// opposed to sitting inside a loop or a conditional.
    pub unconditional: bool,
}

/// Every memory access found anywhere inside one atomic statement, in
/// program order.
#[derive(Debug, Default)]
pub struct Accesses {
    pub loads: Vec<MemoryRef>,
    pub stores: Vec<StoreAccess>,
    pub frees: Vec<InternedSymbol>,
}

#[derive(Default)]
struct CollectAccesses {
    accesses: Accesses,
    /// Number of loops and conditionals enclosing the current node
    conditional_depth: usize,
}

impl Visitor for CollectAccesses {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        let conditional = matches!(
            stmt.kind(),
            StmtKind::For { .. } | StmtKind::IfThenElse { .. }
        );

        if conditional {
            self.conditional_depth += 1;
        }

        walk_stmt(self, stmt);

        if conditional {
            self.conditional_depth -= 1;
        }
    }

    fn visit_store(&mut self, destination: &MemoryRef, value: &Expr) {
        self.accesses.stores.push(StoreAccess {
            destination: destination.clone(),
            value: value.clone(),
            unconditional: self.conditional_depth == 0,
        });

        walk_store(self, destination, value);
    }

    fn visit_load(&mut self, source: &MemoryRef) {
        self.accesses.loads.push(source.clone());

        walk_memory_ref(self, source);
    }

    fn visit_free(&mut self, buffer: InternedSymbol) {
        self.accesses.frees.push(buffer);
    }
}

pub fn collect_accesses(stmt: &Stmt) -> Accesses {
    let mut collector = CollectAccesses::default();
    collector.visit_stmt(stmt);
    collector.accesses
}

/// Every load inside an expression, outermost first
pub fn loads_in(expr: &Expr) -> Vec<MemoryRef> {
    let mut collector = CollectAccesses::default();
    collector.visit_expr(expr);
    collector.accesses.loads
}

/// An atomic statement along with its memory accesses, gathered the first
/// time anybody asks for them.
#[derive(Debug)]
pub struct StatementInfo {
    stmt: Stmt,
    accesses: OnceCell<Accesses>,
}

impl StatementInfo {
    pub fn new(stmt: Stmt) -> Self {
        Self {
            stmt,
            accesses: OnceCell::new(),
        }
    }

    pub fn stmt(&self) -> &Stmt {
        &self.stmt
    }

    pub fn accesses(&self) -> &Accesses {
        self.accesses.get_or_init(|| collect_accesses(&self.stmt))
    }

    pub fn loads(&self) -> &[MemoryRef] {
        &self.accesses().loads
    }

    pub fn stores(&self) -> &[StoreAccess] {
        &self.accesses().stores
    }

    pub fn frees(&self) -> &[InternedSymbol] {
        &self.accesses().frees
    }

    /// Whether any of this statement's stores may write one of `locations`
    pub fn stores_to_any(&self, locations: &[MemoryRef], alias: &dyn MayAlias) -> bool {
        self.stores().iter().any(|store| {
            locations
                .iter()
                .any(|location| alias.may_alias(&store.destination, location))
        })
    }

    fn accesses_buffer(&self, buffer: InternedSymbol) -> bool {
        self.loads().iter().any(|l| l.buffer == buffer)
            || self.stores().iter().any(|s| s.destination.buffer == buffer)
    }
}

/// Answers ordering questions between the statements of one region.
pub struct DependencyOracle<'a> {
    statements: &'a IndexVec<StmtId, StatementInfo>,
    alias: &'a dyn MayAlias,
}

impl<'a> DependencyOracle<'a> {
    pub fn new(statements: &'a IndexVec<StmtId, StatementInfo>, alias: &'a dyn MayAlias) -> Self {
        Self { statements, alias }
    }

    /// Does `a` read a location that `b` writes? In other words, does `a`
    /// need `b`'s store to be visible already. Frees never count.
    pub fn loads_from(&self, a: StmtId, b: StmtId) -> bool {
        let reads = self.statements[a].loads();
        self.statements[b].stores_to_any(reads, self.alias)
    }

    /// Does `a` overwrite a location that `b` reads?
    pub fn stores_over_loads_of(&self, a: StmtId, b: StmtId) -> bool {
        self.loads_from(b, a)
    }

    /// Do `a` and `b` both write some common location?
    pub fn stores_over_stores_of(&self, a: StmtId, b: StmtId) -> bool {
        let destinations = self.statements[b]
            .stores()
            .iter()
            .map(|s| s.destination.clone())
            .collect::<Vec<_>>();

        self.statements[a].stores_to_any(&destinations, self.alias)
    }

    /// Does `b` free a buffer that `a` loads from or stores to?
    pub fn frees_buffer_used_by(&self, b: StmtId, a: StmtId) -> bool {
        self.statements[b]
            .frees()
            .iter()
            .any(|buffer| self.statements[a].accesses_buffer(*buffer))
    }

    /// Whether `candidate` must stay behind `predecessor`, a statement that
    /// precedes it and has not been scheduled yet.
    pub fn must_follow(
        &self,
        candidate: StmtId,
        predecessor: StmtId,
        options: &ReorderOptions,
    ) -> bool {
        if self.loads_from(candidate, predecessor) {
            return true;
        }

        if options.strict_hazards
            && (self.stores_over_loads_of(candidate, predecessor)
                || self.stores_over_stores_of(candidate, predecessor))
        {
            return true;
        }

        options.free_barriers
            && (self.frees_buffer_used_by(predecessor, candidate)
                || self.frees_buffer_used_by(candidate, predecessor))
    }
}
