//! Read-only traversal of statement and expression trees. Override the
//! `visit_*` methods that matter and call the matching `walk_*` function to
//! keep descending.

use super::{Expr, ExprKind, MemoryRef, Pipeline, Stmt, StmtKind};
use crate::frontend::intern::InternedSymbol;

pub trait Visitor: Sized {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt)
    }

    fn visit_store(&mut self, destination: &MemoryRef, value: &Expr) {
        walk_store(self, destination, value)
    }

    fn visit_free(&mut self, _buffer: InternedSymbol) {}

    fn visit_pipeline(&mut self, pipeline: &Pipeline) {
        walk_pipeline(self, pipeline)
    }

    fn visit_for(&mut self, variable: InternedSymbol, min: &Expr, extent: &Expr, body: &Stmt) {
        walk_for(self, variable, min, extent, body)
    }

    fn visit_let_stmt(&mut self, name: InternedSymbol, value: &Expr, body: &Stmt) {
        walk_let_stmt(self, name, value, body)
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr)
    }

    fn visit_load(&mut self, source: &MemoryRef) {
        walk_memory_ref(self, source)
    }

    fn visit_let(&mut self, name: InternedSymbol, value: &Expr, body: &Expr) {
        walk_let(self, name, value, body)
    }

    fn visit_variable(&mut self, _name: InternedSymbol) {}
}

pub fn walk_stmt(visitor: &mut impl Visitor, stmt: &Stmt) {
    match stmt.kind() {
        StmtKind::Store { destination, value } => visitor.visit_store(destination, value),
        StmtKind::Free { buffer } => visitor.visit_free(*buffer),
        StmtKind::Sequence { first, rest } => {
            visitor.visit_stmt(first);
            visitor.visit_stmt(rest);
        }
        StmtKind::Pipeline(pipeline) => visitor.visit_pipeline(pipeline),
        StmtKind::For {
            variable,
            min,
            extent,
            body,
        } => visitor.visit_for(*variable, min, extent, body),
        StmtKind::IfThenElse {
            condition,
            then_case,
            else_case,
        } => {
            visitor.visit_expr(condition);
            visitor.visit_stmt(then_case);

            if let Some(e) = else_case {
                visitor.visit_stmt(e);
            }
        }
        StmtKind::LetStmt { name, value, body } => visitor.visit_let_stmt(*name, value, body),
        StmtKind::Evaluate(value) => visitor.visit_expr(value),
    }
}

pub fn walk_store(visitor: &mut impl Visitor, destination: &MemoryRef, value: &Expr) {
    walk_memory_ref(visitor, destination);
    visitor.visit_expr(value);
}

pub fn walk_pipeline(visitor: &mut impl Visitor, pipeline: &Pipeline) {
    visitor.visit_stmt(&pipeline.produce);

    if let Some(update) = &pipeline.update {
        visitor.visit_stmt(update);
    }

    visitor.visit_stmt(&pipeline.consume);
}

pub fn walk_for(
    visitor: &mut impl Visitor,
    _variable: InternedSymbol,
    min: &Expr,
    extent: &Expr,
    body: &Stmt,
) {
    visitor.visit_expr(min);
    visitor.visit_expr(extent);
    visitor.visit_stmt(body);
}

pub fn walk_let_stmt(visitor: &mut impl Visitor, _name: InternedSymbol, value: &Expr, body: &Stmt) {
    visitor.visit_expr(value);
    visitor.visit_stmt(body);
}

pub fn walk_expr(visitor: &mut impl Visitor, expr: &Expr) {
    match expr.kind() {
        ExprKind::IntImm(_) => {}
        ExprKind::Variable(name) => visitor.visit_variable(*name),
        ExprKind::Load(source) => visitor.visit_load(source),
        ExprKind::Binary { lhs, rhs, .. } => {
            visitor.visit_expr(lhs);
            visitor.visit_expr(rhs);
        }
        ExprKind::Let { name, value, body } => visitor.visit_let(*name, value, body),
        ExprKind::Call { arguments, .. } => {
            for arg in arguments {
                visitor.visit_expr(arg);
            }
        }
    }
}

/// Only the index of a memory reference is an expression; the buffer name is
/// not a variable use.
pub fn walk_memory_ref(visitor: &mut impl Visitor, memory_ref: &MemoryRef) {
    visitor.visit_expr(&memory_ref.index);
}

pub fn walk_let(visitor: &mut impl Visitor, _name: InternedSymbol, value: &Expr, body: &Expr) {
    visitor.visit_expr(value);
    visitor.visit_expr(body);
}
