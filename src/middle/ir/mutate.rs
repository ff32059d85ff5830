//! Rebuilding traversal. A `Mutator` returns a new tree; nodes whose children
//! all came back unchanged are reused instead of reallocated, so an identity
//! mutator returns the very same root.

use super::{Expr, ExprKind, MemoryRef, Pipeline, Stmt, StmtKind};

pub trait Mutator: Sized {
    fn mutate_stmt(&mut self, stmt: &Stmt) -> Stmt {
        walk_stmt_mut(self, stmt)
    }

    /// Pipelines may be replaced by an arbitrary statement
    fn mutate_pipeline(&mut self, stmt: &Stmt, pipeline: &Pipeline) -> Stmt {
        walk_pipeline_mut(self, stmt, pipeline)
    }

    fn mutate_expr(&mut self, expr: &Expr) -> Expr {
        walk_expr_mut(self, expr)
    }
}

pub fn mutate_memory_ref(mutator: &mut impl Mutator, memory_ref: &MemoryRef) -> MemoryRef {
    MemoryRef {
        buffer: memory_ref.buffer,
        index: mutator.mutate_expr(&memory_ref.index),
    }
}

pub fn walk_stmt_mut(mutator: &mut impl Mutator, stmt: &Stmt) -> Stmt {
    match stmt.kind() {
        StmtKind::Store { destination, value } => {
            let new_destination = mutate_memory_ref(mutator, destination);
            let new_value = mutator.mutate_expr(value);

            if new_destination.index.same_node(&destination.index) && new_value.same_node(value) {
                stmt.clone()
            } else {
                Stmt::store(new_destination, new_value)
            }
        }
        StmtKind::Free { .. } => stmt.clone(),
        StmtKind::Sequence { first, rest } => {
            let new_first = mutator.mutate_stmt(first);
            let new_rest = mutator.mutate_stmt(rest);

            if new_first.same_node(first) && new_rest.same_node(rest) {
                stmt.clone()
            } else {
                Stmt::sequence(new_first, new_rest)
            }
        }
        StmtKind::Pipeline(pipeline) => mutator.mutate_pipeline(stmt, pipeline),
        StmtKind::For {
            variable,
            min,
            extent,
            body,
        } => {
            let new_min = mutator.mutate_expr(min);
            let new_extent = mutator.mutate_expr(extent);
            let new_body = mutator.mutate_stmt(body);

            if new_min.same_node(min) && new_extent.same_node(extent) && new_body.same_node(body)
            {
                stmt.clone()
            } else {
                Stmt::for_loop(*variable, new_min, new_extent, new_body)
            }
        }
        StmtKind::IfThenElse {
            condition,
            then_case,
            else_case,
        } => {
            let new_condition = mutator.mutate_expr(condition);
            let new_then = mutator.mutate_stmt(then_case);
            let new_else = else_case.as_ref().map(|e| mutator.mutate_stmt(e));

            let else_unchanged = match (else_case, &new_else) {
                (Some(old), Some(new)) => old.same_node(new),
                _ => true,
            };

            if new_condition.same_node(condition) && new_then.same_node(then_case) && else_unchanged
            {
                stmt.clone()
            } else {
                Stmt::if_then_else(new_condition, new_then, new_else)
            }
        }
        StmtKind::LetStmt { name, value, body } => {
            let new_value = mutator.mutate_expr(value);
            let new_body = mutator.mutate_stmt(body);

            if new_value.same_node(value) && new_body.same_node(body) {
                stmt.clone()
            } else {
                Stmt::let_stmt(*name, new_value, new_body)
            }
        }
        StmtKind::Evaluate(value) => {
            let new_value = mutator.mutate_expr(value);

            if new_value.same_node(value) {
                stmt.clone()
            } else {
                Stmt::evaluate(new_value)
            }
        }
    }
}

pub fn walk_pipeline_mut(mutator: &mut impl Mutator, stmt: &Stmt, pipeline: &Pipeline) -> Stmt {
    let produce = mutator.mutate_stmt(&pipeline.produce);
    let update = pipeline.update.as_ref().map(|u| mutator.mutate_stmt(u));
    let consume = mutator.mutate_stmt(&pipeline.consume);

    let update_unchanged = match (&pipeline.update, &update) {
        (Some(old), Some(new)) => old.same_node(new),
        _ => true,
    };

    if produce.same_node(&pipeline.produce) && update_unchanged && consume.same_node(&pipeline.consume)
    {
        stmt.clone()
    } else {
        Stmt::pipeline(pipeline.name, produce, update, consume)
    }
}

pub fn walk_expr_mut(mutator: &mut impl Mutator, expr: &Expr) -> Expr {
    match expr.kind() {
        ExprKind::IntImm(_) | ExprKind::Variable(_) => expr.clone(),
        ExprKind::Load(source) => {
            let new_source = mutate_memory_ref(mutator, source);

            if new_source.index.same_node(&source.index) {
                expr.clone()
            } else {
                Expr::new(ExprKind::Load(new_source))
            }
        }
        ExprKind::Binary { operator, lhs, rhs } => {
            let new_lhs = mutator.mutate_expr(lhs);
            let new_rhs = mutator.mutate_expr(rhs);

            if new_lhs.same_node(lhs) && new_rhs.same_node(rhs) {
                expr.clone()
            } else {
                Expr::binary(*operator, new_lhs, new_rhs)
            }
        }
        ExprKind::Let { name, value, body } => {
            let new_value = mutator.mutate_expr(value);
            let new_body = mutator.mutate_expr(body);

            if new_value.same_node(value) && new_body.same_node(body) {
                expr.clone()
            } else {
                Expr::let_in(*name, new_value, new_body)
            }
        }
        ExprKind::Call { name, arguments } => {
            let new_arguments = arguments
                .iter()
                .map(|arg| mutator.mutate_expr(arg))
                .collect::<Vec<_>>();

            if new_arguments
                .iter()
                .zip(arguments)
                .all(|(new, old)| new.same_node(old))
            {
                expr.clone()
            } else {
                Expr::call(*name, new_arguments)
            }
        }
    }
}

/// Replaces every sub-expression structurally equal to `find`
struct Substitute<'a> {
    find: &'a Expr,
    replacement: &'a Expr,
}

impl Mutator for Substitute<'_> {
    fn mutate_expr(&mut self, expr: &Expr) -> Expr {
        if expr == self.find {
            self.replacement.clone()
        } else {
            walk_expr_mut(self, expr)
        }
    }
}

/// Substitutes `replacement` for every occurrence of `find` within `stmt`.
/// Binding structure is not taken into account; callers make sure no
/// variable of either expression is rebound inside `stmt`.
pub fn substitute_in_stmt(find: &Expr, replacement: &Expr, stmt: &Stmt) -> Stmt {
    Substitute { find, replacement }.mutate_stmt(stmt)
}
