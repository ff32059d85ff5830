//! Queries for whether an expression or statement refers to some variables.

use crate::{
    frontend::intern::InternedSymbol,
    middle::ir::{
        Expr, Stmt,
        scope::Scope,
        visit::{Visitor, walk_for},
    },
};

struct UsesVars<'a, T> {
    scope: &'a Scope<T>,
    /// Names rebound by a let whose value is currently being visited
    ignore: Scope<()>,
    result: bool,
}

impl<T> Visitor for UsesVars<'_, T> {
    fn visit_variable(&mut self, name: InternedSymbol) {
        if !self.ignore.contains(name) && self.scope.contains(name) {
            self.result = true;
        }
    }

    fn visit_let(&mut self, name: InternedSymbol, value: &Expr, body: &Expr) {
        self.ignore.push(name, ());
        self.visit_expr(value);
        self.ignore.pop(name);

        self.visit_expr(body);
    }

    fn visit_let_stmt(&mut self, name: InternedSymbol, value: &Expr, body: &Stmt) {
        self.ignore.push(name, ());
        self.visit_expr(value);
        self.ignore.pop(name);

        self.visit_stmt(body);
    }
}

/// Tests if an expression references any of the variables in `scope`
pub fn expr_uses_vars<T>(expr: &Expr, scope: &Scope<T>) -> bool {
    if scope.is_empty() {
        return false;
    }

    let mut uses = UsesVars {
        scope,
        ignore: Scope::new(),
        result: false,
    };
    uses.visit_expr(expr);
    uses.result
}

/// Tests if an expression references the given variable
pub fn expr_uses_var(expr: &Expr, name: InternedSymbol) -> bool {
    expr_uses_vars(expr, &Scope::from_iter([(name, ())]))
}

/// Tests if a statement references any of the variables in `scope`
pub fn stmt_uses_vars<T>(stmt: &Stmt, scope: &Scope<T>) -> bool {
    if scope.is_empty() {
        return false;
    }

    let mut uses = UsesVars {
        scope,
        ignore: Scope::new(),
        result: false,
    };
    uses.visit_stmt(stmt);
    uses.result
}

pub fn stmt_uses_var(stmt: &Stmt, name: InternedSymbol) -> bool {
    stmt_uses_vars(stmt, &Scope::from_iter([(name, ())]))
}

#[derive(Default)]
struct BoundNames {
    names: Scope<()>,
}

impl Visitor for BoundNames {
    fn visit_let(&mut self, name: InternedSymbol, value: &Expr, body: &Expr) {
        self.names.push(name, ());
        self.visit_expr(value);
        self.visit_expr(body);
    }

    fn visit_let_stmt(&mut self, name: InternedSymbol, value: &Expr, body: &Stmt) {
        self.names.push(name, ());
        self.visit_expr(value);
        self.visit_stmt(body);
    }

    fn visit_for(&mut self, variable: InternedSymbol, min: &Expr, extent: &Expr, body: &Stmt) {
        self.names.push(variable, ());
        walk_for(self, variable, min, extent, body);
    }
}

/// Every name bound anywhere within `stmt` by a let, a let statement or a
/// loop.
pub fn bound_names(stmt: &Stmt) -> Scope<()> {
    let mut bound = BoundNames::default();
    bound.visit_stmt(stmt);
    bound.names
}
