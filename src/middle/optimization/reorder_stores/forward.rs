//! Store forwarding: once a statement has been pulled up next to the statement
//! producing the value it reads, a store of a plain load can take the
//! producer's stored value directly. The producer's store may then become dead
//! and is left for a later dead store elimination to remove.

use tracing::trace;

use super::{
    ReorderOptions,
    alias::MayAlias,
    statement_info::{StatementInfo, StoreAccess, loads_in},
};
use crate::{
    frontend::intern::InternedSymbol,
    middle::{
        analysis::uses_var::{bound_names, expr_uses_vars},
        ir::{
            Expr, MemoryRef, Stmt, StmtKind,
            mutate::{Mutator, substitute_in_stmt, walk_stmt_mut},
            scope::Scope,
        },
    },
};

struct Forwarder<'a> {
    source: &'a StatementInfo,
    dependent: &'a StatementInfo,
    /// Statements which were placed between `source` and `dependent`
    intervening: &'a [&'a StatementInfo],
    alias: &'a dyn MayAlias,
    /// Names bound inside the source; its values can not leave their scope
    source_bound: Scope<()>,
    /// Names bound inside the dependent statement; they would capture free
    /// variables of a forwarded value
    dependent_bound: Scope<()>,
}

impl<'a> Forwarder<'a> {
    fn new(
        source: &'a StatementInfo,
        dependent: &'a StatementInfo,
        intervening: &'a [&'a StatementInfo],
        alias: &'a dyn MayAlias,
    ) -> Self {
        Self {
            source,
            dependent,
            intervening,
            alias,
            source_bound: bound_names(source.stmt()),
            dependent_bound: bound_names(dependent.stmt()),
        }
    }

    /// The value stored by the source to `location`, if it can replace a load
    /// of `location` anywhere in the dependent statement.
    fn forwarded_value(&self, location: &MemoryRef) -> Option<&'a StoreAccess> {
        // The last store to the location is the one that is visible afterwards
        let store = self
            .source
            .stores()
            .iter()
            .rev()
            .find(|store| self.alias.may_alias(&store.destination, location))?;

        if !store.unconditional {
            trace!(%location, "not forwarding a store that may not run exactly once");
            return None;
        }

        if expr_uses_vars(&store.value, &self.source_bound)
            || expr_uses_vars(&store.value, &self.dependent_bound)
        {
            trace!(%location, "not forwarding a value whose variables would change scope");
            return None;
        }

        // Every load of `location` in the dependent is replaced, so its index
        // must mean the same thing everywhere in there and in the source.
        if expr_uses_vars(&location.index, &self.dependent_bound)
            || expr_uses_vars(&store.destination.index, &self.source_bound)
        {
            trace!(%location, "not forwarding to a location whose index is rebound");
            return None;
        }

        // The value must still be what the location holds, and still mean the
        // same thing, at every point where the dependent statement reads it.
        let mut clobbered = vec![location.clone()];
        clobbered.extend(loads_in(&store.value));

        let overwritten = self.source.stores().iter().any(|other| {
            !std::ptr::eq(other, store)
                && clobbered[1..]
                    .iter()
                    .any(|l| self.alias.may_alias(&other.destination, l))
        }) || self.dependent.stores_to_any(&clobbered, self.alias)
            || self
                .intervening
                .iter()
                .any(|info| info.stores_to_any(&clobbered, self.alias));

        if overwritten {
            trace!(%location, "not forwarding a value which is overwritten before its use");
            return None;
        }

        Some(store)
    }

    /// Replaces loads stored directly by the dependent statement
    fn forward_direct(&self) -> Stmt {
        let mut result = self.dependent.stmt().clone();
        let mut forwarded: Vec<&Expr> = Vec::new();

        for store in self.dependent.stores() {
            let Some(location) = store.value.as_load() else {
                continue;
            };

            if forwarded.contains(&&store.value) {
                continue;
            }

            let Some(source) = self.forwarded_value(location) else {
                continue;
            };

            trace!(%location, value = %source.value, "forwarding stored value");

            result = substitute_in_stmt(&store.value, &source.value, &result);
            forwarded.push(&store.value);
        }

        result
    }
}

/// Rewrites stores whose value is a variable bound to a load by an enclosing
/// let statement.
struct ForwardThroughLets<'f, 'a> {
    forwarder: &'f Forwarder<'a>,
    /// The location each let-bound name was loaded from, or `None` when the
    /// innermost binding is not a plain load
    bindings: Scope<Option<MemoryRef>>,
}

impl ForwardThroughLets<'_, '_> {
    fn with_binding(
        &mut self,
        name: InternedSymbol,
        location: Option<MemoryRef>,
        body: &Stmt,
    ) -> Stmt {
        self.bindings.push(name, location);
        let body = self.mutate_stmt(body);
        self.bindings.pop(name);
        body
    }
}

impl Mutator for ForwardThroughLets<'_, '_> {
    fn mutate_stmt(&mut self, stmt: &Stmt) -> Stmt {
        match stmt.kind() {
            StmtKind::LetStmt { name, value, body } => {
                let new_body = self.with_binding(*name, value.as_load().cloned(), body);

                if new_body.same_node(body) {
                    stmt.clone()
                } else {
                    Stmt::let_stmt(*name, value.clone(), new_body)
                }
            }
            StmtKind::For {
                variable,
                min,
                extent,
                body,
            } => {
                let new_body = self.with_binding(*variable, None, body);

                if new_body.same_node(body) {
                    stmt.clone()
                } else {
                    Stmt::for_loop(*variable, min.clone(), extent.clone(), new_body)
                }
            }
            StmtKind::Store { destination, value } => {
                let Some(location) = value
                    .as_variable()
                    .and_then(|name| self.bindings.get(name))
                    .and_then(|location| location.as_ref())
                else {
                    return stmt.clone();
                };

                match self.forwarder.forwarded_value(location) {
                    Some(source) => {
                        trace!(%location, value = %source.value, "forwarding stored value through a let");
                        Stmt::store(destination.clone(), source.value.clone())
                    }
                    None => stmt.clone(),
                }
            }
            _ => walk_stmt_mut(self, stmt),
        }
    }
}

/// Forwards values stored by `source` into `dependent`, which is about to be
/// placed right after it. `intervening` are the statements which end up in
/// between the two.
pub fn forward_stores(
    source: &StatementInfo,
    dependent: &StatementInfo,
    intervening: &[&StatementInfo],
    alias: &dyn MayAlias,
    options: &ReorderOptions,
) -> Stmt {
    let forwarder = Forwarder::new(source, dependent, intervening, alias);

    let result = forwarder.forward_direct();

    if !options.forward_through_lets {
        return result;
    }

    ForwardThroughLets {
        forwarder: &forwarder,
        bindings: Scope::new(),
    }
    .mutate_stmt(&result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::{
        ir::BinaryOperatorKind::Add, optimization::reorder_stores::alias::StructuralAlias,
    };

    fn store(buffer: &str, index: i64, value: Expr) -> Stmt {
        Stmt::store(MemoryRef::new(buffer, Expr::int(index)), value)
    }

    fn load(buffer: &str, index: i64) -> Expr {
        Expr::load(buffer, Expr::int(index))
    }

    fn forward(source: Stmt, dependent: Stmt, options: &ReorderOptions) -> Stmt {
        forward_stores(
            &StatementInfo::new(source),
            &StatementInfo::new(dependent),
            &[],
            &StructuralAlias,
            options,
        )
    }

    #[test]
    fn forwards_a_store_of_a_load() {
        let result = forward(
            store("a", 0, load("b", 0)),
            store("c", 0, load("a", 0)),
            &ReorderOptions::default(),
        );

        assert_eq!(result, store("c", 0, load("b", 0)));
    }

    #[test]
    fn substitutes_every_occurrence() {
        // for x in 0..4 { c[x] = a[0]; d[x] = a[0] + 1; }
        let dependent = Stmt::for_loop(
            "x",
            Expr::int(0),
            Expr::int(4),
            Stmt::block(vec![
                Stmt::store(MemoryRef::new("c", Expr::var("x")), load("a", 0)),
                Stmt::store(
                    MemoryRef::new("d", Expr::var("x")),
                    Expr::binary(Add, load("a", 0), Expr::int(1)),
                ),
            ]),
        );

        let expected = Stmt::for_loop(
            "x",
            Expr::int(0),
            Expr::int(4),
            Stmt::block(vec![
                Stmt::store(MemoryRef::new("c", Expr::var("x")), Expr::int(7)),
                Stmt::store(
                    MemoryRef::new("d", Expr::var("x")),
                    Expr::binary(Add, Expr::int(7), Expr::int(1)),
                ),
            ]),
        );

        let result = forward(store("a", 0, Expr::int(7)), dependent, &ReorderOptions::default());

        assert_eq!(result, expected);
    }

    #[test]
    fn only_stores_of_plain_loads_trigger_forwarding() {
        let dependent = store("c", 0, Expr::binary(Add, load("a", 0), Expr::int(1)));

        let result = forward(store("a", 0, Expr::int(7)), dependent.clone(), &ReorderOptions::default());

        assert_eq!(result, dependent);
    }

    #[test]
    fn refuses_values_from_loops() {
        // for x in 0..4 { a[0] = x; }
        let source = Stmt::for_loop(
            "x",
            Expr::int(0),
            Expr::int(4),
            store("a", 0, Expr::var("x")),
        );
        let dependent = store("c", 0, load("a", 0));

        let result = forward(source, dependent.clone(), &ReorderOptions::default());

        assert_eq!(result, dependent);
    }

    #[test]
    fn refuses_values_that_would_be_captured() {
        let source = store("a", 0, Expr::var("t"));
        let dependent = Stmt::let_stmt("t", Expr::int(3), store("c", 0, load("a", 0)));

        let result = forward(source, dependent.clone(), &ReorderOptions::default());

        assert_eq!(result, dependent);
    }

    #[test]
    fn refuses_locations_whose_index_is_rebound_in_the_dependent() {
        // if 1 { c[0] = a[x]; for x in 0..4 { d[x] = a[x]; } }
        let dependent = Stmt::if_then_else(
            Expr::int(1),
            Stmt::block(vec![
                Stmt::store(MemoryRef::new("c", Expr::int(0)), Expr::load("a", Expr::var("x"))),
                Stmt::for_loop(
                    "x",
                    Expr::int(0),
                    Expr::int(4),
                    Stmt::store(MemoryRef::new("d", Expr::var("x")), Expr::load("a", Expr::var("x"))),
                ),
            ]),
            None,
        );
        let source = Stmt::store(MemoryRef::new("a", Expr::var("x")), Expr::int(5));

        let result = forward(source, dependent.clone(), &ReorderOptions::default());

        assert_eq!(result, dependent);
    }

    #[test]
    fn refuses_locations_whose_index_is_bound_in_the_source() {
        // let i = 1; a[i] = 5;
        let source = Stmt::let_stmt(
            "i",
            Expr::int(1),
            Stmt::store(MemoryRef::new("a", Expr::var("i")), Expr::int(5)),
        );
        let dependent = store("c", 0, Expr::load("a", Expr::var("i")));

        let result = forward(source, dependent.clone(), &ReorderOptions::default());

        assert_eq!(result, dependent);
    }

    #[test]
    fn let_forwarding_refuses_rebound_indices() {
        // for x in 0..4 { let t = a[x]; c[x] = t; }
        let dependent = Stmt::for_loop(
            "x",
            Expr::int(0),
            Expr::int(4),
            Stmt::let_stmt(
                "t",
                Expr::load("a", Expr::var("x")),
                Stmt::store(MemoryRef::new("c", Expr::var("x")), Expr::var("t")),
            ),
        );
        let source = Stmt::store(MemoryRef::new("a", Expr::var("x")), Expr::int(5));

        let options = ReorderOptions {
            forward_through_lets: true,
            ..Default::default()
        };
        let result = forward(source, dependent.clone(), &options);

        assert_eq!(result, dependent);
    }

    #[test]
    fn refuses_locations_the_dependent_overwrites() {
        let dependent = Stmt::if_then_else(
            Expr::var("p"),
            Stmt::block(vec![store("c", 0, load("a", 0)), store("a", 0, Expr::int(1))]),
            None,
        );

        let result = forward(store("a", 0, Expr::int(7)), dependent.clone(), &ReorderOptions::default());

        assert_eq!(result, dependent);
    }

    #[test]
    fn refuses_when_an_intervening_statement_writes_the_location() {
        let source = StatementInfo::new(store("a", 0, load("b", 0)));
        let increment = StatementInfo::new(store("a", 0, Expr::binary(Add, load("a", 0), Expr::int(1))));
        let dependent = StatementInfo::new(store("c", 0, load("a", 0)));

        let result = forward_stores(
            &source,
            &dependent,
            &[&increment],
            &StructuralAlias,
            &ReorderOptions::default(),
        );

        assert_eq!(&result, dependent.stmt());
    }

    #[test]
    fn forwards_through_lets_when_enabled() {
        let dependent = Stmt::let_stmt("t", load("a", 0), store("c", 0, Expr::var("t")));

        let unchanged = forward(store("a", 0, load("b", 0)), dependent.clone(), &ReorderOptions::default());
        assert_eq!(unchanged, dependent);

        let options = ReorderOptions {
            forward_through_lets: true,
            ..Default::default()
        };
        let result = forward(store("a", 0, load("b", 0)), dependent, &options);

        assert_eq!(result, Stmt::let_stmt("t", load("a", 0), store("c", 0, load("b", 0))));
    }

    #[test]
    fn let_forwarding_respects_shadowing() {
        // let t = a[0]; let t = 5; c[0] = t;
        let dependent = Stmt::let_stmt(
            "t",
            load("a", 0),
            Stmt::let_stmt("t", Expr::int(5), store("c", 0, Expr::var("t"))),
        );

        let options = ReorderOptions {
            forward_through_lets: true,
            ..Default::default()
        };
        let result = forward(store("a", 0, Expr::int(9)), dependent.clone(), &options);

        assert_eq!(result, dependent);
    }
}
