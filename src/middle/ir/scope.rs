use hashbrown::HashMap;

use crate::frontend::intern::InternedSymbol;

/// A set of names currently in scope along with a value for each. Pushing a
/// name that is already present shadows the previous value until the
/// matching pop.
#[derive(Debug, Clone)]
pub struct Scope<T> {
    table: HashMap<InternedSymbol, Vec<T>>,
}

impl<T> Scope<T> {
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    pub fn push(&mut self, name: InternedSymbol, value: T) {
        self.table.entry(name).or_default().push(value);
    }

    /// Removes the innermost binding of `name`. Popping a name which was
    /// never pushed is a bug in the caller.
    pub fn pop(&mut self, name: InternedSymbol) -> T {
        let stack = self
            .table
            .get_mut(&name)
            .unwrap_or_else(|| panic!("popped name `{name}` which is not in scope"));

        let value = stack
            .pop()
            .expect("scope stacks are removed once they become empty");

        if stack.is_empty() {
            self.table.remove(&name);
        }

        value
    }

    pub fn get(&self, name: InternedSymbol) -> Option<&T> {
        self.table.get(&name).and_then(|stack| stack.last())
    }

    pub fn contains(&self, name: InternedSymbol) -> bool {
        self.table.contains_key(&name)
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl<T> Default for Scope<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<(InternedSymbol, T)> for Scope<T> {
    fn from_iter<I: IntoIterator<Item = (InternedSymbol, T)>>(iter: I) -> Self {
        let mut scope = Self::new();

        for (name, value) in iter {
            scope.push(name, value);
        }

        scope
    }
}
