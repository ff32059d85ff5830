//! The statement and expression tree for the array-processing IR. Nodes are
//! immutable and reference counted, so rebuilding a tree shares every subtree
//! that did not change. Equality and hashing are structural: two nodes are
//! equal when they have the same shape, regardless of identity.

use std::rc::Rc;

use strum::{Display, EnumString};

use crate::frontend::intern::InternedSymbol;

pub mod mutate;
pub mod normalize;
pub mod pretty_print;
pub mod scope;
pub mod visit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum BinaryOperatorKind {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "%")]
    Modulus,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = "<=")]
    LessThanOrEqualTo,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = ">=")]
    GreaterThanOrEqualTo,
    #[strum(serialize = "==")]
    Equals,
    #[strum(serialize = "!=")]
    NotEquals,
    #[strum(serialize = "&&")]
    LogicalAnd,
    #[strum(serialize = "||")]
    LogicalOr,
}

impl BinaryOperatorKind {
    /// Binding strength used by both the parser and the printer. All binary
    /// operators are left associative.
    pub fn precedence(self) -> u8 {
        match self {
            Self::LogicalOr => 1,
            Self::LogicalAnd => 2,
            Self::LessThan
            | Self::LessThanOrEqualTo
            | Self::GreaterThan
            | Self::GreaterThanOrEqualTo
            | Self::Equals
            | Self::NotEquals => 3,
            Self::Add | Self::Subtract => 4,
            Self::Multiply | Self::Divide | Self::Modulus => 5,
        }
    }

    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Multiply | Self::Equals | Self::NotEquals
        )
    }
}

/// A location in memory: a named buffer and an index into it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryRef {
    pub buffer: InternedSymbol,
    pub index: Expr,
}

impl MemoryRef {
    pub fn new(buffer: impl Into<InternedSymbol>, index: Expr) -> Self {
        Self {
            buffer: buffer.into(),
            index,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Expr(Rc<ExprKind>);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExprKind {
    IntImm(i64),
    Variable(InternedSymbol),
    Load(MemoryRef),
    Binary {
        operator: BinaryOperatorKind,
        lhs: Expr,
        rhs: Expr,
    },
    /// `let name = value in body`
    Let {
        name: InternedSymbol,
        value: Expr,
        body: Expr,
    },
    /// A pure call to some named function (intrinsics, math functions, ...)
    Call {
        name: InternedSymbol,
        arguments: Vec<Expr>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self(Rc::new(kind))
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0
    }

    pub fn int(value: i64) -> Self {
        Self::new(ExprKind::IntImm(value))
    }

    pub fn var(name: impl Into<InternedSymbol>) -> Self {
        Self::new(ExprKind::Variable(name.into()))
    }

    pub fn load(buffer: impl Into<InternedSymbol>, index: Expr) -> Self {
        Self::new(ExprKind::Load(MemoryRef::new(buffer, index)))
    }

    pub fn binary(operator: BinaryOperatorKind, lhs: Expr, rhs: Expr) -> Self {
        Self::new(ExprKind::Binary { operator, lhs, rhs })
    }

    pub fn let_in(name: impl Into<InternedSymbol>, value: Expr, body: Expr) -> Self {
        Self::new(ExprKind::Let {
            name: name.into(),
            value,
            body,
        })
    }

    pub fn call(name: impl Into<InternedSymbol>, arguments: Vec<Expr>) -> Self {
        Self::new(ExprKind::Call {
            name: name.into(),
            arguments,
        })
    }

    pub fn as_load(&self) -> Option<&MemoryRef> {
        match self.kind() {
            ExprKind::Load(source) => Some(source),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.kind() {
            ExprKind::IntImm(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<InternedSymbol> {
        match self.kind() {
            ExprKind::Variable(name) => Some(*name),
            _ => None,
        }
    }

    /// Whether both handles point at the very same node
    pub fn same_node(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl From<ExprKind> for Expr {
    fn from(value: ExprKind) -> Self {
        Self::new(value)
    }
}

impl core::fmt::Debug for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A computation stage split into its produce, update and consume phases.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pipeline {
    pub name: InternedSymbol,
    pub produce: Stmt,
    pub update: Option<Stmt>,
    pub consume: Stmt,
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Stmt(Rc<StmtKind>);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StmtKind {
    Store {
        destination: MemoryRef,
        value: Expr,
    },
    /// Marks the end of a buffer's lifetime
    Free {
        buffer: InternedSymbol,
    },
    /// Run `first`, then `rest`. Carries no meaning beyond ordering.
    Sequence {
        first: Stmt,
        rest: Stmt,
    },
    Pipeline(Pipeline),
    For {
        variable: InternedSymbol,
        min: Expr,
        extent: Expr,
        body: Stmt,
    },
    IfThenElse {
        condition: Expr,
        then_case: Stmt,
        else_case: Option<Stmt>,
    },
    /// Binds `name` to `value` for the duration of `body`
    LetStmt {
        name: InternedSymbol,
        value: Expr,
        body: Stmt,
    },
    /// Evaluates an expression for its side effects
    Evaluate(Expr),
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self(Rc::new(kind))
    }

    pub fn kind(&self) -> &StmtKind {
        &self.0
    }

    pub fn store(destination: MemoryRef, value: Expr) -> Self {
        Self::new(StmtKind::Store { destination, value })
    }

    pub fn free(buffer: impl Into<InternedSymbol>) -> Self {
        Self::new(StmtKind::Free {
            buffer: buffer.into(),
        })
    }

    pub fn sequence(first: Stmt, rest: Stmt) -> Self {
        Self::new(StmtKind::Sequence { first, rest })
    }

    /// Chains the statements into right nested sequences, the shape the
    /// parser produces for a block. An empty block is a no-op.
    pub fn block(statements: Vec<Stmt>) -> Self {
        statements
            .into_iter()
            .rev()
            .reduce(|rest, first| Self::sequence(first, rest))
            .unwrap_or_else(Self::no_op)
    }

    pub fn pipeline(
        name: impl Into<InternedSymbol>,
        produce: Stmt,
        update: Option<Stmt>,
        consume: Stmt,
    ) -> Self {
        Self::new(StmtKind::Pipeline(Pipeline {
            name: name.into(),
            produce,
            update,
            consume,
        }))
    }

    pub fn for_loop(variable: impl Into<InternedSymbol>, min: Expr, extent: Expr, body: Stmt) -> Self {
        Self::new(StmtKind::For {
            variable: variable.into(),
            min,
            extent,
            body,
        })
    }

    pub fn if_then_else(condition: Expr, then_case: Stmt, else_case: Option<Stmt>) -> Self {
        Self::new(StmtKind::IfThenElse {
            condition,
            then_case,
            else_case,
        })
    }

    pub fn let_stmt(name: impl Into<InternedSymbol>, value: Expr, body: Stmt) -> Self {
        Self::new(StmtKind::LetStmt {
            name: name.into(),
            value,
            body,
        })
    }

    pub fn evaluate(value: Expr) -> Self {
        Self::new(StmtKind::Evaluate(value))
    }

    pub fn no_op() -> Self {
        Self::evaluate(Expr::int(0))
    }

    pub fn is_no_op(&self) -> bool {
        matches!(self.kind(), StmtKind::Evaluate(e) if e.as_int() == Some(0))
    }

    pub fn same_node(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Expands nested sequences depth first (first, then rest) and appends
    /// every non-sequence statement to `out` in execution order.
    pub fn flatten_into(&self, out: &mut Vec<Stmt>) {
        match self.kind() {
            StmtKind::Sequence { first, rest } => {
                first.flatten_into(out);
                rest.flatten_into(out);
            }
            _ => out.push(self.clone()),
        }
    }
}

impl From<StmtKind> for Stmt {
    fn from(value: StmtKind) -> Self {
        Self::new(value)
    }
}

impl core::fmt::Debug for Stmt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_structural() {
        let a = Expr::load("a", Expr::binary(BinaryOperatorKind::Add, Expr::var("x"), Expr::int(1)));
        let b = Expr::load("a", Expr::binary(BinaryOperatorKind::Add, Expr::var("x"), Expr::int(1)));

        assert!(!a.same_node(&b));
        assert_eq!(a, b);
        assert_ne!(a, Expr::load("b", Expr::int(0)));
    }

    #[test]
    fn block_nests_to_the_right() {
        let s1 = Stmt::free("a");
        let s2 = Stmt::free("b");
        let s3 = Stmt::free("c");

        let block = Stmt::block(vec![s1.clone(), s2.clone(), s3.clone()]);

        assert_eq!(block, Stmt::sequence(s1, Stmt::sequence(s2, s3)));
        assert!(Stmt::block(Vec::new()).is_no_op());
    }
}
