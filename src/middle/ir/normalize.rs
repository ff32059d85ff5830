//! A small canonicalization used before comparing index expressions. It only
//! needs to make "obviously equal" indices structurally equal, so it folds
//! integer constants and moves constants to the right hand side of
//! commutative operators. Everything else is left as written.

use super::{
    BinaryOperatorKind, Expr, ExprKind,
    mutate::{Mutator, walk_expr_mut},
};

struct Normalize;

impl Mutator for Normalize {
    fn mutate_expr(&mut self, expr: &Expr) -> Expr {
        let expr = walk_expr_mut(self, expr);

        let ExprKind::Binary { operator, lhs, rhs } = expr.kind() else {
            return expr;
        };

        if let (Some(l), Some(r)) = (lhs.as_int(), rhs.as_int()) {
            if let Some(value) = fold_constants(*operator, l, r) {
                return Expr::int(value);
            }
        }

        if operator.is_commutative() && lhs.as_int().is_some() && rhs.as_int().is_none() {
            return Expr::binary(*operator, rhs.clone(), lhs.clone());
        }

        expr
    }
}

fn fold_constants(operator: BinaryOperatorKind, lhs: i64, rhs: i64) -> Option<i64> {
    let value = match operator {
        BinaryOperatorKind::Add => lhs.checked_add(rhs)?,
        BinaryOperatorKind::Subtract => lhs.checked_sub(rhs)?,
        BinaryOperatorKind::Multiply => lhs.checked_mul(rhs)?,
        // Euclidean: the remainder is never negative, whatever the signs
        BinaryOperatorKind::Divide if rhs != 0 => lhs.checked_div_euclid(rhs)?,
        BinaryOperatorKind::Modulus if rhs != 0 => lhs.checked_rem_euclid(rhs)?,
        _ => return None,
    };

    Some(value)
}

/// Returns the canonical form of `expr`
pub fn normalize(expr: &Expr) -> Expr {
    Normalize.mutate_expr(expr)
}
