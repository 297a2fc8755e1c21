//! Boolean algebra over IR filter expressions.
//!
//! Rewrites are purely syntactic: negations are pushed inward with De
//! Morgan's laws, `AND`/`OR` are distributed, and structurally identical
//! siblings are collapsed using [`Expr::equivalent`]. Every rewrite preserves
//! the truth value of the expression under SQL three-valued logic.
//!
//! Distribution is exponential in the worst case: an `OR` of `n` conjunctions
//! of two terms each becomes `2^n` clauses in CNF. [`cnf_clause_bound`]
//! computes that size in linear time so callers can refuse a conversion
//! before paying for it.

use crate::ir::{BinaryOperator, Expr, UnaryOperator};

/// Push every `NOT` down to the leaves and drop double negations.
pub fn negation_normal_form(expr: Expr) -> Expr {
    match expr {
        Expr::Unary {
            op: UnaryOperator::Not,
            operand,
        } => negate(*operand),
        Expr::Binary {
            op: op @ (BinaryOperator::And | BinaryOperator::Or),
            left,
            right,
        } => Expr::binary(op, negation_normal_form(*left), negation_normal_form(*right)),
        other => other,
    }
}

fn negate(expr: Expr) -> Expr {
    match expr {
        Expr::Unary {
            op: UnaryOperator::Not,
            operand,
        } => negation_normal_form(*operand),
        Expr::Binary {
            op: BinaryOperator::And,
            left,
            right,
        } => Expr::binary(BinaryOperator::Or, negate(*left), negate(*right)),
        Expr::Binary {
            op: BinaryOperator::Or,
            left,
            right,
        } => Expr::binary(BinaryOperator::And, negate(*left), negate(*right)),
        leaf => Expr::not(leaf),
    }
}

/// Conjunctive normal form: an `AND` of `OR`s of literals.
pub fn to_cnf(expr: Expr) -> Expr {
    let distributed = distribute(negation_normal_form(expr), BinaryOperator::And, BinaryOperator::Or);
    collapse(distributed, BinaryOperator::And, BinaryOperator::Or)
}

/// Number of clauses [`to_cnf`] distributes `expr` into, before duplicate
/// clauses are dropped. Saturates at `usize::MAX`.
pub fn cnf_clause_bound(expr: &Expr) -> usize {
    clause_bound(expr, false)
}

fn clause_bound(expr: &Expr, negated: bool) -> usize {
    match expr {
        Expr::Unary {
            op: UnaryOperator::Not,
            operand,
        } => clause_bound(operand, !negated),
        Expr::Binary {
            op: op @ (BinaryOperator::And | BinaryOperator::Or),
            left,
            right,
        } => {
            let (left, right) = (clause_bound(left, negated), clause_bound(right, negated));
            // De Morgan swaps the connective under an odd number of NOTs.
            if (*op == BinaryOperator::And) != negated {
                left.saturating_add(right)
            } else {
                left.saturating_mul(right)
            }
        }
        _ => 1,
    }
}

/// Disjunctive normal form: an `OR` of `AND`s of literals.
pub fn to_dnf(expr: Expr) -> Expr {
    let distributed = distribute(negation_normal_form(expr), BinaryOperator::Or, BinaryOperator::And);
    collapse(distributed, BinaryOperator::Or, BinaryOperator::And)
}

/// Rewrite until no `inner` node has an `outer` node beneath it.
fn distribute(expr: Expr, outer: BinaryOperator, inner: BinaryOperator) -> Expr {
    match expr {
        Expr::Binary { op, left, right } if op == outer => Expr::binary(
            outer,
            distribute(*left, outer, inner),
            distribute(*right, outer, inner),
        ),
        Expr::Binary { op, left, right } if op == inner => {
            let left = distribute(*left, outer, inner);
            let right = distribute(*right, outer, inner);
            distribute_pair(left, right, outer, inner)
        }
        other => other,
    }
}

/// `inner(left, right)` where both sides are already distributed.
fn distribute_pair(left: Expr, right: Expr, outer: BinaryOperator, inner: BinaryOperator) -> Expr {
    match (left, right) {
        (Expr::Binary { op, left: a, right: b }, right) if op == outer => Expr::binary(
            outer,
            distribute_pair(*a, right.clone(), outer, inner),
            distribute_pair(*b, right, outer, inner),
        ),
        (left, Expr::Binary { op, left: a, right: b }) if op == outer => Expr::binary(
            outer,
            distribute_pair(left.clone(), *a, outer, inner),
            distribute_pair(left, *b, outer, inner),
        ),
        (left, right) => Expr::binary(inner, left, right),
    }
}

/// Flatten both levels and drop duplicate members at each.
fn collapse(expr: Expr, outer: BinaryOperator, inner: BinaryOperator) -> Expr {
    let clauses = flatten(expr, outer)
        .into_iter()
        .filter_map(|clause| join(dedupe(flatten(clause, inner)), inner));
    // `join` only returns None for empty input, which flatten never produces.
    join(dedupe(clauses.collect()), outer).unwrap_or_else(|| Expr::Literal("1".into()))
}

fn dedupe(exprs: Vec<Expr>) -> Vec<Expr> {
    let mut kept: Vec<Expr> = Vec::with_capacity(exprs.len());
    for expr in exprs {
        if !kept.iter().any(|existing| existing.equivalent(&expr)) {
            kept.push(expr);
        }
    }
    kept
}

fn flatten(expr: Expr, op: BinaryOperator) -> Vec<Expr> {
    let mut members = Vec::new();
    let mut pending = vec![expr];
    while let Some(expr) = pending.pop() {
        match expr {
            Expr::Binary {
                op: node_op,
                left,
                right,
            } if node_op == op => {
                pending.push(*right);
                pending.push(*left);
            }
            other => members.push(other),
        }
    }
    members
}

fn join(exprs: Vec<Expr>, op: BinaryOperator) -> Option<Expr> {
    exprs.into_iter().reduce(|acc, expr| Expr::binary(op, acc, expr))
}

/// Top-level `AND` members of an expression, left to right.
pub fn conjuncts(expr: Expr) -> Vec<Expr> {
    flatten(expr, BinaryOperator::And)
}

/// Top-level `OR` members of an expression, left to right.
pub fn disjuncts(expr: Expr) -> Vec<Expr> {
    flatten(expr, BinaryOperator::Or)
}

/// `AND` of every expression, or `None` when there are none.
pub fn conjoin(exprs: impl IntoIterator<Item = Expr>) -> Option<Expr> {
    join(exprs.into_iter().collect(), BinaryOperator::And)
}

/// `OR` of every expression, or `None` when there are none.
pub fn disjoin(exprs: impl IntoIterator<Item = Expr>) -> Option<Expr> {
    join(exprs.into_iter().collect(), BinaryOperator::Or)
}
