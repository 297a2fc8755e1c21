//! Condition and join analysis.
//!
//! A SELECT filter is split into its top-level conjuncts and each conjunct is
//! classified by the sources it reads:
//!
//! ```text
//! WHERE a.x > 1 AND a.id = b.a_id AND (a.y = 1 OR b.z = 2)
//!
//! single_table: [slot 0: x > 1]
//! equi_joins:   [0 <-> 1: a.id = b.a_id]
//! general:      (a.y = 1 OR b.z = 2)
//! ```
//!
//! Single-table conditions are rebased onto slot 0 so the executor can test
//! them against one row of their table before the cartesian product is built.
//! Equi-joins keep their original slots and are applied while the product
//! grows. Whatever is left is evaluated over full product tuples.

use crate::boolean::{cnf_clause_bound, conjoin, conjuncts, negation_normal_form, to_cnf};
use crate::ir::{BinaryOperator, Expr};

/// Upper bound on the CNF clauses a mixed-source disjunction may expand into.
const CNF_CLAUSE_LIMIT: usize = 16;

/// Conjunct reading exactly one source, rebased so that source is slot 0.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleTableCondition {
    pub slot: usize,
    pub condition: Expr,
}

/// `left.x = right.y` between two distinct sources; `left_slot < right_slot`.
#[derive(Debug, Clone, PartialEq)]
pub struct EquiJoin {
    pub left_slot: usize,
    pub right_slot: usize,
    pub condition: Expr,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionAnalysis {
    pub single_table: Vec<SingleTableCondition>,
    pub equi_joins: Vec<EquiJoin>,
    pub general: Option<Expr>,
}

impl ConditionAnalysis {
    /// Pushed-down conditions for one source slot.
    pub fn for_slot(&self, slot: usize) -> impl Iterator<Item = &Expr> {
        self.single_table
            .iter()
            .filter(move |condition| condition.slot == slot)
            .map(|condition| &condition.condition)
    }

    /// Equi-joins that become checkable once `slot` joins the product.
    pub fn joins_completed_by(&self, slot: usize) -> impl Iterator<Item = &EquiJoin> {
        self.equi_joins
            .iter()
            .filter(move |join| join.right_slot == slot)
    }
}

/// Decompose `filter` over `source_count` sources. With no filter, or with a
/// single source, the result is still valid; conditions that reference no
/// source at all stay in `general`.
pub fn analyze(filter: Option<&Expr>, source_count: usize) -> ConditionAnalysis {
    let mut analysis = ConditionAnalysis::default();
    let Some(filter) = filter else {
        return analysis;
    };

    let mut general = Vec::new();
    for conjunct in expand(conjuncts(negation_normal_form(filter.clone()))) {
        let slots = conjunct.referenced_slots();
        match slots.as_slice() {
            [slot] if *slot < source_count && !conjunct.contains_aggregate() => {
                analysis.single_table.push(SingleTableCondition {
                    slot: *slot,
                    condition: rebase(conjunct, *slot),
                });
            }
            [_, _] => match equi_join(&conjunct) {
                Some((left_slot, right_slot)) => analysis.equi_joins.push(EquiJoin {
                    left_slot,
                    right_slot,
                    condition: conjunct,
                }),
                None => general.push(conjunct),
            },
            _ => general.push(conjunct),
        }
    }
    analysis.general = conjoin(general);
    analysis
}

/// Convert multi-source disjunctions to CNF when the result stays small, so
/// that their single-source clauses can still be pushed down. Disjunctions
/// whose distribution would exceed the limit are never converted.
fn expand(parts: Vec<Expr>) -> Vec<Expr> {
    let mut expanded = Vec::with_capacity(parts.len());
    for part in parts {
        let mixed = part.referenced_slots().len() > 1;
        if mixed && is_disjunction(&part) && cnf_clause_bound(&part) <= CNF_CLAUSE_LIMIT {
            let clauses = conjuncts(to_cnf(part.clone()));
            if clauses.len() > 1 && clauses.len() <= CNF_CLAUSE_LIMIT {
                expanded.extend(clauses);
                continue;
            }
        }
        expanded.push(part);
    }
    expanded
}

fn is_disjunction(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Binary {
            op: BinaryOperator::Or,
            ..
        }
    )
}

fn equi_join(expr: &Expr) -> Option<(usize, usize)> {
    match expr {
        Expr::Binary {
            op: BinaryOperator::Eq,
            left,
            right,
        } => match (left.as_ref(), right.as_ref()) {
            (Expr::Column(l), Expr::Column(r)) if l.slot != r.slot => {
                Some((l.slot.min(r.slot), l.slot.max(r.slot)))
            }
            _ => None,
        },
        _ => None,
    }
}

/// Move every column of `slot` onto slot 0.
fn rebase(mut expr: Expr, slot: usize) -> Expr {
    relabel(&mut expr, slot);
    expr
}

fn relabel(expr: &mut Expr, slot: usize) {
    match expr {
        Expr::Column(column) => {
            if column.slot == slot {
                column.slot = 0;
            }
        }
        Expr::Literal(_) | Expr::Bind(_) => {}
        Expr::Binary { left, right, .. } => {
            relabel(left, slot);
            relabel(right, slot);
        }
        Expr::Unary { operand, .. } => relabel(operand, slot),
        Expr::Aggregate { args, .. } | Expr::Scalar { args, .. } => {
            for arg in args {
                relabel(arg, slot);
            }
        }
        Expr::In { needle, .. } => relabel(needle, slot),
        Expr::Case {
            operand,
            branches,
            otherwise,
        } => {
            if let Some(operand) = operand {
                relabel(operand, slot);
            }
            for (when, then) in branches {
                relabel(when, slot);
                relabel(then, slot);
            }
            if let Some(otherwise) = otherwise {
                relabel(otherwise, slot);
            }
        }
        Expr::Cast { expr, .. } => relabel(expr, slot),
    }
}
