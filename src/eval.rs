//! Expression evaluator.
//!
//! Evaluation is a pure function of an IR expression and a row [`Context`].
//! Binary operators first coerce both operands to a single target affinity:
//! the affinity of the operand that is a bare column reference when exactly
//! one is, else the affinity of the left operand. NULL propagates through
//! arithmetic, comparison and concatenation; `AND`, `OR` and `NOT` use
//! three-valued logic.

use crate::error::{Error, Result};
use crate::ir::{AggregateFunction, BinaryOperator, Expr, ScalarFunction, UnaryOperator};
use crate::storage::{Row, RowKey};
use crate::types::{
    coerce, coerce_to_lexical_affinity, compare_values, real_as_integer, values_equal,
    ColumnAffinity, Numeric, Value,
};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Rows an expression is evaluated against.
#[derive(Debug, Clone, Copy)]
pub enum Context<'a> {
    /// No row at all: constant expressions only.
    Empty,
    /// One row per source slot.
    Tuple(&'a [&'a Row]),
    /// A whole group. Aggregates see every tuple; everything else reads the
    /// representative tuple, or NULL when the group is empty.
    Group {
        tuples: &'a [Vec<&'a Row>],
        representative: Option<usize>,
    },
}

/// Outcome of an aggregate over a group. `source_row` is the index of the
/// winning tuple for MIN and MAX.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
    pub source_row: Option<usize>,
    pub value: Value,
}

pub fn evaluate(expr: &Expr, context: Context<'_>) -> Result<Value> {
    match expr {
        Expr::Literal(text) => coerce_to_lexical_affinity(text),
        Expr::Bind(value) => Ok(value.clone()),
        Expr::Column(column) => {
            let tuple = match context {
                Context::Tuple(tuple) => tuple,
                Context::Group {
                    tuples,
                    representative,
                } => match representative.and_then(|index| tuples.get(index)) {
                    Some(tuple) => tuple.as_slice(),
                    None => return Ok(Value::Null),
                },
                Context::Empty => {
                    return Err(Error::invariant(format!(
                        "column {} evaluated without a row",
                        column.header.full_name
                    )))
                }
            };
            tuple
                .get(column.slot)
                .and_then(|row| row.get(&column.header))
                .cloned()
                .ok_or_else(|| {
                    Error::invariant(format!(
                        "column {} does not belong to the current row",
                        column.header.full_name
                    ))
                })
        }
        Expr::Binary { op, left, right } => evaluate_binary(*op, left, right, context),
        Expr::Unary { op, operand } => evaluate_unary(*op, evaluate(operand, context)?),
        Expr::Aggregate {
            function,
            args,
            distinct,
        } => match context {
            Context::Group { tuples, .. } => Ok(aggregate(*function, args, *distinct, tuples)?.value),
            _ => Err(Error::MisusedAggregate {
                function: function.name().to_string(),
            }),
        },
        Expr::Scalar { function, args } => {
            let values = args
                .iter()
                .map(|arg| evaluate(arg, context))
                .collect::<Result<Vec<_>>>()?;
            evaluate_scalar(*function, values)
        }
        Expr::In { needle, haystack } => {
            if haystack.data.is_empty() {
                return Ok(Value::Integer(0));
            }
            let affinity = haystack
                .schema
                .first()
                .and_then(|column| column.affinity)
                .unwrap_or(ColumnAffinity::Blob);
            let needle = coerce(evaluate(needle, context)?, affinity);
            if needle.is_null() {
                return Ok(Value::Null);
            }
            let mut saw_null = false;
            for row in &haystack.data {
                match row.first() {
                    Some(Value::Null) | None => saw_null = true,
                    Some(candidate) if values_equal(&needle, candidate) => {
                        return Ok(Value::Integer(1))
                    }
                    Some(_) => {}
                }
            }
            Ok(if saw_null { Value::Null } else { Value::Integer(0) })
        }
        Expr::Case {
            operand,
            branches,
            otherwise,
        } => {
            let operand = operand
                .as_ref()
                .map(|operand| evaluate(operand, context))
                .transpose()?;
            for (when, then) in branches {
                let hit = match &operand {
                    Some(value) => {
                        let candidate = evaluate(when, context)?;
                        !value.is_null() && !candidate.is_null() && values_equal(value, &candidate)
                    }
                    None => is_true(when, context)?,
                };
                if hit {
                    return evaluate(then, context);
                }
            }
            match otherwise {
                Some(otherwise) => evaluate(otherwise, context),
                None => Ok(Value::Null),
            }
        }
        Expr::Cast { expr, affinity } => Ok(cast(evaluate(expr, context)?, *affinity)),
    }
}

/// Whether a filter condition holds. NULL and false both reject.
pub fn is_true(expr: &Expr, context: Context<'_>) -> Result<bool> {
    Ok(evaluate(expr, context)?.truth() == Some(true))
}

/// Affinity both operands of a binary operator are coerced to.
pub fn coercion_affinity(left: &Expr, right: &Expr) -> ColumnAffinity {
    match (left, right) {
        (Expr::Column(_), _) => left.affinity(),
        (_, Expr::Column(_)) => right.affinity(),
        _ => left.affinity(),
    }
}

fn evaluate_binary(op: BinaryOperator, left: &Expr, right: &Expr, context: Context<'_>) -> Result<Value> {
    let affinity = coercion_affinity(left, right);
    let lhs = coerce(evaluate(left, context)?, affinity);
    let rhs = coerce(evaluate(right, context)?, affinity);

    match op {
        BinaryOperator::And => Ok(logical(match (lhs.truth(), rhs.truth()) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        })),
        BinaryOperator::Or => Ok(logical(match (lhs.truth(), rhs.truth()) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        })),
        BinaryOperator::Is => Ok(logical(Some(values_equal(&lhs, &rhs)))),
        BinaryOperator::IsNot => Ok(logical(Some(!values_equal(&lhs, &rhs)))),
        _ if lhs.is_null() || rhs.is_null() => Ok(Value::Null),
        BinaryOperator::Eq
        | BinaryOperator::NotEq
        | BinaryOperator::Lt
        | BinaryOperator::LtEq
        | BinaryOperator::Gt
        | BinaryOperator::GtEq => {
            let ordering = compare_values(&lhs, &rhs);
            let holds = match op {
                BinaryOperator::Eq => ordering == Ordering::Equal,
                BinaryOperator::NotEq => ordering != Ordering::Equal,
                BinaryOperator::Lt => ordering == Ordering::Less,
                BinaryOperator::LtEq => ordering != Ordering::Greater,
                BinaryOperator::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(logical(Some(holds)))
        }
        BinaryOperator::Concat => Ok(Value::Text(lhs.render() + &rhs.render())),
        BinaryOperator::Like => Ok(logical(Some(like(&rhs.render(), &lhs.render())))),
        BinaryOperator::Glob => Ok(logical(Some(glob(&rhs.render(), &lhs.render())))),
        BinaryOperator::Regexp => {
            let pattern = rhs.render();
            let regex = Regex::new(&pattern).map_err(|err| {
                Error::type_mismatch(format!("invalid regular expression {}: {}", pattern, err))
            })?;
            Ok(logical(Some(regex.is_match(&lhs.render()))))
        }
        BinaryOperator::Match => Err(Error::unsupported("MATCH requires a full-text index")),
        BinaryOperator::BitAnd
        | BinaryOperator::BitOr
        | BinaryOperator::ShiftLeft
        | BinaryOperator::ShiftRight => {
            let (a, b) = (integer_operand(&lhs)?, integer_operand(&rhs)?);
            Ok(Value::Integer(match op {
                BinaryOperator::BitAnd => a & b,
                BinaryOperator::BitOr => a | b,
                BinaryOperator::ShiftLeft => shift_left(a, b),
                _ => shift_left(a, b.checked_neg().unwrap_or(i64::MAX)),
            }))
        }
        BinaryOperator::Add
        | BinaryOperator::Subtract
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::Modulo => arithmetic(op, &lhs, &rhs),
    }
}

fn logical(truth: Option<bool>) -> Value {
    match truth {
        Some(flag) => Value::Integer(i64::from(flag)),
        None => Value::Null,
    }
}

fn arithmetic(op: BinaryOperator, lhs: &Value, rhs: &Value) -> Result<Value> {
    let (Some(a), Some(b)) = (lhs.to_numeric()?, rhs.to_numeric()?) else {
        return Ok(Value::Null);
    };
    if let (Numeric::Integer(x), Numeric::Integer(y)) = (a, b) {
        let exact = match op {
            BinaryOperator::Add => x.checked_add(y),
            BinaryOperator::Subtract => x.checked_sub(y),
            BinaryOperator::Multiply => x.checked_mul(y),
            BinaryOperator::Divide if y == 0 => return Ok(Value::Null),
            BinaryOperator::Divide => x.checked_div(y),
            BinaryOperator::Modulo if y == 0 => return Ok(Value::Null),
            _ => Some(x.wrapping_rem(y)),
        };
        if let Some(value) = exact {
            return Ok(Value::Integer(value));
        }
    }
    let (x, y) = (a.as_f64(), b.as_f64());
    let value = match op {
        BinaryOperator::Add => x + y,
        BinaryOperator::Subtract => x - y,
        BinaryOperator::Multiply => x * y,
        BinaryOperator::Divide if y == 0.0 => return Ok(Value::Null),
        BinaryOperator::Divide => x / y,
        _ => {
            let divisor = y as i64;
            if divisor == 0 {
                return Ok(Value::Null);
            }
            (x as i64).wrapping_rem(divisor) as f64
        }
    };
    Ok(if value.is_nan() { Value::Null } else { Value::Real(value) })
}

fn integer_operand(value: &Value) -> Result<i64> {
    Ok(match value.to_numeric()? {
        Some(Numeric::Integer(v)) => v,
        Some(Numeric::Real(v)) => v as i64,
        None => 0,
    })
}

fn shift_left(value: i64, amount: i64) -> i64 {
    match amount {
        a if a >= 64 => 0,
        a if a >= 0 => value << a,
        a if a <= -64 => {
            if value < 0 {
                -1
            } else {
                0
            }
        }
        a => value >> -a,
    }
}

fn evaluate_unary(op: UnaryOperator, value: Value) -> Result<Value> {
    match op {
        UnaryOperator::Not => Ok(logical(value.truth().map(|flag| !flag))),
        UnaryOperator::Plus => Ok(value),
        UnaryOperator::Negate => Ok(match value.to_numeric()? {
            None => Value::Null,
            Some(Numeric::Integer(v)) => match v.checked_neg() {
                Some(negated) => Value::Integer(negated),
                None => Value::Real(-(v as f64)),
            },
            Some(Numeric::Real(v)) => Value::Real(-v),
        }),
        UnaryOperator::BitNot => {
            if value.is_null() {
                Ok(Value::Null)
            } else {
                Ok(Value::Integer(!integer_operand(&value)?))
            }
        }
    }
}

fn evaluate_scalar(function: ScalarFunction, mut args: Vec<Value>) -> Result<Value> {
    if !function.accepts(args.len()) {
        return Err(Error::WrongArgumentCount {
            function: function.name().to_string(),
        });
    }
    match function {
        ScalarFunction::TypeOf => Ok(Value::Text(args[0].natural_class().name().to_string())),
        ScalarFunction::Abs => match args[0].to_numeric()? {
            None => Ok(Value::Null),
            Some(Numeric::Integer(v)) => v.checked_abs().map(Value::Integer).ok_or(Error::IntegerOverflow),
            Some(Numeric::Real(v)) => Ok(Value::Real(v.abs())),
        },
        ScalarFunction::Length => Ok(match &args[0] {
            Value::Null => Value::Null,
            Value::Blob(bytes) => Value::Integer(bytes.len() as i64),
            other => Value::Integer(other.render().chars().count() as i64),
        }),
        ScalarFunction::Lower | ScalarFunction::Upper => Ok(match &args[0] {
            Value::Null => Value::Null,
            other if function == ScalarFunction::Lower => Value::Text(other.render().to_ascii_lowercase()),
            other => Value::Text(other.render().to_ascii_uppercase()),
        }),
        ScalarFunction::Coalesce | ScalarFunction::IfNull => {
            Ok(args.into_iter().find(|value| !value.is_null()).unwrap_or(Value::Null))
        }
        ScalarFunction::NullIf => {
            let second = args.pop().unwrap_or(Value::Null);
            let first = args.pop().unwrap_or(Value::Null);
            if !first.is_null() && values_equal(&first, &second) {
                Ok(Value::Null)
            } else {
                Ok(first)
            }
        }
        ScalarFunction::Max | ScalarFunction::Min => {
            if args.iter().any(Value::is_null) {
                return Ok(Value::Null);
            }
            let wanted = if function == ScalarFunction::Max {
                Ordering::Greater
            } else {
                Ordering::Less
            };
            let mut best: Option<Value> = None;
            for value in args {
                best = match best {
                    Some(current) if compare_values(&value, &current) != wanted => Some(current),
                    _ => Some(value),
                };
            }
            Ok(best.unwrap_or(Value::Null))
        }
    }
}

/// `CAST(value AS affinity)`. Unlike storage coercion this always converts.
pub fn cast(value: Value, affinity: ColumnAffinity) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    let numeric = |value: &Value| -> Numeric {
        let text = match value {
            Value::Blob(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            other => other.clone(),
        };
        text.to_numeric().ok().flatten().unwrap_or(Numeric::Integer(0))
    };
    match affinity {
        ColumnAffinity::Integer => Value::Integer(match numeric(&value) {
            Numeric::Integer(v) => v,
            Numeric::Real(v) => v as i64,
        }),
        ColumnAffinity::Real => Value::Real(numeric(&value).as_f64()),
        ColumnAffinity::Numeric => match numeric(&value) {
            Numeric::Real(v) => real_as_integer(v)
                .filter(|int| *int as f64 == v)
                .map_or(Value::Real(v), Value::Integer),
            int => int.into_value(),
        },
        ColumnAffinity::Text => match value {
            Value::Text(text) => Value::Text(text),
            other => Value::Text(other.render()),
        },
        ColumnAffinity::Blob => match value {
            Value::Blob(bytes) => Value::Blob(bytes),
            other => Value::Blob(other.render().into_bytes()),
        },
    }
}

/// Compute an aggregate over every tuple of a group.
pub fn aggregate(
    function: AggregateFunction,
    args: &[Expr],
    distinct: bool,
    tuples: &[Vec<&Row>],
) -> Result<AggregateResult> {
    let Some(arg) = args.first() else {
        return Ok(AggregateResult {
            source_row: None,
            value: Value::Integer(tuples.len() as i64),
        });
    };

    let mut seen = HashSet::new();
    let mut inputs = Vec::with_capacity(tuples.len());
    for (index, tuple) in tuples.iter().enumerate() {
        let value = evaluate(arg, Context::Tuple(tuple))?;
        if value.is_null() {
            continue;
        }
        if distinct && !seen.insert(RowKey(vec![value.clone()])) {
            continue;
        }
        inputs.push((index, value));
    }

    let value = match function {
        AggregateFunction::Count => Value::Integer(inputs.len() as i64),
        AggregateFunction::Max | AggregateFunction::Min => {
            let wanted = if function == AggregateFunction::Max {
                Ordering::Greater
            } else {
                Ordering::Less
            };
            let mut best: Option<(usize, Value)> = None;
            for (index, value) in inputs {
                let replace = match &best {
                    Some((_, current)) => compare_values(&value, current) == wanted,
                    None => true,
                };
                if replace {
                    best = Some((index, value));
                }
            }
            return Ok(match best {
                Some((index, value)) => AggregateResult {
                    source_row: Some(index),
                    value,
                },
                None => AggregateResult {
                    source_row: None,
                    value: Value::Null,
                },
            });
        }
        AggregateFunction::Sum => {
            if inputs.is_empty() {
                Value::Null
            } else {
                sum(&inputs)?
            }
        }
        AggregateFunction::Avg => {
            if inputs.is_empty() {
                Value::Null
            } else {
                Value::Real(real_sum(&inputs)? / inputs.len() as f64)
            }
        }
        AggregateFunction::Total => Value::Real(real_sum(&inputs)?),
    };
    Ok(AggregateResult {
        source_row: None,
        value,
    })
}

fn sum(inputs: &[(usize, Value)]) -> Result<Value> {
    let mut total: i64 = 0;
    for (_, value) in inputs {
        match value.to_numeric()? {
            Some(Numeric::Integer(v)) => {
                total = total.checked_add(v).ok_or(Error::IntegerOverflow)?;
            }
            Some(Numeric::Real(_)) => return Ok(Value::Real(real_sum(inputs)?)),
            None => {}
        }
    }
    Ok(Value::Integer(total))
}

fn real_sum(inputs: &[(usize, Value)]) -> Result<f64> {
    let mut total = 0.0;
    for (_, value) in inputs {
        if let Some(numeric) = value.to_numeric()? {
            total += numeric.as_f64();
        }
    }
    Ok(total)
}

/// SQL LIKE: `%` matches any run, `_` one character, ASCII case-insensitive.
fn like(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    wildcard_match(&pattern, &text, '%', |pattern, t| match pattern[0] {
        '_' => Some(1),
        c => c.eq_ignore_ascii_case(&t).then_some(1),
    })
}

/// SQL GLOB: `*`, `?` and `[...]` classes, case-sensitive.
fn glob(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    wildcard_match(&pattern, &text, '*', |pattern, t| match pattern[0] {
        '?' => Some(1),
        '[' => glob_class(pattern, t),
        c => (c == t).then_some(1),
    })
}

/// Match `text` against a pattern where `star` matches any run and every other
/// element matches exactly one character. `single` receives the remaining
/// pattern (never empty) and returns the element's width when it matches.
///
/// On a mismatch the scan resumes one character further past the most recent
/// `star`, so the cost is bounded by `pattern.len() * text.len()`.
fn wildcard_match(
    pattern: &[char],
    text: &[char],
    star: char,
    single: impl Fn(&[char], char) -> Option<usize>,
) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut resume: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && pattern[p] == star {
            p += 1;
            resume = Some((p, t));
            continue;
        }
        if let Some(width) = (p < pattern.len()).then(|| single(&pattern[p..], text[t])).flatten() {
            p += width;
            t += 1;
            continue;
        }
        let Some((after_star, start)) = resume else {
            return false;
        };
        p = after_star;
        t = start + 1;
        resume = Some((after_star, t));
    }
    pattern[p..].iter().all(|&c| c == star)
}

/// `[...]` at the head of `pattern` against one character. `]` right after
/// the opening bracket (or `^`) is a member, `a-z` is a range, a leading `^`
/// negates. An unterminated class never matches.
fn glob_class(pattern: &[char], t: char) -> Option<usize> {
    let rest = &pattern[1..];
    let close = rest.iter().skip(1).position(|&c| c == ']')? + 1;
    let class = &rest[..close];
    let (negated, class) = match class.split_first() {
        Some(('^', class)) => (true, class),
        _ => (false, class),
    };
    let mut hit = false;
    let mut i = 0;
    while i < class.len() {
        if i + 2 < class.len() && class[i + 1] == '-' {
            hit |= class[i] <= t && t <= class[i + 2];
            i += 3;
        } else {
            hit |= class[i] == t;
            i += 1;
        }
    }
    (hit != negated).then_some(close + 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ColumnDefinition, QueryResult};
    use crate::storage::ColumnHeader;
    use std::sync::Arc;

    fn lit(text: &str) -> Expr {
        Expr::Literal(text.to_string())
    }

    fn eval(expr: &Expr) -> Value {
        evaluate(expr, Context::Empty).unwrap()
    }

    fn bin(op: BinaryOperator, left: Expr, right: Expr) -> Value {
        eval(&Expr::binary(op, left, right))
    }

    fn column(index: usize, affinity: ColumnAffinity) -> Expr {
        Expr::column(0, ColumnHeader::new(index, "t", &format!("c{}", index), affinity))
    }

    #[test]
    fn literals_take_lexical_types() {
        assert_eq!(eval(&lit("1")), Value::Integer(1));
        assert_eq!(eval(&lit("'a'")), Value::Text("a".into()));
        assert_eq!(eval(&lit("NULL")), Value::Null);
        assert_eq!(eval(&Expr::Bind(Value::Real(0.5))), Value::Real(0.5));
    }

    #[test]
    fn integer_arithmetic_stays_integral() {
        assert_eq!(bin(BinaryOperator::Add, lit("1"), lit("1")), Value::Integer(2));
        assert_eq!(bin(BinaryOperator::Divide, lit("7"), lit("2")), Value::Integer(3));
        assert_eq!(bin(BinaryOperator::Modulo, lit("7"), lit("2")), Value::Integer(1));
        assert_eq!(bin(BinaryOperator::Multiply, lit("2"), lit("1.5")), Value::Real(3.0));
        assert_eq!(bin(BinaryOperator::Divide, lit("1"), lit("0")), Value::Null);
        assert_eq!(bin(BinaryOperator::Add, lit("NULL"), lit("1")), Value::Null);
        assert_eq!(
            bin(BinaryOperator::Add, lit("9223372036854775807"), lit("1")),
            Value::Real(9223372036854775808.0)
        );
    }

    #[test]
    fn text_operands_use_numeric_prefix() {
        assert_eq!(bin(BinaryOperator::Add, lit("'3abc'"), lit("1")), Value::Integer(4));
        assert_eq!(bin(BinaryOperator::Add, lit("'abc'"), lit("1")), Value::Integer(1));
    }

    #[test]
    fn blob_arithmetic_is_a_type_mismatch() {
        let expr = Expr::binary(BinaryOperator::Add, lit("x'01'"), lit("1"));
        assert!(matches!(evaluate(&expr, Context::Empty), Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn comparisons_propagate_null() {
        assert_eq!(bin(BinaryOperator::Eq, lit("FALSE"), lit("NULL")), Value::Null);
        assert_eq!(bin(BinaryOperator::Lt, lit("1"), lit("'a'")), Value::Integer(1));
        assert_eq!(bin(BinaryOperator::Eq, lit("1"), lit("'1'")), Value::Integer(0));
        assert_eq!(bin(BinaryOperator::Is, lit("NULL"), lit("NULL")), Value::Integer(1));
        assert_eq!(bin(BinaryOperator::IsNot, lit("1"), lit("NULL")), Value::Integer(1));
    }

    #[test]
    fn column_affinity_drives_comparison() {
        let row = Row::new(vec![Value::Integer(2021), Value::Text("2021".into())]);
        let tuple = [&row];
        let ctx = Context::Tuple(&tuple);
        let int_eq_text = Expr::binary(BinaryOperator::Eq, lit("'2021'"), column(0, ColumnAffinity::Integer));
        assert_eq!(evaluate(&int_eq_text, ctx).unwrap(), Value::Integer(1));
        let text_eq_int = Expr::binary(BinaryOperator::Eq, column(1, ColumnAffinity::Text), lit("2021"));
        assert_eq!(evaluate(&text_eq_int, ctx).unwrap(), Value::Integer(1));
    }

    #[test]
    fn three_valued_logic() {
        let and = |l: &str, r: &str| bin(BinaryOperator::And, lit(l), lit(r));
        let or = |l: &str, r: &str| bin(BinaryOperator::Or, lit(l), lit(r));
        assert_eq!(and("NULL", "0"), Value::Integer(0));
        assert_eq!(and("NULL", "1"), Value::Null);
        assert_eq!(or("NULL", "1"), Value::Integer(1));
        assert_eq!(or("NULL", "0"), Value::Null);
        assert_eq!(eval(&Expr::not(lit("NULL"))), Value::Null);
        assert_eq!(eval(&Expr::not(lit("'abc'"))), Value::Integer(1));
        assert!(!is_true(&lit("NULL"), Context::Empty).unwrap());
    }

    #[test]
    fn string_matching() {
        assert_eq!(bin(BinaryOperator::Like, lit("'Hello'"), lit("'h%o'")), Value::Integer(1));
        assert_eq!(bin(BinaryOperator::Like, lit("'Hello'"), lit("'h_l'")), Value::Integer(0));
        assert_eq!(bin(BinaryOperator::Glob, lit("'Hello'"), lit("'H*'")), Value::Integer(1));
        assert_eq!(bin(BinaryOperator::Glob, lit("'Hello'"), lit("'h*'")), Value::Integer(0));
        assert_eq!(bin(BinaryOperator::Glob, lit("'b1'"), lit("'[a-c][0-9]'")), Value::Integer(1));
        assert_eq!(bin(BinaryOperator::Glob, lit("'d1'"), lit("'[^a-c]?'")), Value::Integer(1));
        assert_eq!(bin(BinaryOperator::Regexp, lit("'abc123'"), lit("'^[a-z]+[0-9]+$'")), Value::Integer(1));
        assert_eq!(bin(BinaryOperator::Concat, lit("1"), lit("'x'")), Value::Text("1x".into()));
        let matched = Expr::binary(BinaryOperator::Match, lit("'a'"), lit("'a'"));
        assert!(matches!(evaluate(&matched, Context::Empty), Err(Error::Unsupported { .. })));
    }

    #[test]
    fn wildcards_backtrack_to_the_last_star() {
        assert!(like("%a%b", "xaxxb"));
        assert!(like("a%", "a"));
        assert!(!like("%a%b", "aaab "));
        assert!(like("%%", ""));
        assert!(!like("_", ""));
        assert!(glob("*[0-9]?", "abc12"));
        assert!(!glob("*[0-9]", "abc"));
        assert!(glob("[]]*", "]x"));
        assert!(!glob("[abc", "a"));
    }

    #[test]
    fn many_wildcards_finish_quickly() {
        let started = std::time::Instant::now();
        let text = "a".repeat(2000);
        let like_pattern = format!("{}b", "%a".repeat(20));
        assert!(!like(&like_pattern, &text));
        let glob_pattern = format!("{}b", "*a".repeat(20));
        assert!(!glob(&glob_pattern, &text));
        assert!(like(&format!("{}%", "%a".repeat(20)), &text));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn bitwise_operators() {
        assert_eq!(bin(BinaryOperator::BitAnd, lit("6"), lit("3")), Value::Integer(2));
        assert_eq!(bin(BinaryOperator::BitOr, lit("6"), lit("3")), Value::Integer(7));
        assert_eq!(bin(BinaryOperator::ShiftLeft, lit("1"), lit("4")), Value::Integer(16));
        assert_eq!(bin(BinaryOperator::ShiftRight, lit("-16"), lit("2")), Value::Integer(-4));
        assert_eq!(bin(BinaryOperator::ShiftLeft, lit("1"), lit("64")), Value::Integer(0));
    }

    #[test]
    fn scalar_functions() {
        let call = |function, args: Vec<Expr>| eval(&Expr::Scalar { function, args });
        assert_eq!(call(ScalarFunction::TypeOf, vec![lit("'500.0'")]), Value::Text("text".into()));
        assert_eq!(call(ScalarFunction::TypeOf, vec![lit("500.0")]), Value::Text("real".into()));
        assert_eq!(call(ScalarFunction::TypeOf, vec![lit("NULL")]), Value::Text("null".into()));
        assert_eq!(call(ScalarFunction::Abs, vec![lit("-3")]), Value::Integer(3));
        assert_eq!(call(ScalarFunction::Length, vec![lit("'héllo'")]), Value::Integer(5));
        assert_eq!(call(ScalarFunction::Upper, vec![lit("'abc'")]), Value::Text("ABC".into()));
        assert_eq!(call(ScalarFunction::Coalesce, vec![lit("NULL"), lit("2"), lit("3")]), Value::Integer(2));
        assert_eq!(call(ScalarFunction::NullIf, vec![lit("1"), lit("1")]), Value::Null);
        assert_eq!(call(ScalarFunction::Max, vec![lit("1"), lit("'a'"), lit("2")]), Value::Text("a".into()));
        let bad = Expr::Scalar {
            function: ScalarFunction::Abs,
            args: vec![],
        };
        assert!(matches!(evaluate(&bad, Context::Empty), Err(Error::WrongArgumentCount { .. })));
    }

    #[test]
    fn casts_always_convert() {
        assert_eq!(cast(Value::Text("12abc".into()), ColumnAffinity::Integer), Value::Integer(12));
        assert_eq!(cast(Value::Text("abc".into()), ColumnAffinity::Real), Value::Real(0.0));
        assert_eq!(cast(Value::Real(3.0), ColumnAffinity::Numeric), Value::Integer(3));
        assert_eq!(cast(Value::Integer(5), ColumnAffinity::Text), Value::Text("5".into()));
        assert_eq!(cast(Value::Text("hi".into()), ColumnAffinity::Blob), Value::Blob(b"hi".to_vec()));
        assert_eq!(cast(Value::Null, ColumnAffinity::Integer), Value::Null);
    }

    #[test]
    fn case_expressions() {
        let simple = Expr::Case {
            operand: Some(Box::new(lit("2"))),
            branches: vec![(lit("1"), lit("'one'")), (lit("2"), lit("'two'"))],
            otherwise: None,
        };
        assert_eq!(eval(&simple), Value::Text("two".into()));
        let searched = Expr::Case {
            operand: None,
            branches: vec![(lit("NULL"), lit("'null'"))],
            otherwise: Some(Box::new(lit("'else'"))),
        };
        assert_eq!(eval(&searched), Value::Text("else".into()));
    }

    #[test]
    fn membership_coerces_needle_to_haystack_affinity() {
        let haystack = Arc::new(QueryResult::new(
            vec![ColumnDefinition {
                name: "x".into(),
                affinity: Some(ColumnAffinity::Integer),
            }],
            vec![vec![Value::Integer(1)], vec![Value::Integer(2)]],
        ));
        let test = |needle: &str| {
            eval(&Expr::In {
                needle: Box::new(lit(needle)),
                haystack: Arc::clone(&haystack),
            })
        };
        assert_eq!(test("'2'"), Value::Integer(1));
        assert_eq!(test("3"), Value::Integer(0));
        assert_eq!(test("NULL"), Value::Null);

        let with_null = Arc::new(QueryResult::new(
            vec![ColumnDefinition {
                name: "x".into(),
                affinity: None,
            }],
            vec![vec![Value::Null]],
        ));
        let expr = Expr::In {
            needle: Box::new(lit("3")),
            haystack: with_null,
        };
        assert_eq!(eval(&expr), Value::Null);
    }

    fn group_rows() -> Vec<Row> {
        vec![
            Row::new(vec![Value::Integer(3), Value::Text("a".into())]),
            Row::new(vec![Value::Null, Value::Text("b".into())]),
            Row::new(vec![Value::Integer(7), Value::Text("c".into())]),
            Row::new(vec![Value::Integer(7), Value::Text("d".into())]),
        ]
    }

    #[test]
    fn aggregates_skip_nulls() {
        let rows = group_rows();
        let tuples: Vec<Vec<&Row>> = rows.iter().map(|row| vec![row]).collect();
        let arg = [column(0, ColumnAffinity::Integer)];
        let run = |function, distinct| aggregate(function, &arg, distinct, &tuples).unwrap().value;
        assert_eq!(run(AggregateFunction::Sum, false), Value::Integer(17));
        assert_eq!(run(AggregateFunction::Count, false), Value::Integer(3));
        assert_eq!(run(AggregateFunction::Count, true), Value::Integer(2));
        assert_eq!(run(AggregateFunction::Avg, false), Value::Real(17.0 / 3.0));
        assert_eq!(run(AggregateFunction::Total, false), Value::Real(17.0));
        assert_eq!(aggregate(AggregateFunction::Count, &[], false, &tuples).unwrap().value, Value::Integer(4));
    }

    #[test]
    fn max_keeps_first_winning_row() {
        let rows = group_rows();
        let tuples: Vec<Vec<&Row>> = rows.iter().map(|row| vec![row]).collect();
        let arg = [column(0, ColumnAffinity::Integer)];
        let max = aggregate(AggregateFunction::Max, &arg, false, &tuples).unwrap();
        assert_eq!(max, AggregateResult { source_row: Some(2), value: Value::Integer(7) });
        let min = aggregate(AggregateFunction::Min, &arg, false, &tuples).unwrap();
        assert_eq!(min.source_row, Some(0));
    }

    #[test]
    fn empty_groups_yield_null_sums() {
        let tuples: Vec<Vec<&Row>> = Vec::new();
        let arg = [column(0, ColumnAffinity::Integer)];
        assert_eq!(aggregate(AggregateFunction::Sum, &arg, false, &tuples).unwrap().value, Value::Null);
        assert_eq!(aggregate(AggregateFunction::Avg, &arg, false, &tuples).unwrap().value, Value::Null);
        assert_eq!(aggregate(AggregateFunction::Max, &arg, false, &tuples).unwrap().value, Value::Null);
        assert_eq!(aggregate(AggregateFunction::Count, &arg, false, &tuples).unwrap().value, Value::Integer(0));
    }

    #[test]
    fn sum_overflow_is_an_error() {
        let rows = vec![
            Row::new(vec![Value::Integer(i64::MAX)]),
            Row::new(vec![Value::Integer(1)]),
        ];
        let tuples: Vec<Vec<&Row>> = rows.iter().map(|row| vec![row]).collect();
        let arg = [column(0, ColumnAffinity::Integer)];
        assert_eq!(
            aggregate(AggregateFunction::Sum, &arg, false, &tuples).unwrap_err(),
            Error::IntegerOverflow
        );
    }
}
