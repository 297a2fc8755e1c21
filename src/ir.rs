//! Intermediate representation produced by [`crate::builder`] and consumed by
//! [`crate::executor`].
//!
//! Every name in the IR is already resolved: column references carry the
//! source slot and the column header they read, bound parameters carry their
//! values, and function calls name a builtin. Expressions are plain data and
//! may be evaluated any number of times.

use crate::storage::ColumnHeader;
use crate::types::{ColumnAffinity, Value};
use std::fmt;
use std::sync::Arc;

pub use crate::ast::CompoundOperator;

/// A column read from one of the statement's sources.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    /// Position of the source in the statement's FROM list.
    pub slot: usize,
    /// Header of the referenced column, including its affinity.
    pub header: ColumnHeader,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal in its SQL spelling, typed at evaluation time.
    Literal(String),
    /// Parameter value resolved while building.
    Bind(Value),
    Column(ColumnRef),
    Binary {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    /// Aggregate call; evaluated once per group. `COUNT(*)` has no arguments.
    Aggregate {
        function: AggregateFunction,
        args: Vec<Expr>,
        distinct: bool,
    },
    Scalar {
        function: ScalarFunction,
        args: Vec<Expr>,
    },
    /// Membership test against a materialized single-column result.
    In {
        needle: Box<Expr>,
        haystack: Arc<QueryResult>,
    },
    Case {
        operand: Option<Box<Expr>>,
        branches: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
    Cast {
        expr: Box<Expr>,
        affinity: ColumnAffinity,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Concat,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Is,
    IsNot,
    And,
    Or,
    Like,
    Glob,
    Regexp,
    Match,
    BitAnd,
    BitOr,
    ShiftLeft,
    ShiftRight,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Concat => "||",
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::Is => "IS",
            BinaryOperator::IsNot => "IS NOT",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Like => "LIKE",
            BinaryOperator::Glob => "GLOB",
            BinaryOperator::Regexp => "REGEXP",
            BinaryOperator::Match => "MATCH",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::BitOr => "|",
            BinaryOperator::ShiftLeft => "<<",
            BinaryOperator::ShiftRight => ">>",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::NotEq
                | BinaryOperator::Lt
                | BinaryOperator::LtEq
                | BinaryOperator::Gt
                | BinaryOperator::GtEq
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Not,
    Negate,
    Plus,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Count,
    Max,
    Min,
    Sum,
    Avg,
    Total,
}

impl AggregateFunction {
    pub fn lookup(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(AggregateFunction::Count),
            "MAX" => Some(AggregateFunction::Max),
            "MIN" => Some(AggregateFunction::Min),
            "SUM" => Some(AggregateFunction::Sum),
            "AVG" => Some(AggregateFunction::Avg),
            "TOTAL" => Some(AggregateFunction::Total),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Max => "max",
            AggregateFunction::Min => "min",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Total => "total",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarFunction {
    TypeOf,
    Abs,
    Length,
    Lower,
    Upper,
    Coalesce,
    IfNull,
    NullIf,
    /// Multi-argument `max(a, b, ...)`.
    Max,
    /// Multi-argument `min(a, b, ...)`.
    Min,
}

impl ScalarFunction {
    pub fn lookup(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "TYPEOF" => Some(ScalarFunction::TypeOf),
            "ABS" => Some(ScalarFunction::Abs),
            "LENGTH" => Some(ScalarFunction::Length),
            "LOWER" => Some(ScalarFunction::Lower),
            "UPPER" => Some(ScalarFunction::Upper),
            "COALESCE" => Some(ScalarFunction::Coalesce),
            "IFNULL" => Some(ScalarFunction::IfNull),
            "NULLIF" => Some(ScalarFunction::NullIf),
            "MAX" => Some(ScalarFunction::Max),
            "MIN" => Some(ScalarFunction::Min),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarFunction::TypeOf => "typeof",
            ScalarFunction::Abs => "abs",
            ScalarFunction::Length => "length",
            ScalarFunction::Lower => "lower",
            ScalarFunction::Upper => "upper",
            ScalarFunction::Coalesce => "coalesce",
            ScalarFunction::IfNull => "ifnull",
            ScalarFunction::NullIf => "nullif",
            ScalarFunction::Max => "max",
            ScalarFunction::Min => "min",
        }
    }

    /// Whether `count` arguments is an accepted call shape.
    pub fn accepts(self, count: usize) -> bool {
        match self {
            ScalarFunction::TypeOf
            | ScalarFunction::Abs
            | ScalarFunction::Length
            | ScalarFunction::Lower
            | ScalarFunction::Upper => count == 1,
            ScalarFunction::IfNull | ScalarFunction::NullIf => count == 2,
            ScalarFunction::Coalesce | ScalarFunction::Max | ScalarFunction::Min => count >= 2,
        }
    }
}

impl Expr {
    pub fn column(slot: usize, header: ColumnHeader) -> Self {
        Expr::Column(ColumnRef { slot, header })
    }

    pub fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn not(operand: Expr) -> Self {
        Expr::Unary {
            op: UnaryOperator::Not,
            operand: Box::new(operand),
        }
    }

    /// Affinity the expression carries into comparisons. Only bare column
    /// references have one; every computed expression is affinity-less.
    pub fn affinity(&self) -> ColumnAffinity {
        match self {
            Expr::Column(column) => column.header.affinity,
            _ => ColumnAffinity::Blob,
        }
    }

    /// Syntactic equivalence: literal text, column full names, and operator
    /// or function identity with equivalent operands. No semantic reasoning.
    pub fn equivalent(&self, other: &Expr) -> bool {
        match (self, other) {
            (Expr::Literal(a), Expr::Literal(b)) => a == b,
            (Expr::Bind(a), Expr::Bind(b)) => a == b,
            (Expr::Column(a), Expr::Column(b)) => {
                a.slot == b.slot && a.header.full_name == b.header.full_name
            }
            (
                Expr::Binary { op, left, right },
                Expr::Binary {
                    op: other_op,
                    left: other_left,
                    right: other_right,
                },
            ) => op == other_op && left.equivalent(other_left) && right.equivalent(other_right),
            (
                Expr::Unary { op, operand },
                Expr::Unary {
                    op: other_op,
                    operand: other_operand,
                },
            ) => op == other_op && operand.equivalent(other_operand),
            (
                Expr::Aggregate {
                    function,
                    args,
                    distinct,
                },
                Expr::Aggregate {
                    function: other_function,
                    args: other_args,
                    distinct: other_distinct,
                },
            ) => function == other_function && distinct == other_distinct && all_equivalent(args, other_args),
            (
                Expr::Scalar { function, args },
                Expr::Scalar {
                    function: other_function,
                    args: other_args,
                },
            ) => function == other_function && all_equivalent(args, other_args),
            (
                Expr::In { needle, haystack },
                Expr::In {
                    needle: other_needle,
                    haystack: other_haystack,
                },
            ) => Arc::ptr_eq(haystack, other_haystack) && needle.equivalent(other_needle),
            (
                Expr::Case {
                    operand,
                    branches,
                    otherwise,
                },
                Expr::Case {
                    operand: other_operand,
                    branches: other_branches,
                    otherwise: other_otherwise,
                },
            ) => {
                option_equivalent(operand.as_deref(), other_operand.as_deref())
                    && option_equivalent(otherwise.as_deref(), other_otherwise.as_deref())
                    && branches.len() == other_branches.len()
                    && branches
                        .iter()
                        .zip(other_branches)
                        .all(|((w, t), (ow, ot))| w.equivalent(ow) && t.equivalent(ot))
            }
            (
                Expr::Cast { expr, affinity },
                Expr::Cast {
                    expr: other_expr,
                    affinity: other_affinity,
                },
            ) => affinity == other_affinity && expr.equivalent(other_expr),
            _ => false,
        }
    }

    /// Visit this node and every descendant, parents first.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Literal(_) | Expr::Bind(_) | Expr::Column(_) => {}
            Expr::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::Unary { operand, .. } => operand.walk(visit),
            Expr::Aggregate { args, .. } | Expr::Scalar { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            Expr::In { needle, .. } => needle.walk(visit),
            Expr::Case {
                operand,
                branches,
                otherwise,
            } => {
                if let Some(operand) = operand {
                    operand.walk(visit);
                }
                for (when, then) in branches {
                    when.walk(visit);
                    then.walk(visit);
                }
                if let Some(otherwise) = otherwise {
                    otherwise.walk(visit);
                }
            }
            Expr::Cast { expr, .. } => expr.walk(visit),
        }
    }

    pub fn contains_aggregate(&self) -> bool {
        let mut found = false;
        self.walk(&mut |node| found |= matches!(node, Expr::Aggregate { .. }));
        found
    }

    /// Sorted, de-duplicated source slots this expression reads.
    pub fn referenced_slots(&self) -> Vec<usize> {
        let mut slots = Vec::new();
        self.walk(&mut |node| {
            if let Expr::Column(column) = node {
                slots.push(column.slot);
            }
        });
        slots.sort_unstable();
        slots.dedup();
        slots
    }
}

fn all_equivalent(left: &[Expr], right: &[Expr]) -> bool {
    left.len() == right.len() && left.iter().zip(right).all(|(a, b)| a.equivalent(b))
}

fn option_equivalent(left: Option<&Expr>, right: Option<&Expr>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(a), Some(b)) => a.equivalent(b),
        _ => false,
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(text) => f.write_str(text),
            Expr::Bind(value) => write!(f, "{}", crate::types::literal_text(value)),
            Expr::Column(column) => f.write_str(&column.header.full_name),
            Expr::Binary { op, left, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            Expr::Unary { op, operand } => match op {
                UnaryOperator::Not => write!(f, "(NOT {})", operand),
                UnaryOperator::Negate => write!(f, "(-{})", operand),
                UnaryOperator::Plus => write!(f, "(+{})", operand),
                UnaryOperator::BitNot => write!(f, "(~{})", operand),
            },
            Expr::Aggregate {
                function,
                args,
                distinct,
            } => {
                write!(f, "{}(", function.name())?;
                if *distinct {
                    f.write_str("DISTINCT ")?;
                }
                if args.is_empty() {
                    f.write_str("*")?;
                }
                write_args(f, args)?;
                f.write_str(")")
            }
            Expr::Scalar { function, args } => {
                write!(f, "{}(", function.name())?;
                write_args(f, args)?;
                f.write_str(")")
            }
            Expr::In { needle, haystack } => {
                write!(f, "({} IN [{} rows])", needle, haystack.data.len())
            }
            Expr::Case {
                operand,
                branches,
                otherwise,
            } => {
                f.write_str("CASE")?;
                if let Some(operand) = operand {
                    write!(f, " {}", operand)?;
                }
                for (when, then) in branches {
                    write!(f, " WHEN {} THEN {}", when, then)?;
                }
                if let Some(otherwise) = otherwise {
                    write!(f, " ELSE {}", otherwise)?;
                }
                f.write_str(" END")
            }
            Expr::Cast { expr, affinity } => write!(f, "CAST({} AS {})", expr, affinity),
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expr]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", arg)?;
    }
    Ok(())
}

/// Rows for an INSERT, one expression per target column.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuesTable {
    pub rows: Vec<Vec<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStmt {
    pub table: String,
    /// Target column indices, in the order the VALUES cells supply them.
    pub columns: Vec<usize>,
    pub values: ValuesTable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStmt {
    pub table: String,
    pub assignments: Vec<(usize, Expr)>,
    pub filter: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStmt {
    pub table: String,
    pub filter: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    Select(SelectStmt),
}

/// A full SELECT: body plus the ordering and paging applied to its output.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    pub body: SelectBody,
    pub order_by: Vec<OrderTerm>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectBody {
    Core(Box<SelectCore>),
    Compound(Box<CompoundSelect>),
}

/// Set operation over two bodies; chains are built left-deep.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundSelect {
    pub op: CompoundOperator,
    pub left: SelectBody,
    pub right: SelectBody,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectCore {
    pub sources: Vec<Source>,
    pub result_columns: Vec<ResultColumn>,
    pub filter: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub distinct: bool,
}

impl SelectCore {
    /// Whether the core runs through grouping rather than row-by-row projection.
    /// A HAVING clause, or an aggregate anywhere in the select list or the
    /// ORDER BY, turns the whole input into one group when GROUP BY is absent.
    pub fn is_aggregate(&self, order_by: &[OrderTerm]) -> bool {
        !self.group_by.is_empty()
            || self.having.is_some()
            || self
                .result_columns
                .iter()
                .any(|column| column.expr.contains_aggregate())
            || order_by
                .iter()
                .any(|term| matches!(&term.key, OrderKey::Expr(expr) if expr.contains_aggregate()))
    }
}

/// A table read by a SELECT, in FROM order. The position is the column slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub table: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultColumn {
    pub expr: Expr,
    pub name: String,
    /// Affinity of the source column for bare column references.
    pub affinity: Option<ColumnAffinity>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderKey {
    /// Expression evaluated against each source row before projection.
    Expr(Expr),
    /// Zero-based output column of the statement's result.
    Output(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    pub key: OrderKey,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub affinity: Option<ColumnAffinity>,
}

/// Fully materialized SELECT output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub schema: Vec<ColumnDefinition>,
    pub data: Vec<Vec<Value>>,
    pub records_affected: usize,
}

impl QueryResult {
    pub fn new(schema: Vec<ColumnDefinition>, data: Vec<Vec<Value>>) -> Self {
        Self {
            schema,
            data,
            records_affected: 0,
        }
    }

    /// Fill in affinities left unknown at build time from the first row's
    /// values.
    pub fn post_process(mut self) -> Self {
        if let Some(first) = self.data.first() {
            for (column, value) in self.schema.iter_mut().zip(first) {
                if column.affinity.is_none() {
                    column.affinity = ColumnAffinity::of_storage_class(value.natural_class());
                }
            }
        }
        self
    }

    pub fn column_count(&self) -> usize {
        self.schema.len()
    }

    pub fn row_count(&self) -> usize {
        self.data.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema.iter().map(|column| column.name.as_str()).collect()
    }

    /// Uppercase storage-class display name of column `index`.
    pub fn column_type_name(&self, index: usize) -> Option<&'static str> {
        self.schema
            .get(index)
            .map(|column| column.affinity.unwrap_or(ColumnAffinity::Blob).type_name())
    }
}

/// Outcome of one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecResult {
    Affected(usize),
    Query(QueryResult),
}

impl ExecResult {
    pub fn records_affected(&self) -> usize {
        match self {
            ExecResult::Affected(count) => *count,
            ExecResult::Query(result) => result.records_affected,
        }
    }

    pub fn into_query(self) -> Option<QueryResult> {
        match self {
            ExecResult::Query(result) => Some(result),
            ExecResult::Affected(_) => None,
        }
    }
}
