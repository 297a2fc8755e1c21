//! Parse tree produced by [`crate::parser`].
//!
//! These types are plain data. They carry identifiers and literal spellings as
//! written; name resolution and typing happen in [`crate::builder`].
//!
//! # Examples
//! ```no_run
//! use affinitydb::ast::{Ident, ObjectName, Statement};
//! use affinitydb::parser::parse_statement;
//!
//! let stmt = parse_statement("CREATE TABLE t(id INTEGER)").unwrap();
//! match stmt {
//!     Statement::CreateTable(create) => {
//!         assert_eq!(create.name, ObjectName::new([Ident::new("t")]));
//!     }
//!     _ => unreachable!("expected create table"),
//! }
//! ```

#[derive(Debug, Clone, PartialEq)]
/// Top-level SQL statement variants.
pub enum Statement {
    /// CREATE TABLE statement.
    CreateTable(CreateTable),
    /// DROP TABLE statement.
    DropTable(DropTable),
    /// INSERT statement.
    Insert(Insert),
    /// UPDATE statement.
    Update(Update),
    /// DELETE statement.
    Delete(Delete),
    /// SELECT statement, possibly compound.
    Select(Select),
}

impl Statement {
    /// Short statement name used in log records.
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::CreateTable(_) => "CREATE TABLE",
            Statement::DropTable(_) => "DROP TABLE",
            Statement::Insert(_) => "INSERT",
            Statement::Update(_) => "UPDATE",
            Statement::Delete(_) => "DELETE",
            Statement::Select(_) => "SELECT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// CREATE TABLE statement.
pub struct CreateTable {
    /// Whether IF NOT EXISTS was specified.
    pub if_not_exists: bool,
    /// Table name.
    pub name: ObjectName,
    /// Column definitions.
    pub columns: Vec<ColumnDef>,
    /// Table-level constraints.
    pub constraints: Vec<TableConstraint>,
}

#[derive(Debug, Clone, PartialEq)]
/// DROP TABLE statement.
pub struct DropTable {
    /// Whether IF EXISTS was specified.
    pub if_exists: bool,
    /// Table name.
    pub name: ObjectName,
}

#[derive(Debug, Clone, PartialEq)]
/// INSERT statement.
pub struct Insert {
    /// Target table name.
    pub table: ObjectName,
    /// Target columns list; empty means every column in declaration order.
    pub columns: Vec<Ident>,
    /// Source for inserted rows.
    pub source: InsertSource,
}

#[derive(Debug, Clone, PartialEq)]
/// Source of data for INSERT.
pub enum InsertSource {
    /// VALUES clause.
    Values(Vec<Vec<Expr>>),
    /// INSERT ... SELECT.
    Select(Box<Select>),
}

#[derive(Debug, Clone, PartialEq)]
/// UPDATE statement.
pub struct Update {
    /// Target table name.
    pub table: ObjectName,
    /// Column assignments.
    pub assignments: Vec<Assignment>,
    /// Optional WHERE clause.
    pub selection: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
/// DELETE statement.
pub struct Delete {
    /// Target table name.
    pub table: ObjectName,
    /// Optional WHERE clause.
    pub selection: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
/// Column assignment in UPDATE.
pub struct Assignment {
    /// Column being assigned.
    pub column: Ident,
    /// Expression assigned to the column.
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
/// SELECT statement.
///
/// A compound statement keeps its first arm inline and the remaining arms in
/// `compounds`, left to right. `order_by`, `limit` and `offset` always belong
/// to the whole statement; compound arms leave them empty.
pub struct Select {
    /// Whether DISTINCT was specified.
    pub distinct: bool,
    /// Projection list.
    pub projection: Vec<SelectItem>,
    /// FROM clause.
    pub from: Vec<TableRef>,
    /// Optional WHERE clause.
    pub selection: Option<Expr>,
    /// GROUP BY clause expressions.
    pub group_by: Vec<Expr>,
    /// Optional HAVING clause.
    pub having: Option<Expr>,
    /// ORDER BY expressions.
    pub order_by: Vec<OrderByExpr>,
    /// Optional LIMIT expression.
    pub limit: Option<Expr>,
    /// Optional OFFSET expression.
    pub offset: Option<Expr>,
    /// Compound SELECTs (UNION/INTERSECT/EXCEPT).
    pub compounds: Vec<CompoundSelect>,
}

#[derive(Debug, Clone, PartialEq)]
/// Item in SELECT projection.
pub enum SelectItem {
    /// Expression with an optional alias and its source spelling.
    Expr {
        expr: Expr,
        alias: Option<Ident>,
        text: String,
    },
    /// Wildcard projection (`*`).
    Wildcard,
    /// Qualified wildcard (`table.*`).
    QualifiedWildcard(ObjectName),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Compound operator between SELECTs.
pub enum CompoundOperator {
    /// UNION operator.
    Union,
    /// UNION ALL operator.
    UnionAll,
    /// INTERSECT operator.
    Intersect,
    /// EXCEPT operator.
    Except,
}

impl CompoundOperator {
    /// SQL spelling used in error messages.
    pub fn keyword(self) -> &'static str {
        match self {
            CompoundOperator::Union => "UNION",
            CompoundOperator::UnionAll => "UNION ALL",
            CompoundOperator::Intersect => "INTERSECT",
            CompoundOperator::Except => "EXCEPT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Compound SELECT entry.
pub struct CompoundSelect {
    /// Operator between SELECTs.
    pub operator: CompoundOperator,
    /// SELECT being combined.
    pub select: Box<Select>,
}

#[derive(Debug, Clone, PartialEq)]
/// Table reference in FROM clause.
pub enum TableRef {
    /// Named table reference.
    Named { name: ObjectName, alias: Option<Ident> },
    /// Join reference.
    Join {
        left: Box<TableRef>,
        right: Box<TableRef>,
        operator: JoinOperator,
        constraint: Option<JoinConstraint>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Join operator type.
pub enum JoinOperator {
    /// INNER JOIN.
    Inner,
    /// LEFT JOIN.
    Left,
    /// RIGHT JOIN.
    Right,
    /// FULL JOIN.
    Full,
    /// CROSS JOIN.
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
/// Join constraint clause.
pub enum JoinConstraint {
    /// ON `expr`.
    On(Expr),
    /// USING (col, ...).
    Using(Vec<Ident>),
}

#[derive(Debug, Clone, PartialEq)]
/// ORDER BY expression with optional ordering.
pub struct OrderByExpr {
    /// ORDER BY expression.
    pub expr: Expr,
    /// Optional ascending/descending indicator.
    pub asc: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
/// Expression node.
pub enum Expr {
    /// Unqualified identifier.
    Identifier(Ident),
    /// Compound identifier (`table.column`).
    CompoundIdentifier(Vec<Ident>),
    /// Literal value.
    Literal(Literal),
    /// Bound parameter token as written (`?`, `?2`, `@name`, `:name`, `$name`).
    Parameter(String),
    /// Binary operator expression.
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    /// Unary operator expression.
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expr>,
    },
    /// Function call.
    Function {
        name: Ident,
        args: Vec<Expr>,
        distinct: bool,
    },
    /// CASE expression.
    Case {
        operand: Option<Box<Expr>>,
        when_then: Vec<(Expr, Expr)>,
        else_result: Option<Box<Expr>>,
    },
    /// BETWEEN expression.
    Between {
        expr: Box<Expr>,
        negated: bool,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    /// IN (list) expression.
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// IN (subquery) expression.
    InSubquery {
        expr: Box<Expr>,
        subquery: Box<Select>,
        negated: bool,
    },
    /// Nested SELECT used as a scalar.
    Subquery(Box<Select>),
    /// IS NULL / IS NOT NULL.
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    /// CAST expression with the declared type name.
    Cast {
        expr: Box<Expr>,
        type_name: String,
    },
    /// Parenthesized expression.
    Nested(Box<Expr>),
    /// `*` as a function argument, as in `COUNT(*)`.
    Wildcard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Binary operator.
pub enum BinaryOperator {
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    NotLike,
    Glob,
    NotGlob,
    Regexp,
    NotRegexp,
    Match,
    NotMatch,
    Is,
    IsNot,
    Concat,
    BitAnd,
    BitOr,
    ShiftLeft,
    ShiftRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Unary operator.
pub enum UnaryOperator {
    Plus,
    Minus,
    Not,
    BitNot,
}

#[derive(Debug, Clone, PartialEq)]
/// Literal value, kept in its source spelling.
pub enum Literal {
    /// NULL literal.
    Null,
    /// Numeric literal text, e.g. `42`, `500.0`, `1e3`.
    Number(String),
    /// String literal with quotes removed and `''` unescaped.
    String(String),
    /// TRUE or FALSE.
    Boolean(bool),
    /// Blob literal bytes from `x'..'`.
    Blob(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Identifier with optional quoting metadata.
pub struct Ident {
    /// Raw identifier text.
    pub value: String,
    /// Whether the identifier was quoted.
    pub quoted: bool,
}

impl Ident {
    /// Create an unquoted identifier from a string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            quoted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Qualified object name (e.g. `main.table`).
pub struct ObjectName(pub Vec<Ident>);

impl ObjectName {
    /// Build an object name from an iterator of identifiers.
    pub fn new(parts: impl IntoIterator<Item = Ident>) -> Self {
        Self(parts.into_iter().collect())
    }

    /// Unqualified object name: the last part.
    pub fn base(&self) -> &str {
        self.0.last().map(|ident| ident.value.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Column definition within CREATE TABLE.
pub struct ColumnDef {
    /// Column name.
    pub name: Ident,
    /// Declared type name as written, if any.
    pub type_name: Option<String>,
    /// Column constraints.
    pub constraints: Vec<ColumnConstraint>,
}

#[derive(Debug, Clone, PartialEq)]
/// Column-level constraint.
pub enum ColumnConstraint {
    /// NOT NULL.
    NotNull,
    /// NULL.
    Null,
    /// PRIMARY KEY [AUTOINCREMENT].
    PrimaryKey { autoincrement: bool },
    /// UNIQUE.
    Unique,
    /// DEFAULT expression.
    Default(Expr),
}

#[derive(Debug, Clone, PartialEq)]
/// Table-level constraint.
pub enum TableConstraint {
    /// PRIMARY KEY constraint.
    PrimaryKey(Vec<Ident>),
    /// UNIQUE constraint.
    Unique(Vec<Ident>),
}
