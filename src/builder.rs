//! Lowers parse trees into IR.
//!
//! The builder resolves every name against the tables in scope, binds
//! parameters, types function calls and materializes uncorrelated
//! subqueries. DDL has no IR form and is applied to the database directly.

use crate::ast;
use crate::boolean::{conjoin, disjoin};
use crate::config::EngineConfig;
use crate::engine::Params;
use crate::error::{Error, Result};
use crate::eval::{evaluate, Context};
use crate::executor::execute_select;
use crate::ir::{
    AggregateFunction, BinaryOperator, ColumnDefinition, CompoundSelect, DeleteStmt, Expr,
    InsertStmt, OrderKey, OrderTerm, QueryResult, ResultColumn, ScalarFunction, SelectBody,
    SelectCore, SelectStmt, Source, Statement, UnaryOperator, UpdateStmt, ValuesTable,
};
use crate::storage::{ColumnHeader, Database, Table};
use crate::types::{coerce, format_real, is_numeric, literal_text, ColumnAffinity, Value};
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;

/// Where an expression appears. Aggregates are only legal in grouped clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause {
    Row,
    Grouped,
}

/// Stack of result-column alias frames.
///
/// Aliases are written into the top frame while its SELECT list is built and
/// become visible only once the frame is committed, so a sibling expression
/// in the same SELECT list cannot see them. Frames must be closed in LIFO
/// order.
#[derive(Debug, Default)]
pub struct AliasScopes {
    frames: Vec<AliasFrame>,
}

#[derive(Debug, Default)]
struct AliasFrame {
    aliases: Vec<(String, Expr)>,
    committed: bool,
}

/// Handle for an open alias frame.
#[derive(Debug, PartialEq, Eq)]
#[must_use]
pub struct ScopeToken(usize);

impl AliasScopes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn open(&mut self) -> ScopeToken {
        self.frames.push(AliasFrame::default());
        ScopeToken(self.frames.len() - 1)
    }

    /// Stage an alias in the top frame.
    pub fn define(&mut self, name: &str, expr: Expr) -> Result<()> {
        match self.frames.last_mut() {
            Some(frame) if !frame.committed => {
                frame.aliases.push((name.to_string(), expr));
                Ok(())
            }
            Some(_) => Err(Error::invariant(format!("alias {} defined in a committed scope", name))),
            None => Err(Error::invariant(format!("alias {} defined with no open scope", name))),
        }
    }

    /// Make the frame's aliases visible to lookups.
    pub fn commit(&mut self, token: &ScopeToken) -> Result<()> {
        self.check_top(token, "committed")?;
        if let Some(frame) = self.frames.get_mut(token.0) {
            frame.committed = true;
        }
        Ok(())
    }

    pub fn close(&mut self, token: ScopeToken) -> Result<()> {
        self.check_top(&token, "closed")?;
        self.frames.pop();
        Ok(())
    }

    fn check_top(&self, token: &ScopeToken, action: &str) -> Result<()> {
        if token.0 + 1 == self.frames.len() {
            Ok(())
        } else {
            Err(Error::invariant(format!(
                "alias scope {} {} out of order with {} scopes open",
                token.0,
                action,
                self.frames.len()
            )))
        }
    }

    /// Committed alias by name, innermost frame first. Aliases of an
    /// enclosing SELECT that read its columns are not visible further in.
    pub fn lookup(&self, name: &str) -> Option<&Expr> {
        let top = self.frames.len().checked_sub(1)?;
        self.frames
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, frame)| frame.committed)
            .flat_map(|(depth, frame)| frame.aliases.iter().map(move |alias| (depth, alias)))
            .find(|(_, (alias, _))| alias.eq_ignore_ascii_case(name))
            .filter(|(depth, (_, expr))| *depth == top || expr.referenced_slots().is_empty())
            .map(|(_, (_, expr))| expr)
    }
}

/// Tables visible while resolving the column references of one statement.
#[derive(Debug, Clone, Default)]
pub struct TableScope {
    entries: Vec<ScopeEntry>,
    /// Columns named in `USING`, resolved to their left-hand side.
    merged: Vec<(String, Expr)>,
}

#[derive(Debug, Clone)]
struct ScopeEntry {
    slot: usize,
    table: String,
    alias: Option<String>,
    columns: Vec<ColumnHeader>,
}

impl ScopeEntry {
    fn visible_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    fn column(&self, name: &str) -> Option<&ColumnHeader> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

impl TableScope {
    pub fn single(table: &Table) -> Self {
        let mut scope = Self::default();
        scope.push(table, None);
        scope
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, table: &Table, alias: Option<&ast::Ident>) {
        self.entries.push(ScopeEntry {
            slot: self.entries.len(),
            table: table.name().to_string(),
            alias: alias.map(|a| a.value.clone()),
            columns: table.columns().to_vec(),
        });
    }

    fn entry(&self, name: &str) -> Option<&ScopeEntry> {
        self.entries.iter().find(|e| e.visible_name().eq_ignore_ascii_case(name))
    }

    fn find_in(&self, range: Range<usize>, name: &str) -> Option<Expr> {
        self.entries[range]
            .iter()
            .find_map(|e| e.column(name).map(|h| Expr::column(e.slot, h.clone())))
    }

    fn sources(&self) -> Vec<Source> {
        self.entries
            .iter()
            .map(|e| Source {
                table: e.table.clone(),
                alias: e.alias.clone(),
            })
            .collect()
    }
}

pub struct Builder<'a> {
    db: &'a mut Database,
    params: &'a Params,
    config: &'a EngineConfig,
    scopes: AliasScopes,
    next_positional: usize,
}

impl<'a> Builder<'a> {
    pub fn new(db: &'a mut Database, params: &'a Params, config: &'a EngineConfig) -> Self {
        Self {
            db,
            params,
            config,
            scopes: AliasScopes::new(),
            next_positional: 0,
        }
    }

    /// Lower one statement. DDL is applied immediately and yields `None`.
    pub fn build(&mut self, statement: &ast::Statement) -> Result<Option<Statement>> {
        let built = match statement {
            ast::Statement::CreateTable(create) => {
                self.create_table(create)?;
                None
            }
            ast::Statement::DropTable(drop) => {
                self.drop_table(drop)?;
                None
            }
            ast::Statement::Insert(insert) => Some(Statement::Insert(self.build_insert(insert)?)),
            ast::Statement::Update(update) => Some(Statement::Update(self.build_update(update)?)),
            ast::Statement::Delete(delete) => Some(Statement::Delete(self.build_delete(delete)?)),
            ast::Statement::Select(select) => Some(Statement::Select(self.build_select(select)?)),
        };
        if self.scopes.depth() != 0 {
            return Err(Error::invariant(format!("{} alias scopes left open", self.scopes.depth())));
        }
        Ok(built)
    }

    fn create_table(&mut self, create: &ast::CreateTable) -> Result<()> {
        let name = create.name.base();
        if self.db.contains(name) {
            if create.if_not_exists {
                debug!(table = name, "table already exists, skipping create");
                return Ok(());
            }
            return Err(Error::TableExists { name: name.to_string() });
        }

        let mut table_key: Option<&str> = None;
        for constraint in &create.constraints {
            if let ast::TableConstraint::PrimaryKey(columns) = constraint {
                if table_key.is_some() {
                    return Err(more_than_one_primary_key(name));
                }
                table_key = match columns.as_slice() {
                    [column] => Some(column.value.as_str()),
                    _ => Some(""),
                };
            }
        }

        let mut columns = Vec::with_capacity(create.columns.len());
        let mut has_key = table_key.is_some();
        for (index, def) in create.columns.iter().enumerate() {
            let column_name = def.name.value.as_str();
            if create.columns[..index]
                .iter()
                .any(|other| other.name.value.eq_ignore_ascii_case(column_name))
            {
                return Err(Error::Syntax {
                    near: column_name.to_string(),
                    detail: "duplicate column name".to_string(),
                });
            }
            let affinity = ColumnAffinity::from_type_name(def.type_name.as_deref());
            let mut header = ColumnHeader::new(index, name, column_name, affinity);

            let column_key = def
                .constraints
                .iter()
                .any(|c| matches!(c, ast::ColumnConstraint::PrimaryKey { .. }));
            if column_key {
                if has_key {
                    return Err(more_than_one_primary_key(name));
                }
                has_key = true;
            }
            let keyed = column_key || table_key.is_some_and(|key| key.eq_ignore_ascii_case(column_name));
            let integer_type = def
                .type_name
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case("INTEGER"));
            if keyed && integer_type {
                header = header.autoincrement();
            }

            for constraint in &def.constraints {
                if let ast::ColumnConstraint::Default(expr) = constraint {
                    header = header.with_default(self.constant(expr)?);
                }
            }
            columns.push(header);
        }

        self.db.create_table(Table::new(name, columns))?;
        debug!(table = name, columns = create.columns.len(), "created table");
        Ok(())
    }

    fn drop_table(&mut self, drop: &ast::DropTable) -> Result<()> {
        let name = drop.name.base();
        if !self.db.contains(name) && drop.if_exists {
            return Ok(());
        }
        self.db.remove(name)?;
        debug!(table = name, "dropped table");
        Ok(())
    }

    fn build_insert(&mut self, insert: &ast::Insert) -> Result<InsertStmt> {
        let (table, columns) = {
            let table = self.db.get(insert.table.base())?;
            let columns = if insert.columns.is_empty() {
                (0..table.columns().len()).collect()
            } else {
                insert
                    .columns
                    .iter()
                    .map(|ident| {
                        table
                            .column(&ident.value)
                            .map(|header| header.index)
                            .ok_or_else(|| Error::column_not_found(ident.value.as_str()))
                    })
                    .collect::<Result<Vec<_>>>()?
            };
            (table.name().to_string(), columns)
        };

        let rows = match &insert.source {
            ast::InsertSource::Values(rows) => {
                let scope = TableScope::default();
                let mut built = Vec::with_capacity(rows.len());
                for row in rows {
                    let cells = row
                        .iter()
                        .map(|cell| self.build_expr(cell, &scope, Clause::Row))
                        .collect::<Result<Vec<_>>>()?;
                    built.push(cells);
                }
                built
            }
            ast::InsertSource::Select(select) => self
                .materialize(select)?
                .data
                .into_iter()
                .map(|row| row.into_iter().map(Expr::Bind).collect())
                .collect(),
        };

        Ok(InsertStmt {
            table,
            columns,
            values: ValuesTable { rows },
        })
    }

    fn build_update(&mut self, update: &ast::Update) -> Result<UpdateStmt> {
        let (name, scope, indices) = {
            let table = self.db.get(update.table.base())?;
            let indices = update
                .assignments
                .iter()
                .map(|assignment| {
                    table
                        .column(&assignment.column.value)
                        .map(|header| header.index)
                        .ok_or_else(|| Error::column_not_found(assignment.column.value.as_str()))
                })
                .collect::<Result<Vec<_>>>()?;
            (table.name().to_string(), TableScope::single(table), indices)
        };

        let mut assignments = Vec::with_capacity(indices.len());
        for (index, assignment) in indices.into_iter().zip(&update.assignments) {
            assignments.push((index, self.build_expr(&assignment.value, &scope, Clause::Row)?));
        }
        let filter = self.build_filter(update.selection.as_ref(), &scope)?;
        Ok(UpdateStmt {
            table: name,
            assignments,
            filter,
        })
    }

    fn build_delete(&mut self, delete: &ast::Delete) -> Result<DeleteStmt> {
        let (name, scope) = {
            let table = self.db.get(delete.table.base())?;
            (table.name().to_string(), TableScope::single(table))
        };
        let filter = self.build_filter(delete.selection.as_ref(), &scope)?;
        Ok(DeleteStmt { table: name, filter })
    }

    fn build_filter(&mut self, selection: Option<&ast::Expr>, scope: &TableScope) -> Result<Option<Expr>> {
        selection
            .map(|expr| self.build_expr(expr, scope, Clause::Row))
            .transpose()
    }

    pub fn build_select(&mut self, select: &ast::Select) -> Result<SelectStmt> {
        if select.compounds.is_empty() {
            let (core, order_by) = self.build_core(select, &select.order_by)?;
            return Ok(SelectStmt {
                body: SelectBody::Core(Box::new(core)),
                order_by,
                limit: self.build_limit(select.limit.as_ref())?,
                offset: self.build_limit(select.offset.as_ref())?,
            });
        }

        let (first, _) = self.build_core(select, &[])?;
        let names: Vec<String> = first.result_columns.iter().map(|c| c.name.clone()).collect();
        let mut body = SelectBody::Core(Box::new(first));
        for arm in &select.compounds {
            let (core, _) = self.build_core(&arm.select, &[])?;
            body = SelectBody::Compound(Box::new(CompoundSelect {
                op: arm.operator,
                left: body,
                right: SelectBody::Core(Box::new(core)),
            }));
        }

        let order_by = select
            .order_by
            .iter()
            .enumerate()
            .map(|(position, term)| {
                output_position(&term.expr, &names)
                    .map(|index| OrderTerm {
                        key: OrderKey::Output(index),
                        descending: term.asc == Some(false),
                    })
                    .ok_or_else(|| Error::SchemaIncompatible {
                        detail: format!(
                            "{} ORDER BY term does not match any column in the result set",
                            ordinal(position + 1)
                        ),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SelectStmt {
            body,
            order_by,
            limit: self.build_limit(select.limit.as_ref())?,
            offset: self.build_limit(select.offset.as_ref())?,
        })
    }

    fn build_limit(&mut self, expr: Option<&ast::Expr>) -> Result<Option<Expr>> {
        let scope = TableScope::default();
        expr.map(|expr| self.build_expr(expr, &scope, Clause::Row))
            .transpose()
    }

    fn build_core(&mut self, select: &ast::Select, order_by: &[ast::OrderByExpr]) -> Result<(SelectCore, Vec<OrderTerm>)> {
        let mut scope = TableScope::default();
        let mut on_conditions = Vec::new();
        let mut join_conditions = Vec::new();
        for table_ref in &select.from {
            self.add_source(table_ref, &mut scope, &mut on_conditions, &mut join_conditions)?;
        }

        let frame = self.scopes.open();
        let mut result_columns = Vec::with_capacity(select.projection.len());
        for item in &select.projection {
            match item {
                ast::SelectItem::Wildcard => {
                    if scope.is_empty() {
                        return Err(Error::Syntax {
                            near: "*".to_string(),
                            detail: "no tables specified".to_string(),
                        });
                    }
                    for entry in &scope.entries {
                        result_columns.extend(entry.columns.iter().map(|h| column_result(entry.slot, h)));
                    }
                }
                ast::SelectItem::QualifiedWildcard(name) => {
                    let entry = scope
                        .entry(name.base())
                        .ok_or_else(|| Error::table_not_found(name.base()))?;
                    result_columns.extend(entry.columns.iter().map(|h| column_result(entry.slot, h)));
                }
                ast::SelectItem::Expr { expr, alias, text } => {
                    let built = self.build_expr(expr, &scope, Clause::Grouped)?;
                    let (name, affinity) = match (&built, alias) {
                        (_, Some(alias)) => (alias.value.clone(), built.column_affinity()),
                        (Expr::Column(column), None) => (column.header.name.clone(), Some(column.header.affinity)),
                        (_, None) => (text.clone(), None),
                    };
                    if let Some(alias) = alias {
                        self.scopes.define(&alias.value, built.clone())?;
                    }
                    result_columns.push(ResultColumn {
                        expr: built,
                        name,
                        affinity,
                    });
                }
            }
        }
        self.scopes.commit(&frame)?;

        for condition in on_conditions {
            join_conditions.push(self.build_expr(condition, &scope, Clause::Row)?);
        }
        if let Some(filter) = self.build_filter(select.selection.as_ref(), &scope)? {
            join_conditions.push(filter);
        }
        let filter = conjoin(join_conditions);

        let mut group_by = Vec::with_capacity(select.group_by.len());
        for term in &select.group_by {
            let built = match output_ordinal(term, result_columns.len()) {
                Some(index) => result_columns[index].expr.clone(),
                None => self.build_expr(term, &scope, Clause::Row)?,
            };
            group_by.push(built);
        }
        let having = select
            .having
            .as_ref()
            .map(|expr| self.build_expr(expr, &scope, Clause::Grouped))
            .transpose()?;

        let mut terms = Vec::with_capacity(order_by.len());
        for term in order_by {
            let key = match &term.expr {
                ast::Expr::Literal(ast::Literal::Number(text)) if text.parse::<usize>().is_ok() => {
                    let index = output_ordinal(&term.expr, result_columns.len()).ok_or_else(|| Error::Syntax {
                        near: text.clone(),
                        detail: format!(
                            "ORDER BY term out of range - should be between 1 and {}",
                            result_columns.len()
                        ),
                    })?;
                    OrderKey::Output(index)
                }
                expr => OrderKey::Expr(self.build_expr(expr, &scope, Clause::Grouped)?),
            };
            terms.push(OrderTerm {
                key,
                descending: term.asc == Some(false),
            });
        }
        self.scopes.close(frame)?;

        let core = SelectCore {
            sources: scope.sources(),
            result_columns,
            filter,
            group_by,
            having,
            distinct: select.distinct,
        };
        Ok((core, terms))
    }

    /// Add a FROM item to the scope. Join constraints are collected; `ON`
    /// expressions are built once the whole FROM clause is in scope.
    fn add_source<'s>(
        &mut self,
        table_ref: &'s ast::TableRef,
        scope: &mut TableScope,
        on_conditions: &mut Vec<&'s ast::Expr>,
        join_conditions: &mut Vec<Expr>,
    ) -> Result<()> {
        match table_ref {
            ast::TableRef::Named { name, alias } => {
                let table = self.db.get(name.base())?;
                scope.push(table, alias.as_ref());
                Ok(())
            }
            ast::TableRef::Join {
                left,
                right,
                operator,
                constraint,
            } => {
                let outer = match operator {
                    ast::JoinOperator::Left => Some("LEFT"),
                    ast::JoinOperator::Right => Some("RIGHT"),
                    ast::JoinOperator::Full => Some("FULL"),
                    ast::JoinOperator::Inner | ast::JoinOperator::Cross => None,
                };
                if let Some(kind) = outer {
                    return Err(Error::unsupported(format!("{} OUTER JOIN", kind)));
                }
                let left_start = scope.len();
                self.add_source(left, scope, on_conditions, join_conditions)?;
                let right_start = scope.len();
                self.add_source(right, scope, on_conditions, join_conditions)?;
                match constraint {
                    Some(ast::JoinConstraint::On(expr)) => on_conditions.push(expr),
                    Some(ast::JoinConstraint::Using(columns)) => {
                        for column in columns {
                            let name = column.value.as_str();
                            let (Some(lhs), Some(rhs)) = (
                                scope.find_in(left_start..right_start, name),
                                scope.find_in(right_start..scope.len(), name),
                            ) else {
                                return Err(Error::column_not_found(name));
                            };
                            scope.merged.push((name.to_string(), lhs.clone()));
                            join_conditions.push(Expr::binary(BinaryOperator::Eq, lhs, rhs));
                        }
                    }
                    None => {}
                }
                Ok(())
            }
        }
    }

    /// Build and evaluate an expression that may not read any row.
    fn constant(&mut self, expr: &ast::Expr) -> Result<Value> {
        let built = self.build_expr(expr, &TableScope::default(), Clause::Row)?;
        evaluate(&built, Context::Empty)
    }

    /// Build and run a nested SELECT.
    fn materialize(&mut self, select: &ast::Select) -> Result<QueryResult> {
        let stmt = self.build_select(select)?;
        execute_select(&*self.db, &stmt, self.config)
    }

    fn materialize_single_column(&mut self, select: &ast::Select) -> Result<QueryResult> {
        let result = self.materialize(select)?;
        if result.column_count() != 1 {
            return Err(Error::SchemaIncompatible {
                detail: format!("sub-select returns {} columns - expected 1", result.column_count()),
            });
        }
        Ok(result)
    }

    fn build_expr(&mut self, expr: &ast::Expr, scope: &TableScope, clause: Clause) -> Result<Expr> {
        match expr {
            ast::Expr::Identifier(ident) => self.resolve_column(scope, None, &ident.value, clause),
            ast::Expr::CompoundIdentifier(parts) => match parts.split_last() {
                Some((column, qualifier)) => {
                    let qualifier = qualifier.last().map(|q| q.value.as_str());
                    self.resolve_column(scope, qualifier, &column.value, clause)
                }
                None => Err(Error::invariant("empty compound identifier")),
            },
            ast::Expr::Literal(literal) => Ok(Expr::Literal(literal_spelling(literal))),
            ast::Expr::Parameter(token) => Ok(Expr::Bind(self.bind(token)?)),
            ast::Expr::BinaryOp { left, op, right } => {
                let (op, negated) = binary_operator(*op);
                let left = self.build_expr(left, scope, clause)?;
                let right = self.build_expr(right, scope, clause)?;
                let built = Expr::binary(op, left, right);
                Ok(if negated { Expr::not(built) } else { built })
            }
            ast::Expr::UnaryOp { op, expr } => {
                if let (ast::UnaryOperator::Minus, ast::Expr::Literal(ast::Literal::Number(text))) = (op, expr.as_ref()) {
                    return Ok(Expr::Literal(format!("-{}", number_spelling(text))));
                }
                let op = match op {
                    ast::UnaryOperator::Plus => UnaryOperator::Plus,
                    ast::UnaryOperator::Minus => UnaryOperator::Negate,
                    ast::UnaryOperator::Not => UnaryOperator::Not,
                    ast::UnaryOperator::BitNot => UnaryOperator::BitNot,
                };
                Ok(Expr::Unary {
                    op,
                    operand: Box::new(self.build_expr(expr, scope, clause)?),
                })
            }
            ast::Expr::Function { name, args, distinct } => {
                self.build_function(&name.value, args, *distinct, scope, clause)
            }
            ast::Expr::Case {
                operand,
                when_then,
                else_result,
            } => {
                let operand = match operand {
                    Some(operand) => Some(Box::new(self.build_expr(operand, scope, clause)?)),
                    None => None,
                };
                let mut branches = Vec::with_capacity(when_then.len());
                for (when, then) in when_then {
                    branches.push((self.build_expr(when, scope, clause)?, self.build_expr(then, scope, clause)?));
                }
                let otherwise = match else_result {
                    Some(otherwise) => Some(Box::new(self.build_expr(otherwise, scope, clause)?)),
                    None => None,
                };
                Ok(Expr::Case {
                    operand,
                    branches,
                    otherwise,
                })
            }
            ast::Expr::Between {
                expr,
                negated,
                low,
                high,
            } => {
                let needle = self.build_expr(expr, scope, clause)?;
                let low = self.build_expr(low, scope, clause)?;
                let high = self.build_expr(high, scope, clause)?;
                let range = Expr::binary(
                    BinaryOperator::And,
                    Expr::binary(BinaryOperator::GtEq, needle.clone(), low),
                    Expr::binary(BinaryOperator::LtEq, needle, high),
                );
                Ok(if *negated { Expr::not(range) } else { range })
            }
            ast::Expr::InList { expr, list, negated } => {
                let needle = self.build_expr(expr, scope, clause)?;
                let items = list
                    .iter()
                    .map(|item| self.build_expr(item, scope, clause))
                    .collect::<Result<Vec<_>>>()?;
                let membership = membership(needle, items)?;
                Ok(if *negated { Expr::not(membership) } else { membership })
            }
            ast::Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                let needle = self.build_expr(expr, scope, clause)?;
                let haystack = self.materialize_single_column(subquery)?;
                let membership = Expr::In {
                    needle: Box::new(needle),
                    haystack: Arc::new(haystack),
                };
                Ok(if *negated { Expr::not(membership) } else { membership })
            }
            ast::Expr::Subquery(select) => {
                let result = self.materialize_single_column(select)?;
                let value = result
                    .data
                    .into_iter()
                    .next()
                    .and_then(|row| row.into_iter().next())
                    .unwrap_or(Value::Null);
                Ok(Expr::Bind(value))
            }
            ast::Expr::IsNull { expr, negated } => {
                let op = if *negated {
                    BinaryOperator::IsNot
                } else {
                    BinaryOperator::Is
                };
                let operand = self.build_expr(expr, scope, clause)?;
                Ok(Expr::binary(op, operand, Expr::Literal("NULL".to_string())))
            }
            ast::Expr::Cast { expr, type_name } => Ok(Expr::Cast {
                expr: Box::new(self.build_expr(expr, scope, clause)?),
                affinity: ColumnAffinity::from_type_name(Some(type_name)),
            }),
            ast::Expr::Nested(inner) => self.build_expr(inner, scope, clause),
            ast::Expr::Wildcard => Err(Error::Syntax {
                near: "*".to_string(),
                detail: "wildcard is only allowed in count(*)".to_string(),
            }),
        }
    }

    fn build_function(
        &mut self,
        name: &str,
        args: &[ast::Expr],
        distinct: bool,
        scope: &TableScope,
        clause: Clause,
    ) -> Result<Expr> {
        let aggregate = AggregateFunction::lookup(name).filter(|function| {
            !(matches!(function, AggregateFunction::Max | AggregateFunction::Min) && args.len() > 1)
        });
        if let Some(function) = aggregate {
            if clause != Clause::Grouped {
                return Err(Error::MisusedAggregate {
                    function: function.name().to_string(),
                });
            }
            let args = match (function, args) {
                (AggregateFunction::Count, [] | [ast::Expr::Wildcard]) if !distinct => Vec::new(),
                (_, [arg]) => vec![self.build_expr(arg, scope, Clause::Row)?],
                _ => {
                    return Err(Error::WrongArgumentCount {
                        function: function.name().to_string(),
                    })
                }
            };
            return Ok(Expr::Aggregate {
                function,
                args,
                distinct,
            });
        }

        let function = ScalarFunction::lookup(name).ok_or_else(|| Error::UnknownFunction {
            name: name.to_string(),
        })?;
        if distinct {
            return Err(Error::unsupported(format!("DISTINCT in {}()", function.name())));
        }
        if !function.accepts(args.len()) {
            return Err(Error::WrongArgumentCount {
                function: function.name().to_string(),
            });
        }
        let args = args
            .iter()
            .map(|arg| self.build_expr(arg, scope, clause))
            .collect::<Result<Vec<_>>>()?;
        Ok(Expr::Scalar { function, args })
    }

    /// Resolve a column reference: qualified names by table or alias,
    /// unqualified names by the unique table owning them, then by
    /// committed result alias.
    fn resolve_column(&self, scope: &TableScope, qualifier: Option<&str>, name: &str, clause: Clause) -> Result<Expr> {
        if let Some(qualifier) = qualifier {
            let qualified = || Error::column_not_found(format!("{}.{}", qualifier, name));
            let entry = scope.entry(qualifier).ok_or_else(qualified)?;
            let header = entry.column(name).ok_or_else(qualified)?;
            return Ok(Expr::column(entry.slot, header.clone()));
        }

        let mut owners = scope
            .entries
            .iter()
            .filter_map(|entry| entry.column(name).map(|header| (entry.slot, header)));
        match (owners.next(), owners.next()) {
            (Some((slot, header)), None) => Ok(Expr::column(slot, header.clone())),
            (Some(_), Some(_)) => scope
                .merged
                .iter()
                .find(|(merged, _)| merged.eq_ignore_ascii_case(name))
                .map(|(_, expr)| expr.clone())
                .ok_or_else(|| Error::AmbiguousColumn { name: name.to_string() }),
            (None, _) => {
                let aliased = self
                    .scopes
                    .lookup(name)
                    .ok_or_else(|| Error::column_not_found(name))?;
                if clause == Clause::Row {
                    if let Some(function) = first_aggregate(aliased) {
                        return Err(Error::MisusedAggregate {
                            function: function.name().to_string(),
                        });
                    }
                }
                Ok(aliased.clone())
            }
        }
    }

    /// Resolve a parameter token against the caller's parameters.
    fn bind(&mut self, token: &str) -> Result<Value> {
        let found = if token == "?" {
            self.next_positional += 1;
            self.params.positional(self.next_positional - 1)
        } else if let Some(number) = token.strip_prefix('?') {
            let number = number.parse::<usize>().ok().filter(|n| *n > 0);
            if let Some(number) = number {
                self.next_positional = self.next_positional.max(number);
            }
            number.and_then(|n| self.params.positional(n - 1))
        } else {
            self.params.named(token)
        };
        found.cloned().ok_or_else(|| Error::ParameterNotFound {
            name: token.to_string(),
        })
    }
}

impl Expr {
    fn column_affinity(&self) -> Option<ColumnAffinity> {
        match self {
            Expr::Column(column) => Some(column.header.affinity),
            _ => None,
        }
    }
}

fn column_result(slot: usize, header: &ColumnHeader) -> ResultColumn {
    ResultColumn {
        expr: Expr::column(slot, header.clone()),
        name: header.name.clone(),
        affinity: Some(header.affinity),
    }
}

/// `needle IN (items)`. Constant lists are materialized with the needle's
/// column affinity applied; lists that read columns become an OR chain.
fn membership(needle: Expr, items: Vec<Expr>) -> Result<Expr> {
    let constant = items
        .iter()
        .all(|item| item.referenced_slots().is_empty() && !item.contains_aggregate());
    if !constant {
        let equalities = items
            .into_iter()
            .map(|item| Expr::binary(BinaryOperator::Eq, needle.clone(), item));
        return Ok(disjoin(equalities).unwrap_or_else(|| Expr::Literal("0".to_string())));
    }

    let affinity = needle.column_affinity();
    let mut data = Vec::with_capacity(items.len());
    for item in &items {
        let value = evaluate(item, Context::Empty)?;
        data.push(vec![match affinity {
            Some(affinity) => coerce(value, affinity),
            None => value,
        }]);
    }
    let schema = vec![ColumnDefinition {
        name: "value".to_string(),
        affinity,
    }];
    Ok(Expr::In {
        needle: Box::new(needle),
        haystack: Arc::new(QueryResult::new(schema, data)),
    })
}

fn binary_operator(op: ast::BinaryOperator) -> (BinaryOperator, bool) {
    use ast::BinaryOperator as A;
    match op {
        A::Plus => (BinaryOperator::Add, false),
        A::Minus => (BinaryOperator::Subtract, false),
        A::Multiply => (BinaryOperator::Multiply, false),
        A::Divide => (BinaryOperator::Divide, false),
        A::Modulo => (BinaryOperator::Modulo, false),
        A::And => (BinaryOperator::And, false),
        A::Or => (BinaryOperator::Or, false),
        A::Eq => (BinaryOperator::Eq, false),
        A::NotEq => (BinaryOperator::NotEq, false),
        A::Lt => (BinaryOperator::Lt, false),
        A::LtEq => (BinaryOperator::LtEq, false),
        A::Gt => (BinaryOperator::Gt, false),
        A::GtEq => (BinaryOperator::GtEq, false),
        A::Like => (BinaryOperator::Like, false),
        A::NotLike => (BinaryOperator::Like, true),
        A::Glob => (BinaryOperator::Glob, false),
        A::NotGlob => (BinaryOperator::Glob, true),
        A::Regexp => (BinaryOperator::Regexp, false),
        A::NotRegexp => (BinaryOperator::Regexp, true),
        A::Match => (BinaryOperator::Match, false),
        A::NotMatch => (BinaryOperator::Match, true),
        A::Is => (BinaryOperator::Is, false),
        A::IsNot => (BinaryOperator::IsNot, false),
        A::Concat => (BinaryOperator::Concat, false),
        A::BitAnd => (BinaryOperator::BitAnd, false),
        A::BitOr => (BinaryOperator::BitOr, false),
        A::ShiftLeft => (BinaryOperator::ShiftLeft, false),
        A::ShiftRight => (BinaryOperator::ShiftRight, false),
    }
}

fn literal_spelling(literal: &ast::Literal) -> String {
    match literal {
        ast::Literal::Null => "NULL".to_string(),
        ast::Literal::Number(text) => number_spelling(text),
        ast::Literal::String(text) => literal_text(&Value::Text(text.clone())),
        ast::Literal::Boolean(true) => "TRUE".to_string(),
        ast::Literal::Boolean(false) => "FALSE".to_string(),
        ast::Literal::Blob(bytes) => literal_text(&Value::Blob(bytes.clone())),
    }
}

/// Canonical spelling for numerals the literal grammar rejects, such as `007`.
fn number_spelling(text: &str) -> String {
    if is_numeric(text) {
        return text.to_string();
    }
    if let Ok(int) = text.parse::<i64>() {
        return int.to_string();
    }
    match text.parse::<f64>() {
        Ok(real) => format_real(real),
        Err(_) => text.to_string(),
    }
}

/// Zero-based result column named by a positional `ORDER BY`/`GROUP BY` term.
fn output_ordinal(expr: &ast::Expr, width: usize) -> Option<usize> {
    match expr {
        ast::Expr::Literal(ast::Literal::Number(text)) => text
            .parse::<usize>()
            .ok()
            .filter(|n| (1..=width).contains(n))
            .map(|n| n - 1),
        _ => None,
    }
}

/// Result column a compound `ORDER BY` term refers to, by position or name.
fn output_position(expr: &ast::Expr, names: &[String]) -> Option<usize> {
    let by_name = |name: &str| names.iter().position(|n| n.eq_ignore_ascii_case(name));
    match expr {
        ast::Expr::Identifier(ident) => by_name(&ident.value),
        ast::Expr::CompoundIdentifier(parts) => parts.last().and_then(|ident| by_name(&ident.value)),
        ast::Expr::Nested(inner) => output_position(inner, names),
        other => output_ordinal(other, names.len()),
    }
}

fn first_aggregate(expr: &Expr) -> Option<AggregateFunction> {
    let mut found = None;
    expr.walk(&mut |node| {
        if let (None, Expr::Aggregate { function, .. }) = (found, node) {
            found = Some(*function);
        }
    });
    found
}

fn more_than_one_primary_key(table: &str) -> Error {
    Error::Syntax {
        near: table.to_string(),
        detail: "table has more than one primary key".to_string(),
    }
}

fn ordinal(n: usize) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}
