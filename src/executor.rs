//! Statement execution over a [`Database`].
//!
//! A SELECT core runs in four stages: per-source pushdown filtering, an
//! incremental cartesian product pruned by equi-joins, the residual filter,
//! then either row-by-row projection or grouping. ORDER BY keys are computed
//! alongside the projection so ordering can use expressions the result
//! columns drop.

use crate::analyzer::{analyze, ConditionAnalysis};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::eval::{aggregate, evaluate, is_true, Context};
use crate::ir::{
    AggregateFunction, ColumnDefinition, CompoundOperator, CompoundSelect, ExecResult, Expr,
    OrderKey, OrderTerm, QueryResult, SelectBody, SelectCore, SelectStmt, Statement,
};
use crate::storage::{Database, Row, RowKey, Table};
use crate::types::{coerce, compare_values, ColumnAffinity, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Execute one IR statement.
pub fn execute(db: &mut Database, stmt: &Statement, config: &EngineConfig) -> Result<ExecResult> {
    match stmt {
        Statement::Insert(insert) => {
            let count = db.insert(&insert.table, &insert.columns, &insert.values)?;
            debug!(table = %insert.table, rows = count, "insert");
            Ok(ExecResult::Affected(count))
        }
        Statement::Update(update) => {
            let count = db.update(&update.table, &update.assignments, update.filter.as_ref())?;
            debug!(table = %update.table, rows = count, "update");
            Ok(ExecResult::Affected(count))
        }
        Statement::Delete(delete) => {
            let count = db.delete(&delete.table, delete.filter.as_ref())?;
            debug!(table = %delete.table, rows = count, "delete");
            Ok(ExecResult::Affected(count))
        }
        Statement::Select(select) => {
            let result = execute_select(db, select, config)?;
            debug!(rows = result.row_count(), columns = result.column_count(), "select");
            Ok(ExecResult::Query(result))
        }
    }
}

/// Run a SELECT to a fully materialized result.
pub fn execute_select(db: &Database, stmt: &SelectStmt, config: &EngineConfig) -> Result<QueryResult> {
    let mut result = match &stmt.body {
        SelectBody::Core(core) => run_core(db, core, &stmt.order_by, config)?,
        SelectBody::Compound(compound) => {
            let mut result = run_compound(db, compound, config)?;
            sort_output(&mut result.data, &stmt.order_by)?;
            result
        }
    };
    let offset = match &stmt.offset {
        Some(expr) => paging_value(expr)?.max(0) as usize,
        None => 0,
    };
    let limit = match &stmt.limit {
        Some(expr) => usize::try_from(paging_value(expr)?).ok(),
        None => None,
    };
    if offset > 0 || limit.is_some() {
        result.data = result
            .data
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect();
    }
    Ok(result.post_process())
}

fn run_body(db: &Database, body: &SelectBody, config: &EngineConfig) -> Result<QueryResult> {
    match body {
        SelectBody::Core(core) => Ok(run_core(db, core, &[], config)?.post_process()),
        SelectBody::Compound(compound) => run_compound(db, compound, config),
    }
}

/// LIMIT and OFFSET operands must evaluate to an integer.
fn paging_value(expr: &Expr) -> Result<i64> {
    match coerce(evaluate(expr, Context::Empty)?, ColumnAffinity::Integer) {
        Value::Integer(value) => Ok(value),
        other => Err(Error::type_mismatch(format!(
            "LIMIT/OFFSET requires an integer, got {}",
            other.natural_class()
        ))),
    }
}

/// One output row plus the ORDER BY keys computed for it.
struct Sortable {
    keys: Vec<Value>,
    values: Vec<Value>,
}

fn run_core(
    db: &Database,
    core: &SelectCore,
    order_by: &[OrderTerm],
    config: &EngineConfig,
) -> Result<QueryResult> {
    let tables = core
        .sources
        .iter()
        .map(|source| db.get(&source.table))
        .collect::<Result<Vec<_>>>()?;
    let analysis = analyze(core.filter.as_ref(), tables.len());
    let tuples = product(&tables, &analysis, config)?;

    let mut filtered = Vec::with_capacity(tuples.len());
    for tuple in tuples {
        let keep = match &analysis.general {
            Some(condition) => is_true(condition, Context::Tuple(&tuple))?,
            None => true,
        };
        if keep {
            filtered.push(tuple);
        }
    }
    trace!(rows = filtered.len(), "after residual filter");

    let mut rows = if core.is_aggregate(order_by) {
        group_rows(core, order_by, &filtered)?
    } else {
        let mut rows = Vec::with_capacity(filtered.len());
        for tuple in &filtered {
            rows.push(project(core, order_by, Context::Tuple(tuple))?);
        }
        rows
    };

    if !order_by.is_empty() {
        rows.sort_by(|a, b| compare_keys(&a.keys, &b.keys, order_by));
    }
    let mut data: Vec<Vec<Value>> = rows.into_iter().map(|row| row.values).collect();
    if core.distinct {
        data = dedupe(data);
    }

    let schema = core
        .result_columns
        .iter()
        .map(|column| ColumnDefinition {
            name: column.name.clone(),
            affinity: column.affinity,
        })
        .collect();
    Ok(QueryResult::new(schema, data))
}

/// Build the filtered cartesian product one source at a time. Each source is
/// narrowed by its pushed-down conditions first, and equi-joins are checked
/// as soon as both of their sources are in the tuple.
fn product<'a>(
    tables: &[&'a Table],
    analysis: &ConditionAnalysis,
    config: &EngineConfig,
) -> Result<Vec<Vec<&'a Row>>> {
    let mut tuples: Vec<Vec<&'a Row>> = vec![Vec::new()];
    for (slot, table) in tables.iter().enumerate() {
        let pushed: Vec<&Expr> = analysis.for_slot(slot).collect();
        let mut candidates = Vec::with_capacity(table.len());
        for row in table.rows() {
            let single = [row];
            if passes(&pushed, Context::Tuple(&single))? {
                candidates.push(row);
            }
        }
        trace!(
            table = table.name(),
            kept = candidates.len(),
            total = table.len(),
            "pushdown"
        );

        let joins: Vec<&Expr> = analysis
            .joins_completed_by(slot)
            .map(|join| &join.condition)
            .collect();
        let mut next = Vec::with_capacity(tuples.len().saturating_mul(candidates.len()));
        for tuple in &tuples {
            for &row in &candidates {
                let mut extended = Vec::with_capacity(tuple.len() + 1);
                extended.extend_from_slice(tuple);
                extended.push(row);
                if !passes(&joins, Context::Tuple(&extended))? {
                    continue;
                }
                if let Some(limit) = config.product_row_limit {
                    if next.len() >= limit {
                        return Err(Error::ProductTooLarge { limit });
                    }
                }
                next.push(extended);
            }
        }
        tuples = next;
    }
    trace!(sources = tables.len(), rows = tuples.len(), "cartesian product");
    Ok(tuples)
}

fn passes(conditions: &[&Expr], context: Context<'_>) -> Result<bool> {
    for condition in conditions {
        if !is_true(condition, context)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn project(core: &SelectCore, order_by: &[OrderTerm], context: Context<'_>) -> Result<Sortable> {
    let values = core
        .result_columns
        .iter()
        .map(|column| evaluate(&column.expr, context))
        .collect::<Result<Vec<_>>>()?;
    let keys = order_by
        .iter()
        .map(|term| match &term.key {
            OrderKey::Expr(expr) => evaluate(expr, context),
            OrderKey::Output(index) => values.get(*index).cloned().ok_or_else(|| {
                Error::invariant(format!("ORDER BY output column {} out of range", index + 1))
            }),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Sortable { keys, values })
}

/// Partition tuples by the GROUP BY key in first-seen order and project each
/// group that passes HAVING. Without GROUP BY every tuple forms one group,
/// which exists even when there are no tuples.
fn group_rows(core: &SelectCore, order_by: &[OrderTerm], tuples: &[Vec<&Row>]) -> Result<Vec<Sortable>> {
    let mut groups: Vec<Vec<Vec<&Row>>> = Vec::new();
    if core.group_by.is_empty() {
        groups.push(tuples.to_vec());
    } else {
        let mut index: HashMap<RowKey, usize> = HashMap::new();
        for tuple in tuples {
            let key = RowKey(
                core.group_by
                    .iter()
                    .map(|expr| evaluate(expr, Context::Tuple(tuple)))
                    .collect::<Result<Vec<_>>>()?,
            );
            let slot = *index.entry(key).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(tuple.clone());
        }
    }
    trace!(groups = groups.len(), "grouped");

    let selector = representative_selector(core, order_by);
    let mut rows = Vec::with_capacity(groups.len());
    for group in &groups {
        let representative = match selector {
            Some((function, args, distinct)) => {
                aggregate(function, args, distinct, group)?.source_row
            }
            None => None,
        }
        .or_else(|| (!group.is_empty()).then_some(0));
        let context = Context::Group {
            tuples: group,
            representative,
        };
        if let Some(having) = &core.having {
            if !is_true(having, context)? {
                continue;
            }
        }
        rows.push(project(core, order_by, context)?);
    }
    Ok(rows)
}

/// The lone MIN or MAX aggregate of a query, whose winning row supplies the
/// bare columns of each group.
fn representative_selector<'a>(
    core: &'a SelectCore,
    order_by: &'a [OrderTerm],
) -> Option<(AggregateFunction, &'a [Expr], bool)> {
    let mut found: Vec<&Expr> = Vec::new();
    let exprs = core
        .result_columns
        .iter()
        .map(|column| &column.expr)
        .chain(core.having.as_ref())
        .chain(order_by.iter().filter_map(|term| match &term.key {
            OrderKey::Expr(expr) => Some(expr),
            OrderKey::Output(_) => None,
        }));
    for expr in exprs {
        expr.walk(&mut |node| {
            if matches!(node, Expr::Aggregate { .. }) && !found.iter().any(|seen| seen.equivalent(node)) {
                found.push(node);
            }
        });
    }
    let [only] = found.as_slice() else {
        return None;
    };
    match *only {
        Expr::Aggregate {
            function: function @ (AggregateFunction::Min | AggregateFunction::Max),
            args,
            distinct,
        } => Some((*function, args.as_slice(), *distinct)),
        _ => None,
    }
}

fn compare_keys(left: &[Value], right: &[Value], order_by: &[OrderTerm]) -> Ordering {
    for ((a, b), term) in left.iter().zip(right).zip(order_by) {
        let ordering = compare_values(a, b);
        if ordering != Ordering::Equal {
            return if term.descending {
                ordering.reverse()
            } else {
                ordering
            };
        }
    }
    Ordering::Equal
}

/// ORDER BY over a compound result, where every key names an output column.
fn sort_output(data: &mut [Vec<Value>], order_by: &[OrderTerm]) -> Result<()> {
    if order_by.is_empty() {
        return Ok(());
    }
    let mut indices = Vec::with_capacity(order_by.len());
    for term in order_by {
        match term.key {
            OrderKey::Output(index) => indices.push(index),
            OrderKey::Expr(_) => {
                return Err(Error::invariant(
                    "compound ORDER BY must reference output columns",
                ))
            }
        }
    }
    let width = data.first().map_or(0, Vec::len);
    if let Some(&bad) = indices.iter().find(|&&index| index >= width && !data.is_empty()) {
        return Err(Error::invariant(format!("ORDER BY output column {} out of range", bad + 1)));
    }
    data.sort_by(|a, b| {
        let left: Vec<Value> = indices.iter().map(|&i| a[i].clone()).collect();
        let right: Vec<Value> = indices.iter().map(|&i| b[i].clone()).collect();
        compare_keys(&left, &right, order_by)
    });
    Ok(())
}

fn dedupe(rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    let mut seen = HashSet::with_capacity(rows.len());
    rows.into_iter()
        .filter(|row| seen.insert(RowKey(row.clone())))
        .collect()
}

fn run_compound(db: &Database, compound: &CompoundSelect, config: &EngineConfig) -> Result<QueryResult> {
    let left = run_body(db, &compound.left, config)?;
    let right = run_body(db, &compound.right, config)?;
    let op = compound.op;
    trace!(
        op = op.keyword(),
        left = left.row_count(),
        right = right.row_count(),
        "compound"
    );

    if left.column_count() != right.column_count() {
        return Err(Error::SchemaIncompatible {
            detail: format!(
                "SELECTs to the left and right of {} do not have the same number of result columns",
                op.keyword()
            ),
        });
    }
    if config.strict_compound_affinity {
        for (position, (l, r)) in left.schema.iter().zip(&right.schema).enumerate() {
            if let (Some(a), Some(b)) = (l.affinity, r.affinity) {
                if a != b {
                    return Err(Error::SchemaIncompatible {
                        detail: format!(
                            "SELECTs to the left and right of {} disagree on column {}: {} vs {}",
                            op.keyword(),
                            position + 1,
                            a,
                            b
                        ),
                    });
                }
            }
        }
    }

    let QueryResult { schema, data: left_rows, .. } = left;
    let data = match op {
        CompoundOperator::UnionAll => {
            let mut rows = left_rows;
            rows.extend(right.data);
            rows
        }
        CompoundOperator::Union => {
            let mut rows = left_rows;
            rows.extend(right.data);
            dedupe(rows)
        }
        CompoundOperator::Intersect => {
            let right: HashSet<RowKey> = right.data.into_iter().map(RowKey).collect();
            dedupe(left_rows)
                .into_iter()
                .filter(|row| right.contains(&RowKey(row.clone())))
                .collect()
        }
        CompoundOperator::Except => {
            let right: HashSet<RowKey> = right.data.into_iter().map(RowKey).collect();
            dedupe(left_rows)
                .into_iter()
                .filter(|row| !right.contains(&RowKey(row.clone())))
                .collect()
        }
    };
    Ok(QueryResult::new(schema, data).post_process())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::engine::Params;
    use crate::error::ErrorKind;
    use crate::parser::parse_statement;

    fn run(db: &mut Database, config: &EngineConfig, sql: &str) -> Result<ExecResult> {
        let params = Params::new();
        let stmt = parse_statement(sql)?;
        let built = Builder::new(db, &params, config).build(&stmt)?;
        match built {
            Some(stmt) => execute(db, &stmt, config),
            None => Ok(ExecResult::Affected(0)),
        }
    }

    fn seeded() -> Database {
        let mut db = Database::new();
        let config = EngineConfig::default();
        for sql in [
            "CREATE TABLE Country(Id INTEGER PRIMARY KEY, Name TEXT)",
            "CREATE TABLE City(Id INTEGER PRIMARY KEY, Name TEXT, CountryId INTEGER, Area REAL)",
            "INSERT INTO Country(Name) VALUES ('France'), ('Spain'), ('Italy')",
            "INSERT INTO City(Name, CountryId, Area) VALUES ('Paris', 1, 105.4), ('Lyon', 1, 47.9), ('Madrid', 2, 604.3)",
        ] {
            run(&mut db, &config, sql).unwrap();
        }
        db
    }

    fn query(db: &mut Database, sql: &str) -> QueryResult {
        run(db, &EngineConfig::default(), sql)
            .unwrap()
            .into_query()
            .unwrap()
    }

    fn texts(result: &QueryResult, column: usize) -> Vec<String> {
        result.data.iter().map(|row| row[column].render()).collect()
    }

    #[test]
    fn equi_join_prunes_product() {
        let mut db = seeded();
        let result = query(
            &mut db,
            "SELECT Country.Name, City.Name FROM Country, City WHERE Country.Id = City.CountryId ORDER BY City.Name",
        );
        assert_eq!(texts(&result, 1), vec!["Lyon", "Madrid", "Paris"]);
        assert_eq!(texts(&result, 0), vec!["France", "Spain", "France"]);
    }

    #[test]
    fn product_limit_is_enforced() {
        let mut db = seeded();
        let config = EngineConfig::new().product_row_limit(5);
        let err = run(&mut db, &config, "SELECT * FROM Country, City").unwrap_err();
        assert_eq!(err, Error::ProductTooLarge { limit: 5 });
        let ok = run(&mut db, &config, "SELECT * FROM Country, City WHERE Country.Id = 1").unwrap();
        assert_eq!(ok.into_query().unwrap().row_count(), 3);
    }

    #[test]
    fn order_by_column_not_projected() {
        let mut db = seeded();
        let result = query(&mut db, "SELECT Name FROM City ORDER BY Area DESC");
        assert_eq!(texts(&result, 0), vec!["Madrid", "Paris", "Lyon"]);
    }

    #[test]
    fn aggregate_without_rows_yields_one_group() {
        let mut db = seeded();
        let result = query(&mut db, "SELECT count(*), sum(Area) FROM City WHERE Area > 1000");
        assert_eq!(result.data, vec![vec![Value::Integer(0), Value::Null]]);
        let grouped = query(
            &mut db,
            "SELECT CountryId, count(*) FROM City WHERE Area > 1000 GROUP BY CountryId",
        );
        assert!(grouped.data.is_empty());
    }

    #[test]
    fn bare_column_follows_max_row() {
        let mut db = seeded();
        let result = query(&mut db, "SELECT Name, max(Area) FROM City");
        assert_eq!(result.data[0][0], Value::Text("Madrid".into()));
        let result = query(&mut db, "SELECT Name, min(Area) FROM City");
        assert_eq!(result.data[0][0], Value::Text("Lyon".into()));
    }

    #[test]
    fn having_filters_groups() {
        let mut db = seeded();
        let result = query(
            &mut db,
            "SELECT CountryId, count(*) AS n FROM City GROUP BY CountryId HAVING count(*) > 1",
        );
        assert_eq!(result.data, vec![vec![Value::Integer(1), Value::Integer(2)]]);
    }

    #[test]
    fn distinct_limit_and_offset() {
        let mut db = seeded();
        let result = query(&mut db, "SELECT DISTINCT CountryId FROM City ORDER BY CountryId");
        assert_eq!(result.row_count(), 2);
        let result = query(&mut db, "SELECT Name FROM City ORDER BY Name LIMIT 1 OFFSET 1");
        assert_eq!(texts(&result, 0), vec!["Madrid"]);
        let result = query(&mut db, "SELECT Name FROM City ORDER BY Name LIMIT -1 OFFSET 2");
        assert_eq!(texts(&result, 0), vec!["Paris"]);
        let err = run(&mut db, &EngineConfig::default(), "SELECT Name FROM City LIMIT 'x'").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn compound_operators() {
        let mut db = Database::new();
        let config = EngineConfig::default();
        for sql in [
            "CREATE TABLE a(x INTEGER)",
            "CREATE TABLE b(x INTEGER)",
            "INSERT INTO a VALUES (3), (1), (2), (1)",
            "INSERT INTO b VALUES (2), (4)",
        ] {
            run(&mut db, &config, sql).unwrap();
        }
        let ints = |result: QueryResult| -> Vec<i64> {
            result
                .data
                .iter()
                .map(|row| match row[0] {
                    Value::Integer(v) => v,
                    _ => panic!("expected integer"),
                })
                .collect()
        };
        assert_eq!(ints(query(&mut db, "SELECT x FROM a UNION ALL SELECT x FROM b")), vec![3, 1, 2, 1, 2, 4]);
        assert_eq!(ints(query(&mut db, "SELECT x FROM a UNION SELECT x FROM b")), vec![3, 1, 2, 4]);
        assert_eq!(ints(query(&mut db, "SELECT x FROM a INTERSECT SELECT x FROM b")), vec![2]);
        assert_eq!(ints(query(&mut db, "SELECT x FROM a EXCEPT SELECT x FROM b")), vec![3, 1]);
        assert_eq!(
            ints(query(&mut db, "SELECT x FROM a UNION SELECT x FROM b ORDER BY 1 DESC")),
            vec![4, 3, 2, 1]
        );
    }

    #[test]
    fn compound_column_count_mismatch() {
        let mut db = seeded();
        let err = run(
            &mut db,
            &EngineConfig::default(),
            "SELECT Id, Name FROM Country UNION SELECT Id FROM City",
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "SELECTs to the left and right of UNION do not have the same number of result columns"
        );
    }

    #[test]
    fn strict_compound_affinity_rejects_mixed_columns() {
        let mut db = seeded();
        let sql = "SELECT Name FROM Country UNION SELECT Area FROM City";
        assert!(run(&mut db, &EngineConfig::default(), sql).is_ok());
        let strict = EngineConfig::new().strict_compound_affinity(true);
        let err = run(&mut db, &strict, sql).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaIncompatible);
    }

    #[test]
    fn dml_reports_affected_rows() {
        let mut db = seeded();
        let config = EngineConfig::default();
        let updated = run(&mut db, &config, "UPDATE City SET Area = Area * 2 WHERE CountryId = 1").unwrap();
        assert_eq!(updated.records_affected(), 2);
        let deleted = run(&mut db, &config, "DELETE FROM City WHERE Area > 500").unwrap();
        assert_eq!(deleted.records_affected(), 1);
        let selected = run(&mut db, &config, "SELECT * FROM City").unwrap();
        assert_eq!(selected.records_affected(), 0);
    }
}
