//! In-memory tables and rows.
//!
//! A [`Database`] owns its [`Table`]s by case-insensitive name; each table
//! owns its rows in insertion order. Values are coerced to the column's
//! affinity once, when INSERT or UPDATE writes them.

use crate::error::{Error, Result};
use crate::eval::{evaluate, is_true, Context};
use crate::ir::{Expr, ValuesTable};
use crate::types::{coerce, values_equal, ColumnAffinity, Value};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::ops::Index;

/// Schema entry for one table column. Immutable once the table exists.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnHeader {
    pub index: usize,
    pub name: String,
    /// `table.column`, used for display and structural comparison.
    pub full_name: String,
    pub affinity: ColumnAffinity,
    pub is_autoincrement: bool,
    /// Value written when an INSERT omits the column.
    pub default: Option<Value>,
}

impl ColumnHeader {
    pub fn new(index: usize, table: &str, name: &str, affinity: ColumnAffinity) -> Self {
        Self {
            index,
            name: name.to_string(),
            full_name: format!("{}.{}", table, name),
            affinity,
            is_autoincrement: false,
            default: None,
        }
    }

    pub fn autoincrement(mut self) -> Self {
        self.is_autoincrement = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Value used when an INSERT leaves this column out.
    fn fill_value(&self) -> Value {
        match &self.default {
            Some(value) => coerce(value.clone(), self.affinity),
            None => self.affinity.zero_value(),
        }
    }
}

/// One stored row, a cell per schema column.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    cells: Vec<Value>,
}

impl Row {
    pub fn new(cells: Vec<Value>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[Value] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, header: &ColumnHeader) -> Option<&Value> {
        self.cells.get(header.index)
    }

    fn set(&mut self, index: usize, value: Value) {
        self.cells[index] = value;
    }
}

impl Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.cells[index]
    }
}

/// Composite key for grouping and de-duplication.
///
/// Equality follows [`values_equal`], so `1` and `1.0` are the same key and
/// NULLs group together. Hashing agrees with that equality.
#[derive(Debug, Clone)]
pub struct RowKey(pub Vec<Value>);

impl RowKey {
    pub fn from_indices(row: &Row, indices: &[usize]) -> Self {
        RowKey(indices.iter().map(|&i| row[i].clone()).collect())
    }
}

impl PartialEq for RowKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self.0.iter().zip(&other.0).all(|(a, b)| values_equal(a, b))
    }
}

impl Eq for RowKey {}

impl Hash for RowKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for value in &self.0 {
            hash_value(value, state);
        }
    }
}

fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Null => 0u8.hash(state),
        Value::Integer(v) => {
            1u8.hash(state);
            v.hash(state);
        }
        Value::Real(v) => match crate::types::real_as_integer(*v) {
            Some(int) if int as f64 == *v => {
                1u8.hash(state);
                int.hash(state);
            }
            _ => {
                2u8.hash(state);
                v.to_bits().hash(state);
            }
        },
        Value::Text(v) => {
            3u8.hash(state);
            v.hash(state);
        }
        Value::Blob(v) => {
            4u8.hash(state);
            v.hash(state);
        }
    }
}

/// A named table: schema, rows in insertion order, and its autoincrement counter.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    columns: Vec<ColumnHeader>,
    rows: Vec<Row>,
    counter: i64,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnHeader>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
            counter: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnHeader] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column by name, compared case-insensitively.
    pub fn column(&self, name: &str) -> Option<&ColumnHeader> {
        self.columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case(name))
    }

    pub fn add(&mut self, cells: Vec<Value>) -> Result<()> {
        if cells.len() != self.columns.len() {
            return Err(Error::invariant(format!(
                "row of {} cells added to {} with {} columns",
                cells.len(),
                self.name,
                self.columns.len()
            )));
        }
        self.rows.push(Row::new(cells));
        Ok(())
    }

    /// Next autoincrement value. Never reused, even after deletes.
    pub fn autoincrement(&mut self) -> i64 {
        self.counter += 1;
        self.counter
    }

    /// Value for an explicit write to the autoincrement column: NULL draws
    /// from the counter, a larger integer moves the counter forward.
    fn claim_autoincrement(&mut self, value: Value) -> Value {
        match value {
            Value::Null => Value::Integer(self.autoincrement()),
            Value::Integer(v) => {
                self.counter = self.counter.max(v);
                Value::Integer(v)
            }
            other => other,
        }
    }
}

/// All tables of one session, keyed case-insensitively by name.
#[derive(Debug, Clone, Default)]
pub struct Database {
    tables: HashMap<String, Table>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Result<&Table> {
        self.try_get(name).ok_or_else(|| Error::table_not_found(name))
    }

    pub fn try_get(&self, name: &str) -> Option<&Table> {
        self.tables.get(&name.to_ascii_lowercase())
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(&name.to_ascii_lowercase())
            .ok_or_else(|| Error::table_not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.try_get(name).is_some()
    }

    pub fn create_table(&mut self, table: Table) -> Result<()> {
        let key = table.name.to_ascii_lowercase();
        if self.tables.contains_key(&key) {
            return Err(Error::TableExists { name: table.name });
        }
        self.tables.insert(key, table);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Table> {
        self.tables
            .remove(&name.to_ascii_lowercase())
            .ok_or_else(|| Error::table_not_found(name))
    }

    /// Table names in sorted order.
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.values().map(Table::name).collect();
        names.sort_unstable();
        names
    }

    /// Append one row per VALUES row. Explicit cells are evaluated and coerced
    /// to their column's affinity; omitted columns take the autoincrement
    /// counter, the declared default, or the affinity's zero value.
    pub fn insert(&mut self, table: &str, columns: &[usize], values: &ValuesTable) -> Result<usize> {
        let target = self.get_mut(table)?;
        let width = target.columns.len();
        if let Some(&bad) = columns.iter().find(|&&index| index >= width) {
            return Err(Error::invariant(format!("column index {} out of range", bad)));
        }
        let mut explicit: Vec<Option<usize>> = vec![None; width];
        for (position, &index) in columns.iter().enumerate() {
            explicit[index] = Some(position);
        }

        for cells in &values.rows {
            if cells.len() != columns.len() {
                return Err(Error::ValueCountMismatch {
                    table: target.name.clone(),
                    expected: columns.len(),
                    actual: cells.len(),
                });
            }
            let mut row = Vec::with_capacity(width);
            for index in 0..width {
                let affinity = target.columns[index].affinity;
                let is_autoincrement = target.columns[index].is_autoincrement;
                let value = match explicit[index] {
                    Some(position) => {
                        let value = coerce(evaluate(&cells[position], Context::Empty)?, affinity);
                        if is_autoincrement {
                            target.claim_autoincrement(value)
                        } else {
                            value
                        }
                    }
                    None if is_autoincrement => Value::Integer(target.autoincrement()),
                    None => target.columns[index].fill_value(),
                };
                row.push(value);
            }
            target.add(row)?;
        }
        Ok(values.rows.len())
    }

    /// Rewrite assigned columns of every row the filter accepts. All new
    /// values of a row are computed from its old contents before any is
    /// written.
    pub fn update(
        &mut self,
        table: &str,
        assignments: &[(usize, Expr)],
        filter: Option<&Expr>,
    ) -> Result<usize> {
        let target = self.get_mut(table)?;
        if let Some((bad, _)) = assignments
            .iter()
            .find(|(index, _)| *index >= target.columns.len())
        {
            return Err(Error::invariant(format!("column index {} out of range", bad)));
        }
        let mut touched = 0;
        for position in 0..target.rows.len() {
            let row = &target.rows[position];
            let tuple = [row];
            if !matches_filter(filter, Context::Tuple(&tuple))? {
                continue;
            }
            let mut updates = Vec::with_capacity(assignments.len());
            for (index, expr) in assignments {
                let value = evaluate(expr, Context::Tuple(&tuple))?;
                updates.push((*index, coerce(value, target.columns[*index].affinity)));
            }
            let row = &mut target.rows[position];
            for (index, value) in updates {
                row.set(index, value);
            }
            touched += 1;
        }
        Ok(touched)
    }

    /// Remove every row the filter accepts, keeping the order of the rest.
    /// Without a filter the table is emptied.
    pub fn delete(&mut self, table: &str, filter: Option<&Expr>) -> Result<usize> {
        let target = self.get_mut(table)?;
        let before = target.rows.len();
        let Some(filter) = filter else {
            target.rows.clear();
            return Ok(before);
        };
        let mut keep = Vec::with_capacity(before);
        for row in &target.rows {
            let tuple = [row];
            keep.push(!is_true(filter, Context::Tuple(&tuple))?);
        }
        let mut flags = keep.into_iter();
        target.rows.retain(|_| flags.next().unwrap_or(true));
        Ok(before - target.rows.len())
    }
}

fn matches_filter(filter: Option<&Expr>, context: Context<'_>) -> Result<bool> {
    match filter {
        Some(filter) => is_true(filter, context),
        None => Ok(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::ir::BinaryOperator;
    use std::collections::HashSet;

    fn album() -> Database {
        let mut db = Database::new();
        let columns = vec![
            ColumnHeader::new(0, "Album", "Id", ColumnAffinity::Integer).autoincrement(),
            ColumnHeader::new(1, "Album", "Title", ColumnAffinity::Text),
            ColumnHeader::new(2, "Album", "Year", ColumnAffinity::Integer),
        ];
        db.create_table(Table::new("Album", columns)).unwrap();
        db
    }

    fn literals(cells: &[&str]) -> Vec<Expr> {
        cells.iter().map(|c| Expr::Literal(c.to_string())).collect()
    }

    fn year(db: &Database) -> Expr {
        Expr::column(0, db.get("Album").unwrap().columns()[2].clone())
    }

    #[test]
    fn insert_fills_autoincrement_and_coerces() {
        let mut db = album();
        let values = ValuesTable {
            rows: vec![literals(&["'A'", "'2021'"]), literals(&["'B'", "2022"])],
        };
        assert_eq!(db.insert("album", &[1, 2], &values).unwrap(), 2);
        let table = db.get("ALBUM").unwrap();
        assert_eq!(table.rows()[0].cells(), &[Value::Integer(1), Value::Text("A".into()), Value::Integer(2021)]);
        assert_eq!(table.rows()[1][0], Value::Integer(2));
    }

    #[test]
    fn omitted_columns_take_zero_values_or_defaults() {
        let mut db = Database::new();
        let columns = vec![
            ColumnHeader::new(0, "t", "i", ColumnAffinity::Integer),
            ColumnHeader::new(1, "t", "r", ColumnAffinity::Real),
            ColumnHeader::new(2, "t", "s", ColumnAffinity::Text),
            ColumnHeader::new(3, "t", "b", ColumnAffinity::Blob),
            ColumnHeader::new(4, "t", "d", ColumnAffinity::Text).with_default(Value::Integer(7)),
        ];
        db.create_table(Table::new("t", columns)).unwrap();
        db.insert("t", &[], &ValuesTable { rows: vec![vec![]] }).unwrap();
        assert_eq!(
            db.get("t").unwrap().rows()[0].cells(),
            &[
                Value::Integer(0),
                Value::Real(0.0),
                Value::Text(String::new()),
                Value::Blob(Vec::new()),
                Value::Text("7".into()),
            ]
        );
    }

    #[test]
    fn explicit_autoincrement_values_advance_the_counter() {
        let mut db = album();
        let rows = ValuesTable {
            rows: vec![literals(&["10", "'x'"]), literals(&["NULL", "'y'"])],
        };
        db.insert("Album", &[0, 1], &rows).unwrap();
        db.insert("Album", &[1], &ValuesTable { rows: vec![literals(&["'z'"])] }).unwrap();
        let ids: Vec<_> = db.get("Album").unwrap().rows().iter().map(|r| r[0].clone()).collect();
        assert_eq!(ids, vec![Value::Integer(10), Value::Integer(11), Value::Integer(12)]);
    }

    #[test]
    fn value_count_must_match_columns() {
        let mut db = album();
        let err = db
            .insert("Album", &[1, 2], &ValuesTable { rows: vec![literals(&["'A'"])] })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueCountMismatch);
    }

    #[test]
    fn update_and_delete_respect_filter() {
        let mut db = album();
        let values = ValuesTable {
            rows: vec![
                literals(&["'A'", "2021"]),
                literals(&["'B'", "2022"]),
                literals(&["'C'", "2023"]),
            ],
        };
        db.insert("Album", &[1, 2], &values).unwrap();
        let filter = Expr::binary(BinaryOperator::Gt, year(&db), Expr::Literal("2021".into()));
        let bump = Expr::binary(BinaryOperator::Add, year(&db), Expr::Literal("'1'".into()));
        assert_eq!(db.update("Album", &[(2, bump)], Some(&filter)).unwrap(), 2);
        let years: Vec<_> = db.get("Album").unwrap().rows().iter().map(|r| r[2].clone()).collect();
        assert_eq!(years, vec![Value::Integer(2021), Value::Integer(2023), Value::Integer(2024)]);

        let filter = Expr::binary(BinaryOperator::Eq, year(&db), Expr::Literal("2023".into()));
        assert_eq!(db.delete("Album", Some(&filter)).unwrap(), 1);
        assert_eq!(db.delete("Album", None).unwrap(), 2);
        let table = db.get("Album").unwrap();
        assert!(table.is_empty());
        assert_eq!(table.columns().len(), 3);
    }

    #[test]
    fn unknown_tables_are_reported() {
        let mut db = Database::new();
        assert_eq!(db.get("nope").unwrap_err(), Error::table_not_found("nope"));
        assert_eq!(db.delete("nope", None).unwrap_err().kind(), ErrorKind::TableNotFound);
        assert!(db.remove("nope").is_err());
    }

    #[test]
    fn duplicate_tables_are_rejected() {
        let mut db = album();
        let err = db.create_table(Table::new("ALBUM", vec![])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TableExists);
        assert_eq!(db.table_names(), vec!["Album"]);
    }

    #[test]
    fn row_keys_hash_consistently_with_value_equality() {
        let mut keys = HashSet::new();
        keys.insert(RowKey(vec![Value::Integer(1), Value::Null]));
        assert!(keys.contains(&RowKey(vec![Value::Real(1.0), Value::Null])));
        assert!(!keys.contains(&RowKey(vec![Value::Text("1".into()), Value::Null])));
        keys.insert(RowKey(vec![Value::Real(-0.0), Value::Null]));
        assert!(keys.contains(&RowKey(vec![Value::Integer(0), Value::Null])));
        assert_eq!(keys.len(), 2);
    }
}
