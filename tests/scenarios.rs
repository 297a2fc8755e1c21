use affinitydb::{AffinityDb, ColumnAffinity, ErrorKind, Params, QueryResult, Value};

fn query(db: &mut AffinityDb, sql: &str) -> QueryResult {
    db.query(sql, &Params::new())
        .unwrap_or_else(|e| panic!("{} failed: {}", sql, e))
}

fn album_db() -> AffinityDb {
    let mut db = AffinityDb::new();
    db.execute(
        "CREATE TABLE Album(Id INTEGER PRIMARY KEY AUTOINCREMENT, Title TEXT, Artist TEXT, Year INTEGER)",
    )
    .unwrap();
    db.execute("INSERT INTO Album(Title, Artist, Year) VALUES ('Origin', 'Tash', 2021)")
        .unwrap();
    db.execute("INSERT INTO Album(Title, Artist, Year) VALUES ('Drift', 'Mono', '2022')")
        .unwrap();
    db.execute("INSERT INTO Album(Title, Artist, Year) VALUES ('Static', 'Mono', 2020 + 3)")
        .unwrap();
    db
}

#[test]
fn autoincrement_ids_and_integer_years() {
    let mut db = album_db();
    let result = query(&mut db, "SELECT * FROM Album");
    assert_eq!(result.column_names(), vec!["Id", "Title", "Artist", "Year"]);
    assert_eq!(result.row_count(), 3);
    let ids: Vec<&Value> = result.data.iter().map(|row| &row[0]).collect();
    assert_eq!(ids, vec![&Value::Integer(1), &Value::Integer(2), &Value::Integer(3)]);
    let years: Vec<&Value> = result.data.iter().map(|row| &row[3]).collect();
    assert_eq!(
        years,
        vec![&Value::Integer(2021), &Value::Integer(2022), &Value::Integer(2023)]
    );
    assert_eq!(result.column_type_name(3), Some("INTEGER"));
}

#[test]
fn arithmetic_in_values_evaluates_to_integer() {
    let mut db = AffinityDb::new();
    db.execute("CREATE TABLE t(a INTEGER)").unwrap();
    db.execute("INSERT INTO t VALUES (1+1)").unwrap();
    let result = query(&mut db, "SELECT a, typeof(a) FROM t");
    assert_eq!(
        result.data,
        vec![vec![Value::Integer(2), Value::Text("integer".into())]]
    );
}

#[test]
fn sibling_alias_is_not_visible() {
    let mut db = album_db();
    let err = db.execute("SELECT Title AS x, x + 1 FROM Album").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ColumnNotFound);
    assert_eq!(err.to_string(), "no such column: x");

    let ordered = query(&mut db, "SELECT Title AS x FROM Album ORDER BY x");
    let titles: Vec<String> = ordered.data.iter().map(|row| row[0].render()).collect();
    assert_eq!(titles, vec!["Drift", "Origin", "Static"]);
}

fn geography() -> AffinityDb {
    let mut db = AffinityDb::new();
    db.execute("CREATE TABLE Country(Id INTEGER PRIMARY KEY, Name TEXT)")
        .unwrap();
    db.execute("CREATE TABLE City(Id INTEGER PRIMARY KEY, Name TEXT, Country TEXT, Area REAL)")
        .unwrap();
    db.execute("INSERT INTO Country(Name) VALUES ('France'), ('Spain'), ('Italy')")
        .unwrap();
    db
}

#[test]
fn cartesian_product_without_filter() {
    let mut db = geography();
    db.execute("INSERT INTO City(Name, Country, Area) VALUES ('Paris', 'France', 105.4), ('Rome', 'Italy', 1285.0)")
        .unwrap();
    let result = query(&mut db, "SELECT * FROM Country, City");
    assert_eq!(result.row_count(), 6);
    assert_eq!(result.column_count(), 6);
}

#[test]
fn group_by_sums_per_country() {
    let mut db = geography();
    let countries = ["France", "Spain", "Italy", "Portugal", "Greece"];
    for (i, country) in countries.iter().enumerate() {
        for j in 1..=3 {
            let sql = format!(
                "INSERT INTO City(Name, Country, Area) VALUES ('{}-{}', '{}', {})",
                country,
                j,
                country,
                (i + 1) * 10 + j
            );
            db.execute(&sql).unwrap();
        }
    }
    let result = query(
        &mut db,
        "SELECT Country, Sum(Area) FROM City GROUP BY Country",
    );
    assert_eq!(result.row_count(), 5);
    for (i, row) in result.data.iter().enumerate() {
        assert_eq!(row[0], Value::Text(countries[i].into()));
        let base = ((i + 1) * 10) as f64;
        assert_eq!(row[1], Value::Real(base * 3.0 + 6.0));
    }
}

#[test]
fn affinity_conversion_table() {
    let mut db = AffinityDb::new();
    db.execute("CREATE TABLE t1(t TEXT, nu NUMERIC, i INTEGER, r REAL, b BLOB)")
        .unwrap();
    db.execute("INSERT INTO t1 VALUES('500.0', '500.0', '500.0', '500.0', '500.0')")
        .unwrap();
    let result = query(
        &mut db,
        "SELECT typeof(t), typeof(nu), typeof(i), typeof(r), typeof(b) FROM t1",
    );
    let classes: Vec<String> = result.data[0].iter().map(Value::render).collect();
    assert_eq!(classes, vec!["text", "integer", "integer", "real", "text"]);

    let values = query(&mut db, "SELECT * FROM t1");
    assert_eq!(
        values.data[0],
        vec![
            Value::Text("500.0".into()),
            Value::Integer(500),
            Value::Integer(500),
            Value::Real(500.0),
            Value::Text("500.0".into()),
        ]
    );
    let affinities: Vec<Option<ColumnAffinity>> =
        values.schema.iter().map(|column| column.affinity).collect();
    assert_eq!(
        affinities,
        vec![
            Some(ColumnAffinity::Text),
            Some(ColumnAffinity::Numeric),
            Some(ColumnAffinity::Integer),
            Some(ColumnAffinity::Real),
            Some(ColumnAffinity::Blob),
        ]
    );
}

#[test]
fn delete_without_filter_empties_table() {
    let mut db = album_db();
    let deleted = db.execute("DELETE FROM Album").unwrap();
    assert_eq!(deleted.records_affected(), 3);
    let result = query(&mut db, "SELECT * FROM Album");
    assert_eq!(result.row_count(), 0);
    assert_eq!(result.column_names(), vec!["Id", "Title", "Artist", "Year"]);
}

#[test]
fn null_comparisons_never_match() {
    let mut db = album_db();
    let result = query(&mut db, "SELECT Title FROM Album WHERE Year = NULL OR NOT NULL");
    assert_eq!(result.row_count(), 0);
    let result = query(&mut db, "SELECT false = NULL, NULL AND 0, NULL OR 1");
    assert_eq!(
        result.data,
        vec![vec![Value::Null, Value::Integer(0), Value::Integer(1)]]
    );
}

#[test]
fn empty_aggregates() {
    let mut db = album_db();
    let result = query(
        &mut db,
        "SELECT sum(Year), avg(Year), total(Year), count(Year) FROM Album WHERE Id > 10",
    );
    assert_eq!(
        result.data,
        vec![vec![Value::Null, Value::Null, Value::Real(0.0), Value::Integer(0)]]
    );
    let grouped = query(
        &mut db,
        "SELECT Artist, sum(Year) FROM Album WHERE Id > 10 GROUP BY Artist",
    );
    assert!(grouped.data.is_empty());
}

#[test]
fn missing_objects_are_reported() {
    let mut db = album_db();
    let err = db.execute("SELECT * FROM Nope").unwrap_err();
    assert_eq!(err.to_string(), "no such table: Nope");
    let err = db.execute("SELECT Id FROM Album, Album AS a2").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AmbiguousColumn);
    let err = db
        .execute("SELECT Id, Title FROM Album UNION SELECT Id FROM Album")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaIncompatible);
}

#[test]
fn parameters_are_bound_and_coerced_on_insert() {
    let mut db = album_db();
    let params = Params::new()
        .with("@title", "Bound")
        .with(":year", "2024")
        .with_positional("Solo");
    db.execute_with(
        "INSERT INTO Album(Title, Year, Artist) VALUES (@title, :year, ?)",
        &params,
    )
    .unwrap();
    let result = db
        .query("SELECT Year FROM Album WHERE Title = $title", &params)
        .unwrap();
    assert_eq!(result.data, vec![vec![Value::Integer(2024)]]);
}

fn two_cities() -> AffinityDb {
    let mut db = geography();
    db.execute("INSERT INTO City(Name, Country, Area) VALUES ('Paris', 'France', 105.4), ('Lyon', 'France', 47.9)")
        .unwrap();
    db
}

#[test]
fn having_without_group_by_filters_the_single_group() {
    let mut db = two_cities();
    let result = query(&mut db, "SELECT Name FROM City HAVING Area > 100");
    assert_eq!(result.data, vec![vec![Value::Text("Paris".into())]]);
    let result = query(&mut db, "SELECT Name FROM City HAVING Area > 200");
    assert!(result.data.is_empty());
    let result = query(&mut db, "SELECT count(*) FROM City HAVING count(*) > 1");
    assert_eq!(result.data, vec![vec![Value::Integer(2)]]);
}

#[test]
fn aggregate_in_order_by_makes_one_group() {
    let mut db = two_cities();
    let result = query(&mut db, "SELECT Name FROM City ORDER BY max(Area)");
    assert_eq!(result.data, vec![vec![Value::Text("Paris".into())]]);
    let result = query(&mut db, "SELECT Name FROM City ORDER BY min(Area)");
    assert_eq!(result.data, vec![vec![Value::Text("Lyon".into())]]);
}

#[test]
fn wide_mixed_disjunction_is_evaluated_without_expansion() {
    let mut db = AffinityDb::new();
    db.execute("CREATE TABLE a(x INTEGER)").unwrap();
    db.execute("CREATE TABLE b(y INTEGER)").unwrap();
    let filter = (0..32)
        .map(|i| format!("(a.x = {0} AND b.y = {0})", i))
        .collect::<Vec<_>>()
        .join(" OR ");
    let sql = format!("SELECT count(*) FROM a, b WHERE {}", filter);
    assert_eq!(query(&mut db, &sql).data, vec![vec![Value::Integer(0)]]);

    db.execute("INSERT INTO a VALUES (3), (40)").unwrap();
    db.execute("INSERT INTO b VALUES (3), (4)").unwrap();
    assert_eq!(query(&mut db, &sql).data, vec![vec![Value::Integer(1)]]);
}

#[test]
fn long_subjects_with_many_wildcards() {
    let mut db = AffinityDb::new();
    let subject = "a".repeat(200);
    let like = format!("SELECT '{}' LIKE '{}b'", subject, "%a".repeat(12));
    assert_eq!(query(&mut db, &like).data, vec![vec![Value::Integer(0)]]);
    let glob = format!("SELECT '{}' GLOB '{}'", subject, "*a".repeat(12));
    assert_eq!(query(&mut db, &glob).data, vec![vec![Value::Integer(1)]]);
}
