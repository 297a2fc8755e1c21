use sqllogictest::{DefaultColumnType, Normalizer};
use std::fs;

pub mod analyzer;
pub mod ast;
pub mod boolean;
pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod executor;
pub mod ir;
pub mod parser;
pub mod storage;
pub mod types;

pub use config::EngineConfig;
pub use engine::{AffinityDb, Params};
pub use error::{Error, ErrorKind, Result};
pub use ir::{ColumnDefinition, ExecResult, QueryResult};
pub use types::{ColumnAffinity, StorageClass, Value};

/// Compare actual rows against expected lines, accepting either one line per
/// row or one line per value.
///
/// Past a script's hash threshold the runner replaces the rows with a single
/// "N values hashing to H" line, which then compares as an ordinary row.
fn auto_detect_validator(normalizer: Normalizer, actual: &[Vec<String>], expected: &[String]) -> bool {
    fn values_match(normalizer: Normalizer, actual: &str, expected: &str) -> bool {
        let actual = normalizer(&actual.to_string());
        let expected = normalizer(&expected.to_string());
        if actual == expected {
            return true;
        }
        // Integer expectations match any real with the same integral part.
        match (expected.parse::<i64>(), actual.parse::<f64>()) {
            (Ok(expected), Ok(actual)) if actual.is_finite() && actual.fract() == 0.0 => {
                expected == actual as i64
            }
            _ => false,
        }
    }

    if actual.is_empty() {
        return expected.is_empty() || (expected.len() == 1 && expected[0].trim().is_empty());
    }

    let total_values: usize = actual.iter().map(Vec::len).sum();
    let is_valuewise = expected.len() == total_values && actual[0].len() > 1;
    if is_valuewise {
        return actual
            .iter()
            .flatten()
            .zip(expected)
            .all(|(actual, expected)| values_match(normalizer, actual, expected));
    }

    if actual.len() != expected.len() {
        return false;
    }
    actual.iter().zip(expected).all(|(row, line)| {
        if values_match(normalizer, &row.join(" "), line) {
            return true;
        }
        let parts: Vec<&str> = line.split_ascii_whitespace().collect();
        parts.len() == row.len()
            && row
                .iter()
                .zip(&parts)
                .all(|(actual, expected)| values_match(normalizer, actual, expected))
    })
}

/// Strip trailing comments from `skipif`/`onlyif` lines, which the script
/// parser does not accept.
fn preprocess_test_file(test_file: &str) -> Result<String, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(test_file)?;
    let lines: Vec<&str> = content
        .lines()
        .map(|line| {
            let trimmed = line.trim();
            let directive = trimmed.starts_with("skipif ") || trimmed.starts_with("onlyif ");
            match line.find(" #") {
                Some(comment) if directive => &line[..comment],
                _ => line,
            }
        })
        .collect();
    Ok(lines.join("\n"))
}

/// Run one sqllogictest script against a fresh [`AffinityDb`].
pub async fn run_test_file(test_file: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut tester = sqllogictest::Runner::new(|| async { Ok::<_, Error>(AffinityDb::new()) });
    tester.with_validator(auto_detect_validator);
    tester.with_column_validator(|actual, expected| actual.len() == expected.len());
    tester.add_label("affinitydb");

    let preprocessed = preprocess_test_file(test_file)?;
    let records = sqllogictest::parser::parse_with_name::<DefaultColumnType>(&preprocessed, test_file)?;
    tester.run_multi(records)?;
    Ok(())
}
