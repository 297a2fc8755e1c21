use affinitydb::run_test_file;
use std::fs;
use std::path::Path;

/// Helper function to collect all test files recursively
fn collect_test_files(dir: &Path, test_files: &mut Vec<String>) -> std::io::Result<()> {
    if dir.is_dir() {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                collect_test_files(&path, test_files)?;
            } else if path.extension().and_then(|s| s.to_str()) == Some("test") {
                if let Some(path_str) = path.to_str() {
                    test_files.push(path_str.to_string());
                }
            }
        }
    }
    Ok(())
}

/// Run one script by path: cargo test test_basics
macro_rules! test_file {
    ($name:ident, $path:expr) => {
        #[tokio::test]
        async fn $name() {
            run_test_file($path)
                .await
                .unwrap_or_else(|e| panic!("Test {} failed: {}", $path, e));
        }
    };
}

test_file!(test_basics, "tests/slt/basics.test");
test_file!(test_affinity, "tests/slt/affinity.test");
test_file!(test_select, "tests/slt/select.test");

/// Every script under tests/slt, including ones without a dedicated test.
#[tokio::test]
async fn test_all_slt_files() {
    let mut test_files = Vec::new();
    collect_test_files(Path::new("tests/slt"), &mut test_files).expect("Failed to collect test files");
    test_files.sort();
    assert!(!test_files.is_empty(), "no scripts found under tests/slt");

    let mut failed = Vec::new();
    for test_file in &test_files {
        if let Err(e) = run_test_file(test_file).await {
            failed.push(format!("{}: {}", test_file, e));
        }
    }
    assert!(failed.is_empty(), "failed scripts:\n{}", failed.join("\n"));
}
