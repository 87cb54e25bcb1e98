use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn fixture_db(dir: &Path) -> PathBuf {
    let path = dir.join("t2s.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE employees (id INTEGER PRIMARY KEY, first_name TEXT, salary INTEGER);
         INSERT INTO employees VALUES (1, 'Ada', 1200), (2, 'Grace', 900);",
    )
    .unwrap();
    path
}

fn sqlgauge(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sqlgauge").unwrap();
    cmd.current_dir(dir);
    for var in [
        "SQLGAUGE_CONFIG",
        "SQLGAUGE_DATABASE",
        "SQLGAUGE_PROVIDER",
        "SQLGAUGE_LOG_JSON",
        "WATSONX_URL",
        "WATSONX_APIKEY",
        "WATSONX_PROJECT_ID",
        "OPENAI_API_KEY",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn read_report(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_generated_only_run_needs_no_credentials() {
    let dir = TempDir::new().unwrap();
    let db = fixture_db(dir.path());
    let input = dir.path().join("batch.jsonl");
    fs::write(
        &input,
        "{\"generated_sql\": \"SELECT first_name FROM employees\"}\n\
         {\"generated_sql\": \"SELECT * FROM employees; DROP TABLE employees;\"}\n",
    )
    .unwrap();
    let out = dir.path().join("out/report.json");

    sqlgauge(dir.path())
        .arg("run")
        .arg("--input")
        .arg(&input)
        .arg("--database")
        .arg(&db)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stderr(contains("SQL Injection"))
        .stderr(contains("Halstead Complexity"))
        .stderr(contains("Entity Recognition").not());

    let report = read_report(&out);
    assert_eq!(report["mode"], "generated_only");
    let row = &report["rows"][1];
    assert!(row["metrics"]["Patterns"]
        .as_array()
        .unwrap()
        .contains(&serde_json::json!("DROP Table/Database")));
    assert!(row["metrics"].get("rows_precision").is_none());
    assert!(row["metrics"].get("Table Match Score").is_none());
}

#[test]
fn test_golden_run_with_fake_oracle() {
    let dir = TempDir::new().unwrap();
    let db = fixture_db(dir.path());
    let input = dir.path().join("batch.json");
    fs::write(
        &input,
        r#"[{"generated_sql": "SELECT first_name FROM employees ORDER BY id",
             "golden_sql": "SELECT first_name FROM employees ORDER BY id",
             "question": "who works here?"}]"#,
    )
    .unwrap();
    let out = dir.path().join("report.json");

    sqlgauge(dir.path())
        .args(["run", "--provider", "fake"])
        .arg("--input")
        .arg(&input)
        .arg("--database")
        .arg(&db)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stderr(contains("Data Retrieval Accuracy"));

    let report = read_report(&out);
    assert_eq!(report["mode"], "with_golden");
    let row = &report["rows"][0];
    assert_eq!(row["question"], "who works here?");
    assert_eq!(row["metrics"]["rows_precision"], 1.0);
    assert_eq!(row["metrics"]["Table Match Score"], 1.0);
}

#[test]
fn test_missing_credentials_exit_before_processing() {
    let dir = TempDir::new().unwrap();
    let db = fixture_db(dir.path());
    let input = dir.path().join("batch.jsonl");
    fs::write(
        &input,
        "{\"generated_sql\": \"SELECT 1\", \"golden_sql\": \"SELECT 1\"}\n",
    )
    .unwrap();
    let out = dir.path().join("report.json");

    sqlgauge(dir.path())
        .args(["run", "--provider", "watsonx"])
        .arg("--input")
        .arg(&input)
        .arg("--database")
        .arg(&db)
        .arg("--out")
        .arg(&out)
        .assert()
        .code(2)
        .stderr(contains("WATSONX_APIKEY"));
    assert!(!out.exists());
}

#[test]
fn test_input_errors_exit_2() {
    let dir = TempDir::new().unwrap();
    let db = fixture_db(dir.path());

    sqlgauge(dir.path())
        .arg("run")
        .arg("--input")
        .arg(dir.path().join("absent.jsonl"))
        .arg("--database")
        .arg(&db)
        .assert()
        .code(2);

    let input = dir.path().join("batch.jsonl");
    fs::write(&input, "{\"golden_sql\": \"SELECT 1\"}\n").unwrap();
    sqlgauge(dir.path())
        .arg("run")
        .arg("--input")
        .arg(&input)
        .arg("--database")
        .arg(&db)
        .assert()
        .code(2)
        .stderr(contains("generated_sql"));
}

#[test]
fn test_init_then_version() {
    let dir = TempDir::new().unwrap();
    sqlgauge(dir.path())
        .args(["init", "--config", "conf/sqlgauge.yaml"])
        .assert()
        .success();
    let written = fs::read_to_string(dir.path().join("conf/sqlgauge.yaml")).unwrap();
    assert!(written.contains("provider: watsonx"));

    sqlgauge(dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}
