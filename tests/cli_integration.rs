// CLI integration tests for `tuplerow table`.
use std::fs::File;
use std::io::Write;
use std::process::{Command, Output, Stdio};

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_tuplerow");
    Command::new(exe)
}

fn run_table(input: &str, args: &[&str]) -> Output {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("rows.jsonl");
    File::create(&path)
        .and_then(|mut file| file.write_all(input.as_bytes()))
        .expect("write input");
    let stdin = File::open(&path).expect("open input");
    cmd()
        .arg("table")
        .args(args)
        .stdin(Stdio::from(stdin))
        .output()
        .expect("run tuplerow")
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

fn stderr_json_lines(output: &Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stderr)
        .lines()
        .filter(|line| line.starts_with('{'))
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect()
}

const PEOPLE: &str = "{\"id\":2,\"name\":\"Bob\",\"age\":30}\n{\"id\":1,\"name\":\"Alice\",\"age\":7}\n";
const COLUMNS: [&str; 6] = [
    "--column",
    "id:int:key",
    "--column",
    "name:string",
    "--column",
    "age:int",
];

#[test]
fn prints_header_and_key_ordered_rows() {
    let output = run_table(PEOPLE, &COLUMNS);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(
        stdout_lines(&output),
        vec!["id  name   age", "1   Alice  7", "2   Bob    30"]
    );
}

#[test]
fn select_reorders_and_restricts_columns() {
    let mut args = COLUMNS.to_vec();
    args.extend(["--select", "age", "--select", "name", "--no-header"]);
    let output = run_table(PEOPLE, &args);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout_lines(&output), vec!["7   Alice", "30  Bob"]);
}

#[test]
fn too_long_rows_are_reported_on_stderr() {
    let mut args = COLUMNS.to_vec();
    args.extend(["--sample", "1", "--too-long", "error"]);
    let output = run_table(PEOPLE, &args);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout_lines(&output), vec!["id  name  age", "2   Bob   30"]);

    let failures = stderr_json_lines(&output);
    assert_eq!(failures.len(), 1);
    let failure = &failures[0]["failure"];
    assert_eq!(failure["stage"], "Auto Sizing Fixed Width Transform");
    assert_eq!(failure["row"][1], "Alice");
}

#[test]
fn unknown_select_is_a_usage_error() {
    let mut args = COLUMNS.to_vec();
    args.extend(["--select", "email"]);
    let output = run_table(PEOPLE, &args);
    assert_eq!(output.status.code(), Some(2));
    let errors = stderr_json_lines(&output);
    assert_eq!(errors[0]["error"]["kind"], "Usage");
    assert_eq!(errors[0]["error"]["column"], "email");
}

#[test]
fn bad_column_spec_is_a_usage_error() {
    let output = run_table(PEOPLE, &["--column", "id:decimal"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn malformed_input_line_fails_with_its_own_exit_code() {
    let output = run_table("{\"id\":1}\nnot json\n", &COLUMNS);
    assert_eq!(output.status.code(), Some(3));
    let errors = stderr_json_lines(&output);
    assert_eq!(errors[0]["error"]["kind"], "MalformedInput");
}

#[test]
fn conversion_failure_aborts_the_run() {
    let output = run_table("{\"id\":1,\"age\":\"old\"}\n", &COLUMNS);
    assert_eq!(output.status.code(), Some(4));
    let errors = stderr_json_lines(&output);
    assert_eq!(errors[0]["error"]["kind"], "Conversion");
    assert_eq!(errors[0]["error"]["column"], "age");
}

#[test]
fn negative_and_multi_byte_ids_print_in_numeric_order() {
    let input = "{\"id\":300,\"name\":\"Cat\",\"age\":3}\n{\"id\":-5,\"name\":\"Ada\",\"age\":1}\n{\"id\":2,\"name\":\"Bo\",\"age\":2}\n";
    let output = run_table(input, &COLUMNS);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(
        stdout_lines(&output),
        vec!["id   name  age", "-5   Ada   1", "2    Bo    2", "300  Cat   3"]
    );
}
