use std::fs;

use assert_cmd::Command;

fn minivm() -> Command {
    Command::cargo_bin("minivm").expect("minivm binary")
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(output).expect("utf-8 stdout")
}

#[test]
fn run_prints_result() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("double.asm");
    fs::write(&path, "# doubles seven\npush 7\ndup\nadd\n").expect("write source");

    let stdout = stdout_of(minivm().arg("run").arg(&path));
    assert_eq!(stdout.trim(), "14");
}

#[test]
fn demo_prints_listing_then_result() {
    let stdout = stdout_of(minivm().arg("demo"));
    assert!(stdout.starts_with("0000\tpush <1>\n"));
    assert!(stdout.contains("0006\tif <:label <1@1>>"));
    assert_eq!(stdout.lines().last(), Some("1000000"));
}

#[test]
fn parse_error_exits_with_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.asm");
    fs::write(&path, "push 1\npush 1 @@@\n").expect("write source");

    let output = minivm().arg("run").arg(&path).assert().failure().get_output().stderr.clone();
    let stderr = String::from_utf8(output).expect("utf-8 stderr");
    assert!(stderr.contains("line 2"), "stderr was: {stderr}");
    assert!(stderr.contains("push 1 @@@"), "stderr was: {stderr}");
}

#[test]
fn assembled_file_runs_and_lists() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("loop.asm");
    let binary = dir.path().join("loop.mvm");
    fs::write(
        &source,
        "push 0\n:top\npush 1\nadd\ndup\npush 5\nbigger\nif :top\n",
    )
    .expect("write source");

    minivm().arg("assemble").arg(&source).assert().success();
    assert!(binary.exists());

    assert_eq!(stdout_of(minivm().arg("run").arg(&binary)).trim(), "5");
    let listing = stdout_of(minivm().arg("list").arg(&binary));
    assert_eq!(listing.lines().count(), 7);
    assert!(listing.contains("0006\tif <:top <1@1>>"));
}

#[test]
fn config_and_flags_bound_execution() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("spin.asm");
    let config = dir.path().join("minivm.toml");
    fs::write(&source, ":spin\ngoto :spin\n").expect("write source");
    fs::write(&config, "[vm]\nmax-steps = 10\n").expect("write config");

    minivm()
        .arg("--config")
        .arg(&config)
        .arg("run")
        .arg(&source)
        .assert()
        .failure();
    minivm()
        .arg("run")
        .arg(&source)
        .arg("--max-steps")
        .arg("25")
        .assert()
        .failure();
}

#[test]
fn list_json_contains_opcodes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("json.asm");
    fs::write(&path, "push 2\nnot\n").expect("write source");

    let stdout = stdout_of(minivm().arg("list").arg("--json").arg(&path));
    assert!(stdout.contains("\"push\""));
    assert!(stdout.contains("\"not\""));
}
