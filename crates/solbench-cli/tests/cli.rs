use assert_cmd::Command;
use predicates::str::contains;

fn solbench() -> Command {
    Command::cargo_bin("solbench").unwrap()
}

#[test]
fn help_names_all_subcommands() {
    solbench()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("run"))
        .stdout(contains("score"))
        .stdout(contains("list-models"));
}

#[test]
fn list_models_prints_provider_tables() {
    solbench()
        .arg("list-models")
        .assert()
        .success()
        .stdout(contains("openai:"))
        .stdout(contains("gpt-4"))
        .stdout(contains("mistral-medium"))
        .stdout(contains("gemini-pro"))
        .stdout(contains("claude-3-opus-20240229"));
}

#[test]
fn list_models_json_is_parseable() {
    let output = solbench().args(["list-models", "--json"]).output().unwrap();
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(parsed["anthropic"]
        .as_array()
        .unwrap()
        .iter()
        .any(|m| m == "claude-3-haiku-20240307"));
}

#[test]
fn score_on_empty_tree_reports_nothing_to_do() {
    let tmp = tempfile::tempdir().unwrap();
    solbench()
        .args(["score", "--output", tmp.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("no scoreable artifacts"));
}

#[test]
fn run_without_provider_key_fails_fast() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("Lease.txt"), "The tenant pays rent.").unwrap();
    solbench()
        .env_remove("OPENAI_API_KEY")
        .args([
            "run",
            "--documents",
            tmp.path().to_str().unwrap(),
            "--models",
            "gpt-4",
            "--output",
            tmp.path().join("out").to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("OPENAI_API_KEY"));
}

#[test]
fn run_rejects_unknown_prompt_variant() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("Lease.txt"), "The tenant pays rent.").unwrap();
    solbench()
        .env("OPENAI_API_KEY", "sk-test")
        .args([
            "run",
            "--documents",
            tmp.path().to_str().unwrap(),
            "--models",
            "gpt-4",
            "--variants",
            "PR99",
            "--output",
            tmp.path().join("out").to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("PR99"));
}
