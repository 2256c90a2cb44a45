//! Binary-level tests: argument handling, exit codes and JSON output.

mod helpers;

use assert_cmd::Command;
use predicates::prelude::*;

use helpers::*;

fn saltfreeze(env: &TestEnv) -> Command {
    let mut cmd = Command::cargo_bin("saltfreeze").unwrap();
    cmd.current_dir(&env.base);
    for var in [
        "SALTFREEZE_CONFIG",
        "SALTFREEZE_BUILD_TYPE",
        "SALTFREEZE_PLATFORM",
        "SALTFREEZE_RENAME_MINION",
        "SALTFREEZE_PREFIX",
        "SALTFREEZE_FRAMEWORK_VERSION",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn mock_project() -> TestEnv {
    let env = TestEnv::new();
    create_mock_package(&env);
    env.touch("single.py");
    env.write_config(&mock_config(""));
    env
}

#[test]
fn test_plan_prints_closure_and_launchers_as_json() {
    let env = mock_project();

    saltfreeze(&env)
        .args(["plan", "--build-type", "minion"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"build_type\": \"minion\""))
        .stdout(predicate::str::contains("\"pkg.sub.deep.c\""))
        .stdout(predicate::str::contains("\"salt-minion\""))
        .stdout(predicate::str::contains("\"salt-master\"").not());
}

#[test]
fn test_plan_reads_build_type_from_environment() {
    let env = mock_project();

    saltfreeze(&env)
        .args(["plan"])
        .env("SALTFREEZE_BUILD_TYPE", "master")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"salt-master\""))
        .stdout(predicate::str::contains("\"salt-call\"").not());
}

#[test]
fn test_plan_writes_to_file() {
    let env = mock_project();
    let out = env.base.join("plan.json");

    saltfreeze(&env)
        .args(["plan", "--out"])
        .arg(&out)
        .assert()
        .success();

    let plan: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(plan["version"], "2014.7.1");
}

#[test]
fn test_render_prints_launcher() {
    let env = mock_project();

    saltfreeze(&env)
        .args(["render", "cp"])
        .assert()
        .success()
        .stdout(predicate::str::contains("from salt.scripts import salt_cp"));
}

#[test]
fn test_bad_build_type_fails_with_valid_options() {
    let env = mock_project();

    saltfreeze(&env)
        .args(["plan", "--build-type", "relay"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Valid options are: default, both, minion, master"));
}

#[test]
fn test_missing_config_points_at_init() {
    let env = TestEnv::new();

    saltfreeze(&env)
        .args(["plan"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("saltfreeze init"));
}

#[test]
fn test_init_writes_stub_once() {
    let env = TestEnv::new();

    saltfreeze(&env).args(["init"]).assert().success();
    assert!(env.base.join("saltfreeze.toml").is_file());

    saltfreeze(&env).args(["init"]).assert().failure();
    saltfreeze(&env).args(["init", "--force"]).assert().success();
}

#[test]
fn test_rename_flag_can_be_switched_off_on_the_command_line() {
    let env = mock_project();

    saltfreeze(&env)
        .args(["plan", "--build-type", "minion"])
        .env("SALTFREEZE_RENAME_MINION", "true")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"salt-minion\"").not());

    saltfreeze(&env)
        .args(["plan", "--build-type", "minion", "--rename-minion=false"])
        .env("SALTFREEZE_RENAME_MINION", "true")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"salt-minion\""));
}

#[test]
fn test_freeze_reports_missing_packager_before_resolving() {
    let env = TestEnv::new();
    env.write_config(&mock_config(""));

    saltfreeze(&env)
        .args(["freeze"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("packager.command is required"))
        .stderr(predicate::str::contains("cannot resolve module").not());
}
