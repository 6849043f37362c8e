use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_shows_all_commands() {
    cargo_bin_cmd!("sheba")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("logout"))
        .stdout(predicate::str::contains("change-password"))
        .stdout(predicate::str::contains("route"));
}

#[test]
fn test_login_rejects_unknown_role() {
    cargo_bin_cmd!("sheba")
        .args(["login", "-u", "ada", "-p", "pw", "-r", "superuser"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected one of"));
}
