use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn cli_no_args() {
    Command::new(env!("CARGO"))
        .arg("run")
        .arg("--quiet")
        .arg("-p")
        .arg("imsave-cli")
        .arg("--")
        .assert()
        .failure()
        .stderr(predicate::str::contains("For more information try --help"))
        .stdout(predicate::str::is_empty());
}

#[test]
fn cli_help() {
    Command::new(env!("CARGO"))
        .arg("run")
        .arg("--quiet")
        .arg("-p")
        .arg("imsave-cli")
        .arg("--")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("OPTIONS:"))
        .stdout(predicate::str::contains("--arch"))
        .stdout(predicate::str::contains("registry.hub.docker.com"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn cli_bad_reference() {
    Command::new(env!("CARGO"))
        .arg("run")
        .arg("--quiet")
        .arg("-p")
        .arg("imsave-cli")
        .arg("--")
        .arg("-q")
        .arg("-l")
        .arg("error")
        .arg("--arch")
        .arg("arm64,arm:v7")
        .arg("team/app:1:2")
        .env_remove("RUST_LOG")
        .assert()
        .code(1)
        .stdout(predicate::eq("Using architecture: arm64,arm:v7\n"))
        .stderr(predicate::str::contains("invalid image reference format"));
}

#[test]
fn cli_unreachable_registry() {
    let tmp = tempfile::tempdir().unwrap();
    Command::new(env!("CARGO"))
        .arg("run")
        .arg("--quiet")
        .arg("-p")
        .arg("imsave-cli")
        .arg("--")
        .arg("-q")
        .arg("-l")
        .arg("error")
        .arg("-m")
        .arg("127.0.0.1:1")
        .arg("-o")
        .arg(tmp.path().join("out.tgz"))
        .arg("app:1.0")
        .env_remove("RUST_LOG")
        .env_remove("REGISTRY_PASSWORD")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Using architecture:"))
        .stdout(predicate::str::contains("Output file").not())
        .stderr(predicate::str::contains("network request error"));
    assert!(!tmp.path().join("out.tgz").exists());
}
