// SPDX-License-Identifier: Apache-2.0

//! Process-spawning smoke tests against fixture policy trees, exercising
//! the binary end to end rather than any one internal stage.

use std::path::PathBuf;
use std::process::Command;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn selint() -> Command {
    Command::new(env!("CARGO_BIN_EXE_selint"))
}

#[test]
fn a_clean_policy_tree_exits_successfully() {
    let output = selint().arg(fixture("clean")).output().expect("spawn selint");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
}

#[test]
fn json_output_contains_the_unordered_permissions_finding() {
    let output = selint().arg("--json").arg(fixture("findings")).output().expect("spawn selint");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("C-005"), "stdout: {stdout}");
}

#[test]
fn fail_on_finding_turns_a_finding_into_a_nonzero_exit() {
    let output = selint()
        .arg("--fail-on-finding")
        .arg(fixture("findings"))
        .output()
        .expect("spawn selint");
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn a_path_with_no_recognized_source_files_is_a_usage_error() {
    let empty = tempfile::tempdir().expect("tempdir");
    let output = selint().arg(empty.path()).output().expect("spawn selint");
    assert_eq!(output.status.code(), Some(2));
}
