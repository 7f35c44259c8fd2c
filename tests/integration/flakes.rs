//! Flakes and builds driven from notebook cells

use std::fs;

use crate::{converse, execute, replies};

#[test]
fn flake_outputs_become_variables() {
    let dir = tempfile::tempdir().unwrap();
    let flake = dir.path().join("tools");
    fs::create_dir(&flake).unwrap();
    fs::write(
        flake.join("flake.nix"),
        "{ outputs = { self }: { version = \"1.0\"; major = 1; }; }",
    )
    .unwrap();

    let messages = converse(&dir, &[execute("1", ":lf path:./tools"), execute("2", "major + 1")]);
    let loaded = replies(&messages, "1");
    assert!(loaded[0]["content"]["text"].as_str().unwrap().starts_with("Added "));
    assert_eq!(replies(&messages, "2")[0]["content"]["data"]["text/plain"], "2");
}

#[test]
fn local_build_links_into_the_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    let code = r#"
hello = derivation {
  name = "hello";
  system = "test-system";
  builder = "/bin/sh";
  args = [ "-c" "echo hello-world > $out" ];
}
:bl hello
"#;
    let messages = converse(&dir, &[execute("b", code), execute("l", ":log hello")]);

    let build = replies(&messages, "b");
    let reply = build.last().unwrap();
    assert_eq!(reply["content"]["status"], "ok", "{reply}");
    assert_eq!(fs::read_to_string(dir.path().join("result-out")).unwrap(), "hello-world\n");

    let log: String = replies(&messages, "l")
        .iter()
        .filter(|m| m["msg_type"] == "stream")
        .map(|m| m["content"]["text"].as_str().unwrap().to_string())
        .collect();
    assert!(log.starts_with("Log for "));
}
