//! CLI integration tests for facetgraph
//!
//! Drives the facetgraph binary end-to-end against a temporary database.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Command isolated in its own config dir and database
#[allow(deprecated)]
fn facetgraph_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("facetgraph").unwrap();
    cmd.env("FACETGRAPH_CONFIG_DIR", dir.path().join("config"));
    cmd.env_remove("RUST_LOG");
    cmd.arg("--database").arg(dir.path().join("graph.db"));
    cmd
}

fn run(dir: &TempDir, args: &[&str]) {
    facetgraph_cmd(dir).args(args).assert().success();
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    facetgraph_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("entities"))
        .stdout(predicate::str::contains("categories"))
        .stdout(predicate::str::contains("query"));
}

#[test]
fn test_tags_add_and_list() {
    let dir = TempDir::new().unwrap();
    facetgraph_cmd(&dir)
        .args(["tags", "add", "person"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tag 'person' created."));
    run(&dir, &["tags", "property", "person", "born", "datetime"]);

    facetgraph_cmd(&dir)
        .args(["tags", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("person (born: datetime)"));
}

#[test]
fn test_duplicate_tag_fails() {
    let dir = TempDir::new().unwrap();
    run(&dir, &["tags", "add", "person"]);
    facetgraph_cmd(&dir)
        .args(["tags", "add", "person"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already in use"));
}

#[test]
fn test_removing_a_tag_untags_its_entities() {
    let dir = TempDir::new().unwrap();
    run(&dir, &["tags", "add", "draft"]);
    run(&dir, &["tags", "add", "keep"]);
    run(&dir, &["entities", "add", "ada", "--tag", "draft", "--tag", "keep"]);
    run(&dir, &["entities", "add", "charles", "--tag", "draft"]);

    facetgraph_cmd(&dir)
        .args(["tags", "remove", "draft"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tag 'draft' deleted."));

    facetgraph_cmd(&dir)
        .args(["entities", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ada [keep]"))
        .stdout(predicate::str::contains("draft").not());

    facetgraph_cmd(&dir)
        .args(["query", "draft"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Tag 'draft' not found"));

    run(&dir, &["tags", "add", "draft"]);
    facetgraph_cmd(&dir)
        .args(["query", "draft"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing carries those tags."));
}

#[test]
fn test_unknown_property_type_fails() {
    let dir = TempDir::new().unwrap();
    run(&dir, &["tags", "add", "person"]);
    facetgraph_cmd(&dir)
        .args(["tags", "property", "person", "age", "colour"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown property type"));
}

#[test]
fn test_entity_facet_values() {
    let dir = TempDir::new().unwrap();
    run(&dir, &["tags", "add", "person"]);
    run(&dir, &["tags", "property", "person", "alive", "bool"]);
    run(&dir, &["categories", "add", "people"]);
    run(&dir, &["entities", "add", "ada", "--category", "people", "--tag", "person"]);
    run(&dir, &["entities", "set", "ada", "alive", "false", "--category", "people"]);

    facetgraph_cmd(&dir)
        .args(["entities", "list", "--category", "people"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ada in /people [person] alive=false"));

    facetgraph_cmd(&dir)
        .args(["entities", "set", "ada", "alive", "maybe", "--category", "people"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("can't be assigned"));
}

#[test]
fn test_referenced_entity_cannot_be_removed() {
    let dir = TempDir::new().unwrap();
    run(&dir, &["entities", "add", "ada"]);
    run(&dir, &["entities", "add", "charles"]);
    run(&dir, &["relationships", "add", "knows", "ada", "charles"]);

    facetgraph_cmd(&dir)
        .args(["relationships", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("knows ada -> charles"));

    facetgraph_cmd(&dir)
        .args(["entities", "remove", "charles"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("still referenced by 1 relationship"));
}

#[test]
fn test_category_tree_copy_and_remove() {
    let dir = TempDir::new().unwrap();
    run(&dir, &["categories", "add", "projects/rust"]);
    run(&dir, &["categories", "add", "archive"]);
    run(&dir, &["entities", "add", "crate", "--category", "projects/rust"]);
    run(&dir, &["categories", "copy", "projects", "archive"]);

    facetgraph_cmd(&dir)
        .args(["entities", "list", "--category", "archive/projects/rust"])
        .assert()
        .success()
        .stdout(predicate::str::contains("crate in /archive/projects/rust"));

    facetgraph_cmd(&dir)
        .args(["categories", "remove", "projects"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("needs --recursive"));

    run(&dir, &["categories", "remove", "projects", "--recursive"]);

    facetgraph_cmd(&dir)
        .args(["categories", "tree"])
        .assert()
        .success()
        .stdout(predicate::str::contains("archive/"))
        .stdout(predicate::str::contains("  projects/").count(1));
}

#[test]
fn test_root_category_cannot_be_removed() {
    let dir = TempDir::new().unwrap();
    facetgraph_cmd(&dir)
        .args(["categories", "remove", "/", "--recursive"])
        .assert()
        .failure();
}

#[test]
fn test_query_deduplicates_across_tags() {
    let dir = TempDir::new().unwrap();
    run(&dir, &["tags", "add", "t1"]);
    run(&dir, &["tags", "add", "t2"]);
    run(&dir, &["entities", "add", "both", "--tag", "t1", "--tag", "t2"]);
    run(&dir, &["entities", "add", "one", "--tag", "t1"]);
    run(&dir, &["entities", "add", "none"]);

    facetgraph_cmd(&dir)
        .args(["query", "t1", "t2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("both").count(1))
        .stdout(predicate::str::contains("one"))
        .stdout(predicate::str::contains("none").not());
}

#[test]
fn test_query_json_output() {
    let dir = TempDir::new().unwrap();
    run(&dir, &["tags", "add", "t1"]);
    run(&dir, &["entities", "add", "e", "--tag", "t1"]);

    let output = facetgraph_cmd(&dir)
        .args(["--format", "json", "query", "t1"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["entities"][0]["name"], "e");
    assert_eq!(value["relationships"].as_array().unwrap().len(), 0);
}

#[test]
fn test_config_set_get() {
    let dir = TempDir::new().unwrap();
    run(&dir, &["config", "set", "logging.filter", "facetgraph=debug"]);

    facetgraph_cmd(&dir)
        .args(["config", "get", "logging.filter"])
        .assert()
        .success()
        .stdout(predicate::str::contains("facetgraph=debug"));

    facetgraph_cmd(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));

    facetgraph_cmd(&dir)
        .args(["config", "get", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown configuration key"));
}
