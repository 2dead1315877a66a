//! Integration tests for Copse
//!
//! These tests run the copy engine against the record store end to end, and
//! drive the CLI binary over plan and graph files.

use std::path::Path;
use std::process::Command;

use copse_core::{
    CollectionMode, CopyError, CopyRuleSet, CopySession, DeepPolicy, EdgeRule, NodeSpace, Registry,
    RuleSetBuilder,
};
use copse_store::{CopyPlan, GraphDocument, NodeRef, Schema, Store, StoreError, snapshot};
use serde_json::json;
use tempfile::TempDir;

const SCHEMA: &str = r#"
types:
  User:
    fields: [email]
    required: [email]
    collections:
      projects_as_owner: { target: Project, inverse: owner }
      authored_todos: { target: Todo, inverse: author }
  Project:
    fields: [name]
    references:
      owner: { target: User }
    collections:
      todos: { target: Todo, inverse: project }
      developers: { target: User }
  Todo:
    fields: [name, completed]
    references:
      project: { target: Project }
      author: { target: User }
  Bug:
    parent: Todo
  NewFeature:
    parent: Todo
    references:
      suggested_by: { target: User }
"#;

const PROJECT_PLAN: &str = r#"
root: ProjectCopier
copiers:
  - name: ProjectCopier
    rules:
      - fields: [name]
      - reference: { name: owner, deep: UserCopier }
      - collection: { name: todos, deep: TodoCopier }
      - collection: { name: developers }
      - commit: validated
  - name: TodoCopier
    rules:
      - fields: [name, completed]
      - reference: { name: author }
      - reference: { name: project }
      - commit: skip_validation
  - name: UserCopier
    rules:
      - set: { field: email, value: example-user@example.com }
"#;

fn store() -> Store {
    let schema: Schema = serde_yaml::from_str(SCHEMA).unwrap();
    Store::new(schema).unwrap()
}

fn user(store: &Store, email: &str) -> NodeRef {
    store.insert("User", [("email", json!(email))]).unwrap()
}

fn todo(store: &Store, type_name: &str, project: NodeRef, name: &str) -> NodeRef {
    let todo = store.insert(type_name, [("name", json!(name))]).unwrap();
    store.set_reference(todo, "project", Some(project)).unwrap();
    store.push(project, "todos", todo).unwrap();
    todo
}

fn named(store: &Store, nodes: &[NodeRef], name: &str) -> NodeRef {
    *nodes
        .iter()
        .find(|node| store.field(**node, "name") == json!(name))
        .unwrap_or_else(|| panic!("no record named {name}"))
}

fn rules() -> RuleSetBuilder<Store> {
    CopyRuleSet::<Store>::builder()
}

/// Test a shallow copy of a single todo with a custom rule
#[test]
fn test_shallow_todo_copy() {
    let store = store();
    let mark = user(&store, "mark@example.com");
    let todo = store
        .insert("Todo", [("name", json!("Get groceries")), ("completed", json!(true))])
        .unwrap();
    store.set_reference(todo, "author", Some(mark)).unwrap();

    let registry = Registry::builder()
        .copier(
            "TodoCopier",
            rules()
                .custom(|copier| {
                    let name = copier.source_field("name")?;
                    let name = format!("{} copy", name.as_str().unwrap_or_default());
                    copier.set_target_field("name", json!(name))?;
                    Ok(())
                })
                .fields(["completed"])
                .reference("author", DeepPolicy::Shallow)
                .commit()
                .build(),
        )
        .build()
        .unwrap();

    let copy = CopySession::new(&store, &registry).copy(&todo, "TodoCopier").unwrap();

    assert_ne!(copy, todo);
    assert_eq!(store.field(copy, "name"), json!("Get groceries copy"));
    assert_eq!(store.field(copy, "completed"), json!(true));
    assert_eq!(store.reference(copy, "author"), Some(mark));
    assert!(store.is_committed(copy));
}

/// Test a deep project copy driven by a YAML plan
#[test]
fn test_deep_project_copy_from_plan() {
    let store = store();
    let owner = user(&store, "alice@example.com");
    let developer = user(&store, "bob@example.com");
    let project = store.insert("Project", [("name", json!("June 2013 Sprint"))]).unwrap();
    store.set_reference(project, "owner", Some(owner)).unwrap();
    store.push(project, "developers", owner).unwrap();
    store.push(project, "developers", developer).unwrap();
    let rails = todo(&store, "Todo", project, "Rails work");
    store.set_reference(rails, "author", Some(owner)).unwrap();
    let ember = todo(&store, "Todo", project, "Ember work");
    store.set_reference(ember, "author", Some(developer)).unwrap();

    let plan = CopyPlan::from_yaml(PROJECT_PLAN).unwrap();
    let registry = plan.compile().unwrap();
    let mut session = CopySession::new(&store, &registry).with_options(plan.options.clone());
    let report = session.copy_with_report(&project, "ProjectCopier").unwrap();
    let copy = report.target;

    // project, owner, two todos and the developer shared by reference
    assert_eq!(report.visited, 5);
    assert!(store.is_committed(copy));
    assert_eq!(store.field(copy, "name"), json!("June 2013 Sprint"));

    let owner_copy = store.reference(copy, "owner").unwrap();
    assert_ne!(owner_copy, owner);
    assert_eq!(store.field(owner_copy, "email"), json!("example-user@example.com"));
    assert_eq!(store.field(owner, "email"), json!("alice@example.com"));

    assert_eq!(store.members(copy, "developers"), vec![owner_copy, developer]);

    let todos = store.members(copy, "todos");
    assert_eq!(todos.len(), 2);
    assert!(!todos.contains(&rails) && !todos.contains(&ember));
    let rails_copy = named(&store, &todos, "Rails work");
    let ember_copy = named(&store, &todos, "Ember work");
    assert_eq!(store.reference(rails_copy, "author"), Some(owner_copy));
    assert_eq!(store.reference(ember_copy, "author"), Some(developer));
    assert_eq!(store.reference(rails_copy, "project"), Some(copy));
    assert!(store.is_committed(rails_copy));

    assert_eq!(store.members(project, "todos"), vec![rails, ember]);
}

/// Test that copying into an explicit target appends to its collections
#[test]
fn test_copy_into_existing_project_appends() {
    let store = store();
    let project = store.insert("Project", [("name", json!("June 2013 Sprint"))]).unwrap();
    todo(&store, "Todo", project, "Rails work");
    let another = store.insert("Project", [("name", json!("Another project"))]).unwrap();
    let existing = todo(&store, "Todo", another, "Ember work");

    let registry = Registry::builder()
        .copier(
            "ProjectCopier",
            rules()
                .collection("todos", DeepPolicy::copier("TodoCopier"))
                .commit()
                .build(),
        )
        .copier("TodoCopier", rules().fields(["name", "completed"]).build())
        .build()
        .unwrap();

    let copy = CopySession::new(&store, &registry)
        .copy_into(&project, another, "ProjectCopier")
        .unwrap();

    assert_eq!(copy, another);
    let todos = store.members(another, "todos");
    assert_eq!(todos.len(), 2);
    assert_eq!(todos[0], existing);
    assert_eq!(store.field(todos[1], "name"), json!("Rails work"));
    assert_eq!(store.reference(todos[1], "project"), Some(another));
}

/// Test that a replace-mode collection drops the target's existing members
#[test]
fn test_copy_into_existing_project_replaces() {
    let store = store();
    let project = store.insert("Project", [("name", json!("June 2013 Sprint"))]).unwrap();
    todo(&store, "Todo", project, "Rails work");
    let another = store.insert("Project", [("name", json!("Another project"))]).unwrap();
    todo(&store, "Todo", another, "Ember work");

    let registry = Registry::builder()
        .copier(
            "ProjectCopier",
            rules()
                .collection_with(
                    EdgeRule::new("todos").deep(DeepPolicy::copier("TodoCopier")),
                    CollectionMode::Replace,
                )
                .build(),
        )
        .copier("TodoCopier", rules().fields(["name"]).build())
        .build()
        .unwrap();

    CopySession::new(&store, &registry)
        .copy_into(&project, another, "ProjectCopier")
        .unwrap();

    let todos = store.members(another, "todos");
    assert_eq!(todos.len(), 1);
    assert_eq!(store.field(todos[0], "name"), json!("Rails work"));
}

/// Test polymorphic dispatch over subtypes sharing a base rule set
#[test]
fn test_polymorphic_todos_keep_their_subtype() {
    let store = store();
    let owner = user(&store, "alice@example.com");
    let project = store.insert("Project", [("name", json!("June 2013 Sprint"))]).unwrap();
    let bug = todo(&store, "Bug", project, "Terrible bug");
    let feature = todo(&store, "NewFeature", project, "A wonderful new feature");
    store.set_reference(feature, "suggested_by", Some(owner)).unwrap();

    let todo_rules = || {
        rules()
            .fields(["name", "completed"])
            .reference("project", DeepPolicy::Shallow)
    };
    let registry = Registry::builder()
        .copier(
            "ProjectCopier",
            rules().collection("todos", DeepPolicy::Polymorphic).commit().build(),
        )
        .copier("TodoCopier", todo_rules().build())
        .copier("BugCopier", todo_rules().build())
        .copier(
            "NewFeatureCopier",
            todo_rules().reference("suggested_by", DeepPolicy::Shallow).build(),
        )
        .by_convention()
        .build()
        .unwrap();

    let copy = CopySession::new(&store, &registry).copy(&project, "ProjectCopier").unwrap();

    let todos = store.members(copy, "todos");
    let bug_copy = named(&store, &todos, "Terrible bug");
    let feature_copy = named(&store, &todos, "A wonderful new feature");
    assert_ne!(bug_copy, bug);
    assert_eq!(store.type_tag(&bug_copy), "Bug");
    assert_eq!(store.type_tag(&feature_copy), "NewFeature");
    assert_eq!(store.reference(feature_copy, "suggested_by"), Some(owner));
    assert_eq!(store.reference(bug_copy, "project"), Some(copy));
}

/// Test that a failed commit aborts the copy with the validation details
#[test]
fn test_failed_commit_surfaces_details() {
    let store = store();
    let project = store.insert("Project", [("name", json!("Sprint"))]).unwrap();
    let owner = user(&store, "alice@example.com");
    store.set_reference(project, "owner", Some(owner)).unwrap();

    let registry = Registry::builder()
        .copier(
            "ProjectCopier",
            rules()
                .reference("owner", DeepPolicy::copier("UserCopier"))
                .commit()
                .build(),
        )
        .copier("UserCopier", rules().commit().build())
        .build()
        .unwrap();

    let err = CopySession::new(&store, &registry)
        .copy(&project, "ProjectCopier")
        .unwrap_err();
    match err {
        CopyError::Persistence { type_tag, details } => {
            assert_eq!(type_tag, "User");
            assert_eq!(details, vec!["email can't be blank"]);
        }
        other => panic!("expected a persistence error, got {other:?}"),
    }
}

/// Test that a deep copy of a tree has the same shape and shares no records
#[test]
fn test_copied_tree_matches_source_shape() {
    let store = store();
    let project = store.insert("Project", [("name", json!("Sprint"))]).unwrap();
    for name in ["one", "two", "three"] {
        todo(&store, "Todo", project, name);
    }

    let plan = CopyPlan::from_yaml(
        r#"
copiers:
  - name: ProjectCopier
    rules:
      - fields: [name]
      - collection: { name: todos, deep: TodoCopier }
  - name: TodoCopier
    rules:
      - fields: [name]
      - reference: { name: project }
"#,
    )
    .unwrap();
    let registry = plan.compile().unwrap();
    let copy = CopySession::new(&store, &registry).copy(&project, "ProjectCopier").unwrap();

    let source = snapshot::reachable(&store, project).unwrap();
    let copied = snapshot::reachable(&store, copy).unwrap();
    assert_eq!(copied.node_count(), 4);
    assert!(source.shape_matches(&copied));
    assert!(source.shared_with(&copied).is_empty());
}

/// Test that a document round trip feeds the same copy
#[test]
fn test_loaded_document_copies_like_built_store() {
    let document: GraphDocument = serde_yaml::from_str(&format!(
        "schema:\n{}\nnodes:\n{}",
        indent(SCHEMA),
        indent(
            r#"
sprint:
  type: Project
  fields: { name: Sprint }
  collections: { todos: [first] }
first:
  type: Todo
  fields: { name: First }
  references: { project: sprint }
"#
        )
    ))
    .unwrap();
    let (store, labels) = Store::load_document(&document).unwrap();

    let plan = CopyPlan::from_yaml(PROJECT_PLAN).unwrap();
    let registry = plan.compile().unwrap();
    let copy = CopySession::new(&store, &registry)
        .copy(&labels["sprint"], "ProjectCopier")
        .unwrap();

    let exported = store.export(copy).unwrap();
    assert_eq!(exported.nodes.len(), 2);
    assert!(exported.nodes.values().all(|node| node.committed));
}

/// Test that an unknown graph label is reported by the loader
#[test]
fn test_document_with_dangling_label_fails() {
    let document: GraphDocument = serde_json::from_value(json!({
        "schema": { "types": { "Todo": { "fields": ["name"], "references": { "next": { "target": "Todo" } } } } },
        "nodes": { "a": { "type": "Todo", "references": { "next": "b" } } }
    }))
    .unwrap();
    assert!(matches!(
        Store::load_document(&document),
        Err(StoreError::UnknownLabel(label)) if label == "b"
    ));
}

fn indent(text: &str) -> String {
    text.trim_matches('\n')
        .lines()
        .map(|line| format!("  {line}\n"))
        .collect()
}

const GRAPH: &str = r#"
sprint:
  type: Project
  fields: { name: June 2013 Sprint }
  references: { owner: alice }
  collections:
    todos: [rails, ember]
    developers: [alice, bob]
alice:
  type: User
  fields: { email: alice@example.com }
bob:
  type: User
  fields: { email: bob@example.com }
rails:
  type: Todo
  fields: { name: Rails work }
  references: { project: sprint, author: alice }
ember:
  type: Todo
  fields: { name: Ember work }
  references: { project: sprint, author: bob }
"#;

fn write_fixtures(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let plan = dir.join("plan.yaml");
    let graph = dir.join("graph.yaml");
    std::fs::write(&plan, PROJECT_PLAN).unwrap();
    std::fs::write(
        &graph,
        format!("schema:\n{}\nnodes:\n{}", indent(SCHEMA), indent(GRAPH)),
    )
    .unwrap();
    (plan, graph)
}

fn copse(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_copse"))
        .args(args)
        .output()
        .expect("Failed to execute copse")
}

/// Test that the CLI can be invoked
#[test]
fn test_cli_invocation() {
    let output = copse(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("copse"));
    assert!(stdout.contains("Copy object graphs"));

    let output = copse(&["version"]);
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("Copse v"));
}

/// Test the copy command end to end
#[test]
fn test_cli_copy_prints_the_copied_subgraph() {
    let dir = TempDir::new().unwrap();
    let (plan, graph) = write_fixtures(dir.path());

    let output = copse(&[
        "copy",
        "--plan",
        plan.to_str().unwrap(),
        "--graph",
        graph.to_str().unwrap(),
        "--root",
        "sprint",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let copied: GraphDocument = serde_json::from_slice(&output.stdout).unwrap();
    // project, owner copy, two todo copies and bob shared by reference
    assert_eq!(copied.nodes.len(), 5);
    let projects: Vec<_> = copied
        .nodes
        .values()
        .filter(|node| node.type_name == "Project")
        .collect();
    assert_eq!(projects.len(), 1);
    assert!(projects[0].committed);
    assert_eq!(projects[0].collections["todos"].len(), 2);
    assert!(copied
        .nodes
        .values()
        .any(|node| node.fields.get("email") == Some(&json!("example-user@example.com"))));
}

/// Test the copy command writing to a file
#[test]
fn test_cli_copy_writes_out_file() {
    let dir = TempDir::new().unwrap();
    let (plan, graph) = write_fixtures(dir.path());
    let out = dir.path().join("copy.json");

    let output = copse(&[
        "copy",
        "-p",
        plan.to_str().unwrap(),
        "-g",
        graph.to_str().unwrap(),
        "-r",
        "rails",
        "-c",
        "TodoCopier",
        "-o",
        out.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let copied = GraphDocument::from_path(&out).unwrap();
    let todos: Vec<_> = copied
        .nodes
        .values()
        .filter(|node| node.type_name == "Todo" && node.fields["name"] == json!("Rails work"))
        .collect();
    // the copy plus the original, reachable through the shared project
    assert_eq!(todos.len(), 2);
    assert_eq!(todos.iter().filter(|node| node.committed).count(), 1);
}

/// Test that check reports plan problems against the graph schema
#[test]
fn test_cli_check() {
    let dir = TempDir::new().unwrap();
    let (plan, graph) = write_fixtures(dir.path());

    let output = copse(&["check", "--plan", plan.to_str().unwrap(), "--graph", graph.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("ok: 3 copiers"));

    let broken = dir.path().join("broken.toml");
    std::fs::write(
        &broken,
        r#"
by_convention = true

[[copiers]]
name = "ProjectCopier"
rules = [{ collection = { name = "todos", deep = "TaskCopier" } }, { fields = ["budget"] }]
"#,
    )
    .unwrap();
    let output = copse(&["check", "--plan", broken.to_str().unwrap(), "--graph", graph.to_str().unwrap()]);
    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("unresolved copier type `TaskCopier`"));
    assert!(stdout.contains("`Project` has no field `budget`"));
}

/// Test the inspect command listing and DOT output
#[test]
fn test_cli_inspect() {
    let dir = TempDir::new().unwrap();
    let (_, graph) = write_fixtures(dir.path());

    let output = copse(&["inspect", "--graph", graph.to_str().unwrap(), "--root", "rails"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("5 records"));
    assert!(stdout.contains("Rails work"));

    let output = copse(&["inspect", "-g", graph.to_str().unwrap(), "-r", "sprint", "--dot"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("digraph {"));
    assert!(stdout.contains("todos[0]"));
}

/// Test that an unknown root label fails cleanly
#[test]
fn test_cli_unknown_root() {
    let dir = TempDir::new().unwrap();
    let (plan, graph) = write_fixtures(dir.path());

    let output = copse(&[
        "copy",
        "--plan",
        plan.to_str().unwrap(),
        "--graph",
        graph.to_str().unwrap(),
        "--root",
        "nope",
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no record labelled `nope`"));
}
