//! Tests for the four-level policy tree.

use super::*;
use crate::policy::Policy;
use crate::setting::Setting;

fn protect(value: bool) -> Policy {
    Policy {
        protect: Setting::Value(value),
        ..Default::default()
    }
}

fn admins(value: bool) -> Policy {
    Policy {
        enforce_admins: Setting::Value(value),
        ..Default::default()
    }
}

fn tree() -> PolicyTree<Policy> {
    let mut repo = RepoNode {
        policy: admins(true),
        ..Default::default()
    };
    repo.branches.insert("main".to_string(), protect(false));

    let mut org = OrgNode {
        policy: admins(false),
        ..Default::default()
    };
    org.repos.insert("infra".to_string(), repo);

    let mut tree = PolicyTree {
        global: protect(true),
        ..Default::default()
    };
    tree.orgs.insert("acme".to_string(), org);
    tree
}

#[test]
fn test_layers_for_fully_declared_branch() {
    let tree = tree();

    let levels: Vec<Level> = tree
        .layers("acme", "infra", "main")
        .into_iter()
        .map(|(level, _)| level)
        .collect();

    assert_eq!(
        levels,
        vec![Level::Global, Level::Org, Level::Repo, Level::Branch]
    );
}

#[test]
fn test_layers_skip_undeclared_levels() {
    let tree = tree();

    assert_eq!(tree.layers("acme", "infra", "dev").len(), 3);
    assert_eq!(tree.layers("acme", "other", "main").len(), 2);
    assert_eq!(tree.layers("other", "infra", "main").len(), 1);
}

#[test]
fn test_resolve_applies_most_specific_value() {
    let tree = tree();

    let main = tree.resolve("acme", "infra", "main");
    let dev = tree.resolve("acme", "infra", "dev");
    let other_repo = tree.resolve("acme", "web", "main");

    assert_eq!(main.protect, Setting::Value(false));
    assert_eq!(main.enforce_admins, Setting::Value(true));
    assert_eq!(dev.protect, Setting::Value(true));
    assert_eq!(other_repo.enforce_admins, Setting::Value(false));
}

#[test]
fn test_declared_branch_lookup() {
    let tree = tree();

    assert_eq!(tree.declared_branch("acme", "infra", "main"), Some(&protect(false)));
    assert_eq!(tree.declared_branch("acme", "infra", "dev"), None);
    assert!(tree.has_org("acme"));
    assert!(!tree.has_org("other"));
}

#[test]
fn test_declared_branches_lists_every_branch() {
    let mut tree = tree();
    tree.orgs
        .get_mut("acme")
        .unwrap()
        .repos
        .entry("web".to_string())
        .or_default()
        .branches
        .insert("release".to_string(), protect(true));

    let declared: Vec<(&str, &str, &str)> = tree
        .declared_branches()
        .map(|(org, repo, branch, _)| (org, repo, branch))
        .collect();

    assert_eq!(
        declared,
        vec![("acme", "infra", "main"), ("acme", "web", "release")]
    );
}

#[test]
fn test_tree_parses_from_toml() {
    let toml_text = r#"
protect = true

[orgs.acme]
enforce_admins = true

[orgs.acme.repos.infra.branches.main]
protect = false
"#;

    let tree: PolicyTree<Policy> = toml::from_str(toml_text).unwrap();

    assert_eq!(tree.global.protect, Setting::Value(true));
    assert_eq!(tree.orgs["acme"].policy.enforce_admins, Setting::Value(true));
    assert_eq!(
        tree.declared_branch("acme", "infra", "main"),
        Some(&protect(false))
    );
}

#[test]
fn test_level_display() {
    assert_eq!(Level::Global.to_string(), "global");
    assert_eq!(Level::Branch.to_string(), "branch");
}
