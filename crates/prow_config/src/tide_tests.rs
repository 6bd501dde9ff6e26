//! Tests for tide context policies and queries.

use super::*;
use crate::hierarchy::{OrgNode, RepoNode};
use crate::jobs::PresubmitConfig;
use crate::policy::{ContextPolicy, Policy};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn options_with(global: TideContextPolicy, repo: TideContextPolicy, branch: Option<TideContextPolicy>) -> PolicyTree<TideContextPolicy> {
    let mut repo_node = RepoNode {
        policy: repo,
        ..Default::default()
    };
    if let Some(b) = branch {
        repo_node.branches.insert("main".to_string(), b);
    }
    let mut org_node = OrgNode::default();
    org_node.repos.insert("repo".to_string(), repo_node);
    let mut tree = PolicyTree {
        global,
        ..Default::default()
    };
    tree.orgs.insert("org".to_string(), org_node);
    tree
}

fn job(config: PresubmitConfig) -> Presubmit {
    Presubmit::try_from(config).unwrap()
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn test_levels_are_unioned() {
    let options = options_with(
        TideContextPolicy {
            required_contexts: Setting::Value(strings(&["cla"])),
            skip_unknown_contexts: Setting::Value(true),
            ..Default::default()
        },
        TideContextPolicy {
            optional_contexts: Setting::Value(strings(&["coverage"])),
            ..Default::default()
        },
        Some(TideContextPolicy {
            required_contexts: Setting::Value(strings(&["release-notes"])),
            skip_unknown_contexts: Setting::Value(false),
            ..Default::default()
        }),
    );

    let resolved = resolve_context_policy(
        &options,
        &BranchProtectionConfig::default(),
        "org",
        "repo",
        "main",
        &[],
    )
    .unwrap();

    assert_eq!(resolved.required, set(&["cla", "release-notes"]));
    assert_eq!(resolved.optional, set(&["coverage"]));
    assert!(!resolved.skip_unknown_contexts);
}

#[test]
fn test_job_contexts_are_added() {
    let jobs = vec![
        job(PresubmitConfig {
            always_run: true,
            ..PresubmitConfig::new("unit")
        }),
        job(PresubmitConfig {
            run_if_changed: Some("^docs/".to_string()),
            ..PresubmitConfig::new("docs")
        }),
        job(PresubmitConfig {
            optional: true,
            ..PresubmitConfig::new("lint")
        }),
    ];

    let resolved = resolve_context_policy(
        &PolicyTree::default(),
        &BranchProtectionConfig::default(),
        "org",
        "repo",
        "main",
        &jobs,
    )
    .unwrap();

    assert_eq!(resolved.required, set(&["unit"]));
    assert_eq!(resolved.required_if_present, set(&["docs"]));
    assert_eq!(resolved.optional, set(&["lint"]));
}

#[test]
fn test_branch_protection_contexts_are_added_when_requested() {
    let options = options_with(
        TideContextPolicy {
            from_branch_protection: Setting::Value(true),
            ..Default::default()
        },
        TideContextPolicy::default(),
        None,
    );
    let mut branch_protection = BranchProtectionConfig::default();
    branch_protection.policies.orgs.insert(
        "org".to_string(),
        OrgNode {
            policy: Policy {
                protect: Setting::Value(true),
                required_status_checks: Setting::Value(ContextPolicy {
                    contexts: Setting::Value(strings(&["cla"])),
                    strict: Setting::Inherit,
                }),
                ..Default::default()
            },
            ..Default::default()
        },
    );

    let with = resolve_context_policy(&options, &branch_protection, "org", "repo", "main", &[]).unwrap();
    let without = resolve_context_policy(
        &PolicyTree::default(),
        &branch_protection,
        "org",
        "repo",
        "main",
        &[],
    )
    .unwrap();

    assert_eq!(with.required, set(&["cla"]));
    assert!(without.required.is_empty());
}

#[test]
fn test_branch_protection_contexts_require_protect() {
    let options = options_with(
        TideContextPolicy {
            from_branch_protection: Setting::Value(true),
            ..Default::default()
        },
        TideContextPolicy::default(),
        None,
    );
    let mut branch_protection = BranchProtectionConfig::default();
    branch_protection.policies.orgs.insert(
        "org".to_string(),
        OrgNode {
            policy: Policy {
                required_status_checks: Setting::Value(ContextPolicy {
                    contexts: Setting::Value(strings(&["cla"])),
                    strict: Setting::Inherit,
                }),
                ..Default::default()
            },
            ..Default::default()
        },
    );

    let resolved =
        resolve_context_policy(&options, &branch_protection, "org", "repo", "main", &[]).unwrap();

    assert!(resolved.required.is_empty());
}

/// A context declared optional but required by a job is reported, not
/// resolved by precedence.
#[test]
fn test_conflicting_classification_is_an_error() {
    let options = options_with(
        TideContextPolicy {
            optional_contexts: Setting::Value(strings(&["unit"])),
            ..Default::default()
        },
        TideContextPolicy::default(),
        None,
    );
    let jobs = vec![job(PresubmitConfig {
        always_run: true,
        ..PresubmitConfig::new("unit")
    })];

    let result = resolve_context_policy(
        &options,
        &BranchProtectionConfig::default(),
        "org",
        "repo",
        "main",
        &jobs,
    );

    match result {
        Err(ConfigurationError::ContextConflict { reason }) => assert!(reason.contains("unit")),
        other => panic!("expected ContextConflict, got {:?}", other),
    }
}

// ============================================================================
// ResolvedContextPolicy
// ============================================================================

#[test]
fn test_validate_detects_every_overlapping_pair() {
    let overlapping = [
        ResolvedContextPolicy {
            required: set(&["a"]),
            optional: set(&["a"]),
            ..Default::default()
        },
        ResolvedContextPolicy {
            required: set(&["a"]),
            required_if_present: set(&["a"]),
            ..Default::default()
        },
        ResolvedContextPolicy {
            optional: set(&["a"]),
            required_if_present: set(&["a"]),
            ..Default::default()
        },
    ];

    for policy in overlapping {
        assert!(policy.validate().is_err(), "{:?} should be invalid", policy);
    }

    let disjoint = ResolvedContextPolicy {
        required: set(&["a"]),
        required_if_present: set(&["b"]),
        optional: set(&["c"]),
        skip_unknown_contexts: false,
    };
    assert!(disjoint.validate().is_ok());
}

#[test]
fn test_is_optional() {
    let policy = ResolvedContextPolicy {
        required: set(&["unit"]),
        required_if_present: set(&["docs"]),
        optional: set(&["lint"]),
        skip_unknown_contexts: false,
    };

    assert!(policy.is_optional("lint"));
    assert!(!policy.is_optional("unit"));
    assert!(!policy.is_optional("docs"));
    assert!(!policy.is_optional("unknown"));

    let skipping = ResolvedContextPolicy {
        skip_unknown_contexts: true,
        ..policy
    };
    assert!(skipping.is_optional("unknown"));
    assert!(!skipping.is_optional("unit"));
}

/// Optional membership wins even on an (invalid) overlapping policy.
#[test]
fn test_is_optional_precedence() {
    let policy = ResolvedContextPolicy {
        required: set(&["x"]),
        optional: set(&["x"]),
        ..Default::default()
    };

    assert!(policy.is_optional("x"));
}

#[test]
fn test_missing_required_contexts() {
    let policy = ResolvedContextPolicy {
        required: set(&["cla", "unit"]),
        ..Default::default()
    };

    assert_eq!(
        policy.missing_required_contexts(&strings(&["unit", "lint"])),
        strings(&["cla"])
    );
}

// ============================================================================
// Queries
// ============================================================================

fn query() -> TideQuery {
    TideQuery {
        orgs: strings(&["kubernetes"]),
        labels: strings(&["lgtm", "approved"]),
        missing_labels: strings(&["do-not-merge/hold"]),
        ..Default::default()
    }
}

#[test]
fn test_valid_query() {
    assert!(query().validate().is_ok());
}

#[test]
fn test_query_without_scope_is_rejected() {
    let q = TideQuery {
        orgs: vec![],
        ..query()
    };
    assert!(matches!(
        q.validate(),
        Err(ConfigurationError::InvalidTideQuery { .. })
    ));
}

#[test]
fn test_excluded_repo_must_belong_to_declared_org() {
    let good = TideQuery {
        excluded_repos: strings(&["kubernetes/website"]),
        ..query()
    };
    let bad = TideQuery {
        excluded_repos: strings(&["istio/istio"]),
        ..query()
    };

    assert!(good.validate().is_ok());
    assert!(bad.validate().is_err());
}

#[test]
fn test_label_required_and_missing_is_rejected() {
    let q = TideQuery {
        missing_labels: strings(&["lgtm"]),
        ..query()
    };
    assert!(q.validate().unwrap_err().to_string().contains("lgtm"));
}

#[test]
fn test_included_and_excluded_branches_are_exclusive() {
    let q = TideQuery {
        included_branches: strings(&["main"]),
        excluded_branches: strings(&["dev"]),
        ..query()
    };
    assert!(q.validate().is_err());
}

#[test]
fn test_repo_format_is_checked() {
    let q = TideQuery {
        orgs: vec![],
        repos: strings(&["not-a-repo"]),
        ..query()
    };
    assert!(q.validate().is_err());
}

#[test]
fn test_query_string() {
    let q = TideQuery {
        repos: strings(&["istio/istio"]),
        included_branches: strings(&["main"]),
        ..query()
    };

    assert_eq!(
        q.query(),
        "is:pr state:open archived:false org:\"kubernetes\" repo:\"istio/istio\" \
         label:\"lgtm\" label:\"approved\" -label:\"do-not-merge/hold\" base:\"main\""
    );
}

#[test]
fn test_merge_method_lookup() {
    let mut tide = TideConfig::default();
    tide.merge_method.insert("org".to_string(), MergeMethod::Squash);
    tide.merge_method.insert("org/special".to_string(), MergeMethod::Merge);

    assert_eq!(tide.merge_method_for("org", "repo"), MergeMethod::Squash);
    assert_eq!(tide.merge_method_for("org", "special"), MergeMethod::Merge);
    assert_eq!(tide.merge_method_for("other", "repo"), MergeMethod::Merge);
}
