//! Tests for job definitions.

use super::*;

fn presubmit(config: PresubmitConfig) -> Presubmit {
    Presubmit::try_from(config).expect("job should compile")
}

fn files(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

// ============================================================================
// Compilation and defaults
// ============================================================================

#[test]
fn test_presubmit_defaults_context_trigger_and_rerun_command() {
    let job = presubmit(PresubmitConfig::new("unit"));

    assert_eq!(job.context, "unit");
    assert_eq!(job.rerun_command, "/test unit");
    assert!(job.triggered_by("/test unit"));
    assert!(job.triggered_by("/test all"));
    assert!(job.triggered_by("lgtm\n/test unit"));
    assert!(!job.triggered_by("/test integration"));
}

#[test]
fn test_presubmit_keeps_explicit_context_and_trigger() {
    let job = presubmit(PresubmitConfig {
        context: Some("ci/unit".to_string()),
        trigger: Some(r"(?m)^/run-unit\s*$".to_string()),
        rerun_command: Some("/run-unit".to_string()),
        ..PresubmitConfig::new("unit")
    });

    assert_eq!(job.context, "ci/unit");
    assert!(job.triggered_by("/run-unit"));
    assert!(!job.triggered_by("/test unit"));
}

#[test]
fn test_invalid_run_if_changed_is_rejected() {
    let result = Presubmit::try_from(PresubmitConfig {
        run_if_changed: Some("([".to_string()),
        ..PresubmitConfig::new("docs")
    });

    match result {
        Err(ConfigurationError::InvalidPattern { field, .. }) => {
            assert_eq!(field, "docs.run_if_changed")
        }
        other => panic!("expected InvalidPattern, got {:?}", other),
    }
}

#[test]
fn test_always_run_and_run_if_changed_are_exclusive() {
    let result = Presubmit::try_from(PresubmitConfig {
        always_run: true,
        run_if_changed: Some("^docs/".to_string()),
        ..PresubmitConfig::new("docs")
    });

    assert!(matches!(result, Err(ConfigurationError::InvalidJob { .. })));
}

#[test]
fn test_children_are_compiled_recursively() {
    let job = presubmit(PresubmitConfig {
        always_run: true,
        run_after_success: vec![PresubmitConfig::new("e2e")],
        ..PresubmitConfig::new("build")
    });

    assert_eq!(job.run_after_success.len(), 1);
    assert_eq!(job.run_after_success[0].context, "e2e");
}

#[test]
fn test_presubmit_deserializes_from_yaml() {
    let yaml = r#"
name: docs-check
run_if_changed: "^docs/"
branches: [main]
labels:
  preset-docs: "true"
"#;
    let job: Presubmit = serde_yaml::from_str(yaml).unwrap();

    assert_eq!(job.name(), "docs-check");
    assert!(job.triggers_conditionally());
    assert!(job.could_run("main"));
    assert!(!job.could_run("dev"));
    assert_eq!(job.base.labels.get("preset-docs").map(String::as_str), Some("true"));
}

#[test]
fn test_invalid_yaml_job_reports_configuration_error() {
    let result: Result<Presubmit, _> = serde_yaml::from_str("name: x\nrun_if_changed: \"([\"");
    assert!(result.is_err());
}

// ============================================================================
// Matching
// ============================================================================

#[test]
fn test_should_run_respects_branch_changes_and_force() {
    let job = presubmit(PresubmitConfig {
        run_if_changed: Some("^docs/".to_string()),
        brancher: Brancher {
            branches: vec!["main".to_string()],
            skip_branches: vec![],
        },
        ..PresubmitConfig::new("docs")
    });

    assert!(job.should_run("main", &files(&["docs/index.md"]), false));
    assert!(!job.should_run("main", &files(&["src/lib.rs"]), false));
    assert!(job.should_run("main", &files(&["src/lib.rs"]), true));
    assert!(!job.should_run("dev", &files(&["docs/index.md"]), true));
}

#[test]
fn test_context_required() {
    assert!(presubmit(PresubmitConfig::new("a")).context_required());
    assert!(!presubmit(PresubmitConfig {
        optional: true,
        ..PresubmitConfig::new("a")
    })
    .context_required());
    assert!(!presubmit(PresubmitConfig {
        skip_report: true,
        ..PresubmitConfig::new("a")
    })
    .context_required());
}

#[test]
fn test_postsubmit_should_run() {
    let job = Postsubmit::try_from(PostsubmitConfig {
        run_if_changed: Some(r"\.go$".to_string()),
        ..PostsubmitConfig::new("build")
    })
    .unwrap();
    let unconditional = Postsubmit::try_from(PostsubmitConfig::new("push")).unwrap();

    assert!(job.should_run("main", &files(&["main.go"])));
    assert!(!job.should_run("main", &files(&["README.md"])));
    assert!(unconditional.should_run("main", &[]));
}

#[test]
fn test_periodic_requires_exactly_one_schedule() {
    let mut periodic = Periodic {
        base: JobBase::named("nightly"),
        interval: Some("24h".to_string()),
        cron: None,
    };
    assert!(periodic.validate().is_ok());

    periodic.cron = Some("0 0 * * *".to_string());
    assert!(periodic.validate().is_err());

    periodic.interval = None;
    periodic.cron = None;
    assert!(periodic.validate().is_err());
}

// ============================================================================
// Presets
// ============================================================================

fn preset(label: &str, var: &str) -> Preset {
    Preset {
        labels: [(label.to_string(), "true".to_string())].into_iter().collect(),
        env: vec![EnvVar {
            name: var.to_string(),
            value: "1".to_string(),
        }],
    }
}

#[test]
fn test_presets_apply_to_matching_jobs_and_children() {
    let mut child = PresubmitConfig::new("child");
    child
        .base
        .labels
        .insert("preset-cache".to_string(), "true".to_string());
    let mut parent = PresubmitConfig {
        run_after_success: vec![child],
        ..PresubmitConfig::new("parent")
    };
    parent
        .base
        .labels
        .insert("preset-cache".to_string(), "true".to_string());
    let mut jobs = vec![presubmit(parent), presubmit(PresubmitConfig::new("plain"))];

    apply_presets(&[preset("preset-cache", "CACHE")], &mut jobs).unwrap();

    assert_eq!(jobs[0].base.env.len(), 1);
    assert_eq!(jobs[0].run_after_success[0].base.env[0].name, "CACHE");
    assert!(jobs[1].base.env.is_empty());
}

#[test]
fn test_preset_conflicting_env_is_an_error() {
    let mut base = JobBase::named("unit");
    base.labels.insert("p".to_string(), "true".to_string());
    base.env.push(EnvVar {
        name: "GOPROXY".to_string(),
        value: "direct".to_string(),
    });

    let result = preset("p", "GOPROXY").apply(&mut base);
    assert!(matches!(result, Err(ConfigurationError::InvalidJob { .. })));
}

// ============================================================================
// Traversal and validation
// ============================================================================

#[test]
fn test_walk_jobs_marks_nested_jobs() {
    let jobs = vec![presubmit(PresubmitConfig {
        run_after_success: vec![PresubmitConfig {
            run_after_success: vec![PresubmitConfig::new("c")],
            ..PresubmitConfig::new("b")
        }],
        ..PresubmitConfig::new("a")
    })];

    let walked: Vec<(&str, bool)> = walk_jobs(&jobs)
        .into_iter()
        .map(|(job, nested)| (job.name(), nested))
        .collect();

    assert_eq!(walked, vec![("a", false), ("b", true), ("c", true)]);
}

#[test]
fn test_walk_stops_at_maximum_depth() {
    let mut config = PresubmitConfig::new("job-0");
    for i in 1..(MAX_JOB_TREE_DEPTH + 5) {
        config = PresubmitConfig {
            run_after_success: vec![config],
            ..PresubmitConfig::new(&format!("job-{}", i))
        };
    }
    let jobs = vec![presubmit(config)];

    assert_eq!(walk_jobs(&jobs).len(), MAX_JOB_TREE_DEPTH);
}

#[test]
fn test_duplicate_names_on_disjoint_branches_are_allowed() {
    let on = |branch: &str| Brancher {
        branches: vec![branch.to_string()],
        skip_branches: vec![],
    };
    let jobs = vec![
        presubmit(PresubmitConfig {
            brancher: on("main"),
            ..PresubmitConfig::new("unit")
        }),
        presubmit(PresubmitConfig {
            brancher: on("release"),
            ..PresubmitConfig::new("unit")
        }),
    ];

    assert!(validate_presubmits(&jobs).is_ok());
}

#[test]
fn test_duplicate_names_on_intersecting_branches_are_rejected() {
    let jobs = vec![
        presubmit(PresubmitConfig::new("unit")),
        presubmit(PresubmitConfig {
            context: Some("other".to_string()),
            ..PresubmitConfig::new("unit")
        }),
    ];

    assert!(matches!(
        validate_presubmits(&jobs),
        Err(ConfigurationError::InvalidJob { .. })
    ));
}

#[test]
fn test_duplicate_contexts_are_rejected() {
    let jobs = vec![
        presubmit(PresubmitConfig::new("unit")),
        presubmit(PresubmitConfig {
            context: Some("unit".to_string()),
            ..PresubmitConfig::new("unit-v2")
        }),
    ];

    let error = validate_presubmits(&jobs).unwrap_err();
    assert!(error.to_string().contains("context unit"));
}

#[test]
fn test_empty_name_is_rejected() {
    let jobs = vec![presubmit(PresubmitConfig::new(""))];
    assert!(validate_presubmits(&jobs).is_err());
}
