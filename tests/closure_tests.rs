//! Closure resolution and root location against package trees on disk.

mod helpers;

use helpers::*;
use saltfreeze::{
    closure, error::FreezeError, roots, roots::RootDescriptor, BuildType, RootModule,
};

fn names(c: &saltfreeze::ModuleClosure) -> Vec<String> {
    c.required.iter().cloned().collect()
}

#[test]
fn test_package_closure_is_complete_and_pruned() {
    let env = TestEnv::new();
    let init = create_mock_package(&env);

    let c = closure::resolve(&[RootModule::new("pkg", init)]).unwrap();

    assert_eq!(names(&c), expected_mock_package_names());
    assert!(c.optional.is_empty());
    // A directory without an initializer hides its whole subtree.
    assert!(!c.contains("pkg.plain"));
    assert!(!c.contains("pkg.plain.x"));
    assert!(!c.contains("pkg.plain.inner"));
    assert!(!c.contains("pkg.notes"));
}

#[test]
fn test_plain_module_root_ignores_siblings() {
    let env = TestEnv::new();
    let single = env.touch("single.py");
    env.touch("sibling.py");
    env.touch("other/__init__.py");

    let c = closure::resolve(&[RootModule::new("single", single)]).unwrap();

    assert_eq!(names(&c), vec!["single"]);
}

#[test]
fn test_dotted_root_keeps_parent_prefix() {
    let env = TestEnv::new();
    create_mock_package(&env);
    let sub_init = env.site.join("pkg/sub/__init__.py");

    let c = closure::resolve(&[RootModule::new("pkg.sub", sub_init)]).unwrap();

    assert_eq!(
        names(&c),
        vec!["pkg.sub", "pkg.sub.b", "pkg.sub.deep", "pkg.sub.deep.c"]
    );
}

#[test]
fn test_resolution_is_idempotent() {
    let env = TestEnv::new();
    let init = create_mock_package(&env);
    let roots = [RootModule::new("pkg", init)];

    let first = closure::resolve(&roots).unwrap();
    let second = closure::resolve(&roots).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_optional_root_lands_in_optional_set() {
    let env = TestEnv::new();
    let init = create_mock_package(&env);
    let zmq = env.touch("zmq/__init__.py");
    env.touch("zmq/backend.py");

    let c = closure::resolve(&[
        RootModule::new("pkg", init),
        RootModule::new("zmq", zmq).optional(),
    ])
    .unwrap();

    assert!(c.required.contains("pkg.sub.b"));
    assert!(c.optional.contains("zmq"));
    assert!(c.optional.contains("zmq.backend"));
    assert!(!c.required.contains("zmq"));
}

#[test]
fn test_unreadable_root_is_a_resolution_error() {
    let env = TestEnv::new();
    let missing = env.site.join("gone/__init__.py");

    let err = closure::resolve(&[RootModule::new("gone", missing)]).unwrap_err();

    assert!(matches!(err, FreezeError::Resolution { ref name, .. } if name == "gone"));
}

#[test]
fn test_find_in_prefers_package_then_source_then_extension() {
    let env = TestEnv::new();
    env.touch("both/__init__.py");
    env.touch("both.py");
    env.touch("plain.py");
    env.touch("_speedups.cpython-311-x86_64-linux-gnu.so");
    env.touch("nested/__init__.py");
    env.touch("nested/leaf.py");

    let found = |n: &str| roots::find_in(&env.site, n);

    assert_eq!(found("both"), Some(env.site.join("both/__init__.py")));
    assert_eq!(found("plain"), Some(env.site.join("plain.py")));
    assert_eq!(
        found("_speedups"),
        Some(env.site.join("_speedups.cpython-311-x86_64-linux-gnu.so"))
    );
    assert_eq!(found("nested.leaf"), Some(env.site.join("nested/leaf.py")));
    assert_eq!(found("absent"), None);
}

#[test]
fn test_locate_roots_omits_missing_optional_and_fails_on_missing_required() {
    let env = TestEnv::new();
    create_mock_package(&env);
    let ctx = env.context_env();
    let build = build_context(BuildType::Both, (2014, 7), false);
    let search = vec![env.site.clone()];

    let descriptor = |name: &str, optional: bool| RootDescriptor {
        name: name.to_string(),
        optional,
        path: None,
    };

    let located = roots::locate_roots(
        &ctx,
        &build,
        &[descriptor("pkg", false), descriptor("ghost", true)],
        &search,
    )
    .unwrap();
    assert_eq!(located.len(), 1);
    assert_eq!(located[0].name, "pkg");
    assert!(located[0].is_package());

    let err = roots::locate_roots(&ctx, &build, &[descriptor("ghost", false)], &search)
        .unwrap_err();
    let fe = err.downcast_ref::<FreezeError>().expect("typed error");
    assert!(matches!(fe, FreezeError::Resolution { name, .. } if name == "ghost"));
}

#[test]
fn test_explicit_root_path_skips_search() {
    let env = TestEnv::new();
    let elsewhere = touch(&env.base.join("vendored/thing.py"));
    let ctx = env.context_env();
    let build = build_context(BuildType::Both, (2014, 7), false);

    let located = roots::locate_roots(
        &ctx,
        &build,
        &[RootDescriptor {
            name: "thing".to_string(),
            optional: false,
            path: Some(elsewhere.to_string_lossy().to_string()),
        }],
        &[],
    )
    .unwrap();

    assert_eq!(located[0].filesystem_path, elsewhere);
    assert!(!located[0].is_package());
}

#[test]
fn test_required_wins_when_root_is_listed_twice() {
    let env = TestEnv::new();
    let init = env.touch("pkg/__init__.py");
    env.touch("pkg/a.py");

    let c = closure::resolve(&[
        RootModule::new("pkg", &init).optional(),
        RootModule::new("pkg", &init),
    ])
    .unwrap();

    assert_eq!(names(&c), vec!["pkg", "pkg.a"]);
    assert!(c.optional.is_empty());
}

#[cfg(unix)]
#[test]
fn test_symlinked_directories_are_not_descended() {
    let env = TestEnv::new();
    let init = create_mock_package(&env);
    let pkg = env.site.join("pkg");
    std::os::unix::fs::symlink(&pkg, pkg.join("again")).unwrap();
    std::os::unix::fs::symlink(pkg.join("sub"), pkg.join("mirror")).unwrap();

    let c = closure::resolve(&[RootModule::new("pkg", init)]).unwrap();

    assert_eq!(names(&c), expected_mock_package_names());
}

#[test]
fn test_find_in_matches_literal_directory_names() {
    let env = TestEnv::new();
    let dir = env.base.join("lib[py3]");
    touch(&dir.join("_speedups.cpython-311-x86_64-linux-gnu.so"));
    touch(&dir.join("_other.abi3.so"));

    assert_eq!(
        roots::find_in(&dir, "_speedups"),
        Some(dir.join("_speedups.cpython-311-x86_64-linux-gnu.so"))
    );
    assert_eq!(roots::find_in(&dir, "_missing"), None);
}

#[test]
fn test_search_path_globs_only_the_configured_entry() {
    let env = TestEnv::new();
    let project = env.base.join("build[1]");
    std::fs::create_dir_all(project.join("site-a")).unwrap();
    std::fs::create_dir_all(project.join("site-b")).unwrap();
    std::fs::create_dir_all(project.join("plain")).unwrap();
    let cfg_path = touch(&project.join("saltfreeze.toml"));

    let mut ctx = env.context_env();
    ctx.locate_config(Some(&cfg_path)).unwrap();
    let build = build_context(BuildType::Both, (2014, 7), false);

    let found = roots::search_paths(
        &ctx,
        &build,
        &["site-*".to_string(), "plain".to_string(), "absent".to_string()],
    )
    .unwrap();

    assert_eq!(
        found,
        vec![
            project.join("site-a"),
            project.join("site-b"),
            project.join("plain")
        ]
    );
}
