//! Shared test utilities: synthetic package trees and configs on disk.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use saltfreeze::{BuildContext, BuildType, ContextEnv, FrameworkVersion, Platform};

/// Temporary build area with a `site/` search path.
pub struct TestEnv {
    /// Kept alive for the lifetime of the env
    pub _temp_dir: TempDir,
    pub base: PathBuf,
    pub site: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let site = base.join("site");
        fs::create_dir_all(&site).expect("Failed to create site dir");
        Self {
            _temp_dir: temp_dir,
            base,
            site,
        }
    }

    /// Creates an empty file (and parents) under `site/`.
    pub fn touch(&self, rel: &str) -> PathBuf {
        touch(&self.site.join(rel))
    }

    pub fn context_env(&self) -> ContextEnv {
        ContextEnv::from_vars(BTreeMap::new(), self.base.clone())
    }

    pub fn write_config(&self, text: &str) -> PathBuf {
        let p = self.base.join("saltfreeze.toml");
        fs::write(&p, text).expect("Failed to write config");
        p
    }
}

pub fn touch(p: &Path) -> PathBuf {
    if let Some(parent) = p.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    fs::write(p, "").expect("Failed to write file");
    p.to_path_buf()
}

/// A package exercising every walk rule:
///
/// ```text
/// pkg/__init__.py
/// pkg/a.py
/// pkg/notes.txt
/// pkg/sub/__init__.py
/// pkg/sub/b.py
/// pkg/sub/__pycache__/b.cpython-311.pyc
/// pkg/sub/deep/__init__.py
/// pkg/sub/deep/c.py
/// pkg/plain/x.py                 (no initializer)
/// pkg/plain/inner/__init__.py    (under a directory without one)
/// ```
pub fn create_mock_package(env: &TestEnv) -> PathBuf {
    let init = env.touch("pkg/__init__.py");
    for rel in [
        "pkg/a.py",
        "pkg/notes.txt",
        "pkg/sub/__init__.py",
        "pkg/sub/b.py",
        "pkg/sub/__pycache__/b.cpython-311.pyc",
        "pkg/sub/deep/__init__.py",
        "pkg/sub/deep/c.py",
        "pkg/plain/x.py",
        "pkg/plain/inner/__init__.py",
    ] {
        env.touch(rel);
    }
    init
}

pub fn expected_mock_package_names() -> Vec<&'static str> {
    vec![
        "pkg",
        "pkg.a",
        "pkg.sub",
        "pkg.sub.b",
        "pkg.sub.deep",
        "pkg.sub.deep.c",
    ]
}

pub fn build_context(build_type: BuildType, version: (u32, u32), rename: bool) -> BuildContext {
    BuildContext::new(
        build_type,
        Platform::Linux,
        FrameworkVersion::new(version.0, version.1),
        rename,
        "salt",
    )
}

/// Config with the mock package as the only root, no defaults.
pub fn mock_config(extra: &str) -> String {
    format!(
        r#"
[saltfreeze]
schema_version = 1
prefix = "salt"
build_type = "both"
platform = "linux"

[framework]
version = "2014.7.1"

[python]
search_paths = ["site"]

[roots]
use_defaults = false
items = [
  {{ name = "pkg" }},
  {{ name = "single" }},
  {{ name = "ghost", optional = true }},
]
extra_required = ["pkg.runtime_loaded"]

{extra}
"#
    )
}
