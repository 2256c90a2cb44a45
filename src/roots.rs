//! Locating the roots a frozen build must embed.
//!
//! A root is a top-level importable unit (package or single module). The set
//! of roots is a pure function of the platform and config; finding each root
//! on disk is a lookup across the configured search paths.

use anyhow::{Context as _, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

use crate::{
    config::{Config, Platform, RootConfig},
    context::{BuildContext, ContextEnv},
    error::FreezeError,
    resolve::Resolver,
};

pub const PACKAGE_INIT: &str = "__init__.py";
pub const SOURCE_EXT: &str = "py";

const EXTENSION_EXTS: [&str; 2] = ["so", "pyd"];

/// A root located on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootModule {
    pub name: String,
    /// Absolute path to the module file or the package's `__init__.py`.
    pub filesystem_path: PathBuf,
    pub optional: bool,
}

impl RootModule {
    pub fn new(name: impl Into<String>, filesystem_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            filesystem_path: filesystem_path.into(),
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn is_package(&self) -> bool {
        self.filesystem_path
            .file_name()
            .is_some_and(|n| n == PACKAGE_INIT)
    }
}

/// What the build wants included, before it has been found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootDescriptor {
    pub name: String,
    pub optional: bool,
    pub path: Option<String>,
}

impl RootDescriptor {
    fn required(name: &str) -> Self {
        Self {
            name: name.to_string(),
            optional: false,
            path: None,
        }
    }

    fn optional(name: &str) -> Self {
        Self {
            name: name.to_string(),
            optional: true,
            path: None,
        }
    }
}

impl From<&RootConfig> for RootDescriptor {
    fn from(r: &RootConfig) -> Self {
        Self {
            name: r.name.clone(),
            optional: r.optional,
            path: r.path.clone(),
        }
    }
}

const COMMON_ROOTS: &[&str] = &[
    "salt",
    "ast",
    "asyncore",
    "Cookie",
    "difflib",
    "distutils",
    "email",
    "fileinput",
    "json",
    "M2Crypto",
    "numbers",
    "requests",
    "sqlite3",
];

const SUNOS_ROOTS: &[&str] = &["libnacl", "ioflo", "raet", "sodium_grabber"];

const WINDOWS_ROOTS: &[&str] = &[
    "ntsecuritycon",
    "psutil",
    "pywintypes",
    "pythoncom",
    "site",
    "win32api",
    "win32file",
    "win32con",
    "win32com",
    "win32net",
    "win32netcon",
    "win32gui",
    "win32security",
    "wmi",
    "_winreg",
];

/// Built-in roots for a platform: the framework, its common stdlib and
/// third-party dependencies, then the platform-specific extras.
pub fn default_roots(platform: Platform) -> Vec<RootDescriptor> {
    let mut out: Vec<RootDescriptor> = COMMON_ROOTS
        .iter()
        .map(|n| RootDescriptor::required(n))
        .collect();

    // zmq transport is optional; raet builds run without it.
    out.push(RootDescriptor::optional("zmq"));

    match platform {
        Platform::Linux => {
            out.push(RootDescriptor::required("spwd"));
            // Not every distribution ships yum.
            out.push(RootDescriptor::optional("yum"));
        }
        Platform::Sunos => {
            out.extend(SUNOS_ROOTS.iter().map(|n| RootDescriptor::required(n)));
        }
        Platform::Windows => {
            out.extend(WINDOWS_ROOTS.iter().map(|n| RootDescriptor::required(n)));
        }
        Platform::Mac | Platform::Other => {}
    }

    out
}

/// Full descriptor list for this build: defaults (unless disabled) followed
/// by configured roots that apply to the platform. A configured root with the
/// same name as an earlier one replaces it.
pub fn collect_roots(cfg: &Config, build: &BuildContext) -> Vec<RootDescriptor> {
    let mut out = if cfg.roots.use_defaults {
        default_roots(build.platform())
    } else {
        Vec::new()
    };

    for r in &cfg.roots.items {
        if !r.platforms.is_empty() && !r.platforms.contains(&build.platform()) {
            continue;
        }
        let d = RootDescriptor::from(r);
        match out.iter_mut().find(|x| x.name == d.name) {
            Some(existing) => *existing = d,
            None => out.push(d),
        }
    }

    out
}

/// Resolves search path entries: tokens expanded, globs expanded in sorted
/// order, relative entries anchored at the config directory, missing
/// directories dropped.
///
/// Only the entry as written is a pattern. The config directory it is
/// anchored at is matched literally.
pub fn search_paths(
    ctx: &ContextEnv,
    build: &BuildContext,
    raw: &[String],
) -> Result<Vec<PathBuf>> {
    let r = Resolver::new(ctx).with_build(build);
    let mut out = Vec::new();

    for entry in raw {
        let resolved = r
            .resolve(entry)
            .with_context(|| format!("python.search_paths: failed to resolve {entry}"))?;

        for p in expand_glob(ctx, &resolved)? {
            if p.is_dir() {
                if !out.contains(&p) {
                    out.push(p);
                }
            } else {
                debug!(path = %p.display(), "search path is not a directory; skipped");
            }
        }
    }

    Ok(out)
}

fn expand_glob(ctx: &ContextEnv, entry: &str) -> Result<Vec<PathBuf>> {
    let p = Path::new(entry);
    if !entry.contains(['*', '?', '[']) {
        return Ok(vec![ctx.anchor(p)]);
    }

    let pattern = if p.is_absolute() {
        entry.to_string()
    } else {
        let base = glob::Pattern::escape(&ctx.config_dir().to_string_lossy());
        Path::new(&base).join(p).to_string_lossy().to_string()
    };

    let mut hits: Vec<PathBuf> = glob::glob(&pattern)
        .with_context(|| format!("invalid glob pattern: {pattern}"))?
        .filter_map(|r| r.ok())
        .collect();
    hits.sort();
    Ok(hits)
}

/// Finds `name` under one search path: package, then source module, then
/// compiled extension module.
pub fn find_in(dir: &Path, name: &str) -> Option<PathBuf> {
    let rel: PathBuf = name.split('.').collect();
    let base = dir.join(&rel);

    let init = base.join(PACKAGE_INIT);
    if init.is_file() {
        return Some(init);
    }

    let source = base.with_extension(SOURCE_EXT);
    if source.is_file() {
        return Some(source);
    }

    for ext in EXTENSION_EXTS {
        let plain = base.with_extension(ext);
        if plain.is_file() {
            return Some(plain);
        }
    }

    // Tagged extension modules, e.g. `_foo.cpython-311-x86_64-linux-gnu.so`.
    // Only the file name is matched, so the directory may hold glob
    // metacharacters.
    let parent = base.parent()?;
    let stem = base.file_name()?.to_string_lossy().to_string();
    let mut names: Vec<String> = fs::read_dir(parent)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();

    for ext in EXTENSION_EXTS {
        let raw = format!("{}.*.{ext}", glob::Pattern::escape(&stem));
        let pattern = glob::Pattern::new(&raw).ok()?;
        if let Some(hit) = names.iter().find(|n| pattern.matches(n)) {
            return Some(parent.join(hit));
        }
    }

    None
}

/// Locates every descriptor. Missing optional roots are dropped; a missing
/// required root aborts with a resolution error.
pub fn locate_roots(
    ctx: &ContextEnv,
    build: &BuildContext,
    descriptors: &[RootDescriptor],
    search: &[PathBuf],
) -> Result<Vec<RootModule>> {
    let r = Resolver::new(ctx).with_build(build);
    let mut out = Vec::with_capacity(descriptors.len());

    for d in descriptors {
        let found = match d.path.as_deref() {
            Some(raw) => {
                let resolved = r
                    .resolve(raw)
                    .with_context(|| format!("roots.{}: failed to resolve path {raw}", d.name))?;
                let p = ctx.anchor(Path::new(&resolved));
                p.is_file().then_some(p)
            }
            None => search.iter().find_map(|dir| find_in(dir, &d.name)),
        };

        match found {
            Some(path) => {
                debug!(root = %d.name, path = %path.display(), "located root");
                let mut m = RootModule::new(&d.name, path);
                m.optional = d.optional;
                out.push(m);
            }
            None if d.optional => {
                info!(root = %d.name, "optional root not found; omitted");
            }
            None => {
                let where_ = d
                    .path
                    .clone()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(search_display(search)));
                return Err(FreezeError::resolution(
                    &d.name,
                    where_,
                    "module not found; verify it is installed in the build environment",
                )
                .into());
            }
        }
    }

    Ok(out)
}

fn search_display(search: &[PathBuf]) -> String {
    if search.is_empty() {
        return "<no search paths>".to_string();
    }
    search
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(":")
}
