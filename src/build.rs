//! Orchestration: config → plan → launchers + manifest → packager.
//!
//! Everything that can fail on bad configuration is checked in [`prepare`]
//! before the filesystem is touched. [`freeze`] owns the scratch directory
//! for the whole hand-off and removes it on every exit path.

use anyhow::{Context as _, Result};
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::info;

use crate::{
    closure::{self, ModuleClosure},
    config::Config,
    context::{BuildContext, ContextEnv, Overrides},
    emit::{write_launchers, ScratchDir},
    error::{FreezeError, FreezeResult},
    resolve::{ExtraTokens, Resolver},
    roots::{self, RootModule},
    scripts::{self, EntryRegistry, LaunchSpec},
    templates::LauncherTemplate,
};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_ENV: &str = "SALTFREEZE_MANIFEST";

/// Everything a run will produce, computed without writing anything.
#[derive(Debug)]
pub struct FreezePlan {
    pub build: BuildContext,
    pub roots: Vec<RootModule>,
    pub closure: ModuleClosure,
    /// Output name → launcher.
    pub launchers: BTreeMap<String, LaunchSpec>,
    pub template: LauncherTemplate,
}

pub fn prepare(ctx: &ContextEnv, cfg: &Config, ov: &Overrides) -> Result<FreezePlan> {
    let build = ctx.build_context(cfg, ov)?;
    let resolver = Resolver::new(ctx).with_build(&build);

    let registry = EntryRegistry::with_config(&cfg.entry_points)?;

    let template = match cfg.scripts.template.as_deref() {
        Some(raw) => {
            let p = resolver
                .resolve(raw)
                .with_context(|| format!("scripts.template: failed to resolve {raw}"))?;
            LauncherTemplate::load(&ctx.anchor(Path::new(&p)))?
        }
        None => LauncherTemplate::builtin()?,
    };

    let catalog = scripts::catalog(&build, &registry, &cfg.scripts.items, &resolver)?;
    let launchers = scripts::plan(catalog.into_values(), &build);
    info!(launchers = launchers.len(), "launcher set planned");

    let descriptors = roots::collect_roots(cfg, &build);
    let search = roots::search_paths(ctx, &build, &cfg.python.search_paths)?;
    let located = roots::locate_roots(ctx, &build, &descriptors, &search)?;

    let mut closure = closure::resolve(&located)?;
    closure.extend_manual(&cfg.roots.extra_required, &cfg.roots.extra_optional);

    Ok(FreezePlan {
        build,
        roots: located,
        closure,
        launchers,
        template,
    })
}

/// [`prepare`] for a `freeze` run: settings only `freeze` needs are checked
/// first, so they are reported before any resolution error.
pub fn prepare_freeze(ctx: &ContextEnv, cfg: &Config, ov: &Overrides) -> Result<FreezePlan> {
    packager_command(cfg)?;
    prepare(ctx, cfg, ov)
}

pub fn packager_command(cfg: &Config) -> FreezeResult<&str> {
    cfg.packager
        .command
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| FreezeError::config("packager.command is required for freeze"))
}

impl FreezePlan {
    /// Launcher text for an output name or logical id.
    pub fn render(&self, name: &str) -> Result<String> {
        let spec = self
            .launchers
            .get(name)
            .or_else(|| self.launchers.values().find(|s| s.id == name))
            .ok_or_else(|| {
                let known = self.launchers.keys().cloned().collect::<Vec<_>>().join(", ");
                anyhow::anyhow!("no launcher '{name}' in this build (have: {known})")
            })?;

        scripts::synthesize(spec, &self.build, &self.template)?
            .ok_or_else(|| anyhow::anyhow!("launcher '{name}' does not apply to this build"))
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            build_type: self.build.effective_build_type().to_string(),
            platform: self.build.platform().to_string(),
            version: self.build.version().to_string(),
            prefix: self.build.prefix().to_string(),
            rename_minion: self.build.rename_minion(),
            roots: self
                .roots
                .iter()
                .map(|r| RootSummary {
                    name: r.name.clone(),
                    path: r.filesystem_path.clone(),
                    package: r.is_package(),
                    optional: r.optional,
                })
                .collect(),
            includes: Includes::from(&self.closure),
            launchers: self
                .launchers
                .values()
                .map(|s| LauncherSummary {
                    name: s.output_name.clone(),
                    id: s.id.clone(),
                    import: format!("{}.{}", s.entry_import.module, s.entry_import.callable),
                    call: s.entry_call.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlanSummary {
    pub build_type: String,
    pub platform: String,
    pub version: String,
    pub prefix: String,
    pub rename_minion: bool,
    pub roots: Vec<RootSummary>,
    pub includes: Includes,
    pub launchers: Vec<LauncherSummary>,
}

#[derive(Debug, Serialize)]
pub struct RootSummary {
    pub name: String,
    pub path: PathBuf,
    pub package: bool,
    pub optional: bool,
}

#[derive(Debug, Serialize)]
pub struct LauncherSummary {
    pub name: String,
    pub id: String,
    pub import: String,
    pub call: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Includes {
    pub required: BTreeSet<String>,
    pub optional: BTreeSet<String>,
}

impl From<&ModuleClosure> for Includes {
    fn from(c: &ModuleClosure) -> Self {
        Self {
            required: c.required.clone(),
            optional: c.optional.clone(),
        }
    }
}

/// What the packager receives.
#[derive(Debug, Serialize)]
pub struct FreezeManifest {
    pub name: String,
    pub version: String,
    pub description: String,
    pub long_description: String,
    pub author: String,
    pub author_email: String,
    pub url: String,
    pub license: String,
    pub install_requires: Vec<String>,
    pub scripts: Vec<PathBuf>,
    pub includes: Includes,
    pub freezer_options: FreezerOptions,
}

#[derive(Debug, Serialize)]
pub struct FreezerOptions {
    pub bundle_msvcrt: bool,
    pub enable_appdata_dir: bool,
}

pub fn manifest(
    ctx: &ContextEnv,
    cfg: &Config,
    plan: &FreezePlan,
    scripts: &BTreeMap<String, PathBuf>,
) -> Result<FreezeManifest> {
    let pkg = &cfg.package;

    let long_description = match pkg.readme.as_deref() {
        Some(p) => {
            let path = ctx.anchor(Path::new(p));
            let text = fs::read_to_string(&path)
                .with_context(|| format!("failed to read readme {}", path.display()))?;
            format!("{text}\n\n")
        }
        None => String::new(),
    };

    let install_requires = match pkg.requirements.as_deref() {
        Some(p) => {
            let path = ctx.anchor(Path::new(p));
            let text = fs::read_to_string(&path)
                .with_context(|| format!("failed to read requirements {}", path.display()))?;
            parse_requirements(&text)
        }
        None => Vec::new(),
    };

    Ok(FreezeManifest {
        name: pkg.name.clone(),
        version: plan.build.version().to_string(),
        description: pkg.description.clone(),
        long_description,
        author: pkg.author.clone(),
        author_email: pkg.author_email.clone(),
        url: pkg.url.clone(),
        license: pkg.license.clone(),
        install_requires,
        scripts: scripts.values().cloned().collect(),
        includes: Includes::from(&plan.closure),
        freezer_options: FreezerOptions {
            bundle_msvcrt: cfg.freezer.bundle_msvcrt,
            enable_appdata_dir: cfg.freezer.enable_appdata_dir,
        },
    })
}

fn parse_requirements(text: &str) -> Vec<String> {
    text.lines()
        .map(|l| l.split('#').next().unwrap_or("").trim())
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn scripts_dir(ctx: &ContextEnv, cfg: &Config) -> PathBuf {
    ctx.anchor(Path::new(&cfg.saltfreeze.scripts_dir))
}

/// Writes launchers and manifest into a fresh scratch directory, runs the
/// packager against them, then removes the directory.
pub fn freeze(ctx: &ContextEnv, cfg: &Config, plan: &FreezePlan) -> Result<()> {
    let command = packager_command(cfg)?;

    let dir = scripts_dir(ctx, cfg);
    let scratch = ScratchDir::create(&dir)?;

    let written = write_launchers(scratch.path(), &plan.launchers, &plan.build, &plan.template)?;
    info!(count = written.len(), dir = %scratch.path().display(), "launchers written");

    let manifest = manifest(ctx, cfg, plan, &written)?;
    let manifest_path = scratch.path().join(MANIFEST_FILE);
    let json = serde_json::to_string_pretty(&manifest)?;
    fs::write(&manifest_path, json)
        .with_context(|| format!("failed to write {}", manifest_path.display()))?;

    run_packager(ctx, &plan.build, command, &cfg.packager.args, &manifest_path, scratch.path())?;

    info!(name = %manifest.name, version = %manifest.version, "freeze complete");
    Ok(())
}

fn run_packager(
    ctx: &ContextEnv,
    build: &BuildContext,
    command: &str,
    raw_args: &[String],
    manifest_path: &Path,
    scripts_dir: &Path,
) -> Result<()> {
    let mut extra = ExtraTokens::new();
    extra.insert(
        "manifest".to_string(),
        manifest_path.to_string_lossy().to_string(),
    );
    extra.insert(
        "scripts_dir".to_string(),
        scripts_dir.to_string_lossy().to_string(),
    );
    let r = Resolver::new(ctx).with_build(build).with_extra(&extra);

    let cmd = r
        .resolve(command)
        .with_context(|| format!("packager.command: failed to resolve {command}"))?;
    let mut args = Vec::with_capacity(raw_args.len());
    for a in raw_args {
        args.push(
            r.resolve(a)
                .with_context(|| format!("packager.args: failed to resolve {a}"))?,
        );
    }

    info!(command = %cmd, args = ?args, "running packager");
    let status = Command::new(&cmd)
        .args(&args)
        .env(MANIFEST_ENV, manifest_path)
        .current_dir(ctx.config_dir())
        .status()
        .map_err(|e| FreezeError::Packager {
            command: cmd.clone(),
            reason: e.to_string(),
        })?;

    if !status.success() {
        return Err(FreezeError::Packager {
            command: cmd,
            reason: format!("exited with {status}"),
        }
        .into());
    }
    Ok(())
}
