use anyhow::{Context as _, Result};
use std::collections::BTreeMap;
use tracing::debug;

use crate::{
    config::{BuildType, EntryPointConfig, Platform, ScriptConfig, Side},
    context::{BuildContext, FrameworkVersion},
    error::{FreezeError, FreezeResult},
    resolve::Resolver,
    templates::LauncherTemplate,
};

pub const FRAMEWORK_SCRIPTS_MODULE: &str = "salt.scripts";
pub const MINION_SUFFIX: &str = "-minion";

pub const MAIN_DESCRIPTION: &str =
    "Publish commands to the salt system from the command line on the master.";
pub const API_DESCRIPTION: &str =
    "Publish commands to the salt api system from the command line on the master.";
pub const CALL_DESCRIPTION: &str =
    "Directly call a salt command in the modules, does not require a running salt minion to run.";
pub const CLOUD_DESCRIPTION: &str =
    "Publish commands to the salt system from the command line on the master.";
pub const CP_DESCRIPTION: &str =
    "Publish commands to the salt system from the command line on the master.";
pub const KEY_DESCRIPTION: &str = "Manage the authentication keys with salt";
pub const MASTER_DESCRIPTION: &str = "Start the salt master";
pub const MINION_DESCRIPTION: &str = "Start the salt minion";
pub const RUN_DESCRIPTION: &str = "Execute a salt convenience routine";
pub const SSH_DESCRIPTION: &str = "Execute the salt ssh system";
pub const SYNDIC_DESCRIPTION: &str = "This script is used to kick off a salt syndic daemon";

/// The api entry point first shipped in 2014.7.
pub const API_MIN_VERSION: (u32, u32) = (2014, 7);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub module: String,
    pub callable: String,
}

impl EntryPoint {
    pub fn new(module: &str, callable: &str) -> FreezeResult<Self> {
        if !module.split('.').all(is_identifier) {
            return Err(FreezeError::config(format!(
                "entry point module '{module}' is not a dotted identifier"
            )));
        }
        if !is_identifier(callable) {
            return Err(FreezeError::config(format!(
                "entry point callable '{callable}' is not an identifier"
            )));
        }
        Ok(Self {
            module: module.to_string(),
            callable: callable.to_string(),
        })
    }
}

fn is_identifier(s: &str) -> bool {
    let mut it = s.chars();
    match it.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    it.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Logical entry id → the callable a launcher imports.
#[derive(Debug, Clone, Default)]
pub struct EntryRegistry {
    entries: BTreeMap<String, EntryPoint>,
}

impl EntryRegistry {
    /// The framework's public script functions.
    pub fn builtin() -> Self {
        let mut entries = BTreeMap::new();
        for callable in [
            "salt_main",
            "salt_api",
            "salt_call",
            "salt_cloud",
            "salt_cp",
            "salt_key",
            "salt_master",
            "salt_minion",
            "salt_run",
            "salt_ssh",
            "salt_syndic",
        ] {
            entries.insert(
                callable.to_string(),
                EntryPoint {
                    module: FRAMEWORK_SCRIPTS_MODULE.to_string(),
                    callable: callable.to_string(),
                },
            );
        }
        Self { entries }
    }

    pub fn with_config(cfg: &BTreeMap<String, EntryPointConfig>) -> FreezeResult<Self> {
        let mut reg = Self::builtin();
        for (id, e) in cfg {
            reg.insert(id, EntryPoint::new(&e.module, &e.callable)?);
        }
        Ok(reg)
    }

    pub fn insert(&mut self, id: &str, entry: EntryPoint) {
        self.entries.insert(id.to_string(), entry);
    }

    pub fn get(&self, id: &str) -> Option<&EntryPoint> {
        self.entries.get(id)
    }

    pub fn require(&self, id: &str) -> FreezeResult<&EntryPoint> {
        self.get(id)
            .ok_or_else(|| FreezeError::config(format!("unknown entry point '{id}'")))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &EntryPoint)> {
        self.entries.iter()
    }
}

/// One launcher the build may produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Logical id (`minion`, `api`, ...). Orders collisions.
    pub id: String,
    pub output_name: String,
    pub entry_import: EntryPoint,
    pub entry_call: String,
    pub description: String,
    pub side: Side,
    pub min_version: Option<FrameworkVersion>,
    pub platforms: Vec<Platform>,
}

impl LaunchSpec {
    pub fn new(
        id: impl Into<String>,
        output_name: impl Into<String>,
        entry: EntryPoint,
        description: impl Into<String>,
    ) -> Self {
        let entry_call = format!("{}()", entry.callable);
        Self {
            id: id.into(),
            output_name: output_name.into(),
            entry_import: entry,
            entry_call,
            description: description.into(),
            side: Side::Common,
            min_version: None,
            platforms: Vec::new(),
        }
    }

    pub fn with_side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }

    pub fn with_call(mut self, call: impl Into<String>) -> Self {
        self.entry_call = call.into();
        self
    }

    pub fn with_min_version(mut self, v: FrameworkVersion) -> Self {
        self.min_version = Some(v);
        self
    }

    pub fn with_platforms(mut self, platforms: Vec<Platform>) -> Self {
        self.platforms = platforms;
        self
    }

    /// Build type, version gate and platform allow-list must all admit it.
    pub fn is_applicable(&self, ctx: &BuildContext) -> bool {
        side_enabled(self.side, ctx.effective_build_type())
            && self.min_version.as_ref().map_or(true, |min| ctx.version() >= min)
            && (self.platforms.is_empty() || self.platforms.contains(&ctx.platform()))
    }
}

fn side_enabled(side: Side, bt: BuildType) -> bool {
    match side {
        Side::Common => true,
        Side::Master => bt.includes_master(),
        Side::Minion => bt.includes_minion(),
    }
}

struct Builtin {
    id: &'static str,
    suffix: &'static str,
    entry: &'static str,
    side: Side,
    description: &'static str,
    min_version: Option<(u32, u32)>,
}

const fn builtin(
    id: &'static str,
    suffix: &'static str,
    entry: &'static str,
    side: Side,
    description: &'static str,
) -> Builtin {
    Builtin {
        id,
        suffix,
        entry,
        side,
        description,
        min_version: None,
    }
}

const BUILTINS: &[Builtin] = &[
    Builtin {
        min_version: Some(API_MIN_VERSION),
        ..builtin("api", "-api", "salt_api", Side::Master, API_DESCRIPTION)
    },
    builtin("call", "-call", "salt_call", Side::Minion, CALL_DESCRIPTION),
    builtin("cloud", "-cloud", "salt_cloud", Side::Master, CLOUD_DESCRIPTION),
    builtin("cp", "-cp", "salt_cp", Side::Common, CP_DESCRIPTION),
    builtin("key", "-key", "salt_key", Side::Master, KEY_DESCRIPTION),
    builtin("main", "", "salt_main", Side::Master, MAIN_DESCRIPTION),
    builtin("master", "-master", "salt_master", Side::Master, MASTER_DESCRIPTION),
    builtin("minion", MINION_SUFFIX, "salt_minion", Side::Minion, MINION_DESCRIPTION),
    builtin("run", "-run", "salt_run", Side::Master, RUN_DESCRIPTION),
    builtin("ssh", "-ssh", "salt_ssh", Side::Master, SSH_DESCRIPTION),
    builtin("syndic", "-syndic", "salt_syndic", Side::Master, SYNDIC_DESCRIPTION),
];

/// Every launcher the framework offers, keyed by logical id, with output
/// names built from the product prefix. No gating is applied here.
pub fn builtin_catalog(
    ctx: &BuildContext,
    registry: &EntryRegistry,
) -> FreezeResult<BTreeMap<String, LaunchSpec>> {
    let mut out = BTreeMap::new();
    for b in BUILTINS {
        let entry = registry.require(b.entry)?.clone();
        let mut spec = LaunchSpec::new(
            b.id,
            format!("{}{}", ctx.prefix(), b.suffix),
            entry,
            b.description,
        )
        .with_side(b.side);
        if let Some((major, minor)) = b.min_version {
            spec = spec.with_min_version(FrameworkVersion::new(major, minor));
        }
        out.insert(b.id.to_string(), spec);
    }
    Ok(out)
}

/// Built-in catalog with `[scripts.<id>]` overrides applied. Unknown ids add
/// new launchers and must name an entry point; `enabled = false` drops one.
pub fn catalog(
    ctx: &BuildContext,
    registry: &EntryRegistry,
    overrides: &BTreeMap<String, ScriptConfig>,
    resolver: &Resolver<'_>,
) -> Result<BTreeMap<String, LaunchSpec>> {
    let mut out = builtin_catalog(ctx, registry)?;

    for (id, o) in overrides {
        if !o.enabled {
            out.remove(id);
            continue;
        }

        let name = match o.name.as_deref() {
            Some(raw) => Some(
                resolver
                    .resolve(raw)
                    .with_context(|| format!("scripts.{id}: failed to resolve name: {raw}"))?,
            ),
            None => None,
        };

        let mut spec = match out.remove(id) {
            Some(existing) => existing,
            None => {
                let entry_id = o.entry.as_deref().ok_or_else(|| {
                    FreezeError::config(format!("scripts.{id}: new launcher needs an entry"))
                })?;
                let output = name.clone().unwrap_or_else(|| format!("{}-{id}", ctx.prefix()));
                LaunchSpec::new(id.as_str(), output, registry.require(entry_id)?.clone(), "")
            }
        };

        if let Some(entry_id) = o.entry.as_deref() {
            let entry = registry.require(entry_id)?.clone();
            spec.entry_call = format!("{}()", entry.callable);
            spec.entry_import = entry;
        }
        if let Some(n) = name {
            spec.output_name = n;
        }
        if let Some(call) = o.call.as_deref() {
            spec.entry_call = call.to_string();
        }
        if let Some(d) = o.description.as_deref() {
            spec.description = d.to_string();
        }
        if let Some(side) = o.side {
            spec.side = side;
        }
        if let Some(raw) = o.min_version.as_deref() {
            spec.min_version = Some(FrameworkVersion::parse(raw)?);
        }
        if !o.platforms.is_empty() {
            spec.platforms = o.platforms.clone();
        }

        out.insert(id.clone(), spec);
    }

    Ok(out)
}

/// Final output name → spec for this build.
///
/// 1. Minion rename (minion-only builds with the flag set): the
///    `<prefix>-minion` launcher takes over the bare product name and the
///    spec that held the bare name is dropped.
/// 2. Specs that do not apply to the build are dropped.
/// 3. Specs are placed by output name in logical-id order; on a collision the
///    later id wins.
pub fn plan<I>(specs: I, ctx: &BuildContext) -> BTreeMap<String, LaunchSpec>
where
    I: IntoIterator<Item = LaunchSpec>,
{
    let mut specs: Vec<LaunchSpec> = specs.into_iter().collect();
    specs.sort_by(|a, b| a.id.cmp(&b.id));

    if ctx.rename_minion() && ctx.effective_build_type() == BuildType::MinionOnly {
        let bare = ctx.prefix().to_string();
        let minion_name = format!("{bare}{MINION_SUFFIX}");

        if specs.iter().any(|s| s.output_name == minion_name) {
            specs.retain(|s| s.output_name != bare);
            for s in specs.iter_mut().filter(|s| s.output_name == minion_name) {
                debug!(from = %minion_name, to = %bare, "renaming minion launcher");
                s.output_name = bare.clone();
            }
        }
    }

    let mut out = BTreeMap::new();
    for spec in specs {
        if !spec.is_applicable(ctx) {
            debug!(id = %spec.id, output = %spec.output_name, "launcher not applicable; skipped");
            continue;
        }
        if let Some(prev) = out.insert(spec.output_name.clone(), spec) {
            debug!(id = %prev.id, output = %prev.output_name, "launcher replaced by a later spec");
        }
    }
    out
}

/// Launcher text for `spec`, or `None` when it does not apply to the build.
pub fn synthesize(
    spec: &LaunchSpec,
    ctx: &BuildContext,
    template: &LauncherTemplate,
) -> Result<Option<String>> {
    if !spec.is_applicable(ctx) {
        return Ok(None);
    }
    let text = template
        .render(spec, ctx)
        .with_context(|| format!("failed to render launcher {}", spec.output_name))?;
    Ok(Some(text))
}
