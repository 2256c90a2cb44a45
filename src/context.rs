use anyhow::{bail, Context as _, Result};
use regex::Regex;
use std::{
    cmp::Ordering,
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, info};

use crate::{
    config::{BuildType, Config, Platform, VersionDetect, CONFIG_FILE_NAME},
    error::{FreezeError, FreezeResult},
    resolve::Resolver,
};

/// `(major, minor)` of the framework being frozen. Year-based majors
/// (`2014.7.1`) and plain majors (`3001`) both parse; a missing minor is 0.
#[derive(Debug, Clone, Eq)]
pub struct FrameworkVersion {
    pub major: u32,
    pub minor: u32,
    raw: String,
}

impl FrameworkVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            raw: format!("{major}.{minor}"),
        }
    }

    pub fn parse(raw: &str) -> FreezeResult<Self> {
        let s = raw.trim();
        let mut parts = s.split('.');

        let major = parts
            .next()
            .and_then(leading_number)
            .ok_or_else(|| FreezeError::config(format!("invalid framework version '{raw}'")))?;

        let minor = match parts.next() {
            None => 0,
            Some(p) => leading_number(p).ok_or_else(|| {
                FreezeError::config(format!("invalid framework version '{raw}'"))
            })?,
        };

        Ok(Self {
            major,
            minor,
            raw: s.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for FrameworkVersion {
    fn eq(&self, other: &Self) -> bool {
        (self.major, self.minor) == (other.major, other.minor)
    }
}

impl PartialOrd for FrameworkVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrameworkVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor).cmp(&(other.major, other.minor))
    }
}

impl fmt::Display for FrameworkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn leading_number(part: &str) -> Option<u32> {
    let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Process-wide build settings. Resolved once, then only read.
#[derive(Debug, Clone)]
pub struct BuildContext {
    build_type: BuildType,
    platform: Platform,
    version: FrameworkVersion,
    rename_minion: bool,
    prefix: String,
}

impl BuildContext {
    pub fn new(
        build_type: BuildType,
        platform: Platform,
        version: FrameworkVersion,
        rename_minion: bool,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            build_type,
            platform,
            version,
            rename_minion,
            prefix: prefix.into(),
        }
    }

    /// Build type as configured (may be `Default`).
    pub fn build_type(&self) -> BuildType {
        self.build_type
    }

    /// `Default` means minion-only on Windows and both halves elsewhere.
    pub fn effective_build_type(&self) -> BuildType {
        match self.build_type {
            BuildType::Default if self.platform == Platform::Windows => BuildType::MinionOnly,
            BuildType::Default => BuildType::Both,
            other => other,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn version(&self) -> &FrameworkVersion {
        &self.version
    }

    pub fn rename_minion(&self) -> bool {
        self.rename_minion
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

/// Values given on the command line. They win over environment and config.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub build_type: Option<String>,
    pub platform: Option<String>,
    pub framework_version: Option<String>,
    pub prefix: Option<String>,
    pub rename_minion: Option<bool>,
}

/// Snapshot of the process environment plus the located config file.
#[derive(Debug, Clone)]
pub struct ContextEnv {
    vars: BTreeMap<String, String>,
    cwd: PathBuf,
    home: Option<PathBuf>,

    config_path: Option<PathBuf>,
    config_dir: Option<PathBuf>,
}

impl ContextEnv {
    pub fn new() -> Result<Self> {
        let vars: BTreeMap<String, String> = std::env::vars().collect();
        let cwd = std::env::current_dir().context("could not determine working directory")?;
        Ok(Self::from_vars(vars, cwd))
    }

    pub fn from_vars(vars: BTreeMap<String, String>, cwd: PathBuf) -> Self {
        let home = dirs::home_dir()
            .or_else(|| vars.get("HOME").map(PathBuf::from))
            .or_else(|| vars.get("USERPROFILE").map(PathBuf::from));

        Self {
            vars,
            cwd,
            home,
            config_path: None,
            config_dir: None,
        }
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Directory relative paths in the config are anchored to.
    pub fn config_dir(&self) -> &Path {
        self.config_dir.as_deref().unwrap_or(&self.cwd)
    }

    pub fn default_config_path(&self) -> PathBuf {
        self.cwd.join(CONFIG_FILE_NAME)
    }

    /// Config path precedence:
    /// 1) CLI --config
    /// 2) SALTFREEZE_CONFIG
    /// 3) ./saltfreeze.toml
    ///
    /// The file must exist in every case; `saltfreeze init` writes a stub.
    pub fn locate_config(&mut self, cli_config: Option<&Path>) -> Result<PathBuf> {
        let (p, source) = if let Some(p) = cli_config {
            (self.absolute(p), "--config")
        } else if let Some(p) = self.var("SALTFREEZE_CONFIG").map(PathBuf::from) {
            (self.absolute(&p), "SALTFREEZE_CONFIG")
        } else {
            (self.default_config_path(), "default location")
        };

        if !p.is_file() {
            bail!(
                "config file from {source} does not exist: {} \
                 (run `saltfreeze init` to create one)",
                p.display()
            );
        }

        self.set_config_path(p.clone());
        Ok(p)
    }

    fn set_config_path(&mut self, path: PathBuf) {
        self.config_dir = path.parent().map(Path::to_path_buf);
        self.config_path = Some(path);
    }

    /// Anchors a relative path at the config directory.
    pub fn anchor(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.config_dir().join(p)
        }
    }

    fn absolute(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.cwd.join(p)
        }
    }

    /// Resolves every build setting with CLI > environment > config precedence.
    pub fn build_context(&self, cfg: &Config, ov: &Overrides) -> Result<BuildContext> {
        let build_type_raw = ov
            .build_type
            .clone()
            .or_else(|| self.var("SALTFREEZE_BUILD_TYPE").map(str::to_string))
            .unwrap_or_else(|| cfg.saltfreeze.build_type.clone());
        let build_type = BuildType::parse(&build_type_raw)?;

        let platform = match ov
            .platform
            .clone()
            .or_else(|| self.var("SALTFREEZE_PLATFORM").map(str::to_string))
            .or_else(|| cfg.saltfreeze.platform.clone())
        {
            Some(raw) => Platform::parse(&raw)?,
            None => detect_platform(),
        };

        let rename_minion = if let Some(v) = ov.rename_minion {
            v
        } else if let Some(raw) = self.var("SALTFREEZE_RENAME_MINION") {
            parse_bool("SALTFREEZE_RENAME_MINION", raw)?
        } else {
            cfg.saltfreeze.rename_minion
        };

        let prefix = ov
            .prefix
            .clone()
            .or_else(|| self.var("SALTFREEZE_PREFIX").map(str::to_string))
            .unwrap_or_else(|| cfg.saltfreeze.prefix.clone());
        let prefix = prefix.trim().to_string();
        if prefix.is_empty() {
            return Err(FreezeError::config("product prefix cannot be empty").into());
        }

        let version = self.framework_version(cfg, ov)?;

        info!(
            build_type = %build_type,
            platform = %platform,
            version = %version,
            rename_minion,
            prefix = %prefix,
            "build context resolved"
        );

        Ok(BuildContext::new(
            build_type,
            platform,
            version,
            rename_minion,
            prefix,
        ))
    }

    fn framework_version(&self, cfg: &Config, ov: &Overrides) -> Result<FrameworkVersion> {
        let explicit = ov
            .framework_version
            .clone()
            .or_else(|| self.var("SALTFREEZE_FRAMEWORK_VERSION").map(str::to_string))
            .or_else(|| cfg.framework.version.clone());

        if let Some(raw) = explicit {
            return Ok(FrameworkVersion::parse(&raw)?);
        }

        let Some(vd) = cfg.framework.detect.as_ref() else {
            return Err(FreezeError::config(
                "framework version unknown: set framework.version or framework.detect",
            )
            .into());
        };

        let raw = detect_version(self, vd)?;
        debug!(version = %raw, "detected framework version");
        Ok(FrameworkVersion::parse(&raw)?)
    }
}

/// Runs the configured command and pulls the version out of its output.
/// Failure here means the framework is not installed, which is fatal.
fn detect_version(ctx: &ContextEnv, vd: &VersionDetect) -> Result<String> {
    let r = Resolver::new(ctx);

    let cmd = r
        .resolve(&vd.command)
        .with_context(|| format!("failed to resolve version command: {}", vd.command))?;

    if cmd.split_whitespace().count() > 1 {
        bail!("version command must not contain whitespace; use args for flags: {cmd}");
    }

    let mut args = Vec::with_capacity(vd.args.len());
    for a in &vd.args {
        args.push(
            r.resolve(a)
                .with_context(|| format!("failed to resolve version arg: {a}"))?,
        );
    }

    let out = Command::new(&cmd).args(&args).output().map_err(|e| {
        FreezeError::config(format!(
            "missing framework: could not run version command '{cmd}': {e}"
        ))
    })?;
    if !out.status.success() {
        return Err(FreezeError::config(format!(
            "missing framework: version command '{cmd}' exited with {}: {}",
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        ))
        .into());
    }

    let stdout = String::from_utf8_lossy(&out.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
    let text = if !stdout.is_empty() { stdout } else { stderr };

    extract_version(&text, vd.regex.as_deref(), &vd.capture)?.ok_or_else(|| {
        FreezeError::config(format!(
            "version command '{cmd}' produced no recognizable version: {text}"
        ))
        .into()
    })
}

fn extract_version(text: &str, regex: Option<&str>, capture: &str) -> Result<Option<String>> {
    let Some(re_s) = regex else {
        return Ok(text
            .lines()
            .next()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()));
    };

    let re = Regex::new(re_s).with_context(|| format!("invalid version regex: {re_s}"))?;
    let Some(caps) = re.captures(text) else {
        return Ok(None);
    };

    Ok(caps
        .name(capture)
        .or_else(|| caps.get(1))
        .map(|m| m.as_str().to_string()))
}

pub fn detect_platform() -> Platform {
    if cfg!(target_os = "macos") {
        Platform::Mac
    } else if cfg!(target_os = "windows") {
        Platform::Windows
    } else if cfg!(target_os = "linux") {
        Platform::Linux
    } else if cfg!(any(target_os = "solaris", target_os = "illumos")) {
        Platform::Sunos
    } else {
        Platform::Other
    }
}

fn parse_bool(key: &str, raw: &str) -> FreezeResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(FreezeError::config(format!(
            "{key} must be a boolean (true/false), got '{raw}'"
        ))),
    }
}

/// Writes a starter config. Refuses to clobber an existing file unless forced.
pub fn write_default_config_stub(p: &Path, force: bool) -> Result<()> {
    if p.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", p.display());
    }

    let stub = r#"# saltfreeze.toml (created by saltfreeze)
#
# Build settings can also come from SALTFREEZE_* environment variables
# or command-line flags, which take precedence over this file.

[saltfreeze]
schema_version = 1
prefix         = "salt"
build_type     = "default"   # default | both | minion | master
rename_minion  = false
scripts_dir    = "scripts"

[framework]
# version = "2014.7.1"

[framework.detect]
command = "python"
args    = ["-c", "import salt; print(salt.__version__)"]

[python]
search_paths = []

[roots]
use_defaults   = true
extra_required = []
extra_optional = []

[package]
name        = "salt-frozen"
description = ""
license     = "BSD"

[freezer]
bundle_msvcrt      = true
enable_appdata_dir = true

[packager]
# command = "python"
# args    = ["freeze.py", "{manifest}"]
"#;
    fs::write(p, stub).with_context(|| format!("failed to write {}", p.display()))?;
    Ok(())
}
