use anyhow::{Context as _, Result};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fmt,
    path::Path,
};

use crate::error::{FreezeError, FreezeResult};

pub const CONFIG_FILE_NAME: &str = "saltfreeze.toml";
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub saltfreeze: FreezeMeta,

    #[serde(default)]
    pub framework: FrameworkConfig,

    #[serde(default)]
    pub python: PythonConfig,

    #[serde(default)]
    pub roots: RootsConfig,

    #[serde(default)]
    pub entry_points: BTreeMap<String, EntryPointConfig>,

    #[serde(default)]
    pub scripts: ScriptsConfig,

    #[serde(default)]
    pub package: PackageConfig,

    #[serde(default)]
    pub freezer: FreezerConfig,

    #[serde(default)]
    pub packager: PackagerConfig,
}

impl Config {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(text)?;
        if cfg.saltfreeze.schema_version != SCHEMA_VERSION {
            return Err(FreezeError::config(format!(
                "unsupported schema_version {} (expected {SCHEMA_VERSION})",
                cfg.saltfreeze.schema_version
            ))
            .into());
        }
        Ok(cfg)
    }
}

#[derive(Debug, Deserialize)]
pub struct FreezeMeta {
    pub schema_version: u32,

    /// Product prefix used for launcher names (`<prefix>-minion`, ...).
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// One of `default`, `both`, `minion`, `master`. Validated when the build
    /// context is assembled so the error names the valid options.
    #[serde(default = "default_build_type")]
    pub build_type: String,

    #[serde(default)]
    pub rename_minion: bool,

    /// Overrides platform detection (`linux`, `mac`, `sunos`, `windows`, `other`).
    #[serde(default)]
    pub platform: Option<String>,

    /// Scratch directory for generated launchers, relative to the config file.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: String,
}

fn default_prefix() -> String {
    "salt".to_string()
}

fn default_build_type() -> String {
    BuildType::Default.to_string()
}

fn default_scripts_dir() -> String {
    "scripts".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildType {
    Default,
    Both,
    MinionOnly,
    MasterOnly,
}

impl BuildType {
    pub const ALL: [BuildType; 4] = [
        BuildType::Default,
        BuildType::Both,
        BuildType::MinionOnly,
        BuildType::MasterOnly,
    ];

    pub fn parse(raw: &str) -> FreezeResult<Self> {
        let s = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| {
                let valid = Self::ALL.map(|b| b.as_str()).join(", ");
                FreezeError::config(format!(
                    "incorrect build type '{raw}'. Valid options are: {valid}"
                ))
            })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildType::Default => "default",
            BuildType::Both => "both",
            BuildType::MinionOnly => "minion",
            BuildType::MasterOnly => "master",
        }
    }

    pub fn includes_master(self) -> bool {
        matches!(self, BuildType::Both | BuildType::MasterOnly)
    }

    pub fn includes_minion(self) -> bool {
        matches!(self, BuildType::Both | BuildType::MinionOnly)
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Mac,
    Sunos,
    Windows,
    Other,
}

impl Platform {
    /// Accepts our own tags as well as interpreter-style names
    /// (`linux2`, `darwin`, `sunos5`, `win32`).
    pub fn parse(raw: &str) -> FreezeResult<Self> {
        let s = raw.trim().to_ascii_lowercase();
        let p = if s.starts_with("linux") {
            Platform::Linux
        } else if s == "mac" || s == "macos" || s.starts_with("darwin") {
            Platform::Mac
        } else if s.starts_with("sunos") || s == "solaris" || s == "illumos" {
            Platform::Sunos
        } else if s.starts_with("win") {
            Platform::Windows
        } else if s == "other" {
            Platform::Other
        } else {
            return Err(FreezeError::config(format!(
                "unknown platform '{raw}'. Valid options are: linux, mac, sunos, windows, other"
            )));
        };
        Ok(p)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Mac => "mac",
            Platform::Sunos => "sunos",
            Platform::Windows => "windows",
            Platform::Other => "other",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which half of a build a launcher belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Common,
    Master,
    Minion,
}

#[derive(Debug, Default, Deserialize)]
pub struct FrameworkConfig {
    /// Explicit version, e.g. "2014.7.1". Wins over `detect`.
    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub detect: Option<VersionDetect>,
}

#[derive(Debug, Deserialize)]
pub struct VersionDetect {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub regex: Option<String>,

    #[serde(default = "default_version_capture")]
    pub capture: String,
}

fn default_version_capture() -> String {
    "version".to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct PythonConfig {
    /// Directories searched for roots, in order. Tokens and glob patterns allowed.
    #[serde(default)]
    pub search_paths: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RootsConfig {
    #[serde(default = "default_true")]
    pub use_defaults: bool,

    #[serde(default)]
    pub items: Vec<RootConfig>,

    /// Names declared verbatim; for modules only imported through runtime strings.
    #[serde(default)]
    pub extra_required: Vec<String>,

    #[serde(default)]
    pub extra_optional: Vec<String>,
}

impl Default for RootsConfig {
    fn default() -> Self {
        Self {
            use_defaults: true,
            items: Vec::new(),
            extra_required: Vec::new(),
            extra_optional: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RootConfig {
    pub name: String,

    #[serde(default)]
    pub optional: bool,

    #[serde(default)]
    pub platforms: Vec<Platform>,

    /// Skips the search-path lookup. Must point at the module file or `__init__.py`.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntryPointConfig {
    pub module: String,
    pub callable: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScriptsConfig {
    /// Custom minijinja launcher template (path, tokens allowed).
    #[serde(default)]
    pub template: Option<String>,

    /// Keyed by logical launcher id (`api`, `minion`, ...). Entries matching a
    /// built-in id override its fields; other ids add new launchers.
    #[serde(flatten, default)]
    pub items: BTreeMap<String, ScriptConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Output name, tokens allowed (`{prefix}-api`).
    #[serde(default)]
    pub name: Option<String>,

    /// Entry registry id.
    #[serde(default)]
    pub entry: Option<String>,

    /// Custom invocation expression; defaults to `<callable>()`.
    #[serde(default)]
    pub call: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub side: Option<Side>,

    #[serde(default)]
    pub min_version: Option<String>,

    #[serde(default)]
    pub platforms: Vec<Platform>,
}

#[derive(Debug, Deserialize)]
pub struct PackageConfig {
    #[serde(default = "default_package_name")]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub author_email: String,

    #[serde(default)]
    pub url: String,

    #[serde(default = "default_license")]
    pub license: String,

    /// README file whose text becomes the long description.
    #[serde(default)]
    pub readme: Option<String>,

    /// Requirements file, one requirement per line.
    #[serde(default)]
    pub requirements: Option<String>,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            name: default_package_name(),
            description: String::new(),
            author: String::new(),
            author_email: String::new(),
            url: String::new(),
            license: default_license(),
            readme: None,
            requirements: None,
        }
    }
}

fn default_package_name() -> String {
    "salt-frozen".to_string()
}

fn default_license() -> String {
    "BSD".to_string()
}

#[derive(Debug, Deserialize)]
pub struct FreezerConfig {
    #[serde(default = "default_true")]
    pub bundle_msvcrt: bool,

    #[serde(default = "default_true")]
    pub enable_appdata_dir: bool,
}

impl Default for FreezerConfig {
    fn default() -> Self {
        Self {
            bundle_msvcrt: true,
            enable_appdata_dir: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PackagerConfig {
    #[serde(default)]
    pub command: Option<String>,

    /// Tokens `{manifest}` and `{scripts_dir}` are available here.
    #[serde(default)]
    pub args: Vec<String>,
}
