use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::context::Overrides;

#[derive(Parser, Debug)]
#[command(name = "saltfreeze", version, about)]
pub struct Args {
    /// Path to saltfreeze.toml (overrides SALTFREEZE_CONFIG and ./saltfreeze.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print a report of the resolved plan to stderr
    #[arg(long, value_enum, default_value_t = ReportMode::Off, global = true)]
    pub report: ReportMode,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve the module closure and launcher set; print them as JSON
    Plan {
        #[command(flatten)]
        build: BuildArgs,

        /// Write the plan to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Print one launcher (by output name or logical id)
    Render {
        #[command(flatten)]
        build: BuildArgs,

        name: String,
    },

    /// Generate launchers and hand everything to the packager
    Freeze {
        #[command(flatten)]
        build: BuildArgs,
    },

    /// Write a starter saltfreeze.toml
    Init {
        /// Overwrite an existing file
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct BuildArgs {
    /// default | both | minion | master
    #[arg(long)]
    pub build_type: Option<String>,

    /// linux | mac | sunos | windows | other
    #[arg(long)]
    pub platform: Option<String>,

    /// Framework version, e.g. 2014.7.1 (skips detection)
    #[arg(long)]
    pub framework_version: Option<String>,

    /// Product prefix for launcher names
    #[arg(long)]
    pub prefix: Option<String>,

    /// In minion-only builds, name the minion launcher after the bare product.
    /// `--rename-minion` alone means true; `--rename-minion=false` turns off a
    /// rename requested by the environment or config.
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_name = "BOOL"
    )]
    pub rename_minion: Option<bool>,
}

impl BuildArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            build_type: self.build_type.clone(),
            platform: self.platform.clone(),
            framework_version: self.framework_version.clone(),
            prefix: self.prefix.clone(),
            rename_minion: self.rename_minion,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportMode {
    Off,
    Summary,
    Full,
}
