pub mod build;
pub mod cli;
pub mod closure;
pub mod config;
pub mod context;
pub mod emit;
pub mod error;
pub mod report;
pub mod resolve;
pub mod roots;
pub mod scripts;
pub mod templates;

// Convenience re-exports
pub use build::{prepare, FreezePlan};
pub use closure::{resolve, ModuleClosure};
pub use config::{BuildType, Config, Platform};
pub use context::{BuildContext, ContextEnv, FrameworkVersion, Overrides};
pub use error::FreezeError;
pub use roots::RootModule;
pub use scripts::{synthesize, EntryRegistry, LaunchSpec};
