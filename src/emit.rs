//! Writing generated launchers into the scratch directory.

use anyhow::{Context as _, Result};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

use crate::{
    context::BuildContext,
    error::{FreezeError, FreezeResult},
    scripts::{synthesize, LaunchSpec},
    templates::LauncherTemplate,
};

pub const LAUNCHER_EXT: &str = "py";

/// A directory created for one run and removed when dropped, whether the run
/// succeeded or not.
///
/// Creation fails if the path already exists: launchers left over from an
/// earlier run must never reach the packager.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn create(path: &Path) -> FreezeResult<Self> {
        // `create_dir` (not `create_dir_all`) so a directory appearing between
        // a check and the create still counts as a conflict.
        match fs::create_dir(path) {
            Ok(()) => Ok(Self {
                path: path.to_path_buf(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(FreezeError::EnvironmentConflict {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => Err(FreezeError::config(format!(
                "cannot create scripts directory {}: {e}",
                path.display()
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove scripts directory");
        }
    }
}

/// Renders every planned launcher into `dir` as `<output_name>.py`.
/// Returns output name → written path.
pub fn write_launchers(
    dir: &Path,
    planned: &BTreeMap<String, LaunchSpec>,
    build: &BuildContext,
    template: &LauncherTemplate,
) -> Result<BTreeMap<String, PathBuf>> {
    let mut written = BTreeMap::new();

    for (name, spec) in planned {
        let Some(text) = synthesize(spec, build, template)? else {
            continue;
        };

        let path = dir.join(format!("{name}.{LAUNCHER_EXT}"));
        info!(path = %path.display(), "creating launcher");
        fs::write(&path, text)
            .with_context(|| format!("failed to write launcher {}", path.display()))?;
        written.insert(name.clone(), path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scratch_dir_is_removed_on_drop() {
        let tmp = TempDir::new().unwrap();
        let p = tmp.path().join("scripts");
        {
            let s = ScratchDir::create(&p).unwrap();
            fs::write(s.path().join("x.py"), "x").unwrap();
            assert!(p.is_dir());
        }
        assert!(!p.exists());
    }

    #[test]
    fn existing_scratch_dir_is_a_conflict_and_untouched() {
        let tmp = TempDir::new().unwrap();
        let p = tmp.path().join("scripts");
        fs::create_dir(&p).unwrap();
        fs::write(p.join("stale.py"), "old").unwrap();

        let err = ScratchDir::create(&p).unwrap_err();
        assert!(matches!(err, FreezeError::EnvironmentConflict { .. }));
        assert_eq!(fs::read_to_string(p.join("stale.py")).unwrap(), "old");
    }
}
