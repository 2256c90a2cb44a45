//! Module closure resolution.
//!
//! Freezers only embed what they can see imported statically. The framework
//! loads most of its modules dynamically, so every module under each package
//! root has to be declared up front. This walks each package root on disk and
//! turns what it finds into dotted module names.

use std::{
    collections::BTreeSet,
    path::{Component, Path, PathBuf},
};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::{
    error::{FreezeError, FreezeResult},
    roots::{RootModule, PACKAGE_INIT, SOURCE_EXT},
};

/// Names to declare to the freezer. A name in both sets is only required.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleClosure {
    pub required: BTreeSet<String>,
    pub optional: BTreeSet<String>,
}

impl ModuleClosure {
    pub fn contains(&self, name: &str) -> bool {
        self.required.contains(name) || self.optional.contains(name)
    }

    pub fn len(&self) -> usize {
        self.required.len() + self.optional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.optional.is_empty()
    }

    /// Every name, sorted.
    pub fn all(&self) -> BTreeSet<String> {
        self.required.union(&self.optional).cloned().collect()
    }

    /// Adds names that no directory walk can find (imported via strings built
    /// at runtime).
    pub fn extend_manual(&mut self, required: &[String], optional: &[String]) {
        for n in required.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            self.optional.remove(n);
            self.required.insert(n.to_string());
        }
        for n in optional.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            if !self.required.contains(n) {
                self.optional.insert(n.to_string());
            }
        }
    }
}

/// Expands roots into the full set of module names.
pub fn resolve(roots: &[RootModule]) -> FreezeResult<ModuleClosure> {
    let mut closure = ModuleClosure::default();

    for root in roots {
        let path = absolute(&root.filesystem_path).map_err(|e| {
            FreezeError::resolution(&root.name, &root.filesystem_path, e.to_string())
        })?;

        // Readability check: a dangling or unreadable path fails here rather
        // than producing a silently short closure.
        std::fs::metadata(&path)
            .map_err(|e| FreezeError::resolution(&root.name, &path, e.to_string()))?;

        let names = if root.is_package() {
            package_names(&root.name, &path)?
        } else {
            BTreeSet::from([root.name.clone()])
        };

        debug!(root = %root.name, modules = names.len(), "resolved root");

        let target = if root.optional {
            &mut closure.optional
        } else {
            &mut closure.required
        };
        target.extend(names);
    }

    // Required wins when a name is reachable from both kinds of root.
    let overlap: Vec<String> = closure
        .optional
        .intersection(&closure.required)
        .cloned()
        .collect();
    for n in overlap {
        closure.optional.remove(&n);
    }

    info!(
        roots = roots.len(),
        required = closure.required.len(),
        optional = closure.optional.len(),
        "module closure resolved"
    );

    Ok(closure)
}

/// Names for one package root: the root itself, each sub-package that has an
/// initializer, and each source module directly inside such a directory.
/// A directory without an initializer is not importable, so it and
/// everything under it is skipped.
fn package_names(root_name: &str, init_path: &Path) -> FreezeResult<BTreeSet<String>> {
    let pkg_dir = init_path
        .parent()
        .ok_or_else(|| FreezeError::resolution(root_name, init_path, "package has no directory"))?;

    let mut found: Vec<PathBuf> = Vec::new();

    // Symlinked directories are listed but not descended into, so a link
    // back to an ancestor cannot loop.
    let walker = WalkDir::new(pkg_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !e.file_type().is_dir() || e.path().join(PACKAGE_INIT).is_file());

    for entry in walker {
        let entry =
            entry.map_err(|e| FreezeError::resolution(root_name, pkg_dir, e.to_string()))?;
        let p = entry.path();

        if entry.file_type().is_dir() || is_submodule(p) {
            found.push(p.to_path_buf());
        }
    }

    let Some(common) = common_ancestor(&found) else {
        return Ok(BTreeSet::from([root_name.to_string()]));
    };
    // The package directory is always among `found`, so `common` is the
    // package directory; stripping its parent keeps the package name as the
    // first segment.
    let strip = common.parent().unwrap_or(&common);

    // For a dotted root (`a.b`) the walk yields names starting at `b`.
    let parent_pkg = root_name.rsplit_once('.').map(|(p, _)| p);

    let mut names = BTreeSet::new();
    names.insert(root_name.to_string());

    for p in &found {
        let Ok(rel) = p.strip_prefix(strip) else {
            continue;
        };
        let Some(dotted) = dotted_name(rel) else {
            continue;
        };
        let full = match parent_pkg {
            Some(pp) => format!("{pp}.{dotted}"),
            None => dotted,
        };
        names.insert(full);
    }

    Ok(names)
}

fn is_submodule(p: &Path) -> bool {
    let Some(name) = p.file_name() else {
        return false;
    };
    name != PACKAGE_INIT && p.extension().is_some_and(|e| e == SOURCE_EXT)
}

/// `salt/utils/files.py` → `salt.utils.files`; `salt/utils` → `salt.utils`.
fn dotted_name(rel: &Path) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    for c in rel.components() {
        match c {
            Component::Normal(s) => parts.push(s.to_string_lossy().to_string()),
            _ => return None,
        }
    }

    let last = parts.last_mut()?;
    if let Some(stem) = last.strip_suffix(&format!(".{SOURCE_EXT}")) {
        *last = stem.to_string();
    }

    if parts.iter().any(|s| s.is_empty()) {
        return None;
    }
    Some(parts.join("."))
}

/// Deepest directory shared by every path (component-wise, not by characters).
fn common_ancestor(paths: &[PathBuf]) -> Option<PathBuf> {
    let mut iter = paths.iter();
    let first = iter.next()?;
    let mut common: Vec<Component> = first.components().collect();

    for p in iter {
        let n = common
            .iter()
            .zip(p.components())
            .take_while(|(a, b)| **a == *b)
            .count();
        common.truncate(n);
    }

    if common.is_empty() {
        return None;
    }
    Some(common.iter().collect())
}

fn absolute(p: &Path) -> std::io::Result<PathBuf> {
    if p.is_absolute() {
        Ok(p.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_name_drops_source_suffix() {
        assert_eq!(
            dotted_name(Path::new("salt/utils/files.py")).as_deref(),
            Some("salt.utils.files")
        );
        assert_eq!(dotted_name(Path::new("salt/utils")).as_deref(), Some("salt.utils"));
        assert_eq!(dotted_name(Path::new("salt")).as_deref(), Some("salt"));
        assert_eq!(dotted_name(Path::new("../salt")), None);
    }

    #[test]
    fn common_ancestor_is_component_wise() {
        let paths = vec![
            PathBuf::from("/site/salt"),
            PathBuf::from("/site/salt/utils/files.py"),
            PathBuf::from("/site/saltext"),
        ];
        assert_eq!(common_ancestor(&paths), Some(PathBuf::from("/site")));

        let paths = vec![
            PathBuf::from("/site/salt"),
            PathBuf::from("/site/salt/modules"),
        ];
        assert_eq!(common_ancestor(&paths), Some(PathBuf::from("/site/salt")));
        assert_eq!(common_ancestor(&[]), None);
    }

    #[test]
    fn manual_includes_respect_required_precedence() {
        let mut c = ModuleClosure::default();
        c.optional.insert("salt.cloud.clouds.ec2".to_string());
        c.extend_manual(
            &["salt.cloud.clouds.ec2".to_string(), " ".to_string()],
            &["raet".to_string()],
        );
        assert!(c.required.contains("salt.cloud.clouds.ec2"));
        assert!(!c.optional.contains("salt.cloud.clouds.ec2"));
        assert!(c.optional.contains("raet"));
        assert_eq!(c.len(), 2);
    }
}
