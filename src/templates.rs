use anyhow::{Context as _, Result};
use minijinja::Environment;
use serde_json::json;
use std::{fs, path::Path};

use crate::{context::BuildContext, scripts::LaunchSpec};

const BUILTIN_LAUNCHER: &str = include_str!("../assets/launcher.py.j2");

/// Minijinja source for launcher files.
///
/// Template context:
/// - `description`, `output_name`, `call`
/// - `entry.module`, `entry.callable`
/// - `build.prefix`, `build.platform`, `build.build_type`, `build.version`
#[derive(Debug, Clone)]
pub struct LauncherTemplate {
    source: String,
    origin: String,
}

impl LauncherTemplate {
    pub fn builtin() -> Result<Self> {
        Self::from_source(BUILTIN_LAUNCHER, "<builtin>")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("failed to read launcher template: {}", path.display()))?;
        Self::from_source(&source, &path.display().to_string())
    }

    /// Parses once up front so a broken template fails before anything is written.
    pub fn from_source(source: &str, origin: &str) -> Result<Self> {
        let env = environment();
        env.template_from_str(source)
            .with_context(|| format!("invalid launcher template ({origin})"))?;
        Ok(Self {
            source: source.to_string(),
            origin: origin.to_string(),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn render(&self, spec: &LaunchSpec, build: &BuildContext) -> Result<String> {
        let ctx_json = json!({
            "description": spec.description,
            "output_name": spec.output_name,
            "call": spec.entry_call,
            "entry": {
                "module": spec.entry_import.module,
                "callable": spec.entry_import.callable,
            },
            "build": {
                "prefix": build.prefix(),
                "platform": build.platform().to_string(),
                "build_type": build.effective_build_type().to_string(),
                "version": build.version().to_string(),
            },
        });

        render_minijinja(&self.source, &ctx_json)
            .with_context(|| format!("render failed ({})", self.origin))
    }
}

fn environment<'source>() -> Environment<'source> {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);

    // Keeps arbitrary description text from closing the docstring early.
    env.add_filter("docstring", |s: String| -> String {
        s.replace('\\', "\\\\").replace("\"\"\"", "\\\"\\\"\\\"")
    });

    env
}

fn render_minijinja(source: &str, ctx_json: &serde_json::Value) -> Result<String> {
    let mut env = environment();
    env.add_template("launcher.py", source)?;
    let tpl = env.get_template("launcher.py")?;
    let v = minijinja::value::Value::from_serialize(ctx_json);
    Ok(tpl.render(v)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BuildType, Platform};
    use crate::context::FrameworkVersion;
    use crate::scripts::EntryPoint;

    fn build() -> BuildContext {
        BuildContext::new(
            BuildType::Both,
            Platform::Linux,
            FrameworkVersion::new(2014, 7),
            false,
            "salt",
        )
    }

    fn spec() -> LaunchSpec {
        LaunchSpec::new(
            "minion",
            "salt-minion",
            EntryPoint::new("salt.scripts", "salt_minion").unwrap(),
            "Start the salt minion",
        )
    }

    #[test]
    fn builtin_launcher_shape() {
        let text = LauncherTemplate::builtin().unwrap().render(&spec(), &build()).unwrap();
        let expected = r#"#!/usr/bin/env python
# -*- coding: utf-8 -*-
"""
Start the salt minion
"""

from salt.scripts import salt_minion
from multiprocessing import freeze_support

if __name__ == "__main__":
    freeze_support()
    salt_minion()
"#;
        assert_eq!(text, expected);
    }

    #[test]
    fn custom_call_expression_is_used() {
        let s = spec().with_call("salt_minion(argv=['--disable-keepalive'])");
        let text = LauncherTemplate::builtin().unwrap().render(&s, &build()).unwrap();
        assert!(text.contains("    salt_minion(argv=['--disable-keepalive'])\n"));
        assert!(text.contains("from salt.scripts import salt_minion\n"));
    }

    #[test]
    fn description_cannot_close_docstring() {
        let mut s = spec();
        s.description = r#"evil """ text"#.to_string();
        let text = LauncherTemplate::builtin().unwrap().render(&s, &build()).unwrap();
        assert!(text.contains(r#"evil \"\"\" text"#));
    }

    #[test]
    fn rendering_is_deterministic() {
        let tpl = LauncherTemplate::builtin().unwrap();
        let a = tpl.render(&spec(), &build()).unwrap();
        let b = tpl.render(&spec(), &build()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn custom_template_sees_build_values() {
        let tpl = LauncherTemplate::from_source(
            "# {{ output_name }} for {{ build.prefix }} {{ build.version }}\n",
            "inline",
        )
        .unwrap();
        let text = tpl.render(&spec(), &build()).unwrap();
        assert_eq!(text, "# salt-minion for salt 2014.7\n");
    }

    #[test]
    fn broken_template_fails_early() {
        assert!(LauncherTemplate::from_source("{% if %}", "inline").is_err());
    }
}
