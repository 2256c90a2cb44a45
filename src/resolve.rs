use anyhow::{bail, Result};
use std::collections::BTreeMap;

use crate::context::{BuildContext, ContextEnv};

pub type ExtraTokens = BTreeMap<String, String>;

/// Expands `{token}` placeholders in config strings.
///
/// Known tokens: `home`, `cwd`, `config_dir`, `env.<NAME>`, and once a build
/// context exists `prefix`, `platform`, `build_type`, `version`. Callers can
/// add more with [`Resolver::with_extra`].
pub struct Resolver<'a> {
    pub ctx: &'a ContextEnv,
    pub build: Option<&'a BuildContext>,
    pub extra: Option<&'a ExtraTokens>,
}

impl<'a> Resolver<'a> {
    pub fn new(ctx: &'a ContextEnv) -> Self {
        Self {
            ctx,
            build: None,
            extra: None,
        }
    }

    pub fn with_build(mut self, build: &'a BuildContext) -> Self {
        self.build = Some(build);
        self
    }

    pub fn with_extra(mut self, extra: &'a ExtraTokens) -> Self {
        self.extra = Some(extra);
        self
    }

    pub fn resolve(&self, input: &str) -> Result<String> {
        // Fast path
        if !input.contains('{') {
            return Ok(input.to_string());
        }

        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                bail!("unclosed token in string: {input}");
            };

            let token = &after[..end];
            let repl = self
                .token_value(token)
                .ok_or_else(|| anyhow::anyhow!("unknown token: {{{token}}} in: {input}"))?;

            out.push_str(&repl);
            rest = &after[end + 1..];
        }
        out.push_str(rest);

        Ok(out)
    }

    fn token_value(&self, token: &str) -> Option<String> {
        if let Some(name) = token.strip_prefix("env.") {
            return self.ctx.var(name).map(str::to_string);
        }

        if let Some(v) = self.extra.and_then(|e| e.get(token)) {
            return Some(v.clone());
        }

        match token {
            "home" => self.ctx.home().map(|p| p.to_string_lossy().to_string()),
            "cwd" => Some(self.ctx.cwd().to_string_lossy().to_string()),
            "config_dir" => Some(self.ctx.config_dir().to_string_lossy().to_string()),

            "prefix" => self.build.map(|b| b.prefix().to_string()),
            "platform" => self.build.map(|b| b.platform().to_string()),
            "build_type" => self.build.map(|b| b.effective_build_type().to_string()),
            "version" => self.build.map(|b| b.version().to_string()),

            _ => None,
        }
    }
}
