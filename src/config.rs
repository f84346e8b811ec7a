use crate::utils::{BundlerError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Resolution sub-table: everything the Resolver (4.1) needs beyond the
/// bare `(fromFile, request, platform)` triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConfig {
    pub alias: HashMap<String, String>,
    pub main_fields: Vec<String>,
    pub conditions: Vec<String>,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            alias: HashMap::new(),
            main_fields: vec!["browser".into(), "module".into(), "main".into()],
            conditions: vec!["import".into(), "browser".into(), "default".into()],
        }
    }
}

/// The enumerated configuration surface from spec.md §6, plus the
/// resolver's sub-table. `blacklist_re` is serialized as its pattern
/// string and compiled lazily via [`Config::blacklist`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub project_roots: Vec<PathBuf>,
    pub asset_exts: Vec<String>,
    pub source_exts: Vec<String>,
    #[serde(default)]
    pub blacklist_re: Option<String>,
    pub max_workers: usize,
    #[serde(default)]
    pub cache_version: String,
    pub platforms: Vec<String>,
    #[serde(default)]
    pub reset_cache: bool,
    #[serde(default = "default_transformer_key")]
    pub transformer_key: String,
    #[serde(default)]
    pub resolve: ResolveConfig,
    #[serde(default)]
    pub define: HashMap<String, String>,
}

fn default_transformer_key() -> String {
    "default".to_string()
}

impl Config {
    /// Loads `bramble.config.json` from `root` if present, otherwise
    /// builds a sensible default rooted there — the same load-or-default
    /// shape the teacher project's own `Config::load` uses.
    pub fn load(root: &Path) -> Result<Self> {
        let root = root
            .canonicalize()
            .map_err(|e| BundlerError::config(format!("invalid project root: {e}")))?;
        let config_path = root.join("bramble.config.json");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let mut config: Config = serde_json::from_str(&content)?;
            if config.project_roots.is_empty() {
                config.project_roots.push(root);
            }
            Ok(config)
        } else {
            Ok(Self::default_for_root(&root))
        }
    }

    pub fn default_for_root(root: &Path) -> Self {
        Self {
            project_roots: vec![root.to_path_buf()],
            asset_exts: vec![
                "png".into(), "jpg".into(), "jpeg".into(), "gif".into(), "svg".into(),
                "webp".into(), "ttf".into(), "otf".into(), "woff".into(), "woff2".into(),
            ],
            source_exts: vec!["js".into(), "jsx".into(), "ts".into(), "tsx".into(), "json".into()],
            blacklist_re: None,
            max_workers: (num_cpus::get() / 2).max(1),
            cache_version: "1".to_string(),
            platforms: vec!["ios".into(), "android".into(), "web".into()],
            reset_cache: false,
            transformer_key: default_transformer_key(),
            resolve: ResolveConfig::default(),
            define: HashMap::new(),
        }
    }

    /// Compiles `blacklist_re`, if any. Compilation is cheap and not on any
    /// hot per-module path often enough to warrant caching across calls.
    pub fn blacklist(&self) -> Result<Option<Regex>> {
        match &self.blacklist_re {
            Some(pattern) => Ok(Some(Regex::new(pattern)?)),
            None => Ok(None),
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.project_roots[0].join(".bramble-cache").join(&self.cache_version)
    }
}
