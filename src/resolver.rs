//! Path & Resolver (spec.md §4.1). Maps a `(fromFile, request, platform)`
//! triple to a concrete source file path.

use crate::config::Config;
use crate::utils::Unresolved;
use std::path::{Path, PathBuf};

pub struct Resolver {
    config: Config,
}

impl Resolver {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// `isAsset(path) -> bool`: matches the configured asset extension set.
    pub fn is_asset(&self, path: &Path) -> bool {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self.config.asset_exts.iter().any(|a| a.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }

    /// `resolve(fromPath, request, platform) -> path | Unresolved`.
    pub fn resolve(
        &self,
        from: &Path,
        request: &str,
        platform: &str,
    ) -> Result<PathBuf, Unresolved> {
        let mut candidates = Vec::new();

        let base = if request.starts_with("./") || request.starts_with("../") {
            let dir = from.parent().unwrap_or(from);
            dir.join(request)
        } else if let Some(rest) = request.strip_prefix('/') {
            self.config
                .project_roots
                .first()
                .cloned()
                .unwrap_or_else(|| PathBuf::from("/"))
                .join(rest)
        } else if let Some(target) = self.config.resolve.alias.get(request) {
            let dir = from.parent().unwrap_or(from);
            dir.join(target)
        } else {
            return self.resolve_bare(from, request, platform);
        };

        if let Some(found) = self.probe(&base, platform, &mut candidates) {
            return Ok(found);
        }

        Err(Unresolved {
            from: from.to_path_buf(),
            request: request.to_string(),
            candidates,
        })
    }

    /// Probes `base` (and, failing that, `base/index`) for a concrete
    /// file. Ties between `assetExts` and `sourceExts` resolve to
    /// `assetExts` when the bare name matches; ties between `sourceExts`
    /// entries resolve in configured order.
    fn probe(&self, base: &Path, platform: &str, candidates: &mut Vec<PathBuf>) -> Option<PathBuf> {
        // Exact match: the request already names a concrete file (its own
        // extension, whether source or asset). No suffix probing needed.
        candidates.push(base.to_path_buf());
        if base.is_file() {
            return Some(base.to_path_buf());
        }

        if let Some(found) = self.probe_extensions(base, platform, candidates) {
            return Some(found);
        }

        if base.is_dir() {
            let index = base.join("index");
            if let Some(found) = self.probe_extensions(&index, platform, candidates) {
                return Some(found);
            }
        }

        None
    }

    fn probe_extensions(
        &self,
        base: &Path,
        platform: &str,
        candidates: &mut Vec<PathBuf>,
    ) -> Option<PathBuf> {
        // Asset extensions never get a platform-suffixed variant probed.
        for ext in &self.config.asset_exts {
            let candidate = base.with_extension(ext);
            candidates.push(candidate.clone());
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        for ext in &self.config.source_exts {
            let platform_variant = append_platform_suffix(base, platform, ext);
            candidates.push(platform_variant.clone());
            if platform_variant.is_file() {
                return Some(platform_variant);
            }

            let plain = base.with_extension(ext);
            candidates.push(plain.clone());
            if plain.is_file() {
                return Some(plain);
            }
        }

        None
    }

    fn resolve_bare(
        &self,
        from: &Path,
        request: &str,
        platform: &str,
    ) -> Result<PathBuf, Unresolved> {
        let mut candidates = Vec::new();
        let mut dir = from.parent().unwrap_or(from).to_path_buf();

        loop {
            let pkg_dir = dir.join("node_modules").join(request);
            if let Some(found) = self.probe(&pkg_dir, platform, &mut candidates) {
                return Ok(found);
            }

            match dir.parent() {
                Some(parent) => dir = parent.to_path_buf(),
                None => break,
            }
        }

        Err(Unresolved {
            from: from.to_path_buf(),
            request: request.to_string(),
            candidates,
        })
    }
}

fn append_platform_suffix(base: &Path, platform: &str, ext: &str) -> PathBuf {
    let name = base
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let sibling = format!("{name}.{platform}.{ext}");
    base.with_file_name(sibling)
}
