//! Filesystem discovery of content documents and asset files.
//!
//! Walks the configured roots with `walkdir` and filters relative paths with
//! `globset`. Paths are reported relative to their root with `/` separators;
//! they are the stable identity of a document within a site.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;

/// Extension of the sidecar files that carry an asset's metadata.
pub const SIDECAR_EXTENSION: &str = "metadata";

const DEFAULT_EXCLUDES: [&str; 3] = ["**/.git/**", "**/target/**", "**/node_modules/**"];

/// A discovered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub relative: String,
}

impl SourceFile {
    /// File name without its extension.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Lower-cased extension, if any.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }

    /// The `<stem>.metadata` file next to this one.
    pub fn sidecar(&self) -> PathBuf {
        self.path.with_extension(SIDECAR_EXTENSION)
    }
}

/// Content documents under `content.root` matching the include globs.
pub fn scan_content(config: &Config) -> Result<Vec<SourceFile>> {
    let include = build_globset(&config.content.include_globs)?;
    scan(&config.content.root, Some(&include), &config.content.exclude_globs)
}

/// Every non-sidecar file under `assets.root`, or nothing when assets are
/// not configured.
pub fn scan_assets(config: &Config) -> Result<Vec<SourceFile>> {
    let Some(assets) = &config.assets else {
        return Ok(Vec::new());
    };
    let mut excludes = assets.exclude_globs.clone();
    excludes.push(format!("**/*.{SIDECAR_EXTENSION}"));
    scan(&assets.root, None, &excludes)
}

fn scan(root: &Path, include: Option<&GlobSet>, excludes: &[String]) -> Result<Vec<SourceFile>> {
    if !root.exists() {
        bail!("Root directory does not exist: {}", root.display());
    }

    let mut patterns: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    patterns.extend(excludes.iter().cloned());
    let exclude = build_globset(&patterns)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude.is_match(&relative) {
            continue;
        }
        if let Some(include) = include {
            if !include.is_match(&relative) {
                continue;
            }
        }

        files.push(SourceFile {
            path: path.to_path_buf(),
            relative,
        });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
