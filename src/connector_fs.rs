//! Local filesystem discovery.
//!
//! Walks a root directory, applies include/exclude globs to paths relative
//! to the root and returns matching files in sorted order. Files are not
//! read here; a [`SourceDescriptor`] reads its bytes when the builder asks.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::LocalSourceConfig;
use crate::sources::{LocalFile, SourceDescriptor};

/// Excluded regardless of configuration.
const DEFAULT_EXCLUDES: [&str; 3] = ["**/.git/**", "**/node_modules/**", "**/.DS_Store"];

/// A file found under a walk root.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkedFile {
    pub path: PathBuf,
    /// Path relative to the root, `/`-separated.
    pub relative: String,
}

impl WalkedFile {
    /// Relative parent directory, or `None` for files directly under the root.
    pub fn relative_dir(&self) -> Option<&str> {
        self.relative.rsplit_once('/').map(|(dir, _)| dir)
    }

    pub fn file_name(&self) -> &str {
        self.relative.rsplit('/').next().unwrap_or(&self.relative)
    }
}

/// Every file under `root` matching `include` and not matching `exclude`,
/// sorted by relative path.
pub fn walk_files(
    root: &Path,
    include: &[String],
    exclude: &[String],
    follow_symlinks: bool,
) -> Result<Vec<WalkedFile>> {
    if !root.exists() {
        bail!("source root does not exist: {}", root.display());
    }

    let include_set = build_globset(include)?;
    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend_from_slice(exclude);
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        if exclude_set.is_match(&relative) || !include_set.is_match(&relative) {
            continue;
        }
        files.push(WalkedFile {
            path: path.to_path_buf(),
            relative,
        });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

/// Local source descriptors for the configured root. The category is the
/// relative folder, or the configured default for top-level files.
pub fn scan_local(config: &LocalSourceConfig) -> Result<Vec<SourceDescriptor>> {
    let files = walk_files(
        &config.root,
        &config.include_globs,
        &config.exclude_globs,
        config.follow_symlinks,
    )?;

    Ok(files
        .into_iter()
        .map(|f| {
            let category = f
                .relative_dir()
                .map(str::to_string)
                .unwrap_or_else(|| config.default_category.clone());
            SourceDescriptor::Local(LocalFile {
                name: f.file_name().to_string(),
                relative: f.relative.clone(),
                path: f.path,
                category,
            })
        })
        .collect())
}

pub(crate) fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
