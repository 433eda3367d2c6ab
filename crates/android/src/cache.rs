//! Pub package cache discovery
//!
//! Flutter downloads plugin sources into the pub cache, one directory per
//! package version (`camera-0.10.5`). The Android side of each plugin lives
//! under `android/build.gradle`.

use nsfix_core::error::{Error, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Relative location of the pub.dev hosted packages inside a pub cache
const HOSTED_PUB_DEV: &str = "hosted/pub.dev";

/// Default descriptor location inside a package directory
pub const DEFAULT_DESCRIPTOR_PATH: &str = "android/build.gradle";

/// A package directory inside the cache
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PackageDir {
    /// Directory name, e.g. `camera-0.10.5`
    pub name: String,
    /// Absolute or cache-relative directory path
    pub path: PathBuf,
}

impl PackageDir {
    /// Create a package entry from its directory
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(OsStr::to_string_lossy)
            .unwrap_or_default()
            .into_owned();
        Self { name, path }
    }

    /// Build descriptor path for a given relative location
    pub fn descriptor_path(&self, relative: &str) -> PathBuf {
        self.path.join(relative)
    }

    /// Gradle project name of the plugin: the directory name without its
    /// trailing `-<version>`
    pub fn plugin_name(&self) -> &str {
        match self.split_version() {
            Some((name, _)) => name,
            None => &self.name,
        }
    }

    /// Package version encoded in the directory name
    pub fn version(&self) -> Option<semver::Version> {
        self.split_version().map(|(_, version)| version)
    }

    fn split_version(&self) -> Option<(&str, semver::Version)> {
        let (name, version) = self.name.split_once('-')?;
        semver::Version::parse(version)
            .ok()
            .map(|version| (name, version))
    }
}

/// Resolve the default pub.dev package cache root
///
/// `PUB_CACHE` wins when set; otherwise the platform default pub cache
/// location is used.
pub fn default_cache_root() -> Result<PathBuf> {
    if let Some(pub_cache) = std::env::var_os("PUB_CACHE").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(pub_cache).join(HOSTED_PUB_DEV));
    }

    platform_cache_root()
}

#[cfg(windows)]
fn platform_cache_root() -> Result<PathBuf> {
    dirs::data_local_dir()
        .map(|dir| dir.join("Pub").join("Cache").join(HOSTED_PUB_DEV))
        .ok_or_else(Error::home_not_found)
}

#[cfg(not(windows))]
fn platform_cache_root() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".pub-cache").join(HOSTED_PUB_DEV))
        .ok_or_else(Error::home_not_found)
}

/// List the immediate package directories of a cache root, sorted by name
///
/// A missing root, or one that is not a directory, yields no packages.
pub fn list_packages(root: &Path) -> Result<Vec<PackageDir>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut packages = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            match e.into_io_error() {
                Some(io) => Error::from(io),
                None => Error::io("Filesystem loop in package cache"),
            }
            .with_context(format!("While listing {}", path.display()))
        })?;

        if entry.file_type().is_dir() {
            packages.push(PackageDir::new(entry.into_path()));
        }
    }

    packages.sort();
    Ok(packages)
}
