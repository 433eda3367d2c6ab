//! Configuration schema definitions

use serde::{Deserialize, Serialize};

/// Root configuration schema
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigSchema {
    #[serde(default)]
    pub patcher: PatcherConfig,
}

/// How to decide whether a descriptor already declares a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// `namespace` as a statement outside comments
    #[default]
    Structural,
    /// Any occurrence of the word `namespace`, comments included
    Substring,
}

/// What to do when a descriptor cannot be read or written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abort the run on the first I/O failure
    #[default]
    FailFast,
    /// Record the failure and move on to the next package
    Continue,
}

/// Namespace patcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatcherConfig {
    /// Package cache root; `~` and `$VAR` are expanded
    #[serde(default)]
    pub cache_root: Option<String>,

    /// Descriptor location relative to each package directory
    #[serde(default = "default_descriptor_path")]
    pub descriptor_path: String,

    #[serde(default)]
    pub detection: DetectionMode,

    #[serde(default)]
    pub on_error: FailurePolicy,

    /// Glob patterns matched against package directory names
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for PatcherConfig {
    fn default() -> Self {
        Self {
            cache_root: None,
            descriptor_path: default_descriptor_path(),
            detection: DetectionMode::default(),
            on_error: FailurePolicy::default(),
            exclude: Vec::new(),
        }
    }
}

fn default_descriptor_path() -> String {
    "android/build.gradle".to_string()
}
