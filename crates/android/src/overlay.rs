//! Gradle init script overlay
//!
//! Instead of rewriting descriptors in the pub cache, the inferred
//! namespaces can be handed to Gradle at configuration time:
//!
//! ```text
//! nsfix overlay --output build/nsfix.init.gradle
//! ./gradlew --init-script build/nsfix.init.gradle assembleDebug
//! ```
//!
//! The script only assigns a namespace when the plugin left it unset, so it
//! keeps working after the cache is repopulated or the plugin is upgraded.

use crate::cache::PackageDir;
use crate::patcher::{Outcome, PatchOptions, Patcher};
use nsfix_core::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use tracing::debug;

/// Namespace to assign to one Gradle project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlayEntry {
    /// Gradle project name, e.g. `camera`
    pub project: String,
    /// Namespace inferred from the plugin's group
    pub namespace: String,
}

/// Collect overlay entries for every cached plugin lacking a namespace
///
/// Nothing is written. When several versions of a plugin are cached, the
/// highest version decides the namespace.
pub fn collect(cache_root: &Path, options: &PatchOptions) -> Result<Vec<OverlayEntry>> {
    let report = Patcher::new(options.clone()).check(cache_root)?;

    let mut chosen: BTreeMap<String, (Option<semver::Version>, String)> = BTreeMap::new();
    for package in &report.packages {
        let Outcome::Patched { namespace } = &package.outcome else {
            continue;
        };

        let dir = PackageDir::new(report.cache_root.join(&package.package));
        let version = dir.version();
        let project = dir.plugin_name().to_string();

        match chosen.get(&project) {
            Some((existing, _)) if *existing >= version => {
                debug!(%project, package = %package.package, "Older cached version ignored");
            }
            _ => {
                chosen.insert(project, (version, namespace.clone()));
            }
        }
    }

    Ok(chosen
        .into_iter()
        .map(|(project, (_, namespace))| OverlayEntry { project, namespace })
        .collect())
}

/// Render a Gradle init script assigning the given namespaces
pub fn render(entries: &[OverlayEntry]) -> String {
    let mut script = String::new();
    script.push_str("// Generated by nsfix. Do not edit.\n");
    script.push_str("// Assigns an Android namespace to plugins that only declare a group.\n");
    if entries.is_empty() {
        script.push_str("def nsfixNamespaces = [:]\n\n");
    } else {
        script.push_str("def nsfixNamespaces = [\n");
        for entry in entries {
            let _ = writeln!(
                script,
                "    '{}': '{}',",
                groovy_escape(&entry.project),
                groovy_escape(&entry.namespace)
            );
        }
        script.push_str("]\n\n");
    }
    script.push_str(
        r#"allprojects { project ->
    def inferred = nsfixNamespaces[project.name]
    if (inferred == null) {
        return
    }
    project.plugins.withId('com.android.library') {
        if (project.android.namespace == null) {
            project.android.namespace = inferred
        }
    }
}
"#,
    );
    script
}

/// Write a rendered script atomically
pub fn write(path: &Path, entries: &[OverlayEntry]) -> Result<()> {
    nsfix_core::fs::write_atomic(path, render(entries).as_bytes())
}

fn groovy_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
