//! Namespace patcher
//!
//! Android Gradle Plugin 8 requires every library module to declare a
//! `namespace`. Older Flutter plugins only declare a `group`, so their
//! `android/build.gradle` is rewritten in place with a namespace copied from
//! the group.
//!
//! The run is sequential and idempotent: a descriptor that already declares
//! a namespace is never touched again.

use crate::cache::{self, PackageDir, DEFAULT_DESCRIPTOR_PATH};
use crate::descriptor::{Descriptor, TextPatch};
use nsfix_core::config::{DetectionMode, FailurePolicy, PatcherConfig};
use nsfix_core::error::{Error, ErrorReport, Result, ResultExt};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Patcher options
#[derive(Debug, Clone)]
pub struct PatchOptions {
    /// How existing namespace declarations are detected
    pub detection: DetectionMode,
    /// Abort or continue on per-package I/O failures
    pub on_error: FailurePolicy,
    /// Compute outcomes without writing anything
    pub dry_run: bool,
    /// Package directory name patterns to leave alone
    pub exclude: Vec<glob::Pattern>,
    /// Descriptor location relative to each package directory
    pub descriptor_path: String,
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self {
            detection: DetectionMode::default(),
            on_error: FailurePolicy::default(),
            dry_run: false,
            exclude: Vec::new(),
            descriptor_path: DEFAULT_DESCRIPTOR_PATH.to_string(),
        }
    }
}

impl PatchOptions {
    /// Build options from the `[patcher]` config section
    pub fn from_config(config: &PatcherConfig) -> Result<Self> {
        let exclude = config
            .exclude
            .iter()
            .map(|p| glob::Pattern::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            detection: config.detection,
            on_error: config.on_error,
            dry_run: false,
            exclude,
            descriptor_path: config.descriptor_path.clone(),
        })
    }

    /// Set how existing namespace declarations are detected
    pub fn with_detection(mut self, detection: DetectionMode) -> Self {
        self.detection = detection;
        self
    }

    /// Set what happens on a per-package I/O failure
    pub fn with_failure_policy(mut self, on_error: FailurePolicy) -> Self {
        self.on_error = on_error;
        self
    }

    /// Compute outcomes without writing
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Add package name patterns to exclude
    pub fn exclude(mut self, patterns: &[&str]) -> Result<Self> {
        for pattern in patterns {
            self.exclude.push(glob::Pattern::new(pattern)?);
        }
        Ok(self)
    }

    fn is_excluded(&self, package: &PackageDir) -> bool {
        self.exclude.iter().any(|p| p.matches(&package.name))
    }
}

/// What happened to one package
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Namespace inserted (or would be, in a dry run)
    Patched {
        /// Namespace copied from the group
        namespace: String,
    },
    /// Descriptor already declares a namespace
    AlreadyDeclared,
    /// Package has no Android build descriptor
    NoDescriptor,
    /// Descriptor has no group to infer a namespace from
    NoGroup,
    /// Descriptor declares conflicting groups
    AmbiguousGroup {
        /// Every distinct group value found
        values: Vec<String>,
    },
    /// Descriptor is not valid UTF-8 and was left alone
    NotText,
    /// Package name matched an exclude pattern
    Excluded,
    /// I/O failure recorded under [`FailurePolicy::Continue`]
    Failed {
        /// What went wrong
        error: ErrorReport,
    },
}

impl Outcome {
    /// Whether the descriptor still lacks a namespace that could be inferred
    pub fn needs_patch(&self) -> bool {
        matches!(self, Outcome::Patched { .. })
    }
}

/// Per-package entry of a run
#[derive(Debug, Clone, Serialize)]
pub struct PackageReport {
    /// Package directory name
    pub package: String,
    /// Descriptor path that was inspected
    pub descriptor: PathBuf,
    /// What happened
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Result of a patcher run
#[derive(Debug, Clone, Serialize)]
pub struct PatchReport {
    /// Cache root that was scanned
    pub cache_root: PathBuf,
    /// False when the cache root does not exist
    pub cache_present: bool,
    /// Whether writes were skipped
    pub dry_run: bool,
    /// One entry per package directory, in name order
    pub packages: Vec<PackageReport>,
}

impl PatchReport {
    /// Packages that were (or would be) patched
    pub fn patched(&self) -> impl Iterator<Item = &PackageReport> {
        self.packages.iter().filter(|p| p.outcome.needs_patch())
    }

    /// Packages whose descriptor could not be read or written
    pub fn failures(&self) -> impl Iterator<Item = &PackageReport> {
        self.packages
            .iter()
            .filter(|p| matches!(p.outcome, Outcome::Failed { .. }))
    }

    /// True when no package failed
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Namespace patcher over a package cache directory
#[derive(Debug, Clone, Default)]
pub struct Patcher {
    options: PatchOptions,
}

impl Patcher {
    /// Create a patcher with the given options
    pub fn new(options: PatchOptions) -> Self {
        Self { options }
    }

    /// Options this patcher runs with
    pub fn options(&self) -> &PatchOptions {
        &self.options
    }

    /// Patch every package under `cache_root`, writing one notice line per
    /// patched package to `out`
    ///
    /// Under [`FailurePolicy::FailFast`] the first I/O failure aborts the
    /// run. Descriptors already patched by then stay patched.
    pub fn run(&self, cache_root: &Path, out: &mut impl Write) -> Result<PatchReport> {
        let cache_present = cache_root.is_dir();
        if !cache_present {
            debug!(cache_root = %cache_root.display(), "Package cache not found, nothing to patch");
        }

        let mut report = PatchReport {
            cache_root: cache_root.to_path_buf(),
            cache_present,
            dry_run: self.options.dry_run,
            packages: Vec::new(),
        };

        for package in cache::list_packages(cache_root)? {
            let descriptor = package.descriptor_path(&self.options.descriptor_path);

            let outcome = match self.patch_package(&package, &descriptor) {
                Ok(outcome) => outcome,
                Err(err) if self.options.on_error == FailurePolicy::Continue => {
                    warn!(package = %package.name, error = %err, "Failed to patch package");
                    Outcome::Failed {
                        error: err.to_report(),
                    }
                }
                Err(err) => return Err(err),
            };

            if outcome.needs_patch() {
                if self.options.dry_run {
                    writeln!(out, "Would add namespace to {}", package.name)?;
                } else {
                    writeln!(out, "Added namespace to {}", package.name)?;
                }
            }

            report.packages.push(PackageReport {
                package: package.name,
                descriptor,
                outcome,
            });
        }

        Ok(report)
    }

    /// Report which packages still need a namespace, without writing
    pub fn check(&self, cache_root: &Path) -> Result<PatchReport> {
        let checker = Patcher::new(self.options.clone().dry_run(true));
        checker.run(cache_root, &mut std::io::sink())
    }

    fn patch_package(&self, package: &PackageDir, descriptor: &Path) -> Result<Outcome> {
        if self.options.is_excluded(package) {
            debug!(package = %package.name, "Excluded");
            return Ok(Outcome::Excluded);
        }

        if !descriptor.is_file() {
            debug!(package = %package.name, "No Android build descriptor");
            return Ok(Outcome::NoDescriptor);
        }

        let Some(loaded) = Descriptor::load(descriptor)? else {
            debug!(package = %package.name, "Descriptor is not valid UTF-8");
            return Ok(Outcome::NotText);
        };
        let outcome = match loaded.plan(self.options.detection) {
            TextPatch::AlreadyDeclared => Outcome::AlreadyDeclared,
            TextPatch::NoGroup => Outcome::NoGroup,
            TextPatch::AmbiguousGroup(values) => {
                debug!(package = %package.name, ?values, "Conflicting group declarations");
                Outcome::AmbiguousGroup { values }
            }
            TextPatch::Patched { namespace, text } => {
                if !self.options.dry_run {
                    nsfix_core::fs::write_atomic(descriptor, text.as_bytes())
                        .context(format!("While patching {}", descriptor.display()))?;
                    info!(package = %package.name, %namespace, "Added namespace");
                }
                Outcome::Patched { namespace }
            }
        };

        Ok(outcome)
    }
}

/// Patch every package under `cache_root` with default options
pub fn patch_missing_namespaces(cache_root: &Path, out: &mut impl Write) -> Result<PatchReport> {
    Patcher::default().run(cache_root, out)
}

/// Turn a report's first failure into an error
pub fn ensure_success(report: &PatchReport) -> Result<()> {
    match report.failures().next() {
        None => Ok(()),
        Some(failed) => Err(Error::io(format!(
            "Failed to patch {} package(s), first: {}",
            report.failures().count(),
            failed.package
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const FOO_PLUGIN: &str = "group 'com.example.foo_plugin'\nversion '1.0'\n";

    fn write_descriptor(root: &Path, package: &str, content: &str) -> PathBuf {
        let android = root.join(package).join("android");
        fs::create_dir_all(&android).unwrap();
        let path = android.join("build.gradle");
        fs::write(&path, content).unwrap();
        path
    }

    fn run(root: &Path) -> (PatchReport, String) {
        let mut out = Vec::new();
        let report = patch_missing_namespaces(root, &mut out).unwrap();
        (report, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_patches_literal_scenario() {
        let temp = TempDir::new().unwrap();
        let path = write_descriptor(temp.path(), "foo_plugin", FOO_PLUGIN);

        let (report, out) = run(temp.path());

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "group 'com.example.foo_plugin'\nnamespace 'com.example.foo_plugin'\nversion '1.0'\n"
        );
        assert!(out.lines().any(|l| l == "Added namespace to foo_plugin"));
        assert_eq!(report.patched().count(), 1);
    }

    #[test]
    fn test_absent_cache_is_noop() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("hosted").join("pub.dev");

        let (report, out) = run(&missing);

        assert!(!report.cache_present);
        assert!(report.packages.is_empty());
        assert!(out.is_empty());
        assert!(!missing.exists());
    }

    #[test]
    fn test_empty_cache_is_noop() {
        let temp = TempDir::new().unwrap();

        let (report, out) = run(temp.path());

        assert!(report.cache_present);
        assert!(report.packages.is_empty());
        assert!(out.is_empty());
    }

    #[test]
    fn test_running_twice_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let foo = write_descriptor(temp.path(), "foo_plugin", FOO_PLUGIN);
        let bar = write_descriptor(temp.path(), "bar-1.2.0", "group \"dev.bar\"\n");

        run(temp.path());
        let first = (fs::read(&foo).unwrap(), fs::read(&bar).unwrap());

        let (report, out) = run(temp.path());
        let second = (fs::read(&foo).unwrap(), fs::read(&bar).unwrap());

        assert_eq!(first, second);
        assert!(out.is_empty());
        assert_eq!(report.patched().count(), 0);
    }

    #[test]
    fn test_already_patched_unchanged() {
        let temp = TempDir::new().unwrap();
        let content = "group 'a.b'\nandroid {\n    namespace 'a.b'\n}\n";
        let path = write_descriptor(temp.path(), "done", content);

        let (report, _) = run(temp.path());

        assert_eq!(fs::read_to_string(&path).unwrap(), content);
        assert!(matches!(report.packages[0].outcome, Outcome::AlreadyDeclared));
    }

    #[test]
    fn test_no_group_unchanged() {
        let temp = TempDir::new().unwrap();
        let content = "apply plugin: 'com.android.library'\nversion '1.0'\n";
        let path = write_descriptor(temp.path(), "nogroup", content);

        let (report, out) = run(temp.path());

        assert_eq!(fs::read_to_string(&path).unwrap(), content);
        assert!(matches!(report.packages[0].outcome, Outcome::NoGroup));
        assert!(out.is_empty());
    }

    #[test]
    fn test_mixed_package_states() {
        let temp = TempDir::new().unwrap();
        let done_content = "group 'a.done'\nnamespace 'a.done'\n";
        let done = write_descriptor(temp.path(), "already_done", done_content);
        fs::create_dir_all(temp.path().join("dart_only").join("lib")).unwrap();
        let todo = write_descriptor(temp.path(), "needs_patch", "group 'a.todo'\n");

        let (report, out) = run(temp.path());

        assert_eq!(fs::read_to_string(&done).unwrap(), done_content);
        assert!(!temp.path().join("dart_only/android").exists());
        assert_eq!(
            fs::read_to_string(&todo).unwrap(),
            "group 'a.todo'\nnamespace 'a.todo'\n"
        );
        assert_eq!(out, "Added namespace to needs_patch\n");

        let outcomes: Vec<_> = report.packages.iter().map(|p| &p.outcome).collect();
        assert!(matches!(outcomes[0], Outcome::AlreadyDeclared));
        assert!(matches!(outcomes[1], Outcome::NoDescriptor));
        assert!(matches!(outcomes[2], Outcome::Patched { .. }));
    }

    #[test]
    fn test_non_utf8_descriptor_skipped_without_aborting() {
        let temp = TempDir::new().unwrap();
        let latin1 = b"// caf\xe9\ngroup 'a.b'\n";
        let android = temp.path().join("a_latin1").join("android");
        fs::create_dir_all(&android).unwrap();
        fs::write(android.join("build.gradle"), latin1).unwrap();
        let ok = write_descriptor(temp.path(), "b_ok", "group 'b.c'\n");

        let (report, out) = run(temp.path());

        assert_eq!(fs::read(android.join("build.gradle")).unwrap(), latin1);
        assert_eq!(fs::read_to_string(&ok).unwrap(), "group 'b.c'\nnamespace 'b.c'\n");
        assert!(matches!(report.packages[0].outcome, Outcome::NotText));
        assert_eq!(out, "Added namespace to b_ok\n");
        assert!(report.is_success());
    }

    #[test]
    fn test_inline_namespace_declarations_not_duplicated() {
        let temp = TempDir::new().unwrap();
        let inline = "group 'a.b'\nandroid { namespace 'a.b' }\n";
        let dotted = "group 'c.d'\nandroid.namespace = 'c.d'\n";
        let inline_path = write_descriptor(temp.path(), "inline", inline);
        let dotted_path = write_descriptor(temp.path(), "dotted", dotted);

        let (report, out) = run(temp.path());

        assert_eq!(fs::read_to_string(&inline_path).unwrap(), inline);
        assert_eq!(fs::read_to_string(&dotted_path).unwrap(), dotted);
        assert!(out.is_empty());
        assert_eq!(report.patched().count(), 0);
    }

    #[test]
    fn test_unrelated_files_untouched() {
        let temp = TempDir::new().unwrap();
        write_descriptor(temp.path(), "foo_plugin", FOO_PLUGIN);
        let other = temp.path().join("foo_plugin").join("build.gradle");
        fs::write(&other, "group 'root.level'\n").unwrap();
        let loose = temp.path().join("build.gradle");
        fs::write(&loose, "group 'loose'\n").unwrap();

        run(temp.path());

        assert_eq!(fs::read_to_string(&other).unwrap(), "group 'root.level'\n");
        assert_eq!(fs::read_to_string(&loose).unwrap(), "group 'loose'\n");
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let path = write_descriptor(temp.path(), "foo_plugin", FOO_PLUGIN);
        let patcher = Patcher::new(PatchOptions::default().dry_run(true));

        let mut out = Vec::new();
        let report = patcher.run(temp.path(), &mut out).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), FOO_PLUGIN);
        assert_eq!(String::from_utf8(out).unwrap(), "Would add namespace to foo_plugin\n");
        assert!(report.dry_run);
        assert_eq!(report.patched().count(), 1);
    }

    #[test]
    fn test_check_reports_pending() {
        let temp = TempDir::new().unwrap();
        let path = write_descriptor(temp.path(), "foo_plugin", FOO_PLUGIN);

        let report = Patcher::default().check(temp.path()).unwrap();

        assert_eq!(report.patched().count(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), FOO_PLUGIN);
    }

    #[test]
    fn test_excluded_packages_skipped() {
        let temp = TempDir::new().unwrap();
        let path = write_descriptor(temp.path(), "firebase_core-2.0.0", "group 'io.firebase'\n");
        let patcher = Patcher::new(PatchOptions::default().exclude(&["firebase_*"]).unwrap());

        let report = patcher.run(temp.path(), &mut Vec::new()).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "group 'io.firebase'\n");
        assert!(matches!(report.packages[0].outcome, Outcome::Excluded));
    }

    #[test]
    fn test_substring_detection_skips_comment_mentions() {
        let temp = TempDir::new().unwrap();
        let content = "// namespace is set by the app\ngroup 'a.b'\n";
        let path = write_descriptor(temp.path(), "commented", content);
        let patcher =
            Patcher::new(PatchOptions::default().with_detection(DetectionMode::Substring));

        patcher.run(temp.path(), &mut Vec::new()).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), content);
    }

    #[test]
    fn test_options_from_config() {
        let config = PatcherConfig {
            exclude: vec!["camera*".to_string()],
            on_error: FailurePolicy::Continue,
            ..PatcherConfig::default()
        };

        let options = PatchOptions::from_config(&config).unwrap();

        assert_eq!(options.on_error, FailurePolicy::Continue);
        assert!(options.is_excluded(&PackageDir::new("/c/camera-0.10.5")));
        assert!(!options.is_excluded(&PackageDir::new("/c/url_launcher-6.0.0")));
    }

    #[test]
    fn test_invalid_exclude_pattern() {
        let config = PatcherConfig {
            exclude: vec!["[".to_string()],
            ..PatcherConfig::default()
        };
        assert!(PatchOptions::from_config(&config).is_err());
    }

    #[test]
    fn test_report_serializes_outcomes() {
        let temp = TempDir::new().unwrap();
        write_descriptor(temp.path(), "foo_plugin", FOO_PLUGIN);

        let (report, _) = run(temp.path());
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["packages"][0]["package"], "foo_plugin");
        assert_eq!(json["packages"][0]["status"], "patched");
        assert_eq!(json["packages"][0]["namespace"], "com.example.foo_plugin");
    }

    #[cfg(unix)]
    mod permissions {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Make the descriptor's directory read-only so the atomic write fails
        fn lock_dir(path: &Path) -> PathBuf {
            let dir = path.parent().unwrap().to_path_buf();
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o555)).unwrap();
            dir
        }

        fn unlock_dir(dir: &Path) {
            fs::set_permissions(dir, fs::Permissions::from_mode(0o755)).unwrap();
        }

        fn running_as_root() -> bool {
            // Root ignores directory permissions.
            let scratch = TempDir::new().unwrap();
            let dir = scratch.path().join("ro");
            fs::create_dir(&dir).unwrap();
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o555)).unwrap();
            let writable = fs::write(dir.join("x"), "").is_ok();
            unlock_dir(&dir);
            writable
        }

        #[test]
        fn test_write_failure_is_fatal_by_default() {
            if running_as_root() {
                return;
            }
            let temp = TempDir::new().unwrap();
            let path = write_descriptor(temp.path(), "locked", FOO_PLUGIN);
            let dir = lock_dir(&path);

            let result = patch_missing_namespaces(temp.path(), &mut Vec::new());
            unlock_dir(&dir);

            assert!(result.is_err());
            assert_eq!(fs::read_to_string(&path).unwrap(), FOO_PLUGIN);
        }

        #[test]
        fn test_write_failure_collected_when_continuing() {
            if running_as_root() {
                return;
            }
            let temp = TempDir::new().unwrap();
            let locked = write_descriptor(temp.path(), "a_locked", FOO_PLUGIN);
            let open = write_descriptor(temp.path(), "b_open", "group 'b.open'\n");
            let dir = lock_dir(&locked);
            let patcher = Patcher::new(
                PatchOptions::default().with_failure_policy(FailurePolicy::Continue),
            );

            let mut out = Vec::new();
            let report = patcher.run(temp.path(), &mut out).unwrap();
            unlock_dir(&dir);

            assert_eq!(fs::read_to_string(&locked).unwrap(), FOO_PLUGIN);
            assert_eq!(
                fs::read_to_string(&open).unwrap(),
                "group 'b.open'\nnamespace 'b.open'\n"
            );
            assert_eq!(report.failures().count(), 1);
            assert!(!report.is_success());
            assert!(ensure_success(&report).is_err());
            assert_eq!(String::from_utf8(out).unwrap(), "Added namespace to b_open\n");
        }
    }
}
