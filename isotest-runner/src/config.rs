//! Run configuration: runner kind, watchdog timeout, and temp-directory
//! override, loaded from `.config/isotest.toml` and layered under CLI
//! overrides.
//!
//! Deliberately a single flat `serde`-derived struct rather than a layered
//! tool-config-plus-profile-plus-overrides system: no profiles, no
//! per-test overrides. See `DESIGN.md` for the rationale.

use crate::runner::RunnerKind;
use camino::Utf8PathBuf;
use serde::Deserialize;
use std::time::Duration;

fn default_runner_kind() -> RunnerKindConfig {
    RunnerKindConfig::Forking
}

/// Environment variables consulted, in order, to locate the temp directory
/// the direct runner redirects standard streams into. The first one set to
/// a non-empty value wins.
const TMPDIR_VARS: &[&str] = &["TMPDIR", "TEMP", "TMP", "TEMPDIR"];

/// Resolve the temp directory to use when no explicit override is
/// configured: the first non-empty variable in [`TMPDIR_VARS`], falling
/// back to the platform's default temp directory.
pub fn resolve_tmpdir() -> Utf8PathBuf {
    for var in TMPDIR_VARS {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                return Utf8PathBuf::from(value);
            }
        }
    }
    Utf8PathBuf::from_path_buf(std::env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

/// The on-disk representation of [`RunnerKind`].
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum RunnerKindConfig {
    /// See [`RunnerKind::Direct`].
    Direct,
    /// See [`RunnerKind::Forking`].
    #[default]
    Forking,
}

impl From<RunnerKindConfig> for RunnerKind {
    fn from(value: RunnerKindConfig) -> Self {
        match value {
            RunnerKindConfig::Direct => RunnerKind::Direct,
            RunnerKindConfig::Forking => RunnerKind::Forking,
        }
    }
}

/// Top-level run configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct IsotestConfig {
    /// Which runner kind to use by default. Overridden by `run -n`.
    #[serde(default = "default_runner_kind")]
    pub runner_kind: RunnerKindConfig,

    /// Optional per-case watchdog timeout, in seconds. Overridden by
    /// `run --timeout`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Optional override for the temp directory used to redirect the
    /// direct runner's standard streams. Defaults to [`resolve_tmpdir`]
    /// when unset; see [`IsotestConfig::resolved_temp_dir`].
    #[serde(default)]
    pub temp_dir: Option<Utf8PathBuf>,
}

impl IsotestConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load configuration from `.config/isotest.toml` under `root`, if it
    /// exists. Returns the default configuration if the file is absent.
    pub fn load(root: &camino::Utf8Path) -> std::io::Result<Self> {
        let path = root.join(".config").join("isotest.toml");
        match std::fs::read_to_string(&path) {
            Ok(text) => Self::from_toml(&text)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// The configured watchdog timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// The temp directory the direct runner should redirect standard
    /// streams into: the configured override if present, otherwise
    /// [`resolve_tmpdir`].
    pub fn resolved_temp_dir(&self) -> Utf8PathBuf {
        self.temp_dir.clone().unwrap_or_else(resolve_tmpdir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_forking_runner_and_no_timeout() {
        let config = IsotestConfig::default();
        assert_eq!(config.runner_kind, RunnerKindConfig::Forking);
        assert!(config.timeout().is_none());
    }

    #[test]
    fn parses_explicit_fields() {
        let config = IsotestConfig::from_toml(
            r#"
            runner-kind = "direct"
            timeout-secs = 30
            "#,
        )
        .expect("valid toml");
        assert_eq!(config.runner_kind, RunnerKindConfig::Direct);
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn rejects_unknown_fields() {
        let result = IsotestConfig::from_toml("bogus-field = 1");
        assert!(result.is_err());
    }

    #[test]
    fn load_reads_config_from_dot_config_dir() {
        let dir = camino_tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join(".config")).expect("mkdir");
        std::fs::write(
            dir.path().join(".config").join("isotest.toml"),
            "runner-kind = \"direct\"\n",
        )
        .expect("write config");

        let config = IsotestConfig::load(dir.path()).expect("load");
        assert_eq!(config.runner_kind, RunnerKindConfig::Direct);
    }

    #[test]
    fn load_defaults_when_config_file_absent() {
        let dir = camino_tempfile::tempdir().expect("tempdir");
        let config = IsotestConfig::load(dir.path()).expect("load");
        assert_eq!(config.runner_kind, RunnerKindConfig::Forking);
    }

    #[test]
    fn resolved_temp_dir_prefers_configured_override() {
        let config = IsotestConfig {
            temp_dir: Some(Utf8PathBuf::from("/configured/override")),
            ..IsotestConfig::default()
        };
        assert_eq!(config.resolved_temp_dir(), Utf8PathBuf::from("/configured/override"));
    }

    #[test]
    fn resolve_tmpdir_honors_tmpdir_env_var() {
        // SAFETY: this test does not run concurrently with other tests that
        // read or write the process environment (single-threaded by
        // `TMPDIR_VARS` not being touched elsewhere in this crate's tests).
        let previous = std::env::var("TMPDIR").ok();
        unsafe { std::env::set_var("TMPDIR", "/custom/tmp") };
        let resolved = resolve_tmpdir();
        match previous {
            Some(value) => unsafe { std::env::set_var("TMPDIR", value) },
            None => unsafe { std::env::remove_var("TMPDIR") },
        }
        assert_eq!(resolved, Utf8PathBuf::from("/custom/tmp"));
    }
}
