//! Configuration: TOML file, `CLM_*` environment overrides, validation.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::errors::{ClmError, Result};
use crate::core::paths;
use crate::model::DEFAULT_SLOW_THRESHOLD_SECS;
use crate::store::ledger::{FeeInfoPolicy, LedgerSettings};
use crate::tail::tailer::RotationPolicy;

/// Upper bound for `stats.window_minutes` (one year).
pub const MAX_WINDOW_MINUTES: u64 = 365 * 24 * 60;

/// Smallest activity log that can hold a handful of entries before rotating.
const MIN_ACTIVITY_LOG_BYTES: u64 = 4 * 1024;

/// Full configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub stats: StatsConfig,
    pub logging: LoggingConfig,
    pub paths: PathsConfig,
}

/// Which file to tail and how.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Explicit log file. Unset means "platform default, then fallbacks".
    pub log_file: Option<PathBuf>,
    pub fallback_log_files: Vec<PathBuf>,
    pub poll_interval_ms: u64,
    /// Lines classified and ingested per lock acquisition during the initial load.
    pub load_chunk_lines: usize,
    pub rotation_policy: RotationPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatsConfig {
    pub slow_threshold_secs: f64,
    pub window_minutes: u64,
    pub fee_info_policy: FeeInfoPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub activity_log: PathBuf,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
    pub fsync_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            fallback_log_files: Vec::new(),
            poll_interval_ms: 1_000,
            load_chunk_lines: 5_000,
            rotation_policy: RotationPolicy::default(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            slow_threshold_secs: DEFAULT_SLOW_THRESHOLD_SECS,
            window_minutes: 60,
            fee_info_policy: FeeInfoPolicy::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            activity_log: paths::default_activity_log_path(),
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
            fsync_interval_secs: 10,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_file: paths::default_config_path(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn default_path() -> PathBuf {
        paths::default_config_path()
    }

    /// Load from `path` (or the default location), then apply env overrides.
    ///
    /// A missing file at the default location means defaults; a missing
    /// explicit path is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, env_var)
    }

    fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let path_buf = path.map_or_else(Self::default_path, paths::expand_tilde);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| ClmError::io(&path_buf, source))?;
            toml::from_str::<Self>(&raw)?
        } else if path.is_some() {
            return Err(ClmError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(lookup)?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// FNV-1a of the canonical JSON form, stable across processes and releases.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Render as TOML for `clm config show`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ClmError::Serialization {
            context: "toml",
            details: e.to_string(),
        })
    }

    /// The log file to monitor given `monitor.log_file` and the fallbacks.
    #[must_use]
    pub fn resolved_log_file(&self) -> PathBuf {
        paths::resolve_log_file(
            self.monitor.log_file.as_deref(),
            &self.monitor.fallback_log_files,
        )
    }

    #[must_use]
    pub const fn ledger_settings(&self) -> LedgerSettings {
        LedgerSettings {
            slow_threshold_secs: self.stats.slow_threshold_secs,
            fee_info_policy: self.stats.fee_info_policy,
        }
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.poll_interval_ms)
    }

    /// Chart/listing window. Bounded by validation, so the conversion cannot fail.
    #[must_use]
    pub fn window(&self) -> TimeDelta {
        let minutes = i64::try_from(self.stats.window_minutes).unwrap_or(i64::MAX);
        TimeDelta::try_minutes(minutes).unwrap_or(TimeDelta::MAX)
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let lookup = &mut lookup;

        // monitor
        if let Some(raw) = lookup("CLM_LOG_FILE") {
            self.monitor.log_file = Some(PathBuf::from(raw));
        }
        set_env_parsed(lookup, "CLM_MONITOR_POLL_INTERVAL_MS", &mut self.monitor.poll_interval_ms)?;
        set_env_parsed(lookup, "CLM_MONITOR_LOAD_CHUNK_LINES", &mut self.monitor.load_chunk_lines)?;
        set_env_enum(lookup, "CLM_MONITOR_ROTATION_POLICY", &mut self.monitor.rotation_policy)?;

        // stats
        set_env_parsed(lookup, "CLM_STATS_SLOW_THRESHOLD_SECS", &mut self.stats.slow_threshold_secs)?;
        set_env_parsed(lookup, "CLM_STATS_WINDOW_MINUTES", &mut self.stats.window_minutes)?;
        set_env_enum(lookup, "CLM_STATS_FEE_INFO_POLICY", &mut self.stats.fee_info_policy)?;

        // logging
        set_env_parsed(lookup, "CLM_LOGGING_ENABLED", &mut self.logging.enabled)?;
        if let Some(raw) = lookup("CLM_LOGGING_ACTIVITY_LOG") {
            self.logging.activity_log = PathBuf::from(raw);
        }

        Ok(())
    }

    fn normalize_paths(&mut self) {
        if let Some(path) = self.monitor.log_file.as_mut() {
            *path = paths::expand_tilde(path);
        }
        for path in &mut self.monitor.fallback_log_files {
            *path = paths::expand_tilde(path);
        }
        self.logging.activity_log = paths::expand_tilde(&self.logging.activity_log);
    }

    fn validate(&self) -> Result<()> {
        if self.monitor.poll_interval_ms == 0 {
            return Err(invalid("monitor.poll_interval_ms must be > 0"));
        }
        if self.monitor.load_chunk_lines == 0 {
            return Err(invalid("monitor.load_chunk_lines must be > 0"));
        }
        if self
            .monitor
            .log_file
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            return Err(invalid("monitor.log_file must not be empty when set"));
        }

        let threshold = self.stats.slow_threshold_secs;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ClmError::InvalidConfig {
                details: format!("stats.slow_threshold_secs must be finite and > 0, got {threshold}"),
            });
        }
        if !(1..=MAX_WINDOW_MINUTES).contains(&self.stats.window_minutes) {
            return Err(ClmError::InvalidConfig {
                details: format!(
                    "stats.window_minutes must be in [1, {MAX_WINDOW_MINUTES}], got {}",
                    self.stats.window_minutes
                ),
            });
        }

        if self.logging.enabled {
            if self.logging.activity_log.as_os_str().is_empty() {
                return Err(invalid("logging.activity_log must be set when logging is enabled"));
            }
            if self.logging.max_size_bytes < MIN_ACTIVITY_LOG_BYTES {
                return Err(ClmError::InvalidConfig {
                    details: format!(
                        "logging.max_size_bytes must be >= {MIN_ACTIVITY_LOG_BYTES}, got {}",
                        self.logging.max_size_bytes
                    ),
                });
            }
        }

        Ok(())
    }
}

fn invalid(details: &str) -> ClmError {
    ClmError::InvalidConfig {
        details: details.to_string(),
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_parsed<F, T>(lookup: &mut F, name: &str, slot: &mut T) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(name) {
        *slot = raw.trim().parse::<T>().map_err(|error| ClmError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

/// Parse a lowercase policy name through the enum's serde representation.
fn set_env_enum<F, T>(lookup: &mut F, name: &str, slot: &mut T) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
    T: DeserializeOwned,
{
    if let Some(raw) = lookup(name) {
        let value = serde_json::Value::String(raw.trim().to_lowercase());
        *slot = serde_json::from_value(value).map_err(|error| ClmError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    fn apply(cfg: &mut Config, pairs: &[(&str, &str)]) -> Result<()> {
        let env = vars(pairs);
        cfg.apply_env_overrides_from(|name| env.get(name).cloned())
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.monitor.poll_interval_ms, 1_000);
        assert!((cfg.stats.slow_threshold_secs - 8.0).abs() < f64::EPSILON);
        assert_eq!(cfg.stats.window_minutes, 60);
        assert_eq!(cfg.stats.fee_info_policy, FeeInfoPolicy::Latest);
        assert_eq!(cfg.monitor.rotation_policy, RotationPolicy::Reset);
    }

    #[test]
    fn partial_toml_keeps_defaults_elsewhere() {
        let cfg: Config = toml::from_str(
            r#"
            [monitor]
            log_file = "/farm/debug.log"
            rotation_policy = "append"

            [stats]
            fee_info_policy = "first"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.monitor.log_file, Some(PathBuf::from("/farm/debug.log")));
        assert_eq!(cfg.monitor.rotation_policy, RotationPolicy::Append);
        assert_eq!(cfg.monitor.poll_interval_ms, 1_000);
        assert_eq!(cfg.stats.fee_info_policy, FeeInfoPolicy::First);
        assert_eq!(cfg.stats.window_minutes, 60);
    }

    #[test]
    fn unknown_policy_is_a_parse_error() {
        let err = toml::from_str::<Config>("[monitor]\nrotation_policy = \"rewind\"\n").unwrap_err();
        let err: ClmError = err.into();
        assert_eq!(err.code(), "CLM-1003");
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        apply(
            &mut cfg,
            &[
                ("CLM_LOG_FILE", "/mnt/farm/debug.log"),
                ("CLM_MONITOR_POLL_INTERVAL_MS", "250"),
                ("CLM_MONITOR_ROTATION_POLICY", "Append"),
                ("CLM_STATS_SLOW_THRESHOLD_SECS", "5.5"),
                ("CLM_STATS_WINDOW_MINUTES", "30"),
                ("CLM_STATS_FEE_INFO_POLICY", "first"),
                ("CLM_LOGGING_ENABLED", "false"),
            ],
        )
        .unwrap();
        assert_eq!(cfg.monitor.log_file, Some(PathBuf::from("/mnt/farm/debug.log")));
        assert_eq!(cfg.poll_interval(), Duration::from_millis(250));
        assert_eq!(cfg.monitor.rotation_policy, RotationPolicy::Append);
        assert!((cfg.stats.slow_threshold_secs - 5.5).abs() < f64::EPSILON);
        assert_eq!(cfg.window(), TimeDelta::minutes(30));
        assert_eq!(cfg.stats.fee_info_policy, FeeInfoPolicy::First);
        assert!(!cfg.logging.enabled);
    }

    #[test]
    fn malformed_env_values_are_rejected() {
        let mut cfg = Config::default();
        let err = apply(&mut cfg, &[("CLM_MONITOR_POLL_INTERVAL_MS", "soon")]).unwrap_err();
        assert_eq!(err.code(), "CLM-1003");
        assert!(err.to_string().contains("CLM_MONITOR_POLL_INTERVAL_MS"));

        let err = apply(&mut cfg, &[("CLM_STATS_FEE_INFO_POLICY", "median")]).unwrap_err();
        assert_eq!(err.code(), "CLM-1003");
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let mut cfg = Config::default();
        cfg.monitor.poll_interval_ms = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));
    }

    #[test]
    fn threshold_must_be_positive_and_finite() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut cfg = Config::default();
            cfg.stats.slow_threshold_secs = bad;
            assert!(cfg.validate().is_err(), "accepted threshold {bad}");
        }
    }

    #[test]
    fn window_bounds_enforced() {
        let mut cfg = Config::default();
        cfg.stats.window_minutes = 0;
        assert!(cfg.validate().is_err());
        cfg.stats.window_minutes = MAX_WINDOW_MINUTES + 1;
        assert!(cfg.validate().is_err());
        cfg.stats.window_minutes = MAX_WINDOW_MINUTES;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn tiny_activity_log_rejected_only_when_enabled() {
        let mut cfg = Config::default();
        cfg.logging.max_size_bytes = 10;
        assert!(cfg.validate().is_err());
        cfg.logging.enabled = false;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn load_reads_file_and_records_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[stats]\nwindow_minutes = 15\n").unwrap();
        let cfg = Config::load_with(Some(&path), |_| None).unwrap();
        assert_eq!(cfg.stats.window_minutes, 15);
        assert_eq!(cfg.paths.config_file, path);
    }

    #[test]
    fn load_returns_error_for_explicit_missing_path() {
        let err = Config::load_with(Some(Path::new("/nonexistent/clm/config.toml")), |_| None)
            .unwrap_err();
        assert!(matches!(err, ClmError::MissingConfig { .. }));
    }

    #[test]
    fn load_validates_after_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "").unwrap();
        let err = Config::load_with(Some(&path), |name| {
            (name == "CLM_MONITOR_LOAD_CHUNK_LINES").then(|| "0".to_string())
        })
        .unwrap_err();
        assert_eq!(err.code(), "CLM-1001");
    }

    #[test]
    fn to_toml_round_trips() {
        let mut cfg = Config::default();
        cfg.monitor.log_file = Some(PathBuf::from("/farm/debug.log"));
        let text = cfg.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn explicit_log_file_is_resolved_as_is() {
        let mut cfg = Config::default();
        cfg.monitor.log_file = Some(PathBuf::from("/farm/debug.log"));
        assert_eq!(cfg.resolved_log_file(), Path::new("/farm/debug.log"));
    }

    #[test]
    fn stable_hash_tracks_changes() {
        let cfg = Config::default();
        let h1 = cfg.stable_hash().unwrap();
        assert_eq!(h1, cfg.stable_hash().unwrap());
        assert_eq!(h1.len(), 16);

        let mut changed = cfg;
        changed.stats.window_minutes = 5;
        assert_ne!(h1, changed.stable_hash().unwrap());
    }
}
