//! Layered configuration for the `falken-learner` process, grounded in
//! `memory-cli::config`'s `Config::load`/`validate` pattern: built-in
//! defaults, overlaid by an optional TOML file, overlaid by `FALKEN_`-
//! prefixed environment variables.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Resolved configuration for one `falken-learner` process (spec.md §5
/// "Timeouts", §4.3 `stale_seconds`, §4.6 synchronous export).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory for the resource store (spec.md §6 "Filesystem
    /// layout").
    pub store_root: PathBuf,
    /// Root directory exported models are moved into (spec.md §6 "Model
    /// artifacts live under an operator-configured `models/` tree").
    pub models_root: PathBuf,
    /// Root directory for in-progress checkpoints (spec.md §4.4.6).
    pub checkpoints_root: PathBuf,
    /// Root directory for temporary export staging (spec.md §4.6).
    pub tmp_models_root: PathBuf,
    /// Root directory for training summaries (spec.md §4.5).
    pub summaries_root: PathBuf,

    /// `stale_seconds` (spec.md §4.3, §5; default 600s).
    pub stale_seconds: u64,
    /// `_MAX_ASSIGNMENT_WORK_TIME_SECS` (spec.md §5; default 3600s).
    pub max_assignment_work_time_secs: u64,
    /// `_WAIT_FOR_DATA_BRAIN_SECS` (spec.md §5; default 60s).
    pub wait_for_data_brain_secs: u64,
    /// Fetcher poll interval (spec.md §5 "Fetcher"; default 10s).
    pub fetch_poll_interval_secs: u64,
    /// How long `ReceiveAssignment` blocks for a pending assignment before
    /// `run_once` reports nothing arrived (spec.md §4.2, §4.7; default
    /// 120s, matching the original learner loop's poll timeout).
    pub receive_assignment_timeout_secs: u64,

    /// Manual-assignment mode target, `project/brain/session/assignment`
    /// (spec.md §4.7 "manual-assignment mode"). `None` runs the normal
    /// queue-driven loop.
    pub assignment_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            store_root: PathBuf::from("falken-data/store"),
            models_root: PathBuf::from("falken-data/models"),
            checkpoints_root: PathBuf::from("falken-data/checkpoints"),
            tmp_models_root: PathBuf::from("falken-data/tmp_models"),
            summaries_root: PathBuf::from("falken-data/summaries"),
            stale_seconds: 600,
            max_assignment_work_time_secs: 3600,
            wait_for_data_brain_secs: 60,
            fetch_poll_interval_secs: 10,
            receive_assignment_timeout_secs: 120,
            assignment_path: None,
        }
    }
}

impl Config {
    /// Loads defaults, overlays an optional TOML file, then overlays
    /// `FALKEN_`-prefixed environment variables (memory-cli's layering
    /// order, adapted from YAML/JSON/TOML sniffing to TOML-only since
    /// falken-cli only ships one format).
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_file_location() {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn default_file_location() -> Option<PathBuf> {
        ["falken.toml", ".falken.toml"]
            .into_iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse TOML config: {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("FALKEN_STORE_ROOT") {
            self.store_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("FALKEN_MODELS_ROOT") {
            self.models_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("FALKEN_CHECKPOINTS_ROOT") {
            self.checkpoints_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("FALKEN_TMP_MODELS_ROOT") {
            self.tmp_models_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("FALKEN_SUMMARIES_ROOT") {
            self.summaries_root = PathBuf::from(v);
        }
        if let Some(v) = parse_env_u64("FALKEN_STALE_SECONDS") {
            self.stale_seconds = v;
        }
        if let Some(v) = parse_env_u64("FALKEN_MAX_ASSIGNMENT_WORK_TIME_SECS") {
            self.max_assignment_work_time_secs = v;
        }
        if let Some(v) = parse_env_u64("FALKEN_WAIT_FOR_DATA_BRAIN_SECS") {
            self.wait_for_data_brain_secs = v;
        }
        if let Some(v) = parse_env_u64("FALKEN_FETCH_POLL_INTERVAL_SECS") {
            self.fetch_poll_interval_secs = v;
        }
        if let Some(v) = parse_env_u64("FALKEN_RECEIVE_ASSIGNMENT_TIMEOUT_SECS") {
            self.receive_assignment_timeout_secs = v;
        }
        if let Ok(v) = std::env::var("FALKEN_ASSIGNMENT_PATH") {
            self.assignment_path = Some(v);
        }
    }

    /// Rejects non-positive durations and directories that collide with
    /// each other (memory-cli::config::validate's style).
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stale_seconds == 0 {
            anyhow::bail!("stale_seconds must be greater than 0");
        }
        if self.max_assignment_work_time_secs == 0 {
            anyhow::bail!("max_assignment_work_time_secs must be greater than 0");
        }
        if self.wait_for_data_brain_secs == 0 {
            anyhow::bail!("wait_for_data_brain_secs must be greater than 0");
        }
        if self.fetch_poll_interval_secs == 0 {
            anyhow::bail!("fetch_poll_interval_secs must be greater than 0");
        }

        let roots = [
            ("store_root", &self.store_root),
            ("models_root", &self.models_root),
            ("checkpoints_root", &self.checkpoints_root),
            ("tmp_models_root", &self.tmp_models_root),
            ("summaries_root", &self.summaries_root),
        ];
        for i in 0..roots.len() {
            for j in (i + 1)..roots.len() {
                if roots[i].1 == roots[j].1 {
                    anyhow::bail!(
                        "{} and {} must not share a directory ({})",
                        roots[i].0,
                        roots[j].0,
                        roots[i].1.display()
                    );
                }
            }
        }

        if let Some(assignment_path) = &self.assignment_path {
            let parts: Vec<&str> = assignment_path.split('/').collect();
            if parts.len() != 4 || parts.iter().any(|p| p.is_empty()) {
                anyhow::bail!(
                    "assignment_path must be project/brain/session/assignment, got {assignment_path:?}"
                );
            }
        }

        Ok(())
    }

    pub fn stale_seconds(&self) -> i64 {
        self.stale_seconds as i64
    }

    pub fn max_assignment_work_time(&self) -> Duration {
        Duration::from_secs(self.max_assignment_work_time_secs)
    }

    pub fn wait_for_data_brain(&self) -> Duration {
        Duration::from_secs(self.wait_for_data_brain_secs)
    }

    pub fn fetch_poll_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_poll_interval_secs)
    }

    pub fn receive_assignment_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_assignment_timeout_secs)
    }

    /// Splits a validated `assignment_path` into its four components.
    pub fn parsed_assignment_path(&self) -> Option<(String, String, String, String)> {
        let path = self.assignment_path.as_ref()?;
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() != 4 {
            return None;
        }
        Some((parts[0].into(), parts[1].into(), parts[2].into(), parts[3].into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn colliding_roots_fail_validation() {
        let mut config = Config::default();
        config.models_root = config.store_root.clone();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must not share a directory"));
    }

    #[test]
    fn malformed_assignment_path_fails_validation() {
        let mut config = Config::default();
        config.assignment_path = Some("project/brain".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn well_formed_assignment_path_parses() {
        let mut config = Config::default();
        config.assignment_path = Some("p/b/s/a".into());
        config.validate().unwrap();
        assert_eq!(
            config.parsed_assignment_path(),
            Some(("p".into(), "b".into(), "s".into(), "a".into()))
        );
    }
}

fn parse_env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}
