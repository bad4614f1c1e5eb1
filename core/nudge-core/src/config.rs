//! Runtime configuration.
//!
//! Loaded from `~/.nudge/config.toml` (or `$NUDGE_CONFIG`). Every field is
//! optional; a missing file yields the defaults below, which are the rules the
//! classifier was tuned with.
//!
//! ```toml
//! default_tone = "firm"
//!
//! [thresholds]
//! tab_switch_threshold = 4
//! idle_ms = 15000
//!
//! [timing]
//! cooldown_ms = 12000
//! ```

use crate::error::{NudgeError, Result};
use nudge_daemon_protocol::Tone;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "NUDGE_CONFIG";
const NUDGE_DIR_NAME: &str = ".nudge";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Fixed thresholds for the stall classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StallThresholds {
    /// Switches within the window at which a tab loop is declared.
    pub tab_switch_threshold: u32,
    pub tab_switch_window_ms: u64,
    /// Idle time that must be exceeded for a dwell freeze.
    pub idle_ms: u64,
    /// Scroll distance (px) that must be exceeded for a scroll loop.
    pub scroll_distance_px: f64,
    /// Corroborating idle time for a scroll loop. Lower than `idle_ms`.
    pub scroll_idle_ms: u64,
}

impl Default for StallThresholds {
    fn default() -> Self {
        Self {
            tab_switch_threshold: 4,
            tab_switch_window_ms: 45_000,
            idle_ms: 15_000,
            scroll_distance_px: 2_000.0,
            scroll_idle_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub cooldown_ms: u64,
    pub restart_revert_ms: u64,
    pub intervention_timeout_ms: u64,
    pub intervention_poll_ms: u64,
    /// Restarts at or under this latency count as resumed within goal.
    pub resume_goal_secs: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 12_000,
            restart_revert_ms: 2_500,
            intervention_timeout_ms: 30_000,
            intervention_poll_ms: 5_000,
            resume_goal_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NudgeConfig {
    #[serde(default)]
    pub default_tone: Tone,
    #[serde(default)]
    pub thresholds: StallThresholds,
    #[serde(default)]
    pub timing: TimingConfig,
}

impl NudgeConfig {
    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn validate(&self) -> Result<()> {
        let thresholds = &self.thresholds;
        if thresholds.tab_switch_threshold == 0 {
            return Err(NudgeError::ConfigInvalid(
                "thresholds.tab_switch_threshold must be at least 1".to_string(),
            ));
        }
        if thresholds.tab_switch_window_ms == 0 {
            return Err(NudgeError::ConfigInvalid(
                "thresholds.tab_switch_window_ms must be positive".to_string(),
            ));
        }
        if !thresholds.scroll_distance_px.is_finite() || thresholds.scroll_distance_px < 0.0 {
            return Err(NudgeError::ConfigInvalid(
                "thresholds.scroll_distance_px must be a non-negative number".to_string(),
            ));
        }
        if thresholds.scroll_idle_ms > thresholds.idle_ms {
            return Err(NudgeError::ConfigInvalid(format!(
                "thresholds.scroll_idle_ms ({}) must not exceed thresholds.idle_ms ({})",
                thresholds.scroll_idle_ms, thresholds.idle_ms
            )));
        }
        if self.timing.intervention_poll_ms == 0 {
            return Err(NudgeError::ConfigInvalid(
                "timing.intervention_poll_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Returns `~/.nudge`.
pub fn nudge_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(NudgeError::HomeDirNotFound)?;
    Ok(home.join(NUDGE_DIR_NAME))
}

pub fn default_config_path() -> Result<PathBuf> {
    if let Ok(path) = env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    Ok(nudge_dir()?.join(CONFIG_FILE_NAME))
}

/// Loads configuration, returning defaults when the file doesn't exist.
pub fn load_config(path: Option<PathBuf>) -> Result<NudgeConfig> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(NudgeConfig::default());
    }

    load_config_file(&config_path)
}

fn load_config_file(path: &Path) -> Result<NudgeConfig> {
    let content = fs_err::read_to_string(path).map_err(|source| NudgeError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    let config =
        NudgeConfig::from_toml_str(&content).map_err(|err| NudgeError::ConfigMalformed {
            path: path.to_path_buf(),
            details: err.to_string(),
        })?;
    config.validate()?;
    Ok(config)
}
