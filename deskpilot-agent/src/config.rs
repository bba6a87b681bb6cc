//! Configuration for the deskpilot agent.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use deskpilot_core::hud::{HudStyle, Rgb};
use deskpilot_core::{ControllerConfig, SettleParams};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decision::DEFAULT_SYSTEM_PROMPT;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Decision service (chat completions endpoint).
    pub decision: DecisionConfig,
    /// Image sent to the decision service.
    pub perception: PerceptionConfig,
    /// Post-action delays and failure handling.
    pub timing: TimingConfig,
    /// Screen-stability wait after input actions.
    pub settle: SettleConfig,
    /// Status overlay.
    pub hud: HudConfig,
    /// Screenshot archive.
    pub dump: DumpConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Decision service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// OpenAI-compatible `/v1/chat/completions` URL.
    pub endpoint: String,
    /// Model identifier passed through unchanged.
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub system_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub delay_after_action_ms: u64,
    pub delay_after_observe_ms: u64,
    /// Wait before the next capture after a failed decision.
    pub decision_retry_delay_ms: u64,
    /// Consecutive decision failures tolerated before giving up.
    pub failure_budget: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleConfig {
    pub enabled: bool,
    pub max_wait_ms: u64,
    pub sample_width: u32,
    pub sample_height: u32,
    pub check_interval_ms: u64,
    pub required_stable_frames: u32,
    pub change_ratio_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HudConfig {
    /// Text shown before the first decision.
    pub initial_text: String,
    pub font_name: String,
    pub font_px: u32,
    pub font_weight: u32,
    pub line_spacing: u32,
    pub margin: u32,
    pub max_width: u32,
    pub max_lines: usize,
    pub outline_px: u32,
    pub text_color: Rgb,
    pub outline_color: Rgb,
    pub reassert_pulses: u32,
    pub reassert_pause_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpConfig {
    pub enabled: bool,
    /// Parent of the per-run `run_YYYYMMDD_HHMMSS` directories.
    pub folder: PathBuf,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:1234/v1/chat/completions".into(),
            model: "qwen3-vl-2b-instruct".into(),
            timeout_secs: 120,
            temperature: 1.5,
            top_p: 0.8,
            max_tokens: 2000,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
        }
    }
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            width: 1536,
            height: 864,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            delay_after_action_ms: 850,
            delay_after_observe_ms: 1500,
            decision_retry_delay_ms: 2000,
            failure_budget: 3,
        }
    }
}

impl Default for SettleConfig {
    fn default() -> Self {
        let p = SettleParams::default();
        Self {
            enabled: true,
            max_wait_ms: p.max_wait.as_millis() as u64,
            sample_width: p.sample_width,
            sample_height: p.sample_height,
            check_interval_ms: p.check_interval.as_millis() as u64,
            required_stable_frames: p.required_stable_frames,
            change_ratio_threshold: p.change_ratio_threshold,
        }
    }
}

impl Default for HudConfig {
    fn default() -> Self {
        let s = HudStyle::default();
        Self {
            initial_text: String::new(),
            font_name: s.font_name,
            font_px: s.font_px,
            font_weight: s.font_weight,
            line_spacing: s.line_spacing,
            margin: s.margin,
            max_width: s.max_width,
            max_lines: s.max_lines,
            outline_px: s.outline_px,
            text_color: s.text_color,
            outline_color: s.outline_color,
            reassert_pulses: s.reassert_pulses,
            reassert_pause_ms: s.reassert_pause.as_millis() as u64,
        }
    }
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            folder: PathBuf::from("dump"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    /// Report that defaults are used instead: a warning for a broken file,
    /// a note for a missing one.
    pub fn log_fallback(&self) {
        match self {
            ConfigError::Read { path, source } if source.kind() == ErrorKind::NotFound => {
                tracing::info!("no config at {}; using defaults", path.display());
            }
            other => tracing::warn!("{other}; using defaults"),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        Self::try_load(path).unwrap_or_else(|e| {
            e.log_fallback();
            Self::default()
        })
    }

    /// Read and parse `path` without falling back.
    ///
    /// Lets the caller report the failure once logging is set up.
    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Convert into a [`ControllerConfig`], clamping nonsensical values.
    pub fn to_controller_config(&self) -> ControllerConfig {
        let hud = &self.hud;
        let settle = &self.settle;
        ControllerConfig {
            perception_width: self.perception.width.clamp(1, 8192),
            perception_height: self.perception.height.clamp(1, 8192),
            decision_timeout: Duration::from_secs(self.decision.timeout_secs.max(1)),
            delay_after_action: Duration::from_millis(self.timing.delay_after_action_ms),
            delay_after_observe: Duration::from_millis(self.timing.delay_after_observe_ms),
            settle_enabled: settle.enabled,
            settle: SettleParams {
                max_wait: Duration::from_millis(settle.max_wait_ms),
                sample_width: settle.sample_width.clamp(1, 4096),
                sample_height: settle.sample_height.clamp(1, 4096),
                check_interval: Duration::from_millis(settle.check_interval_ms.max(1)),
                required_stable_frames: settle.required_stable_frames.max(1),
                change_ratio_threshold: change_ratio_threshold(settle.change_ratio_threshold),
            },
            failure_budget: self.timing.failure_budget.max(1),
            decision_retry_delay: Duration::from_millis(self.timing.decision_retry_delay_ms),
            initial_hud_text: hud.initial_text.clone(),
            hud: HudStyle {
                font_name: hud.font_name.clone(),
                font_px: hud.font_px.clamp(6, 96),
                font_weight: hud.font_weight.clamp(100, 900),
                line_spacing: hud.line_spacing,
                margin: hud.margin,
                max_width: hud.max_width.max(1),
                max_lines: hud.max_lines.clamp(1, 99),
                outline_px: hud.outline_px.min(8),
                text_color: hud.text_color,
                outline_color: hud.outline_color,
                reassert_pulses: hud.reassert_pulses.max(2),
                reassert_pause: Duration::from_millis(hud.reassert_pause_ms),
            },
        }
    }
}

/// NaN would fail every `<=` comparison and the screen would never settle.
fn change_ratio_threshold(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        SettleParams::default().change_ratio_threshold
    }
}

// ── Tests ────────────────────────────────────────────────────────
