//! Engine configuration loaded from JSON.
//!
//! ```json
//! {
//!   "world": { "strict_components": true },
//!   "frame": { "fixed_dt_ms": 16.0, "max_delta_ms": 100.0 },
//!   "log_filter": "orrery_ecs=debug,warn"
//! }
//! ```
//!
//! Every field is optional and falls back to [`EngineConfig::default`].

use std::path::Path;

use orrery_ecs::world::WorldConfig;
use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Default frame step: 60 frames per second.
pub const DEFAULT_FIXED_DT_MS: f64 = 1000.0 / 60.0;

/// Default `tracing` filter when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "warn";

// ---------------------------------------------------------------------------
// FrameConfig
// ---------------------------------------------------------------------------

/// Timing of the frame loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrameConfig {
    /// Step in milliseconds used by the headless scheduler.
    pub fixed_dt_ms: f64,
    /// Upper bound for the delta passed to `World::update`. Long stalls (a
    /// suspended process, a debugger) then advance the world by at most this
    /// much.
    pub max_delta_ms: Option<f64>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            fixed_dt_ms: DEFAULT_FIXED_DT_MS,
            max_delta_ms: None,
        }
    }
}

impl FrameConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.fixed_dt_ms.is_finite() && self.fixed_dt_ms > 0.0) {
            return Err(EngineError::InvalidConfig {
                reason: format!(
                    "frame.fixed_dt_ms must be positive and finite, got {}",
                    self.fixed_dt_ms
                ),
            });
        }
        if let Some(max) = self.max_delta_ms {
            if !(max.is_finite() && max > 0.0) {
                return Err(EngineError::InvalidConfig {
                    reason: format!("frame.max_delta_ms must be positive and finite, got {max}"),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub world: WorldConfig,
    pub frame: FrameConfig,
    /// `tracing` filter directive, used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            world: WorldConfig::default(),
            frame: FrameConfig::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        self.frame.validate()?;
        if self.log_filter.trim().is_empty() {
            return Err(EngineError::InvalidConfig {
                reason: "log_filter must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
