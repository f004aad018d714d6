//! Node configuration file.
//!
//! ```toml
//! simulate = true
//! calibration_path = "data/calibration/hand_calibration.json"
//!
//! [control]
//! tick_hz = 50
//! grace_ms = 250
//!
//! [link]
//! addr = "0.0.0.0:7878"
//! ```
//!
//! Every key is optional. Command-line flags override the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hand_calibration::CalibrationStore;
use hand_control::ControlConfig;
use hand_link::LinkConfig;
use serde::{Deserialize, Serialize};

/// Everything the node reads from its config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Shaping and timing.
    pub control: ControlConfig,
    /// Network.
    pub link: LinkConfig,
    /// Calibration file; falls back to the environment, then the default path.
    pub calibration_path: Option<PathBuf>,
    /// Drive a simulated hand instead of hardware.
    pub simulate: bool,
}

impl NodeConfig {
    /// Reads `path`, or returns the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Parses and validates TOML text.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.control.validate()?;
        config.link.validate()?;
        Ok(config)
    }

    /// The calibration store this node uses.
    pub fn calibration_store(&self) -> CalibrationStore {
        self.calibration_path
            .as_ref()
            .map_or_else(CalibrationStore::from_env, CalibrationStore::new)
    }
}
