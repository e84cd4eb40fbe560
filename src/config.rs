// SPDX-License-Identifier: GPL-3.0-only

//! Session options and CLI configuration

use crate::constants::{APP_DIR, CONFIG_FILE};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// Options recognized by a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionOptions {
    /// Enables still capture via `take_snapshot`
    pub snapshots: bool,
    /// Requests a microphone track and wires the audio filter graph
    pub audio: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            snapshots: true,
            audio: false,
        }
    }
}

/// Partial options, merged shallowly over [`SessionOptions`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptionOverrides {
    pub snapshots: Option<bool>,
    pub audio: Option<bool>,
}

impl OptionOverrides {
    pub fn snapshots(mut self, enabled: bool) -> Self {
        self.snapshots = Some(enabled);
        self
    }

    pub fn audio(mut self, enabled: bool) -> Self {
        self.audio = Some(enabled);
        self
    }
}

impl SessionOptions {
    /// Apply every override that is set, leaving the rest untouched
    pub fn merge(&mut self, overrides: OptionOverrides) {
        if let Some(snapshots) = overrides.snapshots {
            self.snapshots = snapshots;
        }
        if let Some(audio) = overrides.audio {
            self.audio = audio;
        }
    }

    /// Return a copy with `overrides` merged in
    pub fn merged(mut self, overrides: OptionOverrides) -> Self {
        self.merge(overrides);
        self
    }

    /// Parse options from a JSON object, rejecting unknown keys
    ///
    /// Missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let object = value
            .as_object()
            .ok_or_else(|| ConfigError::Parse("options must be a JSON object".to_string()))?;

        if let Some(key) = object
            .keys()
            .find(|key| !matches!(key.as_str(), "snapshots" | "audio"))
        {
            return Err(ConfigError::UnknownOption(key.clone()));
        }

        Ok(serde_json::from_value(value)?)
    }
}

/// Configuration for the command-line front end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// QR poll period in milliseconds
    pub qr_interval_ms: u64,
    /// Rendering height for the preview element
    pub height: Option<u32>,
    /// Options handed to every session
    pub session: SessionOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            qr_interval_ms: crate::constants::DEFAULT_QR_INTERVAL.as_millis() as u64,
            height: None,
            session: SessionOptions::default(),
        }
    }
}

impl Config {
    /// Location of the user's config file
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load the user's config file, falling back to defaults when absent
    pub fn load() -> Result<Self, ConfigError> {
        match Self::path() {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "Loading configuration");
                let contents = std::fs::read_to_string(&path)?;
                Self::from_json(&contents)
            }
            _ => {
                debug!("No configuration file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse a configuration document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}
