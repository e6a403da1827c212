// src/config.rs

//! Construction-time settings for a keystroke stream.
//!
//! Deserialized from JSON; every field falls back to its default when
//! missing, so `{}` is a valid configuration.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::fifo::DEFAULT_FIFO_CAPACITY;
use crate::keystroke::KEYSTROKE_MAX_LEN;

/// Settings for [`KeystrokeStream::with_config`](crate::KeystrokeStream::with_config).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeystrokeConfig {
    /// 8-bit CSI byte. 0 (or ESC) means only `ESC [` introduces a CSI sequence.
    pub csi: u8,
    /// Maximum raw bytes retained per keystroke, `1..=KEYSTROKE_MAX_LEN`.
    pub max_len: usize,
    /// Initial FIFO capacity in bytes. Not a limit.
    pub fifo_capacity: usize,
}

impl Default for KeystrokeConfig {
    fn default() -> Self {
        KeystrokeConfig {
            csi: 0,
            max_len: KEYSTROKE_MAX_LEN,
            fifo_capacity: DEFAULT_FIFO_CAPACITY,
        }
    }
}

impl KeystrokeConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let config: KeystrokeConfig =
            serde_json::from_str(json).context("Failed to parse keystroke configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_len == 0 || self.max_len > KEYSTROKE_MAX_LEN {
            bail!(
                "max_len {} out of range 1..={}",
                self.max_len,
                KEYSTROKE_MAX_LEN
            );
        }
        Ok(())
    }
}
