// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! syncwait configuration - constants and runtime knobs in one place.
//!
//! - **Static**: slot limits used by the wait driver.
//! - **Dynamic**: [`WaitConfig`], built explicitly or from the environment
//!   (`SYNCWAIT_MAX_SLOTS`), consumed by the directory when it creates a
//!   wait set for a new context.

use crate::error::{Error, Result};

/// Default number of driver slots per wait set.
///
/// One slot is consumed per armed channel or event.
pub const DEFAULT_MAX_SLOTS: usize = 2048;

/// Upper bound accepted for `max_slots` (bitmap stays below 8 KiB).
pub const MAX_SLOTS_LIMIT: usize = 65_536;

/// Environment variable overriding [`WaitConfig::max_slots`].
pub const ENV_MAX_SLOTS: &str = "SYNCWAIT_MAX_SLOTS";

/// Runtime configuration for wait sets created by a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    /// Maximum concurrently armed items (channels + events).
    pub max_slots: usize,
}

impl WaitConfig {
    /// Configuration with the default slot count.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_slots: DEFAULT_MAX_SLOTS,
        }
    }

    /// Override the slot count.
    #[must_use]
    pub const fn with_max_slots(mut self, max_slots: usize) -> Self {
        self.max_slots = max_slots;
        self
    }

    /// Build from the environment, falling back to defaults.
    ///
    /// Unparsable or out-of-range values are logged and ignored.
    pub fn from_env() -> Self {
        let config = Self::new();
        let Ok(raw) = std::env::var(ENV_MAX_SLOTS) else {
            return config;
        };

        match Self::parse_max_slots(&raw) {
            Ok(max_slots) => {
                log::debug!("[config] {}={} applied", ENV_MAX_SLOTS, max_slots);
                config.with_max_slots(max_slots)
            }
            Err(err) => {
                log::warn!(
                    "[config] ignoring {}='{}': {}, using {}",
                    ENV_MAX_SLOTS,
                    raw,
                    err,
                    DEFAULT_MAX_SLOTS
                );
                config
            }
        }
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_slots == 0 || self.max_slots > MAX_SLOTS_LIMIT {
            return Err(Error::InvalidArgument(format!(
                "max_slots must be in 1..={} (got {})",
                MAX_SLOTS_LIMIT, self.max_slots
            )));
        }
        Ok(())
    }

    fn parse_max_slots(raw: &str) -> Result<usize> {
        let value: usize = raw
            .trim()
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("'{}' is not a slot count", raw)))?;
        Self::new().with_max_slots(value).validate()?;
        Ok(value)
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = WaitConfig::default();
        assert_eq!(config.max_slots, DEFAULT_MAX_SLOTS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_and_oversized_rejected() {
        assert!(WaitConfig::new().with_max_slots(0).validate().is_err());
        assert!(WaitConfig::new()
            .with_max_slots(MAX_SLOTS_LIMIT + 1)
            .validate()
            .is_err());
    }

    #[test]
    fn parse_max_slots_trims_and_bounds() {
        assert_eq!(WaitConfig::parse_max_slots(" 64 ").expect("parse"), 64);
        assert!(WaitConfig::parse_max_slots("many").is_err());
        assert!(WaitConfig::parse_max_slots("0").is_err());
    }
}
