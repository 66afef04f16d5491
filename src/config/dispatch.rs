//! Dispatch configuration.

use super::{parse_env_bool, parse_env_list, parse_env_var, Config, ValidationError};
use crate::dispatch::Tier;
use crate::error::{ArchmuxError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which registry tiers the dispatcher may consider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Tiers to enable even if the registry ships them disabled
    pub enable_tiers: Vec<Tier>,
    /// Tiers to never select
    pub disable_tiers: Vec<Tier>,
    /// Highest tier to consider; `None` means no cap
    pub max_tier: Option<Tier>,
    /// Check each loaded variant against the baseline before binding it
    pub verify_on_load: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            enable_tiers: Vec::new(),
            disable_tiers: Vec::new(),
            max_tier: None,
            verify_on_load: true,
        }
    }
}

impl Config for DispatchConfig {
    fn validate(&self) -> Result<()> {
        if self.disable_tiers.contains(&Tier::Baseline) {
            return Err(ValidationError::new("disable_tiers", "baseline", "the baseline tier cannot be disabled")
                .with_suggestion("use max_tier to cap dispatch instead")
                .into());
        }

        if let Some(tier) = self.enable_tiers.iter().find(|t| self.disable_tiers.contains(t)) {
            return Err(ValidationError::new(
                "enable_tiers",
                tier.name(),
                "tier is listed as both enabled and disabled",
            )
            .into());
        }

        Ok(())
    }

    fn from_env_with_prefix(prefix: &str) -> Result<Self> {
        let mut config = Self::default();

        if let Some(tiers) = parse_env_list(&format!("{}DISPATCH_ENABLE", prefix))? {
            config.enable_tiers = tiers;
        }
        if let Some(tiers) = parse_env_list(&format!("{}DISPATCH_DISABLE", prefix))? {
            config.disable_tiers = tiers;
        }
        config.max_tier = parse_env_var(&format!("{}DISPATCH_MAX_TIER", prefix), TierCap(config.max_tier))?.0;
        config.verify_on_load = parse_env_bool(&format!("{}DISPATCH_VERIFY", prefix), config.verify_on_load)?;

        config.validate()?;
        Ok(config)
    }

    fn performance_preset() -> Self {
        // Every tier the hardware allows, without the self test at startup.
        Self {
            enable_tiers: Tier::ALL.to_vec(),
            verify_on_load: false,
            ..Self::default()
        }
    }

    fn conservative_preset() -> Self {
        Self {
            max_tier: Some(Tier::Baseline),
            ..Self::default()
        }
    }

    fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)
            .map_err(|e| ArchmuxError::configuration(format!("Failed to serialize dispatch config: {}", e)))?;
        std::fs::write(path, serialized)
            .map_err(|e| ArchmuxError::configuration(format!("Failed to write dispatch config file: {}", e)))?;
        Ok(())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ArchmuxError::configuration(format!("Failed to read dispatch config file: {}", e)))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| ArchmuxError::configuration(format!("Failed to parse dispatch config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

/// `Option<Tier>` as an environment value; `none` or an empty string clears the cap.
struct TierCap(Option<Tier>);

impl std::str::FromStr for TierCap {
    type Err = ArchmuxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Ok(TierCap(None)),
            other => other.parse().map(|tier| TierCap(Some(tier))),
        }
    }
}
