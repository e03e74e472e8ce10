use serde::Deserialize;
use std::fs;

/// Tokens that mark a charge cell as a reference to another rate table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaceholderConfig {
    /// "Use the host utility's own tariff" marker.
    pub host_tariff: String,
    /// Generic cost responsibility surcharge marker.
    pub surcharge: String,
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self {
            host_tariff: "OAT".to_string(),
            surcharge: "CRS".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SurchargeConfig {
    /// Surcharge type applied to standby (or force-flagged) agreements.
    pub standby_type: String,
}

impl Default for SurchargeConfig {
    fn default() -> Self {
        Self {
            standby_type: "pcia".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TouConfig {
    pub observe_holidays: bool,
}

impl Default for TouConfig {
    fn default() -> Self {
        Self { observe_holidays: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub workers: usize,
    pub channel_capacity: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub placeholders: PlaceholderConfig,
    pub surcharge: SurchargeConfig,
    pub tou: TouConfig,
    pub run: RunConfig,
}

impl EngineConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("BILLING_CONFIG").unwrap_or_else(|_| "billing-config.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: EngineConfig = toml::from_str(contents)?;
        if cfg.placeholders.host_tariff == cfg.placeholders.surcharge {
            anyhow::bail!(
                "placeholder tokens must differ (both are '{}')",
                cfg.placeholders.host_tariff
            );
        }
        Ok(cfg)
    }
}
