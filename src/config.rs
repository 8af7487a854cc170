// 7.0 config.rs: all settings in one place. fees, leverage caps, liquidation buffer, routing.
// 7.1 routing settings also live in a runtime store (routing.rs),
// so they can change without restart.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::account::CurrencyEquivalence;
use crate::types::{Bps, Leverage};

/** 7.2: fee settings. flat taker fee in bps. 10 bps = 0.1% */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeConfig {
    pub taker_fee_bps: Bps,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            taker_fee_bps: Bps::new(10),
        }
    }
}

impl FeeConfig {
    pub fn taker_rate(&self) -> Decimal {
        self.taker_fee_bps.as_fraction()
    }
}

// Leverage caps and margin rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    // Cap for commodity instruments (forex caps are per symbol)
    pub commodity_max_leverage: Leverage,
    // Cap for crypto instruments
    pub crypto_max_leverage: Leverage,
    // Fraction of the initial margin fraction used for the liquidation distance.
    // 0.9 puts liquidation 10% before the zero-equity point.
    pub liquidation_buffer: Decimal,
    // Maintenance requirement as a fraction of leverage-implied initial margin
    pub maintenance_fraction: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            commodity_max_leverage: Leverage::from_requested(100),
            crypto_max_leverage: Leverage::from_requested(50),
            liquidation_buffer: dec!(0.9),
            maintenance_fraction: dec!(0.5),
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.commodity_max_leverage.value() < 1 || self.crypto_max_leverage.value() < 1 {
            return Err(ConfigError::InvalidRisk {
                reason: "Leverage caps must be at least 1x".to_string(),
            });
        }

        // liquidation buffer must keep the liquidation price on the right side of entry
        if self.liquidation_buffer <= Decimal::ZERO || self.liquidation_buffer >= Decimal::ONE {
            return Err(ConfigError::InvalidRisk {
                reason: "Liquidation buffer must be in (0, 1)".to_string(),
            });
        }

        if self.maintenance_fraction <= Decimal::ZERO || self.maintenance_fraction >= Decimal::ONE {
            return Err(ConfigError::InvalidRisk {
                reason: "Maintenance fraction must be in (0, 1)".to_string(),
            });
        }
        Ok(())
    }
}

// Price cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceCacheConfig {
    // Entries older than this are treated as absent
    pub max_staleness_secs: u64,
}

impl Default for PriceCacheConfig {
    fn default() -> Self {
        Self {
            max_staleness_secs: 60,
        }
    }
}

impl PriceCacheConfig {
    pub fn max_staleness_millis(&self) -> u64 {
        self.max_staleness_secs * 1000
    }
}

/// Internal-book vs external-LP routing thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub enabled: bool,
    // Route orders whose notional exceeds this
    pub size_threshold: Decimal,
    // Max absolute net exposure per instrument
    pub exposure_limit_per_instrument: Decimal,
    // Max absolute net exposure across the book
    pub exposure_limit_total: Decimal,
    pub primary_lp: String,
    pub fallback_lp: Option<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            size_threshold: dec!(100_000),
            exposure_limit_per_instrument: dec!(500_000),
            exposure_limit_total: dec!(5_000_000),
            primary_lp: "mock_lp".to_string(),
            fallback_lp: None,
        }
    }
}

// The complete core configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    pub fees: FeeConfig,
    pub risk: RiskConfig,
    pub price_cache: PriceCacheConfig,
    pub routing: RoutingConfig,
    pub currency_equivalence: CurrencyEquivalence,
}

impl CoreConfig {
    // Conservative caps for production books
    pub fn production() -> Self {
        let mut config = Self::default();
        config.risk.commodity_max_leverage = Leverage::from_requested(50);
        config.risk.crypto_max_leverage = Leverage::from_requested(20);
        config.routing.enabled = true;
        config
    }

    // Small thresholds so A-book routing is easy to exercise
    pub fn staging() -> Self {
        let mut config = Self::default();
        config.routing.enabled = true;
        config.routing.size_threshold = dec!(10_000);
        config.routing.exposure_limit_per_instrument = dec!(50_000);
        config.routing.exposure_limit_total = dec!(250_000);
        config
    }

    /// Layered load: built-in defaults, then `default.toml`, then
    /// `$BROKERAGE_ENV.toml` from `config_dir`, then `BROKERAGE__*` env vars.
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let env_name =
            std::env::var("BROKERAGE_ENV").unwrap_or_else(|_| "development".to_string());

        let loaded: CoreConfig = config::Config::builder()
            .add_source(config::Config::try_from(&CoreConfig::default())?)
            .add_source(config::File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                config::File::from(config_dir.join(format!("{env_name}.toml"))).required(false),
            )
            .add_source(
                config::Environment::with_prefix("BROKERAGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        // fee checks
        if self.fees.taker_fee_bps.value() < 0 || self.fees.taker_fee_bps.value() > 100 {
            return Err(ConfigError::InvalidFees {
                reason: "Taker fee must be within 0..=100 bps".to_string(),
            });
        }

        self.risk.validate()?;

        if self.price_cache.max_staleness_secs == 0 {
            return Err(ConfigError::InvalidPriceCache {
                reason: "Staleness window must be positive".to_string(),
            });
        }

        validate_routing(&self.routing)?;
        self.currency_equivalence.validate()
    }
}

pub fn validate_routing(routing: &RoutingConfig) -> Result<(), ConfigError> {
    if routing.size_threshold < Decimal::ZERO
        || routing.exposure_limit_per_instrument < Decimal::ZERO
        || routing.exposure_limit_total < Decimal::ZERO
    {
        return Err(ConfigError::InvalidRouting {
            reason: "Thresholds and limits must be non-negative".to_string(),
        });
    }
    if routing.enabled && routing.primary_lp.is_empty() {
        return Err(ConfigError::InvalidRouting {
            reason: "Routing enabled without a primary LP".to_string(),
        });
    }
    Ok(())
}

// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid fees: {reason}")]
    InvalidFees { reason: String },

    #[error("Invalid risk settings: {reason}")]
    InvalidRisk { reason: String },

    #[error("Invalid price cache settings: {reason}")]
    InvalidPriceCache { reason: String },

    #[error("Invalid routing settings: {reason}")]
    InvalidRouting { reason: String },

    #[error("Invalid currency equivalence table: {reason}")]
    InvalidCurrencies { reason: String },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn config(&self) -> CoreConfig {
        match self {
            Environment::Development => CoreConfig::default(),
            Environment::Staging => CoreConfig::staging(),
            Environment::Production => CoreConfig::production(),
        }
    }
}
