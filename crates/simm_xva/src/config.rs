//! Margin and MVA configuration.
//!
//! Handles loading configuration from TOML strings or files and from
//! `SIMM_*` environment variables, which take precedence over file values.
//!
//! # Examples
//!
//! ```
//! use simm_sensitivity::SensitivityMode;
//! use simm_xva::config::MarginConfig;
//!
//! let config = MarginConfig::from_toml_str(
//!     r#"
//!     sensitivity_mode = "melting"
//!
//!     [mva]
//!     time_step = 0.25
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.sensitivity_mode, SensitivityMode::Melting);
//! assert_eq!(config.mva.time_step, 0.25);
//! assert_eq!(config.calculation_currency.code(), "EUR");
//! ```

use crate::mva::MvaMode;
use serde::Deserialize;
use simm_core::types::Currency;
use simm_sensitivity::{LadderSensitivityScheme, SensitivityMode, WeightMode};
use std::path::Path;
use thiserror::Error;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of its admissible range.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The configuration could not be parsed.
    #[error("Configuration parse error: {0}")]
    ParseError(String),

    /// The configuration file could not be read.
    #[error("Configuration file error: {0}")]
    FileError(String),

    /// An environment variable holds an unusable value.
    #[error("Environment variable error: {0}")]
    EnvError(String),
}

/// MVA discretisation and funding.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MvaConfig {
    /// Spacing of the margin grid in years.
    pub time_step: f64,
    /// Funding spread over the numeraire, continuously compounded.
    pub funding_spread: f64,
    /// Path-wise or expected margin.
    pub mode: MvaMode,
}

impl Default for MvaConfig {
    fn default() -> Self {
        Self {
            time_step: 0.5,
            funding_spread: 0.0,
            mode: MvaMode::Exact,
        }
    }
}

impl MvaConfig {
    /// Sets the margin grid spacing.
    pub fn with_time_step(mut self, time_step: f64) -> Self {
        self.time_step = time_step;
        self
    }

    /// Sets the funding spread.
    pub fn with_funding_spread(mut self, funding_spread: f64) -> Self {
        self.funding_spread = funding_spread;
        self
    }

    /// Sets the MVA mode.
    pub fn with_mode(mut self, mode: MvaMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Configuration of a margin orchestrator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MarginConfig {
    /// How bucketed sensitivities are produced at future times.
    pub sensitivity_mode: SensitivityMode,
    /// Weighting of melted sensitivities.
    pub weight_mode: WeightMode,
    /// Grid spacing in `interpolation` mode.
    pub interpolation_step: f64,
    /// Whether discount-curve sensitivities enter the margin.
    pub consider_ois_sensitivities: bool,
    /// Currency the margin is reported in.
    pub calculation_currency: Currency,
    /// MVA settings.
    pub mva: MvaConfig,
}

impl Default for MarginConfig {
    fn default() -> Self {
        Self {
            sensitivity_mode: SensitivityMode::Exact,
            weight_mode: WeightMode::Constant,
            interpolation_step: 1.0,
            consider_ois_sensitivities: true,
            calculation_currency: Currency::eur(),
            mva: MvaConfig::default(),
        }
    }
}

impl MarginConfig {
    /// Create a new MarginConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::FileError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Defaults overridden by `SIMM_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Loads `path` if given, then applies `SIMM_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_env_overrides()
    }

    /// Applies `SIMM_*` environment variables on top of `self`.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, keyed by environment variable name,
    /// and validates the result.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `SIMM_SENSITIVITY_MODE` | `sensitivity_mode` |
    /// | `SIMM_WEIGHT_MODE` | `weight_mode` |
    /// | `SIMM_INTERPOLATION_STEP` | `interpolation_step` |
    /// | `SIMM_CONSIDER_OIS` | `consider_ois_sensitivities` |
    /// | `SIMM_CALCULATION_CURRENCY` | `calculation_currency` |
    /// | `SIMM_MVA_TIME_STEP` | `mva.time_step` |
    /// | `SIMM_MVA_FUNDING_SPREAD` | `mva.funding_spread` |
    /// | `SIMM_MVA_MODE` | `mva.mode` |
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("SIMM_SENSITIVITY_MODE") {
            self.sensitivity_mode = value.parse().map_err(|e| env_error("SIMM_SENSITIVITY_MODE", e))?;
        }
        if let Some(value) = lookup("SIMM_WEIGHT_MODE") {
            self.weight_mode = value.parse().map_err(|e| env_error("SIMM_WEIGHT_MODE", e))?;
        }
        if let Some(value) = lookup("SIMM_INTERPOLATION_STEP") {
            self.interpolation_step = parse_f64("SIMM_INTERPOLATION_STEP", &value)?;
        }
        if let Some(value) = lookup("SIMM_CONSIDER_OIS") {
            self.consider_ois_sensitivities = match value.to_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => return Err(env_error("SIMM_CONSIDER_OIS", value)),
            };
        }
        if let Some(value) = lookup("SIMM_CALCULATION_CURRENCY") {
            self.calculation_currency =
                value.parse().map_err(|e| env_error("SIMM_CALCULATION_CURRENCY", e))?;
        }
        if let Some(value) = lookup("SIMM_MVA_TIME_STEP") {
            self.mva.time_step = parse_f64("SIMM_MVA_TIME_STEP", &value)?;
        }
        if let Some(value) = lookup("SIMM_MVA_FUNDING_SPREAD") {
            self.mva.funding_spread = parse_f64("SIMM_MVA_FUNDING_SPREAD", &value)?;
        }
        if let Some(value) = lookup("SIMM_MVA_MODE") {
            self.mva.mode = value.parse().map_err(|e| env_error("SIMM_MVA_MODE", e))?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.interpolation_step.is_finite() && self.interpolation_step > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "interpolation_step",
                reason: format!("must be positive, got {}", self.interpolation_step),
            });
        }
        if !(self.mva.time_step.is_finite() && self.mva.time_step > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "mva.time_step",
                reason: format!("must be positive, got {}", self.mva.time_step),
            });
        }
        if !self.mva.funding_spread.is_finite() {
            return Err(ConfigError::InvalidValue {
                field: "mva.funding_spread",
                reason: "must be finite".to_string(),
            });
        }
        Ok(())
    }

    /// Sensitivity scheme described by this configuration.
    pub fn sensitivity_scheme(&self) -> LadderSensitivityScheme {
        LadderSensitivityScheme::new(self.sensitivity_mode)
            .with_weight_mode(self.weight_mode)
            .with_interpolation_step(self.interpolation_step)
            .with_ois_sensitivities(self.consider_ois_sensitivities)
    }

    /// Sets the sensitivity mode.
    pub fn with_sensitivity_mode(mut self, mode: SensitivityMode) -> Self {
        self.sensitivity_mode = mode;
        self
    }

    /// Sets the weight mode.
    pub fn with_weight_mode(mut self, weight_mode: WeightMode) -> Self {
        self.weight_mode = weight_mode;
        self
    }

    /// Sets the interpolation grid spacing.
    pub fn with_interpolation_step(mut self, step: f64) -> Self {
        self.interpolation_step = step;
        self
    }

    /// Enables or disables discount-curve sensitivities.
    pub fn with_ois_sensitivities(mut self, consider: bool) -> Self {
        self.consider_ois_sensitivities = consider;
        self
    }

    /// Sets the calculation currency.
    pub fn with_calculation_currency(mut self, currency: Currency) -> Self {
        self.calculation_currency = currency;
        self
    }

    /// Sets the MVA settings.
    pub fn with_mva(mut self, mva: MvaConfig) -> Self {
        self.mva = mva;
        self
    }
}

fn env_error(key: &str, value: impl std::fmt::Display) -> ConfigError {
    ConfigError::EnvError(format!("{}: {}", key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| env_error(key, format!("not a number: {}", value)))
}
