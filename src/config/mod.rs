//! Configuration APIs for archmux
//!
//! Dispatch can be narrowed or widened at process start without touching the
//! selection logic: configuration only ever flips registry tiers on or off.
//! It never asserts what the hardware supports; that always comes from the
//! probe.
//!
//! # Configuration Traits
//!
//! The [`Config`] trait provides common functionality for configuration types,
//! including validation, environment initialization, presets and JSON files.
//!
//! # Environment Initialization
//!
//! ```rust
//! use archmux::config::{Config, DispatchConfig};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Reads ARCHMUX_DISPATCH_ENABLE, ARCHMUX_DISPATCH_DISABLE,
//! // ARCHMUX_DISPATCH_MAX_TIER and ARCHMUX_DISPATCH_VERIFY
//! let config = DispatchConfig::from_env()?;
//!
//! // Same variables with a custom prefix
//! let config = DispatchConfig::from_env_with_prefix("MYAPP_")?;
//! # Ok(())
//! # }
//! ```

use crate::error::{ArchmuxError, Result};
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub mod dispatch;


pub use dispatch::DispatchConfig;

/// Common configuration trait providing validation, environment initialization,
/// and preset management functionality.
pub trait Config: Clone + fmt::Debug {
    /// Validate the configuration for correctness and consistency.
    fn validate(&self) -> Result<()>;

    /// Initialize configuration from environment variables.
    ///
    /// Environment variables use the format `ARCHMUX_{COMPONENT}_{FIELD}`.
    /// For example, `ARCHMUX_DISPATCH_MAX_TIER=sse2` caps dispatch at SSE2.
    fn from_env() -> Result<Self>
    where
        Self: Default,
    {
        Self::from_env_with_prefix("ARCHMUX_")
    }

    /// Initialize configuration from environment variables with a custom prefix.
    ///
    /// Unset variables keep their default. Set but malformed variables are an
    /// error rather than silently ignored.
    fn from_env_with_prefix(prefix: &str) -> Result<Self>
    where
        Self: Default;

    /// Preset favouring the fastest available code path.
    fn performance_preset() -> Self;

    /// Preset favouring the most widely tested code path.
    fn conservative_preset() -> Self;

    /// Preset suitable for most applications.
    fn balanced_preset() -> Self
    where
        Self: Default,
    {
        Self::default()
    }

    /// Save configuration to a JSON file.
    fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()>;

    /// Load and validate configuration from a JSON file.
    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self>;
}

/// Configuration validation error details.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field that failed validation
    pub field: String,
    /// The invalid value
    pub value: String,
    /// Description of why the value is invalid
    pub reason: String,
    /// Suggested valid values or ranges
    pub suggestion: Option<String>,
}

impl ValidationError {
    /// Create a new validation error.
    pub fn new(field: &str, value: &str, reason: &str) -> Self {
        Self {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
            suggestion: None,
        }
    }

    /// Add a suggestion for valid values.
    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.suggestion = Some(suggestion.to_string());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid configuration for field '{}': value '{}' is invalid ({})",
               self.field, self.value, self.reason)?;

        if let Some(ref suggestion) = self.suggestion {
            write!(f, ". Suggested values: {}", suggestion)?;
        }

        Ok(())
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for ArchmuxError {
    fn from(err: ValidationError) -> Self {
        ArchmuxError::configuration(err.to_string())
    }
}

/// Parse an environment variable, falling back to `default` when unset.
///
/// A value that is set but does not parse is a configuration error.
pub fn parse_env_var<T>(var_name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(var_name) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|e| {
            ArchmuxError::from(ValidationError::new(var_name, &raw, &e.to_string()))
        }),
        Err(_) => Ok(default),
    }
}

/// Parse a boolean environment variable, falling back to `default` when unset.
///
/// Accepts "true", "1", "yes", "on" and "false", "0", "no", "off"
/// (case-insensitive). Anything else is a configuration error.
pub fn parse_env_bool(var_name: &str, default: bool) -> Result<bool> {
    let raw = match env::var(var_name) {
        Ok(raw) => raw,
        Err(_) => return Ok(default),
    };

    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ValidationError::new(var_name, &raw, "not a boolean")
            .with_suggestion("true, false, 1, 0, yes, no, on, off")
            .into()),
    }
}

/// Parse a comma separated environment variable into a list.
///
/// Unset yields `None`. Empty items are skipped, so `""` is an empty list.
pub fn parse_env_list<T>(var_name: &str) -> Result<Option<Vec<T>>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = match env::var(var_name) {
        Ok(raw) => raw,
        Err(_) => return Ok(None),
    };

    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<T>().map_err(|e| {
                ArchmuxError::from(ValidationError::new(var_name, item, &e.to_string()))
            })
        })
        .collect::<Result<Vec<T>>>()
        .map(Some)
}
