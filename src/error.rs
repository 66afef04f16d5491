//! Error handling for the archmux library
//!
//! This module provides the error type shared by the prober, the variant
//! registry, the dispatcher and the engine surface. Only
//! [`ArchmuxError::NoLoadableVariant`] ever crosses the dispatch boundary; the
//! artifact errors are absorbed by the dispatcher and kept for diagnostics.

use serde::Serialize;
use thiserror::Error;

/// One recoverable artifact load failure recorded during dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadFailure {
    /// Tier name of the variant that failed to load
    pub tier: String,
    /// Build id of the artifact that failed to load
    pub build_id: String,
    /// Human readable reason
    pub reason: String,
}

impl std::fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.tier, self.build_id, self.reason)
    }
}

/// Main error type for the archmux library
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArchmuxError {
    /// The artifact was not compiled into this build
    #[error("Artifact missing: {build_id} was not built for this target")]
    ArtifactMissing {
        /// Build id of the missing artifact
        build_id: String,
    },

    /// The host CPU cannot execute the artifact's instructions
    #[error("Artifact unsupported: {build_id} requires {required}")]
    ArtifactUnsupported {
        /// Build id of the rejected artifact
        build_id: String,
        /// Extensions the host lacks
        required: String,
    },

    /// The artifact loaded but disagreed with the baseline on the self test
    #[error("Artifact corrupt: {build_id}: {reason}")]
    ArtifactCorrupt {
        /// Build id of the corrupt artifact
        build_id: String,
        /// Which check failed
        reason: String,
    },

    /// No tier, including the baseline, could be loaded
    #[error("No loadable engine variant ({} tier(s) failed)", failures.len())]
    NoLoadableVariant {
        /// Every failure seen while walking the registry, most specialized first
        failures: Vec<LoadFailure>,
    },

    /// A variant registry violates its ordering or baseline rules
    #[error("Invalid registry: {message}")]
    InvalidRegistry {
        /// Description of the violated rule
        message: String,
    },

    /// Configuration or parameter errors
    #[error("Invalid configuration: {message}")]
    Configuration {
        /// Configuration error message
        message: String,
    },

    /// Malformed input to an engine-level operation
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of the problem
        message: String,
    },
}

impl ArchmuxError {
    /// Create an artifact missing error
    pub fn artifact_missing<S: Into<String>>(build_id: S) -> Self {
        Self::ArtifactMissing { build_id: build_id.into() }
    }

    /// Create an artifact unsupported error
    pub fn artifact_unsupported<S: Into<String>, R: Into<String>>(build_id: S, required: R) -> Self {
        Self::ArtifactUnsupported {
            build_id: build_id.into(),
            required: required.into(),
        }
    }

    /// Create an artifact corrupt error
    pub fn artifact_corrupt<S: Into<String>, R: Into<String>>(build_id: S, reason: R) -> Self {
        Self::ArtifactCorrupt {
            build_id: build_id.into(),
            reason: reason.into(),
        }
    }

    /// Create the fatal dispatch error
    pub fn no_loadable_variant(failures: Vec<LoadFailure>) -> Self {
        Self::NoLoadableVariant { failures }
    }

    /// Create an invalid registry error
    pub fn invalid_registry<S: Into<String>>(message: S) -> Self {
        Self::InvalidRegistry { message: message.into() }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput { message: message.into() }
    }

    /// Check if this is a recoverable error
    ///
    /// Recoverable errors are the per-artifact load failures the dispatcher
    /// falls through on.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::ArtifactMissing { .. } => true,
            Self::ArtifactUnsupported { .. } => true,
            Self::ArtifactCorrupt { .. } => true,
            Self::NoLoadableVariant { .. } => false,
            Self::InvalidRegistry { .. } => false,
            Self::Configuration { .. } => false,
            Self::InvalidInput { .. } => false,
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::ArtifactMissing { .. } => "artifact_missing",
            Self::ArtifactUnsupported { .. } => "artifact_unsupported",
            Self::ArtifactCorrupt { .. } => "artifact_corrupt",
            Self::NoLoadableVariant { .. } => "fatal_dispatch",
            Self::InvalidRegistry { .. } => "registry",
            Self::Configuration { .. } => "config",
            Self::InvalidInput { .. } => "input",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ArchmuxError>;
