//! # Archmux: Runtime CPU Dispatch for Bit-Packed Kernels
//!
//! The crate ships several builds of the same engine, each compiled for a
//! different instruction-set tier, and decides once per process which one to
//! use based on what the CPU it is actually running on supports.
//!
//! ## Key Features
//!
//! - **Capability Probing**: CPUID-based detection that also checks the OS has
//!   enabled the register state a feature needs
//! - **Ordered Tiers**: AVX2, SSE2 and a portable baseline that runs anywhere
//! - **Safe Fallback**: a tier that fails to load is skipped, never fatal,
//!   as long as the baseline loads
//! - **Bit-for-Bit Equivalence**: every loaded variant can be checked
//!   against the baseline before it is bound
//! - **One Stable Entry Point**: callers see a single [`Engine`] whatever tier
//!   is serving it
//!
//! ## Quick Start
//!
//! ```rust
//! use archmux::PauliString;
//!
//! # fn main() -> archmux::Result<()> {
//! archmux::init()?;
//!
//! let engine = archmux::engine()?;
//! assert_eq!(engine.popcount(&[0b1011, u64::MAX]), 67);
//!
//! let mut p: PauliString = "XX".parse()?;
//! p.mul_assign_checked(&"ZZ".parse::<PauliString>()?)?;
//! assert_eq!(p.to_string(), "-YY");
//!
//! let report = archmux::active_variant()?;
//! println!("Serving {} ({})", report.tier, report.build_id);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! Dispatch reads `ARCHMUX_DISPATCH_ENABLE`, `ARCHMUX_DISPATCH_DISABLE`,
//! `ARCHMUX_DISPATCH_MAX_TIER` and `ARCHMUX_DISPATCH_VERIFY` once, on first
//! use. See [`config::DispatchConfig`].

#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod system;

// Re-export core types
pub use config::{Config, DispatchConfig};
pub use dispatch::{ActiveVariant, Dispatcher, Registry, Tier, VariantReport, VariantSpec};
pub use engine::{Engine, EngineRef, PauliString};
pub use error::{ArchmuxError, LoadFailure, Result};
pub use system::{cpu_features, probe, CapabilityDescriptor, IsaExtensions};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Target the crate was built for, as `<arch>-<os>`.
pub const BUILD_TARGET: &str = env!("ARCHMUX_BUILD_TARGET");

/// Run capability probing and variant selection now instead of on first use.
///
/// Idempotent. Returns the fatal dispatch error if no variant can be loaded.
pub fn init() -> Result<()> {
    log::debug!("Initializing archmux v{} ({})", VERSION, BUILD_TARGET);
    Dispatcher::global().select_and_load().map(|_| ())
}

/// The engine for this process.
///
/// Selection happens on the first call; every later call returns the same
/// engine with no further synchronization cost beyond an initialized check.
pub fn engine() -> Result<EngineRef> {
    Dispatcher::global().engine()
}

/// Which variant [`engine`] is bound to. Diagnostics only.
pub fn active_variant() -> Result<VariantReport> {
    Dispatcher::global().report()
}
