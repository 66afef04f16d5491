//! # Variant Dispatch
//!
//! Picks, once per process, which compiled engine variant serves the public
//! engine surface:
//!
//! 1. The prober reports what the host CPU can run ([`crate::system::probe`]).
//! 2. The [`Registry`] lists the tiers, most specialized first.
//! 3. The [`Dispatcher`] binds the first enabled, satisfied tier that loads,
//!    falling through on recoverable load failures.
//!
//! The baseline tier needs nothing and is always present, so dispatch only
//! fails outright when even the baseline cannot load.

pub mod dispatcher;
pub mod registry;

pub use dispatcher::{ActiveVariant, Dispatcher, VariantReport};
pub use registry::{Artifact, BuiltinArtifact, Registry, Tier, VariantSpec, BUILTIN_VARIANTS};
