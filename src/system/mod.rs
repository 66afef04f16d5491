//! # System Integration
//!
//! Host introspection used by the dispatcher. Currently this is the CPU
//! capability prober: a one-shot, cached hardware query producing the
//! [`CapabilityDescriptor`] every dispatch decision is made from.

pub mod cpu_features;

pub use cpu_features::{cpu_features, probe, CapabilityDescriptor, IsaExtensions, RuntimeCpuFeatures};
