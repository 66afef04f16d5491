//! # Dispatcher
//!
//! Walks the registry most specialized first and binds the first enabled tier
//! that the capability descriptor satisfies and that actually loads. The
//! outcome, success or the fatal error, is memoized for the dispatcher's
//! lifetime; concurrent first callers block on the same initialization and
//! all observe the same result.

use std::fmt;
use std::sync::OnceLock;

use serde::Serialize;

use super::registry::{Registry, Tier, VariantSpec};
use crate::config::{Config, DispatchConfig};
use crate::engine::{self_test, EngineRef};
use crate::error::{ArchmuxError, LoadFailure, Result};
use crate::system::{probe, CapabilityDescriptor};

/// The bound variant. Set once, never changes.
pub struct ActiveVariant {
    spec: VariantSpec,
    engine: EngineRef,
    descriptor: CapabilityDescriptor,
    skipped: Vec<LoadFailure>,
}

impl ActiveVariant {
    /// Registry entry that was bound.
    pub fn spec(&self) -> &VariantSpec {
        &self.spec
    }

    /// Selected tier.
    pub fn tier(&self) -> Tier {
        self.spec.tier
    }

    /// The bound engine.
    pub fn engine(&self) -> EngineRef {
        self.engine
    }

    /// Descriptor the selection was made against.
    pub fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    /// More specialized tiers that were eligible but failed to load.
    pub fn skipped(&self) -> &[LoadFailure] {
        &self.skipped
    }

    /// Serializable summary for diagnostics.
    pub fn report(&self) -> VariantReport {
        VariantReport {
            tier: self.spec.tier,
            build_id: self.spec.build_id().to_string(),
            descriptor: self.descriptor.clone(),
            skipped: self.skipped.clone(),
        }
    }
}

impl fmt::Debug for ActiveVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveVariant")
            .field("spec", &self.spec)
            .field("descriptor", &self.descriptor)
            .field("skipped", &self.skipped)
            .finish_non_exhaustive()
    }
}

/// Which variant is serving the engine surface, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantReport {
    /// Selected tier
    pub tier: Tier,
    /// Build id of the bound artifact
    pub build_id: String,
    /// Capabilities the selection was made against
    pub descriptor: CapabilityDescriptor,
    /// Eligible tiers that failed to load, most specialized first
    pub skipped: Vec<LoadFailure>,
}

impl fmt::Display for VariantReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) on {}", self.tier, self.build_id, self.descriptor)?;
        if !self.skipped.is_empty() {
            write!(f, ", skipped {}", self.skipped.len())?;
        }
        Ok(())
    }
}

/// Selects, loads and holds the active engine variant.
pub struct Dispatcher {
    registry: Registry,
    verify_on_load: bool,
    descriptor: Option<CapabilityDescriptor>,
    active: OnceLock<Result<ActiveVariant>>,
}

impl Dispatcher {
    /// Dispatcher over `registry` that probes the host and verifies on load.
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            verify_on_load: true,
            descriptor: None,
            active: OnceLock::new(),
        }
    }

    /// Dispatcher over the builtin registry reconfigured by `config`.
    pub fn from_config(config: &DispatchConfig) -> Result<Self> {
        let registry = Registry::builtin().apply(config)?;
        Ok(Self::new(registry).with_verify_on_load(config.verify_on_load))
    }

    /// Select against a fixed descriptor instead of probing the host.
    ///
    /// Builtin artifacts still refuse to load on a host that cannot run them.
    pub fn with_descriptor(mut self, descriptor: CapabilityDescriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    /// Toggle the known-answer check of loaded variants.
    pub fn with_verify_on_load(mut self, verify: bool) -> Self {
        self.verify_on_load = verify;
        self
    }

    /// The process-wide dispatcher behind [`crate::engine()`].
    ///
    /// Built from the builtin registry and [`DispatchConfig::from_env`]. An
    /// invalid environment configuration is logged and ignored.
    pub fn global() -> &'static Dispatcher {
        static GLOBAL_DISPATCHER: OnceLock<Dispatcher> = OnceLock::new();

        GLOBAL_DISPATCHER.get_or_init(|| {
            let config = DispatchConfig::from_env().unwrap_or_else(|e| {
                log::warn!("Ignoring dispatch configuration from environment: {}", e);
                DispatchConfig::default()
            });
            Dispatcher::from_config(&config).unwrap_or_else(|e| {
                log::warn!("Ignoring dispatch configuration {:?}: {}", config, e);
                Dispatcher::new(Registry::builtin())
            })
        })
    }

    /// The registry this dispatcher walks.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The descriptor selection runs against: the fixed one, or the host probe.
    pub fn descriptor(&self) -> CapabilityDescriptor {
        self.descriptor.clone().unwrap_or_else(probe)
    }

    /// Pure selection: the first enabled tier `descriptor` satisfies.
    ///
    /// Does not load anything. With a valid registry this always returns
    /// at least the baseline.
    pub fn select(&self, descriptor: &CapabilityDescriptor) -> Option<&VariantSpec> {
        self.registry
            .candidates()
            .iter()
            .find(|spec| spec.enabled && descriptor.satisfies(spec.requires))
    }

    /// Select and bind a variant, once.
    ///
    /// Later calls return the memoized outcome. The only error is
    /// [`ArchmuxError::NoLoadableVariant`].
    pub fn select_and_load(&self) -> Result<&ActiveVariant> {
        self.active
            .get_or_init(|| self.bind())
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Shortcut for the bound engine.
    pub fn engine(&self) -> Result<EngineRef> {
        self.select_and_load().map(ActiveVariant::engine)
    }

    /// Shortcut for the diagnostics report.
    pub fn report(&self) -> Result<VariantReport> {
        self.select_and_load().map(ActiveVariant::report)
    }

    /// True once selection has run.
    pub fn is_initialized(&self) -> bool {
        self.active.get().is_some()
    }

    fn bind(&self) -> Result<ActiveVariant> {
        let descriptor = self.descriptor();
        let mut skipped = Vec::new();

        for spec in self.registry.candidates() {
            if !spec.enabled {
                log::debug!("Tier {} is disabled", spec.tier);
                continue;
            }
            if !descriptor.satisfies(spec.requires) {
                log::debug!("Tier {} needs {}", spec.tier, descriptor.missing(spec.requires));
                continue;
            }

            match self.load(spec) {
                Ok(engine) => {
                    log::debug!(
                        "Selected tier {} ({}) on {}",
                        spec.tier,
                        spec.build_id(),
                        descriptor
                    );
                    return Ok(ActiveVariant {
                        spec: *spec,
                        engine,
                        descriptor,
                        skipped,
                    });
                }
                Err(e) => {
                    log::warn!("Tier {} ({}) failed to load, falling back: {}", spec.tier, spec.build_id(), e);
                    skipped.push(LoadFailure {
                        tier: spec.tier.to_string(),
                        build_id: spec.build_id().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let err = ArchmuxError::no_loadable_variant(skipped);
        log::error!("{}; the engine surface is unavailable", err);
        Err(err)
    }

    fn load(&self, spec: &VariantSpec) -> Result<EngineRef> {
        let engine = spec.artifact.load()?;
        if self.verify_on_load {
            self_test(engine).map_err(|reason| ArchmuxError::artifact_corrupt(spec.build_id(), reason))?;
        }
        Ok(engine)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("verify_on_load", &self.verify_on_load)
            .field("descriptor", &self.descriptor)
            .field("active", &self.active.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::registry::Artifact;
    use crate::engine::{portable, Engine};
    use crate::system::IsaExtensions;

    struct Missing(&'static str);

    impl Artifact for Missing {
        fn build_id(&self) -> &'static str {
            self.0
        }
        fn load(&self) -> Result<EngineRef> {
            Err(ArchmuxError::artifact_missing(self.0))
        }
    }

    struct Portable(&'static str);

    impl Artifact for Portable {
        fn build_id(&self) -> &'static str {
            self.0
        }
        fn load(&self) -> Result<EngineRef> {
            Ok(portable())
        }
    }

    struct Broken;

    impl Engine for Broken {
        fn xor_into(&self, dst: &mut [u64], src: &[u64]) {
            portable().and_into(dst, src)
        }
        fn and_into(&self, dst: &mut [u64], src: &[u64]) {
            portable().and_into(dst, src)
        }
        fn or_into(&self, dst: &mut [u64], src: &[u64]) {
            portable().or_into(dst, src)
        }
        fn popcount(&self, words: &[u64]) -> u64 {
            portable().popcount(words)
        }
        fn is_zero(&self, words: &[u64]) -> bool {
            portable().is_zero(words)
        }
        fn pauli_mul_log_i(&self, a: &mut [u64], b: &mut [u64], c: &[u64], d: &[u64]) -> u8 {
            portable().pauli_mul_log_i(a, b, c, d)
        }
        fn commutes(&self, a: &[u64], b: &[u64], c: &[u64], d: &[u64]) -> bool {
            portable().commutes(a, b, c, d)
        }
    }

    static BROKEN: Broken = Broken;

    struct Corrupt;

    impl Artifact for Corrupt {
        fn build_id(&self) -> &'static str {
            "corrupt"
        }
        fn load(&self) -> Result<EngineRef> {
            Ok(&BROKEN)
        }
    }

    static MISSING_HIGH: Missing = Missing("missing_high");
    static MISSING_BASE: Missing = Missing("missing_base");
    static MID: Portable = Portable("mid");
    static BASE: Portable = Portable("base");
    static CORRUPT: Corrupt = Corrupt;

    fn all_extensions() -> CapabilityDescriptor {
        CapabilityDescriptor::with_extensions(IsaExtensions::all())
    }

    #[test]
    fn test_missing_tier_falls_back_and_is_recorded() {
        let registry = Registry::new(vec![
            VariantSpec::new(Tier::Avx2, IsaExtensions::AVX2, &MISSING_HIGH),
            VariantSpec::new(Tier::Sse2, IsaExtensions::SSE2, &MID),
            VariantSpec::new(Tier::Baseline, IsaExtensions::empty(), &BASE),
        ])
        .unwrap();
        let dispatcher = Dispatcher::new(registry).with_descriptor(all_extensions());

        let active = dispatcher.select_and_load().unwrap();
        assert_eq!(active.tier(), Tier::Sse2);
        assert_eq!(active.skipped().len(), 1);
        assert_eq!(active.skipped()[0].build_id, "missing_high");
        assert_eq!(dispatcher.select(&all_extensions()).unwrap().tier, Tier::Avx2);
    }

    #[test]
    fn test_corrupt_variant_rejected_only_when_verifying() {
        let registry = Registry::new(vec![
            VariantSpec::new(Tier::Sse2, IsaExtensions::SSE2, &CORRUPT),
            VariantSpec::new(Tier::Baseline, IsaExtensions::empty(), &BASE),
        ])
        .unwrap();

        let verified = Dispatcher::new(registry.clone()).with_descriptor(all_extensions());
        let active = verified.select_and_load().unwrap();
        assert_eq!(active.tier(), Tier::Baseline);
        assert!(active.skipped()[0].reason.contains("corrupt"), "{:?}", active.skipped());

        let unverified = Dispatcher::new(registry)
            .with_descriptor(all_extensions())
            .with_verify_on_load(false);
        assert_eq!(unverified.select_and_load().unwrap().tier(), Tier::Sse2);
    }

    #[test]
    fn test_fatal_when_nothing_loads() {
        let registry = Registry::new(vec![
            VariantSpec::new(Tier::Avx2, IsaExtensions::AVX2, &MISSING_HIGH),
            VariantSpec::new(Tier::Baseline, IsaExtensions::empty(), &MISSING_BASE),
        ])
        .unwrap();
        let dispatcher = Dispatcher::new(registry).with_descriptor(all_extensions());

        let err = dispatcher.select_and_load().unwrap_err();
        assert_eq!(err.category(), "fatal_dispatch");
        match &err {
            ArchmuxError::NoLoadableVariant { failures } => {
                let ids: Vec<&str> = failures.iter().map(|f| f.build_id.as_str()).collect();
                assert_eq!(ids, vec!["missing_high", "missing_base"]);
            }
            other => panic!("unexpected error {:?}", other),
        }
        // memoized: same error, no second attempt
        assert_eq!(dispatcher.engine().err(), Some(err));
        assert!(dispatcher.is_initialized());
    }

    #[test]
    fn test_disabled_tier_never_selected() {
        let registry = Registry::new(vec![
            VariantSpec::new(Tier::Sse2, IsaExtensions::SSE2, &MID).disabled(),
            VariantSpec::new(Tier::Baseline, IsaExtensions::empty(), &BASE),
        ])
        .unwrap();
        let dispatcher = Dispatcher::new(registry).with_descriptor(all_extensions());
        assert_eq!(dispatcher.select(&all_extensions()).unwrap().tier, Tier::Baseline);
        let active = dispatcher.select_and_load().unwrap();
        assert_eq!(active.tier(), Tier::Baseline);
        assert!(active.skipped().is_empty());
    }

    #[test]
    fn test_builtin_selection_against_fixed_descriptors() {
        let dispatcher = Dispatcher::new(Registry::builtin());

        let none = CapabilityDescriptor::baseline_only();
        assert_eq!(dispatcher.select(&none).unwrap().tier, Tier::Baseline);

        // AVX2 ships disabled, so a full-featured CPU still lands on SSE2
        assert_eq!(dispatcher.select(&all_extensions()).unwrap().tier, Tier::Sse2);

        let sse2 = CapabilityDescriptor::with_extensions(IsaExtensions::SSE2);
        assert_eq!(dispatcher.select(&sse2).unwrap().tier, Tier::Sse2);
    }

    #[test]
    fn test_report_is_serializable() {
        let dispatcher = Dispatcher::new(Registry::builtin())
            .with_descriptor(CapabilityDescriptor::baseline_only());
        let report = dispatcher.report().unwrap();
        assert_eq!(report.tier, Tier::Baseline);
        assert_eq!(report.build_id, "archmux_polyfill");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["tier"], "baseline");
        assert_eq!(json["build_id"], "archmux_polyfill");
        assert!(json["skipped"].as_array().unwrap().is_empty());
        assert!(report.to_string().starts_with("baseline (archmux_polyfill)"));
    }

    #[test]
    fn test_from_config_caps_tier() {
        let dispatcher = Dispatcher::from_config(&DispatchConfig::conservative_preset()).unwrap();
        assert_eq!(dispatcher.select(&all_extensions()).unwrap().tier, Tier::Baseline);
        assert_eq!(dispatcher.select_and_load().unwrap().tier(), Tier::Baseline);
    }
}
