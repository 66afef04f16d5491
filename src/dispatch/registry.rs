//! # Variant Registry
//!
//! The fixed, ordered list of engine tiers, most specialized first. Each entry
//! names the instruction-set extensions the tier needs and the artifact that
//! implements the full engine under that requirement.
//!
//! The builtin table is checked at compile time: ranks strictly descend and
//! the table ends with an enabled baseline whose requirement is empty.
//! Custom registries go through the same check in [`Registry::new`].

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::DispatchConfig;
use crate::engine::{portable, EngineRef};
use crate::error::{ArchmuxError, Result};
use crate::system::{cpu_features, IsaExtensions};

/// Engine tier, ordered by specialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Portable 64-bit baseline; runs on every CPU
    #[serde(alias = "polyfill", alias = "portable", alias = "scalar")]
    Baseline = 0,
    /// 128-bit SSE2 kernels
    Sse2 = 1,
    /// 256-bit AVX2 kernels
    Avx2 = 2,
}

impl Tier {
    /// Every tier, most specialized first.
    pub const ALL: [Tier; 3] = [Tier::Avx2, Tier::Sse2, Tier::Baseline];

    /// Position in the total order. Higher is more specialized.
    pub const fn rank(self) -> u8 {
        self as u8
    }

    /// Lowercase name, as accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Tier::Baseline => "baseline",
            Tier::Sse2 => "sse2",
            Tier::Avx2 => "avx2",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tier {
    type Err = ArchmuxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "baseline" | "polyfill" | "portable" | "scalar" => Ok(Tier::Baseline),
            "sse2" => Ok(Tier::Sse2),
            "avx2" => Ok(Tier::Avx2),
            other => Err(ArchmuxError::configuration(format!(
                "Unknown tier '{}' (expected baseline, sse2 or avx2)",
                other
            ))),
        }
    }
}

/// A loadable implementation of the engine.
///
/// `load` is called at most once per dispatcher, and only for a tier whose
/// requirement the capability descriptor satisfies.
pub trait Artifact: Send + Sync {
    /// Identifier the artifact was built under, e.g. `archmux_sse2`.
    fn build_id(&self) -> &'static str;

    /// Bind the artifact's engine.
    ///
    /// Recoverable failures are [`ArchmuxError::ArtifactMissing`],
    /// [`ArchmuxError::ArtifactUnsupported`] and
    /// [`ArchmuxError::ArtifactCorrupt`].
    fn load(&self) -> Result<EngineRef>;
}

/// Artifact compiled into this crate.
///
/// Before handing out its engine it re-checks the real host CPU, so a
/// synthetic capability descriptor can never bind kernels the machine
/// cannot execute.
pub struct BuiltinArtifact {
    build_id: &'static str,
    requires: IsaExtensions,
    resolve: unsafe fn() -> Option<EngineRef>,
}

impl Artifact for BuiltinArtifact {
    fn build_id(&self) -> &'static str {
        self.build_id
    }

    fn load(&self) -> Result<EngineRef> {
        let host = cpu_features();
        if !host.satisfies(self.requires) {
            return Err(ArchmuxError::artifact_unsupported(
                self.build_id,
                host.missing(self.requires).describe(),
            ));
        }
        // SAFETY: the host supports every extension the artifact was compiled for.
        unsafe { (self.resolve)() }.ok_or_else(|| ArchmuxError::artifact_missing(self.build_id))
    }
}

unsafe fn resolve_polyfill() -> Option<EngineRef> {
    Some(portable())
}

#[cfg(all(target_arch = "x86_64", archmux_artifact_sse2))]
unsafe fn resolve_sse2() -> Option<EngineRef> {
    // SAFETY: forwarded from the caller.
    Some(unsafe { crate::engine::sse2::engine() })
}

#[cfg(not(all(target_arch = "x86_64", archmux_artifact_sse2)))]
unsafe fn resolve_sse2() -> Option<EngineRef> {
    None
}

#[cfg(all(target_arch = "x86_64", archmux_artifact_avx2))]
unsafe fn resolve_avx2() -> Option<EngineRef> {
    // SAFETY: forwarded from the caller.
    Some(unsafe { crate::engine::avx2::engine() })
}

#[cfg(not(all(target_arch = "x86_64", archmux_artifact_avx2)))]
unsafe fn resolve_avx2() -> Option<EngineRef> {
    None
}

const POLYFILL_ARTIFACT: BuiltinArtifact = BuiltinArtifact {
    build_id: "archmux_polyfill",
    requires: IsaExtensions::empty(),
    resolve: resolve_polyfill,
};

const SSE2_ARTIFACT: BuiltinArtifact = BuiltinArtifact {
    build_id: "archmux_sse2",
    requires: IsaExtensions::SSE2,
    resolve: resolve_sse2,
};

const AVX2_ARTIFACT: BuiltinArtifact = BuiltinArtifact {
    build_id: "archmux_avx2",
    requires: IsaExtensions::SSE2.union(IsaExtensions::AVX2),
    resolve: resolve_avx2,
};

/// One registry entry.
#[derive(Clone, Copy)]
pub struct VariantSpec {
    /// Tier this entry implements
    pub tier: Tier,
    /// Extensions the host must report for the tier to be considered
    pub requires: IsaExtensions,
    /// Disabled tiers are never selected, whatever the hardware supports
    pub enabled: bool,
    /// The implementation
    pub artifact: &'static dyn Artifact,
}

impl VariantSpec {
    /// An enabled entry.
    pub const fn new(tier: Tier, requires: IsaExtensions, artifact: &'static dyn Artifact) -> Self {
        Self {
            tier,
            requires,
            enabled: true,
            artifact,
        }
    }

    /// The same entry, disabled.
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Build id of the entry's artifact.
    pub fn build_id(&self) -> &'static str {
        self.artifact.build_id()
    }
}

impl fmt::Debug for VariantSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantSpec")
            .field("tier", &self.tier)
            .field("requires", &self.requires)
            .field("enabled", &self.enabled)
            .field("build_id", &self.build_id())
            .finish()
    }
}

/// The builtin tiers.
///
/// AVX2 ships disabled until its kernels are cleared for production use;
/// enable it with `ARCHMUX_DISPATCH_ENABLE=avx2`.
pub const BUILTIN_VARIANTS: &[VariantSpec] = &[
    VariantSpec::new(Tier::Avx2, AVX2_ARTIFACT.requires, &AVX2_ARTIFACT).disabled(),
    VariantSpec::new(Tier::Sse2, SSE2_ARTIFACT.requires, &SSE2_ARTIFACT),
    VariantSpec::new(Tier::Baseline, POLYFILL_ARTIFACT.requires, &POLYFILL_ARTIFACT),
];

const _: () = assert!(
    registry_violation(BUILTIN_VARIANTS).is_none(),
    "builtin variant registry must strictly descend and end with an enabled baseline"
);

/// First ordering or baseline rule `specs` breaks, if any.
const fn registry_violation(specs: &[VariantSpec]) -> Option<&'static str> {
    if specs.is_empty() {
        return Some("registry has no tiers");
    }
    let mut i = 1;
    while i < specs.len() {
        if specs[i - 1].tier.rank() <= specs[i].tier.rank() {
            return Some("tier ranks must strictly descend");
        }
        i += 1;
    }
    let last = &specs[specs.len() - 1];
    if !matches!(last.tier, Tier::Baseline) {
        return Some("the baseline tier must be present and last");
    }
    if !last.enabled {
        return Some("the baseline tier cannot be disabled");
    }
    if !last.requires.is_empty() {
        return Some("the baseline tier must not require any extension");
    }
    None
}

/// Ordered set of variants the dispatcher walks.
#[derive(Debug, Clone)]
pub struct Registry {
    variants: Cow<'static, [VariantSpec]>,
}

impl Registry {
    /// The builtin registry.
    pub fn builtin() -> Self {
        Self {
            variants: Cow::Borrowed(BUILTIN_VARIANTS),
        }
    }

    /// A custom registry, checked against the same rules as the builtin one.
    pub fn new(variants: Vec<VariantSpec>) -> Result<Self> {
        if let Some(rule) = registry_violation(&variants) {
            return Err(ArchmuxError::invalid_registry(rule));
        }
        Ok(Self {
            variants: Cow::Owned(variants),
        })
    }

    /// Entries, most specialized first.
    pub fn candidates(&self) -> &[VariantSpec] {
        &self.variants
    }

    /// Entry for `tier`.
    pub fn get(&self, tier: Tier) -> Option<&VariantSpec> {
        self.variants.iter().find(|spec| spec.tier == tier)
    }

    /// Copy of the registry with the enable/disable flags from `config`.
    ///
    /// Disabling wins over enabling; `max_tier` disables every tier above it.
    /// The baseline can never be disabled.
    pub fn apply(&self, config: &DispatchConfig) -> Result<Registry> {
        use crate::config::Config;
        config.validate()?;

        let variants = self
            .variants
            .iter()
            .map(|spec| {
                let mut spec = *spec;
                if config.enable_tiers.contains(&spec.tier) {
                    spec.enabled = true;
                }
                if config.disable_tiers.contains(&spec.tier) {
                    spec.enabled = false;
                }
                if config.max_tier.is_some_and(|max| spec.tier > max) {
                    spec.enabled = false;
                }
                spec
            })
            .collect();

        Registry::new(variants)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl Artifact for Named {
        fn build_id(&self) -> &'static str {
            self.0
        }
        fn load(&self) -> Result<EngineRef> {
            Ok(portable())
        }
    }

    static A: Named = Named("a");
    static B: Named = Named("b");

    #[test]
    fn test_builtin_order() {
        let registry = Registry::builtin();
        let tiers: Vec<Tier> = registry.candidates().iter().map(|s| s.tier).collect();
        assert_eq!(tiers, Tier::ALL.to_vec());
        assert_eq!(registry.get(Tier::Baseline).unwrap().build_id(), "archmux_polyfill");
        assert_eq!(registry.get(Tier::Sse2).unwrap().build_id(), "archmux_sse2");
        assert_eq!(registry.get(Tier::Avx2).unwrap().build_id(), "archmux_avx2");
    }

    #[test]
    fn test_builtin_avx2_ships_disabled() {
        let registry = Registry::builtin();
        assert!(!registry.get(Tier::Avx2).unwrap().enabled);
        assert!(registry.get(Tier::Sse2).unwrap().enabled);
        assert!(registry.get(Tier::Baseline).unwrap().enabled);
        assert_eq!(
            registry.get(Tier::Avx2).unwrap().requires,
            IsaExtensions::SSE2 | IsaExtensions::AVX2
        );
    }

    #[test]
    fn test_new_rejects_rank_ties() {
        let err = Registry::new(vec![
            VariantSpec::new(Tier::Sse2, IsaExtensions::SSE2, &A),
            VariantSpec::new(Tier::Sse2, IsaExtensions::SSE2, &B),
            VariantSpec::new(Tier::Baseline, IsaExtensions::empty(), &A),
        ])
        .unwrap_err();
        assert_eq!(err.category(), "registry");
        assert!(err.to_string().contains("strictly descend"));
    }

    #[test]
    fn test_new_rejects_missing_or_disabled_baseline() {
        assert!(Registry::new(vec![]).is_err());
        assert!(Registry::new(vec![VariantSpec::new(Tier::Sse2, IsaExtensions::SSE2, &A)]).is_err());
        assert!(Registry::new(vec![
            VariantSpec::new(Tier::Baseline, IsaExtensions::empty(), &A).disabled()
        ])
        .is_err());
        assert!(Registry::new(vec![VariantSpec::new(Tier::Baseline, IsaExtensions::SSE2, &A)]).is_err());
        assert!(Registry::new(vec![VariantSpec::new(Tier::Baseline, IsaExtensions::empty(), &A)]).is_ok());
    }

    #[test]
    fn test_apply_enable_disable_and_max_tier() {
        let base = Registry::builtin();

        let config = DispatchConfig {
            enable_tiers: vec![Tier::Avx2],
            ..DispatchConfig::default()
        };
        assert!(base.apply(&config).unwrap().get(Tier::Avx2).unwrap().enabled);

        let config = DispatchConfig {
            disable_tiers: vec![Tier::Sse2],
            ..DispatchConfig::default()
        };
        assert!(!base.apply(&config).unwrap().get(Tier::Sse2).unwrap().enabled);

        let config = DispatchConfig {
            enable_tiers: vec![Tier::Avx2],
            max_tier: Some(Tier::Baseline),
            ..DispatchConfig::default()
        };
        let limited = base.apply(&config).unwrap();
        assert!(limited.candidates().iter().filter(|s| s.enabled).all(|s| s.tier == Tier::Baseline));

        // apply never mutates the source
        assert!(base.get(Tier::Sse2).unwrap().enabled);
    }

    #[test]
    fn test_apply_refuses_to_disable_baseline() {
        let config = DispatchConfig {
            disable_tiers: vec![Tier::Baseline],
            ..DispatchConfig::default()
        };
        assert!(Registry::builtin().apply(&config).is_err());
    }

    #[test]
    fn test_tier_parse_and_serde() {
        assert_eq!("AVX2".parse::<Tier>().unwrap(), Tier::Avx2);
        assert_eq!(" polyfill ".parse::<Tier>().unwrap(), Tier::Baseline);
        assert!("neon".parse::<Tier>().is_err());
        assert_eq!(serde_json::to_string(&Tier::Sse2).unwrap(), "\"sse2\"");
        assert_eq!(serde_json::from_str::<Tier>("\"portable\"").unwrap(), Tier::Baseline);
        assert!(Tier::Avx2 > Tier::Sse2 && Tier::Sse2 > Tier::Baseline);
    }

    #[test]
    fn test_builtin_baseline_always_loads() {
        let engine = Registry::builtin().get(Tier::Baseline).unwrap().artifact.load().unwrap();
        assert_eq!(engine.popcount(&[0b1011]), 3);
    }
}
