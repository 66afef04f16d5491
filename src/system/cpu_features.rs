//! # CPU Capability Probing
//!
//! Runtime detection of the instruction-set extensions the dispatcher selects
//! engine variants on. Detection reads the hardware directly (CPUID on
//! x86_64) instead of trusting compile-time target features or environment
//! variables, because the process may run on a different machine than the one
//! it was compiled on.
//!
//! A feature is only reported when it is usable: AVX2 additionally requires
//! the OS to have enabled YMM register state (`OSXSAVE` plus `XCR0` bits 1
//! and 2). On every other architecture the probe reports no specialized
//! extensions, which the portable baseline always satisfies.

use std::fmt;
use std::sync::OnceLock;

use bitflags::bitflags;
use serde::Serialize;

bitflags! {
    /// Instruction-set extensions a variant can require.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IsaExtensions: u8 {
        /// 128-bit SSE2 integer vectors
        const SSE2 = 1 << 0;
        /// 256-bit AVX2 integer vectors
        const AVX2 = 1 << 1;
    }
}

impl IsaExtensions {
    /// Human readable list such as `SSE2+AVX2`, or `none`.
    pub fn describe(&self) -> String {
        if self.is_empty() {
            return "none".to_string();
        }
        let mut names = Vec::new();
        if self.contains(IsaExtensions::SSE2) {
            names.push("SSE2");
        }
        if self.contains(IsaExtensions::AVX2) {
            names.push("AVX2");
        }
        names.join("+")
    }
}

impl fmt::Display for IsaExtensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// What the prober found on the host CPU.
///
/// Produced once per process and never mutated; the host CPU does not change
/// under a running process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityDescriptor {
    /// SSE2 is present and usable
    pub sse2: bool,
    /// AVX2 is present and the OS saves YMM state
    pub avx2: bool,
    /// CPU vendor id (`GenuineIntel`, `AuthenticAMD`, ...) or `unknown`
    pub vendor: String,
    /// Processor brand string, or the architecture name when unavailable
    pub brand: String,
}

impl CapabilityDescriptor {
    /// Descriptor asserting no specialized extensions.
    pub fn baseline_only() -> Self {
        Self {
            sse2: false,
            avx2: false,
            vendor: "unknown".to_string(),
            brand: std::env::consts::ARCH.to_string(),
        }
    }

    /// Synthetic descriptor with exactly the given extensions.
    ///
    /// Used to drive selection with a fixed capability set, for example when
    /// reproducing a dispatch decision seen on another machine.
    pub fn with_extensions(extensions: IsaExtensions) -> Self {
        Self {
            sse2: extensions.contains(IsaExtensions::SSE2),
            avx2: extensions.contains(IsaExtensions::AVX2),
            vendor: "synthetic".to_string(),
            brand: extensions.describe(),
        }
    }

    /// The supported extensions as a flag set.
    pub fn extensions(&self) -> IsaExtensions {
        let mut extensions = IsaExtensions::empty();
        extensions.set(IsaExtensions::SSE2, self.sse2);
        extensions.set(IsaExtensions::AVX2, self.avx2);
        extensions
    }

    /// Check whether every extension in `requirement` is supported.
    pub fn satisfies(&self, requirement: IsaExtensions) -> bool {
        self.extensions().contains(requirement)
    }

    /// Extensions from `requirement` this host lacks.
    pub fn missing(&self, requirement: IsaExtensions) -> IsaExtensions {
        requirement.difference(self.extensions())
    }
}

impl fmt::Display for CapabilityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [{}]", self.vendor, self.brand, self.extensions())
    }
}

/// Runtime CPU capability detection interface
pub struct RuntimeCpuFeatures;

impl RuntimeCpuFeatures {
    /// Create a new runtime feature detector
    pub fn new() -> Self {
        Self
    }

    /// Query the hardware. Never fails; anything inconclusive reads as absent.
    pub fn detect_features(&self) -> CapabilityDescriptor {
        let (vendor, brand) = self.get_cpu_info();
        let extensions = self.detect_extensions();

        CapabilityDescriptor {
            sse2: extensions.contains(IsaExtensions::SSE2),
            avx2: extensions.contains(IsaExtensions::AVX2),
            vendor,
            brand,
        }
    }

    /// Detect x86_64 extensions using cpuid
    #[cfg(target_arch = "x86_64")]
    fn detect_extensions(&self) -> IsaExtensions {
        let cpuid = raw_cpuid::CpuId::new();
        let mut extensions = IsaExtensions::empty();

        let (has_sse2, has_osxsave) = cpuid
            .get_feature_info()
            .map(|info| (info.has_sse2(), info.has_oxsave()))
            .unwrap_or((false, false));

        let has_avx2 = cpuid
            .get_extended_feature_info()
            .map(|info| info.has_avx2())
            .unwrap_or(false);

        extensions.set(IsaExtensions::SSE2, has_sse2);

        // CPUID only says the silicon has AVX2; the OS must also save YMM state.
        if has_avx2 && has_osxsave && os_saves_ymm_state() {
            extensions.insert(IsaExtensions::AVX2);
        }

        extensions
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn detect_extensions(&self) -> IsaExtensions {
        IsaExtensions::empty()
    }

    /// Get CPU vendor and brand information
    fn get_cpu_info(&self) -> (String, String) {
        #[cfg(target_arch = "x86_64")]
        {
            let cpuid = raw_cpuid::CpuId::new();
            let vendor = cpuid
                .get_vendor_info()
                .map(|v| v.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let brand = cpuid
                .get_processor_brand_string()
                .map(|b| b.as_str().trim().to_string())
                .filter(|b| !b.is_empty())
                .unwrap_or_else(|| std::env::consts::ARCH.to_string());
            (vendor, brand)
        }

        #[cfg(not(target_arch = "x86_64"))]
        {
            ("unknown".to_string(), std::env::consts::ARCH.to_string())
        }
    }
}

impl Default for RuntimeCpuFeatures {
    fn default() -> Self {
        Self::new()
    }
}

/// XCR0 bits 1 (SSE state) and 2 (AVX state) must both be enabled.
#[cfg(target_arch = "x86_64")]
fn os_saves_ymm_state() -> bool {
    const XCR0_SSE_AVX: u64 = 0b110;
    // SAFETY: callers only reach this after CPUID reported OSXSAVE, which
    // guarantees XGETBV is enabled.
    let xcr0 = unsafe { read_xcr0() };
    xcr0 & XCR0_SSE_AVX == XCR0_SSE_AVX
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "xsave")]
unsafe fn read_xcr0() -> u64 {
    // SAFETY: guaranteed by the caller (OSXSAVE set).
    unsafe { std::arch::x86_64::_xgetbv(0) }
}

// Global capability probe
static CPU_FEATURES: OnceLock<CapabilityDescriptor> = OnceLock::new();

/// Get the host capability descriptor (probed once on first call)
pub fn cpu_features() -> &'static CapabilityDescriptor {
    CPU_FEATURES.get_or_init(|| {
        let descriptor = RuntimeCpuFeatures::new().detect_features();
        log::debug!("Probed host CPU: {}", descriptor);
        descriptor
    })
}

/// Probe the host CPU.
///
/// Idempotent: every call returns the same descriptor.
pub fn probe() -> CapabilityDescriptor {
    cpu_features().clone()
}
