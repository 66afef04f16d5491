//! # Engine Surface
//!
//! The computational contract every variant implements. Variants differ only
//! in the vector width of their inner loops:
//!
//! | Variant  | Build id           | Word width | Requires     |
//! |----------|--------------------|------------|--------------|
//! | Baseline | `archmux_polyfill` | 64-bit     | nothing      |
//! | SSE2     | `archmux_sse2`     | 128-bit    | SSE2         |
//! | AVX2     | `archmux_avx2`     | 256-bit    | SSE2 + AVX2  |
//!
//! All kernels are bitwise, so every variant must agree with the baseline bit
//! for bit. [`self_test`] checks exactly that on a fixed workload.
//!
//! The [`Engine`] trait exposes nothing about which variant implements it.
//! Use [`crate::active_variant`] for diagnostics.

pub mod pauli;
pub mod portable;

#[cfg(all(target_arch = "x86_64", archmux_artifact_sse2))]
pub(crate) mod sse2;

#[cfg(all(target_arch = "x86_64", archmux_artifact_avx2))]
pub(crate) mod avx2;

pub use pauli::PauliString;
pub use portable::{portable, PortableEngine};

/// Bit-packed kernels shared by every engine variant.
///
/// Bit `i` of a bit vector lives in word `i / 64`, bit `i % 64`. A Pauli
/// string over `n` qubits is a pair of bit vectors `(xs, zs)` where the pair
/// of bits at a qubit encodes `I=(0,0)`, `X=(1,0)`, `Z=(0,1)`, `Y=(1,1)`.
///
/// # Panics
///
/// Every kernel panics if the slices it is given differ in length.
pub trait Engine: Send + Sync {
    /// `dst ^= src`
    fn xor_into(&self, dst: &mut [u64], src: &[u64]);

    /// `dst &= src`
    fn and_into(&self, dst: &mut [u64], src: &[u64]);

    /// `dst |= src`
    fn or_into(&self, dst: &mut [u64], src: &[u64]);

    /// Number of set bits.
    fn popcount(&self, words: &[u64]) -> u64;

    /// True when no bit is set.
    fn is_zero(&self, words: &[u64]) -> bool;

    /// Right-multiply the unsigned Pauli string `lhs` by `rhs` in place.
    ///
    /// Returns the exponent `k` (mod 4) of the scalar `i^k` produced by the
    /// product, ignoring any signs the caller tracks separately.
    fn pauli_mul_log_i(
        &self,
        lhs_xs: &mut [u64],
        lhs_zs: &mut [u64],
        rhs_xs: &[u64],
        rhs_zs: &[u64],
    ) -> u8;

    /// True when the two Pauli strings commute.
    fn commutes(&self, lhs_xs: &[u64], lhs_zs: &[u64], rhs_xs: &[u64], rhs_zs: &[u64]) -> bool;
}

/// Engine bound for the process lifetime.
pub type EngineRef = &'static dyn Engine;

#[inline]
pub(crate) fn check_pair(dst: usize, src: usize) {
    assert_eq!(dst, src, "Word slice lengths must match");
}

#[inline]
pub(crate) fn check_pauli(lhs_xs: usize, lhs_zs: usize, rhs_xs: usize, rhs_zs: usize) {
    assert_eq!(lhs_xs, lhs_zs, "Pauli xs/zs lengths must match");
    assert_eq!(rhs_xs, rhs_zs, "Pauli xs/zs lengths must match");
    assert_eq!(lhs_xs, rhs_xs, "Pauli strings must have the same word count");
}

/// Combine per-position mod-4 counters into a single `log_i` exponent.
///
/// `ones1` and `ones2` are the popcounts of the low and high counter bits.
#[inline]
pub(crate) fn fold_log_i(ones1: u64, ones2: u64) -> u8 {
    (((ones1 & 3) + ((ones2 & 1) << 1)) & 3) as u8
}

/// SplitMix64 step. Deterministic filler for the self test.
#[inline]
pub(crate) fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Word counts covering empty input, pure tails and multi-lane bodies.
const SELF_TEST_LENGTHS: &[usize] = &[0, 1, 2, 3, 4, 5, 7, 8, 9, 15, 16, 17, 33, 64];

const SELF_TEST_SEED: u64 = 0xDEAD_BEEF_124C;

fn filled(len: usize, state: &mut u64) -> Vec<u64> {
    (0..len).map(|_| splitmix64(state)).collect()
}

/// Check `candidate` against the portable baseline on a known-answer workload.
///
/// Returns a description of the first disagreement.
pub fn self_test(candidate: &dyn Engine) -> std::result::Result<(), String> {
    let baseline = portable();
    let mut state = SELF_TEST_SEED;

    for &len in SELF_TEST_LENGTHS {
        let a = filled(len, &mut state);
        let b = filled(len, &mut state);
        let c = filled(len, &mut state);
        let d = filled(len, &mut state);

        let binary_ops: [(&str, fn(&dyn Engine, &mut [u64], &[u64])); 3] = [
            ("xor_into", |e, dst, src| e.xor_into(dst, src)),
            ("and_into", |e, dst, src| e.and_into(dst, src)),
            ("or_into", |e, dst, src| e.or_into(dst, src)),
        ];
        for (name, op) in binary_ops {
            let mut expected = a.clone();
            let mut actual = a.clone();
            op(baseline, &mut expected, &b);
            op(candidate, &mut actual, &b);
            if expected != actual {
                return Err(format!("{} disagrees at {} words", name, len));
            }
        }

        if baseline.popcount(&a) != candidate.popcount(&a) {
            return Err(format!("popcount disagrees at {} words", len));
        }

        let zeros = vec![0u64; len];
        if baseline.is_zero(&a) != candidate.is_zero(&a) || !candidate.is_zero(&zeros) {
            return Err(format!("is_zero disagrees at {} words", len));
        }
        if len > 0 {
            let mut last_bit = zeros.clone();
            last_bit[len - 1] = 1 << 63;
            if candidate.is_zero(&last_bit) {
                return Err(format!("is_zero missed the final word at {} words", len));
            }
        }

        if baseline.commutes(&a, &b, &c, &d) != candidate.commutes(&a, &b, &c, &d) {
            return Err(format!("commutes disagrees at {} words", len));
        }

        let (mut ex, mut ez) = (a.clone(), b.clone());
        let (mut ax, mut az) = (a.clone(), b.clone());
        let expected_phase = baseline.pauli_mul_log_i(&mut ex, &mut ez, &c, &d);
        let actual_phase = candidate.pauli_mul_log_i(&mut ax, &mut az, &c, &d);
        if expected_phase != actual_phase || ex != ax || ez != az {
            return Err(format!("pauli_mul_log_i disagrees at {} words", len));
        }
    }

    Ok(())
}
