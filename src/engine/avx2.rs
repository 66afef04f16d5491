//! AVX2 engine: 256-bit lanes, four words per step.
//!
//! Popcount uses the nibble lookup through `vpshufb` followed by `vpsadbw`
//! (Mula's method). Tails fall back to the portable scalar helpers.

use std::arch::x86_64::*;

use super::portable::{anticommuting_parity_words, pauli_mul_words};
use super::{check_pair, check_pauli, fold_log_i, Engine, EngineRef};

const LANE_WORDS: usize = 4;

/// Engine compiled with AVX2 kernels.
pub(crate) struct Avx2Engine {
    _private: (),
}

static AVX2: Avx2Engine = Avx2Engine { _private: () };

/// The AVX2 engine.
///
/// # Safety
///
/// The caller must have verified that the host supports AVX2 and that the OS
/// saves YMM state.
pub(crate) unsafe fn engine() -> EngineRef {
    &AVX2
}

macro_rules! binary_kernel {
    ($name:ident, $intrinsic:ident, $op:tt) => {
        #[target_feature(enable = "avx2")]
        unsafe fn $name(dst: &mut [u64], src: &[u64]) {
            let body = dst.len() / LANE_WORDS * LANE_WORDS;
            let d = dst.as_mut_ptr();
            let s = src.as_ptr();
            let mut i = 0;
            while i < body {
                // SAFETY: i + LANE_WORDS <= body <= len for both slices.
                unsafe {
                    let a = _mm256_loadu_si256(d.add(i) as *const __m256i);
                    let b = _mm256_loadu_si256(s.add(i) as *const __m256i);
                    _mm256_storeu_si256(d.add(i) as *mut __m256i, $intrinsic(a, b));
                }
                i += LANE_WORDS;
            }
            for j in body..dst.len() {
                dst[j] $op src[j];
            }
        }
    };
}

binary_kernel!(xor_into_avx2, _mm256_xor_si256, ^=);
binary_kernel!(and_into_avx2, _mm256_and_si256, &=);
binary_kernel!(or_into_avx2, _mm256_or_si256, |=);

/// Sum of set bits across all four 64-bit lanes.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn popcount_m256(v: __m256i) -> u64 {
    let mut lanes = [0u64; LANE_WORDS];
    // SAFETY: AVX2 enabled by the caller; `lanes` holds 32 bytes.
    unsafe {
        let lookup = _mm256_setr_epi8(
            0, 1, 1, 2, 1, 2, 2, 3, 1, 2, 2, 3, 2, 3, 3, 4, //
            0, 1, 1, 2, 1, 2, 2, 3, 1, 2, 2, 3, 2, 3, 3, 4,
        );
        let low_mask = _mm256_set1_epi8(0x0f);
        let lo = _mm256_and_si256(v, low_mask);
        let hi = _mm256_and_si256(_mm256_srli_epi16(v, 4), low_mask);
        let counts = _mm256_add_epi8(_mm256_shuffle_epi8(lookup, lo), _mm256_shuffle_epi8(lookup, hi));
        let sums = _mm256_sad_epu8(counts, _mm256_setzero_si256());
        _mm256_storeu_si256(lanes.as_mut_ptr() as *mut __m256i, sums);
    }
    lanes.iter().sum()
}

#[target_feature(enable = "avx2")]
unsafe fn popcount_avx2(words: &[u64]) -> u64 {
    let body = words.len() / LANE_WORDS * LANE_WORDS;
    let p = words.as_ptr();
    let mut total = 0u64;
    let mut i = 0;
    while i < body {
        // SAFETY: i + LANE_WORDS <= body <= len; AVX2 enabled.
        total += unsafe { popcount_m256(_mm256_loadu_si256(p.add(i) as *const __m256i)) };
        i += LANE_WORDS;
    }
    total + words[body..].iter().map(|w| u64::from(w.count_ones())).sum::<u64>()
}

#[target_feature(enable = "avx2")]
unsafe fn is_zero_avx2(words: &[u64]) -> bool {
    let body = words.len() / LANE_WORDS * LANE_WORDS;
    let p = words.as_ptr();
    let body_zero;
    // SAFETY: in bounds, AVX2 enabled.
    unsafe {
        let mut acc = _mm256_setzero_si256();
        let mut i = 0;
        while i < body {
            acc = _mm256_or_si256(acc, _mm256_loadu_si256(p.add(i) as *const __m256i));
            i += LANE_WORDS;
        }
        body_zero = _mm256_testz_si256(acc, acc) == 1;
    }
    body_zero && words[body..].iter().all(|&w| w == 0)
}

#[target_feature(enable = "avx2")]
unsafe fn pauli_mul_log_i_avx2(
    lhs_xs: &mut [u64],
    lhs_zs: &mut [u64],
    rhs_xs: &[u64],
    rhs_zs: &[u64],
) -> u8 {
    let body = lhs_xs.len() / LANE_WORDS * LANE_WORDS;
    let px1 = lhs_xs.as_mut_ptr();
    let pz1 = lhs_zs.as_mut_ptr();
    let px2 = rhs_xs.as_ptr();
    let pz2 = rhs_zs.as_ptr();

    let (mut ones1, mut ones2);
    // SAFETY: all four slices have the same length; i + LANE_WORDS <= body.
    unsafe {
        let mut cnt1 = _mm256_setzero_si256();
        let mut cnt2 = _mm256_setzero_si256();
        let mut i = 0;
        while i < body {
            let old_x1 = _mm256_loadu_si256(px1.add(i) as *const __m256i);
            let old_z1 = _mm256_loadu_si256(pz1.add(i) as *const __m256i);
            let x2 = _mm256_loadu_si256(px2.add(i) as *const __m256i);
            let z2 = _mm256_loadu_si256(pz2.add(i) as *const __m256i);

            let x1 = _mm256_xor_si256(old_x1, x2);
            let z1 = _mm256_xor_si256(old_z1, z2);
            _mm256_storeu_si256(px1.add(i) as *mut __m256i, x1);
            _mm256_storeu_si256(pz1.add(i) as *mut __m256i, z1);

            let x1z2 = _mm256_and_si256(old_x1, z2);
            let anti_commutes = _mm256_xor_si256(_mm256_and_si256(x2, old_z1), x1z2);
            let flips = _mm256_xor_si256(_mm256_xor_si256(cnt1, x1), _mm256_xor_si256(z1, x1z2));
            cnt2 = _mm256_xor_si256(cnt2, _mm256_and_si256(flips, anti_commutes));
            cnt1 = _mm256_xor_si256(cnt1, anti_commutes);
            i += LANE_WORDS;
        }
        ones1 = popcount_m256(cnt1);
        ones2 = popcount_m256(cnt2);
    }

    let (tail1, tail2) = pauli_mul_words(
        &mut lhs_xs[body..],
        &mut lhs_zs[body..],
        &rhs_xs[body..],
        &rhs_zs[body..],
    );
    ones1 += u64::from(tail1.count_ones());
    ones2 += u64::from(tail2.count_ones());
    fold_log_i(ones1, ones2)
}

#[target_feature(enable = "avx2")]
unsafe fn commutes_avx2(lhs_xs: &[u64], lhs_zs: &[u64], rhs_xs: &[u64], rhs_zs: &[u64]) -> bool {
    let body = lhs_xs.len() / LANE_WORDS * LANE_WORDS;
    let parity;
    // SAFETY: all four slices have the same length; i + LANE_WORDS <= body.
    unsafe {
        let mut acc = _mm256_setzero_si256();
        let mut i = 0;
        while i < body {
            let x1 = _mm256_loadu_si256(lhs_xs.as_ptr().add(i) as *const __m256i);
            let z1 = _mm256_loadu_si256(lhs_zs.as_ptr().add(i) as *const __m256i);
            let x2 = _mm256_loadu_si256(rhs_xs.as_ptr().add(i) as *const __m256i);
            let z2 = _mm256_loadu_si256(rhs_zs.as_ptr().add(i) as *const __m256i);
            let anti = _mm256_xor_si256(_mm256_and_si256(x1, z2), _mm256_and_si256(z1, x2));
            acc = _mm256_xor_si256(acc, anti);
            i += LANE_WORDS;
        }
        parity = popcount_m256(acc) & 1;
    }
    let tail = anticommuting_parity_words(
        &lhs_xs[body..],
        &lhs_zs[body..],
        &rhs_xs[body..],
        &rhs_zs[body..],
    );
    (parity as u32 ^ tail) == 0
}

// SAFETY (all methods): an `Avx2Engine` is only reachable through `engine()`,
// whose caller verified AVX2 support.
impl Engine for Avx2Engine {
    fn xor_into(&self, dst: &mut [u64], src: &[u64]) {
        check_pair(dst.len(), src.len());
        unsafe { xor_into_avx2(dst, src) }
    }

    fn and_into(&self, dst: &mut [u64], src: &[u64]) {
        check_pair(dst.len(), src.len());
        unsafe { and_into_avx2(dst, src) }
    }

    fn or_into(&self, dst: &mut [u64], src: &[u64]) {
        check_pair(dst.len(), src.len());
        unsafe { or_into_avx2(dst, src) }
    }

    fn popcount(&self, words: &[u64]) -> u64 {
        unsafe { popcount_avx2(words) }
    }

    fn is_zero(&self, words: &[u64]) -> bool {
        unsafe { is_zero_avx2(words) }
    }

    fn pauli_mul_log_i(
        &self,
        lhs_xs: &mut [u64],
        lhs_zs: &mut [u64],
        rhs_xs: &[u64],
        rhs_zs: &[u64],
    ) -> u8 {
        check_pauli(lhs_xs.len(), lhs_zs.len(), rhs_xs.len(), rhs_zs.len());
        unsafe { pauli_mul_log_i_avx2(lhs_xs, lhs_zs, rhs_xs, rhs_zs) }
    }

    fn commutes(&self, lhs_xs: &[u64], lhs_zs: &[u64], rhs_xs: &[u64], rhs_zs: &[u64]) -> bool {
        check_pauli(lhs_xs.len(), lhs_zs.len(), rhs_xs.len(), rhs_zs.len());
        unsafe { commutes_avx2(lhs_xs, lhs_zs, rhs_xs, rhs_zs) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{portable, self_test};

    fn host_engine() -> Option<EngineRef> {
        // SAFETY: guarded by the runtime check.
        crate::system::cpu_features().avx2.then(|| unsafe { engine() })
    }

    #[test]
    fn test_avx2_passes_self_test() {
        if let Some(e) = host_engine() {
            assert_eq!(self_test(e), Ok(()));
        }
    }

    #[test]
    fn test_avx2_popcount_all_ones() {
        let Some(e) = host_engine() else { return };
        for len in 0..10usize {
            let words = vec![u64::MAX; len];
            assert_eq!(e.popcount(&words), 64 * len as u64);
            assert_eq!(e.popcount(&words), portable().popcount(&words));
        }
    }

    #[test]
    fn test_avx2_popcount_mixed_lanes() {
        let Some(e) = host_engine() else { return };
        let words: Vec<u64> = (0..13u64).map(|i| i.wrapping_mul(0x9e37_79b9_7f4a_7c15) ^ (1 << i)).collect();
        for len in 0..=words.len() {
            assert_eq!(e.popcount(&words[..len]), portable().popcount(&words[..len]), "len {}", len);
        }
    }

    #[test]
    fn test_avx2_pauli_phase_over_full_lanes() {
        let Some(e) = host_engine() else { return };
        // X * Z on eight qubits, one per word: (-i)^8 = 1
        let mut xs = vec![1u64; 8];
        let mut zs = vec![0u64; 8];
        let log_i = e.pauli_mul_log_i(&mut xs, &mut zs, &[0; 8], &[1; 8]);
        assert_eq!(log_i, 0);
        assert_eq!(zs, vec![1u64; 8]);
    }
}
