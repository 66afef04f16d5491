//! SSE2 engine: 128-bit lanes, two words per step.
//!
//! Words past the last full lane go through the portable scalar helpers so
//! tails produce exactly the baseline result.

use std::arch::x86_64::*;

use super::portable::{anticommuting_parity_words, pauli_mul_words};
use super::{check_pair, check_pauli, fold_log_i, Engine, EngineRef};

const LANE_WORDS: usize = 2;

/// Engine compiled with SSE2 kernels.
pub(crate) struct Sse2Engine {
    _private: (),
}

static SSE2: Sse2Engine = Sse2Engine { _private: () };

/// The SSE2 engine.
///
/// # Safety
///
/// The caller must have verified that the host supports SSE2.
pub(crate) unsafe fn engine() -> EngineRef {
    &SSE2
}

macro_rules! binary_kernel {
    ($name:ident, $intrinsic:ident, $op:tt) => {
        #[target_feature(enable = "sse2")]
        unsafe fn $name(dst: &mut [u64], src: &[u64]) {
            let body = dst.len() / LANE_WORDS * LANE_WORDS;
            let d = dst.as_mut_ptr();
            let s = src.as_ptr();
            let mut i = 0;
            while i < body {
                // SAFETY: i + LANE_WORDS <= body <= len for both slices.
                unsafe {
                    let a = _mm_loadu_si128(d.add(i) as *const __m128i);
                    let b = _mm_loadu_si128(s.add(i) as *const __m128i);
                    _mm_storeu_si128(d.add(i) as *mut __m128i, $intrinsic(a, b));
                }
                i += LANE_WORDS;
            }
            for j in body..dst.len() {
                dst[j] $op src[j];
            }
        }
    };
}

binary_kernel!(xor_into_sse2, _mm_xor_si128, ^=);
binary_kernel!(and_into_sse2, _mm_and_si128, &=);
binary_kernel!(or_into_sse2, _mm_or_si128, |=);

/// Sum of set bits across both 64-bit lanes (SWAR, SSE2 has no popcnt).
#[inline]
#[target_feature(enable = "sse2")]
unsafe fn popcount_m128(v: __m128i) -> u64 {
    let mut lanes = [0u64; LANE_WORDS];
    // SAFETY: SSE2 enabled by the caller; `lanes` holds 16 bytes.
    unsafe {
        let m1 = _mm_set1_epi8(0x55);
        let m2 = _mm_set1_epi8(0x33);
        let m4 = _mm_set1_epi8(0x0f);
        let v = _mm_sub_epi8(v, _mm_and_si128(_mm_srli_epi64(v, 1), m1));
        let v = _mm_add_epi8(_mm_and_si128(v, m2), _mm_and_si128(_mm_srli_epi64(v, 2), m2));
        let v = _mm_and_si128(_mm_add_epi8(v, _mm_srli_epi64(v, 4)), m4);
        let sums = _mm_sad_epu8(v, _mm_setzero_si128());
        _mm_storeu_si128(lanes.as_mut_ptr() as *mut __m128i, sums);
    }
    lanes[0] + lanes[1]
}

#[target_feature(enable = "sse2")]
unsafe fn popcount_sse2(words: &[u64]) -> u64 {
    let body = words.len() / LANE_WORDS * LANE_WORDS;
    let p = words.as_ptr();
    let mut total = 0u64;
    let mut i = 0;
    while i < body {
        // SAFETY: in bounds, SSE2 enabled.
        unsafe {
            total += popcount_m128(_mm_loadu_si128(p.add(i) as *const __m128i));
        }
        i += LANE_WORDS;
    }
    total + words[body..].iter().map(|w| u64::from(w.count_ones())).sum::<u64>()
}

#[target_feature(enable = "sse2")]
unsafe fn is_zero_sse2(words: &[u64]) -> bool {
    let body = words.len() / LANE_WORDS * LANE_WORDS;
    let p = words.as_ptr();
    let mut lanes = [0u64; LANE_WORDS];
    // SAFETY: in bounds, SSE2 enabled.
    unsafe {
        let mut acc = _mm_setzero_si128();
        let mut i = 0;
        while i < body {
            acc = _mm_or_si128(acc, _mm_loadu_si128(p.add(i) as *const __m128i));
            i += LANE_WORDS;
        }
        _mm_storeu_si128(lanes.as_mut_ptr() as *mut __m128i, acc);
    }
    let tail = words[body..].iter().fold(0u64, |acc, w| acc | w);
    (lanes[0] | lanes[1] | tail) == 0
}

#[target_feature(enable = "sse2")]
unsafe fn pauli_mul_log_i_sse2(
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
        let mut cnt1 = _mm_setzero_si128();
        let mut cnt2 = _mm_setzero_si128();
        let mut i = 0;
        while i < body {
            let old_x1 = _mm_loadu_si128(px1.add(i) as *const __m128i);
            let old_z1 = _mm_loadu_si128(pz1.add(i) as *const __m128i);
            let x2 = _mm_loadu_si128(px2.add(i) as *const __m128i);
            let z2 = _mm_loadu_si128(pz2.add(i) as *const __m128i);

            let x1 = _mm_xor_si128(old_x1, x2);
            let z1 = _mm_xor_si128(old_z1, z2);
            _mm_storeu_si128(px1.add(i) as *mut __m128i, x1);
            _mm_storeu_si128(pz1.add(i) as *mut __m128i, z1);

            let x1z2 = _mm_and_si128(old_x1, z2);
            let anti_commutes = _mm_xor_si128(_mm_and_si128(x2, old_z1), x1z2);
            let flips = _mm_xor_si128(_mm_xor_si128(cnt1, x1), _mm_xor_si128(z1, x1z2));
            cnt2 = _mm_xor_si128(cnt2, _mm_and_si128(flips, anti_commutes));
            cnt1 = _mm_xor_si128(cnt1, anti_commutes);
            i += LANE_WORDS;
        }
        ones1 = popcount_m128(cnt1);
        ones2 = popcount_m128(cnt2);
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

#[target_feature(enable = "sse2")]
unsafe fn commutes_sse2(lhs_xs: &[u64], lhs_zs: &[u64], rhs_xs: &[u64], rhs_zs: &[u64]) -> bool {
    let body = lhs_xs.len() / LANE_WORDS * LANE_WORDS;
    let parity;
    // SAFETY: all four slices have the same length; i + LANE_WORDS <= body.
    unsafe {
        let mut acc = _mm_setzero_si128();
        let mut i = 0;
        while i < body {
            let x1 = _mm_loadu_si128(lhs_xs.as_ptr().add(i) as *const __m128i);
            let z1 = _mm_loadu_si128(lhs_zs.as_ptr().add(i) as *const __m128i);
            let x2 = _mm_loadu_si128(rhs_xs.as_ptr().add(i) as *const __m128i);
            let z2 = _mm_loadu_si128(rhs_zs.as_ptr().add(i) as *const __m128i);
            acc = _mm_xor_si128(acc, _mm_xor_si128(_mm_and_si128(x1, z2), _mm_and_si128(z1, x2)));
            i += LANE_WORDS;
        }
        parity = popcount_m128(acc) & 1;
    }
    let tail = anticommuting_parity_words(
        &lhs_xs[body..],
        &lhs_zs[body..],
        &rhs_xs[body..],
        &rhs_zs[body..],
    );
    (parity as u32 ^ tail) == 0
}

// SAFETY (all methods): an `Sse2Engine` is only reachable through `engine()`,
// whose caller verified SSE2 support.
impl Engine for Sse2Engine {
    fn xor_into(&self, dst: &mut [u64], src: &[u64]) {
        check_pair(dst.len(), src.len());
        unsafe { xor_into_sse2(dst, src) }
    }

    fn and_into(&self, dst: &mut [u64], src: &[u64]) {
        check_pair(dst.len(), src.len());
        unsafe { and_into_sse2(dst, src) }
    }

    fn or_into(&self, dst: &mut [u64], src: &[u64]) {
        check_pair(dst.len(), src.len());
        unsafe { or_into_sse2(dst, src) }
    }

    fn popcount(&self, words: &[u64]) -> u64 {
        unsafe { popcount_sse2(words) }
    }

    fn is_zero(&self, words: &[u64]) -> bool {
        unsafe { is_zero_sse2(words) }
    }

    fn pauli_mul_log_i(
        &self,
        lhs_xs: &mut [u64],
        lhs_zs: &mut [u64],
        rhs_xs: &[u64],
        rhs_zs: &[u64],
    ) -> u8 {
        check_pauli(lhs_xs.len(), lhs_zs.len(), rhs_xs.len(), rhs_zs.len());
        unsafe { pauli_mul_log_i_sse2(lhs_xs, lhs_zs, rhs_xs, rhs_zs) }
    }

    fn commutes(&self, lhs_xs: &[u64], lhs_zs: &[u64], rhs_xs: &[u64], rhs_zs: &[u64]) -> bool {
        check_pauli(lhs_xs.len(), lhs_zs.len(), rhs_xs.len(), rhs_zs.len());
        unsafe { commutes_sse2(lhs_xs, lhs_zs, rhs_xs, rhs_zs) }
    }
}
