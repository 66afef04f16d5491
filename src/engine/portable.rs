//! Portable baseline engine.
//!
//! Plain 64-bit word loops with no target-specific instructions. Every CPU can
//! run it, and every other variant is measured against it.

use super::{check_pair, check_pauli, fold_log_i, Engine, EngineRef};

/// Baseline engine working one `u64` at a time.
#[derive(Debug, Default, Clone, Copy)]
pub struct PortableEngine;

static PORTABLE: PortableEngine = PortableEngine;

/// The baseline engine.
pub fn portable() -> EngineRef {
    &PORTABLE
}

impl Engine for PortableEngine {
    #[inline]
    fn xor_into(&self, dst: &mut [u64], src: &[u64]) {
        check_pair(dst.len(), src.len());
        for (d, s) in dst.iter_mut().zip(src) {
            *d ^= *s;
        }
    }

    #[inline]
    fn and_into(&self, dst: &mut [u64], src: &[u64]) {
        check_pair(dst.len(), src.len());
        for (d, s) in dst.iter_mut().zip(src) {
            *d &= *s;
        }
    }

    #[inline]
    fn or_into(&self, dst: &mut [u64], src: &[u64]) {
        check_pair(dst.len(), src.len());
        for (d, s) in dst.iter_mut().zip(src) {
            *d |= *s;
        }
    }

    #[inline]
    fn popcount(&self, words: &[u64]) -> u64 {
        words.iter().map(|w| u64::from(w.count_ones())).sum()
    }

    #[inline]
    fn is_zero(&self, words: &[u64]) -> bool {
        words.iter().fold(0u64, |acc, w| acc | w) == 0
    }

    fn pauli_mul_log_i(
        &self,
        lhs_xs: &mut [u64],
        lhs_zs: &mut [u64],
        rhs_xs: &[u64],
        rhs_zs: &[u64],
    ) -> u8 {
        check_pauli(lhs_xs.len(), lhs_zs.len(), rhs_xs.len(), rhs_zs.len());
        let (cnt1, cnt2) = pauli_mul_words(lhs_xs, lhs_zs, rhs_xs, rhs_zs);
        fold_log_i(u64::from(cnt1.count_ones()), u64::from(cnt2.count_ones()))
    }

    fn commutes(&self, lhs_xs: &[u64], lhs_zs: &[u64], rhs_xs: &[u64], rhs_zs: &[u64]) -> bool {
        check_pauli(lhs_xs.len(), lhs_zs.len(), rhs_xs.len(), rhs_zs.len());
        anticommuting_parity_words(lhs_xs, lhs_zs, rhs_xs, rhs_zs) == 0
    }
}

/// Scalar Pauli product over whole words, returning the mod-4 counters.
///
/// Each bit position of `(cnt1, cnt2)` is a two-bit counter of `+i` / `-i`
/// factors picked up at that position. The vector variants call this for the
/// words left over after their last full lane.
#[inline]
pub(crate) fn pauli_mul_words(
    lhs_xs: &mut [u64],
    lhs_zs: &mut [u64],
    rhs_xs: &[u64],
    rhs_zs: &[u64],
) -> (u64, u64) {
    let mut cnt1 = 0u64;
    let mut cnt2 = 0u64;

    for (((x1, z1), &x2), &z2) in lhs_xs.iter_mut().zip(lhs_zs.iter_mut()).zip(rhs_xs).zip(rhs_zs) {
        let old_x1 = *x1;
        let old_z1 = *z1;
        *x1 ^= x2;
        *z1 ^= z2;

        let x1z2 = old_x1 & z2;
        let anti_commutes = (x2 & old_z1) ^ x1z2;
        cnt2 ^= (cnt1 ^ *x1 ^ *z1 ^ x1z2) & anti_commutes;
        cnt1 ^= anti_commutes;
    }

    (cnt1, cnt2)
}

/// Parity (0 or 1) of the number of anti-commuting qubit positions.
#[inline]
pub(crate) fn anticommuting_parity_words(
    lhs_xs: &[u64],
    lhs_zs: &[u64],
    rhs_xs: &[u64],
    rhs_zs: &[u64],
) -> u32 {
    let mut acc = 0u64;
    for i in 0..lhs_xs.len() {
        acc ^= (lhs_xs[i] & rhs_zs[i]) ^ (lhs_zs[i] & rhs_xs[i]);
    }
    acc.count_ones() & 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(p: char) -> (Vec<u64>, Vec<u64>) {
        match p {
            'I' => (vec![0], vec![0]),
            'X' => (vec![1], vec![0]),
            'Z' => (vec![0], vec![1]),
            'Y' => (vec![1], vec![1]),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_bitwise_kernels() {
        let e = portable();
        let mut dst = vec![0b1100, u64::MAX];
        e.xor_into(&mut dst, &[0b1010, 1]);
        assert_eq!(dst, vec![0b0110, u64::MAX - 1]);
        e.and_into(&mut dst, &[0b0100, 0]);
        assert_eq!(dst, vec![0b0100, 0]);
        e.or_into(&mut dst, &[0b0001, 2]);
        assert_eq!(dst, vec![0b0101, 2]);
    }

    #[test]
    fn test_popcount_and_is_zero() {
        let e = portable();
        assert_eq!(e.popcount(&[]), 0);
        assert_eq!(e.popcount(&[u64::MAX, 0b111]), 67);
        assert!(e.is_zero(&[]));
        assert!(e.is_zero(&[0, 0, 0]));
        assert!(!e.is_zero(&[0, 0, 1 << 40]));
    }

    #[test]
    fn test_single_qubit_products() {
        // (lhs, rhs, expected product, expected log_i)
        let table = [
            ('X', 'Z', 'Y', 3), // XZ = -iY
            ('Z', 'X', 'Y', 1), // ZX = iY
            ('X', 'Y', 'Z', 1), // XY = iZ
            ('Y', 'X', 'Z', 3),
            ('Y', 'Z', 'X', 1), // YZ = iX
            ('Z', 'Y', 'X', 3),
            ('X', 'X', 'I', 0),
            ('Y', 'Y', 'I', 0),
            ('I', 'Z', 'Z', 0),
        ];
        let e = portable();
        for (l, r, p, k) in table {
            let (mut xs, mut zs) = single(l);
            let (rx, rz) = single(r);
            let log_i = e.pauli_mul_log_i(&mut xs, &mut zs, &rx, &rz);
            assert_eq!((xs, zs), single(p), "{}*{}", l, r);
            assert_eq!(log_i, k, "{}*{}", l, r);
        }
    }

    #[test]
    fn test_phase_accumulates_across_words() {
        // XZ on qubit 0 and on qubit 64: (-i)(-i) = -1 = i^2
        let e = portable();
        let mut xs = vec![1, 1];
        let mut zs = vec![0, 0];
        let log_i = e.pauli_mul_log_i(&mut xs, &mut zs, &[0, 0], &[1, 1]);
        assert_eq!(log_i, 2);
        assert_eq!(xs, vec![1, 1]);
        assert_eq!(zs, vec![1, 1]);
    }

    #[test]
    fn test_commutes() {
        let e = portable();
        // X vs Z anti-commute, XX vs ZZ commute
        assert!(!e.commutes(&[1], &[0], &[0], &[1]));
        assert!(e.commutes(&[0b11], &[0], &[0], &[0b11]));
        assert!(e.commutes(&[], &[], &[], &[]));
    }

    #[test]
    #[should_panic(expected = "Word slice lengths must match")]
    fn test_length_mismatch_panics() {
        let mut dst = vec![0u64; 2];
        portable().xor_into(&mut dst, &[1]);
    }
}
