//! Signed Pauli strings over the dispatched kernels.

use std::fmt;
use std::str::FromStr;

use super::Engine;
use crate::error::{ArchmuxError, Result};

const WORD_BITS: usize = 64;

/// A Pauli product `±P_0 P_1 ... P_{n-1}` stored as packed x/z bit vectors.
///
/// Bits past `num_qubits` in the last word are always zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PauliString {
    negative: bool,
    num_qubits: usize,
    xs: Vec<u64>,
    zs: Vec<u64>,
}

impl PauliString {
    /// The identity on `num_qubits` qubits.
    pub fn identity(num_qubits: usize) -> Self {
        let words = num_qubits.div_ceil(WORD_BITS);
        Self {
            negative: false,
            num_qubits,
            xs: vec![0; words],
            zs: vec![0; words],
        }
    }

    /// Number of qubits.
    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// True when the sign is `-1`.
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Flip the sign.
    pub fn negate(&mut self) {
        self.negative = !self.negative;
    }

    /// Packed x bits.
    pub fn xs(&self) -> &[u64] {
        &self.xs
    }

    /// Packed z bits.
    pub fn zs(&self) -> &[u64] {
        &self.zs
    }

    /// The single-qubit Pauli at `qubit` as one of `I`, `X`, `Y`, `Z`.
    pub fn get(&self, qubit: usize) -> Result<char> {
        self.check_qubit(qubit)?;
        let (word, bit) = (qubit / WORD_BITS, qubit % WORD_BITS);
        let x = (self.xs[word] >> bit) & 1 == 1;
        let z = (self.zs[word] >> bit) & 1 == 1;
        Ok(match (x, z) {
            (false, false) => 'I',
            (true, false) => 'X',
            (true, true) => 'Y',
            (false, true) => 'Z',
        })
    }

    /// Overwrite the Pauli at `qubit`. Accepts `I`, `_`, `X`, `Y`, `Z`.
    pub fn set(&mut self, qubit: usize, pauli: char) -> Result<()> {
        self.check_qubit(qubit)?;
        let (x, z) = pauli_bits(pauli)?;
        let (word, mask) = (qubit / WORD_BITS, 1u64 << (qubit % WORD_BITS));
        if x {
            self.xs[word] |= mask;
        } else {
            self.xs[word] &= !mask;
        }
        if z {
            self.zs[word] |= mask;
        } else {
            self.zs[word] &= !mask;
        }
        Ok(())
    }

    /// Number of non-identity qubits.
    pub fn weight(&self) -> Result<usize> {
        Ok(self.weight_with(crate::engine()?))
    }

    /// [`weight`](Self::weight) on an explicit engine.
    pub fn weight_with(&self, engine: &dyn Engine) -> usize {
        let mut support = self.xs.clone();
        engine.or_into(&mut support, &self.zs);
        engine.popcount(&support) as usize
    }

    /// True when `self` and `other` commute.
    pub fn commutes(&self, other: &PauliString) -> Result<bool> {
        self.commutes_with(crate::engine()?, other)
    }

    /// [`commutes`](Self::commutes) on an explicit engine.
    pub fn commutes_with(&self, engine: &dyn Engine, other: &PauliString) -> Result<bool> {
        self.check_same_size(other)?;
        Ok(engine.commutes(&self.xs, &self.zs, &other.xs, &other.zs))
    }

    /// Right-multiply by `rhs` in place, leaving the sign of `self` untouched.
    ///
    /// Returns the exponent `k` such that the true product equals
    /// `i^k * self` after the call. The sign of `rhs` is folded into `k`.
    pub fn right_mul_log_i(&mut self, rhs: &PauliString) -> Result<u8> {
        self.right_mul_log_i_with(crate::engine()?, rhs)
    }

    /// [`right_mul_log_i`](Self::right_mul_log_i) on an explicit engine.
    pub fn right_mul_log_i_with(&mut self, engine: &dyn Engine, rhs: &PauliString) -> Result<u8> {
        self.check_same_size(rhs)?;
        let log_i = engine.pauli_mul_log_i(&mut self.xs, &mut self.zs, &rhs.xs, &rhs.zs);
        Ok((log_i + (u8::from(rhs.negative) << 1)) & 3)
    }

    /// `self *= rhs`, keeping a real sign.
    ///
    /// Fails without modifying `self` when the strings anti-commute, since
    /// the product would carry an imaginary phase.
    pub fn mul_assign_checked(&mut self, rhs: &PauliString) -> Result<()> {
        self.mul_assign_checked_with(crate::engine()?, rhs)
    }

    /// [`mul_assign_checked`](Self::mul_assign_checked) on an explicit engine.
    pub fn mul_assign_checked_with(&mut self, engine: &dyn Engine, rhs: &PauliString) -> Result<()> {
        if !self.commutes_with(engine, rhs)? {
            return Err(ArchmuxError::invalid_input(format!(
                "Product of anti-commuting Pauli strings {} and {} is imaginary",
                self, rhs
            )));
        }
        let log_i = self.right_mul_log_i_with(engine, rhs)?;
        debug_assert_eq!(log_i & 1, 0);
        self.negative ^= log_i & 2 != 0;
        Ok(())
    }

    fn check_qubit(&self, qubit: usize) -> Result<()> {
        if qubit >= self.num_qubits {
            return Err(ArchmuxError::invalid_input(format!(
                "Qubit {} out of range for a {}-qubit Pauli string",
                qubit, self.num_qubits
            )));
        }
        Ok(())
    }

    fn check_same_size(&self, other: &PauliString) -> Result<()> {
        if self.num_qubits != other.num_qubits {
            return Err(ArchmuxError::invalid_input(format!(
                "Pauli strings differ in size: {} vs {} qubits",
                self.num_qubits, other.num_qubits
            )));
        }
        Ok(())
    }
}

fn pauli_bits(c: char) -> Result<(bool, bool)> {
    match c {
        'I' | '_' => Ok((false, false)),
        'X' => Ok((true, false)),
        'Y' => Ok((true, true)),
        'Z' => Ok((false, true)),
        other => Err(ArchmuxError::invalid_input(format!(
            "Invalid Pauli character '{}'",
            other
        ))),
    }
}

impl FromStr for PauliString {
    type Err = ArchmuxError;

    fn from_str(s: &str) -> Result<Self> {
        let (negative, body) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };

        let mut pauli = PauliString::identity(body.chars().count());
        pauli.negative = negative;
        for (qubit, c) in body.chars().enumerate() {
            let (x, z) = pauli_bits(c)?;
            let (word, bit) = (qubit / WORD_BITS, qubit % WORD_BITS);
            pauli.xs[word] |= u64::from(x) << bit;
            pauli.zs[word] |= u64::from(z) << bit;
        }
        Ok(pauli)
    }
}

impl fmt::Display for PauliString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.negative { "-" } else { "+" })?;
        for qubit in 0..self.num_qubits {
            let (word, bit) = (qubit / WORD_BITS, qubit % WORD_BITS);
            let x = (self.xs[word] >> bit) & 1 == 1;
            let z = (self.zs[word] >> bit) & 1 == 1;
            let c = match (x, z) {
                (false, false) => '_',
                (true, false) => 'X',
                (true, true) => 'Y',
                (false, true) => 'Z',
            };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::portable;

    fn p(s: &str) -> PauliString {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(p("XYZ_").to_string(), "+XYZ_");
        assert_eq!(p("-IXI").to_string(), "-_X_");
        assert_eq!(p("+").to_string(), "+");
        assert_eq!(p("").num_qubits(), 0);
        assert_eq!(p("-ZZ").get(1).unwrap(), 'Z');
    }

    #[test]
    fn test_parse_rejects_unknown_characters() {
        let err = "XQZ".parse::<PauliString>().unwrap_err();
        assert_eq!(err.category(), "input");
        assert!("--X".parse::<PauliString>().is_err());
    }

    #[test]
    fn test_long_strings_cross_word_boundaries() {
        let text: String = (0..130).map(|i| ['I', 'X', 'Y', 'Z'][i % 4]).collect();
        let pauli = p(&text);
        assert_eq!(pauli.xs().len(), 3);
        assert_eq!(pauli.get(129).unwrap(), 'X');
        assert_eq!(pauli.weight_with(portable()), 130 - 33);
        assert_eq!(pauli.to_string(), format!("+{}", text.replace('I', "_")));
    }

    #[test]
    fn test_set_and_get() {
        let mut pauli = PauliString::identity(70);
        pauli.set(65, 'Y').unwrap();
        assert_eq!(pauli.get(65).unwrap(), 'Y');
        pauli.set(65, '_').unwrap();
        assert_eq!(pauli, PauliString::identity(70));
        assert!(pauli.set(70, 'X').is_err());
        assert!(pauli.get(70).is_err());
    }

    #[test]
    fn test_commutes_with() {
        let e = portable();
        assert!(!p("X").commutes_with(e, &p("Z")).unwrap());
        assert!(p("XX").commutes_with(e, &p("ZZ")).unwrap());
        assert!(p("XYZ").commutes_with(e, &p("-XYZ")).unwrap());
        assert!(p("X").commutes_with(e, &p("XX")).is_err());
    }

    #[test]
    fn test_right_mul_log_i_includes_rhs_sign() {
        let e = portable();
        let mut lhs = p("X");
        assert_eq!(lhs.right_mul_log_i_with(e, &p("Z")).unwrap(), 3);
        assert_eq!(lhs, p("Y"));

        let mut lhs = p("X");
        assert_eq!(lhs.right_mul_log_i_with(e, &p("-Z")).unwrap(), 1);
    }

    #[test]
    fn test_mul_assign_checked() {
        let e = portable();
        // (XX)(ZZ) = (XZ)(XZ) = (-iY)(-iY) = -YY
        let mut lhs = p("XX");
        lhs.mul_assign_checked_with(e, &p("ZZ")).unwrap();
        assert_eq!(lhs, p("-YY"));

        let mut lhs = p("-XZ");
        lhs.mul_assign_checked_with(e, &p("-XZ")).unwrap();
        assert_eq!(lhs, p("+__"));
    }

    #[test]
    fn test_mul_assign_checked_rejects_imaginary_product() {
        let mut lhs = p("XI");
        let err = lhs.mul_assign_checked_with(portable(), &p("ZI")).unwrap_err();
        assert!(err.to_string().contains("imaginary"));
        assert_eq!(lhs, p("XI"));
    }
}
