//! Proof-of-work target type.

use std::fmt;
use std::str::FromStr;

/// Difficulty-1 numerator used by the coordinator.
///
/// Only the two most significant words of a target take part in difficulty
/// calculations, so difficulty is `DIFF_1 / (target[0] << 32 | target[1])`.
pub const DIFF_1: f64 = 0x0000_FFFF_FFFF_FFFF_u64 as f64;

/// 128-bit proof-of-work target, stored as four big-endian-ordered words.
///
/// Word 0 is the most significant. A digest meets the target if it is
/// numerically less than or equal to it, compared word by word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Target([u32; 4]);

/// Error parsing a target from its hex representation.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("target must be 32 hex characters, got {0}")]
    Length(usize),

    #[error("invalid hex in target: {0}")]
    Hex(String),
}

impl Target {
    /// The easiest possible target; every digest meets it.
    pub const MAX: Self = Self([u32::MAX; 4]);

    /// Create from four words, most significant first.
    pub const fn from_words(words: [u32; 4]) -> Self {
        Self(words)
    }

    /// The four words, most significant first.
    pub fn words(&self) -> [u32; 4] {
        self.0
    }

    /// Check whether `digest` is at or below this target.
    ///
    /// Compares most significant word first and stops at the first word
    /// that differs.
    pub fn is_met_by(&self, digest: &[u32; 4]) -> bool {
        for (d, t) in digest.iter().zip(self.0.iter()) {
            if d < t {
                return true;
            }
            if d > t {
                return false;
            }
        }
        true
    }

    /// Numeric value of the two most significant words.
    fn leading_u64(&self) -> u64 {
        ((self.0[0] as u64) << 32) | self.0[1] as u64
    }

    /// Coordinator difficulty of this target.
    ///
    /// A zero leading value is treated as maximal difficulty and yields
    /// [`DIFF_1`].
    pub fn difficulty(&self) -> f64 {
        let value = self.leading_u64();
        if value == 0 {
            return DIFF_1;
        }
        DIFF_1 / value as f64
    }
}

impl FromStr for Target {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 {
            return Err(TargetError::Length(s.len()));
        }

        let bytes = hex::decode(s).map_err(|e| TargetError::Hex(e.to_string()))?;
        let mut words = [0u32; 4];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(Self(words))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X}{:08X}{:08X}{:08X}",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let target: Target = "00000FFFFFFFFFFF0000000100000002".parse().unwrap();
        assert_eq!(target.words(), [0x00000FFF, 0xFFFFFFFF, 1, 2]);
        assert_eq!(target.to_string(), "00000FFFFFFFFFFF0000000100000002");

        let lower: Target = "00000fffffffffff0000000100000002".parse().unwrap();
        assert_eq!(lower, target);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!("00".parse::<Target>(), Err(TargetError::Length(2)));
        assert!(matches!(
            "zz000FFFFFFFFFFF0000000100000002".parse::<Target>(),
            Err(TargetError::Hex(_))
        ));
    }

    #[test]
    fn test_is_met_by_word_order() {
        let target = Target::from_words([0x0000_1000, 0, 0, 0]);

        // Smaller leading word wins regardless of the rest
        assert!(target.is_met_by(&[0x0000_0FFF, u32::MAX, u32::MAX, u32::MAX]));

        // Larger leading word loses regardless of the rest
        assert!(!target.is_met_by(&[0x0000_1001, 0, 0, 0]));

        // Equal leading word falls through to the next
        assert!(!target.is_met_by(&[0x0000_1000, 1, 0, 0]));

        // Exactly equal meets the target
        assert!(target.is_met_by(&[0x0000_1000, 0, 0, 0]));
    }

    #[test]
    fn test_difficulty() {
        // Leading value equal to DIFF_1 gives difficulty 1
        let one = Target::from_words([0x0000_FFFF, 0xFFFF_FFFF, 0, 0]);
        assert_eq!(one.difficulty(), 1.0);

        // Halving the target doubles the difficulty
        let two = Target::from_words([0x0000_7FFF, 0xFFFF_FFFF, 0, 0]);
        assert!((two.difficulty() - 2.0).abs() < 1e-9);

        // Trailing words do not participate
        let three = Target::from_words([0x0000_FFFF, 0xFFFF_FFFF, 5, 5]);
        assert_eq!(three.difficulty(), 1.0);
    }

    #[test]
    fn test_zero_target_is_maximal_difficulty() {
        let zero = Target::from_words([0, 0, 7, 7]);
        assert_eq!(zero.difficulty(), DIFF_1);
    }
}
