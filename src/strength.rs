//! Entropy-based password strength estimation.

use std::fmt;

use serde::Serialize;

use crate::generator::CharClass;

/// Entropy at which the score saturates at 100.
const FULL_SCORE_BITS: f64 = 128.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum StrengthLabel {
    VeryWeak,
    Weak,
    Medium,
    Strong,
    VeryStrong,
}

impl StrengthLabel {
    fn from_bits(bits: f64) -> Self {
        match bits {
            b if b < 20.0 => StrengthLabel::VeryWeak,
            b if b < 40.0 => StrengthLabel::Weak,
            b if b < 60.0 => StrengthLabel::Medium,
            b if b < FULL_SCORE_BITS => StrengthLabel::Strong,
            _ => StrengthLabel::VeryStrong,
        }
    }
}

impl fmt::Display for StrengthLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StrengthLabel::VeryWeak => "Very Weak",
            StrengthLabel::Weak => "Weak",
            StrengthLabel::Medium => "Medium",
            StrengthLabel::Strong => "Strong",
            StrengthLabel::VeryStrong => "Very Strong",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Strength {
    /// 0..=100
    pub score: u8,
    pub entropy_bits: f64,
    pub label: StrengthLabel,
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.1} bits, score {}/100)",
            self.label, self.entropy_bits, self.score
        )
    }
}

/// Sum of the full alphabet sizes of every class that appears in `password`.
pub fn alphabet_size(password: &str) -> usize {
    let mut seen = [false; 4];
    for c in password.chars() {
        let slot = match CharClass::of(c) {
            CharClass::Upper => 0,
            CharClass::Lower => 1,
            CharClass::Digit => 2,
            CharClass::Symbol => 3,
        };
        seen[slot] = true;
    }

    CharClass::ALL
        .iter()
        .zip(seen)
        .filter(|(_, present)| *present)
        .map(|(class, _)| class.size())
        .sum()
}

pub fn entropy_bits(length: usize, alphabet: usize) -> f64 {
    if alphabet == 0 {
        return 0.0;
    }
    length as f64 * (alphabet as f64).log2()
}

/// Scores a password. An empty password is `VeryWeak` with score 0.
pub fn score(password: &str) -> Strength {
    let bits = entropy_bits(password.chars().count(), alphabet_size(password));
    let score = (bits * 100.0 / FULL_SCORE_BITS).floor().min(100.0) as u8;

    Strength {
        score,
        entropy_bits: bits,
        label: StrengthLabel::from_bits(bits),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_password_is_very_weak() {
        let s = score("");
        assert_eq!(s.score, 0);
        assert_eq!(s.entropy_bits, 0.0);
        assert_eq!(s.label, StrengthLabel::VeryWeak);
    }

    #[test]
    fn alphabet_counts_observed_classes_once() {
        assert_eq!(alphabet_size("aaaa"), 26);
        assert_eq!(alphabet_size("aA"), 52);
        assert_eq!(alphabet_size("a1"), 36);
        assert_eq!(alphabet_size("aA1!"), 88);
        assert_eq!(alphabet_size("€"), 26);
    }

    #[test]
    fn label_cut_points() {
        // 26 ** 4 ~ 18.8 bits
        assert_eq!(score("abcd").label, StrengthLabel::VeryWeak);
        // 36 ** 8 ~ 41.4 bits
        assert_eq!(score("abcd1234").label, StrengthLabel::Medium);
        // 88 ** 12 ~ 77.5 bits
        assert_eq!(score("aB3!aB3!aB3!").label, StrengthLabel::Strong);
        // 88 ** 20 ~ 129.2 bits
        let s = score("aB3!aB3!aB3!aB3!aB3!");
        assert_eq!(s.label, StrengthLabel::VeryStrong);
        assert_eq!(s.score, 100);
    }

    #[test]
    fn label_display() {
        assert_eq!(StrengthLabel::VeryStrong.to_string(), "Very Strong");
        assert!(score("abcd").to_string().starts_with("Very Weak"));
    }

    proptest! {
        #[test]
        fn longer_is_never_weaker(password in "[a-zA-Z0-9!@#]{0,40}", extra in "[a-z]{1,5}") {
            // Appending lowercase to a password that already has it keeps the alphabet fixed.
            let base = format!("a{password}");
            let longer = format!("{base}{extra}");
            prop_assert!(score(&longer).score >= score(&base).score);
            prop_assert!(score(&longer).label >= score(&base).label);
        }

        #[test]
        fn more_classes_is_never_weaker(len in 3usize..40) {
            let one = "a".repeat(len);
            let two = format!("{}1", "a".repeat(len - 1));
            let three = format!("A{}1", "a".repeat(len - 2));
            prop_assert!(score(&two).entropy_bits >= score(&one).entropy_bits);
            prop_assert!(score(&three).entropy_bits >= score(&two).entropy_bits);
        }
    }
}
