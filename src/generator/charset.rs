//! Character classes and pool building for password generation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::GenerateError;

const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const DIGITS: &str = "0123456789";
const SYMBOLS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

/// One of the four character categories a password can draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharClass {
    Upper,
    Lower,
    Digit,
    Symbol,
}

impl CharClass {
    /// Canonical order used when concatenating class alphabets.
    pub const ALL: [CharClass; 4] = [
        CharClass::Upper,
        CharClass::Lower,
        CharClass::Digit,
        CharClass::Symbol,
    ];

    pub fn alphabet(self) -> &'static str {
        match self {
            CharClass::Upper => UPPERCASE,
            CharClass::Lower => LOWERCASE,
            CharClass::Digit => DIGITS,
            CharClass::Symbol => SYMBOLS,
        }
    }

    /// Number of characters in the full, unfiltered alphabet.
    pub fn size(self) -> usize {
        self.alphabet().len()
    }

    /// Classifies a single character. Anything that is not an ASCII letter
    /// or digit counts as a symbol.
    pub fn of(c: char) -> CharClass {
        if c.is_ascii_uppercase() {
            CharClass::Upper
        } else if c.is_ascii_lowercase() {
            CharClass::Lower
        } else if c.is_ascii_digit() {
            CharClass::Digit
        } else {
            CharClass::Symbol
        }
    }

    pub fn contains(self, c: char) -> bool {
        self.alphabet().contains(c)
    }

    fn index(self) -> usize {
        match self {
            CharClass::Upper => 0,
            CharClass::Lower => 1,
            CharClass::Digit => 2,
            CharClass::Symbol => 3,
        }
    }
}

/// Characters dropped from each class when ambiguous characters are avoided.
///
/// The default table removes `O I` from uppercase, `l` from lowercase,
/// `0 1` from digits and `|` from symbols, i.e. the set `0 O 1 I l |`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguityPolicy {
    per_class: [String; 4],
}

impl Default for AmbiguityPolicy {
    fn default() -> Self {
        Self {
            per_class: [
                "OI".to_string(),
                "l".to_string(),
                "01".to_string(),
                "|".to_string(),
            ],
        }
    }
}

impl AmbiguityPolicy {
    /// Applies the same set of characters to every class.
    pub fn from_chars(chars: &str) -> Self {
        let set = chars.to_string();
        Self {
            per_class: [set.clone(), set.clone(), set.clone(), set],
        }
    }

    /// Replaces the ambiguous characters of a single class.
    pub fn with_class(mut self, class: CharClass, chars: &str) -> Self {
        self.per_class[class.index()] = chars.to_string();
        self
    }

    pub fn chars_for(&self, class: CharClass) -> &str {
        &self.per_class[class.index()]
    }

    pub fn is_ambiguous(&self, class: CharClass, c: char) -> bool {
        self.chars_for(class).contains(c)
    }
}

/// The filtered alphabets for one generation call.
#[derive(Debug, Clone)]
pub struct Pool {
    classes: Vec<(CharClass, Vec<char>)>,
    chars: Vec<char>,
}

impl Pool {
    /// Builds the effective pool from the enabled classes.
    ///
    /// Classes are visited in canonical order regardless of how they were
    /// given, duplicates collapse, and every class loses its ambiguous
    /// characters (when `avoid_ambiguous` is set) and every excluded
    /// character.
    pub fn build(
        classes: &[CharClass],
        excluded: &BTreeSet<char>,
        avoid_ambiguous: bool,
        ambiguity: &AmbiguityPolicy,
    ) -> Result<Self, GenerateError> {
        let enabled: BTreeSet<CharClass> = classes.iter().copied().collect();

        let mut per_class = Vec::with_capacity(enabled.len());
        let mut chars = Vec::new();

        for class in CharClass::ALL.into_iter().filter(|c| enabled.contains(c)) {
            let alphabet: Vec<char> = class
                .alphabet()
                .chars()
                .filter(|&c| !(avoid_ambiguous && ambiguity.is_ambiguous(class, c)))
                .filter(|c| !excluded.contains(c))
                .collect();

            chars.extend_from_slice(&alphabet);
            per_class.push((class, alphabet));
        }

        if chars.is_empty() {
            return Err(GenerateError::EmptyPool);
        }

        Ok(Self {
            classes: per_class,
            chars,
        })
    }

    /// Every character eligible for selection, in class order.
    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Enabled classes that still have characters after filtering.
    pub fn required_classes(&self) -> impl Iterator<Item = (CharClass, &[char])> {
        self.classes
            .iter()
            .filter(|(_, alphabet)| !alphabet.is_empty())
            .map(|(class, alphabet)| (*class, alphabet.as_slice()))
    }

    pub fn alphabet(&self, class: CharClass) -> Option<&[char]> {
        self.classes
            .iter()
            .find(|(c, _)| *c == class)
            .map(|(_, alphabet)| alphabet.as_slice())
    }
}
