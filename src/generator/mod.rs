//! Constrained-random password generation.
//!
//! A [`GenerationConfig`] selects character classes, exclusions and the
//! ambiguous-character policy. With `require_all_classes` set, one character
//! of every usable class is drawn first, the remainder is filled from the
//! whole pool, and the result is shuffled so the required characters do not
//! sit at predictable positions.

pub mod charset;
pub mod random;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

pub use charset::{AmbiguityPolicy, CharClass, Pool};
pub use random::{OsRandom, RandomSource};

use crate::error::GenerateError;

pub const DEFAULT_LENGTH: usize = 20;

/// Longest password [`generate`] will produce. Longer requests fail with
/// [`GenerateError::LengthTooLarge`] before any buffer is allocated.
pub const MAX_LENGTH: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationConfig {
    length: usize,
    classes: Vec<CharClass>,
    excluded: BTreeSet<char>,
    avoid_ambiguous: bool,
    require_all_classes: bool,
    ambiguity: AmbiguityPolicy,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            length: DEFAULT_LENGTH,
            classes: CharClass::ALL.to_vec(),
            excluded: BTreeSet::new(),
            avoid_ambiguous: false,
            require_all_classes: true,
            ambiguity: AmbiguityPolicy::default(),
        }
    }
}

impl GenerationConfig {
    /// All classes enabled, one of each required.
    pub fn new(length: usize) -> Self {
        Self {
            length,
            ..Self::default()
        }
    }

    pub fn with_classes(mut self, classes: &[CharClass]) -> Self {
        self.classes = classes.to_vec();
        self
    }

    pub fn excluding(mut self, chars: &str) -> Self {
        self.excluded.extend(chars.chars());
        self
    }

    pub fn avoiding_ambiguous(mut self, avoid: bool) -> Self {
        self.avoid_ambiguous = avoid;
        self
    }

    pub fn requiring_all_classes(mut self, require: bool) -> Self {
        self.require_all_classes = require;
        self
    }

    pub fn with_ambiguity(mut self, policy: AmbiguityPolicy) -> Self {
        self.ambiguity = policy;
        self
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn classes(&self) -> &[CharClass] {
        &self.classes
    }

    pub fn excluded(&self) -> &BTreeSet<char> {
        &self.excluded
    }

    pub fn avoids_ambiguous(&self) -> bool {
        self.avoid_ambiguous
    }

    pub fn requires_all_classes(&self) -> bool {
        self.require_all_classes
    }

    pub fn ambiguity(&self) -> &AmbiguityPolicy {
        &self.ambiguity
    }

    /// Effective pool for this configuration.
    pub fn pool(&self) -> Result<Pool, GenerateError> {
        Pool::build(
            &self.classes,
            &self.excluded,
            self.avoid_ambiguous,
            &self.ambiguity,
        )
    }
}

/// Generation request as submitted by a UI collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationRequest {
    pub length: usize,
    pub use_upper: bool,
    pub use_lower: bool,
    pub use_digits: bool,
    pub use_symbols: bool,
    pub exclude_chars: String,
    pub avoid_ambiguous: bool,
    pub require_all_types: bool,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            length: DEFAULT_LENGTH,
            use_upper: true,
            use_lower: true,
            use_digits: true,
            use_symbols: true,
            exclude_chars: String::new(),
            avoid_ambiguous: false,
            require_all_types: true,
        }
    }
}

impl From<&GenerationRequest> for GenerationConfig {
    fn from(req: &GenerationRequest) -> Self {
        let classes: Vec<CharClass> = [
            (req.use_upper, CharClass::Upper),
            (req.use_lower, CharClass::Lower),
            (req.use_digits, CharClass::Digit),
            (req.use_symbols, CharClass::Symbol),
        ]
        .into_iter()
        .filter_map(|(enabled, class)| enabled.then_some(class))
        .collect();

        GenerationConfig::new(req.length)
            .with_classes(&classes)
            .excluding(&req.exclude_chars)
            .avoiding_ambiguous(req.avoid_ambiguous)
            .requiring_all_classes(req.require_all_types)
    }
}

/// Generates one password from the OS random generator.
pub fn generate(config: &GenerationConfig) -> Result<Zeroizing<String>, GenerateError> {
    generate_with(config, &mut OsRandom)
}

pub fn generate_with<R: RandomSource + ?Sized>(
    config: &GenerationConfig,
    rng: &mut R,
) -> Result<Zeroizing<String>, GenerateError> {
    if config.length > MAX_LENGTH {
        return Err(GenerateError::LengthTooLarge {
            max: MAX_LENGTH,
            length: config.length,
        });
    }

    let pool = config.pool()?;
    let mut chars: Zeroizing<Vec<char>> = Zeroizing::new(Vec::with_capacity(config.length));

    if config.require_all_classes {
        let required = pool.required_classes().count();
        if config.length < required {
            return Err(GenerateError::InsufficientLength {
                required,
                length: config.length,
            });
        }

        for (_, alphabet) in pool.required_classes() {
            chars.push(random::pick(rng, alphabet)?);
        }
    }

    while chars.len() < config.length {
        chars.push(random::pick(rng, pool.chars())?);
    }

    if config.require_all_classes {
        random::shuffle(rng, chars.as_mut_slice())?;
    }

    Ok(Zeroizing::new(chars.iter().collect()))
}

/// Generates `count` independent passwords.
pub fn generate_batch(
    config: &GenerationConfig,
    count: usize,
) -> Result<Vec<Zeroizing<String>>, GenerateError> {
    (0..count).map(|_| generate(config)).collect()
}
