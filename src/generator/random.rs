//! Uniform selection backed by the operating system CSPRNG.

use getrandom::fill;

use crate::error::GenerateError;

/// Source of uniformly distributed 32-bit words.
pub trait RandomSource {
    fn next_u32(&mut self) -> Result<u32, GenerateError>;
}

/// Reads from the operating system's cryptographically secure generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn next_u32(&mut self) -> Result<u32, GenerateError> {
        let mut buf = [0u8; 4];
        fill(&mut buf).map_err(|_| GenerateError::Entropy)?;
        Ok(u32::from_le_bytes(buf))
    }
}

/// Returns a uniformly distributed index in `0..bound`.
///
/// Draws below `2^32 mod bound` are rejected and redrawn, so every index
/// is equally likely.
pub fn index<R: RandomSource + ?Sized>(
    rng: &mut R,
    bound: usize,
) -> Result<usize, GenerateError> {
    if bound == 0 {
        return Err(GenerateError::EmptyPool);
    }
    let bound = u32::try_from(bound).map_err(|_| GenerateError::EmptyPool)?;
    let threshold = bound.wrapping_neg() % bound;

    loop {
        let draw = rng.next_u32()?;
        if draw >= threshold {
            return Ok((draw % bound) as usize);
        }
    }
}

/// Picks one character from `pool`.
pub fn pick<R: RandomSource + ?Sized>(rng: &mut R, pool: &[char]) -> Result<char, GenerateError> {
    let i = index(rng, pool.len())?;
    Ok(pool[i])
}

/// Fisher-Yates shuffle in place.
pub fn shuffle<R: RandomSource + ?Sized, T>(
    rng: &mut R,
    items: &mut [T],
) -> Result<(), GenerateError> {
    for i in (1..items.len()).rev() {
        let j = index(rng, i + 1)?;
        items.swap(i, j);
    }
    Ok(())
}
