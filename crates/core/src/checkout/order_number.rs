//! Human readable order numbers.
//!
//! An order number is the creation time in unix seconds followed by a run of
//! random uppercase letters, e.g. `1767225600QXKD`. Uniqueness is enforced by
//! the caller, which regenerates until the store reports no collision.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Default number of trailing letters.
pub const DEFAULT_LETTERS: usize = 4;

/// A generated order number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for OrderNumber {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Source of candidate order numbers.
///
/// Owns its RNG (`StdRng` is `Send`) so it can live across `.await` points in
/// a request handler.
#[derive(Debug, Clone)]
pub struct OrderNumberGenerator {
    letters: usize,
    rng: StdRng,
}

impl OrderNumberGenerator {
    /// Generator seeded from the operating system.
    #[must_use]
    pub fn new(letters: usize) -> Self {
        Self {
            letters,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic generator, for reproducible sequences.
    #[must_use]
    pub fn seeded(letters: usize, seed: u64) -> Self {
        Self {
            letters,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Next candidate for an order placed at `now`.
    pub fn next_candidate(&mut self, now: DateTime<Utc>) -> OrderNumber {
        let mut number = now.timestamp().to_string();
        number.extend((0..self.letters).map(|_| char::from(self.rng.random_range(b'A'..=b'Z'))));
        OrderNumber(number)
    }
}
