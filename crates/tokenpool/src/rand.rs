use ::rand::{Rng, rng};
use uuid::Uuid;

/// Largest value [`random_number`] draws.
pub const MAX_RANDOM_NUMBER: u64 = 999_999_999_999;

/// A source of random values.
pub trait RandSource<T> {
    /// Returns a random value.
    fn rand(&self) -> T;
}

/// A [`RandSource`] that uses the thread-local RNG (`rand::rng()`).
///
/// Each thread owns its generator, so callers never contend on a lock.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandSource<u64> for ThreadRandom {
    fn rand(&self) -> u64 {
        rng().random_range(1..=MAX_RANDOM_NUMBER)
    }
}

impl<T, R> RandSource<T> for &R
where
    R: RandSource<T> + ?Sized,
{
    fn rand(&self) -> T {
        (**self).rand()
    }
}

/// Returns a fresh random name: a hyphenated UUID v4.
///
/// Used for store identifiers and supply correlation ids. Safe to call from
/// any number of threads at once.
pub fn random_name() -> String {
    Uuid::new_v4().to_string()
}

/// Draws a number in `1..=MAX_RANDOM_NUMBER` from `source`.
pub fn random_number<R: RandSource<u64>>(source: &R) -> u64 {
    source.rand().clamp(1, MAX_RANDOM_NUMBER)
}
