//! Random sizing primitives used by world generation.
//!
//! Every function takes the random source explicitly so that a seeded generator
//! reproduces the exact same world.

use base64::{engine::general_purpose::URL_SAFE, Engine};
use rand::Rng;

/// Draw from a normal distribution with mean `avg` and deviation `dev`, then clamp the
/// truncated result to `[min, max]` (inclusive).
///
/// The clamp is applied after sampling, lower bound first, so `min > max` yields `max`
/// instead of panicking.
pub fn norm<R: Rng>(rng: &mut R, avg: i64, dev: i64, min: i64, max: i64) -> i64 {
    let sample = (standard_normal(rng) * dev as f64 + avg as f64) as i64;
    let mut result = sample;
    if result < min {
        result = min;
    }
    if result > max {
        result = max;
    }
    result
}

/// Same as [`norm`] for sizes and counts.
pub fn norm_usize<R: Rng>(
    rng: &mut R,
    avg: usize,
    dev: usize,
    min: usize,
    max: usize,
) -> usize {
    norm(rng, avg as i64, dev as i64, min as i64, max as i64).max(0) as usize
}

/// `n` random bytes, url-safe base64 encoded.
pub fn random_token<R: Rng>(rng: &mut R, n: usize) -> String {
    let bytes = (0..n).map(|_| rng.random::<u8>()).collect::<Vec<_>>();
    URL_SAFE.encode(bytes)
}

// Box-Muller
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1 = rng.random::<f64>().clamp(f64::MIN_POSITIVE, 1.0);
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn norm_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10_000 {
            let v = norm(&mut rng, 50, 25, 10, 100);
            assert!((10..=100).contains(&v), "{v} out of bounds");
        }
    }

    #[test]
    fn norm_without_deviation_is_the_mean() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(norm(&mut rng, 3, 0, 1, 5), 3);
        assert_eq!(norm(&mut rng, 30, 0, 1, 5), 5);
        assert_eq!(norm(&mut rng, -3, 0, 1, 5), 1);
    }

    #[test]
    fn inverted_bounds_clamp_to_max() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(norm(&mut rng, 4, 0, 2, 1), 1);
    }

    #[test]
    fn seeded_sources_agree() {
        let a = random_token(&mut StdRng::seed_from_u64(42), 16);
        let b = random_token(&mut StdRng::seed_from_u64(42), 16);
        assert_eq!(a, b);
        // 16 bytes -> 24 base64 chars with padding
        assert_eq!(a.len(), 24);
    }
}
