use rand::Rng;
use rand_distr::{Distribution, Exp};

/// Alphabet for opaque identifiers (uppercase alphanumerics).
const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Draw from an exponential distribution with the given mean.
///
/// Means come from configuration and link capacities, both strictly
/// positive; a degenerate mean yields a zero delay rather than a panic.
pub fn exponential<R: Rng + ?Sized>(rng: &mut R, mean: f64) -> f64 {
    match Exp::new(1.0 / mean) {
        Ok(dist) => dist.sample(rng),
        Err(_) => 0.0,
    }
}

/// Uniformly random opaque id of `len` characters.
pub fn random_id<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn random_id_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let id = random_id(&mut rng, 8);
        assert_eq!(id.len(), 8);
        assert!(id.bytes().all(|b| ID_ALPHABET.contains(&b)));
    }

    #[test]
    fn exponential_mean_within_five_percent() {
        let mut rng = StdRng::seed_from_u64(42);
        let mean = 1_000.0;
        let n = 10_000;
        let total: f64 = (0..n).map(|_| exponential(&mut rng, mean)).sum();
        let sample_mean = total / n as f64;
        assert!(
            (sample_mean - mean).abs() / mean < 0.05,
            "sample mean {sample_mean} too far from {mean}"
        );
    }

    #[test]
    fn exponential_is_nonnegative() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1_000 {
            assert!(exponential(&mut rng, 12.5) >= 0.0);
        }
    }
}
