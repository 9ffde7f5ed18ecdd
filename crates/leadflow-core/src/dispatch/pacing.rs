//! Pacing engine
//!
//! Computes human-like inter-send delays. Gaussian mode clusters delays
//! around the midpoint of the configured band instead of spreading them
//! uniformly, which reads less like a bot cadence. No I/O.

use leadflow_storage::models::DelayConfig;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Sample the next inter-send delay, clamped to
/// `[min_delay_ms, max_delay_ms]` inclusive.
pub fn next_delay_ms<R: Rng + ?Sized>(config: &DelayConfig, rng: &mut R) -> u64 {
    let min = config.min_delay_ms;
    let max = config.max_delay_ms;

    if min >= max {
        return min;
    }

    if config.gaussian {
        let mean = (min + max) as f64 / 2.0;
        // range/6 puts ~99.7% of unclamped samples inside the band.
        let std_dev = (max - min) as f64 / 6.0;
        match Normal::new(mean, std_dev) {
            Ok(normal) => {
                let sample = normal.sample(rng);
                sample.round().clamp(min as f64, max as f64) as u64
            }
            Err(_) => rng.gen_range(min..=max),
        }
    } else {
        rng.gen_range(min..=max)
    }
}

/// Cumulative send offsets for a batch of `n` leads, sampled
/// sequentially. Offsets are non-decreasing by construction; lead `i`
/// is positioned at the sum of the first `i` delays.
pub fn cumulative_offsets<R: Rng + ?Sized>(config: &DelayConfig, n: usize, rng: &mut R) -> Vec<u64> {
    let mut offsets = Vec::with_capacity(n);
    let mut total = 0u64;
    for _ in 0..n {
        total = total.saturating_add(next_delay_ms(config, rng));
        offsets.push(total);
    }
    offsets
}
