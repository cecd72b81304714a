//! Random values for statement templates.
//!
//! Every worker owns its own [`RandomSource`]; there is no shared generator.
//! Seeds are derived from the master seed and the worker index, so a fixed
//! master seed reproduces each worker's stream.

use chrono::DateTime;
use rand::distributions::{Alphanumeric, DistString};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Exp1, StandardNormal};

/// 1969-12-31T00:00:00Z
const DATE_MIN_SECS: i64 = -86_400;
/// 2022-12-31T00:00:00Z
const DATE_MAX_SECS: i64 = 1_672_444_800;

pub fn per_worker_seed(master_seed: u64, worker: usize) -> u64 {
    master_seed
        .wrapping_add(worker as u64)
        .wrapping_mul(0x517cc1b727220a95)
}

#[derive(Clone, Debug)]
pub struct RandomSource {
    rng: ChaCha8Rng,
}

impl RandomSource {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn for_worker(master_seed: u64, worker: usize) -> Self {
        Self::from_seed(per_worker_seed(master_seed, worker))
    }

    pub fn reseed(&mut self, seed: i64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed as u64);
    }

    /// Uniform in `[min, max)`. Caller guarantees `min < max`.
    pub fn int_between(&mut self, min: i64, max: i64) -> i64 {
        self.rng.gen_range(min..max)
    }

    pub fn float_between(&mut self, min: f64, max: f64) -> f64 {
        min + self.float64() * (max - min)
    }

    /// Alphanumeric string with a length in `[min_len, max_len]`.
    pub fn string(&mut self, min_len: usize, max_len: usize) -> String {
        let len = self.rng.gen_range(min_len..=max_len);
        Alphanumeric.sample_string(&mut self.rng, len)
    }

    /// Calendar date formatted as `YYYY-MM-DD`.
    pub fn date(&mut self) -> String {
        let secs = self.rng.gen_range(DATE_MIN_SECS..DATE_MAX_SECS);
        DateTime::from_timestamp(secs, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    }

    /// Uniform in `[0, 2^63)`.
    pub fn int63(&mut self) -> i64 {
        (self.rng.gen::<u64>() >> 1) as i64
    }

    /// Uniform in `[0, n)`. Caller guarantees `n > 0`.
    pub fn int63n(&mut self, n: i64) -> i64 {
        self.rng.gen_range(0..n)
    }

    pub fn float32(&mut self) -> f32 {
        self.rng.gen()
    }

    pub fn float64(&mut self) -> f64 {
        self.rng.gen()
    }

    pub fn exp_float64(&mut self) -> f64 {
        self.rng.sample(Exp1)
    }

    pub fn norm_float64(&mut self) -> f64 {
        self.rng.sample(StandardNormal)
    }
}

/// Subquery selecting one random id of `entity` in the given dialect.
pub fn random_id(entity: &str, dialect: &str) -> String {
    match dialect.to_ascii_lowercase().as_str() {
        "mysql" => format!("(SELECT {entity}Id FROM {entity} ORDER BY RAND() LIMIT 1)"),
        "postgres" | "sqlite" => {
            format!("(SELECT {entity}Id FROM {entity} ORDER BY RANDOM() LIMIT 1)")
        }
        "cypher" => format!(
            "(MATCH (x:{entity}) RETURN x.{entity}Id, rand() as rand ORDER BY rand ASC LIMIT 1)"
        ),
        _ => "1".to_string(),
    }
}
