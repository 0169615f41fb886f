// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/binwatch

//! Bin simulator for demo/testing

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::Uniform;

use super::state::{BinUpdate, FieldUpdate};
use crate::config::SimulationConfig;

/// Produces bounded random perturbations for one bin on each tick
pub struct BinSimulator {
    bin_id: String,
    rng: ChaCha8Rng,
    fill_step: f64,
    battery_step: f64,
    rate_step: f64,
    ticks: u64,
}

impl BinSimulator {
    pub fn new(bin_id: &str, config: &SimulationConfig) -> Self {
        let rng = match config.seed {
            // Mix the bin id in so seeded bins don't move in lockstep
            Some(seed) => ChaCha8Rng::seed_from_u64(seed ^ fnv1a(bin_id)),
            None => ChaCha8Rng::from_entropy(),
        };

        Self {
            bin_id: bin_id.to_string(),
            rng,
            fill_step: config.fill_step.max(0.0),
            battery_step: config.battery_step.max(0.0),
            rate_step: config.rate_step.max(0.0),
            ticks: 0,
        }
    }

    /// Next simulated update. Fill level is only perturbed when no live feed
    /// is authoritative for it.
    pub fn next_update(&mut self, perturb_fill: bool) -> BinUpdate {
        self.ticks += 1;

        let mut update = BinUpdate::new()
            .battery_level(FieldUpdate::Adjust(self.delta(self.battery_step)))
            .fill_rate(FieldUpdate::Adjust(self.delta(self.rate_step)));

        if perturb_fill {
            update = update.fill_level(FieldUpdate::Adjust(self.delta(self.fill_step)));
        }

        update
    }

    fn delta(&mut self, step: f64) -> f64 {
        if step > 0.0 && step.is_finite() {
            self.rng.sample(Uniform::new_inclusive(-step, step))
        } else {
            0.0
        }
    }

    pub fn bin_id(&self) -> &str {
        &self.bin_id
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed: Some(seed),
            ..SimulationConfig::default()
        }
    }

    fn within(update: &Option<FieldUpdate>, step: f64) -> bool {
        match update {
            Some(FieldUpdate::Adjust(d)) => d.abs() <= step,
            _ => false,
        }
    }

    #[test]
    fn test_deltas_are_bounded() {
        let cfg = config(7);
        let mut sim = BinSimulator::new("SB01", &cfg);

        for _ in 0..500 {
            let update = sim.next_update(true);
            assert!(within(&update.fill_level, cfg.fill_step));
            assert!(within(&update.battery_level, cfg.battery_step));
            assert!(within(&update.fill_rate, cfg.rate_step));
        }
        assert_eq!(sim.ticks(), 500);
    }

    #[test]
    fn test_fill_left_alone_when_feed_is_authoritative() {
        let mut sim = BinSimulator::new("SB01", &config(1));
        let update = sim.next_update(false);
        assert!(update.fill_level.is_none());
        assert!(update.battery_level.is_some());
        assert!(update.fill_rate.is_some());
    }

    #[test]
    fn test_seeded_simulation_is_reproducible() {
        let mut a = BinSimulator::new("SB01", &config(42));
        let mut b = BinSimulator::new("SB01", &config(42));
        for _ in 0..20 {
            assert_eq!(a.next_update(true), b.next_update(true));
        }
    }

    #[test]
    fn test_zero_step_produces_zero_delta() {
        let cfg = SimulationConfig {
            fill_step: 0.0,
            seed: Some(3),
            ..SimulationConfig::default()
        };
        let mut sim = BinSimulator::new("SB02", &cfg);
        assert_eq!(sim.next_update(true).fill_level, Some(FieldUpdate::Adjust(0.0)));
    }
}
