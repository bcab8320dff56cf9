//! Stochastic workload generation.
//!
//! Applications have log-uniform lifetimes and parallelism, uniform variability and exponentially distributed
//! inter-arrival times. The arrival rate is derived from the target utilization `rho` so that, on average,
//! `rho * maxpar` nodes worth of lifetime arrive per mean lifetime.

use std::collections::BTreeMap;

use rand::prelude::*;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::core::application::Application;
use crate::core::common::{AppId, Epoch};
use crate::core::topology::GridTopology;

/// Applications keyed by arrival epoch. Applications sharing an epoch are kept in generation order.
pub type ArrivalTable = BTreeMap<Epoch, Vec<Application>>;

/// Parameters of the workload model.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct WorkloadConfig {
    pub seed: u64,
    /// Target utilization of the mesh.
    pub rho: f64,
    /// Lifetimes are drawn from `exp(uniform(log_tmin, log_tmax))`.
    pub log_tmin: f64,
    pub log_tmax: f64,
    pub app_count: u32,
    /// Initial value of the arrival clock.
    pub first_arrival: Epoch,
}

impl WorkloadConfig {
    pub fn new(seed: u64, rho: f64, app_count: u32) -> Self {
        Self {
            seed,
            rho,
            log_tmin: 3.,
            log_tmax: 13.,
            app_count,
            first_arrival: 0,
        }
    }
}

pub struct WorkloadGenerator {
    config: WorkloadConfig,
    max_parallelism: f64,
    mean_lifetime: f64,
    arrival_rate: f64,
    rng: Pcg64,
}

impl WorkloadGenerator {
    pub fn new(config: WorkloadConfig, topology: &GridTopology) -> Self {
        assert!(config.rho > 0., "rho must be positive, got {}", config.rho);
        assert!(
            config.log_tmax > config.log_tmin,
            "log_tmax ({}) must be greater than log_tmin ({})",
            config.log_tmax,
            config.log_tmin
        );
        let max_parallelism = topology.node_count() as f64;
        let mean_lifetime = (config.log_tmax.exp() - config.log_tmin.exp()) / (config.log_tmax - config.log_tmin);
        let arrival_rate = config.rho * max_parallelism / mean_lifetime;
        let rng = Pcg64::seed_from_u64(config.seed);
        Self {
            config,
            max_parallelism,
            mean_lifetime,
            arrival_rate,
            rng,
        }
    }

    /// Mean of the log-uniform lifetime distribution.
    pub fn mean_lifetime(&self) -> f64 {
        self.mean_lifetime
    }

    /// Arrival rate `lambda` of the exponential inter-arrival distribution.
    pub fn arrival_rate(&self) -> f64 {
        self.arrival_rate
    }

    /// Returns a value from `exp(uniform(low, high))`.
    fn log_uniform(&mut self, low: f64, high: f64) -> f64 {
        (self.rng.gen::<f64>() * (high - low) + low).exp()
    }

    pub fn next_lifetime(&mut self) -> Epoch {
        self.log_uniform(self.config.log_tmin, self.config.log_tmax).trunc() as Epoch
    }

    pub fn next_parallelism(&mut self) -> f64 {
        self.log_uniform(0., self.max_parallelism.ln())
    }

    pub fn next_sigma(&mut self) -> f64 {
        self.rng.gen::<f64>() * 2.
    }

    /// Returns the next truncated exponential inter-arrival gap.
    pub fn next_gap(&mut self) -> Epoch {
        let mut u: f64 = self.rng.gen();
        while u == 0. {
            u = self.rng.gen();
        }
        (-u.ln() / self.arrival_rate).trunc() as Epoch
    }

    /// Generates applications with ids `0..app_count` in arrival order.
    pub fn generate(&mut self) -> Vec<Application> {
        let mut clock = self.config.first_arrival;
        let mut apps = Vec::with_capacity(self.config.app_count as usize);
        for id in 0..self.config.app_count as AppId {
            let lifetime = self.next_lifetime();
            let parallelism = self.next_parallelism();
            let sigma = self.next_sigma();
            clock += self.next_gap();
            apps.push(Application::new(id, clock, lifetime, parallelism, sigma));
        }
        apps
    }

    /// Generates applications and groups them by arrival epoch.
    pub fn generate_table(&mut self) -> ArrivalTable {
        let mut table = ArrivalTable::new();
        for app in self.generate() {
            table.entry(app.arrival).or_default().push(app);
        }
        table
    }
}

/// Generates the arrival table of `count` applications for a `width x height` mesh.
pub fn generate_workload(seed: u64, rho: f64, width: u32, height: u32, count: u32) -> ArrivalTable {
    let topology = GridTopology::new(width, height);
    WorkloadGenerator::new(WorkloadConfig::new(seed, rho, count), &topology).generate_table()
}
