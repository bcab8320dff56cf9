//! Simulation configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::common::Epoch;
use crate::core::topology::{GridTopology, MAX_GRID_DIM};
use crate::core::workload::WorkloadConfig;

/// How the scheduler maintains its list of free nodes on periodic refresh.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Clone, Copy)]
pub enum FreeListPolicy {
    /// Clear the list before scanning the fabric.
    Rescan,
    /// Append freshly found nodes to the existing list, keeping stale entries.
    Accumulate,
}

/// Which free node a newly arrived application receives.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Clone, Copy)]
pub enum InitialPlacement {
    MostExpensive,
    Cheapest,
}

/// Holds raw simulation config parsed from YAML file.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize, Clone)]
struct RawSimulationConfig {
    pub grid_width: Option<u32>,
    pub grid_height: Option<u32>,
    pub seed: Option<u64>,
    pub rho: Option<f64>,
    pub log_tmin: Option<f64>,
    pub log_tmax: Option<f64>,
    pub app_count: Option<u32>,
    pub first_arrival: Option<Epoch>,
    pub reset_epochs: Option<Epoch>,
    pub free_node_refresh_interval: Option<Epoch>,
    pub free_list_policy: Option<FreeListPolicy>,
    pub initial_placement: Option<InitialPlacement>,
    pub budget_pool: Option<f64>,
    pub initial_price: Option<f64>,
    pub price_model: Option<String>,
    pub price_update_period: Option<Epoch>,
    pub simulation_length: Option<Epoch>,
}

/// Represents simulation configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct SimulationConfig {
    /// Number of mesh columns.
    pub grid_width: u32,
    /// Number of mesh rows.
    pub grid_height: u32,
    /// Seed of workload generator and randomized price models.
    pub seed: u64,
    /// Target mesh utilization used to derive the arrival rate.
    pub rho: f64,
    /// Lower exponent of the log-uniform lifetime distribution.
    pub log_tmin: f64,
    /// Upper exponent of the log-uniform lifetime distribution.
    pub log_tmax: f64,
    /// Number of generated applications.
    pub app_count: u32,
    /// Epoch from which the arrival clock starts.
    pub first_arrival: Epoch,
    /// Epochs `[0, reset_epochs)` run with the reset signal raised.
    pub reset_epochs: Epoch,
    /// Period in epochs between rescans of free nodes.
    pub free_node_refresh_interval: Epoch,
    /// Free node list maintenance policy.
    pub free_list_policy: FreeListPolicy,
    /// Choice of the first node of an application.
    pub initial_placement: InitialPlacement,
    /// Budget shared equally among running applications.
    pub budget_pool: f64,
    /// Price of every node before the first price update.
    pub initial_price: f64,
    /// Price model in `Name[option=value,...]` form.
    pub price_model: String,
    /// Period in epochs between node price updates.
    pub price_update_period: Epoch,
    /// Last epoch to simulate.
    pub simulation_length: Epoch,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::from_raw(RawSimulationConfig::default())
    }
}

impl SimulationConfig {
    /// Creates simulation config by reading parameter values from YAML file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Self {
        let data = std::fs::read_to_string(file_name).unwrap_or_else(|_| panic!("Can't read file {}", file_name));
        let raw: RawSimulationConfig =
            serde_yaml::from_str(&data).unwrap_or_else(|e| panic!("Can't parse YAML from file {}: {}", file_name, e));
        Self::from_raw(raw)
    }

    /// Creates simulation config from YAML string.
    pub fn from_yaml(data: &str) -> Self {
        let raw: RawSimulationConfig =
            serde_yaml::from_str(data).unwrap_or_else(|e| panic!("Can't parse YAML config: {}", e));
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSimulationConfig) -> Self {
        let config = Self {
            grid_width: raw.grid_width.unwrap_or(4),
            grid_height: raw.grid_height.unwrap_or(4),
            seed: raw.seed.unwrap_or(36),
            rho: raw.rho.unwrap_or(0.5),
            log_tmin: raw.log_tmin.unwrap_or(3.),
            log_tmax: raw.log_tmax.unwrap_or(13.),
            app_count: raw.app_count.unwrap_or(100),
            first_arrival: raw.first_arrival.unwrap_or(0),
            reset_epochs: raw.reset_epochs.unwrap_or(1),
            free_node_refresh_interval: raw.free_node_refresh_interval.unwrap_or(10),
            free_list_policy: raw.free_list_policy.unwrap_or(FreeListPolicy::Rescan),
            initial_placement: raw.initial_placement.unwrap_or(InitialPlacement::MostExpensive),
            budget_pool: raw.budget_pool.unwrap_or(1.),
            initial_price: raw.initial_price.unwrap_or(0.1),
            price_model: raw
                .price_model
                .unwrap_or_else(|| "Uniform[min=0.05,max=0.5]".to_string()),
            price_update_period: raw.price_update_period.unwrap_or(10),
            simulation_length: raw.simulation_length.unwrap_or(100_000),
        };
        config.validate();
        config
    }

    /// Panics if some parameter is out of its valid range.
    pub fn validate(&self) {
        let valid_dim = |dim: u32| (1..=MAX_GRID_DIM).contains(&dim);
        if !valid_dim(self.grid_width) || !valid_dim(self.grid_height) {
            panic!(
                "Invalid config: mesh size {}x{}, each dimension must be in 1..={}",
                self.grid_width, self.grid_height, MAX_GRID_DIM
            );
        }
        if self.rho <= 0. {
            panic!("Invalid config: rho must be positive, got {}", self.rho);
        }
        if self.log_tmax <= self.log_tmin {
            panic!(
                "Invalid config: log_tmax ({}) must be greater than log_tmin ({})",
                self.log_tmax, self.log_tmin
            );
        }
        if self.free_node_refresh_interval == 0 || self.price_update_period == 0 {
            panic!("Invalid config: refresh interval and price update period must be positive");
        }
        if self.budget_pool < 0. || self.initial_price < 0. {
            panic!("Invalid config: budget pool and initial price must be non-negative");
        }
    }

    pub fn topology(&self) -> GridTopology {
        GridTopology::new(self.grid_width, self.grid_height)
    }

    /// Returns workload generator parameters.
    pub fn workload(&self) -> WorkloadConfig {
        WorkloadConfig {
            seed: self.seed,
            rho: self.rho,
            log_tmin: self.log_tmin,
            log_tmax: self.log_tmax,
            app_count: self.app_count,
            first_arrival: self.first_arrival,
        }
    }
}

/// Parses config value string, which consists of two parts - name and options.
/// Example: `Uniform[min=0.1,max=0.5]` parts are name `Uniform` and options string `min=0.1,max=0.5`.
pub fn parse_config_value(config_str: &str) -> (String, Option<String>) {
    match config_str.split_once('[') {
        Some((l, r)) => (l.trim().to_string(), Some(r.replace(']', ""))),
        None => (config_str.trim().to_string(), None),
    }
}

/// Parses options string from config value, returns map with option names and values.
pub fn parse_options(options_str: &str) -> HashMap<String, String> {
    let mut options = HashMap::new();
    for option_str in options_str.split(',') {
        if let Some((name, value)) = option_str.split_once('=') {
            options.insert(name.trim().to_string(), value.trim().to_string());
        }
    }
    options
}
