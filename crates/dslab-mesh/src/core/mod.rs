//! Core components of the mesh allocation engine.

pub mod application;
pub mod common;
pub mod config;
pub mod events;
pub mod fabric;
pub mod fabric_manager;
pub mod price_model;
pub mod scheduler;
pub mod speedup;
pub mod topology;
pub mod workload;
