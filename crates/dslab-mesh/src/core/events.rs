//! Simulation events.

// SCHEDULER EVENTS ////////////////////////////////////////////////////////////////////////////////

pub mod scheduler {
    use serde::Serialize;

    /// Runs one duty cycle of the allocation scheduler.
    #[derive(Serialize, Clone)]
    pub struct EpochTick {}
}

// FABRIC EVENTS ///////////////////////////////////////////////////////////////////////////////////

pub mod fabric {
    use serde::Serialize;

    /// Re-prices all mesh nodes.
    #[derive(Serialize, Clone)]
    pub struct PriceUpdate {}
}
