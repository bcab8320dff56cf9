//! Entry point for running mesh allocation simulations.

use std::cell::RefCell;
use std::rc::Rc;

use sugars::{rc, refcell};

use dslab_core::context::SimulationContext;
use dslab_core::simulation::Simulation;
use dslab_core::log_info;

use crate::core::common::Epoch;
use crate::core::config::SimulationConfig;
use crate::core::events::fabric::PriceUpdate;
use crate::core::events::scheduler::EpochTick;
use crate::core::fabric::GridFabric;
use crate::core::fabric_manager::FabricManager;
use crate::core::price_model::price_model_resolver;
use crate::core::scheduler::AllocationScheduler;
use crate::core::workload::{ArrivalTable, WorkloadGenerator};

/// Wires the fabric, its price supplier and the allocation scheduler into a DSLab simulation.
///
/// Simulation time is measured in epochs: the scheduler runs its duty cycle at every integer time point from zero
/// to the configured simulation length.
pub struct MeshSimulation {
    fabric: Rc<RefCell<GridFabric>>,
    fabric_manager: Rc<RefCell<FabricManager>>,
    scheduler: Rc<RefCell<AllocationScheduler>>,
    sim: Simulation,
    ctx: SimulationContext,
    sim_config: Rc<SimulationConfig>,
}

impl MeshSimulation {
    /// Creates simulation with the workload produced by the configured generator.
    pub fn new(sim: Simulation, sim_config: SimulationConfig) -> Self {
        let topology = sim_config.topology();
        let workload = WorkloadGenerator::new(sim_config.workload(), &topology).generate_table();
        Self::with_workload(sim, sim_config, workload)
    }

    /// Creates simulation with the given workload.
    pub fn with_workload(mut sim: Simulation, sim_config: SimulationConfig, workload: ArrivalTable) -> Self {
        sim_config.validate();
        let sim_config = rc!(sim_config);
        let fabric = rc!(refcell!(GridFabric::new(sim_config.topology(), sim_config.initial_price)));

        let price_model = price_model_resolver(&sim_config.price_model, sim_config.seed);
        let fabric_manager = rc!(refcell!(FabricManager::new(
            fabric.clone(),
            price_model,
            sim.create_context("fabric"),
            sim_config.clone(),
        )));
        let fabric_manager_id = sim.add_handler("fabric", fabric_manager.clone());

        let app_count: usize = workload.values().map(|apps| apps.len()).sum();
        let scheduler = rc!(refcell!(AllocationScheduler::new(
            workload,
            fabric.clone(),
            sim.create_context("scheduler"),
            sim_config.clone(),
        )));
        let scheduler_id = sim.add_handler("scheduler", scheduler.clone());

        let mut ctx = sim.create_context("simulation");
        // prices must be in place before the first scheduler epoch
        ctx.emit_now(PriceUpdate {}, fabric_manager_id);
        ctx.emit_now(EpochTick {}, scheduler_id);
        log_info!(
            ctx,
            "created {}x{} mesh with {} applications, price model {}",
            sim_config.grid_width,
            sim_config.grid_height,
            app_count,
            sim_config.price_model
        );

        Self {
            fabric,
            fabric_manager,
            scheduler,
            sim,
            ctx,
            sim_config,
        }
    }

    pub fn fabric(&self) -> Rc<RefCell<GridFabric>> {
        self.fabric.clone()
    }

    pub fn fabric_manager(&self) -> Rc<RefCell<FabricManager>> {
        self.fabric_manager.clone()
    }

    pub fn scheduler(&self) -> Rc<RefCell<AllocationScheduler>> {
        self.scheduler.clone()
    }

    pub fn sim_config(&self) -> Rc<SimulationConfig> {
        self.sim_config.clone()
    }

    /// Returns the simulation context used for logging by the simulation driver.
    pub fn context(&self) -> &SimulationContext {
        &self.ctx
    }

    pub fn current_time(&self) -> f64 {
        self.sim.time()
    }

    /// Returns the last epoch processed so far.
    pub fn current_epoch(&self) -> Epoch {
        self.sim.time().round() as Epoch
    }

    /// Performs a single simulation step.
    pub fn step(&mut self) -> bool {
        self.sim.step()
    }

    /// Performs the specified number of steps through the simulation.
    pub fn steps(&mut self, step_count: u64) -> bool {
        self.sim.steps(step_count)
    }

    /// Steps through the simulation with duration limit.
    pub fn step_for_duration(&mut self, duration: f64) -> bool {
        self.sim.step_for_duration(duration)
    }

    /// Runs the simulation up to the configured simulation length.
    pub fn step_until_no_events(&mut self) {
        self.sim.step_until_no_events();
    }
}
