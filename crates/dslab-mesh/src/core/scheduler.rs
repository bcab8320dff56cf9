//! Component driving the market-based allocation of mesh nodes.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use indexmap::IndexSet;
use serde::Serialize;

use dslab_core::cast;
use dslab_core::context::SimulationContext;
use dslab_core::event::Event;
use dslab_core::handler::EventHandler;
use dslab_core::{log_debug, log_trace};

use crate::core::application::{AppStatus, Application};
use crate::core::common::{sort_by_price_descending, AppId, Epoch, ExpandVerdict, NodeId, NodePrice};
use crate::core::config::{FreeListPolicy, InitialPlacement, SimulationConfig};
use crate::core::events::scheduler::EpochTick;
use crate::core::fabric::{Fabric, GridFabric};
use crate::core::workload::ArrivalTable;

/// What happened during one scheduler epoch.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct EpochSummary {
    pub epoch: Epoch,
    pub reset: bool,
    pub admitted: u32,
    pub retired: u32,
    pub placed: u32,
    pub invaded: u32,
    pub released: u32,
    pub running: u32,
    pub waiting: u32,
    pub free_nodes: u32,
    pub occupied: u32,
    pub total_spend: f64,
}

/// Scheduler admits arriving applications, gives each of them an initial node and then, every epoch, splits the
/// budget pool equally among running applications and lets each one expand or shrink its footprint.
///
/// Applications are processed in the order in which they were first seen running. This order resolves the
/// competition of several applications for the same idle node. Applications whose lifetime is over release all
/// their nodes and retire.
pub struct AllocationScheduler {
    fabric: Rc<RefCell<GridFabric>>,
    applications: BTreeMap<AppId, Application>,
    arrivals: BTreeMap<Epoch, Vec<AppId>>,
    waiting_queue: VecDeque<AppId>,
    running: IndexSet<AppId>,
    free_nodes: Vec<NodePrice>,
    budget_pool: f64,
    history: Vec<EpochSummary>,
    ctx: SimulationContext,
    sim_config: Rc<SimulationConfig>,
}

impl AllocationScheduler {
    /// Creates scheduler for the given workload.
    pub fn new(
        workload: ArrivalTable,
        fabric: Rc<RefCell<GridFabric>>,
        ctx: SimulationContext,
        sim_config: Rc<SimulationConfig>,
    ) -> Self {
        let mut applications = BTreeMap::new();
        let mut arrivals: BTreeMap<Epoch, Vec<AppId>> = BTreeMap::new();
        for (epoch, apps) in workload {
            for app in apps {
                arrivals.entry(epoch).or_default().push(app.id);
                applications.insert(app.id, app);
            }
        }
        Self {
            fabric,
            applications,
            arrivals,
            waiting_queue: VecDeque::new(),
            running: IndexSet::new(),
            free_nodes: Vec::new(),
            budget_pool: sim_config.budget_pool,
            history: Vec::new(),
            ctx,
            sim_config,
        }
    }

    /// Returns component ID.
    pub fn get_id(&self) -> u32 {
        self.ctx.id()
    }

    pub fn application(&self, id: AppId) -> Option<&Application> {
        self.applications.get(&id)
    }

    /// Returns all known applications ordered by id.
    pub fn applications(&self) -> impl Iterator<Item = &Application> {
        self.applications.values()
    }

    /// Returns running applications in processing order.
    pub fn running_apps(&self) -> Vec<AppId> {
        self.running.iter().copied().collect()
    }

    pub fn waiting_apps(&self) -> Vec<AppId> {
        self.waiting_queue.iter().copied().collect()
    }

    /// Returns the free node list, most expensive first.
    pub fn free_nodes(&self) -> &[NodePrice] {
        &self.free_nodes
    }

    pub fn budget_pool(&self) -> f64 {
        self.budget_pool
    }

    /// Returns the budget currently allowed to each running application.
    pub fn fair_share(&self) -> Option<f64> {
        if self.running.is_empty() {
            None
        } else {
            Some(self.budget_pool / self.running.len() as f64)
        }
    }

    pub fn history(&self) -> &[EpochSummary] {
        &self.history
    }

    pub fn last_summary(&self) -> Option<&EpochSummary> {
        self.history.last()
    }

    /// Runs the duty cycle of a single epoch.
    ///
    /// While the reset signal is raised the budget pool is re-initialized and nothing else happens.
    pub fn on_epoch(&mut self, epoch: Epoch, reset: bool) -> EpochSummary {
        let mut summary = EpochSummary {
            epoch,
            reset,
            ..Default::default()
        };
        if reset {
            self.budget_pool = self.sim_config.budget_pool;
            log_trace!(self.ctx, "reset, budget pool is {}", self.budget_pool);
        } else {
            summary.admitted = self.admit_arrivals(epoch);
            summary.retired = self.retire_expired(epoch);
            if epoch % self.sim_config.free_node_refresh_interval == 0 {
                self.refresh_free_nodes();
            }
            summary.placed = self.place_waiting_apps(epoch);
            self.update_running_apps();
            self.update_money();
            let (invaded, released) = self.expand_or_shrink(epoch);
            summary.invaded = invaded;
            summary.released = released;
            self.requeue_starved_apps();
        }

        summary.running = self.running.len() as u32;
        summary.waiting = self.waiting_queue.len() as u32;
        summary.free_nodes = self.free_nodes.len() as u32;
        summary.occupied = self.fabric.borrow().occupied_count();
        summary.total_spend = self
            .running
            .iter()
            .filter_map(|id| self.applications.get(id))
            .map(|app| app.money_used())
            .sum();
        if !reset {
            log_debug!(
                self.ctx,
                "epoch {}: running {}, waiting {}, occupied {}, spend {:.3}",
                epoch,
                summary.running,
                summary.waiting,
                summary.occupied,
                summary.total_spend
            );
        }
        self.history.push(summary.clone());
        summary
    }

    /// Moves applications with arrival epoch not later than `epoch` to the waiting queue.
    fn admit_arrivals(&mut self, epoch: Epoch) -> u32 {
        let later = self.arrivals.split_off(&(epoch + 1));
        let due = std::mem::replace(&mut self.arrivals, later);
        let mut admitted = 0;
        for app_id in due.into_values().flatten() {
            if let Some(app) = self.applications.get_mut(&app_id) {
                app.status = AppStatus::Waiting;
                self.waiting_queue.push_back(app_id);
                admitted += 1;
                log_debug!(
                    self.ctx,
                    "app {} arrived: lifetime {}, parallelism {:.2}, sigma {:.2}",
                    app_id,
                    app.lifetime,
                    app.parallelism,
                    app.sigma
                );
            }
        }
        admitted
    }

    /// Releases nodes of applications whose lifetime is over.
    fn retire_expired(&mut self, epoch: Epoch) -> u32 {
        let expired: Vec<AppId> = self
            .waiting_queue
            .iter()
            .chain(self.running.iter())
            .copied()
            .filter(|id| self.applications.get(id).map_or(false, |app| app.is_expired(epoch)))
            .collect();
        if expired.is_empty() {
            return 0;
        }

        let mut fabric = self.fabric.borrow_mut();
        for app_id in &expired {
            if let Some(app) = self.applications.get_mut(app_id) {
                let released = app.release_all(&mut *fabric);
                app.status = AppStatus::Retired;
                log_debug!(self.ctx, "app {} retired, released {} nodes", app_id, released.len());
            }
            self.running.shift_remove(app_id);
        }
        self.waiting_queue.retain(|id| !expired.contains(id));
        expired.len() as u32
    }

    /// Scans the fabric for idle nodes with positive price.
    fn refresh_free_nodes(&mut self) {
        if self.sim_config.free_list_policy == FreeListPolicy::Rescan {
            self.free_nodes.clear();
        }
        let fabric = self.fabric.borrow();
        for node in fabric.topology().nodes() {
            if !fabric.is_occupied(node) && fabric.price(node) > 0. {
                self.free_nodes.push(NodePrice::new(node, fabric.price(node)));
            }
        }
        sort_by_price_descending(&mut self.free_nodes);
        log_trace!(self.ctx, "free node list has {} entries", self.free_nodes.len());
    }

    /// Gives the first node to waiting applications in FIFO order.
    fn place_waiting_apps(&mut self, epoch: Epoch) -> u32 {
        let mut placed = 0;
        let mut fabric = self.fabric.borrow_mut();
        while let Some(&app_id) = self.waiting_queue.front() {
            let node = match take_free_node(&mut self.free_nodes, &fabric, self.sim_config.initial_placement) {
                Some(node) => node,
                None => break,
            };
            self.waiting_queue.pop_front();
            if let Some(app) = self.applications.get_mut(&app_id) {
                app.invade(node, &mut *fabric, epoch);
                app.mapping_time.get_or_insert(epoch);
                app.status = AppStatus::Active;
                placed += 1;
                log_debug!(
                    self.ctx,
                    "mapped app {} to node {} with price {:.3}",
                    app_id,
                    node,
                    fabric.price(node)
                );
            }
        }
        placed
    }

    /// Adds owners of occupied nodes to the running set.
    fn update_running_apps(&mut self) {
        let fabric = self.fabric.borrow();
        for node in fabric.topology().nodes() {
            if let Some(owner) = fabric.owner(node) {
                if self.running.insert(owner) {
                    log_trace!(self.ctx, "app {} is running", owner);
                }
            }
        }
    }

    /// Splits the budget pool equally among running applications.
    fn update_money(&mut self) {
        let share = match self.fair_share() {
            Some(share) => share,
            None => return,
        };
        for app_id in &self.running {
            if let Some(app) = self.applications.get_mut(app_id) {
                app.set_money_allowed(share);
            }
        }
    }

    /// Lets every running application expand within its budget or shrink back into it.
    ///
    /// Returns the number of invaded and released nodes.
    fn expand_or_shrink(&mut self, epoch: Epoch) -> (u32, u32) {
        let mut invaded = 0;
        let mut released = 0;
        let mut fabric = self.fabric.borrow_mut();
        for app_id in &self.running {
            let app = match self.applications.get_mut(app_id) {
                Some(app) => app,
                None => continue,
            };
            app.refresh_spend(&*fabric);
            if app.is_under_budget() {
                match app.expand(&mut *fabric, epoch) {
                    ExpandVerdict::Expanded(nodes) => {
                        invaded += nodes.len() as u32;
                        log_debug!(
                            self.ctx,
                            "app {} invaded {:?}, holds {} nodes, spend {:.3}/{:.3}, speedup {:.3}",
                            app_id,
                            nodes,
                            app.core_count(),
                            app.money_used(),
                            app.money_allowed(),
                            app.current_speedup()
                        );
                    }
                    verdict => {
                        log_trace!(self.ctx, "app {} can't expand: {:?}", app_id, verdict);
                    }
                }
            } else {
                let nodes = app.shrink(&mut *fabric);
                if !nodes.is_empty() {
                    released += nodes.len() as u32;
                    log_debug!(
                        self.ctx,
                        "app {} retreated from {:?}, holds {} nodes, spend {:.3}/{:.3}, speedup {:.3}",
                        app_id,
                        nodes,
                        app.core_count(),
                        app.money_used(),
                        app.money_allowed(),
                        app.current_speedup()
                    );
                }
            }
        }
        (invaded, released)
    }

    /// Moves running applications left without nodes back to the waiting queue.
    fn requeue_starved_apps(&mut self) {
        let starved: Vec<AppId> = self
            .running
            .iter()
            .copied()
            .filter(|id| self.applications.get(id).map_or(false, |app| app.core_count() == 0))
            .collect();
        for app_id in starved {
            self.running.shift_remove(&app_id);
            if let Some(app) = self.applications.get_mut(&app_id) {
                app.status = AppStatus::Waiting;
            }
            self.waiting_queue.push_back(app_id);
            log_debug!(self.ctx, "app {} lost all nodes and waits for placement", app_id);
        }
    }

    fn on_epoch_tick(&mut self) {
        let epoch = self.ctx.time().round() as Epoch;
        let reset = epoch < self.sim_config.reset_epochs;
        self.on_epoch(epoch, reset);
        if epoch < self.sim_config.simulation_length {
            self.ctx.emit_self(EpochTick {}, 1.);
        }
    }
}

/// Takes an entry from the free node list skipping nodes which became occupied or unpriced since the last refresh.
fn take_free_node(free_nodes: &mut Vec<NodePrice>, fabric: &GridFabric, placement: InitialPlacement) -> Option<NodeId> {
    loop {
        let entry = match placement {
            InitialPlacement::MostExpensive => {
                if free_nodes.is_empty() {
                    return None;
                }
                free_nodes.remove(0)
            }
            InitialPlacement::Cheapest => free_nodes.pop()?,
        };
        if !fabric.is_occupied(entry.id) && fabric.price(entry.id) > 0. {
            return Some(entry.id);
        }
    }
}

impl EventHandler for AllocationScheduler {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            EpochTick {} => {
                self.on_epoch_tick();
            }
        })
    }
}
