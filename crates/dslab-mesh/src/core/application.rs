//! Application and its footprint on the mesh.

use std::collections::HashSet;

use serde::Serialize;

use crate::core::common::{
    sort_by_price_ascending, sort_by_price_descending, AppId, Epoch, ExpandVerdict, NodeId, NodePrice,
    BUDGET_EPSILON,
};
use crate::core::fabric::Fabric;
use crate::core::speedup::{saturation_point, speedup};
use crate::core::topology::GridTopology;

/// Lifecycle of an application as seen by the scheduler.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppStatus {
    /// Arrival epoch is known but not reached yet.
    Scheduled,
    /// Arrived and waits for its first node.
    Waiting,
    /// Holds at least one node.
    Active,
    /// Lifetime is over, all nodes are released.
    Retired,
}

/// A parallel workload competing for mesh nodes.
///
/// The application grows by invading idle neighbouring nodes while its spend stays within the allowed budget and
/// contracts by retreating from its most expensive boundary nodes when the spend exceeds the budget. Spend is the
/// sum of current prices of the held nodes.
#[derive(Serialize, Clone, Debug)]
pub struct Application {
    pub id: AppId,
    pub arrival: Epoch,
    pub lifetime: Epoch,
    /// Average parallelism `A`.
    pub parallelism: f64,
    /// Variability coefficient `sig`.
    pub sigma: f64,
    pub mapping_time: Option<Epoch>,
    pub status: AppStatus,
    cores: Vec<NodeId>,
    money_used: f64,
    money_allowed: f64,
}

impl Application {
    pub fn new(id: AppId, arrival: Epoch, lifetime: Epoch, parallelism: f64, sigma: f64) -> Self {
        Self {
            id,
            arrival,
            lifetime,
            parallelism,
            sigma,
            mapping_time: None,
            status: AppStatus::Scheduled,
            cores: Vec::new(),
            money_used: 0.,
            money_allowed: 0.,
        }
    }

    /// Nodes currently held, in invasion order.
    pub fn cores(&self) -> &[NodeId] {
        &self.cores
    }

    pub fn core_count(&self) -> u32 {
        self.cores.len() as u32
    }

    pub fn holds(&self, node: NodeId) -> bool {
        self.cores.contains(&node)
    }

    pub fn money_used(&self) -> f64 {
        self.money_used
    }

    pub fn money_allowed(&self) -> f64 {
        self.money_allowed
    }

    pub fn set_money_allowed(&mut self, money_allowed: f64) {
        self.money_allowed = money_allowed;
    }

    pub fn remaining_budget(&self) -> f64 {
        self.money_allowed - self.money_used
    }

    /// Returns true if the spend is below the allowed budget, i.e. the application should try to expand.
    pub fn is_under_budget(&self) -> bool {
        self.money_used + BUDGET_EPSILON < self.money_allowed
    }

    pub fn is_over_budget(&self) -> bool {
        self.money_used > self.money_allowed + BUDGET_EPSILON
    }

    fn can_afford(&self, price: f64) -> bool {
        self.money_used + price <= self.money_allowed + BUDGET_EPSILON
    }

    /// Last epoch of the application lifetime.
    pub fn end_epoch(&self) -> Epoch {
        self.arrival + self.lifetime
    }

    pub fn is_expired(&self, epoch: Epoch) -> bool {
        epoch > self.end_epoch()
    }

    /// Expected speedup on `n` nodes.
    pub fn speedup(&self, n: u32) -> f64 {
        speedup(n, self.parallelism, self.sigma)
    }

    /// Footprint size starting from which more nodes give no speedup.
    pub fn saturation_point(&self) -> u32 {
        saturation_point(self.parallelism, self.sigma)
    }

    /// Expected speedup on the current footprint.
    pub fn current_speedup(&self) -> f64 {
        self.speedup(self.core_count())
    }

    /// Returns mesh nodes adjacent to the footprint which are not part of it, in discovery order.
    pub fn neighbors(&self, topology: &GridTopology) -> Vec<NodeId> {
        let footprint: HashSet<NodeId> = self.cores.iter().copied().collect();
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for core in &self.cores {
            for node in topology.adjacent(*core) {
                if !footprint.contains(&node) && seen.insert(node) {
                    result.push(node);
                }
            }
        }
        result
    }

    /// Returns footprint nodes having at least one adjacent node outside of the footprint.
    pub fn margins(&self, topology: &GridTopology) -> Vec<NodeId> {
        let footprint: HashSet<NodeId> = self.cores.iter().copied().collect();
        self.cores
            .iter()
            .copied()
            .filter(|core| topology.adjacent(*core).iter().any(|node| !footprint.contains(node)))
            .collect()
    }

    /// Recomputes spend from the current prices of the held nodes.
    pub fn refresh_spend<F: Fabric + ?Sized>(&mut self, fabric: &F) {
        self.money_used = self.cores.iter().map(|core| fabric.price(*core)).sum();
    }

    /// Invades the cheapest free neighbours that fit into the remaining budget.
    ///
    /// Candidates are considered in ascending price order, each one is invaded if its price fits the budget left
    /// after the previous invasions.
    pub fn expand<F: Fabric + ?Sized>(&mut self, fabric: &mut F, epoch: Epoch) -> ExpandVerdict {
        self.refresh_spend(&*fabric);
        let mut candidates: Vec<NodePrice> = self
            .neighbors(fabric.topology())
            .into_iter()
            .filter(|node| !fabric.is_occupied(*node))
            .map(|node| NodePrice::new(node, fabric.price(node)))
            .collect();
        if candidates.is_empty() {
            return ExpandVerdict::NoFreeNeighbors;
        }

        sort_by_price_ascending(&mut candidates);
        if !self.can_afford(candidates[0].price) {
            return ExpandVerdict::InsufficientBudget;
        }

        let mut invaded = Vec::new();
        for candidate in candidates {
            if self.can_afford(candidate.price) {
                self.invade(candidate.id, fabric, epoch);
                invaded.push(candidate.id);
            }
        }
        ExpandVerdict::Expanded(invaded)
    }

    /// Retreats from the most expensive margin nodes until the spend fits the allowed budget.
    ///
    /// Returns released nodes in release order.
    pub fn shrink<F: Fabric + ?Sized>(&mut self, fabric: &mut F) -> Vec<NodeId> {
        self.refresh_spend(&*fabric);
        let mut margins: Vec<NodePrice> = self
            .margins(fabric.topology())
            .into_iter()
            .map(|node| NodePrice::new(node, fabric.price(node)))
            .collect();
        sort_by_price_descending(&mut margins);

        let mut released = Vec::new();
        for margin in margins {
            if !self.is_over_budget() {
                break;
            }
            self.retreat(margin.id, fabric);
            released.push(margin.id);
        }
        released
    }

    /// Takes the node for the rest of the application lifetime.
    ///
    /// Nodes already held by this or another application are left as they are.
    pub fn invade<F: Fabric + ?Sized>(&mut self, node: NodeId, fabric: &mut F, epoch: Epoch) {
        if self.holds(node) || fabric.owner(node).map_or(false, |owner| owner != self.id) {
            return;
        }
        fabric.assign(node, self.id, epoch, epoch + self.lifetime);
        self.cores.push(node);
        self.money_used += fabric.price(node);
    }

    /// Gives the node back to the fabric.
    pub fn retreat<F: Fabric + ?Sized>(&mut self, node: NodeId, fabric: &mut F) {
        if !self.holds(node) {
            return;
        }
        fabric.clear(node);
        self.money_used -= fabric.price(node);
        self.cores.retain(|core| *core != node);
    }

    /// Retreats from every held node. Returns the released nodes.
    pub fn release_all<F: Fabric + ?Sized>(&mut self, fabric: &mut F) -> Vec<NodeId> {
        let released = self.cores.clone();
        for node in &released {
            self.retreat(*node, fabric);
        }
        self.money_used = 0.;
        released
    }
}
