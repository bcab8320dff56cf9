//! Per-node contract of the mesh fabric.

use serde::Serialize;

use crate::core::common::{AppId, Epoch, NodeId};
use crate::core::price_model::PriceModel;
use crate::core::topology::GridTopology;

/// The narrow view of the mesh fabric used by the allocation engine.
///
/// The fabric owns node topology, node prices and task assignments. Applications mutate occupancy only through
/// [`assign`](Fabric::assign) and [`clear`](Fabric::clear).
pub trait Fabric {
    fn topology(&self) -> &GridTopology;

    fn is_occupied(&self, node: NodeId) -> bool;

    /// Returns the current price of the node.
    fn price(&self, node: NodeId) -> f64;

    /// Returns the application the node is assigned to.
    fn owner(&self, node: NodeId) -> Option<AppId>;

    /// Marks the node as running a task of `app` during `[start, end]`.
    fn assign(&mut self, node: NodeId, app: AppId, start: Epoch, end: Epoch);

    /// Marks the node as idle.
    fn clear(&mut self, node: NodeId);
}

/// Task currently mapped to a node.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskAssignment {
    pub app_id: AppId,
    pub start: Epoch,
    pub end: Epoch,
}

#[derive(Clone, Debug)]
struct NodeState {
    price: f64,
    task: Option<TaskAssignment>,
}

/// In-memory mesh fabric.
#[derive(Clone, Debug)]
pub struct GridFabric {
    topology: GridTopology,
    nodes: Vec<NodeState>,
}

impl GridFabric {
    /// Creates idle fabric with the same price on every node.
    pub fn new(topology: GridTopology, price: f64) -> Self {
        let nodes = topology.nodes().map(|_| NodeState { price, task: None }).collect();
        Self { topology, nodes }
    }

    pub fn set_price(&mut self, node: NodeId, price: f64) {
        debug_assert!(price >= 0., "negative price {} for node {}", price, node);
        self.nodes[node as usize].price = price;
    }

    /// Re-prices every node using the price model.
    pub fn update_prices(&mut self, model: &mut dyn PriceModel, epoch: Epoch) {
        for id in self.topology.nodes() {
            let occupied = self.is_occupied(id);
            let price = model.price(id, &self.topology, occupied, epoch);
            self.set_price(id, price);
        }
    }

    pub fn task(&self, node: NodeId) -> Option<&TaskAssignment> {
        self.nodes[node as usize].task.as_ref()
    }

    /// Returns the number of occupied nodes.
    pub fn occupied_count(&self) -> u32 {
        self.nodes.iter().filter(|n| n.task.is_some()).count() as u32
    }

    /// Returns nodes assigned to the application in ascending order.
    pub fn nodes_of(&self, app: AppId) -> Vec<NodeId> {
        self.topology
            .nodes()
            .filter(|id| self.owner(*id) == Some(app))
            .collect()
    }
}

impl Fabric for GridFabric {
    fn topology(&self) -> &GridTopology {
        &self.topology
    }

    fn is_occupied(&self, node: NodeId) -> bool {
        self.nodes[node as usize].task.is_some()
    }

    fn price(&self, node: NodeId) -> f64 {
        self.nodes[node as usize].price
    }

    fn owner(&self, node: NodeId) -> Option<AppId> {
        self.nodes[node as usize].task.map(|t| t.app_id)
    }

    fn assign(&mut self, node: NodeId, app: AppId, start: Epoch, end: Epoch) {
        let state = &mut self.nodes[node as usize];
        debug_assert!(
            state.task.map_or(true, |t| t.app_id == app),
            "node {} is already assigned to app {}",
            node,
            state.task.map_or(0, |t| t.app_id)
        );
        state.task = Some(TaskAssignment { app_id: app, start, end });
    }

    fn clear(&mut self, node: NodeId) {
        self.nodes[node as usize].task = None;
    }
}
