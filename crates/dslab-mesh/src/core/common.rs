use serde::Serialize;

/// Flat identifier of a mesh node, `row * width + column`.
pub type NodeId = u32;

/// Identifier of an application.
pub type AppId = u32;

/// Discrete simulation time step.
pub type Epoch = u64;

/// Slack used when comparing spend against budget.
pub const BUDGET_EPSILON: f64 = 1e-9;

/// Node tagged with the price it had when it was inspected.
#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
pub struct NodePrice {
    pub id: NodeId,
    pub price: f64,
}

impl NodePrice {
    pub fn new(id: NodeId, price: f64) -> Self {
        Self { id, price }
    }
}

/// Sorts nodes by ascending price, keeping discovery order among equal prices.
pub fn sort_by_price_ascending(nodes: &mut [NodePrice]) {
    nodes.sort_by(|a, b| a.price.total_cmp(&b.price));
}

/// Sorts nodes by descending price, keeping discovery order among equal prices.
pub fn sort_by_price_descending(nodes: &mut [NodePrice]) {
    nodes.sort_by(|a, b| b.price.total_cmp(&a.price));
}

/// Outcome of a single expansion attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum ExpandVerdict {
    /// Every neighbouring node is occupied (or there are no neighbours at all).
    NoFreeNeighbors,
    /// Even the cheapest free neighbour costs more than the remaining budget.
    InsufficientBudget,
    /// Listed nodes were invaded, in invasion order.
    Expanded(Vec<NodeId>),
}

impl ExpandVerdict {
    /// Returns the invaded nodes (empty for no-op verdicts).
    pub fn invaded(&self) -> &[NodeId] {
        match self {
            ExpandVerdict::Expanded(nodes) => nodes,
            _ => &[],
        }
    }
}
