//! Mesh geometry.

use serde::{Deserialize, Serialize};

use crate::core::common::NodeId;

/// Largest supported mesh dimension.
pub const MAX_GRID_DIM: u32 = 32;

/// Fixed rectangular mesh with `id = row * width + column` numbering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridTopology {
    width: u32,
    height: u32,
}

impl GridTopology {
    /// Creates mesh of the given size.
    ///
    /// Panics if some dimension is zero or exceeds [`MAX_GRID_DIM`].
    pub fn new(width: u32, height: u32) -> Self {
        if width == 0 || height == 0 || width > MAX_GRID_DIM || height > MAX_GRID_DIM {
            panic!(
                "Unsupported mesh size {}x{}, each dimension must be in 1..={}",
                width, height, MAX_GRID_DIM
            );
        }
        Self { width, height }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the total number of nodes.
    pub fn node_count(&self) -> u32 {
        self.width * self.height
    }

    /// Returns all node ids in ascending order.
    pub fn nodes(&self) -> std::ops::Range<NodeId> {
        0..self.node_count()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id < self.node_count()
    }

    /// Returns `(row, column)` of the node.
    pub fn coord_of(&self, id: NodeId) -> (u32, u32) {
        debug_assert!(self.contains(id), "node {} is outside of the mesh", id);
        (id / self.width, id % self.width)
    }

    /// Returns id of the node at `(row, column)`.
    pub fn id_of(&self, row: u32, column: u32) -> NodeId {
        debug_assert!(row < self.height && column < self.width);
        row * self.width + column
    }

    /// Returns the in-bounds neighbours of the node in east, west, south, north order.
    pub fn adjacent(&self, id: NodeId) -> Vec<NodeId> {
        let (row, column) = self.coord_of(id);
        let mut result = Vec::with_capacity(4);
        if column + 1 < self.width {
            result.push(self.id_of(row, column + 1));
        }
        if column > 0 {
            result.push(self.id_of(row, column - 1));
        }
        if row + 1 < self.height {
            result.push(self.id_of(row + 1, column));
        }
        if row > 0 {
            result.push(self.id_of(row - 1, column));
        }
        result
    }
}
