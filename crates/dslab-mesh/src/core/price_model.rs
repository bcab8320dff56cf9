//! Node price models.
//!
//! A price model stands in for the fabric's price signal, i.e. the contention or wear cost of running a task on a
//! node. The fabric manager periodically asks the model for a fresh price of every node.

use dyn_clone::{clone_trait_object, DynClone};
use rand::prelude::*;
use rand_pcg::Pcg64;

use crate::core::common::{Epoch, NodeId};
use crate::core::config::{parse_config_value, parse_options};
use crate::core::topology::GridTopology;

pub trait PriceModel: DynClone {
    /// Returns the new price of the node. Must be non-negative.
    fn price(&mut self, node: NodeId, topology: &GridTopology, occupied: bool, epoch: Epoch) -> f64;
}

clone_trait_object!(PriceModel);

/// Creates price model from config string such as `Uniform[min=0.05,max=0.5]`.
///
/// The seed is used by randomized models.
pub fn price_model_resolver(config_str: &str, seed: u64) -> Box<dyn PriceModel> {
    let (model_name, options) = parse_config_value(config_str);
    let options = options.unwrap_or_default();
    match model_name.as_str() {
        "Constant" => Box::new(ConstantPriceModel::from_str(&options)),
        "Uniform" => Box::new(UniformPriceModel::from_str(&options, seed)),
        "Stress" => Box::new(StressPriceModel::from_str(&options)),
        _ => panic!("Can't resolve price model: {}", config_str),
    }
}

fn parse_price_option(options_str: &str, name: &str) -> f64 {
    let options = parse_options(options_str);
    let value = options
        .get(name)
        .unwrap_or_else(|| panic!("Price model option {} is missing in [{}]", name, options_str));
    value
        .parse::<f64>()
        .unwrap_or_else(|_| panic!("Can't parse price model option {}={}", name, value))
}

////////////////////////////////////////////////////////////////////////////////

/// Every node always has the same price.
#[derive(Clone)]
pub struct ConstantPriceModel {
    price: f64,
}

impl ConstantPriceModel {
    pub fn new(price: f64) -> Self {
        assert!(price >= 0., "Price must be non-negative, got {}", price);
        Self { price }
    }

    pub fn from_str(s: &str) -> Self {
        Self::new(parse_price_option(s, "price"))
    }
}

impl PriceModel for ConstantPriceModel {
    fn price(&mut self, _node: NodeId, _topology: &GridTopology, _occupied: bool, _epoch: Epoch) -> f64 {
        self.price
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Price of each node is drawn uniformly from `[min, max)` on every update.
#[derive(Clone)]
pub struct UniformPriceModel {
    min: f64,
    max: f64,
    rng: Pcg64,
}

impl UniformPriceModel {
    pub fn new(min: f64, max: f64, seed: u64) -> Self {
        assert!(
            0. <= min && min < max,
            "Uniform price range must satisfy 0 <= min < max, got [{}, {})",
            min,
            max
        );
        Self {
            min,
            max,
            rng: Pcg64::seed_from_u64(seed),
        }
    }

    pub fn from_str(s: &str, seed: u64) -> Self {
        Self::new(parse_price_option(s, "min"), parse_price_option(s, "max"), seed)
    }
}

impl PriceModel for UniformPriceModel {
    fn price(&mut self, _node: NodeId, _topology: &GridTopology, _occupied: bool, _epoch: Epoch) -> f64 {
        self.rng.gen_range(self.min..self.max)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Price reflects accumulated node stress.
///
/// Stress grows by `step` on every update while the node is occupied and decays by factor `decay` while it is idle.
/// The price is `base * (1 + stress)`, so busy regions of the mesh become more expensive and cool down over time.
#[derive(Clone)]
pub struct StressPriceModel {
    base: f64,
    step: f64,
    decay: f64,
    stress: Vec<f64>,
}

impl StressPriceModel {
    pub fn new(base: f64, step: f64, decay: f64) -> Self {
        assert!(base >= 0. && step >= 0., "Stress price model parameters must be non-negative");
        assert!((0. ..=1.).contains(&decay), "Stress decay must be in [0, 1], got {}", decay);
        Self {
            base,
            step,
            decay,
            stress: Vec::new(),
        }
    }

    pub fn from_str(s: &str) -> Self {
        Self::new(
            parse_price_option(s, "base"),
            parse_price_option(s, "step"),
            parse_price_option(s, "decay"),
        )
    }

    pub fn stress(&self, node: NodeId) -> f64 {
        self.stress.get(node as usize).copied().unwrap_or(0.)
    }
}

impl PriceModel for StressPriceModel {
    fn price(&mut self, node: NodeId, topology: &GridTopology, occupied: bool, _epoch: Epoch) -> f64 {
        if self.stress.len() < topology.node_count() as usize {
            self.stress.resize(topology.node_count() as usize, 0.);
        }
        let stress = &mut self.stress[node as usize];
        if occupied {
            *stress += self.step;
        } else {
            *stress *= self.decay;
        }
        self.base * (1. + *stress)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_resolver() {
        let topology = GridTopology::new(2, 2);
        let mut model = price_model_resolver("Constant[price=0.25]", 1);
        assert_eq!(model.price(0, &topology, false, 0), 0.25);

        let mut model = price_model_resolver("Uniform[min=0.1,max=0.2]", 1);
        for node in topology.nodes() {
            let price = model.price(node, &topology, false, 0);
            assert!((0.1..0.2).contains(&price));
        }
    }

    #[test]
    #[should_panic(expected = "Can't resolve price model")]
    fn test_resolver_unknown_model() {
        price_model_resolver("Auction[reserve=1]", 1);
    }

    #[test]
    #[should_panic(expected = "option max is missing")]
    fn test_resolver_missing_option() {
        price_model_resolver("Uniform[min=0.1]", 1);
    }

    #[test]
    fn test_uniform_model_is_reproducible() {
        let topology = GridTopology::new(3, 3);
        let mut first = UniformPriceModel::new(0., 1., 42);
        let mut second = UniformPriceModel::new(0., 1., 42);
        for node in topology.nodes() {
            assert_eq!(
                first.price(node, &topology, false, 0),
                second.price(node, &topology, false, 0)
            );
        }
    }

    #[test]
    fn test_stress_model() {
        let topology = GridTopology::new(2, 1);
        let mut model = StressPriceModel::from_str("base=0.1,step=0.5,decay=0.5");
        assert_abs_diff_eq!(model.price(0, &topology, true, 0), 0.15);
        assert_abs_diff_eq!(model.price(0, &topology, true, 1), 0.2);
        assert_abs_diff_eq!(model.price(0, &topology, false, 2), 0.15);
        assert_abs_diff_eq!(model.price(1, &topology, false, 2), 0.1);
        assert_abs_diff_eq!(model.stress(0), 0.5);
    }
}
