//! Component supplying node prices to the fabric.

use std::cell::RefCell;
use std::rc::Rc;

use dslab_core::cast;
use dslab_core::context::SimulationContext;
use dslab_core::event::Event;
use dslab_core::handler::EventHandler;
use dslab_core::log_trace;

use crate::core::common::Epoch;
use crate::core::config::SimulationConfig;
use crate::core::events::fabric::PriceUpdate;
use crate::core::fabric::GridFabric;
use crate::core::price_model::PriceModel;

/// Periodically re-prices every node of the fabric using the configured price model.
pub struct FabricManager {
    fabric: Rc<RefCell<GridFabric>>,
    price_model: Box<dyn PriceModel>,
    ctx: SimulationContext,
    sim_config: Rc<SimulationConfig>,
}

impl FabricManager {
    pub fn new(
        fabric: Rc<RefCell<GridFabric>>,
        price_model: Box<dyn PriceModel>,
        ctx: SimulationContext,
        sim_config: Rc<SimulationConfig>,
    ) -> Self {
        Self {
            fabric,
            price_model,
            ctx,
            sim_config,
        }
    }

    /// Returns component ID.
    pub fn get_id(&self) -> u32 {
        self.ctx.id()
    }

    fn on_price_update(&mut self) {
        let epoch = self.ctx.time().round() as Epoch;
        let mut fabric = self.fabric.borrow_mut();
        fabric.update_prices(self.price_model.as_mut(), epoch);
        log_trace!(self.ctx, "updated node prices, {} nodes occupied", fabric.occupied_count());

        let period = self.sim_config.price_update_period;
        if epoch + period <= self.sim_config.simulation_length {
            self.ctx.emit_self(PriceUpdate {}, period as f64);
        }
    }
}

impl EventHandler for FabricManager {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            PriceUpdate {} => {
                self.on_price_update();
            }
        })
    }
}
