use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_abs_diff_eq;
use sugars::{rc, refcell};

use dslab_core::simulation::Simulation;

use dslab_mesh::core::application::{AppStatus, Application};
use dslab_mesh::core::config::{FreeListPolicy, InitialPlacement, SimulationConfig};
use dslab_mesh::core::fabric::{Fabric, GridFabric};
use dslab_mesh::core::scheduler::AllocationScheduler;
use dslab_mesh::core::topology::GridTopology;
use dslab_mesh::core::workload::ArrivalTable;

fn test_config() -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.free_node_refresh_interval = 1;
    config.budget_pool = 1.;
    config
}

fn long_app(id: u32, arrival: u64) -> Application {
    Application::new(id, arrival, 1000, 4., 0.5)
}

fn create_scheduler(
    apps: Vec<Application>,
    fabric: Rc<RefCell<GridFabric>>,
    config: SimulationConfig,
) -> AllocationScheduler {
    let mut sim = Simulation::new(123);
    let mut table = ArrivalTable::new();
    for app in apps {
        table.entry(app.arrival).or_default().push(app);
    }
    AllocationScheduler::new(table, fabric, sim.create_context("scheduler"), rc!(config))
}

fn uniform_fabric(width: u32, height: u32, price: f64) -> Rc<RefCell<GridFabric>> {
    rc!(refcell!(GridFabric::new(GridTopology::new(width, height), price)))
}

#[test]
fn test_fair_share() {
    for (count, share) in [(2, 0.5), (3, 1. / 3.), (4, 0.25)] {
        let fabric = uniform_fabric(4, 4, 0.1);
        let apps = (0..count).map(|id| long_app(id, 0)).collect();
        let mut scheduler = create_scheduler(apps, fabric, test_config());

        let summary = scheduler.on_epoch(0, false);
        assert_eq!(summary.admitted, count);
        assert_eq!(summary.placed, count);
        assert_eq!(summary.running, count);
        assert_abs_diff_eq!(scheduler.fair_share().unwrap(), share);
        for app in scheduler.applications() {
            assert_abs_diff_eq!(app.money_allowed(), share);
            assert!(app.money_used() <= share + 1e-9);
        }
    }
}

#[test]
fn test_no_share_without_running_apps() {
    let fabric = uniform_fabric(2, 2, 0.1);
    let mut scheduler = create_scheduler(vec![long_app(0, 5)], fabric, test_config());
    let summary = scheduler.on_epoch(0, false);
    assert_eq!(summary.running, 0);
    assert!(scheduler.fair_share().is_none());
    assert_eq!(scheduler.application(0).unwrap().status, AppStatus::Scheduled);
}

#[test]
fn test_initial_placement() {
    for (placement, expected) in [(InitialPlacement::MostExpensive, 15), (InitialPlacement::Cheapest, 0)] {
        let fabric = uniform_fabric(4, 4, 0.);
        for node in 0..16 {
            fabric.borrow_mut().set_price(node, 0.01 * (node + 1) as f64);
        }
        let mut config = test_config();
        config.initial_placement = placement;
        let mut scheduler = create_scheduler(vec![long_app(0, 0)], fabric, config);

        scheduler.on_epoch(0, false);
        let app = scheduler.application(0).unwrap();
        assert_eq!(app.cores()[0], expected);
        assert_eq!(app.mapping_time, Some(0));
        assert_eq!(app.status, AppStatus::Active);
    }
}

#[test]
fn test_app_waits_for_free_node_refresh() {
    let fabric = uniform_fabric(3, 3, 0.);
    let mut config = test_config();
    config.free_node_refresh_interval = 5;
    let mut scheduler = create_scheduler(vec![long_app(0, 0)], fabric.clone(), config);

    // unpriced nodes are never free
    scheduler.on_epoch(0, false);
    assert_eq!(scheduler.waiting_apps(), vec![0]);
    assert_eq!(scheduler.application(0).unwrap().status, AppStatus::Waiting);
    assert!(scheduler.free_nodes().is_empty());

    for node in 0..9 {
        fabric.borrow_mut().set_price(node, 0.1);
    }
    for epoch in 1..5 {
        let summary = scheduler.on_epoch(epoch, false);
        assert_eq!(summary.placed, 0);
        assert_eq!(summary.waiting, 1);
    }

    let summary = scheduler.on_epoch(5, false);
    assert_eq!(summary.placed, 1);
    assert!(scheduler.waiting_apps().is_empty());
    assert_eq!(scheduler.running_apps(), vec![0]);
}

#[test]
fn test_free_list_policy() {
    for (policy, expected) in [(FreeListPolicy::Rescan, 4), (FreeListPolicy::Accumulate, 12)] {
        let fabric = uniform_fabric(2, 2, 0.1);
        let mut config = test_config();
        config.free_list_policy = policy;
        let mut scheduler = create_scheduler(Vec::new(), fabric, config);
        for epoch in 0..3 {
            scheduler.on_epoch(epoch, false);
        }
        assert_eq!(scheduler.free_nodes().len(), expected);
        assert!(scheduler
            .free_nodes()
            .windows(2)
            .all(|w| w[0].price >= w[1].price));
    }
}

#[test]
fn test_stale_free_entries_are_skipped() {
    let fabric = uniform_fabric(2, 1, 0.);
    fabric.borrow_mut().set_price(0, 0.2);
    fabric.borrow_mut().set_price(1, 0.1);
    let mut config = test_config();
    config.free_list_policy = FreeListPolicy::Accumulate;
    let mut scheduler = create_scheduler(vec![long_app(0, 0), long_app(1, 1)], fabric.clone(), config);

    scheduler.on_epoch(0, false);
    // the first app took node 0 and expanded into node 1 left in the free list
    assert_eq!(fabric.borrow().owner(1), Some(0));
    assert_eq!(scheduler.free_nodes().len(), 1);

    let summary = scheduler.on_epoch(1, false);
    assert_eq!(summary.placed, 0);
    assert_eq!(scheduler.waiting_apps(), vec![1]);
    assert!(scheduler.free_nodes().is_empty());
    assert_eq!(fabric.borrow().owner(1), Some(0));
}

#[test]
fn test_running_order_resolves_competition() {
    let fabric = uniform_fabric(3, 1, 0.);
    for (node, price) in [(0, 0.5), (1, 0.1), (2, 0.4)] {
        fabric.borrow_mut().set_price(node, price);
    }
    let mut config = test_config();
    config.budget_pool = 2.;
    let mut scheduler = create_scheduler(vec![long_app(0, 0), long_app(1, 0)], fabric.clone(), config);

    let summary = scheduler.on_epoch(0, false);
    assert_eq!(scheduler.running_apps(), vec![0, 1]);
    assert_eq!(summary.invaded, 1);
    let fabric = fabric.borrow();
    assert_eq!(fabric.owner(0), Some(0));
    assert_eq!(fabric.owner(1), Some(0));
    assert_eq!(fabric.owner(2), Some(1));
}

#[test]
fn test_lifetime_expiry() {
    let fabric = uniform_fabric(4, 4, 0.1);
    let app = Application::new(0, 0, 5, 8., 0.5);
    let mut scheduler = create_scheduler(vec![app], fabric.clone(), test_config());

    for epoch in 0..=5 {
        let summary = scheduler.on_epoch(epoch, false);
        assert_eq!(summary.retired, 0);
        assert_eq!(scheduler.application(0).unwrap().status, AppStatus::Active);
    }
    assert!(fabric.borrow().occupied_count() > 1);

    let summary = scheduler.on_epoch(6, false);
    assert_eq!(summary.retired, 1);
    assert_eq!(summary.running, 0);
    let app = scheduler.application(0).unwrap();
    assert_eq!(app.status, AppStatus::Retired);
    assert_eq!(app.core_count(), 0);
    assert_eq!(fabric.borrow().occupied_count(), 0);

    // retired applications never come back
    scheduler.on_epoch(7, false);
    assert_eq!(scheduler.application(0).unwrap().core_count(), 0);
}

#[test]
fn test_reset_epoch_skips_duty_cycle() {
    let fabric = uniform_fabric(4, 4, 0.1);
    let mut config = test_config();
    config.budget_pool = 2.;
    let mut scheduler = create_scheduler(vec![long_app(0, 0)], fabric.clone(), config);

    let summary = scheduler.on_epoch(0, true);
    assert!(summary.reset);
    assert_eq!(summary.admitted, 0);
    assert_eq!(summary.waiting, 0);
    assert_abs_diff_eq!(scheduler.budget_pool(), 2.);
    assert_eq!(fabric.borrow().occupied_count(), 0);

    let summary = scheduler.on_epoch(1, false);
    assert_eq!(summary.admitted, 1);
    assert_eq!(summary.placed, 1);
    assert_eq!(scheduler.application(0).unwrap().mapping_time, Some(1));
    assert_eq!(scheduler.history().len(), 2);
    assert_eq!(scheduler.last_summary(), Some(&summary));
}

#[test]
fn test_starved_apps_are_requeued() {
    let fabric = uniform_fabric(2, 1, 0.);
    fabric.borrow_mut().set_price(0, 0.8);
    fabric.borrow_mut().set_price(1, 0.6);
    let mut scheduler = create_scheduler(vec![long_app(0, 0), long_app(1, 0)], fabric.clone(), test_config());

    let summary = scheduler.on_epoch(0, false);
    assert_eq!(summary.placed, 2);
    assert_eq!(summary.released, 2);
    assert_eq!(summary.running, 0);
    assert_eq!(scheduler.waiting_apps(), vec![0, 1]);
    assert_eq!(scheduler.application(0).unwrap().status, AppStatus::Waiting);
    assert_eq!(fabric.borrow().occupied_count(), 0);

    // both get placed again after the next refresh, first mapping time is kept
    let summary = scheduler.on_epoch(1, false);
    assert_eq!(summary.placed, 2);
    assert_eq!(scheduler.application(0).unwrap().mapping_time, Some(0));
    assert_eq!(scheduler.application(1).unwrap().mapping_time, Some(0));
}

#[test]
fn test_spend_tracks_price_changes() {
    let fabric = uniform_fabric(4, 4, 0.1);
    let mut scheduler = create_scheduler(vec![long_app(0, 0)], fabric.clone(), test_config());
    scheduler.on_epoch(0, false);
    scheduler.on_epoch(1, false);
    let held = scheduler.application(0).unwrap().cores().to_vec();
    assert!(held.len() > 1);

    for node in 0..16 {
        fabric.borrow_mut().set_price(node, 0.3);
    }
    let summary = scheduler.on_epoch(2, false);
    assert!(summary.released > 0);
    let app = scheduler.application(0).unwrap();
    assert!(app.money_used() <= app.money_allowed() + 1e-9 || app.core_count() == 0);
    assert_abs_diff_eq!(app.money_used(), 0.3 * app.core_count() as f64, epsilon = 1e-9);
}
