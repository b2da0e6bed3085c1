use std::time::Duration;

use dock_hardware::SimulatedDock;
use dock_hardware::error::HwError;
use dock_traits::clock::test_clock::TestClock;
use dock_traits::{DockSwitches, debounced_sample};
use rstest::{fixture, rstest};

#[fixture]
fn sim() -> SimulatedDock {
    SimulatedDock::new(3)
}

#[rstest]
fn single_glitch_is_discarded(sim: SimulatedDock) {
    let clock = TestClock::new();
    let mut reader = sim.clone();
    sim.inject_dock_glitch(true);
    let docked = debounced_sample(|| reader.is_docked(), false, Duration::from_millis(50), &clock)
        .expect("sample");
    assert!(!docked);
    assert_eq!(clock.sleep_count(), 1);
}

#[rstest]
fn steady_change_is_trusted(sim: SimulatedDock) {
    let clock = TestClock::new();
    let mut reader = sim.clone();
    sim.set_docked(true);
    let docked = debounced_sample(|| reader.is_docked(), false, Duration::from_millis(50), &clock)
        .expect("sample");
    assert!(docked);
}

#[rstest]
#[case(0)]
#[case(4)]
fn out_of_range_port_is_invalid(sim: SimulatedDock, #[case] port: u8) {
    let mut reader = sim;
    let err = reader.is_card_present(port).expect_err("invalid port");
    assert!(matches!(
        err.downcast_ref::<HwError>(),
        Some(HwError::InvalidPort(p)) if *p == port
    ));
}
