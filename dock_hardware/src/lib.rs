pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

use dock_traits::{DockSwitches, HwResult, Indicators, Led, Valves};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::HwError;

#[derive(Debug, Default)]
struct SimState {
    port_count: u8,
    docked: bool,
    cards: Vec<bool>,
    pressure_switches: Vec<bool>,
    pressure_good: Vec<bool>,
    open_valves: Vec<bool>,
    led: Option<Led>,
    buzzer: bool,
    buzzer_activations: u32,
    // Queued faults returned by the next reads, oldest first.
    faults: VecDeque<HwError>,
    // Queued one-shot glitches: the next read of the dock switch returns this value.
    dock_glitches: VecDeque<bool>,
}

/// Simulated docking-station hardware.
///
/// Clones share the same state, so a test can keep one handle to flip
/// switches while the switch service samples through another.
#[derive(Debug, Clone)]
pub struct SimulatedDock {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedDock {
    pub fn new(port_count: u8) -> Self {
        let n = usize::from(port_count);
        SimulatedDock {
            state: Arc::new(Mutex::new(SimState {
                port_count,
                cards: vec![false; n],
                pressure_switches: vec![false; n],
                pressure_good: vec![true; n],
                open_valves: vec![false; n],
                ..SimState::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_docked(&self, docked: bool) {
        self.state().docked = docked;
    }

    pub fn set_card_present(&self, port: u8, present: bool) {
        let mut s = self.state();
        if let Some(slot) = port_index(port, s.port_count).and_then(|i| s.cards.get_mut(i)) {
            *slot = present;
        }
    }

    pub fn set_pressure_switch(&self, port: u8, present: bool, good: bool) {
        let mut s = self.state();
        if let Some(i) = port_index(port, s.port_count) {
            if let Some(slot) = s.pressure_switches.get_mut(i) {
                *slot = present;
            }
            if let Some(slot) = s.pressure_good.get_mut(i) {
                *slot = good;
            }
        }
    }

    /// Make the next hardware read fail with `message`.
    pub fn inject_fault(&self, message: impl Into<String>) {
        self.state()
            .faults
            .push_back(HwError::Simulated(message.into()));
    }

    /// Make the next hardware read time out.
    pub fn inject_timeout(&self) {
        self.state().faults.push_back(HwError::Timeout);
    }

    /// Make the next dock-switch read return `value` once.
    pub fn inject_dock_glitch(&self, value: bool) {
        self.state().dock_glitches.push_back(value);
    }

    pub fn led(&self) -> Option<Led> {
        self.state().led
    }

    pub fn buzzer_activations(&self) -> u32 {
        self.state().buzzer_activations
    }

    pub fn open_valves(&self) -> Vec<u8> {
        self.state()
            .open_valves
            .iter()
            .enumerate()
            .filter(|(_, open)| **open)
            .filter_map(|(i, _)| u8::try_from(i + 1).ok())
            .collect()
    }

    fn take_fault(&self) -> HwResult<()> {
        match self.state().faults.pop_front() {
            Some(fault) => Err(Box::new(fault)),
            None => Ok(()),
        }
    }

    fn read_port(&self, port: u8, pick: fn(&SimState) -> &Vec<bool>) -> HwResult<bool> {
        self.take_fault()?;
        let s = self.state();
        let i = port_index(port, s.port_count).ok_or(HwError::InvalidPort(port))?;
        Ok(pick(&s).get(i).copied().unwrap_or(false))
    }
}

fn port_index(port: u8, port_count: u8) -> Option<usize> {
    if port == 0 || port > port_count {
        None
    } else {
        Some(usize::from(port - 1))
    }
}

impl DockSwitches for SimulatedDock {
    fn is_docked(&mut self) -> HwResult<bool> {
        self.take_fault()?;
        let mut s = self.state();
        Ok(s.dock_glitches.pop_front().unwrap_or(s.docked))
    }

    fn is_card_present(&mut self, port: u8) -> HwResult<bool> {
        self.read_port(port, |s| &s.cards)
    }

    fn is_pressure_switch_present(&mut self, port: u8) -> HwResult<bool> {
        self.read_port(port, |s| &s.pressure_switches)
    }

    fn is_pressure_good(&mut self, port: u8) -> HwResult<bool> {
        self.read_port(port, |s| &s.pressure_good)
    }
}

impl Valves for SimulatedDock {
    fn open_valve(&mut self, port: u8) -> HwResult<()> {
        let mut s = self.state();
        let i = port_index(port, s.port_count).ok_or(HwError::InvalidPort(port))?;
        s.open_valves[i] = true;
        tracing::debug!(port, "valve opened (simulated)");
        Ok(())
    }

    fn close_valve(&mut self, port: u8) -> HwResult<()> {
        let mut s = self.state();
        let i = port_index(port, s.port_count).ok_or(HwError::InvalidPort(port))?;
        s.open_valves[i] = false;
        Ok(())
    }

    fn close_all(&mut self) -> HwResult<()> {
        let mut s = self.state();
        s.open_valves.iter_mut().for_each(|v| *v = false);
        tracing::debug!("all valves closed (simulated)");
        Ok(())
    }
}

impl Indicators for SimulatedDock {
    fn set_led(&mut self, led: Led) -> HwResult<()> {
        self.state().led = Some(led);
        Ok(())
    }

    fn set_buzzer(&mut self, on: bool) -> HwResult<()> {
        let mut s = self.state();
        if on && !s.buzzer {
            s.buzzer_activations = s.buzzer_activations.saturating_add(1);
        }
        s.buzzer = on;
        Ok(())
    }
}

/// Shares one board between the switch sampler and the output driver.
///
/// Every call locks the inner device for its duration.
#[derive(Debug)]
pub struct SharedDock<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for SharedDock<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedDock<T> {
    pub fn new(device: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(device)),
        }
    }

    fn device(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: DockSwitches> DockSwitches for SharedDock<T> {
    fn is_docked(&mut self) -> HwResult<bool> {
        self.device().is_docked()
    }

    fn is_card_present(&mut self, port: u8) -> HwResult<bool> {
        self.device().is_card_present(port)
    }

    fn is_pressure_switch_present(&mut self, port: u8) -> HwResult<bool> {
        self.device().is_pressure_switch_present(port)
    }

    fn is_pressure_good(&mut self, port: u8) -> HwResult<bool> {
        self.device().is_pressure_good(port)
    }
}

impl<T: Valves> Valves for SharedDock<T> {
    fn open_valve(&mut self, port: u8) -> HwResult<()> {
        self.device().open_valve(port)
    }

    fn close_valve(&mut self, port: u8) -> HwResult<()> {
        self.device().close_valve(port)
    }

    fn close_all(&mut self) -> HwResult<()> {
        self.device().close_all()
    }
}

impl<T: Indicators> Indicators for SharedDock<T> {
    fn set_led(&mut self, led: Led) -> HwResult<()> {
        self.device().set_led(led)
    }

    fn set_buzzer(&mut self, on: bool) -> HwResult<()> {
        self.device().set_buzzer(on)
    }
}
