//! Hardware capability traits for the docking station.
//!
//! Everything the decision core needs from the physical station goes through
//! these traits so the core can run against simulated hardware in tests.
pub mod clock;
pub mod debounce;

pub use clock::{Clock, MonotonicClock};
pub use debounce::debounced_sample;

/// Error type used at the hardware boundary.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Raw switch and sensor sampling. Ports are numbered from 1.
pub trait DockSwitches {
    /// Instrument seated in the cradle.
    fn is_docked(&mut self) -> HwResult<bool>;
    /// iGas smart card inserted at `port`.
    fn is_card_present(&mut self, port: u8) -> HwResult<bool>;
    /// Pressure switch cable connected at `port`.
    fn is_pressure_switch_present(&mut self, port: u8) -> HwResult<bool>;
    /// Pressure switch reports adequate pressure at `port`.
    fn is_pressure_good(&mut self, port: u8) -> HwResult<bool>;
}

pub trait Valves {
    fn open_valve(&mut self, port: u8) -> HwResult<()>;
    fn close_valve(&mut self, port: u8) -> HwResult<()>;
    fn close_all(&mut self) -> HwResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Led {
    Off,
    Green,
    Yellow,
    Red,
}

pub trait Indicators {
    fn set_led(&mut self, led: Led) -> HwResult<()>;
    fn set_buzzer(&mut self, on: bool) -> HwResult<()>;
}
