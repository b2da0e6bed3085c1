//! GPIO-backed station hardware for Linux boards (feature `hardware`).
use dock_traits::{DockSwitches, HwResult, Indicators, Led, Valves};
use rppal::gpio::{Gpio, InputPin, OutputPin};
use tracing::trace;

use crate::error::{HwError, Result};

/// BCM pin numbers; per-port vectors are indexed by port - 1.
#[derive(Debug, Clone, Default)]
pub struct GpioPins {
    pub dock_switch: u8,
    pub card_presence: Vec<u8>,
    pub pressure_switch: Vec<u8>,
    pub pressure_good: Vec<u8>,
    pub valves: Vec<u8>,
    pub led_red: u8,
    pub led_green: u8,
    pub led_yellow: u8,
    pub buzzer: u8,
}

pub struct GpioDock {
    dock: InputPin,
    cards: Vec<InputPin>,
    pressure_switches: Vec<InputPin>,
    pressure_good: Vec<InputPin>,
    valves: Vec<OutputPin>,
    led_red: OutputPin,
    led_green: OutputPin,
    led_yellow: OutputPin,
    buzzer: OutputPin,
}

fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}

impl GpioDock {
    pub fn new(pins: &GpioPins) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let input = |pin: u8| -> Result<InputPin> {
            Ok(gpio.get(pin).map_err(gpio_err)?.into_input_pullup())
        };
        let output = |pin: u8| -> Result<OutputPin> {
            let mut out = gpio.get(pin).map_err(gpio_err)?.into_output();
            out.set_low();
            Ok(out)
        };
        Ok(Self {
            dock: input(pins.dock_switch)?,
            cards: pins.card_presence.iter().map(|p| input(*p)).collect::<Result<_>>()?,
            pressure_switches: pins
                .pressure_switch
                .iter()
                .map(|p| input(*p))
                .collect::<Result<_>>()?,
            pressure_good: pins.pressure_good.iter().map(|p| input(*p)).collect::<Result<_>>()?,
            valves: pins.valves.iter().map(|p| output(*p)).collect::<Result<_>>()?,
            led_red: output(pins.led_red)?,
            led_green: output(pins.led_green)?,
            led_yellow: output(pins.led_yellow)?,
            buzzer: output(pins.buzzer)?,
        })
    }
}

// Switches are wired active-low against the internal pull-ups.
fn active(pins: &[InputPin], port: u8) -> HwResult<bool> {
    let idx = usize::from(port).checked_sub(1).ok_or(HwError::InvalidPort(port))?;
    let pin = pins.get(idx).ok_or(HwError::InvalidPort(port))?;
    let level = pin.is_low();
    trace!(port, level, "gpio sample");
    Ok(level)
}

impl DockSwitches for GpioDock {
    fn is_docked(&mut self) -> HwResult<bool> {
        Ok(self.dock.is_low())
    }

    fn is_card_present(&mut self, port: u8) -> HwResult<bool> {
        active(&self.cards, port)
    }

    fn is_pressure_switch_present(&mut self, port: u8) -> HwResult<bool> {
        active(&self.pressure_switches, port)
    }

    fn is_pressure_good(&mut self, port: u8) -> HwResult<bool> {
        active(&self.pressure_good, port)
    }
}

impl Valves for GpioDock {
    fn open_valve(&mut self, port: u8) -> HwResult<()> {
        let idx = usize::from(port).checked_sub(1).ok_or(HwError::InvalidPort(port))?;
        self.valves.get_mut(idx).ok_or(HwError::InvalidPort(port))?.set_high();
        Ok(())
    }

    fn close_valve(&mut self, port: u8) -> HwResult<()> {
        let idx = usize::from(port).checked_sub(1).ok_or(HwError::InvalidPort(port))?;
        self.valves.get_mut(idx).ok_or(HwError::InvalidPort(port))?.set_low();
        Ok(())
    }

    fn close_all(&mut self) -> HwResult<()> {
        for valve in &mut self.valves {
            valve.set_low();
        }
        Ok(())
    }
}

impl Indicators for GpioDock {
    fn set_led(&mut self, led: Led) -> HwResult<()> {
        self.led_red.set_low();
        self.led_green.set_low();
        self.led_yellow.set_low();
        match led {
            Led::Off => {}
            Led::Green => self.led_green.set_high(),
            Led::Yellow => self.led_yellow.set_high(),
            Led::Red => self.led_red.set_high(),
        }
        Ok(())
    }

    fn set_buzzer(&mut self, on: bool) -> HwResult<()> {
        if on {
            self.buzzer.set_high();
        } else {
            self.buzzer.set_low();
        }
        Ok(())
    }
}
