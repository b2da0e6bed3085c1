use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gas::gas_code;

/// Sensor component type codes.
pub mod sensor_code {
    pub const CLO2: &str = "S0006";
    pub const CO2: &str = "S0018";
    pub const O2: &str = "S0020";
    pub const LEL: &str = "S0021";
    /// Combustible sensor reporting in ppm.
    pub const PPM_LEL: &str = "S0029";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SensorStatus {
    #[default]
    Unknown,
    Passed,
    Failed,
    /// Calibration could not reach span.
    SpanFailed,
    ZeroFailed,
    /// The instrument stopped the operation itself.
    InstrumentAborted,
}

impl SensorStatus {
    pub fn passed(self) -> bool {
        self == SensorStatus::Passed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub uid: String,
    pub type_code: String,
    pub position: u8,
    pub cal_gas_code: String,
    pub enabled: bool,
    pub cal_status: SensorStatus,
    pub bump_status: SensorStatus,
}

impl Sensor {
    pub fn new(uid: &str, type_code: &str, cal_gas_code: &str) -> Self {
        Sensor {
            uid: uid.to_string(),
            type_code: type_code.to_string(),
            position: 1,
            cal_gas_code: cal_gas_code.to_string(),
            enabled: true,
            cal_status: SensorStatus::Unknown,
            bump_status: SensorStatus::Unknown,
        }
    }

    pub fn is_o2(&self) -> bool {
        self.type_code == sensor_code::O2 || self.cal_gas_code == gas_code::O2
    }

    pub fn is_combustible(&self) -> bool {
        self.type_code == sensor_code::LEL || self.type_code == sensor_code::PPM_LEL
    }
}

/// An installed component. Only sensors take part in gas operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstalledComponent {
    Sensor(Sensor),
    Battery { uid: String, type_code: String },
    Pump { uid: String },
}

impl InstalledComponent {
    pub fn as_sensor(&self) -> Option<&Sensor> {
        match self {
            InstalledComponent::Sensor(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sensor_mut(&mut self) -> Option<&mut Sensor> {
        match self {
            InstalledComponent::Sensor(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub serial_number: String,
    pub firmware_version: String,
    pub components: Vec<InstalledComponent>,
}

impl Instrument {
    pub fn sensors(&self) -> impl Iterator<Item = &Sensor> {
        self.components.iter().filter_map(InstalledComponent::as_sensor)
    }

    pub fn sensor_mut(&mut self, uid: &str) -> Option<&mut Sensor> {
        self.components
            .iter_mut()
            .filter_map(InstalledComponent::as_sensor_mut)
            .find(|s| s.uid == uid)
    }
}

/// Docked-instrument state shared between services.
#[derive(Debug, Clone, Default)]
pub struct DockedState {
    pub instrument: Option<Instrument>,
    pub docked_time: Option<DateTime<Utc>>,
    /// Part number of the cylinder blamed for a span failure.
    pub bad_gas_hookup: Option<String>,
    pub upgrade_error: bool,
    pub critical_error: Option<i32>,
}

impl DockedState {
    /// Sticky states that block gas operations until an operator intervenes.
    pub fn has_sticky_error(&self) -> bool {
        self.upgrade_error || self.critical_error.is_some()
    }
}
