use serde::{Deserialize, Serialize};

use crate::gas::Cylinder;

/// Air kinds allowed on port 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port1Restrictions {
    pub fresh_air: bool,
    pub zero_air: bool,
}

impl Default for Port1Restrictions {
    fn default() -> Self {
        Self {
            fresh_air: true,
            zero_air: true,
        }
    }
}

impl Port1Restrictions {
    pub const NONE: Port1Restrictions = Port1Restrictions {
        fresh_air: false,
        zero_air: false,
    };

    /// Gas operations need an air source whenever any air kind is configured.
    pub fn requires_air(self) -> bool {
        self.fresh_air || self.zero_air
    }

    pub fn zero_air_only(self) -> bool {
        self.zero_air && !self.fresh_air
    }

    /// Whether an air cylinder may be used from port 1.
    pub fn allows(self, cylinder: &Cylinder) -> bool {
        if cylinder.is_fresh_air() {
            self.fresh_air
        } else if cylinder.is_zero_air() {
            self.zero_air
        } else {
            true
        }
    }

    /// Whether `cylinder` may be installed on port 1 at all.
    pub fn is_legal(self, cylinder: &Cylinder) -> bool {
        if !self.requires_air() {
            return true;
        }
        (cylinder.is_fresh_air() && self.fresh_air) || (cylinder.is_zero_air() && self.zero_air)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockingStation {
    pub serial_number: String,
    pub port_count: u8,
    pub port1_restrictions: Port1Restrictions,
    /// Gas code used to bump combustible sensors; empty for the calibration gas.
    pub combustible_bump_test_gas: String,
    pub use_expired_cylinders_for_bump: bool,
    /// Unmanaged mode: outcomes are also exported locally.
    pub cal_station_mode: bool,
    pub time_zone: String,
    pub account: Option<String>,
    pub activated: bool,
    pub service_mode: bool,
    pub manufacturing_accounts: Vec<String>,
}

impl DockingStation {
    pub fn new(serial_number: &str) -> Self {
        DockingStation {
            serial_number: serial_number.to_string(),
            port_count: 3,
            port1_restrictions: Port1Restrictions::default(),
            combustible_bump_test_gas: String::new(),
            use_expired_cylinders_for_bump: false,
            cal_station_mode: false,
            time_zone: "UTC".to_string(),
            account: None,
            activated: false,
            service_mode: false,
            manufacturing_accounts: Vec::new(),
        }
    }

    pub fn is_manufacturing_account(&self) -> bool {
        self.account
            .as_ref()
            .is_some_and(|a| self.manufacturing_accounts.iter().any(|m| m == a))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorLevel {
    None,
    Notification,
    Warning,
    Error,
    Critical,
}

/// Error or notice raised by the station, reported to the remote service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockingStationError {
    pub description: String,
    pub level: ErrorLevel,
    pub instrument_serial: Option<String>,
    /// Machine-readable code for remote alerting.
    pub code: Option<String>,
}

impl DockingStationError {
    pub fn new(description: impl Into<String>, level: ErrorLevel) -> Self {
        DockingStationError {
            description: description.into(),
            level,
            instrument_serial: None,
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

// Errors are the same report when their text matches.
impl PartialEq for DockingStationError {
    fn eq(&self, other: &Self) -> bool {
        self.description == other.description
    }
}

impl Eq for DockingStationError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas::{Cylinder, PressureLevel, ZERO_AIR_PART};

    fn zero_air() -> Cylinder {
        Cylinder {
            part_number: ZERO_AIR_PART.into(),
            factory_id: None,
            expiration_date: None,
            pressure: PressureLevel::Full,
            gases: Vec::new(),
        }
    }

    #[test]
    fn errors_compare_by_description() {
        let a = DockingStationError::new("pump fault", ErrorLevel::Error);
        let b = DockingStationError::new("pump fault", ErrorLevel::Warning).with_code("P1");
        assert_eq!(a, b);
        assert_ne!(a, DockingStationError::new("valve fault", ErrorLevel::Error));
    }

    #[test]
    fn port1_legality() {
        let zero_only = Port1Restrictions {
            fresh_air: false,
            zero_air: true,
        };
        assert!(zero_only.is_legal(&zero_air()));
        assert!(!zero_only.is_legal(&Cylinder::fresh_air()));
        assert!(!zero_only.allows(&Cylinder::fresh_air()));
        assert!(Port1Restrictions::NONE.is_legal(&Cylinder::fresh_air()));
        assert!(zero_only.zero_air_only());
    }
}
