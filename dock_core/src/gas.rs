//! Gas types, cylinders and the gas end points that hold them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Gas codes known to the decision core.
pub mod gas_code {
    pub const CO: &str = "G0001";
    pub const H2S: &str = "G0002";
    pub const SO2: &str = "G0003";
    pub const NO2: &str = "G0004";
    pub const CL2: &str = "G0005";
    pub const CLO2: &str = "G0006";
    pub const HCN: &str = "G0007";
    pub const PH3: &str = "G0008";
    pub const H2: &str = "G0009";
    pub const NO: &str = "G0011";
    pub const NH3: &str = "G0012";
    pub const HCL: &str = "G0013";
    pub const CO2: &str = "G0018";
    pub const O2: &str = "G0020";
    pub const CH4: &str = "G0021";
    pub const PENTANE: &str = "G0022";
    pub const PROPANE: &str = "G0023";
    pub const N2: &str = "G0026";
}

/// Part number of the ambient air inlet.
pub const FRESH_AIR_PART: &str = "FRESH AIR";
/// Part number of certified zero-air cylinders.
pub const ZERO_AIR_PART: &str = "ZERO AIR";
/// Oxygen content of air, in ppm.
pub const AIR_O2_PPM: f64 = 209_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasType {
    pub code: &'static str,
    pub symbol: &'static str,
    /// %LEL per ppm; zero for non-explosive gases.
    pub lel_multiplier: f64,
}

const GAS_TYPES: &[GasType] = &[
    GasType { code: gas_code::CO, symbol: "CO", lel_multiplier: 0.0 },
    GasType { code: gas_code::H2S, symbol: "H2S", lel_multiplier: 0.0 },
    GasType { code: gas_code::SO2, symbol: "SO2", lel_multiplier: 0.0 },
    GasType { code: gas_code::NO2, symbol: "NO2", lel_multiplier: 0.0 },
    GasType { code: gas_code::CL2, symbol: "Cl2", lel_multiplier: 0.0 },
    GasType { code: gas_code::CLO2, symbol: "ClO2", lel_multiplier: 0.0 },
    GasType { code: gas_code::HCN, symbol: "HCN", lel_multiplier: 0.0 },
    GasType { code: gas_code::PH3, symbol: "PH3", lel_multiplier: 0.0 },
    GasType { code: gas_code::H2, symbol: "H2", lel_multiplier: 0.0025 },
    GasType { code: gas_code::NO, symbol: "NO", lel_multiplier: 0.0 },
    GasType { code: gas_code::NH3, symbol: "NH3", lel_multiplier: 0.0 },
    GasType { code: gas_code::HCL, symbol: "HCl", lel_multiplier: 0.0 },
    GasType { code: gas_code::CO2, symbol: "CO2", lel_multiplier: 0.0 },
    GasType { code: gas_code::O2, symbol: "O2", lel_multiplier: 0.0 },
    GasType { code: gas_code::CH4, symbol: "CH4", lel_multiplier: 0.002 },
    GasType { code: gas_code::PENTANE, symbol: "Pentane", lel_multiplier: 0.007_143 },
    GasType { code: gas_code::PROPANE, symbol: "Propane", lel_multiplier: 0.004_762 },
    GasType { code: gas_code::N2, symbol: "N2", lel_multiplier: 0.0 },
];

impl GasType {
    pub fn find(code: &str) -> Option<&'static GasType> {
        GAS_TYPES.iter().find(|g| g.code == code)
    }

    /// Resolve a configured gas by code or (case-insensitive) symbol.
    pub fn lookup(code_or_symbol: &str) -> Option<&'static GasType> {
        let wanted = code_or_symbol.trim();
        GAS_TYPES
            .iter()
            .find(|g| g.code == wanted || g.symbol.eq_ignore_ascii_case(wanted))
    }

    /// Display symbol for a gas code, falling back to the code itself.
    pub fn symbol_for(code: &str) -> &str {
        Self::find(code).map_or(code, |g| g.symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PressureLevel {
    Full,
    Low,
    Empty,
}

impl PressureLevel {
    /// One step down; Empty stays Empty.
    pub fn downgraded(self) -> Self {
        match self {
            PressureLevel::Full => PressureLevel::Low,
            PressureLevel::Low | PressureLevel::Empty => PressureLevel::Empty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasConcentration {
    pub gas_code: String,
    pub ppm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cylinder {
    pub part_number: String,
    pub factory_id: Option<i64>,
    pub expiration_date: Option<NaiveDate>,
    pub pressure: PressureLevel,
    pub gases: Vec<GasConcentration>,
}

impl Cylinder {
    pub fn fresh_air() -> Self {
        Cylinder {
            part_number: FRESH_AIR_PART.to_string(),
            factory_id: None,
            expiration_date: None,
            pressure: PressureLevel::Full,
            gases: Vec::new(),
        }
    }

    pub fn is_fresh_air(&self) -> bool {
        self.part_number == FRESH_AIR_PART
    }

    pub fn is_zero_air(&self) -> bool {
        if self.part_number == ZERO_AIR_PART {
            return true;
        }
        matches!(self.gases.as_slice(), [only] if only.gas_code == gas_code::O2 && (only.ppm - AIR_O2_PPM).abs() < 1.0)
    }

    pub fn is_pure_nitrogen(&self) -> bool {
        matches!(self.gases.as_slice(), [only] if only.gas_code == gas_code::N2)
    }

    pub fn concentration(&self, gas: &str) -> Option<f64> {
        self.gases.iter().find(|g| g.gas_code == gas).map(|g| g.ppm)
    }

    pub fn contains_gas(&self, gas: &str) -> bool {
        self.concentration(gas).is_some()
    }

    /// Expired when the expiration date is strictly before `today`.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiration_date.is_some_and(|d| d < today)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallationType {
    /// Smart-card (iGas) cylinder on the manifold.
    ISmartCard,
    Manifold,
    Manual,
}

/// Gas source at a numbered port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasEndPoint {
    pub position: u8,
    pub installation: InstallationType,
    pub cylinder: Cylinder,
    /// `None` until checked against the factory catalog.
    #[serde(skip)]
    pub supported: Option<bool>,
}

impl GasEndPoint {
    pub fn new(position: u8, cylinder: Cylinder) -> Self {
        GasEndPoint {
            position,
            installation: InstallationType::ISmartCard,
            cylinder,
            supported: None,
        }
    }

    pub fn key(&self) -> (u8, &str) {
        (self.position, self.cylinder.part_number.as_str())
    }
}

/// Known cylinder part number from the factory catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactoryCylinder {
    pub part_number: String,
    pub factory_id: i64,
    pub gases: Vec<GasConcentration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pressure_downgrades_one_step() {
        assert_eq!(PressureLevel::Full.downgraded(), PressureLevel::Low);
        assert_eq!(PressureLevel::Low.downgraded(), PressureLevel::Empty);
        assert_eq!(PressureLevel::Empty.downgraded(), PressureLevel::Empty);
    }

    #[test]
    fn lookup_by_symbol_or_code() {
        assert_eq!(GasType::lookup("ch4").map(|g| g.code), Some(gas_code::CH4));
        assert_eq!(GasType::lookup("G0020").map(|g| g.symbol), Some("O2"));
        assert!(GasType::lookup("XYZ").is_none());
        assert_eq!(GasType::symbol_for("G9999"), "G9999");
    }

    #[test]
    fn zero_air_by_content() {
        let cyl = Cylinder {
            part_number: "1810-3001".into(),
            factory_id: Some(4),
            expiration_date: None,
            pressure: PressureLevel::Full,
            gases: vec![GasConcentration {
                gas_code: gas_code::O2.into(),
                ppm: AIR_O2_PPM,
            }],
        };
        assert!(cyl.is_zero_air());
        assert!(!cyl.is_fresh_air());
        assert!(Cylinder::fresh_air().is_fresh_air());
    }

    #[test]
    fn expiration_is_exclusive_of_today() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let mut cyl = Cylinder::fresh_air();
        cyl.expiration_date = Some(today);
        assert!(!cyl.is_expired(today));
        cyl.expiration_date = today.pred_opt();
        assert!(cyl.is_expired(today));
    }
}
