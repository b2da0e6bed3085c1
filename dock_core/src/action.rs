//! Next steps the executor is told to perform.

use serde::{Deserialize, Serialize};

use crate::gas::GasEndPoint;

/// Operator- and remote-facing text attached to notification actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Notification {
    pub description: String,
    /// Codes rendered on the LCD.
    pub codes: Vec<String>,
    /// Codes sent with the remote error report.
    pub error_codes: Vec<String>,
}

impl Notification {
    pub fn new(description: impl Into<String>) -> Self {
        Notification {
            description: description.into(),
            ..Notification::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SettingsReadAction {
    pub post_update: bool,
    pub settings_ref: Option<i64>,
    /// Per-port mask of smart cards to re-read; `None` re-reads all of them.
    pub changed_smart_cards: Option<Vec<bool>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PressureResetAction {
    pub post_update: bool,
    pub settings_ref: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GasOperationAction {
    /// Sensor type codes to operate on; empty means every sensor.
    pub component_codes: Vec<String>,
    /// Cylinders selected by the resource matcher.
    pub gas_end_points: Vec<GasEndPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FirmwareUpgradeAction {
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DockingStationAction {
    Nothing,
    SettingsRead(SettingsReadAction),
    SettingsUpdate,
    CylinderPressureReset(PressureResetAction),
    InstrumentBumpTest(GasOperationAction),
    InstrumentCalibration(GasOperationAction),
    InstrumentFirmwareUpgrade(FirmwareUpgradeAction),
    InstrumentDiagnostic,
    InstrumentDatalogDownload,
    InstrumentDatalogClear,
    InstrumentAlarmEventsDownload,
    InstrumentAlarmEventsClear,
    InstrumentManualOperationsDownload,
    InstrumentManualOperationsClear,
    Reboot,
    Unavailable(Notification),
    ResourceUnavailable(Notification),
    UnsupportedCylinder(Notification),
    BadPumpTubingDetected(Notification),
}

impl DockingStationAction {
    pub fn name(&self) -> &'static str {
        match self {
            DockingStationAction::Nothing => "Nothing",
            DockingStationAction::SettingsRead(_) => "SettingsRead",
            DockingStationAction::SettingsUpdate => "SettingsUpdate",
            DockingStationAction::CylinderPressureReset(_) => "CylinderPressureReset",
            DockingStationAction::InstrumentBumpTest(_) => "InstrumentBumpTest",
            DockingStationAction::InstrumentCalibration(_) => "InstrumentCalibration",
            DockingStationAction::InstrumentFirmwareUpgrade(_) => "InstrumentFirmwareUpgrade",
            DockingStationAction::InstrumentDiagnostic => "InstrumentDiagnostic",
            DockingStationAction::InstrumentDatalogDownload => "InstrumentDatalogDownload",
            DockingStationAction::InstrumentDatalogClear => "InstrumentDatalogClear",
            DockingStationAction::InstrumentAlarmEventsDownload => "InstrumentAlarmEventsDownload",
            DockingStationAction::InstrumentAlarmEventsClear => "InstrumentAlarmEventsClear",
            DockingStationAction::InstrumentManualOperationsDownload => {
                "InstrumentManualOperationsDownload"
            }
            DockingStationAction::InstrumentManualOperationsClear => {
                "InstrumentManualOperationsClear"
            }
            DockingStationAction::Reboot => "Reboot",
            DockingStationAction::Unavailable(_) => "Unavailable",
            DockingStationAction::ResourceUnavailable(_) => "ResourceUnavailable",
            DockingStationAction::UnsupportedCylinder(_) => "UnsupportedCylinder",
            DockingStationAction::BadPumpTubingDetected(_) => "BadPumpTubingDetected",
        }
    }

    /// Notification payload, for actions that must also be reported remotely.
    pub fn notification(&self) -> Option<&Notification> {
        match self {
            DockingStationAction::Unavailable(n)
            | DockingStationAction::ResourceUnavailable(n)
            | DockingStationAction::UnsupportedCylinder(n)
            | DockingStationAction::BadPumpTubingDetected(n) => Some(n),
            _ => None,
        }
    }

    /// Gas operation payload of bump and calibration actions.
    pub fn gas_operation(&self) -> Option<&GasOperationAction> {
        match self {
            DockingStationAction::InstrumentBumpTest(g)
            | DockingStationAction::InstrumentCalibration(g) => Some(g),
            _ => None,
        }
    }

    pub fn gas_operation_mut(&mut self) -> Option<&mut GasOperationAction> {
        match self {
            DockingStationAction::InstrumentBumpTest(g)
            | DockingStationAction::InstrumentCalibration(g) => Some(g),
            _ => None,
        }
    }

    /// Actions that cannot run without cylinders attached.
    pub fn requires_gas(&self) -> bool {
        matches!(
            self,
            DockingStationAction::InstrumentBumpTest(_)
                | DockingStationAction::InstrumentCalibration(_)
                | DockingStationAction::InstrumentFirmwareUpgrade(_)
        )
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, DockingStationAction::Nothing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_notification_variants_expose_text() {
        let n = DockingStationAction::ResourceUnavailable(Notification::new("no gas"));
        assert_eq!(n.notification().map(|n| n.description.as_str()), Some("no gas"));
        assert!(DockingStationAction::Reboot.notification().is_none());
        assert!(DockingStationAction::Nothing.is_nothing());
    }

    #[test]
    fn gas_requirement() {
        assert!(DockingStationAction::InstrumentBumpTest(GasOperationAction::default()).requires_gas());
        assert!(
            DockingStationAction::InstrumentFirmwareUpgrade(FirmwareUpgradeAction::default())
                .requires_gas()
        );
        assert!(!DockingStationAction::InstrumentDatalogDownload.requires_gas());
    }
}
