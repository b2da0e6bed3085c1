//! Outcomes of completed docking-station operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gas::GasEndPoint;
use crate::instrument::{Instrument, SensorStatus};
use crate::station::{DockingStation, DockingStationError, ErrorLevel};

/// Journal code of a persisted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCode {
    SettingsRead,
    SettingsUpdate,
    Calibration,
    BumpTest,
    Diagnostic,
    DatalogDownload,
    AlarmEventsDownload,
    ManualOperationsDownload,
    DataClear,
    FirmwareUpgrade,
    CylinderPressureReset,
}

impl EventCode {
    pub fn as_str(self) -> &'static str {
        match self {
            EventCode::SettingsRead => "SETREAD",
            EventCode::SettingsUpdate => "SETUPDATE",
            EventCode::Calibration => "CAL",
            EventCode::BumpTest => "BUMP",
            EventCode::Diagnostic => "DIAG",
            EventCode::DatalogDownload => "DLDL",
            EventCode::AlarmEventsDownload => "ALDL",
            EventCode::ManualOperationsDownload => "MODL",
            EventCode::DataClear => "CLEAR",
            EventCode::FirmwareUpgrade => "UPGRADE",
            EventCode::CylinderPressureReset => "CYLRESET",
        }
    }
}

impl std::fmt::Display for EventCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Trigger {
    Scheduled,
    Manual,
    Docked,
    #[default]
    Unscheduled,
}

/// Schedule an event was run for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRef {
    pub id: i64,
    pub run_once: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsedCylinder {
    pub position: u8,
    pub part_number: String,
}

/// Result of exposing one sensor to gas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorGasResponse {
    pub uid: String,
    pub type_code: String,
    pub gas_code: String,
    pub status: SensorStatus,
    pub span_reserve: f64,
    pub reading: f64,
    pub time: DateTime<Utc>,
    pub position: u8,
    pub used_cylinders: Vec<UsedCylinder>,
}

impl SensorGasResponse {
    pub fn passed(&self) -> bool {
        self.status.passed()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SettingsReadEvent {
    /// Full installed set; replaces what is stored.
    pub installed_cylinders: Vec<GasEndPoint>,
    /// Only the ports whose cylinder changed.
    pub changed_cylinders: Vec<GasEndPoint>,
    pub post_update: bool,
    pub settings_ref: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SettingsUpdateEvent {
    pub settings_ref: Option<i64>,
    pub reboot_required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GasResponseEvent {
    pub responses: Vec<SensorGasResponse>,
    /// Calibrations run because an O2 sensor failed a high-concentration bump.
    pub high_bump_failure_cal_responses: Vec<SensorGasResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DiagnosticEvent {
    /// Operator-driven diagnostics are never journaled.
    pub interactive: bool,
    pub critical_error: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadedEntry {
    pub started: DateTime<Utc>,
    pub record_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DownloadEvent {
    pub entries: Vec<DownloadedEntry>,
    pub corrupted: bool,
}

impl DownloadEvent {
    /// Instrument memory must be cleared after anything was read, or when it was corrupt.
    pub fn needs_clear(&self) -> bool {
        !self.entries.is_empty() || self.corrupted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClearTarget {
    Datalog,
    AlarmEvents,
    ManualOperations,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FirmwareUpgradeEvent {
    pub passed: bool,
    pub target_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PressureResetEvent {
    pub post_update: bool,
    pub settings_ref: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    /// Heartbeat: nothing was done.
    Nothing,
    SettingsRead(SettingsReadEvent),
    SettingsUpdate(SettingsUpdateEvent),
    InstrumentCalibration(GasResponseEvent),
    InstrumentBumpTest(GasResponseEvent),
    InstrumentDiagnostic(DiagnosticEvent),
    InstrumentDatalogDownload(DownloadEvent),
    InstrumentAlarmEventsDownload(DownloadEvent),
    InstrumentManualOperationsDownload(DownloadEvent),
    InstrumentDataClear(ClearTarget),
    InstrumentFirmwareUpgrade(FirmwareUpgradeEvent),
    CylinderPressureReset(PressureResetEvent),
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Nothing => "Nothing",
            EventKind::SettingsRead(_) => "SettingsRead",
            EventKind::SettingsUpdate(_) => "SettingsUpdate",
            EventKind::InstrumentCalibration(_) => "InstrumentCalibration",
            EventKind::InstrumentBumpTest(_) => "InstrumentBumpTest",
            EventKind::InstrumentDiagnostic(_) => "InstrumentDiagnostic",
            EventKind::InstrumentDatalogDownload(_) => "InstrumentDatalogDownload",
            EventKind::InstrumentAlarmEventsDownload(_) => "InstrumentAlarmEventsDownload",
            EventKind::InstrumentManualOperationsDownload(_) => {
                "InstrumentManualOperationsDownload"
            }
            EventKind::InstrumentDataClear(_) => "InstrumentDataClear",
            EventKind::InstrumentFirmwareUpgrade(_) => "InstrumentFirmwareUpgrade",
            EventKind::CylinderPressureReset(_) => "CylinderPressureReset",
        }
    }

    /// Journal code this kind is persisted under, if any.
    pub fn default_code(&self) -> Option<EventCode> {
        match self {
            EventKind::Nothing => None,
            EventKind::InstrumentDiagnostic(d) if d.interactive => None,
            EventKind::InstrumentDiagnostic(_) => Some(EventCode::Diagnostic),
            EventKind::SettingsRead(_) => Some(EventCode::SettingsRead),
            EventKind::SettingsUpdate(_) => Some(EventCode::SettingsUpdate),
            EventKind::InstrumentCalibration(_) => Some(EventCode::Calibration),
            EventKind::InstrumentBumpTest(_) => Some(EventCode::BumpTest),
            EventKind::InstrumentDatalogDownload(_) => Some(EventCode::DatalogDownload),
            EventKind::InstrumentAlarmEventsDownload(_) => Some(EventCode::AlarmEventsDownload),
            EventKind::InstrumentManualOperationsDownload(_) => {
                Some(EventCode::ManualOperationsDownload)
            }
            EventKind::InstrumentDataClear(_) => Some(EventCode::DataClear),
            EventKind::InstrumentFirmwareUpgrade(_) => Some(EventCode::FirmwareUpgrade),
            EventKind::CylinderPressureReset(_) => Some(EventCode::CylinderPressureReset),
        }
    }

    /// Gas-response payload of calibration and bump events.
    pub fn gas_responses(&self) -> Option<&GasResponseEvent> {
        match self {
            EventKind::InstrumentCalibration(g) | EventKind::InstrumentBumpTest(g) => Some(g),
            _ => None,
        }
    }
}

/// A completed operation, handed once to the reporting pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockingStationEvent {
    pub code: Option<EventCode>,
    pub trigger: Trigger,
    pub time: DateTime<Utc>,
    pub station: DockingStation,
    pub instrument: Option<Instrument>,
    pub errors: Vec<DockingStationError>,
    pub schedule: Option<ScheduleRef>,
    pub kind: EventKind,
}

impl DockingStationEvent {
    pub fn new(kind: EventKind, station: DockingStation) -> Self {
        DockingStationEvent {
            code: kind.default_code(),
            trigger: Trigger::default(),
            time: Utc::now(),
            station,
            instrument: None,
            errors: Vec::new(),
            schedule: None,
            kind,
        }
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_instrument(mut self, instrument: Instrument) -> Self {
        self.instrument = Some(instrument);
        self
    }

    pub fn with_schedule(mut self, schedule: ScheduleRef) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn with_error(mut self, error: DockingStationError) -> Self {
        self.errors.push(error);
        self
    }

    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self.kind, EventKind::Nothing)
    }

    /// Events that leave the station needing a restart.
    pub fn reboot_required(&self) -> bool {
        matches!(&self.kind, EventKind::SettingsUpdate(u) if u.reboot_required)
    }

    pub fn max_error_level(&self) -> ErrorLevel {
        self.errors
            .iter()
            .map(|e| e.level)
            .max()
            .unwrap_or(ErrorLevel::None)
    }

    pub fn is_instrument_event(&self) -> bool {
        !matches!(
            self.kind,
            EventKind::Nothing
                | EventKind::SettingsRead(_)
                | EventKind::SettingsUpdate(_)
                | EventKind::CylinderPressureReset(_)
        )
    }
}
