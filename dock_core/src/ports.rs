//! Collaborator interfaces the decision core relies on.
//!
//! Storage, remote transport, scheduling, settings discovery and the display
//! live outside the core; only the contracts are defined here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::{DockingStationAction, SettingsReadAction};
use crate::error::Result;
use crate::event::{DockingStationEvent, EventCode};
use crate::gas::{FactoryCylinder, GasEndPoint, PressureLevel};
use crate::station::DockingStation;
use crate::upload::UploadPayload;

/// One row of the event journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventJournal {
    pub code: EventCode,
    /// Sensor uid for per-sensor rows, `None` for whole-subject rows.
    pub component_id: Option<String>,
    /// Instrument serial, or the station serial for station events.
    pub serial_number: String,
    pub sample_time: DateTime<Utc>,
    pub event_time: DateTime<Utc>,
    pub docked_time: Option<DateTime<Utc>>,
    pub passed: bool,
    pub position: Option<u8>,
    pub firmware_version: Option<String>,
}

/// Writes made inside one transaction. Nothing is visible until `commit`;
/// dropping the transaction discards every buffered write.
pub trait StoreTxn {
    fn save_journal(&mut self, row: EventJournal) -> Result<()>;
    fn delete_schedule(&mut self, id: i64) -> Result<()>;
    /// Replace the whole installed-cylinder set.
    fn replace_gas_end_points(&mut self, installed: &[GasEndPoint]) -> Result<()>;
    /// Overwrite only the given ports.
    fn update_gas_end_points(&mut self, changed: &[GasEndPoint]) -> Result<()>;
    fn update_cylinder_pressure(&mut self, position: u8, pressure: PressureLevel) -> Result<()>;
    fn commit(self: Box<Self>) -> Result<()>;
}

pub trait DataStore: Send + Sync {
    fn begin(&self) -> Result<Box<dyn StoreTxn + '_>>;
    fn gas_end_points(&self) -> Result<Vec<GasEndPoint>>;
    fn find_factory_cylinder(&self, part_number: &str) -> Result<Option<FactoryCylinder>>;
}

/// Transport to the remote service.
pub trait RemoteUploader: Send + Sync {
    /// Send one queued payload. `Some(code)` means it was not accepted.
    fn upload(&self, payload: &UploadPayload, label: &str, account: &str) -> Option<String>;
    /// Poll the remote service for pending station state.
    fn exchange_status(&self, station: &DockingStation) -> Result<()>;
    /// Release the connection.
    fn close(&self) {}
}

/// General-purpose scheduler consulted when no follow-up applies.
pub trait Scheduler: Send + Sync {
    fn next_action(&self, event: &DockingStationEvent) -> DockingStationAction;
    /// Put an action that could not run back into the schedule.
    fn reforce_event(&self, action: &DockingStationAction);
}

/// Reads station settings and installed cylinders from the hardware.
pub trait SettingsReader: Send + Sync {
    fn read_settings(&self, action: &SettingsReadAction) -> Result<DockingStationEvent>;
}

/// Local artifacts written in cal-station mode.
pub trait ArtifactExporter: Send + Sync {
    fn export_gas_responses(&self, event: &DockingStationEvent) -> Result<()>;
    fn export_datalog(&self, event: &DockingStationEvent) -> Result<()>;
}

/// Sink for errors raised outside the event flow.
pub trait ErrorSink: Send + Sync {
    fn report_error(&self, error: crate::station::DockingStationError);
}
