//! Test and helper doubles for dock_core collaborators.
//!
//! These back the simulated CLI run and the integration tests; production
//! deployments plug in real uploaders, schedulers and instrument readers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::action::{DockingStationAction, SettingsReadAction};
use crate::error::Result;
use crate::event::{DockingStationEvent, EventKind, SettingsReadEvent};
use crate::gas::GasEndPoint;
use crate::ports::{ErrorSink, RemoteUploader, Scheduler, SettingsReader};
use crate::station::{DockingStation, DockingStationError};
use crate::upload::UploadPayload;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scheduler that proposes whatever it was last told to; `Nothing` by default.
#[derive(Debug)]
pub struct ScriptedScheduler {
    next: Mutex<DockingStationAction>,
    reforced: Mutex<Vec<String>>,
}

impl Default for ScriptedScheduler {
    fn default() -> Self {
        Self::new(DockingStationAction::Nothing)
    }
}

impl ScriptedScheduler {
    pub fn new(next: DockingStationAction) -> Self {
        Self {
            next: Mutex::new(next),
            reforced: Mutex::new(Vec::new()),
        }
    }

    pub fn set_next(&self, action: DockingStationAction) {
        *lock(&self.next) = action;
    }

    /// Names of actions handed back through `reforce_event`.
    pub fn reforced(&self) -> Vec<String> {
        lock(&self.reforced).clone()
    }
}

impl Scheduler for ScriptedScheduler {
    fn next_action(&self, _event: &DockingStationEvent) -> DockingStationAction {
        lock(&self.next).clone()
    }

    fn reforce_event(&self, action: &DockingStationAction) {
        lock(&self.reforced).push(action.name().to_string());
    }
}

/// One call seen by `RecordingUploader`.
#[derive(Debug, Clone)]
pub struct UploadCall {
    pub label: String,
    pub account: String,
    pub payload: UploadPayload,
}

/// Uploader that records every call and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingUploader {
    calls: Mutex<Vec<UploadCall>>,
    status_exchanges: Mutex<u32>,
    failing: AtomicBool,
    closed: AtomicBool,
}

impl RecordingUploader {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<UploadCall> {
        lock(&self.calls).clone()
    }

    pub fn labels(&self) -> Vec<String> {
        lock(&self.calls).iter().map(|c| c.label.clone()).collect()
    }

    pub fn status_exchanges(&self) -> u32 {
        *lock(&self.status_exchanges)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl RemoteUploader for RecordingUploader {
    fn upload(&self, payload: &UploadPayload, label: &str, account: &str) -> Option<String> {
        if self.failing.load(Ordering::SeqCst) {
            return Some(format!("upload of {label} refused"));
        }
        lock(&self.calls).push(UploadCall {
            label: label.to_string(),
            account: account.to_string(),
            payload: payload.clone(),
        });
        None
    }

    fn exchange_status(&self, _station: &DockingStation) -> Result<()> {
        *lock(&self.status_exchanges) += 1;
        if self.failing.load(Ordering::SeqCst) {
            eyre::bail!("status exchange refused");
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Settings reader answering with a fixed cylinder inventory.
#[derive(Debug)]
pub struct StaticSettingsReader {
    station: DockingStation,
    installed: Mutex<Vec<GasEndPoint>>,
}

impl StaticSettingsReader {
    pub fn new(station: DockingStation, installed: Vec<GasEndPoint>) -> Self {
        Self {
            station,
            installed: Mutex::new(installed),
        }
    }

    pub fn set_installed(&self, installed: Vec<GasEndPoint>) {
        *lock(&self.installed) = installed;
    }
}

impl SettingsReader for StaticSettingsReader {
    fn read_settings(&self, action: &SettingsReadAction) -> Result<DockingStationEvent> {
        let installed = lock(&self.installed).clone();
        let changed_cylinders = match &action.changed_smart_cards {
            Some(mask) => installed
                .iter()
                .filter(|g| {
                    mask.get(usize::from(g.position).saturating_sub(1))
                        .copied()
                        .unwrap_or(false)
                })
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        let installed_cylinders = if action.changed_smart_cards.is_some() {
            Vec::new()
        } else {
            installed
        };
        Ok(DockingStationEvent::new(
            EventKind::SettingsRead(SettingsReadEvent {
                installed_cylinders,
                changed_cylinders,
                post_update: action.post_update,
                settings_ref: action.settings_ref,
            }),
            self.station.clone(),
        ))
    }
}

/// Error sink that keeps everything it receives.
#[derive(Debug, Default)]
pub struct RecordingErrorSink {
    errors: Mutex<Vec<DockingStationError>>,
}

impl RecordingErrorSink {
    pub fn errors(&self) -> Vec<DockingStationError> {
        lock(&self.errors).clone()
    }
}

impl ErrorSink for RecordingErrorSink {
    fn report_error(&self, error: DockingStationError) {
        lock(&self.errors).push(error);
    }
}
