//! Event persistence and mandatory follow-up actions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use eyre::{Report, WrapErr};

use crate::action::{DockingStationAction, PressureResetAction, SettingsReadAction};
use crate::context::DockContext;
use crate::error::{DockError, Result};
use crate::event::{
    DockingStationEvent, EventCode, EventKind, GasResponseEvent, SensorGasResponse,
    SettingsReadEvent, Trigger,
};
use crate::gas::{FRESH_AIR_PART, ZERO_AIR_PART};
use crate::instrument::{SensorStatus, sensor_code};
use crate::ports::{DataStore, EventJournal, StoreTxn};

pub struct EventProcessor {
    store: Arc<dyn DataStore>,
    ctx: Arc<DockContext>,
}

impl EventProcessor {
    pub fn new(store: Arc<dyn DataStore>, ctx: Arc<DockContext>) -> Self {
        Self { store, ctx }
    }

    /// Persist `event` in one transaction and refresh the cached state it
    /// affects. Events without a code are not persisted.
    pub fn save(
        &self,
        event: &DockingStationEvent,
        last_docked_time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let Some(code) = event.code else {
            tracing::trace!(event = event.kind.name(), "event has no code; not persisted");
            return Ok(());
        };

        let mut txn = self.store.begin()?;
        for row in journal_rows(code, event, last_docked_time) {
            txn.save_journal(row)?;
        }
        if let Some(schedule) = event.schedule.filter(|s| s.run_once) {
            txn.delete_schedule(schedule.id)?;
            tracing::debug!(schedule = schedule.id, "run-once schedule consumed");
        }
        let cylinders_written = match &event.kind {
            EventKind::SettingsRead(read) => write_cylinders(&mut *txn, read)?,
            _ => false,
        };
        txn.commit().wrap_err_with(|| format!("saving {code} event"))?;

        if cylinders_written {
            let reloaded = self.store.gas_end_points()?;
            tracing::debug!(count = reloaded.len(), "installed cylinders reloaded");
            self.ctx.set_cached_cylinders(reloaded);
        }
        if let EventKind::InstrumentCalibration(g) | EventKind::InstrumentBumpTest(g) = &event.kind {
            self.apply_gas_responses(event, g);
        }
        Ok(())
    }

    /// Mirror gas-operation results into the cached docked instrument and
    /// recompute the bad-gas-hookup flag after a calibration.
    fn apply_gas_responses(&self, event: &DockingStationEvent, g: &GasResponseEvent) {
        let is_cal = matches!(event.kind, EventKind::InstrumentCalibration(_));
        self.ctx.update_docked(|docked| {
            if let Some(instrument) = docked.instrument.as_mut() {
                for r in &g.responses {
                    if let Some(sensor) = instrument.sensor_mut(&r.uid) {
                        if is_cal {
                            sensor.cal_status = r.status;
                        } else {
                            sensor.bump_status = r.status;
                        }
                    }
                }
                for r in &g.high_bump_failure_cal_responses {
                    if let Some(sensor) = instrument.sensor_mut(&r.uid) {
                        sensor.cal_status = r.status;
                    }
                }
            }
            if is_cal || !g.high_bump_failure_cal_responses.is_empty() {
                let cal = if is_cal {
                    &g.responses
                } else {
                    &g.high_bump_failure_cal_responses
                };
                docked.bad_gas_hookup = bad_gas_hookup(cal);
                if let Some(part) = &docked.bad_gas_hookup {
                    tracing::warn!(part_number = %part, "bad gas hookup suspected");
                }
            }
        });
    }

    /// Mandatory next action dictated by the event alone.
    pub fn followup_action(event: &DockingStationEvent) -> Option<DockingStationAction> {
        match &event.kind {
            EventKind::SettingsUpdate(update) if event.trigger == Trigger::Scheduled => Some(
                DockingStationAction::CylinderPressureReset(PressureResetAction {
                    post_update: true,
                    settings_ref: update.settings_ref,
                }),
            ),
            EventKind::SettingsUpdate(update) => {
                Some(DockingStationAction::SettingsRead(SettingsReadAction {
                    post_update: true,
                    settings_ref: update.settings_ref,
                    changed_smart_cards: Some(vec![false; usize::from(event.station.port_count)]),
                }))
            }
            EventKind::CylinderPressureReset(reset) => {
                Some(DockingStationAction::SettingsRead(SettingsReadAction {
                    post_update: reset.post_update,
                    settings_ref: reset.settings_ref,
                    changed_smart_cards: None,
                }))
            }
            EventKind::InstrumentDatalogDownload(d) if d.needs_clear() => {
                Some(DockingStationAction::InstrumentDatalogClear)
            }
            EventKind::InstrumentAlarmEventsDownload(d) if d.needs_clear() => {
                Some(DockingStationAction::InstrumentAlarmEventsClear)
            }
            EventKind::InstrumentManualOperationsDownload(d) if d.needs_clear() => {
                Some(DockingStationAction::InstrumentManualOperationsClear)
            }
            EventKind::InstrumentFirmwareUpgrade(u) if !u.passed => {
                Some(DockingStationAction::Nothing)
            }
            EventKind::InstrumentDiagnostic(d) if d.critical_error.is_some() => {
                Some(DockingStationAction::Nothing)
            }
            _ => None,
        }
    }

    /// Raise the sticky docked-instrument flags that accompany a follow-up.
    pub fn apply_sticky_flags(&self, event: &DockingStationEvent) {
        match &event.kind {
            EventKind::InstrumentFirmwareUpgrade(u) if !u.passed => {
                tracing::warn!(target_version = %u.target_version, "firmware upgrade failed; gas operations suspended");
                self.ctx.update_docked(|d| d.upgrade_error = true);
            }
            EventKind::InstrumentDiagnostic(d) => {
                if let Some(code) = d.critical_error {
                    tracing::warn!(code, "instrument critical error; gas operations suspended");
                    self.ctx.update_docked(|state| state.critical_error = Some(code));
                }
            }
            _ => {}
        }
    }
}

fn write_cylinders(txn: &mut (dyn StoreTxn + '_), read: &SettingsReadEvent) -> Result<bool> {
    match (read.installed_cylinders.is_empty(), read.changed_cylinders.is_empty()) {
        (false, false) => Err(Report::new(DockError::State(
            "settings read carries both a full and a changed cylinder set".into(),
        ))),
        (false, true) => {
            txn.replace_gas_end_points(&read.installed_cylinders)?;
            Ok(true)
        }
        (true, false) => {
            txn.update_gas_end_points(&read.changed_cylinders)?;
            Ok(true)
        }
        (true, true) => Ok(false),
    }
}

/// Part number of the first cylinder blamed for a span failure, or `None`
/// when the instrument aborted the calibration itself.
fn bad_gas_hookup(responses: &[SensorGasResponse]) -> Option<String> {
    if responses
        .iter()
        .any(|r| r.status == SensorStatus::InstrumentAborted)
    {
        return None;
    }
    responses
        .iter()
        .filter(|r| r.type_code != sensor_code::O2)
        .filter(|r| r.status == SensorStatus::SpanFailed && r.span_reserve <= 0.0)
        .find_map(|r| {
            r.used_cylinders
                .iter()
                .find(|c| c.part_number != FRESH_AIR_PART && c.part_number != ZERO_AIR_PART)
                .or_else(|| r.used_cylinders.first())
                .map(|c| c.part_number.clone())
        })
}

fn journal_rows(
    code: EventCode,
    event: &DockingStationEvent,
    docked_time: Option<DateTime<Utc>>,
) -> Vec<EventJournal> {
    let instrument = event.instrument.as_ref();
    let serial = instrument.map_or_else(
        || event.station.serial_number.clone(),
        |i| i.serial_number.clone(),
    );
    let firmware = instrument.map(|i| i.firmware_version.clone());
    let row = |code: EventCode, r: &SensorGasResponse| EventJournal {
        code,
        component_id: Some(r.uid.clone()),
        serial_number: serial.clone(),
        sample_time: r.time,
        event_time: event.time,
        docked_time,
        passed: r.passed(),
        position: Some(r.position),
        firmware_version: firmware.clone(),
    };

    if let Some(g) = event.kind.gas_responses() {
        let mut rows: Vec<EventJournal> = g.responses.iter().map(|r| row(code, r)).collect();
        rows.extend(
            g.high_bump_failure_cal_responses
                .iter()
                .map(|r| row(EventCode::Calibration, r)),
        );
        return rows;
    }

    let passed = match &event.kind {
        EventKind::InstrumentFirmwareUpgrade(u) => u.passed,
        EventKind::InstrumentDiagnostic(d) => d.critical_error.is_none(),
        EventKind::InstrumentDatalogDownload(d)
        | EventKind::InstrumentAlarmEventsDownload(d)
        | EventKind::InstrumentManualOperationsDownload(d) => !d.corrupted,
        _ => event.errors.is_empty(),
    };
    vec![EventJournal {
        code,
        component_id: None,
        serial_number: serial,
        sample_time: event.time,
        event_time: event.time,
        docked_time,
        passed,
        position: None,
        firmware_version: firmware,
    }]
}
