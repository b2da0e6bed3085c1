//! Reporting pipeline: turns a completed event into the next action and
//! drains the durable upload queue.
//!
//! `report_event` is called by the executor after every operation. The
//! `run` loop, driven by a `PollingService`, uploads queued payloads oldest
//! first and stops at the first failure so a flaky link is retried on the
//! next cycle instead of hammering the remote service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::action::{DockingStationAction, Notification, SettingsReadAction};
use crate::context::{DockContext, RunFlag};
use crate::error::Result;
use crate::event::{DockingStationEvent, EventKind};
use crate::gas::{Cylinder, GasEndPoint};
use crate::matcher::{GasOperation, MatchOutcome, ResourceMatcher};
use crate::ports::{
    ArtifactExporter, DataStore, ErrorSink, RemoteUploader, Scheduler, SettingsReader,
};
use crate::processor::EventProcessor;
use crate::queue::{QueueError, UploadQueue};
use crate::service::Service;
use crate::station::{DockingStationError, ErrorLevel};
use crate::upload::{ErrorReport, UploadPayload};

/// Collaborators the pipeline talks to.
pub struct ReporterDeps {
    pub store: Arc<dyn DataStore>,
    pub queue: Arc<dyn UploadQueue>,
    pub uploader: Arc<dyn RemoteUploader>,
    pub scheduler: Arc<dyn Scheduler>,
    pub settings: Arc<dyn SettingsReader>,
    /// Only used in cal-station mode.
    pub exporter: Option<Arc<dyn ArtifactExporter>>,
}

#[derive(Debug, Clone, Default)]
pub struct ReporterConfig {
    /// Remote service URL; the queue is never drained while unset.
    pub uploader_url: Option<String>,
    /// Leave undecodable queue entries in place instead of deleting them.
    pub keep_poison: bool,
}

pub struct ReporterService {
    ctx: Arc<DockContext>,
    deps: ReporterDeps,
    processor: EventProcessor,
    config: ReporterConfig,
    paused: AtomicBool,
    last_notification: Mutex<Option<String>>,
    pending_errors: Mutex<Vec<DockingStationError>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ReporterService {
    pub fn new(ctx: Arc<DockContext>, deps: ReporterDeps, config: ReporterConfig) -> Self {
        let processor = EventProcessor::new(Arc::clone(&deps.store), Arc::clone(&ctx));
        Self {
            ctx,
            deps,
            processor,
            config,
            paused: AtomicBool::new(false),
            last_notification: Mutex::new(None),
            pending_errors: Mutex::new(Vec::new()),
        }
    }

    pub fn processor(&self) -> &EventProcessor {
        &self.processor
    }

    /// Persist and upload `event`, then decide what the executor does next.
    /// Returns `None` for an event without a station serial number.
    pub fn report_event(&self, event: &DockingStationEvent) -> Option<DockingStationAction> {
        if event.station.serial_number.trim().is_empty() {
            tracing::warn!(event = event.kind.name(), "ignoring event without station serial");
            return None;
        }
        tracing::info!(
            event = event.kind.name(),
            code = ?event.code,
            trigger = ?event.trigger,
            serial = %event.station.serial_number,
            instrument = event.instrument.as_ref().map(|i| i.serial_number.as_str()),
            errors = event.errors.len(),
            "event reported"
        );

        let docked_time = self.ctx.docked().docked_time;
        if let Err(e) = self.processor.save(event, docked_time) {
            tracing::error!(error = %e, event = event.kind.name(), "failed to persist event");
            self.report_error(DockingStationError::new(
                format!("Failed to save {} event: {e}", event.kind.name()),
                ErrorLevel::Error,
            ));
        }

        if event.code.is_some() || !event.errors.is_empty() {
            self.upload_event(event);
        }
        if event.station.cal_station_mode {
            self.export_artifacts(event);
        }
        self.report_queued_errors();

        if event.max_error_level() >= ErrorLevel::Error {
            let description = event
                .errors
                .iter()
                .max_by_key(|e| e.level)
                .map(|e| e.description.clone())
                .unwrap_or_default();
            tracing::warn!(%description, "event carried errors; station unavailable");
            return Some(DockingStationAction::Unavailable(Notification::new(description)));
        }

        let action = self.next_action(event);
        self.dedup_notification(&action);
        tracing::info!(event = event.kind.name(), action = action.name(), "next action decided");
        Some(action)
    }

    fn next_action(&self, event: &DockingStationEvent) -> DockingStationAction {
        if event.reboot_required() {
            return DockingStationAction::Reboot;
        }
        if let Some(followup) = EventProcessor::followup_action(event) {
            self.processor.apply_sticky_flags(event);
            tracing::debug!(action = followup.name(), "mandatory follow-up");
            return followup;
        }
        if event.is_heartbeat() {
            let station = self.ctx.station();
            if let Err(e) = self.deps.uploader.exchange_status(&station) {
                tracing::warn!(error = %e, "status exchange failed");
            }
        }

        let action = self.deps.scheduler.next_action(event);
        if action.requires_gas() && self.ctx.docked().has_sticky_error() {
            tracing::info!(
                action = action.name(),
                "sticky instrument error; gas operation suppressed"
            );
            return DockingStationAction::Nothing;
        }
        self.resolve_resources(action, event)
    }

    /// Attach cylinders to gas-requiring actions, or explain why none qualify.
    fn resolve_resources(
        &self,
        mut action: DockingStationAction,
        event: &DockingStationEvent,
    ) -> DockingStationAction {
        let op = match action {
            DockingStationAction::InstrumentBumpTest(_) => Some(GasOperation::BumpTest),
            DockingStationAction::InstrumentCalibration(_) => Some(GasOperation::Calibration),
            DockingStationAction::InstrumentFirmwareUpgrade(_) => None,
            DockingStationAction::Nothing => {
                return self
                    .check_installed_cylinders()
                    .unwrap_or(DockingStationAction::Nothing);
            }
            _ => return action,
        };

        let Some(instrument) = self
            .ctx
            .docked()
            .instrument
            .or_else(|| event.instrument.clone())
        else {
            tracing::debug!(action = action.name(), "no instrument known; resources not resolved");
            return action;
        };
        let cylinders = self.installed_cylinders();
        let matcher = ResourceMatcher::new(&self.ctx.station(), Utc::now().date_naive());

        let failed = match op {
            Some(op) => {
                let codes = action
                    .gas_operation()
                    .map(|g| g.component_codes.clone())
                    .unwrap_or_default();
                let outcome = matcher.match_resources(op, &codes, &instrument, &cylinders);
                if outcome.is_match() {
                    if let Some(g) = action.gas_operation_mut() {
                        g.gas_end_points = outcome.matched;
                    }
                    None
                } else {
                    Some(outcome)
                }
            }
            None => [GasOperation::Calibration, GasOperation::BumpTest]
                .into_iter()
                .map(|op| matcher.match_resources(op, &[], &instrument, &cylinders))
                .find(|o| !o.is_match()),
        };

        match failed {
            None => action,
            Some(outcome) => {
                tracing::info!(
                    action = action.name(),
                    explanation = %outcome.explanation,
                    "gas unavailable; re-queueing action"
                );
                self.deps.scheduler.reforce_event(&action);
                DockingStationAction::ResourceUnavailable(notification_from(outcome))
            }
        }
    }

    fn installed_cylinders(&self) -> Vec<GasEndPoint> {
        let cached = self.ctx.cached_cylinders();
        if !cached.is_empty() {
            return cached;
        }
        match self.deps.store.gas_end_points() {
            Ok(stored) => {
                self.ctx.set_cached_cylinders(stored);
                self.ctx.cached_cylinders()
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load installed cylinders");
                Vec::new()
            }
        }
    }

    fn is_supported(&self, cylinder: &Cylinder) -> Option<bool> {
        if cylinder.is_fresh_air() || cylinder.is_zero_air() {
            return Some(true);
        }
        match self.deps.store.find_factory_cylinder(&cylinder.part_number) {
            Ok(found) => Some(found.is_some()),
            Err(e) => {
                tracing::warn!(error = %e, part_number = %cylinder.part_number, "catalog lookup failed");
                None
            }
        }
    }

    /// Flag the first installed cylinder that is unknown to the catalog or
    /// illegal on port 1.
    fn check_installed_cylinders(&self) -> Option<DockingStationAction> {
        let restrictions = self.ctx.station().port1_restrictions;
        let mut cylinders = self.installed_cylinders();
        for c in &mut cylinders {
            if c.supported.is_none() {
                c.supported = self.is_supported(&c.cylinder);
            }
        }
        self.ctx.update_cached_cylinders(|cached| {
            for c in cached.iter_mut() {
                if let Some(checked) = cylinders.iter().find(|x| x.key() == c.key()) {
                    c.supported = checked.supported;
                }
            }
        });

        cylinders.iter().find_map(|c| {
            let part = &c.cylinder.part_number;
            let notification = if c.supported == Some(false) {
                Notification {
                    description: format!("Unsupported cylinder {part} on port {}", c.position),
                    codes: vec![format!("P{}", c.position)],
                    error_codes: vec!["UnsupportedCylinder".to_string()],
                }
            } else if c.position == 1 && !restrictions.is_legal(&c.cylinder) {
                Notification {
                    description: format!("Cylinder {part} is not allowed on port 1"),
                    codes: vec!["P1".to_string()],
                    error_codes: vec!["IllegalPort1Cylinder".to_string()],
                }
            } else {
                return None;
            };
            Some(DockingStationAction::UnsupportedCylinder(notification))
        })
    }

    /// Upload each distinct notification once; any other action forgets the
    /// last one.
    fn dedup_notification(&self, action: &DockingStationAction) {
        let Some(n) = action.notification() else {
            *lock(&self.last_notification) = None;
            return;
        };
        {
            let mut last = lock(&self.last_notification);
            if last.as_deref() == Some(n.description.as_str()) {
                tracing::debug!(description = %n.description, "suppressing repeated notification");
                return;
            }
            *last = Some(n.description.clone());
        }
        self.upload_error(
            DockingStationError::new(n.description.clone(), ErrorLevel::Notification),
            n.error_codes.clone(),
        );
    }

    fn export_artifacts(&self, event: &DockingStationEvent) {
        let Some(exporter) = &self.deps.exporter else {
            return;
        };
        let result = match &event.kind {
            EventKind::InstrumentDatalogDownload(_) => exporter.export_datalog(event),
            EventKind::InstrumentCalibration(_) | EventKind::InstrumentBumpTest(_) => {
                exporter.export_gas_responses(event)
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            tracing::error!(error = %e, event = event.kind.name(), "artifact export failed");
        }
    }

    fn account(&self) -> String {
        self.ctx.station().account.unwrap_or_default()
    }

    fn enqueue(&self, payload: UploadPayload) {
        let label = payload.label();
        match self.deps.queue.push(&self.account(), payload) {
            Ok(id) => tracing::debug!(id, %label, "upload queued"),
            Err(QueueError::Paused) => tracing::warn!(%label, "upload queue paused; payload dropped"),
            Err(e) => {
                tracing::error!(error = %e, %label, "upload queue write failed");
                self.ctx.set_flag(RunFlag::QueueError, true);
            }
        }
    }

    pub fn upload_event(&self, event: &DockingStationEvent) {
        self.enqueue(UploadPayload::event(event));
    }

    fn upload_error(&self, error: DockingStationError, error_codes: Vec<String>) {
        let station = self.ctx.station();
        self.enqueue(UploadPayload::Error(ErrorReport {
            station_serial: station.serial_number,
            time: Utc::now(),
            time_zone: station.time_zone,
            error,
            error_codes,
        }));
    }

    /// Queue `error` for the next report; duplicates by description are dropped.
    pub fn report_error(&self, error: DockingStationError) {
        let mut pending = lock(&self.pending_errors);
        if pending.contains(&error) {
            tracing::trace!(description = %error.description, "error already pending");
            return;
        }
        tracing::debug!(description = %error.description, level = ?error.level, "error queued for upload");
        pending.push(error);
    }

    /// Upload every pending error.
    pub fn report_queued_errors(&self) {
        let pending = std::mem::take(&mut *lock(&self.pending_errors));
        for error in pending {
            self.upload_error(error, Vec::new());
        }
    }

    pub fn pending_error_count(&self) -> usize {
        lock(&self.pending_errors).len()
    }

    /// Handle a flow failure blamed on an empty cylinder.
    pub fn report_flow_failed_error(&self, position: u8) -> Result<()> {
        self.report_error(DockingStationError::new(
            format!("Flow failed on port {position}"),
            ErrorLevel::Warning,
        ));
        self.process_empty_gas_end_point(position)
    }

    /// Step the cylinder's pressure down, persist it, then re-read and upload
    /// settings so the remote view of cylinder pressure matches the station.
    pub fn process_empty_gas_end_point(&self, position: u8) -> Result<()> {
        let downgraded = self.ctx.update_cached_cylinders(|cylinders| {
            cylinders.iter_mut().find(|c| c.position == position).map(|c| {
                c.cylinder.pressure = c.cylinder.pressure.downgraded();
                c.cylinder.pressure
            })
        });
        let Some(pressure) = downgraded else {
            tracing::warn!(position, "flow failure on a port with no cached cylinder");
            return Ok(());
        };
        tracing::info!(position, ?pressure, "cylinder pressure downgraded");

        let mut txn = self.deps.store.begin()?;
        txn.update_cylinder_pressure(position, pressure)?;
        txn.commit()?;

        let mut snapshot = self
            .deps
            .settings
            .read_settings(&SettingsReadAction::default())?;
        if let EventKind::SettingsRead(read) = &mut snapshot.kind {
            let stored = self.deps.store.gas_end_points()?;
            keep_stored_pressure(&mut read.installed_cylinders, &stored);
            keep_stored_pressure(&mut read.changed_cylinders, &stored);
        }
        self.processor.save(&snapshot, self.ctx.docked().docked_time)?;
        self.upload_event(&snapshot);
        Ok(())
    }

    /// Whether the upload queue may be drained right now.
    pub fn runnable(&self) -> bool {
        let station = self.ctx.station();
        !self.ctx.flag(RunFlag::FlashError)
            && !self.ctx.flag(RunFlag::QueueError)
            && (station.activated || station.service_mode)
            && station.account.as_deref().is_some_and(|a| !a.is_empty())
            && !self.paused.load(Ordering::SeqCst)
            && self.config.uploader_url.as_deref().is_some_and(|u| !u.is_empty())
            && !self.deps.queue.is_paused()
            && self.ctx.flag(RunFlag::NetworkPresent)
    }

    /// Upload queued payloads oldest first until the queue is empty, an
    /// upload fails, or the pipeline stops being runnable.
    pub fn drain_queue(&self) -> Result<usize> {
        let mut sent = 0usize;
        while self.runnable() && !self.deps.queue.is_empty() {
            let item = match self.deps.queue.peek() {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(QueueError::Corrupt { id }) if self.config.keep_poison => {
                    tracing::error!(id, "undecodable queue entry left for inspection");
                    break;
                }
                Err(QueueError::Corrupt { id }) => {
                    tracing::warn!(id, "purging undecodable queue entry");
                    self.deps.queue.delete(id)?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if let Some(code) = self
                .deps
                .uploader
                .upload(&item.payload, &item.label, &item.account)
            {
                tracing::warn!(id = item.id, label = %item.label, %code, "upload failed; retrying next cycle");
                break;
            }
            self.deps.queue.delete(item.id)?;
            sent += 1;
        }
        if sent > 0 {
            tracing::info!(sent, remaining = self.deps.queue.len(), "upload queue drained");
        }
        Ok(sent)
    }
}

/// A cylinder still on the same port keeps the pressure the station recorded.
fn keep_stored_pressure(read: &mut [GasEndPoint], stored: &[GasEndPoint]) {
    for ep in read.iter_mut() {
        if let Some(s) = stored.iter().find(|s| s.key() == ep.key()) {
            ep.cylinder.pressure = s.cylinder.pressure;
        }
    }
}

fn notification_from(outcome: MatchOutcome) -> Notification {
    Notification {
        description: outcome.explanation,
        codes: outcome.explanation_codes,
        error_codes: outcome.error_codes,
    }
}

impl Service for ReporterService {
    fn name(&self) -> &str {
        "ReporterService"
    }

    fn run(&self) -> Result<()> {
        if !self.runnable() {
            tracing::trace!("upload queue not runnable this cycle");
            return Ok(());
        }
        self.drain_queue().map(|_| ())
    }

    fn on_pause(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    fn on_stop(&self) -> Result<()> {
        self.deps.uploader.close();
        Ok(())
    }
}

impl ErrorSink for ReporterService {
    fn report_error(&self, error: DockingStationError) {
        ReporterService::report_error(self, error);
    }
}
