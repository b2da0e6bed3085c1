//! Owner of every service, the station indicators and the
//! stop-flash-writes drain used before a reset.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dock_traits::{Clock, DockSwitches, Indicators, Led, Valves};
use serde::Serialize;

use crate::action::DockingStationAction;
use crate::context::{DockContext, RunFlag};
use crate::error::{Report, Result};
use crate::event::DockingStationEvent;
use crate::hw_error::map_hw_error;
use crate::queue::UploadQueue;
use crate::reporter::{ReporterConfig, ReporterDeps, ReporterService};
use crate::service::{PollingService, RunGate, Service, ServiceState, ServiceTiming};
use crate::switch::SwitchService;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bounded wait for in-flight work after a stop-flash-writes request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainBudget {
    pub retries: u32,
    pub retry: Duration,
}

impl Default for DrainBudget {
    fn default() -> Self {
        Self {
            retries: 180,
            retry: Duration::from_secs(1),
        }
    }
}

/// LED and buzzer driver, refreshed on the switch polling interval.
pub struct IndicatorPanel<O> {
    ctx: Arc<DockContext>,
    outputs: Arc<Mutex<O>>,
    led: Mutex<Option<Led>>,
    critical_seen: AtomicBool,
    buzzing: AtomicBool,
}

impl<O: Indicators + Send + 'static> IndicatorPanel<O> {
    pub fn new(ctx: Arc<DockContext>, outputs: Arc<Mutex<O>>) -> Self {
        Self {
            ctx,
            outputs,
            led: Mutex::new(None),
            critical_seen: AtomicBool::new(false),
            buzzing: AtomicBool::new(false),
        }
    }

    /// LED colour for the current station state.
    pub fn desired_led(&self) -> Led {
        let docked = self.ctx.docked();
        if !self.ctx.run_state_ok() || docked.has_sticky_error() {
            Led::Red
        } else if docked.docked_time.is_some() || docked.instrument.is_some() {
            Led::Yellow
        } else {
            Led::Green
        }
    }

    pub fn refresh(&self) -> Result<()> {
        let led = self.desired_led();
        let critical = self.ctx.docked().critical_error.is_some();
        let mut out = lock(&self.outputs);

        {
            let mut current = lock(&self.led);
            if *current != Some(led) {
                out.set_led(led).map_err(|e| Report::new(map_hw_error(e.as_ref())))?;
                tracing::debug!(?led, "led updated");
                *current = Some(led);
            }
        }

        if self.buzzing.swap(false, Ordering::SeqCst) {
            out.set_buzzer(false)
                .map_err(|e| Report::new(map_hw_error(e.as_ref())))?;
        }
        let first_critical = critical && !self.critical_seen.swap(true, Ordering::SeqCst);
        if !critical {
            self.critical_seen.store(false, Ordering::SeqCst);
        }
        if first_critical {
            tracing::warn!("critical instrument error; sounding buzzer");
            out.set_buzzer(true)
                .map_err(|e| Report::new(map_hw_error(e.as_ref())))?;
            self.buzzing.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl<O: Indicators + Send + 'static> Service for IndicatorPanel<O> {
    fn name(&self) -> &str {
        "IndicatorPanel"
    }

    fn run(&self) -> Result<()> {
        self.refresh()
    }

    // The LED must keep reporting faults while the run state is bad.
    fn on_run(&self, _gate: &dyn RunGate) -> bool {
        true
    }
}

/// Poll intervals of the supervised services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorTiming {
    pub reporter: ServiceTiming,
    pub switch: ServiceTiming,
    /// Settle time of debounced switch reads.
    pub debounce: Duration,
    pub drain: DrainBudget,
}

/// Everything needed to assemble a supervisor.
pub struct SupervisorParts<H, O, C> {
    pub ctx: Arc<DockContext>,
    pub deps: ReporterDeps,
    pub reporter: ReporterConfig,
    pub switches: H,
    pub outputs: O,
    pub clock: C,
    pub timing: SupervisorTiming,
}

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub station: String,
    pub run_state_ok: bool,
    pub network_present: bool,
    pub docked: bool,
    pub sticky_error: bool,
    pub queue_len: usize,
    pub queue_paused: bool,
    pub reporter: ServiceState,
    pub switch: ServiceState,
    pub indicators: ServiceState,
}

pub struct Supervisor<H, O, C>
where
    H: DockSwitches + Send + 'static,
    O: Valves + Indicators + Send + 'static,
    C: Clock + Clone + Send + Sync + 'static,
{
    ctx: Arc<DockContext>,
    queue: Arc<dyn UploadQueue>,
    outputs: Arc<Mutex<O>>,
    clock: C,
    drain: DrainBudget,
    reporter: PollingService<ReporterService>,
    switch: PollingService<SwitchService<H, C>>,
    panel: PollingService<IndicatorPanel<O>>,
}

impl<H, O, C> Supervisor<H, O, C>
where
    H: DockSwitches + Send + 'static,
    O: Valves + Indicators + Send + 'static,
    C: Clock + Clone + Send + Sync + 'static,
{
    pub fn new(parts: SupervisorParts<H, O, C>) -> Self {
        let SupervisorParts {
            ctx,
            deps,
            reporter,
            switches,
            outputs,
            clock,
            timing,
        } = parts;
        let queue = Arc::clone(&deps.queue);
        let gate: Arc<dyn RunGate> = ctx.clone();
        let reporter_svc = Arc::new(ReporterService::new(Arc::clone(&ctx), deps, reporter));
        let switch_svc = Arc::new(SwitchService::new(
            Arc::clone(&ctx),
            switches,
            clock.clone(),
            timing.debounce,
            reporter_svc.clone(),
        ));
        let outputs = Arc::new(Mutex::new(outputs));
        let panel = Arc::new(IndicatorPanel::new(Arc::clone(&ctx), Arc::clone(&outputs)));

        Self {
            reporter: PollingService::new(reporter_svc, Arc::clone(&gate), timing.reporter),
            switch: PollingService::new(switch_svc, Arc::clone(&gate), timing.switch),
            panel: PollingService::new(panel, gate, timing.switch),
            ctx,
            queue,
            outputs,
            clock,
            drain: timing.drain,
        }
    }

    pub fn context(&self) -> &Arc<DockContext> {
        &self.ctx
    }

    pub fn reporter(&self) -> &Arc<ReporterService> {
        self.reporter.service()
    }

    pub fn start(&self) -> Result<()> {
        self.switch.start()?;
        self.panel.start()?;
        self.reporter.start()?;
        tracing::info!(station = %self.ctx.station().serial_number, "supervisor started");
        Ok(())
    }

    pub fn stop(&self) {
        self.reporter.stop();
        self.switch.stop();
        self.panel.stop();
        tracing::info!("supervisor stopped");
    }

    pub fn set_paused(&self, paused: bool) {
        self.reporter.set_paused(paused);
        self.switch.set_paused(paused);
        self.panel.set_paused(paused);
    }

    pub fn report_event(&self, event: &DockingStationEvent) -> Option<DockingStationAction> {
        self.reporter().report_event(event)
    }

    fn any_running(&self) -> bool {
        self.reporter.running() || self.switch.running() || self.panel.running()
    }

    /// Close every valve, pause all services and the upload queue, then
    /// wait within the drain budget for in-flight work to finish.
    /// Returns whether quiescence was reached.
    pub fn stop_flash_writes(&self) -> bool {
        tracing::warn!("stopping flash writes");
        if let Err(e) = lock(&self.outputs).close_all() {
            tracing::error!(error = %map_hw_error(e.as_ref()), "failed to close valves");
        }
        self.set_paused(true);
        self.queue.set_paused(true);

        for attempt in 0..=self.drain.retries {
            if !self.any_running() {
                tracing::info!(attempt, "services quiescent");
                return true;
            }
            self.clock.sleep(self.drain.retry);
        }
        tracing::error!(retries = self.drain.retries, "services still busy after drain budget");
        false
    }

    pub fn health(&self) -> Health {
        let docked = self.ctx.docked();
        Health {
            station: self.ctx.station().serial_number,
            run_state_ok: self.ctx.run_state_ok(),
            network_present: self.ctx.flag(RunFlag::NetworkPresent),
            docked: docked.docked_time.is_some(),
            sticky_error: docked.has_sticky_error(),
            queue_len: self.queue.len(),
            queue_paused: self.queue.is_paused(),
            reporter: self.reporter.state(),
            switch: self.switch.state(),
            indicators: self.panel.state(),
        }
    }
}
