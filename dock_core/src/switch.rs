//! Dock and manifold switch monitoring.
//!
//! Every cycle samples the dock switch and each port's smart-card and
//! pressure switches through the two-sample debounce, and turns changes into
//! discovery / settings-read requests on the shared context.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use dock_traits::{Clock, DockSwitches, HwResult, debounced_sample};

use crate::context::{DockContext, RunFlag};
use crate::error::{DockError, Result};
use crate::hw_error::SampleOutcome;
use crate::instrument::DockedState;
use crate::ports::ErrorSink;
use crate::service::Service;
use crate::station::{DockingStationError, ErrorLevel};

/// Last trusted value of every switch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchSnapshot {
    pub docked: bool,
    pub card_present: Vec<bool>,
    pub pressure_switch_present: Vec<bool>,
    pub pressure_good: Vec<bool>,
}

impl SwitchSnapshot {
    fn with_ports(ports: u8) -> Self {
        let n = usize::from(ports);
        Self {
            docked: false,
            card_present: vec![false; n],
            pressure_switch_present: vec![false; n],
            pressure_good: vec![false; n],
        }
    }
}

#[derive(Debug, Default)]
struct Watch {
    snapshot: SwitchSnapshot,
    /// `(account, activated)` seen on the previous cycle.
    account: Option<(Option<String>, bool)>,
    /// Kind of the last hardware failure reported remotely.
    last_error_kind: Option<&'static str>,
}

pub struct SwitchService<H, C> {
    ctx: Arc<DockContext>,
    hw: Mutex<H>,
    clock: C,
    settle: Duration,
    errors: Arc<dyn ErrorSink>,
    watch: Mutex<Watch>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<H, C> SwitchService<H, C>
where
    H: DockSwitches + Send + 'static,
    C: Clock + Send + Sync + 'static,
{
    pub fn new(
        ctx: Arc<DockContext>,
        hw: H,
        clock: C,
        settle: Duration,
        errors: Arc<dyn ErrorSink>,
    ) -> Self {
        let ports = ctx.station().port_count;
        Self {
            ctx,
            hw: Mutex::new(hw),
            clock,
            settle,
            errors,
            watch: Mutex::new(Watch {
                snapshot: SwitchSnapshot::with_ports(ports),
                ..Watch::default()
            }),
        }
    }

    pub fn snapshot(&self) -> SwitchSnapshot {
        lock(&self.watch).snapshot.clone()
    }

    fn sample(
        &self,
        previous: bool,
        read: impl FnMut(&mut H) -> HwResult<bool>,
    ) -> SampleOutcome<bool> {
        let mut read = read;
        let mut hw = lock(&self.hw);
        SampleOutcome::from_result(debounced_sample(
            || read(&mut *hw),
            previous,
            self.settle,
            &self.clock,
        ))
    }

    fn check_account(&self) {
        let station = self.ctx.station();
        let current = (station.account.clone(), station.activated);
        let changed = {
            let mut watch = lock(&self.watch);
            let changed = watch.account.as_ref().is_some_and(|prev| *prev != current);
            watch.account = Some(current);
            changed
        };
        if changed {
            tracing::info!(
                account = ?station.account,
                activated = station.activated,
                "account changed; full rediscovery"
            );
            self.ctx.request_discovery(true);
            self.ctx.set_flag(RunFlag::SettingsReadNeeded, true);
        }

        let missing =
            station.is_manufacturing_account() && !self.ctx.flag(RunFlag::NetworkPresent);
        if missing != self.ctx.flag(RunFlag::ManufacturingConnectivityMissing) {
            tracing::warn!(missing, "manufacturing connectivity changed");
            self.ctx.set_flag(RunFlag::ManufacturingConnectivityMissing, missing);
        }
    }

    /// The sampled value, or the error that ends this cycle's polling.
    /// The previous trusted values are kept and sampled again next cycle.
    fn resolve(
        &self,
        what: &str,
        outcome: SampleOutcome<bool>,
    ) -> std::result::Result<bool, DockError> {
        match outcome {
            SampleOutcome::Ok(v) => Ok(v),
            SampleOutcome::Retryable(e) => {
                self.escalate(what, &e, ErrorLevel::Warning);
                Err(e)
            }
            SampleOutcome::Fatal(e) => {
                self.escalate(what, &e, ErrorLevel::Error);
                Err(e)
            }
        }
    }

    /// Report a failure only when its kind differs from the last one
    /// reported; repeats stay local even across clean cycles.
    fn escalate(&self, what: &str, e: &DockError, level: ErrorLevel) {
        let kind = e.kind();
        let is_new = {
            let mut watch = lock(&self.watch);
            let is_new = watch.last_error_kind != Some(kind);
            watch.last_error_kind = Some(kind);
            is_new
        };
        if !is_new {
            tracing::debug!(switch = what, error = %e, "repeated switch failure suppressed");
            return;
        }
        tracing::warn!(switch = what, error = %e, ?level, "switch read failed");
        self.errors.report_error(DockingStationError::new(
            format!("{what} read failed: {e}"),
            level,
        ));
        self.ctx.set_flag(RunFlag::HeartbeatForced, true);
    }

    fn poll_dock(&self, previous: bool) -> std::result::Result<bool, DockError> {
        let docked = self.resolve("dock switch", self.sample(previous, |hw| hw.is_docked()))?;
        if docked != previous {
            tracing::info!(docked, "dock state changed");
            self.ctx.request_discovery(false);
            self.ctx.set_flag(RunFlag::SettingsReadNeeded, true);
            if docked {
                self.ctx.update_docked(|d| d.docked_time = Some(Utc::now()));
            } else {
                self.ctx.update_docked(|d| *d = DockedState::default());
            }
        }
        Ok(docked)
    }

    fn poll_ports(&self, snapshot: &mut SwitchSnapshot) -> std::result::Result<(), DockError> {
        let ports = snapshot.card_present.len();
        for idx in 0..ports {
            let port = u8::try_from(idx + 1).unwrap_or(u8::MAX);
            let card = self.resolve(
                "smart card",
                self.sample(snapshot.card_present[idx], |hw| hw.is_card_present(port)),
            )?;
            let switch = self.resolve(
                "pressure switch",
                self.sample(snapshot.pressure_switch_present[idx], |hw| {
                    hw.is_pressure_switch_present(port)
                }),
            )?;
            let good = self.resolve(
                "pressure",
                self.sample(snapshot.pressure_good[idx], |hw| hw.is_pressure_good(port)),
            )?;
            if card != snapshot.card_present[idx]
                || switch != snapshot.pressure_switch_present[idx]
                || good != snapshot.pressure_good[idx]
            {
                tracing::info!(port, card, switch, good, "port state changed");
                self.ctx.set_flag(RunFlag::SettingsReadNeeded, true);
            }
            snapshot.card_present[idx] = card;
            snapshot.pressure_switch_present[idx] = switch;
            snapshot.pressure_good[idx] = good;
        }
        Ok(())
    }
}

impl<H, C> Service for SwitchService<H, C>
where
    H: DockSwitches + Send + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "SwitchService"
    }

    fn run(&self) -> Result<()> {
        self.check_account();
        let mut snapshot = self.snapshot();
        let polled = self.poll_dock(snapshot.docked).and_then(|docked| {
            snapshot.docked = docked;
            self.poll_ports(&mut snapshot)
        });
        if let Err(e) = polled {
            tracing::trace!(error = %e, "switch cycle ended early");
        }
        // Keep whatever was sampled before a failure.
        lock(&self.watch).snapshot = snapshot;
        Ok(())
    }
}
