//! Restartable polling services.
//!
//! Each `PollingService` owns exactly one worker thread that repeatedly
//! calls `Service::run`, sleeping `idle` between iterations. Errors and
//! panics raised by a service are logged and swallowed; the loop carries
//! on with its next iteration.
//!
//! State machine: `Created -> Running <-> Paused -> Stopped`. Stopping is
//! cooperative: an in-flight `run` always completes. The worker is stopped
//! and joined when the `PollingService` is dropped.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel as xch;
use serde::Serialize;

use crate::error::{DockError, Result};

/// Global go/no-go consulted before every iteration.
pub trait RunGate: Send + Sync {
    fn run_state_ok(&self) -> bool;
}

/// Work executed by a `PollingService`.
pub trait Service: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn run(&self) -> Result<()>;

    fn on_start(&self) -> Result<()> {
        Ok(())
    }

    fn on_stop(&self) -> Result<()> {
        Ok(())
    }

    /// Called under the state lock before the pause flag changes.
    fn on_pause(&self, _paused: bool) {}

    /// Whether `run` should be invoked this iteration.
    fn on_run(&self, gate: &dyn RunGate) -> bool {
        gate.run_state_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceState {
    Created,
    Running,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceTiming {
    /// Sleep after every iteration; zero spins without sleeping.
    pub idle: Duration,
    /// One-time wait before `on_start`.
    pub delayed_start: Duration,
}

impl ServiceTiming {
    pub fn idle(idle: Duration) -> Self {
        Self {
            idle,
            delayed_start: Duration::ZERO,
        }
    }
}

struct Shared<S> {
    service: Arc<S>,
    gate: Arc<dyn RunGate>,
    state: Mutex<ServiceState>,
    in_run: Mutex<bool>,
    idle_cv: Condvar,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: Service> Shared<S> {
    /// Marks `run` as in flight iff the service is still `Running`. Both locks
    /// are taken together so a concurrent pause either sees the run or
    /// prevents it.
    fn enter_run(&self) -> bool {
        let state = lock(&self.state);
        if *state != ServiceState::Running {
            return false;
        }
        *lock(&self.in_run) = true;
        true
    }

    fn leave_run(&self) {
        *lock(&self.in_run) = false;
        self.idle_cv.notify_all();
    }

    fn guarded(&self, what: &str, f: impl FnOnce() -> Result<()>) {
        let name = self.service.name();
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(service = name, stage = what, error = %e, "service error"),
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(service = name, stage = what, panic = %msg, "service panicked");
            }
        }
    }

    fn iteration(&self) {
        let paused = *lock(&self.state) == ServiceState::Paused;
        if paused || !self.service.on_run(self.gate.as_ref()) {
            return;
        }
        if !self.enter_run() {
            return;
        }
        self.guarded("run", || self.service.run());
        self.leave_run();
    }

    fn worker(&self, stop: &xch::Receiver<()>, timing: ServiceTiming) {
        let name = self.service.name().to_string();
        if !timing.delayed_start.is_zero()
            && !matches!(
                stop.recv_timeout(timing.delayed_start),
                Err(xch::RecvTimeoutError::Timeout)
            )
        {
            tracing::debug!(service = %name, "stopped during delayed start");
            self.guarded("on_stop", || self.service.on_stop());
            return;
        }

        self.guarded("on_start", || self.service.on_start());
        tracing::info!(service = %name, "service started");
        loop {
            if *lock(&self.state) == ServiceState::Stopped {
                break;
            }
            self.iteration();
            let keep_going = if timing.idle.is_zero() {
                matches!(stop.try_recv(), Err(xch::TryRecvError::Empty))
            } else {
                matches!(
                    stop.recv_timeout(timing.idle),
                    Err(xch::RecvTimeoutError::Timeout)
                )
            };
            if !keep_going {
                break;
            }
        }
        self.guarded("on_stop", || self.service.on_stop());
        tracing::info!(service = %name, "service stopped");
    }
}

pub struct PollingService<S: Service> {
    shared: Arc<Shared<S>>,
    timing: ServiceTiming,
    stop_tx: Mutex<Option<xch::Sender<()>>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl<S: Service> PollingService<S> {
    pub fn new(service: Arc<S>, gate: Arc<dyn RunGate>, timing: ServiceTiming) -> Self {
        Self {
            shared: Arc::new(Shared {
                service,
                gate,
                state: Mutex::new(ServiceState::Created),
                in_run: Mutex::new(false),
                idle_cv: Condvar::new(),
            }),
            timing,
            stop_tx: Mutex::new(None),
            join: Mutex::new(None),
        }
    }

    pub fn service(&self) -> &Arc<S> {
        &self.shared.service
    }

    pub fn state(&self) -> ServiceState {
        *lock(&self.shared.state)
    }

    /// Spawn the worker. Only valid from `Created`.
    pub fn start(&self) -> Result<()> {
        {
            let mut state = lock(&self.shared.state);
            if *state != ServiceState::Created {
                return Err(eyre::Report::new(DockError::State(format!(
                    "{} cannot start from {:?}",
                    self.shared.service.name(),
                    *state
                ))));
            }
            *state = ServiceState::Running;
        }
        let (tx, rx) = xch::bounded::<()>(1);
        let shared = Arc::clone(&self.shared);
        let timing = self.timing;
        let handle = std::thread::Builder::new()
            .name(self.shared.service.name().to_string())
            .spawn(move || shared.worker(&rx, timing))?;
        *lock(&self.stop_tx) = Some(tx);
        *lock(&self.join) = Some(handle);
        Ok(())
    }

    /// Request the loop to exit after its current iteration and wait for it.
    pub fn stop(&self) {
        {
            let mut state = lock(&self.shared.state);
            if *state == ServiceState::Stopped {
                return;
            }
            *state = ServiceState::Stopped;
        }
        // Dropping the sender wakes the worker from its idle sleep.
        lock(&self.stop_tx).take();
        let handle = lock(&self.join).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::warn!(service = self.shared.service.name(), "worker thread panicked");
            }
        }
    }

    /// Toggle pausing. A no-op when already in the requested state or when
    /// the service is not running. Does not wait for an in-flight `run`.
    pub fn set_paused(&self, paused: bool) {
        let mut state = lock(&self.shared.state);
        let target = match (*state, paused) {
            (ServiceState::Running, true) => ServiceState::Paused,
            (ServiceState::Paused, false) => ServiceState::Running,
            _ => return,
        };
        self.shared.service.on_pause(paused);
        *state = target;
        tracing::debug!(service = self.shared.service.name(), paused, "pause toggled");
    }

    pub fn is_paused(&self) -> bool {
        self.state() == ServiceState::Paused
    }

    /// Whether `run` is executing right now.
    pub fn running(&self) -> bool {
        *lock(&self.shared.in_run)
    }

    /// Block until no `run` is in flight, or `timeout` elapses.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let guard = lock(&self.shared.in_run);
        let (guard, _) = self
            .shared
            .idle_cv
            .wait_timeout_while(guard, timeout, |in_run| *in_run)
            .unwrap_or_else(PoisonError::into_inner);
        !*guard
    }
}

impl<S: Service> Drop for PollingService<S> {
    fn drop(&mut self) {
        self.stop();
    }
}
