//! Process-wide state shared by every service.
//!
//! Built once at startup and handed to each component behind an `Arc`.
//! Every lock is held only for a single read-modify-write; none is held
//! across a store transaction or a remote call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use crate::gas::GasEndPoint;
use crate::instrument::DockedState;
use crate::service::RunGate;
use crate::station::DockingStation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunFlag {
    FlashError,
    QueueError,
    SystemAlarm,
    NetworkPresent,
    SettingsReadNeeded,
    DiscoveryNeeded,
    /// Discovery must re-read everything, not only the instrument.
    FullDiscovery,
    HeartbeatForced,
    ManufacturingConnectivityMissing,
}

const FLAG_COUNT: usize = 9;

impl RunFlag {
    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug)]
pub struct DockContext {
    station: RwLock<DockingStation>,
    docked: Mutex<DockedState>,
    cylinders: Mutex<Vec<GasEndPoint>>,
    flags: [AtomicBool; FLAG_COUNT],
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DockContext {
    pub fn new(station: DockingStation) -> Self {
        let ctx = Self {
            station: RwLock::new(station),
            docked: Mutex::new(DockedState::default()),
            cylinders: Mutex::new(Vec::new()),
            flags: Default::default(),
        };
        ctx.set_flag(RunFlag::NetworkPresent, true);
        ctx
    }

    pub fn station(&self) -> DockingStation {
        self.station
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update_station<R>(&self, f: impl FnOnce(&mut DockingStation) -> R) -> R {
        let mut guard = self.station.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn docked(&self) -> DockedState {
        lock(&self.docked).clone()
    }

    pub fn update_docked<R>(&self, f: impl FnOnce(&mut DockedState) -> R) -> R {
        f(&mut lock(&self.docked))
    }

    pub fn cached_cylinders(&self) -> Vec<GasEndPoint> {
        lock(&self.cylinders).clone()
    }

    /// Replace the cached cylinder list. Support is re-verified lazily.
    pub fn set_cached_cylinders(&self, mut cylinders: Vec<GasEndPoint>) {
        for c in &mut cylinders {
            c.supported = None;
        }
        cylinders.sort_by_key(|c| c.position);
        *lock(&self.cylinders) = cylinders;
    }

    pub fn update_cached_cylinders<R>(&self, f: impl FnOnce(&mut Vec<GasEndPoint>) -> R) -> R {
        f(&mut lock(&self.cylinders))
    }

    pub fn flag(&self, flag: RunFlag) -> bool {
        self.flags[flag.index()].load(Ordering::SeqCst)
    }

    pub fn set_flag(&self, flag: RunFlag, value: bool) {
        self.flags[flag.index()].store(value, Ordering::SeqCst);
    }

    /// Read and clear a one-shot request flag.
    pub fn take_flag(&self, flag: RunFlag) -> bool {
        self.flags[flag.index()].swap(false, Ordering::SeqCst)
    }

    pub fn request_discovery(&self, full: bool) {
        self.set_flag(RunFlag::DiscoveryNeeded, true);
        if full {
            self.set_flag(RunFlag::FullDiscovery, true);
        }
    }
}

impl RunGate for DockContext {
    fn run_state_ok(&self) -> bool {
        !(self.flag(RunFlag::FlashError)
            || self.flag(RunFlag::QueueError)
            || self.flag(RunFlag::SystemAlarm))
    }
}
