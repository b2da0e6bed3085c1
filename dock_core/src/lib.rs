#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Control core of the gas-detector docking station (hardware-agnostic).
//!
//! All hardware interactions go through the `dock_traits` capability traits,
//! and every external collaborator (persistent store, remote uploader,
//! scheduler, instrument settings reader) through the traits in `ports`.
//!
//! ## Architecture
//!
//! - **Events and actions**: what an operation reported and what the station
//!   does next (`event`, `action` modules)
//! - **Reporter**: the event pipeline that persists outcomes, queues uploads,
//!   derives follow-ups and resolves gas resources (`reporter`, `processor`)
//! - **Resource matching**: pairs sensors with installed cylinders (`matcher`)
//! - **Upload queue**: durable FIFO drained by the reporter (`queue`)
//! - **Services**: restartable polling threads (`service`, `switch`)
//! - **Supervisor**: owns the services, drives the indicators and drains
//!   in-flight work before a reset (`supervisor`)

pub mod action;
pub mod atomic;
pub mod context;
pub mod conversions;
pub mod error;
pub mod event;
pub mod export;
pub mod gas;
pub mod hw_error;
pub mod instrument;
pub mod matcher;
pub mod mocks;
pub mod ports;
pub mod processor;
pub mod queue;
pub mod reporter;
pub mod service;
pub mod station;
pub mod store;
pub mod supervisor;
pub mod switch;
pub mod upload;

pub use action::{DockingStationAction, GasOperationAction, Notification, SettingsReadAction};
pub use context::{DockContext, RunFlag};
pub use error::{DockError, Report, Result};
pub use event::{DockingStationEvent, EventCode, EventKind, Trigger};
pub use gas::{Cylinder, FactoryCylinder, GasEndPoint, GasType, PressureLevel};
pub use instrument::{DockedState, Instrument, Sensor, SensorStatus};
pub use matcher::{GasOperation, MatchOutcome, ResourceMatcher};
pub use queue::{FileUploadQueue, QueueError, UploadQueue};
pub use reporter::{ReporterConfig, ReporterDeps, ReporterService};
pub use service::{PollingService, RunGate, Service, ServiceState, ServiceTiming};
pub use station::{DockingStation, DockingStationError, ErrorLevel, Port1Restrictions};
pub use supervisor::{DrainBudget, Health, Supervisor, SupervisorParts, SupervisorTiming};
pub use switch::SwitchService;
pub use upload::UploadPayload;
