#![allow(dead_code)]
//! Shared fixtures for the dock_core integration tests.

use std::sync::Arc;

use dock_core::gas::{GasConcentration, gas_code};
use dock_core::instrument::InstalledComponent;
use dock_core::mocks::{RecordingUploader, ScriptedScheduler, StaticSettingsReader};
use dock_core::store::MemoryStore;
use dock_core::{
    Cylinder, DockContext, DockingStation, FactoryCylinder, FileUploadQueue, GasEndPoint,
    Instrument, PressureLevel, ReporterConfig, ReporterDeps, ReporterService, Sensor,
};
use tempfile::TempDir;

pub fn station() -> DockingStation {
    let mut s = DockingStation::new("DS-TEST-01");
    s.account = Some("ACME".into());
    s.activated = true;
    s
}

pub fn cylinder(part: &str, gases: &[(&str, f64)]) -> Cylinder {
    Cylinder {
        part_number: part.to_string(),
        factory_id: None,
        expiration_date: None,
        pressure: PressureLevel::Full,
        gases: gases
            .iter()
            .map(|(code, ppm)| GasConcentration {
                gas_code: (*code).to_string(),
                ppm: *ppm,
            })
            .collect(),
    }
}

pub fn co_cylinder() -> Cylinder {
    cylinder("1810-0001", &[(gas_code::CO, 100.0)])
}

pub fn instrument(sensors: Vec<Sensor>) -> Instrument {
    Instrument {
        serial_number: "INS-0042".into(),
        firmware_version: "4.2".into(),
        components: sensors.into_iter().map(InstalledComponent::Sensor).collect(),
    }
}

pub fn co_instrument() -> Instrument {
    instrument(vec![Sensor::new("co-1", "S0001", gas_code::CO)])
}

/// Factory catalog knowing the CO cylinder part.
pub fn catalog() -> Vec<FactoryCylinder> {
    vec![FactoryCylinder {
        part_number: "1810-0001".into(),
        factory_id: 36,
        gases: co_cylinder().gases,
    }]
}

/// A reporter wired to in-memory collaborators and a temp-dir queue.
pub struct Harness {
    pub ctx: Arc<DockContext>,
    pub store: Arc<MemoryStore>,
    pub queue: Arc<FileUploadQueue>,
    pub uploader: Arc<RecordingUploader>,
    pub scheduler: Arc<ScriptedScheduler>,
    pub settings: Arc<StaticSettingsReader>,
    pub reporter: ReporterService,
    _dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(
            station(),
            MemoryStore::new().with_catalog(catalog()),
            ReporterConfig::default(),
        )
    }

    pub fn with(station: DockingStation, store: MemoryStore, config: ReporterConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(DockContext::new(station.clone()));
        let store = Arc::new(store);
        let queue = Arc::new(FileUploadQueue::open(dir.path().join("queue")).unwrap());
        let uploader = Arc::new(RecordingUploader::default());
        let scheduler = Arc::new(ScriptedScheduler::default());
        let settings = Arc::new(StaticSettingsReader::new(station, Vec::new()));
        let deps = ReporterDeps {
            store: store.clone(),
            queue: queue.clone(),
            uploader: uploader.clone(),
            scheduler: scheduler.clone(),
            settings: settings.clone(),
            exporter: None,
        };
        let reporter = ReporterService::new(Arc::clone(&ctx), deps, config);
        Self {
            ctx,
            store,
            queue,
            uploader,
            scheduler,
            settings,
            reporter,
            _dir: dir,
        }
    }

    pub fn online() -> Self {
        let config = ReporterConfig {
            uploader_url: Some("https://ds.example.test".into()),
            keep_poison: false,
        };
        Self::with(station(), MemoryStore::new().with_catalog(catalog()), config)
    }

    pub fn install(&self, cylinders: Vec<GasEndPoint>) {
        self.ctx.set_cached_cylinders(cylinders);
    }

    pub fn queued_labels(&self) -> Vec<String> {
        self.queue
            .entries()
            .unwrap()
            .into_iter()
            .map(|d| d.label)
            .collect()
    }
}
