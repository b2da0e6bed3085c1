//! Station assembly and the daemon heartbeat loop.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dock_config::{Catalog, Config};
use dock_core::export::CsvExporter;
use dock_core::mocks::{ScriptedScheduler, StaticSettingsReader};
use dock_core::ports::{ArtifactExporter, RemoteUploader, SettingsReader};
use dock_core::store::MemoryStore;
use dock_core::{
    Cylinder, DockError, DockingStation, DockingStationAction, DockingStationEvent, EventKind,
    FactoryCylinder, FileUploadQueue, GasEndPoint, ReporterConfig, ReporterDeps, RunFlag,
    Supervisor, SupervisorParts, SupervisorTiming, UploadPayload,
};
use dock_traits::{DockSwitches, Indicators, MonotonicClock, Valves};
use serde_json::json;

/// Loop granularity while waiting for the next heartbeat.
const TICK: Duration = Duration::from_millis(20);

/// Accepts every payload and writes it to the log.
struct LogUploader;

impl RemoteUploader for LogUploader {
    fn upload(&self, payload: &UploadPayload, label: &str, account: &str) -> Option<String> {
        match payload.to_json() {
            Ok(body) => {
                tracing::info!(label, account, bytes = body.len(), "upload accepted");
                None
            }
            Err(e) => {
                tracing::warn!(label, error = %e, "payload could not be encoded");
                Some("ENCODE".to_string())
            }
        }
    }

    fn exchange_status(&self, station: &DockingStation) -> dock_core::Result<()> {
        tracing::debug!(station = %station.serial_number, "status exchange");
        Ok(())
    }
}

/// A supervisor plus the settings reader the loop uses to execute reads.
pub struct Station<H, O>
where
    H: DockSwitches + Send + 'static,
    O: Valves + Indicators + Send + 'static,
{
    pub supervisor: Supervisor<H, O, MonotonicClock>,
    settings: Arc<dyn SettingsReader>,
}

pub fn build_station<H, O>(
    cfg: &Config,
    catalog: Option<&Catalog>,
    switches: H,
    outputs: O,
) -> eyre::Result<Station<H, O>>
where
    H: DockSwitches + Send + 'static,
    O: Valves + Indicators + Send + 'static,
{
    let station = DockingStation::from(cfg);
    let ctx = Arc::new(dock_core::DockContext::new(station.clone()));
    ctx.set_flag(RunFlag::NetworkPresent, cfg.uploader.network_present);

    let mut store = MemoryStore::new();
    if let Some(catalog) = catalog {
        store = store.with_catalog(catalog.entries.iter().map(FactoryCylinder::from));
        tracing::info!(parts = catalog.entries.len(), "cylinder catalog loaded");
    }
    let queue = Arc::new(FileUploadQueue::open(&cfg.queue.dir)?);
    let exporter: Option<Arc<dyn ArtifactExporter>> = if cfg.station.cal_station_mode {
        Some(Arc::new(CsvExporter::new(&cfg.export.dir)))
    } else {
        None
    };
    let settings: Arc<dyn SettingsReader> = Arc::new(StaticSettingsReader::new(
        station,
        vec![GasEndPoint::new(1, Cylinder::fresh_air())],
    ));

    let deps = ReporterDeps {
        store: Arc::new(store),
        queue,
        uploader: Arc::new(LogUploader),
        scheduler: Arc::new(ScriptedScheduler::default()),
        settings: Arc::clone(&settings),
        exporter,
    };
    let supervisor = Supervisor::new(SupervisorParts {
        ctx,
        deps,
        reporter: ReporterConfig::from(cfg),
        switches,
        outputs,
        clock: MonotonicClock::new(),
        timing: SupervisorTiming::from(cfg),
    });
    Ok(Station {
        supervisor,
        settings,
    })
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub heartbeats: u64,
    pub settings_reads: u64,
    /// How often each action was proposed.
    pub actions: BTreeMap<&'static str, u64>,
    pub drained: bool,
}

impl RunSummary {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "heartbeats": self.heartbeats,
            "settings_reads": self.settings_reads,
            "actions": self.actions,
            "drained": self.drained,
        })
    }
}

impl<H, O> Station<H, O>
where
    H: DockSwitches + Send + 'static,
    O: Valves + Indicators + Send + 'static,
{
    fn heartbeat(&self, summary: &mut RunSummary) {
        let station = self.supervisor.context().station();
        let event = DockingStationEvent::new(EventKind::Nothing, station);
        summary.heartbeats += 1;
        let action = self.supervisor.report_event(&event);
        self.follow(action, summary);
    }

    /// Run settings reads in place; everything else is only recorded since
    /// gas operations need an instrument executor.
    fn follow(&self, mut action: Option<DockingStationAction>, summary: &mut RunSummary) {
        while let Some(next) = action.take() {
            let name = next.name();
            *summary.actions.entry(name).or_default() += 1;
            let DockingStationAction::SettingsRead(read) = next else {
                tracing::info!(action = name, "next action");
                return;
            };
            summary.settings_reads += 1;
            match self.settings.read_settings(&read) {
                Ok(event) => action = self.supervisor.report_event(&event),
                Err(e) => tracing::warn!(error = %e, "settings read failed"),
            }
        }
    }

    /// Heartbeat until `shutdown` is raised or `seconds` elapse, then stop
    /// flash writes and shut the services down.
    pub fn run(
        &self,
        seconds: Option<u64>,
        heartbeat: Duration,
        shutdown: &AtomicBool,
    ) -> eyre::Result<RunSummary> {
        let ctx = Arc::clone(self.supervisor.context());
        let mut summary = RunSummary::default();
        self.supervisor.start()?;
        // Load the cylinder inventory before the first heartbeat.
        ctx.set_flag(RunFlag::SettingsReadNeeded, true);

        let started = Instant::now();
        let deadline = seconds.map(|s| started + Duration::from_secs(s));
        let mut next_beat = started;
        while !shutdown.load(Ordering::SeqCst) {
            let now = Instant::now();
            if ctx.take_flag(RunFlag::SettingsReadNeeded) {
                let read = dock_core::SettingsReadAction::default();
                self.follow(Some(DockingStationAction::SettingsRead(read)), &mut summary);
            }
            if ctx.take_flag(RunFlag::HeartbeatForced) || now >= next_beat {
                self.heartbeat(&mut summary);
                next_beat = now + heartbeat;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
            std::thread::sleep(TICK);
        }

        summary.drained = self.supervisor.stop_flash_writes();
        self.supervisor.stop();
        tracing::info!(
            heartbeats = summary.heartbeats,
            settings_reads = summary.settings_reads,
            drained = summary.drained,
            "daemon stopped"
        );
        if !summary.drained {
            return Err(DockError::Timeout.into());
        }
        Ok(summary)
    }
}

/// Sample every switch once.
pub fn self_check<H: DockSwitches>(switches: &mut H, ports: u8) -> eyre::Result<serde_json::Value> {
    let map = |e: dock_traits::HwResult<bool>| {
        e.map_err(|err| dock_core::hw_error::map_hw_error(err.as_ref()))
    };
    let docked = map(switches.is_docked())?;
    let mut per_port = Vec::with_capacity(usize::from(ports));
    for port in 1..=ports {
        per_port.push(json!({
            "port": port,
            "card_present": map(switches.is_card_present(port))?,
            "pressure_switch": map(switches.is_pressure_switch_present(port))?,
            "pressure_good": map(switches.is_pressure_good(port))?,
        }));
    }
    Ok(json!({ "docked": docked, "ports": per_port }))
}

/// Queued payloads, oldest first.
pub fn queue_listing(cfg: &Config) -> eyre::Result<serde_json::Value> {
    let queue = FileUploadQueue::open(&cfg.queue.dir)?;
    let entries: Vec<_> = queue
        .entries()?
        .into_iter()
        .map(|e| {
            json!({
                "id": e.id,
                "timestamp": e.timestamp.to_rfc3339(),
                "account": e.account,
                "label": e.label,
                "size": e.size,
            })
        })
        .collect();
    Ok(json!({ "len": entries.len(), "entries": entries }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dock_hardware::SimulatedDock;

    fn config(dir: &std::path::Path) -> Config {
        let mut cfg = dock_config::load_toml(
            r#"
[station]
serial_number = "DS-CLI"
port_count = 3

[services]
reporter_idle_ms = 5
switch_idle_ms = 5
debounce_ms = 1

[drain]
retries = 50
retry_ms = 10
"#,
        )
        .unwrap();
        cfg.queue.dir = dir.join("queue").to_string_lossy().into_owned();
        cfg
    }

    #[test]
    fn short_run_heartbeats_and_drains() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let sim = SimulatedDock::new(3);
        let station = build_station(&cfg, None, sim.clone(), sim).unwrap();
        let shutdown = AtomicBool::new(false);
        let summary = station
            .run(Some(0), Duration::from_millis(10), &shutdown)
            .unwrap();
        assert!(summary.drained);
        assert_eq!(summary.heartbeats, 1);
        assert_eq!(summary.settings_reads, 1);
        assert_eq!(summary.actions.get("Nothing"), Some(&2));
        let health = station.supervisor.health();
        assert!(health.queue_paused);
        assert_eq!(health.queue_len, 1);
    }

    #[test]
    fn self_check_reports_every_port() {
        let mut sim = SimulatedDock::new(2);
        sim.set_docked(true);
        let v = self_check(&mut sim, 2).unwrap();
        assert_eq!(v["docked"], true);
        assert_eq!(v["ports"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn self_check_maps_hardware_faults() {
        let mut sim = SimulatedDock::new(1);
        sim.inject_fault("bus glitch");
        let err = self_check(&mut sim, 1).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DockError>(),
            Some(DockError::Hardware(_))
        ));
    }
}
