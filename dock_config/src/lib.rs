#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and factory-cylinder catalog parsing for the docking station.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The cylinder catalog CSV loader enforces headers and merges the rows of
//!   a part number into a single catalog entry.
use serde::Deserialize;
use serde::de::Deserializer;
use std::collections::BTreeMap;

/// Factory cylinder catalog CSV schema.
///
/// Expected headers:
/// part_number,factory_id,gas_code,concentration_ppm
///
/// Example:
/// part_number,factory_id,gas_code,concentration_ppm
/// 1810-9155,36,G0001,100
/// 1810-9155,36,G0021,25000
#[derive(Debug, Deserialize, Clone)]
pub struct CatalogRow {
    pub part_number: String,
    pub factory_id: i64,
    pub gas_code: String,
    pub concentration_ppm: f64,
}

/// One known cylinder part number and everything it contains.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub part_number: String,
    pub factory_id: i64,
    pub gases: Vec<(String, f64)>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StationCfg {
    pub serial_number: String,
    /// Number of gas ports on the manifold.
    pub port_count: u8,
    /// Unmanaged ("cal station") mode: exports artifacts locally.
    pub cal_station_mode: bool,
    /// Gas used to bump combustible sensors; empty means the sensor's calibration gas.
    pub combustible_bump_test_gas: String,
    /// Air kinds allowed on port 1. Accepts either a list of strings
    /// (`["fresh_air", "zero_air"]`) or a table (`{ fresh_air = true, zero_air = false }`).
    #[serde(deserialize_with = "de_port1_restrictions")]
    pub port1_restrictions: Port1Cfg,
    pub use_expired_cylinders_for_bump: bool,
    pub time_zone: String,
    /// Accounts that may only operate while the manufacturing network is reachable.
    pub manufacturing_accounts: Vec<String>,
}

impl Default for StationCfg {
    fn default() -> Self {
        Self {
            serial_number: String::new(),
            port_count: 3,
            cal_station_mode: false,
            combustible_bump_test_gas: String::new(),
            port1_restrictions: Port1Cfg::default(),
            use_expired_cylinders_for_bump: false,
            time_zone: "UTC".to_string(),
            manufacturing_accounts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port1Cfg {
    pub fresh_air: bool,
    pub zero_air: bool,
}

impl Default for Port1Cfg {
    fn default() -> Self {
        Self {
            fresh_air: true,
            zero_air: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Port1Toml {
    List(Vec<String>),
    Table {
        #[serde(default)]
        fresh_air: bool,
        #[serde(default)]
        zero_air: bool,
    },
}

fn de_port1_restrictions<'de, D>(deserializer: D) -> Result<Port1Cfg, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Port1Toml> = Option::deserialize(deserializer)?;
    let Some(raw) = opt else {
        return Ok(Port1Cfg::default());
    };
    match raw {
        Port1Toml::Table {
            fresh_air,
            zero_air,
        } => Ok(Port1Cfg {
            fresh_air,
            zero_air,
        }),
        Port1Toml::List(items) => {
            let mut out = Port1Cfg {
                fresh_air: false,
                zero_air: false,
            };
            for item in items {
                match item.to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
                    "fresh_air" => out.fresh_air = true,
                    "zero_air" => out.zero_air = true,
                    other => {
                        return Err(serde::de::Error::custom(format!(
                            "unknown port1 restriction '{other}' (expected fresh_air or zero_air)"
                        )));
                    }
                }
            }
            Ok(out)
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AccountCfg {
    pub number: Option<String>,
    pub activated: bool,
    pub service_mode: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServicesCfg {
    /// Sleep between upload-queue drain cycles (ms).
    pub reporter_idle_ms: u64,
    /// Sleep between switch polling cycles (ms).
    pub switch_idle_ms: u64,
    /// One-time delay before services start (ms).
    pub delayed_start_ms: u64,
    /// Settle time between the two samples of a debounced read (ms).
    pub debounce_ms: u64,
}

impl Default for ServicesCfg {
    fn default() -> Self {
        Self {
            reporter_idle_ms: 10_000,
            switch_idle_ms: 500,
            delayed_start_ms: 0,
            debounce_ms: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UploaderCfg {
    /// Remote service URL; the upload queue is never drained while unset.
    pub url: Option<String>,
    /// Initial network state for simulated runs.
    pub network_present: bool,
}

impl Default for UploaderCfg {
    fn default() -> Self {
        Self {
            url: None,
            network_present: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PoisonMode {
    /// Keep in debug builds, purge in release builds.
    #[default]
    Auto,
    Keep,
    Purge,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QueueCfg {
    pub dir: String,
    /// What to do with an upload-queue entry that cannot be decoded.
    pub poison: PoisonMode,
}

impl Default for QueueCfg {
    fn default() -> Self {
        Self {
            dir: "data/queue".to_string(),
            poison: PoisonMode::Auto,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DrainCfg {
    /// Quiescence polls before giving up on a stop-flash-writes request.
    pub retries: u32,
    pub retry_ms: u64,
}

impl Default for DrainCfg {
    fn default() -> Self {
        Self {
            retries: 180,
            retry_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExportCfg {
    /// Directory receiving cal-station CSV artifacts.
    pub dir: String,
}

impl Default for ExportCfg {
    fn default() -> Self {
        Self {
            dir: "data/export".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Pins {
    pub dock_switch: Option<u8>,
    pub card_presence: Vec<u8>,
    pub pressure_switch: Vec<u8>,
    pub pressure_good: Vec<u8>,
    pub valves: Vec<u8>,
    pub led_red: Option<u8>,
    pub led_green: Option<u8>,
    pub led_yellow: Option<u8>,
    pub buzzer: Option<u8>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub station: StationCfg,
    #[serde(default)]
    pub account: AccountCfg,
    #[serde(default)]
    pub services: ServicesCfg,
    #[serde(default)]
    pub uploader: UploaderCfg,
    #[serde(default)]
    pub queue: QueueCfg,
    #[serde(default)]
    pub drain: DrainCfg,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub export: ExportCfg,
    /// GPIO wiring, only used by hardware builds.
    #[serde(default)]
    pub pins: Pins,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

// Ergonomic conversions for building the catalog
impl TryFrom<Vec<CatalogRow>> for Catalog {
    type Error = eyre::Report;
    fn try_from(rows: Vec<CatalogRow>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

/// Known cylinder part numbers, keyed by part number.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    pub entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Merge rows by part number. A part number must always map to the same
    /// factory id, and may list each gas only once.
    pub fn from_rows(rows: Vec<CatalogRow>) -> eyre::Result<Self> {
        let mut by_part: BTreeMap<String, CatalogEntry> = BTreeMap::new();
        for (idx, row) in rows.into_iter().enumerate() {
            let line = idx + 2;
            let part = row.part_number.trim().to_string();
            if part.is_empty() {
                eyre::bail!("catalog row {line}: empty part_number");
            }
            let gas = row.gas_code.trim().to_string();
            if gas.is_empty() {
                eyre::bail!("catalog row {line}: empty gas_code");
            }
            if !(row.concentration_ppm.is_finite() && row.concentration_ppm > 0.0) {
                eyre::bail!("catalog row {line}: concentration_ppm must be > 0");
            }
            let entry = by_part.entry(part.clone()).or_insert_with(|| CatalogEntry {
                part_number: part.clone(),
                factory_id: row.factory_id,
                gases: Vec::new(),
            });
            if entry.factory_id != row.factory_id {
                eyre::bail!(
                    "catalog row {line}: part {part} has conflicting factory ids {} and {}",
                    entry.factory_id,
                    row.factory_id
                );
            }
            if entry.gases.iter().any(|(g, _)| *g == gas) {
                eyre::bail!("catalog row {line}: part {part} lists gas {gas} twice");
            }
            entry.gases.push((gas, row.concentration_ppm));
        }
        Ok(Catalog {
            entries: by_part.into_values().collect(),
        })
    }

    pub fn find(&self, part_number: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.part_number == part_number)
    }
}

pub fn load_catalog_csv(path: &std::path::Path) -> eyre::Result<Catalog> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open cylinder catalog CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["part_number", "factory_id", "gas_code", "concentration_ppm"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "cylinder catalog CSV must have headers 'part_number,factory_id,gas_code,concentration_ppm', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CatalogRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    Catalog::try_from(rows)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Station
        if self.station.serial_number.trim().is_empty() {
            eyre::bail!("station.serial_number must not be empty");
        }
        if !(1..=6).contains(&self.station.port_count) {
            eyre::bail!("station.port_count must be in [1, 6]");
        }
        if self.station.time_zone.trim().is_empty() {
            eyre::bail!("station.time_zone must not be empty");
        }

        // Account
        if let Some(number) = &self.account.number
            && number.trim().is_empty()
        {
            eyre::bail!("account.number must not be empty when set");
        }

        // Services
        if self.services.switch_idle_ms == 0 {
            eyre::bail!("services.switch_idle_ms must be >= 1");
        }
        if self.services.reporter_idle_ms == 0 {
            eyre::bail!("services.reporter_idle_ms must be >= 1");
        }
        if self.services.debounce_ms > 5_000 {
            eyre::bail!("services.debounce_ms is unreasonably large (>5s)");
        }
        if self.services.delayed_start_ms > 10 * 60 * 1000 {
            eyre::bail!("services.delayed_start_ms is unreasonably large (>10min)");
        }

        // Uploader
        if let Some(url) = &self.uploader.url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            eyre::bail!("uploader.url must start with http:// or https://");
        }

        // Queue
        if self.queue.dir.trim().is_empty() {
            eyre::bail!("queue.dir must not be empty");
        }

        // Drain
        if self.drain.retries == 0 {
            eyre::bail!("drain.retries must be >= 1");
        }
        if self.drain.retry_ms == 0 {
            eyre::bail!("drain.retry_ms must be >= 1");
        }

        // Pins: per-port wiring, when given, must cover every port
        let ports = usize::from(self.station.port_count);
        for (name, pins) in [
            ("pins.card_presence", &self.pins.card_presence),
            ("pins.pressure_switch", &self.pins.pressure_switch),
            ("pins.pressure_good", &self.pins.pressure_good),
            ("pins.valves", &self.pins.valves),
        ] {
            if !pins.is_empty() && pins.len() != ports {
                eyre::bail!("{name} must list exactly {ports} pins (one per port)");
            }
        }

        Ok(())
    }
}
