//! Cal-station CSV artifacts.
//!
//! In unmanaged mode gas-response and datalog events are appended to CSV
//! files in the export directory; headers are written when a file is new.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use eyre::WrapErr;
use serde::Serialize;

use crate::error::Result;
use crate::event::{DockingStationEvent, EventKind};
use crate::gas::GasType;
use crate::ports::ArtifactExporter;

pub const GAS_RESPONSES_FILE: &str = "gas_responses.csv";
pub const DATALOG_SESSIONS_FILE: &str = "datalog_sessions.csv";

#[derive(Debug, Serialize)]
struct GasResponseRow<'a> {
    event_time: DateTime<Utc>,
    operation: &'a str,
    instrument_serial: &'a str,
    sensor_uid: &'a str,
    sensor_type: &'a str,
    gas: &'a str,
    status: String,
    reading: f64,
    span_reserve: f64,
    cylinders: String,
}

#[derive(Debug, Serialize)]
struct DatalogSessionRow<'a> {
    event_time: DateTime<Utc>,
    instrument_serial: &'a str,
    session_start: DateTime<Utc>,
    record_count: u32,
    corrupted: bool,
}

#[derive(Debug)]
pub struct CsvExporter {
    dir: PathBuf,
    // Serializes appends from concurrent reporters.
    write_lock: Mutex<()>,
}

impl CsvExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn append<T: Serialize>(&self, file: &str, rows: impl IntoIterator<Item = T>) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        fs::create_dir_all(&self.dir)
            .wrap_err_with(|| format!("creating export dir {}", self.dir.display()))?;
        let path = self.dir.join(file);
        let is_new = !path.exists();
        let f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .wrap_err_with(|| format!("opening {}", path.display()))?;
        let mut w = csv::WriterBuilder::new().has_headers(is_new).from_writer(f);
        let mut count = 0usize;
        for row in rows {
            w.serialize(row)?;
            count += 1;
        }
        w.flush()?;
        tracing::debug!(file, rows = count, "exported artifact rows");
        Ok(())
    }
}

fn instrument_serial(event: &DockingStationEvent) -> &str {
    event
        .instrument
        .as_ref()
        .map_or("", |i| i.serial_number.as_str())
}

impl ArtifactExporter for CsvExporter {
    fn export_gas_responses(&self, event: &DockingStationEvent) -> Result<()> {
        let Some(g) = event.kind.gas_responses() else {
            return Ok(());
        };
        let operation = match event.kind {
            EventKind::InstrumentCalibration(_) => "calibration",
            _ => "bump",
        };
        let serial = instrument_serial(event);
        let rows = g
            .responses
            .iter()
            .map(|r| (operation, r))
            .chain(
                g.high_bump_failure_cal_responses
                    .iter()
                    .map(|r| ("calibration", r)),
            )
            .map(|(operation, r)| GasResponseRow {
                event_time: event.time,
                operation,
                instrument_serial: serial,
                sensor_uid: &r.uid,
                sensor_type: &r.type_code,
                gas: GasType::symbol_for(&r.gas_code),
                status: format!("{:?}", r.status),
                reading: r.reading,
                span_reserve: r.span_reserve,
                cylinders: r
                    .used_cylinders
                    .iter()
                    .map(|c| format!("{}:{}", c.position, c.part_number))
                    .collect::<Vec<_>>()
                    .join(";"),
            });
        self.append(GAS_RESPONSES_FILE, rows)
    }

    fn export_datalog(&self, event: &DockingStationEvent) -> Result<()> {
        let EventKind::InstrumentDatalogDownload(d) = &event.kind else {
            return Ok(());
        };
        let serial = instrument_serial(event);
        let rows = d.entries.iter().map(|e| DatalogSessionRow {
            event_time: event.time,
            instrument_serial: serial,
            session_start: e.started,
            record_count: e.record_count,
            corrupted: d.corrupted,
        });
        self.append(DATALOG_SESSIONS_FILE, rows)
    }
}
