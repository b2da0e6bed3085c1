use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::DockingStationEvent;
use crate::station::DockingStationError;

/// Standalone error report sent outside of any event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub station_serial: String,
    pub time: DateTime<Utc>,
    pub time_zone: String,
    pub error: DockingStationError,
    /// Machine codes of a notification action, if the report came from one.
    #[serde(default)]
    pub error_codes: Vec<String>,
}

/// What the durable queue carries to the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body")]
pub enum UploadPayload {
    Event {
        time_zone: String,
        event: Box<DockingStationEvent>,
    },
    Error(ErrorReport),
}

impl UploadPayload {
    pub fn event(event: &DockingStationEvent) -> Self {
        UploadPayload::Event {
            time_zone: event.station.time_zone.clone(),
            event: Box::new(event.clone()),
        }
    }

    pub fn label(&self) -> String {
        match self {
            UploadPayload::Event { event, .. } => match event.code {
                Some(code) => format!("event:{code}"),
                None => format!("event:{}", event.kind.name()),
            },
            UploadPayload::Error(_) => "error".to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
