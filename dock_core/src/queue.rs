//! Durable, at-least-once upload queue.
//!
//! Each entry lives in its own JSON file named by a zero-padded id, so the
//! lexical order of the directory is the FIFO order. Entries are removed only
//! by an explicit `delete` after the remote service acknowledged them.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::atomic::{remove_if_exists, write_json_atomic};
use crate::upload::UploadPayload;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("upload queue is paused")]
    Paused,
    #[error("queue entry {id} cannot be decoded")]
    Corrupt { id: u64 },
    #[error("queue i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("queue entry cannot be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One queued upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueData {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub account: String,
    pub label: String,
    /// Encoded payload length in bytes.
    pub size: usize,
    pub payload: UploadPayload,
}

pub trait UploadQueue: Send + Sync {
    fn push(&self, account: &str, payload: UploadPayload) -> Result<u64, QueueError>;
    /// Oldest entry, without removing it. `None` when empty or paused.
    fn peek(&self) -> Result<Option<QueueData>, QueueError>;
    fn delete(&self, id: u64) -> Result<(), QueueError>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn set_paused(&self, paused: bool);
    fn is_paused(&self) -> bool;
}

#[derive(Debug)]
pub struct FileUploadQueue {
    dir: PathBuf,
    next_id: Mutex<u64>,
    paused: AtomicBool,
}

const EXT: &str = "json";

impl FileUploadQueue {
    /// Open (creating if needed) the queue directory. Ids continue after
    /// the highest one already on disk.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let last = Self::ids_in(&dir)?.last().copied().unwrap_or(0);
        tracing::debug!(dir = %dir.display(), last_id = last, "upload queue opened");
        Ok(Self {
            dir,
            next_id: Mutex::new(last + 1),
            paused: AtomicBool::new(false),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: u64) -> PathBuf {
        self.dir.join(format!("{id:010}.{EXT}"))
    }

    fn ids_in(dir: &Path) -> Result<Vec<u64>, QueueError> {
        let mut ids: Vec<u64> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|e| e == EXT))
            .filter_map(|p| p.file_stem()?.to_str()?.parse().ok())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Every decodable entry in FIFO order; corrupt entries are skipped.
    pub fn entries(&self) -> Result<Vec<QueueData>, QueueError> {
        let mut out = Vec::new();
        for id in Self::ids_in(&self.dir)? {
            match self.read(id) {
                Ok(d) => out.push(d),
                Err(QueueError::Corrupt { id }) => {
                    tracing::warn!(id, "skipping undecodable queue entry");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    fn read(&self, id: u64) -> Result<QueueData, QueueError> {
        let bytes = fs::read(self.path_for(id))?;
        serde_json::from_slice(&bytes).map_err(|_| QueueError::Corrupt { id })
    }
}

impl UploadQueue for FileUploadQueue {
    fn push(&self, account: &str, payload: UploadPayload) -> Result<u64, QueueError> {
        if self.is_paused() {
            return Err(QueueError::Paused);
        }
        let size = payload.to_json()?.len();
        let mut next = self.next_id.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let id = *next;
        let data = QueueData {
            id,
            timestamp: Utc::now(),
            account: account.to_string(),
            label: payload.label(),
            size,
            payload,
        };
        write_json_atomic(&self.path_for(id), &data)?;
        *next += 1;
        tracing::debug!(id, label = %data.label, size, "queued upload");
        Ok(id)
    }

    fn peek(&self) -> Result<Option<QueueData>, QueueError> {
        if self.is_paused() {
            return Ok(None);
        }
        match Self::ids_in(&self.dir)?.first() {
            Some(&id) => self.read(id).map(Some),
            None => Ok(None),
        }
    }

    fn delete(&self, id: u64) -> Result<(), QueueError> {
        remove_if_exists(&self.path_for(id))?;
        Ok(())
    }

    fn len(&self) -> usize {
        Self::ids_in(&self.dir).map_or(0, |ids| ids.len())
    }

    fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}
