//! In-memory transactional store used by the CLI and the tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use eyre::Report;

use crate::error::{DockError, Result};
use crate::gas::{FactoryCylinder, GasEndPoint, PressureLevel};
use crate::ports::{DataStore, EventJournal, StoreTxn};

#[derive(Debug, Default)]
struct Tables {
    journal: Vec<EventJournal>,
    schedules: BTreeSet<i64>,
    /// Keyed by port position.
    gas_end_points: BTreeMap<u8, GasEndPoint>,
    catalog: BTreeMap<String, FactoryCylinder>,
}

#[derive(Debug)]
enum Write {
    Journal(EventJournal),
    DeleteSchedule(i64),
    Replace(Vec<GasEndPoint>),
    Update(Vec<GasEndPoint>),
    Pressure(u8, PressureLevel),
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_commits: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_catalog(self, cylinders: impl IntoIterator<Item = FactoryCylinder>) -> Self {
        {
            let mut t = self.tables();
            for c in cylinders {
                t.catalog.insert(c.part_number.clone(), c);
            }
        }
        self
    }

    pub fn add_schedule(&self, id: i64) {
        self.tables().schedules.insert(id);
    }

    pub fn has_schedule(&self, id: i64) -> bool {
        self.tables().schedules.contains(&id)
    }

    pub fn journal(&self) -> Vec<EventJournal> {
        self.tables().journal.clone()
    }

    /// Make every following commit fail until cleared.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

struct MemoryTxn<'a> {
    store: &'a MemoryStore,
    writes: Vec<Write>,
}

impl StoreTxn for MemoryTxn<'_> {
    fn save_journal(&mut self, row: EventJournal) -> Result<()> {
        self.writes.push(Write::Journal(row));
        Ok(())
    }

    fn delete_schedule(&mut self, id: i64) -> Result<()> {
        self.writes.push(Write::DeleteSchedule(id));
        Ok(())
    }

    fn replace_gas_end_points(&mut self, installed: &[GasEndPoint]) -> Result<()> {
        self.writes.push(Write::Replace(installed.to_vec()));
        Ok(())
    }

    fn update_gas_end_points(&mut self, changed: &[GasEndPoint]) -> Result<()> {
        self.writes.push(Write::Update(changed.to_vec()));
        Ok(())
    }

    fn update_cylinder_pressure(&mut self, position: u8, pressure: PressureLevel) -> Result<()> {
        self.writes.push(Write::Pressure(position, pressure));
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTxn { store, writes } = *self;
        if store.fail_commits.load(Ordering::SeqCst) {
            return Err(Report::new(DockError::Store("commit rejected".into())));
        }
        let count = writes.len();
        let mut t = store.tables();
        for w in writes {
            match w {
                Write::Journal(row) => t.journal.push(row),
                Write::DeleteSchedule(id) => {
                    t.schedules.remove(&id);
                }
                Write::Replace(all) => {
                    t.gas_end_points = all.into_iter().map(|g| (g.position, g)).collect();
                }
                Write::Update(changed) => {
                    for g in changed {
                        t.gas_end_points.insert(g.position, g);
                    }
                }
                Write::Pressure(position, pressure) => {
                    if let Some(g) = t.gas_end_points.get_mut(&position) {
                        g.cylinder.pressure = pressure;
                    }
                }
            }
        }
        tracing::trace!(writes = count, "store transaction committed");
        Ok(())
    }
}

impl DataStore for MemoryStore {
    fn begin(&self) -> Result<Box<dyn StoreTxn + '_>> {
        Ok(Box::new(MemoryTxn {
            store: self,
            writes: Vec::new(),
        }))
    }

    fn gas_end_points(&self) -> Result<Vec<GasEndPoint>> {
        Ok(self.tables().gas_end_points.values().cloned().collect())
    }

    fn find_factory_cylinder(&self, part_number: &str) -> Result<Option<FactoryCylinder>> {
        Ok(self.tables().catalog.get(part_number).cloned())
    }
}
