//! Per-process record store.
//!
//! Records live in an ordered arena (`Vec`) used for iteration and sorting, with an
//! `AHashMap` index from pid to arena slot. Each record carries a seen-mark that is
//! set on lookup and cleared by [`ProcessRecordStore::trim`]; a record that misses a
//! single cycle is evicted.

use ahash::AHashMap as HashMap;
use std::cmp::Ordering;
use tracing::debug;

use crate::cursor::{SortField, SortKey};
use crate::source::ProcSample;

/// Raised when a new record cannot be allocated.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to allocate record for pid {pid}: {reason}")]
    Allocation { pid: u32, reason: String },
}

/// Run-state classification used for task counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RunState {
    Running,
    Sleeping,
    Stopped,
    Zombie,
    /// Any other state character (`D`, `I`, `X`, ...). Counted as sleeping.
    Other,
}

impl RunState {
    pub fn from_char(c: char) -> Self {
        match c {
            'R' => RunState::Running,
            'S' => RunState::Sleeping,
            'T' | 't' => RunState::Stopped,
            'Z' => RunState::Zombie,
            _ => RunState::Other,
        }
    }
}

/// One tracked process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: u32,
    /// Cumulative ticks at the last observation. `None` until the first sample lands.
    pub last_ticks: Option<u64>,
    /// Ticks consumed during the last interval.
    pub cpu_delta: u64,
    /// Start time of the process currently holding this pid.
    pub start_time: u64,
    /// Raw state character, kept for display and state ordering.
    pub state_char: char,
    pub state: RunState,
    pub resident_pages: u64,
    pub uid: u32,
    pub user: String,
    pub command: String,
    seen: bool,
}

impl ProcessRecord {
    fn new(pid: u32) -> Self {
        Self {
            pid,
            last_ticks: None,
            cpu_delta: 0,
            start_time: 0,
            state_char: '?',
            state: RunState::Other,
            resident_pages: 0,
            uid: 0,
            user: String::new(),
            command: String::new(),
            seen: true,
        }
    }

    pub fn seen(&self) -> bool {
        self.seen
    }

    /// Folds a fresh sample into the record.
    ///
    /// The first sample only sets the baseline. A changed start time or a tick
    /// counter that went backwards means the pid was reused by a new process; that
    /// also restarts the baseline.
    pub fn observe(&mut self, sample: &ProcSample) {
        if self.last_ticks.is_some() && sample.start_time != self.start_time {
            debug!(
                "pid {} reused (start time {} -> {}), restarting baseline",
                self.pid, self.start_time, sample.start_time
            );
            self.last_ticks = None;
        }
        self.start_time = sample.start_time;

        self.cpu_delta = match self.last_ticks {
            Some(prev) if sample.cpu_ticks >= prev => sample.cpu_ticks - prev,
            Some(prev) => {
                debug!(
                    "pid {} ticks went backwards ({} -> {}), restarting baseline",
                    self.pid, prev, sample.cpu_ticks
                );
                0
            }
            None => 0,
        };
        self.last_ticks = Some(sample.cpu_ticks);
        self.state_char = sample.state;
        self.state = RunState::from_char(sample.state);
        self.resident_pages = sample.resident_pages;
        self.uid = sample.uid;
        self.user.clone_from(&sample.user);
        self.command.clone_from(&sample.command);
    }
}

/// Mark-and-trim cache of process records keyed by pid.
#[derive(Debug, Default)]
pub struct ProcessRecordStore {
    records: Vec<ProcessRecord>,
    index: HashMap<u32, usize>,
    sort: Option<SortKey>,
    /// Fails every new insertion, standing in for an exhausted allocator.
    #[cfg(test)]
    pub(crate) reject_new: bool,
}

impl ProcessRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for `pid`, marking it seen, or inserts a fresh one.
    pub fn lookup_or_create(&mut self, pid: u32) -> Result<&mut ProcessRecord, StoreError> {
        if let Some(&slot) = self.index.get(&pid) {
            let rec = &mut self.records[slot];
            rec.seen = true;
            return Ok(rec);
        }

        #[cfg(test)]
        if self.reject_new {
            return Err(StoreError::Allocation {
                pid,
                reason: "insertion rejected".into(),
            });
        }

        self.records
            .try_reserve(1)
            .map_err(|e| StoreError::Allocation {
                pid,
                reason: e.to_string(),
            })?;
        self.index.try_reserve(1).map_err(|e| StoreError::Allocation {
            pid,
            reason: e.to_string(),
        })?;

        let slot = self.records.len();
        self.records.push(ProcessRecord::new(pid));
        self.index.insert(pid, slot);
        Ok(&mut self.records[slot])
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessRecord> {
        self.index.get(&pid).map(|&slot| &self.records[slot])
    }

    /// Clears the seen-mark of a tracked pid so the next trim evicts it.
    pub fn mark_unseen(&mut self, pid: u32) -> bool {
        match self.index.get(&pid) {
            Some(&slot) => {
                self.records[slot].seen = false;
                true
            }
            None => false,
        }
    }

    /// Evicts every record not seen since the last trim and clears the marks of the
    /// survivors. Returns the number of evicted records.
    pub fn trim(&mut self) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.seen);
        for rec in &mut self.records {
            rec.seen = false;
        }
        let evicted = before - self.records.len();
        if evicted > 0 {
            self.reindex();
            debug!("Trimmed {} stale process records", evicted);
        }
        evicted
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Live records in their current order.
    pub fn records(&self) -> &[ProcessRecord] {
        &self.records
    }

    pub fn at(&self, row: usize) -> Option<&ProcessRecord> {
        self.records.get(row)
    }

    pub fn sort_key(&self) -> Option<SortKey> {
        self.sort
    }

    /// Sets the active sort key and reorders the records.
    pub fn set_sort(&mut self, key: SortKey) {
        self.sort = Some(key);
        self.apply_sort();
    }

    /// Reorders the records by the active sort key, if any. Ties keep no particular
    /// order.
    pub fn apply_sort(&mut self) {
        let Some(key) = self.sort else {
            return;
        };
        self.records
            .sort_unstable_by(|a, b| compare_records(a, b, key.field, key.descending));
        self.reindex();
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (slot, rec) in self.records.iter().enumerate() {
            self.index.insert(rec.pid, slot);
        }
    }

    /// Index and arena agree in both directions.
    pub fn is_consistent(&self) -> bool {
        self.index.len() == self.records.len()
            && self
                .records
                .iter()
                .enumerate()
                .all(|(slot, r)| self.index.get(&r.pid) == Some(&slot))
    }
}

/// Single comparator for every sortable field.
pub fn compare_records(
    a: &ProcessRecord,
    b: &ProcessRecord,
    field: SortField,
    descending: bool,
) -> Ordering {
    let ord = match field {
        SortField::Pid => a.pid.cmp(&b.pid),
        SortField::Cpu => a.cpu_delta.cmp(&b.cpu_delta),
        SortField::Memory => a.resident_pages.cmp(&b.resident_pages),
        SortField::State => a.state_char.cmp(&b.state_char),
    };
    if descending {
        ord.reverse()
    } else {
        ord
    }
}
