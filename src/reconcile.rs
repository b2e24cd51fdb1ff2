//! Refresh cycle: reconcile a fresh enumeration against the record store.
//!
//! One cycle enumerates the live process set, folds every sample into its record,
//! tallies run states, trims records that were not observed, re-applies the active
//! sort and finally advances the CPU accumulator. A cycle whose enumeration fails
//! leaves everything as it was.

use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::cpu::{CpuAccumulator, CpuCategory, CpuDelta, IrqAccounting};
use crate::cursor::{CellContext, SortKey, SortableCursor};
use crate::source::{CounterSource, ProcEntry, ProcessSource, SourceError};
use crate::store::{ProcessRecordStore, RunState};

/// Task counts by run state for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    pub total: usize,
    pub running: usize,
    pub sleeping: usize,
    pub stopped: usize,
    pub zombie: usize,
}

impl TaskCounts {
    pub fn add(&mut self, state: RunState) {
        self.total += 1;
        match state {
            RunState::Running => self.running += 1,
            RunState::Stopped => self.stopped += 1,
            RunState::Zombie => self.zombie += 1,
            RunState::Sleeping | RunState::Other => self.sleeping += 1,
        }
    }
}

/// Outcome of folding one enumeration into the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub counts: TaskCounts,
    pub vanished: usize,
    pub skipped: usize,
    pub evicted: usize,
}

/// Folds `entries` into `store` and trims whatever was not observed.
pub fn reconcile(store: &mut ProcessRecordStore, entries: &[ProcEntry]) -> ReconcileStats {
    let mut stats = ReconcileStats::default();

    for entry in entries {
        match entry {
            ProcEntry::Observed(sample) => match store.lookup_or_create(sample.pid) {
                Ok(rec) => {
                    rec.observe(sample);
                    stats.counts.add(rec.state);
                }
                Err(e) => {
                    warn!("Skipping process {} this cycle: {}", sample.pid, e);
                    stats.skipped += 1;
                }
            },
            ProcEntry::Vanished(pid) => {
                if store.mark_unseen(*pid) {
                    debug!("Tracked process {} vanished mid-read", pid);
                }
                stats.vanished += 1;
            }
        }
    }

    stats.evicted = store.trim();
    store.apply_sort();
    stats
}

/// Summary of a completed refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub counts: TaskCounts,
    pub records: usize,
    pub vanished: usize,
    pub skipped: usize,
    pub evicted: usize,
    /// False when the counter source failed and the previous CPU delta is kept.
    pub cpu_updated: bool,
    pub duration: Duration,
}

/// Sampling context: the record store, the CPU accumulator and the last cycle's
/// task counts.
#[derive(Debug)]
pub struct Sampler {
    store: ProcessRecordStore,
    cpu: CpuAccumulator,
    counts: TaskCounts,
    cycles: u64,
    period: Duration,
}

impl Sampler {
    /// Creates a sampler and takes the initial CPU counter reading.
    pub fn new(counters: &mut dyn CounterSource, irq: IrqAccounting, period: Duration) -> Self {
        Self {
            store: ProcessRecordStore::new(),
            cpu: CpuAccumulator::init(counters, irq),
            counts: TaskCounts::default(),
            cycles: 0,
            period,
        }
    }

    /// Runs one refresh cycle against a source serving both processes and counters.
    pub fn refresh<S>(&mut self, source: &mut S) -> Result<CycleReport, SourceError>
    where
        S: ProcessSource + CounterSource,
    {
        let entries = source.enumerate();
        self.complete_cycle(entries, source)
    }

    /// Runs one refresh cycle with separate process and counter sources.
    pub fn refresh_from(
        &mut self,
        procs: &mut dyn ProcessSource,
        counters: &mut dyn CounterSource,
    ) -> Result<CycleReport, SourceError> {
        let entries = procs.enumerate();
        self.complete_cycle(entries, counters)
    }

    #[instrument(skip_all, fields(cycle = self.cycles + 1))]
    fn complete_cycle(
        &mut self,
        entries: Result<Vec<ProcEntry>, SourceError>,
        counters: &mut dyn CounterSource,
    ) -> Result<CycleReport, SourceError> {
        let start = Instant::now();

        let entries = match entries {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Process enumeration failed, keeping previous sample: {}", e);
                return Err(e);
            }
        };

        let stats = reconcile(&mut self.store, &entries);
        self.counts = stats.counts;

        let cpu_updated = match self.cpu.update(counters) {
            Ok(_) => true,
            Err(e) => {
                warn!("CPU counter read failed, keeping previous delta: {}", e);
                false
            }
        };

        self.cycles += 1;
        let report = CycleReport {
            cycle: self.cycles,
            counts: self.counts,
            records: self.store.count(),
            vanished: stats.vanished,
            skipped: stats.skipped,
            evicted: stats.evicted,
            cpu_updated,
            duration: start.elapsed(),
        };

        debug!(
            "Cycle {} done: {} tasks ({} running), {} evicted, {} vanished in {:.2}ms",
            report.cycle,
            report.counts.total,
            report.counts.running,
            report.evicted,
            report.vanished,
            report.duration.as_secs_f64() * 1000.0
        );
        if report.cycle == 1 {
            info!("First sample taken: {} processes", report.records);
        }

        Ok(report)
    }

    pub fn counts(&self) -> TaskCounts {
        self.counts
    }

    pub fn cpu_delta(&self) -> Option<&CpuDelta> {
        self.cpu.delta()
    }

    /// System-wide CPU share for `category`, `None` while unknown.
    pub fn cpu_percent(&self, category: CpuCategory) -> Option<f64> {
        self.cpu.percent(category)
    }

    pub fn accumulator(&self) -> &CpuAccumulator {
        &self.cpu
    }

    pub fn store(&self) -> &ProcessRecordStore {
        &self.store
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Sets the sort key applied on every following cycle.
    pub fn set_sort(&mut self, key: SortKey) {
        self.store.set_sort(key);
    }

    /// Opens a read pass over the current records.
    pub fn cursor(&mut self) -> SortableCursor<'_> {
        let ctx = CellContext::new(self.period);
        SortableCursor::new(&mut self.store, ctx)
    }

    /// Same as [`Sampler::cursor`] with explicit formatting values.
    pub fn cursor_with(&mut self, ctx: CellContext) -> SortableCursor<'_> {
        SortableCursor::new(&mut self.store, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ProcSample;

    fn observed(pid: u32, ticks: u64, state: char) -> ProcEntry {
        ProcEntry::Observed(ProcSample {
            pid,
            cpu_ticks: ticks,
            start_time: 0,
            resident_pages: 1,
            state,
            uid: 0,
            user: "root".into(),
            command: "sh".into(),
        })
    }

    #[test]
    fn test_task_counts_buckets() {
        let mut store = ProcessRecordStore::new();
        let entries = vec![
            observed(1, 0, 'R'),
            observed(2, 0, 'S'),
            observed(3, 0, 'D'),
            observed(4, 0, 'T'),
            observed(5, 0, 't'),
            observed(6, 0, 'Z'),
            observed(7, 0, 'I'),
        ];
        let stats = reconcile(&mut store, &entries);
        assert_eq!(
            stats.counts,
            TaskCounts {
                total: 7,
                running: 1,
                sleeping: 3,
                stopped: 2,
                zombie: 1,
            }
        );
        assert_eq!(store.count(), 7);
    }

    #[test]
    fn test_reconcile_delta_and_eviction() {
        let mut store = ProcessRecordStore::new();

        reconcile(&mut store, &[observed(100, 500, 'S'), observed(200, 10, 'S')]);
        assert_eq!(store.get(100).unwrap().cpu_delta, 0);

        let stats = reconcile(&mut store, &[observed(100, 520, 'R')]);
        assert_eq!(store.get(100).unwrap().cpu_delta, 20);
        assert_eq!(stats.evicted, 1);
        assert!(store.get(200).is_none());

        let stats = reconcile(&mut store, &[]);
        assert_eq!(stats.evicted, 1);
        assert!(store.is_empty());
        assert_eq!(stats.counts.total, 0);
    }

    #[test]
    fn test_allocation_failure_skips_only_new_process() {
        let mut store = ProcessRecordStore::new();
        reconcile(&mut store, &[observed(1, 0, 'S')]);

        store.reject_new = true;
        let stats = reconcile(&mut store, &[observed(1, 8, 'R'), observed(2, 3, 'R')]);

        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.counts.total, 1);
        assert_eq!(stats.counts.running, 1);
        assert_eq!(store.get(1).unwrap().cpu_delta, 8);
        assert!(store.get(2).is_none());
        assert!(store.is_consistent());
    }

    #[test]
    fn test_vanished_pid_is_evicted_not_counted() {
        let mut store = ProcessRecordStore::new();
        reconcile(&mut store, &[observed(1, 0, 'S'), observed(2, 0, 'S')]);

        let stats = reconcile(&mut store, &[observed(1, 5, 'S'), ProcEntry::Vanished(2)]);
        assert_eq!(stats.vanished, 1);
        assert_eq!(stats.counts.total, 1);
        assert!(store.get(2).is_none());
        assert!(store.is_consistent());
    }
}
