//! Herakles Top Library
//!
//! This library provides the sampling core of `herakles-top`: it re-reads the live
//! process list and the aggregate CPU counters on every refresh, reconciles them
//! against a persistent table keyed by pid, and exposes the result through a
//! cursor suited to virtualized table views.
//!
//! # Features
//!
//! - **CPU Accounting**: Two-generation delta over `/proc/stat` counters with an iowait anomaly guard
//! - **Record Store**: Mark-and-trim table that evicts any pid missing for one cycle
//! - **Reconciliation**: Per-process tick deltas and task state counts
//! - **Cursor**: Sortable reset/advance/read protocol that formats one cell at a time
//!
//! # Usage
//!
//! ```rust
//! use std::time::Duration;
//! use herakles_top::{
//!     Column, CpuCategory, CpuCounters, IrqAccounting, ProcSample, Replay, ReplayFrame,
//!     Sampler, SortField,
//! };
//!
//! let sample = |ticks| ProcSample {
//!     pid: 100,
//!     cpu_ticks: ticks,
//!     start_time: 0,
//!     resident_pages: 256,
//!     state: 'R',
//!     uid: 0,
//!     user: "root".into(),
//!     command: "worker".into(),
//! };
//! let frame = |usr, idle, ticks| ReplayFrame {
//!     counters: CpuCounters { usr, idle, ..Default::default() },
//!     processes: vec![sample(ticks)],
//!     ..Default::default()
//! };
//!
//! let mut source = Replay::new(vec![frame(0, 0, 500), frame(50, 150, 520)]);
//! let mut sampler = Sampler::new(&mut source, IrqAccounting::default(), Duration::from_secs(2));
//!
//! sampler.refresh(&mut source).unwrap();
//! sampler.refresh(&mut source).unwrap();
//! assert_eq!(sampler.cpu_percent(CpuCategory::User), Some(25.0));
//!
//! let mut cursor = sampler.cursor();
//! cursor.set_sort(SortField::Cpu, true);
//! if cursor.reset() {
//!     println!("{}", cursor.cell(Column::Cpu).unwrap().text);
//! }
//! ```
//!
//! Live sampling uses [`ProcFs`], which serves both processes and counters from `/proc`.

pub mod cpu;
pub mod cursor;
pub mod reconcile;
pub mod source;
pub mod store;

// Re-export main types for convenience
pub use cpu::{CpuAccumulator, CpuCategory, CpuCounters, CpuDelta, IrqAccounting};
pub use cursor::{
    format_bytes, format_cell, Align, Cell, CellContext, Column, SortField, SortKey,
    SortableCursor,
};
pub use reconcile::{reconcile, CycleReport, ReconcileStats, Sampler, TaskCounts};
pub use source::{
    CounterSource, ProcEntry, ProcFs, ProcSample, ProcessSource, Replay, ReplayData,
    ReplayFrame, SourceError,
};
pub use store::{ProcessRecord, ProcessRecordStore, RunState, StoreError};
