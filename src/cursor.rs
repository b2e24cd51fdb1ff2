//! Row cursor over the record store for paged table views.
//!
//! A table widget pulls rows one at a time: `reset`, then `advance` while the cursor
//! is still inside `seek_count`, reading cells for the visible page only. The cursor
//! holds the store mutably for its whole lifetime, so no refresh can interleave with
//! a read pass.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::source::{CLK_TCK, PAGE_SIZE};
use crate::store::{ProcessRecord, ProcessRecordStore, RunState};

/// Sortable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    Pid,
    Cpu,
    #[serde(alias = "mem")]
    Memory,
    State,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pid" => Ok(SortField::Pid),
            "cpu" => Ok(SortField::Cpu),
            "mem" | "memory" => Ok(SortField::Memory),
            "state" => Ok(SortField::State),
            other => Err(format!(
                "Invalid sort field '{}', expected one of pid, cpu, mem, state",
                other
            )),
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SortField::Pid => "pid",
            SortField::Cpu => "cpu",
            SortField::Memory => "mem",
            SortField::State => "state",
        };
        f.write_str(s)
    }
}

/// Field plus direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub descending: bool,
}

impl SortKey {
    pub fn new(field: SortField, descending: bool) -> Self {
        Self { field, descending }
    }
}

/// Displayable table columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Pid,
    User,
    Cpu,
    Memory,
    State,
    Command,
}

impl Column {
    pub const ALL: [Column; 6] = [
        Column::Pid,
        Column::User,
        Column::Cpu,
        Column::Memory,
        Column::State,
        Column::Command,
    ];

    pub fn header(self) -> &'static str {
        match self {
            Column::Pid => "PID",
            Column::User => "USER",
            Column::Cpu => "CPU%",
            Column::Memory => "RES",
            Column::State => "S",
            Column::Command => "COMMAND",
        }
    }

    pub fn align(self) -> Align {
        match self {
            Column::Pid | Column::Cpu | Column::Memory => Align::Right,
            Column::User | Column::Command => Align::Left,
            Column::State => Align::Center,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

/// One formatted table cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub text: String,
    pub align: Align,
    /// Set for running processes.
    pub emphasized: bool,
}

/// Values needed to turn raw record fields into display text.
#[derive(Debug, Clone, Copy)]
pub struct CellContext {
    /// Clock ticks per second.
    pub clk_tck: f64,
    pub page_size: u64,
    /// Refresh period the deltas were measured over.
    pub period: Duration,
}

impl CellContext {
    pub fn new(period: Duration) -> Self {
        Self {
            clk_tck: *CLK_TCK,
            page_size: *PAGE_SIZE,
            period,
        }
    }

    /// Share of one core used during the interval, in percent.
    pub fn cpu_percent(&self, cpu_delta: u64) -> Option<f64> {
        let secs = self.period.as_secs_f64();
        if secs <= 0.0 || self.clk_tck <= 0.0 {
            return None;
        }
        Some(100.0 * cpu_delta as f64 / self.clk_tck / secs)
    }
}

/// Formats a byte count the way `top`-style tools do: one decimal, binary units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "K", "M", "G", "T", "P"];
    if bytes < 1024 {
        return format!("{}B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1}{}", value, UNITS[unit])
}

/// Formats `column` of `rec`.
pub fn format_cell(rec: &ProcessRecord, column: Column, ctx: &CellContext) -> Cell {
    let text = match column {
        Column::Pid => rec.pid.to_string(),
        Column::User => {
            if rec.user.is_empty() {
                rec.uid.to_string()
            } else {
                rec.user.clone()
            }
        }
        Column::Cpu => match ctx.cpu_percent(rec.cpu_delta) {
            Some(p) => format!("{:.1}", p),
            None => "-".to_string(),
        },
        Column::Memory => format_bytes(rec.resident_pages.saturating_mul(ctx.page_size)),
        Column::State => rec.state_char.to_string(),
        Column::Command => rec.command.clone(),
    };

    Cell {
        text,
        align: column.align(),
        emphasized: rec.state == RunState::Running,
    }
}

/// Cursor over the live records of a store.
pub struct SortableCursor<'a> {
    store: &'a mut ProcessRecordStore,
    row: usize,
    ctx: CellContext,
}

impl<'a> SortableCursor<'a> {
    pub fn new(store: &'a mut ProcessRecordStore, ctx: CellContext) -> Self {
        Self { store, row: 0, ctx }
    }

    /// Moves to the first row. Returns whether that row exists.
    pub fn reset(&mut self) -> bool {
        self.row = 0;
        self.valid()
    }

    /// Moves forward by `n` rows without bounds checking. Returns whether the new
    /// position is still inside the table.
    pub fn advance(&mut self, n: usize) -> bool {
        self.row = self.row.saturating_add(n);
        self.valid()
    }

    /// Number of live rows.
    pub fn seek_count(&self) -> usize {
        self.store.count()
    }

    pub fn position(&self) -> usize {
        self.row
    }

    pub fn valid(&self) -> bool {
        self.row < self.store.count()
    }

    /// Reorders the rows for the next read pass.
    pub fn set_sort(&mut self, field: SortField, descending: bool) {
        self.store.set_sort(SortKey::new(field, descending));
    }

    pub fn sort_key(&self) -> Option<SortKey> {
        self.store.sort_key()
    }

    /// Formats `column` of the record at `row`; `None` past the end.
    pub fn read_cell(&self, row: usize, column: Column) -> Option<Cell> {
        self.store
            .at(row)
            .map(|rec| format_cell(rec, column, &self.ctx))
    }

    /// Formats `column` at the cursor position.
    pub fn cell(&self, column: Column) -> Option<Cell> {
        self.read_cell(self.row, column)
    }

    /// Record at the cursor position.
    pub fn record(&self) -> Option<&ProcessRecord> {
        self.store.at(self.row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ProcSample;

    fn ctx() -> CellContext {
        CellContext {
            clk_tck: 100.0,
            page_size: 4096,
            period: Duration::from_millis(2000),
        }
    }

    fn store_with(rows: &[(u32, u64, char)]) -> ProcessRecordStore {
        let mut store = ProcessRecordStore::new();
        for &(pid, delta, state) in rows {
            let mut s = ProcSample {
                pid,
                cpu_ticks: 1000,
                start_time: 0,
                resident_pages: 256,
                state,
                uid: 1000,
                user: "alice".into(),
                command: "worker".into(),
            };
            let rec = store.lookup_or_create(pid).unwrap();
            rec.observe(&s);
            s.cpu_ticks += delta;
            rec.observe(&s);
        }
        store
    }

    #[test]
    fn test_reset_and_advance() {
        let mut store = store_with(&[(1, 0, 'S'), (2, 0, 'S')]);
        let mut cur = SortableCursor::new(&mut store, ctx());

        assert!(cur.reset());
        assert_eq!(cur.position(), 0);
        assert!(cur.advance(1));
        assert!(!cur.advance(1));
        assert_eq!(cur.position(), 2);
        assert_eq!(cur.seek_count(), 2);
        assert!(cur.cell(Column::Pid).is_none());
    }

    #[test]
    fn test_empty_cursor_is_invalid() {
        let mut store = ProcessRecordStore::new();
        let mut cur = SortableCursor::new(&mut store, ctx());
        assert!(!cur.reset());
        assert_eq!(cur.seek_count(), 0);
    }

    #[test]
    fn test_sort_by_cpu_descending() {
        let mut store = store_with(&[(1, 5, 'S'), (2, 40, 'R'), (3, 20, 'S')]);
        let mut cur = SortableCursor::new(&mut store, ctx());
        cur.set_sort(SortField::Cpu, true);

        let mut pids = Vec::new();
        let mut ok = cur.reset();
        while ok {
            pids.push(cur.record().unwrap().pid);
            ok = cur.advance(1);
        }
        assert_eq!(pids, vec![2, 3, 1]);
    }

    #[test]
    fn test_read_cell_formats() {
        let mut store = store_with(&[(100, 20, 'R')]);
        let cur = SortableCursor::new(&mut store, ctx());

        // 20 ticks over 2 s at 100 Hz
        assert_eq!(cur.read_cell(0, Column::Cpu).unwrap().text, "10.0");
        assert_eq!(cur.read_cell(0, Column::Pid).unwrap().text, "100");
        assert_eq!(cur.read_cell(0, Column::Memory).unwrap().text, "1.0M");
        assert_eq!(cur.read_cell(0, Column::User).unwrap().text, "alice");

        let state = cur.read_cell(0, Column::State).unwrap();
        assert_eq!(state.text, "R");
        assert_eq!(state.align, Align::Center);
        assert!(state.emphasized);
    }

    #[test]
    fn test_zero_period_cpu_is_unknown() {
        let c = CellContext {
            period: Duration::ZERO,
            ..ctx()
        };
        assert!(c.cpu_percent(10).is_none());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(1024), "1.0K");
        assert_eq!(format_bytes(1536 * 1024), "1.5M");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0G");
    }

    #[test]
    fn test_sort_field_parse() {
        assert_eq!("cpu".parse::<SortField>().unwrap(), SortField::Cpu);
        assert_eq!("MEM".parse::<SortField>().unwrap(), SortField::Memory);
        assert!("bogus".parse::<SortField>().is_err());
    }
}
