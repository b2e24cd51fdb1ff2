//! Text rendering of one refresh: summary header plus one page of the table.
//!
//! Rows are pulled through the cursor protocol so only the visible page is ever
//! formatted.

use chrono::{DateTime, Local};
use herakles_top::{Align, Cell, Column, CpuCategory, Sampler, TaskCounts};
use std::fmt::Write;

/// Column widths, in [`Column::ALL`] order. The command column is unbounded.
const WIDTHS: [usize; 6] = [7, 10, 6, 9, 2, 0];

/// CPU categories shown in the header.
const HEADER_CATEGORIES: [CpuCategory; 6] = [
    CpuCategory::User,
    CpuCategory::System,
    CpuCategory::Nice,
    CpuCategory::Idle,
    CpuCategory::IoWait,
    CpuCategory::Steal,
];

fn pad(text: &str, width: usize, align: Align) -> String {
    if width == 0 {
        return text.to_string();
    }
    match align {
        Align::Left => format!("{:<width$}", text, width = width),
        Align::Right => format!("{:>width$}", text, width = width),
        Align::Center => format!("{:^width$}", text, width = width),
    }
}

fn render_cell(out: &mut String, cell: &Cell, width: usize) {
    let text = pad(&cell.text, width, cell.align);
    if cell.emphasized {
        // bold
        let _ = write!(out, "\x1b[1m{}\x1b[0m", text);
    } else {
        out.push_str(&text);
    }
}

/// Formats a system CPU percentage, `-` while unknown.
pub fn format_percent(p: Option<f64>) -> String {
    match p {
        Some(v) => format!("{:.1}", v),
        None => "-".to_string(),
    }
}

pub fn render_tasks(counts: &TaskCounts) -> String {
    format!(
        "Tasks: {} total, {} running, {} sleeping, {} stopped, {} zombie",
        counts.total, counts.running, counts.sleeping, counts.stopped, counts.zombie
    )
}

pub fn render_cpu_line(sampler: &Sampler) -> String {
    let parts: Vec<String> = HEADER_CATEGORIES
        .iter()
        .map(|&c| format!("{} {}", format_percent(sampler.cpu_percent(c)), c.label()))
        .collect();
    format!("%Cpu(s): {}", parts.join(", "))
}

/// Renders the header and the first `rows` rows of the table.
pub fn render_page(sampler: &mut Sampler, rows: usize, now: DateTime<Local>) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "herakles-top - {}", now.format("%H:%M:%S"));
    let _ = writeln!(out, "{}", render_tasks(&sampler.counts()));
    let _ = writeln!(out, "{}", render_cpu_line(sampler));
    out.push('\n');

    let header: Vec<String> = Column::ALL
        .iter()
        .zip(WIDTHS)
        .map(|(c, w)| pad(c.header(), w, c.align()))
        .collect();
    let _ = writeln!(out, "{}", header.join(" "));

    let mut cursor = sampler.cursor();
    let mut ok = cursor.reset();
    let mut printed = 0;
    while ok && printed < rows {
        for (i, (column, width)) in Column::ALL.iter().zip(WIDTHS).enumerate() {
            if i > 0 {
                out.push(' ');
            }
            if let Some(cell) = cursor.cell(*column) {
                render_cell(&mut out, &cell, width);
            }
        }
        out.push('\n');
        printed += 1;
        ok = cursor.advance(1);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use herakles_top::{CpuCounters, IrqAccounting, ProcSample, Replay, ReplayFrame};
    use std::time::Duration;

    fn frame(usr: u64, idle: u64, procs: &[(u32, u64, char)]) -> ReplayFrame {
        ReplayFrame {
            counters: CpuCounters {
                usr,
                idle,
                ..Default::default()
            },
            processes: procs
                .iter()
                .map(|&(pid, ticks, state)| ProcSample {
                    pid,
                    cpu_ticks: ticks,
                    start_time: 0,
                    resident_pages: 10,
                    state,
                    uid: 0,
                    user: "root".into(),
                    command: format!("cmd{}", pid),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(Some(12.345)), "12.3");
        assert_eq!(format_percent(None), "-");
    }

    #[test]
    fn test_render_page_limits_rows() {
        let mut src = Replay::new(vec![
            frame(0, 0, &[(1, 0, 'S'), (2, 0, 'S'), (3, 0, 'R')]),
            frame(10, 30, &[(1, 10, 'S'), (2, 50, 'S'), (3, 20, 'R')]),
        ]);
        let mut sampler = Sampler::new(&mut src, IrqAccounting::default(), Duration::from_secs(2));
        sampler.refresh(&mut src).unwrap();
        sampler.refresh(&mut src).unwrap();

        let page = render_page(&mut sampler, 2, Local::now());
        assert!(page.contains("Tasks: 3 total, 1 running, 2 sleeping, 0 stopped, 0 zombie"));
        assert!(page.contains("25.0 usr"));
        assert!(page.contains("cmd1"));
        assert!(page.contains("cmd2"));
        assert!(!page.contains("cmd3"));
    }

    #[test]
    fn test_render_cpu_line_unknown() {
        let mut src = Replay::new(vec![frame(0, 0, &[])]);
        let sampler = Sampler::new(&mut src, IrqAccounting::default(), Duration::from_secs(2));
        assert!(render_cpu_line(&sampler).starts_with("%Cpu(s): - usr"));
    }
}
