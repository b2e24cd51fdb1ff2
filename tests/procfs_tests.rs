//! Integration tests running the sampler against a fake proc tree on disk.

use herakles_top::{
    CellContext, Column, CpuCategory, IrqAccounting, ProcFs, Sampler, SortField, SortKey,
};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;

fn write_pid(root: &Path, pid: u32, comm: &str, state: char, utime: u64, stime: u64, rss: u64) {
    let dir = root.join(pid.to_string());
    fs::create_dir_all(&dir).unwrap();
    let line = format!(
        "{pid} ({comm}) {state} 1 {pid} {pid} 0 -1 4194304 100 0 0 0 {utime} {stime} 0 0 20 0 1 0 12345 12345678 {rss} 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 1 0 0 0 0 0"
    );
    fs::write(dir.join("stat"), line).unwrap();
}

fn write_cpu(root: &Path, usr: u64, sys: u64, idle: u64, iowait: u64) {
    fs::write(
        root.join("stat"),
        format!("cpu  {usr} 0 {sys} {idle} {iowait} 0 0 0 0 0\ncpu0 0 0 0 0 0 0 0 0 0 0\n"),
    )
    .unwrap();
}

#[test]
fn test_live_cycle_over_fake_proc() {
    let dir = tempdir().expect("Failed to create temp dir");
    let root = dir.path();
    write_cpu(root, 100, 50, 800, 20);
    write_pid(root, 100, "worker", 'S', 400, 100, 256);
    write_pid(root, 200, "idle", 'S', 0, 0, 16);

    let mut fs_source = ProcFs::new(root);
    let mut sampler = Sampler::new(
        &mut fs_source,
        IrqAccounting::DoubleCounted,
        Duration::from_secs(1),
    );
    let report = sampler.refresh(&mut fs_source).unwrap();
    assert_eq!(report.records, 2);
    assert_eq!(sampler.store().get(100).unwrap().cpu_delta, 0);
    assert_eq!(sampler.store().get(100).unwrap().command, "worker");

    // Second cycle: pid 100 used 20 ticks and started running; pid 200 exited.
    write_cpu(root, 110, 60, 850, 15);
    write_pid(root, 100, "worker", 'R', 410, 110, 256);
    fs::remove_dir_all(root.join("200")).unwrap();

    let report = sampler.refresh(&mut fs_source).unwrap();
    assert_eq!(report.evicted, 1);
    assert_eq!(report.counts.total, 1);
    assert_eq!(report.counts.running, 1);
    assert!(report.cpu_updated);

    let rec = sampler.store().get(100).unwrap();
    assert_eq!(rec.cpu_delta, 20);
    assert!(sampler.store().get(200).is_none());

    let delta = sampler.cpu_delta().unwrap();
    assert_eq!(delta.diff.iowait, 0);
    assert_eq!(delta.sum, 70);
    let user = sampler.cpu_percent(CpuCategory::User).unwrap();
    assert!((user - 100.0 * 10.0 / 70.0).abs() < 1e-9);
}

#[test]
fn test_pid_directory_without_stat_is_skipped() {
    let dir = tempdir().expect("Failed to create temp dir");
    let root = dir.path();
    write_cpu(root, 1, 1, 1, 1);
    write_pid(root, 10, "alive", 'S', 1, 1, 1);
    fs::create_dir(root.join("11")).unwrap();

    let mut src = ProcFs::new(root);
    let mut sampler = Sampler::new(&mut src, IrqAccounting::default(), Duration::from_secs(1));
    let report = sampler.refresh(&mut src).unwrap();

    assert_eq!(report.records, 1);
    assert_eq!(report.vanished, 1);
    assert!(sampler.store().get(11).is_none());
}

#[test]
fn test_missing_cpu_stat_keeps_process_table() {
    let dir = tempdir().expect("Failed to create temp dir");
    let root = dir.path();
    write_pid(root, 5, "daemon", 'S', 3, 3, 8);

    let mut src = ProcFs::new(root);
    let mut sampler = Sampler::new(&mut src, IrqAccounting::default(), Duration::from_secs(1));
    let report = sampler.refresh(&mut src).unwrap();

    assert!(!report.cpu_updated);
    assert_eq!(report.records, 1);
    assert!(sampler.cpu_delta().is_none());
    assert!(sampler.cpu_percent(CpuCategory::Idle).is_none());
}

#[test]
fn test_cursor_cells_from_fake_proc() {
    let dir = tempdir().expect("Failed to create temp dir");
    let root = dir.path();
    write_cpu(root, 0, 0, 0, 0);
    write_pid(root, 1, "init", 'S', 0, 0, 100);
    write_pid(root, 2, "busy", 'R', 0, 0, 200);

    let mut src = ProcFs::new(root);
    let mut sampler = Sampler::new(&mut src, IrqAccounting::default(), Duration::from_secs(1));
    sampler.refresh(&mut src).unwrap();

    write_pid(root, 2, "busy", 'R', 30, 20, 200);
    sampler.refresh(&mut src).unwrap();
    sampler.set_sort(SortKey::new(SortField::Cpu, true));

    let ctx = CellContext {
        clk_tck: 100.0,
        page_size: 4096,
        period: Duration::from_secs(1),
    };
    let mut cursor = sampler.cursor_with(ctx);
    assert!(cursor.reset());
    assert_eq!(cursor.seek_count(), 2);

    let cpu = cursor.cell(Column::Cpu).unwrap();
    assert_eq!(cpu.text, "50.0");
    assert!(cpu.emphasized);
    assert_eq!(cursor.cell(Column::Command).unwrap().text, "busy");
    assert_eq!(cursor.cell(Column::Memory).unwrap().text, "800.0K");

    assert!(cursor.advance(1));
    assert_eq!(cursor.cell(Column::Pid).unwrap().text, "1");
    assert!(!cursor.advance(1));
    assert!(!cursor.valid());
}
