//! Live source reading the `/proc` filesystem.
//!
//! Processes come from the numeric directories under the proc root, each one
//! contributing its `stat` line and the uid owning the directory. The aggregate CPU
//! counters come from the first `cpu ` line of `<root>/stat`.

use ahash::AHashMap as HashMap;
use nix::unistd::{Uid, User};
use once_cell::sync::Lazy;
use rayon::prelude::*;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use super::{CounterSource, ProcEntry, ProcSample, ProcessSource, SourceError};
use crate::cpu::CpuCounters;

/// Get system clock ticks per second (usually 100, but can vary).
fn get_clk_tck() -> f64 {
    // SAFETY: sysconf is safe to call with _SC_CLK_TCK
    // Returns -1 on error, 0 if undefined - both are handled by the > 0 check
    let tck = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if tck > 0 {
        return tck as f64;
    }
    100.0
}

fn get_page_size() -> u64 {
    // SAFETY: sysconf is safe to call with _SC_PAGESIZE
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        return size as u64;
    }
    4096
}

/// System clock ticks per second (for CPU time calculation).
pub static CLK_TCK: Lazy<f64> = Lazy::new(get_clk_tck);

/// Memory page size in bytes (for resident size conversion).
pub static PAGE_SIZE: Lazy<u64> = Lazy::new(get_page_size);

/// Fields of interest from one `/proc/<pid>/stat` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidStat {
    pub pid: u32,
    pub comm: String,
    pub state: char,
    pub utime: u64,
    pub stime: u64,
    /// Start time in ticks since boot; distinguishes a reused pid.
    pub start_time: u64,
    pub rss_pages: u64,
}

/// Parses a `/proc/<pid>/stat` line.
///
/// The command name sits between the first `(` and the *last* `)` since it may
/// itself contain spaces and parentheses.
pub fn parse_pid_stat(content: &str) -> Result<PidStat, SourceError> {
    let open = content
        .find('(')
        .ok_or_else(|| SourceError::parse("pid stat", "missing '('"))?;
    let close = content
        .rfind(')')
        .ok_or_else(|| SourceError::parse("pid stat", "missing ')'"))?;
    if close < open {
        return Err(SourceError::parse("pid stat", "unbalanced command name"));
    }

    let pid: u32 = content[..open]
        .trim()
        .parse()
        .map_err(|e| SourceError::parse("pid stat", format!("bad pid: {}", e)))?;
    let comm = content[open + 1..close].to_string();

    // Fields after the command, starting at field 3 (state).
    let rest: Vec<&str> = content[close + 1..].split_whitespace().collect();
    if rest.len() <= 21 {
        return Err(SourceError::parse(
            "pid stat",
            format!("expected at least 22 fields after comm, got {}", rest.len()),
        ));
    }

    let state = rest[0]
        .chars()
        .next()
        .ok_or_else(|| SourceError::parse("pid stat", "empty state"))?;
    let num = |idx: usize, name: &str| -> Result<u64, SourceError> {
        rest[idx]
            .parse::<u64>()
            .map_err(|e| SourceError::parse("pid stat", format!("bad {}: {}", name, e)))
    };

    Ok(PidStat {
        pid,
        comm,
        state,
        utime: num(11, "utime")?,
        stime: num(12, "stime")?,
        start_time: num(19, "starttime")?,
        rss_pages: rest[21].parse::<i64>().map(|v| v.max(0) as u64).unwrap_or(0),
    })
}

/// Parses the aggregate `cpu ` line of `/proc/stat`.
///
/// Older kernels report fewer than ten categories; the missing tail reads as zero.
pub fn parse_cpu_counters(content: &str) -> Result<CpuCounters, SourceError> {
    let line = content
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| SourceError::parse("/proc/stat", "no aggregate cpu line"))?;

    let values: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|v| v.parse::<u64>())
        .collect::<Result<_, _>>()
        .map_err(|e| SourceError::parse("/proc/stat", e.to_string()))?;

    if values.len() < 4 {
        return Err(SourceError::parse(
            "/proc/stat",
            format!("expected at least 4 cpu fields, got {}", values.len()),
        ));
    }

    let at = |i: usize| values.get(i).copied().unwrap_or(0);
    Ok(CpuCounters {
        usr: at(0),
        nice: at(1),
        sys: at(2),
        idle: at(3),
        iowait: at(4),
        irq: at(5),
        softirq: at(6),
        steal: at(7),
        guest: at(8),
        guest_nice: at(9),
    })
}

/// `/proc` backed source for both processes and CPU counters.
pub struct ProcFs {
    root: PathBuf,
    users: HashMap<u32, String>,
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            users: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lists numeric pid directories under the root.
    pub fn list_pids(&self) -> Result<Vec<u32>, SourceError> {
        let entries = fs::read_dir(&self.root).map_err(|e| SourceError::Unavailable {
            path: self.root.clone(),
            source: e,
        })?;

        let mut pids = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            if let Ok(pid) = name.parse::<u32>() {
                pids.push(pid);
            }
        }
        Ok(pids)
    }

    fn user_name(&mut self, uid: u32) -> String {
        self.users
            .entry(uid)
            .or_insert_with(|| match User::from_uid(Uid::from_raw(uid)) {
                Ok(Some(u)) => u.name,
                _ => uid.to_string(),
            })
            .clone()
    }
}

/// Reads one pid directory. Any failure means the process is gone or unreadable.
fn read_pid(root: &Path, pid: u32) -> Result<ProcSample, SourceError> {
    let dir = root.join(pid.to_string());
    let content = fs::read_to_string(dir.join("stat")).map_err(|e| {
        trace!("Failed to read stat for pid {}: {}", pid, e);
        SourceError::Vanished(pid)
    })?;
    let uid = fs::metadata(&dir)
        .map(|m| m.uid())
        .map_err(|_| SourceError::Vanished(pid))?;
    let stat = parse_pid_stat(&content)?;

    Ok(ProcSample {
        pid,
        cpu_ticks: stat.utime + stat.stime,
        start_time: stat.start_time,
        resident_pages: stat.rss_pages,
        state: stat.state,
        uid,
        user: String::new(),
        command: stat.comm,
    })
}

impl ProcessSource for ProcFs {
    fn enumerate(&mut self) -> Result<Vec<ProcEntry>, SourceError> {
        let pids = self.list_pids()?;
        let root = self.root.clone();

        let read: Vec<(u32, Result<ProcSample, SourceError>)> = pids
            .par_iter()
            .map(|&pid| (pid, read_pid(&root, pid)))
            .collect();

        let mut out = Vec::with_capacity(read.len());
        for (pid, result) in read {
            match result {
                Ok(mut sample) => {
                    sample.user = self.user_name(sample.uid);
                    out.push(ProcEntry::Observed(sample));
                }
                Err(e) => {
                    debug!("Process {} dropped from this cycle: {}", pid, e);
                    out.push(ProcEntry::Vanished(pid));
                }
            }
        }
        Ok(out)
    }
}

impl CounterSource for ProcFs {
    fn read_counters(&mut self) -> Result<CpuCounters, SourceError> {
        let path = self.root.join("stat");
        let content = fs::read_to_string(&path)
            .map_err(|e| SourceError::Unavailable { path, source: e })?;
        parse_cpu_counters(&content)
    }
}
