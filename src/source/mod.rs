//! Environment sources for the sampler.
//!
//! The core never touches the operating system directly. It pulls the live process
//! list through [`ProcessSource`] and the aggregate CPU counters through
//! [`CounterSource`]:
//! - `procfs`: live implementation reading `/proc`
//! - `replay`: frames loaded from a JSON test-data file

pub mod procfs;
pub mod replay;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::cpu::CpuCounters;

pub use procfs::{parse_cpu_counters, parse_pid_stat, ProcFs, CLK_TCK, PAGE_SIZE};
pub use replay::{load_replay_file, Replay, ReplayData, ReplayFrame};

/// Errors raised while reading the environment.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The source cannot be read at all this cycle.
    #[error("source unavailable at {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    /// A single process disappeared between listing and reading it.
    #[error("process {0} vanished mid-read")]
    Vanished(u32),
}

impl SourceError {
    pub(crate) fn parse(what: impl Into<String>, reason: impl Into<String>) -> Self {
        SourceError::Parse {
            what: what.into(),
            reason: reason.into(),
        }
    }
}

/// One process as observed by a source during a single enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcSample {
    pub pid: u32,
    /// Cumulative user + system CPU ticks.
    pub cpu_ticks: u64,
    /// Process start time in ticks since boot. Zero when the source does not know it.
    #[serde(default)]
    pub start_time: u64,
    /// Resident set size in pages.
    pub resident_pages: u64,
    /// Run-state character as reported by the kernel (`R`, `S`, `D`, `T`, `t`, `Z`, ...).
    pub state: char,
    pub uid: u32,
    #[serde(default)]
    pub user: String,
    pub command: String,
}

/// Result of enumerating one listed process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcEntry {
    Observed(ProcSample),
    /// Listed, but its details could not be read (it exited mid-read).
    Vanished(u32),
}

/// Yields the live process set.
pub trait ProcessSource {
    /// Enumerates every live process. An `Err` means the whole listing was unreadable.
    fn enumerate(&mut self) -> Result<Vec<ProcEntry>, SourceError>;
}

/// Yields the system-wide cumulative CPU counters.
pub trait CounterSource {
    fn read_counters(&mut self) -> Result<CpuCounters, SourceError>;
}
