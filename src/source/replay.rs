//! Replay source serving pre-recorded frames.
//!
//! A replay file holds a sequence of frames, each with the aggregate CPU counters and
//! the process list for one refresh. Frames are served in order; once exhausted the
//! last frame repeats, which reads as a system where nothing moves any more.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::{CounterSource, ProcEntry, ProcSample, ProcessSource, SourceError};
use crate::cpu::CpuCounters;

/// One refresh worth of environment data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayFrame {
    pub counters: CpuCounters,
    pub processes: Vec<ProcSample>,
    /// Pids listed but unreadable during this frame.
    #[serde(default)]
    pub vanished: Vec<u32>,
    /// Simulates an unreadable process listing for this frame.
    #[serde(default)]
    pub unavailable: bool,
}

/// Root structure of a replay JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayData {
    pub version: String,
    pub generated_at: String,
    pub frames: Vec<ReplayFrame>,
}

/// Loads a replay file from disk.
pub fn load_replay_file(path: &Path) -> Result<ReplayData, SourceError> {
    debug!("Loading replay data from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|e| SourceError::Unavailable {
        path: path.to_path_buf(),
        source: e,
    })?;
    let data: ReplayData = serde_json::from_str(&content)
        .map_err(|e| SourceError::parse(path.display().to_string(), e.to_string()))?;

    info!(
        "Loaded replay data version {} from {} ({} frames)",
        data.version,
        data.generated_at,
        data.frames.len()
    );

    Ok(data)
}

/// Serves frames to both source traits.
///
/// Process enumeration advances to the next frame; counter reads use the frame most
/// recently enumerated, so a refresh cycle sees a consistent pair.
#[derive(Debug, Clone)]
pub struct Replay {
    frames: Vec<ReplayFrame>,
    next: usize,
    current: Option<usize>,
}

impl Replay {
    pub fn new(frames: Vec<ReplayFrame>) -> Self {
        Self {
            frames,
            next: 0,
            current: None,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, SourceError> {
        Ok(Self::new(load_replay_file(path)?.frames))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn step(&mut self) -> Option<&ReplayFrame> {
        if self.frames.is_empty() {
            return None;
        }
        let idx = self.next.min(self.frames.len() - 1);
        self.next = self.next.saturating_add(1);
        self.current = Some(idx);
        self.frames.get(idx)
    }

    fn unavailable(what: &str) -> SourceError {
        SourceError::Unavailable {
            path: what.into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "replay frame unavailable"),
        }
    }
}

impl ProcessSource for Replay {
    fn enumerate(&mut self) -> Result<Vec<ProcEntry>, SourceError> {
        let frame = self.step().ok_or_else(|| Self::unavailable("replay"))?;
        if frame.unavailable {
            return Err(Self::unavailable("replay"));
        }

        let mut out: Vec<ProcEntry> = frame
            .processes
            .iter()
            .cloned()
            .map(ProcEntry::Observed)
            .collect();
        out.extend(frame.vanished.iter().copied().map(ProcEntry::Vanished));
        Ok(out)
    }
}

impl CounterSource for Replay {
    fn read_counters(&mut self) -> Result<CpuCounters, SourceError> {
        let idx = match self.current {
            Some(idx) => idx,
            None => {
                // Counters read before any enumeration (initial accumulator seed).
                if self.frames.is_empty() {
                    return Err(Self::unavailable("replay"));
                }
                0
            }
        };
        self.frames
            .get(idx)
            .map(|f| f.counters)
            .ok_or_else(|| Self::unavailable("replay"))
    }
}
