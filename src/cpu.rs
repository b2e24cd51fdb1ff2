//! System-wide CPU accounting.
//!
//! Keeps two generations of the aggregate `/proc/stat` counters and derives the
//! per-category tick deltas between them, which the display layer turns into
//! percentages.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::source::{CounterSource, SourceError};

/// Cumulative CPU tick counters, in `/proc/stat` order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuCounters {
    pub usr: u64,
    pub nice: u64,
    pub sys: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    #[serde(default)]
    pub guest: u64,
    #[serde(default)]
    pub guest_nice: u64,
}

/// Tick categories exposed for percentage output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuCategory {
    User,
    Nice,
    System,
    Idle,
    IoWait,
    Irq,
    SoftIrq,
    Steal,
    Guest,
    GuestNice,
}

impl CpuCategory {
    pub const ALL: [CpuCategory; 10] = [
        CpuCategory::User,
        CpuCategory::Nice,
        CpuCategory::System,
        CpuCategory::Idle,
        CpuCategory::IoWait,
        CpuCategory::Irq,
        CpuCategory::SoftIrq,
        CpuCategory::Steal,
        CpuCategory::Guest,
        CpuCategory::GuestNice,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CpuCategory::User => "usr",
            CpuCategory::Nice => "nice",
            CpuCategory::System => "sys",
            CpuCategory::Idle => "idle",
            CpuCategory::IoWait => "iowait",
            CpuCategory::Irq => "irq",
            CpuCategory::SoftIrq => "softirq",
            CpuCategory::Steal => "steal",
            CpuCategory::Guest => "guest",
            CpuCategory::GuestNice => "guest_nice",
        }
    }
}

impl CpuCounters {
    pub fn get(&self, category: CpuCategory) -> u64 {
        match category {
            CpuCategory::User => self.usr,
            CpuCategory::Nice => self.nice,
            CpuCategory::System => self.sys,
            CpuCategory::Idle => self.idle,
            CpuCategory::IoWait => self.iowait,
            CpuCategory::Irq => self.irq,
            CpuCategory::SoftIrq => self.softirq,
            CpuCategory::Steal => self.steal,
            CpuCategory::Guest => self.guest,
            CpuCategory::GuestNice => self.guest_nice,
        }
    }
}

/// How the hardware-interrupt delta enters the interval sum.
///
/// The long-standing formula adds the irq delta twice, which skews every displayed
/// percentage slightly on interrupt-heavy machines. It stays the default so numbers
/// match what users already compare against; `Exact` counts it once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IrqAccounting {
    #[default]
    DoubleCounted,
    Exact,
}

/// Per-category deltas between two counter generations, plus their sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuDelta {
    pub diff: CpuCounters,
    pub sum: u64,
}

impl CpuDelta {
    /// Computes the interval delta from `old` to `new`.
    ///
    /// iowait can jump backwards on some kernels; its delta is forced to zero unless
    /// the new reading is strictly greater. Any other category going backwards (idle
    /// under NO_HZ, CPU hotplug) wraps with `DoubleCounted` and clamps to zero with
    /// `Exact`.
    pub fn between(old: &CpuCounters, new: &CpuCounters, irq: IrqAccounting) -> Self {
        let d = |name: &str, n: u64, o: u64| {
            if n >= o {
                return n - o;
            }
            debug!("cpu {} counter went backwards ({} -> {})", name, o, n);
            match irq {
                IrqAccounting::DoubleCounted => n.wrapping_sub(o),
                IrqAccounting::Exact => 0,
            }
        };

        let iowait = if new.iowait > old.iowait {
            new.iowait - old.iowait
        } else {
            0
        };

        let diff = CpuCounters {
            usr: d("usr", new.usr, old.usr),
            nice: d("nice", new.nice, old.nice),
            sys: d("sys", new.sys, old.sys),
            idle: d("idle", new.idle, old.idle),
            iowait,
            irq: d("irq", new.irq, old.irq),
            softirq: d("softirq", new.softirq, old.softirq),
            steal: d("steal", new.steal, old.steal),
            guest: d("guest", new.guest, old.guest),
            guest_nice: d("guest_nice", new.guest_nice, old.guest_nice),
        };

        let irq_sum = match irq {
            IrqAccounting::DoubleCounted => diff.irq.wrapping_add(diff.irq),
            IrqAccounting::Exact => diff.irq,
        };

        let sum = diff
            .usr
            .wrapping_add(diff.nice)
            .wrapping_add(diff.sys)
            .wrapping_add(diff.idle)
            .wrapping_add(diff.iowait)
            .wrapping_add(irq_sum)
            .wrapping_add(diff.softirq)
            .wrapping_add(diff.steal)
            .wrapping_add(diff.guest)
            .wrapping_add(diff.guest_nice);

        Self { diff, sum }
    }

    /// Share of the interval spent in `category`, in percent.
    ///
    /// Returns `None` when the interval sum is zero.
    pub fn percent(&self, category: CpuCategory) -> Option<f64> {
        if self.sum == 0 {
            return None;
        }
        Some(100.0 * self.diff.get(category) as f64 / self.sum as f64)
    }
}

/// Two-generation accumulator over the aggregate CPU counters.
#[derive(Debug, Clone)]
pub struct CpuAccumulator {
    cnts: [CpuCounters; 2],
    cur: usize,
    has_baseline: bool,
    delta: Option<CpuDelta>,
    irq: IrqAccounting,
}

impl CpuAccumulator {
    /// Takes the first reading. An unreadable source leaves the accumulator without a
    /// baseline; the next successful `update` becomes the baseline instead.
    pub fn init(source: &mut dyn CounterSource, irq: IrqAccounting) -> Self {
        let mut acc = Self::empty(irq);
        match source.read_counters() {
            Ok(counters) => acc.seed(counters),
            Err(e) => warn!("Initial CPU counter read failed: {}", e),
        }
        acc
    }

    /// Accumulator with no reading yet.
    pub fn empty(irq: IrqAccounting) -> Self {
        Self {
            cnts: [CpuCounters::default(); 2],
            cur: 0,
            has_baseline: false,
            delta: None,
            irq,
        }
    }

    /// Stores `counters` as the current generation without computing a delta.
    pub fn seed(&mut self, counters: CpuCounters) {
        self.cnts[0] = counters;
        self.cur = 0;
        self.has_baseline = true;
    }

    /// Reads a new generation and recomputes the delta.
    ///
    /// On a read failure both generations and the previous delta are kept.
    pub fn update(&mut self, source: &mut dyn CounterSource) -> Result<Option<&CpuDelta>, SourceError> {
        let counters = source.read_counters()?;
        Ok(self.apply(counters))
    }

    /// Pushes an already-read generation. Returns the new delta, or `None` when this
    /// reading only established the baseline.
    pub fn apply(&mut self, counters: CpuCounters) -> Option<&CpuDelta> {
        if !self.has_baseline {
            debug!("No CPU baseline yet, using this reading as baseline");
            self.seed(counters);
            return None;
        }

        let old = self.cur;
        let cur = 1 - old;
        self.cnts[cur] = counters;

        let delta = CpuDelta::between(&self.cnts[old], &self.cnts[cur], self.irq);
        if self.cnts[cur].iowait < self.cnts[old].iowait {
            debug!(
                "iowait went backwards ({} -> {}), clamping delta to 0",
                self.cnts[old].iowait, self.cnts[cur].iowait
            );
        }

        self.delta = Some(delta);
        self.cur = cur;
        self.delta.as_ref()
    }

    pub fn delta(&self) -> Option<&CpuDelta> {
        self.delta.as_ref()
    }

    /// Percentage for `category` over the last interval, `None` when unknown.
    pub fn percent(&self, category: CpuCategory) -> Option<f64> {
        self.delta.as_ref().and_then(|d| d.percent(category))
    }

    /// Most recent reading, if any.
    pub fn current(&self) -> Option<&CpuCounters> {
        self.has_baseline.then(|| &self.cnts[self.cur])
    }

    pub fn irq_accounting(&self) -> IrqAccounting {
        self.irq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(usr: u64, sys: u64, idle: u64, iowait: u64, irq: u64) -> CpuCounters {
        CpuCounters {
            usr,
            sys,
            idle,
            iowait,
            irq,
            ..Default::default()
        }
    }

    struct Fixed(Vec<Result<CpuCounters, ()>>);

    impl CounterSource for Fixed {
        fn read_counters(&mut self) -> Result<CpuCounters, SourceError> {
            match self.0.remove(0) {
                Ok(c) => Ok(c),
                Err(()) => Err(SourceError::parse("stat", "unreadable")),
            }
        }
    }

    #[test]
    fn test_delta_sum_double_counts_irq() {
        let old = counters(100, 50, 800, 20, 5);
        let new = counters(110, 60, 850, 25, 8);

        let d = CpuDelta::between(&old, &new, IrqAccounting::DoubleCounted);
        assert_eq!(d.diff.irq, 3);
        // 10 + 10 + 50 + 5 + 3 + 3
        assert_eq!(d.sum, 81);

        let exact = CpuDelta::between(&old, &new, IrqAccounting::Exact);
        assert_eq!(exact.sum, 78);
    }

    #[test]
    fn test_iowait_backwards_is_clamped() {
        let old = counters(100, 50, 800, 20, 0);
        let new = counters(110, 60, 850, 15, 0);

        let d = CpuDelta::between(&old, &new, IrqAccounting::DoubleCounted);
        assert_eq!(d.diff.iowait, 0);
        assert_eq!(d.diff.usr, 10);
        assert_eq!(d.diff.sys, 10);
        assert_eq!(d.sum, 70);
    }

    #[test]
    fn test_idle_backwards_clamped_when_exact() {
        let old = CpuCounters {
            usr: 100,
            idle: 800,
            ..Default::default()
        };
        let new = CpuCounters {
            usr: 110,
            idle: 790,
            ..Default::default()
        };

        let exact = CpuDelta::between(&old, &new, IrqAccounting::Exact);
        assert_eq!(exact.diff.idle, 0);
        assert_eq!(exact.sum, 10);
        assert_eq!(exact.percent(CpuCategory::User), Some(100.0));

        let doubled = CpuDelta::between(&old, &new, IrqAccounting::DoubleCounted);
        assert_eq!(doubled.diff.idle, 790u64.wrapping_sub(800));
    }

    #[test]
    fn test_iowait_unchanged_is_zero() {
        let old = counters(0, 0, 0, 20, 0);
        let new = counters(1, 0, 0, 20, 0);
        let d = CpuDelta::between(&old, &new, IrqAccounting::Exact);
        assert_eq!(d.diff.iowait, 0);
        assert_eq!(d.sum, 1);
    }

    #[test]
    fn test_percent_zero_sum_is_none() {
        let c = counters(1, 1, 1, 1, 1);
        let d = CpuDelta::between(&c, &c, IrqAccounting::DoubleCounted);
        assert_eq!(d.sum, 0);
        assert!(d.percent(CpuCategory::User).is_none());
    }

    #[test]
    fn test_percent() {
        let old = counters(0, 0, 0, 0, 0);
        let new = counters(25, 25, 50, 0, 0);
        let d = CpuDelta::between(&old, &new, IrqAccounting::DoubleCounted);
        assert_eq!(d.percent(CpuCategory::User), Some(25.0));
        assert_eq!(d.percent(CpuCategory::Idle), Some(50.0));
    }

    #[test]
    fn test_accumulator_generations_flip() {
        let mut src = Fixed(vec![
            Ok(counters(100, 0, 100, 0, 0)),
            Ok(counters(110, 0, 190, 0, 0)),
            Ok(counters(130, 0, 270, 0, 0)),
        ]);
        let mut acc = CpuAccumulator::init(&mut src, IrqAccounting::DoubleCounted);
        assert!(acc.delta().is_none());

        let d = *acc.update(&mut src).unwrap().unwrap();
        assert_eq!(d.diff.usr, 10);
        assert_eq!(d.sum, 100);

        let d = *acc.update(&mut src).unwrap().unwrap();
        assert_eq!(d.diff.usr, 20);
        assert_eq!(d.diff.idle, 80);
        assert_eq!(acc.current().unwrap().usr, 130);
    }

    #[test]
    fn test_failed_init_defers_baseline() {
        let mut src = Fixed(vec![
            Err(()),
            Ok(counters(100, 0, 0, 0, 0)),
            Ok(counters(150, 0, 0, 0, 0)),
        ]);
        let mut acc = CpuAccumulator::init(&mut src, IrqAccounting::DoubleCounted);
        assert!(acc.current().is_none());

        assert!(acc.update(&mut src).unwrap().is_none());
        assert!(acc.delta().is_none());

        let d = acc.update(&mut src).unwrap().unwrap();
        assert_eq!(d.diff.usr, 50);
    }

    #[test]
    fn test_failed_update_keeps_previous_delta() {
        let mut src = Fixed(vec![
            Ok(counters(0, 0, 0, 0, 0)),
            Ok(counters(10, 0, 10, 0, 0)),
            Err(()),
        ]);
        let mut acc = CpuAccumulator::init(&mut src, IrqAccounting::DoubleCounted);
        acc.update(&mut src).unwrap();
        assert!(acc.update(&mut src).is_err());
        assert_eq!(acc.percent(CpuCategory::User), Some(50.0));
        assert_eq!(acc.current().unwrap().usr, 10);
    }
}
