//! Generate testdata command implementation.
//!
//! Generates synthetic replay JSON files for running without /proc.

use chrono::Utc;
use herakles_top::{CpuCounters, ProcSample, ReplayData, ReplayFrame};
use rand::seq::SliceRandom;
use rand::Rng;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Ticks available per frame across all categories (2 s at 100 Hz on 4 CPUs).
const TICKS_PER_FRAME: u64 = 800;

const COMMANDS: [&str; 10] = [
    "systemd", "sshd", "nginx", "postgres", "bash", "kworker/0:1", "chronyd", "dbus-daemon",
    "redis-server", "python3",
];

const USERS: [(u32, &str); 4] = [(0, "root"), (33, "www-data"), (999, "postgres"), (1000, "dev")];

fn random_state<R: Rng>(rng: &mut R) -> char {
    match rng.gen_range(0..100) {
        0..=9 => 'R',
        10..=11 => 'T',
        12 => 'Z',
        13..=17 => 'D',
        18..=22 => 'I',
        _ => 'S',
    }
}

fn random_process<R: Rng>(rng: &mut R, pid: u32) -> ProcSample {
    let (uid, user) = *USERS.choose(rng).unwrap_or(&USERS[0]);
    let command = COMMANDS.choose(rng).copied().unwrap_or("init");
    ProcSample {
        pid,
        cpu_ticks: rng.gen_range(0..100_000),
        start_time: rng.gen_range(1..1_000_000),
        resident_pages: rng.gen_range(16..262_144),
        state: random_state(rng),
        uid,
        user: user.to_string(),
        command: command.to_string(),
    }
}

/// Advances the counters by one frame worth of ticks. Roughly one frame in ten
/// makes iowait jump backwards, as some kernels do.
fn advance_counters<R: Rng>(rng: &mut R, c: &CpuCounters) -> CpuCounters {
    let usr = rng.gen_range(0..TICKS_PER_FRAME / 2);
    let sys = rng.gen_range(0..TICKS_PER_FRAME / 4);
    let nice = rng.gen_range(0..10);
    let irq = rng.gen_range(0..5);
    let softirq = rng.gen_range(0..10);
    let steal = rng.gen_range(0..3);
    let busy = usr + sys + nice + irq + softirq + steal;
    let idle = TICKS_PER_FRAME.saturating_sub(busy);

    let iowait = if rng.gen_ratio(1, 10) {
        c.iowait.saturating_sub(rng.gen_range(1..20))
    } else {
        c.iowait + rng.gen_range(0..20)
    };

    CpuCounters {
        usr: c.usr + usr,
        nice: c.nice + nice,
        sys: c.sys + sys,
        idle: c.idle + idle,
        iowait,
        irq: c.irq + irq,
        softirq: c.softirq + softirq,
        steal: c.steal + steal,
        guest: c.guest,
        guest_nice: c.guest_nice,
    }
}

/// Builds `frames` frames starting with `processes` live processes.
pub fn generate_frames<R: Rng>(rng: &mut R, frames: usize, processes: usize) -> Vec<ReplayFrame> {
    let mut next_pid: u32 = 1000;
    let mut live: Vec<ProcSample> = (0..processes)
        .map(|_| {
            next_pid += 1;
            random_process(rng, next_pid)
        })
        .collect();

    let mut counters = CpuCounters {
        usr: 100_000,
        sys: 50_000,
        idle: 1_000_000,
        iowait: 5_000,
        ..Default::default()
    };

    let mut out = Vec::with_capacity(frames);
    for _ in 0..frames {
        out.push(ReplayFrame {
            counters,
            processes: live.clone(),
            vanished: Vec::new(),
            unavailable: false,
        });

        counters = advance_counters(rng, &counters);

        // Churn: a few exits, a few new processes.
        live.retain(|_| !rng.gen_ratio(1, 20));
        for _ in 0..rng.gen_range(0..3) {
            next_pid += 1;
            live.push(random_process(rng, next_pid));
        }
        for p in &mut live {
            p.cpu_ticks += rng.gen_range(0..40);
            p.state = random_state(rng);
        }
    }
    out
}

/// Generates synthetic replay data JSON file for testing purposes.
pub fn command_generate_testdata(
    output: PathBuf,
    frames: usize,
    processes: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    debug!(
        "Generating test data: frames={}, processes={}, output={}",
        frames,
        processes,
        output.display()
    );

    let mut rng = rand::thread_rng();
    let data = ReplayData {
        version: env!("CARGO_PKG_VERSION").to_string(),
        generated_at: Utc::now().to_rfc3339(),
        frames: generate_frames(&mut rng, frames, processes),
    };

    let json = serde_json::to_string_pretty(&data)?;
    fs::write(&output, json)?;

    info!("Generated {} frames", data.frames.len());
    println!(
        "✅ Generated {} frames ({} initial processes) into {}",
        data.frames.len(),
        processes,
        output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use herakles_top::{IrqAccounting, Replay, Sampler};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;

    #[test]
    fn test_generated_frames_replay_cleanly() {
        let mut rng = StdRng::seed_from_u64(7);
        let frames = generate_frames(&mut rng, 8, 30);
        assert_eq!(frames.len(), 8);
        assert_eq!(frames[0].processes.len(), 30);

        let mut src = Replay::new(frames);
        let mut sampler = Sampler::new(&mut src, IrqAccounting::default(), Duration::from_secs(2));
        for _ in 0..8 {
            let report = sampler.refresh(&mut src).unwrap();
            assert_eq!(report.records, report.counts.total);
            assert!(sampler.store().is_consistent());
        }
    }

    #[test]
    fn test_counters_never_go_backwards_except_iowait() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut c = CpuCounters::default();
        for _ in 0..50 {
            let next = advance_counters(&mut rng, &c);
            assert!(next.usr >= c.usr);
            assert!(next.idle >= c.idle);
            c = next;
        }
    }
}
