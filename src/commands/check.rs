//! Check command implementation.
//!
//! Validates /proc accessibility and configuration.

use herakles_top::{CounterSource, ProcEntry, ProcFs, ProcessSource};

use crate::config::{validate_effective_config, Config};
use crate::startup_checks::validate_requirements;

/// Validates system requirements and configuration.
pub fn command_check(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Herakles Top - System Check");
    println!("==============================");

    let mut all_ok = true;
    let root = config.proc_root();

    println!("\n📁 Checking {} ...", root.display());
    match validate_requirements(&root) {
        Ok(()) => println!("   ✅ proc filesystem readable"),
        Err(e) => {
            println!("   ❌ {}", e);
            all_ok = false;
        }
    }

    let mut source = ProcFs::new(&root);
    match source.enumerate() {
        Ok(entries) => {
            let observed = entries
                .iter()
                .filter(|e| matches!(e, ProcEntry::Observed(_)))
                .count();
            println!(
                "   ✅ Enumerated {} processes ({} unreadable)",
                observed,
                entries.len() - observed
            );
        }
        Err(e) => {
            println!("   ❌ Process enumeration failed: {}", e);
            all_ok = false;
        }
    }

    match source.read_counters() {
        Ok(c) => println!(
            "   ✅ CPU counters: usr={} sys={} idle={} iowait={}",
            c.usr, c.sys, c.idle, c.iowait
        ),
        Err(e) => {
            println!("   ❌ CPU counters unreadable: {}", e);
            all_ok = false;
        }
    }

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - system is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        std::process::exit(1);
    }
}
