//! # Phase Stress Driver
//!
//! Runs N participants through R lock-step rounds with randomized busy work
//! and checks, every round, that the last arrival sees all N slots posted.
//!
//! ## Usage
//!
//! ```bash
//! phase_stress --participants 64 --rounds 10000
//! phase_stress --config lockstep.toml --rounds 500
//! ```

use lockstep_core::{Barrier, LockstepConfig, ResourceLedger};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Instant;

fn main() {
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         LOCKSTEP - PHASE STRESS                                  ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    // Parse command line arguments (simple parsing, no external deps)
    let args: Vec<String> = std::env::args().collect();
    let mut config = LockstepConfig::default();
    config.barrier.participants = 64;
    config.barrier.label = "phase_stress".into();
    let mut rounds = 10_000u64;
    let mut max_spin = 256u32;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config = match LockstepConfig::load(&args[i + 1]) {
                        Ok(config) => config,
                        Err(err) => {
                            eprintln!("error: {err}");
                            std::process::exit(2);
                        }
                    };
                    i += 1;
                }
            }
            "--participants" | "-n" => {
                if i + 1 < args.len() {
                    config.barrier.participants = args[i + 1].parse().unwrap_or(64);
                    i += 1;
                }
            }
            "--rounds" | "-r" => {
                if i + 1 < args.len() {
                    rounds = args[i + 1].parse().unwrap_or(10_000);
                    i += 1;
                }
            }
            "--max-spin" | "-s" => {
                if i + 1 < args.len() {
                    max_spin = args[i + 1].parse().unwrap_or(256);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: phase_stress [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>        TOML config file");
                println!("  -n, --participants <N>     Workers per round (default: 64)");
                println!("  -r, --rounds <R>           Rounds to run (default: 10000)");
                println!("  -s, --max-spin <S>         Max busy-work spins per round (default: 256)");
                println!("  -h, --help                 Print help");
                return;
            }
            other => {
                eprintln!("warning: ignoring unknown argument {other}");
            }
        }
        i += 1;
    }

    let ledger = ResourceLedger::with_limits(config.limits);
    let barrier = match Barrier::from_config(&config.barrier, &ledger) {
        Ok(barrier) => barrier,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    };
    let participants = barrier.total_participants();

    println!("┌─ CONFIGURATION ─────────────────────────────────────────────────┐");
    println!("│ Label:              {}", barrier.label());
    println!("│ Participants:       {participants}");
    println!("│ Rounds:             {rounds}");
    println!("│ Max Busy Spins:     {max_spin}");
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let slots: Vec<AtomicU64> = (0..participants).map(|_| AtomicU64::new(u64::MAX)).collect();
    let violations = AtomicU64::new(0);
    let leader_rounds = AtomicU64::new(0);

    let start = Instant::now();
    thread::scope(|s| {
        for id in 0..participants {
            let mut me = barrier.join();
            let (barrier, slots) = (&barrier, &slots);
            let (violations, leader_rounds) = (&violations, &leader_rounds);
            s.spawn(move || {
                let mut rng = StdRng::seed_from_u64(id as u64);
                for round in 0..rounds {
                    for _ in 0..rng.gen_range(0..=max_spin) {
                        std::hint::spin_loop();
                    }
                    slots[id].store(round, Ordering::Relaxed);

                    if barrier.wait(&mut me).is_last_arrival() {
                        leader_rounds.fetch_add(1, Ordering::Relaxed);
                        if !slots.iter().all(|slot| slot.load(Ordering::Relaxed) == round) {
                            violations.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    let _ = barrier.wait(&mut me);
                }
            });
        }
    });
    let elapsed = start.elapsed();

    let violations = violations.load(Ordering::Relaxed);
    let leader_rounds = leader_rounds.load(Ordering::Relaxed);
    let barrier_rounds = barrier.rounds_completed();

    println!("┌─ RESULTS ───────────────────────────────────────────────────────┐");
    println!("│ Wall Time:          {:.3} s", elapsed.as_secs_f64());
    println!("│ Barrier Rounds:     {barrier_rounds}");
    println!("│ Verified Rounds:    {leader_rounds}");
    println!(
        "│ Avg Round:          {:.2} μs",
        elapsed.as_secs_f64() * 1_000_000.0 / barrier_rounds.max(1) as f64
    );
    println!("│ Violations:         {violations}");
    println!("└──────────────────────────────────────────────────────────────────┘");

    if let Err(err) = barrier.destroy() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }

    if violations > 0 || leader_rounds != rounds {
        println!("✗ ROUND ORDERING VIOLATED");
        std::process::exit(1);
    }
    println!("✓ EVERY ROUND SEALED");
}
