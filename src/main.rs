//! nst-emu: functional emulator for the NST tensor accelerator

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use nst_emu::config::Config;
use nst_emu::testing::{builtin_scenarios, run_scenario, TestOutcome};

fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut dump = false;
    let mut list = false;
    let mut names: Vec<&str> = Vec::new();

    for arg in &args[1..] {
        match arg.as_str() {
            "--dump" | "-d" => dump = true,
            "--list" | "-l" => list = true,
            "--help" | "-h" => {
                print_usage();
                return Ok(ExitCode::SUCCESS);
            }
            name if !name.starts_with('-') => names.push(name),
            other => {
                eprintln!("unknown option: {}", other);
                print_usage();
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    let scenarios = builtin_scenarios();

    if list {
        for s in &scenarios {
            println!("{}", s.name);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let config = Config::get();
    let dump_dir: Option<PathBuf> = dump.then(|| PathBuf::from(config.dump_dir()));
    if let Some(dir) = &dump_dir {
        println!("Writing job and memory dumps to {}", dir.display());
    }

    let selected: Vec<_> = if names.is_empty() {
        scenarios.iter().collect()
    } else {
        let selected: Vec<_> = scenarios
            .iter()
            .filter(|s| names.iter().any(|n| *n == s.name))
            .collect();
        if selected.len() != names.len() {
            for n in &names {
                if !scenarios.iter().any(|s| s.name == *n) {
                    eprintln!("unknown scenario: {} (use --list)", n);
                }
            }
            return Ok(ExitCode::FAILURE);
        }
        selected
    };

    let mut failed = 0usize;
    for scenario in &selected {
        let outcome = run_scenario(
            scenario,
            config.tcdm_bytes(),
            config.check_tcdm_addrs(),
            dump_dir.as_deref(),
        )?;
        match outcome {
            TestOutcome::Passed => println!("PASS  {}", scenario.name),
            TestOutcome::Failed { reason } => {
                failed += 1;
                println!("FAIL  {}: {}", scenario.name, reason);
            }
        }
    }

    println!();
    println!("{} scenarios, {} failed", selected.len(), failed);

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_usage() {
    println!("usage: nst-emu [--dump] [--list] [SCENARIO...]");
    println!();
    println!("Runs the built-in accelerator scenarios against their golden");
    println!("memory images.");
    println!();
    println!("  --dump, -d   write job and memory dumps to the configured dir");
    println!("  --list, -l   list scenario names and exit");
}
