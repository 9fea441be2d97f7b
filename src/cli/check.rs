use anyhow::Result;

use cadence::{Catalog, ControlConfig, Mode};

use crate::ControlArgs;

fn check_config(config: &ControlConfig) -> bool {
    match config.validate() {
        Ok(()) => {
            println!("  {:<24}OK", "configuration");
            true
        }
        Err(e) => {
            println!("  {:<24}INVALID ({})", "configuration", e);
            false
        }
    }
}

// WARNINGS ONLY: THE CONTROLLER STILL RUNS, BUT DEGRADED OR NEVER IN BAND
fn check_reachability(config: &ControlConfig, catalog: &Catalog) {
    let (low, high) = config.rate_bounds;
    let in_band = catalog
        .iter()
        .filter(|s| s.predicted_rate >= low && s.predicted_rate <= high)
        .count();
    if in_band == 0 {
        println!("  {:<24}NO STATE MODELED INSIDE [{}, {}]", "target band", low, high);
    } else {
        println!("  {:<24}{} STATE(S) MODELED INSIDE [{}, {}]", "target band", in_band, low, high);
    }

    if let Some(budget) = config.power_budget {
        if catalog.min_power() > budget {
            println!("  {:<24}EVERY STATE EXCEEDS {} (WILL RUN DEGRADED)", "power budget", budget);
        } else {
            let fits = catalog.iter().filter(|s| s.predicted_power <= budget).count();
            println!("  {:<24}{} STATE(S) WITHIN {}", "power budget", fits, budget);
        }
    } else if config.mode == Mode::Performance {
        println!("  {:<24}NONE", "power budget");
    }
}

pub fn run_check(args: &ControlArgs) -> Result<()> {
    println!("CADENCE CATALOG CHECK");
    println!();

    let config = args.to_config();
    let mut ok = check_config(&config);

    let catalog = match super::load_catalog(args) {
        Ok(c) => c,
        Err(e) => {
            println!("  {:<24}INVALID ({:#})", "catalog", e);
            println!();
            println!("SOME CHECKS FAILED");
            std::process::exit(1);
        }
    };
    println!("  {:<24}OK ({} states)", "catalog", catalog.len());
    println!();

    println!("{:<6} {:>10} {:>10}  {}", "ID", "RATE", "POWER", "KNOBS");
    println!("{}", "-".repeat(50));
    for s in catalog.iter() {
        let knobs: Vec<String> = s.knobs.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        println!("{:<6} {:>10} {:>10}  {}", s.id, s.predicted_rate, s.predicted_power, knobs.join(" "));
    }
    println!("{}", "-".repeat(50));
    println!();

    if let Some(id) = config.initial_state {
        if catalog.contains(id) {
            println!("  {:<24}{} OK", "initial state", id);
        } else {
            println!("  {:<24}{} NOT IN CATALOG", "initial state", id);
            ok = false;
        }
    }
    check_reachability(&config, &catalog);
    println!();

    if ok {
        println!("ALL CHECKS PASSED");
    } else {
        println!("SOME CHECKS FAILED");
        std::process::exit(1);
    }

    Ok(())
}
