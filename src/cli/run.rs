// SYNTHETIC HOST LOOP
// VIRTUAL CLOCK: EACH BEAT ADVANCES TIME BY 1 / (ACTIVE RATE * WORKLOAD FACTOR)
// AND TAGS THE BEAT WITH THE ENERGY SPENT (MODELED POWER * PERIOD).
// NO SLEEPING: A 10K-BEAT RUN FINISHES INSTANTLY AND REPLAYS IDENTICALLY.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};

use cadence::{ApplyError, ControlSession, ControlState, Decision, DecisionLog, StateApplier};
use cadence::{log_debug, log_info};

use crate::RunArgs;

const NS_PER_SEC: f64 = 1_000_000_000.0;

// STANDS IN FOR THE PLATFORM HOOK. OPTIONALLY REJECTS EVERY N-TH ATTEMPT.
pub struct SimApplier {
    active:     u32,
    fail_every: Option<u64>,
    attempts:   u64,
    failures:   u64,
}

impl SimApplier {
    pub fn new(active: u32, fail_every: Option<u64>) -> Self {
        Self { active, fail_every, attempts: 0, failures: 0 }
    }
}

impl StateApplier for SimApplier {
    fn apply(&mut self, state: &ControlState) -> Result<(), ApplyError> {
        if state.id == self.active {
            return Ok(());
        }
        self.attempts += 1;
        if let Some(n) = self.fail_every.filter(|n| *n > 0) {
            if self.attempts % n == 0 {
                self.failures += 1;
                return Err(ApplyError::Rejected {
                    state: state.id,
                    reason: format!("injected failure on attempt {}", self.attempts),
                });
            }
        }
        self.active = state.id;
        Ok(())
    }

    fn query(&self) -> u32 {
        self.active
    }
}

fn workload_factor(args: &RunArgs, seq: u64) -> f64 {
    match args.slowdown_at {
        Some(at) if seq >= at => args.workload_factor * args.slowdown_factor,
        _ => args.workload_factor,
    }
}

pub fn run_sim(args: &RunArgs, shutdown: &AtomicBool) -> Result<()> {
    let config = args.control.to_config();
    let catalog = super::load_catalog(&args.control)?;

    // HOST STARTS IN ITS FASTEST STATE UNLESS TOLD OTHERWISE
    let start = catalog.iter().last().map(|s| s.id).unwrap_or(0);
    let applier = SimApplier::new(start, args.fail_every);

    let log = if args.no_log {
        DecisionLog::disabled()
    } else {
        DecisionLog::create(&args.log)?
    };

    println!("CADENCE v0.3.2");
    println!("MODE:            {}", config.mode);
    println!("WINDOW:          {} beats (control every {})", config.window_size, config.control_interval);
    println!("TARGET:          [{}, {}] beats/s", config.rate_bounds.0, config.rate_bounds.1);
    match config.power_budget {
        Some(b) => println!("BUDGET:          {}", b),
        None => println!("BUDGET:          none"),
    }
    println!("DWELL:           {} beats", config.dwell_minimum);
    println!("STATES:          {}", catalog.len());
    println!("LOG:             {}", if args.no_log { "disabled".to_string() } else { args.log.display().to_string() });
    println!();

    let mut session = ControlSession::new(config, catalog, applier, log)
        .context("start control session")?;

    println!("CADENCE IS ACTIVE (CTRL+C TO EXIT)");

    let mut clock_ns: u64 = 0;
    let mut last_report_ns: u64 = 0;
    let mut interval_transitions = 0u64;
    let report_every = args.report_every.max(1);

    for seq in 0..args.beats {
        if shutdown.load(Ordering::Relaxed) {
            log_info!("INTERRUPTED AT SEQ {}", seq);
            break;
        }

        let (rate, power) = match session.catalog().get(session.current_state()) {
            Some(s) => (s.predicted_rate, s.predicted_power),
            None => (0.0, 0.0),
        };
        let actual = rate * workload_factor(args, seq);
        // A STALLED STATE STILL TICKS ONCE PER SECOND
        let period_s = if actual > 0.0 { 1.0 / actual } else { 1.0 };
        clock_ns += (period_s * NS_PER_SEC) as u64;

        if let Some(Decision::Transitioned { .. }) = session.tick_at(seq, clock_ns, Some(power * period_s))? {
            interval_transitions += 1;
        }

        if (seq + 1) % report_every == 0 {
            let m = session.monitor();
            let elapsed_s = clock_ns.saturating_sub(last_report_ns) as f64 / NS_PER_SEC;
            println!(
                "seq: {:<8} t: {:<9.2} rate: {:<9.3} signal: {:<9.3} state: {:<4} trans: {:<4} degraded: {}",
                seq,
                clock_ns as f64 / NS_PER_SEC,
                m.window_rate().unwrap_or(0.0),
                m.window_signal().unwrap_or(0.0),
                session.current_state(),
                interval_transitions,
                session.controller().degraded(),
            );
            log_debug!("REPORT INTERVAL {:.2}s", elapsed_s);
            last_report_ns = clock_ns;
            interval_transitions = 0;
        }
    }

    println!("CADENCE IS SHUTTING DOWN");
    session.shutdown();
    session.summary();
    println!("  INJECTED FAILURES: {}", session.applier().failures);
    println!("CADENCE OUT.");
    Ok(())
}
