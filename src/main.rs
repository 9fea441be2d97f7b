// CADENCE v0.3.2 -- HEARTBEAT-DRIVEN CONFIGURATION CONTROL
// SYNTHETIC HOST LOOP, CATALOG CHECKER AND DECISION-LOG REPLAYER
//
// THE CONTROL LOOP ITSELF LIVES IN THE LIBRARY
// THIS BINARY HANDLES: OPTIONS, THE SIMULATED WORKLOAD, REPORTING

mod cli;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use cadence::config::{
    DEFAULT_CONTROL_INTERVAL, DEFAULT_DWELL, DEFAULT_MAX_RATE, DEFAULT_MIN_RATE,
    DEFAULT_WINDOW_SIZE,
};
use cadence::{ControlConfig, Mode};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "CADENCE -- HEARTBEAT-DRIVEN CONFIGURATION CONTROL")]
struct Cli {
    // PRINT DEBUG OUTPUT (EVERY DECISION, SUPPRESSION, PHASE CHANGE)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    // DRIVE THE CONTROLLER WITH A SIMULATED WORKLOAD
    Run(RunArgs),
    // VALIDATE A CATALOG AGAINST A CONFIGURATION
    Check(ControlArgs),
    // REBUILD THE ACTIVE-STATE TIMELINE FROM A DECISION LOG
    Replay(ReplayArgs),
}

#[derive(Args, Clone)]
pub struct ControlArgs {
    // CONTROL OBJECTIVE: performance OR power
    #[arg(long)]
    pub mode: Mode,

    // HEARTBEATS HELD IN THE SLIDING WINDOW
    #[arg(long, default_value_t = DEFAULT_WINDOW_SIZE)]
    pub window_size: usize,

    // LOWER EDGE OF THE TARGET RATE BAND (BEATS/S)
    #[arg(long, default_value_t = DEFAULT_MIN_RATE)]
    pub min_rate: f64,

    // UPPER EDGE OF THE TARGET RATE BAND (BEATS/S)
    #[arg(long, default_value_t = DEFAULT_MAX_RATE)]
    pub max_rate: f64,

    // POWER BUDGET IN SIGNAL UNITS (70 IN POWER MODE IF UNSET)
    #[arg(long)]
    pub power_budget: Option<f64>,

    // MINIMUM BEATS BETWEEN TWO TRANSITIONS
    #[arg(long, default_value_t = DEFAULT_DWELL)]
    pub dwell: u64,

    // RUN CONTROL EVERY N ACCEPTED BEATS
    #[arg(long, default_value_t = DEFAULT_CONTROL_INTERVAL)]
    pub interval: u64,

    // FORCE THE INITIAL STATE INSTEAD OF QUERYING THE APPLIER
    #[arg(long)]
    pub initial_state: Option<u32>,

    // STATE CATALOG FILE (PLAIN OR .gz). BUILT-IN DEMO CATALOG IF UNSET.
    #[arg(long)]
    pub catalog: Option<PathBuf>,
}

impl ControlArgs {
    pub fn to_config(&self) -> ControlConfig {
        let base = ControlConfig::new(self.mode);
        ControlConfig {
            window_size: self.window_size,
            rate_bounds: (self.min_rate, self.max_rate),
            power_budget: self.power_budget.or(base.power_budget),
            dwell_minimum: self.dwell,
            control_interval: self.interval,
            initial_state: self.initial_state,
            ..base
        }
    }
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub control: ControlArgs,

    // NUMBER OF HEARTBEATS TO EMIT
    #[arg(long, default_value_t = 1000)]
    pub beats: u64,

    // DECISION LOG PATH
    #[arg(long, default_value = "cadence.log")]
    pub log: PathBuf,

    // DISABLE THE DECISION LOG (COUNTS ONLY)
    #[arg(long)]
    pub no_log: bool,

    // MULTIPLIER ON EVERY STATE'S MODELED RATE (1.0 = MODEL IS EXACT)
    #[arg(long, default_value_t = 1.0)]
    pub workload_factor: f64,

    // SEQUENCE AT WHICH THE WORKLOAD CHANGES PHASE
    #[arg(long)]
    pub slowdown_at: Option<u64>,

    // EXTRA RATE MULTIPLIER AFTER --slowdown-at
    #[arg(long, default_value_t = 0.5)]
    pub slowdown_factor: f64,

    // REJECT EVERY N-TH APPLY ATTEMPT
    #[arg(long)]
    pub fail_every: Option<u64>,

    // PRINT A TELEMETRY LINE EVERY N BEATS
    #[arg(long, default_value_t = 100)]
    pub report_every: u64,
}

#[derive(Args)]
pub struct ReplayArgs {
    // DECISION LOG (PLAIN OR .gz)
    pub path: PathBuf,

    // PRINT EVERY PARSED RECORD
    #[arg(long)]
    pub dump: bool,
}

fn main() -> Result<()> {
    let opts = Cli::parse();
    cadence::set_verbose(opts.verbose);

    match opts.command {
        Command::Run(args) => {
            ctrlc::set_handler(move || {
                SHUTDOWN.store(true, Ordering::Relaxed);
            })?;
            cli::run::run_sim(&args, &SHUTDOWN)
        }
        Command::Check(args) => cli::check::run_check(&args),
        Command::Replay(args) => cli::replay::run_replay(&args),
    }
}
