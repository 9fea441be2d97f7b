// CADENCE -- HEARTBEAT-DRIVEN CONFIGURATION CONTROL
// PURE-RUST LIBRARY: MONITOR, CATALOG, CONTROLLER, DECISION LOG
//
// THE HOST LOOP BEATS, THE CONTROLLER DECIDES, THE INJECTED APPLIER ACTS.
// NO HARDWARE ACCESS, NO BACKGROUND THREADS, NO GLOBAL CONTROL STATE.

use std::sync::atomic::{AtomicBool, Ordering};

// --- LOGGING ---

static VERBOSE: AtomicBool = AtomicBool::new(false);

pub fn set_verbose(on: bool) {
    VERBOSE.store(on, Ordering::Relaxed);
}

pub fn verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        eprintln!("[INFO]  {}", format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        eprintln!("[WARN]  {}", format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if $crate::verbose() {
            eprintln!("[DEBUG] {}", format_args!($($arg)*))
        }
    };
}

pub mod applier;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod decision_log;
pub mod error;
pub mod heartbeat;
pub mod replay;
pub mod session;
pub mod tuning;

pub use applier::{NoopApplier, StateApplier};
pub use catalog::{Catalog, ControlState, Selection};
pub use config::{ControlConfig, Mode};
pub use controller::{Controller, Decision, Phase};
pub use decision_log::DecisionLog;
pub use error::{ApplyError, ConfigError, ControlError, MeasurementGap};
pub use heartbeat::{BeatOutcome, HeartbeatMonitor};
pub use session::ControlSession;

// MONOTONIC CLOCK IN NANOSECONDS
pub fn now_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    (ts.tv_sec as u64) * 1_000_000_000 + (ts.tv_nsec as u64)
}
