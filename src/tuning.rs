// CADENCE TUNING POLICY
// PURE FUNCTIONS: NO I/O, NO APPLIER, TESTABLE OFFLINE.
// SHARED BY controller.rs AND THE INTEGRATION TESTS.
//
// THE CATALOG MODEL IS TRUSTED. MEASUREMENTS ONLY RESCALE THE ACTIVE STATE'S
// MODEL; THE NEXT WINDOW CONFIRMS OR CORRECTS THE PICK ON THE NEXT CYCLE.

use crate::catalog::ControlState;

// RATE TARGETING (PERFORMANCE MODE)
// INSIDE [LOW, HIGH] IS A DEAD ZONE: NO DESIRED CHANGE.
// OUTSIDE IT, AIM FOR THE MIDPOINT BY SCALING THE ACTIVE STATE'S MODELED RATE
// BY THE OBSERVED ERROR (MID / MEASURED).

pub fn rate_in_band(rate: f64, low: f64, high: f64) -> bool {
    rate >= low && rate <= high
}

pub fn performance_target(current: &ControlState, measured_rate: f64, low: f64, high: f64) -> f64 {
    let mid = (low + high) / 2.0;
    if measured_rate <= 0.0 || current.predicted_rate <= 0.0 {
        // NOTHING TO SCALE FROM: FALL BACK TO THE RAW MIDPOINT
        return mid;
    }
    current.predicted_rate * (mid / measured_rate)
}

// POWER MODEL CORRECTION (POWER MODE)
// RATIO OF MEASURED TO MODELED POWER FOR THE ACTIVE STATE.
// A STATE MODELED AT ZERO POWER GIVES NO INFORMATION: TRUST THE MODEL AS-IS.

pub fn power_scale(measured_signal: f64, current: &ControlState) -> f64 {
    if current.predicted_power <= 0.0 || measured_signal < 0.0 {
        return 1.0;
    }
    measured_signal / current.predicted_power
}

pub fn within_budget(state: &ControlState, scale: f64, budget: f64) -> bool {
    state.predicted_power * scale <= budget
}

// HYSTERESIS
// NO TRANSITION YET -> NOTHING TO DWELL ON.

pub fn dwell_elapsed(sequence: u64, last_transition: Option<u64>, dwell_minimum: u64) -> bool {
    match last_transition {
        None => true,
        Some(last) => sequence.saturating_sub(last) >= dwell_minimum,
    }
}
