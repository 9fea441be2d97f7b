// CADENCE CONTROLLER
// INIT -> STEADY <-> TRANSITIONING, TERMINAL SHUTDOWN
//
// ONE CALL, ONE DECISION: READ THE WINDOW, PICK A CATALOG ENTRY, RESPECT THE
// DWELL, HAND THE PICK TO THE APPLIER, RECORD THE OUTCOME. A REJECTED APPLY
// LEAVES THE PREVIOUS STATE AUTHORITATIVE AND IS RETRIED NEXT CYCLE.

use crate::applier::StateApplier;
use crate::catalog::Catalog;
use crate::config::{ControlConfig, Mode};
use crate::decision_log::{DecisionLog, Reason, Record};
use crate::error::ControlError;
use crate::heartbeat::HeartbeatMonitor;
use crate::tuning;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Init,
    Steady,
    Transitioning,
    Shutdown,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Steady => "STEADY",
            Self::Transitioning => "TRANSITIONING",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    // MONITOR DOES NOT HOLD ENOUGH SAMPLES YET, OR THE WINDOW STILL
    // REACHES BACK PAST THE LAST TRANSITION
    Warmup,
    // RATE (OR SIGNAL IN POWER MODE) UNAVAILABLE
    NoData,
    // MEASURED RATE ALREADY INSIDE THE TARGET BAND
    InBand,
    // BEST CANDIDATE IS THE ACTIVE STATE
    Hold,
    Suppressed { candidate: u32 },
    Transitioned { from: u32, to: u32, degraded: bool },
    ApplyFailed { candidate: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControllerContext {
    pub target_low:               f64,
    pub target_high:              f64,
    pub budget:                   Option<f64>,
    pub current_state_id:         u32,
    pub last_transition_sequence: Option<u64>,
    pub dwell_minimum:            u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControlStats {
    pub calls:       u64,
    pub holds:       u64,
    pub suppressed:  u64,
    pub transitions: u64,
    pub failures:    u64,
}

pub struct Controller {
    ctx:      ControllerContext,
    mode:     Mode,
    phase:    Phase,
    degraded: bool,
    stats:    ControlStats,
}

impl Controller {
    pub fn new(config: &ControlConfig, initial_state: u32) -> Self {
        Self {
            ctx: ControllerContext {
                target_low: config.rate_bounds.0,
                target_high: config.rate_bounds.1,
                budget: config.power_budget,
                current_state_id: initial_state,
                last_transition_sequence: None,
                dwell_minimum: config.dwell_minimum,
            },
            mode: config.mode,
            phase: Phase::Init,
            degraded: false,
            stats: ControlStats::default(),
        }
    }

    pub fn apply_control<A: StateApplier + ?Sized>(
        &mut self,
        sequence: u64,
        monitor: &HeartbeatMonitor,
        catalog: &Catalog,
        applier: &mut A,
        log: &mut DecisionLog,
    ) -> Result<Decision, ControlError> {
        match self.phase {
            Phase::Shutdown => return Err(ControlError::ShutDown),
            Phase::Init if !monitor.has_enough_samples() => return Ok(Decision::Warmup),
            Phase::Init => {
                log_debug!("CONTROLLER STEADY AT SEQ {}", sequence);
                self.phase = Phase::Steady;
            }
            Phase::Steady | Phase::Transitioning => {}
        }

        // BEATS BEFORE THE TRANSITION BEAT MEASURED THE OLD STATE. DECIDE AGAIN
        // ONLY ONCE THE TRANSITION BEAT HAS BECOME THE WINDOW'S OPENING SAMPLE.
        if let (Some(last), Some(oldest)) =
            (self.ctx.last_transition_sequence, monitor.oldest_sequence())
        {
            if oldest < last {
                return Ok(Decision::Warmup);
            }
        }
        self.stats.calls += 1;

        let rate = match monitor.window_rate() {
            Some(r) => r,
            None => return Ok(Decision::NoData),
        };
        let signal = monitor.window_signal();

        // CURRENT STATE IS VALIDATED AGAINST THE CATALOG AT SESSION START
        // AND ONLY EVER REPLACED BY CATALOG IDS
        let current = match catalog.get(self.ctx.current_state_id) {
            Some(s) => s,
            None => return Ok(Decision::NoData),
        };

        let selection = match self.mode {
            Mode::Performance => {
                if tuning::rate_in_band(rate, self.ctx.target_low, self.ctx.target_high) {
                    return Ok(Decision::InBand);
                }
                let target = tuning::performance_target(
                    current, rate, self.ctx.target_low, self.ctx.target_high,
                );
                let budget = self.ctx.budget;
                catalog.closest_state(target, |s| budget.map_or(true, |b| s.predicted_power <= b))
            }
            Mode::Power => {
                let (signal, budget) = match (signal, self.ctx.budget) {
                    (Some(sig), Some(b)) => (sig, b),
                    _ => return Ok(Decision::NoData),
                };
                let scale = tuning::power_scale(signal, current);
                catalog.closest_state(catalog.max_rate(), |s| tuning::within_budget(s, scale, budget))
            }
        };

        if selection.degraded != self.degraded {
            if selection.degraded {
                log_warn!("CATALOG EXHAUSTED AT SEQ {}: NO STATE MEETS THE CONSTRAINT, USING {}",
                          sequence, selection.id);
            } else {
                log_debug!("CONSTRAINT SATISFIABLE AGAIN AT SEQ {}", sequence);
            }
            self.degraded = selection.degraded;
        }

        if selection.id == self.ctx.current_state_id {
            self.stats.holds += 1;
            return Ok(Decision::Hold);
        }

        if !tuning::dwell_elapsed(sequence, self.ctx.last_transition_sequence, self.ctx.dwell_minimum) {
            self.stats.suppressed += 1;
            log_debug!("SUPPRESSED {} -> {} AT SEQ {} (DWELL {})",
                       self.ctx.current_state_id, selection.id, sequence, self.ctx.dwell_minimum);
            return Ok(Decision::Suppressed { candidate: selection.id });
        }

        let target_state = match catalog.get(selection.id) {
            Some(s) => s,
            None => return Ok(Decision::NoData),
        };
        let ts_ns = monitor.last_timestamp_ns().unwrap_or_else(crate::now_ns);

        self.phase = Phase::Transitioning;
        let from = self.ctx.current_state_id;
        let decision = match applier.apply(target_state) {
            Ok(()) => {
                self.ctx.current_state_id = selection.id;
                self.ctx.last_transition_sequence = Some(sequence);
                self.stats.transitions += 1;
                let reason = if selection.degraded { Reason::Degraded } else { Reason::Normal };
                record(log, &Record::Transition {
                    seq: sequence, ts_ns, old: from, new: selection.id,
                    rate: Some(rate), signal, reason,
                });
                log_debug!("TRANSITION {} -> {} AT SEQ {} ({})", from, selection.id, sequence, reason.label());
                Decision::Transitioned { from, to: selection.id, degraded: selection.degraded }
            }
            Err(e) => {
                self.stats.failures += 1;
                log_warn!("APPLY {} FAILED AT SEQ {}: {}", selection.id, sequence, e);
                record(log, &Record::Failure {
                    seq: sequence, ts_ns, attempted: selection.id,
                    degraded: self.degraded, error: e.to_string(),
                });
                Decision::ApplyFailed { candidate: selection.id }
            }
        };
        self.phase = Phase::Steady;
        Ok(decision)
    }

    // TERMINAL. WRITES THE SHUTDOWN RECORD AND FLUSHES. IDEMPOTENT.
    pub fn shutdown(&mut self, sequence: u64, ts_ns: u64, log: &mut DecisionLog) {
        if self.phase == Phase::Shutdown {
            return;
        }
        self.phase = Phase::Shutdown;
        record(log, &Record::Shutdown {
            seq: sequence, ts_ns, state: self.ctx.current_state_id, degraded: self.degraded,
        });
        if let Err(e) = log.flush() {
            log_warn!("DECISION LOG FLUSH FAILED: {:#}", e);
        }
    }

    pub fn context(&self) -> &ControllerContext {
        &self.ctx
    }

    pub fn current_state(&self) -> u32 {
        self.ctx.current_state_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn degraded(&self) -> bool {
        self.degraded
    }

    pub fn stats(&self) -> ControlStats {
        self.stats
    }
}

// LOG WRITE FAILURES ARE RECOVERABLE: WARN AND KEEP CONTROLLING
pub(crate) fn record(log: &mut DecisionLog, rec: &Record) {
    if let Err(e) = log.append(rec) {
        log_warn!("DECISION LOG WRITE FAILED: {:#}", e);
    }
}
