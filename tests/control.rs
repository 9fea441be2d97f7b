// CADENCE CONTROL LOOP TESTS
// SCENARIOS, CONVERGENCE, DWELL, FAILURE RECOVERY, LOG REPLAY
//
// ALL TESTS DRIVE cadence::ControlSession ON A VIRTUAL CLOCK.
// NO HARDWARE, NO SLEEPING. RUN OFFLINE.

use std::io::Write;
use std::sync::{Arc, Mutex};

use cadence::replay;
use cadence::{
    ApplyError, Catalog, ControlConfig, ControlSession, ControlState, Decision, DecisionLog,
    Mode, NoopApplier, StateApplier,
};

const SEC: u64 = 1_000_000_000;

// === HARNESS ===

#[derive(Clone, Default)]
struct Shared(Arc<Mutex<Vec<u8>>>);

impl Write for Shared {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Shared {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

// REJECTS EVERY N-TH ATTEMPTED CHANGE
struct Flaky {
    active:   u32,
    every:    u64,
    attempts: u64,
}

impl StateApplier for Flaky {
    fn apply(&mut self, state: &ControlState) -> Result<(), ApplyError> {
        if state.id == self.active {
            return Ok(());
        }
        self.attempts += 1;
        if self.attempts % self.every == 0 {
            return Err(ApplyError::Unavailable("knob busy".into()));
        }
        self.active = state.id;
        Ok(())
    }

    fn query(&self) -> u32 {
        self.active
    }
}

// FOUR STATES: RATE DOUBLES, POWER ROUGHLY TRIPLES
fn ladder() -> Catalog {
    Catalog::new(vec![
        ControlState::new(0, 0.5, 10.0),
        ControlState::new(1, 1.0, 25.0),
        ControlState::new(2, 2.0, 70.0),
        ControlState::new(3, 4.0, 200.0),
    ])
    .unwrap()
}

fn perf(window: usize, low: f64, high: f64, dwell: u64) -> ControlConfig {
    ControlConfig {
        window_size: window,
        rate_bounds: (low, high),
        dwell_minimum: dwell,
        ..ControlConfig::new(Mode::Performance)
    }
}

// PLANT: THE ACTIVE STATE RUNS AT ITS MODELED RATE TIMES factor(seq) AND
// SPENDS ITS MODELED POWER. RETURNS EVERY ACTIVE-STATE CHANGE THE HOST SAW.
fn drive<A: StateApplier>(
    session: &mut ControlSession<A>,
    beats: u64,
    factor: impl Fn(u64) -> f64,
) -> Vec<(u64, u32)> {
    let mut clock_ns = 0u64;
    let mut seen = vec![(0, session.current_state())];
    for seq in 0..beats {
        let s = session.catalog().get(session.current_state()).unwrap().clone();
        let period = 1.0 / (s.predicted_rate * factor(seq));
        if seq > 0 {
            clock_ns += (period * SEC as f64) as u64;
        }
        session.tick_at(seq, clock_ns, Some(s.predicted_power * period)).unwrap();
        if session.current_state() != seen[seen.len() - 1].1 {
            seen.push((seq, session.current_state()));
        }
    }
    seen
}

// === SCENARIOS ===

#[test]
fn steady_rate_inside_band_never_transitions() {
    // WINDOW 4, BEATS AT t=0..4 (1 BEAT/S), TARGET [0.8, 1.2], ONE 1.0 STATE
    let catalog = Catalog::new(vec![ControlState::new(0, 1.0, 10.0)]).unwrap();
    let mut s = ControlSession::new(perf(4, 0.8, 1.2, 0), catalog, NoopApplier::new(0), DecisionLog::disabled())
        .unwrap();
    for seq in 0..5 {
        s.tick_at(seq, seq * SEC, None).unwrap();
    }
    assert!((s.monitor().window_rate().unwrap() - 1.0).abs() < 1e-9);
    assert_eq!(s.log_counts().transitions, 0);
    assert_eq!(s.applier().applied(), 0);
    assert_eq!(s.current_state(), 0);
}

#[test]
fn slow_band_moves_once_at_first_check() {
    // SAME TRACE, TARGET [0.0, 0.5], CATALOG ADDS A 0.4 STATE
    let catalog = Catalog::new(vec![ControlState::new(0, 0.4, 5.0), ControlState::new(1, 1.0, 10.0)])
        .unwrap();
    let mut s = ControlSession::new(perf(4, 0.0, 0.5, 0), catalog, NoopApplier::new(1), DecisionLog::disabled())
        .unwrap();

    let mut decisions = Vec::new();
    for seq in 0..5 {
        decisions.push(s.tick_at(seq, seq * SEC, None).unwrap());
    }
    assert_eq!(decisions[0], Some(Decision::Warmup));
    // FIRST CHECK WITH TWO SAMPLES
    assert_eq!(decisions[1], Some(Decision::Transitioned { from: 1, to: 0, degraded: false }));
    // SEQ 0 STAYS IN THE WINDOW UNTIL SEQ 4 PUSHES IT OUT
    assert_eq!(decisions[2], Some(Decision::Warmup));
    assert_eq!(decisions[3], Some(Decision::Warmup));
    assert_eq!(decisions[4], Some(Decision::Hold));
    assert_eq!(s.log_counts().transitions, 1);
    assert_eq!(s.current_state(), 0);
}

// === CONVERGENCE & HYSTERESIS ===

#[test]
fn exact_model_converges_without_oscillation() {
    let mut s = ControlSession::new(perf(4, 1.5, 2.5, 4), ladder(), NoopApplier::new(3), DecisionLog::disabled())
        .unwrap();
    let seen = drive(&mut s, 200, |_| 1.0);
    assert_eq!(seen, vec![(0, 3), (1, 2)]);
    assert_eq!(s.log_counts().transitions, 1);
    let rate = s.monitor().window_rate().unwrap();
    assert!((1.5..=2.5).contains(&rate));
}

#[test]
fn default_config_converges_without_oscillation() {
    // NO DWELL: THE CONTROLLER MUST NOT READ A WINDOW THAT STILL HOLDS 4 BEATS/S
    let cfg = ControlConfig { window_size: 4, rate_bounds: (1.5, 2.5), ..ControlConfig::new(Mode::Performance) };
    assert_eq!(cfg.dwell_minimum, 0);
    let mut s = ControlSession::new(cfg, ladder(), NoopApplier::new(3), DecisionLog::disabled()).unwrap();
    let seen = drive(&mut s, 200, |_| 1.0);
    assert_eq!(seen, vec![(0, 3), (1, 2)]);
    assert_eq!(s.log_counts().transitions, 1);
    assert_eq!(s.controller().stats().suppressed, 0);
}

#[test]
fn default_config_settles_after_phase_change() {
    let cfg = ControlConfig { window_size: 8, rate_bounds: (1.5, 2.5), ..ControlConfig::new(Mode::Performance) };
    let mut s = ControlSession::new(cfg, ladder(), NoopApplier::new(3), DecisionLog::disabled()).unwrap();
    // EVERY STATE DROPS TO HALF ITS MODEL AT SEQ 100: 4 BEATS/S STATE NOW GIVES 2
    let seen = drive(&mut s, 300, |seq| if seq < 100 { 1.0 } else { 0.5 });
    assert_eq!(seen.len(), 3, "{:?}", seen);
    assert_eq!(seen[1].1, 2);
    assert_eq!(seen[2].1, 3);
    assert_eq!(s.current_state(), 3);
}

#[test]
fn transitions_respect_dwell_minimum() {
    let dwell = 6;
    let mut s = ControlSession::new(perf(4, 1.5, 2.5, dwell), ladder(), NoopApplier::new(3), DecisionLog::disabled())
        .unwrap();
    // PHASE CHANGE AT SEQ 40: EVERY STATE RUNS AT 60% OF ITS MODEL
    let seen = drive(&mut s, 300, |seq| if seq < 40 { 1.0 } else { 0.6 });
    assert!(seen.len() >= 2);
    for pair in seen[1..].windows(2) {
        assert!(pair[1].0 - pair[0].0 >= dwell, "transitions at {} and {}", pair[0].0, pair[1].0);
    }
}

#[test]
fn interval_limits_control_calls() {
    let cfg = ControlConfig { control_interval: 5, ..perf(4, 1.5, 2.5, 0) };
    let mut s = ControlSession::new(cfg, ladder(), NoopApplier::new(3), DecisionLog::disabled()).unwrap();
    drive(&mut s, 50, |_| 1.0);
    assert_eq!(s.controller().stats().calls, 10);
}

// === POWER MODE ===

#[test]
fn power_mode_settles_under_budget() {
    let cfg = ControlConfig {
        window_size: 4,
        power_budget: Some(30.0),
        dwell_minimum: 4,
        ..ControlConfig::new(Mode::Power)
    };
    let mut s = ControlSession::new(cfg, ladder(), NoopApplier::new(3), DecisionLog::disabled()).unwrap();
    let seen = drive(&mut s, 100, |_| 1.0);
    // FASTEST STATE UNDER 30 W IS STATE 1
    assert_eq!(seen, vec![(0, 3), (1, 1)]);
    let signal = s.monitor().window_signal().unwrap();
    assert!((signal - 25.0).abs() < 1e-6);
    assert!(!s.controller().degraded());
}

#[test]
fn unreachable_budget_is_logged_as_degraded() {
    let cfg = ControlConfig {
        window_size: 4,
        power_budget: Some(5.0),
        ..ControlConfig::new(Mode::Power)
    };
    let buf = Shared::default();
    let mut s = ControlSession::new(cfg, ladder(), NoopApplier::new(1), DecisionLog::from_writer(buf.clone()))
        .unwrap();
    drive(&mut s, 10, |_| 1.0);
    // NOTHING FITS: BEST UNCONSTRAINED MATCH FOR MAX RATE
    assert_eq!(s.current_state(), 3);
    assert!(s.controller().degraded());
    s.shutdown();
    let text = buf.text();
    assert!(text.contains("old=1 new=3"));
    assert!(text.contains("reason=DEGRADED"));
    assert!(text.lines().last().unwrap().ends_with("degraded=1"));
}

// === FAILURES ===

#[test]
fn rejected_apply_keeps_previous_state_and_retries() {
    let catalog = Catalog::new(vec![ControlState::new(0, 0.4, 5.0), ControlState::new(1, 1.0, 10.0)])
        .unwrap();
    let buf = Shared::default();
    let applier = Flaky { active: 1, every: 1, attempts: 0 };
    let mut s = ControlSession::new(perf(4, 0.0, 0.5, 0), catalog, applier, DecisionLog::from_writer(buf.clone()))
        .unwrap();
    for seq in 0..6 {
        let d = s.tick_at(seq, seq * SEC, None).unwrap();
        if seq > 0 {
            assert_eq!(d, Some(Decision::ApplyFailed { candidate: 0 }));
        }
    }
    assert_eq!(s.current_state(), 1);
    assert_eq!(s.applier().query(), 1);
    assert_eq!(s.log_counts().failures, 5);
    assert_eq!(s.log_counts().transitions, 0);
    assert_eq!(replay::timeline(&replay::parse(&buf.text()).unwrap()), vec![(0, 1)]);
}

// REJECTS EVERY CHANGE WITH A MULTI-LINE REASON
struct Stubborn;

impl StateApplier for Stubborn {
    fn apply(&mut self, state: &ControlState) -> Result<(), ApplyError> {
        if state.id == 1 {
            return Ok(());
        }
        Err(ApplyError::Rejected {
            state: state.id,
            reason: "firmware said no\nretry later\r\nsee dmesg".into(),
        })
    }

    fn query(&self) -> u32 {
        1
    }
}

#[test]
fn multi_line_apply_error_keeps_log_replayable() {
    let catalog = Catalog::new(vec![ControlState::new(0, 0.4, 5.0), ControlState::new(1, 1.0, 10.0)])
        .unwrap();
    let buf = Shared::default();
    let mut s = ControlSession::new(perf(4, 0.0, 0.5, 0), catalog, Stubborn, DecisionLog::from_writer(buf.clone()))
        .unwrap();
    for seq in 0..3 {
        s.tick_at(seq, seq * SEC, None).unwrap();
    }
    drop(s);

    let text = buf.text();
    assert!(text.lines().all(|l| !l.starts_with("retry") && !l.starts_with("see")));
    let records = replay::parse(&text).unwrap();
    assert_eq!(replay::counts(&records).failures, 2);
    assert_eq!(replay::final_state(&records), Some(1));
}

// === LOG REPLAY ===

fn ts_of(line: &str) -> u64 {
    line.split_whitespace()
        .find_map(|kv| kv.strip_prefix("ts_ns="))
        .unwrap()
        .parse()
        .unwrap()
}

#[test]
fn start_record_follows_host_clock() {
    let buf = Shared::default();
    let mut s = ControlSession::new(perf(4, 1.5, 2.5, 0), ladder(), NoopApplier::new(2), DecisionLog::from_writer(buf.clone()))
        .unwrap();
    for i in 0..10 {
        s.tick_at(3 + i, (5 + i) * SEC / 2, None).unwrap();
    }
    drop(s);

    let text = buf.text();
    let first = text.lines().next().unwrap();
    assert!(first.starts_with("START seq=3 ts_ns=2500000000 state=2"), "{}", first);
    let stamps: Vec<u64> = text.lines().map(ts_of).collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]), "{:?}", stamps);
}

#[test]
fn session_without_beats_still_logs_start() {
    let buf = Shared::default();
    let s = ControlSession::new(perf(4, 1.5, 2.5, 0), ladder(), NoopApplier::new(2), DecisionLog::from_writer(buf.clone()))
        .unwrap();
    drop(s);

    let records = replay::parse(&buf.text()).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(replay::timeline(&records), vec![(0, 2)]);
    assert_eq!(replay::final_state(&records), Some(2));
}

#[test]
fn replay_reconstructs_active_states() {
    let buf = Shared::default();
    let applier = Flaky { active: 3, every: 3, attempts: 0 };
    let mut s = ControlSession::new(perf(4, 1.5, 2.5, 3), ladder(), applier, DecisionLog::from_writer(buf.clone()))
        .unwrap();
    let seen = drive(&mut s, 400, |seq| match seq {
        0..=99 => 1.0,
        100..=249 => 0.6,
        _ => 1.3,
    });
    let final_state = s.current_state();
    drop(s);

    let records = replay::parse(&buf.text()).unwrap();
    assert_eq!(replay::timeline(&records), seen);
    assert_eq!(replay::final_state(&records), Some(final_state));
}

#[test]
fn gaps_are_logged_and_rejected_beats_leave_window_alone() {
    let buf = Shared::default();
    let mut s = ControlSession::new(perf(4, 0.0, 100.0, 0), ladder(), NoopApplier::new(1), DecisionLog::from_writer(buf.clone()))
        .unwrap();
    s.beat_at(0, 0, None).unwrap();
    s.beat_at(1, SEC, None).unwrap();
    let rate = s.monitor().window_rate();
    // DUPLICATE SEQUENCE, THEN A CLOCK THAT WENT BACKWARDS
    assert!(!s.beat_at(1, 2 * SEC, None).unwrap().accepted());
    assert!(!s.beat_at(2, SEC / 2, None).unwrap().accepted());
    assert_eq!(s.monitor().window_rate(), rate);
    // SKIPPED SEQUENCE IS KEPT
    assert!(s.beat_at(5, 2 * SEC, None).unwrap().accepted());
    let text = buf.text();
    assert!(text.contains("kind=OUT_OF_ORDER"));
    assert!(text.contains("kind=CLOCK"));
    assert!(text.contains("GAP seq=5 ts_ns=2000000000 last=1 kind=SKIPPED"));
    assert_eq!(s.monitor().totals(), (3, 3));
}
