// CADENCE CONTROL SESSION
// ONE PER RUN. OWNS MONITOR, CATALOG, CONTROLLER, APPLIER AND DECISION LOG.
//
// BUILT BEFORE THE HOST LOOP STARTS, TORN DOWN WHEN IT ENDS. DROP RUNS
// shutdown(), SO AN EARLY RETURN OR PANIC IN THE HOST LOOP STILL WRITES
// THE SHUTDOWN RECORD AND FLUSHES THE LOG.
//
// THE START RECORD WAITS FOR THE FIRST BEAT AND TAKES ITS TIMESTAMP, SO A
// HOST DRIVING ITS OWN CLOCK (beat_at) GETS A LOG ON ONE TIMELINE.
//
// NOT FOR CONCURRENT PRODUCERS: EVERY METHOD TAKES &mut self. HOSTS WITH
// WORKER THREADS FUNNEL THEIR BEATS TO ONE THREAD FIRST.

use crate::applier::StateApplier;
use crate::catalog::Catalog;
use crate::config::ControlConfig;
use crate::controller::{record, Controller, Decision};
use crate::decision_log::{DecisionLog, Record, RecordCounts};
use crate::error::{ConfigError, ControlError};
use crate::heartbeat::{BeatOutcome, HeartbeatMonitor};

pub struct ControlSession<A: StateApplier> {
    config:     ControlConfig,
    monitor:    HeartbeatMonitor,
    catalog:    Catalog,
    controller: Controller,
    applier:    A,
    log:        DecisionLog,
    started:    bool,
    closed:     bool,
}

impl<A: StateApplier> ControlSession<A> {
    pub fn new(
        config: ControlConfig,
        catalog: Catalog,
        applier: A,
        log: DecisionLog,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (low, high) = config.rate_bounds;
        let monitor = HeartbeatMonitor::new(config.window_size, low, high)?;

        let initial = config.initial_state.unwrap_or_else(|| applier.query());
        if !catalog.contains(initial) {
            return Err(ConfigError::UnknownState(initial));
        }
        let controller = Controller::new(&config, initial);

        log_info!(
            "CONTROL SESSION: mode={} state={} window={} band=[{}, {}] states={}",
            config.mode, initial, config.window_size, low, high, catalog.len()
        );

        Ok(Self {
            config,
            monitor,
            catalog,
            controller,
            applier,
            log,
            started: false,
            closed: false,
        })
    }

    fn write_start(&mut self, seq: u64, ts_ns: u64) {
        if self.started {
            return;
        }
        self.started = true;
        let (low, high) = self.config.rate_bounds;
        record(&mut self.log, &Record::Start {
            seq,
            ts_ns,
            state: self.controller.current_state(),
            mode: self.config.mode,
            window: self.config.window_size,
            low,
            high,
            budget: self.config.power_budget,
            dwell: self.config.dwell_minimum,
        });
    }

    // HOT PATH. O(1) IN THE MONITOR PLUS ONE LOG LINE.
    pub fn beat(&mut self, sequence: u64, tag: Option<f64>) -> Result<BeatOutcome, ControlError> {
        self.beat_at(sequence, crate::now_ns(), tag)
    }

    pub fn beat_at(
        &mut self,
        sequence: u64,
        timestamp_ns: u64,
        tag: Option<f64>,
    ) -> Result<BeatOutcome, ControlError> {
        if self.closed {
            return Err(ControlError::ShutDown);
        }
        self.write_start(sequence, timestamp_ns);
        let outcome = self.monitor.beat_at(sequence, timestamp_ns, tag);
        let degraded = self.controller.degraded();

        if let Some(gap) = outcome.gap() {
            log_warn!("{}", gap);
            record(&mut self.log, &Record::Gap {
                seq: gap.sequence,
                ts_ns: gap.timestamp_ns,
                last: gap.last_sequence,
                kind: gap.kind,
                degraded,
            });
        }
        if outcome.accepted() {
            record(&mut self.log, &Record::Beat {
                seq: sequence,
                ts_ns: timestamp_ns,
                rate: self.monitor.window_rate(),
                signal: self.monitor.window_signal(),
                degraded,
            });
        }
        Ok(outcome)
    }

    pub fn apply_control(&mut self, sequence: u64) -> Result<Decision, ControlError> {
        if self.closed {
            return Err(ControlError::ShutDown);
        }
        self.controller.apply_control(
            sequence,
            &self.monitor,
            &self.catalog,
            &mut self.applier,
            &mut self.log,
        )
    }

    // BEAT, THEN RUN CONTROL ON EVERY control_interval-TH ACCEPTED BEAT
    pub fn tick(&mut self, sequence: u64, tag: Option<f64>) -> Result<Option<Decision>, ControlError> {
        self.tick_at(sequence, crate::now_ns(), tag)
    }

    pub fn tick_at(
        &mut self,
        sequence: u64,
        timestamp_ns: u64,
        tag: Option<f64>,
    ) -> Result<Option<Decision>, ControlError> {
        let outcome = self.beat_at(sequence, timestamp_ns, tag)?;
        if !outcome.accepted() {
            return Ok(None);
        }
        let (accepted, _) = self.monitor.totals();
        if accepted % self.config.control_interval != 0 {
            return Ok(None);
        }
        self.apply_control(sequence).map(Some)
    }

    // IDEMPOTENT. SAFE TO CALL EXPLICITLY; DROP CALLS IT REGARDLESS.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let seq = self.monitor.last_sequence().unwrap_or(0);
        let ts_ns = self.monitor.last_timestamp_ns().unwrap_or_else(crate::now_ns);
        self.write_start(seq, ts_ns);
        self.controller.shutdown(seq, ts_ns, &mut self.log);
        log_debug!("CONTROL SESSION CLOSED AT SEQ {} IN STATE {}", seq, self.controller.current_state());
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn current_state(&self) -> u32 {
        self.controller.current_state()
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn monitor(&self) -> &HeartbeatMonitor {
        &self.monitor
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn applier(&self) -> &A {
        &self.applier
    }

    pub fn log_counts(&self) -> RecordCounts {
        self.log.counts()
    }

    pub fn summary(&self) {
        self.log.summary();
        let s = self.controller.stats();
        let (beats, gaps) = self.monitor.totals();
        println!("  CONTROL CALLS:     {}", s.calls);
        println!("  HOLDS:             {}", s.holds);
        println!("  SUPPRESSED:        {}", s.suppressed);
        println!("  BEATS ACCEPTED:    {} (gaps: {})", beats, gaps);
        println!("  FINAL STATE:       {}{}", self.controller.current_state(),
                 if self.controller.degraded() { " (DEGRADED)" } else { "" });
    }
}

impl<A: StateApplier> Drop for ControlSession<A> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
