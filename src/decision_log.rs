// CADENCE DECISION LOG
// APPEND-ONLY, ONE LINE PER RECORD, FLUSHED ON EVERY WRITE.
// A RUN KILLED MID-WAY LEAVES A VALID PREFIX THAT replay.rs CAN READ.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::config::Mode;
use crate::error::GapKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reason {
    Normal,
    Degraded,
}

impl Reason {
    pub fn label(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Degraded => "DEGRADED",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    Start {
        seq: u64, ts_ns: u64, state: u32, mode: Mode, window: usize,
        low: f64, high: f64, budget: Option<f64>, dwell: u64,
    },
    Beat {
        seq: u64, ts_ns: u64, rate: Option<f64>, signal: Option<f64>, degraded: bool,
    },
    Transition {
        seq: u64, ts_ns: u64, old: u32, new: u32,
        rate: Option<f64>, signal: Option<f64>, reason: Reason,
    },
    Failure {
        seq: u64, ts_ns: u64, attempted: u32, degraded: bool, error: String,
    },
    Gap {
        seq: u64, ts_ns: u64, last: u64, kind: GapKind, degraded: bool,
    },
    Shutdown {
        seq: u64, ts_ns: u64, state: u32, degraded: bool,
    },
}

impl Record {
    pub fn seq(&self) -> u64 {
        match self {
            Self::Start { seq, .. }
            | Self::Beat { seq, .. }
            | Self::Transition { seq, .. }
            | Self::Failure { seq, .. }
            | Self::Gap { seq, .. }
            | Self::Shutdown { seq, .. } => *seq,
        }
    }
}

struct Opt(Option<f64>);

impl fmt::Display for Opt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{}", v),
            None => f.write_str("-"),
        }
    }
}

fn flag(b: bool) -> u8 {
    b as u8
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start { seq, ts_ns, state, mode, window, low, high, budget, dwell } => write!(
                f,
                "START seq={} ts_ns={} state={} mode={} window={} low={} high={} budget={} dwell={}",
                seq, ts_ns, state, mode.label(), window, low, high, Opt(*budget), dwell
            ),
            Self::Beat { seq, ts_ns, rate, signal, degraded } => write!(
                f,
                "BEAT seq={} ts_ns={} rate={} signal={} degraded={}",
                seq, ts_ns, Opt(*rate), Opt(*signal), flag(*degraded)
            ),
            Self::Transition { seq, ts_ns, old, new, rate, signal, reason } => write!(
                f,
                "TRANSITION seq={} ts_ns={} old={} new={} rate={} signal={} reason={}",
                seq, ts_ns, old, new, Opt(*rate), Opt(*signal), reason.label()
            ),
            // QUOTES WOULD END THE FIELD EARLY, LINE BREAKS WOULD SPLIT THE RECORD
            Self::Failure { seq, ts_ns, attempted, degraded, error } => write!(
                f,
                "FAILURE seq={} ts_ns={} attempted={} degraded={} error=\"{}\"",
                seq, ts_ns, attempted, flag(*degraded),
                error.replace('"', "'").replace(['\n', '\r'], " ")
            ),
            Self::Gap { seq, ts_ns, last, kind, degraded } => write!(
                f,
                "GAP seq={} ts_ns={} last={} kind={} degraded={}",
                seq, ts_ns, last, kind.label(), flag(*degraded)
            ),
            Self::Shutdown { seq, ts_ns, state, degraded } => write!(
                f,
                "SHUTDOWN seq={} ts_ns={} state={} degraded={}",
                seq, ts_ns, state, flag(*degraded)
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub beats:       u64,
    pub transitions: u64,
    pub failures:    u64,
    pub gaps:        u64,
}

pub struct DecisionLog {
    sink:     Option<Box<dyn Write + Send>>,
    counts:   RecordCounts,
    first_ts: Option<u64>,
    last_ts:  u64,
}

impl DecisionLog {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("create decision log {}", path.display()))?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }

    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            sink: Some(Box::new(writer)),
            counts: RecordCounts::default(),
            first_ts: None,
            last_ts: 0,
        }
    }

    // COUNTS ONLY. FOR HOSTS THAT DO NOT WANT A FILE.
    pub fn disabled() -> Self {
        Self {
            sink: None,
            counts: RecordCounts::default(),
            first_ts: None,
            last_ts: 0,
        }
    }

    pub fn append(&mut self, record: &Record) -> Result<()> {
        match record {
            // ELAPSED TIME FOLLOWS THE HOST'S BEAT CLOCK, WHICH MAY BE VIRTUAL
            Record::Beat { ts_ns, .. } => {
                self.counts.beats += 1;
                self.first_ts.get_or_insert(*ts_ns);
                self.last_ts = self.last_ts.max(*ts_ns);
            }
            Record::Transition { .. } => self.counts.transitions += 1,
            Record::Failure { .. } => self.counts.failures += 1,
            Record::Gap { .. } => self.counts.gaps += 1,
            Record::Start { .. } | Record::Shutdown { .. } => {}
        }

        if let Some(sink) = self.sink.as_mut() {
            writeln!(sink, "{}", record).context("write decision record")?;
            // NEVER HOLD A RECORD IN A BUFFER ACROSS CALLS
            sink.flush().context("flush decision record")?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(sink) = self.sink.as_mut() {
            sink.flush().context("flush decision log")?;
        }
        Ok(())
    }

    pub fn counts(&self) -> RecordCounts {
        self.counts
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    // SUMMARY STATISTICS
    pub fn summary(&self) {
        let c = self.counts;
        let elapsed_s = match self.first_ts {
            Some(first) => self.last_ts.saturating_sub(first) as f64 / 1_000_000_000.0,
            None => 0.0,
        };

        println!("\n{}", "=".repeat(50));
        println!("CADENCE SUMMARY");
        println!("{}", "=".repeat(50));
        println!("  BEATS LOGGED:      {}", c.beats);
        println!("  TRANSITIONS:       {}", c.transitions);
        println!("  APPLY FAILURES:    {}", c.failures);
        println!("  MEASUREMENT GAPS:  {}", c.gaps);
        if elapsed_s > 0.0 {
            println!("  AVG BEATS/S:       {:.2}", c.beats as f64 / elapsed_s);
        }
        println!("  ELAPSED:           {:.1}s", elapsed_s);
    }
}
