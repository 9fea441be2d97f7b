// CADENCE LOG REPLAY
// PARSES A DECISION LOG BACK INTO RECORDS AND REBUILDS THE ACTIVE-STATE TIMELINE.
// ACCEPTS PLAIN OR GZIP-COMPRESSED LOGS (.gz, e.g. AFTER LOGROTATE).

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;

use crate::config::Mode;
use crate::decision_log::{Reason, Record, RecordCounts};
use crate::error::GapKind;

pub struct LogParser {
    line:  Regex,
    field: Regex,
}

struct Fields<'a> {
    pairs: Vec<(&'a str, &'a str)>,
}

impl<'a> Fields<'a> {
    fn raw(&self, key: &str) -> Result<&'a str> {
        self.pairs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .ok_or_else(|| anyhow!("missing field '{}'", key))
    }

    fn u64(&self, key: &str) -> Result<u64> {
        let v = self.raw(key)?;
        v.parse().map_err(|_| anyhow!("field '{}' is not an integer: {}", key, v))
    }

    fn u32(&self, key: &str) -> Result<u32> {
        let v = self.raw(key)?;
        v.parse().map_err(|_| anyhow!("field '{}' is not a state id: {}", key, v))
    }

    fn f64(&self, key: &str) -> Result<f64> {
        let v = self.raw(key)?;
        v.parse().map_err(|_| anyhow!("field '{}' is not a number: {}", key, v))
    }

    // "-" MEANS THE VALUE WAS UNAVAILABLE WHEN THE RECORD WAS WRITTEN
    fn opt_f64(&self, key: &str) -> Result<Option<f64>> {
        match self.raw(key)? {
            "-" => Ok(None),
            _ => self.f64(key).map(Some),
        }
    }

    fn flag(&self, key: &str) -> Result<bool> {
        match self.raw(key)? {
            "0" => Ok(false),
            "1" => Ok(true),
            v => bail!("field '{}' is not 0/1: {}", key, v),
        }
    }
}

impl LogParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            line: Regex::new(r#"^(START|BEAT|TRANSITION|FAILURE|GAP|SHUTDOWN)((?: [a-z_]+=(?:"[^"]*"|\S+))*)$"#)?,
            field: Regex::new(r#"([a-z_]+)=("[^"]*"|\S+)"#)?,
        })
    }

    pub fn parse_line(&self, line: &str) -> Result<Record> {
        let caps = self
            .line
            .captures(line)
            .ok_or_else(|| anyhow!("unrecognized record: {}", line))?;
        let tag = caps.get(1).map_or("", |m| m.as_str());
        let body = caps.get(2).map_or("", |m| m.as_str());

        let pairs = self
            .field
            .captures_iter(body)
            .filter_map(|c| match (c.get(1), c.get(2)) {
                (Some(k), Some(v)) => Some((k.as_str(), v.as_str().trim_matches('"'))),
                _ => None,
            })
            .collect();
        let f = Fields { pairs };

        let seq = f.u64("seq")?;
        let ts_ns = f.u64("ts_ns")?;
        let record = match tag {
            "START" => Record::Start {
                seq,
                ts_ns,
                state: f.u32("state")?,
                mode: f.raw("mode")?.parse::<Mode>().map_err(|e| anyhow!("{}", e))?,
                window: f.u64("window")? as usize,
                low: f.f64("low")?,
                high: f.f64("high")?,
                budget: f.opt_f64("budget")?,
                dwell: f.u64("dwell")?,
            },
            "BEAT" => Record::Beat {
                seq,
                ts_ns,
                rate: f.opt_f64("rate")?,
                signal: f.opt_f64("signal")?,
                degraded: f.flag("degraded")?,
            },
            "TRANSITION" => Record::Transition {
                seq,
                ts_ns,
                old: f.u32("old")?,
                new: f.u32("new")?,
                rate: f.opt_f64("rate")?,
                signal: f.opt_f64("signal")?,
                reason: match f.raw("reason")? {
                    "NORMAL" => Reason::Normal,
                    "DEGRADED" => Reason::Degraded,
                    r => bail!("unknown transition reason: {}", r),
                },
            },
            "FAILURE" => Record::Failure {
                seq,
                ts_ns,
                attempted: f.u32("attempted")?,
                degraded: f.flag("degraded")?,
                error: f.raw("error")?.to_string(),
            },
            "GAP" => Record::Gap {
                seq,
                ts_ns,
                last: f.u64("last")?,
                kind: {
                    let k = f.raw("kind")?;
                    GapKind::from_label(k).ok_or_else(|| anyhow!("unknown gap kind: {}", k))?
                },
                degraded: f.flag("degraded")?,
            },
            _ => Record::Shutdown {
                seq,
                ts_ns,
                state: f.u32("state")?,
                degraded: f.flag("degraded")?,
            },
        };
        Ok(record)
    }

    // BLANK LINES ARE SKIPPED. ANYTHING ELSE UNPARSEABLE STOPS THE REPLAY,
    // EXCEPT AN UNTERMINATED FINAL LINE: A WRITER KILLED MID-RECORD LEAVES
    // ONE, AND THE PREFIX BEFORE IT IS STILL A VALID LOG.
    pub fn parse(&self, text: &str) -> Result<Vec<Record>> {
        let torn_tail = !text.is_empty() && !text.ends_with('\n');
        let last_idx = text.lines().count().saturating_sub(1);
        let mut records = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            match self.parse_line(line) {
                Ok(rec) => records.push(rec),
                Err(e) if torn_tail && idx == last_idx => {
                    log_warn!("DROPPING TORN FINAL LINE {} OF DECISION LOG: {:#}", idx + 1, e);
                }
                Err(e) => return Err(e.context(format!("decision log line {}", idx + 1))),
            }
        }
        Ok(records)
    }
}

pub fn parse(text: &str) -> Result<Vec<Record>> {
    LogParser::new()?.parse(text)
}

pub fn load(path: &Path) -> Result<Vec<Record>> {
    let file = File::open(path)
        .with_context(|| format!("open decision log {}", path.display()))?;
    let mut text = String::new();
    let read = if path.extension().is_some_and(|e| e == "gz") {
        flate2::read::GzDecoder::new(file).read_to_string(&mut text)
    } else {
        let mut file = file;
        file.read_to_string(&mut text)
    };
    read.with_context(|| format!("read decision log {}", path.display()))?;
    parse(&text)
}

// ACTIVE STATE AFTER EACH CHANGE: THE START STATE, THEN EVERY SUCCESSFUL
// TRANSITION. FAILURES NEVER CHANGE THE ACTIVE STATE, SO THEY DO NOT APPEAR.
pub fn timeline(records: &[Record]) -> Vec<(u64, u32)> {
    records
        .iter()
        .filter_map(|r| match r {
            Record::Start { seq, state, .. } => Some((*seq, *state)),
            Record::Transition { seq, new, .. } => Some((*seq, *new)),
            _ => None,
        })
        .collect()
}

pub fn counts(records: &[Record]) -> RecordCounts {
    let mut c = RecordCounts::default();
    for r in records {
        match r {
            Record::Beat { .. } => c.beats += 1,
            Record::Transition { .. } => c.transitions += 1,
            Record::Failure { .. } => c.failures += 1,
            Record::Gap { .. } => c.gaps += 1,
            Record::Start { .. } | Record::Shutdown { .. } => {}
        }
    }
    c
}

// STATE NAMED BY THE FINAL SHUTDOWN RECORD, IF THE RUN REACHED ONE
pub fn final_state(records: &[Record]) -> Option<u32> {
    records.iter().rev().find_map(|r| match r {
        Record::Shutdown { state, .. } => Some(*state),
        _ => None,
    })
}
