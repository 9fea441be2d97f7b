// CADENCE CONTROL STATE CATALOG
// IMMUTABLE TABLE OF CONFIGURATION POINTS, SORTED BY MODELED RATE
//
// FILE FORMAT, ONE STATE PER LINE:
//   <id> <predicted_rate> <predicted_power> [key=value ...]
// '#' STARTS A COMMENT. FILES ENDING IN .gz ARE DECOMPRESSED ON LOAD.

use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::ConfigError;

#[derive(Clone, Debug, PartialEq)]
pub struct ControlState {
    pub id:              u32,
    // OPAQUE TO THE CORE. ONLY THE APPLIER INTERPRETS KNOBS.
    pub knobs:           BTreeMap<String, String>,
    pub predicted_rate:  f64,
    pub predicted_power: f64,
}

impl ControlState {
    pub fn new(id: u32, predicted_rate: f64, predicted_power: f64) -> Self {
        Self {
            id,
            knobs: BTreeMap::new(),
            predicted_rate,
            predicted_power,
        }
    }

    pub fn with_knob(mut self, key: &str, value: &str) -> Self {
        self.knobs.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    pub id:       u32,
    // NO STATE SATISFIED THE CONSTRAINT. BEST UNCONSTRAINED MATCH RETURNED.
    pub degraded: bool,
}

pub struct Catalog {
    states: Vec<ControlState>,
}

impl Catalog {
    pub fn new(mut states: Vec<ControlState>) -> Result<Self, ConfigError> {
        if states.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }
        let mut seen = HashSet::new();
        for s in &states {
            if !seen.insert(s.id) {
                return Err(ConfigError::DuplicateState(s.id));
            }
            if !s.predicted_rate.is_finite() || s.predicted_rate < 0.0 {
                return Err(ConfigError::InvalidState { id: s.id, reason: "rate must be finite and >= 0" });
            }
            if !s.predicted_power.is_finite() || s.predicted_power < 0.0 {
                return Err(ConfigError::InvalidState { id: s.id, reason: "power must be finite and >= 0" });
            }
        }
        // VALUES ARE FINITE, total_cmp IS A PLAIN NUMERIC ORDER HERE
        states.sort_by(|a, b| {
            a.predicted_rate.total_cmp(&b.predicted_rate)
                .then(a.predicted_power.total_cmp(&b.predicted_power))
                .then(a.id.cmp(&b.id))
        });
        Ok(Self { states })
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut states = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            states.push(parse_line(line_no, line)?);
        }
        Self::new(states)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("open catalog {}", path.display()))?;
        let mut text = String::new();
        let read = if path.extension().is_some_and(|e| e == "gz") {
            flate2::read::GzDecoder::new(file).read_to_string(&mut text)
        } else {
            let mut file = file;
            file.read_to_string(&mut text)
        };
        read.with_context(|| format!("read catalog {}", path.display()))?;
        let catalog = Self::parse(&text)
            .with_context(|| format!("parse catalog {}", path.display()))?;
        Ok(catalog)
    }

    // MINIMIZE |predicted_rate - target| AMONG STATES PASSING THE CONSTRAINT.
    // TIES: LOWER POWER, THEN LOWER ID. NOTHING PASSES -> BEST UNCONSTRAINED, DEGRADED.
    pub fn closest_state<F>(&self, target: f64, constraint: F) -> Selection
    where
        F: Fn(&ControlState) -> bool,
    {
        if let Some(s) = self.best_match(target, |s| constraint(s)) {
            return Selection { id: s.id, degraded: false };
        }
        // CATALOG IS NEVER EMPTY, SO THE UNCONSTRAINED SCAN ALWAYS FINDS ONE
        let fallback = self.best_match(target, |_| true).unwrap_or(&self.states[0]);
        Selection { id: fallback.id, degraded: true }
    }

    fn best_match<F>(&self, target: f64, keep: F) -> Option<&ControlState>
    where
        F: Fn(&ControlState) -> bool,
    {
        let mut best: Option<(&ControlState, f64)> = None;
        for s in &self.states {
            if !keep(s) {
                continue;
            }
            let dist = (s.predicted_rate - target).abs();
            let better = match best {
                None => true,
                Some((b, bd)) => {
                    dist < bd
                        || (dist == bd && s.predicted_power < b.predicted_power)
                        || (dist == bd && s.predicted_power == b.predicted_power && s.id < b.id)
                }
            };
            if better {
                best = Some((s, dist));
            }
        }
        best.map(|(s, _)| s)
    }

    pub fn get(&self, id: u32) -> Option<&ControlState> {
        self.states.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ControlState> {
        self.states.iter()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    // SORTED ASCENDING: LAST ENTRY HAS THE HIGHEST MODELED RATE
    pub fn max_rate(&self) -> f64 {
        self.states.last().map(|s| s.predicted_rate).unwrap_or(0.0)
    }

    pub fn min_power(&self) -> f64 {
        self.states.iter().map(|s| s.predicted_power).fold(f64::INFINITY, f64::min)
    }
}

fn parse_line(line_no: usize, line: &str) -> Result<ControlState, ConfigError> {
    let err = |reason: String| ConfigError::Parse { line: line_no, reason };
    let mut fields = line.split_whitespace();

    let id = fields.next()
        .ok_or_else(|| err("missing id".into()))?
        .parse::<u32>()
        .map_err(|e| err(format!("bad id: {}", e)))?;
    let rate = fields.next()
        .ok_or_else(|| err("missing predicted rate".into()))?
        .parse::<f64>()
        .map_err(|e| err(format!("bad predicted rate: {}", e)))?;
    let power = fields.next()
        .ok_or_else(|| err("missing predicted power".into()))?
        .parse::<f64>()
        .map_err(|e| err(format!("bad predicted power: {}", e)))?;

    let mut state = ControlState::new(id, rate, power);
    for knob in fields {
        let (k, v) = knob.split_once('=')
            .ok_or_else(|| err(format!("knob '{}' is not key=value", knob)))?;
        if k.is_empty() {
            return Err(err(format!("knob '{}' has an empty key", knob)));
        }
        state.knobs.insert(k.to_string(), v.to_string());
    }
    Ok(state)
}
