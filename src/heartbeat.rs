// CADENCE HEARTBEAT MONITOR
// RECORDS PROGRESS BEATS IN A FIXED-CAPACITY RING AND DERIVES WINDOW SIGNALS
// PRE-ALLOCATED AT INIT. NO HEAP ALLOCATION OR I/O ON THE BEAT PATH.
// WRAPS AROUND AT CAPACITY -- OLDEST BEAT OVERWRITTEN.

use crate::error::{ConfigError, GapKind, MeasurementGap};

pub const MIN_WINDOW: usize = 2;

const NS_PER_SEC: f64 = 1_000_000_000.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Heartbeat {
    pub sequence:     u64,
    pub timestamp_ns: u64,
    pub tag:          Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BeatOutcome {
    Recorded,
    // SEQUENCE JUMPED FORWARD. BEAT KEPT, GAP REPORTED.
    Skipped(MeasurementGap),
    // SEQUENCE OR CLOCK WENT BACKWARDS. BEAT DROPPED, WINDOW UNTOUCHED.
    Rejected(MeasurementGap),
}

impl BeatOutcome {
    pub fn gap(&self) -> Option<&MeasurementGap> {
        match self {
            Self::Recorded => None,
            Self::Skipped(g) | Self::Rejected(g) => Some(g),
        }
    }

    pub fn accepted(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

pub struct HeartbeatMonitor {
    window:   Vec<Heartbeat>,
    head:     usize,
    len:      usize,
    min_rate: f64,
    max_rate: f64,
    last:     Option<Heartbeat>,
    // RUNNING TAG TOTAL OVER HELD BEATS. RE-SUMMED EXACTLY ON EVERY WRAP.
    tag_sum:  f64,
    tagged:   usize,
    beats:    u64,
    gaps:     u64,
}

impl HeartbeatMonitor {
    pub fn new(window_size: usize, min_rate: f64, max_rate: f64) -> Result<Self, ConfigError> {
        if window_size < MIN_WINDOW {
            return Err(ConfigError::WindowTooSmall(window_size));
        }
        if !min_rate.is_finite() || !max_rate.is_finite() || min_rate < 0.0 || min_rate >= max_rate {
            return Err(ConfigError::InvalidRateBounds { min: min_rate, max: max_rate });
        }
        Ok(Self {
            window: vec![
                Heartbeat { sequence: 0, timestamp_ns: 0, tag: None };
                window_size
            ],
            head: 0,
            len: 0,
            min_rate,
            max_rate,
            last: None,
            tag_sum: 0.0,
            tagged: 0,
            beats: 0,
            gaps: 0,
        })
    }

    // RECORD ONE BEAT STAMPED WITH THE MONOTONIC CLOCK
    pub fn beat(&mut self, sequence: u64, tag: Option<f64>) -> BeatOutcome {
        self.beat_at(sequence, crate::now_ns(), tag)
    }

    // RECORD ONE BEAT WITH AN EXPLICIT TIMESTAMP. O(1).
    pub fn beat_at(&mut self, sequence: u64, timestamp_ns: u64, tag: Option<f64>) -> BeatOutcome {
        let tag = tag.filter(|t| t.is_finite());
        let mut skipped = None;

        if let Some(prev) = self.last {
            let gap = |kind| MeasurementGap {
                kind,
                sequence,
                last_sequence: prev.sequence,
                timestamp_ns,
            };
            if sequence <= prev.sequence {
                self.gaps += 1;
                return BeatOutcome::Rejected(gap(GapKind::OutOfOrder));
            }
            if timestamp_ns < prev.timestamp_ns {
                self.gaps += 1;
                return BeatOutcome::Rejected(gap(GapKind::Clock));
            }
            if sequence > prev.sequence + 1 {
                self.gaps += 1;
                skipped = Some(gap(GapKind::Skipped));
            }
        }

        let hb = Heartbeat { sequence, timestamp_ns, tag };
        let cap = self.window.len();
        if self.len == cap {
            if let Some(old) = self.window[self.head].tag {
                self.tag_sum -= old;
                self.tagged -= 1;
            }
        }
        if let Some(t) = tag {
            self.tag_sum += t;
            self.tagged += 1;
        }
        self.window[self.head] = hb;
        self.head = (self.head + 1) % cap;
        if self.len < cap {
            self.len += 1;
        }
        if self.head == 0 {
            self.resum_tags();
        }
        self.last = Some(hb);
        self.beats += 1;

        match skipped {
            Some(g) => BeatOutcome::Skipped(g),
            None => BeatOutcome::Recorded,
        }
    }

    // DROP ACCUMULATED ROUNDING FROM THE ADD/SUBTRACT CYCLE. O(W), ONCE PER W BEATS.
    fn resum_tags(&mut self) {
        let (sum, n) = self.window[..self.len].iter()
            .filter_map(|hb| hb.tag)
            .fold((0.0, 0usize), |(s, n), t| (s + t, n + 1));
        self.tag_sum = sum;
        self.tagged = n;
    }

    // ITERATE HELD BEATS IN CHRONOLOGICAL ORDER
    fn iter_chronological(&self) -> impl Iterator<Item = &Heartbeat> {
        let cap = self.window.len();
        let start = if self.len < cap { 0 } else { self.head };
        (0..self.len).map(move |i| &self.window[(start + i) % cap])
    }

    fn oldest(&self) -> Option<&Heartbeat> {
        self.iter_chronological().next()
    }

    // SECONDS SPANNED BY THE WINDOW. NONE BELOW 2 SAMPLES OR ON ZERO ELAPSED.
    fn elapsed_secs(&self) -> Option<f64> {
        if self.len < MIN_WINDOW {
            return None;
        }
        let first = self.oldest()?;
        let last = self.last?;
        let elapsed_ns = last.timestamp_ns.checked_sub(first.timestamp_ns)?;
        if elapsed_ns == 0 {
            return None;
        }
        Some(elapsed_ns as f64 / NS_PER_SEC)
    }

    // BEATS PER SECOND: (COUNT - 1) / (T_LAST - T_FIRST)
    pub fn window_rate(&self) -> Option<f64> {
        let elapsed = self.elapsed_secs()?;
        Some((self.len - 1) as f64 / elapsed)
    }

    // TAG UNITS PER SECOND OVER THE SAME INTERVALS THE RATE COUNTS.
    // THE OLDEST BEAT ONLY OPENS THE INTERVAL, SO ITS TAG IS EXCLUDED.
    pub fn window_signal(&self) -> Option<f64> {
        let elapsed = self.elapsed_secs()?;
        let (mut sum, mut tagged) = (self.tag_sum, self.tagged);
        if let Some(t) = self.oldest().and_then(|hb| hb.tag) {
            sum -= t;
            tagged -= 1;
        }
        if tagged == 0 {
            return None;
        }
        Some(sum / elapsed)
    }

    pub fn in_bounds(&self, rate: f64) -> bool {
        rate >= self.min_rate && rate <= self.max_rate
    }

    pub fn rate_bounds(&self) -> (f64, f64) {
        (self.min_rate, self.max_rate)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.window.len()
    }

    pub fn has_enough_samples(&self) -> bool {
        self.len >= MIN_WINDOW
    }

    pub fn oldest_sequence(&self) -> Option<u64> {
        self.oldest().map(|hb| hb.sequence)
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last.map(|hb| hb.sequence)
    }

    pub fn last_timestamp_ns(&self) -> Option<u64> {
        self.last.map(|hb| hb.timestamp_ns)
    }

    // (BEATS ACCEPTED, GAPS RECORDED)
    pub fn totals(&self) -> (u64, u64) {
        (self.beats, self.gaps)
    }
}
