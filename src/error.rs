// CADENCE ERROR TYPES
// CONFIG ERRORS ARE FATAL AT INIT. EVERYTHING ELSE IS RECORDED AND SURVIVED.

use std::fmt;

// --- CONFIG ---

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    WindowTooSmall(usize),
    InvalidRateBounds { min: f64, max: f64 },
    InvalidBudget(f64),
    MissingBudget,
    InvalidInterval,
    UnknownMode(String),
    EmptyCatalog,
    DuplicateState(u32),
    InvalidState { id: u32, reason: &'static str },
    UnknownState(u32),
    Parse { line: usize, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WindowTooSmall(n) => write!(f, "window size {} is below the minimum of 2", n),
            Self::InvalidRateBounds { min, max } => {
                write!(f, "invalid rate bounds: min={} max={} (need 0 <= min < max)", min, max)
            }
            Self::InvalidBudget(b) => write!(f, "invalid power budget {}", b),
            Self::MissingBudget => write!(f, "power mode requires a power budget"),
            Self::InvalidInterval => write!(f, "control interval must be at least 1 beat"),
            Self::UnknownMode(m) => write!(f, "unknown mode '{}' (expected performance or power)", m),
            Self::EmptyCatalog => write!(f, "control state catalog is empty"),
            Self::DuplicateState(id) => write!(f, "duplicate control state id {}", id),
            Self::InvalidState { id, reason } => write!(f, "control state {}: {}", id, reason),
            Self::UnknownState(id) => write!(f, "state {} is not in the catalog", id),
            Self::Parse { line, reason } => write!(f, "catalog line {}: {}", line, reason),
        }
    }
}

impl std::error::Error for ConfigError {}

// --- APPLY ---

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyError {
    Rejected { state: u32, reason: String },
    Unavailable(String),
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { state, reason } => write!(f, "state {} rejected: {}", state, reason),
            Self::Unavailable(reason) => write!(f, "applier unavailable: {}", reason),
        }
    }
}

impl std::error::Error for ApplyError {}

// --- MEASUREMENT ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapKind {
    OutOfOrder,
    Skipped,
    Clock,
}

impl GapKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::OutOfOrder => "OUT_OF_ORDER",
            Self::Skipped => "SKIPPED",
            Self::Clock => "CLOCK",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "OUT_OF_ORDER" => Some(Self::OutOfOrder),
            "SKIPPED" => Some(Self::Skipped),
            "CLOCK" => Some(Self::Clock),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementGap {
    pub kind: GapKind,
    pub sequence: u64,
    pub last_sequence: u64,
    pub timestamp_ns: u64,
}

impl fmt::Display for MeasurementGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "measurement gap ({}): seq {} after seq {}",
            self.kind.label(),
            self.sequence,
            self.last_sequence
        )
    }
}

impl std::error::Error for MeasurementGap {}

// --- CONTROL ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    ShutDown,
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShutDown => write!(f, "controller is shut down"),
        }
    }
}

impl std::error::Error for ControlError {}
