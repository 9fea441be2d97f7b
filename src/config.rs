// CADENCE RUN CONFIGURATION
// EXPLICIT OPTIONS ONLY. NOTHING HERE READS THE ENVIRONMENT.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::heartbeat::MIN_WINDOW;

// DEFAULTS MATCH THE BENCHMARK DRIVERS THE LOOP WAS LIFTED FROM
pub const DEFAULT_WINDOW_SIZE: usize = 30;
pub const DEFAULT_MIN_RATE: f64 = 0.0;
pub const DEFAULT_MAX_RATE: f64 = 100.0;
pub const DEFAULT_POWER_BUDGET: f64 = 70.0;
pub const DEFAULT_DWELL: u64 = 0;
pub const DEFAULT_CONTROL_INTERVAL: u64 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    // KEEP THE HEART RATE INSIDE [LOW, HIGH]
    Performance,
    // KEEP MEASURED POWER UNDER BUDGET, MAXIMIZE RATE
    Power,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Performance => "PERFORMANCE",
            Self::Power => "POWER",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "performance" | "perf" => Ok(Self::Performance),
            "power" => Ok(Self::Power),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ControlConfig {
    pub window_size:      usize,
    pub rate_bounds:      (f64, f64),
    pub power_budget:     Option<f64>,
    pub mode:             Mode,
    // MINIMUM BEATS BETWEEN TWO TRANSITIONS
    pub dwell_minimum:    u64,
    // apply_control EVERY K-TH BEAT WHEN DRIVEN THROUGH tick()
    pub control_interval: u64,
    // NONE: ASK THE APPLIER WHICH STATE IS ACTIVE
    pub initial_state:    Option<u32>,
}

impl ControlConfig {
    // MODE IS ALWAYS EXPLICIT. EVERYTHING ELSE STARTS FROM THE DRIVER DEFAULTS.
    pub fn new(mode: Mode) -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            rate_bounds: (DEFAULT_MIN_RATE, DEFAULT_MAX_RATE),
            power_budget: match mode {
                Mode::Power => Some(DEFAULT_POWER_BUDGET),
                Mode::Performance => None,
            },
            mode,
            dwell_minimum: DEFAULT_DWELL,
            control_interval: DEFAULT_CONTROL_INTERVAL,
            initial_state: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size < MIN_WINDOW {
            return Err(ConfigError::WindowTooSmall(self.window_size));
        }
        let (min, max) = self.rate_bounds;
        if !min.is_finite() || !max.is_finite() || min < 0.0 || min >= max {
            return Err(ConfigError::InvalidRateBounds { min, max });
        }
        match self.power_budget {
            Some(b) if !b.is_finite() || b <= 0.0 => return Err(ConfigError::InvalidBudget(b)),
            None if self.mode == Mode::Power => return Err(ConfigError::MissingBudget),
            _ => {}
        }
        if self.control_interval == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        Ok(())
    }

    pub fn target_mid(&self) -> f64 {
        (self.rate_bounds.0 + self.rate_bounds.1) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_drivers() {
        let c = ControlConfig::new(Mode::Power);
        assert_eq!(c.window_size, 30);
        assert_eq!(c.rate_bounds, (0.0, 100.0));
        assert_eq!(c.power_budget, Some(70.0));
        assert_eq!(c.control_interval, 1);
        assert!(c.validate().is_ok());

        let p = ControlConfig::new(Mode::Performance);
        assert_eq!(p.power_budget, None);
        assert!(p.validate().is_ok());
        assert_eq!(p.target_mid(), 50.0);
    }

    #[test]
    fn validate_rejects_each_bad_field() {
        let base = ControlConfig::new(Mode::Performance);

        let c = ControlConfig { window_size: 1, ..base.clone() };
        assert_eq!(c.validate(), Err(ConfigError::WindowTooSmall(1)));

        let c = ControlConfig { rate_bounds: (2.0, 1.0), ..base.clone() };
        assert!(matches!(c.validate(), Err(ConfigError::InvalidRateBounds { .. })));

        let c = ControlConfig { rate_bounds: (-1.0, 1.0), ..base.clone() };
        assert!(matches!(c.validate(), Err(ConfigError::InvalidRateBounds { .. })));

        let c = ControlConfig { power_budget: Some(0.0), ..base.clone() };
        assert_eq!(c.validate(), Err(ConfigError::InvalidBudget(0.0)));

        let c = ControlConfig { mode: Mode::Power, power_budget: None, ..base.clone() };
        assert_eq!(c.validate(), Err(ConfigError::MissingBudget));

        let c = ControlConfig { control_interval: 0, ..base };
        assert_eq!(c.validate(), Err(ConfigError::InvalidInterval));
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("PERFORMANCE".parse::<Mode>(), Ok(Mode::Performance));
        assert_eq!("perf".parse::<Mode>(), Ok(Mode::Performance));
        assert_eq!("Power".parse::<Mode>(), Ok(Mode::Power));
        assert!(matches!("turbo".parse::<Mode>(), Err(ConfigError::UnknownMode(_))));
        assert_eq!(Mode::Power.to_string(), "POWER");
    }
}
