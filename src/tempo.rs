//! Tempo handling
//!
//! Two jobs live here:
//! - recognizing a leading `setcps(..)` / `setcpm(..)` line in a fragment so the
//!   session can hoist it to the front of the combined program
//! - mapping a user-facing tempo percentage onto a track's base tempo to get the
//!   absolute cycles-per-second value pushed to the runtime

use crate::error::{SessionError, SessionResult};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref DIRECTIVE_RE: Regex =
        Regex::new(r"^\s*(setcps|setcpm)\(\s*([^()]*?)\s*\)\s*;?\s*$").unwrap();
    static ref RATIO_RE: Regex =
        Regex::new(r"^(\d+(?:\.\d+)?|\.\d+)\s*([/*])\s*(\d+(?:\.\d+)?|\.\d+)$").unwrap();
}

/// Beats per cycle assumed when converting BPM to cycles per second
pub const BEATS_PER_CYCLE: f64 = 4.0;

/// A leading tempo line lifted out of a fragment
#[derive(Debug, Clone, PartialEq)]
pub struct TempoDirective {
    /// Directive source, e.g. `setcps(0.5)` (trailing `;` removed)
    pub text: String,
    /// Resolved cycles per second, when the argument is a plain number or ratio
    pub cps: Option<f64>,
}

impl TempoDirective {
    /// Parse a single line as a tempo directive
    pub fn parse_line(line: &str) -> Option<Self> {
        let caps = DIRECTIVE_RE.captures(line)?;
        let func = caps.get(1)?.as_str();
        let arg = caps.get(2)?.as_str();

        let cps = eval_tempo_arg(arg).map(|value| {
            if func == "setcpm" {
                value / 60.0
            } else {
                value
            }
        });

        Some(Self {
            text: format!("{}({})", func, arg),
            cps: cps.filter(|c| c.is_finite() && *c > 0.0),
        })
    }
}

/// Evaluate `0.5`, `120/4` or `30*2`; anything else is left to the runtime
fn eval_tempo_arg(arg: &str) -> Option<f64> {
    if let Ok(value) = arg.parse::<f64>() {
        return Some(value);
    }

    let caps = RATIO_RE.captures(arg)?;
    let lhs: f64 = caps.get(1)?.as_str().parse().ok()?;
    let rhs: f64 = caps.get(3)?.as_str().parse().ok()?;
    match caps.get(2)?.as_str() {
        "/" if rhs != 0.0 => Some(lhs / rhs),
        "*" => Some(lhs * rhs),
        _ => None,
    }
}

/// Split an optional leading tempo directive off a fragment
///
/// Only the first non-blank line is considered. Returns the directive (if any)
/// and the remaining fragment text.
pub fn strip_tempo_directive(fragment: &str) -> (Option<TempoDirective>, String) {
    let mut offset = 0;
    for line in fragment.split_inclusive('\n') {
        if line.trim().is_empty() {
            offset += line.len();
            continue;
        }

        return match TempoDirective::parse_line(line.trim_end_matches(['\r', '\n'])) {
            Some(directive) => {
                let rest = &fragment[offset + line.len()..];
                (Some(directive), rest.trim_start_matches(['\r', '\n']).to_string())
            }
            None => (None, fragment.to_string()),
        };
    }

    (None, fragment.to_string())
}

/// Convert a tempo in BPM (four beats per cycle) to cycles per second
pub fn bpm_to_cps(bpm: f64) -> f64 {
    bpm / 60.0 / BEATS_PER_CYCLE
}

/// Maps a relative tempo percentage onto a base tempo
#[derive(Debug, Clone)]
pub struct TempoController {
    default_cps: f64,
    percent: f64,
}

impl TempoController {
    pub const MIN_PERCENT: f64 = 10.0;
    pub const MAX_PERCENT: f64 = 400.0;

    /// Create a controller at 100% of `default_cps`
    pub fn new(default_cps: f64) -> Self {
        let default_cps = if default_cps.is_finite() && default_cps > 0.0 {
            default_cps
        } else {
            0.5
        };
        Self {
            default_cps,
            percent: 100.0,
        }
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn default_cps(&self) -> f64 {
        self.default_cps
    }

    /// Validate and store a new percentage
    pub fn set_percent(&mut self, percent: f64) -> SessionResult<()> {
        if !percent.is_finite() || !(Self::MIN_PERCENT..=Self::MAX_PERCENT).contains(&percent) {
            return Err(SessionError::InvalidInput(format!(
                "tempo must be between {}% and {}%, got {}",
                Self::MIN_PERCENT,
                Self::MAX_PERCENT,
                percent
            )));
        }
        self.percent = percent;
        Ok(())
    }

    /// Absolute cycles per second for a reference base tempo
    pub fn cps_for(&self, base_cps: Option<f64>) -> f64 {
        base_cps.unwrap_or(self.default_cps) * self.percent / 100.0
    }

    pub fn reset(&mut self) {
        self.percent = 100.0;
    }
}
