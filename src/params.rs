//! Numeric effect parameters inside fragments
//!
//! Finds `.name(number)` calls for a fixed set of effects and rewrites one call's
//! number in place. This is a regex-level scan, not a parser: the pattern
//! language belongs to the runtime. Matches carry byte offsets and go stale as
//! soon as the fragment is edited, so re-extract after every rewrite.

use crate::error::{SessionError, SessionResult};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::ops::Range;

lazy_static! {
    static ref PARAM_RE: Regex = Regex::new(
        r"\.(gain|room|delay|cutoff|resonance|decay|attack|release|pan|speed|fast|slow)\(\s*(-?(?:\d+(?:\.\d*)?|\.\d+))\s*\)"
    )
    .unwrap();
}

/// Effects whose numeric argument can be driven from a slider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    Gain,
    Room,
    Delay,
    Cutoff,
    Resonance,
    Decay,
    Attack,
    Release,
    Pan,
    Speed,
    Fast,
    Slow,
}

/// Slider range for an effect
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ParamSpec {
    /// Clamp into range and snap to the nearest step
    pub fn snap(&self, value: f64) -> f64 {
        let clamped = value.clamp(self.min, self.max);
        let steps = ((clamped - self.min) / self.step).round();
        (self.min + steps * self.step).clamp(self.min, self.max)
    }
}

impl Effect {
    pub const ALL: [Effect; 12] = [
        Effect::Gain,
        Effect::Room,
        Effect::Delay,
        Effect::Cutoff,
        Effect::Resonance,
        Effect::Decay,
        Effect::Attack,
        Effect::Release,
        Effect::Pan,
        Effect::Speed,
        Effect::Fast,
        Effect::Slow,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Effect::Gain => "gain",
            Effect::Room => "room",
            Effect::Delay => "delay",
            Effect::Cutoff => "cutoff",
            Effect::Resonance => "resonance",
            Effect::Decay => "decay",
            Effect::Attack => "attack",
            Effect::Release => "release",
            Effect::Pan => "pan",
            Effect::Speed => "speed",
            Effect::Fast => "fast",
            Effect::Slow => "slow",
        }
    }

    pub fn from_name(name: &str) -> Option<Effect> {
        Effect::ALL.iter().copied().find(|e| e.name() == name)
    }

    pub fn spec(&self) -> ParamSpec {
        let (min, max, step) = match self {
            Effect::Gain => (0.0, 2.0, 0.01),
            Effect::Room => (0.0, 1.0, 0.01),
            Effect::Delay => (0.0, 1.0, 0.01),
            Effect::Cutoff => (50.0, 10000.0, 10.0),
            Effect::Resonance => (0.0, 30.0, 0.1),
            Effect::Decay => (0.0, 2.0, 0.01),
            Effect::Attack => (0.0, 2.0, 0.01),
            Effect::Release => (0.0, 4.0, 0.01),
            Effect::Pan => (0.0, 1.0, 0.01),
            Effect::Speed => (-2.0, 4.0, 0.05),
            Effect::Fast => (0.25, 8.0, 0.25),
            Effect::Slow => (0.25, 8.0, 0.25),
        };
        ParamSpec { min, max, step }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A located `.effect(number)` call
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedParam {
    pub effect: Effect,
    pub value: f64,
    /// Byte offset of the whole call, starting at the `.`
    pub offset: usize,
    pub length: usize,
    /// Byte offset of the numeric literal
    pub value_offset: usize,
    pub value_length: usize,
}

impl ExtractedParam {
    pub fn span(&self) -> Range<usize> {
        self.offset..self.offset + self.length
    }

    pub fn value_span(&self) -> Range<usize> {
        self.value_offset..self.value_offset + self.value_length
    }
}

/// All recognized parameter calls, in source order
pub fn extract_params(fragment: &str) -> Vec<ExtractedParam> {
    PARAM_RE
        .captures_iter(fragment)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let effect = Effect::from_name(caps.get(1)?.as_str())?;
            let number = caps.get(2)?;
            let value: f64 = number.as_str().parse().ok()?;
            Some(ExtractedParam {
                effect,
                value,
                offset: whole.start(),
                length: whole.len(),
                value_offset: number.start(),
                value_length: number.len(),
            })
        })
        .collect()
}

/// Replace one parameter's number, leaving every other byte untouched
///
/// Fails when `param` no longer describes the text at its offsets, which means
/// it was extracted from an older version of the fragment.
pub fn rewrite_param(fragment: &str, param: &ExtractedParam, value: f64) -> SessionResult<String> {
    if !value.is_finite() {
        return Err(SessionError::InvalidInput(format!(
            "{} value must be a finite number",
            param.effect
        )));
    }

    let current = fragment
        .get(param.span())
        .and_then(|text| extract_params(text).into_iter().next())
        .filter(|found| {
            found.offset == 0
                && found.length == param.length
                && found.effect == param.effect
                && found.value_offset + param.offset == param.value_offset
        });
    if current.is_none() {
        return Err(SessionError::Codec(format!(
            "stale {} parameter at offset {}; re-extract after editing",
            param.effect, param.offset
        )));
    }

    let span = param.value_span();
    let mut out = String::with_capacity(fragment.len() + 8);
    out.push_str(&fragment[..span.start]);
    out.push_str(&format_number(value));
    out.push_str(&fragment[span.end..]);
    Ok(out)
}

/// Extract, then rewrite the match at `index`
pub fn rewrite_param_at(fragment: &str, index: usize, value: f64) -> SessionResult<String> {
    let params = extract_params(fragment);
    let param = params.get(index).ok_or_else(|| {
        SessionError::InvalidInput(format!(
            "parameter index {} out of range ({} found)",
            index,
            params.len()
        ))
    })?;
    rewrite_param(fragment, param, value)
}

/// Compact number text: `1`, `0.5`, `-0.25`, at most four decimals
pub fn format_number(n: f64) -> String {
    let rounded = (n * 10000.0).round() / 10000.0;
    if !rounded.is_finite() {
        // Scaling overflowed; values this large have no decimals to round
        return format!("{}", n);
    }
    if rounded.fract() == 0.0 && rounded.abs() < 1e10 {
        format!("{}", rounded as i64)
    } else {
        format!("{}", rounded)
    }
}
