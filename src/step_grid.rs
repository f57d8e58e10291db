//! Step-grid view over simple fragments
//!
//! A fragment is grid-editable when it is one line of the form
//! `s("<pattern>")` (or `sound(..)`) followed only by flat modifier calls, and
//! the pattern is either `name*N` or a space separated list of one sound name and
//! `~` rests. A grid with every step cleared is written as `name*0`, which
//! plays nothing but keeps the sound name. Everything else stays text-only: decoding returns `None` rather
//! than attempting a lossy round trip.
//!
//! The modifier chain found during decoding travels with the grid, so encoding
//! re-emits the user's gain (and any other flat modifier) without scanning the
//! old text again.

use crate::error::{SessionError, SessionResult};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref CALL_RE: Regex = Regex::new(
        r#"^\s*(s|sound)\(\s*(?:"([^"]*)"|'([^']*)')\s*\)((?:\s*\.[A-Za-z_]\w*\([^()]*\))*)\s*;?\s*$"#
    )
    .unwrap();
    static ref MODIFIER_RE: Regex = Regex::new(r"\.([A-Za-z_]\w*)\(([^()]*)\)").unwrap();
    static ref UNIFORM_RE: Regex =
        Regex::new(r"^\s*([A-Za-z0-9_][\w:.\-]*)\s*\*\s*(\d+)\s*$").unwrap();
    static ref SOUND_TOKEN_RE: Regex = Regex::new(r"^[A-Za-z0-9_][\w:.\-]*$").unwrap();
}

/// Calls that combine patterns; a fragment using any of them is not a single grid
const COMBINATORS: &[&str] = &[
    "stack",
    "cat",
    "seq",
    "sequence",
    "fastcat",
    "slowcat",
    "polymeter",
    "arrange",
    "layer",
    "superimpose",
];

/// Loop-length call emitted for sample-backed grids
pub const LOOP_CALL: &str = "loopAt";

pub const REST: &str = "~";

/// Supported grid lengths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridSize {
    Eight,
    Sixteen,
}

impl GridSize {
    pub fn steps(&self) -> usize {
        match self {
            GridSize::Eight => 8,
            GridSize::Sixteen => 16,
        }
    }

    pub fn from_steps(steps: usize) -> Option<GridSize> {
        match steps {
            8 => Some(GridSize::Eight),
            16 => Some(GridSize::Sixteen),
            _ => None,
        }
    }
}

/// A flat `.name(args)` call kept verbatim across grid edits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modifier {
    pub name: String,
    pub args: String,
}

impl Modifier {
    pub fn new(name: &str, args: &str) -> Self {
        Self {
            name: name.to_string(),
            args: args.to_string(),
        }
    }
}

/// One cycle of hits and rests for a single sound
#[derive(Debug, Clone, PartialEq)]
pub struct StepGrid {
    steps: Vec<bool>,
    /// Sound source name, e.g. `bd` or `bd:3`
    pub sound: String,
    /// Trigger call name (`s` or `sound`)
    pub call: String,
    /// Loop length in cycles; `Some` marks a sample-backed track
    loop_cycles: Option<u32>,
    /// Modifier chain preserved from the decoded fragment, in order
    pub modifiers: Vec<Modifier>,
}

impl StepGrid {
    /// An all-rest grid for a synthesized sound
    pub fn new(sound: &str, size: GridSize) -> Self {
        Self {
            steps: vec![false; size.steps()],
            sound: sound.to_string(),
            call: "s".to_string(),
            loop_cycles: None,
            modifiers: Vec::new(),
        }
    }

    pub fn size(&self) -> GridSize {
        if self.steps.len() == 8 {
            GridSize::Eight
        } else {
            GridSize::Sixteen
        }
    }

    pub fn steps(&self) -> &[bool] {
        &self.steps
    }

    pub fn hits(&self) -> Vec<usize> {
        self.steps
            .iter()
            .enumerate()
            .filter_map(|(i, hit)| hit.then_some(i))
            .collect()
    }

    pub fn is_hit(&self, index: usize) -> bool {
        self.steps.get(index).copied().unwrap_or(false)
    }

    pub fn set(&mut self, index: usize, hit: bool) -> SessionResult<()> {
        let len = self.steps.len();
        let cell = self.steps.get_mut(index).ok_or_else(|| {
            SessionError::InvalidInput(format!("step {} out of range (grid has {})", index, len))
        })?;
        *cell = hit;
        Ok(())
    }

    /// Flip a cell, returning its new state
    pub fn toggle(&mut self, index: usize) -> SessionResult<bool> {
        let hit = !self.is_hit(index);
        self.set(index, hit)?;
        Ok(hit)
    }

    /// Change grid length while keeping hits at the same point in the cycle
    ///
    /// Growing spreads cell `i` to `2i`; shrinking merges each pair of cells.
    pub fn resize(&mut self, size: GridSize) {
        let target = size.steps();
        let current = self.steps.len();
        if target == current {
            return;
        }

        let mut resized = vec![false; target];
        if target > current {
            let factor = target / current;
            for (i, hit) in self.steps.iter().enumerate() {
                resized[i * factor] = *hit;
            }
        } else {
            let factor = current / target;
            for (i, hit) in self.steps.iter().enumerate() {
                resized[i / factor] |= *hit;
            }
        }
        self.steps = resized;
    }

    pub fn loop_cycles(&self) -> Option<u32> {
        self.loop_cycles
    }

    pub fn is_sample_backed(&self) -> bool {
        self.loop_cycles.is_some()
    }

    /// Set the loop length, marking the grid as sample-backed
    pub fn set_loop_cycles(&mut self, cycles: u32) -> SessionResult<()> {
        if cycles == 0 {
            return Err(SessionError::InvalidInput(
                "loop length must be at least one cycle".to_string(),
            ));
        }
        self.modifiers.retain(|m| m.name != LOOP_CALL);
        self.loop_cycles = Some(cycles);
        Ok(())
    }

    /// Preserved gain argument, if the fragment carried one
    pub fn gain(&self) -> Option<&str> {
        self.modifiers
            .iter()
            .rev()
            .find(|m| m.name == "gain")
            .map(|m| m.args.as_str())
    }

    /// `x` for hits, `.` for rests
    pub fn render(&self) -> String {
        self.steps.iter().map(|hit| if *hit { 'x' } else { '.' }).collect()
    }
}

/// Decode a fragment into a grid of `size` steps, if it has a recognized shape
pub fn try_decode_grid(fragment: &str, size: GridSize) -> Option<StepGrid> {
    if fragment.trim().contains('\n') {
        return None;
    }

    let caps = CALL_RE.captures(fragment)?;
    let call = caps.get(1)?.as_str();
    let pattern = caps.get(2).or_else(|| caps.get(3))?.as_str();
    let chain = caps.get(4).map(|m| m.as_str()).unwrap_or("");

    let mut modifiers = Vec::new();
    let mut loop_cycles = None;
    for m in MODIFIER_RE.captures_iter(chain) {
        let name = m.get(1)?.as_str();
        let args = m.get(2)?.as_str().trim();
        if COMBINATORS.contains(&name) {
            return None;
        }
        if name == LOOP_CALL && loop_cycles.is_none() {
            if let Some(cycles) = args.parse::<u32>().ok().filter(|c| *c > 0) {
                loop_cycles = Some(cycles);
                continue;
            }
        }
        modifiers.push(Modifier::new(name, args));
    }

    let (sound, steps) = decode_uniform(pattern, size.steps())
        .or_else(|| decode_tokens(pattern, size.steps()))?;

    Some(StepGrid {
        steps,
        sound,
        call: call.to_string(),
        loop_cycles,
        modifiers,
    })
}

/// `bd*N`: N evenly spaced hits, the first on step 0; `bd*0` is an empty grid
fn decode_uniform(pattern: &str, len: usize) -> Option<(String, Vec<bool>)> {
    let caps = UNIFORM_RE.captures(pattern)?;
    let sound = caps.get(1)?.as_str();
    let count: usize = caps.get(2)?.as_str().parse().ok()?;
    if count > len {
        return None;
    }

    let mut steps = vec![false; len];
    for i in 0..count {
        steps[i * len / count] = true;
    }
    Some((sound.to_string(), steps))
}

/// `bd ~ bd ~`: one cell per token, truncated or rest-padded to `len`
fn decode_tokens(pattern: &str, len: usize) -> Option<(String, Vec<bool>)> {
    let mut sound: Option<&str> = None;
    let mut steps = vec![false; len];

    for (i, token) in pattern.split_whitespace().enumerate() {
        if token == REST {
            continue;
        }
        if !SOUND_TOKEN_RE.is_match(token) {
            return None;
        }
        match sound {
            Some(existing) if existing != token => return None,
            _ => sound = Some(token),
        }
        if i < len {
            steps[i] = true;
        }
    }

    sound.map(|s| (s.to_string(), steps))
}

/// Serialize a grid back into a fragment
pub fn encode_grid(grid: &StepGrid) -> String {
    let pattern = if grid.steps.iter().any(|hit| *hit) {
        let tokens: Vec<&str> = grid
            .steps
            .iter()
            .map(|hit| if *hit { grid.sound.as_str() } else { REST })
            .collect();
        tokens.join(" ")
    } else {
        format!("{}*0", grid.sound)
    };

    let mut out = format!("{}(\"{}\")", grid.call, pattern);
    if let Some(cycles) = grid.loop_cycles {
        out.push_str(&format!(".{}({})", LOOP_CALL, cycles));
    }
    for m in &grid.modifiers {
        out.push_str(&format!(".{}({})", m.name, m.args));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_repetition_spacing() {
        let grid = try_decode_grid("s(\"bd*4\")", GridSize::Sixteen).unwrap();
        assert_eq!(grid.hits(), vec![0, 4, 8, 12]);
        assert_eq!(grid.sound, "bd");

        let grid = try_decode_grid("s(\"bd*3\")", GridSize::Eight).unwrap();
        assert_eq!(grid.hits(), vec![0, 2, 5]);
    }

    #[test]
    fn test_uniform_round_trip_keeps_hits() {
        let grid = try_decode_grid("s(\"bd*4\")", GridSize::Sixteen).unwrap();
        let encoded = encode_grid(&grid);
        assert_eq!(encoded, "s(\"bd ~ ~ ~ bd ~ ~ ~ bd ~ ~ ~ bd ~ ~ ~\")");

        let again = try_decode_grid(&encoded, GridSize::Sixteen).unwrap();
        assert_eq!(again.hits(), vec![0, 4, 8, 12]);
    }

    #[test]
    fn test_token_sequence_pads_and_truncates() {
        let grid = try_decode_grid("sound('hh ~ hh ~')", GridSize::Eight).unwrap();
        assert_eq!(grid.render(), "x.x.....");
        assert_eq!(grid.call, "sound");

        let long = "s(\"cp ~ ~ ~ ~ ~ ~ ~ cp cp\")";
        let grid = try_decode_grid(long, GridSize::Eight).unwrap();
        assert_eq!(grid.hits(), vec![0]);
    }

    #[test]
    fn test_cleared_grid_keeps_sound() {
        let mut grid = try_decode_grid("s(\"bd ~ ~ ~ ~ ~ ~ ~\").gain(0.7)", GridSize::Eight).unwrap();
        grid.toggle(0).unwrap();
        let cleared = encode_grid(&grid);
        assert_eq!(cleared, "s(\"bd*0\").gain(0.7)");

        let mut again = try_decode_grid(&cleared, GridSize::Eight).unwrap();
        assert!(again.hits().is_empty());
        assert_eq!(again.sound, "bd");
        again.toggle(0).unwrap();
        assert_eq!(encode_grid(&again), "s(\"bd ~ ~ ~ ~ ~ ~ ~\").gain(0.7)");
    }

    #[test]
    fn test_rejected_shapes() {
        let rejected = [
            "s(\"bd ~ sd ~\")",
            "s(\"~ ~ ~ ~\")",
            "s(\"[bd sd]*2\")",
            "s(\"<bd hh>\")",
            "s(\"bd*32\")",
            "stack(s(\"bd\"), s(\"hh\"))",
            "s(\"bd*4\").superimpose(x => x.fast(2))",
            "s(\"bd*4\").layer(fast)",
            "s(\"bd*4\")\n.gain(0.5)",
            "note(\"c e g\").s(\"saw\")",
            "s(\"bd*4\").lpf(sine.range(200, 800))",
        ];
        for fragment in rejected {
            assert!(
                try_decode_grid(fragment, GridSize::Sixteen).is_none(),
                "{} should not be grid-editable",
                fragment
            );
        }
    }

    #[test]
    fn test_modifiers_survive_edit() {
        let mut grid =
            try_decode_grid("s(\"hh*8\").gain(0.6).room(0.3)", GridSize::Eight).unwrap();
        assert_eq!(grid.gain(), Some("0.6"));
        assert!(!grid.is_sample_backed());

        grid.toggle(1).unwrap();
        assert_eq!(
            encode_grid(&grid),
            "s(\"hh ~ hh hh hh hh hh hh\").gain(0.6).room(0.3)"
        );
    }

    #[test]
    fn test_sample_backed_loop_length() {
        let mut grid =
            try_decode_grid("s(\"break ~ ~ ~\").gain(0.9).loopAt(2)", GridSize::Eight).unwrap();
        assert_eq!(grid.loop_cycles(), Some(2));
        assert_eq!(grid.modifiers, vec![Modifier::new("gain", "0.9")]);

        grid.set_loop_cycles(4).unwrap();
        assert_eq!(
            encode_grid(&grid),
            "s(\"break ~ ~ ~ ~ ~ ~ ~\").loopAt(4).gain(0.9)"
        );
        assert!(grid.set_loop_cycles(0).is_err());
    }

    #[test]
    fn test_non_integer_loop_is_kept_verbatim() {
        let mut grid = try_decode_grid("s(\"br*2\").loopAt(1.5)", GridSize::Eight).unwrap();
        assert_eq!(grid.loop_cycles(), None);
        assert_eq!(encode_grid(&grid), "s(\"br ~ ~ ~ br ~ ~ ~\").loopAt(1.5)");

        grid.set_loop_cycles(2).unwrap();
        assert_eq!(encode_grid(&grid), "s(\"br ~ ~ ~ br ~ ~ ~\").loopAt(2)");
    }

    #[test]
    fn test_resize_preserves_timing() {
        let mut grid = StepGrid::new("bd", GridSize::Eight);
        grid.set(0, true).unwrap();
        grid.set(2, true).unwrap();

        grid.resize(GridSize::Sixteen);
        assert_eq!(grid.hits(), vec![0, 4]);

        grid.set(5, true).unwrap();
        grid.resize(GridSize::Eight);
        assert_eq!(grid.hits(), vec![0, 2]);
        assert_eq!(grid.size(), GridSize::Eight);
    }

    #[test]
    fn test_toggle_out_of_range() {
        let mut grid = StepGrid::new("bd", GridSize::Eight);
        assert!(grid.toggle(8).is_err());
        assert_eq!(grid.toggle(7).unwrap(), true);
        assert_eq!(grid.toggle(7).unwrap(), false);
    }
}
