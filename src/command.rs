//! Session commands
//!
//! A small textual command language shared by the REPL, the OSC control
//! listener and the file watcher. Parsing produces [`SessionCommand`] values;
//! [`CommandHandler`] applies them to a session and returns a line of output.

use crate::collection::PatternCollection;
use crate::error::{SessionError, SessionResult};
use crate::generator::PatternGenerator;
use crate::params::{extract_params, format_number};
use crate::runtime::EvalRuntime;
use crate::session::{Rebuild, SessionEngine};
use crate::step_grid::{GridSize, StepGrid};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

pub const HELP: &str = "\
commands:
  play <id>                 start a pattern from the collection
  solo <id>                 start a pattern, stopping all others
  eval <id> <code>          play inline code as track <id>
  stop <id>                 stop one track
  stopall                   stop every track
  hush                      stop everything and reset tempo bookkeeping
  tempo <percent>           tempo relative to the reference track (10-400)
  params <id>               list effect parameters of a track
  param <id> <n> <value>    set the n-th effect parameter
  grid <id>                 show a track's step grid
  step <id> <n>             toggle step n
  steps <id> <8|16>         change the grid length
  loop <id> <cycles>        set the loop length of a sample track
  gen <id> <prompt>         generate a pattern and play it
  code                      print the combined program
  status                    list playing tracks
  list                      list the pattern collection
  help                      this text
  quit                      leave";

/// One user-level session action
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Play { id: String, exclusive: bool },
    Eval { id: String, code: String },
    Stop { id: String },
    StopAll,
    Hush,
    Tempo { percent: f64 },
    Params { id: String },
    Param { id: String, index: usize, value: f64 },
    Grid { id: String },
    Step { id: String, index: usize },
    Steps { id: String, size: GridSize },
    Loop { id: String, cycles: u32 },
    Generate { id: String, prompt: String },
    Code,
    Status,
    List,
    Help,
    Quit,
}

impl SessionCommand {
    /// Parse one input line; blank lines and `#` comments give `None`
    pub fn parse(line: &str) -> SessionResult<Option<SessionCommand>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let args: Vec<&str> = rest.split_whitespace().collect();

        let command = match verb {
            "play" | "solo" => SessionCommand::Play {
                id: one_arg(verb, &args)?,
                exclusive: verb == "solo",
            },
            "eval" => {
                let (id, code) = id_and_text(verb, rest)?;
                SessionCommand::Eval { id, code }
            }
            "stop" => SessionCommand::Stop {
                id: one_arg(verb, &args)?,
            },
            "stopall" => SessionCommand::StopAll,
            "hush" => SessionCommand::Hush,
            "tempo" => SessionCommand::Tempo {
                percent: parse_arg(verb, &args, 0, "percent")?,
            },
            "params" => SessionCommand::Params {
                id: one_arg(verb, &args)?,
            },
            "param" => SessionCommand::Param {
                id: arg(verb, &args, 0, "id")?.to_string(),
                index: parse_arg(verb, &args, 1, "index")?,
                value: parse_arg(verb, &args, 2, "value")?,
            },
            "grid" => SessionCommand::Grid {
                id: one_arg(verb, &args)?,
            },
            "step" => SessionCommand::Step {
                id: arg(verb, &args, 0, "id")?.to_string(),
                index: parse_arg(verb, &args, 1, "index")?,
            },
            "steps" => {
                let steps: usize = parse_arg(verb, &args, 1, "8|16")?;
                SessionCommand::Steps {
                    id: arg(verb, &args, 0, "id")?.to_string(),
                    size: GridSize::from_steps(steps).ok_or_else(|| {
                        SessionError::InvalidInput(format!("grid must have 8 or 16 steps, got {}", steps))
                    })?,
                }
            }
            "loop" => SessionCommand::Loop {
                id: arg(verb, &args, 0, "id")?.to_string(),
                cycles: parse_arg(verb, &args, 1, "cycles")?,
            },
            "gen" => {
                let (id, prompt) = id_and_text(verb, rest)?;
                SessionCommand::Generate { id, prompt }
            }
            "code" => SessionCommand::Code,
            "status" => SessionCommand::Status,
            "list" => SessionCommand::List,
            "help" | "?" => SessionCommand::Help,
            "quit" | "exit" => SessionCommand::Quit,
            other => {
                return Err(SessionError::InvalidInput(format!(
                    "unknown command '{}' (try 'help')",
                    other
                )))
            }
        };

        Ok(Some(command))
    }
}

fn arg<'a>(verb: &str, args: &[&'a str], index: usize, name: &str) -> SessionResult<&'a str> {
    args.get(index)
        .copied()
        .ok_or_else(|| SessionError::InvalidInput(format!("{}: missing <{}>", verb, name)))
}

fn one_arg(verb: &str, args: &[&str]) -> SessionResult<String> {
    arg(verb, args, 0, "id").map(str::to_string)
}

fn parse_arg<T: std::str::FromStr>(verb: &str, args: &[&str], index: usize, name: &str) -> SessionResult<T> {
    let raw = arg(verb, args, index, name)?;
    raw.parse()
        .map_err(|_| SessionError::InvalidInput(format!("{}: bad <{}> '{}'", verb, name, raw)))
}

/// `<id> <free text>` where the text keeps its inner spacing
fn id_and_text(verb: &str, rest: &str) -> SessionResult<(String, String)> {
    match rest.split_once(char::is_whitespace) {
        Some((id, text)) if !text.trim().is_empty() => Ok((id.to_string(), text.trim().to_string())),
        _ => Err(SessionError::InvalidInput(format!("{}: expected <id> <text>", verb))),
    }
}

/// Applies commands to one session
pub struct CommandHandler<R: EvalRuntime> {
    engine: SessionEngine<R>,
    collection: PatternCollection,
    generator: Option<PatternGenerator>,
    default_grid: GridSize,
    /// Grid length chosen per track with `steps`
    grid_sizes: Mutex<HashMap<String, GridSize>>,
}

impl<R: EvalRuntime> CommandHandler<R> {
    pub fn new(
        engine: SessionEngine<R>,
        collection: PatternCollection,
        generator: Option<PatternGenerator>,
        default_grid: GridSize,
    ) -> Self {
        Self {
            engine,
            collection,
            generator,
            default_grid,
            grid_sizes: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &SessionEngine<R> {
        &self.engine
    }

    /// Grid size used for `id`: its last `steps` choice, else the default
    pub fn grid_size(&self, id: &str) -> GridSize {
        self.grid_sizes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .copied()
            .unwrap_or(self.default_grid)
    }

    fn editable_grid(&self, id: &str) -> SessionResult<StepGrid> {
        self.engine.grid(id, self.grid_size(id))?.ok_or_else(|| {
            SessionError::Codec(format!("track {} is not grid-editable; edit its code instead", id))
        })
    }

    /// Run one command and describe the result
    pub async fn execute(&self, command: SessionCommand) -> SessionResult<String> {
        info!("Command: {:?}", command);
        match command {
            SessionCommand::Play { id, exclusive } => {
                let record = self.collection.require(&id)?;
                let rebuild = self.engine.play_record(record, exclusive).await?;
                Ok(describe(&format!("playing {}", id), rebuild))
            }
            SessionCommand::Eval { id, code } => {
                let rebuild = self.engine.play_track(&id, &code, false, None).await?;
                Ok(describe(&format!("evaluated {}", id), rebuild))
            }
            SessionCommand::Stop { id } => {
                let rebuild = self.engine.stop_track(&id).await?;
                Ok(describe(&format!("stopped {}", id), rebuild))
            }
            SessionCommand::StopAll => {
                let rebuild = self.engine.stop_all().await?;
                Ok(describe("stopped all", rebuild))
            }
            SessionCommand::Hush => {
                let rebuild = self.engine.hush().await?;
                self.grid_sizes.lock().unwrap_or_else(|e| e.into_inner()).clear();
                Ok(describe("hushed", rebuild))
            }
            SessionCommand::Tempo { percent } => {
                let cps = self.engine.set_tempo(percent)?;
                Ok(format!("tempo {}% ({} cps)", format_number(percent), format_number(cps)))
            }
            SessionCommand::Params { id } => {
                let fragment = self.engine.fragment(&id).ok_or_else(|| {
                    SessionError::InvalidInput(format!("track {} is not playing", id))
                })?;
                Ok(render_params(&fragment))
            }
            SessionCommand::Param { id, index, value } => {
                let rebuild = self.engine.adjust_param(&id, index, value).await?;
                Ok(describe(
                    &format!("{} param {} = {}", id, index, format_number(value)),
                    rebuild,
                ))
            }
            SessionCommand::Grid { id } => {
                let grid = self.editable_grid(&id)?;
                Ok(render_grid(&id, &grid))
            }
            SessionCommand::Step { id, index } => {
                let mut grid = self.editable_grid(&id)?;
                grid.toggle(index)?;
                self.engine.apply_grid(&id, &grid).await?;
                Ok(render_grid(&id, &grid))
            }
            SessionCommand::Steps { id, size } => {
                let mut grid = self.editable_grid(&id)?;
                grid.resize(size);
                self.engine.apply_grid(&id, &grid).await?;
                self.grid_sizes
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(id.clone(), size);
                Ok(render_grid(&id, &grid))
            }
            SessionCommand::Loop { id, cycles } => {
                let mut grid = self.editable_grid(&id)?;
                if !grid.is_sample_backed() {
                    return Err(SessionError::InvalidInput(format!(
                        "track {} has no loop length; only sample tracks do",
                        id
                    )));
                }
                grid.set_loop_cycles(cycles)?;
                self.engine.apply_grid(&id, &grid).await?;
                Ok(render_grid(&id, &grid))
            }
            SessionCommand::Generate { id, prompt } => {
                let generator = self.generator.as_ref().ok_or_else(|| {
                    SessionError::Generator("no generator command configured".to_string())
                })?;
                let fragment = generator.generate(&prompt).await?;
                let rebuild = self.engine.play_track(&id, &fragment, false, None).await?;
                Ok(describe(&format!("{} = {}", id, fragment), rebuild))
            }
            SessionCommand::Code => Ok(self
                .engine
                .combined_program()
                .unwrap_or_else(|| "-- silence".to_string())),
            SessionCommand::Status => {
                let ids = self.engine.active_ids();
                if ids.is_empty() {
                    Ok("nothing playing".to_string())
                } else {
                    Ok(format!(
                        "playing: {} @ {} cps ({}%)",
                        ids.join(", "),
                        format_number(self.engine.global_tempo_cps()),
                        format_number(self.engine.tempo_percent())
                    ))
                }
            }
            SessionCommand::List => {
                let lines: Vec<String> = self
                    .collection
                    .list()
                    .iter()
                    .map(|r| {
                        let marker = if self.engine.is_active(&r.id) { "*" } else { " " };
                        format!("{} {:<12} {}", marker, r.id, r.display_name)
                    })
                    .collect();
                if lines.is_empty() {
                    Ok(format!("collection {} is empty", self.collection.path().display()))
                } else {
                    Ok(lines.join("\n"))
                }
            }
            SessionCommand::Help => Ok(HELP.to_string()),
            SessionCommand::Quit => Ok("bye".to_string()),
        }
    }
}

fn describe(action: &str, rebuild: Rebuild) -> String {
    match rebuild {
        Rebuild::Evaluated { .. } => action.to_string(),
        Rebuild::Silenced { .. } => format!("{} (silence)", action),
        Rebuild::Skipped { .. } | Rebuild::Superseded { .. } => {
            format!("{} (overtaken by a newer change)", action)
        }
    }
}

/// One line per parameter: index, effect, value and slider range
pub fn render_params(fragment: &str) -> String {
    let params = extract_params(fragment);
    if params.is_empty() {
        return "no adjustable parameters".to_string();
    }
    params
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let spec = p.effect.spec();
            format!(
                "{:>2} {:<10} {:>8}   [{} .. {} step {}]",
                i,
                p.effect,
                format_number(p.value),
                format_number(spec.min),
                format_number(spec.max),
                format_number(spec.step)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Grid as `id  sound  x...x...` plus loop length when sample-backed
pub fn render_grid(id: &str, grid: &StepGrid) -> String {
    let mut line = format!("{}  {}  {}", id, grid.sound, grid.render());
    if let Some(cycles) = grid.loop_cycles() {
        line.push_str(&format!("  loop {}", cycles));
    }
    if let Some(gain) = grid.gain() {
        line.push_str(&format!("  gain {}", gain));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_commands() {
        assert_eq!(
            SessionCommand::parse("solo kick").unwrap(),
            Some(SessionCommand::Play {
                id: "kick".to_string(),
                exclusive: true
            })
        );
        assert_eq!(
            SessionCommand::parse("  param hats 1 0.25 ").unwrap(),
            Some(SessionCommand::Param {
                id: "hats".to_string(),
                index: 1,
                value: 0.25
            })
        );
        assert_eq!(SessionCommand::parse("# comment").unwrap(), None);
        assert_eq!(SessionCommand::parse("").unwrap(), None);
    }

    #[test]
    fn test_parse_eval_keeps_code_spacing() {
        assert_eq!(
            SessionCommand::parse("eval bass note(\"c2  eb2\").s(\"sawtooth\")").unwrap(),
            Some(SessionCommand::Eval {
                id: "bass".to_string(),
                code: "note(\"c2  eb2\").s(\"sawtooth\")".to_string()
            })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(SessionCommand::parse("play").is_err());
        assert!(SessionCommand::parse("tempo fast").is_err());
        assert!(SessionCommand::parse("steps kick 12").is_err());
        assert!(SessionCommand::parse("eval kick").is_err());
        assert!(SessionCommand::parse("dance").is_err());
    }

    #[test]
    fn test_render_params() {
        let text = render_params("s(\"bd\").gain(0.5).cutoff(800)");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("gain"));
        assert!(lines[1].contains("[50 .. 10000 step 10]"));
    }
}
