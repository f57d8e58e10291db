//! # Loopdeck - Live Pattern Session Engine
//!
//! Loopdeck keeps a set of named pattern fragments ("tracks") playing on an
//! external Strudel-style pattern runtime. Tracks are started, stopped, edited
//! and re-tempoed independently; after every change the whole set is combined
//! into one program and pushed to the runtime in a single evaluation, so what
//! you hear always matches the tracks that are active.
//!
//! ## Core Features
//!
//! - **Deterministic playback**: the runtime program depends only on the active
//!   tracks, never on the order of operations that produced them
//! - **Tempo directives**: `setcps(..)` / `setcpm(..)` lines are hoisted so the
//!   combined program carries exactly one
//! - **Relative tempo**: 10-400% of the reference track's declared base tempo
//! - **Effect parameters**: `.gain(0.8)`-style literals exposed as sliders and
//!   rewritten in place
//! - **Step grids**: simple `s("bd*4")` patterns exposed as 8 or 16 step grids
//! - **Remote control**: REPL, OSC control listener and file watching
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐ ┌─────────────┐ ┌──────────────┐
//! │   REPL    │ │ OSC control │ │ File watcher │
//! └─────┬─────┘ └──────┬──────┘ └──────┬───────┘
//!       └──────────────┼───────────────┘
//!                      ▼ SessionCommand
//!              ┌────────────────┐      ┌────────────────────┐
//!              │ CommandHandler │─────▶│ PatternCollection  │
//!              └───────┬────────┘      └────────────────────┘
//!                      ▼
//!              ┌────────────────┐  params / step_grid / tempo
//!              │ SessionEngine  │  pattern_store / combine
//!              └───────┬────────┘
//!                      ▼ EvalRuntime
//!              ┌────────────────┐
//!              │ pattern runtime│ (OSC, dry run, mock)
//!              └────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use loopdeck::combine::combine_program;
//! use loopdeck::params::rewrite_param_at;
//! use loopdeck::step_grid::{encode_grid, try_decode_grid, GridSize};
//!
//! // Two tracks become one parallel program
//! let program = combine_program(["s(\"bd*4\")", "s(\"hh*8\")"], None).unwrap();
//! assert_eq!(program, "stack(\n  (s(\"bd*4\")),\n  (s(\"hh*8\"))\n)");
//!
//! // Only the numeric literal changes
//! let edited = rewrite_param_at("s(\"bd\").gain(0.5).room(0.2)", 1, 0.9).unwrap();
//! assert_eq!(edited, "s(\"bd\").gain(0.5).room(0.9)");
//!
//! // Toggle a step and write the fragment back
//! let mut grid = try_decode_grid("s(\"bd*2\")", GridSize::Eight).unwrap();
//! grid.toggle(2).unwrap();
//! assert_eq!(encode_grid(&grid), "s(\"bd ~ bd ~ bd ~ ~ ~\")");
//! ```
//!
//! ## See Also
//!
//! - [Strudel](https://strudel.cc/) - Browser-based live coding
//! - [Tidal Cycles](https://tidalcycles.org/) - Pattern language inspiration

pub mod collection;
pub mod combine;
pub mod command;
pub mod config;
pub mod error;
pub mod generator;
pub mod osc_control;
pub mod params;
pub mod pattern_store;
pub mod repl;
pub mod runtime;
pub mod session;
pub mod step_grid;
pub mod tempo;
pub mod watch;

pub use error::{SessionError, SessionResult};
pub use runtime::EvalRuntime;
pub use session::{Rebuild, SessionEngine};
