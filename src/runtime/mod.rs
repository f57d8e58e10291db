//! Evaluation Runtime Seam
//!
//! The session engine never produces sound itself. It hands combined programs
//! to an external pattern runtime through [`EvalRuntime`].
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  SessionEngine: store, tempo, rebuild gate   │
//! └──────────────────────────────────────────────┘
//!                        │ evaluate / stop / set_tempo / preload_sample
//!                        ▼
//! ┌──────────────┬───────────────┬───────────────┐
//! │  OscRuntime  │ PrintRuntime  │  MockRuntime  │
//! │  (UDP/OSC)   │  (dry run)    │  (tests)      │
//! └──────────────┴───────────────┴───────────────┘
//! ```

use std::future::Future;

pub mod mock_runtime;
pub mod osc_runtime;
pub mod print_runtime;

pub use mock_runtime::{MockRuntime, RuntimeCall};
pub use osc_runtime::OscRuntime;
pub use print_runtime::PrintRuntime;

/// External pattern-evaluation and audio-output runtime
///
/// Errors are plain messages from the collaborator; the session wraps them
/// into [`crate::error::SessionError`] variants.
pub trait EvalRuntime: Send + Sync {
    /// Evaluate a complete program
    ///
    /// `reset_all` asks the runtime to drop every previously scheduled pattern,
    /// `hush_first` to silence before the new program starts.
    fn evaluate(
        &self,
        program: &str,
        reset_all: bool,
        hush_first: bool,
    ) -> impl Future<Output = Result<(), String>> + Send;

    /// Silence all output
    fn stop(&self) -> Result<(), String>;

    /// Set the absolute tempo in cycles per second
    fn set_tempo(&self, cps: f64) -> Result<(), String>;

    /// Make a sample available before a program refers to it
    fn preload_sample(&self, url: &str) -> impl Future<Output = Result<(), String>> + Send;
}
