//! Mock Runtime for Testing
//!
//! Records every call made by the session and lets tests script failures and
//! slow evaluations. Clones share state, so a test can keep a handle after
//! moving one into the engine.

use super::EvalRuntime;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// A call observed by the mock
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeCall {
    Evaluate {
        program: String,
        reset_all: bool,
        hush_first: bool,
    },
    Stop,
    SetTempo(f64),
    Preload(String),
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<RuntimeCall>,
    /// Program currently "sounding"; `None` after stop
    current: Option<String>,
    cps: Option<f64>,
    fail_evaluations: VecDeque<String>,
    slow_evaluations: VecDeque<usize>,
    failing_urls: HashSet<String>,
    fail_stop: Option<String>,
    fail_tempo: Option<String>,
}

/// Deterministic stand-in for the pattern runtime
#[derive(Debug, Clone, Default)]
pub struct MockRuntime {
    state: Arc<Mutex<MockState>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next evaluation fail with `message`
    pub fn fail_next_evaluate(&self, message: &str) {
        self.lock().fail_evaluations.push_back(message.to_string());
    }

    /// Make the next evaluation yield to the scheduler `yields` times before it lands
    pub fn slow_next_evaluate(&self, yields: usize) {
        self.lock().slow_evaluations.push_back(yields);
    }

    /// Make every preload of `url` fail
    pub fn fail_preload(&self, url: &str) {
        self.lock().failing_urls.insert(url.to_string());
    }

    pub fn fail_stop(&self, message: &str) {
        self.lock().fail_stop = Some(message.to_string());
    }

    pub fn fail_tempo(&self, message: &str) {
        self.lock().fail_tempo = Some(message.to_string());
    }

    /// Undo `fail_stop`, `fail_tempo` and `fail_preload`
    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.fail_stop = None;
        state.fail_tempo = None;
        state.failing_urls.clear();
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.lock().calls.clone()
    }

    /// Programs passed to `evaluate`, in call order
    pub fn programs(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                RuntimeCall::Evaluate { program, .. } => Some(program.clone()),
                _ => None,
            })
            .collect()
    }

    /// The program the runtime would be playing right now
    pub fn current_program(&self) -> Option<String> {
        self.lock().current.clone()
    }

    pub fn is_silent(&self) -> bool {
        self.lock().current.is_none()
    }

    pub fn cps(&self) -> Option<f64> {
        self.lock().cps
    }

    pub fn stop_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, RuntimeCall::Stop))
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

impl EvalRuntime for MockRuntime {
    async fn evaluate(&self, program: &str, reset_all: bool, hush_first: bool) -> Result<(), String> {
        let yields = {
            let mut state = self.lock();
            state.calls.push(RuntimeCall::Evaluate {
                program: program.to_string(),
                reset_all,
                hush_first,
            });
            state.slow_evaluations.pop_front().unwrap_or(0)
        };

        for _ in 0..yields {
            tokio::task::yield_now().await;
        }

        let mut state = self.lock();
        if let Some(message) = state.fail_evaluations.pop_front() {
            return Err(message);
        }
        state.current = Some(program.to_string());
        Ok(())
    }

    fn stop(&self) -> Result<(), String> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Stop);
        if let Some(message) = state.fail_stop.clone() {
            return Err(message);
        }
        state.current = None;
        Ok(())
    }

    fn set_tempo(&self, cps: f64) -> Result<(), String> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::SetTempo(cps));
        if let Some(message) = state.fail_tempo.clone() {
            return Err(message);
        }
        state.cps = Some(cps);
        Ok(())
    }

    async fn preload_sample(&self, url: &str) -> Result<(), String> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Preload(url.to_string()));
        if state.failing_urls.contains(url) {
            return Err(format!("could not fetch {}", url));
        }
        Ok(())
    }
}
