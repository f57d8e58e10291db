//! Session engine
//!
//! Single source of truth for what should be audible. Every mutating call
//! updates the pattern store synchronously, then pushes one freshly combined
//! program to the runtime with "replace everything" flags. The active tracks,
//! not the history of calls, decide what is playing.
//!
//! Rebuilds are numbered. Pushes go through a gate one at a time; a push whose
//! number is no longer the newest by the time it reaches the gate is skipped,
//! and one that was overtaken while the runtime was evaluating is reported as
//! superseded.

use crate::collection::PatternRecord;
use crate::combine::combine_program;
use crate::error::{SessionError, SessionResult};
use crate::params::rewrite_param_at;
use crate::pattern_store::{PatternStore, Track};
use crate::runtime::EvalRuntime;
use crate::step_grid::{encode_grid, try_decode_grid, GridSize, StepGrid};
use crate::tempo::{bpm_to_cps, strip_tempo_directive, TempoController, TempoDirective};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// What happened to a rebuild's runtime push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rebuild {
    /// The combined program was evaluated and is the newest one
    Evaluated { generation: u64 },
    /// No tracks remain; the runtime was silenced
    Silenced { generation: u64 },
    /// A newer rebuild was queued before this one reached the runtime
    Skipped { generation: u64 },
    /// Evaluated, but a newer rebuild happened meanwhile; its result was dropped
    Superseded { generation: u64 },
}

impl Rebuild {
    pub fn generation(&self) -> u64 {
        match self {
            Rebuild::Evaluated { generation }
            | Rebuild::Silenced { generation }
            | Rebuild::Skipped { generation }
            | Rebuild::Superseded { generation } => *generation,
        }
    }
}

/// A rebuild prepared under the state lock, pushed after it is released
struct PendingRebuild {
    generation: u64,
    program: Option<String>,
    /// Sent to the runtime after the program, so a directive inside the
    /// program cannot undo a tempo percent other than 100
    tempo_cps: Option<f64>,
}

struct SessionState {
    store: PatternStore,
    tempo: TempoController,
    global_tempo_cps: f64,
    /// Rebuild counter; never reset
    generation: u64,
    /// Ordering for directive recency and tempo reference; reset by hush
    seq: u64,
}

impl SessionState {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Directive of the active track that supplied one most recently
    fn pending_directive(&self) -> Option<&TempoDirective> {
        self.store
            .tracks()
            .filter(|t| t.directive.is_some())
            .max_by_key(|t| t.directive_seq)
            .and_then(|t| t.directive.as_ref())
    }

    /// Base tempo of the most recently played track that declares one
    fn reference_base_cps(&self) -> Option<f64> {
        self.store
            .tracks()
            .filter(|t| t.base_cps.is_some())
            .max_by_key(|t| t.played_seq)
            .and_then(|t| t.base_cps)
    }

    fn combined_program(&self) -> Option<String> {
        combine_program(
            self.store.values(),
            self.pending_directive().map(|d| d.text.as_str()),
        )
    }

    fn prepare_rebuild(&mut self) -> PendingRebuild {
        self.generation += 1;
        let mut tempo_cps = None;
        if !self.store.is_empty() && self.tempo.percent() != 100.0 {
            let cps = self.tempo.cps_for(self.reference_base_cps());
            self.global_tempo_cps = cps;
            tempo_cps = Some(cps);
        } else if let Some(cps) = self.pending_directive().and_then(|d| d.cps) {
            self.global_tempo_cps = cps;
        }
        PendingRebuild {
            generation: self.generation,
            program: self.combined_program(),
            tempo_cps,
        }
    }

    /// Replace a track's code, stripping and recording any tempo directive
    fn store_fragment(&mut self, id: &str, fragment: &str, base_cps: Option<f64>, played: bool) -> SessionResult<()> {
        let (directive, body) = strip_tempo_directive(fragment);
        if body.trim().is_empty() {
            return Err(SessionError::InvalidInput(format!(
                "track {} has no pattern besides its tempo line",
                id
            )));
        }

        let previous = self.store.get(id).cloned();
        let mut track = Track::new(id, &body);
        track.directive_seq = if directive.is_some() { self.next_seq() } else { 0 };
        track.base_cps = base_cps
            .or_else(|| directive.as_ref().and_then(|d| d.cps))
            .or_else(|| previous.as_ref().and_then(|t| t.base_cps));
        track.directive = directive;
        track.played_seq = match (&previous, played) {
            (Some(prev), false) => prev.played_seq,
            _ => self.next_seq(),
        };

        self.store.set_track(track);
        Ok(())
    }
}

/// Owns the pattern store and drives the evaluation runtime
///
/// Construct one per session and pass it by reference; there is no global
/// instance.
pub struct SessionEngine<R: EvalRuntime> {
    runtime: R,
    state: Mutex<SessionState>,
    push_gate: tokio::sync::Mutex<()>,
}

impl<R: EvalRuntime> SessionEngine<R> {
    pub fn new(runtime: R, default_cps: f64) -> Self {
        let tempo = TempoController::new(default_cps);
        let global_tempo_cps = tempo.default_cps();
        Self {
            runtime,
            state: Mutex::new(SessionState {
                store: PatternStore::new(),
                tempo,
                global_tempo_cps,
                generation: 0,
                seq: 0,
            }),
            push_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start (or replace) a track and rebuild
    ///
    /// With `exclusive`, every other track is dropped first. A `sample_url` is
    /// preloaded before anything changes; if that fails the session is left
    /// exactly as it was.
    pub async fn play_track(
        &self,
        id: &str,
        fragment: &str,
        exclusive: bool,
        sample_url: Option<&str>,
    ) -> SessionResult<Rebuild> {
        self.play_with_base(id, fragment, exclusive, sample_url, None)
            .await
    }

    /// Play a collection record, registering its declared base tempo
    pub async fn play_record(&self, record: &PatternRecord, exclusive: bool) -> SessionResult<Rebuild> {
        self.play_with_base(
            &record.id,
            &record.fragment,
            exclusive,
            record.sample_url.as_deref(),
            record.base_tempo.map(bpm_to_cps),
        )
        .await
    }

    async fn play_with_base(
        &self,
        id: &str,
        fragment: &str,
        exclusive: bool,
        sample_url: Option<&str>,
        base_cps: Option<f64>,
    ) -> SessionResult<Rebuild> {
        validate_id(id)?;
        if fragment.trim().is_empty() {
            return Err(SessionError::InvalidInput(format!(
                "track {} needs a non-empty fragment",
                id
            )));
        }
        if strip_tempo_directive(fragment).1.trim().is_empty() {
            return Err(SessionError::InvalidInput(format!(
                "track {} has no pattern besides its tempo line",
                id
            )));
        }

        if let Some(url) = sample_url {
            if url.trim().is_empty() {
                return Err(SessionError::InvalidInput(
                    "sample url must not be empty".to_string(),
                ));
            }
            self.runtime.preload_sample(url).await.map_err(|message| {
                warn!("Preload of {} failed: {}", url, message);
                SessionError::Preload {
                    url: url.to_string(),
                    message,
                }
            })?;
            debug!("Preloaded {}", url);
        }

        let pending = {
            let mut state = self.lock_state();
            if exclusive {
                state.store.clear();
            }
            state.store_fragment(id, fragment, base_cps, true)?;
            info!(
                "Playing track {} ({} active{})",
                id,
                state.store.len(),
                if exclusive { ", exclusive" } else { "" }
            );
            state.prepare_rebuild()
        };

        self.push(pending).await
    }

    /// Stop one track; silences the runtime when it was the last one
    pub async fn stop_track(&self, id: &str) -> SessionResult<Rebuild> {
        let pending = {
            let mut state = self.lock_state();
            if state.store.remove_fragment(id).is_some() {
                info!("Stopped track {} ({} remain)", id, state.store.len());
            } else {
                debug!("Stop for inactive track {}", id);
            }
            state.prepare_rebuild()
        };

        self.push(pending).await
    }

    /// Drop every track and silence the runtime
    pub async fn stop_all(&self) -> SessionResult<Rebuild> {
        let pending = {
            let mut state = self.lock_state();
            state.store.clear();
            info!("Stopped all tracks");
            state.prepare_rebuild()
        };

        self.push(pending).await
    }

    /// Like [`stop_all`](Self::stop_all), and also forget tempo bookkeeping
    /// so the next play starts from a clean slate
    pub async fn hush(&self) -> SessionResult<Rebuild> {
        let pending = {
            let mut state = self.lock_state();
            state.store.clear();
            state.tempo.reset();
            state.seq = 0;
            info!("Hush");
            let mut pending = state.prepare_rebuild();
            let cps = state.tempo.cps_for(None);
            state.global_tempo_cps = cps;
            pending.tempo_cps = Some(cps);
            pending
        };

        self.push(pending).await
    }

    /// Set tempo as a percentage of the reference track's base tempo
    ///
    /// Only the runtime's cps changes; the combined program text does not.
    /// Returns the absolute cps that was sent.
    pub fn set_tempo(&self, percent: f64) -> SessionResult<f64> {
        let mut state = self.lock_state();

        let mut tempo = state.tempo.clone();
        tempo.set_percent(percent)?;
        let cps = tempo.cps_for(state.reference_base_cps());

        self.runtime
            .set_tempo(cps)
            .map_err(|e| SessionError::Runtime(format!("set tempo failed: {}", e)))?;

        state.tempo = tempo;
        state.global_tempo_cps = cps;
        info!("Tempo {}% -> {:.4} cps", percent, cps);
        Ok(cps)
    }

    /// Replace the code of a playing track
    ///
    /// When the runtime rejects the result, the edit stays stored so it can
    /// be corrected.
    pub async fn edit_fragment(&self, id: &str, fragment: &str) -> SessionResult<Rebuild> {
        let pending = {
            let mut state = self.lock_state();
            require_active(&state, id)?;
            state.store_fragment(id, fragment, None, false)?;
            debug!("Edited track {}", id);
            state.prepare_rebuild()
        };

        self.push(pending).await
    }

    /// Rewrite the `index`-th effect parameter of a playing track
    pub async fn adjust_param(&self, id: &str, index: usize, value: f64) -> SessionResult<Rebuild> {
        let pending = {
            let mut state = self.lock_state();
            let track = require_active(&state, id)?;
            let rewritten = rewrite_param_at(&track.fragment, index, value)?;
            if let Some(track) = state.store.get_mut(id) {
                track.fragment = rewritten;
            }
            debug!("Track {} parameter {} = {}", id, index, value);
            state.prepare_rebuild()
        };

        self.push(pending).await
    }

    /// Grid view of a playing track, if its fragment is grid-editable
    pub fn grid(&self, id: &str, size: GridSize) -> SessionResult<Option<StepGrid>> {
        let state = self.lock_state();
        let track = require_active(&state, id)?;
        Ok(try_decode_grid(&track.fragment, size))
    }

    /// Store an edited grid as the track's code; its tempo directive is kept
    pub async fn apply_grid(&self, id: &str, grid: &StepGrid) -> SessionResult<Rebuild> {
        let encoded = encode_grid(grid);
        let pending = {
            let mut state = self.lock_state();
            require_active(&state, id)?;
            if let Some(track) = state.store.get_mut(id) {
                track.fragment = encoded;
            }
            debug!("Track {} grid {}", id, grid.render());
            state.prepare_rebuild()
        };

        self.push(pending).await
    }

    /// The program the runtime should currently be playing
    pub fn combined_program(&self) -> Option<String> {
        self.lock_state().combined_program()
    }

    pub fn active_ids(&self) -> Vec<String> {
        self.lock_state().store.ids().map(str::to_string).collect()
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.lock_state().store.contains(id)
    }

    pub fn is_playing(&self) -> bool {
        !self.lock_state().store.is_empty()
    }

    pub fn fragment(&self, id: &str) -> Option<String> {
        self.lock_state().store.get(id).map(|t| t.fragment.clone())
    }

    pub fn global_tempo_cps(&self) -> f64 {
        self.lock_state().global_tempo_cps
    }

    pub fn tempo_percent(&self) -> f64 {
        self.lock_state().tempo.percent()
    }

    pub fn generation(&self) -> u64 {
        self.lock_state().generation
    }

    /// Push a prepared rebuild to the runtime
    async fn push(&self, pending: PendingRebuild) -> SessionResult<Rebuild> {
        let generation = pending.generation;
        let _gate = self.push_gate.lock().await;

        if self.generation() != generation {
            debug!("Skipping rebuild {}: superseded before push", generation);
            return Ok(Rebuild::Skipped { generation });
        }

        let program = match pending.program {
            Some(program) => program,
            None => {
                self.runtime
                    .stop()
                    .map_err(|e| SessionError::Runtime(format!("stop failed: {}", e)))?;
                self.push_tempo(pending.tempo_cps)?;
                info!("Silenced (rebuild {})", generation);
                return Ok(Rebuild::Silenced { generation });
            }
        };

        let result = self.runtime.evaluate(&program, true, true).await;

        if self.generation() != generation {
            debug!("Dropping result of rebuild {}: superseded", generation);
            return Ok(Rebuild::Superseded { generation });
        }

        match result {
            Ok(()) => {
                debug!("Evaluated rebuild {} ({} bytes)", generation, program.len());
                self.push_tempo(pending.tempo_cps)?;
                Ok(Rebuild::Evaluated { generation })
            }
            Err(message) => {
                warn!("Rebuild {} rejected by runtime: {}", generation, message);
                Err(SessionError::Evaluation(message))
            }
        }
    }

    fn push_tempo(&self, cps: Option<f64>) -> SessionResult<()> {
        if let Some(cps) = cps {
            self.runtime
                .set_tempo(cps)
                .map_err(|e| SessionError::Runtime(format!("tempo change failed: {}", e)))?;
            debug!("Re-sent tempo {:.4} cps", cps);
        }
        Ok(())
    }
}

fn validate_id(id: &str) -> SessionResult<()> {
    if id.trim().is_empty() {
        return Err(SessionError::InvalidInput(
            "track id must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn require_active<'a>(state: &'a SessionState, id: &str) -> SessionResult<&'a Track> {
    state
        .store
        .get(id)
        .ok_or_else(|| SessionError::InvalidInput(format!("track {} is not playing", id)))
}
