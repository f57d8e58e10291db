//! Ordered store of track fragments
//!
//! Keys are track ids, values are the track's current fragment plus the bits of
//! metadata the session needs for rebuilding (hoisted tempo directive, declared
//! base tempo). Insertion order is kept so the combined program is stable for
//! identical inputs.

use crate::tempo::TempoDirective;

/// One logical, independently toggleable part
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: String,
    pub fragment: String,
    /// Tempo directive that was stripped from the supplied fragment
    pub directive: Option<TempoDirective>,
    /// Order in which directives were supplied; highest wins
    pub directive_seq: u64,
    /// Declared base tempo in cycles per second
    pub base_cps: Option<f64>,
    /// When the track was last played; used to pick the tempo reference
    pub played_seq: u64,
}

impl Track {
    pub fn new(id: &str, fragment: &str) -> Self {
        Self {
            id: id.to_string(),
            fragment: fragment.to_string(),
            directive: None,
            directive_seq: 0,
            base_cps: None,
            played_seq: 0,
        }
    }
}

/// Ordered id -> fragment mapping
///
/// A small `Vec` keeps insertion order without extra bookkeeping; sessions hold
/// a handful of tracks.
#[derive(Debug, Clone, Default)]
pub struct PatternStore {
    tracks: Vec<Track>,
}

impl PatternStore {
    pub fn new() -> Self {
        Self { tracks: Vec::new() }
    }

    /// Insert or replace a fragment, keeping the track's position if present
    pub fn set_fragment(&mut self, id: &str, text: &str) {
        match self.position(id) {
            Some(index) => self.tracks[index].fragment = text.to_string(),
            None => self.tracks.push(Track::new(id, text)),
        }
    }

    /// Insert or replace a whole track, keeping its position if present
    pub fn set_track(&mut self, track: Track) {
        match self.position(&track.id) {
            Some(index) => self.tracks[index] = track,
            None => self.tracks.push(track),
        }
    }

    /// Remove a track; absent ids are ignored
    pub fn remove_fragment(&mut self, id: &str) -> Option<Track> {
        self.position(id).map(|index| self.tracks.remove(index))
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    /// Fragments in insertion order
    ///
    /// Each call walks the store as it is now, so the iterator can be requested
    /// again after a mutation.
    pub fn values(&self) -> impl Iterator<Item = &str> + '_ {
        self.tracks.iter().map(|t| t.fragment.as_str())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.tracks.iter().map(|t| t.id.as_str())
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> + '_ {
        self.tracks.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == id)
    }
}
