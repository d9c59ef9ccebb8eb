pub mod cache;
pub mod provider;

use serde::Deserialize;

/// Per-track summary handed to a session when a track starts playing.
///
/// This is the cheap, always-available half of the data: tempo and duration
/// come with the track itself. The detailed document (bars, sections) is a
/// separate provider lookup keyed by `track_id`.
#[derive(Debug, Clone)]
pub struct TrackAnalysis {
    /// Provider lookup key. None disables the detailed tier entirely.
    pub track_id: Option<String>,
    /// Tempo in BPM.
    pub tempo: f64,
    /// Track length in seconds.
    pub duration: f64,
    /// Beats per bar as reported by the player.
    pub time_signature: u32,
}

impl TrackAnalysis {
    pub fn new(tempo: f64, duration: f64) -> Self {
        Self {
            track_id: None,
            tempo,
            duration,
            time_signature: 4,
        }
    }

    pub fn with_track_id(mut self, track_id: impl Into<String>) -> Self {
        self.track_id = Some(track_id.into());
        self
    }
}

/// One timed span in an analysis document. Bars, beats, and tatums all
/// share this shape.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TimedInterval {
    /// Seconds from track start.
    pub start: f64,
    /// Length in seconds.
    pub duration: f64,
    #[serde(default)]
    pub confidence: f64,
}

/// A section entry in an analysis document (partial, only the fields we read).
#[derive(Debug, Clone, Deserialize)]
pub struct RawSection {
    pub start: f64,
    pub duration: f64,
    pub confidence: f64,
    /// Average loudness in dB. Choruses tend to sit hotter than verses.
    pub loudness: f64,
    #[serde(default)]
    pub tempo: f64,
    #[serde(default)]
    pub key: i32,
    #[serde(default)]
    pub mode: i32,
    #[serde(default)]
    pub time_signature: u32,
    #[serde(default)]
    pub time_signature_confidence: f64,
}

/// A full analysis document as returned by the provider.
///
/// Every array is optional on the wire; a missing array deserializes as
/// empty rather than failing the whole document. Only `bars` and `sections`
/// feed the timing logic, but the rhythm grids are parsed and kept.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalysisDocument {
    pub bars: Vec<TimedInterval>,
    pub beats: Vec<TimedInterval>,
    pub tatums: Vec<TimedInterval>,
    pub sections: Vec<RawSection>,
}

impl AnalysisDocument {
    /// A document with no bars and no sections carries nothing the resolver
    /// can use; treat it like a failed fetch.
    pub fn is_usable(&self) -> bool {
        !self.bars.is_empty() || !self.sections.is_empty()
    }
}
