use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Built-in narration for the opening bars of a warm-up track.
pub const WARMUP_OPENER: &str = "We're just warming up the legs here";
/// Built-in narration announcing an upcoming chorus.
pub const CHORUS_CALLOUT: &str = "Chorus in 7 seconds";

/// When a cue should fire, relative to musical structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CueTiming {
    /// After the opening bar window ends.
    AfterFourBars,
    /// Shortly before the chorus starts.
    BeforeChorus,
    /// Recurring bar-interval cues parse but are never scheduled.
    EveryBars { bars: u32 },
}

/// One narration cue with its scheduling state.
///
/// `trusted` is decided once, at the store boundary; the scheduler only
/// reads the flag and never inspects the text itself.
#[derive(Debug, Clone)]
pub struct NarrativeCue {
    pub id: String,
    pub text: String,
    pub timing: CueTiming,
    pub trusted: bool,
    /// Set once the cue has fired (or been suppressed). Terminal until the
    /// next track is set or the session resets.
    pub triggered: bool,
    /// Seconds from track start, assigned when a track is set.
    pub trigger_time: Option<f64>,
}

impl NarrativeCue {
    pub fn new(id: impl Into<String>, text: impl Into<String>, timing: CueTiming) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            timing,
            trusted: false,
            triggered: false,
            trigger_time: None,
        }
    }
}

/// Errors loading a cue file.
#[derive(Debug, Error)]
pub enum CueError {
    #[error("cue file unreadable: {0}")]
    Io(#[from] std::io::Error),
    #[error("cue file malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// On-disk cue entry (a cue file is a JSON array of these).
#[derive(Debug, Deserialize)]
struct CueFileEntry {
    id: String,
    text: String,
    timing: CueTiming,
}

/// Source of narration cues, and the place cue content gets vetted.
///
/// The trusted registry holds every narration line the app is willing to
/// speak. A loaded cue whose text is not in the registry stays in the list
/// but is flagged untrusted; the scheduler will burn it silently instead of
/// narrating it. Keeping the string comparison here means the scheduler
/// stays content-agnostic.
pub struct CueStore {
    trusted: HashSet<String>,
}

impl CueStore {
    pub fn new() -> Self {
        let trusted = [WARMUP_OPENER, CHORUS_CALLOUT]
            .into_iter()
            .map(String::from)
            .collect();
        Self { trusted }
    }

    /// Extend the registry with extra lines from config.
    pub fn with_trusted_texts(mut self, extra: &[String]) -> Self {
        for text in extra {
            self.trusted.insert(text.clone());
        }
        self
    }

    pub fn is_trusted(&self, text: &str) -> bool {
        self.trusted.contains(text)
    }

    /// Built-in cue set for a workout phase.
    pub fn builtin_phase_cues(&self, phase: &str) -> Vec<NarrativeCue> {
        match phase {
            "warmup" => self.vet(vec![
                NarrativeCue::new("warmup-legs", WARMUP_OPENER, CueTiming::AfterFourBars),
                NarrativeCue::new("chorus-callout", CHORUS_CALLOUT, CueTiming::BeforeChorus),
            ]),
            other => {
                log::warn!("No built-in cues for phase '{other}'");
                Vec::new()
            }
        }
    }

    /// Load and vet a cue file (JSON array of `{id, text, timing}`).
    pub fn load_file(&self, path: &Path) -> Result<Vec<NarrativeCue>, CueError> {
        let contents = std::fs::read_to_string(path)?;
        let entries: Vec<CueFileEntry> = serde_json::from_str(&contents)?;
        log::debug!("Loaded {} cues from {}", entries.len(), path.display());
        Ok(self.vet(
            entries
                .into_iter()
                .map(|e| NarrativeCue::new(e.id, e.text, e.timing))
                .collect(),
        ))
    }

    fn vet(&self, mut cues: Vec<NarrativeCue>) -> Vec<NarrativeCue> {
        for cue in &mut cues {
            cue.trusted = self.is_trusted(&cue.text);
            if !cue.trusted {
                log::warn!(
                    "Cue '{}' has unrecognized narration text; it will be suppressed",
                    cue.id
                );
            }
        }
        cues
    }
}

impl Default for CueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_warmup_cues_are_trusted() {
        let cues = CueStore::new().builtin_phase_cues("warmup");
        assert_eq!(cues.len(), 2);
        assert!(cues.iter().all(|c| c.trusted));
        assert_eq!(cues[0].text, WARMUP_OPENER);
        assert_eq!(cues[0].timing, CueTiming::AfterFourBars);
        assert_eq!(cues[1].text, CHORUS_CALLOUT);
        assert_eq!(cues[1].timing, CueTiming::BeforeChorus);
    }

    #[test]
    fn unknown_phase_has_no_builtins() {
        assert!(CueStore::new().builtin_phase_cues("sprint").is_empty());
    }

    #[test]
    fn new_cues_start_pending() {
        let cues = CueStore::new().builtin_phase_cues("warmup");
        assert!(cues.iter().all(|c| !c.triggered));
        assert!(cues.iter().all(|c| c.trigger_time.is_none()));
    }

    #[test]
    fn config_extended_registry_trusts_extra_lines() {
        let store =
            CueStore::new().with_trusted_texts(&["Push it to the top".to_string()]);
        assert!(store.is_trusted("Push it to the top"));
        assert!(store.is_trusted(WARMUP_OPENER));
        assert!(!store.is_trusted("Buy my supplement powder"));
    }

    #[test]
    fn cue_file_loads_and_vets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cues.json");
        let json = r#"[
            {"id": "opener", "text": "We're just warming up the legs here",
             "timing": "after_four_bars"},
            {"id": "spam", "text": "Buy my supplement powder",
             "timing": "before_chorus"},
            {"id": "pace", "text": "Chorus in 7 seconds",
             "timing": {"every_bars": {"bars": 8}}}
        ]"#;
        std::fs::write(&path, json).unwrap();

        let cues = CueStore::new().load_file(&path).unwrap();
        assert_eq!(cues.len(), 3);
        assert!(cues[0].trusted);
        assert!(!cues[1].trusted);
        assert!(cues[2].trusted);
        assert_eq!(cues[2].timing, CueTiming::EveryBars { bars: 8 });
    }

    #[test]
    fn malformed_cue_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cues.json");
        std::fs::write(&path, r#"{"not": "an array"}"#).unwrap();
        assert!(matches!(
            CueStore::new().load_file(&path),
            Err(CueError::Malformed(_))
        ));
    }

    #[test]
    fn missing_cue_file_is_an_io_error() {
        let store = CueStore::new();
        assert!(matches!(
            store.load_file(Path::new("/nonexistent/cues.json")),
            Err(CueError::Io(_))
        ));
    }

    #[test]
    fn timing_variants_parse_from_json() {
        let t: CueTiming = serde_json::from_str(r#""after_four_bars""#).unwrap();
        assert_eq!(t, CueTiming::AfterFourBars);
        let t: CueTiming = serde_json::from_str(r#""before_chorus""#).unwrap();
        assert_eq!(t, CueTiming::BeforeChorus);
        let t: CueTiming = serde_json::from_str(r#"{"every_bars": {"bars": 16}}"#).unwrap();
        assert_eq!(t, CueTiming::EveryBars { bars: 16 });
    }
}
