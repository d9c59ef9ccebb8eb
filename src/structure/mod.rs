pub mod classify;

use std::time::Duration;

use crate::analysis::cache::AnalysisCache;
use crate::analysis::provider::AnalysisProvider;
use crate::analysis::{AnalysisDocument, TrackAnalysis};
use crate::config::TimingConfig;

use self::classify::{ClassifiedSection, SectionLabel, classify_sections};

/// How long a fetched document stays usable when no TTL was configured.
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// How a track's structure was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureSource {
    /// From a detailed analysis document (bars and sections).
    Detailed,
    /// Estimated from tempo and duration alone.
    TempoEstimate,
}

impl StructureSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detailed => "detailed analysis",
            Self::TempoEstimate => "tempo estimate",
        }
    }
}

/// Resolved landmarks for one track, in seconds from track start on the
/// playback clock. Owned by the session for the lifetime of the current
/// track and recomputed from scratch for the next one.
#[derive(Debug, Clone)]
pub struct MusicalStructure {
    pub sections: Vec<ClassifiedSection>,
    /// End of the opening bar window (the old "fourth bar" moment).
    pub fourth_bar_end: Option<f64>,
    /// Where the chorus starts, detected or estimated.
    pub chorus_start: Option<f64>,
    /// When to announce the chorus: `max(0, chorus_start - lead)`.
    pub chorus_approach: Option<f64>,
    pub source: StructureSource,
}

/// Resolves musical landmarks for tracks.
///
/// This is the only place landmark arithmetic lives. There are two tiers:
/// a detailed analysis document when the provider has one, and a plain
/// tempo/duration estimate otherwise. Resolution never fails; every broken
/// input degrades to the estimate with a log line.
pub struct StructureResolver {
    timing: TimingConfig,
    provider: Option<Box<dyn AnalysisProvider>>,
    cache: AnalysisCache,
}

impl StructureResolver {
    pub fn new(timing: TimingConfig) -> Self {
        Self {
            timing,
            provider: None,
            cache: AnalysisCache::new(DEFAULT_CACHE_TTL),
        }
    }

    pub fn with_provider(mut self, provider: Box<dyn AnalysisProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = AnalysisCache::new(ttl);
        self
    }

    pub fn timing(&self) -> TimingConfig {
        self.timing
    }

    /// Resolve landmarks for a track.
    pub fn resolve(&mut self, track: &TrackAnalysis) -> MusicalStructure {
        match self.lookup_document(track) {
            Some(doc) if doc.is_usable() => self.resolve_from_document(track, &doc),
            Some(_) => {
                log::warn!(
                    "Analysis for {} has no bars or sections; using tempo estimate",
                    track.track_id.as_deref().unwrap_or("<unknown>")
                );
                self.resolve_from_tempo(track)
            }
            None => self.resolve_from_tempo(track),
        }
    }

    fn lookup_document(&mut self, track: &TrackAnalysis) -> Option<AnalysisDocument> {
        let track_id = track.track_id.as_deref()?;
        if let Some(doc) = self.cache.get(track_id) {
            log::debug!("Analysis cache hit for {track_id}");
            return Some(doc.clone());
        }
        let provider = self.provider.as_ref()?;
        match provider.fetch(track_id) {
            Ok(doc) => {
                self.cache.put(track_id, doc.clone());
                Some(doc)
            }
            Err(e) => {
                log::warn!("Analysis fetch failed for {track_id}: {e}. Using tempo estimate.");
                None
            }
        }
    }

    /// Landmarks from a detailed analysis document.
    pub fn resolve_from_document(
        &self,
        track: &TrackAnalysis,
        doc: &AnalysisDocument,
    ) -> MusicalStructure {
        let sections = classify_sections(&doc.sections);

        // End of the opening bar window, straight off the bar grid.
        let bar_index = self.timing.landmark_bars.saturating_sub(1) as usize;
        let fourth_bar_end = doc.bars.get(bar_index).map(|b| b.start + b.duration);
        if fourth_bar_end.is_none() {
            log::debug!(
                "Track has fewer than {} bars; no opening-bars landmark",
                self.timing.landmark_bars
            );
        }

        let detected = sections
            .iter()
            .find(|s| s.label == SectionLabel::Chorus)
            .map(|s| s.start);
        if detected.is_none() {
            log::debug!("No chorus section detected; estimating from duration");
        }
        let chorus_start = detected.or_else(|| self.estimate_chorus_start(track));
        let chorus_approach = chorus_start.map(|t| self.approach_time(t));

        MusicalStructure {
            sections,
            fourth_bar_end,
            chorus_start,
            chorus_approach,
            source: StructureSource::Detailed,
        }
    }

    /// Landmarks estimated from tempo and duration alone.
    pub fn resolve_from_tempo(&self, track: &TrackAnalysis) -> MusicalStructure {
        if track.time_signature != 0 && track.time_signature != self.timing.beats_per_bar {
            log::debug!(
                "Track reports {} beats per bar; estimate assumes {}",
                track.time_signature,
                self.timing.beats_per_bar
            );
        }
        let landmark_beats = (self.timing.beats_per_bar * self.timing.landmark_bars) as f64;
        let fourth_bar_end = if track.tempo > 0.0 {
            Some(60.0 / track.tempo * landmark_beats)
        } else {
            log::warn!(
                "Track tempo is {}; cannot estimate the opening-bars landmark",
                track.tempo
            );
            None
        };

        let chorus_start = self.estimate_chorus_start(track);
        let chorus_approach = chorus_start.map(|t| self.approach_time(t));

        MusicalStructure {
            sections: Vec::new(),
            fourth_bar_end,
            chorus_start,
            chorus_approach,
            source: StructureSource::TempoEstimate,
        }
    }

    fn estimate_chorus_start(&self, track: &TrackAnalysis) -> Option<f64> {
        if track.duration > 0.0 {
            Some(track.duration * self.timing.chorus_fraction)
        } else {
            log::warn!(
                "Track duration is {}; cannot estimate chorus position",
                track.duration
            );
            None
        }
    }

    /// Announcement time for a chorus, clamped to track start.
    fn approach_time(&self, chorus_start: f64) -> f64 {
        (chorus_start - self.timing.chorus_lead_secs).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::provider::ProviderError;
    use crate::analysis::{RawSection, TimedInterval};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn resolver() -> StructureResolver {
        StructureResolver::new(TimingConfig::default())
    }

    fn bars(ends: &[f64]) -> Vec<TimedInterval> {
        let mut out = Vec::new();
        let mut prev = 0.0;
        for &end in ends {
            out.push(TimedInterval {
                start: prev,
                duration: end - prev,
                confidence: 1.0,
            });
            prev = end;
        }
        out
    }

    fn quiet_section(start: f64) -> RawSection {
        RawSection {
            start,
            duration: 15.0,
            confidence: 0.9,
            loudness: -20.0,
            tempo: 120.0,
            key: 0,
            mode: 1,
            time_signature: 4,
            time_signature_confidence: 0.9,
        }
    }

    fn loud_section(start: f64) -> RawSection {
        RawSection {
            loudness: -5.0,
            ..quiet_section(start)
        }
    }

    struct FakeProvider {
        doc: Option<AnalysisDocument>,
        calls: Rc<RefCell<usize>>,
    }

    impl AnalysisProvider for FakeProvider {
        fn fetch(&self, track_id: &str) -> Result<AnalysisDocument, ProviderError> {
            *self.calls.borrow_mut() += 1;
            match &self.doc {
                Some(doc) => Ok(doc.clone()),
                None => Err(ProviderError::Unavailable(track_id.to_string())),
            }
        }
    }

    #[test]
    fn tempo_estimate_at_120_bpm_ends_opening_bars_at_8s() {
        // 16 beats at 120 BPM is exactly 8 seconds.
        let s = resolver().resolve_from_tempo(&TrackAnalysis::new(120.0, 240.0));
        assert_eq!(s.fourth_bar_end, Some(8.0));
        assert_eq!(s.source, StructureSource::TempoEstimate);
    }

    #[test]
    fn tempo_estimate_scales_with_bpm() {
        let s = resolver().resolve_from_tempo(&TrackAnalysis::new(60.0, 240.0));
        assert_eq!(s.fourth_bar_end, Some(16.0));
        let s = resolver().resolve_from_tempo(&TrackAnalysis::new(160.0, 240.0));
        assert_eq!(s.fourth_bar_end, Some(6.0));
    }

    #[test]
    fn estimated_chorus_for_180s_track_is_announced_at_38s() {
        let s = resolver().resolve_from_tempo(&TrackAnalysis::new(120.0, 180.0));
        assert_eq!(s.chorus_start, Some(45.0));
        assert_eq!(s.chorus_approach, Some(38.0));
    }

    #[test]
    fn detected_chorus_at_50s_is_announced_at_43s() {
        let doc = AnalysisDocument {
            sections: vec![
                quiet_section(0.0),
                loud_section(50.0),
                quiet_section(80.0),
                quiet_section(110.0),
            ],
            ..Default::default()
        };
        let s = resolver().resolve_from_document(&TrackAnalysis::new(120.0, 180.0), &doc);
        assert_eq!(s.chorus_start, Some(50.0));
        assert_eq!(s.chorus_approach, Some(43.0));
        assert_eq!(s.source, StructureSource::Detailed);
    }

    #[test]
    fn approach_clamps_to_track_start() {
        let doc = AnalysisDocument {
            sections: vec![
                quiet_section(0.0),
                loud_section(3.0),
                quiet_section(30.0),
                quiet_section(60.0),
            ],
            ..Default::default()
        };
        let s = resolver().resolve_from_document(&TrackAnalysis::new(120.0, 180.0), &doc);
        assert_eq!(s.chorus_approach, Some(0.0));
    }

    #[test]
    fn approach_is_always_lead_before_start_or_zero() {
        let r = resolver();
        for start in [0.0f64, 3.0, 7.0, 12.5, 90.0] {
            let expected = (start - 7.0).max(0.0);
            assert_eq!(r.approach_time(start), expected);
        }
    }

    #[test]
    fn opening_bars_landmark_comes_from_fourth_bar() {
        let doc = AnalysisDocument {
            bars: bars(&[2.1, 4.2, 6.3, 8.5, 10.6]),
            sections: vec![quiet_section(0.0)],
            ..Default::default()
        };
        let s = resolver().resolve_from_document(&TrackAnalysis::new(120.0, 180.0), &doc);
        assert_eq!(s.fourth_bar_end, Some(8.5));
    }

    #[test]
    fn fewer_than_four_bars_gives_no_opening_landmark() {
        let doc = AnalysisDocument {
            bars: bars(&[2.0, 4.0, 6.0]),
            sections: vec![quiet_section(0.0)],
            ..Default::default()
        };
        let s = resolver().resolve_from_document(&TrackAnalysis::new(120.0, 180.0), &doc);
        assert_eq!(s.fourth_bar_end, None);
    }

    #[test]
    fn no_detected_chorus_falls_back_to_duration_estimate() {
        let doc = AnalysisDocument {
            bars: bars(&[2.0, 4.0, 6.0, 8.0]),
            sections: vec![quiet_section(0.0), quiet_section(40.0), quiet_section(90.0)],
            ..Default::default()
        };
        let s = resolver().resolve_from_document(&TrackAnalysis::new(120.0, 180.0), &doc);
        assert_eq!(s.chorus_start, Some(45.0));
        assert_eq!(s.chorus_approach, Some(38.0));
        assert_eq!(s.source, StructureSource::Detailed);
    }

    #[test]
    fn zero_tempo_gives_no_opening_landmark() {
        let s = resolver().resolve_from_tempo(&TrackAnalysis::new(0.0, 180.0));
        assert_eq!(s.fourth_bar_end, None);
        assert_eq!(s.chorus_approach, Some(38.0));
    }

    #[test]
    fn zero_duration_gives_no_chorus_landmarks() {
        let s = resolver().resolve_from_tempo(&TrackAnalysis::new(120.0, 0.0));
        assert_eq!(s.chorus_start, None);
        assert_eq!(s.chorus_approach, None);
        assert_eq!(s.fourth_bar_end, Some(8.0));
    }

    #[test]
    fn resolve_without_track_id_estimates() {
        let mut r = resolver();
        let s = r.resolve(&TrackAnalysis::new(120.0, 180.0));
        assert_eq!(s.source, StructureSource::TempoEstimate);
    }

    #[test]
    fn resolve_with_failing_provider_estimates() {
        let calls = Rc::new(RefCell::new(0));
        let mut r = resolver().with_provider(Box::new(FakeProvider {
            doc: None,
            calls: Rc::clone(&calls),
        }));
        let s = r.resolve(&TrackAnalysis::new(120.0, 180.0).with_track_id("t1"));
        assert_eq!(s.source, StructureSource::TempoEstimate);
        assert_eq!(s.chorus_approach, Some(38.0));
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn resolve_with_empty_document_estimates() {
        let calls = Rc::new(RefCell::new(0));
        let mut r = resolver().with_provider(Box::new(FakeProvider {
            doc: Some(AnalysisDocument::default()),
            calls: Rc::clone(&calls),
        }));
        let s = r.resolve(&TrackAnalysis::new(120.0, 180.0).with_track_id("t1"));
        assert_eq!(s.source, StructureSource::TempoEstimate);
    }

    #[test]
    fn second_resolve_hits_the_cache() {
        let calls = Rc::new(RefCell::new(0));
        let doc = AnalysisDocument {
            bars: bars(&[2.0, 4.0, 6.0, 8.0]),
            ..Default::default()
        };
        let mut r = resolver().with_provider(Box::new(FakeProvider {
            doc: Some(doc),
            calls: Rc::clone(&calls),
        }));
        let track = TrackAnalysis::new(120.0, 180.0).with_track_id("t1");
        let first = r.resolve(&track);
        let second = r.resolve(&track);
        assert_eq!(*calls.borrow(), 1);
        assert_eq!(first.fourth_bar_end, second.fourth_bar_end);
        assert_eq!(second.source, StructureSource::Detailed);
    }
}
