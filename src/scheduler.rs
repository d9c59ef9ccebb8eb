use crate::cues::{CueTiming, NarrativeCue};
use crate::structure::MusicalStructure;

/// The next line the session will speak and how far away it is.
#[derive(Debug, Clone, PartialEq)]
pub struct UpcomingNarrative {
    pub text: String,
    /// Seconds until the cue fires. Clamped to zero for overdue cues.
    pub time_until: f64,
}

/// Fires narration cues against playback position.
///
/// The scheduler is polled (the session ticks it every hundred or so
/// milliseconds) and fires at most one cue per poll. Cues are one-shot:
/// once a cue fires it stays triggered until a new track is set or the
/// scheduler resets. Content is never inspected here; the store decides
/// which texts are trusted, and an untrusted cue that comes due is burned
/// silently so narration never falls behind it.
#[derive(Default)]
pub struct TriggerScheduler {
    cues: Vec<NarrativeCue>,
    structure: Option<MusicalStructure>,
    /// One-shot latch for the opening-bars cue. Held separately from the
    /// cue's own `triggered` flag so that flag churn can never replay it.
    opening_fired: bool,
}

impl TriggerScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the loaded cue list. Scheduling state on the incoming cues
    /// is cleared; they all start pending.
    pub fn load(&mut self, mut cues: Vec<NarrativeCue>) {
        for cue in &mut cues {
            cue.triggered = false;
            cue.trigger_time = None;
        }
        self.cues = cues;
    }

    pub fn cues(&self) -> &[NarrativeCue] {
        &self.cues
    }

    pub fn structure(&self) -> Option<&MusicalStructure> {
        self.structure.as_ref()
    }

    pub fn has_track(&self) -> bool {
        self.structure.is_some()
    }

    /// Attach a track's structure and assign trigger times. Every cue goes
    /// back to pending and the opening-bars latch re-arms: a new track is
    /// a new narration schedule.
    pub fn set_track(&mut self, structure: MusicalStructure) {
        for cue in &mut self.cues {
            cue.triggered = false;
            cue.trigger_time = match cue.timing {
                CueTiming::AfterFourBars => structure.fourth_bar_end,
                CueTiming::BeforeChorus => structure.chorus_approach,
                CueTiming::EveryBars { .. } => {
                    log::debug!("Cue '{}' uses a recurring timing; not scheduled", cue.id);
                    None
                }
            };
        }
        self.opening_fired = false;
        self.structure = Some(structure);
    }

    /// Poll for a due cue. `elapsed` is seconds since the track started on
    /// the playback clock.
    ///
    /// Scans cues in load order. Due untrusted cues are marked triggered
    /// and skipped; the scan stops at the first due trusted cue, which is
    /// marked triggered and returned. Returns None when nothing new is due,
    /// so repeated polls after exhaustion are no-ops.
    pub fn check_triggers(&mut self, elapsed: f64) -> Option<String> {
        if self.structure.is_none() {
            return None;
        }

        for cue in &mut self.cues {
            if cue.triggered {
                continue;
            }
            let Some(at) = cue.trigger_time else { continue };
            if elapsed < at {
                continue;
            }

            if !cue.trusted {
                cue.triggered = true;
                log::warn!("Suppressing unrecognized cue '{}'", cue.id);
                continue;
            }

            if matches!(cue.timing, CueTiming::AfterFourBars) {
                if self.opening_fired {
                    cue.triggered = true;
                    continue;
                }
                self.opening_fired = true;
            }

            cue.triggered = true;
            log::info!("Cue '{}' fired at {elapsed:.2}s", cue.id);
            return Some(cue.text.clone());
        }

        None
    }

    /// Mark a cue as narrated outside the position path (the session's
    /// wall-clock fallback). Burned the same way a fired cue is, latch
    /// included, so the two tiers never replay each other's lines.
    pub fn mark_narrated(&mut self, index: usize) {
        if let Some(cue) = self.cues.get_mut(index) {
            cue.triggered = true;
            if matches!(cue.timing, CueTiming::AfterFourBars) {
                self.opening_fired = true;
            }
        }
    }

    /// Peek at the soonest pending trusted cue without firing anything.
    /// Ties go to the earlier-loaded cue, the same one `check_triggers`
    /// would fire first.
    pub fn next_narrative(&self, elapsed: f64) -> Option<UpcomingNarrative> {
        let mut soonest: Option<(&NarrativeCue, f64)> = None;
        for cue in &self.cues {
            if cue.triggered || !cue.trusted {
                continue;
            }
            let Some(at) = cue.trigger_time else { continue };
            if soonest.is_none_or(|(_, best)| at < best) {
                soonest = Some((cue, at));
            }
        }
        soonest.map(|(cue, at)| UpcomingNarrative {
            text: cue.text.clone(),
            time_until: (at - elapsed).max(0.0),
        })
    }

    /// Clear all cue state and detach the track. Loaded cues survive a
    /// reset; their scheduling state does not. Must run on phase or track
    /// change so nothing bleeds across.
    pub fn reset(&mut self) {
        for cue in &mut self.cues {
            cue.triggered = false;
            cue.trigger_time = None;
        }
        self.structure = None;
        self.opening_fired = false;
    }
}
