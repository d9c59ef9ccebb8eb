use std::time::{Duration, Instant};

use crate::analysis::TrackAnalysis;
use crate::cues::NarrativeCue;
use crate::scheduler::{TriggerScheduler, UpcomingNarrative};
use crate::structure::{MusicalStructure, StructureResolver};

/// Wall-clock pacing used when no playback position exists: cue k of the
/// loaded list is spoken in the k-th window.
const FALLBACK_FIRST_WINDOW_START: f64 = 10.0;
const FALLBACK_WINDOW_SECS: f64 = 10.0;
const FALLBACK_WINDOW_SPACING: f64 = 20.0;

/// Where playback position comes from. `None` means the playback clock is
/// unavailable right now and the session paces itself off the phase clock.
pub trait PositionFeed {
    fn position_secs(&self) -> Option<f64>;
}

/// Receives narration lines. Fire-and-forget; the session never waits on it.
pub trait NarrationSink {
    fn narrate(&mut self, text: &str);
}

/// Session lifecycle. One pass per workout phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    TrackSet,
    Running,
}

/// A cue that fired during a simulated phase, with the tick it fired on.
#[derive(Debug, Clone, PartialEq)]
pub struct FiredCue {
    pub at: f64,
    pub text: String,
}

/// One workout phase's narration engine.
///
/// Owned by the caller and built fresh per phase: construct, load cues,
/// set the track, poll, reset or drop. All the mutable state (cue list,
/// phase clock, fallback windows) lives here, so two phases can never
/// trample each other.
pub struct WorkoutSession {
    resolver: StructureResolver,
    scheduler: TriggerScheduler,
    state: SessionState,
    fallback_emitted: Vec<bool>,
}

impl WorkoutSession {
    pub fn new(resolver: StructureResolver) -> Self {
        Self {
            resolver,
            scheduler: TriggerScheduler::new(),
            state: SessionState::Idle,
            fallback_emitted: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn structure(&self) -> Option<&MusicalStructure> {
        self.scheduler.structure()
    }

    pub fn cues(&self) -> &[NarrativeCue] {
        self.scheduler.cues()
    }

    /// Load the cue list for this phase (already vetted by the store).
    pub fn load(&mut self, cues: Vec<NarrativeCue>) {
        self.fallback_emitted = vec![false; cues.len()];
        self.scheduler.load(cues);
    }

    /// Resolve the track's structure and arm the scheduler.
    pub fn set_track(&mut self, track: &TrackAnalysis) {
        let structure = self.resolver.resolve(track);
        log::info!(
            "Track structure from {} (opening bars end {:?}, chorus call {:?})",
            structure.source.as_str(),
            structure.fourth_bar_end,
            structure.chorus_approach
        );
        self.scheduler.set_track(structure);
        self.state = SessionState::TrackSet;
    }

    /// Poll for narration. `phase_elapsed` is seconds since the phase
    /// started; `position` is the playback clock if one is available.
    pub fn check_triggers(&mut self, phase_elapsed: f64, position: Option<f64>) -> Option<String> {
        self.state = SessionState::Running;
        match position {
            Some(pos) => self.scheduler.check_triggers(pos),
            None => self.check_fallback(phase_elapsed),
        }
    }

    /// Peek at the next line without firing anything.
    pub fn next_narrative(&self, phase_elapsed: f64, position: Option<f64>) -> Option<UpcomingNarrative> {
        match position {
            Some(pos) => self.scheduler.next_narrative(pos),
            None => self.next_fallback(phase_elapsed),
        }
    }

    /// Back to idle: scheduler state, fallback windows, everything.
    pub fn reset(&mut self) {
        self.scheduler.reset();
        for emitted in &mut self.fallback_emitted {
            *emitted = false;
        }
        self.state = SessionState::Idle;
    }

    /// Wall-clock pacing. Each cue gets one fixed window off the phase
    /// clock, fully decoupled from track timing. The narrated state is
    /// shared with the position path: a cue the scheduler already fired is
    /// skipped here, and a window hit burns the cue on that side too, so a
    /// position feed that comes and goes mid-phase never replays a line.
    fn check_fallback(&mut self, phase_elapsed: f64) -> Option<String> {
        for k in 0..self.fallback_emitted.len() {
            if self.fallback_emitted[k] {
                continue;
            }
            let start = FALLBACK_FIRST_WINDOW_START + FALLBACK_WINDOW_SPACING * k as f64;
            let end = start + FALLBACK_WINDOW_SECS;
            if phase_elapsed < start || phase_elapsed >= end {
                continue;
            }
            self.fallback_emitted[k] = true;
            let cue = &self.scheduler.cues()[k];
            if cue.triggered {
                continue;
            }
            if !cue.trusted {
                log::warn!("Suppressing unrecognized cue '{}' in fallback window", cue.id);
                continue;
            }
            let text = cue.text.clone();
            self.scheduler.mark_narrated(k);
            log::info!("Fallback window {k} opened at {phase_elapsed:.1}s");
            return Some(text);
        }
        None
    }

    fn next_fallback(&self, phase_elapsed: f64) -> Option<UpcomingNarrative> {
        let cues = self.scheduler.cues();
        for (k, emitted) in self.fallback_emitted.iter().enumerate() {
            if *emitted || cues[k].triggered || !cues[k].trusted {
                continue;
            }
            let start = FALLBACK_FIRST_WINDOW_START + FALLBACK_WINDOW_SPACING * k as f64;
            let end = start + FALLBACK_WINDOW_SECS;
            if phase_elapsed < end {
                return Some(UpcomingNarrative {
                    text: cues[k].text.clone(),
                    time_until: (start - phase_elapsed).max(0.0),
                });
            }
        }
        None
    }

    fn poll_ms(&self) -> u64 {
        self.resolver.timing().poll_interval_ms.max(1)
    }

    /// Step the whole phase on a virtual clock and collect every fired cue.
    ///
    /// Deterministic, no sleeping. With `assume_playback` the track is taken
    /// to start in lockstep with the phase, so the playback clock equals the
    /// phase clock; without it every poll runs the wall-clock fallback.
    pub fn simulate(&mut self, phase_len: f64, assume_playback: bool) -> Vec<FiredCue> {
        let poll_ms = self.poll_ms();
        let total_ticks = (phase_len * 1000.0 / poll_ms as f64).floor() as u64;
        let mut fired = Vec::new();

        for tick in 0..=total_ticks {
            let elapsed = (tick * poll_ms) as f64 / 1000.0;
            let position = if assume_playback { Some(elapsed) } else { None };
            if let Some(text) = self.check_triggers(elapsed, position) {
                fired.push(FiredCue { at: elapsed, text });
            }
        }
        fired
    }

    /// Drive the phase in real time, polling the position feed on a tokio
    /// interval and speaking into the sink. Returns the number of cues
    /// narrated.
    ///
    /// The poll timer lives inside this future; dropping the future on a
    /// phase change cancels polling, and the `&mut self` borrow keeps a
    /// stale tick from ever reaching a reset scheduler.
    pub async fn run_phase(
        &mut self,
        feed: &dyn PositionFeed,
        sink: &mut dyn NarrationSink,
        phase_len: Duration,
    ) -> usize {
        let started = Instant::now();
        let mut interval = tokio::time::interval(Duration::from_millis(self.poll_ms()));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut fired = 0usize;

        loop {
            interval.tick().await;
            let elapsed = started.elapsed().as_secs_f64();
            if elapsed > phase_len.as_secs_f64() {
                break;
            }
            if let Some(text) = self.check_triggers(elapsed, feed.position_secs()) {
                sink.narrate(&text);
                fired += 1;
            }
        }

        log::info!(
            "Phase complete after {:.1}s, {fired} cues narrated",
            started.elapsed().as_secs_f64()
        );
        fired
    }
}
