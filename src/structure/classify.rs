use crate::analysis::RawSection;

/// Loudness above which a well-placed, confident section reads as a chorus (dB).
const CHORUS_LOUDNESS_DB: f64 = -10.0;
/// Confidence floor for the chorus rule.
const CHORUS_MIN_CONFIDENCE: f64 = 0.5;
/// Sections quieter than this read as verse or bridge (dB).
const QUIET_LOUDNESS_DB: f64 = -15.0;
/// Zero-based positions where choruses tend to land in a pop song form.
const CHORUS_POSITIONS: [usize; 3] = [1, 3, 5];

/// Structural label assigned to a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionLabel {
    Intro,
    Verse,
    Chorus,
    Bridge,
    Outro,
    Unknown,
}

impl SectionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::Verse => "verse",
            Self::Chorus => "chorus",
            Self::Bridge => "bridge",
            Self::Outro => "outro",
            Self::Unknown => "unknown",
        }
    }
}

/// A section with its structural label attached.
#[derive(Debug, Clone)]
pub struct ClassifiedSection {
    pub start: f64,
    pub duration: f64,
    pub confidence: f64,
    pub loudness: f64,
    pub label: SectionLabel,
}

/// Label each section of a track from position and loudness alone.
///
/// No melodic or harmonic information is available, so this leans on how
/// mainstream song forms are laid out: the track opens with an intro, ends
/// on an outro, and choruses land loud and early-ish at odd positions.
/// Rough, but it only has to be right often enough to time a narration cue.
pub fn classify_sections(sections: &[RawSection]) -> Vec<ClassifiedSection> {
    let n = sections.len();
    if n == 1 {
        log::debug!("Single-section track; labeling it intro");
    }
    sections
        .iter()
        .enumerate()
        .map(|(i, s)| ClassifiedSection {
            start: s.start,
            duration: s.duration,
            confidence: s.confidence,
            loudness: s.loudness,
            label: label_for_position(i, n, s),
        })
        .collect()
}

fn label_for_position(i: usize, n: usize, section: &RawSection) -> SectionLabel {
    // Tier 1: the opening section is always the intro. On a one-section
    // track this wins over the outro rule below.
    if i == 0 {
        return SectionLabel::Intro;
    }

    // Tier 2: the closing section is always the outro.
    if i + 1 == n {
        return SectionLabel::Outro;
    }

    // Tier 3: loud, confident section at a classic chorus slot.
    if section.loudness > CHORUS_LOUDNESS_DB
        && section.confidence > CHORUS_MIN_CONFIDENCE
        && CHORUS_POSITIONS.contains(&i)
    {
        return SectionLabel::Chorus;
    }

    // Tier 4: quiet sections alternate verse (odd slots) and bridge (even).
    if section.loudness < QUIET_LOUDNESS_DB {
        return if i % 2 == 1 {
            SectionLabel::Verse
        } else {
            SectionLabel::Bridge
        };
    }

    SectionLabel::Unknown
}
