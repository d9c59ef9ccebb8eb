use anyhow::{Context, Result};
use bassline::analysis::provider::{FileAnalysisProvider, HttpAnalysisProvider};
use bassline::analysis::{AnalysisDocument, TrackAnalysis};
use bassline::config::AppConfig;
use bassline::cues::{CueStore, CueTiming};
use bassline::session::{FiredCue, NarrationSink, PositionFeed, WorkoutSession};
use bassline::structure::classify::{SectionLabel, classify_sections};
use bassline::structure::{MusicalStructure, StructureResolver};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "bassline", version, about = "Music-structure workout narration")]
struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a phase's narration timeline for a track
    Simulate {
        /// Tempo in BPM
        #[arg(long, default_value = "120")]
        tempo: f64,

        /// Track duration in seconds
        #[arg(long, default_value = "180")]
        duration: f64,

        /// Track id for detailed-analysis lookup
        #[arg(long)]
        track_id: Option<String>,

        /// Directory of local analysis JSON files (takes priority over the endpoint)
        #[arg(long)]
        analysis_dir: Option<PathBuf>,

        /// Cue file (JSON array of {id, text, timing})
        #[arg(long)]
        cues: Option<PathBuf>,

        /// Workout phase whose built-in cues to load when no file is given
        #[arg(long, default_value = "warmup")]
        phase: String,

        /// Phase length in seconds
        #[arg(long, default_value = "60")]
        phase_len: f64,

        /// Pretend the playback clock is unavailable (wall-clock pacing)
        #[arg(long)]
        no_position: bool,

        /// Run on the real clock with live narration instead of instantly
        #[arg(long)]
        realtime: bool,
    },

    /// Resolve musical landmarks for a track
    Resolve {
        /// Tempo in BPM
        #[arg(long, default_value = "120")]
        tempo: f64,

        /// Track duration in seconds
        #[arg(long, default_value = "180")]
        duration: f64,

        /// Analysis JSON file to resolve from (instead of estimating)
        #[arg(long)]
        analysis: Option<PathBuf>,
    },

    /// Classify the sections of an analysis document
    Classify {
        /// Analysis JSON file
        analysis: PathBuf,
    },

    /// Vet and list narration cues
    Cues {
        /// Cue file (JSON array); defaults to the built-in set for --phase
        file: Option<PathBuf>,

        /// Workout phase whose built-in cues to list
        #[arg(long, default_value = "warmup")]
        phase: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = AppConfig::load();

    match cli.command {
        Commands::Simulate {
            tempo,
            duration,
            track_id,
            analysis_dir,
            cues,
            phase,
            phase_len,
            no_position,
            realtime,
        } => {
            anyhow::ensure!(
                phase_len.is_finite() && phase_len > 0.0,
                "Phase length must be a positive number of seconds"
            );

            let store = CueStore::new().with_trusted_texts(&config.cues.trusted_texts);
            let loaded = match &cues {
                Some(path) => store
                    .load_file(path)
                    .with_context(|| format!("Failed to load cues from {}", path.display()))?,
                None => store.builtin_phase_cues(&phase),
            };
            if loaded.is_empty() {
                anyhow::bail!("No cues to narrate. Pass --cues or a phase with built-ins.");
            }

            let resolver = build_resolver(&config, analysis_dir);
            let mut session = WorkoutSession::new(resolver);
            session.load(loaded);

            let mut track = TrackAnalysis::new(tempo, duration);
            if let Some(id) = track_id {
                track = track.with_track_id(id);
            }
            session.set_track(&track);
            print_structure(session.structure(), tempo, duration);

            if realtime {
                run_realtime(&mut session, phase_len, no_position)?;
            } else {
                let fired = session.simulate(phase_len, !no_position);
                print_timeline(&fired, phase_len, config.timing.poll_interval_ms, no_position);
            }
        }

        Commands::Resolve { tempo, duration, analysis } => {
            let resolver = StructureResolver::new(config.timing);
            let track = TrackAnalysis::new(tempo, duration);
            let structure = match &analysis {
                Some(path) => {
                    let doc = read_analysis_file(path)?;
                    resolver.resolve_from_document(&track, &doc)
                }
                None => resolver.resolve_from_tempo(&track),
            };
            print_structure(Some(&structure), tempo, duration);
        }

        Commands::Classify { analysis } => {
            let doc = read_analysis_file(&analysis)?;
            let sections = classify_sections(&doc.sections);

            if sections.is_empty() {
                println!("No sections in {}.", analysis.display());
                return Ok(());
            }

            println!(
                "{:<4} {:>8} {:>8} {:>8} {:>6}  {}",
                "#", "Start", "Length", "Loud", "Conf", "Label"
            );
            println!("{}", "-".repeat(50));

            for (i, s) in sections.iter().enumerate() {
                println!(
                    "{:<4} {:>7.1}s {:>7.1}s {:>6.1}dB {:>6.2}  {}",
                    i,
                    s.start,
                    s.duration,
                    s.loudness,
                    s.confidence,
                    s.label.as_str()
                );
            }

            let choruses = sections
                .iter()
                .filter(|s| s.label == SectionLabel::Chorus)
                .count();
            println!();
            println!("{} sections, {} chorus", sections.len(), choruses);
        }

        Commands::Cues { file, phase } => {
            let store = CueStore::new().with_trusted_texts(&config.cues.trusted_texts);
            let cues = match &file {
                Some(path) => store
                    .load_file(path)
                    .with_context(|| format!("Failed to load cues from {}", path.display()))?,
                None => store.builtin_phase_cues(&phase),
            };

            if cues.is_empty() {
                println!("No cues.");
                return Ok(());
            }

            println!("{:<16} {:>16} {:>8}  {}", "Id", "Timing", "Trusted", "Text");
            println!("{}", "-".repeat(70));
            for c in &cues {
                println!(
                    "{:<16} {:>16} {:>8}  {}",
                    c.id,
                    timing_label(&c.timing),
                    if c.trusted { "yes" } else { "NO" },
                    c.text
                );
            }

            let untrusted = cues.iter().filter(|c| !c.trusted).count();
            if untrusted > 0 {
                println!();
                println!("{untrusted} cue(s) failed vetting and will be suppressed");
            }
        }
    }

    Ok(())
}

/// Feed for live runs where the track starts in lockstep with the phase.
struct PhaseClockFeed {
    started: Instant,
}

impl PositionFeed for PhaseClockFeed {
    fn position_secs(&self) -> Option<f64> {
        Some(self.started.elapsed().as_secs_f64())
    }
}

/// Feed for runs where the playback clock is unavailable.
struct SilentFeed;

impl PositionFeed for SilentFeed {
    fn position_secs(&self) -> Option<f64> {
        None
    }
}

/// Prints narration above the progress bar, stamped with wall time.
struct ConsoleSink {
    pb: ProgressBar,
}

impl NarrationSink for ConsoleSink {
    fn narrate(&mut self, text: &str) {
        self.pb.println(format!(
            "[{}] {}",
            chrono::Local::now().format("%H:%M:%S"),
            text
        ));
    }
}

/// Build the landmark resolver from config plus CLI overrides.
fn build_resolver(config: &AppConfig, analysis_dir: Option<PathBuf>) -> StructureResolver {
    let mut resolver = StructureResolver::new(config.timing)
        .with_cache_ttl(Duration::from_secs(config.analysis.cache_ttl_secs));

    if let Some(dir) = analysis_dir {
        log::info!("Using local analysis files from {}", dir.display());
        resolver = resolver.with_provider(Box::new(FileAnalysisProvider::new(dir)));
    } else if let Some(endpoint) = &config.analysis.endpoint {
        log::info!("Using analysis endpoint {endpoint}");
        resolver = resolver.with_provider(Box::new(HttpAnalysisProvider::new(
            endpoint.clone(),
            Duration::from_millis(config.analysis.timeout_ms),
        )));
    }

    resolver
}

/// Drive a phase on the real clock with a progress bar and live narration.
fn run_realtime(session: &mut WorkoutSession, phase_len: f64, no_position: bool) -> Result<usize> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to build tokio runtime")?;

    let pb = ProgressBar::new(phase_len.ceil() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len}s {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );

    let started = Instant::now();
    let feed: Box<dyn PositionFeed> = if no_position {
        Box::new(SilentFeed)
    } else {
        Box::new(PhaseClockFeed { started })
    };
    let mut sink = ConsoleSink { pb: pb.clone() };

    let narrated = rt.block_on(async {
        let progress = async {
            let mut tick = tokio::time::interval(Duration::from_millis(250));
            loop {
                tick.tick().await;
                pb.set_position(started.elapsed().as_secs());
            }
        };
        tokio::select! {
            n = session.run_phase(feed.as_ref(), &mut sink, Duration::from_secs_f64(phase_len)) => n,
            _ = progress => unreachable!(),
        }
    });

    pb.finish_with_message("phase complete");
    println!();
    println!("{narrated} cues narrated");
    Ok(narrated)
}

fn read_analysis_file(path: &Path) -> Result<AnalysisDocument> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

fn timing_label(timing: &CueTiming) -> String {
    match timing {
        CueTiming::AfterFourBars => "after_four_bars".to_string(),
        CueTiming::BeforeChorus => "before_chorus".to_string(),
        CueTiming::EveryBars { bars } => format!("every_{bars}_bars"),
    }
}

fn fmt_landmark(time: Option<f64>) -> String {
    match time {
        Some(t) => format!("{t:.2}s"),
        None => "-".to_string(),
    }
}

/// Print the resolved landmark summary for a track.
fn print_structure(structure: Option<&MusicalStructure>, tempo: f64, duration: f64) {
    let Some(s) = structure else { return };

    println!("Track: {tempo:.0} BPM, {duration:.0}s ({})", s.source.as_str());
    println!("  Opening bars end: {}", fmt_landmark(s.fourth_bar_end));
    println!("  Chorus start:     {}", fmt_landmark(s.chorus_start));
    println!("  Chorus call:      {}", fmt_landmark(s.chorus_approach));

    if !s.sections.is_empty() {
        let choruses = s
            .sections
            .iter()
            .filter(|x| x.label == SectionLabel::Chorus)
            .count();
        println!("  Sections:         {} ({} chorus)", s.sections.len(), choruses);
    }
    println!();
}

/// Print the simulated narration timeline.
fn print_timeline(fired: &[FiredCue], phase_len: f64, poll_ms: u64, no_position: bool) {
    let clock = if no_position { "wall clock" } else { "playback clock" };
    println!("Timeline ({phase_len:.0}s phase, polled every {poll_ms}ms, {clock}):");
    println!("{:>8}  {}", "Time", "Narration");
    println!("{}", "-".repeat(60));

    for f in fired {
        println!("{:>7.1}s  {}", f.at, f.text);
    }
    if fired.is_empty() {
        println!("   (silence)");
    }

    println!();
    println!("{} cues narrated", fired.len());
}
