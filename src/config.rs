use directories::ProjectDirs;
use serde::Deserialize;
use std::path::PathBuf;

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults, so the config file is optional.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Landmark timing knobs (chorus lead, estimate fraction, poll rate).
    pub timing: TimingConfig,
    /// Audio-analysis provider settings.
    pub analysis: AnalysisConfig,
    /// Narration cue settings.
    pub cues: CuesConfig,
}

/// Timing constants for landmark resolution and scheduling.
///
/// These used to be scattered as inline literals; every consumer now reads
/// them from here so the chorus lead time, the estimate fraction, and the
/// bar window agree across the whole engine.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Seconds before the chorus to announce it.
    pub chorus_lead_secs: f64,
    /// Estimated chorus position as a fraction of track duration,
    /// used when no chorus section was detected.
    pub chorus_fraction: f64,
    /// Beats per bar assumed when estimating from tempo alone.
    pub beats_per_bar: u32,
    /// Number of opening bars that make up the first landmark window.
    pub landmark_bars: u32,
    /// Scheduler poll cadence in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            chorus_lead_secs: 7.0,
            chorus_fraction: 0.25,
            beats_per_bar: 4,
            landmark_bars: 4,
            poll_interval_ms: 100,
        }
    }
}

/// Audio-analysis provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Base URL of the analysis endpoint. None disables detailed lookups.
    pub endpoint: Option<String>,
    /// Request timeout in milliseconds. A hung fetch must not stall track start.
    pub timeout_ms: u64,
    /// Seconds a fetched document stays usable in the session cache.
    pub cache_ttl_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 2000,
            cache_ttl_secs: 300,
        }
    }
}

/// Narration cue configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CuesConfig {
    /// Extra narration texts allowed through the trusted registry
    /// (merged with the built-in lines).
    pub trusted_texts: Vec<String>,
}

impl AppConfig {
    /// Load config from `~/.config/bassline/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        match config_path {
            Some(path) if path.exists() => {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => {
                        match toml::from_str::<AppConfig>(&contents) {
                            Ok(config) => {
                                log::info!("Loaded config from {}", path.display());
                                config
                            }
                            Err(e) => {
                                log::warn!(
                                    "Failed to parse {}: {}. Using defaults.",
                                    path.display(),
                                    e
                                );
                                Self::default()
                            }
                        }
                    }
                    Err(e) => {
                        log::warn!(
                            "Failed to read {}: {}. Using defaults.",
                            path.display(),
                            e
                        );
                        Self::default()
                    }
                }
            }
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
