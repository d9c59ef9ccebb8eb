pub mod analysis;
pub mod config;
pub mod cues;
pub mod scheduler;
pub mod session;
pub mod structure;

/// Application name for XDG paths
pub const APP_NAME: &str = "bassline";
