use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::AnalysisDocument;

/// Errors from an analysis lookup. All of them are recoverable: the caller
/// logs and falls back to the tempo estimate.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no analysis available for track {0}")]
    Unavailable(String),
    #[error("analysis request failed: {0}")]
    Transport(#[from] ureq::Error),
    #[error("analysis file unreadable: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed analysis document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Source of detailed analysis documents.
///
/// A fetch is a bounded one-shot: implementations enforce their own timeout
/// and never retry. Track start must not block on a slow backend.
pub trait AnalysisProvider {
    fn fetch(&self, track_id: &str) -> Result<AnalysisDocument, ProviderError>;
}

/// Fetches analysis documents over HTTP (`GET {base_url}/{track_id}`).
pub struct HttpAnalysisProvider {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpAnalysisProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.new_agent(),
            base_url: base_url.into(),
        }
    }
}

impl AnalysisProvider for HttpAnalysisProvider {
    fn fetch(&self, track_id: &str) -> Result<AnalysisDocument, ProviderError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), track_id);
        log::debug!("Fetching analysis from {url}");

        let doc: AnalysisDocument = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| match e {
                ureq::Error::StatusCode(404) => ProviderError::Unavailable(track_id.to_string()),
                other => ProviderError::Transport(other),
            })?
            .body_mut()
            .read_json()?;

        log::debug!(
            "  Got {} bars, {} sections for {track_id}",
            doc.bars.len(),
            doc.sections.len()
        );
        Ok(doc)
    }
}

/// Reads analysis documents from local JSON files (`{dir}/{track_id}.json`).
/// Used by the CLI and in tests; the shape on disk matches the HTTP payload.
pub struct FileAnalysisProvider {
    dir: PathBuf,
}

impl FileAnalysisProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl AnalysisProvider for FileAnalysisProvider {
    fn fetch(&self, track_id: &str) -> Result<AnalysisDocument, ProviderError> {
        let path = self.dir.join(format!("{track_id}.json"));
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProviderError::Unavailable(track_id.to_string())
            } else {
                ProviderError::Io(e)
            }
        })?;
        Ok(serde_json::from_str(&contents)?)
    }
}
