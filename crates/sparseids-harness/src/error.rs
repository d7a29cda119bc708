use std::path::PathBuf;

use thiserror::Error;

use crate::scenario::StepFailure;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed transcript line {line}: {source}")]
    TranscriptLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("scenario '{}' failed at step {}: {}", .0.scenario, .0.step, .0.detail)]
    StepFailed(StepFailure),
}

impl HarnessError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
