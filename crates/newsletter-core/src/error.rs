use std::{io, path::PathBuf};

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Terminal failures of a rendering run. None of them are retried.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed newsletter data in {}: {reason}", path.display())]
    MalformedInput { path: PathBuf, reason: String },
    #[error("unable to read {}", path.display())]
    InputRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("template `{name}` not found in {}", dir.display())]
    TemplateNotFound { name: String, dir: PathBuf },
    #[error("failed to render template `{name}`")]
    Render {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("unable to write output to {}", path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by the input document rather than the environment.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::MalformedInput { .. } | Self::InputRead { .. })
    }
}
