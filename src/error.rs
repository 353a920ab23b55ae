use std::{path::PathBuf, time::Duration};
use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("could not open label list {path}: {source}")]
    LabelList {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("tensor error: {0}")]
    Tensor(#[from] tch::TchError),

    #[error("inference transport failed: {0}")]
    Transport(String),

    #[error("no inference response after {0:?}")]
    Timeout(Duration),

    #[error("bad event on line {line}: {message}")]
    Source { line: usize, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Transport(format!("request timed out: {e}"))
        } else {
            Error::Transport(e.to_string())
        }
    }
}
