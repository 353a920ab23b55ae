use std::{fs, path::Path};

use crate::error::{Error, Result};

/// Class names in classifier output order: line `i` names score `i`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelList {
    labels: Vec<String>,
}

impl LabelList {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::LabelList {
            path: path.to_path_buf(),
            source,
        })?;
        let list = Self::from_lines(text.lines());
        tracing::info!(path = %path.display(), count = list.len(), "loaded label list");
        Ok(list)
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
