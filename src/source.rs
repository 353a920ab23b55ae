use std::{
    fs::File,
    io::{BufRead, BufReader, Lines},
    path::Path,
};

use crate::{
    error::{Error, Result},
    types::Event,
};

/// Reads events from a JSON-lines file, one [`Event`] per line.
pub struct EventSource<R> {
    lines: Lines<R>,
    line_no: usize,
}

impl EventSource<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(BufReader::new(file)))
    }
}

/// Opens every file up front and yields their events in order, file by file.
pub fn open_all<P: AsRef<Path>>(
    paths: &[P],
) -> Result<impl Iterator<Item = Result<Event>>> {
    let sources = paths
        .iter()
        .map(|p| {
            EventSource::open(p).map_err(|e| match e {
                Error::Io(io) => Error::Io(std::io::Error::new(
                    io.kind(),
                    format!("{}: {io}", p.as_ref().display()),
                )),
                other => other,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(sources.into_iter().flatten())
}

impl<R: BufRead> EventSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> Iterator for EventSource<R> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&line).map_err(|e| Error::Source {
                line: self.line_no,
                message: e.to_string(),
            }));
        }
    }
}
