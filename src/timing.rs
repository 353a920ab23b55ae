use std::{
    borrow::Cow,
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use parking_lot::Mutex;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    PrepareStart,
    PrepareEnd,
    ConsumeStart,
    ConsumeEnd,
}

/// Per-event timings (microseconds) and the winning class.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceRecord {
    pub prepare_start: i64,
    pub prepare_end: i64,
    pub consume_start: i64,
    pub consume_end: i64,
    pub top_label: String,
    pub top_score: f32,
}

/// Monotonic microsecond clock, anchored to wall time when constructed so
/// values stay comparable across runs.
#[derive(Debug, Clone, Copy)]
pub struct TimingRecorder {
    origin: Instant,
    epoch_us: i64,
}

impl Default for TimingRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingRecorder {
    pub fn new() -> Self {
        let epoch_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Self {
            origin: Instant::now(),
            epoch_us,
        }
    }

    pub fn now_micros(&self) -> i64 {
        self.epoch_us + self.origin.elapsed().as_micros() as i64
    }

    pub fn mark(&self, record: &mut InferenceRecord, checkpoint: Checkpoint) {
        let now = self.now_micros();
        let slot = match checkpoint {
            Checkpoint::PrepareStart => &mut record.prepare_start,
            Checkpoint::PrepareEnd => &mut record.prepare_end,
            Checkpoint::ConsumeStart => &mut record.consume_start,
            Checkpoint::ConsumeEnd => &mut record.consume_end,
        };
        *slot = now;
    }

    /// Six comma-separated fields. A label holding a comma, quote or line
    /// break is CSV-quoted so the line keeps six fields.
    pub fn serialize(record: &InferenceRecord) -> String {
        format!(
            "{},{},{},{},{},{}\n",
            record.prepare_start,
            record.prepare_end,
            record.consume_start,
            record.consume_end,
            csv_field(&record.top_label),
            record.top_score
        )
    }
}

fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// Append-only result file shared by every in-flight event.
pub struct OutputLog {
    file: Mutex<File>,
}

impl OutputLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// One locked write per line, so concurrent events never interleave.
    pub fn append(&self, record: &InferenceRecord) -> Result<()> {
        let line = TimingRecorder::serialize(record);
        let mut file = self.file.lock();
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}
