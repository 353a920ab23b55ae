//! Jet image tagging: rasterize the leading jet of an event, classify the
//! image through an inference transport, and log the ranked result with
//! per-event timings.

pub mod client;
pub mod config;
pub mod encoder;
pub mod error;
pub mod executor;
pub mod labels;
pub mod ranker;
pub mod request;
pub mod source;
pub mod timing;
pub mod types;

pub use client::{InferenceClient, LocalClient, RemoteClient};
pub use config::{ClientKind, Config, ConfigError};
pub use encoder::{Image, ImageEncoder};
pub use error::{Error, Result};
pub use executor::{
    EventPhase, Outcome, PendingEvent, PreparedEvent, RunSummary, TwoPhaseExecutor,
};
pub use labels::LabelList;
pub use ranker::{Ranked, RankedResult, ResultRanker};
pub use request::InferenceRequestBuilder;
pub use source::EventSource;
pub use timing::{Checkpoint, InferenceRecord, OutputLog, TimingRecorder};
pub use types::{Event, JetCluster, Particle};
