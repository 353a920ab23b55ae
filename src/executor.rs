//! Two-phase event execution: `prepare` turns an event into a request tensor,
//! the transport runs the classifier, `consume` ranks the response and writes
//! the timing line.
//!
//! Per-event state lives in [`PendingEvent`], which is moved from `prepare`
//! to `consume`; nothing about an in-flight event is stored on the executor,
//! so any number of events may be awaiting inference at once.

use std::{fmt, sync::Arc, time::Duration};

use futures::{stream, StreamExt};
use tch::Tensor;

use crate::{
    client::InferenceClient,
    config::Config,
    encoder::ImageEncoder,
    error::{Error, Result},
    labels::LabelList,
    ranker::{RankedResult, ResultRanker},
    request::{scores_from_tensor, InferenceRequestBuilder},
    timing::{Checkpoint, InferenceRecord, OutputLog, TimingRecorder},
    types::Event,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPhase {
    Idle,
    Preparing,
    AwaitingInference,
    Consuming,
    Done,
    Failed,
}

impl fmt::Display for EventPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An event suspended between the two phases. Owns its record exclusively.
#[derive(Debug)]
pub struct PendingEvent {
    event_id: u64,
    phase: EventPhase,
    record: InferenceRecord,
}

impl PendingEvent {
    fn new(event_id: u64) -> Self {
        Self {
            event_id,
            phase: EventPhase::Idle,
            record: InferenceRecord::default(),
        }
    }

    pub fn event_id(&self) -> u64 {
        self.event_id
    }

    pub fn phase(&self) -> EventPhase {
        self.phase
    }

    pub fn record(&self) -> &InferenceRecord {
        &self.record
    }

    fn enter(&mut self, next: EventPhase) {
        tracing::debug!(event = self.event_id, from = %self.phase, to = %next, "phase");
        self.phase = next;
    }
}

/// Output of the prepare phase: the request for the transport plus the
/// suspended event to hand back to `consume`.
pub struct PreparedEvent {
    pub request: Tensor,
    pub pending: PendingEvent,
}

#[derive(Debug)]
pub enum Outcome {
    Done {
        event_id: u64,
        record: InferenceRecord,
        ranked: RankedResult,
    },
    /// Inference never produced a usable response; nothing was logged.
    Failed { event_id: u64, reason: Error },
}

impl Outcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done { .. })
    }
}

/// Counts from [`TwoPhaseExecutor::run`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub done: usize,
    pub failed: usize,
}

pub struct TwoPhaseExecutor {
    encoder: ImageEncoder,
    builder: InferenceRequestBuilder,
    ranker: ResultRanker,
    labels: Arc<LabelList>,
    output: Arc<OutputLog>,
    clock: TimingRecorder,
    collection: String,
    timeout: Duration,
}

impl TwoPhaseExecutor {
    pub fn new(
        encoder: ImageEncoder,
        ranker: ResultRanker,
        labels: Arc<LabelList>,
        output: Arc<OutputLog>,
        collection: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            encoder,
            builder: InferenceRequestBuilder::default(),
            ranker,
            labels,
            output,
            clock: TimingRecorder::new(),
            collection: collection.into(),
            timeout,
        }
    }

    pub fn from_config(cfg: &Config, labels: Arc<LabelList>, output: Arc<OutputLog>) -> Self {
        Self::new(
            ImageEncoder::new(cfg.grid_size, cfg.channels),
            ResultRanker::new(cfg.top_n),
            labels,
            output,
            cfg.input_collection_id.clone(),
            cfg.inference_timeout,
        )
    }

    /// Encodes the leading jet of `event` and builds the request tensor.
    pub fn prepare(&self, event: &Event) -> Result<PreparedEvent> {
        let mut pending = PendingEvent::new(event.id);
        pending.enter(EventPhase::Preparing);
        self.clock.mark(&mut pending.record, Checkpoint::PrepareStart);

        let jet = event.leading_jet(&self.collection);
        if jet.is_none() {
            tracing::debug!(event = event.id, collection = %self.collection, "no jet in event");
        }
        let image = self.encoder.encode(jet);
        let request = self.builder.build(&image)?;

        self.clock.mark(&mut pending.record, Checkpoint::PrepareEnd);
        pending.enter(EventPhase::AwaitingInference);
        Ok(PreparedEvent { request, pending })
    }

    /// Ranks the classifier output and appends the event's line to the log.
    pub fn consume(&self, mut pending: PendingEvent, response: &Tensor) -> Result<Outcome> {
        pending.enter(EventPhase::Consuming);
        self.clock.mark(&mut pending.record, Checkpoint::ConsumeStart);

        let scores = scores_from_tensor(response)?;
        let ranked = self.ranker.rank(&scores, &self.labels);
        match ranked.top() {
            Some(top) => {
                pending.record.top_label = top.label.clone();
                pending.record.top_score = top.score;
            }
            None => tracing::warn!(event = pending.event_id, "no scores to rank"),
        }
        tracing::info!(event = pending.event_id, "{}", ranked);

        self.clock.mark(&mut pending.record, Checkpoint::ConsumeEnd);
        self.output.append(&pending.record)?;
        pending.enter(EventPhase::Done);

        Ok(Outcome::Done {
            event_id: pending.event_id,
            record: pending.record,
            ranked,
        })
    }

    /// Abandons an event stuck in `AwaitingInference`. No line is written.
    pub fn fail(&self, mut pending: PendingEvent, reason: Error) -> Outcome {
        pending.enter(EventPhase::Failed);
        tracing::warn!(event = pending.event_id, error = %reason, "inference failed; event skipped");
        pending.enter(EventPhase::Idle);
        Outcome::Failed {
            event_id: pending.event_id,
            reason,
        }
    }

    /// Drives one event through both phases. The transport is raced against
    /// the configured timeout; transport errors and timeouts become
    /// [`Outcome::Failed`], anything else is returned as an error.
    pub async fn process(&self, event: &Event, client: &dyn InferenceClient) -> Result<Outcome> {
        let PreparedEvent { request, pending } = self.prepare(event)?;
        let response = match tokio::time::timeout(self.timeout, client.submit(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Ok(self.fail(pending, e)),
            Err(_) => return Ok(self.fail(pending, Error::Timeout(self.timeout))),
        };
        self.consume(pending, &response)
    }

    /// Processes at most `max_events` events, keeping up to `streams` of them
    /// in flight. Stops at the first event that cannot be read or prepared.
    pub async fn run<I>(
        &self,
        events: I,
        client: &dyn InferenceClient,
        streams: usize,
        max_events: Option<usize>,
    ) -> Result<RunSummary>
    where
        I: IntoIterator<Item = Result<Event>>,
    {
        let limit = max_events.unwrap_or(usize::MAX);
        let mut results = stream::iter(events.into_iter().take(limit))
            .map(move |event| async move {
                let event = event?;
                self.process(&event, client).await
            })
            .buffer_unordered(streams.max(1));

        let mut summary = RunSummary::default();
        while let Some(res) = results.next().await {
            match res? {
                Outcome::Done { .. } => summary.done += 1,
                Outcome::Failed { .. } => summary.failed += 1,
            }
        }
        Ok(summary)
    }
}
