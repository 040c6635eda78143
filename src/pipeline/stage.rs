//! Purpose: Stage contract for concurrent row transforms plus the generic transform stage.
//! Exports: `Stage`, `StageIo`, `Recv`, `Flow`, `RowTransform`, `TransformedRow`, `TransformStage`.
//! Role: Building block composed by `Pipeline`; each stage runs as its own task.
//! Invariants: Every wait (receive, send, failure report) also waits on cancellation.
//! Invariants: Once cancelled, a stage forwards nothing more and does not drain its input.
//! Invariants: Per-row failures go to the failure queue; the stage keeps running.
//! Invariants: Returning from `run` drops the senders, which closes the downstream queues.
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::row::Row;
use crate::pipeline::props::PropMap;
use crate::pipeline::{RowWithProps, TransformFailure};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flow {
    Continue,
    Stop,
}

#[derive(Debug)]
pub enum Recv {
    Item(RowWithProps),
    Exhausted,
    Cancelled,
}

#[derive(Debug)]
pub struct StageIo {
    pub input: mpsc::Receiver<RowWithProps>,
    pub output: mpsc::Sender<RowWithProps>,
    pub failures: mpsc::Sender<TransformFailure>,
    pub cancel: CancellationToken,
}

impl StageIo {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn recv(&mut self) -> Recv {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Recv::Cancelled,
            item = self.input.recv() => match item {
                Some(item) => Recv::Item(item),
                None => Recv::Exhausted,
            },
        }
    }

    /// Forwards a row downstream. `Stop` means cancellation or a closed output queue.
    pub async fn emit(&self, item: RowWithProps) -> Flow {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Flow::Stop,
            sent = self.output.send(item) => match sent {
                Ok(()) => Flow::Continue,
                Err(_) => Flow::Stop,
            },
        }
    }

    /// Reports a rejected row. Only cancellation stops the caller; a failure queue
    /// nobody listens to drops the report.
    pub async fn fail(&self, failure: TransformFailure) -> Flow {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Flow::Stop,
            sent = self.failures.send(failure) => {
                if let Err(err) = sent {
                    tracing::debug!(stage = %err.0.stage, "failure queue closed; dropping report");
                }
                Flow::Continue
            }
        }
    }
}

#[async_trait]
pub trait Stage: Send {
    fn name(&self) -> &str;

    async fn run(self: Box<Self>, io: StageIo);
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransformedRow {
    pub row: Row,
    pub prop_updates: Vec<(String, JsonValue)>,
}

impl TransformedRow {
    pub fn new(row: Row) -> Self {
        Self {
            row,
            prop_updates: Vec::new(),
        }
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.prop_updates.push((key.into(), value));
        self
    }
}

/// Per-row transform: zero or more output rows, or a failure detail for this row.
pub trait RowTransform: Send {
    fn transform(&mut self, row: &Row, props: &PropMap) -> Result<Vec<TransformedRow>, String>;
}

impl<F> RowTransform for F
where
    F: FnMut(&Row, &PropMap) -> Result<Vec<TransformedRow>, String> + Send,
{
    fn transform(&mut self, row: &Row, props: &PropMap) -> Result<Vec<TransformedRow>, String> {
        self(row, props)
    }
}

/// Runs one item through `transform`, forwarding results or reporting the failure.
pub(crate) async fn apply_transform<T>(
    transform: &mut T,
    stage: &str,
    item: RowWithProps,
    io: &StageIo,
) -> Flow
where
    T: RowTransform + ?Sized,
{
    match transform.transform(&item.row, &item.props) {
        Ok(results) => {
            for result in results {
                let props = if result.prop_updates.is_empty() {
                    item.props.clone()
                } else {
                    item.props.set(result.prop_updates)
                };
                let flow = io
                    .emit(RowWithProps {
                        row: result.row,
                        props,
                    })
                    .await;
                if flow == Flow::Stop {
                    return Flow::Stop;
                }
            }
            Flow::Continue
        }
        Err(detail) => {
            tracing::warn!(stage, detail = %detail, "row rejected");
            io.fail(TransformFailure {
                row: item.row,
                stage: stage.to_string(),
                detail,
            })
            .await
        }
    }
}

pub struct TransformStage<T> {
    name: String,
    transform: T,
}

impl<T: RowTransform> TransformStage<T> {
    pub fn new(name: impl Into<String>, transform: T) -> Self {
        Self {
            name: name.into(),
            transform,
        }
    }
}

#[async_trait]
impl<T: RowTransform + 'static> Stage for TransformStage<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(self: Box<Self>, mut io: StageIo) {
        let TransformStage {
            name,
            mut transform,
        } = *self;
        tracing::debug!(stage = %name, "stage started");
        let mut forwarded = 0u64;
        loop {
            match io.recv().await {
                Recv::Item(item) => {
                    if apply_transform(&mut transform, &name, item, &io).await == Flow::Stop {
                        tracing::debug!(stage = %name, forwarded, "stage stopped");
                        return;
                    }
                    forwarded += 1;
                }
                Recv::Exhausted => break,
                Recv::Cancelled => {
                    tracing::debug!(stage = %name, forwarded, "stage cancelled");
                    return;
                }
            }
        }
        tracing::debug!(stage = %name, forwarded, "stage finished");
    }
}
