//! Purpose: Compose a row source, transform stages, and a sink into a cancellable pipeline.
//! Exports: `RowWithProps`, `TransformFailure`, `PipelineConfig`, `Pipeline`, `RunningPipeline`,
//! Exports: `PipelineOutputs`, `PipelineResult`, plus the `stage` and `props` building blocks.
//! Role: Async runtime glue; every stage and the source feeder run as separate tasks.
//! Invariants: Stages share nothing but bounded queues and one cancellation token.
//! Invariants: Cancellation is a normal outcome; it never surfaces as an `Error`.
//! Invariants: A decode error from the source cancels the run and is returned by `wait`.
pub mod props;
pub mod stage;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::error::{Error, ErrorKind};
use crate::core::row::Row;
use crate::core::row_iter::RowIter;
pub use props::PropMap;
pub use stage::{Flow, Recv, RowTransform, Stage, StageIo, TransformStage, TransformedRow};

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Debug, PartialEq)]
pub struct RowWithProps {
    pub row: Row,
    pub props: PropMap,
}

impl RowWithProps {
    pub fn new(row: Row) -> Self {
        Self {
            row,
            props: PropMap::new(),
        }
    }

    pub fn with_props(row: Row, props: PropMap) -> Self {
        Self { row, props }
    }
}

/// One row rejected by one stage. Reported on the failure queue; never fatal.
#[derive(Clone, Debug, PartialEq)]
pub struct TransformFailure {
    pub row: Row,
    pub stage: String,
    pub detail: String,
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineConfig {
    pub channel_capacity: usize,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.channel_capacity == 0 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("channel capacity must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    source: RowIter,
    injected: Vec<RowWithProps>,
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(source: RowIter, config: PipelineConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            injected: Vec::new(),
            stages: Vec::new(),
        })
    }

    /// Queues a row that enters the first stage ahead of every source row.
    pub fn inject_row(mut self, item: RowWithProps) -> Self {
        self.injected.push(item);
        self
    }

    pub fn add_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Spawns the source feeder and every stage. Must be called inside a tokio runtime.
    pub fn start(self) -> (RunningPipeline, PipelineOutputs) {
        let capacity = self.config.channel_capacity;
        let cancel = CancellationToken::new();
        let (fail_tx, fail_rx) = mpsc::channel(capacity);
        let (source_tx, mut upstream) = mpsc::channel(capacity);

        let source = tokio::spawn(feed_source(
            self.source,
            self.injected,
            source_tx,
            cancel.clone(),
        ));

        let mut stages = Vec::with_capacity(self.stages.len());
        for stage in self.stages {
            let (out_tx, out_rx) = mpsc::channel(capacity);
            let io = StageIo {
                input: upstream,
                output: out_tx,
                failures: fail_tx.clone(),
                cancel: cancel.clone(),
            };
            let name = stage.name().to_string();
            stages.push((name, tokio::spawn(stage.run(io))));
            upstream = out_rx;
        }
        drop(fail_tx);

        (
            RunningPipeline {
                cancel,
                source,
                stages,
            },
            PipelineOutputs {
                rows: upstream,
                failures: fail_rx,
            },
        )
    }

    /// Runs to completion, collecting every delivered row and failure.
    pub async fn run_to_end(self) -> Result<PipelineResult, Error> {
        let (running, mut outputs) = self.start();
        let mut result = PipelineResult::default();
        let mut rows_open = true;
        let mut failures_open = true;
        while rows_open || failures_open {
            tokio::select! {
                item = outputs.rows.recv(), if rows_open => match item {
                    Some(item) => result.rows.push(item),
                    None => rows_open = false,
                },
                failure = outputs.failures.recv(), if failures_open => match failure {
                    Some(failure) => result.failures.push(failure),
                    None => failures_open = false,
                },
            }
        }
        running.wait().await?;
        Ok(result)
    }
}

pub struct PipelineOutputs {
    pub rows: mpsc::Receiver<RowWithProps>,
    pub failures: mpsc::Receiver<TransformFailure>,
}

#[derive(Debug, Default)]
pub struct PipelineResult {
    pub rows: Vec<RowWithProps>,
    pub failures: Vec<TransformFailure>,
}

pub struct RunningPipeline {
    cancel: CancellationToken,
    source: JoinHandle<Result<(), Error>>,
    stages: Vec<(String, JoinHandle<()>)>,
}

impl RunningPipeline {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for every task. Returns the source's error, if any; cancellation is `Ok`.
    pub async fn wait(self) -> Result<(), Error> {
        let source = self.source.await.map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("row source task failed")
                .with_source(err)
        });
        for (name, handle) in self.stages {
            if let Err(err) = handle.await {
                return Err(Error::new(ErrorKind::Internal)
                    .with_message(format!("stage '{name}' failed"))
                    .with_source(err));
            }
        }
        source?
    }
}

async fn send_or_cancel(
    output: &mpsc::Sender<RowWithProps>,
    item: RowWithProps,
    cancel: &CancellationToken,
) -> Flow {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Flow::Stop,
        sent = output.send(item) => match sent {
            Ok(()) => Flow::Continue,
            Err(_) => Flow::Stop,
        },
    }
}

async fn feed_source(
    mut source: RowIter,
    injected: Vec<RowWithProps>,
    output: mpsc::Sender<RowWithProps>,
    cancel: CancellationToken,
) -> Result<(), Error> {
    let mut pulled = 0u64;
    let mut flow = Flow::Continue;
    for item in injected {
        flow = send_or_cancel(&output, item, &cancel).await;
        if flow == Flow::Stop {
            break;
        }
    }
    let outcome = loop {
        if flow == Flow::Stop || cancel.is_cancelled() {
            break Ok(());
        }
        let row = match source.next_row() {
            Ok(Some(row)) => row,
            Ok(None) => break Ok(()),
            Err(err) => {
                tracing::error!(error = %err, pulled, "row source failed; cancelling pipeline");
                cancel.cancel();
                break Err(err);
            }
        };
        pulled += 1;
        flow = send_or_cancel(&output, RowWithProps::new(row), &cancel).await;
    };
    drop(output);

    let closed = source.close();
    tracing::debug!(pulled, cancelled = cancel.is_cancelled(), "row source finished");
    outcome?;
    closed
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Pipeline, PipelineConfig, RowWithProps, TransformStage, TransformedRow};
    use crate::core::error::{Error, ErrorKind};
    use crate::core::projector::RowProjector;
    use crate::core::row::Row;
    use crate::core::row_iter::{KvPair, RowIter};
    use crate::core::schema::{Column, ColumnType};
    use crate::core::tuple::{StoredValue, TupleBuf};
    use crate::core::value::{RawValue, Value};
    use crate::pipeline::props::PropMap;

    fn projector() -> RowProjector {
        RowProjector::for_columns(vec![Column::new(1, "n", ColumnType::Int).key()])
            .expect("projector")
    }

    fn pair(n: i64) -> Result<KvPair, Error> {
        Ok((
            TupleBuf::key(&[(1, RawValue::Int(n))]).expect("key").into(),
            StoredValue::Absent,
        ))
    }

    fn source(count: i64) -> RowIter {
        RowIter::from_entries((0..count).map(pair), projector())
    }

    fn double(row: &Row, _props: &PropMap) -> Result<Vec<TransformedRow>, String> {
        match row[0] {
            Value::Int(v) if v == 3 => Err("three is rejected".to_string()),
            Value::Int(v) => Ok(vec![TransformedRow::new(Row::new(vec![Value::Int(v * 2)]))]),
            _ => Err("not an int".to_string()),
        }
    }

    #[tokio::test]
    async fn rows_flow_in_order_through_chained_stages() {
        let result = Pipeline::new(source(6), PipelineConfig { channel_capacity: 2 })
            .expect("pipeline")
            .add_stage(TransformStage::new("double", double))
            .add_stage(TransformStage::new(
                "tag",
                |row: &Row, _props: &PropMap| -> Result<Vec<TransformedRow>, String> {
                    Ok(vec![TransformedRow::new(row.clone()).with_prop("seen", true.into())])
                },
            ))
            .run_to_end()
            .await
            .expect("run");

        let values: Vec<_> = result.rows.iter().map(|item| item.row[0].clone()).collect();
        assert_eq!(
            values,
            vec![Value::Int(0), Value::Int(2), Value::Int(4), Value::Int(8), Value::Int(10)]
        );
        assert!(result.rows.iter().all(|item| item.props.get("seen").is_some()));
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].stage, "double");
        assert_eq!(result.failures[0].row[0], Value::Int(3));
    }

    #[tokio::test]
    async fn injected_rows_lead_the_source() {
        let header = RowWithProps::new(Row::new(vec![Value::from("n")]));
        let result = Pipeline::new(source(2), PipelineConfig::default())
            .expect("pipeline")
            .inject_row(header)
            .run_to_end()
            .await
            .expect("run");
        let values: Vec<_> = result.rows.iter().map(|item| item.row[0].clone()).collect();
        assert_eq!(values, vec![Value::from("n"), Value::Int(0), Value::Int(1)]);
    }

    #[tokio::test]
    async fn source_decode_error_is_returned_from_wait() {
        let entries = vec![pair(1), Ok((StoredValue::Blob(vec![9]), StoredValue::Absent)), pair(2)];
        let iter = RowIter::from_entries(entries.into_iter(), projector());
        let err = Pipeline::new(iter, PipelineConfig::default())
            .expect("pipeline")
            .add_stage(TransformStage::new("double", double))
            .run_to_end()
            .await
            .expect_err("decode error");
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }

    #[tokio::test]
    async fn cancel_stops_a_stalled_pipeline() {
        let (running, outputs) = Pipeline::new(source(1_000), PipelineConfig { channel_capacity: 1 })
            .expect("pipeline")
            .add_stage(TransformStage::new("double", double))
            .start();

        tokio::time::sleep(Duration::from_millis(20)).await;
        running.cancel();
        tokio::time::timeout(Duration::from_secs(2), running.wait())
            .await
            .expect("pipeline stops without a reader")
            .expect("cancellation is not an error");
        drop(outputs);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = Pipeline::new(source(1), PipelineConfig { channel_capacity: 0 })
            .err()
            .expect("usage error");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
