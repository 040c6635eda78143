//! Purpose: Pipeline stage that learns column widths from a sample, then formats fixed-width.
//! Exports: `AutoSizingStage`, `AutoSizeConfig`, `AUTO_SIZE_STAGE_NAME`.
//! Role: Two-phase stage; buffers while sampling, then delegates to `FixedWidthFormatter`.
//! Invariants: Row slot `i` corresponds to schema column `i`.
//! Invariants: Widths are learned only while sampling; once materialized they never change.
//! Invariants: Buffered rows are replayed in arrival order, before the row that ended sampling.
//! Invariants: Replay checks cancellation every `REPLAY_CHECKPOINT` rows and on every send.
use std::collections::BTreeMap;
use std::mem;

use async_trait::async_trait;

use crate::core::schema::Schema;
use crate::fwt::formatter::{FixedWidthFormatter, TooLongBehavior};
use crate::fwt::schema::FixedWidthSchema;
use crate::fwt::width::display_width;
use crate::pipeline::RowWithProps;
use crate::pipeline::stage::{Flow, Recv, Stage, StageIo, apply_transform};

pub const AUTO_SIZE_STAGE_NAME: &str = "Auto Sizing Fixed Width Transform";

const REPLAY_CHECKPOINT: usize = 100;
const DEFAULT_SAMPLE_SIZE: usize = 100;

#[derive(Clone, Copy, Debug)]
pub struct AutoSizeConfig {
    /// Rows to sample before widths are fixed. Zero samples the whole input.
    pub sample_size: usize,
    pub too_long: TooLongBehavior,
}

impl AutoSizeConfig {
    fn sample_full(&self, buffered: usize) -> bool {
        self.sample_size > 0 && buffered >= self.sample_size
    }
}

impl Default for AutoSizeConfig {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            too_long: TooLongBehavior::default(),
        }
    }
}

#[derive(Debug, Default)]
struct Sampler {
    widths: BTreeMap<u64, usize>,
    max_chars: BTreeMap<u64, usize>,
    buffer: Vec<RowWithProps>,
}

impl Sampler {
    fn observe(&mut self, schema: &Schema, item: RowWithProps) {
        for (value, column) in item.row.iter().zip(schema.columns()) {
            if value.is_null() {
                continue;
            }
            let text = value.to_string();
            let width = self.widths.entry(column.tag).or_insert(0);
            *width = (*width).max(display_width(&text));
            let chars = self.max_chars.entry(column.tag).or_insert(0);
            *chars = (*chars).max(text.chars().count());
        }
        self.buffer.push(item);
    }
}

#[derive(Debug)]
enum SizingState {
    Sampling(Sampler),
    Materialized(FixedWidthFormatter),
}

#[derive(Debug)]
pub struct AutoSizingStage {
    schema: Schema,
    config: AutoSizeConfig,
    state: SizingState,
}

impl AutoSizingStage {
    pub fn new(schema: Schema, config: AutoSizeConfig) -> Self {
        Self {
            schema,
            config,
            state: SizingState::Sampling(Sampler::default()),
        }
    }

    async fn handle_row(&mut self, item: RowWithProps, io: &StageIo) -> Flow {
        if let SizingState::Sampling(sampler) = &mut self.state {
            if !self.config.sample_full(sampler.buffer.len()) {
                sampler.observe(&self.schema, item);
                return Flow::Continue;
            }
            if self.materialize(io).await == Flow::Stop {
                return Flow::Stop;
            }
        }
        let SizingState::Materialized(formatter) = &mut self.state else {
            return Flow::Continue;
        };
        apply_transform(formatter, AUTO_SIZE_STAGE_NAME, item, io).await
    }

    /// Fixes the learned widths and replays the sample buffer through the formatter.
    async fn materialize(&mut self, io: &StageIo) -> Flow {
        let sampler = match &mut self.state {
            SizingState::Sampling(sampler) => mem::take(sampler),
            SizingState::Materialized(_) => return Flow::Continue,
        };
        let widths =
            FixedWidthSchema::from_learned(&self.schema, &sampler.widths, &sampler.max_chars);
        tracing::debug!(
            stage = AUTO_SIZE_STAGE_NAME,
            buffered = sampler.buffer.len(),
            line_width = widths.line_width(),
            "column widths fixed"
        );
        let mut formatter = FixedWidthFormatter::new(widths, self.config.too_long);

        let mut flow = Flow::Continue;
        for (i, item) in sampler.buffer.into_iter().enumerate() {
            if i % REPLAY_CHECKPOINT == 0 && io.is_cancelled() {
                flow = Flow::Stop;
                break;
            }
            if apply_transform(&mut formatter, AUTO_SIZE_STAGE_NAME, item, io).await == Flow::Stop
            {
                flow = Flow::Stop;
                break;
            }
        }
        self.state = SizingState::Materialized(formatter);
        flow
    }
}

#[async_trait]
impl Stage for AutoSizingStage {
    fn name(&self) -> &str {
        AUTO_SIZE_STAGE_NAME
    }

    async fn run(self: Box<Self>, mut io: StageIo) {
        let mut stage = *self;
        tracing::debug!(
            stage = AUTO_SIZE_STAGE_NAME,
            sample_size = stage.config.sample_size,
            "stage started"
        );
        loop {
            match io.recv().await {
                Recv::Item(item) => {
                    if stage.handle_row(item, &io).await == Flow::Stop {
                        tracing::debug!(stage = AUTO_SIZE_STAGE_NAME, "stage stopped");
                        return;
                    }
                }
                Recv::Exhausted => break,
                Recv::Cancelled => {
                    tracing::debug!(stage = AUTO_SIZE_STAGE_NAME, "stage cancelled");
                    return;
                }
            }
        }
        if matches!(stage.state, SizingState::Sampling(_)) {
            tracing::debug!(stage = AUTO_SIZE_STAGE_NAME, "input ended while sampling; flushing");
            if stage.materialize(&io).await == Flow::Stop {
                return;
            }
        }
        tracing::debug!(stage = AUTO_SIZE_STAGE_NAME, "stage finished");
    }
}
