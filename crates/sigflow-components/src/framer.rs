//! Overlapping frames from a scalar stream.

use sigflow_core::{
    Block, Component, ComponentError, DataMemory, LevelId, Padding, ReaderId, SetupContext, SetupStatus, Tick,
    TickOutcome, TimeMeta,
};

use crate::io::{LevelReader, LevelWriter};

/// Frames produced per tick at most.
const MAX_FRAMES_PER_TICK: usize = 32;

/// Groups a width-1 stream into frames of `frame_size` samples, starting a
/// new frame every `step` samples.
///
/// The output level has one array field `frame` of width `frame_size` and a
/// period of `step` input periods. Input is released as soon as no future
/// frame needs it. Once end of input is signalled the remaining partial
/// frames are emitted with zero padding.
///
/// ## Parameters
///
/// | Key | Meaning | Default |
/// |-----|---------|---------|
/// | `frame_size` | samples per frame | 512 |
/// | `step` | samples between frame starts | `frame_size` |
/// | `reader.level` | input level | `pcm` |
/// | `writer.*` | output level | `frames` |
#[derive(Debug, Clone)]
pub struct Framer {
    reader: LevelReader,
    writer: LevelWriter,
    frame_size: usize,
    step: usize,
    next_start: i64,
}

impl Framer {
    /// Framer reading `input` into level `frames`.
    pub fn new(input: &str, frame_size: usize, step: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            reader: LevelReader::new(input, frame_size),
            writer: LevelWriter::new("frames"),
            frame_size,
            step: step.max(1),
            next_start: 0,
        }
    }

    /// Start index of the next frame in the input level.
    pub fn next_start(&self) -> i64 {
        self.next_start
    }

    fn emit(&mut self, store: &DataMemory, input: (LevelId, ReaderId), eoi: bool) -> Result<usize, ComponentError> {
        let (id, reader) = input;
        let cur_w = store.current_write(id)?;
        let mut free = self.writer.free(store)?;
        let mut produced = 0;
        let mut out = Block::with_capacity(self.frame_size, MAX_FRAMES_PER_TICK);

        while produced < MAX_FRAMES_PER_TICK && free > 0 {
            let start = self.next_start;
            let end = start + self.frame_size as i64;
            let complete = end <= cur_w;
            if !complete && !(eoi && start < cur_w) {
                break;
            }
            let samples = store.get_block(id, None, start, self.frame_size, Padding::Zero)?;
            let first = samples.meta(0);
            let meta = TimeMeta::default().with_time(first.time, first.length_sec * self.frame_size as f64);
            out.push(samples.values(), meta);
            self.next_start += self.step as i64;
            produced += 1;
            free -= 1;
        }

        if produced > 0 {
            self.writer.write(store, &out)?;
            store.catch_up_read_cursor(id, Some(reader), self.next_start.min(cur_w))?;
        }
        Ok(produced)
    }
}

impl Component for Framer {
    fn register_instance(&mut self, ctx: &SetupContext<'_>) -> Result<SetupStatus, ComponentError> {
        let cfg = &ctx.config;
        if cfg.is_set("frame_size") {
            self.frame_size = cfg.require_count("frame_size")?;
            self.step = self.frame_size;
        }
        if cfg.is_set("step") {
            self.step = cfg.require_count("step")?;
        }
        let level = cfg.string_or("reader.level", self.reader.name());
        self.reader = LevelReader::new(level, self.frame_size);
        self.writer = LevelWriter::from_config(cfg, "writer", self.writer.name())?;
        self.reader.register(ctx);
        self.writer.register(ctx)?;
        Ok(SetupStatus::Done)
    }

    fn configure_instance(&mut self, ctx: &SetupContext<'_>) -> Result<SetupStatus, ComponentError> {
        if self.reader.configure(ctx)? == SetupStatus::Retry {
            return Ok(SetupStatus::Retry);
        }
        if self.writer.id().is_none() {
            let upstream = self.reader.upstream(ctx.store)?;
            if upstream.width != 1 {
                return Err(ComponentError::invalid(
                    "reader.level",
                    format!("'{}' has width {}, expected 1", self.reader.name(), upstream.width),
                ));
            }
            let config = self
                .writer
                .level_config(upstream.period * self.step as f64)
                .with_frame_size_sec(upstream.period * self.frame_size as f64);
            self.writer
                .create(ctx.store, config, &[("frame", self.frame_size)], MAX_FRAMES_PER_TICK)?;
        }
        Ok(SetupStatus::Done)
    }

    fn tick(&mut self, tick: &Tick, store: &DataMemory) -> Result<TickOutcome, ComponentError> {
        let Some(input) = self.reader.handle() else {
            return Ok(TickOutcome::Inactive);
        };
        if self.writer.free(store)? == 0 {
            return Ok(TickOutcome::DestinationNoSpace);
        }
        if self.emit(store, input, tick.eoi)? > 0 {
            return Ok(TickOutcome::Success);
        }
        Ok(if tick.eoi {
            TickOutcome::Inactive
        } else {
            TickOutcome::SourceNotAvailable
        })
    }
}
