//! Frame-by-frame transforms: one input level, one output level, one output
//! frame per input frame.

use sigflow_core::{Block, Component, ComponentError, DataMemory, SetupContext, SetupStatus, Tick, TickOutcome};

use crate::io::{LevelReader, LevelWriter, Upstream};

/// Per-frame mapping applied by a [`Transform`].
pub trait FrameMap: Send {
    /// Output layout for a given input layout.
    fn output_fields(&self, input: &Upstream) -> Vec<(String, usize)>;

    /// Read instance parameters.
    fn configure(&mut self, _ctx: &SetupContext<'_>) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Map one input frame to `out`.
    fn map(&self, input: &[f32], out: &mut Vec<f32>);
}

/// A reader, a writer and a [`FrameMap`] between them.
///
/// Tick outcomes: [`TickOutcome::DestinationNoSpace`] when the output is
/// full, [`TickOutcome::SourceNotAvailable`] when the input is empty (or
/// [`TickOutcome::Inactive`] once end of input is reached), otherwise
/// [`TickOutcome::Success`].
#[derive(Debug)]
pub struct Transform<M> {
    reader: LevelReader,
    writer: LevelWriter,
    default_output: &'static str,
    map: M,
}

impl<M: FrameMap> Transform<M> {
    /// Transform from `input` to `output`.
    pub fn new(input: &str, output: &'static str, map: M) -> Self {
        Self {
            reader: LevelReader::new(input, crate::io::DEFAULT_BLOCKSIZE),
            writer: LevelWriter::new(output),
            default_output: output,
            map,
        }
    }

    /// The mapping.
    pub fn map(&self) -> &M {
        &self.map
    }
}

impl<M: FrameMap> Component for Transform<M> {
    fn register_instance(&mut self, ctx: &SetupContext<'_>) -> Result<SetupStatus, ComponentError> {
        self.reader = LevelReader::from_config(&ctx.config, "reader", self.reader.name())?;
        self.writer = LevelWriter::from_config(&ctx.config, "writer", self.default_output)?;
        self.map.configure(ctx)?;
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
            let fields = self.map.output_fields(&upstream);
            let fields: Vec<(&str, usize)> = fields.iter().map(|(n, w)| (n.as_str(), *w)).collect();
            let config = self.writer.level_config(upstream.period);
            self.writer
                .create(ctx.store, config, &fields, self.reader.blocksize())?;
        }
        Ok(SetupStatus::Done)
    }

    fn tick(&mut self, tick: &Tick, store: &DataMemory) -> Result<TickOutcome, ComponentError> {
        let free = self.writer.free(store)?;
        if free == 0 {
            return Ok(TickOutcome::DestinationNoSpace);
        }
        let Some(input) = self.reader.read_at_most(store, free)? else {
            return Ok(if tick.eoi {
                TickOutcome::Inactive
            } else {
                TickOutcome::SourceNotAvailable
            });
        };
        let mut output: Option<Block> = None;
        let mut values = Vec::new();
        for (frame, meta) in input.frames() {
            values.clear();
            self.map.map(frame, &mut values);
            let out = output.get_or_insert_with(|| Block::with_capacity(values.len(), input.len()));
            out.push(&values, meta.clone());
        }
        if let Some(out) = output {
            self.writer.write(store, &out)?;
        }
        Ok(TickOutcome::Success)
    }
}

/// Multiplies every element by a gain. Parameter `gain` (default 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gain {
    /// Linear gain.
    pub gain: f32,
}

impl FrameMap for Gain {
    fn output_fields(&self, input: &Upstream) -> Vec<(String, usize)> {
        vec![("scaled".to_string(), input.width)]
    }

    fn configure(&mut self, ctx: &SetupContext<'_>) -> Result<(), ComponentError> {
        self.gain = ctx.config.double_or("gain", f64::from(self.gain)) as f32;
        Ok(())
    }

    fn map(&self, input: &[f32], out: &mut Vec<f32>) {
        out.extend(input.iter().map(|v| v * self.gain));
    }
}

/// Root mean square of each frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RootMeanSquare;

impl FrameMap for RootMeanSquare {
    fn output_fields(&self, _input: &Upstream) -> Vec<(String, usize)> {
        vec![("rms".to_string(), 1)]
    }

    fn map(&self, input: &[f32], out: &mut Vec<f32>) {
        if input.is_empty() {
            out.push(0.0);
            return;
        }
        let sum: f32 = input.iter().map(|v| v * v).sum();
        out.push((sum / input.len() as f32).sqrt());
    }
}

/// Scales a level by a constant gain.
pub type Scale = Transform<Gain>;

/// Reduces each frame to its RMS value.
pub type Rms = Transform<RootMeanSquare>;

impl Scale {
    /// Scale `input` into level `scaled`.
    pub fn with_gain(input: &str, gain: f32) -> Self {
        Transform::new(input, "scaled", Gain { gain })
    }
}

impl Rms {
    /// RMS of `input` into level `rms`.
    pub fn of(input: &str) -> Self {
        Transform::new(input, "rms", RootMeanSquare)
    }
}
