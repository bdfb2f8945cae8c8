//! Test signal source.
//!
//! Writes a fixed number of frames of a sine, ramp or constant into a
//! scalar level, one block per tick, then goes inactive.

use std::f64::consts::TAU;

use sigflow_core::{
    Block, Component, ComponentError, DataMemory, SetupContext, SetupStatus, Tick, TickOutcome, TimeMeta,
};

use crate::io::LevelWriter;

/// Waveform of a [`SignalGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    /// `amplitude * sin(2π f t)`
    Sine,
    /// Sample index scaled by `amplitude`.
    Ramp,
    /// `amplitude` on every sample.
    Constant,
}

impl Waveform {
    /// Parse a waveform name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sine" | "sin" => Some(Waveform::Sine),
            "ramp" => Some(Waveform::Ramp),
            "constant" | "dc" => Some(Waveform::Constant),
            _ => None,
        }
    }
}

/// Signal generator.
///
/// ## Parameters
///
/// | Key | Meaning | Default |
/// |-----|---------|---------|
/// | `frames` | frames to produce (required unless set in code) | |
/// | `sample_rate` | frames per second | 16000 |
/// | `frequency` | sine frequency in Hz | 440 |
/// | `amplitude` | peak value | 1.0 |
/// | `waveform` | `sine`, `ramp` or `constant` | `sine` |
/// | `blocksize` | frames per tick | 256 |
/// | `writer.*` | output level, see [`crate::io`] | `pcm` |
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    writer: LevelWriter,
    waveform: Waveform,
    frames: usize,
    sample_rate: f64,
    frequency: f64,
    amplitude: f32,
    blocksize: usize,
    written: usize,
}

impl SignalGenerator {
    /// Generator writing `frames` sine frames to `level`.
    pub fn new(level: &str, frames: usize) -> Self {
        Self {
            writer: LevelWriter::new(level),
            waveform: Waveform::Sine,
            frames,
            sample_rate: 16000.0,
            frequency: 440.0,
            amplitude: 1.0,
            blocksize: 256,
            written: 0,
        }
    }

    /// Set the waveform.
    pub fn with_waveform(mut self, waveform: Waveform) -> Self {
        self.waveform = waveform;
        self
    }

    /// Frames written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    fn sample(&self, index: usize) -> f32 {
        match self.waveform {
            Waveform::Sine => {
                let t = index as f64 / self.sample_rate;
                self.amplitude * (TAU * self.frequency * t).sin() as f32
            }
            Waveform::Ramp => self.amplitude * index as f32,
            Waveform::Constant => self.amplitude,
        }
    }
}

impl Component for SignalGenerator {
    fn register_instance(&mut self, ctx: &SetupContext<'_>) -> Result<SetupStatus, ComponentError> {
        let cfg = &ctx.config;
        if cfg.is_set("frames") || self.frames == 0 {
            self.frames = cfg.require_count("frames")?;
        }
        self.sample_rate = cfg.double_or("sample_rate", self.sample_rate);
        if self.sample_rate <= 0.0 {
            return Err(ComponentError::invalid("sample_rate", "must be positive"));
        }
        self.frequency = cfg.double_or("frequency", self.frequency);
        self.amplitude = cfg.double_or("amplitude", f64::from(self.amplitude)) as f32;
        if let Some(name) = cfg.string("waveform") {
            self.waveform = Waveform::parse(&name)
                .ok_or_else(|| ComponentError::invalid("waveform", format!("unknown waveform '{name}'")))?;
        }
        self.blocksize = usize::try_from(cfg.int_or("blocksize", self.blocksize as i64))
            .ok()
            .filter(|b| *b > 0)
            .ok_or_else(|| ComponentError::invalid("blocksize", "expected a positive count"))?;
        self.writer = LevelWriter::from_config(cfg, "writer", self.writer.name())?;
        self.writer.register(ctx)?;
        Ok(SetupStatus::Done)
    }

    fn configure_instance(&mut self, ctx: &SetupContext<'_>) -> Result<SetupStatus, ComponentError> {
        if self.writer.id().is_none() {
            let config = self.writer.level_config(1.0 / self.sample_rate);
            self.writer.create(ctx.store, config, &[("pcm", 1)], self.blocksize)?;
        }
        Ok(SetupStatus::Done)
    }

    fn tick(&mut self, _tick: &Tick, store: &DataMemory) -> Result<TickOutcome, ComponentError> {
        if self.written >= self.frames {
            return Ok(TickOutcome::Inactive);
        }
        let free = self.writer.free(store)?;
        if free == 0 {
            return Ok(TickOutcome::DestinationNoSpace);
        }
        let n = self.blocksize.min(free).min(self.frames - self.written);
        let mut block = Block::with_capacity(1, n);
        for i in self.written..self.written + n {
            block.push(&[self.sample(i)], TimeMeta::default());
        }
        self.writer.write(store, &block)?;
        self.written += n;
        Ok(TickOutcome::Success)
    }
}
