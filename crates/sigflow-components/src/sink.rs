//! Sinks: components that consume a level and leave the graph.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use sigflow_core::{
    Block, Component, ComponentError, DataMemory, Frame, SetupContext, SetupStatus, Tick, TickOutcome,
};
use tracing::{debug, info};

use crate::io::LevelReader;

/// Frames collected by a [`CollectSink`].
pub type Collected = Arc<Mutex<Vec<Frame>>>;

/// Keeps every frame it reads in memory.
///
/// The frames are shared through [`Collected`], so the caller can inspect
/// them after (or during) a run.
#[derive(Debug)]
pub struct CollectSink {
    reader: LevelReader,
    frames: Collected,
}

impl CollectSink {
    /// Sink reading `level`, with a handle to the collected frames.
    pub fn new(level: &str) -> (Self, Collected) {
        let frames = Collected::default();
        let sink = Self {
            reader: LevelReader::new(level, crate::io::DEFAULT_BLOCKSIZE),
            frames: Arc::clone(&frames),
        };
        (sink, frames)
    }

    /// Handle to the collected frames.
    pub fn frames(&self) -> Collected {
        Arc::clone(&self.frames)
    }
}

impl Component for CollectSink {
    fn register_instance(&mut self, ctx: &SetupContext<'_>) -> Result<SetupStatus, ComponentError> {
        self.reader = LevelReader::from_config(&ctx.config, "reader", self.reader.name())?;
        self.reader.register(ctx);
        Ok(SetupStatus::Done)
    }

    fn configure_instance(&mut self, ctx: &SetupContext<'_>) -> Result<SetupStatus, ComponentError> {
        self.reader.configure(ctx)
    }

    fn tick(&mut self, tick: &Tick, store: &DataMemory) -> Result<TickOutcome, ComponentError> {
        let Some(block) = self.reader.read(store)? else {
            if tick.eoi {
                debug!(level = self.reader.name(), frames = self.frames.lock().len(), "collect sink idle");
                return Ok(TickOutcome::Inactive);
            }
            return Ok(TickOutcome::SourceNotAvailable);
        };
        let mut frames = self.frames.lock();
        frames.extend(block.frames().map(|(values, meta)| Frame {
            values: values.to_vec(),
            meta: meta.clone(),
        }));
        Ok(TickOutcome::Success)
    }
}

/// Writes a level to a CSV file, one row per frame.
///
/// The header is `index,time` followed by the element names of the level.
/// Parameter `path` is required; `reader.*` selects the level.
#[derive(Debug)]
pub struct CsvSink {
    reader: LevelReader,
    path: PathBuf,
    out: Option<BufWriter<File>>,
    rows: usize,
}

impl CsvSink {
    /// Sink writing `level` to `path`.
    pub fn new(level: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            reader: LevelReader::new(level, crate::io::DEFAULT_BLOCKSIZE),
            path: path.into(),
            out: None,
            rows: 0,
        }
    }

    /// Rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    fn io_error(&self, err: std::io::Error) -> ComponentError {
        ComponentError::Failed(format!("{}: {err}", self.path.display()))
    }

    fn flush(&mut self) -> Result<(), ComponentError> {
        if let Some(out) = self.out.as_mut() {
            if let Err(e) = out.flush() {
                return Err(self.io_error(e));
            }
        }
        Ok(())
    }
}

impl Component for CsvSink {
    fn register_instance(&mut self, ctx: &SetupContext<'_>) -> Result<SetupStatus, ComponentError> {
        if ctx.config.is_set("path") || self.path.as_os_str().is_empty() {
            self.path = ctx.config.require_string("path")?.into();
        }
        self.reader = LevelReader::from_config(&ctx.config, "reader", self.reader.name())?;
        self.reader.register(ctx);
        Ok(SetupStatus::Done)
    }

    fn configure_instance(&mut self, ctx: &SetupContext<'_>) -> Result<SetupStatus, ComponentError> {
        self.reader.configure(ctx)
    }

    fn finalise_instance(&mut self, ctx: &SetupContext<'_>) -> Result<SetupStatus, ComponentError> {
        if self.out.is_some() {
            return Ok(SetupStatus::Done);
        }
        let upstream = self.reader.upstream(ctx.store)?;
        let file = File::create(&self.path).map_err(|e| self.io_error(e))?;
        let mut out = BufWriter::new(file);
        let mut header = String::from("index,time");
        for name in &upstream.element_names {
            header.push(',');
            header.push_str(name);
        }
        writeln!(out, "{header}").map_err(|e| self.io_error(e))?;
        debug!(instance = ctx.instance, path = %self.path.display(), "csv sink opened");
        self.out = Some(out);
        Ok(SetupStatus::Done)
    }

    fn tick(&mut self, tick: &Tick, store: &DataMemory) -> Result<TickOutcome, ComponentError> {
        let Some(block) = self.reader.read(store)? else {
            if tick.eoi {
                self.flush()?;
                return Ok(TickOutcome::Inactive);
            }
            return Ok(TickOutcome::SourceNotAvailable);
        };
        let Some(out) = self.out.as_mut() else {
            return Err(ComponentError::Failed(format!(
                "{} is not open",
                self.path.display()
            )));
        };
        if let Err(e) = write_rows(out, &block) {
            return Err(self.io_error(e));
        }
        self.rows += block.len();
        Ok(TickOutcome::Success)
    }
}

fn write_rows(out: &mut impl Write, block: &Block) -> std::io::Result<()> {
    for (values, meta) in block.frames() {
        write!(out, "{},{}", meta.index, meta.time)?;
        for v in values {
            write!(out, ",{v}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        if self.out.is_some() && self.flush().is_ok() {
            info!(path = %self.path.display(), rows = self.rows, "csv written");
        }
    }
}
