//! Source fed from another thread through a channel.
//!
//! # Example
//!
//! ```rust,ignore
//! let (source, feed) = ChannelSource::new("pcm", 1);
//! scheduler.add_component("mic", Box::new(source), ThreadId::Default)?;
//! scheduler.create_instances()?;
//!
//! std::thread::spawn(move || {
//!     for chunk in chunks {
//!         feed.send(chunk).ok();
//!     }
//!     // dropping the feed ends the input
//! });
//! scheduler.run(None)?;
//! ```

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use sigflow_core::{
    Block, Component, ComponentError, DataMemory, SchedulerHandle, SetupContext, SetupStatus, Tick, TickOutcome,
};
use tracing::{debug, warn};

use crate::io::LevelWriter;

/// Maximum number of queued chunks.
pub const CHANNEL_CAPACITY: usize = 64;

/// Sending side of a [`ChannelSource`].
///
/// Each chunk holds whole frames, interleaved. Every send wakes the
/// scheduler if it is waiting for external data. Dropping every feed ends
/// the input.
#[derive(Debug, Clone)]
pub struct ChannelFeed {
    tx: Sender<Vec<f32>>,
    control: Arc<Mutex<Option<SchedulerHandle>>>,
}

impl ChannelFeed {
    /// Queue a chunk, blocking while the queue is full.
    ///
    /// Fails once the source has been dropped.
    pub fn send(&self, chunk: Vec<f32>) -> Result<(), crossbeam_channel::SendError<Vec<f32>>> {
        self.tx.send(chunk)?;
        if let Some(control) = self.control.lock().as_ref() {
            control.signal_data_available();
        }
        Ok(())
    }
}

/// Writes chunks received from a [`ChannelFeed`] to a level.
///
/// Tick outcomes are external: [`TickOutcome::ExternalSourceNotAvailable`]
/// while the queue is empty, [`TickOutcome::ExternalDestinationNoSpace`]
/// while the level is full. Once all feeds are dropped and the queue is
/// drained the source reports [`TickOutcome::Inactive`].
#[derive(Debug)]
pub struct ChannelSource {
    writer: LevelWriter,
    width: usize,
    period: f64,
    rx: Receiver<Vec<f32>>,
    pending: Vec<f32>,
    control: Arc<Mutex<Option<SchedulerHandle>>>,
    disconnected: bool,
}

impl ChannelSource {
    /// Source writing frames of `width` values to `level`.
    pub fn new(level: &str, width: usize) -> (Self, ChannelFeed) {
        let (tx, rx) = crossbeam_channel::bounded(CHANNEL_CAPACITY);
        let control = Arc::new(Mutex::new(None));
        let source = Self {
            writer: LevelWriter::new(level),
            width: width.max(1),
            period: 0.0,
            rx,
            pending: Vec::new(),
            control: Arc::clone(&control),
            disconnected: false,
        };
        (source, ChannelFeed { tx, control })
    }

    /// Set the frame period of the output level.
    pub fn with_period(mut self, period: f64) -> Self {
        self.period = period;
        self
    }

    fn receive(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(chunk) => self.pending.extend(chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.disconnected {
                        debug!(level = self.writer.name(), "channel feed closed");
                    }
                    self.disconnected = true;
                    break;
                }
            }
        }
    }
}

impl Component for ChannelSource {
    fn register_instance(&mut self, ctx: &SetupContext<'_>) -> Result<SetupStatus, ComponentError> {
        self.writer = LevelWriter::from_config(&ctx.config, "writer", self.writer.name())?;
        self.period = ctx.config.double_or("period", self.period);
        self.writer.register(ctx)?;
        *self.control.lock() = Some(ctx.control.clone());
        Ok(SetupStatus::Done)
    }

    fn configure_instance(&mut self, ctx: &SetupContext<'_>) -> Result<SetupStatus, ComponentError> {
        if self.writer.id().is_none() {
            let config = self.writer.level_config(self.period);
            self.writer
                .create(ctx.store, config, &[("value", self.width)], crate::io::DEFAULT_BLOCKSIZE)?;
        }
        Ok(SetupStatus::Done)
    }

    fn tick(&mut self, _tick: &Tick, store: &DataMemory) -> Result<TickOutcome, ComponentError> {
        self.receive();
        let whole = self.pending.len() / self.width;
        if whole == 0 {
            if self.disconnected {
                if !self.pending.is_empty() {
                    warn!(
                        level = self.writer.name(),
                        dropped = self.pending.len(),
                        "partial frame left at end of input"
                    );
                    self.pending.clear();
                }
                return Ok(TickOutcome::Inactive);
            }
            return Ok(TickOutcome::ExternalSourceNotAvailable);
        }
        let n = whole.min(self.writer.free(store)?);
        if n == 0 {
            return Ok(TickOutcome::ExternalDestinationNoSpace);
        }
        let values: Vec<f32> = self.pending.drain(..n * self.width).collect();
        let block = Block::from_values(self.width, values)
            .ok_or_else(|| ComponentError::Failed("chunk is not a whole number of frames".into()))?;
        self.writer.write(store, &block)?;
        Ok(TickOutcome::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigflow_core::{InstanceConfig, MapConfig};

    use crate::io::LevelReader;

    fn tick() -> Tick {
        Tick {
            number: 0,
            eoi: false,
            eoi_counter: 0,
            last_run_count: 0,
        }
    }

    #[test]
    fn chunks_become_frames() {
        let cfg = MapConfig::new();
        let store = DataMemory::new();
        let control = SchedulerHandle::new();
        let (mut source, feed) = ChannelSource::new("pairs", 2);
        let ctx = SetupContext {
            instance: "feed",
            config: InstanceConfig::new("feed", &cfg),
            store: &store,
            control: &control,
        };
        source.register_instance(&ctx).unwrap();
        source.configure_instance(&ctx).unwrap();
        let mut reader = LevelReader::new("pairs", 16);
        reader.configure(&ctx).unwrap();
        store.finalise().unwrap();

        assert_eq!(source.tick(&tick(), &store).unwrap(), TickOutcome::ExternalSourceNotAvailable);

        feed.send(vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(source.tick(&tick(), &store).unwrap(), TickOutcome::Success);
        feed.send(vec![4.0]).unwrap();
        assert_eq!(source.tick(&tick(), &store).unwrap(), TickOutcome::Success);

        let block = reader.read(&store).unwrap().unwrap();
        assert_eq!(block.values(), &[1.0, 2.0, 3.0, 4.0]);

        drop(feed);
        assert_eq!(source.tick(&tick(), &store).unwrap(), TickOutcome::Inactive);
    }
}
