//! Simulated capture device.
//!
//! A [`CaptureSource`] owns a background thread, started on the first tick,
//! that writes a sine tone straight into its level the way a sound card
//! callback would. The scheduler only sees the level fill up; each chunk
//! wakes it through [`SchedulerHandle::signal_data_available`].

use std::f64::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use sigflow_core::{
    Block, Component, ComponentError, DataMemory, Level, SchedulerHandle, SetupContext, SetupStatus, Tick,
    TickOutcome, TimeMeta,
};
use tracing::{debug, warn};

use crate::io::LevelWriter;

/// Sleep while the level is full.
const FULL_BACKOFF: Duration = Duration::from_millis(1);

/// Device parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureSettings {
    /// Frames per second.
    pub sample_rate: f64,
    /// Frames per chunk.
    pub chunk: usize,
    /// Total frames to capture, 0 for no limit.
    pub frames: usize,
    /// Sine frequency in Hz.
    pub frequency: f64,
    /// Pace chunks in real time instead of writing as fast as possible.
    pub realtime: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            sample_rate: 16000.0,
            chunk: 160,
            frames: 0,
            frequency: 440.0,
            realtime: false,
        }
    }
}

#[derive(Debug, Default)]
struct Flags {
    stop: AtomicBool,
    done: AtomicBool,
}

/// Source whose data arrives from a device thread.
///
/// ## Parameters
///
/// | Key | Meaning | Default |
/// |-----|---------|---------|
/// | `sample_rate` | frames per second | 16000 |
/// | `chunk` | frames per device callback | 160 |
/// | `frames` | frames to capture, 0 for endless | 0 |
/// | `frequency` | tone frequency in Hz | 440 |
/// | `realtime` | pace chunks in real time | false |
/// | `writer.*` | output level | `pcm` |
#[derive(Debug)]
pub struct CaptureSource {
    writer: LevelWriter,
    settings: CaptureSettings,
    flags: Arc<Flags>,
    control: Option<SchedulerHandle>,
    thread: Option<JoinHandle<()>>,
    last_write: i64,
}

impl CaptureSource {
    /// Capture into `level`.
    pub fn new(level: &str, settings: CaptureSettings) -> Self {
        Self {
            writer: LevelWriter::new(level),
            settings,
            flags: Arc::default(),
            control: None,
            thread: None,
            last_write: 0,
        }
    }

    /// Device parameters.
    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Returns `true` once the device thread has stopped.
    pub fn is_done(&self) -> bool {
        self.flags.done.load(Ordering::Acquire)
    }

    fn start(&mut self, store: &DataMemory) -> Result<(), ComponentError> {
        let level = self.writer.shared(store)?;
        let control = self.control.clone().unwrap_or_default();
        let settings = self.settings;
        let flags = Arc::clone(&self.flags);
        let thread = std::thread::Builder::new()
            .name(format!("capture-{}", self.writer.name()))
            .spawn(move || capture(level, settings, flags, control))
            .map_err(|e| ComponentError::Failed(format!("cannot start capture thread: {e}")))?;
        debug!(level = self.writer.name(), "capture started");
        self.thread = Some(thread);
        Ok(())
    }

    fn stop(&mut self) {
        self.flags.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(level = self.writer.name(), "capture thread panicked");
            }
        }
    }
}

fn capture(level: Arc<Level>, settings: CaptureSettings, flags: Arc<Flags>, control: SchedulerHandle) {
    let chunk_time = Duration::from_secs_f64(settings.chunk as f64 / settings.sample_rate);
    let step = TAU * settings.frequency / settings.sample_rate;
    let mut written = 0usize;
    let mut block = Block::with_capacity(1, settings.chunk);

    while !flags.stop.load(Ordering::Acquire) && !control.is_abort() {
        if settings.frames > 0 && written >= settings.frames {
            break;
        }
        let free = match level.free_count(None) {
            Ok(free) => free,
            Err(e) => {
                warn!(level = level.name(), error = %e, "capture stopped");
                break;
            }
        };
        let mut n = settings.chunk.min(free);
        if settings.frames > 0 {
            n = n.min(settings.frames - written);
        }
        if n == 0 {
            std::thread::sleep(FULL_BACKOFF);
            continue;
        }
        block.clear();
        for i in written..written + n {
            block.push(&[(step * i as f64).sin() as f32], TimeMeta::default());
        }
        if let Err(e) = level.append_block(&block) {
            warn!(level = level.name(), error = %e, "capture stopped");
            break;
        }
        written += n;
        control.signal_data_available();
        if settings.realtime {
            std::thread::sleep(chunk_time);
        }
    }

    debug!(level = level.name(), frames = written, "capture finished");
    flags.done.store(true, Ordering::Release);
    control.signal_data_available();
}

impl Component for CaptureSource {
    fn register_instance(&mut self, ctx: &SetupContext<'_>) -> Result<SetupStatus, ComponentError> {
        let cfg = &ctx.config;
        let s = &mut self.settings;
        s.sample_rate = cfg.double_or("sample_rate", s.sample_rate);
        if s.sample_rate <= 0.0 {
            return Err(ComponentError::invalid("sample_rate", "must be positive"));
        }
        if cfg.is_set("chunk") {
            s.chunk = cfg.require_count("chunk")?;
        }
        s.frames = usize::try_from(cfg.int_or("frames", s.frames as i64))
            .map_err(|_| ComponentError::invalid("frames", "must not be negative"))?;
        s.frequency = cfg.double_or("frequency", s.frequency);
        s.realtime = cfg.flag("realtime", s.realtime);
        self.writer = LevelWriter::from_config(cfg, "writer", self.writer.name())?;
        self.writer.register(ctx)?;
        self.control = Some(ctx.control.clone());
        Ok(SetupStatus::Done)
    }

    fn configure_instance(&mut self, ctx: &SetupContext<'_>) -> Result<SetupStatus, ComponentError> {
        if self.writer.id().is_none() {
            let config = self.writer.level_config(1.0 / self.settings.sample_rate);
            self.writer
                .create(ctx.store, config, &[("pcm", 1)], self.settings.chunk)?;
        }
        Ok(SetupStatus::Done)
    }

    fn tick(&mut self, _tick: &Tick, store: &DataMemory) -> Result<TickOutcome, ComponentError> {
        let Some(id) = self.writer.id() else {
            return Ok(TickOutcome::Inactive);
        };
        if self.thread.is_none() && !self.is_done() {
            self.start(store)?;
        }
        let cur_w = store.current_write(id)?;
        if cur_w > self.last_write {
            self.last_write = cur_w;
            return Ok(TickOutcome::Success);
        }
        if self.is_done() {
            return Ok(TickOutcome::Inactive);
        }
        if self.writer.free(store)? == 0 {
            return Ok(TickOutcome::ExternalDestinationNoSpace);
        }
        Ok(TickOutcome::ExternalSourceNotAvailable)
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.stop();
    }
}
