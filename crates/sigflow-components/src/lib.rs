//! Sigflow Components - built-in components for sigflow pipelines
//!
//! This crate provides ready-made components built on sigflow-core:
//!
//! - [`SignalGenerator`] - Sine, ramp or constant test signal
//! - [`CaptureSource`] - Device-style source fed by a background thread
//! - [`ChannelSource`] - Source fed from application code through a channel
//! - [`Scale`] - Constant gain
//! - [`Framer`] - Overlapping frames from a scalar stream
//! - [`Rms`] - Root mean square per frame
//! - [`CollectSink`] - Keeps frames in memory
//! - [`CsvSink`] - Writes frames to a CSV file
//!
//! Every component reads and writes levels through [`LevelReader`] and
//! [`LevelWriter`], which implement the register, configure and tick steps
//! of the level protocol.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sigflow_components::register_builtin;
//! use sigflow_core::{ComponentRegistry, MapConfig, Scheduler, ThreadId};
//!
//! let mut registry = ComponentRegistry::new();
//! register_builtin(&mut registry)?;
//!
//! let mut config = MapConfig::new();
//! config.set("gen", "frames", 16000_i64);
//! config.set("framer", "frame_size", 400_i64).set("framer", "step", 160_i64);
//!
//! let mut scheduler = Scheduler::new(&registry, &config);
//! scheduler.add_instance("gen", "signal_generator", ThreadId::Default)?;
//! scheduler.add_instance("framer", "framer", ThreadId::Default)?;
//! scheduler.add_instance("rms", "rms", ThreadId::Default)?;
//! scheduler.create_instances()?;
//! scheduler.run(None)?;
//! ```

pub mod capture;
pub mod channel;
pub mod framer;
pub mod generator;
pub mod io;
pub mod sink;
pub mod transform;

pub use capture::{CaptureSettings, CaptureSource};
pub use channel::{ChannelFeed, ChannelSource};
pub use framer::Framer;
pub use generator::{SignalGenerator, Waveform};
pub use io::{LevelReader, LevelWriter, Upstream};
pub use sink::{Collected, CollectSink, CsvSink};
pub use transform::{FrameMap, Gain, Rms, RootMeanSquare, Scale, Transform};

use sigflow_core::{ComponentInfo, ComponentRegistry, FlowError, RegisterFn, TypeRegistration};

/// Abstract base of every source type.
pub const SOURCE_BASE: &str = "source";

/// Abstract base of every sink type.
pub const SINK_BASE: &str = "sink";

fn source_base(_: &ComponentRegistry, _: u32) -> TypeRegistration {
    TypeRegistration::done(ComponentInfo::abstract_type(SOURCE_BASE, "writes data into the graph"))
}

fn sink_base(_: &ComponentRegistry, _: u32) -> TypeRegistration {
    TypeRegistration::done(ComponentInfo::abstract_type(SINK_BASE, "takes data out of the graph"))
}

/// Complete once `base` is known.
fn derived(registry: &ComponentRegistry, base: &str, info: ComponentInfo) -> TypeRegistration {
    if registry.find_type(base).is_some() {
        TypeRegistration::done(info)
    } else {
        TypeRegistration::again(info)
    }
}

fn signal_generator(registry: &ComponentRegistry, _: u32) -> TypeRegistration {
    let info = ComponentInfo::new("signal_generator", "sine, ramp or constant test signal", |_| {
        Box::new(SignalGenerator::new("pcm", 0))
    });
    derived(registry, SOURCE_BASE, info)
}

fn capture_source(registry: &ComponentRegistry, _: u32) -> TypeRegistration {
    let info = ComponentInfo::new("capture_source", "tone written by a device thread", |_| {
        Box::new(CaptureSource::new("pcm", CaptureSettings::default()))
    });
    derived(registry, SOURCE_BASE, info)
}

fn scale(_: &ComponentRegistry, _: u32) -> TypeRegistration {
    TypeRegistration::done(ComponentInfo::new("scale", "constant gain", |_| {
        Box::new(Scale::with_gain("pcm", 1.0))
    }))
}

fn framer(_: &ComponentRegistry, _: u32) -> TypeRegistration {
    TypeRegistration::done(ComponentInfo::new("framer", "overlapping frames from a scalar stream", |_| {
        Box::new(Framer::new("pcm", 512, 512))
    }))
}

fn rms(_: &ComponentRegistry, _: u32) -> TypeRegistration {
    TypeRegistration::done(ComponentInfo::new("rms", "root mean square per frame", |_| {
        Box::new(Rms::of("frames"))
    }))
}

fn collect_sink(registry: &ComponentRegistry, _: u32) -> TypeRegistration {
    let info = ComponentInfo::new("collect_sink", "keeps frames in memory", |_| {
        Box::new(CollectSink::new("pcm").0)
    });
    derived(registry, SINK_BASE, info)
}

fn csv_sink(registry: &ComponentRegistry, _: u32) -> TypeRegistration {
    let info = ComponentInfo::new("csv_sink", "writes frames to a CSV file", |_| {
        Box::new(CsvSink::new("pcm", ""))
    });
    derived(registry, SINK_BASE, info)
}

/// Register functions of the built-in types. Concrete sources and sinks
/// are listed before their bases and complete on the second pass.
pub const BUILTIN: &[RegisterFn] = &[
    signal_generator,
    capture_source,
    scale,
    framer,
    rms,
    collect_sink,
    csv_sink,
    source_base,
    sink_base,
];

/// Register every built-in type. Returns the number of types registered.
pub fn register_builtin(registry: &mut ComponentRegistry) -> Result<usize, FlowError> {
    registry.register_types(BUILTIN)
}
