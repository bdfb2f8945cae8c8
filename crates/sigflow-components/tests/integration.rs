//! Integration tests for sigflow-components.
//!
//! Built-in components are wired into real pipelines, either through the
//! registry and a `MapConfig` or from a pipeline file, and run to the end
//! of input.

use std::thread;
use std::time::Duration;

use sigflow_components::{
    CaptureSettings, CaptureSource, ChannelSource, CollectSink, register_builtin,
};
use sigflow_config::{ConfigError, InstanceEntry, Pipeline, ValidationError};
use sigflow_core::{ComponentRegistry, MapConfig, Scheduler, ThreadId, TickOutcome};
use tempfile::TempDir;

fn registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();
    register_builtin(&mut registry).unwrap();
    registry
}

// ============================================================================
// Feature pipeline
// ============================================================================

#[test]
fn generator_to_rms_pipeline() {
    let registry = registry();
    let mut config = MapConfig::new();
    config
        .set("gen", "frames", 1600_i64)
        .set("gen", "waveform", "constant")
        .set("gen", "amplitude", 0.5)
        .set("gain", "gain", 2.0)
        .set("framer", "reader.level", "scaled")
        .set("framer", "frame_size", 400_i64)
        .set("framer", "step", 160_i64);

    let mut scheduler = Scheduler::new(&registry, &config);
    // downstream first, so setup has to retry until the upstream layouts exist
    let (sink, frames) = CollectSink::new("rms");
    scheduler.add_component("sink", Box::new(sink), ThreadId::Default).unwrap();
    scheduler.add_instance("rms", "rms", ThreadId::Default).unwrap();
    scheduler.add_instance("framer", "framer", ThreadId::Default).unwrap();
    scheduler.add_instance("gain", "scale", ThreadId::Default).unwrap();
    scheduler.add_instance("gen", "signal_generator", ThreadId::Default).unwrap();
    scheduler.create_instances().unwrap();
    scheduler.run(None).unwrap();

    let frames = frames.lock();
    // 8 full frames, then two zero-padded ones at the end of input
    assert_eq!(frames.len(), 10);
    for frame in &frames[..8] {
        assert!((frame.values[0] - 1.0).abs() < 1e-6, "got {}", frame.values[0]);
    }
    let padded = (320.0_f32 / 400.0).sqrt();
    assert!((frames[8].values[0] - padded).abs() < 1e-5);
    assert_eq!(frames[9].meta.index, 9);

    let level = scheduler.store().find_level("frames").unwrap();
    let period = scheduler.store().level_config(level).unwrap().period;
    assert!((period - 160.0 / 16000.0).abs() < 1e-12);
}

#[test]
fn backpressure_through_a_small_level() {
    let registry = registry();
    let mut config = MapConfig::new();
    config
        .set("gen", "frames", 500_i64)
        .set("gen", "waveform", "ramp")
        .set("gen", "writer.capacity", 16_i64)
        .set("gen", "writer.no_hang", 0_i64)
        .set("gen", "blocksize", 16_i64);

    let mut scheduler = Scheduler::new(&registry, &config);
    scheduler.add_instance("gen", "signal_generator", ThreadId::Default).unwrap();
    let (sink, frames) = CollectSink::new("pcm");
    scheduler.add_component("sink", Box::new(sink), ThreadId::Default).unwrap();
    scheduler.create_instances().unwrap();
    scheduler.run(None).unwrap();

    let frames = frames.lock();
    assert_eq!(frames.len(), 500);
    assert!(frames.iter().enumerate().all(|(i, f)| f.values[0] == i as f32));
    let stats = scheduler.stats();
    assert!(stats.instances[0].count(TickOutcome::Success) >= 500 / 16);
}

// ============================================================================
// Pipeline files
// ============================================================================

#[test]
fn csv_sink_from_pipeline_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ramp.csv");
    let registry = registry();

    let pipeline = Pipeline::new()
        .with_instance(
            InstanceEntry::new("gen", "signal_generator")
                .with_param("frames", 10)
                .with_param("waveform", "ramp")
                .with_param("blocksize", 4),
        )
        .with_instance(
            InstanceEntry::new("csv", "csv_sink")
                .with_param("reader.level", "pcm")
                .with_param("path", path.to_string_lossy().into_owned()),
        );
    let file = dir.path().join("pipeline.toml");
    pipeline.save(&file).unwrap();
    let pipeline = Pipeline::load(&file).unwrap();

    let mut scheduler = pipeline.build(&registry).unwrap();
    scheduler.create_instances().unwrap();
    scheduler.run(None).unwrap();
    drop(scheduler);

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 11);
    assert_eq!(lines[0], "index,time,pcm");
    assert!(lines[4].starts_with("3,"));
    assert!(lines[4].ends_with(",3"));
}

#[test]
fn abstract_base_is_rejected_by_validation() {
    let registry = registry();
    let pipeline = Pipeline::new().with_instance(InstanceEntry::new("s", "source"));
    let err = pipeline.build(&registry).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Validation(ValidationError::AbstractType { .. })
    ));
}

#[test]
fn missing_csv_path_fails_setup() {
    let registry = registry();
    let pipeline = Pipeline::new()
        .with_instance(InstanceEntry::new("gen", "signal_generator").with_param("frames", 4))
        .with_instance(InstanceEntry::new("csv", "csv_sink"));
    let mut scheduler = pipeline.build(&registry).unwrap();
    let err = scheduler.create_instances().unwrap_err();
    assert!(err.to_string().contains("'path'"), "got: {err}");
}

// ============================================================================
// External sources
// ============================================================================

#[test]
fn channel_source_fed_from_another_thread() {
    let registry = ComponentRegistry::new();
    let config = MapConfig::new();
    let mut scheduler = Scheduler::new(&registry, &config);

    let (source, feed) = ChannelSource::new("pcm", 1);
    let (sink, frames) = CollectSink::new("pcm");
    scheduler.add_component("feed", Box::new(source), ThreadId::Default).unwrap();
    scheduler.add_component("sink", Box::new(sink), ThreadId::Default).unwrap();
    scheduler.create_instances().unwrap();

    let feeder = thread::spawn(move || {
        for chunk in 0..10 {
            let values = (chunk * 10..chunk * 10 + 10).map(|v| v as f32).collect();
            feed.send(values).unwrap();
            thread::sleep(Duration::from_millis(2));
        }
    });
    scheduler.run(None).unwrap();
    feeder.join().unwrap();

    let frames = frames.lock();
    assert_eq!(frames.len(), 100);
    assert!(frames.iter().enumerate().all(|(i, f)| f.values[0] == i as f32));
    assert_eq!(scheduler.last_outcome("feed"), Some(TickOutcome::Inactive));
}

#[test]
fn capture_source_runs_to_its_frame_limit() {
    let registry = ComponentRegistry::new();
    let config = MapConfig::new();
    let mut scheduler = Scheduler::new(&registry, &config);

    let settings = CaptureSettings {
        frames: 2000,
        chunk: 100,
        ..CaptureSettings::default()
    };
    let (sink, frames) = CollectSink::new("pcm");
    scheduler
        .add_component("mic", Box::new(CaptureSource::new("pcm", settings)), ThreadId::Default)
        .unwrap();
    scheduler.add_component("sink", Box::new(sink), ThreadId::Default).unwrap();
    scheduler.create_instances().unwrap();
    scheduler.run(None).unwrap();

    let frames = frames.lock();
    assert_eq!(frames.len(), 2000);
    assert!(frames[0].values[0].abs() < 1e-6);
}

#[test]
fn endless_capture_stops_on_abort() {
    let registry = ComponentRegistry::new();
    let config = MapConfig::new();
    let mut scheduler = Scheduler::new(&registry, &config);

    let settings = CaptureSettings {
        realtime: true,
        ..CaptureSettings::default()
    };
    let (sink, _frames) = CollectSink::new("pcm");
    scheduler
        .add_component("mic", Box::new(CaptureSource::new("pcm", settings)), ThreadId::Default)
        .unwrap();
    scheduler.add_component("sink", Box::new(sink), ThreadId::Default).unwrap();
    scheduler.create_instances().unwrap();

    let handle = scheduler.handle();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        handle.request_abort();
    });
    scheduler.run(None).unwrap();
    stopper.join().unwrap();
    assert!(scheduler.handle().is_abort());
}
