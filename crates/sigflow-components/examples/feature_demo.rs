//! Frame-level loudness of a test tone.
//!
//! Builds a generator, framer and RMS pipeline in code, runs it to the end
//! of input and prints one RMS value per frame.
//!
//! Run with: cargo run -p sigflow-components --example feature_demo

use sigflow_components::{CollectSink, Framer, Rms, SignalGenerator};
use sigflow_core::{ComponentRegistry, MapConfig, Scheduler, ThreadId};

const SAMPLE_RATE: f64 = 16000.0;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Sigflow Feature Demo");
    println!("====================\n");

    let registry = ComponentRegistry::new();
    let mut config = MapConfig::new();
    config
        .set("tone", "sample_rate", SAMPLE_RATE)
        .set("tone", "frequency", 250.0)
        .set("tone", "amplitude", 0.8);

    let mut scheduler = Scheduler::new(&registry, &config);
    let (sink, frames) = CollectSink::new("rms");
    scheduler.add_component("tone", Box::new(SignalGenerator::new("pcm", 4000)), ThreadId::Default)?;
    scheduler.add_component("framer", Box::new(Framer::new("pcm", 400, 160)), ThreadId::Default)?;
    scheduler.add_component("rms", Box::new(Rms::of("frames")), ThreadId::Default)?;
    scheduler.add_component("sink", Box::new(sink), ThreadId::Default)?;
    scheduler.create_instances()?;
    let ticks = scheduler.run(None)?;

    println!("{ticks} rounds, {} frames\n", frames.lock().len());
    for frame in frames.lock().iter() {
        println!("{:>8.4}s  rms {:.4}", frame.meta.time, frame.values[0]);
    }
    // a full-scale sine has an RMS of amplitude / sqrt(2)
    println!("\nexpected for full frames: {:.4}", 0.8 / std::f64::consts::SQRT_2);
    Ok(())
}
