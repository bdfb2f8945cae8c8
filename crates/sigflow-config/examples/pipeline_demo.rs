//! Pipeline description demo: build in code, serialise, parse, and inspect.
//!
//! Run with: cargo run -p sigflow-config --example pipeline_demo

use sigflow_config::{InstanceEntry, Pipeline, SchedulerSection};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // --- Building a pipeline in code ---
    println!("=== Pipeline ===\n");

    let pipeline = Pipeline::new()
        .with_name("rms of a tone")
        .with_scheduler(SchedulerSection {
            profiling: true,
            ..SchedulerSection::default()
        })
        .with_instance(
            InstanceEntry::new("gen", "signal_generator")
                .with_param("frames", 16000)
                .with_param("writer.level", "pcm"),
        )
        .with_instance(
            InstanceEntry::new("framer", "framer")
                .with_param("frame_size", 400)
                .with_param("step", 160),
        )
        .with_instance(InstanceEntry::new("rms", "rms"))
        .with_instance(InstanceEntry::new("debug", "collect_sink").with_thread_id(-2));

    let text = pipeline.to_toml()?;
    println!("{text}");

    // --- Parsing it back ---
    println!("=== Instances ===\n");

    let parsed = Pipeline::from_toml(&text)?;
    println!("{:<10} {:<18} {:>6}  params", "Name", "Type", "Thread");
    println!("{:-<10} {:-<18} {:->6}  {:-<6}", "", "", "", "");
    for entry in &parsed.instances {
        let params: Vec<String> = entry.params.keys().cloned().collect();
        println!(
            "{:<10} {:<18} {:>6}  {}",
            entry.name,
            entry.component_type,
            entry.thread_id,
            params.join(", ")
        );
    }

    // dotted keys nest, and look-ups follow them
    let gen_entry = parsed.get("gen").ok_or("missing instance")?;
    println!("\ngen writes to {:?}", gen_entry.get("writer.level"));
    println!("scheduler settings: {:?}", parsed.settings());
    Ok(())
}
