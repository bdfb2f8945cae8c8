//! Run a pipeline file.

use std::path::PathBuf;
use std::time::Instant;

use clap::Args;

use super::common::{builtin_registry, load_pipeline, parse_override};

#[derive(Args)]
pub struct RunArgs {
    /// Pipeline file (TOML)
    pipeline: PathBuf,

    /// Stop after this many tick rounds
    #[arg(long, value_name = "N")]
    max_ticks: Option<u64>,

    /// Measure time spent per component
    #[arg(long)]
    profile: bool,

    /// Log the outcome of every component in every round
    #[arg(long)]
    exec_debug: bool,

    /// Log level states after the run
    #[arg(long)]
    final_levels: bool,

    /// Stop after the first end-of-input pass
    #[arg(long)]
    single_eoi_pass: bool,

    /// Override a parameter (can be repeated): instance.key=value
    #[arg(long = "set", value_name = "INSTANCE.KEY=VALUE", value_parser = parse_override)]
    overrides: Vec<(String, String, toml::Value)>,
}

pub fn run(args: RunArgs) -> anyhow::Result<()> {
    let registry = builtin_registry()?;
    let mut pipeline = load_pipeline(&args.pipeline, &args.overrides, &registry)?;

    let s = &mut pipeline.scheduler;
    s.profiling |= args.profile;
    s.exec_debug |= args.exec_debug;
    s.print_final_level_states |= args.final_levels;
    s.single_eoi_pass |= args.single_eoi_pass;

    let mut scheduler = pipeline.build(&registry)?;
    let handle = scheduler.handle();
    ctrlc::set_handler(move || {
        eprintln!("\nStopping...");
        handle.request_abort();
    })?;

    let name = pipeline
        .name
        .clone()
        .unwrap_or_else(|| args.pipeline.display().to_string());
    println!("Running {name} ({} instances)", pipeline.len());

    scheduler.create_instances()?;
    let started = Instant::now();
    let ticks = scheduler.run(args.max_ticks)?;
    let elapsed = started.elapsed();

    println!();
    print!("{}", scheduler.stats());
    println!();
    if scheduler.handle().is_abort() {
        println!("Aborted after {ticks} rounds ({:.3}s)", elapsed.as_secs_f64());
    } else if args.max_ticks.is_some_and(|max| ticks >= max) {
        println!("Stopped at the tick limit after {ticks} rounds ({:.3}s)", elapsed.as_secs_f64());
    } else {
        println!("Completed in {ticks} rounds ({:.3}s)", elapsed.as_secs_f64());
    }
    Ok(())
}
