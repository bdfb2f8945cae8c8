//! Validate a pipeline file and run its setup.

use std::path::PathBuf;

use clap::Args;

use super::common::{builtin_registry, load_pipeline, parse_override};

#[derive(Args)]
pub struct CheckArgs {
    /// Pipeline file (TOML)
    pipeline: PathBuf,

    /// Level statistics detail (1-4)
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=4))]
    detail: u8,

    /// Override a parameter (can be repeated): instance.key=value
    #[arg(long = "set", value_name = "INSTANCE.KEY=VALUE", value_parser = parse_override)]
    overrides: Vec<(String, String, toml::Value)>,
}

pub fn run(args: CheckArgs) -> anyhow::Result<()> {
    let registry = builtin_registry()?;
    let pipeline = load_pipeline(&args.pipeline, &args.overrides, &registry)?;
    let mut scheduler = pipeline.build(&registry)?;
    scheduler.create_instances()?;

    println!("Instances");
    println!("=========");
    println!();
    for info in scheduler.instances() {
        let thread = if info.thread.is_scheduled() {
            String::new()
        } else {
            " (never scheduled)".to_string()
        };
        println!("  {:16} {}{}", info.name, info.type_name, thread);
    }

    println!();
    println!("Levels");
    println!("======");
    println!();
    for stats in scheduler.store().stats() {
        for line in stats.render(args.detail).lines() {
            println!("  {line}");
        }
    }

    println!();
    println!("Pipeline OK");
    Ok(())
}
