//! List registered component types.

use clap::Args;
use sigflow_core::TypeFilter;

use super::common::builtin_registry;

#[derive(Args)]
pub struct ComponentsArgs {
    /// Include abstract base types
    #[arg(long)]
    all: bool,
}

pub fn run(args: ComponentsArgs) -> anyhow::Result<()> {
    let registry = builtin_registry()?;
    let filter = if args.all {
        TypeFilter::All
    } else {
        TypeFilter::Concrete
    };

    println!("Available Components");
    println!("====================");
    println!();
    for info in registry.types(filter) {
        let marker = if info.abstract_type { " (abstract)" } else { "" };
        println!("  {:18} - {}{}", info.name, info.description, marker);
    }
    println!();
    println!("Parameters are set per instance in the pipeline file under [instance.params].");
    Ok(())
}
