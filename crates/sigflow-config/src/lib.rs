//! Pipeline descriptions for sigflow.
//!
//! A pipeline file lists scheduler options and an ordered set of component
//! instances with their parameters. This crate loads and saves such files,
//! validates them against a [`ComponentRegistry`](sigflow_core::ComponentRegistry),
//! and serves their parameters to components through the core's
//! [`ConfigSource`](sigflow_core::ConfigSource) trait.
//!
//! # Features
//!
//! - **Pipeline files**: Load and save TOML pipeline descriptions
//! - **Configuration source**: Typed parameter lookup with dotted keys
//! - **Validation**: Unknown or abstract types, duplicate names, thread ids
//!
//! # Example
//!
//! ```rust,no_run
//! use sigflow_config::{InstanceEntry, Pipeline};
//!
//! // Load a pipeline from file
//! let pipeline = Pipeline::load("rms.toml").unwrap();
//!
//! // Create a pipeline programmatically
//! let pipeline = Pipeline::new()
//!     .with_name("rms of a sine")
//!     .with_instance(
//!         InstanceEntry::new("gen", "signal_generator")
//!             .with_param("frames", 4800)
//!             .with_param("writer.level", "pcm"),
//!     )
//!     .with_instance(
//!         InstanceEntry::new("rms", "rms")
//!             .with_param("reader.level", "pcm")
//!             .with_param("writer.level", "rms"),
//!     );
//!
//! pipeline.save("rms.toml").unwrap();
//! ```

mod error;
mod instance;
mod pipeline;

/// Pipeline validation.
pub mod validation;

pub use error::ConfigError;
pub use instance::InstanceEntry;
pub use pipeline::{Pipeline, SchedulerSection};
pub use validation::{ValidationError, ValidationResult, normalise_thread_ids, validate_pipeline};
