//! Sigflow Core - buffer store and tick-loop scheduler for streaming pipelines
//!
//! A pipeline is a set of independent components wired together through a
//! shared, time-indexed buffer store. The scheduler sets the components up
//! and then advances them in rounds ("ticks") until every input is drained.
//!
//! # Core Abstractions
//!
//! ## Buffer Store
//!
//! - [`Level`] - Named ring or linear frame buffer with per-reader cursors,
//!   growth, overflow policy and per-frame time metadata
//! - [`DataMemory`] - All levels of a pipeline, plus read/write request
//!   validation
//! - [`Frame`], [`Block`], [`TimeMeta`] - Values copied in and out of levels
//!
//! ## Components
//!
//! - [`Component`] - The contract every processing unit implements
//! - [`ComponentRegistry`] - Type name to factory mapping with fixed-point
//!   registration
//!
//! ## Scheduling
//!
//! - [`Scheduler`] - Phased setup and the single-threaded tick loop
//! - [`SchedulerHandle`] - Pause, resume, abort and data-available signalling
//!   from other threads
//!
//! ## Configuration
//!
//! - [`ConfigSource`] - Typed key-value lookup per instance
//! - [`MapConfig`] - In-memory implementation
//!
//! # Example
//!
//! ```rust
//! use sigflow_core::{Frame, Level, LevelConfig, Padding};
//!
//! let level = Level::with_fields(LevelConfig::new("pcm", 4).growable(true), &[("pcm", 1)]).unwrap();
//! let reader = level.register_reader_unchecked();
//! for v in [10.0, 20.0, 30.0, 40.0, 50.0] {
//!     level.append_frame(&Frame::scalar(v)).unwrap();
//! }
//! // the fifth write doubled the capacity instead of failing
//! assert_eq!(level.config().capacity, 8);
//! let block = level.get_next_block(reader, 5, Padding::None).unwrap();
//! assert_eq!(block.values(), &[10.0, 20.0, 30.0, 40.0, 50.0]);
//! ```

pub mod component;
pub mod config;
pub mod error;
pub mod level;
pub mod registry;
pub mod scheduler;
pub mod store;

pub use component::{Component, SetupContext, SetupStatus, Tick, TickOutcome};
pub use config::{ConfigSource, ConfigValue, InstanceConfig, MapConfig};
pub use error::{AccessError, ComponentError, FlowError, StoreError};
pub use level::{
    Block, FieldInfo, FieldLayout, Frame, Level, LevelConfig, LevelState, LevelStats, OverflowPolicy,
    Padding, ReaderId, TimeMeta,
};
pub use registry::{
    ComponentFactory, ComponentInfo, ComponentRegistry, MAX_REGISTRATION_PASSES, RegisterFn, TypeFilter,
    TypeRegistration,
};
pub use scheduler::{
    InstanceInfo, InstanceStats, Lifecycle, PauseMode, RunStats, Scheduler, SchedulerHandle, SchedulerSettings,
    SetupPhase, ThreadId,
};
pub use store::{DataMemory, LevelId};
