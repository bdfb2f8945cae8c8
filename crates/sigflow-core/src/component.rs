//! The component contract.
//!
//! A component is one processing unit of a pipeline. The scheduler drives it
//! through setup (register, configure, finalise) and then calls
//! [`Component::tick`] once per round until the pipeline has drained.
//!
//! ```text
//! Created ─▶ Registered ─▶ Configured ─▶ Finalised ─▶ Running ⇄ Paused ─▶ Terminated
//! ```
//!
//! Every transition is made by the scheduler; a component never advances
//! itself. Setup methods may return [`SetupStatus::Retry`] when they depend on
//! something another instance has not provided yet (typically a level layout
//! fixed by an upstream writer); the scheduler calls them again in its next
//! pass.
//!
//! # Example
//!
//! ```rust
//! use sigflow_core::{Component, ComponentError, DataMemory, Tick, TickOutcome};
//!
//! struct Idle;
//!
//! impl Component for Idle {
//!     fn tick(&mut self, _tick: &Tick, _store: &DataMemory) -> Result<TickOutcome, ComponentError> {
//!         Ok(TickOutcome::Inactive)
//!     }
//! }
//! ```

use std::fmt;

use crate::config::InstanceConfig;
use crate::error::ComponentError;
use crate::scheduler::SchedulerHandle;
use crate::store::DataMemory;

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickOutcome {
    /// Did some work; the loop makes progress.
    Success,
    /// Waiting for data from another component.
    SourceNotAvailable,
    /// Waiting for data from outside the store (a capture thread, a socket).
    ExternalSourceNotAvailable,
    /// A destination level is full.
    DestinationNoSpace,
    /// Waiting for space outside the store (a playback device).
    ExternalDestinationNoSpace,
    /// Nothing to do, permanently or for now.
    Inactive,
}

impl TickOutcome {
    /// Returns `true` for [`TickOutcome::Success`].
    pub fn is_success(self) -> bool {
        self == TickOutcome::Success
    }

    /// Returns `true` for the outcomes that wait on something outside the store.
    pub fn is_external(self) -> bool {
        matches!(
            self,
            TickOutcome::ExternalSourceNotAvailable | TickOutcome::ExternalDestinationNoSpace
        )
    }

    /// Returns `true` for backpressure (a full destination).
    pub fn is_backpressure(self) -> bool {
        matches!(
            self,
            TickOutcome::DestinationNoSpace | TickOutcome::ExternalDestinationNoSpace
        )
    }

    /// Short label for diagnostics.
    pub fn label(self) -> &'static str {
        match self {
            TickOutcome::Success => "SUCCESS",
            TickOutcome::SourceNotAvailable => "SOURCE_NOT_AVAIL",
            TickOutcome::ExternalSourceNotAvailable => "EXT_SOURCE_NOT_AVAIL",
            TickOutcome::DestinationNoSpace => "DEST_NO_SPACE",
            TickOutcome::ExternalDestinationNoSpace => "EXT_DEST_NO_SPACE",
            TickOutcome::Inactive => "INACTIVE",
        }
    }

    /// All outcomes, in declaration order.
    pub const ALL: [TickOutcome; 6] = [
        TickOutcome::Success,
        TickOutcome::SourceNotAvailable,
        TickOutcome::ExternalSourceNotAvailable,
        TickOutcome::DestinationNoSpace,
        TickOutcome::ExternalDestinationNoSpace,
        TickOutcome::Inactive,
    ];
}

impl fmt::Display for TickOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether a setup step is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStatus {
    /// The step succeeded.
    Done,
    /// A dependency is not ready; call again in the next pass.
    Retry,
}

/// Per-tick information handed to [`Component::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Round number, starting at 0.
    pub number: u64,
    /// End of input is asserted.
    pub eoi: bool,
    /// How often end of input has been asserted so far.
    pub eoi_counter: u32,
    /// Components that succeeded in the previous round.
    pub last_run_count: usize,
}

/// Everything a component sees during setup.
#[derive(Debug, Clone, Copy)]
pub struct SetupContext<'a> {
    /// Instance name.
    pub instance: &'a str,
    /// Configuration scoped to this instance.
    pub config: InstanceConfig<'a>,
    /// The buffer store.
    pub store: &'a DataMemory,
    /// Control handle of the owning scheduler.
    pub control: &'a SchedulerHandle,
}

/// A processing unit of a pipeline.
///
/// Only [`tick`](Component::tick) is mandatory. Setup methods default to
/// "nothing to do"; `pause` accepts and `resume` ignores.
pub trait Component: Send {
    /// Declare read and write requests with the store.
    fn register_instance(&mut self, _ctx: &SetupContext<'_>) -> Result<SetupStatus, ComponentError> {
        Ok(SetupStatus::Done)
    }

    /// Create written levels and negotiate block sizes on read levels.
    fn configure_instance(&mut self, _ctx: &SetupContext<'_>) -> Result<SetupStatus, ComponentError> {
        Ok(SetupStatus::Done)
    }

    /// Fix written level layouts and register readers.
    fn finalise_instance(&mut self, _ctx: &SetupContext<'_>) -> Result<SetupStatus, ComponentError> {
        Ok(SetupStatus::Done)
    }

    /// Do at most one unit of work.
    ///
    /// Recoverable conditions (no input yet, full destination) are reported as
    /// outcomes. An `Err` stops the pipeline.
    fn tick(&mut self, tick: &Tick, store: &DataMemory) -> Result<TickOutcome, ComponentError>;

    /// Called when a round made no progress. Return `true` if the component
    /// still expects data to arrive; the loop then keeps going.
    ///
    /// May block briefly.
    fn notify_empty_tick_loop(&mut self) -> bool {
        false
    }

    /// Called before the loop pauses. Return `false` to reject the pause.
    fn pause(&mut self) -> bool {
        true
    }

    /// Called when the loop resumes after a pause.
    fn resume(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_classes() {
        assert!(TickOutcome::Success.is_success());
        assert!(TickOutcome::ExternalSourceNotAvailable.is_external());
        assert!(TickOutcome::ExternalDestinationNoSpace.is_external());
        assert!(!TickOutcome::SourceNotAvailable.is_external());
        assert!(TickOutcome::DestinationNoSpace.is_backpressure());
        assert!(!TickOutcome::Inactive.is_backpressure());
    }

    #[test]
    fn outcome_labels_are_distinct() {
        let mut labels: Vec<&str> = TickOutcome::ALL.iter().map(|o| o.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), TickOutcome::ALL.len());
        assert_eq!(TickOutcome::DestinationNoSpace.to_string(), "DEST_NO_SPACE");
    }
}
