//! Error types for the buffer store, components and the scheduler.
//!
//! Errors are split by the layer that produces them:
//!
//! - [`AccessError`] - a single read or write against a level failed
//! - [`StoreError`] - buffer store setup went wrong (layout, requests, finalisation)
//! - [`ComponentError`] - what a component hands back from setup or `tick`
//! - [`FlowError`] - registry and scheduler failures, always fatal

use thiserror::Error;

use crate::scheduler::SetupPhase;

/// Failure of a single frame or block access on a level.
///
/// Range misses and a full destination are expected during normal operation
/// and surface as tick outcomes. The remaining variants are contract
/// violations; see [`AccessError::is_recoverable`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// Requested data was already dropped or lies before the readable window.
    #[error("index {index} is left of the readable window of level '{level}'")]
    OutOfRangeLeft {
        /// Level name.
        level: String,
        /// First requested logical index.
        index: i64,
    },

    /// Requested data has not been written yet.
    #[error("index {index} is right of the written data of level '{level}'")]
    OutOfRangeRight {
        /// Level name.
        level: String,
        /// Logical index that is not available yet.
        index: i64,
    },

    /// Request exceeds the capacity of a linear level.
    #[error("index {index} exceeds the buffer size of linear level '{level}'")]
    OutOfRangeBufferSize {
        /// Level name.
        level: String,
        /// Offending logical index.
        index: i64,
    },

    /// The destination level has no free space for this write.
    #[error("level '{level}' is full")]
    Full {
        /// Level name.
        level: String,
    },

    /// Malformed index or range.
    #[error("invalid range [{start}, {end}) on level '{level}'")]
    InvalidRange {
        /// Level name.
        level: String,
        /// Range start.
        start: i64,
        /// Range end (exclusive).
        end: i64,
    },

    /// Data access before the level was finalised.
    #[error("level '{level}' is not finalised")]
    NotFinalised {
        /// Level name.
        level: String,
    },

    /// Frame or block width differs from the level width.
    #[error("width mismatch on level '{level}': expected {expected}, got {got}")]
    WidthMismatch {
        /// Level name.
        level: String,
        /// Level width (elements per frame).
        expected: usize,
        /// Width supplied by the caller.
        got: usize,
    },

    /// Reader id was never registered with this level.
    #[error("reader {reader} is not registered with level '{level}'")]
    UnknownReader {
        /// Level name.
        level: String,
        /// Raw reader id.
        reader: u32,
    },

    /// Level id does not refer to a level of this store.
    #[error("no level with id {0}")]
    UnknownLevel(usize),
}

impl AccessError {
    /// Returns `true` for outcomes the tick loop retries (range misses, full level).
    ///
    /// Everything else indicates a programming error in the caller and must
    /// abort the pipeline.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AccessError::OutOfRangeLeft { .. }
                | AccessError::OutOfRangeRight { .. }
                | AccessError::OutOfRangeBufferSize { .. }
                | AccessError::Full { .. }
        )
    }
}

/// Buffer store setup errors. All of them are fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// A level with this name already exists.
    #[error("level '{0}' is already registered")]
    DuplicateLevel(String),

    /// No level with this name or id exists.
    #[error("level '{0}' was not found")]
    UnknownLevel(String),

    /// Level parameters are out of range.
    #[error("invalid configuration for level '{level}': {reason}")]
    InvalidLevelConfig {
        /// Level name.
        level: String,
        /// What is wrong.
        reason: String,
    },

    /// Layout or blocksize change after finalisation.
    #[error("level '{0}' is already finalised")]
    AlreadyFinalised(String),

    /// Finalisation before the writer fixed the field names.
    #[error("cannot finalise level '{0}': field names are not set")]
    NotNamed(String),

    /// Finalisation of a level without fields.
    #[error("cannot finalise level '{level}': width {width}, capacity {capacity}")]
    EmptyLayout {
        /// Level name.
        level: String,
        /// Elements per frame.
        width: usize,
        /// Frames.
        capacity: usize,
    },

    /// Reader blocksize negotiation after the blocksize was fixed.
    #[error("blocksize of level '{0}' is already fixed")]
    BlocksizeFixed(String),

    /// Two components declared writes to the same level.
    #[error("two components cannot write to the same level: '{level}', component1='{first}', component2='{second}'")]
    WriteConflict {
        /// Level name.
        level: String,
        /// Component that registered first.
        first: String,
        /// Component that attempted the second registration.
        second: String,
    },

    /// A read request without a matching write request.
    #[error("level '{level}' was not found! component '{component}' requires it for reading")]
    DanglingReader {
        /// Level name.
        level: String,
        /// Reading component.
        component: String,
    },

    /// Several dangling read requests at once.
    #[error("there were {0} unresolved read requests")]
    UnresolvedReads(usize),

    /// Configure or finalise on a store that holds no levels.
    #[error("the buffer store has no levels")]
    NoLevels,
}

/// Error returned by a component's lifecycle or tick methods.
#[derive(Debug, Error)]
pub enum ComponentError {
    /// Level access failed with a non-recoverable error.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// Buffer store setup failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Required configuration key is absent.
    #[error("missing required configuration '{key}'")]
    MissingConfig {
        /// Key looked up in the instance scope.
        key: String,
    },

    /// Configuration value is present but unusable.
    #[error("invalid configuration '{key}': {reason}")]
    InvalidConfig {
        /// Key looked up in the instance scope.
        key: String,
        /// Why the value is rejected.
        reason: String,
    },

    /// Free-form failure.
    #[error("{0}")]
    Failed(String),
}

impl ComponentError {
    /// Create a missing configuration error.
    pub fn missing(key: impl Into<String>) -> Self {
        ComponentError::MissingConfig { key: key.into() }
    }

    /// Create an invalid configuration error.
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ComponentError::InvalidConfig {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Registry and scheduler errors.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Type registration did not reach a fixed point.
    #[error("{pending} of {total} component types could not register successfully during {passes} registration passes")]
    RegistrationDidNotConverge {
        /// Types still asking for another pass.
        pending: usize,
        /// Candidates in this registration call.
        total: usize,
        /// Passes performed.
        passes: usize,
    },

    /// No component type with this name.
    #[error("unknown component type '{0}'")]
    UnknownType(String),

    /// The type is abstract and cannot be instantiated.
    #[error("component type '{0}' is abstract")]
    AbstractType(String),

    /// An instance with this name already exists.
    #[error("component instance '{0}' already exists")]
    DuplicateInstance(String),

    /// A setup phase left instances unfinished after its pass budget.
    #[error("{phase} phase did not converge, pending instances: {}", .pending.join(", "))]
    PhaseDidNotConverge {
        /// The phase that failed.
        phase: SetupPhase,
        /// Instance names that still requested another pass.
        pending: Vec<String>,
    },

    /// A component failed fatally.
    #[error("component '{instance}' failed: {source}")]
    Component {
        /// Instance name.
        instance: String,
        /// Underlying component error.
        #[source]
        source: ComponentError,
    },

    /// Buffer store setup failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Instances were added or the loop started in the wrong state.
    #[error("scheduler is not ready: {0}")]
    NotReady(&'static str),
}

impl FlowError {
    /// Wrap a component error with the failing instance name.
    pub fn component(instance: impl Into<String>, source: ComponentError) -> Self {
        FlowError::Component {
            instance: instance.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn range_errors_are_recoverable() {
        let left = AccessError::OutOfRangeLeft {
            level: "pcm".into(),
            index: 0,
        };
        let full = AccessError::Full { level: "pcm".into() };
        assert!(left.is_recoverable());
        assert!(full.is_recoverable());
    }

    #[test]
    fn contract_violations_are_fatal() {
        let err = AccessError::WidthMismatch {
            level: "pcm".into(),
            expected: 1,
            got: 2,
        };
        assert!(!err.is_recoverable());
        assert!(!AccessError::NotFinalised { level: "x".into() }.is_recoverable());
    }

    #[test]
    fn dangling_reader_display() {
        let err = StoreError::DanglingReader {
            level: "mfcc".into(),
            component: "sink".into(),
        };
        assert_eq!(
            err.to_string(),
            "level 'mfcc' was not found! component 'sink' requires it for reading"
        );
    }

    #[test]
    fn registration_display() {
        let err = FlowError::RegistrationDidNotConverge {
            pending: 1,
            total: 3,
            passes: 4,
        };
        assert_eq!(
            err.to_string(),
            "1 of 3 component types could not register successfully during 4 registration passes"
        );
    }

    #[test]
    fn component_error_keeps_source() {
        let err = FlowError::component("framer", ComponentError::missing("frame_size"));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("framer"));
    }

    #[test]
    fn store_error_converts_into_component_error() {
        let err: ComponentError = StoreError::NoLevels.into();
        assert!(matches!(err, ComponentError::Store(StoreError::NoLevels)));
    }
}
