//! Pipeline validation against a component registry.
//!
//! Checks what would otherwise only fail while the scheduler instantiates
//! the pipeline, and reports every problem at once.
//!
//! # Example
//!
//! ```rust
//! use sigflow_config::{InstanceEntry, Pipeline, ValidationError, validate_pipeline};
//! use sigflow_core::ComponentRegistry;
//!
//! let registry = ComponentRegistry::new();
//! let pipeline = Pipeline::new().with_instance(InstanceEntry::new("gen", "signal_generator"));
//!
//! let err = validate_pipeline(&pipeline, &registry).unwrap_err();
//! assert!(matches!(err, ValidationError::UnknownType { .. }));
//! ```

use std::collections::HashSet;

use sigflow_core::{ComponentRegistry, ThreadId};
use thiserror::Error;
use tracing::warn;

use crate::pipeline::Pipeline;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// The pipeline has no instances.
    #[error("pipeline has no component instances")]
    Empty,

    /// An instance has an empty name.
    #[error("instance #{0} has an empty name")]
    EmptyName(usize),

    /// Unknown component type.
    #[error("instance '{instance}' has unknown component type '{type_name}'")]
    UnknownType {
        /// Instance name.
        instance: String,
        /// Requested type.
        type_name: String,
    },

    /// The type exists but cannot be instantiated.
    #[error("instance '{instance}' uses abstract component type '{type_name}'")]
    AbstractType {
        /// Instance name.
        instance: String,
        /// Requested type.
        type_name: String,
    },

    /// Two instances share a name.
    #[error("duplicate instance name '{0}'")]
    DuplicateInstance(String),

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Check every instance of `pipeline` against `registry`.
pub fn validate_pipeline(pipeline: &Pipeline, registry: &ComponentRegistry) -> ValidationResult<()> {
    if pipeline.is_empty() {
        return Err(ValidationError::Empty);
    }

    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for (i, entry) in pipeline.instances.iter().enumerate() {
        if entry.name.is_empty() {
            errors.push(ValidationError::EmptyName(i));
            continue;
        }
        if !seen.insert(entry.name.as_str()) {
            errors.push(ValidationError::DuplicateInstance(entry.name.clone()));
        }
        match registry.get(&entry.component_type) {
            None => errors.push(ValidationError::UnknownType {
                instance: entry.name.clone(),
                type_name: entry.component_type.clone(),
            }),
            Some(info) if info.abstract_type => errors.push(ValidationError::AbstractType {
                instance: entry.name.clone(),
                type_name: entry.component_type.clone(),
            }),
            Some(_) => {}
        }
    }

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

/// Rewrite out-of-range thread ids the way the scheduler interprets them.
///
/// Returns `(instance, old, new)` for every changed entry.
pub fn normalise_thread_ids(pipeline: &mut Pipeline) -> Vec<(String, i64, i64)> {
    let threads = pipeline.scheduler.threads.max(1);
    let mut changed = Vec::new();
    for entry in &mut pipeline.instances {
        let normalised = ThreadId::from_raw(entry.thread_id, threads).raw();
        if normalised != entry.thread_id {
            warn!(
                instance = %entry.name,
                from = entry.thread_id,
                to = normalised,
                "thread id normalised"
            );
            changed.push((entry.name.clone(), entry.thread_id, normalised));
            entry.thread_id = normalised;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::InstanceEntry;
    use sigflow_core::{
        Component, ComponentError, ComponentInfo, DataMemory, Tick, TickOutcome,
    };

    struct Idle;

    impl Component for Idle {
        fn tick(&mut self, _: &Tick, _: &DataMemory) -> Result<TickOutcome, ComponentError> {
            Ok(TickOutcome::Inactive)
        }
    }

    fn registry() -> ComponentRegistry {
        let mut r = ComponentRegistry::new();
        r.register(ComponentInfo::new("idle", "does nothing", |_| Box::new(Idle)));
        r.register(ComponentInfo::abstract_type("base", "abstract"));
        r
    }

    #[test]
    fn valid_pipeline_passes() {
        let p = Pipeline::new()
            .with_instance(InstanceEntry::new("a", "idle"))
            .with_instance(InstanceEntry::new("b", "idle"));
        assert!(validate_pipeline(&p, &registry()).is_ok());
    }

    #[test]
    fn empty_pipeline_fails() {
        assert_eq!(validate_pipeline(&Pipeline::new(), &registry()), Err(ValidationError::Empty));
    }

    #[test]
    fn single_problem_is_reported_directly() {
        let p = Pipeline::new().with_instance(InstanceEntry::new("a", "base"));
        assert!(matches!(
            validate_pipeline(&p, &registry()),
            Err(ValidationError::AbstractType { .. })
        ));
    }

    #[test]
    fn all_problems_are_collected() {
        let p = Pipeline::new()
            .with_instance(InstanceEntry::new("a", "idle"))
            .with_instance(InstanceEntry::new("a", "idle"))
            .with_instance(InstanceEntry::new("", "idle"))
            .with_instance(InstanceEntry::new("c", "nope"));
        let Err(ValidationError::Multiple(errors)) = validate_pipeline(&p, &registry()) else {
            panic!("expected multiple errors");
        };
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::DuplicateInstance("a".to_string())));
        assert!(errors.contains(&ValidationError::EmptyName(2)));
    }

    #[test]
    fn thread_ids_are_normalised() {
        let mut p = Pipeline::new()
            .with_instance(InstanceEntry::new("never", "idle").with_thread_id(-2))
            .with_instance(InstanceEntry::new("low", "idle").with_thread_id(-7))
            .with_instance(InstanceEntry::new("high", "idle").with_thread_id(3))
            .with_instance(InstanceEntry::new("zero", "idle").with_thread_id(0));
        let changed = normalise_thread_ids(&mut p);
        assert_eq!(
            changed,
            vec![("low".to_string(), -7, -1), ("high".to_string(), 3, 0)]
        );
        assert_eq!(p.instances[0].thread_id, -2);
    }
}
