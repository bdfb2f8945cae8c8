//! Component type registry with fixed-point registration.
//!
//! Types are registered through [`RegisterFn`]s. A register function may ask
//! for another pass (`register_again`) when it depends on a type that is not
//! known yet, for example a base type registered by a different module.
//! [`ComponentRegistry::register_types`] keeps calling the pending functions
//! until all of them complete or [`MAX_REGISTRATION_PASSES`] is exhausted.
//!
//! # Example
//!
//! ```rust
//! use sigflow_core::{
//!     Component, ComponentError, ComponentInfo, ComponentRegistry, DataMemory, Tick,
//!     TickOutcome, TypeRegistration,
//! };
//!
//! struct Idle;
//! impl Component for Idle {
//!     fn tick(&mut self, _: &Tick, _: &DataMemory) -> Result<TickOutcome, ComponentError> {
//!         Ok(TickOutcome::Inactive)
//!     }
//! }
//!
//! fn base(_: &ComponentRegistry, _: u32) -> TypeRegistration {
//!     TypeRegistration::done(ComponentInfo::abstract_type("base", "shared settings"))
//! }
//!
//! fn idle(registry: &ComponentRegistry, _: u32) -> TypeRegistration {
//!     let info = ComponentInfo::new("idle", "does nothing", |_| Box::new(Idle));
//!     if registry.find_type("base").is_some() {
//!         TypeRegistration::done(info)
//!     } else {
//!         TypeRegistration::again(info)
//!     }
//! }
//!
//! let mut registry = ComponentRegistry::new();
//! // `idle` comes first and needs a second pass
//! assert_eq!(registry.register_types(&[idle, base]).unwrap(), 2);
//! assert!(registry.create("idle", "i0").is_ok());
//! assert!(registry.create("base", "b0").is_err());
//! ```

use tracing::{debug, error};

use crate::component::Component;
use crate::error::FlowError;

/// Upper bound on registration passes.
pub const MAX_REGISTRATION_PASSES: u32 = 4;

/// Creates a component for the given instance name.
pub type ComponentFactory = fn(&str) -> Box<dyn Component>;

/// Registers one type. Receives the registry as built so far and the pass number.
pub type RegisterFn = fn(&ComponentRegistry, u32) -> TypeRegistration;

/// Describes a component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    /// Unique type name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Abstract types cannot be instantiated.
    pub abstract_type: bool,
    /// The type does not use the buffer store.
    pub no_store: bool,
    /// Constructor; `None` for abstract types.
    pub factory: Option<ComponentFactory>,
}

impl ComponentInfo {
    /// A concrete, store-using type.
    pub fn new(name: &'static str, description: &'static str, factory: ComponentFactory) -> Self {
        Self {
            name,
            description,
            abstract_type: false,
            no_store: false,
            factory: Some(factory),
        }
    }

    /// An abstract type without a factory.
    pub fn abstract_type(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            abstract_type: true,
            no_store: false,
            factory: None,
        }
    }

    /// Mark the type as not using the buffer store.
    pub fn without_store(mut self) -> Self {
        self.no_store = true;
        self
    }
}

/// Result of a register function.
#[derive(Debug, Clone)]
pub struct TypeRegistration {
    /// Type description.
    pub info: ComponentInfo,
    /// The type is incomplete and wants another pass.
    pub register_again: bool,
}

impl TypeRegistration {
    /// Registration is complete.
    pub fn done(info: ComponentInfo) -> Self {
        Self {
            info,
            register_again: false,
        }
    }

    /// Ask for another pass.
    pub fn again(info: ComponentInfo) -> Self {
        Self {
            info,
            register_again: true,
        }
    }
}

/// Which types [`ComponentRegistry::types`] lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeFilter {
    /// Every type.
    #[default]
    All,
    /// Instantiable types only.
    Concrete,
    /// Instantiable types that use the buffer store.
    StoreComponents,
}

/// Registry of component types.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    entries: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a type, replacing an existing one with the same name. Returns its id.
    pub fn register(&mut self, info: ComponentInfo) -> usize {
        if let Some(id) = self.find_type(info.name) {
            debug!(component_type = info.name, "re-registering type");
            self.entries[id] = info;
            id
        } else {
            debug!(component_type = info.name, "registered type");
            self.entries.push(info);
            self.entries.len() - 1
        }
    }

    /// Run register functions until none asks for another pass.
    ///
    /// Returns the number of types registered.
    pub fn register_types(&mut self, candidates: &[RegisterFn]) -> Result<usize, FlowError> {
        let mut pending: Vec<RegisterFn> = candidates.to_vec();
        let mut registered = 0;
        for pass in 0..MAX_REGISTRATION_PASSES {
            if pending.is_empty() {
                break;
            }
            let mut again = Vec::new();
            for register in pending {
                let reg = register(self, pass);
                if reg.register_again {
                    debug!(component_type = reg.info.name, pass, "type asks for another pass");
                    again.push(register);
                } else {
                    self.register(reg.info);
                    registered += 1;
                }
            }
            pending = again;
        }
        if pending.is_empty() {
            Ok(registered)
        } else {
            let err = FlowError::RegistrationDidNotConverge {
                pending: pending.len(),
                total: candidates.len(),
                passes: MAX_REGISTRATION_PASSES as usize,
            };
            error!("{err}");
            Err(err)
        }
    }

    /// Id of the type named `name`.
    pub fn find_type(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    /// Type description by name.
    pub fn get(&self, name: &str) -> Option<&ComponentInfo> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Instantiate `type_name` as `instance`.
    pub fn create(&self, type_name: &str, instance: &str) -> Result<Box<dyn Component>, FlowError> {
        let info = self
            .get(type_name)
            .ok_or_else(|| FlowError::UnknownType(type_name.to_string()))?;
        match info.factory {
            Some(factory) if !info.abstract_type => Ok(factory(instance)),
            _ => Err(FlowError::AbstractType(type_name.to_string())),
        }
    }

    /// Types matching `filter`, in registration order.
    pub fn types(&self, filter: TypeFilter) -> Vec<&ComponentInfo> {
        self.entries
            .iter()
            .filter(|e| match filter {
                TypeFilter::All => true,
                TypeFilter::Concrete => !e.abstract_type,
                TypeFilter::StoreComponents => !e.abstract_type && !e.no_store,
            })
            .collect()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
