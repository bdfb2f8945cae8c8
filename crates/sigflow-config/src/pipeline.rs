//! Pipeline file format and operations.

use serde::{Deserialize, Serialize};
use std::path::Path;

use sigflow_core::{ComponentRegistry, ConfigSource, ConfigValue, Scheduler, SchedulerSettings, ThreadId};
use tracing::debug;

use crate::error::ConfigError;
use crate::instance::InstanceEntry;
use crate::validation::{normalise_thread_ids, validate_pipeline};

/// Scheduler options of a pipeline file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerSection {
    /// Measure time spent per component.
    pub profiling: bool,
    /// Log per-round outcome summaries.
    pub exec_debug: bool,
    /// Stop after the first end-of-input pass.
    pub single_eoi_pass: bool,
    /// Level statistics detail after setup (0-4).
    pub print_level_stats: u8,
    /// Log level states after the run.
    pub print_final_level_states: bool,
    /// Requested tick threads.
    pub threads: u32,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        let s = SchedulerSettings::default();
        Self {
            profiling: s.profiling,
            exec_debug: s.exec_debug,
            single_eoi_pass: s.single_eoi_pass,
            print_level_stats: s.print_level_stats,
            print_final_level_states: s.print_final_level_states,
            threads: s.threads,
        }
    }
}

impl From<&SchedulerSection> for SchedulerSettings {
    fn from(s: &SchedulerSection) -> Self {
        SchedulerSettings {
            profiling: s.profiling,
            exec_debug: s.exec_debug,
            single_eoi_pass: s.single_eoi_pass,
            print_level_stats: s.print_level_stats.min(4),
            print_final_level_states: s.print_final_level_states,
            threads: s.threads,
        }
    }
}

/// A pipeline: scheduler settings plus an ordered list of component
/// instances with their parameters.
///
/// Instances tick in file order.
///
/// # TOML Format
///
/// ```toml
/// name = "rms of a sine"
///
/// [scheduler]
/// profiling = true
///
/// [[instance]]
/// name = "gen"
/// type = "signal_generator"
/// [instance.params]
/// frames = 4800
/// writer.level = "pcm"
///
/// [[instance]]
/// name = "rms"
/// type = "rms"
/// [instance.params]
/// reader.level = "pcm"
/// writer.level = "rms"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Pipeline {
    /// Optional name of the pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Scheduler options.
    #[serde(default)]
    pub scheduler: SchedulerSection,

    /// Component instances in tick order.
    #[serde(default, rename = "instance")]
    pub instances: Vec<InstanceEntry>,
}

impl Pipeline {
    /// Create a new empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pipeline name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replace the scheduler options.
    pub fn with_scheduler(mut self, scheduler: SchedulerSection) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Append an instance.
    pub fn with_instance(mut self, instance: InstanceEntry) -> Self {
        self.instances.push(instance);
        self
    }

    /// Load a pipeline from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let pipeline = Self::from_toml(&content)?;
        debug!(path = %path.display(), instances = pipeline.len(), "pipeline loaded");
        Ok(pipeline)
    }

    /// Load a pipeline from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the pipeline to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the pipeline to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Check if the pipeline has no instances.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Instance entry by name.
    pub fn get(&self, name: &str) -> Option<&InstanceEntry> {
        self.instances.iter().find(|i| i.name == name)
    }

    /// Mutable instance entry by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut InstanceEntry> {
        self.instances.iter_mut().find(|i| i.name == name)
    }

    /// Scheduler settings described by this pipeline.
    pub fn settings(&self) -> SchedulerSettings {
        SchedulerSettings::from(&self.scheduler)
    }

    /// Validate against `registry` and normalise thread ids.
    pub fn prepare(&mut self, registry: &ComponentRegistry) -> Result<(), ConfigError> {
        validate_pipeline(self, registry)?;
        normalise_thread_ids(self);
        Ok(())
    }

    /// Create a scheduler with every instance added, ready for
    /// [`Scheduler::create_instances`]. The pipeline serves as the
    /// scheduler's configuration source.
    pub fn build<'r>(&'r self, registry: &'r ComponentRegistry) -> Result<Scheduler<'r>, ConfigError> {
        validate_pipeline(self, registry)?;
        let settings = self.settings();
        let threads = settings.threads.max(1);
        let mut scheduler = Scheduler::with_settings(registry, self, settings);
        for entry in &self.instances {
            let thread = ThreadId::from_raw(entry.thread_id, threads);
            scheduler.add_instance(&entry.name, &entry.component_type, thread)?;
        }
        Ok(scheduler)
    }

    fn value(&self, instance: &str, key: &str) -> Option<ConfigValue> {
        self.get(instance)?.value(key)
    }
}

impl ConfigSource for Pipeline {
    fn get_int(&self, instance: &str, key: &str) -> Option<i64> {
        self.value(instance, key)?.as_int()
    }

    fn get_double(&self, instance: &str, key: &str) -> Option<f64> {
        self.value(instance, key)?.as_double()
    }

    fn get_string(&self, instance: &str, key: &str) -> Option<String> {
        self.value(instance, key).map(|v| v.as_string())
    }

    fn is_set(&self, instance: &str, key: &str) -> bool {
        self.get(instance).is_some_and(|e| e.get(key).is_some())
    }
}
