//! Phased setup and the single-threaded tick loop.
//!
//! # Setup
//!
//! [`Scheduler::create_instances`] runs once per pipeline:
//!
//! 1. **Register**: every instance declares its read and write requests,
//!    repeated for instances that ask for a retry. The store then checks
//!    that every read has a writer.
//! 2. **Configure and finalise**: per instance, configure and then at once
//!    finalise, so a downstream reader configured in a later pass already
//!    sees the layout its upstream writer fixed. Repeated until every
//!    instance is done or the pass budget is used up.
//! 3. The store configures and finalises all levels; the scheduler is ready.
//!
//! # Tick loop
//!
//! [`Scheduler::run`] ticks every scheduled instance once per round, in
//! insertion order. A round in which nobody succeeds first asks each
//! component whether it still expects data, then waits for the shared
//! data-available signal if someone is waiting on an external source, and
//! otherwise asserts end of input. A second unproductive round under end of
//! input ends the inner loop. End of input is then cleared and another pass
//! starts, so components that only began to drain after seeing it can
//! finish; the run ends when such a pass makes no progress at all.
//!
//! # Example
//!
//! ```rust
//! use sigflow_core::{
//!     Component, ComponentError, ComponentRegistry, DataMemory, MapConfig, Scheduler, ThreadId,
//!     Tick, TickOutcome,
//! };
//!
//! struct Countdown(u32);
//!
//! impl Component for Countdown {
//!     fn tick(&mut self, _: &Tick, _: &DataMemory) -> Result<TickOutcome, ComponentError> {
//!         if self.0 == 0 {
//!             return Ok(TickOutcome::Inactive);
//!         }
//!         self.0 -= 1;
//!         Ok(TickOutcome::Success)
//!     }
//! }
//!
//! let registry = ComponentRegistry::new();
//! let config = MapConfig::new();
//! let mut scheduler = Scheduler::new(&registry, &config);
//! scheduler
//!     .add_component("countdown", Box::new(Countdown(3)), ThreadId::Default)
//!     .unwrap();
//! scheduler.create_instances().unwrap();
//! let ticks = scheduler.run(None).unwrap();
//! assert_eq!(ticks, 6);
//! assert_eq!(scheduler.eoi_counter(), 1);
//! ```

mod control;
mod stats;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

pub use control::{PauseMode, SchedulerHandle};
pub use stats::{InstanceStats, RunStats};

use crate::component::{Component, SetupContext, SetupStatus, Tick, TickOutcome};
use crate::config::{ConfigSource, InstanceConfig};
use crate::error::{AccessError, ComponentError, FlowError};
use crate::registry::ComponentRegistry;
use crate::store::DataMemory;

/// Passes allowed for instance registration.
pub const MAX_INSTANCE_REGISTER_PASSES: usize = 2;

/// How long one wait for external data may block before the loop polls again.
const DATA_WAIT: Duration = Duration::from_millis(100);

/// Setup phases, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupPhase {
    /// Instance registration.
    Register,
    /// Interleaved configure and finalise.
    ConfigureFinalise,
}

impl fmt::Display for SetupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupPhase::Register => f.write_str("register"),
            SetupPhase::ConfigureFinalise => f.write_str("configure/finalise"),
        }
    }
}

/// Lifecycle of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Lifecycle {
    /// Constructed, nothing called yet.
    Created,
    /// Requests declared.
    Registered,
    /// Configured, not yet finalised.
    Configured,
    /// Ready to tick.
    Finalised,
    /// Inside the tick loop.
    Running,
    /// The loop is paused.
    Paused,
    /// The loop has finished.
    Terminated,
}

/// Logical thread an instance is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadId {
    /// Never ticked. The instance still takes part in setup.
    Never,
    /// The default thread.
    Default,
    /// An explicit thread number.
    Thread(u32),
}

impl ThreadId {
    /// Map a raw thread id: `-2` is [`ThreadId::Never`], `-1` (and anything
    /// below `-2`) the default thread, numbers at or above `threads` thread 0.
    pub fn from_raw(raw: i64, threads: u32) -> Self {
        match raw {
            -2 => ThreadId::Never,
            -1 => ThreadId::Default,
            r if r < -2 => {
                debug!(raw, "invalid thread id, using the default thread");
                ThreadId::Default
            }
            r if r >= i64::from(threads) => {
                debug!(raw, threads, "thread id out of range, using thread 0");
                ThreadId::Thread(0)
            }
            r => ThreadId::Thread(r as u32),
        }
    }

    /// Raw representation.
    pub fn raw(self) -> i64 {
        match self {
            ThreadId::Never => -2,
            ThreadId::Default => -1,
            ThreadId::Thread(n) => i64::from(n),
        }
    }

    /// Returns `true` unless the instance is never ticked.
    pub fn is_scheduled(self) -> bool {
        self != ThreadId::Never
    }
}

/// Scheduler options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Measure time spent in each component's `tick`.
    pub profiling: bool,
    /// Log every round's outcomes at debug level.
    pub exec_debug: bool,
    /// Stop after the first end-of-input pass.
    pub single_eoi_pass: bool,
    /// Detail of the level statistics logged after setup (0 = off, up to 4).
    pub print_level_stats: u8,
    /// Log level states after the run.
    pub print_final_level_states: bool,
    /// Requested tick threads; only one is supported.
    pub threads: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            profiling: false,
            exec_debug: false,
            single_eoi_pass: false,
            print_level_stats: 0,
            print_final_level_states: false,
            threads: 1,
        }
    }
}

/// Snapshot of one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    /// Instance name.
    pub name: String,
    /// Component type name (empty for pre-built components).
    pub type_name: String,
    /// Numeric id, in insertion order.
    pub id: u32,
    /// Thread assignment.
    pub thread: ThreadId,
    /// Lifecycle phase.
    pub lifecycle: Lifecycle,
    /// Outcome of the most recent tick.
    pub last_outcome: Option<TickOutcome>,
    /// End-of-input counter last seen by this instance.
    pub eoi_counter: u32,
}

struct Instance {
    name: String,
    type_name: String,
    id: u32,
    thread: ThreadId,
    lifecycle: Lifecycle,
    last_outcome: Option<TickOutcome>,
    eoi_counter: u32,
    stats: InstanceStats,
    component: Box<dyn Component>,
}

impl Instance {
    fn info(&self) -> InstanceInfo {
        InstanceInfo {
            name: self.name.clone(),
            type_name: self.type_name.clone(),
            id: self.id,
            thread: self.thread,
            lifecycle: self.lifecycle,
            last_outcome: self.last_outcome,
            eoi_counter: self.eoi_counter,
        }
    }
}

/// Counts of one round.
#[derive(Debug, Clone, Copy, Default)]
struct Round {
    run: usize,
    waiting: usize,
}

/// Creates, sets up and ticks component instances.
pub struct Scheduler<'r> {
    registry: &'r ComponentRegistry,
    config: &'r dyn ConfigSource,
    settings: SchedulerSettings,
    store: Arc<DataMemory>,
    instances: Vec<Instance>,
    handle: SchedulerHandle,
    ready: bool,
    eoi: bool,
    eoi_counter: u32,
    tick_nr: i64,
    last_run: usize,
}

impl fmt::Debug for Scheduler<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("settings", &self.settings)
            .field("instances", &self.instances.len())
            .field("ready", &self.ready)
            .field("eoi_counter", &self.eoi_counter)
            .field("tick_nr", &self.tick_nr)
            .finish_non_exhaustive()
    }
}

impl<'r> Scheduler<'r> {
    /// Scheduler bound to a registry and a configuration source.
    pub fn new(registry: &'r ComponentRegistry, config: &'r dyn ConfigSource) -> Self {
        Self::with_settings(registry, config, SchedulerSettings::default())
    }

    /// Scheduler with explicit settings.
    pub fn with_settings(
        registry: &'r ComponentRegistry,
        config: &'r dyn ConfigSource,
        mut settings: SchedulerSettings,
    ) -> Self {
        if settings.threads != 1 {
            warn!(
                requested = settings.threads,
                "only single-threaded ticking is supported, using one thread"
            );
            settings.threads = 1;
        }
        Self {
            registry,
            config,
            settings,
            store: Arc::new(DataMemory::new()),
            instances: Vec::new(),
            handle: SchedulerHandle::new(),
            ready: false,
            eoi: false,
            eoi_counter: 0,
            tick_nr: -1,
            last_run: 0,
        }
    }

    /// Current settings.
    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Control handle for other threads.
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// The buffer store.
    pub fn store(&self) -> &Arc<DataMemory> {
        &self.store
    }

    // ------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------

    /// Instantiate `type_name` from the registry as `name`.
    pub fn add_instance(&mut self, name: &str, type_name: &str, thread: ThreadId) -> Result<u32, FlowError> {
        let component = self.registry.create(type_name, name)?;
        self.push_instance(name, type_name, component, thread)
    }

    /// Add a pre-built component as `name`.
    pub fn add_component(
        &mut self,
        name: &str,
        component: Box<dyn Component>,
        thread: ThreadId,
    ) -> Result<u32, FlowError> {
        self.push_instance(name, "", component, thread)
    }

    fn push_instance(
        &mut self,
        name: &str,
        type_name: &str,
        component: Box<dyn Component>,
        thread: ThreadId,
    ) -> Result<u32, FlowError> {
        if self.ready {
            return Err(FlowError::NotReady("instances cannot be added after setup"));
        }
        if self.instances.iter().any(|i| i.name == name) {
            return Err(FlowError::DuplicateInstance(name.to_string()));
        }
        let id = self.instances.len() as u32;
        debug!(instance = name, component_type = type_name, id, ?thread, "added instance");
        self.instances.push(Instance {
            name: name.to_string(),
            type_name: type_name.to_string(),
            id,
            thread,
            lifecycle: Lifecycle::Created,
            last_outcome: None,
            eoi_counter: 0,
            stats: InstanceStats::new(name),
            component,
        });
        Ok(id)
    }

    /// Drop all instances and levels so a new pipeline can be built.
    pub fn reset_instances(&mut self) {
        debug!(instances = self.instances.len(), "resetting instances");
        self.instances.clear();
        self.store.clear();
        self.handle.reset();
        self.ready = false;
        self.eoi = false;
        self.eoi_counter = 0;
        self.tick_nr = -1;
        self.last_run = 0;
    }

    /// Snapshots of all instances.
    pub fn instances(&self) -> Vec<InstanceInfo> {
        self.instances.iter().map(Instance::info).collect()
    }

    /// Snapshot of one instance.
    pub fn instance(&self, name: &str) -> Option<InstanceInfo> {
        self.instances.iter().find(|i| i.name == name).map(Instance::info)
    }

    /// Outcome of the most recent tick of `name`.
    pub fn last_outcome(&self, name: &str) -> Option<TickOutcome> {
        self.instances
            .iter()
            .find(|i| i.name == name)
            .and_then(|i| i.last_outcome)
    }

    /// Returns `true` once setup has completed.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Number of the most recent round, `-1` before the first.
    pub fn tick_number(&self) -> i64 {
        self.tick_nr
    }

    /// End-of-input assertions so far.
    pub fn eoi_counter(&self) -> u32 {
        self.eoi_counter
    }

    /// Returns `true` while end of input is asserted.
    pub fn is_eoi(&self) -> bool {
        self.eoi
    }

    /// Outcome counts and profiling data.
    pub fn stats(&self) -> RunStats {
        RunStats {
            ticks: (self.tick_nr + 1).max(0) as u64,
            eoi_counter: self.eoi_counter,
            instances: self.instances.iter().map(|i| i.stats.clone()).collect(),
        }
    }

    // ------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------

    /// Register, configure and finalise every instance and the store.
    pub fn create_instances(&mut self) -> Result<(), FlowError> {
        if self.ready {
            return Err(FlowError::NotReady("instances were already created"));
        }
        let started = Instant::now();
        self.register_phase()?;
        self.store.check_requests()?;
        self.configure_finalise_phase()?;

        if self.store.is_empty() {
            debug!("no levels registered, skipping buffer store setup");
        } else {
            self.store.configure()?;
            self.store.finalise()?;
        }
        if self.settings.print_level_stats > 0 {
            for stats in self.store.stats() {
                info!("{}", stats.render(self.settings.print_level_stats));
            }
        }
        self.ready = true;
        info!(
            instances = self.instances.len(),
            levels = self.store.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline ready"
        );
        Ok(())
    }

    fn register_phase(&mut self) -> Result<(), FlowError> {
        for pass in 0..MAX_INSTANCE_REGISTER_PASSES {
            let mut pending = 0;
            for inst in self.instances.iter_mut().filter(|i| i.lifecycle == Lifecycle::Created) {
                let ctx = SetupContext {
                    instance: &inst.name,
                    config: InstanceConfig::new(&inst.name, self.config),
                    store: &self.store,
                    control: &self.handle,
                };
                match inst.component.register_instance(&ctx) {
                    Ok(SetupStatus::Done) => inst.lifecycle = Lifecycle::Registered,
                    Ok(SetupStatus::Retry) => pending += 1,
                    Err(e) => return Err(FlowError::component(&inst.name, e)),
                }
            }
            debug!(pass, pending, "register pass");
            if pending == 0 {
                return Ok(());
            }
        }
        Err(self.not_converged(SetupPhase::Register, Lifecycle::Registered))
    }

    fn configure_finalise_phase(&mut self) -> Result<(), FlowError> {
        let passes = self.instances.len().max(1);
        for pass in 0..passes {
            let mut pending = 0;
            for inst in self.instances.iter_mut().filter(|i| i.lifecycle < Lifecycle::Finalised) {
                let ctx = SetupContext {
                    instance: &inst.name,
                    config: InstanceConfig::new(&inst.name, self.config),
                    store: &self.store,
                    control: &self.handle,
                };
                if inst.lifecycle == Lifecycle::Registered {
                    match inst.component.configure_instance(&ctx) {
                        Ok(SetupStatus::Done) => inst.lifecycle = Lifecycle::Configured,
                        Ok(SetupStatus::Retry) => {
                            pending += 1;
                            continue;
                        }
                        Err(e) => return Err(FlowError::component(&inst.name, e)),
                    }
                }
                match inst.component.finalise_instance(&ctx) {
                    Ok(SetupStatus::Done) => inst.lifecycle = Lifecycle::Finalised,
                    Ok(SetupStatus::Retry) => pending += 1,
                    Err(e) => return Err(FlowError::component(&inst.name, e)),
                }
            }
            debug!(pass, pending, "configure/finalise pass");
            if pending == 0 {
                return Ok(());
            }
        }
        Err(self.not_converged(SetupPhase::ConfigureFinalise, Lifecycle::Finalised))
    }

    fn not_converged(&self, phase: SetupPhase, target: Lifecycle) -> FlowError {
        let pending = self
            .instances
            .iter()
            .filter(|i| i.lifecycle < target)
            .map(|i| i.name.clone())
            .collect();
        FlowError::PhaseDidNotConverge { phase, pending }
    }

    // ------------------------------------------------------------------
    // Tick loop
    // ------------------------------------------------------------------

    /// Tick until the pipeline has drained, `max_ticks` rounds have run or
    /// an abort is requested. Returns the number of rounds executed.
    pub fn run(&mut self, max_ticks: Option<u64>) -> Result<u64, FlowError> {
        if !self.ready {
            return Err(FlowError::NotReady("create_instances has not completed"));
        }
        self.set_lifecycle(Lifecycle::Running);
        let started = Instant::now();
        let mut ticks_run: u64 = 0;
        let mut first_after_reset = false;

        'outer: loop {
            loop {
                if self.handle.is_abort() {
                    info!(tick = self.tick_nr, "abort requested");
                    break 'outer;
                }
                if max_ticks.is_some_and(|max| ticks_run >= max) {
                    info!(ticks = ticks_run, "tick limit reached");
                    break 'outer;
                }

                let round = self.tick_all()?;
                ticks_run += 1;
                self.last_run = round.run;
                // only the first round of a drain pass may end the run
                let fresh_pass = std::mem::take(&mut first_after_reset);

                if self.pause_point(round.run) {
                    continue;
                }

                if round.run == 0 {
                    if self.notify_empty() > 0 {
                        continue;
                    }
                    if round.waiting > 0 {
                        self.handle.wait_for_data(DATA_WAIT);
                        continue;
                    }
                    self.report_stalled();
                    if fresh_pass {
                        break 'outer;
                    }
                    if self.eoi {
                        break;
                    }
                    self.eoi = true;
                    self.eoi_counter += 1;
                    self.store.set_eoi(self.eoi_counter);
                    info!(tick = self.tick_nr, counter = self.eoi_counter, "end of input");
                }
            }

            if self.settings.single_eoi_pass {
                break;
            }
            debug!(tick = self.tick_nr, "clearing end of input for another drain pass");
            self.eoi = false;
            self.store.unset_eoi();
            first_after_reset = true;
        }

        self.set_lifecycle(Lifecycle::Terminated);
        info!(
            ticks = ticks_run,
            eoi_passes = self.eoi_counter,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tick loop finished"
        );
        if self.settings.profiling {
            for line in self.stats().profile_lines() {
                info!("profile: {line}");
            }
        }
        if self.settings.print_final_level_states {
            for state in self.store.level_states() {
                info!("final: {state}");
            }
        }
        Ok(ticks_run)
    }

    fn tick_all(&mut self) -> Result<Round, FlowError> {
        self.tick_nr += 1;
        let tick = Tick {
            number: self.tick_nr as u64,
            eoi: self.eoi,
            eoi_counter: self.eoi_counter,
            last_run_count: self.last_run,
        };
        let profiling = self.settings.profiling;
        let mut round = Round::default();

        for inst in self.instances.iter_mut().filter(|i| i.thread.is_scheduled()) {
            let t0 = profiling.then(Instant::now);
            let result = inst.component.tick(&tick, &self.store);
            if let Some(t0) = t0 {
                inst.stats.busy += t0.elapsed();
            }
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(ComponentError::Access(e)) if e.is_recoverable() => recoverable_outcome(&e),
                Err(e) => return Err(FlowError::component(&inst.name, e)),
            };

            if outcome.is_backpressure() && !inst.last_outcome.is_some_and(TickOutcome::is_backpressure) {
                debug!(instance = %inst.name, tick = tick.number, "{outcome}, waiting for readers");
            }
            match outcome {
                TickOutcome::Success => round.run += 1,
                o if o.is_external() => round.waiting += 1,
                _ => {}
            }
            inst.last_outcome = Some(outcome);
            inst.eoi_counter = tick.eoi_counter;
            inst.stats.record(outcome);
        }

        if self.settings.exec_debug {
            let summary = stats::round_summary(
                self.instances
                    .iter()
                    .filter_map(|i| i.last_outcome.map(|o| (i.name.as_str(), o))),
            );
            debug!(tick = tick.number, eoi = tick.eoi, "{summary}");
        }
        Ok(round)
    }

    fn notify_empty(&mut self) -> usize {
        self.instances
            .iter_mut()
            .filter(|i| i.thread.is_scheduled())
            .map(|i| i.component.notify_empty_tick_loop())
            .filter(|waiting| *waiting)
            .count()
    }

    fn report_stalled(&self) {
        let blocked: Vec<&str> = self
            .instances
            .iter()
            .filter(|i| i.last_outcome == Some(TickOutcome::DestinationNoSpace))
            .map(|i| i.name.as_str())
            .collect();
        if !blocked.is_empty() {
            warn!(
                tick = self.tick_nr,
                "no progress while components wait for space: {}",
                blocked.join(", ")
            );
        }
    }

    /// Handle a pending pause. Returns `true` if the loop was paused and the
    /// end-of-round evaluation must be skipped.
    fn pause_point(&mut self, n_run: usize) -> bool {
        let Some(mode) = self.handle.pending_pause() else {
            return false;
        };
        let tick = self.tick_nr.max(0) as u64;
        match mode {
            PauseMode::Immediate => {
                if !self.notify_pause() {
                    return false;
                }
                self.wait_paused();
                true
            }
            PauseMode::Drain { timeout_ticks } => {
                let (start, first) = self.handle.begin_drain(tick);
                if first && !self.notify_pause() {
                    return false;
                }
                if tick - start > timeout_ticks {
                    warn!(tick, start, timeout_ticks, "pipeline did not drain in time, pause cancelled");
                    self.handle.cancel_pause();
                    self.notify_resume();
                    return false;
                }
                if n_run > 0 {
                    return false;
                }
                self.wait_paused();
                true
            }
        }
    }

    /// Ask every instance to pause. On rejection the pause is cancelled and
    /// the instances that already accepted are resumed.
    fn notify_pause(&mut self) -> bool {
        for idx in 0..self.instances.len() {
            if !self.instances[idx].component.pause() {
                error!(instance = %self.instances[idx].name, "pause rejected");
                self.handle.cancel_pause();
                for inst in &mut self.instances[..idx] {
                    inst.component.resume();
                }
                return false;
            }
        }
        true
    }

    fn notify_resume(&mut self) {
        for inst in &mut self.instances {
            inst.component.resume();
        }
    }

    fn wait_paused(&mut self) {
        info!(tick = self.tick_nr, "paused");
        self.set_lifecycle(Lifecycle::Paused);
        self.handle.block_while_paused();
        self.set_lifecycle(Lifecycle::Running);
        self.notify_resume();
        info!(tick = self.tick_nr, "resumed");
    }

    fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        for inst in &mut self.instances {
            inst.lifecycle = lifecycle;
        }
    }
}

fn recoverable_outcome(err: &AccessError) -> TickOutcome {
    match err {
        AccessError::Full { .. } => TickOutcome::DestinationNoSpace,
        _ => TickOutcome::SourceNotAvailable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;
    use crate::error::StoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Countdown(u32);

    impl Component for Countdown {
        fn tick(&mut self, _: &Tick, _: &DataMemory) -> Result<TickOutcome, ComponentError> {
            if self.0 == 0 {
                return Ok(TickOutcome::Inactive);
            }
            self.0 -= 1;
            Ok(TickOutcome::Success)
        }
    }

    struct Stubborn;

    impl Component for Stubborn {
        fn configure_instance(&mut self, _: &SetupContext<'_>) -> Result<SetupStatus, ComponentError> {
            Ok(SetupStatus::Retry)
        }

        fn tick(&mut self, _: &Tick, _: &DataMemory) -> Result<TickOutcome, ComponentError> {
            Ok(TickOutcome::Inactive)
        }
    }

    struct Broken;

    impl Component for Broken {
        fn tick(&mut self, _: &Tick, _: &DataMemory) -> Result<TickOutcome, ComponentError> {
            Err(ComponentError::Failed("boom".into()))
        }
    }

    struct Reader;

    impl Component for Reader {
        fn register_instance(&mut self, ctx: &SetupContext<'_>) -> Result<SetupStatus, ComponentError> {
            ctx.store.register_read_request("missing", ctx.instance);
            Ok(SetupStatus::Done)
        }

        fn tick(&mut self, _: &Tick, _: &DataMemory) -> Result<TickOutcome, ComponentError> {
            Ok(TickOutcome::Inactive)
        }
    }

    struct Counted(Arc<AtomicUsize>);

    impl Component for Counted {
        fn tick(&mut self, _: &Tick, _: &DataMemory) -> Result<TickOutcome, ComponentError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(TickOutcome::Inactive)
        }
    }

    /// Waits for external data once, in the first round after end of input
    /// was cleared, and logs every end-of-input edge it sees.
    #[derive(Default)]
    struct LateWaiter {
        control: Option<SchedulerHandle>,
        seen_eoi: bool,
        waited: bool,
        last_eoi: bool,
        edges: Arc<parking_lot::Mutex<Vec<u32>>>,
    }

    impl Component for LateWaiter {
        fn register_instance(&mut self, ctx: &SetupContext<'_>) -> Result<SetupStatus, ComponentError> {
            self.control = Some(ctx.control.clone());
            Ok(SetupStatus::Done)
        }

        fn tick(&mut self, tick: &Tick, _: &DataMemory) -> Result<TickOutcome, ComponentError> {
            if tick.eoi && !self.last_eoi {
                self.edges.lock().push(tick.eoi_counter);
            }
            self.last_eoi = tick.eoi;
            if tick.eoi {
                self.seen_eoi = true;
                return Ok(TickOutcome::Inactive);
            }
            if self.seen_eoi && !self.waited {
                self.waited = true;
                if let Some(control) = &self.control {
                    control.signal_data_available();
                }
                return Ok(TickOutcome::ExternalSourceNotAvailable);
            }
            Ok(TickOutcome::Inactive)
        }
    }

    fn setup<'a>(registry: &'a ComponentRegistry, config: &'a MapConfig) -> Scheduler<'a> {
        Scheduler::new(registry, config)
    }

    #[test]
    fn countdown_runs_to_completion() {
        let (registry, config) = (ComponentRegistry::new(), MapConfig::new());
        let mut s = setup(&registry, &config);
        s.add_component("c", Box::new(Countdown(3)), ThreadId::Default).unwrap();
        s.create_instances().unwrap();
        // 3 productive rounds, one that asserts end of input, one that ends
        // the pass, one unproductive round after the reset
        assert_eq!(s.run(None).unwrap(), 6);
        assert_eq!(s.eoi_counter(), 1);
        assert_eq!(s.last_outcome("c"), Some(TickOutcome::Inactive));
        assert_eq!(s.instance("c").unwrap().lifecycle, Lifecycle::Terminated);
    }

    #[test]
    fn single_eoi_pass_skips_reset_round() {
        let (registry, config) = (ComponentRegistry::new(), MapConfig::new());
        let settings = SchedulerSettings {
            single_eoi_pass: true,
            ..SchedulerSettings::default()
        };
        let mut s = Scheduler::with_settings(&registry, &config, settings);
        s.add_component("c", Box::new(Countdown(2)), ThreadId::Default).unwrap();
        s.create_instances().unwrap();
        assert_eq!(s.run(None).unwrap(), 4);
    }

    #[test]
    fn waiting_round_does_not_end_a_drain_pass() {
        let (registry, config) = (ComponentRegistry::new(), MapConfig::new());
        let mut s = setup(&registry, &config);
        let waiter = LateWaiter::default();
        let edges = Arc::clone(&waiter.edges);
        s.add_component("w", Box::new(waiter), ThreadId::Default).unwrap();
        s.create_instances().unwrap();
        // pass 1: two idle rounds. pass 2 starts with a waiting round, so
        // the idle round after it asserts end of input again. pass 3 ends
        // the run on its first idle round.
        assert_eq!(s.run(None).unwrap(), 6);
        assert_eq!(s.eoi_counter(), 2);
        assert_eq!(*edges.lock(), vec![1, 2]);
    }

    #[test]
    fn max_ticks_limits_run() {
        let (registry, config) = (ComponentRegistry::new(), MapConfig::new());
        let mut s = setup(&registry, &config);
        s.add_component("c", Box::new(Countdown(100)), ThreadId::Default).unwrap();
        s.create_instances().unwrap();
        assert_eq!(s.run(Some(10)).unwrap(), 10);
        assert_eq!(s.tick_number(), 9);
    }

    #[test]
    fn never_scheduled_instance_is_not_ticked() {
        let (registry, config) = (ComponentRegistry::new(), MapConfig::new());
        let count = Arc::new(AtomicUsize::new(0));
        let mut s = setup(&registry, &config);
        s.add_component("idle", Box::new(Counted(Arc::clone(&count))), ThreadId::Never)
            .unwrap();
        s.add_component("c", Box::new(Countdown(1)), ThreadId::Default).unwrap();
        s.create_instances().unwrap();
        s.run(None).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(s.instance("idle").unwrap().lifecycle, Lifecycle::Terminated);
    }

    #[test]
    fn duplicate_instance_rejected() {
        let (registry, config) = (ComponentRegistry::new(), MapConfig::new());
        let mut s = setup(&registry, &config);
        s.add_component("a", Box::new(Countdown(1)), ThreadId::Default).unwrap();
        assert!(matches!(
            s.add_component("a", Box::new(Countdown(1)), ThreadId::Default),
            Err(FlowError::DuplicateInstance(_))
        ));
    }

    #[test]
    fn configure_retry_forever_fails() {
        let (registry, config) = (ComponentRegistry::new(), MapConfig::new());
        let mut s = setup(&registry, &config);
        s.add_component("stubborn", Box::new(Stubborn), ThreadId::Default).unwrap();
        match s.create_instances() {
            Err(FlowError::PhaseDidNotConverge { phase, pending }) => {
                assert_eq!(phase, SetupPhase::ConfigureFinalise);
                assert_eq!(pending, vec!["stubborn".to_string()]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn dangling_read_stops_setup() {
        let (registry, config) = (ComponentRegistry::new(), MapConfig::new());
        let mut s = setup(&registry, &config);
        s.add_component("r", Box::new(Reader), ThreadId::Default).unwrap();
        assert!(matches!(
            s.create_instances(),
            Err(FlowError::Store(StoreError::DanglingReader { .. }))
        ));
    }

    #[test]
    fn tick_error_is_fatal() {
        let (registry, config) = (ComponentRegistry::new(), MapConfig::new());
        let mut s = setup(&registry, &config);
        s.add_component("b", Box::new(Broken), ThreadId::Default).unwrap();
        s.create_instances().unwrap();
        let err = s.run(None).unwrap_err();
        assert!(matches!(err, FlowError::Component { ref instance, .. } if instance == "b"));
    }

    #[test]
    fn run_requires_setup() {
        let (registry, config) = (ComponentRegistry::new(), MapConfig::new());
        let mut s = setup(&registry, &config);
        assert!(matches!(s.run(None), Err(FlowError::NotReady(_))));
    }

    #[test]
    fn abort_before_run_stops_immediately() {
        let (registry, config) = (ComponentRegistry::new(), MapConfig::new());
        let mut s = setup(&registry, &config);
        s.add_component("c", Box::new(Countdown(100)), ThreadId::Default).unwrap();
        s.create_instances().unwrap();
        s.handle().request_abort();
        assert_eq!(s.run(None).unwrap(), 0);
    }

    #[test]
    fn reset_allows_new_pipeline() {
        let (registry, config) = (ComponentRegistry::new(), MapConfig::new());
        let mut s = setup(&registry, &config);
        s.add_component("c", Box::new(Countdown(1)), ThreadId::Default).unwrap();
        s.create_instances().unwrap();
        s.run(None).unwrap();
        s.reset_instances();
        assert!(!s.is_ready());
        assert_eq!(s.eoi_counter(), 0);
        s.add_component("c", Box::new(Countdown(1)), ThreadId::Default).unwrap();
        s.create_instances().unwrap();
        assert_eq!(s.run(None).unwrap(), 4);
    }

    #[test]
    fn thread_ids_normalise() {
        assert_eq!(ThreadId::from_raw(-2, 1), ThreadId::Never);
        assert_eq!(ThreadId::from_raw(-7, 1), ThreadId::Default);
        assert_eq!(ThreadId::from_raw(3, 1), ThreadId::Thread(0));
        assert_eq!(ThreadId::from_raw(0, 1), ThreadId::Thread(0));
        assert_eq!(ThreadId::Never.raw(), -2);
    }

    #[test]
    fn extra_threads_forced_to_one() {
        let (registry, config) = (ComponentRegistry::new(), MapConfig::new());
        let settings = SchedulerSettings {
            threads: 4,
            ..SchedulerSettings::default()
        };
        let s = Scheduler::with_settings(&registry, &config, settings);
        assert_eq!(s.settings().threads, 1);
    }

    #[test]
    fn stats_count_outcomes() {
        let (registry, config) = (ComponentRegistry::new(), MapConfig::new());
        let mut s = setup(&registry, &config);
        s.add_component("c", Box::new(Countdown(2)), ThreadId::Default).unwrap();
        s.create_instances().unwrap();
        s.run(None).unwrap();
        let stats = s.stats();
        assert_eq!(stats.ticks, 5);
        assert_eq!(stats.instances[0].count(TickOutcome::Success), 2);
        assert_eq!(stats.instances[0].count(TickOutcome::Inactive), 3);
    }
}
