//! Reader and writer sides of the level protocol.
//!
//! Every component that touches the buffer store goes through the same
//! steps: declare its reads and writes while registering, find (or create)
//! its levels while configuring, and from then on move blocks each tick.
//! [`LevelWriter`] and [`LevelReader`] bundle those steps.
//!
//! Parameters are read from the instance scope under a prefix, `writer` or
//! `reader` by default:
//!
//! | Key | Meaning | Default |
//! |-----|---------|---------|
//! | `writer.level` | level name | component specific |
//! | `writer.capacity` | capacity in frames | 1024 |
//! | `writer.growable` | grow instead of failing when full | false |
//! | `writer.no_hang` | overflow policy 0 (wait), 1 (skip if no readers), 2 (overwrite) | 1 |
//! | `reader.level` | level name | component specific |
//! | `reader.blocksize` | frames read per tick | 64 |

use std::sync::Arc;

use sigflow_core::{
    Block, ComponentError, DataMemory, InstanceConfig, Level, LevelConfig, LevelId, OverflowPolicy, Padding,
    ReaderId, SetupContext, SetupStatus,
};
use tracing::debug;

/// Default capacity of levels created by [`LevelWriter`].
pub const DEFAULT_CAPACITY: usize = 1024;

/// Default reader block size.
pub const DEFAULT_BLOCKSIZE: usize = 64;

/// Writer side of one level.
#[derive(Debug, Clone)]
pub struct LevelWriter {
    name: String,
    capacity: usize,
    growable: bool,
    overflow: OverflowPolicy,
    id: Option<LevelId>,
}

impl LevelWriter {
    /// Read `<prefix>.*` parameters from `config`.
    pub fn from_config(config: &InstanceConfig<'_>, prefix: &str, default_level: &str) -> Result<Self, ComponentError> {
        let key = |k: &str| format!("{prefix}.{k}");
        let capacity = config.int_or(&key("capacity"), DEFAULT_CAPACITY as i64);
        let capacity = usize::try_from(capacity)
            .ok()
            .filter(|c| *c > 0)
            .ok_or_else(|| ComponentError::invalid(key("capacity"), format!("expected a positive count, got {capacity}")))?;
        Ok(Self {
            name: config.string_or(&key("level"), default_level),
            capacity,
            growable: config.flag(&key("growable"), false),
            overflow: OverflowPolicy::from_no_hang(config.int_or(&key("no_hang"), 1)),
            id: None,
        })
    }

    /// Writer for `name` with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: DEFAULT_CAPACITY,
            growable: false,
            overflow: OverflowPolicy::default(),
            id: None,
        }
    }

    /// Level name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare the write. Call from `register_instance`.
    pub fn register(&self, ctx: &SetupContext<'_>) -> Result<(), ComponentError> {
        ctx.store.register_write_request(&self.name, ctx.instance)?;
        Ok(())
    }

    /// Level configuration built from the writer parameters.
    pub fn level_config(&self, period: f64) -> LevelConfig {
        LevelConfig::new(self.name.clone(), self.capacity)
            .with_period(period)
            .growable(self.growable)
            .with_overflow(self.overflow)
    }

    /// Create the level with the given fields and fix its layout.
    ///
    /// `fields` are `(name, width)` pairs; width > 1 makes an array field.
    pub fn create(
        &mut self,
        store: &DataMemory,
        config: LevelConfig,
        fields: &[(&str, usize)],
        blocksize: usize,
    ) -> Result<LevelId, ComponentError> {
        let id = store.register_level(config)?;
        for (field, width) in fields {
            store.add_field(id, field, *width)?;
        }
        store.fixate(id)?;
        store.set_blocksize_writer(id, blocksize, false)?;
        debug!(level = %self.name, ?fields, blocksize, "level created");
        self.id = Some(id);
        Ok(id)
    }

    /// Level id once created.
    pub fn id(&self) -> Option<LevelId> {
        self.id
    }

    /// Frames that can be written without blocking.
    pub fn free(&self, store: &DataMemory) -> Result<usize, ComponentError> {
        Ok(store.free_count(self.require_id()?, None)?)
    }

    /// Append a block.
    pub fn write(&self, store: &DataMemory, block: &Block) -> Result<i64, ComponentError> {
        Ok(store.append_block(self.require_id()?, block)?)
    }

    /// Shared handle of the level, for writers on other threads.
    pub fn shared(&self, store: &DataMemory) -> Result<Arc<Level>, ComponentError> {
        let id = self.require_id()?;
        store
            .level(id)
            .ok_or_else(|| ComponentError::Failed(format!("level '{}' disappeared", self.name)))
    }

    fn require_id(&self) -> Result<LevelId, ComponentError> {
        self.id
            .ok_or_else(|| ComponentError::Failed(format!("level '{}' was not created", self.name)))
    }
}

/// What a reader learned about its upstream level.
#[derive(Debug, Clone, PartialEq)]
pub struct Upstream {
    /// Elements per frame.
    pub width: usize,
    /// Frame period in seconds.
    pub period: f64,
    /// Element names in layout order.
    pub element_names: Vec<String>,
}

/// Reader side of one level.
#[derive(Debug, Clone)]
pub struct LevelReader {
    name: String,
    blocksize: usize,
    handle: Option<(LevelId, ReaderId)>,
}

impl LevelReader {
    /// Read `<prefix>.*` parameters from `config`.
    pub fn from_config(config: &InstanceConfig<'_>, prefix: &str, default_level: &str) -> Result<Self, ComponentError> {
        let key = |k: &str| format!("{prefix}.{k}");
        let blocksize = config.int_or(&key("blocksize"), DEFAULT_BLOCKSIZE as i64);
        let blocksize = usize::try_from(blocksize)
            .ok()
            .filter(|b| *b > 0)
            .ok_or_else(|| ComponentError::invalid(key("blocksize"), format!("expected a positive count, got {blocksize}")))?;
        Ok(Self::new(config.string_or(&key("level"), default_level), blocksize))
    }

    /// Reader of `name` taking at most `blocksize` frames per read.
    pub fn new(name: impl Into<String>, blocksize: usize) -> Self {
        Self {
            name: name.into(),
            blocksize: blocksize.max(1),
            handle: None,
        }
    }

    /// Level name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Frames read per tick at most.
    pub fn blocksize(&self) -> usize {
        self.blocksize
    }

    /// Declare the read. Call from `register_instance`.
    pub fn register(&self, ctx: &SetupContext<'_>) {
        ctx.store.register_read_request(&self.name, ctx.instance);
    }

    /// Attach to the level once its writer has fixed the layout.
    ///
    /// Returns [`SetupStatus::Retry`] while the level is missing or unnamed.
    pub fn configure(&mut self, ctx: &SetupContext<'_>) -> Result<SetupStatus, ComponentError> {
        if self.handle.is_some() {
            return Ok(SetupStatus::Done);
        }
        let Some(id) = ctx.store.find_level(&self.name) else {
            debug!(instance = ctx.instance, level = %self.name, "level not created yet");
            return Ok(SetupStatus::Retry);
        };
        let named = ctx.store.level(id).is_some_and(|l| l.is_named());
        if !named {
            debug!(instance = ctx.instance, level = %self.name, "level layout not fixed yet");
            return Ok(SetupStatus::Retry);
        }
        let reader = ctx.store.register_reader(id)?;
        ctx.store.query_read_config(id, self.blocksize)?;
        self.handle = Some((id, reader));
        Ok(SetupStatus::Done)
    }

    /// Layout and period of the upstream level.
    pub fn upstream(&self, store: &DataMemory) -> Result<Upstream, ComponentError> {
        let (id, _) = self.require_handle()?;
        let level = store
            .level(id)
            .ok_or_else(|| ComponentError::Failed(format!("level '{}' disappeared", self.name)))?;
        let layout = level.layout();
        Ok(Upstream {
            width: layout.width(),
            period: level.config().period,
            element_names: (0..layout.width()).filter_map(|i| layout.element_name(i)).collect(),
        })
    }

    /// Level and reader ids once configured.
    pub fn handle(&self) -> Option<(LevelId, ReaderId)> {
        self.handle
    }

    /// Frames this reader has not consumed yet.
    pub fn available(&self, store: &DataMemory) -> Result<usize, ComponentError> {
        let (id, reader) = self.require_handle()?;
        Ok(store.available_count(id, Some(reader))?)
    }

    /// Read up to `blocksize` frames. Returns `None` when nothing is available.
    pub fn read(&self, store: &DataMemory) -> Result<Option<Block>, ComponentError> {
        self.read_at_most(store, self.blocksize)
    }

    /// Read up to `max` frames. Returns `None` when nothing is available.
    pub fn read_at_most(&self, store: &DataMemory, max: usize) -> Result<Option<Block>, ComponentError> {
        let (id, reader) = self.require_handle()?;
        let n = store.available_count(id, Some(reader))?.min(max);
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(store.get_next_block(id, reader, n, Padding::None)?))
    }

    fn require_handle(&self) -> Result<(LevelId, ReaderId), ComponentError> {
        self.handle
            .ok_or_else(|| ComponentError::Failed(format!("reader of '{}' is not configured", self.name)))
    }
}
