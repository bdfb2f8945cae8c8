//! Buffer levels: named ring or linear frame buffers with independent readers.
//!
//! A [`Level`] holds the output frames of exactly one writing component and
//! serves any number of reading components. Every frame has a logical index
//! that never changes; the mapping to physical slots is internal.
//!
//! # Architecture
//!
//! ```text
//! Level
//! ├── data: RwLock<LevelData>     config, field layout, frame storage
//! └── cursors: Mutex<Cursors>     curW, curR, one cursor per reader
//! ```
//!
//! Writes take the data lock exclusively, reads share it. The lock is
//! task-fair, so a waiting writer blocks new readers and cannot be starved.
//! Cursor arithmetic happens under the separate cursor lock, which is only
//! held for a few comparisons. The data lock is always taken first.
//!
//! # Lifecycle
//!
//! 1. The writer adds fields and marks the layout as named ([`Level::fixate`]).
//! 2. Readers register ([`Level::register_reader`]) and negotiate block sizes
//!    ([`Level::query_read_config`]).
//! 3. The store configures and finalises the level, fixing the capacity and
//!    allocating storage.
//! 4. Frames are written and read by logical index.
//!
//! # Example
//!
//! ```rust
//! use sigflow_core::{Frame, Level, LevelConfig, Padding};
//!
//! let level = Level::with_fields(LevelConfig::new("pcm", 4), &[("pcm", 1)]).unwrap();
//! let reader = level.register_reader_unchecked();
//! level.append_frame(&Frame::scalar(10.0)).unwrap();
//! level.append_frame(&Frame::scalar(20.0)).unwrap();
//!
//! let block = level.get_next_block(reader, 2, Padding::None).unwrap();
//! assert_eq!(block.values(), &[10.0, 20.0]);
//! assert_eq!(level.current_read(Some(reader)).unwrap(), 2);
//! ```

mod config;
mod cursor;
mod frame;
mod storage;

use std::fmt;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

pub use config::{FieldInfo, FieldLayout, LevelConfig, OverflowPolicy};
pub use frame::{Block, Frame, Padding, TimeMeta};

use crate::error::{AccessError, StoreError};
use cursor::{Cursors, Geometry, WritePlan};
use storage::FrameStorage;

/// Identifies a registered reader of one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReaderId(pub(crate) u32);

impl ReaderId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug)]
struct LevelData {
    config: LevelConfig,
    layout: FieldLayout,
    named: bool,
    blocksize_fixed: bool,
    storage: Option<FrameStorage>,
}

impl LevelData {
    fn geometry(&self) -> Geometry {
        Geometry {
            capacity: self.config.capacity,
            ring: self.config.ring,
        }
    }
}

/// A named frame buffer; see the [module docs](self).
#[derive(Debug)]
pub struct Level {
    name: String,
    epoch: Instant,
    data: RwLock<LevelData>,
    cursors: Mutex<Cursors>,
}

/// Cursor snapshot of one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelState {
    /// Level name.
    pub name: String,
    /// Capacity in frames.
    pub capacity: usize,
    /// Global read cursor.
    pub cur_r: i64,
    /// Write cursor.
    pub cur_w: i64,
    /// Frames available to the slowest reader.
    pub available: usize,
    /// Free frames for the writer.
    pub free: usize,
    /// Registered readers.
    pub readers: usize,
}

impl fmt::Display for LevelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: curR={} curW={} avail={} free={} capacity={} readers={}",
            self.name, self.cur_r, self.cur_w, self.available, self.free, self.capacity, self.readers
        )
    }
}

/// Static description of a level for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelStats {
    /// Level configuration after negotiation.
    pub config: LevelConfig,
    /// Registered readers.
    pub readers: usize,
    /// Elements per frame.
    pub width: usize,
    /// Field layout.
    pub fields: Vec<FieldInfo>,
    /// Element names in layout order.
    pub element_names: Vec<String>,
}

impl LevelStats {
    /// Render at the given detail (1 = summary, 2 = block sizes, 3 = fields, 4 = elements).
    pub fn render(&self, detail: u8) -> String {
        let c = &self.config;
        let mut out = format!(
            "level '{}': {} capacity={} ({:.3}s) period={}s readers={} width={}",
            c.name,
            if c.ring { "ring" } else { "linear" },
            c.capacity,
            c.len_sec,
            c.period,
            self.readers,
            self.width
        );
        if detail >= 2 {
            out.push_str(&format!(
                " bs_writer={} bs_reader={} min_bs_reader={} growable={} overflow={:?}",
                c.blocksize_writer,
                c.blocksize_reader,
                c.min_blocksize_reader.unwrap_or(0),
                c.growable,
                c.overflow
            ));
        }
        if detail >= 3 {
            let names: Vec<String> = self
                .fields
                .iter()
                .map(|f| format!("{}({})", f.name, f.width))
                .collect();
            out.push_str(&format!(" fields=[{}]", names.join(", ")));
        }
        if detail >= 4 {
            out.push_str(&format!(" elements=[{}]", self.element_names.join(", ")));
        }
        out
    }
}

impl Level {
    /// Create an unfinalised level.
    pub fn new(config: LevelConfig) -> Result<Self, StoreError> {
        Self::with_epoch(config, Instant::now())
    }

    pub(crate) fn with_epoch(config: LevelConfig, epoch: Instant) -> Result<Self, StoreError> {
        let config = config.validated()?;
        Ok(Self {
            name: config.name.clone(),
            epoch,
            data: RwLock::new(LevelData {
                config,
                layout: FieldLayout::default(),
                named: false,
                blocksize_fixed: false,
                storage: None,
            }),
            cursors: Mutex::new(Cursors::default()),
        })
    }

    /// Create, name and finalise a level in one step.
    pub fn with_fields(config: LevelConfig, fields: &[(&str, usize)]) -> Result<Self, StoreError> {
        let level = Self::new(config)?;
        for (name, width) in fields {
            level.add_field(name, *width, 0)?;
        }
        level.fixate();
        level.configure()?;
        level.finalise()?;
        Ok(level)
    }

    /// Level name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> LevelConfig {
        self.data.read().config.clone()
    }

    // ------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------

    /// Append a field of `width` elements (0 counts as 1).
    pub fn add_field(&self, name: &str, width: usize, arr_name_offset: i32) -> Result<(), StoreError> {
        let mut data = self.data.write();
        if data.storage.is_some() {
            return Err(StoreError::AlreadyFinalised(self.name.clone()));
        }
        data.layout.push(name, width, arr_name_offset);
        Ok(())
    }

    /// Change the array name offset of the most recently added field.
    pub fn set_arr_name_offset(&self, offset: i32) {
        self.data.write().layout.set_last_arr_name_offset(offset);
    }

    /// Mark the field layout as complete.
    pub fn fixate(&self) {
        self.data.write().named = true;
    }

    /// Returns `true` once the writer has fixed the field layout.
    pub fn is_named(&self) -> bool {
        self.data.read().named
    }

    /// Returns `true` once storage is allocated.
    pub fn is_finalised(&self) -> bool {
        self.data.read().storage.is_some()
    }

    /// Copy of the field layout.
    pub fn layout(&self) -> FieldLayout {
        self.data.read().layout.clone()
    }

    /// Elements per frame.
    pub fn width(&self) -> usize {
        self.data.read().layout.width()
    }

    /// Element index of `name` or `name[i]`.
    pub fn find_field(&self, name: &str) -> Option<usize> {
        self.data.read().layout.find(name)
    }

    /// Register a reader. Only allowed before finalisation.
    pub fn register_reader(&self) -> Result<ReaderId, StoreError> {
        let data = self.data.read();
        if data.storage.is_some() {
            return Err(StoreError::AlreadyFinalised(self.name.clone()));
        }
        let mut c = self.cursors.lock();
        c.readers.push(0);
        let id = ReaderId((c.readers.len() - 1) as u32);
        debug!(level = %self.name, reader = id.0, "registered reader");
        Ok(id)
    }

    /// Register a reader on an already finalised level, starting at the
    /// current global read cursor.
    pub fn register_reader_unchecked(&self) -> ReaderId {
        let mut c = self.cursors.lock();
        let start = c.cur_r;
        c.readers.push(start);
        ReaderId((c.readers.len() - 1) as u32)
    }

    /// Number of registered readers.
    pub fn reader_count(&self) -> usize {
        self.cursors.lock().readers.len()
    }

    /// Announce a reader block size in frames.
    pub fn query_read_config(&self, blocksize: usize) -> Result<(), StoreError> {
        let mut data = self.data.write();
        if data.blocksize_fixed {
            return Err(StoreError::BlocksizeFixed(self.name.clone()));
        }
        let cfg = &mut data.config;
        cfg.blocksize_reader = cfg.blocksize_reader.max(blocksize);
        cfg.min_blocksize_reader = Some(cfg.min_blocksize_reader.map_or(blocksize, |m| m.min(blocksize)));
        Ok(())
    }

    /// Announce a reader block size in seconds.
    pub fn query_read_config_sec(&self, sec: f64) -> Result<(), StoreError> {
        let frames = self.data.read().config.frames_for_sec(sec);
        self.query_read_config(frames)
    }

    /// Raise the writer block size, or set it outright with `force`.
    pub fn set_blocksize_writer(&self, blocksize: usize, force: bool) -> Result<(), StoreError> {
        let mut data = self.data.write();
        if data.blocksize_fixed {
            return Err(StoreError::BlocksizeFixed(self.name.clone()));
        }
        let cfg = &mut data.config;
        cfg.blocksize_writer = if force {
            blocksize.max(1)
        } else {
            cfg.blocksize_writer.max(blocksize)
        };
        Ok(())
    }

    /// Fix block sizes and raise the capacity to the negotiated minimum.
    pub(crate) fn configure(&self) -> Result<(), StoreError> {
        let mut data = self.data.write();
        if data.storage.is_some() {
            return Err(StoreError::AlreadyFinalised(self.name.clone()));
        }
        let min = data.config.min_capacity();
        let cfg = &mut data.config;
        if cfg.capacity < min {
            debug!(level = %self.name, from = cfg.capacity, to = min, "raising capacity to fit block sizes");
            cfg.capacity = min;
        }
        if cfg.period > 0.0 {
            cfg.len_sec = cfg.capacity as f64 * cfg.period;
        }
        data.blocksize_fixed = true;
        Ok(())
    }

    /// Allocate storage. The layout must be named and non-empty.
    pub(crate) fn finalise(&self) -> Result<(), StoreError> {
        let mut data = self.data.write();
        if data.storage.is_some() {
            return Err(StoreError::AlreadyFinalised(self.name.clone()));
        }
        if !data.named {
            return Err(StoreError::NotNamed(self.name.clone()));
        }
        let width = data.layout.width();
        if width == 0 || data.config.capacity == 0 {
            return Err(StoreError::EmptyLayout {
                level: self.name.clone(),
                width,
                capacity: data.config.capacity,
            });
        }
        if !data.blocksize_fixed {
            let min = data.config.min_capacity();
            data.config.capacity = data.config.capacity.max(min);
            data.blocksize_fixed = true;
        }
        let storage = FrameStorage::new(
            width,
            data.config.capacity,
            data.config.ring,
            !data.config.no_time_meta,
        );
        data.storage = Some(storage);
        debug!(level = %self.name, width, capacity = data.config.capacity, "level finalised");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------

    /// Write one frame at `index` (at most the current write cursor).
    pub fn set_frame(&self, index: i64, frame: &Frame) -> Result<(), AccessError> {
        self.write_frames(Some(index), 1, frame.width(), |_| (frame.values.as_slice(), &frame.meta))
            .map(|_| ())
    }

    /// Write one frame at the write cursor and return its index.
    pub fn append_frame(&self, frame: &Frame) -> Result<i64, AccessError> {
        self.write_frames(None, 1, frame.width(), |_| (frame.values.as_slice(), &frame.meta))
    }

    /// Write a block starting at `start`.
    pub fn set_block(&self, start: i64, block: &Block) -> Result<(), AccessError> {
        self.write_frames(Some(start), block.len(), block.width(), |i| {
            (block.frame(i), block.meta(i))
        })
        .map(|_| ())
    }

    /// Write a block at the write cursor and return the index of its first frame.
    pub fn append_block(&self, block: &Block) -> Result<i64, AccessError> {
        self.write_frames(None, block.len(), block.width(), |i| {
            (block.frame(i), block.meta(i))
        })
    }

    fn write_frames<'a>(
        &self,
        start: Option<i64>,
        len: usize,
        width: usize,
        frame_at: impl Fn(usize) -> (&'a [f32], &'a TimeMeta),
    ) -> Result<i64, AccessError> {
        let mut guard = self.data.write();
        let data = &mut *guard;
        let Some(storage) = data.storage.as_mut() else {
            return Err(AccessError::NotFinalised {
                level: self.name.clone(),
            });
        };
        if width != data.layout.width() {
            return Err(AccessError::WidthMismatch {
                level: self.name.clone(),
                expected: data.layout.width(),
                got: width,
            });
        }

        let geo = Geometry {
            capacity: data.config.capacity,
            ring: data.config.ring,
        };
        let (start, mut plan, mut prev, cur_r, cur_w) = {
            let c = self.cursors.lock();
            let start = start.unwrap_or(c.cur_w);
            let plan = c.plan_write(
                &self.name,
                geo,
                start,
                len,
                data.config.growable,
                data.config.overflow.may_overwrite(c.readers.len()),
            )?;
            let prev = c
                .min_readable(geo)
                .filter(|min| start > *min && start <= c.cur_w)
                .and_then(|_| storage.meta_at(start - 1).cloned());
            (start, plan, prev, c.cur_r, c.cur_w)
        };

        if let WritePlan::Grow(new_capacity) = plan {
            debug!(level = %self.name, from = geo.capacity, to = new_capacity, "growing level");
            storage.grow(new_capacity, cur_r, cur_w);
            data.config.capacity = new_capacity;
            if data.config.period > 0.0 {
                data.config.len_sec = new_capacity as f64 * data.config.period;
            }
            if geo.ring {
                self.cursors.lock().min_r_at_last_growth = cur_r;
            }
            plan = WritePlan::Write;
        }

        let period = data.config.period;
        let store_meta = !data.config.no_time_meta;
        let wall = self.epoch.elapsed().as_secs_f64();
        for i in 0..len {
            let (values, meta) = frame_at(i);
            let index = start + i as i64;
            if store_meta {
                let mut meta = meta.clone();
                complete_meta(&mut meta, index, period, prev.as_ref(), wall);
                storage.write(index, values, &meta);
                prev = Some(meta);
            } else {
                storage.write(index, values, meta);
            }
        }

        self.cursors
            .lock()
            .commit_write(&self.name, start + len as i64, plan);
        Ok(start)
    }

    // ------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------

    /// Read the frame at `index`.
    ///
    /// `reader` is advanced past `index`; `None` reads anonymously.
    pub fn get_frame(&self, reader: Option<ReaderId>, index: i64) -> Result<Frame, AccessError> {
        let block = self.read_frames(reader, index, 1, Padding::None, false, true)?;
        Ok(Frame {
            values: block.frame(0).to_vec(),
            meta: block.meta(0).clone(),
        })
    }

    /// Read the frame at the reader's cursor.
    pub fn get_next_frame(&self, reader: ReaderId) -> Result<Frame, AccessError> {
        let index = self.current_read(Some(reader))?;
        self.get_frame(Some(reader), index)
    }

    /// Read `len` frames starting at `start`.
    ///
    /// Negative start indices are padded in front. Indices past the written
    /// end are padded only while end of input is set; before that they are
    /// [`AccessError::OutOfRangeRight`].
    pub fn get_block(
        &self,
        reader: Option<ReaderId>,
        start: i64,
        len: usize,
        padding: Padding,
    ) -> Result<Block, AccessError> {
        self.read_frames(reader, start, len, padding, true, true)
    }

    /// Read `len` frames starting at the reader's cursor.
    pub fn get_next_block(
        &self,
        reader: ReaderId,
        len: usize,
        padding: Padding,
    ) -> Result<Block, AccessError> {
        let start = self.current_read(Some(reader))?;
        self.get_block(Some(reader), start, len, padding)
    }

    /// Check whether a block read would succeed, without moving any cursor.
    pub fn check_read(&self, reader: Option<ReaderId>, start: i64, len: usize) -> Result<(), AccessError> {
        self.read_frames(reader, start, len, Padding::None, true, false)
            .map(|_| ())
    }

    fn read_frames(
        &self,
        reader: Option<ReaderId>,
        start: i64,
        len: usize,
        padding: Padding,
        allow_pad: bool,
        update: bool,
    ) -> Result<Block, AccessError> {
        let data = self.data.read();
        let Some(storage) = data.storage.as_ref() else {
            return Err(AccessError::NotFinalised {
                level: self.name.clone(),
            });
        };
        let geo = data.geometry();
        let slot = reader.map(|r| r.0 as usize);
        let plan = {
            let mut c = self.cursors.lock();
            if c.cursor(slot).is_none() {
                return Err(self.unknown_reader(reader));
            }
            c.snap_lagging(&self.name, geo);
            c.plan_read(&self.name, geo, start, len, allow_pad)?
        };
        if !update {
            return Ok(Block::new(data.layout.width()));
        }

        let width = data.layout.width();
        let period = data.config.period;
        let meta_at = |index: i64| {
            storage
                .meta_at(index)
                .cloned()
                .unwrap_or_else(|| TimeMeta::synthetic(index, period))
        };
        let mut block = Block::with_capacity(width, len);
        let pad_values = |edge: i64| -> Vec<f32> {
            match padding {
                Padding::Zero | Padding::None => vec![0.0; width],
                Padding::Edge => storage.values_at(edge).to_vec(),
            }
        };
        if padding != Padding::None && plan.pad_front > 0 {
            let values = pad_values(plan.start);
            for k in 0..plan.pad_front {
                block.push(&values, TimeMeta::synthetic(start + k as i64, period));
            }
        }
        for index in plan.start..plan.end {
            block.push(storage.values_at(index), meta_at(index));
        }
        if padding != Padding::None && plan.pad_end > 0 {
            let values = pad_values(plan.end - 1);
            for k in 0..plan.pad_end {
                block.push(&values, TimeMeta::synthetic(plan.end + k as i64, period));
            }
        }

        self.cursors.lock().commit_read(slot, plan.end);
        Ok(block)
    }

    fn unknown_reader(&self, reader: Option<ReaderId>) -> AccessError {
        AccessError::UnknownReader {
            level: self.name.clone(),
            reader: reader.map_or(u32::MAX, |r| r.0),
        }
    }

    // ------------------------------------------------------------------
    // Cursor queries
    // ------------------------------------------------------------------

    /// Next index to be written.
    pub fn current_write(&self) -> i64 {
        self.cursors.lock().cur_w
    }

    /// Cursor of `reader`, or the global read cursor for `None`.
    pub fn current_read(&self, reader: Option<ReaderId>) -> Result<i64, AccessError> {
        self.cursors
            .lock()
            .cursor(reader.map(|r| r.0 as usize))
            .ok_or_else(|| self.unknown_reader(reader))
    }

    /// Frames the writer can add before the level is full, seen from `reader`.
    pub fn free_count(&self, reader: Option<ReaderId>) -> Result<usize, AccessError> {
        let geo = self.data.read().geometry();
        let c = self.cursors.lock();
        let cursor = c
            .cursor(reader.map(|r| r.0 as usize))
            .ok_or_else(|| self.unknown_reader(reader))?;
        Ok(c.free(geo, cursor))
    }

    /// Frames written but not yet read by `reader`.
    pub fn available_count(&self, reader: Option<ReaderId>) -> Result<usize, AccessError> {
        let c = self.cursors.lock();
        let cursor = c
            .cursor(reader.map(|r| r.0 as usize))
            .ok_or_else(|| self.unknown_reader(reader))?;
        Ok(c.available(cursor))
    }

    /// Oldest readable index, `None` while the level is empty.
    pub fn min_readable(&self) -> Option<i64> {
        let geo = self.data.read().geometry();
        self.cursors.lock().min_readable(geo)
    }

    /// Newest readable index, `None` while the level is empty.
    pub fn max_readable(&self) -> Option<i64> {
        self.cursors.lock().max_readable()
    }

    /// Move `reader` forward to `target` (clamped to the written range).
    pub fn catch_up_read_cursor(&self, reader: Option<ReaderId>, target: i64) -> Result<(), AccessError> {
        let mut c = self.cursors.lock();
        let slot = reader.map(|r| r.0 as usize);
        if c.cursor(slot).is_none() {
            return Err(self.unknown_reader(reader));
        }
        c.catch_up(slot, target);
        Ok(())
    }

    // ------------------------------------------------------------------
    // End of input, time and diagnostics
    // ------------------------------------------------------------------

    /// Mirror the scheduler's end-of-input state.
    pub fn set_eoi(&self, counter: u32) {
        let mut c = self.cursors.lock();
        c.eoi = true;
        c.eoi_counter = counter;
    }

    /// Clear end of input.
    pub fn unset_eoi(&self) {
        self.cursors.lock().eoi = false;
    }

    /// Update the end-of-input counter without changing the flag.
    pub fn set_eoi_counter(&self, counter: u32) {
        self.cursors.lock().eoi_counter = counter;
    }

    /// Returns `true` while end of input is set.
    pub fn is_eoi(&self) -> bool {
        self.cursors.lock().eoi
    }

    /// Current end-of-input counter.
    pub fn eoi_counter(&self) -> u32 {
        self.cursors.lock().eoi_counter
    }

    /// Logical index of the frame starting at `sec`.
    pub fn sec_to_index(&self, sec: f64) -> i64 {
        let period = self.data.read().config.period;
        if period > 0.0 {
            (sec / period).floor() as i64
        } else {
            sec.floor() as i64
        }
    }

    /// Start time of the frame with logical index `index`.
    pub fn index_to_sec(&self, index: i64) -> f64 {
        index as f64 * self.data.read().config.period
    }

    /// Cursor snapshot.
    pub fn state(&self) -> LevelState {
        let data = self.data.read();
        let geo = data.geometry();
        let c = self.cursors.lock();
        LevelState {
            name: self.name.clone(),
            capacity: geo.capacity,
            cur_r: c.cur_r,
            cur_w: c.cur_w,
            available: c.available(c.cur_r),
            free: c.free(geo, c.cur_r),
            readers: c.readers.len(),
        }
    }

    /// Static description, warning about levels nobody reads.
    pub fn stats(&self) -> LevelStats {
        let data = self.data.read();
        let readers = self.cursors.lock().readers.len();
        if readers == 0 {
            warn!(level = %self.name, "level has no readers, it might be a dead end");
        }
        let width = data.layout.width();
        LevelStats {
            config: data.config.clone(),
            readers,
            width,
            fields: data.layout.fields().to_vec(),
            element_names: (0..width)
                .filter_map(|e| data.layout.element_name(e))
                .collect(),
        }
    }
}

/// Complete caller-supplied metadata for the frame at `index`.
fn complete_meta(meta: &mut TimeMeta, index: i64, period: f64, prev: Option<&TimeMeta>, wall: f64) {
    meta.index = index;
    meta.period = period;
    if meta.wall_time.is_none() {
        meta.wall_time = Some(wall);
    }
    if meta.time == 0.0 {
        meta.time = if period > 0.0 {
            index as f64 * period
        } else {
            prev.map_or(0.0, |p| p.time + p.length_sec)
        };
    }
    if meta.length_sec == 0.0 {
        meta.length_sec = prev.map_or(period, |p| p.length_sec);
    }
    meta.filled = true;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(capacity: usize) -> Level {
        Level::with_fields(LevelConfig::new("pcm", capacity), &[("pcm", 1)]).unwrap()
    }

    fn reader_level(config: LevelConfig, readers: usize) -> (Level, Vec<ReaderId>) {
        let level = Level::new(config).unwrap();
        level.add_field("x", 1, 0).unwrap();
        level.fixate();
        let ids = (0..readers).map(|_| level.register_reader().unwrap()).collect();
        level.configure().unwrap();
        level.finalise().unwrap();
        (level, ids)
    }

    #[test]
    fn finalise_requires_names() {
        let level = Level::new(LevelConfig::new("a", 4)).unwrap();
        level.add_field("x", 1, 0).unwrap();
        assert!(matches!(level.finalise(), Err(StoreError::NotNamed(_))));
        level.fixate();
        level.finalise().unwrap();
        assert!(matches!(level.add_field("y", 1, 0), Err(StoreError::AlreadyFinalised(_))));
    }

    #[test]
    fn finalise_rejects_empty_layout() {
        let level = Level::new(LevelConfig::new("a", 4)).unwrap();
        level.fixate();
        assert!(matches!(level.finalise(), Err(StoreError::EmptyLayout { .. })));
    }

    #[test]
    fn capacity_raised_for_block_sizes() {
        let level = Level::new(LevelConfig::new("a", 2).with_blocksize_writer(3)).unwrap();
        level.add_field("x", 1, 0).unwrap();
        level.fixate();
        level.query_read_config(8).unwrap();
        level.query_read_config(2).unwrap();
        level.configure().unwrap();
        assert!(matches!(level.query_read_config(4), Err(StoreError::BlocksizeFixed(_))));
        let cfg = level.config();
        assert_eq!(cfg.capacity, 14);
        assert_eq!(cfg.blocksize_reader, 8);
        assert_eq!(cfg.min_blocksize_reader, Some(2));
    }

    #[test]
    fn blocksize_writer_force() {
        let level = Level::new(LevelConfig::new("a", 2).with_blocksize_writer(6)).unwrap();
        level.set_blocksize_writer(3, false).unwrap();
        assert_eq!(level.config().blocksize_writer, 6);
        level.set_blocksize_writer(3, true).unwrap();
        assert_eq!(level.config().blocksize_writer, 3);
    }

    #[test]
    fn access_before_finalise_is_fatal() {
        let level = Level::new(LevelConfig::new("a", 4)).unwrap();
        let err = level.append_frame(&Frame::scalar(1.0)).unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn width_mismatch_rejected() {
        let level = pcm(4);
        let err = level.append_frame(&Frame::new(vec![1.0, 2.0])).unwrap_err();
        assert!(matches!(err, AccessError::WidthMismatch { expected: 1, got: 2, .. }));
    }

    #[test]
    fn anonymous_read_round_trip() {
        let level = pcm(4);
        level.append_frame(&Frame::scalar(1.5)).unwrap();
        let frame = level.get_frame(None, 0).unwrap();
        assert_eq!(frame.values, vec![1.5]);
        assert_eq!(level.current_read(None).unwrap(), 1);
    }

    #[test]
    fn time_meta_derived_from_period() {
        let level = Level::with_fields(LevelConfig::new("f", 4).with_period(0.01), &[("x", 1)]).unwrap();
        level.append_frame(&Frame::scalar(0.0)).unwrap();
        level.append_frame(&Frame::scalar(0.0)).unwrap();
        let meta = level.get_frame(None, 1).unwrap().meta;
        assert!(meta.filled);
        assert_eq!(meta.index, 1);
        assert!((meta.time - 0.01).abs() < 1e-12);
        assert!((meta.length_sec - 0.01).abs() < 1e-12);
        assert!(meta.wall_time.is_some());
    }

    #[test]
    fn aperiodic_time_chains_from_previous_frame() {
        let level = pcm(4);
        let mut first = Frame::scalar(0.0);
        first.meta = TimeMeta::default().with_time(1.0, 0.25).with_annotation("start");
        level.append_frame(&first).unwrap();
        level.append_frame(&Frame::scalar(0.0)).unwrap();
        let meta = level.get_frame(None, 1).unwrap().meta;
        assert!((meta.time - 1.25).abs() < 1e-12);
        assert!((meta.length_sec - 0.25).abs() < 1e-12);
        let first = level.get_frame(None, 0).unwrap().meta;
        assert_eq!(first.annotation.as_deref(), Some("start"));
    }

    #[test]
    fn no_time_meta_reconstructs() {
        let level = Level::with_fields(
            LevelConfig::new("f", 4).with_period(0.5).without_time_meta(),
            &[("x", 1)],
        )
        .unwrap();
        level.append_frame(&Frame::scalar(0.0)).unwrap();
        level.append_frame(&Frame::scalar(0.0)).unwrap();
        let meta = level.get_frame(None, 1).unwrap().meta;
        assert_eq!(meta, TimeMeta::synthetic(1, 0.5));
    }

    #[test]
    fn padding_modes_at_end_of_input() {
        let level = pcm(8);
        for v in [1.0, 2.0, 3.0] {
            level.append_frame(&Frame::scalar(v)).unwrap();
        }
        assert!(level.get_block(None, 1, 4, Padding::Zero).is_err());
        level.set_eoi(1);
        let zero = level.get_block(None, 1, 4, Padding::Zero).unwrap();
        assert_eq!(zero.values(), &[2.0, 3.0, 0.0, 0.0]);
        let edge = level.get_block(None, 1, 4, Padding::Edge).unwrap();
        assert_eq!(edge.values(), &[2.0, 3.0, 3.0, 3.0]);
        let none = level.get_block(None, 1, 4, Padding::None).unwrap();
        assert_eq!(none.values(), &[2.0, 3.0]);
    }

    #[test]
    fn front_padding_repeats_first_frame() {
        let level = pcm(8);
        for v in [1.0, 2.0] {
            level.append_frame(&Frame::scalar(v)).unwrap();
        }
        let edge = level.get_block(None, -2, 4, Padding::Edge).unwrap();
        assert_eq!(edge.values(), &[1.0, 1.0, 1.0, 2.0]);
        assert_eq!(edge.meta(0).index, -2);
        let zero = level.get_block(None, -1, 2, Padding::Zero).unwrap();
        assert_eq!(zero.values(), &[0.0, 1.0]);
    }

    #[test]
    fn check_read_leaves_cursor() {
        let (level, readers) = reader_level(LevelConfig::new("a", 4), 1);
        level.append_frame(&Frame::scalar(1.0)).unwrap();
        level.check_read(Some(readers[0]), 0, 1).unwrap();
        assert_eq!(level.current_read(Some(readers[0])).unwrap(), 0);
        assert!(level.check_read(Some(readers[0]), 0, 2).is_err());
    }

    #[test]
    fn unknown_reader_is_fatal() {
        let level = pcm(4);
        let err = level.current_read(Some(ReaderId(7))).unwrap_err();
        assert!(matches!(err, AccessError::UnknownReader { reader: 7, .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn register_reader_after_finalise_rejected() {
        let level = pcm(4);
        assert!(level.register_reader().is_err());
        let late = level.register_reader_unchecked();
        assert_eq!(level.current_read(Some(late)).unwrap(), 0);
    }

    #[test]
    fn overwrite_policy_never_blocks() {
        let (level, readers) =
            reader_level(LevelConfig::new("a", 3).with_overflow(OverflowPolicy::Overwrite), 1);
        for v in 0..5 {
            level.append_frame(&Frame::scalar(v as f32)).unwrap();
        }
        let state = level.state();
        assert_eq!(state.cur_w, 5);
        assert_eq!(state.cur_r, 2);
        let frame = level.get_next_frame(readers[0]).unwrap();
        assert_eq!(frame.values, vec![2.0]);
    }

    #[test]
    fn dead_end_level_overwrites_by_default() {
        let level = pcm(3);
        for v in 0..10 {
            level.append_frame(&Frame::scalar(v as f32)).unwrap();
        }
        assert_eq!(level.current_write(), 10);
        assert_eq!(level.min_readable(), Some(7));
    }

    #[test]
    fn linear_level_grows() {
        let level = Level::with_fields(LevelConfig::new("a", 3).linear().growable(true), &[("x", 1)]).unwrap();
        for v in 0..20 {
            level.append_frame(&Frame::scalar(v as f32)).unwrap();
        }
        let all = level.get_block(None, 0, 20, Padding::None).unwrap();
        assert_eq!(all.len(), 20);
        assert_eq!(all.frame(19), &[19.0]);
        assert_eq!(level.min_readable(), Some(0));
    }

    #[test]
    fn catch_up_moves_reader() {
        let (level, readers) = reader_level(LevelConfig::new("a", 8), 1);
        for v in 0..5 {
            level.append_frame(&Frame::scalar(v as f32)).unwrap();
        }
        level.catch_up_read_cursor(Some(readers[0]), 4).unwrap();
        assert_eq!(level.available_count(Some(readers[0])).unwrap(), 1);
        assert_eq!(level.current_read(None).unwrap(), 4);
    }

    #[test]
    fn index_time_conversion() {
        let level = Level::with_fields(LevelConfig::new("f", 4).with_period(0.25), &[("x", 1)]).unwrap();
        assert_eq!(level.sec_to_index(1.1), 4);
        assert!((level.index_to_sec(3) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn stats_render_detail() {
        let level = Level::with_fields(LevelConfig::new("mfcc", 4), &[("c", 2)]).unwrap();
        let stats = level.stats();
        assert_eq!(stats.element_names, vec!["c[0]".to_string(), "c[1]".to_string()]);
        assert!(!stats.render(1).contains("fields="));
        assert!(stats.render(3).contains("fields=[c(2)]"));
        assert!(stats.render(4).contains("c[1]"));
    }
}
