//! The buffer store ("data memory"): all levels of one pipeline.
//!
//! Components declare read and write requests while registering. Before
//! configuration starts, [`DataMemory::check_requests`] verifies that every
//! level somebody reads is also written by somebody. Levels are addressed
//! by [`LevelId`] afterwards; every pass-through method reports an invalid id
//! as [`AccessError::UnknownLevel`].
//!
//! # Example
//!
//! ```rust
//! use sigflow_core::{DataMemory, Frame, LevelConfig};
//!
//! let store = DataMemory::new();
//! store.register_write_request("pcm", "source").unwrap();
//! store.register_read_request("pcm", "sink");
//! store.check_requests().unwrap();
//!
//! let pcm = store.register_level(LevelConfig::new("pcm", 4)).unwrap();
//! store.add_field(pcm, "pcm", 1).unwrap();
//! store.fixate(pcm).unwrap();
//! let reader = store.register_reader(pcm).unwrap();
//! store.configure().unwrap();
//! store.finalise().unwrap();
//!
//! store.append_frame(pcm, &Frame::scalar(0.5)).unwrap();
//! assert_eq!(store.get_next_frame(pcm, reader).unwrap().values, vec![0.5]);
//! ```

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::error::{AccessError, StoreError};
use crate::level::{Block, Frame, Level, LevelConfig, LevelState, LevelStats, Padding, ReaderId};

/// Index of a level within its store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LevelId(pub(crate) usize);

impl LevelId {
    /// Returns the raw index.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Request {
    level: String,
    component: String,
}

/// Owner of all levels of a pipeline.
#[derive(Debug)]
pub struct DataMemory {
    epoch: Instant,
    levels: RwLock<Vec<Arc<Level>>>,
    reads: Mutex<Vec<Request>>,
    writes: Mutex<Vec<Request>>,
    eoi: Mutex<(bool, u32)>,
}

impl Default for DataMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl DataMemory {
    /// Empty store; its creation time is the epoch for wall-clock stamps.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            levels: RwLock::new(Vec::new()),
            reads: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            eoi: Mutex::new((false, 0)),
        }
    }

    /// Seconds since the store was created.
    pub fn elapsed(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    /// Declare that `component` reads `level`. Repeated requests are merged.
    pub fn register_read_request(&self, level: &str, component: &str) {
        let req = Request {
            level: level.to_string(),
            component: component.to_string(),
        };
        let mut reads = self.reads.lock();
        if !reads.contains(&req) {
            debug!(level, component, "read request");
            reads.push(req);
        }
    }

    /// Declare that `component` writes `level`.
    ///
    /// A level has exactly one writer; a request from a second component
    /// is a setup error.
    pub fn register_write_request(&self, level: &str, component: &str) -> Result<(), StoreError> {
        let mut writes = self.writes.lock();
        if let Some(existing) = writes.iter().find(|r| r.level == level) {
            if existing.component == component {
                return Ok(());
            }
            return Err(StoreError::WriteConflict {
                level: level.to_string(),
                first: existing.component.clone(),
                second: component.to_string(),
            });
        }
        debug!(level, component, "write request");
        writes.push(Request {
            level: level.to_string(),
            component: component.to_string(),
        });
        Ok(())
    }

    /// Verify that every read request has a matching write request.
    pub fn check_requests(&self) -> Result<(), StoreError> {
        let writes = self.writes.lock();
        let reads = self.reads.lock();
        let dangling: Vec<&Request> = reads
            .iter()
            .filter(|r| !writes.iter().any(|w| w.level == r.level))
            .collect();
        for r in &dangling {
            error!(
                "level '{}' was not found! component '{}' requires it for reading",
                r.level, r.component
            );
        }
        match dangling.as_slice() {
            [] => {
                debug!(reads = reads.len(), writes = writes.len(), "all read requests resolved");
                Ok(())
            }
            [one] => Err(StoreError::DanglingReader {
                level: one.level.clone(),
                component: one.component.clone(),
            }),
            many => Err(StoreError::UnresolvedReads(many.len())),
        }
    }

    /// Components that declared a read of `level`.
    pub fn readers_of(&self, level: &str) -> Vec<String> {
        self.reads
            .lock()
            .iter()
            .filter(|r| r.level == level)
            .map(|r| r.component.clone())
            .collect()
    }

    /// Component that declared the write of `level`.
    pub fn writer_of(&self, level: &str) -> Option<String> {
        self.writes
            .lock()
            .iter()
            .find(|r| r.level == level)
            .map(|r| r.component.clone())
    }

    // ------------------------------------------------------------------
    // Levels
    // ------------------------------------------------------------------

    /// Create a level. Names are unique within the store.
    pub fn register_level(&self, config: LevelConfig) -> Result<LevelId, StoreError> {
        let mut levels = self.levels.write();
        if levels.iter().any(|l| l.name() == config.name) {
            return Err(StoreError::DuplicateLevel(config.name));
        }
        let level = Level::with_epoch(config, self.epoch)?;
        let (eoi, counter) = *self.eoi.lock();
        if eoi {
            level.set_eoi(counter);
        }
        debug!(level = level.name(), id = levels.len(), "registered level");
        levels.push(Arc::new(level));
        Ok(LevelId(levels.len() - 1))
    }

    /// Id of the level named `name`.
    pub fn find_level(&self, name: &str) -> Option<LevelId> {
        self.levels
            .read()
            .iter()
            .position(|l| l.name() == name)
            .map(LevelId)
    }

    /// Shared handle to a level, for producers outside the tick loop.
    pub fn level(&self, id: LevelId) -> Option<Arc<Level>> {
        self.levels.read().get(id.0).cloned()
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.levels.read().len()
    }

    /// Returns `true` if no level exists.
    pub fn is_empty(&self) -> bool {
        self.levels.read().is_empty()
    }

    /// Level names in registration order.
    pub fn level_names(&self) -> Vec<String> {
        self.levels.read().iter().map(|l| l.name().to_string()).collect()
    }

    /// Drop all levels and requests and clear end of input.
    pub fn clear(&self) {
        self.levels.write().clear();
        self.reads.lock().clear();
        self.writes.lock().clear();
        *self.eoi.lock() = (false, 0);
    }

    fn setup<T>(&self, id: LevelId, f: impl FnOnce(&Level) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let levels = self.levels.read();
        let level = levels
            .get(id.0)
            .ok_or_else(|| StoreError::UnknownLevel(format!("#{}", id.0)))?;
        f(level)
    }

    fn access<T>(&self, id: LevelId, f: impl FnOnce(&Level) -> Result<T, AccessError>) -> Result<T, AccessError> {
        let levels = self.levels.read();
        let level = levels.get(id.0).ok_or(AccessError::UnknownLevel(id.0))?;
        f(level)
    }

    /// Append a field to a level's layout.
    pub fn add_field(&self, id: LevelId, name: &str, width: usize) -> Result<(), StoreError> {
        self.setup(id, |l| l.add_field(name, width, 0))
    }

    /// Append an array field whose element names start at `arr_name_offset`.
    pub fn add_array_field(
        &self,
        id: LevelId,
        name: &str,
        width: usize,
        arr_name_offset: i32,
    ) -> Result<(), StoreError> {
        self.setup(id, |l| l.add_field(name, width, arr_name_offset))
    }

    /// Mark a level's layout as complete.
    pub fn fixate(&self, id: LevelId) -> Result<(), StoreError> {
        self.setup(id, |l| {
            l.fixate();
            Ok(())
        })
    }

    /// Register a reader with a level.
    pub fn register_reader(&self, id: LevelId) -> Result<ReaderId, StoreError> {
        self.setup(id, Level::register_reader)
    }

    /// Announce a reader block size in frames.
    pub fn query_read_config(&self, id: LevelId, blocksize: usize) -> Result<(), StoreError> {
        self.setup(id, |l| l.query_read_config(blocksize))
    }

    /// Announce a reader block size in seconds.
    pub fn query_read_config_sec(&self, id: LevelId, sec: f64) -> Result<(), StoreError> {
        self.setup(id, |l| l.query_read_config_sec(sec))
    }

    /// Raise (or with `force`, set) the writer block size.
    pub fn set_blocksize_writer(&self, id: LevelId, blocksize: usize, force: bool) -> Result<(), StoreError> {
        self.setup(id, |l| l.set_blocksize_writer(blocksize, force))
    }

    /// Configuration snapshot of a level.
    pub fn level_config(&self, id: LevelId) -> Result<LevelConfig, StoreError> {
        self.setup(id, |l| Ok(l.config()))
    }

    /// Configure and finalise one level ahead of the rest.
    pub fn finalise_level(&self, id: LevelId) -> Result<(), StoreError> {
        self.setup(id, |l| {
            if !l.is_finalised() {
                l.configure()?;
                l.finalise()?;
            }
            Ok(())
        })
    }

    /// Fix block sizes and capacities of all levels.
    pub fn configure(&self) -> Result<(), StoreError> {
        let levels = self.levels.read();
        if levels.is_empty() {
            return Err(StoreError::NoLevels);
        }
        for level in levels.iter().filter(|l| !l.is_finalised()) {
            level.configure()?;
        }
        Ok(())
    }

    /// Allocate storage for all levels.
    pub fn finalise(&self) -> Result<(), StoreError> {
        let levels = self.levels.read();
        if levels.is_empty() {
            return Err(StoreError::NoLevels);
        }
        for level in levels.iter().filter(|l| !l.is_finalised()) {
            level.finalise()?;
        }
        info!(levels = levels.len(), "buffer store finalised");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Data access
    // ------------------------------------------------------------------

    /// See [`Level::set_frame`].
    pub fn set_frame(&self, id: LevelId, index: i64, frame: &Frame) -> Result<(), AccessError> {
        self.access(id, |l| l.set_frame(index, frame))
    }

    /// See [`Level::append_frame`].
    pub fn append_frame(&self, id: LevelId, frame: &Frame) -> Result<i64, AccessError> {
        self.access(id, |l| l.append_frame(frame))
    }

    /// See [`Level::set_block`].
    pub fn set_block(&self, id: LevelId, start: i64, block: &Block) -> Result<(), AccessError> {
        self.access(id, |l| l.set_block(start, block))
    }

    /// See [`Level::append_block`].
    pub fn append_block(&self, id: LevelId, block: &Block) -> Result<i64, AccessError> {
        self.access(id, |l| l.append_block(block))
    }

    /// See [`Level::get_frame`].
    pub fn get_frame(&self, id: LevelId, reader: Option<ReaderId>, index: i64) -> Result<Frame, AccessError> {
        self.access(id, |l| l.get_frame(reader, index))
    }

    /// See [`Level::get_next_frame`].
    pub fn get_next_frame(&self, id: LevelId, reader: ReaderId) -> Result<Frame, AccessError> {
        self.access(id, |l| l.get_next_frame(reader))
    }

    /// See [`Level::get_block`].
    pub fn get_block(
        &self,
        id: LevelId,
        reader: Option<ReaderId>,
        start: i64,
        len: usize,
        padding: Padding,
    ) -> Result<Block, AccessError> {
        self.access(id, |l| l.get_block(reader, start, len, padding))
    }

    /// See [`Level::get_next_block`].
    pub fn get_next_block(
        &self,
        id: LevelId,
        reader: ReaderId,
        len: usize,
        padding: Padding,
    ) -> Result<Block, AccessError> {
        self.access(id, |l| l.get_next_block(reader, len, padding))
    }

    /// See [`Level::check_read`].
    pub fn check_read(&self, id: LevelId, reader: Option<ReaderId>, start: i64, len: usize) -> Result<(), AccessError> {
        self.access(id, |l| l.check_read(reader, start, len))
    }

    /// See [`Level::current_write`].
    pub fn current_write(&self, id: LevelId) -> Result<i64, AccessError> {
        self.access(id, |l| Ok(l.current_write()))
    }

    /// See [`Level::current_read`].
    pub fn current_read(&self, id: LevelId, reader: Option<ReaderId>) -> Result<i64, AccessError> {
        self.access(id, |l| l.current_read(reader))
    }

    /// See [`Level::free_count`].
    pub fn free_count(&self, id: LevelId, reader: Option<ReaderId>) -> Result<usize, AccessError> {
        self.access(id, |l| l.free_count(reader))
    }

    /// See [`Level::available_count`].
    pub fn available_count(&self, id: LevelId, reader: Option<ReaderId>) -> Result<usize, AccessError> {
        self.access(id, |l| l.available_count(reader))
    }

    /// See [`Level::min_readable`].
    pub fn min_readable(&self, id: LevelId) -> Result<Option<i64>, AccessError> {
        self.access(id, |l| Ok(l.min_readable()))
    }

    /// See [`Level::max_readable`].
    pub fn max_readable(&self, id: LevelId) -> Result<Option<i64>, AccessError> {
        self.access(id, |l| Ok(l.max_readable()))
    }

    /// See [`Level::catch_up_read_cursor`].
    pub fn catch_up_read_cursor(&self, id: LevelId, reader: Option<ReaderId>, target: i64) -> Result<(), AccessError> {
        self.access(id, |l| l.catch_up_read_cursor(reader, target))
    }

    // ------------------------------------------------------------------
    // End of input and diagnostics
    // ------------------------------------------------------------------

    /// Set end of input on every level.
    pub fn set_eoi(&self, counter: u32) {
        *self.eoi.lock() = (true, counter);
        for level in self.levels.read().iter() {
            level.set_eoi(counter);
        }
    }

    /// Clear end of input on every level.
    pub fn unset_eoi(&self) {
        self.eoi.lock().0 = false;
        for level in self.levels.read().iter() {
            level.unset_eoi();
        }
    }

    /// Propagate the end-of-input counter without touching the flag.
    pub fn set_eoi_counter(&self, counter: u32) {
        self.eoi.lock().1 = counter;
        for level in self.levels.read().iter() {
            level.set_eoi_counter(counter);
        }
    }

    /// Current end-of-input flag and counter.
    pub fn eoi(&self) -> (bool, u32) {
        *self.eoi.lock()
    }

    /// Cursor snapshots of all levels.
    pub fn level_states(&self) -> Vec<LevelState> {
        self.levels.read().iter().map(|l| l.state()).collect()
    }

    /// Static descriptions of all levels.
    pub fn stats(&self) -> Vec<LevelStats> {
        self.levels.read().iter().map(|l| l.stats()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_store() -> (DataMemory, LevelId, ReaderId) {
        let store = DataMemory::new();
        let id = store.register_level(LevelConfig::new("pcm", 4)).unwrap();
        store.add_field(id, "pcm", 1).unwrap();
        store.fixate(id).unwrap();
        let reader = store.register_reader(id).unwrap();
        store.configure().unwrap();
        store.finalise().unwrap();
        (store, id, reader)
    }

    #[test]
    fn duplicate_level_rejected() {
        let store = DataMemory::new();
        store.register_level(LevelConfig::new("a", 4)).unwrap();
        assert!(matches!(
            store.register_level(LevelConfig::new("a", 8)),
            Err(StoreError::DuplicateLevel(_))
        ));
        assert_eq!(store.find_level("a"), Some(LevelId(0)));
        assert_eq!(store.find_level("b"), None);
    }

    #[test]
    fn read_requests_are_deduplicated() {
        let store = DataMemory::new();
        store.register_read_request("pcm", "sink");
        store.register_read_request("pcm", "sink");
        store.register_read_request("pcm", "rms");
        assert_eq!(store.readers_of("pcm"), vec!["sink".to_string(), "rms".to_string()]);
    }

    #[test]
    fn second_writer_is_a_conflict() {
        let store = DataMemory::new();
        store.register_write_request("pcm", "a").unwrap();
        store.register_write_request("pcm", "a").unwrap();
        let err = store.register_write_request("pcm", "b").unwrap_err();
        assert!(matches!(err, StoreError::WriteConflict { .. }));
        assert_eq!(store.writer_of("pcm").as_deref(), Some("a"));
    }

    #[test]
    fn dangling_reader_detected() {
        let store = DataMemory::new();
        store.register_write_request("pcm", "src").unwrap();
        store.register_read_request("mfcc", "sink");
        let err = store.check_requests().unwrap_err();
        assert_eq!(
            err,
            StoreError::DanglingReader {
                level: "mfcc".into(),
                component: "sink".into()
            }
        );
        store.register_read_request("energy", "sink");
        assert_eq!(store.check_requests().unwrap_err(), StoreError::UnresolvedReads(2));
    }

    #[test]
    fn empty_store_cannot_configure() {
        let store = DataMemory::new();
        assert_eq!(store.configure().unwrap_err(), StoreError::NoLevels);
        assert_eq!(store.finalise().unwrap_err(), StoreError::NoLevels);
    }

    #[test]
    fn unknown_level_id() {
        let (store, _, _) = ready_store();
        let bad = LevelId(9);
        assert_eq!(store.current_write(bad).unwrap_err(), AccessError::UnknownLevel(9));
        assert!(store.add_field(bad, "x", 1).is_err());
    }

    #[test]
    fn eoi_reaches_levels() {
        let (store, id, _) = ready_store();
        store.set_eoi(3);
        let level = store.level(id).unwrap();
        assert!(level.is_eoi());
        assert_eq!(level.eoi_counter(), 3);
        store.unset_eoi();
        assert!(!level.is_eoi());
        assert_eq!(store.eoi(), (false, 3));
    }

    #[test]
    fn pass_through_round_trip() {
        let (store, id, reader) = ready_store();
        store.append_frame(id, &Frame::scalar(1.0)).unwrap();
        store.append_frame(id, &Frame::scalar(2.0)).unwrap();
        assert_eq!(store.available_count(id, Some(reader)).unwrap(), 2);
        let block = store.get_next_block(id, reader, 2, Padding::None).unwrap();
        assert_eq!(block.values(), &[1.0, 2.0]);
        assert_eq!(store.free_count(id, Some(reader)).unwrap(), 4);
        let states = store.level_states();
        assert_eq!(states[0].cur_w, 2);
        assert_eq!(states[0].cur_r, 2);
    }

    #[test]
    fn clear_resets_everything() {
        let (store, _, _) = ready_store();
        store.register_write_request("pcm", "a").unwrap();
        store.set_eoi(1);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.writer_of("pcm"), None);
        assert_eq!(store.eoi(), (false, 0));
    }
}
