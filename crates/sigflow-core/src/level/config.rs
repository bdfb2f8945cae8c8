//! Level configuration and field layout.

use crate::error::StoreError;

/// What a ring level does when a write finds no free space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Always wait for readers: the write fails until every registered
    /// reader has consumed the oldest frame.
    Wait,
    /// Overwrite the oldest frames only when no reader is registered
    /// (a dead-end level). Otherwise behave like [`OverflowPolicy::Wait`].
    #[default]
    SkipIfNoReaders,
    /// Never wait. Writes always succeed; lagging readers lose data.
    Overwrite,
}

impl OverflowPolicy {
    /// Maps the numeric `no_hang` setting (0, 1, 2) to a policy.
    pub fn from_no_hang(value: i64) -> Self {
        match value {
            0 => OverflowPolicy::Wait,
            2 => OverflowPolicy::Overwrite,
            _ => OverflowPolicy::SkipIfNoReaders,
        }
    }

    /// Whether a full level may drop unread frames given `readers` registered readers.
    pub(crate) fn may_overwrite(self, readers: usize) -> bool {
        match self {
            OverflowPolicy::Wait => false,
            OverflowPolicy::SkipIfNoReaders => readers == 0,
            OverflowPolicy::Overwrite => true,
        }
    }
}

/// Static and negotiated parameters of one level.
///
/// Built by the writing component during configuration, then adjusted by
/// reader blocksize negotiation until the store finalises the level.
///
/// # Example
///
/// ```rust
/// use sigflow_core::{LevelConfig, OverflowPolicy};
///
/// let cfg = LevelConfig::new("pcm", 4)
///     .with_period(1.0 / 16000.0)
///     .with_overflow(OverflowPolicy::Wait);
/// assert!(cfg.ring);
/// assert_eq!(cfg.capacity, 4);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LevelConfig {
    /// Level name, unique within a store.
    pub name: String,
    /// Frame period in seconds; 0 marks an aperiodic level.
    pub period: f64,
    /// Duration covered by one frame (frames may overlap, so this is not `period`).
    pub frame_size_sec: f64,
    /// Buffer size in frames.
    pub capacity: usize,
    /// Buffer size in seconds; kept in sync with `capacity` for periodic levels.
    pub len_sec: f64,
    /// Ring buffer (`true`) or linear buffer (`false`).
    pub ring: bool,
    /// Grow the buffer instead of failing when it is full.
    ///
    /// Growth takes precedence over `overflow`. A ring without registered
    /// readers only frees space on anonymous reads, so left unread it grows
    /// without bound.
    pub growable: bool,
    /// Overflow behaviour for full ring levels.
    pub overflow: OverflowPolicy,
    /// Do not store per-frame time metadata; it is reconstructed on read.
    pub no_time_meta: bool,
    /// Largest block written at once.
    pub blocksize_writer: usize,
    /// Largest block any reader asked for.
    pub blocksize_reader: usize,
    /// Smallest block any reader asked for.
    pub min_blocksize_reader: Option<usize>,
}

impl LevelConfig {
    /// Ring level with `capacity` frames and default settings.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            period: 0.0,
            frame_size_sec: 0.0,
            capacity,
            len_sec: 0.0,
            ring: true,
            growable: false,
            overflow: OverflowPolicy::default(),
            no_time_meta: false,
            blocksize_writer: 1,
            blocksize_reader: 1,
            min_blocksize_reader: None,
        }
    }

    /// Set the frame period in seconds.
    pub fn with_period(mut self, period: f64) -> Self {
        self.period = period;
        self
    }

    /// Set the frame duration in seconds.
    pub fn with_frame_size_sec(mut self, sec: f64) -> Self {
        if sec > 0.0 {
            self.frame_size_sec = sec;
        }
        self
    }

    /// Size the buffer in seconds. Ignored for aperiodic levels.
    pub fn with_len_sec(mut self, sec: f64) -> Self {
        self.len_sec = sec;
        self
    }

    /// Switch to a linear (non-wrapping) buffer.
    pub fn linear(mut self) -> Self {
        self.ring = false;
        self
    }

    /// Allow the buffer to grow when full.
    ///
    /// Memory is unbounded on a ring that has no registered readers and is
    /// never read.
    pub fn growable(mut self, growable: bool) -> Self {
        self.growable = growable;
        self
    }

    /// Set the overflow policy.
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Disable per-frame time metadata storage.
    pub fn without_time_meta(mut self) -> Self {
        self.no_time_meta = true;
        self
    }

    /// Set the writer blocksize.
    pub fn with_blocksize_writer(mut self, frames: usize) -> Self {
        self.blocksize_writer = frames.max(1);
        self
    }

    /// Check ranges and derive the capacity from `len_sec` where applicable.
    pub(crate) fn validated(mut self) -> Result<Self, StoreError> {
        if !(self.period >= 0.0) {
            return Err(self.invalid(format!("period must be >= 0, got {}", self.period)));
        }
        if self.len_sec > 0.0 && self.period > 0.0 {
            self.capacity = (self.len_sec / self.period).ceil() as usize;
        }
        if self.capacity == 0 {
            return Err(self.invalid("capacity must be > 0".to_string()));
        }
        if self.period > 0.0 {
            self.len_sec = self.capacity as f64 * self.period;
        }
        Ok(self)
    }

    /// Convert a reader blocksize in seconds to frames.
    pub(crate) fn frames_for_sec(&self, sec: f64) -> usize {
        if self.period != 0.0 {
            (sec / self.period).ceil() as usize
        } else {
            sec.ceil() as usize
        }
    }

    /// Minimum buffer size that lets one writer block and one reader block coexist.
    pub(crate) fn min_capacity(&self) -> usize {
        if self.blocksize_reader <= self.blocksize_writer {
            2 * self.blocksize_writer + 1
        } else {
            self.blocksize_reader + 2 * self.blocksize_writer
        }
    }

    fn invalid(&self, reason: String) -> StoreError {
        StoreError::InvalidLevelConfig {
            level: self.name.clone(),
            reason,
        }
    }
}

/// One named field of a level's frame layout.
///
/// A field spans `width` consecutive elements starting at `start`. Fields of
/// width > 1 are arrays whose elements are named `name[i]`, with `i` counted
/// from `arr_name_offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Field name.
    pub name: String,
    /// Number of elements.
    pub width: usize,
    /// Index of the first element within the frame.
    pub start: usize,
    /// Offset added to array indices when naming elements.
    pub arr_name_offset: i32,
}

/// Field layout of a level, fixed before any data is written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldLayout {
    fields: Vec<FieldInfo>,
    width: usize,
}

impl FieldLayout {
    /// Append a field; `width == 0` is treated as 1.
    pub(crate) fn push(&mut self, name: &str, width: usize, arr_name_offset: i32) {
        let width = width.max(1);
        self.fields.push(FieldInfo {
            name: name.to_string(),
            width,
            start: self.width,
            arr_name_offset,
        });
        self.width += width;
    }

    /// Update the array name offset of the last field.
    pub(crate) fn set_last_arr_name_offset(&mut self, offset: i32) {
        if let Some(last) = self.fields.last_mut() {
            last.arr_name_offset = offset;
        }
    }

    /// Total number of elements per frame.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Fields in layout order.
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// The field containing element `element`.
    pub fn field_of(&self, element: usize) -> Option<&FieldInfo> {
        self.fields
            .iter()
            .find(|f| element >= f.start && element < f.start + f.width)
    }

    /// Display name of one element: `name` for scalars, `name[i]` for arrays.
    pub fn element_name(&self, element: usize) -> Option<String> {
        let field = self.field_of(element)?;
        if field.width > 1 {
            let idx = (element - field.start) as i64 + i64::from(field.arr_name_offset);
            Some(format!("{}[{}]", field.name, idx))
        } else {
            Some(field.name.clone())
        }
    }

    /// Element index of `name` or `name[i]`.
    ///
    /// A bare array name resolves to its first element.
    pub fn find(&self, name: &str) -> Option<usize> {
        let (base, index) = match name.strip_suffix(']').and_then(|s| s.split_once('[')) {
            Some((base, idx)) => (base, Some(idx.trim().parse::<i64>().ok()?)),
            None => (name, None),
        };
        let field = self.fields.iter().find(|f| f.name == base)?;
        let offset = match index {
            Some(i) => i - i64::from(field.arr_name_offset),
            None => 0,
        };
        if offset < 0 || offset as usize >= field.width {
            return None;
        }
        Some(field.start + offset as usize)
    }
}
