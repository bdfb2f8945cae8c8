//! Frames, blocks and per-frame time metadata.

use std::sync::Arc;

/// Time information attached to one frame.
///
/// For periodic levels most fields follow from the frame index; the level
/// fills them in on write, so writers usually pass [`TimeMeta::default`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeMeta {
    /// Set once the metadata has been completed by the level.
    pub filled: bool,
    /// Logical frame index.
    pub index: i64,
    /// Frame period of the level in seconds.
    pub period: f64,
    /// Start time of the frame in seconds.
    pub time: f64,
    /// Duration of the frame in seconds.
    pub length_sec: f64,
    /// Period of the frames this frame was derived from, 0 if unknown.
    pub frame_period: f64,
    /// Wall clock time in seconds since the store epoch.
    pub wall_time: Option<f64>,
    /// Free-form annotation.
    pub annotation: Option<Arc<str>>,
}

impl TimeMeta {
    /// Metadata reconstructed from the index alone, used by levels that do
    /// not store time metadata.
    pub fn synthetic(index: i64, period: f64) -> Self {
        Self {
            filled: true,
            index,
            period,
            time: index as f64 * period,
            length_sec: period,
            frame_period: 0.0,
            wall_time: None,
            annotation: None,
        }
    }

    /// Attach an annotation.
    pub fn with_annotation(mut self, text: impl Into<Arc<str>>) -> Self {
        self.annotation = Some(text.into());
        self
    }

    /// Set an explicit start time (for aperiodic levels).
    pub fn with_time(mut self, time: f64, length_sec: f64) -> Self {
        self.time = time;
        self.length_sec = length_sec;
        self
    }
}

/// One frame: `width` values and their time metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// Element values, in field layout order.
    pub values: Vec<f32>,
    /// Time metadata.
    pub meta: TimeMeta,
}

impl Frame {
    /// Frame with the given values and empty metadata.
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            meta: TimeMeta::default(),
        }
    }

    /// Single-element frame.
    pub fn scalar(value: f32) -> Self {
        Self::new(vec![value])
    }

    /// Elements per frame.
    pub fn width(&self) -> usize {
        self.values.len()
    }
}

/// A run of consecutive frames stored frame-major.
///
/// `values[i * width + j]` is element `j` of frame `i`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    width: usize,
    values: Vec<f32>,
    meta: Vec<TimeMeta>,
}

impl Block {
    /// Empty block of the given width.
    pub fn new(width: usize) -> Self {
        Self {
            width,
            values: Vec::new(),
            meta: Vec::new(),
        }
    }

    /// Empty block with room for `frames` frames.
    pub fn with_capacity(width: usize, frames: usize) -> Self {
        Self {
            width,
            values: Vec::with_capacity(width * frames),
            meta: Vec::with_capacity(frames),
        }
    }

    /// Block from frame-major values with default metadata.
    ///
    /// Returns `None` if `values.len()` is not a multiple of `width`.
    pub fn from_values(width: usize, values: Vec<f32>) -> Option<Self> {
        if width == 0 || values.len() % width != 0 {
            return None;
        }
        let frames = values.len() / width;
        Some(Self {
            width,
            values,
            meta: vec![TimeMeta::default(); frames],
        })
    }

    /// Append a frame. The caller guarantees `values.len() == width`.
    pub fn push(&mut self, values: &[f32], meta: TimeMeta) {
        debug_assert_eq!(values.len(), self.width);
        self.values.extend_from_slice(values);
        self.meta.push(meta);
    }

    /// Append a copy of an existing frame of this block.
    pub(crate) fn push_copy_of(&mut self, frame: usize) {
        let start = frame * self.width;
        self.values.extend_from_within(start..start + self.width);
        let meta = self.meta[frame].clone();
        self.meta.push(meta);
    }

    /// Elements per frame.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.meta.len()
    }

    /// Returns `true` if the block holds no frames.
    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    /// Values of frame `i`.
    pub fn frame(&self, i: usize) -> &[f32] {
        &self.values[i * self.width..(i + 1) * self.width]
    }

    /// Metadata of frame `i`.
    pub fn meta(&self, i: usize) -> &TimeMeta {
        &self.meta[i]
    }

    /// Mutable metadata of frame `i`.
    pub fn meta_mut(&mut self, i: usize) -> &mut TimeMeta {
        &mut self.meta[i]
    }

    /// All values, frame-major.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Iterate over frames as `(values, meta)` pairs.
    pub fn frames(&self) -> impl Iterator<Item = (&[f32], &TimeMeta)> {
        self.values.chunks_exact(self.width.max(1)).zip(self.meta.iter())
    }

    /// Remove all frames, keeping the allocation.
    pub fn clear(&mut self) {
        self.values.clear();
        self.meta.clear();
    }

    /// Values of column `element` across all frames.
    pub fn column(&self, element: usize) -> Vec<f32> {
        self.frames().map(|(v, _)| v[element]).collect()
    }
}

/// How a block read handles indices outside the written range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Padding {
    /// Fill missing frames with zeros.
    Zero,
    /// Repeat the nearest edge frame (the first frame in front, the last at the end).
    #[default]
    Edge,
    /// Return only the frames that exist.
    None,
}
