//! Cursor bookkeeping and range validation.
//!
//! Everything here is plain arithmetic on logical frame indices. The level
//! holds a [`Cursors`] behind its short-lived cursor lock and asks it whether a
//! read or write may proceed; the bulk copy happens elsewhere.

use tracing::warn;

use crate::error::AccessError;

/// Geometry a validation needs from the level.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Geometry {
    pub capacity: usize,
    pub ring: bool,
}

impl Geometry {
    fn cap(self) -> i64 {
        self.capacity as i64
    }
}

/// Read and write cursors of one level.
#[derive(Debug, Clone, Default)]
pub(crate) struct Cursors {
    /// Next logical index to be written.
    pub cur_w: i64,
    /// Global read cursor, the minimum over all registered readers.
    pub cur_r: i64,
    /// One cursor per registered reader, indexed by reader id.
    pub readers: Vec<i64>,
    /// Read cursor at the last growth; frames before it were discarded.
    pub min_r_at_last_growth: i64,
    /// End-of-input flag mirrored from the scheduler.
    pub eoi: bool,
    /// End-of-input counter mirrored from the scheduler.
    pub eoi_counter: u32,
}

/// What a write must do before copying its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WritePlan {
    /// Enough space; write at once.
    Write,
    /// Grow the buffer to the given capacity first.
    Grow(usize),
    /// Drop unread frames by moving the global read cursor to `cur_r`.
    Overwrite { cur_r: i64 },
}

/// A validated read range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReadPlan {
    /// Frames to pad in front (requested indices below zero).
    pub pad_front: usize,
    /// First index actually present.
    pub start: i64,
    /// One past the last index actually present.
    pub end: i64,
    /// Frames to pad at the end (requested beyond `cur_w` at end of input).
    pub pad_end: usize,
}

impl ReadPlan {
    /// Number of frames actually copied from the buffer.
    pub fn present(&self) -> usize {
        (self.end - self.start) as usize
    }
}

impl Cursors {
    /// Cursor of `reader`, or the global read cursor for anonymous access.
    pub fn cursor(&self, reader: Option<usize>) -> Option<i64> {
        match reader {
            Some(r) => self.readers.get(r).copied(),
            None => Some(self.cur_r),
        }
    }

    /// Oldest index still physically present, `None` when nothing was written.
    pub fn min_readable(&self, geo: Geometry) -> Option<i64> {
        if self.cur_w == 0 {
            return None;
        }
        if geo.ring {
            Some((self.cur_w - geo.cap()).max(0).max(self.min_r_at_last_growth))
        } else {
            Some(0)
        }
    }

    /// Newest written index.
    pub fn max_readable(&self) -> Option<i64> {
        (self.cur_w > 0).then_some(self.cur_w - 1)
    }

    /// Free frames from the point of view of `cursor`.
    pub fn free(&self, geo: Geometry, cursor: i64) -> usize {
        let used = if geo.ring { self.cur_w - cursor } else { self.cur_w };
        (geo.cap() - used).max(0) as usize
    }

    /// Frames written but not yet consumed through `cursor`.
    pub fn available(&self, cursor: i64) -> usize {
        (self.cur_w - cursor).max(0) as usize
    }

    /// Decide how a write of `len` frames at `start` can proceed.
    pub fn plan_write(
        &self,
        level: &str,
        geo: Geometry,
        start: i64,
        len: usize,
        growable: bool,
        may_overwrite: bool,
    ) -> Result<WritePlan, AccessError> {
        let n = len as i64;
        if start < 0 || n == 0 {
            return Err(AccessError::InvalidRange {
                level: level.to_string(),
                start,
                end: start + n,
            });
        }
        if start > self.cur_w {
            // writes must be contiguous with what is already there
            return Err(AccessError::OutOfRangeRight {
                level: level.to_string(),
                index: start,
            });
        }
        let end = start + n;

        if !geo.ring {
            if end <= geo.cap() {
                return Ok(WritePlan::Write);
            }
            if growable {
                return Ok(WritePlan::Grow((geo.capacity * 2).max(end as usize + 10)));
            }
            return Err(AccessError::Full {
                level: level.to_string(),
            });
        }

        if start < self.cur_w - geo.cap() {
            return Err(AccessError::OutOfRangeLeft {
                level: level.to_string(),
                index: start,
            });
        }
        if end - self.cur_r <= geo.cap() {
            return Ok(WritePlan::Write);
        }
        if growable {
            let live = (self.cur_w - self.cur_r) as usize;
            let new_cap = if len == 1 {
                geo.capacity * 2
            } else {
                (geo.capacity * 2).max(live + len + 10)
            };
            return Ok(WritePlan::Grow(new_cap));
        }
        if may_overwrite {
            if n > geo.cap() {
                return Err(AccessError::InvalidRange {
                    level: level.to_string(),
                    start,
                    end,
                });
            }
            return Ok(WritePlan::Overwrite { cur_r: end - geo.cap() });
        }
        Err(AccessError::Full {
            level: level.to_string(),
        })
    }

    /// Record a completed write.
    pub fn commit_write(&mut self, level: &str, end: i64, plan: WritePlan) {
        if let WritePlan::Overwrite { cur_r } = plan {
            self.drop_before(level, cur_r);
        }
        self.cur_w = self.cur_w.max(end);
    }

    /// Move the global read cursor to `cur_r`, snapping lagging readers.
    fn drop_before(&mut self, level: &str, cur_r: i64) {
        let mut lost = 0;
        for c in &mut self.readers {
            if *c < cur_r {
                lost += cur_r - *c;
                *c = cur_r;
            }
        }
        if lost > 0 {
            warn!(level, frames = lost, "overwrote unread frames, readers snapped forward");
        }
        self.cur_r = self.cur_r.max(cur_r);
    }

    /// Validate a read of `len` frames starting at `start`.
    ///
    /// `allow_pad` enables padding past the written end while end of input is
    /// set. Front padding for negative indices is always available when
    /// `allow_pad` is true.
    pub fn plan_read(
        &self,
        level: &str,
        geo: Geometry,
        start: i64,
        len: usize,
        allow_pad: bool,
    ) -> Result<ReadPlan, AccessError> {
        let end = start + len as i64;
        if len == 0 {
            return Err(AccessError::InvalidRange {
                level: level.to_string(),
                start,
                end,
            });
        }
        let mut plan = ReadPlan {
            pad_front: 0,
            start,
            end,
            pad_end: 0,
        };

        if start < 0 {
            if !allow_pad {
                return Err(AccessError::OutOfRangeLeft {
                    level: level.to_string(),
                    index: start,
                });
            }
            if end <= 0 {
                // nothing but padding, no frame to anchor it on
                return Err(AccessError::OutOfRangeLeft {
                    level: level.to_string(),
                    index: start,
                });
            }
            plan.pad_front = (-start).min(len as i64) as usize;
            plan.start = 0;
        }

        if end > self.cur_w && self.eoi && allow_pad {
            if plan.start >= self.cur_w {
                return Err(AccessError::OutOfRangeRight {
                    level: level.to_string(),
                    index: self.cur_w,
                });
            }
            plan.pad_end = (end - self.cur_w) as usize;
            plan.end = self.cur_w;
        }

        if plan.end <= plan.start {
            // entirely in front of the stream
            return Err(AccessError::OutOfRangeRight {
                level: level.to_string(),
                index: plan.start,
            });
        }
        if !geo.ring && plan.end > geo.cap() {
            return Err(AccessError::OutOfRangeBufferSize {
                level: level.to_string(),
                index: plan.end - 1,
            });
        }
        if plan.end > self.cur_w {
            return Err(AccessError::OutOfRangeRight {
                level: level.to_string(),
                index: self.cur_w,
            });
        }
        let min = self.min_readable(geo).unwrap_or(0);
        if plan.start < min {
            return Err(AccessError::OutOfRangeLeft {
                level: level.to_string(),
                index: plan.start,
            });
        }
        Ok(plan)
    }

    /// Advance `reader` (or the global cursor for anonymous reads) past `end`.
    pub fn commit_read(&mut self, reader: Option<usize>, end: i64) {
        match reader {
            Some(r) => {
                if let Some(c) = self.readers.get_mut(r) {
                    *c = (*c).max(end);
                }
                self.recompute_min();
            }
            None => {
                // anonymous reads only drive the global cursor of reader-less levels
                if self.readers.is_empty() {
                    self.cur_r = self.cur_r.max(end.min(self.cur_w));
                }
            }
        }
    }

    /// Re-derive the global read cursor from the reader cursors.
    pub fn recompute_min(&mut self) {
        if let Some(min) = self.readers.iter().copied().min() {
            self.cur_r = self.cur_r.max(min);
        }
    }

    /// Snap readers that fell below the oldest present frame of a ring level.
    pub fn snap_lagging(&mut self, level: &str, geo: Geometry) {
        if !geo.ring {
            return;
        }
        let floor = (self.cur_w - geo.cap()).max(self.min_r_at_last_growth);
        for (id, c) in self.readers.iter_mut().enumerate() {
            if *c < floor {
                warn!(level, reader = id, lost = floor - *c, "reader fell behind, data lost");
                *c = floor;
            }
        }
        self.recompute_min();
    }

    /// Move `reader` forward to `target`, clamped to `[0, cur_w]`.
    pub fn catch_up(&mut self, reader: Option<usize>, target: i64) {
        let target = target.clamp(0, self.cur_w);
        match reader {
            Some(r) => {
                if let Some(c) = self.readers.get_mut(r) {
                    *c = (*c).max(target);
                }
                self.recompute_min();
            }
            None => {
                if self.readers.is_empty() {
                    self.cur_r = self.cur_r.max(target);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RING4: Geometry = Geometry {
        capacity: 4,
        ring: true,
    };
    const LIN4: Geometry = Geometry {
        capacity: 4,
        ring: false,
    };

    fn with_readers(n: usize) -> Cursors {
        Cursors {
            readers: vec![0; n],
            ..Cursors::default()
        }
    }

    #[test]
    fn write_must_be_contiguous() {
        let c = Cursors::default();
        assert!(matches!(
            c.plan_write("a", RING4, 1, 1, false, false),
            Err(AccessError::OutOfRangeRight { .. })
        ));
        assert_eq!(c.plan_write("a", RING4, 0, 1, false, false), Ok(WritePlan::Write));
    }

    #[test]
    fn full_ring_with_reader_fails() {
        let mut c = with_readers(1);
        c.cur_w = 4;
        assert!(matches!(
            c.plan_write("a", RING4, 4, 1, false, false),
            Err(AccessError::Full { .. })
        ));
    }

    #[test]
    fn full_ring_grows_by_doubling() {
        let mut c = with_readers(1);
        c.cur_w = 4;
        assert_eq!(c.plan_write("a", RING4, 4, 1, true, false), Ok(WritePlan::Grow(8)));
        assert_eq!(
            c.plan_write("a", RING4, 4, 3, true, false),
            Ok(WritePlan::Grow(17))
        );
    }

    #[test]
    fn unread_growable_ring_keeps_growing() {
        let mut c = Cursors::default();
        let mut geo = RING4;
        for i in 0..64 {
            let plan = c.plan_write("a", geo, i, 1, true, true).unwrap();
            assert!(!matches!(plan, WritePlan::Overwrite { .. }));
            if let WritePlan::Grow(cap) = plan {
                geo.capacity = cap;
            }
            c.commit_write("a", i + 1, plan);
        }
        assert_eq!(c.cur_w, 64);
        assert_eq!(c.cur_r, 0);
        assert_eq!(geo.capacity, 64);
    }

    #[test]
    fn overwrite_advances_read_cursor() {
        let mut c = Cursors::default();
        c.cur_w = 4;
        let plan = c.plan_write("a", RING4, 4, 2, false, true).unwrap();
        assert_eq!(plan, WritePlan::Overwrite { cur_r: 2 });
        c.commit_write("a", 6, plan);
        assert_eq!(c.cur_w, 6);
        assert_eq!(c.cur_r, 2);
        assert!(c.cur_w - c.cur_r <= 4);
    }

    #[test]
    fn overwrite_snaps_lagging_reader() {
        let mut c = with_readers(2);
        c.cur_w = 4;
        c.readers[1] = 3;
        c.commit_write("a", 5, WritePlan::Overwrite { cur_r: 1 });
        assert_eq!(c.readers, vec![1, 3]);
        assert_eq!(c.cur_r, 1);
    }

    #[test]
    fn linear_write_past_capacity() {
        let mut c = Cursors::default();
        c.cur_w = 4;
        assert!(matches!(
            c.plan_write("a", LIN4, 4, 1, false, true),
            Err(AccessError::Full { .. })
        ));
        assert_eq!(c.plan_write("a", LIN4, 4, 1, true, false), Ok(WritePlan::Grow(15)));
    }

    #[test]
    fn read_window_ring() {
        let mut c = with_readers(1);
        c.cur_w = 6;
        c.cur_r = 2;
        assert!(c.plan_read("a", RING4, 2, 4, false).is_ok());
        assert!(matches!(
            c.plan_read("a", RING4, 1, 1, false),
            Err(AccessError::OutOfRangeLeft { .. })
        ));
        assert!(matches!(
            c.plan_read("a", RING4, 5, 2, false),
            Err(AccessError::OutOfRangeRight { .. })
        ));
    }

    #[test]
    fn read_window_linear() {
        let mut c = Cursors::default();
        c.cur_w = 3;
        assert!(c.plan_read("a", LIN4, 0, 3, false).is_ok());
        assert!(matches!(
            c.plan_read("a", LIN4, 2, 3, false),
            Err(AccessError::OutOfRangeBufferSize { .. })
        ));
    }

    #[test]
    fn end_padding_only_at_eoi() {
        let mut c = Cursors::default();
        c.cur_w = 3;
        assert!(c.plan_read("a", RING4, 2, 3, true).is_err());
        c.eoi = true;
        let plan = c.plan_read("a", RING4, 2, 3, true).unwrap();
        assert_eq!(plan.end, 3);
        assert_eq!(plan.pad_end, 2);
        assert!(matches!(
            c.plan_read("a", RING4, 3, 2, true),
            Err(AccessError::OutOfRangeRight { .. })
        ));
    }

    #[test]
    fn front_padding_for_negative_start() {
        let mut c = Cursors::default();
        c.cur_w = 3;
        let plan = c.plan_read("a", RING4, -2, 4, true).unwrap();
        assert_eq!(plan.pad_front, 2);
        assert_eq!((plan.start, plan.end), (0, 2));
        assert!(c.plan_read("a", RING4, -2, 4, false).is_err());
    }

    #[test]
    fn read_wholly_before_stream_start_is_left_of_range() {
        let mut c = Cursors::default();
        c.cur_w = 3;
        c.eoi = true;
        for (start, len) in [(-4, 4), (-3, 1), (-1, 1)] {
            assert!(matches!(
                c.plan_read("a", RING4, start, len, true),
                Err(AccessError::OutOfRangeLeft { index, .. }) if index == start
            ));
        }
        let plan = c.plan_read("a", RING4, -1, 2, true).unwrap();
        assert_eq!((plan.pad_front, plan.start, plan.end), (1, 0, 1));
    }

    #[test]
    fn global_cursor_is_reader_minimum() {
        let mut c = with_readers(2);
        c.cur_w = 3;
        c.commit_read(Some(0), 2);
        assert_eq!(c.cur_r, 0);
        c.commit_read(Some(1), 1);
        assert_eq!(c.cur_r, 1);
    }

    #[test]
    fn anonymous_read_ignored_with_registered_readers() {
        let mut c = with_readers(1);
        c.cur_w = 3;
        c.commit_read(None, 3);
        assert_eq!(c.cur_r, 0);

        let mut free = Cursors::default();
        free.cur_w = 3;
        free.commit_read(None, 2);
        assert_eq!(free.cur_r, 2);
    }

    #[test]
    fn catch_up_never_moves_back() {
        let mut c = with_readers(1);
        c.cur_w = 5;
        c.catch_up(Some(0), 3);
        assert_eq!(c.readers[0], 3);
        c.catch_up(Some(0), 1);
        assert_eq!(c.readers[0], 3);
        c.catch_up(Some(0), 99);
        assert_eq!(c.readers[0], 5);
        assert_eq!(c.cur_r, 5);
    }

    #[test]
    fn free_and_available() {
        let mut c = with_readers(1);
        c.cur_w = 3;
        c.readers[0] = 1;
        assert_eq!(c.free(RING4, 1), 2);
        assert_eq!(c.available(1), 2);
        assert_eq!(c.free(LIN4, 1), 1);
    }

    #[test]
    fn min_readable_respects_growth() {
        let mut c = Cursors::default();
        assert_eq!(c.min_readable(RING4), None);
        c.cur_w = 6;
        assert_eq!(c.min_readable(RING4), Some(2));
        c.min_r_at_last_growth = 4;
        assert_eq!(c.min_readable(RING4), Some(4));
        assert_eq!(c.min_readable(LIN4), Some(0));
        assert_eq!(c.max_readable(), Some(5));
    }
}
