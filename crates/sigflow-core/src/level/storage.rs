//! Frame storage with modulo addressing and growth.
//!
//! Logical indices are mapped to physical slots in exactly one place,
//! [`FrameStorage::slot`]. Values are stored frame-major, one `f32` per
//! element; time metadata lives in a parallel vector unless disabled.

use super::frame::TimeMeta;

/// Physical storage of one level.
#[derive(Debug, Clone)]
pub(crate) struct FrameStorage {
    width: usize,
    capacity: usize,
    ring: bool,
    values: Vec<f32>,
    meta: Option<Vec<TimeMeta>>,
}

impl FrameStorage {
    /// Zeroed storage for `capacity` frames of `width` elements.
    pub fn new(width: usize, capacity: usize, ring: bool, with_meta: bool) -> Self {
        Self {
            width,
            capacity,
            ring,
            values: vec![0.0; width * capacity],
            meta: with_meta.then(|| vec![TimeMeta::default(); capacity]),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Physical slot of a logical index.
    #[inline]
    pub fn slot(&self, index: i64) -> usize {
        if self.ring {
            index.rem_euclid(self.capacity as i64) as usize
        } else {
            index as usize
        }
    }

    pub fn values_at(&self, index: i64) -> &[f32] {
        let s = self.slot(index) * self.width;
        &self.values[s..s + self.width]
    }

    pub fn meta_at(&self, index: i64) -> Option<&TimeMeta> {
        let slot = self.slot(index);
        self.meta.as_ref().map(|m| &m[slot])
    }

    pub fn write(&mut self, index: i64, values: &[f32], meta: &TimeMeta) {
        let slot = self.slot(index);
        let s = slot * self.width;
        self.values[s..s + self.width].copy_from_slice(values);
        if let Some(m) = self.meta.as_mut() {
            m[slot] = meta.clone();
        }
    }

    /// Grow to `new_capacity`, keeping every frame in `[cur_r, cur_w)`.
    ///
    /// Frames outside the live window are discarded. Linear storage keeps its
    /// indices and just extends.
    pub fn grow(&mut self, new_capacity: usize, cur_r: i64, cur_w: i64) {
        if new_capacity <= self.capacity {
            return;
        }
        if !self.ring {
            self.values.resize(new_capacity * self.width, 0.0);
            if let Some(m) = self.meta.as_mut() {
                m.resize(new_capacity, TimeMeta::default());
            }
            self.capacity = new_capacity;
        } else if new_capacity == self.capacity * 2 {
            self.grow_doubling(cur_r, cur_w);
        } else {
            self.grow_general(new_capacity, cur_r, cur_w);
        }
    }

    /// Doubling in place. A live frame's new slot `i % 2C` is either its old
    /// slot `i % C` or that slot plus `C`, which lies in the appended region,
    /// so no live frame is overwritten by the move.
    fn grow_doubling(&mut self, cur_r: i64, cur_w: i64) {
        let old = self.capacity;
        let new = old * 2;
        let w = self.width;
        self.values.resize(new * w, 0.0);
        if let Some(m) = self.meta.as_mut() {
            m.resize(new, TimeMeta::default());
        }
        for i in cur_r..cur_w {
            let from = i.rem_euclid(old as i64) as usize;
            let to = i.rem_euclid(new as i64) as usize;
            if from != to {
                self.values.copy_within(from * w..(from + 1) * w, to * w);
                if let Some(m) = self.meta.as_mut() {
                    let moved = std::mem::take(&mut m[from]);
                    m[to] = moved;
                }
            }
        }
        self.capacity = new;
        self.clear_outside(cur_r, cur_w);
    }

    /// Arbitrary new size, copying the live window through a temporary.
    fn grow_general(&mut self, new_capacity: usize, cur_r: i64, cur_w: i64) {
        let live: Vec<(i64, Vec<f32>, Option<TimeMeta>)> = (cur_r..cur_w)
            .map(|i| (i, self.values_at(i).to_vec(), self.meta_at(i).cloned()))
            .collect();
        let mut fresh = FrameStorage::new(self.width, new_capacity, true, self.meta.is_some());
        for (i, values, meta) in &live {
            fresh.write(*i, values, meta.as_ref().unwrap_or(&TimeMeta::default()));
        }
        *self = fresh;
    }

    /// Zero every slot not holding a frame of `[cur_r, cur_w)`.
    fn clear_outside(&mut self, cur_r: i64, cur_w: i64) {
        let cap = self.capacity as i64;
        let w = self.width;
        let base = cur_r.rem_euclid(cap);
        for s in 0..cap {
            let index = cur_r + (s - base).rem_euclid(cap);
            if index < cur_w {
                continue;
            }
            let s = s as usize;
            self.values[s * w..(s + 1) * w].fill(0.0);
            if let Some(m) = self.meta.as_mut() {
                m[s] = TimeMeta::default();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(i: i64) -> TimeMeta {
        TimeMeta::synthetic(i, 0.5)
    }

    fn filled(cap: usize, cur_w: i64) -> FrameStorage {
        let mut s = FrameStorage::new(2, cap, true, true);
        let start = (cur_w - cap as i64).max(0);
        for i in start..cur_w {
            s.write(i, &[i as f32, -(i as f32)], &meta(i));
        }
        s
    }

    #[test]
    fn ring_slots_wrap() {
        let s = FrameStorage::new(1, 4, true, false);
        assert_eq!(s.slot(0), 0);
        assert_eq!(s.slot(5), 1);
        let lin = FrameStorage::new(1, 4, false, false);
        assert_eq!(lin.slot(3), 3);
    }

    #[test]
    fn doubling_keeps_live_window() {
        let mut s = filled(4, 7);
        s.grow(8, 3, 7);
        assert_eq!(s.capacity(), 8);
        for i in 3..7 {
            assert_eq!(s.values_at(i), &[i as f32, -(i as f32)]);
            assert_eq!(s.meta_at(i).unwrap().index, i);
        }
    }

    #[test]
    fn doubling_zeroes_stale_slots() {
        let mut s = filled(4, 7);
        s.grow(8, 5, 7);
        let live: Vec<usize> = (5..7).map(|i| s.slot(i)).collect();
        for slot in 0..8 {
            if live.contains(&slot) {
                continue;
            }
            assert_eq!(s.values_at(slot as i64), &[0.0, 0.0]);
        }
    }

    #[test]
    fn general_growth_keeps_live_window() {
        let mut s = filled(4, 6);
        s.grow(13, 2, 6);
        assert_eq!(s.capacity(), 13);
        for i in 2..6 {
            assert_eq!(s.values_at(i)[0], i as f32);
            assert_eq!(s.meta_at(i).unwrap().index, i);
        }
    }

    #[test]
    fn linear_growth_extends() {
        let mut s = FrameStorage::new(1, 2, false, false);
        s.write(0, &[1.0], &TimeMeta::default());
        s.write(1, &[2.0], &TimeMeta::default());
        s.grow(5, 0, 2);
        s.write(4, &[5.0], &TimeMeta::default());
        assert_eq!(s.values_at(0), &[1.0]);
        assert_eq!(s.values_at(4), &[5.0]);
        assert!(s.meta_at(0).is_none());
    }
}
