//! Time range sets
//!
//! Normalised view of a surface's buffered or played media time: sorted,
//! non-overlapping `[start, end)` ranges in seconds. Adjacent or overlapping
//! ranges are merged on insert.

/// Sorted, merged set of time ranges
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeRanges {
    ranges: Vec<(f64, f64)>,
}

impl TimeRanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from arbitrary (possibly overlapping) ranges
    pub fn from_ranges<I: IntoIterator<Item = (f64, f64)>>(ranges: I) -> Self {
        let mut set = Self::new();
        for (start, end) in ranges {
            set.add(start, end);
        }
        set
    }

    /// Insert `[start, end)`, merging with touching neighbours
    ///
    /// Empty or inverted ranges are ignored.
    pub fn add(&mut self, start: f64, end: f64) {
        if !(start.is_finite() && end.is_finite()) || end <= start {
            return;
        }

        let mut merged = (start, end);
        let mut result = Vec::with_capacity(self.ranges.len() + 1);
        let mut inserted = false;

        for &(s, e) in &self.ranges {
            if e < merged.0 {
                result.push((s, e));
            } else if s > merged.1 {
                if !inserted {
                    result.push(merged);
                    inserted = true;
                }
                result.push((s, e));
            } else {
                merged = (merged.0.min(s), merged.1.max(e));
            }
        }
        if !inserted {
            result.push(merged);
        }

        self.ranges = result;
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Number of disjoint ranges
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn start(&self, i: usize) -> Option<f64> {
        self.ranges.get(i).map(|r| r.0)
    }

    pub fn end(&self, i: usize) -> Option<f64> {
        self.ranges.get(i).map(|r| r.1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.ranges.iter().copied()
    }

    /// True if `t` lies inside some range (end inclusive, so a fully
    /// buffered tail still counts at the very end)
    pub fn contains(&self, t: f64) -> bool {
        self.range_containing(t).is_some()
    }

    /// Range holding `t`
    pub fn range_containing(&self, t: f64) -> Option<(f64, f64)> {
        self.ranges.iter().copied().find(|&(s, e)| s <= t && t <= e)
    }

    /// Contiguous media available after `t` (0 if `t` is not buffered)
    pub fn buffered_ahead(&self, t: f64) -> f64 {
        self.range_containing(t).map(|(_, e)| e - t).unwrap_or(0.0)
    }

    /// Sum of all range lengths
    pub fn total(&self) -> f64 {
        self.ranges.iter().map(|(s, e)| e - s).sum()
    }
}
