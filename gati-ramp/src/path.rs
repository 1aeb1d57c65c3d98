//! Ordered container of parabolic segments.

use serde::{Deserialize, Serialize};

use crate::segment::Segment;
use crate::RAMP_EPSILON;

/// An ordered, time-contiguous sequence of [`Segment`]s.
///
/// Successive segments join continuously in position and velocity (to within
/// ramp epsilon); the container owns its segments exclusively and keeps the
/// total duration cached across mutations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParabolicPath {
    segments: Vec<Segment>,
    duration: f64,
}

impl ParabolicPath {
    /// Create an empty path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all segments.
    pub fn reset(&mut self) {
        self.segments.clear();
        self.duration = 0.0;
    }

    /// Append a segment at the end.
    pub fn append(&mut self, segment: Segment) {
        self.duration += segment.duration();
        self.segments.push(segment);
    }

    /// Total duration in seconds.
    #[inline]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// The segments in time order.
    #[inline]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Mutable access to the segments. Callers must preserve continuity;
    /// durations are not tracked through this handle, so only in-place edits
    /// that keep durations are safe.
    pub fn segments_mut(&mut self) -> &mut [Segment] {
        &mut self.segments
    }

    /// Number of segments.
    #[inline]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True when the path has no segments.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Locate the segment containing absolute time `t`.
    ///
    /// Returns the segment index and the local offset `u` within it,
    /// saturating at the path endpoints. An exact segment boundary resolves
    /// to the earlier segment with `u` equal to its duration.
    pub fn find_index(&self, t: f64) -> Option<(usize, f64)> {
        if self.segments.is_empty() {
            return None;
        }
        if t <= 0.0 {
            return Some((0, 0.0));
        }
        let mut acc = 0.0;
        for (i, seg) in self.segments.iter().enumerate() {
            if t <= acc + seg.duration() {
                return Some((i, t - acc));
            }
            acc += seg.duration();
        }
        let last = self.segments.len() - 1;
        Some((last, self.segments[last].duration()))
    }

    /// Replace everything in the closed time window `[t0, t1]` with
    /// `new_segments`.
    ///
    /// The segment containing `t0` is trimmed to its prefix, the segment
    /// containing `t1` to its suffix, and `new_segments` is spliced between
    /// them. Degenerate prefixes/suffixes (shorter than ramp epsilon) are
    /// dropped. The caller guarantees that the splice joins continuously.
    pub fn replace_segment(&mut self, t0: f64, t1: f64, new_segments: &[Segment]) {
        let Some((i0, u0)) = self.find_index(t0) else {
            return;
        };
        let Some((i1, u1)) = self.find_index(t1) else {
            return;
        };

        let mut rebuilt =
            Vec::with_capacity(i0 + new_segments.len() + (self.segments.len() - i1) + 1);
        rebuilt.extend_from_slice(&self.segments[..i0]);
        if u0 > RAMP_EPSILON {
            rebuilt.push(self.segments[i0].prefix(u0));
        }
        for seg in new_segments {
            if seg.duration() > RAMP_EPSILON || new_segments.len() == 1 {
                rebuilt.push(seg.clone());
            }
        }
        if self.segments[i1].duration() - u1 > RAMP_EPSILON {
            rebuilt.push(self.segments[i1].suffix(u1));
        }
        rebuilt.extend_from_slice(&self.segments[i1 + 1..]);

        self.segments = rebuilt;
        self.duration = self.segments.iter().map(|s| s.duration()).sum();
    }
}
