//! N-DOF constant-acceleration trajectory segments.

use serde::{Deserialize, Serialize};

use crate::RAMP_EPSILON;

/// One constant-acceleration piece of a multi-DOF parabolic trajectory.
///
/// Every DOF accelerates at a constant (per-DOF) rate for the whole
/// duration, so the segment is fully determined by its boundary states and
/// duration:
///
/// ```text
/// x1[i] = x0[i] + v0[i] * t + 0.5 * a[i] * t^2
/// v1[i] = v0[i] + a[i] * t
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    x0: Vec<f64>,
    x1: Vec<f64>,
    v0: Vec<f64>,
    v1: Vec<f64>,
    accel: Vec<f64>,
    duration: f64,
    /// True once the full constraint stack has accepted this segment.
    #[serde(default)]
    pub constraint_checked: bool,
}

impl Segment {
    /// Build a segment from boundary states and a duration.
    ///
    /// Accelerations are recomputed from the velocity difference; the caller
    /// is responsible for position/velocity consistency (see
    /// [`crate::check::check_segment`]).
    pub fn from_boundary(x0: &[f64], x1: &[f64], v0: &[f64], v1: &[f64], duration: f64) -> Self {
        debug_assert_eq!(x0.len(), x1.len());
        debug_assert_eq!(x0.len(), v0.len());
        debug_assert_eq!(x0.len(), v1.len());
        let accel = if duration > RAMP_EPSILON {
            let inv = 1.0 / duration;
            v0.iter()
                .zip(v1.iter())
                .map(|(&a, &b)| (b - a) * inv)
                .collect()
        } else {
            vec![0.0; x0.len()]
        };
        Self {
            x0: x0.to_vec(),
            x1: x1.to_vec(),
            v0: v0.to_vec(),
            v1: v1.to_vec(),
            accel,
            duration,
            constraint_checked: false,
        }
    }

    /// A segment that holds `x` at rest for `duration` seconds.
    pub fn constant(x: &[f64], duration: f64) -> Self {
        let ndof = x.len();
        Self {
            x0: x.to_vec(),
            x1: x.to_vec(),
            v0: vec![0.0; ndof],
            v1: vec![0.0; ndof],
            accel: vec![0.0; ndof],
            duration,
            constraint_checked: false,
        }
    }

    /// Number of degrees of freedom.
    #[inline]
    pub fn dof(&self) -> usize {
        self.x0.len()
    }

    /// Segment duration in seconds.
    #[inline]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Initial positions.
    #[inline]
    pub fn x0(&self) -> &[f64] {
        &self.x0
    }

    /// Final positions.
    #[inline]
    pub fn x1(&self) -> &[f64] {
        &self.x1
    }

    /// Initial velocities.
    #[inline]
    pub fn v0(&self) -> &[f64] {
        &self.v0
    }

    /// Final velocities.
    #[inline]
    pub fn v1(&self) -> &[f64] {
        &self.v1
    }

    /// Per-DOF accelerations.
    #[inline]
    pub fn accel(&self) -> &[f64] {
        &self.accel
    }

    /// Overwrite one DOF's acceleration (used by the clamp repair in the
    /// feasibility layer). Final velocity is kept; the segment must be
    /// re-validated afterwards.
    pub fn set_accel_at(&mut self, idof: usize, a: f64) {
        self.accel[idof] = a;
    }

    /// Overwrite the final velocities.
    pub fn set_v1(&mut self, v1: &[f64]) {
        self.v1.copy_from_slice(v1);
    }

    /// Positions at local time `u` in `[0, duration]`, written into `out`.
    pub fn eval_pos(&self, u: f64, out: &mut Vec<f64>) {
        let u = u.clamp(0.0, self.duration);
        out.clear();
        out.extend(
            self.x0
                .iter()
                .zip(self.v0.iter().zip(self.accel.iter()))
                .map(|(&x, (&v, &a))| x + u * (v + 0.5 * a * u)),
        );
    }

    /// Velocities at local time `u`, written into `out`.
    pub fn eval_vel(&self, u: f64, out: &mut Vec<f64>) {
        let u = u.clamp(0.0, self.duration);
        out.clear();
        out.extend(
            self.v0
                .iter()
                .zip(self.accel.iter())
                .map(|(&v, &a)| v + a * u),
        );
    }

    /// Split at local time `u`, returning the two halves. Both halves keep
    /// the per-DOF accelerations; the `constraint_checked` flag carries over
    /// since a feasible segment stays feasible under restriction.
    pub fn split_at(&self, u: f64) -> (Segment, Segment) {
        let u = u.clamp(0.0, self.duration);
        let mut xm = Vec::new();
        let mut vm = Vec::new();
        self.eval_pos(u, &mut xm);
        self.eval_vel(u, &mut vm);
        let mut front = Segment::from_boundary(&self.x0, &xm, &self.v0, &vm, u);
        let mut back = Segment::from_boundary(&xm, &self.x1, &vm, &self.v1, self.duration - u);
        front.constraint_checked = self.constraint_checked;
        back.constraint_checked = self.constraint_checked;
        (front, back)
    }

    /// The prefix `[0, u]` of this segment.
    pub fn prefix(&self, u: f64) -> Segment {
        self.split_at(u).0
    }

    /// The suffix `[u, duration]` of this segment.
    pub fn suffix(&self, u: f64) -> Segment {
        self.split_at(u).1
    }
}

/// Sum of segment durations.
pub fn total_duration(segments: &[Segment]) -> f64 {
    segments.iter().map(|s| s.duration()).sum()
}
