//! Multi-DOF parabolic interpolation.
//!
//! All entry points produce chains of [`Segment`]s whose joins are
//! simultaneous across DOFs: per-DOF profiles are solved first, then sliced
//! at the union of their phase switch times.

use crate::profile::{self, Phase, Profile};
use crate::segment::Segment;
use crate::RAMP_EPSILON;

/// Growth factor applied to the common duration when some DOF cannot be
/// stretched to it.
const DURATION_GROWTH: f64 = 1.05;
/// Attempts at finding a common feasible duration.
const MAX_DURATION_TRIES: usize = 8;

/// Two-point boundary solver for N-DOF parabolic trajectories.
///
/// Holds scratch buffers so repeated interpolation on the planner hot path
/// does not allocate.
pub struct Interpolator {
    ndof: usize,
    profiles: Vec<Profile>,
    times: Vec<f64>,
    merged: Vec<f64>,
    qa: Vec<f64>,
    qb: Vec<f64>,
    va: Vec<f64>,
    vb: Vec<f64>,
}

impl Interpolator {
    /// Create an interpolator for `ndof` degrees of freedom.
    pub fn new(ndof: usize) -> Self {
        Self {
            ndof,
            profiles: Vec::with_capacity(ndof),
            times: Vec::new(),
            merged: Vec::new(),
            qa: vec![0.0; ndof],
            qb: vec![0.0; ndof],
            va: vec![0.0; ndof],
            vb: vec![0.0; ndof],
        }
    }

    /// Number of degrees of freedom.
    pub fn dof(&self) -> usize {
        self.ndof
    }

    /// Fastest straight-line trajectory from rest at `x0` to rest at `x1`.
    ///
    /// The motion follows the segment between the waypoints in configuration
    /// space; the per-DOF limits are projected onto the line so all DOFs
    /// share one time-scaling profile and every join is simultaneous.
    pub fn zero_vel_nd(
        &mut self,
        x0: &[f64],
        x1: &[f64],
        v_max: &[f64],
        a_max: &[f64],
        out: &mut Vec<Segment>,
    ) -> bool {
        debug_assert_eq!(x0.len(), self.ndof);
        out.clear();

        let mut v_line = f64::INFINITY;
        let mut a_line = f64::INFINITY;
        let mut moved = false;
        for i in 0..self.ndof {
            let d = (x1[i] - x0[i]).abs();
            if d > RAMP_EPSILON {
                moved = true;
                v_line = v_line.min(v_max[i] / d);
                a_line = a_line.min(a_max[i] / d);
            }
        }
        if !moved {
            out.push(Segment::constant(x0, 0.0));
            return true;
        }
        if !(v_line > 0.0 && a_line > 0.0) || !v_line.is_finite() || !a_line.is_finite() {
            return false;
        }

        // Scalar profile for the path parameter s in [0, 1].
        let s_profile = profile::min_time_zero_vel(0.0, 1.0, v_line, a_line);
        for phase in &s_profile.phases {
            if phase.duration <= RAMP_EPSILON {
                continue;
            }
            let (s0, sd0) = (phase.x0, phase.v0);
            let (s1, sd1) = (phase.x1(), phase.v1());
            for i in 0..self.ndof {
                let d = x1[i] - x0[i];
                self.qa[i] = x0[i] + s0 * d;
                self.qb[i] = x0[i] + s1 * d;
                self.va[i] = sd0 * d;
                self.vb[i] = sd1 * d;
            }
            out.push(Segment::from_boundary(
                &self.qa,
                &self.qb,
                &self.va,
                &self.vb,
                phase.duration,
            ));
        }
        !out.is_empty()
    }

    /// Parabolic connection between arbitrary boundary states.
    ///
    /// Per-DOF minimum times determine a common duration; every DOF is then
    /// re-solved at that duration. With `try_harder` a DOF whose profile
    /// leaves its position bounds is rerouted through a stop at the bound,
    /// keeping the common duration; without it a bound violation fails the
    /// interpolation.
    #[allow(clippy::too_many_arguments)]
    pub fn arbitrary_vel_nd(
        &mut self,
        x0: &[f64],
        x1: &[f64],
        v0: &[f64],
        v1: &[f64],
        x_lower: &[f64],
        x_upper: &[f64],
        v_max: &[f64],
        a_max: &[f64],
        try_harder: bool,
        out: &mut Vec<Segment>,
    ) -> bool {
        debug_assert_eq!(x0.len(), self.ndof);
        out.clear();

        let mut t_common: f64 = 0.0;
        for i in 0..self.ndof {
            match profile::min_time(x0[i], x1[i], v0[i], v1[i], v_max[i], a_max[i]) {
                Some(p) => t_common = t_common.max(p.duration()),
                None => return false,
            }
        }

        if !self.solve_all_fixed(x0, x1, v0, v1, &mut t_common, v_max, a_max) {
            return false;
        }
        if !self.enforce_position_bounds(x_lower, x_upper, v_max, a_max, try_harder, t_common) {
            return false;
        }
        self.merge_into_segments(out);
        true
    }

    /// Interpolation constrained to exactly `duration` seconds.
    #[allow(clippy::too_many_arguments)]
    pub fn fixed_duration_nd(
        &mut self,
        x0: &[f64],
        x1: &[f64],
        v0: &[f64],
        v1: &[f64],
        duration: f64,
        x_lower: &[f64],
        x_upper: &[f64],
        v_max: &[f64],
        a_max: &[f64],
        out: &mut Vec<Segment>,
    ) -> bool {
        debug_assert_eq!(x0.len(), self.ndof);
        out.clear();

        self.profiles.clear();
        for i in 0..self.ndof {
            match profile::fixed_duration(
                x0[i], x1[i], v0[i], v1[i], duration, v_max[i], a_max[i],
            ) {
                Some(p) => self.profiles.push(p),
                None => return false,
            }
        }
        for (i, p) in self.profiles.iter().enumerate() {
            if !p.within_position_bounds(x_lower[i], x_upper[i]) {
                return false;
            }
        }
        self.merge_into_segments(out);
        true
    }

    /// Solve every DOF at a common duration, growing the duration when some
    /// DOF admits no profile at it.
    fn solve_all_fixed(
        &mut self,
        x0: &[f64],
        x1: &[f64],
        v0: &[f64],
        v1: &[f64],
        t_common: &mut f64,
        v_max: &[f64],
        a_max: &[f64],
    ) -> bool {
        for _ in 0..MAX_DURATION_TRIES {
            self.profiles.clear();
            let mut ok = true;
            for i in 0..self.ndof {
                match profile::fixed_duration(
                    x0[i], x1[i], v0[i], v1[i], *t_common, v_max[i], a_max[i],
                ) {
                    Some(p) => self.profiles.push(p),
                    None => {
                        ok = false;
                        break;
                    }
                }
            }
            if ok {
                return true;
            }
            *t_common = *t_common * DURATION_GROWTH + RAMP_EPSILON;
        }
        log::debug!(
            "no common duration found after {} tries (last tried {:.6e})",
            MAX_DURATION_TRIES,
            t_common
        );
        false
    }

    /// Check (and with `try_harder`, repair) position-bound violations of the
    /// solved per-DOF profiles.
    fn enforce_position_bounds(
        &mut self,
        x_lower: &[f64],
        x_upper: &[f64],
        v_max: &[f64],
        a_max: &[f64],
        try_harder: bool,
        t_common: f64,
    ) -> bool {
        for i in 0..self.ndof {
            if self.profiles[i].within_position_bounds(x_lower[i], x_upper[i]) {
                continue;
            }
            if !try_harder {
                return false;
            }
            let (lo, hi) = self.profiles[i].pos_extrema();
            let bound = if lo < x_lower[i] - RAMP_EPSILON {
                x_lower[i]
            } else {
                debug_assert!(hi > x_upper[i] + RAMP_EPSILON);
                x_upper[i]
            };
            let p = &self.profiles[i];
            let (x0, v0, x1, v1) = (p.x0(), p.v0(), p.x1(), p.v1());
            match bounded_via_stop(x0, x1, v0, v1, bound, t_common, v_max[i], a_max[i]) {
                Some(p) if p.within_position_bounds(x_lower[i], x_upper[i]) => {
                    self.profiles[i] = p;
                }
                _ => return false,
            }
        }
        true
    }

    /// Slice the solved per-DOF profiles at the union of their switch times
    /// into constant-acceleration N-DOF segments.
    fn merge_into_segments(&mut self, out: &mut Vec<Segment>) {
        self.merged.clear();
        for p in &self.profiles {
            p.switch_times(&mut self.times);
            for &t in &self.times {
                self.merged.push(t);
            }
        }
        self.merged.sort_by(|a, b| a.partial_cmp(b).expect("finite times"));
        self.merged.dedup_by(|a, b| (*a - *b).abs() <= RAMP_EPSILON);

        out.clear();
        for w in 0..self.merged.len().saturating_sub(1) {
            let ta = self.merged[w];
            let tb = self.merged[w + 1];
            if tb - ta <= RAMP_EPSILON {
                continue;
            }
            for i in 0..self.ndof {
                self.qa[i] = self.profiles[i].pos_at(ta);
                self.qb[i] = self.profiles[i].pos_at(tb);
                self.va[i] = self.profiles[i].vel_at(ta);
                self.vb[i] = self.profiles[i].vel_at(tb);
            }
            out.push(Segment::from_boundary(
                &self.qa,
                &self.qb,
                &self.va,
                &self.vb,
                tb - ta,
            ));
        }
        if out.is_empty() && !self.profiles.is_empty() {
            // All profiles degenerate: hold the boundary state.
            for i in 0..self.ndof {
                self.qa[i] = self.profiles[i].pos_at(0.0);
            }
            out.push(Segment::constant(&self.qa, 0.0));
        }
    }
}

/// Fixed-duration 1-DOF profile that routes through a full stop at `bound`,
/// dwelling there for whatever time the common duration leaves over.
fn bounded_via_stop(
    x0: f64,
    x1: f64,
    v0: f64,
    v1: f64,
    bound: f64,
    duration: f64,
    v_max: f64,
    a_max: f64,
) -> Option<Profile> {
    let head = profile::min_time(x0, bound, v0, 0.0, v_max, a_max)?;
    let tail = profile::min_time(bound, x1, 0.0, v1, v_max, a_max)?;
    let dwell = duration - head.duration() - tail.duration();
    if dwell < -RAMP_EPSILON {
        return None;
    }
    let mut phases = head.phases;
    if dwell > RAMP_EPSILON {
        phases.push(Phase {
            x0: bound,
            v0: 0.0,
            accel: 0.0,
            duration: dwell,
        });
    }
    phases.extend(tail.phases);
    Some(Profile { phases })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::total_duration;
    use approx::assert_relative_eq;

    fn joins_are_continuous(segments: &[Segment]) {
        for w in segments.windows(2) {
            for i in 0..w[0].dof() {
                assert!((w[0].x1()[i] - w[1].x0()[i]).abs() < 1e-9);
                assert!((w[0].v1()[i] - w[1].v0()[i]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_zero_vel_unit_move() {
        let mut interp = Interpolator::new(2);
        let mut out = Vec::new();
        let ok = interp.zero_vel_nd(
            &[0.0, 0.0],
            &[1.0, 0.0],
            &[1.0, 1.0],
            &[1.0, 1.0],
            &mut out,
        );
        assert!(ok);
        // Bang-bang over unit distance with unit limits: 2 s total.
        assert_relative_eq!(total_duration(&out), 2.0, epsilon = 1e-9);
        joins_are_continuous(&out);
        let last = out.last().unwrap();
        assert_relative_eq!(last.x1()[0], 1.0, epsilon = 1e-9);
        assert!(last.v1()[0].abs() < 1e-9);
    }

    #[test]
    fn test_zero_vel_synchronized_dofs() {
        let mut interp = Interpolator::new(2);
        let mut out = Vec::new();
        assert!(interp.zero_vel_nd(
            &[0.0, 0.0],
            &[1.0, -2.0],
            &[1.0, 1.0],
            &[1.0, 1.0],
            &mut out,
        ));
        joins_are_continuous(&out);
        // Straight line in config space: positions stay proportional.
        let mut q = Vec::new();
        for seg in &out {
            seg.eval_pos(seg.duration() * 0.5, &mut q);
            assert!((q[1] + 2.0 * q[0]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_zero_vel_coincident_waypoints() {
        let mut interp = Interpolator::new(1);
        let mut out = Vec::new();
        assert!(interp.zero_vel_nd(&[1.0], &[1.0], &[1.0], &[1.0], &mut out));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].duration(), 0.0);
    }

    #[test]
    fn test_arbitrary_vel_basic() {
        let mut interp = Interpolator::new(2);
        let mut out = Vec::new();
        let ok = interp.arbitrary_vel_nd(
            &[0.0, 0.0],
            &[1.0, 0.5],
            &[0.2, 0.0],
            &[0.0, -0.1],
            &[-10.0, -10.0],
            &[10.0, 10.0],
            &[1.0, 1.0],
            &[2.0, 2.0],
            false,
            &mut out,
        );
        assert!(ok);
        joins_are_continuous(&out);
        let first = out.first().unwrap();
        let last = out.last().unwrap();
        assert!((first.x0()[0] - 0.0).abs() < 1e-9);
        assert!((first.v0()[0] - 0.2).abs() < 1e-9);
        assert!((last.x1()[1] - 0.5).abs() < 1e-8);
        assert!((last.v1()[1] + 0.1).abs() < 1e-8);
    }

    #[test]
    fn test_arbitrary_vel_limits_respected() {
        let mut interp = Interpolator::new(1);
        let mut out = Vec::new();
        assert!(interp.arbitrary_vel_nd(
            &[0.0],
            &[5.0],
            &[0.0],
            &[0.0],
            &[-10.0],
            &[10.0],
            &[1.0],
            &[1.0],
            false,
            &mut out,
        ));
        for seg in &out {
            assert!(seg.accel()[0].abs() <= 1.0 + 1e-9);
            assert!(seg.v0()[0].abs() <= 1.0 + 1e-9);
            assert!(seg.v1()[0].abs() <= 1.0 + 1e-9);
        }
    }

    #[test]
    fn test_arbitrary_vel_bound_violation_fails_without_try_harder() {
        // Moving right with initial velocity pointing right but the target to
        // the left overshoots past the upper bound.
        let mut interp = Interpolator::new(1);
        let mut out = Vec::new();
        let ok = interp.arbitrary_vel_nd(
            &[0.9],
            &[0.0],
            &[1.0],
            &[0.0],
            &[-1.0],
            &[1.0],
            &[1.0],
            &[1.0],
            false,
            &mut out,
        );
        assert!(!ok);
    }

    #[test]
    fn test_arbitrary_vel_try_harder_rides_bound() {
        let mut interp = Interpolator::new(1);
        let mut out = Vec::new();
        let ok = interp.arbitrary_vel_nd(
            &[0.9],
            &[0.0],
            &[1.0],
            &[0.0],
            &[-1.0],
            &[1.5],
            &[1.0],
            &[1.0],
            true,
            &mut out,
        );
        assert!(ok);
        joins_are_continuous(&out);
        for seg in &out {
            let mut q = Vec::new();
            for k in 0..=4 {
                seg.eval_pos(seg.duration() * k as f64 / 4.0, &mut q);
                assert!(q[0] <= 1.5 + 1e-8);
            }
        }
        let last = out.last().unwrap();
        assert!((last.x1()[0]).abs() < 1e-8);
    }

    #[test]
    fn test_fixed_duration_nd() {
        let mut interp = Interpolator::new(2);
        let mut out = Vec::new();
        let ok = interp.fixed_duration_nd(
            &[0.0, 0.0],
            &[1.0, -1.0],
            &[0.0, 0.0],
            &[0.0, 0.0],
            4.0,
            &[-10.0, -10.0],
            &[10.0, 10.0],
            &[1.0, 1.0],
            &[1.0, 1.0],
            &mut out,
        );
        assert!(ok);
        assert!((total_duration(&out) - 4.0).abs() < 1e-8);
        joins_are_continuous(&out);
    }

    #[test]
    fn test_fixed_duration_nd_too_short() {
        let mut interp = Interpolator::new(1);
        let mut out = Vec::new();
        assert!(!interp.fixed_duration_nd(
            &[0.0],
            &[1.0],
            &[0.0],
            &[0.0],
            0.5,
            &[-10.0],
            &[10.0],
            &[1.0],
            &[1.0],
            &mut out,
        ));
    }
}
