//! The feasibility pipeline.
//!
//! Candidate segment chains go through a fixed sequence of checks: endpoint
//! configuration feasibility, per-segment kinematic consistency (aware of
//! checker-side configuration modification), a lazily ordered collision
//! sweep, manipulator-constraint early rejection, and a small acceleration
//! clamp repair. The pipeline owns its scratch buffers so repeated checking
//! does not allocate.

use gati_ramp::{check_segment as check_ramp, Segment, SegmentCheck, RAMP_EPSILON};

use crate::config::SmootherConfig;
use crate::constraints::{
    options, reborrow_manip, CheckCode, CheckReturn, CheckedConfigurations, ConstraintChecker,
    ManipChecker,
};

/// General numeric epsilon, far below ramp epsilon.
pub(crate) const EPSILON: f64 = 1e-15;

/// Surpass multiplier suggested for generic time-based failures.
const GENERIC_SURPASS_MULT: f64 = 0.98;
/// Surpass multiplier suggested when the acceleration clamp repair fails.
const CLAMP_REPAIR_MULT: f64 = 0.9;

/// Staged constraint checking over candidate segment chains.
pub struct FeasibilityPipeline {
    x_lower: Vec<f64>,
    x_upper: Vec<f64>,
    vel_max: Vec<f64>,
    accel_max: Vec<f64>,
    expects_modified: bool,
    has_manip: bool,
    use_reduction_factors: bool,

    /// Perturbed re-checking is requested from the external checker except
    /// during the final emission pass.
    pub use_perturbation: bool,

    // Scratch
    q0: Vec<f64>,
    q1: Vec<f64>,
    dq0: Vec<f64>,
    dq1: Vec<f64>,
    cur_pos: Vec<f64>,
    new_pos: Vec<f64>,
    cur_vel: Vec<f64>,
    new_vel: Vec<f64>,
    checked: CheckedConfigurations,
    seg_scratch: Vec<Segment>,
    search_order: Vec<usize>,
    order_seen: Vec<bool>,
}

impl FeasibilityPipeline {
    pub fn new(config: &SmootherConfig) -> Self {
        let ndof = config.dof();
        Self {
            x_lower: config.x_lower.clone(),
            x_upper: config.x_upper.clone(),
            vel_max: config.vel_max.clone(),
            accel_max: config.accel_max.clone(),
            expects_modified: config.expects_modified_configurations(),
            has_manip: config.has_manip_constraints(),
            use_reduction_factors: config.use_reduction_factors,
            use_perturbation: true,
            q0: vec![0.0; ndof],
            q1: vec![0.0; ndof],
            dq0: vec![0.0; ndof],
            dq1: vec![0.0; ndof],
            cur_pos: vec![0.0; ndof],
            new_pos: vec![0.0; ndof],
            cur_vel: vec![0.0; ndof],
            new_vel: vec![0.0; ndof],
            checked: CheckedConfigurations::default(),
            seg_scratch: Vec::new(),
            search_order: Vec::new(),
            order_seen: Vec::new(),
        }
    }

    /// Check a whole candidate chain, writing the (possibly re-stitched)
    /// accepted chain into `out`.
    pub fn check_segments(
        &mut self,
        segments: &[Segment],
        check_options: u32,
        checker: &mut dyn ConstraintChecker,
        mut manip: Option<&mut dyn ManipChecker>,
        out: &mut Vec<Segment>,
    ) -> CheckReturn {
        debug_assert!(!segments.is_empty());
        out.clear();

        // Endpoint configuration feasibility.
        self.q0.copy_from_slice(segments[0].x0());
        self.dq0.copy_from_slice(segments[0].v0());
        let ret = self.config_feasible_buffered(check_options, checker);
        if ret.code != CheckCode::Ok {
            return ret;
        }
        let back = segments.last().expect("non-empty");
        self.q0.copy_from_slice(back.x1());
        self.dq0.copy_from_slice(back.v1());
        let ret = self.config_feasible_buffered(check_options, checker);
        if ret.code != CheckCode::Ok {
            return ret;
        }

        // Collision checking is postponed until the kinematic sweep has
        // produced the final stitched chain.
        let do_env = check_options & options::ENV_COLLISIONS != 0;
        let do_self = check_options & options::SELF_COLLISIONS != 0;
        let seg_options = check_options & !(options::ENV_COLLISIONS | options::SELF_COLLISIONS);

        self.q0.copy_from_slice(segments[0].x0());
        self.dq0.copy_from_slice(segments[0].v0());
        for segment in segments {
            self.q1.copy_from_slice(segment.x1());
            self.dq1.copy_from_slice(segment.v1());
            let mut elapsed = segment.duration();

            if self.expects_modified {
                // Configurations along previous pieces may have been
                // projected by the checker, so the declared boundary values
                // can disagree with the actual elapsed time. Re-derive the
                // elapsed time as a displacement-weighted average and fix
                // the final velocity to match.
                let mut expected = 0.0;
                let mut total_weight = 0.0;
                for i in 0..self.q0.len() {
                    let avg_vel = 0.5 * (self.dq0[i] + self.dq1[i]);
                    if avg_vel.abs() > EPSILON {
                        let weight = (self.q1[i] - self.q0[i]).abs();
                        expected += weight * (self.q1[i] - self.q0[i]) / avg_vel;
                        total_weight += weight;
                    }
                }
                if total_weight > EPSILON {
                    let new_elapsed = expected / total_weight;
                    if (new_elapsed - elapsed).abs() > RAMP_EPSILON {
                        elapsed = new_elapsed;
                        if elapsed > EPSILON {
                            let inv = 1.0 / elapsed;
                            for i in 0..self.q0.len() {
                                self.dq1[i] = 2.0 * inv * (self.q1[i] - self.q0[i]) - self.dq0[i];
                            }
                        } else {
                            let (dq0, dq1) = (&self.dq0, &mut self.dq1);
                            dq1.copy_from_slice(dq0);
                        }
                    }
                }
            }

            let ret = self.segment_feasible_buffered(
                elapsed,
                seg_options,
                checker,
                reborrow_manip(&mut manip),
            );
            if ret.code != CheckCode::Ok {
                return ret;
            }
            if !self.seg_scratch.is_empty() {
                let last = self.seg_scratch.last().expect("non-empty");
                self.q0.copy_from_slice(last.x1());
                self.dq0.copy_from_slice(last.v1());
                out.append(&mut self.seg_scratch);
            }
        }

        // Lazy collision sweep over the stitched chain: probe the halves and
        // quarters first so gross failures surface early.
        if do_env || do_self {
            let mut collision_options = 0;
            if do_env {
                collision_options |= options::ENV_COLLISIONS;
            }
            if do_self {
                collision_options |= options::SELF_COLLISIONS;
            }
            build_search_order(out.len(), &mut self.search_order, &mut self.order_seen);
            for k in 0..self.search_order.len() {
                let idx = self.search_order[k];
                self.q0.copy_from_slice(out[idx].x1());
                self.dq0.copy_from_slice(out[idx].v1());
                let ret = self.config_feasible_buffered(collision_options, checker);
                if ret.code != CheckCode::Ok {
                    return ret;
                }
            }
        }

        // The stitched chain must still land where the request asked;
        // a velocity discrepancy is reported but not fatal.
        if let Some(last) = out.last() {
            self.q0.copy_from_slice(last.x1());
            self.dq0.copy_from_slice(last.v1());
        }
        let mut different_velocity = false;
        for i in 0..self.q0.len() {
            if (back.x1()[i] - self.q0[i]).abs() > RAMP_EPSILON {
                log::debug!(
                    "stitched chain misses requested final position at joint {} by {:.3e}",
                    i,
                    (back.x1()[i] - self.q0[i]).abs()
                );
                return CheckReturn::with_code(CheckCode::FinalValuesNotReached);
            }
            if (back.v1()[i] - self.dq0[i]).abs() > RAMP_EPSILON {
                different_velocity = true;
            }
        }

        if check_options & options::FULLY_CHECKED_MASK == options::FULLY_CHECKED_MASK {
            for seg in out.iter_mut() {
                seg.constraint_checked = true;
            }
        }

        let mut ret = CheckReturn::ok();
        ret.different_velocity = different_velocity;
        ret
    }

    /// Check a single segment (wrapper over [`Self::check_segments`]).
    pub fn check_one(
        &mut self,
        segment: &Segment,
        check_options: u32,
        checker: &mut dyn ConstraintChecker,
        manip: Option<&mut dyn ManipChecker>,
        out: &mut Vec<Segment>,
    ) -> CheckReturn {
        let chain = std::slice::from_ref(segment);
        self.check_segments(chain, check_options, checker, manip, out)
    }

    /// Segment feasibility of explicit boundary states; stitched output is
    /// appended to `out`.
    #[allow(clippy::too_many_arguments)]
    pub fn segment_feasible(
        &mut self,
        q0: &[f64],
        q1: &[f64],
        dq0: &[f64],
        dq1: &[f64],
        elapsed: f64,
        check_options: u32,
        checker: &mut dyn ConstraintChecker,
        manip: Option<&mut dyn ManipChecker>,
        out: &mut Vec<Segment>,
    ) -> CheckReturn {
        self.q0.copy_from_slice(q0);
        self.q1.copy_from_slice(q1);
        self.dq0.copy_from_slice(dq0);
        self.dq1.copy_from_slice(dq1);
        let ret = self.segment_feasible_buffered(elapsed, check_options, checker, manip);
        out.clear();
        out.append(&mut self.seg_scratch);
        ret
    }

    /// Configuration check of the state in `self.q0`/`self.dq0`.
    fn config_feasible_buffered(
        &mut self,
        mut check_options: u32,
        checker: &mut dyn ConstraintChecker,
    ) -> CheckReturn {
        if self.use_perturbation {
            check_options |= options::PERTURBATION;
        }
        let code = checker.check_config(&self.q0, &self.dq0, check_options);
        match code {
            CheckCode::Ok => CheckReturn::ok(),
            CheckCode::TimeBased => CheckReturn::time_based(GENERIC_SURPASS_MULT),
            other => CheckReturn::with_code(other),
        }
    }

    /// Segment check of the boundary states held in the scratch buffers,
    /// leaving the stitched chain in `self.seg_scratch`.
    fn segment_feasible_buffered(
        &mut self,
        elapsed: f64,
        mut check_options: u32,
        checker: &mut dyn ConstraintChecker,
        mut manip: Option<&mut dyn ManipChecker>,
    ) -> CheckReturn {
        self.seg_scratch.clear();

        let fully_checked =
            check_options & options::FULLY_CHECKED_MASK == options::FULLY_CHECKED_MASK;
        if elapsed <= EPSILON {
            let mut seg = Segment::from_boundary(&self.q0, &self.q0, &self.dq0, &self.dq1, 0.0);
            seg.constraint_checked = fully_checked;
            self.seg_scratch.push(seg);
            return self.config_feasible_buffered(check_options, checker);
        }

        if self.use_perturbation {
            check_options |= options::PERTURBATION;
        }
        if self.expects_modified || self.has_manip {
            check_options |= options::FILL_CHECKED;
        }
        self.checked.clear();

        // Manipulator constraints reject most over-fast candidates much more
        // cheaply than the full path check, so consult them first.
        if self.has_manip && check_options & options::TIME_BASED != 0 {
            if let Some(manip) = reborrow_manip(&mut manip) {
                let seg =
                    Segment::from_boundary(&self.q0, &self.q1, &self.dq0, &self.dq1, elapsed);
                let retmanip = manip.check_segments(
                    std::slice::from_ref(&seg),
                    self.use_reduction_factors,
                );
                if retmanip.code != CheckCode::Ok {
                    return retmanip;
                }
            }
        }

        let code = checker.check_segment(
            &self.q0,
            &self.q1,
            &self.dq0,
            &self.dq1,
            elapsed,
            check_options,
            &mut self.checked,
        );
        if code != CheckCode::Ok {
            if code == CheckCode::TimeBased {
                return CheckReturn::time_based(GENERIC_SURPASS_MULT);
            }
            return CheckReturn::with_code(code);
        }

        if self.expects_modified && !self.checked.is_empty() {
            let ret = self.stitch_modified_configurations(fully_checked);
            if ret.code != CheckCode::Ok {
                return ret;
            }
        }

        if self.seg_scratch.is_empty() {
            let mut seg =
                Segment::from_boundary(&self.q0, &self.q1, &self.dq0, &self.dq1, elapsed);
            if let Some(ret) = self.clamp_accelerations(&mut seg) {
                return ret;
            }
            seg.constraint_checked = fully_checked;
            self.seg_scratch.push(seg);
        }

        if self.has_manip && check_options & options::TIME_BASED != 0 {
            if let Some(manip) = reborrow_manip(&mut manip) {
                let retmanip =
                    manip.check_segments(&self.seg_scratch, self.use_reduction_factors);
                if retmanip.code != CheckCode::Ok {
                    return retmanip;
                }
            }
        }

        CheckReturn::ok()
    }

    /// Rebuild the segment from the configurations the checker actually
    /// probed, clamping small acceleration overshoot along the way.
    fn stitch_modified_configurations(&mut self, fully_checked: bool) -> CheckReturn {
        let ndof = self.q0.len();
        debug_assert_eq!(
            self.checked.configurations.len(),
            self.checked.times.len() * ndof
        );

        self.cur_pos.copy_from_slice(&self.q0);
        self.cur_vel.copy_from_slice(&self.dq0);
        let mut cur_time = 0.0;

        for (itime, &time) in self.checked.times.iter().enumerate() {
            let delta = time - cur_time;
            if delta <= RAMP_EPSILON {
                continue;
            }
            self.new_pos
                .copy_from_slice(&self.checked.configurations[itime * ndof..(itime + 1) * ndof]);

            let inv = 1.0 / delta;
            for i in 0..ndof {
                self.new_vel[i] = 2.0 * inv * (self.new_pos[i] - self.cur_pos[i]) - self.cur_vel[i];
                if self.new_vel[i].abs() > self.vel_max[i] + RAMP_EPSILON {
                    if 0.9 * self.vel_max[i] < 0.1 * self.new_vel[i].abs() {
                        log::warn!(
                            "projected velocity at joint {} is far above its limit: |{:.6e}| > {:.6e}",
                            i,
                            self.new_vel[i],
                            self.vel_max[i]
                        );
                    }
                    return CheckReturn::time_based(0.9 * self.vel_max[i] / self.new_vel[i].abs());
                }
            }

            let mut seg = Segment::from_boundary(
                &self.cur_pos,
                &self.new_pos,
                &self.cur_vel,
                &self.new_vel,
                delta,
            );
            if let Some(ret) = self.clamp_accelerations(&mut seg) {
                return ret;
            }
            seg.constraint_checked = fully_checked;
            self.seg_scratch.push(seg);

            cur_time = time;
            std::mem::swap(&mut self.cur_pos, &mut self.new_pos);
            std::mem::swap(&mut self.cur_vel, &mut self.new_vel);
        }

        // The projected chain must still end at the requested position.
        for i in 0..ndof {
            if (self.cur_pos[i] - self.q1[i]).abs() + EPSILON > RAMP_EPSILON {
                log::debug!(
                    "projected chain ends {:.3e} away from the requested position at joint {}",
                    (self.cur_pos[i] - self.q1[i]).abs(),
                    i
                );
                return CheckReturn::with_code(CheckCode::FinalValuesNotReached);
            }
        }
        CheckReturn::ok()
    }

    /// Clamp per-DOF acceleration overshoot to the limit and re-validate.
    /// Returns a failure when the clamped segment no longer passes the
    /// kinematic checks.
    fn clamp_accelerations(&self, seg: &mut Segment) -> Option<CheckReturn> {
        let mut changed = false;
        for i in 0..seg.dof() {
            let a = seg.accel()[i];
            if a < -self.accel_max[i] {
                seg.set_accel_at(i, -self.accel_max[i]);
                changed = true;
            } else if a > self.accel_max[i] {
                seg.set_accel_at(i, self.accel_max[i]);
                changed = true;
            }
        }
        if changed {
            let ret = check_ramp(seg, &self.x_lower, &self.x_upper, &self.vel_max, &self.accel_max);
            if ret != SegmentCheck::Normal {
                log::warn!("segment invalid after clamping accelerations: {:?}", ret);
                return Some(CheckReturn::time_based(CLAMP_REPAIR_MULT));
            }
        }
        None
    }
}

/// Probe order that interleaves the fractions 0, 1/2, 1/4, 3/4, 1/8, 5/8,
/// 3/8, 7/8 of the chain before the remaining indices in natural order.
fn build_search_order(n: usize, order: &mut Vec<usize>, seen: &mut Vec<bool>) {
    order.clear();
    seen.clear();
    seen.resize(n, false);
    const FRACTIONS: [f64; 8] = [0.0, 0.5, 0.25, 0.75, 0.125, 0.625, 0.375, 0.875];
    for f in FRACTIONS {
        let idx = (n as f64 * f) as usize;
        if idx < n && !seen[idx] {
            seen[idx] = true;
            order.push(idx);
        }
    }
    for (idx, was_seen) in seen.iter().enumerate() {
        if !*was_seen {
            order.push(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BoxWorldChecker, RejectingChecker};

    fn pipeline(config: &SmootherConfig) -> FeasibilityPipeline {
        FeasibilityPipeline::new(config)
    }

    #[test]
    fn test_search_order_prefers_halves() {
        let mut order = Vec::new();
        let mut seen = Vec::new();
        build_search_order(8, &mut order, &mut seen);
        assert_eq!(&order[..4], &[0, 4, 2, 6]);
        assert_eq!(order.len(), 8);
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_search_order_small_chain() {
        let mut order = Vec::new();
        let mut seen = Vec::new();
        build_search_order(1, &mut order, &mut seen);
        assert_eq!(order, vec![0]);
        build_search_order(0, &mut order, &mut seen);
        assert!(order.is_empty());
    }

    #[test]
    fn test_accepts_clean_segment() {
        let config = SmootherConfig::uniform(2, 10.0, 1.0, 1.0);
        let mut pipe = pipeline(&config);
        let mut checker = BoxWorldChecker::new(&config);
        let seg = Segment::from_boundary(
            &[0.0, 0.0],
            &[0.5, 0.0],
            &[0.0, 0.0],
            &[1.0, 0.0],
            1.0,
        );
        let mut out = Vec::new();
        let ret = pipe.check_one(&seg, options::ALL, &mut checker, None, &mut out);
        assert_eq!(ret.code, CheckCode::Ok);
        assert!(!ret.different_velocity);
        assert_eq!(out.len(), 1);
        assert!(out[0].constraint_checked);
    }

    #[test]
    fn test_collision_rejection() {
        let config = SmootherConfig::uniform(1, 10.0, 1.0, 1.0);
        let mut pipe = pipeline(&config);
        let mut checker = RejectingChecker::collides_everywhere();
        let seg = Segment::from_boundary(&[0.0], &[0.5], &[0.0], &[1.0], 1.0);
        let mut out = Vec::new();
        let ret = pipe.check_one(&seg, options::ALL, &mut checker, None, &mut out);
        assert_eq!(ret.code, CheckCode::Collision);
    }

    #[test]
    fn test_time_based_surpass_mult() {
        let config = SmootherConfig::uniform(1, 10.0, 1.0, 1.0);
        let mut pipe = pipeline(&config);
        let mut checker = RejectingChecker::time_based_on_segments();
        let seg = Segment::from_boundary(&[0.0], &[0.5], &[0.0], &[1.0], 1.0);
        let mut out = Vec::new();
        let ret = pipe.check_one(&seg, options::ALL, &mut checker, None, &mut out);
        assert_eq!(ret.code, CheckCode::TimeBased);
        assert!((ret.time_based_surpass_mult - GENERIC_SURPASS_MULT).abs() < 1e-12);
    }

    #[test]
    fn test_zero_duration_segment_checks_config_only() {
        let config = SmootherConfig::uniform(1, 10.0, 1.0, 1.0);
        let mut pipe = pipeline(&config);
        let mut checker = BoxWorldChecker::new(&config);
        let mut out = Vec::new();
        let ret = pipe.segment_feasible(
            &[0.3],
            &[0.3],
            &[0.0],
            &[0.0],
            0.0,
            options::ALL,
            &mut checker,
            None,
            &mut out,
        );
        assert_eq!(ret.code, CheckCode::Ok);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].duration(), 0.0);
    }
}
