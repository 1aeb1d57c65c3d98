//! Simulated constraint backends.
//!
//! These stand in for a real kinematics/collision stack in tests, examples
//! and benchmarks: a box-world checker with axis-aligned forbidden regions
//! in configuration space, scripted rejecters for failure paths, and a
//! workspace-speed checker with an identity Jacobian.

use gati_ramp::Segment;

use crate::config::SmootherConfig;
use crate::constraints::{
    options, CheckCode, CheckReturn, CheckedConfigurations, ConstraintChecker, ManipChecker,
};

/// Configuration-space checker for a box world.
///
/// Joint limits come from the smoother config; collisions are axis-aligned
/// boxes in configuration space. Straight probe segments are sampled at a
/// fixed resolution.
pub struct BoxWorldChecker {
    x_lower: Vec<f64>,
    x_upper: Vec<f64>,
    vel_max: Vec<f64>,
    /// Forbidden axis-aligned boxes: (min corner, max corner).
    pub obstacles: Vec<(Vec<f64>, Vec<f64>)>,
    /// Projection model for `neigh_state`: steps longer than the threshold
    /// land offset away from the straight-line target, shorter steps project
    /// cleanly. Emulates a constraint manifold that bends over long strides.
    pub neigh_bend: Option<(f64, Vec<f64>)>,
    state: Vec<f64>,
    /// Number of `set_state` calls observed.
    pub set_state_calls: usize,
}

impl BoxWorldChecker {
    pub fn new(config: &SmootherConfig) -> Self {
        let ndof = config.dof();
        Self {
            x_lower: config.x_lower.clone(),
            x_upper: config.x_upper.clone(),
            vel_max: config.vel_max.clone(),
            obstacles: Vec::new(),
            neigh_bend: None,
            state: vec![0.0; ndof],
            set_state_calls: 0,
        }
    }

    /// Add a forbidden box.
    pub fn add_obstacle(&mut self, min: Vec<f64>, max: Vec<f64>) {
        self.obstacles.push((min, max));
    }

    fn in_obstacle(&self, q: &[f64]) -> bool {
        self.obstacles.iter().any(|(min, max)| {
            q.iter()
                .zip(min.iter().zip(max.iter()))
                .all(|(&x, (&lo, &hi))| x >= lo && x <= hi)
        })
    }
}

impl ConstraintChecker for BoxWorldChecker {
    fn check_config(&mut self, q: &[f64], dq: &[f64], check_options: u32) -> CheckCode {
        for i in 0..q.len() {
            if q[i] < self.x_lower[i] - 1e-9 || q[i] > self.x_upper[i] + 1e-9 {
                return CheckCode::ConfigInfeasible;
            }
        }
        if check_options & options::TIME_BASED != 0 {
            for i in 0..dq.len() {
                if dq[i].abs() > self.vel_max[i] + 1e-9 {
                    return CheckCode::TimeBased;
                }
            }
        }
        if check_options & (options::ENV_COLLISIONS | options::SELF_COLLISIONS) != 0
            && self.in_obstacle(q)
        {
            return CheckCode::Collision;
        }
        CheckCode::Ok
    }

    fn check_segment(
        &mut self,
        q0: &[f64],
        q1: &[f64],
        dq0: &[f64],
        dq1: &[f64],
        elapsed: f64,
        check_options: u32,
        _checked: &mut CheckedConfigurations,
    ) -> CheckCode {
        // Probe the constant-acceleration arc the boundary states imply.
        let steps = 64;
        let mut q = vec![0.0; q0.len()];
        let mut dq = vec![0.0; q0.len()];
        for k in 0..=steps {
            let u = elapsed * k as f64 / steps as f64;
            for i in 0..q0.len() {
                if elapsed > 1e-12 {
                    let a = (dq1[i] - dq0[i]) / elapsed;
                    q[i] = q0[i] + u * (dq0[i] + 0.5 * a * u);
                    dq[i] = dq0[i] + a * u;
                } else {
                    q[i] = q0[i];
                    dq[i] = dq0[i];
                }
            }
            let code = self.check_config(&q, &dq, check_options);
            if code != CheckCode::Ok {
                return code;
            }
        }
        CheckCode::Ok
    }

    fn set_state(&mut self, q: &[f64]) -> bool {
        self.set_state_calls += 1;
        self.state.copy_from_slice(q);
        true
    }

    fn get_state(&mut self, q: &mut [f64]) {
        q.copy_from_slice(&self.state);
    }

    fn neigh_state(&mut self, q: &mut [f64], delta: &[f64]) -> bool {
        let step: f64 = delta.iter().map(|d| d * d).sum::<f64>().sqrt();
        for i in 0..q.len() {
            q[i] += delta[i];
        }
        if let Some((threshold, offset)) = &self.neigh_bend {
            if step > *threshold {
                for i in 0..q.len() {
                    q[i] += offset[i];
                }
            }
        }
        true
    }
}

/// Scripted failure modes for exercising rejection paths.
pub struct RejectingChecker {
    config_code: CheckCode,
    segment_code: CheckCode,
    state_setting_ok: bool,
    state: Vec<f64>,
}

impl RejectingChecker {
    pub fn collides_everywhere() -> Self {
        Self {
            config_code: CheckCode::Ok,
            segment_code: CheckCode::Collision,
            state_setting_ok: true,
            state: Vec::new(),
        }
    }

    pub fn time_based_on_segments() -> Self {
        Self {
            config_code: CheckCode::Ok,
            segment_code: CheckCode::TimeBased,
            state_setting_ok: true,
            state: Vec::new(),
        }
    }

    pub fn infeasible_configs() -> Self {
        Self {
            config_code: CheckCode::ConfigInfeasible,
            segment_code: CheckCode::ConfigInfeasible,
            state_setting_ok: true,
            state: Vec::new(),
        }
    }

    pub fn state_setting_fails() -> Self {
        Self {
            config_code: CheckCode::Ok,
            segment_code: CheckCode::Ok,
            state_setting_ok: false,
            state: Vec::new(),
        }
    }
}

impl ConstraintChecker for RejectingChecker {
    fn check_config(&mut self, _q: &[f64], _dq: &[f64], _check_options: u32) -> CheckCode {
        self.config_code
    }

    fn check_segment(
        &mut self,
        _q0: &[f64],
        _q1: &[f64],
        _dq0: &[f64],
        _dq1: &[f64],
        _elapsed: f64,
        _check_options: u32,
        _checked: &mut CheckedConfigurations,
    ) -> CheckCode {
        self.segment_code
    }

    fn set_state(&mut self, q: &[f64]) -> bool {
        if self.state_setting_ok {
            self.state = q.to_vec();
        }
        self.state_setting_ok
    }

    fn get_state(&mut self, q: &mut [f64]) {
        if self.state.len() == q.len() {
            q.copy_from_slice(&self.state);
        }
    }

    fn neigh_state(&mut self, _q: &mut [f64], _delta: &[f64]) -> bool {
        true
    }
}

/// Workspace-speed/acceleration checker with an identity Jacobian: the
/// "manipulator" speed is the Euclidean joint-velocity norm and the
/// acceleration the Euclidean joint-acceleration norm.
pub struct IdentityManipChecker {
    pub max_speed: f64,
    pub max_accel: f64,
}

impl IdentityManipChecker {
    pub fn new(max_speed: f64, max_accel: f64) -> Self {
        Self {
            max_speed,
            max_accel,
        }
    }
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

impl ManipChecker for IdentityManipChecker {
    fn check_segments(&mut self, segments: &[Segment], use_reduction_factors: bool) -> CheckReturn {
        let mut max_speed = 0.0f64;
        let mut max_accel = 0.0f64;
        for seg in segments {
            max_speed = max_speed.max(norm(seg.v0())).max(norm(seg.v1()));
            max_accel = max_accel.max(norm(seg.accel()));
        }

        let speed_bad = self.max_speed > 0.0 && max_speed > self.max_speed;
        let accel_bad = self.max_accel > 0.0 && max_accel > self.max_accel;
        if !speed_bad && !accel_bad {
            return CheckReturn::ok();
        }

        let mut mult = 1.0f64;
        if speed_bad {
            mult = mult.min(self.max_speed / max_speed);
        }
        if accel_bad {
            mult = mult.min((self.max_accel / max_accel).sqrt());
        }
        let mut ret = CheckReturn::time_based(mult.clamp(0.01, 0.99));
        ret.max_manip_speed = max_speed;
        ret.max_manip_accel = max_accel;
        if use_reduction_factors {
            let factor = if accel_bad {
                self.max_accel / max_accel
            } else {
                self.max_speed / max_speed
            };
            let dof = segments.first().map(|s| s.dof()).unwrap_or(0);
            ret.reduction_factors = vec![factor.clamp(0.05, 0.99); dof];
        }
        ret
    }

    fn max_vel_accel_estimate(
        &mut self,
        dq: &[f64],
        vel_limits: &mut [f64],
        accel_limits: &mut [f64],
    ) {
        let speed = norm(dq);
        if self.max_speed > 0.0 && speed > self.max_speed {
            let scale = self.max_speed / speed;
            for v in vel_limits.iter_mut() {
                *v *= scale;
            }
            for a in accel_limits.iter_mut() {
                *a *= scale;
            }
        }
    }
}
