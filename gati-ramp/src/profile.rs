//! One-dimensional parabolic motion profiles.
//!
//! A [`Profile`] is a sequence of constant-acceleration phases for a single
//! degree of freedom. The two solvers here answer the two boundary-value
//! questions the rest of the crate is built on: the fastest profile between
//! two states, and a profile of an exactly prescribed duration.

use crate::RAMP_EPSILON;

/// One constant-acceleration phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Phase {
    /// Position at phase start.
    pub x0: f64,
    /// Velocity at phase start.
    pub v0: f64,
    /// Constant acceleration over the phase.
    pub accel: f64,
    /// Phase duration in seconds (>= 0).
    pub duration: f64,
}

impl Phase {
    /// Position at local time `t` in `[0, duration]`.
    #[inline]
    pub fn pos_at(&self, t: f64) -> f64 {
        self.x0 + t * (self.v0 + 0.5 * self.accel * t)
    }

    /// Velocity at local time `t`.
    #[inline]
    pub fn vel_at(&self, t: f64) -> f64 {
        self.v0 + self.accel * t
    }

    /// Position at phase end.
    #[inline]
    pub fn x1(&self) -> f64 {
        self.pos_at(self.duration)
    }

    /// Velocity at phase end.
    #[inline]
    pub fn v1(&self) -> f64 {
        self.vel_at(self.duration)
    }

    /// Extremal position over the phase (checks the interior stationary
    /// point when the velocity changes sign).
    pub fn pos_extrema(&self) -> (f64, f64) {
        let mut lo = self.x0.min(self.x1());
        let mut hi = self.x0.max(self.x1());
        if self.accel.abs() > RAMP_EPSILON {
            let tstar = -self.v0 / self.accel;
            if tstar > 0.0 && tstar < self.duration {
                let xstar = self.pos_at(tstar);
                lo = lo.min(xstar);
                hi = hi.max(xstar);
            }
        }
        (lo, hi)
    }
}

/// A piecewise-parabolic 1-DOF trajectory.
#[derive(Debug, Clone, Default)]
pub struct Profile {
    /// Phases in time order. Adjacent phases are continuous in position and
    /// velocity by construction.
    pub phases: Vec<Phase>,
}

impl Profile {
    /// Total duration.
    pub fn duration(&self) -> f64 {
        self.phases.iter().map(|p| p.duration).sum()
    }

    /// Initial position.
    pub fn x0(&self) -> f64 {
        self.phases.first().map(|p| p.x0).unwrap_or(0.0)
    }

    /// Initial velocity.
    pub fn v0(&self) -> f64 {
        self.phases.first().map(|p| p.v0).unwrap_or(0.0)
    }

    /// Final position.
    pub fn x1(&self) -> f64 {
        self.phases.last().map(|p| p.x1()).unwrap_or(0.0)
    }

    /// Final velocity.
    pub fn v1(&self) -> f64 {
        self.phases.last().map(|p| p.v1()).unwrap_or(0.0)
    }

    /// Position at absolute time `t` (saturating at the endpoints).
    pub fn pos_at(&self, t: f64) -> f64 {
        let mut rem = t.max(0.0);
        for phase in &self.phases {
            if rem <= phase.duration {
                return phase.pos_at(rem);
            }
            rem -= phase.duration;
        }
        self.x1()
    }

    /// Velocity at absolute time `t` (saturating at the endpoints).
    pub fn vel_at(&self, t: f64) -> f64 {
        let mut rem = t.max(0.0);
        for phase in &self.phases {
            if rem <= phase.duration {
                return phase.vel_at(rem);
            }
            rem -= phase.duration;
        }
        self.v1()
    }

    /// Position range swept by the whole profile.
    pub fn pos_extrema(&self) -> (f64, f64) {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for phase in &self.phases {
            let (plo, phi) = phase.pos_extrema();
            lo = lo.min(plo);
            hi = hi.max(phi);
        }
        if self.phases.is_empty() {
            (0.0, 0.0)
        } else {
            (lo, hi)
        }
    }

    /// True if every swept position stays inside `[x_lower - tol, x_upper + tol]`.
    pub fn within_position_bounds(&self, x_lower: f64, x_upper: f64) -> bool {
        let (lo, hi) = self.pos_extrema();
        lo >= x_lower - RAMP_EPSILON && hi <= x_upper + RAMP_EPSILON
    }

    /// Cumulative phase switch times, starting at 0 and ending at the total
    /// duration.
    pub fn switch_times(&self, out: &mut Vec<f64>) {
        out.clear();
        out.push(0.0);
        let mut t = 0.0;
        for phase in &self.phases {
            t += phase.duration;
            out.push(t);
        }
    }

    fn single(x0: f64, v0: f64, accel: f64, duration: f64) -> Self {
        Self {
            phases: vec![Phase {
                x0,
                v0,
                accel,
                duration,
            }],
        }
    }
}

/// Fastest profile from `(x0, v0)` to `(x1, v1)` under `v_max` and `a_max`.
///
/// Returns `None` when the boundary velocities already violate `v_max` or the
/// boundary states are inconsistent with any parabolic connection.
pub fn min_time(x0: f64, x1: f64, v0: f64, v1: f64, v_max: f64, a_max: f64) -> Option<Profile> {
    if v_max <= 0.0 || a_max <= 0.0 {
        return None;
    }
    if v0.abs() > v_max + RAMP_EPSILON || v1.abs() > v_max + RAMP_EPSILON {
        return None;
    }

    let d = x1 - x0;
    if d.abs() <= RAMP_EPSILON && (v1 - v0).abs() <= RAMP_EPSILON {
        return Some(Profile::single(x0, v0, 0.0, 0.0));
    }

    // Try both acceleration orderings (up-down and down-up) and keep the
    // faster valid one.
    let mut best: Option<Profile> = None;
    for sigma in [1.0f64, -1.0] {
        if let Some(profile) = min_time_directed(x0, d, v0, v1, v_max, a_max, sigma) {
            let better = match &best {
                Some(b) => profile.duration() < b.duration(),
                None => true,
            };
            if better {
                best = Some(profile);
            }
        }
    }
    best
}

/// One directed candidate for [`min_time`]: accelerate with `sigma * a_max`,
/// optionally cruise at `sigma * v_max`, then decelerate.
fn min_time_directed(
    x0: f64,
    d: f64,
    v0: f64,
    v1: f64,
    v_max: f64,
    a_max: f64,
    sigma: f64,
) -> Option<Profile> {
    let a = sigma * a_max;
    // Peak velocity of the two-phase candidate.
    let vp_sq = sigma * a_max * d + 0.5 * (v0 * v0 + v1 * v1);
    if vp_sq < 0.0 {
        return None;
    }
    let vp = sigma * vp_sq.sqrt();

    let t1 = (vp - v0) / a;
    let t2 = (vp - v1) / a;
    if t1 < -RAMP_EPSILON || t2 < -RAMP_EPSILON {
        return None;
    }

    if vp.abs() <= v_max + RAMP_EPSILON {
        let t1 = t1.max(0.0);
        let t2 = t2.max(0.0);
        let mut phases = Vec::with_capacity(2);
        if t1 > 0.0 {
            phases.push(Phase {
                x0,
                v0,
                accel: a,
                duration: t1,
            });
        }
        let xm = x0 + t1 * (v0 + 0.5 * a * t1);
        if t2 > 0.0 || phases.is_empty() {
            phases.push(Phase {
                x0: xm,
                v0: vp,
                accel: -a,
                duration: t2.max(0.0),
            });
        }
        return Some(Profile { phases });
    }

    // Velocity saturates: insert a cruise phase at sigma * v_max.
    let vc = sigma * v_max;
    let t1 = (vc - v0) / a;
    let t3 = (vc - v1) / a;
    if t1 < -RAMP_EPSILON || t3 < -RAMP_EPSILON {
        return None;
    }
    let d_acc = (vc * vc - v0 * v0) / (2.0 * a);
    let d_dec = (vc * vc - v1 * v1) / (2.0 * a);
    let d_cruise = d - d_acc - d_dec;
    let t2 = d_cruise / vc;
    if t2 < -RAMP_EPSILON {
        return None;
    }

    let t1 = t1.max(0.0);
    let t2 = t2.max(0.0);
    let t3 = t3.max(0.0);
    let x_after1 = x0 + t1 * (v0 + 0.5 * a * t1);
    let x_after2 = x_after1 + vc * t2;
    Some(Profile {
        phases: vec![
            Phase {
                x0,
                v0,
                accel: a,
                duration: t1,
            },
            Phase {
                x0: x_after1,
                v0: vc,
                accel: 0.0,
                duration: t2,
            },
            Phase {
                x0: x_after2,
                v0: vc,
                accel: -a,
                duration: t3,
            },
        ],
    })
}

/// Profile from `(x0, v0)` to `(x1, v1)` taking exactly `duration` seconds.
///
/// Solves the minimum-acceleration two-phase profile; when its peak velocity
/// exceeds `v_max` the profile saturates into three phases with a cruise at
/// the limit. Returns `None` when no profile with `|a| <= a_max` and
/// `|v| <= v_max` achieves the duration.
pub fn fixed_duration(
    x0: f64,
    x1: f64,
    v0: f64,
    v1: f64,
    duration: f64,
    v_max: f64,
    a_max: f64,
) -> Option<Profile> {
    if v_max <= 0.0 || a_max <= 0.0 || duration < 0.0 {
        return None;
    }
    if v0.abs() > v_max + RAMP_EPSILON || v1.abs() > v_max + RAMP_EPSILON {
        return None;
    }

    let d = x1 - x0;
    if duration <= RAMP_EPSILON {
        if d.abs() <= RAMP_EPSILON && (v1 - v0).abs() <= RAMP_EPSILON {
            return Some(Profile::single(x0, v0, 0.0, 0.0));
        }
        return None;
    }

    // Straight cruise: already consistent with a single constant-velocity
    // (or constant-acceleration) phase.
    let dv = v1 - v0;
    if (d - 0.5 * (v0 + v1) * duration).abs() <= RAMP_EPSILON {
        let a = dv / duration;
        if a.abs() <= a_max + RAMP_EPSILON {
            let profile = Profile::single(x0, v0, a, duration);
            if profile.vel_at(0.0).abs() <= v_max + RAMP_EPSILON {
                return Some(profile);
            }
        }
    }

    // Two-phase solution with accelerations (a, -a): switch time ts solves
    //   dv*ts^2 + 2*(dxr - dv*T)*ts + (dv*T^2/2 - dxr*T) = 0
    // where dxr = d - v0*T.
    let t_total = duration;
    let dxr = d - v0 * t_total;
    let mut candidates: [Option<f64>; 2] = [None, None];
    if dv.abs() <= RAMP_EPSILON {
        candidates[0] = Some(0.5 * t_total);
    } else {
        let qa = dv;
        let qb = 2.0 * (dxr - dv * t_total);
        let qc = dv * t_total * t_total * 0.5 - dxr * t_total;
        let disc = qb * qb - 4.0 * qa * qc;
        if disc >= 0.0 {
            let sq = disc.sqrt();
            candidates[0] = Some((-qb + sq) / (2.0 * qa));
            candidates[1] = Some((-qb - sq) / (2.0 * qa));
        }
    }

    for ts in candidates.into_iter().flatten() {
        if !(-RAMP_EPSILON..=t_total + RAMP_EPSILON).contains(&ts) {
            continue;
        }
        let ts = ts.clamp(0.0, t_total);
        let a = if dv.abs() <= RAMP_EPSILON {
            if ts.abs() <= RAMP_EPSILON || (t_total - ts).abs() <= RAMP_EPSILON {
                continue;
            }
            // dv == 0 pins the switch to T/2 and the acceleration follows
            // from the displacement residue alone.
            4.0 * dxr / (t_total * t_total)
        } else if (2.0 * ts - t_total).abs() <= RAMP_EPSILON {
            continue;
        } else {
            dv / (2.0 * ts - t_total)
        };
        if a.abs() > a_max + RAMP_EPSILON {
            continue;
        }
        let vp = v0 + a * ts;
        if vp.abs() <= v_max + RAMP_EPSILON {
            let mut phases = Vec::with_capacity(2);
            if ts > RAMP_EPSILON {
                phases.push(Phase {
                    x0,
                    v0,
                    accel: a,
                    duration: ts,
                });
            }
            let xm = x0 + ts * (v0 + 0.5 * a * ts);
            if t_total - ts > RAMP_EPSILON || phases.is_empty() {
                phases.push(Phase {
                    x0: xm,
                    v0: vp,
                    accel: -a,
                    duration: (t_total - ts).max(0.0),
                });
            }
            return Some(Profile { phases });
        }
        // Peak exceeds the velocity limit: saturate with a cruise.
        if let Some(profile) = fixed_duration_saturated(x0, d, v0, v1, t_total, v_max, a_max, vp.signum()) {
            return Some(profile);
        }
    }

    // The quadratic had no usable root; a saturated profile may still exist
    // in either direction.
    for sigma in [1.0f64, -1.0] {
        if let Some(profile) = fixed_duration_saturated(x0, d, v0, v1, t_total, v_max, a_max, sigma) {
            return Some(profile);
        }
    }
    None
}

/// Three-phase fixed-duration profile cruising at `sigma * v_max`.
#[allow(clippy::too_many_arguments)]
fn fixed_duration_saturated(
    x0: f64,
    d: f64,
    v0: f64,
    v1: f64,
    t_total: f64,
    v_max: f64,
    a_max: f64,
    sigma: f64,
) -> Option<Profile> {
    let vc = sigma * v_max;
    let denom = vc * t_total - d;
    if denom.abs() <= RAMP_EPSILON {
        return None;
    }
    // Phase-one acceleration driving v0 toward the cruise velocity; the sign
    // falls out of the displacement residue.
    let a = ((vc - v0).powi(2) + (vc - v1).powi(2)) / (2.0 * denom);
    if a.abs() <= RAMP_EPSILON || a.abs() > a_max + RAMP_EPSILON {
        return None;
    }
    let t1 = (vc - v0) / a;
    let t3 = (vc - v1) / a;
    if t1 < -RAMP_EPSILON || t3 < -RAMP_EPSILON {
        return None;
    }
    let t1 = t1.max(0.0);
    let t3 = t3.max(0.0);
    let t2 = t_total - t1 - t3;
    if t2 < -RAMP_EPSILON {
        return None;
    }
    let t2 = t2.max(0.0);
    let x_after1 = x0 + t1 * (v0 + 0.5 * a * t1);
    let x_after2 = x_after1 + vc * t2;
    Some(Profile {
        phases: vec![
            Phase {
                x0,
                v0,
                accel: a,
                duration: t1,
            },
            Phase {
                x0: x_after1,
                v0: vc,
                accel: 0.0,
                duration: t2,
            },
            Phase {
                x0: x_after2,
                v0: vc,
                accel: -a,
                duration: t3,
            },
        ],
    })
}

/// Fastest rest-to-rest profile over a displacement `d` (bang-bang, with a
/// cruise when the distance is long enough to reach `v_max`).
pub fn min_time_zero_vel(x0: f64, d: f64, v_max: f64, a_max: f64) -> Profile {
    if d.abs() <= RAMP_EPSILON {
        return Profile::single(x0, 0.0, 0.0, 0.0);
    }
    let sigma = d.signum();
    let a = sigma * a_max;
    let d_abs = d.abs();
    let d_to_vmax = v_max * v_max / a_max;
    if d_abs <= d_to_vmax {
        // Triangular: never reaches v_max.
        let t_half = (d_abs / a_max).sqrt();
        let vp = a * t_half;
        let xm = x0 + 0.5 * a * t_half * t_half;
        Profile {
            phases: vec![
                Phase {
                    x0,
                    v0: 0.0,
                    accel: a,
                    duration: t_half,
                },
                Phase {
                    x0: xm,
                    v0: vp,
                    accel: -a,
                    duration: t_half,
                },
            ],
        }
    } else {
        let t_ramp = v_max / a_max;
        let d_cruise = d_abs - d_to_vmax;
        let t_cruise = d_cruise / v_max;
        let vc = sigma * v_max;
        let x_after1 = x0 + 0.5 * a * t_ramp * t_ramp;
        let x_after2 = x_after1 + vc * t_cruise;
        Profile {
            phases: vec![
                Phase {
                    x0,
                    v0: 0.0,
                    accel: a,
                    duration: t_ramp,
                },
                Phase {
                    x0: x_after1,
                    v0: vc,
                    accel: 0.0,
                    duration: t_cruise,
                },
                Phase {
                    x0: x_after2,
                    v0: vc,
                    accel: -a,
                    duration: t_ramp,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_boundary(profile: &Profile, x1: f64, v1: f64) {
        assert!(
            (profile.x1() - x1).abs() < 1e-8,
            "final position {} != {}",
            profile.x1(),
            x1
        );
        assert!(
            (profile.v1() - v1).abs() < 1e-8,
            "final velocity {} != {}",
            profile.v1(),
            v1
        );
    }

    #[test]
    fn test_min_time_rest_to_rest_bang_bang() {
        // Unit move with v_max = a_max = 1: accelerate 1 s, decelerate 1 s.
        let profile = min_time(0.0, 1.0, 0.0, 0.0, 1.0, 1.0).unwrap();
        assert!((profile.duration() - 2.0).abs() < 1e-10);
        assert_boundary(&profile, 1.0, 0.0);
    }

    #[test]
    fn test_min_time_long_move_cruises() {
        let profile = min_time(0.0, 10.0, 0.0, 0.0, 1.0, 1.0).unwrap();
        // 1 s up, 9 s cruise, 1 s down.
        assert!((profile.duration() - 11.0).abs() < 1e-9);
        assert_boundary(&profile, 10.0, 0.0);
        let (_, hi) = profile.pos_extrema();
        assert!(hi <= 10.0 + 1e-9);
    }

    #[test]
    fn test_min_time_negative_direction() {
        let profile = min_time(2.0, -1.0, 0.0, 0.0, 2.0, 4.0).unwrap();
        assert_boundary(&profile, -1.0, 0.0);
        for phase in &profile.phases {
            assert!(phase.vel_at(phase.duration * 0.5) <= 1e-12);
        }
    }

    #[test]
    fn test_min_time_nonzero_boundary_velocities() {
        let profile = min_time(0.0, 1.0, 0.5, -0.25, 1.0, 2.0).unwrap();
        assert_boundary(&profile, 1.0, -0.25);
        for phase in &profile.phases {
            assert!(phase.accel.abs() <= 2.0 + 1e-9);
            assert!(phase.v0.abs() <= 1.0 + 1e-9);
            assert!(phase.v1().abs() <= 1.0 + 1e-9);
        }
    }

    #[test]
    fn test_min_time_rejects_fast_boundary() {
        assert!(min_time(0.0, 1.0, 2.0, 0.0, 1.0, 1.0).is_none());
    }

    #[test]
    fn test_fixed_duration_matches_min_time() {
        let fastest = min_time(0.0, 1.0, 0.0, 0.0, 1.0, 1.0).unwrap();
        let profile = fixed_duration(0.0, 1.0, 0.0, 0.0, fastest.duration(), 1.0, 1.0).unwrap();
        assert!((profile.duration() - fastest.duration()).abs() < 1e-9);
        assert_boundary(&profile, 1.0, 0.0);
    }

    #[test]
    fn test_fixed_duration_stretch_lowers_accel() {
        let profile = fixed_duration(0.0, 1.0, 0.0, 0.0, 4.0, 1.0, 1.0).unwrap();
        assert!((profile.duration() - 4.0).abs() < 1e-9);
        assert_boundary(&profile, 1.0, 0.0);
        for phase in &profile.phases {
            // Stretching a 2 s bang-bang to 4 s quarters the acceleration.
            assert!(phase.accel.abs() < 0.5 + 1e-9);
        }
    }

    #[test]
    fn test_fixed_duration_constant_velocity() {
        let profile = fixed_duration(0.0, 2.0, 1.0, 1.0, 2.0, 1.5, 1.0).unwrap();
        assert!((profile.duration() - 2.0).abs() < 1e-12);
        assert_boundary(&profile, 2.0, 1.0);
    }

    #[test]
    fn test_fixed_duration_nonzero_boundaries() {
        let fastest = min_time(0.0, 0.7, 0.4, -0.2, 1.0, 2.0).unwrap();
        let t = fastest.duration() * 1.5;
        let profile = fixed_duration(0.0, 0.7, 0.4, -0.2, t, 1.0, 2.0).unwrap();
        assert!((profile.duration() - t).abs() < 1e-9);
        assert_boundary(&profile, 0.7, -0.2);
    }

    #[test]
    fn test_fixed_duration_too_short_fails() {
        let fastest = min_time(0.0, 1.0, 0.0, 0.0, 1.0, 1.0).unwrap();
        assert!(fixed_duration(0.0, 1.0, 0.0, 0.0, fastest.duration() * 0.5, 1.0, 1.0).is_none());
    }

    #[test]
    fn test_zero_displacement() {
        let profile = min_time(3.0, 3.0, 0.0, 0.0, 1.0, 1.0).unwrap();
        assert!(profile.duration() <= RAMP_EPSILON);
        assert_boundary(&profile, 3.0, 0.0);
    }

    #[test]
    fn test_min_time_zero_vel_triangle() {
        let profile = min_time_zero_vel(0.0, 0.5, 1.0, 1.0);
        assert_boundary(&profile, 0.5, 0.0);
        // Peak velocity sqrt(a * d) = sqrt(0.5) stays under the limit.
        let peak = profile.vel_at(profile.duration() * 0.5);
        assert!(peak < 1.0);
    }

    #[test]
    fn test_profile_sampling_continuity() {
        let profile = min_time(0.0, 1.0, 0.3, 0.0, 1.0, 1.0).unwrap();
        let t = profile.duration();
        let mut prev_x = profile.pos_at(0.0);
        let steps = 200;
        for i in 1..=steps {
            let x = profile.pos_at(t * i as f64 / steps as f64);
            assert!((x - prev_x).abs() < 0.05);
            prev_x = x;
        }
    }
}
