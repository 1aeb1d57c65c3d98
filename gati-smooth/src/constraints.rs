//! Capability interfaces to the host environment.
//!
//! The planner never talks to a robot directly: collision checking, state
//! synchronization, workspace constraint evaluation, randomness and progress
//! reporting are injected through the traits here. Everything is
//! single-threaded; the host serializes calls with its own environment lock.

use gati_ramp::Segment;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Option bits selecting which checks a feasibility call runs.
pub mod options {
    /// Check collisions against the environment.
    pub const ENV_COLLISIONS: u32 = 0x1;
    /// Check self collisions.
    pub const SELF_COLLISIONS: u32 = 0x2;
    /// Check time-based (velocity/acceleration/torque-like) constraints.
    pub const TIME_BASED: u32 = 0x4;
    /// Re-check with small perturbations of the configuration.
    pub const PERTURBATION: u32 = 0x8;
    /// Ask the checker to report the configurations it actually probed.
    pub const FILL_CHECKED: u32 = 0x10;

    /// Everything.
    pub const ALL: u32 = 0xffff;
    /// A segment that passed these checks needs no re-validation.
    pub const FULLY_CHECKED_MASK: u32 = ENV_COLLISIONS | SELF_COLLISIONS | TIME_BASED;
}

/// Outcome category of a feasibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckCode {
    /// All requested checks passed.
    #[default]
    Ok,
    /// The probed configuration violates hard constraints (joint limits,
    /// user constraints).
    ConfigInfeasible,
    /// Collision with the environment or self.
    Collision,
    /// A time-based constraint (velocity, acceleration, torque, workspace
    /// speed) was surpassed; slowing down may help.
    TimeBased,
    /// The host could not set the robot state.
    StateSetting,
    /// After checker-side modification the segment no longer reaches its
    /// requested final position.
    FinalValuesNotReached,
    /// Any other failure reported by the host.
    Generic,
}

impl CheckCode {
    /// True when this code aborts an attempt without carrying a slowdown
    /// signal.
    #[inline]
    pub fn is_hard_failure(self) -> bool {
        !matches!(self, CheckCode::Ok | CheckCode::TimeBased)
    }
}

/// Tagged result of a feasibility check.
#[derive(Debug, Clone)]
pub struct CheckReturn {
    pub code: CheckCode,
    /// Suggested multiplicative limit reduction in (0, 1], meaningful when
    /// `code == TimeBased`.
    pub time_based_surpass_mult: f64,
    /// Largest workspace speed observed by the manipulator checker.
    pub max_manip_speed: f64,
    /// Largest workspace acceleration observed by the manipulator checker.
    pub max_manip_accel: f64,
    /// Per-DOF limit reduction factors from the manipulator checker; empty
    /// when unavailable.
    pub reduction_factors: Vec<f64>,
    /// Checker-side modification changed the final velocity of the segment.
    pub different_velocity: bool,
}

impl CheckReturn {
    pub fn ok() -> Self {
        Self::with_code(CheckCode::Ok)
    }

    pub fn with_code(code: CheckCode) -> Self {
        Self {
            code,
            time_based_surpass_mult: 1.0,
            max_manip_speed: 0.0,
            max_manip_accel: 0.0,
            reduction_factors: Vec::new(),
            different_velocity: false,
        }
    }

    pub fn time_based(mult: f64) -> Self {
        Self {
            code: CheckCode::TimeBased,
            time_based_surpass_mult: mult,
            ..Self::with_code(CheckCode::TimeBased)
        }
    }
}

/// Configurations the checker actually probed, reported back when
/// [`options::FILL_CHECKED`] is set and checker-side modification is active.
///
/// Stored flat to keep the hot path allocation-free: `configurations` holds
/// `times.len() * dof` values.
#[derive(Debug, Clone, Default)]
pub struct CheckedConfigurations {
    pub configurations: Vec<f64>,
    pub times: Vec<f64>,
}

impl CheckedConfigurations {
    pub fn clear(&mut self) {
        self.configurations.clear();
        self.times.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// External configuration/path constraint backend (kinematics, collision,
/// user constraints).
///
/// Checkers may mutate host robot state as a side effect; the planner
/// restores state through [`ConstraintChecker::get_state`] /
/// [`ConstraintChecker::set_state`] around the whole plan.
pub trait ConstraintChecker {
    /// Check a single configuration with velocity `dq`.
    fn check_config(&mut self, q: &[f64], dq: &[f64], check_options: u32) -> CheckCode;

    /// Check the straight probe from `(q0, dq0)` to `(q1, dq1)` taking
    /// `elapsed` seconds. When checker-side modification is active and
    /// [`options::FILL_CHECKED`] is set, the probed (possibly projected)
    /// configurations are written into `checked`.
    #[allow(clippy::too_many_arguments)]
    fn check_segment(
        &mut self,
        q0: &[f64],
        q1: &[f64],
        dq0: &[f64],
        dq1: &[f64],
        elapsed: f64,
        check_options: u32,
        checked: &mut CheckedConfigurations,
    ) -> CheckCode;

    /// Set the host robot state. Returns false on failure.
    fn set_state(&mut self, q: &[f64]) -> bool;

    /// Read the host robot state into `q`.
    fn get_state(&mut self, q: &mut [f64]);

    /// Project a step `delta` from `q` onto the constraint manifold,
    /// writing the resulting state into `q`. Returns false on failure.
    fn neigh_state(&mut self, q: &mut [f64], delta: &[f64]) -> bool;
}

/// External workspace (manipulator) constraint evaluator.
pub trait ManipChecker {
    /// Check workspace speed/acceleration over a segment chain. On a
    /// time-based failure the return carries the observed maxima, a surpass
    /// multiplier and (optionally) per-DOF reduction factors.
    fn check_segments(&mut self, segments: &[Segment], use_reduction_factors: bool) -> CheckReturn;

    /// Tighten `vel_limits`/`accel_limits` to estimates consistent with the
    /// workspace caps at the current robot state moving with `dq`.
    fn max_vel_accel_estimate(&mut self, dq: &[f64], vel_limits: &mut [f64], accel_limits: &mut [f64]);
}

/// Reborrow an `Option<&mut dyn ManipChecker>` for a narrower lifetime.
///
/// Equivalent to `m.as_deref_mut()`, spelled out explicitly: repeatedly
/// calling `.as_deref_mut()` on the same binding (e.g. once per loop
/// iteration) runs into a rustc lifetime-inference limitation with
/// `Option<&mut dyn Trait>` bindings that this form avoids.
pub(crate) fn reborrow_manip<'a>(
    m: &'a mut Option<&mut dyn ManipChecker>,
) -> Option<&'a mut dyn ManipChecker> {
    match m {
        Some(r) => Some(&mut **r),
        None => None,
    }
}

/// Uniform random source used for shortcut sampling.
pub trait UniformSource {
    /// Uniform real in (0, 1).
    fn sample01(&mut self) -> f64;

    /// Uniform 32-bit integer.
    fn sample_u32(&mut self) -> u32;
}

/// Deterministically seeded uniform source backed by [`StdRng`].
pub struct SeededUniform {
    rng: StdRng,
}

impl SeededUniform {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl UniformSource for SeededUniform {
    fn sample01(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn sample_u32(&mut self) -> u32 {
        self.rng.gen::<u32>()
    }
}

/// Decision returned by a progress sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressAction {
    Continue,
    Interrupt,
}

/// Cooperative progress/interruption hook, invoked at iteration boundaries.
pub trait ProgressSink {
    fn on_progress(&mut self, iteration: u64) -> ProgressAction;
}

/// Progress sink that never interrupts.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn on_progress(&mut self, _iteration: u64) -> ProgressAction {
        ProgressAction::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_uniform_is_deterministic() {
        let mut a = SeededUniform::new(7);
        let mut b = SeededUniform::new(7);
        for _ in 0..32 {
            assert_eq!(a.sample01().to_bits(), b.sample01().to_bits());
        }
        assert_eq!(a.sample_u32(), b.sample_u32());
    }

    #[test]
    fn test_sample01_in_unit_interval() {
        let mut s = SeededUniform::new(42);
        for _ in 0..1000 {
            let x = s.sample01();
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn test_check_code_hardness() {
        assert!(!CheckCode::Ok.is_hard_failure());
        assert!(!CheckCode::TimeBased.is_hard_failure());
        assert!(CheckCode::Collision.is_hard_failure());
        assert!(CheckCode::StateSetting.is_hard_failure());
    }
}
