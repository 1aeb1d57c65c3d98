//! The shortcut optimization loop.
//!
//! Samples time windows on the current path, re-interpolates them with the
//! full boundary velocities, and commits every strictly shorter,
//! constraint-feasible bridge. Time-based failures drive an adaptive
//! slowdown search over per-attempt velocity/acceleration limits.

use gati_ramp::{total_duration, Interpolator, ParabolicPath, Segment};

use crate::config::SmootherConfig;
use crate::constraints::{
    options, reborrow_manip, CheckCode, ConstraintChecker, ManipChecker, ProgressAction,
    ProgressSink, UniformSource,
};
use crate::initializer::StopRegistry;
use crate::pipeline::FeasibilityPipeline;
use crate::progress::{PlanStats, ShortcutStatus};

/// Probability of sampling the window around a remaining forced stop.
const SPECIAL_SHORTCUT_WEIGHT: f64 = 0.1;
/// Half-width cap (seconds) of windows sampled around a forced stop.
const SPECIAL_SHORTCUT_CUTOFF_TIME: f64 = 0.75;
/// Limit reductions attempted within one window before giving up.
const MAX_SLOWDOWN_TRIES: usize = 100;
/// Floor for the accumulated velocity multiplier.
const MIN_VEL_MULT: f64 = 0.01;
/// Floor for the accumulated acceleration multiplier.
const MIN_ACCEL_MULT: f64 = 0.0001;
/// Attempts are abandoned when progress stalls: score ratio cutoff.
const SCORE_CUTOFF_RATIO: f64 = 1e-3;
/// Largest per-axis size of the visited-pair grid; beyond it the cache is
/// disabled for the run.
const MAX_DISCRETIZATION: usize = 0x8000;

/// Collaborators threaded through one planning call.
pub(crate) struct PlanDeps<'a> {
    pub interpolator: &'a mut Interpolator,
    pub pipeline: &'a mut FeasibilityPipeline,
    pub checker: &'a mut dyn ConstraintChecker,
    pub manip: Option<&'a mut dyn ManipChecker>,
    pub progress: &'a mut dyn ProgressSink,
    pub rng: &'a mut dyn UniformSource,
    pub iteration: &'a mut u64,
    pub stats: &'a mut PlanStats,
}

/// Result of one window attempt.
pub(crate) enum Attempt {
    /// The accepted bridge is in [`Shortcutter::accepted`].
    Accepted {
        cur_vel_mult: f64,
        cur_accel_mult: f64,
    },
    Rejected(ShortcutStatus),
    Interrupted,
}

/// Result of a whole optimization run.
pub(crate) struct RunOutcome {
    pub commits: usize,
    pub interrupted: bool,
}

/// The shortcut engine. One instance per smoother; scratch buffers are
/// reused across iterations and runs.
pub(crate) struct Shortcutter {
    ndof: usize,
    x_lower: Vec<f64>,
    x_upper: Vec<f64>,
    vel_max: Vec<f64>,
    accel_max: Vec<f64>,
    has_manip: bool,
    use_reduction_factors: bool,
    max_manip_speed: f64,
    max_manip_accel: f64,
    min_time_step: f64,
    inv_search_mult: f64,

    // Multipliers carried across iterations: track the most recent
    // successful scaling so later attempts start near it.
    start_vel_mult: f64,
    start_accel_mult: f64,
    num_slow_downs: usize,
    time_based_failures: usize,

    // Scratch
    x0: Vec<f64>,
    x1: Vec<f64>,
    v0: Vec<f64>,
    v1: Vec<f64>,
    vel_limits: Vec<f64>,
    accel_limits: Vec<f64>,
    vel_reduction: Vec<f64>,
    accel_reduction: Vec<f64>,
    candidate: Vec<Segment>,
    pub(crate) accepted: Vec<Segment>,
    tail: Vec<Segment>,
    tail_x0: Vec<f64>,
    tail_v0: Vec<f64>,
    visited: Vec<u8>,
    visited_axis: usize,
}

impl Shortcutter {
    pub fn new(config: &SmootherConfig) -> Self {
        let ndof = config.dof();
        Self {
            ndof,
            x_lower: config.x_lower.clone(),
            x_upper: config.x_upper.clone(),
            vel_max: config.vel_max.clone(),
            accel_max: config.accel_max.clone(),
            has_manip: config.has_manip_constraints(),
            use_reduction_factors: config.use_reduction_factors,
            max_manip_speed: config.max_manip_speed,
            max_manip_accel: config.max_manip_accel,
            min_time_step: 0.99 * config.step_length,
            inv_search_mult: 1.0 / config.search_vel_accel_mult,
            start_vel_mult: 1.0,
            start_accel_mult: 1.0,
            num_slow_downs: 0,
            time_based_failures: 0,
            x0: vec![0.0; ndof],
            x1: vec![0.0; ndof],
            v0: vec![0.0; ndof],
            v1: vec![0.0; ndof],
            vel_limits: vec![0.0; ndof],
            accel_limits: vec![0.0; ndof],
            vel_reduction: vec![1.0; ndof],
            accel_reduction: vec![1.0; ndof],
            candidate: Vec::new(),
            accepted: Vec::new(),
            tail: Vec::new(),
            tail_x0: vec![0.0; ndof],
            tail_v0: vec![0.0; ndof],
            visited: Vec::new(),
            visited_axis: 0,
        }
    }

    /// Smallest useful improvement, derived from the configured step length.
    pub fn min_time_step(&self) -> f64 {
        self.min_time_step
    }

    /// Total limit reductions applied so far.
    pub fn num_slow_downs(&self) -> usize {
        self.num_slow_downs
    }

    /// Reset the per-run multiplier state.
    pub fn reset_run_state(&mut self) {
        self.start_vel_mult = 1.0;
        self.start_accel_mult = 1.0;
        self.time_based_failures = 0;
    }

    /// The randomized shortcut loop.
    pub fn run(
        &mut self,
        path: &mut ParabolicPath,
        stops: &mut StopRegistry,
        max_initial_ramp_time: f64,
        num_iters: usize,
        deps: &mut PlanDeps<'_>,
    ) -> RunOutcome {
        self.reset_run_state();
        let original_duration = path.duration();
        let mut t_total = original_duration;
        let n_cutoff_iters = std::cmp::min(100, num_iters / 2).max(1);

        let mut commits = 0usize;
        let mut iters_from_prev_successful = 0usize;
        let mut best_score = 1.0f64;

        self.visited.clear();
        self.visited_axis = 0;

        for iters in 0..num_iters {
            if t_total < self.min_time_step {
                log::debug!(
                    "remaining duration {:.6e} is too short to keep shortcutting",
                    t_total
                );
                break;
            }
            if iters_from_prev_successful + self.time_based_failures > n_cutoff_iters {
                // No progress in a while; further sampling is unlikely to pay.
                break;
            }
            iters_from_prev_successful += 1;

            if self.visited.is_empty() {
                let axis = (t_total / self.min_time_step) as usize + 1;
                if axis <= MAX_DISCRETIZATION {
                    self.visited.resize(axis * axis, 0);
                    self.visited_axis = axis;
                } else {
                    self.visited_axis = 0;
                }
            }

            // Sample the window.
            let (t0, t1) = if iters == 0 {
                (0.0, t_total)
            } else if (!stops.is_empty() && deps.rng.sample01() <= SPECIAL_SHORTCUT_WEIGHT)
                || num_iters - iters <= stops.len()
            {
                let index = deps.rng.sample_u32() as usize % stops.len();
                let t = stops.times[index];
                let t0 = t - deps.rng.sample01() * SPECIAL_SHORTCUT_CUTOFF_TIME.min(t);
                let t1 = t + deps.rng.sample01() * SPECIAL_SHORTCUT_CUTOFF_TIME.min(t_total - t);
                if num_iters - iters <= stops.len() {
                    // Near the end the multipliers have usually been ground
                    // down; lift them so the remaining stops get a fair try.
                    self.start_vel_mult = self.start_vel_mult.max(0.8);
                    self.start_accel_mult = self.start_accel_mult.max(0.8);
                }
                (t0, t1)
            } else {
                let mut t0 = deps.rng.sample01() * t_total;
                let mut t1 = deps.rng.sample01() * t_total;
                if t0 > t1 {
                    std::mem::swap(&mut t0, &mut t1);
                }
                if t1 - t0 > 2.0 * max_initial_ramp_time {
                    t1 = t0 + 2.0 * max_initial_ramp_time;
                }
                (t0, t1)
            };

            if t1 - t0 < self.min_time_step {
                deps.stats.record(ShortcutStatus::TimeInstantsTooClose);
                continue;
            }

            if self.check_and_mark_visited(t0, t1) {
                deps.stats.record(ShortcutStatus::RedundantShortcut);
                continue;
            }

            match self.attempt_window(t0, t1, path, deps) {
                Attempt::Interrupted => {
                    return RunOutcome {
                        commits,
                        interrupted: true,
                    }
                }
                Attempt::Rejected(status) => {
                    deps.stats.record(status);
                    continue;
                }
                Attempt::Accepted {
                    cur_vel_mult,
                    cur_accel_mult,
                } => {
                    deps.stats.record(ShortcutStatus::Successful);
                    commits += 1;
                    self.visited.clear();

                    let segment_time = total_duration(&self.accepted);
                    let diff = (t1 - t0) - segment_time;
                    stops.commit_window(t0, t1, diff);
                    self.note_success(cur_vel_mult, cur_accel_mult);

                    path.replace_segment(t0, t1, &self.accepted);
                    t_total = path.duration();
                    log::debug!(
                        "shortcut iter {}/{} committed: saved {:.6e} s, duration now {:.6e}",
                        iters,
                        num_iters,
                        diff,
                        t_total
                    );

                    let score = diff / iters_from_prev_successful as f64;
                    if score > best_score {
                        best_score = score;
                    }
                    iters_from_prev_successful = 0;

                    if score / best_score < SCORE_CUTOFF_RATIO && commits > 5 {
                        // Progress per iteration has collapsed.
                        break;
                    }
                }
            }
        }

        log::debug!(
            "shortcutting finished: {} commits, {} slowdowns, duration {:.6e} -> {:.6e}",
            commits,
            self.num_slow_downs,
            original_duration,
            path.duration()
        );
        RunOutcome {
            commits,
            interrupted: false,
        }
    }

    /// Consult the visited-pair cache for `(t0, t1)`; marks the pair (and
    /// with manipulator constraints, its 3x3 neighborhood) as tested.
    /// Returns true when the pair was already tested.
    fn check_and_mark_visited(&mut self, t0: f64, t1: f64) -> bool {
        if self.visited_axis == 0 {
            return false;
        }
        let axis = self.visited_axis;
        let t0_index = (t0 / self.min_time_step) as usize;
        let t1_index = (t1 / self.min_time_step) as usize;
        let pair = t0_index * axis + t1_index;
        if pair < self.visited.len() && self.visited[pair] != 0 {
            return true;
        }

        if self.has_manip {
            for i in t0_index.saturating_sub(1)..=t0_index + 1 {
                for j in t1_index.saturating_sub(1)..=t1_index + 1 {
                    if i < axis && j < axis {
                        self.visited[i * axis + j] = 1;
                    }
                }
            }
        } else if pair < self.visited.len() {
            self.visited[pair] = 1;
        }
        false
    }

    /// Try to replace `[t0, t1]` with a shorter feasible bridge. On
    /// `Attempt::Accepted` the bridge is left in `self.accepted`.
    pub(crate) fn attempt_window(
        &mut self,
        t0: f64,
        t1: f64,
        path: &ParabolicPath,
        deps: &mut PlanDeps<'_>,
    ) -> Attempt {
        let Some((i0, u0)) = path.find_index(t0) else {
            return Attempt::Rejected(ShortcutStatus::StateSettingFailed);
        };
        let Some((i1, u1)) = path.find_index(t1) else {
            return Attempt::Rejected(ShortcutStatus::StateSettingFailed);
        };
        let segments = path.segments();

        segments[i0].eval_pos(u0, &mut self.x0);
        if !deps.checker.set_state(&self.x0) {
            return Attempt::Rejected(ShortcutStatus::StateSettingFailed);
        }
        deps.checker.get_state(&mut self.x0);

        segments[i1].eval_pos(u1, &mut self.x1);
        if !deps.checker.set_state(&self.x1) {
            return Attempt::Rejected(ShortcutStatus::StateSettingFailed);
        }
        deps.checker.get_state(&mut self.x1);

        segments[i0].eval_vel(u0, &mut self.v0);
        segments[i1].eval_vel(u1, &mut self.v1);

        *deps.iteration += 1;
        if deps.progress.on_progress(*deps.iteration) == ProgressAction::Interrupt {
            return Attempt::Interrupted;
        }

        // Per-attempt limits.
        self.vel_limits.copy_from_slice(&self.vel_max);
        self.accel_limits.copy_from_slice(&self.accel_max);
        if !(self.has_manip && deps.manip.is_some() && self.use_reduction_factors) {
            for j in 0..self.ndof {
                let min_vel = self.v0[j].abs().max(self.v1[j].abs());
                if self.vel_limits[j] < min_vel {
                    self.vel_limits[j] = min_vel;
                } else {
                    let f = min_vel.max(self.start_vel_mult * self.vel_max[j]);
                    if self.vel_limits[j] > f {
                        self.vel_limits[j] = f;
                    }
                }
                let f = self.start_accel_mult * self.accel_max[j];
                if self.accel_limits[j] > f {
                    self.accel_limits[j] = f;
                }
            }
        }

        let mut cur_vel_mult = self.start_vel_mult;
        let mut cur_accel_mult = self.start_accel_mult;
        self.vel_reduction.fill(1.0);
        self.accel_reduction.fill(1.0);

        let mut last_status = ShortcutStatus::SlowDownFailed;
        for slowdown in 0..MAX_SLOWDOWN_TRIES {
            if !deps.interpolator.arbitrary_vel_nd(
                &self.x0,
                &self.x1,
                &self.v0,
                &self.v1,
                &self.x_lower,
                &self.x_upper,
                &self.vel_limits,
                &self.accel_limits,
                false,
                &mut self.candidate,
            ) {
                return Attempt::Rejected(ShortcutStatus::InitialInterpolationFailed);
            }

            let segment_time = total_duration(&self.candidate);
            if segment_time + self.min_time_step > t1 - t0 {
                return Attempt::Rejected(if slowdown == 0 {
                    ShortcutStatus::InterpolatedSegmentTooLong
                } else {
                    ShortcutStatus::InterpolatedSegmentTooLongFromSlowDown
                });
            }

            *deps.iteration += 1;
            if deps.progress.on_progress(*deps.iteration) == ProgressAction::Interrupt {
                return Attempt::Interrupted;
            }

            let ret = self.check_candidate(t0, t1, segment_time, deps);

            *deps.iteration += 1;
            if deps.progress.on_progress(*deps.iteration) == ProgressAction::Interrupt {
                return Attempt::Interrupted;
            }

            match ret {
                CandidateOutcome::Accepted => {
                    return Attempt::Accepted {
                        cur_vel_mult,
                        cur_accel_mult,
                    }
                }
                CandidateOutcome::Fatal(status) => return Attempt::Rejected(status),
                CandidateOutcome::TimeBased(check) => {
                    self.time_based_failures += 1;
                    match self.slow_down(
                        &check,
                        slowdown,
                        i0,
                        u0,
                        i1,
                        u1,
                        path,
                        &mut cur_vel_mult,
                        &mut cur_accel_mult,
                        deps,
                    ) {
                        Ok(()) => {}
                        Err(status) => {
                            last_status = status;
                            break;
                        }
                    }
                }
            }
        }
        Attempt::Rejected(last_status)
    }

    /// Run the feasibility pipeline on the current candidate, fixing up the
    /// final sub-segment when checker-side modification changed the end
    /// velocity.
    fn check_candidate(
        &mut self,
        t0: f64,
        t1: f64,
        segment_time: f64,
        deps: &mut PlanDeps<'_>,
    ) -> CandidateOutcome {
        if !deps.checker.set_state(&self.x1) {
            return CandidateOutcome::Fatal(ShortcutStatus::StateSettingFailed);
        }
        deps.checker.get_state(&mut self.x1);

        let ret = deps.pipeline.check_segments(
            &self.candidate,
            options::ALL,
            deps.checker,
            reborrow_manip(&mut deps.manip),
            &mut self.accepted,
        );
        match ret.code {
            CheckCode::Ok => {}
            CheckCode::TimeBased => return CandidateOutcome::TimeBased(TimeBasedInfo::from(&ret)),
            CheckCode::Collision => {
                return CandidateOutcome::Fatal(ShortcutStatus::Check2CollisionFailed)
            }
            CheckCode::StateSetting => {
                return CandidateOutcome::Fatal(ShortcutStatus::StateSettingFailed)
            }
            _ => return CandidateOutcome::Fatal(ShortcutStatus::Check2Failed),
        }

        // The checker may have projected configurations; keep the limits
        // above the boundary speeds of whatever it stitched together.
        for seg in &self.accepted {
            for j in 0..self.ndof {
                let min_vel = seg.v0()[j].abs().max(seg.v1()[j].abs());
                if self.vel_limits[j] < min_vel {
                    self.vel_limits[j] = min_vel;
                }
            }
        }

        if !ret.different_velocity || self.accepted.is_empty() {
            return CandidateOutcome::Accepted;
        }

        // Projection changed the final velocity: re-interpolate the last
        // sub-segment so the bridge still ends at the requested velocity,
        // within the stretch the window still allows.
        log::debug!("bridge does not end at the requested velocity, fixing the last sub-segment");
        let allowed_stretch = (t1 - t0) - (segment_time + self.min_time_step);
        let last = self.accepted.last().expect("non-empty");
        let last_duration = last.duration();
        self.tail_x0.copy_from_slice(last.x0());
        self.tail_v0.copy_from_slice(last.v0());

        if !deps.interpolator.arbitrary_vel_nd(
            &self.tail_x0,
            &self.x1,
            &self.tail_v0,
            &self.v1,
            &self.x_lower,
            &self.x_upper,
            &self.vel_limits,
            &self.accel_limits,
            true,
            &mut self.candidate,
        ) {
            return CandidateOutcome::Fatal(ShortcutStatus::LastSegmentFailed);
        }
        let tail_time = total_duration(&self.candidate);
        if tail_time - last_duration > allowed_stretch {
            log::debug!(
                "corrected last sub-segment stretches {:.6e} s beyond the allowance",
                tail_time - last_duration - allowed_stretch
            );
            return CandidateOutcome::Fatal(ShortcutStatus::LastSegmentFailed);
        }

        let ret = deps.pipeline.check_segments(
            &self.candidate,
            options::ALL,
            deps.checker,
            reborrow_manip(&mut deps.manip),
            &mut self.tail,
        );
        match ret.code {
            CheckCode::Ok if ret.different_velocity => {
                CandidateOutcome::Fatal(ShortcutStatus::LastSegmentFailed)
            }
            CheckCode::Ok => {
                self.accepted.pop();
                self.accepted.append(&mut self.tail);
                CandidateOutcome::Accepted
            }
            CheckCode::TimeBased => CandidateOutcome::TimeBased(TimeBasedInfo::from(&ret)),
            _ => CandidateOutcome::Fatal(ShortcutStatus::LastSegmentFailed),
        }
    }

    /// Apply one slowdown step to the per-attempt limits. Returns the
    /// rejection status when a multiplier falls through its floor.
    #[allow(clippy::too_many_arguments)]
    fn slow_down(
        &mut self,
        check: &TimeBasedInfo,
        slowdown_iter: usize,
        i0: usize,
        u0: f64,
        i1: usize,
        u1: f64,
        path: &ParabolicPath,
        cur_vel_mult: &mut f64,
        cur_accel_mult: &mut f64,
        deps: &mut PlanDeps<'_>,
    ) -> Result<(), ShortcutStatus> {
        if self.has_manip && deps.manip.is_some() {
            if slowdown_iter == 0 && !self.use_reduction_factors {
                // First failure without per-DOF factors: ask the workspace
                // checker for limit estimates at both window endpoints
                // before falling back to multiplicative scaling.
                let segments = path.segments();
                segments[i0].eval_pos(u0, &mut self.x0);
                segments[i1].eval_pos(u1, &mut self.x1);
                segments[i0].eval_vel(u0, &mut self.v0);
                segments[i1].eval_vel(u1, &mut self.v1);

                if !deps.checker.set_state(&self.x0) {
                    return Err(ShortcutStatus::StateSettingFailed);
                }
                let manip = reborrow_manip(&mut deps.manip).expect("manip present");
                manip.max_vel_accel_estimate(&self.v0, &mut self.vel_limits, &mut self.accel_limits);

                if !deps.checker.set_state(&self.x1) {
                    return Err(ShortcutStatus::StateSettingFailed);
                }
                let manip = reborrow_manip(&mut deps.manip).expect("manip present");
                manip.max_vel_accel_estimate(&self.v1, &mut self.vel_limits, &mut self.accel_limits);

                for j in 0..self.ndof {
                    let min_vel = self.v0[j].abs().max(self.v1[j].abs());
                    if self.vel_limits[j] < min_vel {
                        self.vel_limits[j] = min_vel;
                    }
                }
                self.num_slow_downs += 1;
                return Ok(());
            }

            let speed_violated =
                self.max_manip_speed > 0.0 && check.max_manip_speed > self.max_manip_speed;
            let accel_violated =
                self.max_manip_accel > 0.0 && check.max_manip_accel > self.max_manip_accel;

            if speed_violated {
                if self.use_reduction_factors && !check.reduction_factors.is_empty() && !accel_violated
                {
                    // Per-DOF velocity scaling; acceleration is untouched
                    // when only the speed cap tripped.
                    for j in 0..self.ndof {
                        self.vel_limits[j] *= check.reduction_factors[j];
                        self.vel_reduction[j] *= check.reduction_factors[j];
                    }
                } else {
                    *cur_vel_mult *= check.surpass_mult;
                    if *cur_vel_mult < MIN_VEL_MULT {
                        return Err(ShortcutStatus::MaxManipSpeedFailed);
                    }
                    for j in 0..self.ndof {
                        let min_vel = self.v0[j].abs().max(self.v1[j].abs());
                        self.vel_limits[j] = min_vel.max(check.surpass_mult * self.vel_limits[j]);
                    }
                }
            }

            if accel_violated {
                if self.use_reduction_factors && !check.reduction_factors.is_empty() {
                    for j in 0..self.ndof {
                        let r = check.reduction_factors[j];
                        self.vel_limits[j] *= r.sqrt();
                        self.accel_limits[j] *= r;
                        self.vel_reduction[j] *= r.sqrt();
                        self.accel_reduction[j] *= r;
                    }
                } else {
                    let accel_mult = check.surpass_mult * check.surpass_mult;
                    *cur_accel_mult *= accel_mult;
                    if *cur_accel_mult < MIN_ACCEL_MULT {
                        return Err(ShortcutStatus::MaxManipAccelFailed);
                    }
                    // Velocity shrinks by the square root: it carries one
                    // factor of time where the acceleration carries two.
                    let vel_mult = accel_mult.sqrt();
                    *cur_vel_mult *= vel_mult;
                    if *cur_vel_mult < MIN_VEL_MULT {
                        return Err(ShortcutStatus::MaxManipAccelFailed);
                    }
                    for j in 0..self.ndof {
                        let min_vel = self.v0[j].abs().max(self.v1[j].abs());
                        self.vel_limits[j] = min_vel.max(vel_mult * self.vel_limits[j]);
                        self.accel_limits[j] *= accel_mult;
                    }
                }
            }
            self.num_slow_downs += 1;
            log::trace!(
                "slowdown: speed_violated={} accel_violated={} mult={:.4} vel_mult={:.4} accel_mult={:.4}",
                speed_violated,
                accel_violated,
                check.surpass_mult,
                cur_vel_mult,
                cur_accel_mult
            );
            Ok(())
        } else {
            *cur_vel_mult *= check.surpass_mult;
            *cur_accel_mult *= check.surpass_mult * check.surpass_mult;
            if *cur_vel_mult < MIN_VEL_MULT || *cur_accel_mult < MIN_ACCEL_MULT {
                return Err(ShortcutStatus::SlowDownFailed);
            }
            self.num_slow_downs += 1;
            for j in 0..self.ndof {
                let min_vel = self.v0[j].abs().max(self.v1[j].abs());
                self.vel_limits[j] = min_vel.max(check.surpass_mult * self.vel_limits[j]);
                self.accel_limits[j] *= check.surpass_mult * check.surpass_mult;
            }
            Ok(())
        }
    }

    /// Relax the start-time multipliers after a successful commit.
    pub(crate) fn note_success(&mut self, cur_vel_mult: f64, cur_accel_mult: f64) {
        self.time_based_failures = 0;
        self.start_vel_mult = 1.0f64.min(cur_vel_mult * self.inv_search_mult);
        self.start_accel_mult = 1.0f64.min(cur_accel_mult * self.inv_search_mult);
    }
}

/// Slowdown-relevant fields extracted from a [`crate::constraints::CheckReturn`].
pub(crate) struct TimeBasedInfo {
    surpass_mult: f64,
    max_manip_speed: f64,
    max_manip_accel: f64,
    reduction_factors: Vec<f64>,
}

impl From<&crate::constraints::CheckReturn> for TimeBasedInfo {
    fn from(ret: &crate::constraints::CheckReturn) -> Self {
        Self {
            surpass_mult: ret.time_based_surpass_mult,
            max_manip_speed: ret.max_manip_speed,
            max_manip_accel: ret.max_manip_accel,
            reduction_factors: ret.reduction_factors.clone(),
        }
    }
}

enum CandidateOutcome {
    Accepted,
    TimeBased(TimeBasedInfo),
    Fatal(ShortcutStatus),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{NullProgress, SeededUniform};
    use crate::testing::BoxWorldChecker;

    fn make_deps<'a>(
        interpolator: &'a mut Interpolator,
        pipeline: &'a mut FeasibilityPipeline,
        checker: &'a mut BoxWorldChecker,
        rng: &'a mut SeededUniform,
        progress: &'a mut NullProgress,
        iteration: &'a mut u64,
        stats: &'a mut PlanStats,
    ) -> PlanDeps<'a> {
        PlanDeps {
            interpolator,
            pipeline,
            checker,
            manip: None,
            progress,
            rng,
            iteration,
            stats,
        }
    }

    /// Stop-at-every-waypoint path over [0] -> [1] -> [2] with unit limits.
    fn stop_and_go_path(interp: &mut Interpolator) -> (ParabolicPath, StopRegistry) {
        let mut path = ParabolicPath::new();
        let mut out = Vec::new();
        assert!(interp.zero_vel_nd(&[0.0], &[1.0], &[1.0], &[1.0], &mut out));
        for seg in out.drain(..) {
            path.append(seg);
        }
        let first_chunk = path.duration();
        assert!(interp.zero_vel_nd(&[1.0], &[2.0], &[1.0], &[1.0], &mut out));
        let mut stops = StopRegistry::default();
        let last_ramp = out.last().unwrap().duration();
        let first_ramp = out.first().unwrap().duration();
        for seg in out.drain(..) {
            path.append(seg);
        }
        stops.times.push(first_chunk);
        stops
            .neighborhoods
            .push((first_chunk - last_ramp, first_chunk + first_ramp));
        (path, stops)
    }

    #[test]
    fn test_shortcut_reduces_duration() {
        let config = SmootherConfig::uniform(1, 10.0, 1.0, 1.0);
        let mut interp = Interpolator::new(1);
        let (mut path, mut stops) = stop_and_go_path(&mut interp);
        let before = path.duration();
        assert!((before - 4.0).abs() < 1e-9);

        let mut pipeline = FeasibilityPipeline::new(&config);
        let mut checker = BoxWorldChecker::new(&config);
        let mut rng = SeededUniform::new(0);
        let mut progress = NullProgress;
        let mut iteration = 0;
        let mut stats = PlanStats::default();
        let mut deps = make_deps(
            &mut interp,
            &mut pipeline,
            &mut checker,
            &mut rng,
            &mut progress,
            &mut iteration,
            &mut stats,
        );

        let mut engine = Shortcutter::new(&config);
        let outcome = engine.run(&mut path, &mut stops, 2.0, 100, &mut deps);
        assert!(!outcome.interrupted);
        assert!(outcome.commits >= 1);
        // The forced stop at t=2 disappears: straight 0 -> 2 takes 3 s.
        assert!(path.duration() < before - engine.min_time_step());
        assert!((path.duration() - 3.0).abs() < 0.2);
        assert!(stops.is_empty());
    }

    #[test]
    fn test_shortcut_respects_velocity_limits() {
        let config = SmootherConfig::uniform(1, 10.0, 1.0, 1.0);
        let mut interp = Interpolator::new(1);
        let (mut path, mut stops) = stop_and_go_path(&mut interp);

        let mut pipeline = FeasibilityPipeline::new(&config);
        let mut checker = BoxWorldChecker::new(&config);
        let mut rng = SeededUniform::new(3);
        let mut progress = NullProgress;
        let mut iteration = 0;
        let mut stats = PlanStats::default();
        let mut deps = make_deps(
            &mut interp,
            &mut pipeline,
            &mut checker,
            &mut rng,
            &mut progress,
            &mut iteration,
            &mut stats,
        );

        let mut engine = Shortcutter::new(&config);
        engine.run(&mut path, &mut stops, 2.0, 60, &mut deps);
        for seg in path.segments() {
            assert!(seg.v0()[0].abs() <= 1.0 + 1e-8);
            assert!(seg.v1()[0].abs() <= 1.0 + 1e-8);
            assert!(seg.accel()[0].abs() <= 1.0 + 1e-8);
        }
    }

    #[test]
    fn test_attempt_rejects_non_improving_window() {
        // A single already-optimal bang-bang: any window over it cannot be
        // improved, so the attempt reports the bridge as too long.
        let config = SmootherConfig::uniform(1, 10.0, 1.0, 1.0);
        let mut interp = Interpolator::new(1);
        let mut path = ParabolicPath::new();
        let mut out = Vec::new();
        assert!(interp.zero_vel_nd(&[0.0], &[1.0], &[1.0], &[1.0], &mut out));
        for seg in out.drain(..) {
            path.append(seg);
        }

        let mut pipeline = FeasibilityPipeline::new(&config);
        let mut checker = BoxWorldChecker::new(&config);
        let mut rng = SeededUniform::new(0);
        let mut progress = NullProgress;
        let mut iteration = 0;
        let mut stats = PlanStats::default();
        let mut deps = make_deps(
            &mut interp,
            &mut pipeline,
            &mut checker,
            &mut rng,
            &mut progress,
            &mut iteration,
            &mut stats,
        );

        let mut engine = Shortcutter::new(&config);
        let t1 = path.duration();
        match engine.attempt_window(0.0, t1, &path, &mut deps) {
            Attempt::Rejected(ShortcutStatus::InterpolatedSegmentTooLong) => {}
            _ => panic!("expected InterpolatedSegmentTooLong"),
        }
    }

    #[test]
    fn test_visited_pairs_are_skipped() {
        let config = SmootherConfig::uniform(1, 10.0, 1.0, 1.0);
        let mut engine = Shortcutter::new(&config);
        engine.visited.resize(64 * 64, 0);
        engine.visited_axis = 64;
        assert!(!engine.check_and_mark_visited(0.01, 0.05));
        assert!(engine.check_and_mark_visited(0.01, 0.05));
    }
}
