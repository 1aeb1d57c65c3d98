//! The planner facade.
//!
//! `ParabolicSmoother::plan_path` runs the whole pipeline: ingest the input
//! trajectory, merge away forced stops, shortcut, then emit a timed
//! trajectory after a final feasibility pass over any segment the optimizer
//! did not already clear.

use std::time::{SystemTime, UNIX_EPOCH};

use gati_ramp::{
    check_segment as check_ramp, Interpolator, ParabolicPath, Segment, SegmentCheck, RAMP_EPSILON,
};

use crate::config::SmootherConfig;
use crate::constraints::{
    options, reborrow_manip, CheckCode, ConstraintChecker, ManipChecker, ProgressAction,
    ProgressSink, SeededUniform, UniformSource,
};
use crate::error::{Result, SmoothError};
use crate::initializer::{IngestOutcome, InitialPath, Initializer, LINEAR_EPSILON};
use crate::merger::Merger;
use crate::pipeline::FeasibilityPipeline;
use crate::progress::{PlanStats, PlannerStatus};
use crate::shortcutter::{PlanDeps, Shortcutter};
use crate::trajectory::{Interpolation, Trajectory, TrajectoryPoint};

/// Collisions are skipped (limits still enforced) within this many seconds
/// of the path edges during the final pass, expressed as a multiple of the
/// configured step length.
const TRIM_EDGES_STEPS: f64 = 2.0;
/// Fixed-duration stretch attempts for a segment failing the final pass.
const MAX_STRETCH_TRIES: usize = 4;
/// Tolerated difference between the emitted and internal durations.
const DURATION_DISCREPANCY_THRESH: f64 = 0.01;

/// Outcome of a successful (non-failed) planning call.
pub enum PlanOutcome {
    /// The smoothed trajectory.
    Planned(Trajectory),
    /// The progress sink asked to stop; the path is abandoned.
    Interrupted,
}

impl PlanOutcome {
    pub fn status(&self) -> PlannerStatus {
        match self {
            PlanOutcome::Planned(_) => PlannerStatus::Succeeded,
            PlanOutcome::Interrupted => PlannerStatus::Interrupted,
        }
    }
}

/// Time-parameterizes and shortcuts multi-DOF trajectories.
pub struct ParabolicSmoother {
    config: SmootherConfig,
    interpolator: Interpolator,
    pipeline: FeasibilityPipeline,
    initializer: Initializer,
    engine: Shortcutter,
    sampler: SeededUniform,
    /// Independent source for dump file indices only; planning never reads
    /// from it.
    logging_sampler: SeededUniform,
    stats: PlanStats,
    iteration: u64,

    // Emission scratch
    stretch_out: Vec<Segment>,
    emit_out: Vec<Segment>,
    state_buf: Vec<f64>,
}

impl ParabolicSmoother {
    pub fn new(config: SmootherConfig) -> Result<Self> {
        config.validate()?;
        let ndof = config.dof();
        let wallclock_seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Ok(Self {
            interpolator: Interpolator::new(ndof),
            pipeline: FeasibilityPipeline::new(&config),
            initializer: Initializer::new(ndof),
            engine: Shortcutter::new(&config),
            sampler: SeededUniform::new(config.random_seed),
            logging_sampler: SeededUniform::new(wallclock_seed),
            stats: PlanStats::default(),
            iteration: 0,
            stretch_out: Vec::new(),
            emit_out: Vec::new(),
            state_buf: vec![0.0; ndof],
            config,
        })
    }

    /// The configuration this smoother runs with.
    pub fn config(&self) -> &SmootherConfig {
        &self.config
    }

    /// Statistics of the most recent planning call.
    pub fn stats(&self) -> &PlanStats {
        &self.stats
    }

    /// Smooth `traj` under the injected constraint stack.
    ///
    /// On success the returned trajectory satisfies all active constraints
    /// and is no longer than the input. Host robot state is restored before
    /// returning, on every path.
    pub fn plan_path(
        &mut self,
        traj: &Trajectory,
        checker: &mut dyn ConstraintChecker,
        manip: Option<&mut dyn ManipChecker>,
        progress: &mut dyn ProgressSink,
    ) -> Result<PlanOutcome> {
        if traj.len() < 2 {
            return Err(SmoothError::Input(
                "input trajectory needs at least 2 waypoints".into(),
            ));
        }
        self.stats = PlanStats::default();
        self.iteration = 0;
        let config_snapshot = self.config.clone();
        self.dump_json("parameters", &config_snapshot);
        self.dump_json("input", traj);

        // Feasibility checks move the robot as a side effect; restore the
        // state the host had on every exit path.
        checker.get_state(&mut self.state_buf);
        let saved_state = self.state_buf.clone();
        let result = self.plan_inner(traj, checker, manip, progress);
        if !checker.set_state(&saved_state) {
            log::warn!("failed to restore robot state after planning");
        }

        match &result {
            Ok(outcome) => log::debug!("planning finished with {:?}", outcome.status()),
            Err(e) => log::warn!("planning failed: {}", e),
        }
        result
    }

    fn plan_inner(
        &mut self,
        traj: &Trajectory,
        checker: &mut dyn ConstraintChecker,
        mut manip: Option<&mut dyn ManipChecker>,
        progress: &mut dyn ProgressSink,
    ) -> Result<PlanOutcome> {
        self.pipeline.use_perturbation = true;

        let initial = match self.initializer.ingest(
            &self.config,
            &mut self.interpolator,
            &mut self.pipeline,
            checker,
            reborrow_manip(&mut manip),
            progress,
            &mut self.iteration,
            traj,
        )? {
            IngestOutcome::Ready(p) => p,
            IngestOutcome::Interrupted => return Ok(PlanOutcome::Interrupted),
        };
        let InitialPath {
            mut path,
            mut stops,
            max_initial_ramp_time,
            perfectly_modeled,
        } = initial;

        if progress.on_progress(self.iteration) == ProgressAction::Interrupt {
            return Ok(PlanOutcome::Interrupted);
        }
        self.iteration += 1;

        let quadratic_ingress = traj.interpolation == Interpolation::Quadratic
            && traj.has_timestamps()
            && perfectly_modeled;

        self.dump_path(&path, "before_merge");
        let merge_outcome = {
            let mut deps = PlanDeps {
                interpolator: &mut self.interpolator,
                pipeline: &mut self.pipeline,
                checker,
                manip: reborrow_manip(&mut manip),
                progress,
                rng: &mut self.sampler,
                iteration: &mut self.iteration,
                stats: &mut self.stats,
            };
            Merger::run(&mut self.engine, &mut path, &mut stops, &mut deps)
        };
        if merge_outcome.interrupted {
            return Ok(PlanOutcome::Interrupted);
        }
        self.stats.merges = merge_outcome.commits;
        self.dump_path(&path, "after_merge");

        self.dump_path(&path, "before_shortcut");
        let shortcut_outcome = {
            let mut deps = PlanDeps {
                interpolator: &mut self.interpolator,
                pipeline: &mut self.pipeline,
                checker,
                manip: reborrow_manip(&mut manip),
                progress,
                rng: &mut self.sampler,
                iteration: &mut self.iteration,
                stats: &mut self.stats,
            };
            self.engine.run(
                &mut path,
                &mut stops,
                max_initial_ramp_time,
                self.config.iterations(),
                &mut deps,
            )
        };
        if shortcut_outcome.interrupted {
            return Ok(PlanOutcome::Interrupted);
        }
        self.stats.shortcuts = shortcut_outcome.commits;
        self.stats.slow_downs = self.engine.num_slow_downs();
        self.dump_path(&path, "after_shortcut");

        if progress.on_progress(self.iteration) == ProgressAction::Interrupt {
            return Ok(PlanOutcome::Interrupted);
        }
        self.iteration += 1;

        let emitted = self.emit(
            &path,
            quadratic_ingress && shortcut_outcome.commits == 0,
            checker,
            manip,
            progress,
        )?;
        let emitted = match emitted {
            Emission::Trajectory(t) => t,
            Emission::Interrupted => return Ok(PlanOutcome::Interrupted),
        };

        // The emitted trajectory must agree with the internal path and be
        // sampleable end to end.
        if (emitted.duration() - path.duration()).abs() > DURATION_DISCREPANCY_THRESH {
            return Err(SmoothError::Emission(format!(
                "emitted duration {:.6} disagrees with path duration {:.6}",
                emitted.duration(),
                path.duration()
            )));
        }
        if emitted.sample(0.0).is_none() {
            return Err(SmoothError::Emission(
                "emitted trajectory is not sampleable".into(),
            ));
        }

        log::debug!(
            "plan stats: {} merges, {} shortcuts, {} slowdowns, {} attempts",
            self.stats.merges,
            self.stats.shortcuts,
            self.stats.slow_downs,
            self.stats.total_attempts()
        );
        self.dump_json("output", &emitted);
        Ok(PlanOutcome::Planned(emitted))
    }

    /// Final pass: validate every segment, re-check (with trimmed edges)
    /// anything the optimizer did not clear, and write out the trajectory.
    fn emit(
        &mut self,
        path: &ParabolicPath,
        skip_validated_quadratic: bool,
        checker: &mut dyn ConstraintChecker,
        mut manip: Option<&mut dyn ManipChecker>,
        progress: &mut dyn ProgressSink,
    ) -> Result<Emission> {
        let trim_time = TRIM_EDGES_STEPS * self.config.step_length;
        let num_segments = path.len();

        let mut out = Trajectory::with_interpolation(Interpolation::Quadratic);
        let first = path
            .segments()
            .first()
            .ok_or_else(|| SmoothError::Emission("empty path".into()))?;
        out.points.push(TrajectoryPoint {
            positions: first.x0().to_vec(),
            velocities: Some(first.v0().to_vec()),
            delta_time: Some(0.0),
            is_waypoint: true,
        });

        let mut expected_duration = 0.0;
        for (iseg, segment) in path.segments().iter().enumerate() {
            if !(skip_validated_quadratic && segment.constraint_checked) {
                let ret = check_ramp(
                    segment,
                    &self.config.x_lower,
                    &self.config.x_upper,
                    &self.config.vel_max,
                    &self.config.accel_max,
                );
                if ret != SegmentCheck::Normal {
                    return Err(SmoothError::Emission(format!(
                        "segment {}/{} fails kinematic validation: {:?}",
                        iseg, num_segments, ret
                    )));
                }
            }

            self.emit_out.clear();
            if segment.constraint_checked {
                self.emit_out.push(segment.clone());
            } else {
                self.iteration += 1;
                if progress.on_progress(self.iteration) == ProgressAction::Interrupt {
                    return Ok(Emission::Interrupted);
                }
                self.final_check_segment(
                    segment,
                    iseg,
                    num_segments,
                    trim_time,
                    checker,
                    reborrow_manip(&mut manip),
                )?;
            }

            for seg in &self.emit_out {
                expected_duration += seg.duration();
                out.points.push(TrajectoryPoint {
                    positions: seg.x1().to_vec(),
                    velocities: Some(seg.v1().to_vec()),
                    delta_time: Some(seg.duration()),
                    is_waypoint: true,
                });
            }
        }

        if (expected_duration - path.duration()).abs() > DURATION_DISCREPANCY_THRESH {
            return Err(SmoothError::Emission(format!(
                "final pass changed the duration by {:.6}",
                (expected_duration - path.duration()).abs()
            )));
        }
        Ok(Emission::Trajectory(out))
    }

    /// Run the full constraint stack over one unchecked segment, trimming
    /// the path edges out of collision checking and stretching the segment
    /// when checking fails. Results land in `self.emit_out`.
    fn final_check_segment(
        &mut self,
        segment: &Segment,
        iseg: usize,
        num_segments: usize,
        trim_time: f64,
        checker: &mut dyn ConstraintChecker,
        mut manip: Option<&mut dyn ManipChecker>,
    ) -> Result<()> {
        let mut trimmed = segment.clone();
        let mut edge: Option<(Segment, bool)> = None; // (piece, attach_front)
        let mut check = true;

        if iseg == 0 {
            if segment.duration() <= trim_time + LINEAR_EPSILON {
                check = false;
            } else {
                let (front, back) = segment.split_at(trim_time);
                edge = Some((front, true));
                trimmed = back;
            }
        } else if iseg + 1 == num_segments {
            if segment.duration() <= trim_time + LINEAR_EPSILON {
                check = false;
            } else {
                let (front, back) = segment.split_at(segment.duration() - trim_time);
                trimmed = front;
                edge = Some((back, false));
            }
        }

        if !check {
            self.emit_out.push(segment.clone());
            return Ok(());
        }

        // The optimizer checks candidates with perturbation; the final pass
        // validates the exact trajectory that will be executed.
        self.pipeline.use_perturbation = false;
        let ret = self.pipeline.check_one(
            &trimmed,
            options::ALL,
            checker,
            reborrow_manip(&mut manip),
            &mut self.emit_out,
        );
        let mut ok = ret.code == CheckCode::Ok;

        if !ok {
            log::debug!(
                "segment {}/{} fails the final check ({:?}); stretching its duration",
                iseg,
                num_segments,
                ret.code
            );
            let mut new_duration = trimmed.duration() + 5.0 * RAMP_EPSILON;
            let time_increment = 0.05 * new_duration;
            for dilate in 0..MAX_STRETCH_TRIES {
                if self.interpolator.fixed_duration_nd(
                    trimmed.x0(),
                    trimmed.x1(),
                    trimmed.v0(),
                    trimmed.v1(),
                    new_duration,
                    &self.config.x_lower,
                    &self.config.x_upper,
                    &self.config.vel_max,
                    &self.config.accel_max,
                    &mut self.stretch_out,
                ) {
                    let stretched = std::mem::take(&mut self.stretch_out);
                    let ret = self.pipeline.check_segments(
                        &stretched,
                        options::ALL,
                        checker,
                        reborrow_manip(&mut manip),
                        &mut self.emit_out,
                    );
                    self.stretch_out = stretched;
                    if ret.code == CheckCode::Ok {
                        ok = true;
                        break;
                    }
                }
                if dilate > 1 {
                    new_duration += time_increment;
                } else {
                    new_duration += 5.0 * RAMP_EPSILON;
                }
            }
        }
        self.pipeline.use_perturbation = true;

        if !ok {
            return Err(SmoothError::Emission(format!(
                "segment {}/{} does not satisfy constraints after stretching",
                iseg, num_segments
            )));
        }

        match edge {
            Some((piece, true)) => self.emit_out.insert(0, piece),
            Some((piece, false)) => self.emit_out.push(piece),
            None => {}
        }
        Ok(())
    }

    fn dump_json<T: serde::Serialize>(&mut self, tag: &str, value: &T) {
        let Some(dir) = self.config.dump_dir.clone() else {
            return;
        };
        let index = self.logging_sampler.sample_u32() % 10000;
        let filename = dir.join(format!("smoother_{}.{}.json", index, tag));
        match serde_json::to_string_pretty(value)
            .map_err(|e| e.to_string())
            .and_then(|s| std::fs::write(&filename, s).map_err(|e| e.to_string()))
        {
            Ok(()) => log::debug!("{} dump saved to {}", tag, filename.display()),
            Err(e) => log::warn!("failed to dump {}: {}", tag, e),
        }
    }

    fn dump_path(&mut self, path: &ParabolicPath, tag: &str) {
        if self.config.dump_dir.is_some() {
            self.dump_json(tag, path);
        }
    }
}

enum Emission {
    Trajectory(Trajectory),
    Interrupted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::NullProgress;
    use crate::testing::BoxWorldChecker;

    #[test]
    fn test_plan_single_straight_segment() {
        // Scenario: x0 = [0,0], x1 = [1,0], rest to rest, unit limits. The
        // bang-bang solution takes exactly 2 s and round-trips through
        // emission.
        let config = SmootherConfig::uniform(2, 10.0, 1.0, 1.0);
        let mut smoother = ParabolicSmoother::new(config.clone()).unwrap();
        let mut checker = BoxWorldChecker::new(&config);
        let traj = Trajectory::from_waypoints(vec![vec![0.0, 0.0], vec![1.0, 0.0]]);

        let outcome = smoother
            .plan_path(&traj, &mut checker, None, &mut NullProgress)
            .unwrap();
        let planned = match outcome {
            PlanOutcome::Planned(t) => t,
            PlanOutcome::Interrupted => panic!("unexpected interrupt"),
        };
        assert_eq!(planned.interpolation, Interpolation::Quadratic);
        assert!((planned.duration() - 2.0).abs() < 1e-6);

        let (q, dq) = planned.sample(planned.duration()).unwrap();
        assert!((q[0] - 1.0).abs() < 1e-6);
        assert!(dq[0].abs() < 1e-6);
        let (q, _) = planned.sample(0.0).unwrap();
        assert!(q[0].abs() < 1e-9);
    }

    #[test]
    fn test_plan_restores_robot_state() {
        let config = SmootherConfig::uniform(1, 10.0, 1.0, 1.0);
        let mut smoother = ParabolicSmoother::new(config.clone()).unwrap();
        let mut checker = BoxWorldChecker::new(&config);
        checker.set_state(&[0.75]);
        checker.set_state_calls = 0;

        let traj = Trajectory::from_waypoints(vec![vec![0.0], vec![1.0], vec![2.0]]);
        smoother
            .plan_path(&traj, &mut checker, None, &mut NullProgress)
            .unwrap();

        let mut state = vec![0.0];
        checker.get_state(&mut state);
        assert!((state[0] - 0.75).abs() < 1e-12);
        assert!(checker.set_state_calls > 0);
    }

    #[test]
    fn test_plan_rejects_single_point() {
        let config = SmootherConfig::uniform(1, 10.0, 1.0, 1.0);
        let mut smoother = ParabolicSmoother::new(config.clone()).unwrap();
        let mut checker = BoxWorldChecker::new(&config);
        let traj = Trajectory::from_waypoints(vec![vec![0.0]]);
        assert!(smoother
            .plan_path(&traj, &mut checker, None, &mut NullProgress)
            .is_err());
    }

    #[test]
    fn test_interrupt_propagates() {
        struct InterruptAfter(u64);
        impl ProgressSink for InterruptAfter {
            fn on_progress(&mut self, iteration: u64) -> ProgressAction {
                if iteration >= self.0 {
                    ProgressAction::Interrupt
                } else {
                    ProgressAction::Continue
                }
            }
        }

        let config = SmootherConfig::uniform(1, 10.0, 1.0, 1.0);
        let mut smoother = ParabolicSmoother::new(config.clone()).unwrap();
        let mut checker = BoxWorldChecker::new(&config);
        let traj = Trajectory::from_waypoints(vec![vec![0.0], vec![1.0], vec![2.0]]);

        let outcome = smoother
            .plan_path(&traj, &mut checker, None, &mut InterruptAfter(1))
            .unwrap();
        assert_eq!(outcome.status(), PlannerStatus::Interrupted);
    }
}
