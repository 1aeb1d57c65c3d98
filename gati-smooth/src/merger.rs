//! Deterministic removal of forced stops.
//!
//! Walks the stop registry in order and tries to bridge each stop's
//! neighborhood (the ramp entering it through the ramp leaving it) with one
//! smooth segment. Runs before the randomized shortcutter so the obvious
//! stop-and-go structure of piecewise-linear input disappears first.

use gati_ramp::{total_duration, ParabolicPath};

use crate::initializer::StopRegistry;
use crate::progress::ShortcutStatus;
use crate::shortcutter::{Attempt, PlanDeps, RunOutcome, Shortcutter};

pub(crate) struct Merger;

impl Merger {
    /// Try to merge away every stop in the registry.
    pub fn run(
        engine: &mut Shortcutter,
        path: &mut ParabolicPath,
        stops: &mut StopRegistry,
        deps: &mut PlanDeps<'_>,
    ) -> RunOutcome {
        engine.reset_run_state();
        let original_duration = path.duration();
        let mut commits = 0usize;

        let mut index = 0usize;
        while index < stops.len() {
            let (t0, t1) = stops.neighborhoods[index];
            match engine.attempt_window(t0, t1, path, deps) {
                Attempt::Interrupted => {
                    return RunOutcome {
                        commits,
                        interrupted: true,
                    }
                }
                Attempt::Rejected(status) => {
                    deps.stats.record(status);
                    index += 1;
                }
                Attempt::Accepted {
                    cur_vel_mult,
                    cur_accel_mult,
                } => {
                    deps.stats.record(ShortcutStatus::Successful);
                    commits += 1;

                    let segment_time = total_duration(&engine.accepted);
                    let diff = (t1 - t0) - segment_time;
                    stops.commit_window(t0, t1, diff);
                    engine.note_success(cur_vel_mult, cur_accel_mult);
                    path.replace_segment(t0, t1, &engine.accepted);
                    log::debug!(
                        "merged the stop at index {}: saved {:.6e} s, duration now {:.6e}",
                        index,
                        diff,
                        path.duration()
                    );
                    // The registry shifted down over the removed stop; the
                    // same index now names the next one.
                }
            }
        }

        log::debug!(
            "merging finished: {} merges, duration {:.6e} -> {:.6e}",
            commits,
            original_duration,
            path.duration()
        );
        RunOutcome {
            commits,
            interrupted: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SmootherConfig;
    use crate::constraints::{NullProgress, SeededUniform};
    use crate::pipeline::FeasibilityPipeline;
    use crate::progress::PlanStats;
    use crate::testing::BoxWorldChecker;
    use gati_ramp::Interpolator;

    /// Build a stop-at-every-waypoint path over the given 1-DOF waypoints.
    fn stop_path(
        interp: &mut Interpolator,
        waypoints: &[f64],
    ) -> (ParabolicPath, StopRegistry) {
        let mut path = ParabolicPath::new();
        let mut stops = StopRegistry::default();
        let mut out = Vec::new();
        for w in waypoints.windows(2) {
            assert!(interp.zero_vel_nd(&[w[0]], &[w[1]], &[1.0], &[1.0], &mut out));
            let first_ramp = out.first().unwrap().duration();
            let last_ramp = out.last().unwrap().duration();
            let chunk: f64 = out.iter().map(|s| s.duration()).sum();
            let start = path.duration();
            for seg in out.drain(..) {
                path.append(seg);
            }
            if start > 0.0 {
                if let Some(n) = stops.neighborhoods.last_mut() {
                    n.1 += first_ramp;
                }
            }
            stops.times.push(start + chunk);
            stops.neighborhoods.push((start + chunk - last_ramp, start + chunk));
        }
        stops.times.pop();
        stops.neighborhoods.pop();
        (path, stops)
    }

    #[test]
    fn test_merge_removes_interior_stops() {
        let config = SmootherConfig::uniform(1, 10.0, 1.0, 1.0);
        let mut interp = Interpolator::new(1);
        let (mut path, mut stops) = stop_path(&mut interp, &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(stops.len(), 2);
        let before = path.duration();

        let mut pipeline = FeasibilityPipeline::new(&config);
        let mut checker = BoxWorldChecker::new(&config);
        let mut rng = SeededUniform::new(0);
        let mut progress = NullProgress;
        let mut iteration = 0;
        let mut stats = PlanStats::default();
        let mut deps = PlanDeps {
            interpolator: &mut interp,
            pipeline: &mut pipeline,
            checker: &mut checker,
            manip: None,
            progress: &mut progress,
            rng: &mut rng,
            iteration: &mut iteration,
            stats: &mut stats,
        };

        let mut engine = Shortcutter::new(&config);
        let outcome = Merger::run(&mut engine, &mut path, &mut stops, &mut deps);
        assert!(!outcome.interrupted);
        assert!(outcome.commits >= 1);
        assert!(stops.len() < 2);
        assert!(path.duration() < before);
        // Joins stay continuous after splicing.
        for w in path.segments().windows(2) {
            assert!((w[0].x1()[0] - w[1].x0()[0]).abs() < 1e-8);
            assert!((w[0].v1()[0] - w[1].v0()[0]).abs() < 1e-8);
        }
    }

    #[test]
    fn test_merge_on_empty_registry_is_noop() {
        let config = SmootherConfig::uniform(1, 10.0, 1.0, 1.0);
        let mut interp = Interpolator::new(1);
        let (mut path, mut stops) = stop_path(&mut interp, &[0.0, 1.0]);
        assert!(stops.is_empty());
        let before = path.duration();

        let mut pipeline = FeasibilityPipeline::new(&config);
        let mut checker = BoxWorldChecker::new(&config);
        let mut rng = SeededUniform::new(0);
        let mut progress = NullProgress;
        let mut iteration = 0;
        let mut stats = PlanStats::default();
        let mut deps = PlanDeps {
            interpolator: &mut interp,
            pipeline: &mut pipeline,
            checker: &mut checker,
            manip: None,
            progress: &mut progress,
            rng: &mut rng,
            iteration: &mut iteration,
            stats: &mut stats,
        };

        let mut engine = Shortcutter::new(&config);
        let outcome = Merger::run(&mut engine, &mut path, &mut stops, &mut deps);
        assert_eq!(outcome.commits, 0);
        assert!((path.duration() - before).abs() < 1e-12);
    }
}
