//! End-to-end planning scenarios against the simulated box world.

use approx::assert_relative_eq;

use gati_smooth::testing::{BoxWorldChecker, IdentityManipChecker};
use gati_smooth::{
    Interpolation, NullProgress, ParabolicSmoother, PlanOutcome, PlannerStatus, ShortcutStatus,
    SmootherConfig, Trajectory,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn plan(
    config: &SmootherConfig,
    checker: &mut BoxWorldChecker,
    traj: &Trajectory,
) -> (ParabolicSmoother, Trajectory) {
    let mut smoother = ParabolicSmoother::new(config.clone()).unwrap();
    let outcome = smoother
        .plan_path(traj, checker, None, &mut NullProgress)
        .unwrap();
    match outcome {
        PlanOutcome::Planned(t) => (smoother, t),
        PlanOutcome::Interrupted => panic!("unexpected interrupt"),
    }
}

/// Check the §-invariants every accepted output must satisfy: quadratic
/// interpolation, end-to-end sampleability, velocity limits at joins.
fn assert_output_invariants(planned: &Trajectory, config: &SmootherConfig) {
    assert_eq!(planned.interpolation, Interpolation::Quadratic);
    assert!(planned.duration().is_finite());
    let n = 128;
    for k in 0..=n {
        let t = planned.duration() * k as f64 / n as f64;
        let (q, dq) = planned.sample(t).expect("sampleable end to end");
        for j in 0..config.dof() {
            assert!(q[j] >= config.x_lower[j] - 1e-6, "position under bound");
            assert!(q[j] <= config.x_upper[j] + 1e-6, "position over bound");
            assert!(dq[j].abs() <= config.vel_max[j] + 1e-6, "velocity over limit");
        }
    }
    for point in planned.points.iter() {
        assert!(point.is_waypoint);
        assert!(point.delta_time.is_some());
        assert!(point.velocities.is_some());
    }
}

#[test]
fn test_straight_line_rest_to_rest() {
    init_logging();
    let config = SmootherConfig::uniform(2, 5.0, 1.0, 1.0);
    let mut checker = BoxWorldChecker::new(&config);
    let traj = Trajectory::from_waypoints(vec![vec![0.0, 0.0], vec![1.0, 0.0]]);

    let (_, planned) = plan(&config, &mut checker, &traj);
    // Bang-bang over a unit move with unit limits takes exactly 2 s.
    assert_relative_eq!(planned.duration(), 2.0, epsilon = 1e-6);
    assert_output_invariants(&planned, &config);

    let (q, dq) = planned.sample(planned.duration()).unwrap();
    assert_relative_eq!(q[0], 1.0, epsilon = 1e-6);
    assert!(dq[0].abs() < 1e-6);
}

#[test]
fn test_collinear_waypoints_collapse_before_milestones() {
    init_logging();
    let config = SmootherConfig::uniform(1, 5.0, 1.0, 1.0);
    let mut checker = BoxWorldChecker::new(&config);
    let traj = Trajectory::from_waypoints(vec![vec![0.0], vec![1.0], vec![2.0]]);

    let (_, planned) = plan(&config, &mut checker, &traj);
    // The interior collinear waypoint never becomes a stop: the whole move
    // is one trapezoid (1 s up, 1 s cruise, 1 s down).
    assert_relative_eq!(planned.duration(), 3.0, epsilon = 1e-6);
    assert_output_invariants(&planned, &config);
}

#[test]
fn test_projected_midpoint_densifies() {
    init_logging();
    let config = SmootherConfig::uniform(2, 5.0, 1.0, 1.0);
    let mut checker = BoxWorldChecker::new(&config);
    // Half-steps longer than 0.5 project 0.1 away from the straight line,
    // far enough (0.01 squared > 1e-5) to force a densified midpoint.
    checker.neigh_bend = Some((0.5, vec![0.1, 0.0]));
    let traj = Trajectory::from_waypoints(vec![vec![0.0, 0.0], vec![1.0, 1.0]]);

    let (smoother, planned) = plan(&config, &mut checker, &traj);
    assert_output_invariants(&planned, &config);
    // The inserted midpoint shows up as shortcut/merge work on its stop.
    assert!(smoother.stats().total_attempts() > 0);
}

#[test]
fn test_zigzag_stops_merge_and_shorten() {
    init_logging();
    let config = SmootherConfig::uniform(2, 10.0, 1.0, 2.0);
    let mut checker = BoxWorldChecker::new(&config);
    // 7 non-collinear waypoints: 5 interior forced stops.
    let traj = Trajectory::from_waypoints(vec![
        vec![0.0, 0.0],
        vec![1.0, 0.2],
        vec![2.0, -0.2],
        vec![3.0, 0.2],
        vec![4.0, -0.2],
        vec![5.0, 0.2],
        vec![6.0, 0.0],
    ]);

    let mut reference = ParabolicSmoother::new(config.clone()).unwrap();
    let outcome = reference
        .plan_path(&traj, &mut checker, None, &mut NullProgress)
        .unwrap();
    let planned = match outcome {
        PlanOutcome::Planned(t) => t,
        PlanOutcome::Interrupted => panic!(),
    };

    assert!(reference.stats().merges + reference.stats().shortcuts >= 1);
    // Stop-at-every-waypoint takes 1.5 s per chunk (the x axis dominates
    // every move): 9 s in total. Optimization must beat that strictly.
    assert!(planned.duration() < 9.0 - 1e-3);
    assert_output_invariants(&planned, &config);
}

#[test]
fn test_obstacle_keeps_path_collision_free() {
    init_logging();
    let config = SmootherConfig::uniform(2, 10.0, 1.0, 2.0);
    let mut checker = BoxWorldChecker::new(&config);
    // A block sits between the elbow waypoints; shortcuts across it must be
    // rejected, so the elbow survives smoothing.
    checker.add_obstacle(vec![0.8, -0.5], vec![1.6, 0.6]);
    let traj = Trajectory::from_waypoints(vec![
        vec![0.0, 0.0],
        vec![1.2, 1.0],
        vec![2.4, 0.0],
    ]);

    let (_, planned) = plan(&config, &mut checker, &traj);
    assert_output_invariants(&planned, &config);
    let n = 256;
    for k in 0..=n {
        let t = planned.duration() * k as f64 / n as f64;
        let (q, _) = planned.sample(t).unwrap();
        let inside = q[0] >= 0.8 && q[0] <= 1.6 && q[1] >= -0.5 && q[1] <= 0.6;
        assert!(!inside, "sampled configuration {:?} is inside the obstacle", q);
    }
}

#[test]
fn test_non_improving_windows_are_counted_not_checked() {
    init_logging();
    let config = SmootherConfig::uniform(1, 5.0, 1.0, 1.0);
    let mut checker = BoxWorldChecker::new(&config);
    // Two collinear-free waypoints: the initial path is already optimal, so
    // every shortcut window is rejected for lack of improvement.
    let traj = Trajectory::from_waypoints(vec![vec![0.0], vec![1.0]]);

    let (smoother, planned) = plan(&config, &mut checker, &traj);
    assert_relative_eq!(planned.duration(), 2.0, epsilon = 1e-6);
    let stats = smoother.stats();
    assert_eq!(stats.shortcuts, 0);
    assert!(
        stats.count(ShortcutStatus::InterpolatedSegmentTooLong)
            + stats.count(ShortcutStatus::TimeInstantsTooClose)
            + stats.count(ShortcutStatus::RedundantShortcut)
            > 0
    );
}

#[test]
fn test_manip_accel_cap_forces_slowdowns() {
    init_logging();
    let mut config = SmootherConfig::uniform(2, 10.0, 1.0, 2.0);
    config.manip_name = "tool".into();
    // Joint accel limits allow |a| up to 2 per joint, but the workspace cap
    // is far lower, so candidates must slow down to pass.
    config.max_manip_accel = 0.8;
    let mut smoother = ParabolicSmoother::new(config.clone()).unwrap();
    let mut checker = BoxWorldChecker::new(&config);
    let mut manip = IdentityManipChecker::new(0.0, config.max_manip_accel);

    let traj = Trajectory::from_waypoints(vec![
        vec![0.0, 0.0],
        vec![1.0, 0.3],
        vec![2.0, 0.0],
    ]);
    let outcome = smoother
        .plan_path(&traj, &mut checker, Some(&mut manip), &mut NullProgress)
        .unwrap();
    let planned = match outcome {
        PlanOutcome::Planned(t) => t,
        PlanOutcome::Interrupted => panic!(),
    };
    assert_output_invariants(&planned, &config);

    // Every emitted interval respects the workspace acceleration cap under
    // the identity Jacobian.
    for w in planned.points.windows(2) {
        let dt = w[1].delta_time.unwrap();
        if dt <= 1e-9 {
            continue;
        }
        let v0 = w[0].velocities.as_ref().unwrap();
        let v1 = w[1].velocities.as_ref().unwrap();
        let accel_norm: f64 = (0..2)
            .map(|j| ((v1[j] - v0[j]) / dt).powi(2))
            .sum::<f64>()
            .sqrt();
        assert!(
            accel_norm <= config.max_manip_accel + 1e-6,
            "workspace accel {} exceeds cap",
            accel_norm
        );
    }
}

#[test]
fn test_determinism_per_seed() {
    init_logging();
    let mut config = SmootherConfig::uniform(2, 10.0, 1.0, 2.0);
    config.random_seed = 17;
    let traj = Trajectory::from_waypoints(vec![
        vec![0.0, 0.0],
        vec![1.0, 0.4],
        vec![2.0, -0.4],
        vec![3.0, 0.0],
    ]);

    let mut durations = Vec::new();
    for _ in 0..2 {
        let mut checker = BoxWorldChecker::new(&config);
        let (_, planned) = plan(&config, &mut checker, &traj);
        durations.push(planned.duration());
    }
    assert_eq!(durations[0].to_bits(), durations[1].to_bits());
}

#[test]
fn test_interrupt_returns_interrupted_status() {
    init_logging();
    struct CountingInterrupter {
        calls: u64,
        limit: u64,
    }
    impl gati_smooth::ProgressSink for CountingInterrupter {
        fn on_progress(&mut self, _iteration: u64) -> gati_smooth::ProgressAction {
            self.calls += 1;
            if self.calls > self.limit {
                gati_smooth::ProgressAction::Interrupt
            } else {
                gati_smooth::ProgressAction::Continue
            }
        }
    }

    let config = SmootherConfig::uniform(1, 10.0, 1.0, 1.0);
    let mut smoother = ParabolicSmoother::new(config.clone()).unwrap();
    let mut checker = BoxWorldChecker::new(&config);
    let traj = Trajectory::from_waypoints(vec![vec![0.0], vec![1.0], vec![2.5]]);

    let mut sink = CountingInterrupter { calls: 0, limit: 3 };
    let outcome = smoother
        .plan_path(&traj, &mut checker, None, &mut sink)
        .unwrap();
    assert_eq!(outcome.status(), PlannerStatus::Interrupted);
}
