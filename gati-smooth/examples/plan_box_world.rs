//! Smooth a zigzag joint path through a simulated box world.
//!
//! Run with: `cargo run --example plan_box_world`

use gati_smooth::testing::BoxWorldChecker;
use gati_smooth::{
    NullProgress, ParabolicSmoother, PlanOutcome, SmootherConfig, Trajectory,
};

fn main() {
    env_logger::init();

    let mut config = SmootherConfig::uniform(2, 10.0, 1.0, 2.0);
    config.random_seed = 42;
    config.max_iterations = 200;

    let mut checker = BoxWorldChecker::new(&config);
    checker.add_obstacle(vec![1.3, -0.4], vec![1.7, 0.1]);

    let traj = Trajectory::from_waypoints(vec![
        vec![0.0, 0.0],
        vec![1.0, 0.5],
        vec![2.0, -0.5],
        vec![3.0, 0.5],
        vec![4.0, 0.0],
    ]);

    let mut smoother = ParabolicSmoother::new(config).expect("valid config");
    match smoother
        .plan_path(&traj, &mut checker, None, &mut NullProgress)
        .expect("planning failed")
    {
        PlanOutcome::Planned(planned) => {
            let stats = smoother.stats();
            println!(
                "planned {} waypoints over {:.3} s ({} merges, {} shortcuts, {} slowdowns)",
                planned.len(),
                planned.duration(),
                stats.merges,
                stats.shortcuts,
                stats.slow_downs,
            );
            let steps = 10;
            for k in 0..=steps {
                let t = planned.duration() * k as f64 / steps as f64;
                let (q, dq) = planned.sample(t).expect("sampleable");
                println!(
                    "t={:5.2}  q=({:6.3}, {:6.3})  dq=({:6.3}, {:6.3})",
                    t, q[0], q[1], dq[0], dq[1]
                );
            }
        }
        PlanOutcome::Interrupted => println!("planning interrupted"),
    }
}
