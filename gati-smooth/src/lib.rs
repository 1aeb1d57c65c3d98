//! Time-parameterization and shortcutting of multi-DOF parabolic
//! trajectories.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   smoother                          │  ← plan_path facade
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌──────────────┬──────────────────────┬───────────────┐
//! │ initializer  │  merger, shortcutter │   trajectory  │  ← ingest / optimize / emit
//! └──────────────┴──────────────────────┴───────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   pipeline                          │  ← staged constraint checks
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │          constraints (capability traits)            │  ← host backends
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! The planner consumes the parabolic ramp math from `gati-ramp` and talks
//! to the host exclusively through the capability traits in
//! [`constraints`]: a configuration/path checker, an optional workspace
//! (manipulator) constraint evaluator, a uniform random source, and a
//! progress sink carrying the only cancellation signal.
//!
//! Planning is single-threaded and deterministic per seed. A typical call:
//!
//! ```
//! use gati_smooth::{
//!     NullProgress, ParabolicSmoother, PlanOutcome, SmootherConfig, Trajectory,
//! };
//! use gati_smooth::testing::BoxWorldChecker;
//!
//! let config = SmootherConfig::uniform(2, 3.0, 1.0, 2.0);
//! let mut smoother = ParabolicSmoother::new(config.clone()).unwrap();
//! let mut checker = BoxWorldChecker::new(&config);
//! let traj = Trajectory::from_waypoints(vec![vec![0.0, 0.0], vec![1.0, 0.5]]);
//! match smoother.plan_path(&traj, &mut checker, None, &mut NullProgress).unwrap() {
//!     PlanOutcome::Planned(t) => assert!(t.duration() > 0.0),
//!     PlanOutcome::Interrupted => unreachable!(),
//! }
//! ```

pub mod config;
pub mod constraints;
pub mod error;
pub mod testing;
pub mod trajectory;

mod initializer;
mod merger;
mod pipeline;
mod progress;
mod shortcutter;
mod smoother;

pub use config::SmootherConfig;
pub use constraints::{
    options, CheckCode, CheckReturn, CheckedConfigurations, ConstraintChecker, ManipChecker,
    NullProgress, ProgressAction, ProgressSink, SeededUniform, UniformSource,
};
pub use error::{Result, SmoothError};
pub use initializer::StopRegistry;
pub use progress::{PlanStats, PlannerStatus, ShortcutStatus};
pub use smoother::{ParabolicSmoother, PlanOutcome};
pub use trajectory::{Interpolation, Trajectory, TrajectoryPoint};
