//! Parabolic ramp mathematics for multi-DOF trajectories.
//!
//! The crate is layered bottom-up:
//!
//! - [`profile`]: 1-DOF piecewise-parabolic profiles and the two boundary
//!   solvers (minimum time, fixed duration)
//! - [`segment`]: the N-DOF constant-acceleration [`Segment`]
//! - [`check`]: validation of segments against kinematic limits
//! - [`interpolator`]: N-DOF two-point boundary interpolation with
//!   synchronized joins
//! - [`path`]: the [`ParabolicPath`] container with time lookup and
//!   windowed segment replacement

pub mod check;
pub mod interpolator;
pub mod path;
pub mod profile;
pub mod segment;

/// Numeric tolerance for comparing durations, positions and velocities at
/// segment joins. Distinct from (and much finer than) the point tolerances
/// used by external constraint checkers.
pub const RAMP_EPSILON: f64 = 1e-10;

pub use check::{check_segment, check_segments, SegmentCheck};
pub use interpolator::Interpolator;
pub use path::ParabolicPath;
pub use profile::{Phase, Profile};
pub use segment::{total_duration, Segment};
