//! Trajectory ingress and egress types.
//!
//! The host hands the planner a waypoint trajectory with a declared
//! interpolation; the planner hands back a fully timed piecewise-parabolic
//! trajectory (quadratic positions, linear velocities, per-point delta time,
//! waypoint markers at every parabolic join).

use serde::{Deserialize, Serialize};

/// Declared interpolation of an input trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// No declared interpolation.
    #[default]
    #[serde(rename = "")]
    Unspecified,
    Linear,
    Quadratic,
    Cubic,
}

/// One trajectory sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    /// Joint positions (length = DOF).
    pub positions: Vec<f64>,
    /// Joint velocities; optional on input, always present on output.
    #[serde(default)]
    pub velocities: Option<Vec<f64>>,
    /// Seconds since the previous point; optional on input, always present
    /// on output (0 for the first point).
    #[serde(default)]
    pub delta_time: Option<f64>,
    /// Marks a parabolic join in emitted trajectories.
    #[serde(default)]
    pub is_waypoint: bool,
}

impl TrajectoryPoint {
    /// A bare positional waypoint.
    pub fn positions(positions: Vec<f64>) -> Self {
        Self {
            positions,
            velocities: None,
            delta_time: None,
            is_waypoint: false,
        }
    }
}

/// A joint-space trajectory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trajectory {
    pub interpolation: Interpolation,
    pub points: Vec<TrajectoryPoint>,
}

impl Trajectory {
    /// An empty trajectory with the given interpolation.
    pub fn with_interpolation(interpolation: Interpolation) -> Self {
        Self {
            interpolation,
            points: Vec::new(),
        }
    }

    /// Build a piecewise-linear trajectory from bare waypoints.
    pub fn from_waypoints(waypoints: Vec<Vec<f64>>) -> Self {
        Self {
            interpolation: Interpolation::Linear,
            points: waypoints.into_iter().map(TrajectoryPoint::positions).collect(),
        }
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when the trajectory has no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Degrees of freedom, taken from the first point.
    pub fn dof(&self) -> usize {
        self.points.first().map(|p| p.positions.len()).unwrap_or(0)
    }

    /// True when every point past the first carries a delta time.
    pub fn has_timestamps(&self) -> bool {
        self.points.len() > 1 && self.points.iter().skip(1).all(|p| p.delta_time.is_some())
    }

    /// True when every point carries velocities.
    pub fn has_velocities(&self) -> bool {
        !self.points.is_empty() && self.points.iter().all(|p| p.velocities.is_some())
    }

    /// Total duration (sum of delta times; points without one count as 0).
    pub fn duration(&self) -> f64 {
        self.points
            .iter()
            .map(|p| p.delta_time.unwrap_or(0.0))
            .sum()
    }

    /// Sample positions and velocities at absolute time `t`, interpreting
    /// each interval as constant-acceleration (quadratic positions, linear
    /// velocities). Saturates at the endpoints. Returns `None` only for
    /// trajectories that cannot be sampled at all (no points, or missing
    /// velocities/timestamps).
    pub fn sample(&self, t: f64) -> Option<(Vec<f64>, Vec<f64>)> {
        if self.points.is_empty() {
            return None;
        }
        if self.points.len() == 1 || t <= 0.0 {
            let p = &self.points[0];
            return Some((p.positions.clone(), p.velocities.clone()?));
        }
        if !self.has_timestamps() || !self.has_velocities() {
            return None;
        }

        let mut acc = 0.0;
        for w in self.points.windows(2) {
            let dt = w[1].delta_time.unwrap_or(0.0);
            if t <= acc + dt && dt > 0.0 {
                let u = t - acc;
                let x0 = &w[0].positions;
                let v0 = w[0].velocities.as_ref()?;
                let v1 = w[1].velocities.as_ref()?;
                let mut q = Vec::with_capacity(x0.len());
                let mut dq = Vec::with_capacity(x0.len());
                for i in 0..x0.len() {
                    let a = (v1[i] - v0[i]) / dt;
                    q.push(x0[i] + u * (v0[i] + 0.5 * a * u));
                    dq.push(v0[i] + a * u);
                }
                return Some((q, dq));
            }
            acc += dt;
        }

        let last = self.points.last().expect("non-empty");
        Some((last.positions.clone(), last.velocities.clone()?))
    }
}
