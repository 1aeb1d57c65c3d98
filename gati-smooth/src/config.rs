//! Configuration loading for the smoother.

use crate::error::{Result, SmoothError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SmootherConfig {
    /// Lower joint position limits (length = DOF).
    pub x_lower: Vec<f64>,

    /// Upper joint position limits.
    pub x_upper: Vec<f64>,

    /// Per-joint velocity limits (> 0).
    pub vel_max: Vec<f64>,

    /// Per-joint acceleration limits (> 0).
    pub accel_max: Vec<f64>,

    /// Tolerance handed to the external constraint checker (default: 0.01)
    #[serde(default = "default_point_tolerance")]
    pub point_tolerance: f64,

    /// Discretization step for constraint checking in seconds (default: 0.001)
    #[serde(default = "default_step_length")]
    pub step_length: f64,

    /// Shortcut iteration budget; values <= 0 fall back to 100.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: i64,

    /// Name of the manipulator whose workspace speed/accel is capped.
    /// Empty disables manipulator constraints.
    #[serde(default)]
    pub manip_name: String,

    /// Workspace speed cap for the manipulator (0 disables).
    #[serde(default)]
    pub max_manip_speed: f64,

    /// Workspace acceleration cap for the manipulator (0 disables).
    #[serde(default)]
    pub max_manip_accel: f64,

    /// Cosine threshold above which the checker may bend probe segments
    /// toward the constraint manifold. Values > -1 enable the checker-side
    /// configuration modification path (default: -1, disabled).
    #[serde(default = "default_cos_manip_angle_thresh")]
    pub cos_manip_angle_thresh: f64,

    /// Run the full constraint stack over the initial path (default: true).
    #[serde(default = "default_verify_initial_path")]
    pub verify_initial_path: bool,

    /// Seed for the planning sampler. Planning is deterministic per seed.
    #[serde(default)]
    pub random_seed: u64,

    /// After a successful shortcut the start-time vel/accel multipliers are
    /// relaxed by the inverse of this factor (default: 0.8).
    #[serde(default = "default_search_vel_accel_mult")]
    pub search_vel_accel_mult: f64,

    /// Use per-DOF reduction factors reported by the manipulator checker
    /// instead of scalar multiplier scaling (default: true).
    #[serde(default = "default_use_reduction_factors")]
    pub use_reduction_factors: bool,

    /// Directory for debug dumps (paths, parameters). None disables dumping.
    #[serde(default)]
    pub dump_dir: Option<PathBuf>,
}

// Default value functions
fn default_point_tolerance() -> f64 {
    0.01
}
fn default_step_length() -> f64 {
    0.001
}
fn default_max_iterations() -> i64 {
    100
}
fn default_cos_manip_angle_thresh() -> f64 {
    -1.0
}
fn default_verify_initial_path() -> bool {
    true
}
fn default_search_vel_accel_mult() -> f64 {
    0.8
}
fn default_use_reduction_factors() -> bool {
    true
}

impl SmootherConfig {
    /// Uniform limits for `dof` joints; handy for tests and examples.
    pub fn uniform(dof: usize, x_bound: f64, vel: f64, accel: f64) -> Self {
        Self {
            x_lower: vec![-x_bound; dof],
            x_upper: vec![x_bound; dof],
            vel_max: vec![vel; dof],
            accel_max: vec![accel; dof],
            point_tolerance: default_point_tolerance(),
            step_length: default_step_length(),
            max_iterations: default_max_iterations(),
            manip_name: String::new(),
            max_manip_speed: 0.0,
            max_manip_accel: 0.0,
            cos_manip_angle_thresh: default_cos_manip_angle_thresh(),
            verify_initial_path: default_verify_initial_path(),
            random_seed: 0,
            search_vel_accel_mult: default_search_vel_accel_mult(),
            use_reduction_factors: default_use_reduction_factors(),
            dump_dir: None,
        }
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SmoothError::Config(format!("Failed to read config file: {}", e)))?;
        let config: SmootherConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Number of degrees of freedom.
    #[inline]
    pub fn dof(&self) -> usize {
        self.x_lower.len()
    }

    /// Iteration budget with the <= 0 fallback applied.
    #[inline]
    pub fn iterations(&self) -> usize {
        if self.max_iterations <= 0 {
            100
        } else {
            self.max_iterations as usize
        }
    }

    /// Whether manipulator workspace constraints are active.
    #[inline]
    pub fn has_manip_constraints(&self) -> bool {
        !self.manip_name.is_empty() && (self.max_manip_speed > 0.0 || self.max_manip_accel > 0.0)
    }

    /// Whether the external checker may modify probed configurations.
    #[inline]
    pub fn expects_modified_configurations(&self) -> bool {
        self.cos_manip_angle_thresh > -1.0 + 1e-8
    }

    /// Check dimensional and sign consistency.
    pub fn validate(&self) -> Result<()> {
        let dof = self.dof();
        if dof == 0 {
            return Err(SmoothError::Config("zero degrees of freedom".into()));
        }
        for (name, v) in [
            ("x_upper", &self.x_upper),
            ("vel_max", &self.vel_max),
            ("accel_max", &self.accel_max),
        ] {
            if v.len() != dof {
                return Err(SmoothError::Config(format!(
                    "{} has length {}, expected {}",
                    name,
                    v.len(),
                    dof
                )));
            }
        }
        for i in 0..dof {
            if self.x_lower[i] > self.x_upper[i] {
                return Err(SmoothError::Config(format!(
                    "x_lower[{}] > x_upper[{}]",
                    i, i
                )));
            }
            if self.vel_max[i] <= 0.0 || self.accel_max[i] <= 0.0 {
                return Err(SmoothError::Config(format!(
                    "non-positive velocity or acceleration limit at joint {}",
                    i
                )));
            }
        }
        if self.point_tolerance <= 0.0 {
            return Err(SmoothError::Config("point_tolerance must be > 0".into()));
        }
        if self.step_length <= 0.0 {
            return Err(SmoothError::Config("step_length must be > 0".into()));
        }
        if !(0.0 < self.search_vel_accel_mult && self.search_vel_accel_mult <= 1.0) {
            return Err(SmoothError::Config(
                "search_vel_accel_mult must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}
