//! Ingestion of input trajectories into an initial parabolic path.
//!
//! Dispatches on the declared interpolation: quadratic input with timestamps
//! converts directly, cubic input converts piecewise (re-interpolating the
//! genuinely cubic pieces), and everything else is reduced to waypoints and
//! time-parameterized as a path that stops at every waypoint.

use gati_ramp::{Interpolator, ParabolicPath, Segment};

use crate::config::SmootherConfig;
use crate::constraints::{
    options, reborrow_manip, CheckCode, ConstraintChecker, ManipChecker, ProgressAction,
    ProgressSink,
};
use crate::error::{Result, SmoothError};
use crate::pipeline::FeasibilityPipeline;

/// Epsilon used for timestamp and coarse linear comparisons.
pub(crate) const LINEAR_EPSILON: f64 = 1e-8;

/// Squared-distance threshold above which a constraint-projected midpoint is
/// inserted as an extra waypoint.
const DENSIFY_DIST_THRESH: f64 = 1e-5;
/// Consecutive densification expansions allowed before giving up.
const MAX_CONSECUTIVE_EXPANSIONS: i32 = 10;
/// Collinearity threshold on |dot^2 - |a|^2 |b|^2|.
const COLLINEAR_THRESH: f64 = 1e-14;
/// Limit-scaling attempts per waypoint pair.
const MAX_SCALE_TRIES: usize = 1000;

/// Registry of forced full stops in the current path.
///
/// Entries are absolute times, paired with the bounds of the segments
/// entering and leaving the stop. Successful shortcut commits remove stops
/// inside the window and shift later ones by the saved duration.
#[derive(Debug, Clone, Default)]
pub struct StopRegistry {
    pub times: Vec<f64>,
    pub neighborhoods: Vec<(f64, f64)>,
}

impl StopRegistry {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn clear(&mut self) {
        self.times.clear();
        self.neighborhoods.clear();
    }

    /// Account for a committed shortcut over `[t0, t1]` that saved `diff`
    /// seconds: stops in `(t0, t1]` disappear, later stops (and their
    /// neighborhoods) shift left.
    pub fn commit_window(&mut self, t0: f64, t1: f64, diff: f64) {
        let mut write = 0;
        for read in 0..self.times.len() {
            if self.times[read] <= t0 {
                if write != read {
                    self.times[write] = self.times[read];
                    self.neighborhoods[write] = self.neighborhoods[read];
                }
                write += 1;
            } else if self.times[read] <= t1 {
                // Swallowed by the shortcut.
            } else {
                self.times[write] = self.times[read] - diff;
                let (a, b) = self.neighborhoods[read];
                self.neighborhoods[write] = (a - diff, b - diff);
                write += 1;
            }
        }
        self.times.truncate(write);
        self.neighborhoods.truncate(write);
    }
}

/// Result of ingesting the input trajectory.
pub(crate) struct InitialPath {
    pub path: ParabolicPath,
    pub stops: StopRegistry,
    /// Longest sub-path between two consecutive stops; bounds shortcut
    /// window widths later.
    pub max_initial_ramp_time: f64,
    /// True when the input was modeled exactly (linear or quadratic).
    pub perfectly_modeled: bool,
}

pub(crate) enum IngestOutcome {
    Ready(InitialPath),
    Interrupted,
}

/// Converts input trajectories into stop-at-every-waypoint parabolic paths.
pub(crate) struct Initializer {
    // Scratch
    vel_limits: Vec<f64>,
    accel_limits: Vec<f64>,
    ramp_out: Vec<Segment>,
    check_out: Vec<Segment>,
    qa: Vec<f64>,
    qb: Vec<f64>,
    va: Vec<f64>,
    vb: Vec<f64>,
}

impl Initializer {
    pub fn new(ndof: usize) -> Self {
        Self {
            vel_limits: vec![0.0; ndof],
            accel_limits: vec![0.0; ndof],
            ramp_out: Vec::new(),
            check_out: Vec::new(),
            qa: vec![0.0; ndof],
            qb: vec![0.0; ndof],
            va: vec![0.0; ndof],
            vb: vec![0.0; ndof],
        }
    }

    /// Ingest `traj` into an initial path.
    #[allow(clippy::too_many_arguments)]
    pub fn ingest(
        &mut self,
        config: &SmootherConfig,
        interpolator: &mut Interpolator,
        pipeline: &mut FeasibilityPipeline,
        checker: &mut dyn ConstraintChecker,
        mut manip: Option<&mut dyn ManipChecker>,
        progress: &mut dyn ProgressSink,
        iteration: &mut u64,
        traj: &crate::trajectory::Trajectory,
    ) -> Result<IngestOutcome> {
        use crate::trajectory::Interpolation;

        if traj.len() < 2 {
            return Err(SmoothError::Input(
                "input trajectory needs at least 2 waypoints".into(),
            ));
        }
        if traj.dof() != config.dof() {
            return Err(SmoothError::Input(format!(
                "input has {} DOF, config has {}",
                traj.dof(),
                config.dof()
            )));
        }

        let timed = traj.has_timestamps() && traj.has_velocities();
        match traj.interpolation {
            Interpolation::Quadratic if timed => {
                log::debug!("initial trajectory is piecewise quadratic");
                Ok(IngestOutcome::Ready(self.ingest_quadratic(config, traj)))
            }
            Interpolation::Cubic if timed => {
                log::debug!("initial trajectory is piecewise cubic");
                self.ingest_cubic(
                    config,
                    interpolator,
                    pipeline,
                    checker,
                    reborrow_manip(&mut manip),
                    traj,
                )
            }
            _ => {
                log::debug!(
                    "initial trajectory is piecewise linear or has unspecified interpolation"
                );
                let waypoints = self.extract_waypoints(traj);
                let perfectly_modeled = matches!(
                    traj.interpolation,
                    Interpolation::Linear | Interpolation::Unspecified
                );
                self.set_milestones(
                    config,
                    interpolator,
                    pipeline,
                    checker,
                    manip,
                    progress,
                    iteration,
                    waypoints,
                    perfectly_modeled,
                )
            }
        }
    }

    /// Quadratic input with timestamps converts segment by segment.
    fn ingest_quadratic(
        &mut self,
        config: &SmootherConfig,
        traj: &crate::trajectory::Trajectory,
    ) -> InitialPath {
        let mut path = ParabolicPath::new();
        let mut max_ramp = 0.0f64;
        for w in traj.points.windows(2) {
            let dt = w[1].delta_time.unwrap_or(0.0);
            if dt <= LINEAR_EPSILON {
                continue;
            }
            let v0 = w[0].velocities.as_deref().expect("timed input");
            let v1 = w[1].velocities.as_deref().expect("timed input");
            let mut seg =
                Segment::from_boundary(&w[0].positions, &w[1].positions, v0, v1, dt);
            if !config.verify_initial_path {
                seg.constraint_checked = true;
            }
            max_ramp = max_ramp.max(dt);
            path.append(seg);
        }
        InitialPath {
            path,
            stops: StopRegistry::default(),
            max_initial_ramp_time: max_ramp,
            perfectly_modeled: true,
        }
    }

    /// Cubic input: pieces whose cubic coefficient vanishes pass through as
    /// quadratic; the rest are re-interpolated with zero-velocity endpoints.
    fn ingest_cubic(
        &mut self,
        config: &SmootherConfig,
        interpolator: &mut Interpolator,
        pipeline: &mut FeasibilityPipeline,
        checker: &mut dyn ConstraintChecker,
        mut manip: Option<&mut dyn ManipChecker>,
        traj: &crate::trajectory::Trajectory,
    ) -> Result<IngestOutcome> {
        let mut path = ParabolicPath::new();
        let mut max_ramp = 0.0f64;
        for w in traj.points.windows(2) {
            let dt = w[1].delta_time.unwrap_or(0.0);
            if dt <= LINEAR_EPSILON {
                continue;
            }
            let x0 = &w[0].positions;
            let x1 = &w[1].positions;
            let v0 = w[0].velocities.as_deref().expect("timed input");
            let v1 = w[1].velocities.as_deref().expect("timed input");

            let idt = 1.0 / dt;
            let idt2 = idt * idt;
            let is_parabolic = (0..x0.len()).all(|j| {
                let coeff = (2.0 * idt * (x0[j] - x1[j]) + v0[j] + v1[j]) * idt2;
                coeff.abs() <= 1e-5
            });

            if is_parabolic {
                let mut seg = Segment::from_boundary(x0, x1, v0, v1, dt);
                if !config.verify_initial_path {
                    seg.constraint_checked = true;
                }
                max_ramp = max_ramp.max(seg.duration());
                path.append(seg);
            } else {
                // Genuinely cubic: replace the piece by a stop-to-stop
                // parabolic chunk, checking only time-based constraints since
                // shortcutting will rework it anyway.
                if !self.ramp_with_zero_vel_endpoints(
                    config,
                    interpolator,
                    pipeline,
                    checker,
                    reborrow_manip(&mut manip),
                    x0,
                    x1,
                    options::TIME_BASED,
                ) {
                    return Err(SmoothError::InitialPath(
                        "failed to initialize from cubic waypoints".into(),
                    ));
                }
                let mut chunk_duration = 0.0;
                for seg in self.ramp_out.drain(..) {
                    chunk_duration += seg.duration();
                    path.append(seg);
                }
                max_ramp = max_ramp.max(chunk_duration);
            }
        }
        Ok(IngestOutcome::Ready(InitialPath {
            path,
            stops: StopRegistry::default(),
            max_initial_ramp_time: max_ramp,
            perfectly_modeled: false,
        }))
    }

    /// Reduce a trajectory to waypoints, dropping collinear and duplicate
    /// consecutive points.
    fn extract_waypoints(&self, traj: &crate::trajectory::Trajectory) -> Vec<Vec<f64>> {
        let mut waypoints: Vec<Vec<f64>> = Vec::with_capacity(traj.len());
        for point in &traj.points {
            let q = &point.positions;

            if waypoints.len() > 1 {
                let x0 = &waypoints[waypoints.len() - 2];
                let x1 = &waypoints[waypoints.len() - 1];
                let mut dot = 0.0;
                let mut len0 = 0.0;
                let mut len1 = 0.0;
                for i in 0..q.len() {
                    let d0 = x0[i] - q[i];
                    let d1 = x1[i] - q[i];
                    dot += d0 * d1;
                    len0 += d0 * d0;
                    len1 += d1 * d1;
                }
                if (dot * dot - len0 * len1).abs() < COLLINEAR_THRESH {
                    // The middle point lies on the segment; absorb it.
                    let last = waypoints.len() - 1;
                    waypoints[last].copy_from_slice(q);
                    continue;
                }
            }

            if let Some(prev) = waypoints.last() {
                let dist: f64 = q
                    .iter()
                    .zip(prev.iter())
                    .map(|(&a, &b)| (a - b).abs())
                    .sum();
                if dist <= q.len() as f64 * f64::EPSILON {
                    continue;
                }
            }

            waypoints.push(q.clone());
        }
        waypoints
    }

    /// Time-parameterize waypoints into a path that stops at every waypoint,
    /// recording each interior stop in the registry.
    #[allow(clippy::too_many_arguments)]
    fn set_milestones(
        &mut self,
        config: &SmootherConfig,
        interpolator: &mut Interpolator,
        pipeline: &mut FeasibilityPipeline,
        checker: &mut dyn ConstraintChecker,
        mut manip: Option<&mut dyn ManipChecker>,
        progress: &mut dyn ProgressSink,
        iteration: &mut u64,
        waypoints: Vec<Vec<f64>>,
        perfectly_modeled: bool,
    ) -> Result<IngestOutcome> {
        let mut path = ParabolicPath::new();
        let mut stops = StopRegistry::default();
        let mut max_ramp = 0.0f64;

        log::debug!("initial waypoint count: {}", waypoints.len());
        if waypoints.len() == 1 {
            path.append(Segment::constant(&waypoints[0], 0.0));
            return Ok(IngestOutcome::Ready(InitialPath {
                path,
                stops,
                max_initial_ramp_time: max_ramp,
                perfectly_modeled,
            }));
        }

        let (waypoints, force_checking) =
            self.densify_waypoints(config, checker, waypoints)?;

        let check_options = options::TIME_BASED;
        let num_waypoints = waypoints.len();
        for iwaypoint in 1..num_waypoints {
            if progress.on_progress(*iteration) == ProgressAction::Interrupt {
                return Ok(IngestOutcome::Interrupted);
            }
            *iteration += 1;

            if !self.ramp_with_zero_vel_endpoints(
                config,
                interpolator,
                pipeline,
                checker,
                reborrow_manip(&mut manip),
                &waypoints[iwaypoint - 1],
                &waypoints[iwaypoint],
                check_options,
            ) {
                return Err(SmoothError::InitialPath(format!(
                    "failed to time-parameterize the path between waypoints {} and {}",
                    iwaypoint - 1,
                    iwaypoint
                )));
            }

            if !config.verify_initial_path && !force_checking[iwaypoint] {
                for seg in self.ramp_out.iter_mut() {
                    seg.constraint_checked = true;
                }
            }

            let first_ramp = self.ramp_out.first().map(|s| s.duration()).unwrap_or(0.0);
            let last_ramp = self.ramp_out.last().map(|s| s.duration()).unwrap_or(0.0);
            let mut chunk_duration = 0.0;
            for seg in self.ramp_out.drain(..) {
                chunk_duration += seg.duration();
                path.append(seg);
            }
            max_ramp = max_ramp.max(chunk_duration);

            if stops.times.is_empty() {
                stops.times.push(chunk_duration);
            } else {
                let cum = stops.times.last().expect("non-empty") + chunk_duration;
                stops.times.push(cum);
                // The previous stop's neighborhood extends to the end of the
                // ramp leaving it.
                stops
                    .neighborhoods
                    .last_mut()
                    .expect("paired with times")
                    .1 += first_ramp;
            }
            let cum = *stops.times.last().expect("non-empty");
            stops.neighborhoods.push((cum - last_ramp, cum));
        }
        // The path end is not a removable stop.
        stops.times.pop();
        stops.neighborhoods.pop();

        log::debug!(
            "finished initializing waypoints: {} stops, duration {:.6}",
            stops.len(),
            path.duration()
        );
        Ok(IngestOutcome::Ready(InitialPath {
            path,
            stops,
            max_initial_ramp_time: max_ramp,
            perfectly_modeled,
        }))
    }

    /// Insert constraint-projected midpoints where the manifold bends away
    /// from straight lines between waypoints.
    fn densify_waypoints(
        &mut self,
        config: &SmootherConfig,
        checker: &mut dyn ConstraintChecker,
        waypoints: Vec<Vec<f64>>,
    ) -> Result<(Vec<Vec<f64>>, Vec<bool>)> {
        let ndof = config.dof();
        let mut waypoints = waypoints;
        let mut force_checking = vec![false; waypoints.len()];

        let mut xmid = vec![0.0; ndof];
        let mut xmid_delta = vec![0.0; ndof];
        let mut consecutive_expansions = 0i32;
        let mut iwaypoint = 0usize;
        while iwaypoint + 1 < waypoints.len() {
            for i in 0..ndof {
                xmid_delta[i] = 0.5 * (waypoints[iwaypoint + 1][i] - waypoints[iwaypoint][i]);
            }
            xmid.copy_from_slice(&waypoints[iwaypoint]);
            if !checker.set_state(&xmid) {
                return Err(SmoothError::InitialPath(format!(
                    "could not set state at waypoint {}",
                    iwaypoint
                )));
            }
            if !checker.neigh_state(&mut xmid, &xmid_delta) {
                return Err(SmoothError::InitialPath(format!(
                    "failed to project the midpoint after waypoint {}",
                    iwaypoint
                )));
            }

            let mut dist = 0.0;
            for i in 0..ndof {
                let expected = 0.5 * (waypoints[iwaypoint + 1][i] + waypoints[iwaypoint][i]);
                let err = expected - xmid[i];
                dist += err * err;
            }
            if dist > DENSIFY_DIST_THRESH {
                log::debug!(
                    "inserting projected midpoint between waypoints {} and {}, dist = {:.3e}",
                    iwaypoint,
                    iwaypoint + 1,
                    dist
                );
                waypoints.insert(iwaypoint + 1, xmid.clone());
                force_checking[iwaypoint + 1] = true;
                force_checking.insert(iwaypoint + 1, true);
                consecutive_expansions += 2;
                if consecutive_expansions > MAX_CONSECUTIVE_EXPANSIONS {
                    return Err(SmoothError::InitialPath(format!(
                        "too many consecutive midpoint expansions near waypoint {}",
                        iwaypoint
                    )));
                }
                continue;
            }
            if consecutive_expansions > 0 {
                consecutive_expansions -= 1;
            }
            iwaypoint += 1;
        }
        Ok((waypoints, force_checking))
    }

    /// Interpolate two waypoints with zero boundary velocities, iteratively
    /// scaling the limits down on time-based failures. The accepted chunk is
    /// left in `self.ramp_out`.
    #[allow(clippy::too_many_arguments)]
    fn ramp_with_zero_vel_endpoints(
        &mut self,
        config: &SmootherConfig,
        interpolator: &mut Interpolator,
        pipeline: &mut FeasibilityPipeline,
        checker: &mut dyn ConstraintChecker,
        mut manip: Option<&mut dyn ManipChecker>,
        x0: &[f64],
        x1: &[f64],
        check_options: u32,
    ) -> bool {
        self.vel_limits.copy_from_slice(&config.vel_max);
        self.accel_limits.copy_from_slice(&config.accel_max);

        for itry in 0..MAX_SCALE_TRIES {
            if !interpolator.zero_vel_nd(
                x0,
                x1,
                &self.vel_limits,
                &self.accel_limits,
                &mut self.ramp_out,
            ) {
                log::warn!("zero-velocity interpolation failed");
                return false;
            }

            let mut failure = None;
            self.qa.copy_from_slice(self.ramp_out[0].x0());
            self.va.copy_from_slice(self.ramp_out[0].v0());
            for iseg in 0..self.ramp_out.len() {
                let (q1, v1, dur) = {
                    let seg = &self.ramp_out[iseg];
                    (seg.x1().to_vec(), seg.v1().to_vec(), seg.duration())
                };
                self.qb.copy_from_slice(&q1);
                self.vb.copy_from_slice(&v1);
                let ret = pipeline.segment_feasible(
                    &self.qa,
                    &self.qb,
                    &self.va,
                    &self.vb,
                    dur,
                    check_options,
                    checker,
                    reborrow_manip(&mut manip),
                    &mut self.check_out,
                );
                if ret.code != CheckCode::Ok {
                    failure = Some(ret);
                    break;
                }
                if ret.different_velocity {
                    log::warn!("segment checking returned a different final velocity");
                    let mut ret = ret;
                    ret.code = CheckCode::FinalValuesNotReached;
                    failure = Some(ret);
                    break;
                }
                std::mem::swap(&mut self.qa, &mut self.qb);
                std::mem::swap(&mut self.va, &mut self.vb);
            }

            match failure {
                None => return true,
                Some(ret) if ret.code == CheckCode::TimeBased => {
                    log::trace!(
                        "scaling limits by {:.6} (try {})",
                        ret.time_based_surpass_mult,
                        itry
                    );
                    let m = ret.time_based_surpass_mult;
                    for v in self.vel_limits.iter_mut() {
                        *v *= m;
                    }
                    for a in self.accel_limits.iter_mut() {
                        *a *= m * m;
                    }
                }
                Some(ret) => {
                    log::warn!(
                        "segment checking failed with {:?} while initializing, giving up",
                        ret.code
                    );
                    return false;
                }
            }
        }
        false
    }
}
