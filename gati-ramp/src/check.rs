//! Validation of segments against kinematic limits.
//!
//! These checks classify rather than error: callers decide whether a
//! violation is fatal, repairable (acceleration clamp), or a signal to slow
//! down.

use crate::segment::Segment;
use crate::RAMP_EPSILON;

/// Outcome of validating a segment or segment chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentCheck {
    /// All limits and consistency conditions hold.
    Normal,
    /// Negative duration.
    NegativeDuration,
    /// A position (including an interior extremum) leaves the configured
    /// bounds.
    PositionBound,
    /// A boundary velocity exceeds the velocity limit.
    VelocityBound,
    /// A per-DOF acceleration exceeds the acceleration limit.
    AccelBound,
    /// Boundary positions are inconsistent with the parabolic model.
    PositionDiscrepancy,
    /// Boundary velocities are inconsistent with the parabolic model.
    VelocityDiscrepancy,
    /// Two consecutive segments do not join continuously.
    Discontinuity,
}

/// Validate one segment against limits and internal consistency.
pub fn check_segment(
    segment: &Segment,
    x_lower: &[f64],
    x_upper: &[f64],
    v_max: &[f64],
    a_max: &[f64],
) -> SegmentCheck {
    let t = segment.duration();
    if t < 0.0 {
        return SegmentCheck::NegativeDuration;
    }

    for i in 0..segment.dof() {
        let x0 = segment.x0()[i];
        let x1 = segment.x1()[i];
        let v0 = segment.v0()[i];
        let v1 = segment.v1()[i];
        let a = segment.accel()[i];

        if v0.abs() > v_max[i] + RAMP_EPSILON || v1.abs() > v_max[i] + RAMP_EPSILON {
            return SegmentCheck::VelocityBound;
        }
        if a.abs() > a_max[i] + RAMP_EPSILON {
            return SegmentCheck::AccelBound;
        }

        // Model consistency.
        if t > RAMP_EPSILON {
            let x1_model = x0 + t * (v0 + 0.5 * a * t);
            if (x1 - x1_model).abs() > RAMP_EPSILON {
                return SegmentCheck::PositionDiscrepancy;
            }
            let v1_model = v0 + a * t;
            if (v1 - v1_model).abs() > RAMP_EPSILON {
                return SegmentCheck::VelocityDiscrepancy;
            }
        }

        // Boundary and interior positions.
        let mut lo = x0.min(x1);
        let mut hi = x0.max(x1);
        if a.abs() > RAMP_EPSILON {
            let tstar = -v0 / a;
            if tstar > 0.0 && tstar < t {
                let xstar = x0 + tstar * (v0 + 0.5 * a * tstar);
                lo = lo.min(xstar);
                hi = hi.max(xstar);
            }
        }
        if lo < x_lower[i] - RAMP_EPSILON || hi > x_upper[i] + RAMP_EPSILON {
            return SegmentCheck::PositionBound;
        }
    }
    SegmentCheck::Normal
}

/// Validate a chain of segments: each segment individually, plus C0/C1
/// continuity across joins and agreement with the expected boundary states.
#[allow(clippy::too_many_arguments)]
pub fn check_segments(
    segments: &[Segment],
    x_lower: &[f64],
    x_upper: &[f64],
    v_max: &[f64],
    a_max: &[f64],
    x0: &[f64],
    x1: &[f64],
    v0: &[f64],
    v1: &[f64],
) -> SegmentCheck {
    if segments.is_empty() {
        return SegmentCheck::Normal;
    }

    for (i, segment) in segments.iter().enumerate() {
        let ret = check_segment(segment, x_lower, x_upper, v_max, a_max);
        if ret != SegmentCheck::Normal {
            return ret;
        }
        if i > 0 {
            let prev = &segments[i - 1];
            for j in 0..segment.dof() {
                if (prev.x1()[j] - segment.x0()[j]).abs() > RAMP_EPSILON {
                    return SegmentCheck::Discontinuity;
                }
                if (prev.v1()[j] - segment.v0()[j]).abs() > RAMP_EPSILON {
                    return SegmentCheck::Discontinuity;
                }
            }
        }
    }

    let first = &segments[0];
    let last = segments.last().expect("non-empty");
    for j in 0..first.dof() {
        if (first.x0()[j] - x0[j]).abs() > RAMP_EPSILON || (last.x1()[j] - x1[j]).abs() > RAMP_EPSILON
        {
            return SegmentCheck::PositionDiscrepancy;
        }
        if (first.v0()[j] - v0[j]).abs() > RAMP_EPSILON || (last.v1()[j] - v1[j]).abs() > RAMP_EPSILON
        {
            return SegmentCheck::VelocityDiscrepancy;
        }
    }
    SegmentCheck::Normal
}
