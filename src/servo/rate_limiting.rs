// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains functions for clipping per-cycle joint position increments
//! against acceleration, velocity and position bounds.

use crate::servo::kinematics::JointBounds;
use nalgebra::DVector;

/// Clips a position increment vector against per-joint acceleration and
/// velocity bounds.
///
/// Each clip rescales the affected component by a scalar ratio, and only
/// when that ratio shrinks the increment (`|ratio| < 1`). This keeps an
/// increment of zero from producing an infinite ratio and keeps the clip
/// from flipping the sign of a component. The scaling is per joint, so the
/// joint-space direction of the increment may rotate across joints.
///
/// # Arguments
/// * `delta_theta` - Position increments of the current cycle, clipped in place.
/// * `bounds` - Per-joint bounds, parallel to `delta_theta`.
/// * `prev_joint_velocity` - Joint velocities commanded in the previous cycle.
/// * `period` - Control period in seconds.
pub fn enforce_accel_vel_limits(
    delta_theta: &mut DVector<f64>,
    bounds: &[JointBounds],
    prev_joint_velocity: &DVector<f64>,
    period: f64,
) {
    for (i, joint_bounds) in bounds.iter().enumerate() {
        if joint_bounds.acceleration_bounded {
            let velocity = delta_theta[i] / period;
            let acceleration = (velocity - prev_joint_velocity[i]) / period;

            let acceleration_limit = if acceleration < joint_bounds.min_acceleration {
                Some(joint_bounds.min_acceleration)
            } else if acceleration > joint_bounds.max_acceleration {
                Some(joint_bounds.max_acceleration)
            } else {
                None
            };

            if let Some(limit) = acceleration_limit {
                // delta = (a * dt + v_prev) * dt, applied as a ratio of the
                // unclipped increment
                let relative_change =
                    ((limit * period + prev_joint_velocity[i]) * period) / delta_theta[i];
                if relative_change.abs() < 1. {
                    delta_theta[i] *= relative_change;
                }
            }
        }

        if joint_bounds.velocity_bounded {
            let velocity = delta_theta[i] / period;

            let velocity_limit = if velocity < joint_bounds.min_velocity {
                Some(joint_bounds.min_velocity)
            } else if velocity > joint_bounds.max_velocity {
                Some(joint_bounds.max_velocity)
            } else {
                None
            };

            if let Some(limit) = velocity_limit {
                let relative_change = (limit * period) / delta_theta[i];
                if relative_change.abs() < 1. {
                    delta_theta[i] *= relative_change;
                }
            }
        }
    }
}

/// Determines whether a joint is inside the margin of a position bound and
/// its measured velocity is carrying it further in.
///
/// # Arguments
/// * `bounds` - Bounds of the joint.
/// * `position` - Measured joint position.
/// * `velocity` - Measured joint velocity.
/// * `margin` - Padding inside the position limits, in the same units.
pub fn position_bound_triggers_halt(
    bounds: &JointBounds,
    position: f64,
    velocity: f64,
    margin: f64,
) -> bool {
    if !bounds.position_bounded {
        return false;
    }
    (velocity < 0. && position < bounds.min_position + margin)
        || (velocity > 0. && position > bounds.max_position - margin)
}
