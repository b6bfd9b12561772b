// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains functions that scale raw incoming commands into per-cycle
//! delta vectors.

use crate::servo::config::{CommandInType, ServoConfig};
use crate::servo::kinematics::JointSetModel;
use crate::servo::types::{JointJogCommand, TwistCommand};
use log::warn;
use nalgebra::{DVector, Vector6};

/// Scales a Cartesian twist into a per-cycle task-space displacement.
///
/// In unitless mode the components are expected in \[-1, 1\] and multiplied
/// by the configured linear/rotational factors; in speed-units mode they are
/// in m/s and rad/s. Both modes multiply by the control period.
pub fn scale_cartesian_command(config: &ServoConfig, command: &TwistCommand) -> Vector6<f64> {
    let mut result = Vector6::zeros();
    match config.command_in_type {
        CommandInType::Unitless => {
            for i in 0..3 {
                result[i] = config.linear_scale * config.publish_period * command.linear[i];
                result[i + 3] =
                    config.rotational_scale * config.publish_period * command.angular[i];
            }
        }
        CommandInType::SpeedUnits => {
            for i in 0..3 {
                result[i] = command.linear[i] * config.publish_period;
                result[i + 3] = command.angular[i] * config.publish_period;
            }
        }
    }
    result
}

/// Scales a joint jog into a per-cycle joint-space increment.
///
/// Joint names are mapped onto the internal index order; names the model
/// does not know are skipped with a warning.
pub fn scale_joint_command(
    config: &ServoConfig,
    command: &JointJogCommand,
    model: &JointSetModel,
) -> DVector<f64> {
    let mut result = DVector::zeros(model.len());

    for (name, &velocity) in command.joint_names.iter().zip(command.velocities.iter()) {
        let Some(index) = model.index_of(name) else {
            warn!("ignoring jog for unknown joint {}", name);
            continue;
        };
        result[index] = match config.command_in_type {
            CommandInType::Unitless => velocity * config.joint_scale * config.publish_period,
            CommandInType::SpeedUnits => velocity * config.publish_period,
        };
    }

    result
}
