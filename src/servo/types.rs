// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the command and trajectory message types exchanged with the
//! transport layer.

use crate::servo::config::{CommandOutType, ServoConfig};
use serde::{Deserialize, Serialize};

/// A 6-DoF Cartesian twist command with a reference frame and header stamp.
///
/// A `stamp` of zero means "unset"; such commands never refresh the
/// staleness clock.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TwistCommand {
    /// Header time in seconds on the servo clock.
    pub stamp: f64,
    /// Frame the twist is expressed in. Empty means the configured command frame.
    pub frame_id: String,
    /// Linear velocity components \[x, y, z\].
    pub linear: [f64; 3],
    /// Angular velocity components \[x, y, z\].
    pub angular: [f64; 3],
}

impl TwistCommand {
    /// A command is nonzero if any component is nonzero.
    pub fn is_nonzero(&self) -> bool {
        self.linear.iter().chain(self.angular.iter()).any(|&x| x != 0.)
    }

    pub fn has_nan(&self) -> bool {
        self.linear.iter().chain(self.angular.iter()).any(|x| x.is_nan())
    }
}

/// A per-joint velocity command with a header stamp.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct JointJogCommand {
    /// Header time in seconds on the servo clock.
    pub stamp: f64,
    pub joint_names: Vec<String>,
    pub velocities: Vec<f64>,
}

impl JointJogCommand {
    /// A command is nonzero if any velocity is nonzero.
    pub fn is_nonzero(&self) -> bool {
        self.velocities.iter().any(|&v| v != 0.)
    }

    pub fn has_nan(&self) -> bool {
        self.velocities.iter().any(|v| v.is_nan())
    }
}

/// A measured joint state snapshot from the joint-state feed.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct JointState {
    pub names: Vec<String>,
    pub positions: Vec<f64>,
    pub velocities: Vec<f64>,
}

/// One sample of an outgoing trajectory.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct JointTrajectoryPoint {
    /// Offset of this sample from the trajectory stamp, in seconds.
    pub time_from_start: f64,
    pub positions: Vec<f64>,
    pub velocities: Vec<f64>,
    pub accelerations: Vec<f64>,
}

/// An outgoing trajectory command.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct JointTrajectory {
    /// Publication time in seconds on the servo clock.
    pub stamp: f64,
    pub joint_names: Vec<String>,
    pub points: Vec<JointTrajectoryPoint>,
}

/// The outgoing command in the configured wire format.
///
/// Exactly one of these is published per cycle that publishes at all.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum OutgoingCommand {
    Trajectory(JointTrajectory),
    /// Positions (preferred) or velocities of the first trajectory point.
    JointValues(Vec<f64>),
}

impl OutgoingCommand {
    /// Converts a finished trajectory into the configured output format.
    pub fn from_trajectory(trajectory: JointTrajectory, config: &ServoConfig) -> Self {
        match config.command_out_type {
            CommandOutType::JointTrajectory => OutgoingCommand::Trajectory(trajectory),
            CommandOutType::Float64MultiArray => {
                let data = match trajectory.points.first() {
                    Some(point) if config.publish_joint_positions => point.positions.clone(),
                    Some(point) if config.publish_joint_velocities => point.velocities.clone(),
                    _ => Vec::new(),
                };
                OutgoingCommand::JointValues(data)
            }
        }
    }
}
