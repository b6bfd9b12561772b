// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the servo parameter set.

use crate::error::{config_error, ServoResult};
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::path::Path;

/// Interpretation of incoming twist and jog components.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandInType {
    /// Components are in \[-1, 1\] and scaled by the configured factors.
    Unitless,
    /// Components are in m/s and rad/s.
    SpeedUnits,
}

/// Format of the outgoing command message.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutType {
    /// Full trajectory message with named joints and one or more points.
    JointTrajectory,
    /// Flat array of either positions or velocities from the first point.
    Float64MultiArray,
}

/// Parameters of the servoing core. Immutable after construction.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServoConfig {
    /// Control period in seconds.
    pub publish_period: f64,
    pub command_in_type: CommandInType,
    pub command_out_type: CommandOutType,
    /// Scale for linear twist components in unitless mode.
    pub linear_scale: f64,
    /// Scale for angular twist components in unitless mode.
    pub rotational_scale: f64,
    /// Scale for joint jog velocities in unitless mode.
    pub joint_scale: f64,
    /// Coefficient of the per-joint position low-pass filters. Larger is smoother.
    pub low_pass_filter_coeff: f64,
    /// Jacobian condition number above which motion toward a singularity decelerates.
    pub lower_singularity_threshold: f64,
    /// Jacobian condition number above which motion toward a singularity halts.
    pub hard_stop_singularity_threshold: f64,
    /// Padding inside joint position limits at which a halt is triggered, in rad.
    pub joint_limit_margin: f64,
    /// Commands older than this many seconds are considered stale.
    pub incoming_command_timeout: f64,
    /// Number of halt messages published after all inputs go quiet. 0 keeps
    /// publishing halts forever.
    pub num_outgoing_halt_msgs_to_publish: u32,
    /// Pad outgoing trajectories for a simulator that drops stale points.
    pub use_gazebo: bool,
    /// Number of points in a padded trajectory.
    pub gazebo_redundant_message_count: usize,
    /// Frame all servoing math is performed in.
    pub planning_frame: String,
    /// Robot link incoming commands are expressed in when no frame is given.
    pub robot_link_command_frame: String,
    /// Name of the active joint group on the kinematics provider.
    pub move_group_name: String,
    pub publish_joint_positions: bool,
    pub publish_joint_velocities: bool,
    pub publish_joint_accelerations: bool,
    /// Topic names, consumed by the transport layer.
    pub cartesian_command_in_topic: String,
    pub joint_command_in_topic: String,
    pub planning_frame_topic: String,
    pub robot_link_command_frame_topic: String,
    pub command_out_topic: String,
    pub status_topic: String,
}

impl Default for ServoConfig {
    fn default() -> Self {
        ServoConfig {
            publish_period: 0.01,
            command_in_type: CommandInType::Unitless,
            command_out_type: CommandOutType::JointTrajectory,
            linear_scale: 0.4,
            rotational_scale: 0.8,
            joint_scale: 0.5,
            low_pass_filter_coeff: 2.0,
            lower_singularity_threshold: 17.0,
            hard_stop_singularity_threshold: 30.0,
            joint_limit_margin: 0.1,
            incoming_command_timeout: 0.1,
            num_outgoing_halt_msgs_to_publish: 4,
            use_gazebo: false,
            gazebo_redundant_message_count: 30,
            planning_frame: "base_link".to_string(),
            robot_link_command_frame: "ee_link".to_string(),
            move_group_name: "manipulator".to_string(),
            publish_joint_positions: true,
            publish_joint_velocities: true,
            publish_joint_accelerations: false,
            cartesian_command_in_topic: "delta_twist_cmds".to_string(),
            joint_command_in_topic: "delta_joint_cmds".to_string(),
            planning_frame_topic: String::new(),
            robot_link_command_frame_topic: String::new(),
            command_out_topic: "command".to_string(),
            status_topic: "status".to_string(),
        }
    }
}

impl ServoConfig {
    /// Loads and validates a parameter set from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ServoResult<Self> {
        let contents = read_to_string(path)?;
        let config: ServoConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the parameter set for internal consistency.
    pub fn validate(&self) -> ServoResult<()> {
        if !(self.publish_period.is_finite() && self.publish_period > 0.) {
            return Err(config_error("publish_period must be positive"));
        }
        if !(self.low_pass_filter_coeff.is_finite() && self.low_pass_filter_coeff > 1.) {
            return Err(config_error("low_pass_filter_coeff must be greater than 1"));
        }
        if self.lower_singularity_threshold >= self.hard_stop_singularity_threshold {
            return Err(config_error(
                "lower_singularity_threshold must be below hard_stop_singularity_threshold",
            ));
        }
        if self.linear_scale < 0. || self.rotational_scale < 0. || self.joint_scale < 0. {
            return Err(config_error("scaling factors must be non-negative"));
        }
        if self.joint_limit_margin < 0. {
            return Err(config_error("joint_limit_margin must be non-negative"));
        }
        if self.incoming_command_timeout <= 0. {
            return Err(config_error("incoming_command_timeout must be positive"));
        }
        if self.use_gazebo && self.gazebo_redundant_message_count < 2 {
            return Err(config_error(
                "gazebo_redundant_message_count must be at least 2",
            ));
        }
        if !(self.publish_joint_positions || self.publish_joint_velocities) {
            return Err(config_error(
                "at least one of joint positions or velocities must be published",
            ));
        }
        Ok(())
    }
}
