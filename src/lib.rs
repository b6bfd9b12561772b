// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! # servo-core
//! servo-core is the realtime servoing calculation core of a manipulator
//! jog controller. It consumes streams of Cartesian twist commands or
//! per-joint velocity commands at a fixed control frequency and converts
//! them into incremental joint trajectories that respect kinematic limits.
//!
//! **ALWAYS HAVE THE USER STOP BUTTON AT
//! HAND WHILE CONTROLLING THE ROBOT!**
//!
//! ## Design
//! The crate is a single-threaded control loop with asynchronous input
//! endpoints. Each cycle it
//! * resolves the commanded motion into the planning frame,
//! * maps end-effector twist to joint deltas through a pseudoinverse of the
//!   Jacobian,
//! * scales motion back near kinematic singularities and collisions,
//! * clips against per-joint acceleration, velocity and position limits,
//! * smooths the outgoing positions with per-joint low-pass filters,
//! * publishes one trajectory or halt point, or suppresses output.
//!
//! The transport layer, kinematics provider, collision monitor and
//! joint-state feed are external collaborators behind the traits
//! [`Kinematics`], [`TransformSource`], [`JointStateSource`] and
//! [`OutputPublisher`].
//!
//! # Example:
//! ```ignore
//! use servo_core::{ServoCalcs, ServoConfig, TwistCommand};
//!
//! let config = ServoConfig::from_file("servo.toml")?;
//! let mut servo = ServoCalcs::new(config, kinematics, transforms, joints, publisher)?;
//! let handle = servo.handle();
//!
//! // the control loop blocks; drive it from its own thread
//! let control = std::thread::spawn(move || servo.run());
//!
//! // commands arrive from the transport layer on I/O threads
//! handle.send_twist(TwistCommand {
//!     stamp: handle.now(),
//!     frame_id: String::new(),
//!     linear: [0.5, 0., 0.],
//!     angular: [0., 0., 0.],
//! });
//!
//! handle.stop();
//! control.join().unwrap();
//! ```
//!
//! Commands are stamped on the servo clock ([`ServoHandle::now`]); a stream
//! whose newest stamp is older than the configured timeout is treated as
//! stale and the loop falls back to publishing halt points. The status
//! channel reports why motion was scaled or halted; a halting status stays
//! latched until [`ServoHandle::reset_status`] clears it.

pub mod error;
pub mod servo;

pub use error::{ServoError, ServoResult};
pub use servo::calcs::{
    Clock, JointStateSource, OutputPublisher, ServoCalcs, ServoHandle, SystemClock,
};
pub use servo::config::{CommandInType, CommandOutType, ServoConfig};
pub use servo::kinematics::{
    JointBounds, JointSetModel, Kinematics, NoTransforms, TransformSource,
};
pub use servo::low_pass_filter::LowPassFilter;
pub use servo::status::StatusCode;
pub use servo::types::{
    JointJogCommand, JointState, JointTrajectory, JointTrajectoryPoint, OutgoingCommand,
    TwistCommand,
};
