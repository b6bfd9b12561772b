// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the periodic servoing loop: input snapshotting, the Cartesian
//! and joint servo paths, halt handling and publication.

use crate::error::{ServoError, ServoResult};
use crate::servo::config::{CommandInType, ServoConfig};
use crate::servo::frame;
use crate::servo::inverse::{pseudo_inverse_step, remove_drift_dimensions, singularity_velocity_scale};
use crate::servo::kinematics::{JointSetModel, Kinematics, TransformSource};
use crate::servo::low_pass_filter::PositionFilterBank;
use crate::servo::rate_limiting::{enforce_accel_vel_limits, position_bound_triggers_halt};
use crate::servo::scaling::{scale_cartesian_command, scale_joint_command};
use crate::servo::status::StatusCode;
use crate::servo::types::{
    JointJogCommand, JointState, JointTrajectory, JointTrajectoryPoint, OutgoingCommand,
    TwistCommand,
};
use log::{debug, error, warn};
use nalgebra::{DVector, Isometry3, Vector3};
use std::sync::atomic::{AtomicBool, AtomicI8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Sleep between retries while waiting for a joint-state snapshot.
const JOINT_STATE_POLL_PERIOD: Duration = Duration::from_millis(1);

/// Monotonic time source for staleness checks and message stamps, in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Default clock anchored at its creation instant.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Latest measured joint state, fed from the robot driver.
pub trait JointStateSource {
    /// The most recent snapshot, or `None` if nothing was received yet.
    fn latest(&self) -> Option<JointState>;
}

/// Sink for everything the servo loop emits.
pub trait OutputPublisher {
    /// Publishes the outgoing command of this cycle.
    fn publish_command(&mut self, command: &OutgoingCommand);

    /// Publishes the current status code. Called once per tick.
    fn publish_status(&mut self, status: StatusCode);

    /// Publishes the worst-case stop time in seconds. Called once per tick.
    fn publish_worst_case_stop_time(&mut self, seconds: f64);
}

/// Mode of one control cycle, decided after the input snapshot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum LoopState {
    /// No command with a valid stamp has arrived yet.
    WaitingForInitial,
    /// Externally paused.
    Paused,
    /// At least one fresh, nonzero command stream is available.
    Active,
    /// All streams are zero or stale; hold position.
    Halting,
}

/// Command cache written by the input side, snapshotted once per tick.
struct InputCache {
    latest_twist: Option<TwistCommand>,
    twist_receipt: f64,
    twist_nonzero: bool,
    latest_joint_cmd: Option<JointJogCommand>,
    joint_receipt: f64,
    joint_nonzero: bool,
    planning_frame: String,
    command_frame: String,
    drift_dimensions: [bool; 6],
    control_dimensions: [bool; 6],
    command_frame_tf: Option<Isometry3<f64>>,
}

struct SharedState {
    inputs: Mutex<InputCache>,
    /// f64 bits; written by the collision monitor, read by the control thread.
    collision_velocity_scale: AtomicU64,
    status: AtomicI8,
    paused: AtomicBool,
    stop_requested: AtomicBool,
}

impl SharedState {
    fn status(&self) -> StatusCode {
        StatusCode::from_wire(self.status.load(Ordering::Relaxed)).unwrap_or_default()
    }

    fn set_status(&self, status: StatusCode) {
        self.status.store(status.as_i8(), Ordering::Relaxed);
    }

    fn collision_scale(&self) -> f64 {
        f64::from_bits(self.collision_velocity_scale.load(Ordering::Relaxed))
    }
}

/// Input side of the servo loop.
///
/// Cloneable and shareable across the I/O threads that deliver commands,
/// frame updates, collision scales and service requests. All methods are
/// wait-free or take the one shared mutex briefly; none of them block on the
/// control thread.
#[derive(Clone)]
pub struct ServoHandle {
    shared: Arc<SharedState>,
    clock: Arc<dyn Clock>,
}

impl ServoHandle {
    /// Current time on the servo clock, for stamping outgoing commands.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Delivers a Cartesian twist command.
    pub fn send_twist(&self, command: TwistCommand) {
        let mut inputs = self.shared.inputs.lock().unwrap();
        inputs.twist_nonzero = command.is_nonzero();
        if command.stamp != 0. {
            inputs.twist_receipt = command.stamp;
        }
        inputs.latest_twist = Some(command);
    }

    /// Delivers a joint jog command.
    pub fn send_joint_jog(&self, command: JointJogCommand) {
        let mut inputs = self.shared.inputs.lock().unwrap();
        inputs.joint_nonzero = command.is_nonzero();
        if command.stamp != 0. {
            inputs.joint_receipt = command.stamp;
        }
        inputs.latest_joint_cmd = Some(command);
    }

    /// Updates the frame all servoing math is performed in.
    pub fn set_planning_frame(&self, frame: impl Into<String>) {
        self.shared.inputs.lock().unwrap().planning_frame = frame.into();
    }

    /// Updates the frame incoming commands default to.
    pub fn set_command_frame(&self, frame: impl Into<String>) {
        self.shared.inputs.lock().unwrap().command_frame = frame.into();
    }

    /// Updates the collision velocity scale in \[0, 1\]. Zero halts.
    pub fn set_collision_velocity_scale(&self, scale: f64) {
        self.shared
            .collision_velocity_scale
            .store(scale.to_bits(), Ordering::Relaxed);
    }

    /// Pauses or resumes servoing. While paused nothing is published.
    pub fn set_paused(&self, paused: bool) {
        self.shared.paused.store(paused, Ordering::Relaxed);
    }

    /// Selects the task-space rows removed from the Jacobian.
    pub fn change_drift_dimensions(&self, dimensions: [bool; 6]) -> bool {
        self.shared.inputs.lock().unwrap().drift_dimensions = dimensions;
        true
    }

    /// Selects which task-space axes are actively commanded.
    pub fn change_control_dimensions(&self, dimensions: [bool; 6]) -> bool {
        self.shared.inputs.lock().unwrap().control_dimensions = dimensions;
        true
    }

    /// Clears the status so the arm can move again, e.g. after a collision
    /// halt. Does not unpause.
    pub fn reset_status(&self) {
        self.shared.set_status(StatusCode::NoWarning);
    }

    /// The status most recently set by the control loop.
    pub fn status(&self) -> StatusCode {
        self.shared.status()
    }

    /// The last resolved planning-frame to command-frame transform. The
    /// flag is false until a transform has been cached.
    pub fn command_frame_transform(&self) -> (Isometry3<f64>, bool) {
        match self.shared.inputs.lock().unwrap().command_frame_tf {
            Some(transform) => (transform, true),
            None => (Isometry3::identity(), false),
        }
    }

    /// Requests the control loop to stop. In-flight cycles complete.
    pub fn stop(&self) {
        self.shared.stop_requested.store(true, Ordering::SeqCst);
    }
}

/// Throttle for warnings emitted from inside the periodic loop.
struct Throttle {
    period: Duration,
    last: Option<Instant>,
}

impl Throttle {
    fn new(period: Duration) -> Self {
        Throttle { period, last: None }
    }

    fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.period => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

struct WarningThrottles {
    input: Throttle,
    stale: Throttle,
    singularity: Throttle,
    collision: Throttle,
    bound: Throttle,
    transform: Throttle,
    missing_accel_bounds: Throttle,
    overrun: Throttle,
}

impl WarningThrottles {
    fn new() -> Self {
        WarningThrottles {
            input: Throttle::new(Duration::from_secs(30)),
            stale: Throttle::new(Duration::from_secs(10)),
            singularity: Throttle::new(Duration::from_secs(30)),
            collision: Throttle::new(Duration::from_secs(3)),
            bound: Throttle::new(Duration::from_secs(30)),
            transform: Throttle::new(Duration::from_secs(1)),
            missing_accel_bounds: Throttle::new(Duration::from_secs(30)),
            overrun: Throttle::new(Duration::from_secs(30)),
        }
    }
}

/// The servoing calculation core.
///
/// Owns the control-thread state and collaborators; all servo math runs on
/// the thread calling [`tick`](`ServoCalcs::tick`) or
/// [`run`](`ServoCalcs::run`). Input arrives through the [`ServoHandle`]
/// returned by [`handle`](`ServoCalcs::handle`).
pub struct ServoCalcs<K, T, S, P> {
    config: ServoConfig,
    kinematics: K,
    transforms: T,
    joint_states: S,
    publisher: P,
    clock: Arc<dyn Clock>,
    shared: Arc<SharedState>,

    joint_model: JointSetModel,
    num_joints: usize,

    internal_positions: DVector<f64>,
    original_positions: DVector<f64>,
    measured_velocities: DVector<f64>,
    prev_joint_velocity: DVector<f64>,
    delta_theta: DVector<f64>,
    position_filters: PositionFilterBank,
    updated_filters: bool,

    zero_velocity_count: u32,
    wait_for_initial_command: bool,
    last_sent: JointTrajectory,

    // per-tick snapshots of the shared cache
    planning_frame: String,
    command_frame: String,
    command_frame_tf: Option<Isometry3<f64>>,
    control_dimensions: [bool; 6],
    drift_dimensions: [bool; 6],

    warnings: WarningThrottles,
}

impl<K, T, S, P> ServoCalcs<K, T, S, P>
where
    K: Kinematics,
    T: TransformSource,
    S: JointStateSource,
    P: OutputPublisher,
{
    /// Creates a servo core on the default system clock.
    pub fn new(
        config: ServoConfig,
        kinematics: K,
        transforms: T,
        joint_states: S,
        publisher: P,
    ) -> ServoResult<Self> {
        Self::with_clock(
            config,
            kinematics,
            transforms,
            joint_states,
            publisher,
            Arc::new(SystemClock::default()),
        )
    }

    /// Creates a servo core on an explicit clock.
    pub fn with_clock(
        config: ServoConfig,
        kinematics: K,
        transforms: T,
        joint_states: S,
        publisher: P,
        clock: Arc<dyn Clock>,
    ) -> ServoResult<Self> {
        config.validate()?;
        let joint_model = kinematics.joint_model().clone();
        let num_joints = joint_model.len();
        if num_joints == 0 {
            return Err(ServoError::ConfigInvalid {
                message: format!(
                    "kinematics provider reports no active joints for group {:?}",
                    config.move_group_name
                ),
            });
        }

        let shared = Arc::new(SharedState {
            inputs: Mutex::new(InputCache {
                latest_twist: None,
                twist_receipt: 0.,
                twist_nonzero: false,
                latest_joint_cmd: None,
                joint_receipt: 0.,
                joint_nonzero: false,
                planning_frame: config.planning_frame.clone(),
                command_frame: config.robot_link_command_frame.clone(),
                drift_dimensions: [false; 6],
                control_dimensions: [true; 6],
                command_frame_tf: None,
            }),
            collision_velocity_scale: AtomicU64::new(1f64.to_bits()),
            status: AtomicI8::new(StatusCode::NoWarning.as_i8()),
            paused: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
        });

        // Seed the last sent command from the latest measurement so halt
        // and quiescent cycles have a valid template before any command
        let measured = joint_states.latest();
        let mut initial_point = JointTrajectoryPoint {
            time_from_start: config.publish_period,
            ..JointTrajectoryPoint::default()
        };
        if config.publish_joint_positions {
            initial_point.positions = match &measured {
                Some(state) if state.positions.len() >= num_joints => {
                    state.positions[..num_joints].to_vec()
                }
                _ => vec![0.; num_joints],
            };
        }
        if config.publish_joint_velocities {
            initial_point.velocities = vec![0.; num_joints];
        }
        if config.publish_joint_accelerations {
            initial_point.accelerations = vec![0.; num_joints];
        }
        let last_sent = JointTrajectory {
            stamp: clock.now(),
            joint_names: joint_model.names.clone(),
            points: vec![initial_point],
        };

        let planning_frame = config.planning_frame.clone();
        let command_frame = config.robot_link_command_frame.clone();
        let position_filters = PositionFilterBank::new(num_joints, config.low_pass_filter_coeff);

        Ok(ServoCalcs {
            config,
            kinematics,
            transforms,
            joint_states,
            publisher,
            clock,
            shared,
            joint_model,
            num_joints,
            internal_positions: DVector::zeros(num_joints),
            original_positions: DVector::zeros(num_joints),
            measured_velocities: DVector::zeros(num_joints),
            prev_joint_velocity: DVector::zeros(num_joints),
            delta_theta: DVector::zeros(num_joints),
            position_filters,
            updated_filters: false,
            zero_velocity_count: 0,
            wait_for_initial_command: true,
            last_sent,
            planning_frame,
            command_frame,
            command_frame_tf: None,
            control_dimensions: [true; 6],
            drift_dimensions: [false; 6],
            warnings: WarningThrottles::new(),
        })
    }

    /// The input side of this core.
    pub fn handle(&self) -> ServoHandle {
        ServoHandle {
            shared: Arc::clone(&self.shared),
            clock: Arc::clone(&self.clock),
        }
    }

    /// Runs the periodic loop until [`ServoHandle::stop`] is called.
    pub fn run(&mut self) {
        self.shared.stop_requested.store(false, Ordering::SeqCst);
        let period = Duration::from_secs_f64(self.config.publish_period);
        let mut next_deadline = Instant::now() + period;
        while !self.shared.stop_requested.load(Ordering::SeqCst) {
            let started = Instant::now();
            self.tick();
            let elapsed = started.elapsed();
            if elapsed > period && self.warnings.overrun.ready() {
                warn!(
                    "servo cycle took {:.4}s, longer than the {:.4}s period",
                    elapsed.as_secs_f64(),
                    period.as_secs_f64()
                );
            }
            let now = Instant::now();
            if next_deadline > now {
                std::thread::sleep(next_deadline - now);
            }
            next_deadline += period;
        }
    }

    /// Executes one control cycle. Publishes at most one outgoing command.
    pub fn tick(&mut self) {
        self.publisher.publish_status(self.shared.status());

        // A measurement covering every active joint is required; without it
        // the filters could not be kept in sync and resuming would jump
        while !self.update_joints() {
            if self.shared.stop_requested.load(Ordering::SeqCst) {
                return;
            }
            std::thread::sleep(JOINT_STATE_POLL_PERIOD);
        }

        let now = self.clock.now();
        let twist_cmd;
        let joint_cmd;
        let twist_usable;
        let joint_usable;
        {
            let inputs = self.shared.inputs.lock().unwrap();
            twist_cmd = inputs.latest_twist.clone();
            joint_cmd = inputs.latest_joint_cmd.clone();
            let twist_stale =
                now - inputs.twist_receipt >= self.config.incoming_command_timeout;
            let joint_stale =
                now - inputs.joint_receipt >= self.config.incoming_command_timeout;
            twist_usable = inputs.twist_nonzero && !twist_stale;
            joint_usable = inputs.joint_nonzero && !joint_stale;
            if (inputs.twist_nonzero && twist_stale) || (inputs.joint_nonzero && joint_stale) {
                if self.warnings.stale.ready() {
                    debug!("stale command; consider a larger incoming_command_timeout");
                }
            }
            self.planning_frame = inputs.planning_frame.clone();
            self.command_frame = inputs.command_frame.clone();
            self.control_dimensions = inputs.control_dimensions;
            self.drift_dimensions = inputs.drift_dimensions;
        }

        // Resolve the transform every cycle so the external query stays
        // current even while no command is active
        self.command_frame_tf = frame::command_frame_transform(
            &self.kinematics,
            &self.transforms,
            &self.original_positions,
            &self.planning_frame,
            &self.command_frame,
        );
        self.shared.inputs.lock().unwrap().command_frame_tf = self.command_frame_tf;

        self.updated_filters = false;

        let state = if self.shared.paused.load(Ordering::Relaxed) {
            LoopState::Paused
        } else if self.wait_for_initial_command {
            LoopState::WaitingForInitial
        } else if twist_usable || joint_usable {
            LoopState::Active
        } else {
            LoopState::Halting
        };

        match state {
            LoopState::Paused | LoopState::WaitingForInitial => {
                self.reset_filters();
                let twist_stamp = twist_cmd.as_ref().map_or(0., |c| c.stamp);
                let joint_stamp = joint_cmd.as_ref().map_or(0., |c| c.stamp);
                self.wait_for_initial_command = twist_stamp == 0. && joint_stamp == 0.;
            }
            LoopState::Active => {
                let trajectory = if let (true, Some(cmd)) = (twist_usable, twist_cmd) {
                    self.cartesian_servo_calcs(cmd)
                } else if let (true, Some(cmd)) = (joint_usable, joint_cmd) {
                    self.joint_servo_calcs(cmd)
                } else {
                    None
                };
                if let Some(trajectory) = trajectory {
                    self.zero_velocity_count = 0;
                    self.publish(trajectory);
                }
            }
            LoopState::Halting => {
                // Hold the last sent positions with zero velocity
                let mut trajectory = self.last_sent.clone();
                for point in &mut trajectory.points {
                    for velocity in &mut point.velocities {
                        *velocity = 0.;
                    }
                }
                self.sudden_halt(&mut trajectory);
                self.zero_velocity_count = self.zero_velocity_count.saturating_add(1);
                let burst = self.config.num_outgoing_halt_msgs_to_publish;
                if burst != 0 && self.zero_velocity_count > burst {
                    debug!("all-zero command, nothing to publish");
                } else {
                    self.publish(trajectory);
                }
            }
        }

        if !self.updated_filters {
            self.reset_filters();
        }
    }

    /// Servo path for a Cartesian twist. `None` means the cycle is unusable
    /// and nothing should be published.
    fn cartesian_servo_calcs(&mut self, mut cmd: TwistCommand) -> Option<JointTrajectory> {
        if cmd.has_nan() {
            if self.warnings.input.ready() {
                warn!("NaN in incoming twist, skipping this datapoint");
            }
            return None;
        }
        if self.config.command_in_type == CommandInType::Unitless
            && cmd
                .linear
                .iter()
                .chain(cmd.angular.iter())
                .any(|x| x.abs() > 1.)
        {
            if self.warnings.input.ready() {
                warn!("component of unitless twist is outside [-1, 1], skipping this datapoint");
            }
            return None;
        }

        // Uncontrolled axes are zeroed in the command frame, before any
        // rotation into the planning frame
        for i in 0..3 {
            if !self.control_dimensions[i] {
                cmd.linear[i] = 0.;
            }
            if !self.control_dimensions[i + 3] {
                cmd.angular[i] = 0.;
            }
        }

        if cmd.frame_id != self.planning_frame {
            // A twist rotates between frames; translation does not apply
            let rotation = if cmd.frame_id.is_empty() || cmd.frame_id == self.command_frame {
                self.command_frame_tf.map(|tf| tf.rotation)
            } else {
                frame::command_frame_transform(
                    &self.kinematics,
                    &self.transforms,
                    &self.original_positions,
                    &self.planning_frame,
                    &cmd.frame_id,
                )
                .map(|tf| tf.rotation)
            };
            match rotation {
                Some(rotation) => {
                    let linear = rotation * Vector3::from(cmd.linear);
                    let angular = rotation * Vector3::from(cmd.angular);
                    cmd.linear = linear.into();
                    cmd.angular = angular.into();
                    cmd.frame_id = self.planning_frame.clone();
                }
                None => {
                    if self.warnings.transform.ready() {
                        error!(
                            "no transform from {:?} to {:?}; treating axes as coincident",
                            cmd.frame_id, self.planning_frame
                        );
                    }
                }
            }
        }

        let scaled = scale_cartesian_command(&self.config, &cmd);
        let delta_x = DVector::from_column_slice(scaled.as_slice());
        let jacobian = self.kinematics.jacobian(&self.original_positions);
        let (jacobian, delta_x) =
            remove_drift_dimensions(jacobian, delta_x, &self.drift_dimensions);

        let step = match pseudo_inverse_step(&jacobian, &delta_x) {
            Ok(step) => step,
            Err(e) => {
                error!("{}", e);
                return None;
            }
        };
        self.delta_theta = step.delta_theta.clone();

        enforce_accel_vel_limits(
            &mut self.delta_theta,
            &self.joint_model.bounds,
            &self.prev_joint_velocity,
            self.config.publish_period,
        );

        let (singularity_scale, singularity_status) = {
            let kinematics = &self.kinematics;
            singularity_velocity_scale(
                &step,
                &delta_x,
                &self.original_positions,
                |positions| kinematics.jacobian(positions),
                self.config.lower_singularity_threshold,
                self.config.hard_stop_singularity_threshold,
            )
        };
        if let Some(status) = singularity_status {
            self.shared.set_status(status);
            if self.warnings.singularity.ready() {
                warn!("{}", status);
            }
        }
        self.apply_velocity_scaling(singularity_scale);

        self.prev_joint_velocity = &self.delta_theta / self.config.publish_period;

        self.convert_deltas_to_outgoing()
    }

    /// Servo path for a joint jog. `None` means the cycle is unusable.
    fn joint_servo_calcs(&mut self, cmd: JointJogCommand) -> Option<JointTrajectory> {
        if cmd.has_nan() {
            if self.warnings.input.ready() {
                warn!("NaN in incoming jog, skipping this datapoint");
            }
            return None;
        }

        self.delta_theta = scale_joint_command(&self.config, &cmd, &self.joint_model);

        enforce_accel_vel_limits(
            &mut self.delta_theta,
            &self.joint_model.bounds,
            &self.prev_joint_velocity,
            self.config.publish_period,
        );

        // No singularity scaling for joint-space motion
        self.apply_velocity_scaling(1.);

        self.prev_joint_velocity = &self.delta_theta / self.config.publish_period;

        self.convert_deltas_to_outgoing()
    }

    /// Applies the collision and singularity velocity scales. A collision
    /// halt is sticky: it zeroes deltas every cycle until the status is
    /// cleared through [`ServoHandle::reset_status`].
    fn apply_velocity_scaling(&mut self, singularity_scale: f64) {
        let collision_scale = self.shared.collision_scale();
        if collision_scale == 0. {
            self.shared.set_status(StatusCode::HaltForCollision);
        }
        self.delta_theta *= collision_scale * singularity_scale;
        if self.shared.status() == StatusCode::HaltForCollision {
            if self.warnings.collision.ready() {
                warn!("halting for collision");
            }
            self.delta_theta.fill(0.);
        }
    }

    /// Turns the committed deltas into the outgoing trajectory: increment,
    /// filter, derive velocities, check position bounds, pad for the
    /// simulator.
    fn convert_deltas_to_outgoing(&mut self) -> Option<JointTrajectory> {
        if self.delta_theta.len() != self.num_joints {
            error!(
                "{}",
                ServoError::ShapeMismatch {
                    expected: self.num_joints,
                    got: self.delta_theta.len(),
                }
            );
            return None;
        }
        self.internal_positions = &self.original_positions + &self.delta_theta;
        self.position_filters
            .filter_in_place(&mut self.internal_positions);
        self.updated_filters = true;

        let velocities = &self.delta_theta / self.config.publish_period;
        let mut trajectory = self.compose_trajectory(&velocities);

        if self.position_bounds_halt() {
            self.sudden_halt(&mut trajectory);
            self.shared.set_status(StatusCode::JointBound);
        }

        if self.config.use_gazebo {
            self.pad_trajectory(&mut trajectory);
        }

        Some(trajectory)
    }

    fn compose_trajectory(&self, velocities: &DVector<f64>) -> JointTrajectory {
        let mut point = JointTrajectoryPoint {
            time_from_start: self.config.publish_period,
            ..JointTrajectoryPoint::default()
        };
        if self.config.publish_joint_positions {
            point.positions = self.internal_positions.iter().copied().collect();
        }
        if self.config.publish_joint_velocities {
            point.velocities = velocities.iter().copied().collect();
        }
        if self.config.publish_joint_accelerations {
            // Zeros; some controllers only check that the channel is filled
            point.accelerations = vec![0.; self.num_joints];
        }
        JointTrajectory {
            stamp: self.clock.now(),
            joint_names: self.joint_model.names.clone(),
            points: vec![point],
        }
    }

    /// True if any joint is inside the margin of a position bound with its
    /// measured velocity carrying it further in.
    fn position_bounds_halt(&mut self) -> bool {
        let mut halting = false;
        for i in 0..self.num_joints {
            if position_bound_triggers_halt(
                &self.joint_model.bounds[i],
                self.original_positions[i],
                self.measured_velocities[i],
                self.config.joint_limit_margin,
            ) {
                if self.warnings.bound.ready() {
                    warn!(
                        "{} close to a position limit, halting",
                        self.joint_model.names[i]
                    );
                }
                halting = true;
            }
        }
        halting
    }

    /// Rewrites a trajectory into a single point that holds the measured
    /// pose with zero velocity. Leaves `prev_joint_velocity` untouched.
    fn sudden_halt(&self, trajectory: &mut JointTrajectory) {
        trajectory.points.truncate(1);
        if trajectory.points.is_empty() {
            trajectory.points.push(JointTrajectoryPoint {
                time_from_start: self.config.publish_period,
                ..JointTrajectoryPoint::default()
            });
        }
        let point = &mut trajectory.points[0];
        if self.config.publish_joint_positions {
            point.positions = self.original_positions.iter().copied().collect();
        }
        if self.config.publish_joint_velocities {
            point.velocities = vec![0.; self.num_joints];
        }
    }

    /// Pads the trajectory with replicated points for a simulator that
    /// drops points whose stamp is already in the past.
    fn pad_trajectory(&self, trajectory: &mut JointTrajectory) {
        let count = self.config.gazebo_redundant_message_count;
        if count < 2 || trajectory.points.is_empty() {
            return;
        }
        let template = trajectory.points[0].clone();
        trajectory.points.resize(count, template);
        for k in 2..count {
            trajectory.points[k].time_from_start = k as f64 * self.config.publish_period;
        }
    }

    /// Polls the joint-state feed. Returns false until a snapshot covering
    /// every active joint is available. Publishes the worst-case stop time
    /// on success.
    fn update_joints(&mut self) -> bool {
        let Some(state) = self.joint_states.latest() else {
            return false;
        };
        if state.names.len() < self.num_joints {
            return false;
        }

        let mut filled = vec![false; self.num_joints];
        for (m, name) in state.names.iter().enumerate() {
            let Some(c) = self.joint_model.index_of(name) else {
                debug!("ignoring joint {}", name);
                continue;
            };
            if let Some(&position) = state.positions.get(m) {
                self.internal_positions[c] = position;
                filled[c] = true;
            }
            if let Some(&velocity) = state.velocities.get(m) {
                self.measured_velocities[c] = velocity;
            }
        }
        if !filled.iter().all(|&f| f) {
            return false;
        }

        self.original_positions = self.internal_positions.clone();

        // Worst-case stop time over all measured joints, for the collision
        // checker
        let mut worst_case_stop_time: f64 = 0.;
        for (m, name) in state.names.iter().enumerate() {
            let Some(c) = self.joint_model.index_of(name) else {
                continue;
            };
            let bounds = &self.joint_model.bounds[c];
            if !bounds.acceleration_bounded {
                if self.warnings.missing_accel_bounds.ready() {
                    warn!(
                        "no acceleration limit for {}; stop distance unusable for collision checking",
                        name
                    );
                }
                continue;
            }
            let accel_limit = bounds
                .min_acceleration
                .abs()
                .min(bounds.max_acceleration.abs());
            if accel_limit <= 0. {
                continue;
            }
            if let Some(&velocity) = state.velocities.get(m) {
                worst_case_stop_time = worst_case_stop_time.max((velocity / accel_limit).abs());
            }
        }
        self.publisher
            .publish_worst_case_stop_time(worst_case_stop_time);

        true
    }

    fn reset_filters(&mut self) {
        self.position_filters.reset(&self.original_positions);
        self.updated_filters = true;
    }

    fn publish(&mut self, mut trajectory: JointTrajectory) {
        trajectory.stamp = self.clock.now();
        let outgoing = OutgoingCommand::from_trajectory(trajectory.clone(), &self.config);
        self.publisher.publish_command(&outgoing);
        self.last_sent = trajectory;
    }
}
