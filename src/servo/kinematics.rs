// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the seams toward the kinematics provider and the transform
//! listener, together with the joint metadata they supply.

use crate::error::{ServoError, ServoResult};
use nalgebra::{DMatrix, DVector, Isometry3};
use serde::{Deserialize, Serialize};

/// Motion bounds of one joint variable.
///
/// A bound applies only when the matching `*_bounded` flag is set; some
/// joints (continuous joints in particular) carry no position bound.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default)]
pub struct JointBounds {
    pub position_bounded: bool,
    pub min_position: f64,
    pub max_position: f64,
    pub velocity_bounded: bool,
    pub min_velocity: f64,
    pub max_velocity: f64,
    pub acceleration_bounded: bool,
    pub min_acceleration: f64,
    pub max_acceleration: f64,
}

/// The ordered set of active joints the servo loop commands.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct JointSetModel {
    /// Joint names in the order all internal vectors use.
    pub names: Vec<String>,
    /// Bounds per joint, parallel to `names`.
    pub bounds: Vec<JointBounds>,
}

impl JointSetModel {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Index of a joint in the internal ordering.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Kinematic queries the servo loop needs from its model provider.
///
/// Implementations are expected to be pure in the joint positions passed in;
/// the singularity look-ahead probes the Jacobian at perturbed positions and
/// must not leave a trace in provider state.
pub trait Kinematics {
    /// The active joint group this core servos.
    fn joint_model(&self) -> &JointSetModel;

    /// The 6xN geometric Jacobian of the active group at `positions`,
    /// expressed in the planning frame.
    fn jacobian(&self, positions: &DVector<f64>) -> DMatrix<f64>;

    /// Name of the root link all model transforms are computed from.
    fn root_frame(&self) -> &str;

    /// Transform root frame -> `frame` at `positions`, if the model knows
    /// the frame. `None` defers the lookup to the transform listener.
    fn frame_transform(&self, positions: &DVector<f64>, frame: &str) -> Option<Isometry3<f64>>;
}

/// Lookup of transforms for frames the kinematic model does not know,
/// typically backed by an external transform tree.
pub trait TransformSource {
    /// Transform `reference` -> `frame` at the latest available time.
    fn lookup(&self, frame: &str, reference: &str) -> ServoResult<Isometry3<f64>>;
}

/// A transform source that knows no frames at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTransforms;

impl TransformSource for NoTransforms {
    fn lookup(&self, frame: &str, reference: &str) -> ServoResult<Isometry3<f64>> {
        Err(ServoError::TransformUnavailable {
            frame: frame.to_string(),
            reference: reference.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{JointBounds, JointSetModel, NoTransforms, TransformSource};

    #[test]
    fn joint_index_lookup() {
        let model = JointSetModel {
            names: vec!["shoulder".to_string(), "elbow".to_string()],
            bounds: vec![JointBounds::default(); 2],
        };
        assert_eq!(model.index_of("elbow"), Some(1));
        assert_eq!(model.index_of("wrist"), None);
        assert_eq!(model.len(), 2);
    }

    #[test]
    fn empty_transform_source_fails_lookup() {
        assert!(NoTransforms.lookup("tool0", "base_link").is_err());
    }
}
