// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the resolution of the planning-frame to command-frame transform.

use crate::servo::kinematics::{Kinematics, TransformSource};
use log::error;
use nalgebra::{DVector, Isometry3};

/// Resolves the rigid transform planning frame -> command frame.
///
/// Each frame is taken from the kinematic model when the model knows it and
/// from the transform listener otherwise; both paths yield root -> frame.
/// The result is `(root -> planning)^-1 * (root -> command)`. `None` means
/// at least one lookup failed; the failure is logged and the caller keeps
/// servoing with whatever transform it has.
pub fn command_frame_transform<K, T>(
    kinematics: &K,
    transforms: &T,
    positions: &DVector<f64>,
    planning_frame: &str,
    command_frame: &str,
) -> Option<Isometry3<f64>>
where
    K: Kinematics + ?Sized,
    T: TransformSource + ?Sized,
{
    let planning_tf = resolve_from_root(kinematics, transforms, positions, planning_frame)?;
    let command_tf = resolve_from_root(kinematics, transforms, positions, command_frame)?;
    Some(planning_tf.inverse() * command_tf)
}

fn resolve_from_root<K, T>(
    kinematics: &K,
    transforms: &T,
    positions: &DVector<f64>,
    frame: &str,
) -> Option<Isometry3<f64>>
where
    K: Kinematics + ?Sized,
    T: TransformSource + ?Sized,
{
    if let Some(transform) = kinematics.frame_transform(positions, frame) {
        return Some(transform);
    }
    match transforms.lookup(frame, kinematics.root_frame()) {
        Ok(transform) => Some(transform),
        Err(e) => {
            error!("frame resolution failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::command_frame_transform;
    use crate::servo::kinematics::{
        JointBounds, JointSetModel, Kinematics, NoTransforms, TransformSource,
    };
    use crate::error::{ServoError, ServoResult};
    use nalgebra::{DMatrix, DVector, Isometry3, Translation3, UnitQuaternion, Vector3};

    struct TwoFrameModel {
        model: JointSetModel,
        tool_offset: Isometry3<f64>,
    }

    impl Kinematics for TwoFrameModel {
        fn joint_model(&self) -> &JointSetModel {
            &self.model
        }
        fn jacobian(&self, _positions: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::identity(6, 1)
        }
        fn root_frame(&self) -> &str {
            "base_link"
        }
        fn frame_transform(
            &self,
            _positions: &DVector<f64>,
            frame: &str,
        ) -> Option<Isometry3<f64>> {
            match frame {
                "base_link" => Some(Isometry3::identity()),
                "tool0" => Some(self.tool_offset),
                _ => None,
            }
        }
    }

    fn model() -> TwoFrameModel {
        TwoFrameModel {
            model: JointSetModel {
                names: vec!["j1".to_string()],
                bounds: vec![JointBounds::default()],
            },
            tool_offset: Isometry3::from_parts(
                Translation3::new(0.1, 0., 0.3),
                UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.5),
            ),
        }
    }

    #[test]
    fn model_known_frames_resolve() {
        let kinematics = model();
        let positions = DVector::zeros(1);
        let transform = command_frame_transform(
            &kinematics,
            &NoTransforms,
            &positions,
            "base_link",
            "tool0",
        )
        .unwrap();
        let expected = kinematics.tool_offset;
        assert!((transform.translation.vector - expected.translation.vector).norm() < 1e-12);
        assert!(transform.rotation.angle_to(&expected.rotation) < 1e-12);
    }

    #[test]
    fn listener_covers_unknown_frames() {
        struct WorldListener;
        impl TransformSource for WorldListener {
            fn lookup(&self, frame: &str, reference: &str) -> ServoResult<Isometry3<f64>> {
                if frame == "world" && reference == "base_link" {
                    Ok(Isometry3::translation(0., 0., 1.))
                } else {
                    Err(ServoError::TransformUnavailable {
                        frame: frame.to_string(),
                        reference: reference.to_string(),
                    })
                }
            }
        }

        let kinematics = model();
        let positions = DVector::zeros(1);
        let transform =
            command_frame_transform(&kinematics, &WorldListener, &positions, "world", "tool0")
                .unwrap();
        // world is 1m above the root, so tool0 seen from world is 1m lower
        assert!((transform.translation.vector.z - (0.3 - 1.)).abs() < 1e-12);
    }

    #[test]
    fn unresolvable_frame_yields_none() {
        let kinematics = model();
        let positions = DVector::zeros(1);
        assert!(command_frame_transform(
            &kinematics,
            &NoTransforms,
            &positions,
            "base_link",
            "missing_frame"
        )
        .is_none());
    }
}
