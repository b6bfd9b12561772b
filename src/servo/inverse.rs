// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the inverse step: reduction of the Jacobian by drift
//! dimensions, its thin-SVD pseudoinverse, and the singularity-proximity
//! velocity scale.

use crate::error::{ServoError, ServoResult};
use crate::servo::status::StatusCode;
use nalgebra::{DMatrix, DVector, SVD};

/// Iteration cap for the SVD; generous for 6xN Jacobians.
const SVD_MAX_ITERATIONS: usize = 1000;

/// Scale dividing the singular vector for the look-ahead probe.
const PROBE_SCALE: f64 = 100.;

/// Result of inverting one task-space displacement.
#[derive(Debug, Clone)]
pub struct InverseStep {
    /// Joint increments solving `J * delta_theta = delta_x` (minimum norm).
    pub delta_theta: DVector<f64>,
    /// Left singular vectors of the (possibly reduced) Jacobian.
    pub matrix_u: DMatrix<f64>,
    /// Singular values, parallel to the columns of `matrix_u`.
    pub singular_values: DVector<f64>,
    /// Pseudoinverse `V * S^-1 * U^T`.
    pub pseudo_inverse: DMatrix<f64>,
    /// Ratio of largest to smallest singular value.
    pub condition_number: f64,
}

/// Removes the task-space rows marked in `drift_dimensions` from the
/// Jacobian and the displacement, leaving the marked axes unconstrained.
///
/// Rows are dropped from the highest index down so earlier indices stay
/// valid, and never below a single remaining row.
pub fn remove_drift_dimensions(
    mut jacobian: DMatrix<f64>,
    mut delta_x: DVector<f64>,
    drift_dimensions: &[bool; 6],
) -> (DMatrix<f64>, DVector<f64>) {
    for dimension in (0..jacobian.nrows().min(6)).rev() {
        if drift_dimensions[dimension] && jacobian.nrows() > 1 {
            jacobian = jacobian.remove_row(dimension);
            delta_x = delta_x.remove_row(dimension);
        }
    }
    (jacobian, delta_x)
}

/// Computes the thin SVD of the Jacobian, its pseudoinverse and the joint
/// increments for `delta_x`.
///
/// No damping is applied; numerical safety near singularities comes from
/// [`singularity_velocity_scale`].
pub fn pseudo_inverse_step(
    jacobian: &DMatrix<f64>,
    delta_x: &DVector<f64>,
) -> ServoResult<InverseStep> {
    let svd = SVD::try_new(
        jacobian.clone(),
        true,
        true,
        f64::EPSILON,
        SVD_MAX_ITERATIONS,
    )
    .ok_or(ServoError::SvdFailure)?;

    let matrix_u = svd.u.ok_or(ServoError::SvdFailure)?;
    let matrix_v_t = svd.v_t.ok_or(ServoError::SvdFailure)?;
    let singular_values = svd.singular_values;

    let sigma_inverse = DMatrix::from_diagonal(&singular_values.map(|s| 1. / s));
    let pseudo_inverse = matrix_v_t.transpose() * sigma_inverse * matrix_u.transpose();
    let delta_theta = &pseudo_inverse * delta_x;
    let condition_number = singular_values.max() / singular_values.min();

    Ok(InverseStep {
        delta_theta,
        matrix_u,
        singular_values,
        pseudo_inverse,
        condition_number,
    })
}

/// Computes the velocity scale for proximity to a kinematic singularity and
/// the status it implies.
///
/// The column of U paired with the smallest singular value points directly
/// toward or away from the nearest singularity, but its sign is arbitrary
/// (see R. Bro, "Resolving the Sign
/// Ambiguity in the Singular Value Decomposition"). A small probe along the
/// vector checks whether the condition number grows in that direction; if it
/// does not, the vector is negated. Motion away from the singularity is
/// never scaled. `jacobian_at` is evaluated at probe positions only; the
/// stored kinematic state is untouched.
pub fn singularity_velocity_scale<F>(
    step: &InverseStep,
    delta_x: &DVector<f64>,
    current_positions: &DVector<f64>,
    jacobian_at: F,
    lower_threshold: f64,
    hard_stop_threshold: f64,
) -> (f64, Option<StatusCode>)
where
    F: FnOnce(&DVector<f64>) -> DMatrix<f64>,
{
    // Column of U paired with the smallest singular value
    let mut weakest = 0;
    for i in 1..step.singular_values.len() {
        if step.singular_values[i] < step.singular_values[weakest] {
            weakest = i;
        }
    }
    let mut vector_toward_singularity = step.matrix_u.column(weakest).into_owned();
    let ini_condition = step.condition_number;

    let probe_delta_x = &vector_toward_singularity / PROBE_SCALE;
    let probe_positions = current_positions + &step.pseudo_inverse * probe_delta_x;
    let probe_jacobian = jacobian_at(&probe_positions);
    let new_condition = match SVD::try_new(
        probe_jacobian,
        false,
        false,
        f64::EPSILON,
        SVD_MAX_ITERATIONS,
    ) {
        Some(svd) => svd.singular_values.max() / svd.singular_values.min(),
        None => return (1., None),
    };

    // The condition number must grow along the vector for it to point
    // toward the singularity
    if ini_condition >= new_condition {
        vector_toward_singularity = -vector_toward_singularity;
    }

    let moving_toward = vector_toward_singularity.dot(delta_x);
    if moving_toward > 0. {
        if ini_condition >= hard_stop_threshold {
            return (0., Some(StatusCode::HaltForSingularity));
        }
        if ini_condition > lower_threshold {
            let scale = 1.
                - (ini_condition - lower_threshold) / (hard_stop_threshold - lower_threshold);
            return (scale, Some(StatusCode::DecelerateForSingularity));
        }
    }
    (1., None)
}

#[cfg(test)]
mod tests {
    use super::{pseudo_inverse_step, remove_drift_dimensions, singularity_velocity_scale};
    use crate::servo::status::StatusCode;
    use nalgebra::{DMatrix, DVector};

    fn diagonal_jacobian(values: [f64; 6]) -> DMatrix<f64> {
        DMatrix::from_diagonal(&DVector::from_row_slice(&values))
    }

    #[test]
    fn identity_jacobian_passes_delta_through() {
        let jacobian = DMatrix::<f64>::identity(6, 6);
        let delta_x = DVector::from_vec(vec![0.0015, 0., 0., 0., 0., 0.]);
        let step = pseudo_inverse_step(&jacobian, &delta_x).unwrap();
        for i in 0..6 {
            assert!((step.delta_theta[i] - delta_x[i]).abs() < 1e-12);
        }
        assert!((step.condition_number - 1.).abs() < 1e-9);
    }

    #[test]
    fn pseudoinverse_solves_wide_jacobian() {
        // 6x7 full row rank: identity extended by a coupling column
        let mut jacobian = DMatrix::<f64>::zeros(6, 7);
        for i in 0..6 {
            jacobian[(i, i)] = 1.;
        }
        jacobian[(0, 6)] = 0.5;
        jacobian[(2, 6)] = -0.25;

        let delta_x = DVector::from_vec(vec![0.01, -0.02, 0.005, 0., 0.003, -0.001]);
        let step = pseudo_inverse_step(&jacobian, &delta_x).unwrap();
        let residual = &jacobian * &step.delta_theta - &delta_x;
        assert!(residual.norm() < 1e-10);
    }

    #[test]
    fn drift_dimension_removal() {
        let jacobian = DMatrix::<f64>::identity(6, 6);
        let delta_x = DVector::from_vec(vec![1., 2., 3., 4., 5., 6.]);
        let drift = [false, true, false, false, false, true];
        let (reduced, reduced_delta) = remove_drift_dimensions(jacobian, delta_x, &drift);
        assert_eq!(reduced.nrows(), 4);
        assert_eq!(reduced_delta.len(), 4);
        assert_eq!(
            reduced_delta,
            DVector::from_vec(vec![1., 3., 4., 5.])
        );
    }

    #[test]
    fn drift_removal_keeps_at_least_one_row() {
        let jacobian = DMatrix::<f64>::identity(6, 6);
        let delta_x = DVector::from_vec(vec![1., 2., 3., 4., 5., 6.]);
        let (reduced, reduced_delta) = remove_drift_dimensions(jacobian, delta_x, &[true; 6]);
        assert_eq!(reduced.nrows(), 1);
        assert_eq!(reduced_delta.len(), 1);
        assert_eq!(reduced_delta[0], 1.);
    }

    // The probe direction decides the sign of the singular vector, so the
    // fabricated Jacobian reports a growing condition number exactly when
    // the probe moved the last joint in +z.
    fn probing_jacobian(
        grown: [f64; 6],
        shrunk: [f64; 6],
        start: &DVector<f64>,
    ) -> impl FnOnce(&DVector<f64>) -> DMatrix<f64> {
        let start = start.clone();
        move |probe: &DVector<f64>| {
            if probe[5] > start[5] {
                diagonal_jacobian(grown)
            } else {
                diagonal_jacobian(shrunk)
            }
        }
    }

    #[test]
    fn decelerates_between_thresholds() {
        let jacobian = diagonal_jacobian([4., 3., 3., 3., 3., 2.]); // condition 2
        let delta_x = DVector::from_vec(vec![0., 0., 0., 0., 0., 0.01]);
        let step = pseudo_inverse_step(&jacobian, &delta_x).unwrap();
        let positions = DVector::zeros(6);
        let (scale, status) = singularity_velocity_scale(
            &step,
            &delta_x,
            &positions,
            probing_jacobian(
                [5., 3., 3., 3., 3., 2.],
                [4.5, 3., 3., 3., 3., 3.],
                &positions,
            ),
            1.5,
            2.5,
        );
        assert!((scale - 0.5).abs() < 1e-9);
        assert_eq!(status, Some(StatusCode::DecelerateForSingularity));
    }

    #[test]
    fn halts_beyond_hard_stop() {
        let jacobian = diagonal_jacobian([6., 3., 3., 3., 3., 2.]); // condition 3
        let delta_x = DVector::from_vec(vec![0., 0., 0., 0., 0., 0.01]);
        let step = pseudo_inverse_step(&jacobian, &delta_x).unwrap();
        let positions = DVector::zeros(6);
        let (scale, status) = singularity_velocity_scale(
            &step,
            &delta_x,
            &positions,
            probing_jacobian(
                [7., 3., 3., 3., 3., 2.],
                [5., 3., 3., 3., 3., 2.],
                &positions,
            ),
            1.5,
            2.5,
        );
        assert_eq!(scale, 0.);
        assert_eq!(status, Some(StatusCode::HaltForSingularity));
    }

    #[test]
    fn moving_away_is_not_scaled() {
        let jacobian = diagonal_jacobian([4., 3., 3., 3., 3., 2.]);
        let delta_x = DVector::from_vec(vec![0., 0., 0., 0., 0., -0.01]);
        let step = pseudo_inverse_step(&jacobian, &delta_x).unwrap();
        let positions = DVector::zeros(6);
        let (scale, status) = singularity_velocity_scale(
            &step,
            &delta_x,
            &positions,
            probing_jacobian(
                [5., 3., 3., 3., 3., 2.],
                [4.5, 3., 3., 3., 3., 3.],
                &positions,
            ),
            1.5,
            2.5,
        );
        assert_eq!(scale, 1.);
        assert_eq!(status, None);
    }

    #[test]
    fn well_conditioned_motion_is_not_scaled() {
        let jacobian = diagonal_jacobian([1.2, 1., 1., 1., 1., 1.1]);
        let delta_x = DVector::from_vec(vec![0.01, 0., 0., 0., 0., 0.01]);
        let step = pseudo_inverse_step(&jacobian, &delta_x).unwrap();
        let positions = DVector::zeros(6);
        let (scale, status) = singularity_velocity_scale(
            &step,
            &delta_x,
            &positions,
            |_: &DVector<f64>| diagonal_jacobian([1.3, 1., 1., 1., 1., 1.1]),
            17.,
            30.,
        );
        assert_eq!(scale, 1.);
        assert_eq!(status, None);
    }
}
