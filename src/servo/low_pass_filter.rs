// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the per-joint position low-pass filters.

use nalgebra::DVector;

/// A first-order low-pass filter over a scalar signal.
///
/// Parameterized by a single dimensionless coefficient `c > 1`; larger
/// coefficients smooth more aggressively. The update rule is
/// `y_k = (x_k + x_{k-1} - (1 - c) * y_{k-1}) / (1 + c)`,
/// which has unit DC gain, so a constant input passes through unchanged.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    previous_measurements: [f64; 2],
    previous_filtered: f64,
    scale_term: f64,
    feedback_term: f64,
}

impl LowPassFilter {
    /// Creates a new filter with all history at zero.
    /// # Panics
    /// This function panics if `coefficient` is not finite or not greater than 1.
    pub fn new(coefficient: f64) -> Self {
        assert!(coefficient.is_finite() && coefficient > 1.);
        LowPassFilter {
            previous_measurements: [0.; 2],
            previous_filtered: 0.,
            scale_term: 1. / (1. + coefficient),
            feedback_term: 1. - coefficient,
        }
    }

    /// Feeds one measurement through the filter and returns the filtered value.
    pub fn filter(&mut self, new_measurement: f64) -> f64 {
        self.previous_measurements[1] = self.previous_measurements[0];
        self.previous_measurements[0] = new_measurement;
        let filtered = self.scale_term
            * (self.previous_measurements[1] + self.previous_measurements[0]
                - self.feedback_term * self.previous_filtered);
        self.previous_filtered = filtered;
        filtered
    }

    /// Overwrites the filter history so the next output equals `seed` for a
    /// constant input of `seed`.
    pub fn reset(&mut self, seed: f64) {
        self.previous_measurements = [seed; 2];
        self.previous_filtered = seed;
    }
}

/// One low-pass filter per active joint, applied to outgoing positions.
///
/// The bank must be re-seeded, not stepped, on every cycle that does not
/// commit a new position increment; this keeps resumption from a pause,
/// rejection, or halt free of position jumps.
#[derive(Debug, Clone)]
pub struct PositionFilterBank {
    filters: Vec<LowPassFilter>,
}

impl PositionFilterBank {
    pub fn new(num_joints: usize, coefficient: f64) -> Self {
        PositionFilterBank {
            filters: (0..num_joints).map(|_| LowPassFilter::new(coefficient)).collect(),
        }
    }

    /// Filters each position component in place.
    pub fn filter_in_place(&mut self, positions: &mut DVector<f64>) {
        for (filter, position) in self.filters.iter_mut().zip(positions.iter_mut()) {
            *position = filter.filter(*position);
        }
    }

    /// Re-seeds every filter from the given position vector.
    pub fn reset(&mut self, seed: &DVector<f64>) {
        for (filter, &position) in self.filters.iter_mut().zip(seed.iter()) {
            filter.reset(position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LowPassFilter, PositionFilterBank};
    use nalgebra::DVector;

    #[test]
    fn constant_input_passes_through() {
        let mut filter = LowPassFilter::new(2.);
        filter.reset(0.7);
        for _ in 0..10 {
            assert!((filter.filter(0.7) - 0.7).abs() < 1e-12);
        }
    }

    #[test]
    fn step_response_from_reset() {
        // c = 2: y = (x_k + x_{k-1} + y_{k-1}) / 3
        let mut filter = LowPassFilter::new(2.);
        filter.reset(0.);
        assert!((filter.filter(1.) - 1. / 3.).abs() < 1e-12);
        assert!((filter.filter(1.) - 7. / 9.).abs() < 1e-12);
    }

    #[test]
    fn step_response_converges() {
        let mut filter = LowPassFilter::new(10.);
        filter.reset(0.);
        let mut y = 0.;
        for _ in 0..200 {
            y = filter.filter(1.);
        }
        assert!((y - 1.).abs() < 1e-6);
    }

    #[test]
    fn reset_discards_transient() {
        let mut filter = LowPassFilter::new(2.);
        filter.reset(0.);
        filter.filter(5.);
        filter.filter(-3.);
        filter.reset(1.25);
        assert!((filter.filter(1.25) - 1.25).abs() < 1e-12);
    }

    #[test]
    fn bank_filters_componentwise() {
        let mut bank = PositionFilterBank::new(2, 2.);
        let seed = DVector::from_vec(vec![1., -1.]);
        bank.reset(&seed);
        let mut positions = DVector::from_vec(vec![1., -1.]);
        bank.filter_in_place(&mut positions);
        assert!((positions[0] - 1.).abs() < 1e-12);
        assert!((positions[1] + 1.).abs() < 1e-12);
    }

    #[test]
    #[should_panic]
    fn rejects_unstable_coefficient() {
        LowPassFilter::new(1.);
    }
}
