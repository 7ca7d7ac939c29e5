// posefuse_core/src/estimation/filters/position.rs

use nalgebra::Vector3;

use crate::estimation::filters::kalman::{KalmanCore, DEFAULT_IDENTICAL_MEASUREMENTS_CAP};
use crate::estimation::SignalFilter;

/// Smooths a stream of 3D positions with a 3-state Kalman filter.
#[derive(Debug, Clone)]
pub struct PositionFilter {
    filter: KalmanCore<3>,
    noise_covariance: f64,
    first_run: bool,
}

impl PositionFilter {
    pub fn new(noise_covariance: f64) -> Self {
        Self {
            filter: KalmanCore::new(),
            noise_covariance,
            first_run: true,
        }
    }

    pub fn with_identical_skip(noise_covariance: f64, cap: usize) -> Self {
        Self {
            filter: KalmanCore::with_identical_skip(cap),
            ..Self::new(noise_covariance)
        }
    }

    pub fn set_noise_covariance(&mut self, noise_covariance: f64) {
        self.noise_covariance = noise_covariance;
    }

    pub fn position(&self) -> Vector3<f64> {
        self.filter.state()
    }

    pub fn update(&mut self, measured: &Vector3<f64>, dt: f64) -> Vector3<f64> {
        // Seed with the first sample so the estimate does not glide in from the origin.
        if self.first_run {
            self.filter.set_state(*measured);
            self.first_run = false;
        }
        self.filter.filter(measured, dt, self.noise_covariance)
    }

    pub fn reset(&mut self) {
        self.filter.reset();
        self.first_run = true;
    }
}

impl Default for PositionFilter {
    fn default() -> Self {
        Self::with_identical_skip(1.0, DEFAULT_IDENTICAL_MEASUREMENTS_CAP)
    }
}

impl SignalFilter for PositionFilter {
    type Signal = Vector3<f64>;

    fn update(&mut self, measured: &Self::Signal, dt: f64) -> Self::Signal {
        PositionFilter::update(self, measured, dt)
    }

    fn estimate(&self) -> Self::Signal {
        self.position()
    }

    fn reset(&mut self) {
        PositionFilter::reset(self)
    }
}
