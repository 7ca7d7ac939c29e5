// posefuse_core/src/estimation/filters/rotation.rs

use nalgebra::{Quaternion, UnitQuaternion};

use crate::estimation::filters::kalman::{KalmanCore, DEFAULT_IDENTICAL_MEASUREMENTS_CAP};
use crate::estimation::SignalFilter;
use crate::frames::{euler_degrees, from_euler_degrees, world_forward, world_up};

/// Component-wise L1 distance above which two consecutive samples are assumed to sit
/// on opposite sheets of the quaternion double cover.
pub const SIGN_FLIP_THRESHOLD: f64 = 1.0;

/// `|forward . up|` below which the filtered rotation is renormalized through Euler
/// angles. Above it the Euler decomposition is close to its singularity.
///
/// Empirically tuned; there is no derivation behind the value.
pub const POLE_DOT_THRESHOLD: f64 = 0.7;

/// Returns `measured` or `-measured`, whichever lies on the same sheet of the double
/// cover as `previous`.
///
/// `q` and `-q` are the same rotation, but filtering the raw components across such a
/// flip drags the estimate through the zero quaternion.
pub fn resolve_sign_ambiguity(
    measured: &UnitQuaternion<f64>,
    previous: &UnitQuaternion<f64>,
) -> UnitQuaternion<f64> {
    let distance: f64 = (measured.coords - previous.coords).abs().sum();
    if distance > SIGN_FLIP_THRESHOLD {
        UnitQuaternion::new_unchecked(-measured.into_inner())
    } else {
        *measured
    }
}

/// Smooths a stream of orientations with a 4-state Kalman filter over the raw
/// quaternion components `(x, y, z, w)`.
#[derive(Debug, Clone)]
pub struct RotationFilter {
    filter: KalmanCore<4>,
    /// Scales `R = dt * noise_covariance * I`. Larger is smoother and slower.
    noise_covariance: f64,
    last_measurement: UnitQuaternion<f64>,
    rotation_state: UnitQuaternion<f64>,
    first_run: bool,
}

impl RotationFilter {
    pub fn new(noise_covariance: f64) -> Self {
        Self {
            filter: KalmanCore::new(),
            noise_covariance,
            last_measurement: UnitQuaternion::identity(),
            rotation_state: UnitQuaternion::identity(),
            first_run: true,
        }
    }

    /// Like [`RotationFilter::new`], but repeated samples from a slow device are
    /// treated as stale up to `cap` times.
    pub fn with_identical_skip(noise_covariance: f64, cap: usize) -> Self {
        Self {
            filter: KalmanCore::with_identical_skip(cap),
            ..Self::new(noise_covariance)
        }
    }

    pub fn noise_covariance(&self) -> f64 {
        self.noise_covariance
    }

    pub fn set_noise_covariance(&mut self, noise_covariance: f64) {
        self.noise_covariance = noise_covariance;
    }

    /// The most recent filtered rotation.
    pub fn rotation(&self) -> UnitQuaternion<f64> {
        self.rotation_state
    }

    pub fn update(&mut self, measured: &UnitQuaternion<f64>, dt: f64) -> UnitQuaternion<f64> {
        if self.first_run {
            self.last_measurement = *measured;
            self.rotation_state = *measured;
            self.filter.set_state(measured.coords);
            self.first_run = false;
        }

        let measured = resolve_sign_ambiguity(measured, &self.last_measurement);
        self.last_measurement = measured;

        let filtered = self.filter.filter(&measured.coords, dt, self.noise_covariance);
        let Some(mut rotation) = UnitQuaternion::try_new(Quaternion::from(filtered), 1e-9) else {
            // Collapsed onto the zero quaternion; keep the last good estimate.
            return self.rotation_state;
        };

        // Away from the poles, re-express through Euler angles to pin the result to the
        // unit sphere. Kept for compatibility, not verified beyond empirical tuning.
        let forward = rotation * world_forward();
        if forward.dot(&world_up()).abs() < POLE_DOT_THRESHOLD {
            let renormalized = from_euler_degrees(&euler_degrees(&rotation));
            rotation = if renormalized.coords.dot(&rotation.coords) < 0.0 {
                UnitQuaternion::new_unchecked(-renormalized.into_inner())
            } else {
                renormalized
            };
        }

        self.rotation_state = rotation;
        rotation
    }

    pub fn reset(&mut self) {
        self.filter.reset();
        self.last_measurement = UnitQuaternion::identity();
        self.rotation_state = UnitQuaternion::identity();
        self.first_run = true;
    }
}

impl Default for RotationFilter {
    fn default() -> Self {
        Self::with_identical_skip(1.0, DEFAULT_IDENTICAL_MEASUREMENTS_CAP)
    }
}

impl SignalFilter for RotationFilter {
    type Signal = UnitQuaternion<f64>;

    fn update(&mut self, measured: &Self::Signal, dt: f64) -> Self::Signal {
        RotationFilter::update(self, measured, dt)
    }

    fn estimate(&self) -> Self::Signal {
        self.rotation_state
    }

    fn reset(&mut self) {
        RotationFilter::reset(self)
    }
}
