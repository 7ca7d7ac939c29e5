// posefuse_core/src/estimation/filters/kalman.rs

use nalgebra::{SMatrix, SVector};
use tracing::{debug, warn};

/// How many consecutive bit-identical measurements are ignored before the
/// filter starts accepting them again. Empirically tuned.
pub const DEFAULT_IDENTICAL_MEASUREMENTS_CAP: usize = 10;

/// What a call to [`KalmanCore::update`] did with its measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The measurement was fused.
    Applied,
    /// The measurement repeated the previous one and was treated as stale.
    SkippedIdentical,
    /// The innovation covariance could not be inverted; state left untouched.
    SkippedSingular,
}

/// A discrete-time linear Kalman filter over an `N`-dimensional state (`1 <= N <= 4`).
///
/// Transition `F`, process noise `Q` and measurement map `H` default to identity.
/// The measurement covariance `R` is meant to be refreshed every step with
/// `dt * noise_covariance`, which is what [`KalmanCore::filter`] does.
#[derive(Debug, Clone)]
pub struct KalmanCore<const N: usize> {
    /// State estimate `x`.
    x: SVector<f64, N>,
    /// State covariance `P`.
    p: SMatrix<f64, N, N>,
    /// State transition `F`.
    f: SMatrix<f64, N, N>,
    /// Process noise `Q`.
    q: SMatrix<f64, N, N>,
    /// Measurement map `H`.
    h: SMatrix<f64, N, N>,
    /// Measurement covariance `R`.
    r: SMatrix<f64, N, N>,

    skip_identical_measurements: bool,
    identical_measurements_cap: usize,
    last_measurement: Option<SVector<f64, N>>,
    identical_count: usize,
}

impl<const N: usize> Default for KalmanCore<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> KalmanCore<N> {
    const SUPPORTED_DIMENSION: () = assert!(N >= 1 && N <= 4, "KalmanCore supports 1 to 4 states");

    /// Creates a filter with `x = 0`, `P = I` and identity models.
    /// Identical-measurement skipping is off.
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::SUPPORTED_DIMENSION;

        Self {
            x: SVector::zeros(),
            p: SMatrix::identity(),
            f: SMatrix::identity(),
            q: SMatrix::identity(),
            h: SMatrix::identity(),
            r: SMatrix::identity(),
            skip_identical_measurements: false,
            identical_measurements_cap: DEFAULT_IDENTICAL_MEASUREMENTS_CAP,
            last_measurement: None,
            identical_count: 0,
        }
    }

    /// Creates a filter that treats up to `cap` repeats of the same measurement as stale.
    pub fn with_identical_skip(cap: usize) -> Self {
        let mut filter = Self::new();
        filter.skip_identical_measurements = true;
        filter.identical_measurements_cap = cap;
        filter
    }

    /// Reinitializes `x = 0` and `P = I` and forgets the measurement history.
    /// The configured models and noise are kept.
    pub fn reset(&mut self) {
        self.x = SVector::zeros();
        self.p = SMatrix::identity();
        self.last_measurement = None;
        self.identical_count = 0;
    }

    // --- Configuration ---

    pub fn set_skip_identical_measurements(&mut self, enabled: bool) {
        self.skip_identical_measurements = enabled;
    }

    pub fn set_identical_measurements_cap(&mut self, cap: usize) {
        self.identical_measurements_cap = cap;
    }

    pub fn skips_identical_measurements(&self) -> bool {
        self.skip_identical_measurements
    }

    /// Sets `R = value * I`.
    pub fn set_measurement_noise(&mut self, value: f64) {
        self.r = SMatrix::identity() * value;
    }

    /// Sets a single diagonal entry of `R`, leaving the other axes alone.
    ///
    /// Returns `false` and changes nothing when `axis` is not below `N`.
    pub fn set_axis_measurement_noise(&mut self, axis: usize, value: f64) -> bool {
        if axis >= N {
            warn!(axis, states = N, "Measurement noise axis out of range, ignored");
            return false;
        }
        self.r[(axis, axis)] = value;
        true
    }

    pub fn set_transition(&mut self, f: SMatrix<f64, N, N>) {
        self.f = f;
    }

    pub fn set_process_noise(&mut self, q: SMatrix<f64, N, N>) {
        self.q = q;
    }

    pub fn set_measurement_map(&mut self, h: SMatrix<f64, N, N>) {
        self.h = h;
    }

    /// Overwrites the state estimate, e.g. to seed it with a first measurement.
    pub fn set_state(&mut self, x: SVector<f64, N>) {
        self.x = x;
    }

    pub fn set_covariance(&mut self, p: SMatrix<f64, N, N>) {
        self.p = p;
    }

    // --- Accessors ---

    pub fn state(&self) -> SVector<f64, N> {
        self.x
    }

    pub fn covariance(&self) -> &SMatrix<f64, N, N> {
        &self.p
    }

    pub fn measurement_noise(&self) -> &SMatrix<f64, N, N> {
        &self.r
    }

    // --- Kalman Equations ---

    /// `x <- F x`, `P <- F P F^T + Q`.
    pub fn predict(&mut self) {
        self.x = self.f * self.x;
        self.p = self.f * self.p * self.f.transpose() + self.q;
    }

    /// Fuses measurement `z`.
    ///
    /// With identical-measurement skipping enabled, a value bit-identical to the previous
    /// one is ignored up to `identical_measurements_cap` times in a row: the source most
    /// likely has not produced a new sample yet. Beyond the cap, repeats are fused again.
    pub fn update(&mut self, z: &SVector<f64, N>) -> UpdateOutcome {
        if self.register_measurement(z) {
            return UpdateOutcome::SkippedIdentical;
        }

        // 1. Innovation and its covariance.
        let y = z - self.h * self.x;
        let s = self.h * self.p * self.h.transpose() + self.r;

        // 2. Gain. A singular S means the update is meaningless; skip it.
        let Some(s_inv) = s.try_inverse() else {
            warn!(
                dimension = N,
                "Innovation covariance is singular, skipping Kalman update"
            );
            return UpdateOutcome::SkippedSingular;
        };
        let k = self.p * self.h.transpose() * s_inv;

        // 3. Posterior.
        self.x += k * y;
        self.p -= k * self.h * self.p;
        // Tiny numerical errors can make P slightly non-symmetric. This forces it.
        self.p = (self.p + self.p.transpose()) * 0.5;

        UpdateOutcome::Applied
    }

    /// One full step: `R = dt * noise_covariance * I`, predict, update. Returns the new state.
    pub fn filter(&mut self, z: &SVector<f64, N>, dt: f64, noise_covariance: f64) -> SVector<f64, N> {
        self.set_measurement_noise(dt.max(0.0) * noise_covariance);
        self.predict();
        self.update(z);
        self.x
    }

    /// Records `z` in the repeat history. Returns `true` when it should be skipped.
    fn register_measurement(&mut self, z: &SVector<f64, N>) -> bool {
        let repeated = self
            .last_measurement
            .as_ref()
            .is_some_and(|last| bit_identical(last, z));

        if !repeated {
            self.last_measurement = Some(*z);
            self.identical_count = 0;
            return false;
        }

        self.identical_count = self.identical_count.saturating_add(1);
        if !self.skip_identical_measurements {
            return false;
        }
        if self.identical_count <= self.identical_measurements_cap {
            return true;
        }
        if self.identical_count == self.identical_measurements_cap + 1 {
            debug!(
                cap = self.identical_measurements_cap,
                "Measurement unchanged beyond the stale cap, fusing repeats again"
            );
        }
        false
    }
}

fn bit_identical<const N: usize>(a: &SVector<f64, N>, b: &SVector<f64, N>) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x.to_bits() == y.to_bits())
}
