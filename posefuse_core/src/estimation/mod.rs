// posefuse_core/src/estimation/mod.rs

/// The contract shared by the per-signal smoothing filters.
///
/// A tracker owns one filter per logical signal and feeds it the latest raw
/// measurement together with the elapsed time every frame.
pub trait SignalFilter {
    /// The quantity being smoothed (a position, an orientation, ...).
    type Signal;

    /// Fuses `measured`, observed `dt` seconds after the previous call, and
    /// returns the new estimate.
    fn update(&mut self, measured: &Self::Signal, dt: f64) -> Self::Signal;

    /// Returns the current best estimate without advancing the filter.
    fn estimate(&self) -> Self::Signal;

    /// Forgets all history.
    fn reset(&mut self);
}

pub mod drift;
pub mod filters;
