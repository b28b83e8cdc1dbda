//! Active liveness probing for registered backends

pub mod prober;

pub use prober::HealthProber;
