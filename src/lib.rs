//! Side-by-side comparison of three motion detection strategies on a live
//! video stream: fixed-lag frame differencing, an exponentially smoothed
//! adaptive background, and a per-pixel mixture of Gaussians.

pub mod capture;
pub mod console;
pub mod detection;
pub mod error;
pub mod output;
pub mod session;

pub use error::{MotionError, Result};
