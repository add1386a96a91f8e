//! Audio output backends for oplplay.

mod cpal_backend;
mod error;

pub use cpal_backend::CpalOutput;
pub use error::AudioError;
