pub mod advisory;
pub mod config;
pub mod correlation;
pub mod error;
pub mod games;
pub mod history;
pub mod indicators;
pub mod overfitting;
pub mod pipeline;
pub mod selector;
pub mod stats;
pub mod universe;
pub mod validation;

pub use error::{CoreError, CoreResult};
