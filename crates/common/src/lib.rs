pub mod api;
pub mod config;
pub mod error;
pub mod ids;
pub mod types;

pub use error::{DistQueueError, Result};
pub use ids::*;
