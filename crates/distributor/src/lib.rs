pub mod error;
pub mod fleet;
pub mod routes;
pub mod service;
pub mod store;

pub use error::ApiError;
pub use routes::{build_router, AppState};
pub use service::Distributor;
